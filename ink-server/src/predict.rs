use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::LazyLock;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use regex::Regex;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use uuid::Uuid;

use ink_core::RecognitionService;

/// Combined stdout and stderr a prediction may produce.
pub const MAX_OUTPUT_BYTES: usize = 1024 * 1024;

static PNG_DATA_URL_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^data:image/png;base64,(.+)$").ok());

#[derive(Debug, thiserror::Error)]
pub enum PredictError {
    #[error("imageDataUrl is required")]
    MissingImage,
    #[error("imageDataUrl must be a PNG data URL")]
    NotPngDataUrl,
    #[error("imageDataUrl is not valid base64")]
    InvalidBase64,
    #[error("Prediction timed out after {0:?}")]
    TimedOut(Duration),
    #[error("Prediction output exceeded 1 MiB")]
    OutputTooLarge,
    #[error("{0}")]
    Script(String),
    #[error("No prediction returned by Python script")]
    NoPrediction,
    #[error("Prediction failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Decodes the PNG bytes out of a `data:image/png;base64,` URL.
pub fn parse_image_data_url(image_data_url: Option<&str>) -> Result<Vec<u8>, PredictError> {
    let image_data_url = image_data_url.ok_or(PredictError::MissingImage)?;
    let payload = PNG_DATA_URL_PATTERN
        .as_ref()
        .and_then(|pattern| pattern.captures(image_data_url))
        .and_then(|captures| captures.get(1))
        .ok_or(PredictError::NotPngDataUrl)?;

    STANDARD
        .decode(payload.as_str().trim())
        .map_err(|_| PredictError::InvalidBase64)
}

/// Runs `<python> <script> <image>` on a snapshot and reads the predicted
/// word from the last line of stdout.
#[derive(Debug, Clone)]
pub struct ScriptPredictor {
    python_bin: PathBuf,
    script: PathBuf,
    timeout: Duration,
}

impl ScriptPredictor {
    pub fn new(python_bin: impl Into<PathBuf>, script: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            python_bin: python_bin.into(),
            script: script.into(),
            timeout,
        }
    }

    pub async fn predict(&self, image_data_url: Option<&str>) -> Result<String, PredictError> {
        let png = parse_image_data_url(image_data_url)?;
        self.predict_png(&png).await
    }

    /// Each call gets its own temp dir, removed whether or not the script
    /// succeeded.
    pub async fn predict_png(&self, png: &[u8]) -> Result<String, PredictError> {
        let dir = std::env::temp_dir().join(format!("ink-predict-{}", Uuid::new_v4().simple()));
        tokio::fs::create_dir(&dir).await?;

        let result = self.run_in(&dir, png).await;

        if let Err(e) = tokio::fs::remove_dir_all(&dir).await {
            tracing::warn!("Failed to remove {}: {}", dir.display(), e);
        }
        match &result {
            Ok(word) => tracing::info!("Predicted {:?}", word),
            Err(e) => tracing::warn!("Prediction failed: {}", e),
        }
        result
    }

    async fn run_in(&self, dir: &Path, png: &[u8]) -> Result<String, PredictError> {
        let image_path = dir.join("input.png");
        tokio::fs::write(&image_path, png).await?;

        let mut child = Command::new(&self.python_bin)
            .arg(&self.script)
            .arg(&image_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;
        let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
            return Err(PredictError::Script("Prediction script has no output pipes".to_string()));
        };

        let written = AtomicUsize::new(0);
        let run = async {
            let (stdout, stderr) = tokio::try_join!(
                read_capped(stdout, &written),
                read_capped(stderr, &written)
            )?;
            let status = child.wait().await?;
            Ok::<_, PredictError>((status, stdout, stderr))
        };

        let outcome = tokio::time::timeout(self.timeout, run).await;
        let (status, stdout, stderr) = match outcome {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                let _ = child.kill().await;
                return Err(e);
            }
            Err(_) => {
                let _ = child.kill().await;
                return Err(PredictError::TimedOut(self.timeout));
            }
        };

        let stderr = String::from_utf8_lossy(&stderr).trim().to_string();
        if !status.success() {
            return Err(PredictError::Script(if stderr.is_empty() {
                format!("Prediction script exited with {}", status)
            } else {
                stderr
            }));
        }

        match last_line(&String::from_utf8_lossy(&stdout)) {
            Some(word) => Ok(word),
            None if stderr.is_empty() => Err(PredictError::NoPrediction),
            None => Err(PredictError::Script(stderr)),
        }
    }
}

/// Reads `pipe` to the end, failing once the bytes read across all pipes
/// sharing `written` pass `MAX_OUTPUT_BYTES`.
async fn read_capped<R: AsyncRead + Unpin>(mut pipe: R, written: &AtomicUsize) -> Result<Vec<u8>, PredictError> {
    let mut output = Vec::new();
    let mut chunk = [0u8; 8192];
    loop {
        let read = pipe.read(&mut chunk).await?;
        if read == 0 {
            return Ok(output);
        }
        if written.fetch_add(read, Ordering::Relaxed) + read > MAX_OUTPUT_BYTES {
            return Err(PredictError::OutputTooLarge);
        }
        output.extend_from_slice(&chunk[..read]);
    }
}

fn last_line(stdout: &str) -> Option<String> {
    stdout
        .trim()
        .lines()
        .last()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
}

#[async_trait]
impl RecognitionService for ScriptPredictor {
    async fn recognize(&self, image_data_url: &str, _target_word: &str) -> anyhow::Result<String> {
        Ok(self.predict(Some(image_data_url)).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_DATA_URL: &str = "data:image/png;base64,iVBORw0KGgo=";

    #[test]
    fn test_parse_image_data_url() {
        let png = parse_image_data_url(Some(PNG_DATA_URL)).unwrap();
        assert_eq!(&png[1..4], b"PNG");

        assert!(matches!(
            parse_image_data_url(None),
            Err(PredictError::MissingImage)
        ));
        assert!(matches!(
            parse_image_data_url(Some("data:image/jpeg;base64,AAAA")),
            Err(PredictError::NotPngDataUrl)
        ));
        assert!(matches!(
            parse_image_data_url(Some("data:image/png;base64,")),
            Err(PredictError::NotPngDataUrl)
        ));
        assert!(matches!(
            parse_image_data_url(Some("data:image/png;base64,***")),
            Err(PredictError::InvalidBase64)
        ));

        // The compiled pattern is shared between calls
        for _ in 0..3 {
            assert_eq!(parse_image_data_url(Some(PNG_DATA_URL)).unwrap(), png);
        }
    }

    #[test]
    fn test_last_line() {
        assert_eq!(last_line("loading\n  Orbit \n\n").as_deref(), Some("Orbit"));
        assert_eq!(last_line("nova\r\n").as_deref(), Some("nova"));
        assert_eq!(last_line("   \n"), None);
    }

    #[cfg(unix)]
    mod script {
        use super::*;

        async fn predictor_for(body: &str, timeout: Duration) -> (ScriptPredictor, PathBuf) {
            let dir = std::env::temp_dir().join(format!("ink-script-{}", Uuid::new_v4().simple()));
            tokio::fs::create_dir(&dir).await.unwrap();
            let script = dir.join("predict.sh");
            tokio::fs::write(&script, body).await.unwrap();
            (ScriptPredictor::new("/bin/sh", &script, timeout), dir)
        }

        #[tokio::test]
        async fn test_returns_last_stdout_line() {
            let (predictor, dir) =
                predictor_for("echo 'loading model'\necho '  orbit  '\n", Duration::from_secs(10)).await;

            let word = predictor.predict(Some(PNG_DATA_URL)).await.unwrap();
            assert_eq!(word, "orbit");
            tokio::fs::remove_dir_all(dir).await.unwrap();
        }

        #[tokio::test]
        async fn test_temp_dir_is_removed() {
            let (predictor, dir) = predictor_for("echo \"$1\"\n", Duration::from_secs(10)).await;

            let image_path = predictor.predict(Some(PNG_DATA_URL)).await.unwrap();
            assert!(image_path.ends_with("input.png"));
            assert!(image_path.contains("ink-predict-"));
            assert!(!Path::new(&image_path).exists());
            assert!(!Path::new(&image_path).parent().unwrap().exists());
            tokio::fs::remove_dir_all(dir).await.unwrap();
        }

        #[tokio::test]
        async fn test_stderr_is_reported_when_stdout_is_empty() {
            let (predictor, dir) = predictor_for("echo 'model missing' >&2\n", Duration::from_secs(10)).await;

            let err = predictor.predict(Some(PNG_DATA_URL)).await.unwrap_err();
            assert_eq!(err.to_string(), "model missing");
            tokio::fs::remove_dir_all(dir).await.unwrap();
        }

        #[tokio::test]
        async fn test_silent_script() {
            let (predictor, dir) = predictor_for("true\n", Duration::from_secs(10)).await;

            let err = predictor.predict(Some(PNG_DATA_URL)).await.unwrap_err();
            assert!(matches!(err, PredictError::NoPrediction));
            assert_eq!(err.to_string(), "No prediction returned by Python script");
            tokio::fs::remove_dir_all(dir).await.unwrap();
        }

        #[tokio::test]
        async fn test_failing_script() {
            let (predictor, dir) = predictor_for("echo 'partial'\nexit 3\n", Duration::from_secs(10)).await;

            let err = predictor.predict(Some(PNG_DATA_URL)).await.unwrap_err();
            assert!(matches!(err, PredictError::Script(_)));
            tokio::fs::remove_dir_all(dir).await.unwrap();
        }

        #[tokio::test]
        async fn test_slow_script_times_out() {
            let (predictor, dir) = predictor_for("sleep 5\necho late\n", Duration::from_millis(100)).await;

            let err = predictor.predict(Some(PNG_DATA_URL)).await.unwrap_err();
            assert!(matches!(err, PredictError::TimedOut(_)));
            tokio::fs::remove_dir_all(dir).await.unwrap();
        }

        #[tokio::test]
        async fn test_flooding_script_is_stopped_early() {
            let (predictor, dir) = predictor_for(
                "head -c 4194304 /dev/zero\nsleep 3\necho done\n",
                Duration::from_secs(30),
            )
            .await;

            let started = std::time::Instant::now();
            let err = predictor.predict(Some(PNG_DATA_URL)).await.unwrap_err();
            assert!(matches!(err, PredictError::OutputTooLarge));
            assert!(started.elapsed() < Duration::from_secs(2));
            tokio::fs::remove_dir_all(dir).await.unwrap();
        }

        #[tokio::test]
        async fn test_output_within_cap_is_kept() {
            let (predictor, dir) =
                predictor_for("head -c 65536 /dev/zero | tr '\\0' 'a' >&2\necho orbit\n", Duration::from_secs(10))
                    .await;

            let word = predictor.predict(Some(PNG_DATA_URL)).await.unwrap();
            assert_eq!(word, "orbit");
            tokio::fs::remove_dir_all(dir).await.unwrap();
        }

        #[tokio::test]
        async fn test_recognition_service_impl() {
            let (predictor, dir) = predictor_for("echo Velocity\n", Duration::from_secs(10)).await;

            let word = predictor.recognize(PNG_DATA_URL, "velocity").await.unwrap();
            assert_eq!(word, "Velocity");
            tokio::fs::remove_dir_all(dir).await.unwrap();
        }
    }
}
