use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ink_types::JudgeStrategy;
use tracing::{debug, warn};

use crate::error::RoundError;

pub const DEFAULT_JUDGE_TIMEOUT: Duration = Duration::from_secs(30);

/// Turns a handwriting snapshot into the word it most likely shows.
#[async_trait]
pub trait RecognitionService: Send + Sync {
    async fn recognize(&self, image_data_url: &str, target_word: &str) -> anyhow::Result<String>;
}

/// What the player handed in when the round left `Active`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Submission {
    pub image_data_url: Option<String>,
    pub typed_text: Option<String>,
    pub stroke_count: usize,
    pub point_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Judgment {
    pub is_correct: bool,
    pub predicted_word: Option<String>,
}

pub fn normalize_word(word: &str) -> String {
    word.trim().to_lowercase()
}

/// Case-insensitive comparison after trimming. Blank input never matches.
pub fn words_match(target: &str, candidate: &str) -> bool {
    let candidate = normalize_word(candidate);
    !candidate.is_empty() && candidate == normalize_word(target)
}

#[derive(Clone)]
pub struct Judge {
    strategy: JudgeStrategy,
    recognizer: Option<Arc<dyn RecognitionService>>,
    timeout: Duration,
}

impl Judge {
    pub fn text_compare() -> Self {
        Self {
            strategy: JudgeStrategy::TextCompare,
            recognizer: None,
            timeout: DEFAULT_JUDGE_TIMEOUT,
        }
    }

    pub fn image_recognition(recognizer: Arc<dyn RecognitionService>) -> Self {
        Self {
            strategy: JudgeStrategy::ImageRecognition,
            recognizer: Some(recognizer),
            timeout: DEFAULT_JUDGE_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn strategy(&self) -> JudgeStrategy {
        self.strategy
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn judge(&self, target: &str, submission: &Submission) -> Result<Judgment, RoundError> {
        match self.strategy {
            JudgeStrategy::TextCompare => Self::judge_text(target, submission),
            JudgeStrategy::ImageRecognition => self.judge_image(target, submission).await,
        }
    }

    fn judge_text(target: &str, submission: &Submission) -> Result<Judgment, RoundError> {
        let text = submission
            .typed_text
            .as_deref()
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .ok_or_else(|| RoundError::InputValidation("No text entered".to_string()))?;

        Ok(Judgment {
            is_correct: words_match(target, text),
            predicted_word: None,
        })
    }

    async fn judge_image(&self, target: &str, submission: &Submission) -> Result<Judgment, RoundError> {
        let image = submission
            .image_data_url
            .as_deref()
            .filter(|image| !image.is_empty())
            .ok_or_else(|| RoundError::InputValidation("No canvas image found".to_string()))?;

        let recognizer = self
            .recognizer
            .as_ref()
            .ok_or_else(|| RoundError::upstream("Recognition service is not configured"))?;

        debug!(
            "Judging snapshot with {} strokes / {} points",
            submission.stroke_count, submission.point_count
        );

        let predicted = match tokio::time::timeout(self.timeout, recognizer.recognize(image, target)).await {
            Ok(Ok(predicted)) => predicted,
            Ok(Err(e)) => {
                warn!("Recognition failed: {}", e);
                return Err(RoundError::upstream(e));
            }
            Err(_) => {
                warn!("Recognition timed out after {:?}", self.timeout);
                return Err(RoundError::upstream("Recognition timed out"));
            }
        };

        let predicted = predicted.trim().to_string();
        if predicted.is_empty() {
            return Err(RoundError::upstream("Prediction response was empty"));
        }

        Ok(Judgment {
            is_correct: words_match(target, &predicted),
            predicted_word: Some(predicted),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedRecognizer(&'static str);

    #[async_trait]
    impl RecognitionService for FixedRecognizer {
        async fn recognize(&self, _image: &str, _target: &str) -> anyhow::Result<String> {
            Ok(self.0.to_string())
        }
    }

    struct FailingRecognizer;

    #[async_trait]
    impl RecognitionService for FailingRecognizer {
        async fn recognize(&self, _image: &str, _target: &str) -> anyhow::Result<String> {
            Err(anyhow::anyhow!("model crashed"))
        }
    }

    struct SlowRecognizer;

    #[async_trait]
    impl RecognitionService for SlowRecognizer {
        async fn recognize(&self, _image: &str, _target: &str) -> anyhow::Result<String> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok("never".to_string())
        }
    }

    fn with_image() -> Submission {
        Submission {
            image_data_url: Some("data:image/png;base64,AAAA".to_string()),
            ..Submission::default()
        }
    }

    fn with_text(text: &str) -> Submission {
        Submission {
            typed_text: Some(text.to_string()),
            ..Submission::default()
        }
    }

    #[test]
    fn test_words_match_ignores_case_and_padding() {
        assert!(words_match("Velocity", " velocity "));
        assert!(words_match("orbit", "ORBIT"));
        assert!(!words_match("orbit", "orbits"));
        assert!(!words_match("orbit", "   "));
    }

    #[tokio::test]
    async fn test_text_compare() {
        let judge = Judge::text_compare();

        let correct = judge.judge("Velocity", &with_text(" velocity ")).await.unwrap();
        assert!(correct.is_correct);
        assert_eq!(correct.predicted_word, None);

        let wrong = judge.judge("velocity", &with_text("glide")).await.unwrap();
        assert!(!wrong.is_correct);
    }

    #[tokio::test]
    async fn test_text_compare_requires_text() {
        let judge = Judge::text_compare();
        let err = judge.judge("nova", &with_text("  ")).await.unwrap_err();
        assert!(matches!(err, RoundError::InputValidation(_)));

        let err = judge.judge("nova", &Submission::default()).await.unwrap_err();
        assert!(matches!(err, RoundError::InputValidation(_)));
    }

    #[tokio::test]
    async fn test_image_recognition_match() {
        let judge = Judge::image_recognition(Arc::new(FixedRecognizer("  NOVA\n")));
        let judgment = judge.judge("nova", &with_image()).await.unwrap();
        assert!(judgment.is_correct);
        assert_eq!(judgment.predicted_word.as_deref(), Some("NOVA"));
    }

    #[tokio::test]
    async fn test_image_recognition_requires_snapshot() {
        let judge = Judge::image_recognition(Arc::new(FixedRecognizer("nova")));
        let err = judge.judge("nova", &Submission::default()).await.unwrap_err();
        assert_eq!(err, RoundError::InputValidation("No canvas image found".to_string()));
    }

    #[tokio::test]
    async fn test_image_recognition_failures_are_upstream() {
        let failing = Judge::image_recognition(Arc::new(FailingRecognizer));
        let err = failing.judge("nova", &with_image()).await.unwrap_err();
        assert_eq!(err, RoundError::UpstreamFailure("model crashed".to_string()));

        let empty = Judge::image_recognition(Arc::new(FixedRecognizer("   ")));
        let err = empty.judge("nova", &with_image()).await.unwrap_err();
        assert_eq!(
            err,
            RoundError::UpstreamFailure("Prediction response was empty".to_string())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_image_recognition_timeout() {
        let judge = Judge::image_recognition(Arc::new(SlowRecognizer))
            .with_timeout(Duration::from_secs(5));
        let err = judge.judge("nova", &with_image()).await.unwrap_err();
        assert_eq!(err, RoundError::UpstreamFailure("Recognition timed out".to_string()));
    }
}
