use std::time::Duration;

use anyhow::{Context, anyhow};
use async_trait::async_trait;
use reqwest::Client;

use ink_core::RecognitionService;
use ink_types::{ErrorBody, PredictRequest, PredictResponse};

/// Recognition service reached over HTTP, speaking the same
/// `{imageDataUrl, targetWord}` -> `{predictedWord}` contract as `/api/predict`.
pub struct HttpRecognizer {
    client: Client,
    url: String,
}

impl HttpRecognizer {
    pub fn new(url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build recognition client")?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl RecognitionService for HttpRecognizer {
    async fn recognize(&self, image_data_url: &str, target_word: &str) -> anyhow::Result<String> {
        let request = PredictRequest {
            image_data_url: Some(image_data_url.to_string()),
            target_word: Some(target_word.to_string()),
        };

        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .with_context(|| format!("recognition request to {} failed", self.url))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<ErrorBody>()
                .await
                .map(|body| body.error)
                .unwrap_or_else(|_| format!("Recognition service returned {}", status));
            tracing::warn!("Recognition failed with {}: {}", status, message);
            return Err(anyhow!(message));
        }

        let body: PredictResponse = response
            .json()
            .await
            .context("recognition response was malformed")?;
        Ok(body.predicted_word)
    }
}
