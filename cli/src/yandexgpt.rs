use anyhow::{Context, Result};

use calofit_core::estimation::{CompletionRequest, CompletionResponse};
use calofit_core::service::CalorieEstimator;

use crate::config::{EstimatorConfig, YandexAuth};

/// Calorie estimates from a Yandex Foundation Models completion endpoint.
pub struct YandexGptClient {
    client: reqwest::Client,
    rt: tokio::runtime::Handle,
    url: String,
    folder_id: String,
    model: String,
    auth: YandexAuth,
}

impl YandexGptClient {
    pub fn new(config: &EstimatorConfig, rt: tokio::runtime::Handle) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(format!("calofit/{}", env!("CARGO_PKG_VERSION")))
            .timeout(config.timeout)
            .connect_timeout(config.timeout.min(std::time::Duration::from_secs(5)))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            rt,
            url: config.url.clone(),
            folder_id: config.folder_id.clone(),
            model: config.model.clone(),
            auth: config.auth.clone(),
        })
    }

    pub async fn complete_async(&self, food: &str) -> Result<String> {
        let request = CompletionRequest::new(&self.folder_id, &self.model, food);
        let resp = self
            .client
            .post(&self.url)
            .header(reqwest::header::AUTHORIZATION, self.auth.header_value())
            .header("x-folder-id", &self.folder_id)
            .json(&request)
            .send()
            .await
            .context("Failed to reach the completion API")?
            .error_for_status()
            .context("Completion API returned an error")?;

        let data: CompletionResponse = resp
            .json()
            .await
            .context("Failed to parse completion response")?;

        data.answer_text()
            .map(str::to_string)
            .context("Completion response has no alternatives")
    }
}

impl CalorieEstimator for YandexGptClient {
    fn estimate(&self, food: &str) -> Result<String> {
        self.rt.block_on(self.complete_async(food))
    }
}
