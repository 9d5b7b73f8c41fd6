use std::time::Duration;

use crate::config::Config;
use crate::error::{ApiError, ConfigError};
use crate::fusionbrain::{FusionBrainClient, GenerationOptions};

/// Shared by all requests. Read-only after startup.
pub struct AppState {
    pub client: FusionBrainClient,
    pub poll_attempts: u32,
    pub poll_delay: Duration,
}

impl AppState {
    pub fn new(config: &Config) -> Result<Self, ConfigError> {
        Ok(Self {
            client: FusionBrainClient::new(config)?,
            poll_attempts: config.poll_attempts,
            poll_delay: config.poll_delay,
        })
    }

    /// Resolve model, submit the job, then wait for the image.
    ///
    /// Upstream errors are logged here and reduced to their client-facing category.
    pub async fn generate(&self, prompt: &str, style: String) -> Result<String, ApiError> {
        let model = self.client.resolve_model().await.map_err(|e| {
            tracing::error!(error = %e, "cannot resolve model");
            ApiError::ModelUnavailable
        })?;

        let options = GenerationOptions {
            style,
            ..Default::default()
        };

        let job_id = self
            .client
            .submit(prompt, &model.id, &options)
            .await
            .map_err(|e| {
                tracing::error!(model_id = %model.id, error = %e, "cannot submit generation");
                ApiError::SubmissionFailed
            })?;

        tracing::info!(%job_id, model_id = %model.id, "generation submitted");

        self.client
            .poll(&job_id, self.poll_attempts, self.poll_delay)
            .await
            .ok_or(ApiError::GenerationFailedOrTimedOut)
    }
}
