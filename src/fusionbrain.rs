use secrecy::{ExposeSecret, SecretString};
use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Deserializer, Serialize};
use std::time::Duration;
use tokio::time::sleep;

use crate::config::Config;
use crate::error::{ConfigError, UpstreamError};

const MODELS_PATH: &str = "key/api/v1/models";
const RUN_PATH: &str = "key/api/v1/text2image/run";
const STATUS_PATH: &str = "key/api/v1/text2image/status";

const PREFERRED_VERSION: &str = "3.1";

/// Opaque upstream job identifier.
pub type JobId = String;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ModelDescriptor {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default, deserialize_with = "string_or_number")]
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Style {
    pub name: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title_en: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

/// Knobs for a single generation job.
#[derive(Debug, Clone)]
pub struct GenerationOptions {
    pub width: u32,
    pub height: u32,
    pub style: String,
    pub negative_prompt: String,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            width: 1024,
            height: 1024,
            style: String::new(),
            negative_prompt: String::new(),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationParams<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    style: &'a str,
    width: u32,
    height: u32,
    num_images: u32,
    negative_prompt_decoder: &'a str,
    generate_params: GenerateParams<'a>,
}

#[derive(Serialize)]
struct GenerateParams<'a> {
    query: &'a str,
}

#[derive(Deserialize)]
struct RunResponse {
    uuid: Option<String>,
}

#[derive(Deserialize)]
struct StatusResponse {
    status: String,
    #[serde(default)]
    images: Option<Vec<String>>,
    #[serde(default)]
    error: Option<String>,
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        serde_json::Value::Null => Ok(String::new()),
        other => Err(D::Error::custom(format!(
            "expected string or number, got {other}"
        ))),
    }
}

/// Picks the first model whose version mentions 3.1, else the first model listed.
pub fn select_model(models: Vec<ModelDescriptor>) -> Result<ModelDescriptor, UpstreamError> {
    let preferred = models
        .iter()
        .position(|m| m.version.contains(PREFERRED_VERSION))
        .unwrap_or(0);

    models
        .into_iter()
        .nth(preferred)
        .ok_or(UpstreamError::NoModels)
}

/// Client for the FusionBrain text-to-image API.
///
/// Built once at startup and shared by every request; holds nothing mutable.
#[derive(Clone)]
pub struct FusionBrainClient {
    http: reqwest::Client,
    base_url: String,
    styles_url: String,
    api_key: SecretString,
    secret_key: SecretString,
}

impl FusionBrainClient {
    pub fn new(config: &Config) -> Result<Self, ConfigError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(ConfigError::HttpClient)?;

        Ok(Self {
            http,
            base_url: config.base_url.clone(),
            styles_url: config.styles_url.clone(),
            api_key: config.api_key.clone(),
            secret_key: config.secret_key.clone(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .header("X-Key", format!("Key {}", self.api_key.expose_secret()))
            .header("X-Secret", format!("Secret {}", self.secret_key.expose_secret()))
    }

    pub async fn resolve_model(&self) -> Result<ModelDescriptor, UpstreamError> {
        let response = self
            .authorized(self.http.get(self.endpoint(MODELS_PATH)))
            .send()
            .await?;

        let models: Vec<ModelDescriptor> = read_json(response).await?;
        let model = select_model(models)?;
        tracing::debug!(model_id = %model.id, version = %model.version, "model selected");
        Ok(model)
    }

    pub async fn submit(
        &self,
        prompt: &str,
        model_id: &str,
        options: &GenerationOptions,
    ) -> Result<JobId, UpstreamError> {
        let params = GenerationParams {
            kind: "GENERATE",
            style: &options.style,
            width: options.width,
            height: options.height,
            num_images: 1,
            negative_prompt_decoder: &options.negative_prompt,
            generate_params: GenerateParams { query: prompt },
        };

        let form = reqwest::multipart::Form::new()
            .text("model_id", model_id.to_string())
            .part(
                "params",
                reqwest::multipart::Part::text(serde_json::to_string(&params)?)
                    .mime_str("application/json")?,
            );

        let response = self
            .authorized(self.http.post(self.endpoint(RUN_PATH)))
            .multipart(form)
            .send()
            .await?;

        let run: RunResponse = read_json(response).await?;
        run.uuid
            .filter(|id| !id.is_empty())
            .ok_or(UpstreamError::MissingJobId)
    }

    async fn check_status(&self, job_id: &str) -> Result<StatusResponse, UpstreamError> {
        let url = format!("{}/{}", self.endpoint(STATUS_PATH), job_id);
        let response = self.authorized(self.http.get(url)).send().await?;
        read_json(response).await
    }

    /// Polls the job until DONE, FAIL or `max_attempts` status checks.
    ///
    /// A failed status check still counts as an attempt. `None` means the job failed,
    /// finished without images, or never finished in time.
    pub async fn poll(&self, job_id: &str, max_attempts: u32, delay: Duration) -> Option<String> {
        for attempt in 1..=max_attempts {
            match self.check_status(job_id).await {
                Ok(status) => match status.status.as_str() {
                    "DONE" => {
                        let image = status.images.and_then(|images| images.into_iter().next());
                        if image.is_none() {
                            tracing::warn!(job_id, "generation finished without images");
                        }
                        return image;
                    }
                    "FAIL" => {
                        tracing::warn!(
                            job_id,
                            error = status.error.as_deref().unwrap_or("unknown error"),
                            "generation failed upstream"
                        );
                        return None;
                    }
                    other => {
                        tracing::debug!(job_id, attempt, max_attempts, status = other, "generation pending");
                    }
                },
                Err(e) => {
                    tracing::warn!(job_id, attempt, max_attempts, error = %e, "status check failed");
                }
            }

            if attempt < max_attempts {
                sleep(delay).await;
            }
        }

        tracing::warn!(job_id, max_attempts, "generation timed out");
        None
    }

    pub async fn list_styles(&self) -> Result<Vec<Style>, UpstreamError> {
        let response = self.http.get(&self.styles_url).send().await?;
        read_json(response).await
    }
}

async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, UpstreamError> {
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        return Err(UpstreamError::status(status, &body));
    }

    serde_json::from_str(&body).map_err(|e| {
        UpstreamError::Decode(format!("{} - body: {}", e, body.chars().take(500).collect::<String>()))
    })
}
