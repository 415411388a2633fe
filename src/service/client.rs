use std::future::Future;
use std::time::Duration;

use reqwest::Client;
use tracing::{debug, trace};

use super::payload::{EndpointKind, GenerationPayload, ImageResult, ImageTuning, encode_body};
use crate::config::ServiceConfig;
use crate::error::GenerationError;

/// One request/response exchange with the generation service.
///
/// The worker only talks to the service through this trait so tests can swap in
/// a scripted implementation.
pub trait ImageService: Send + Sync + 'static {
    fn send(
        &self,
        kind: EndpointKind,
        payload: &GenerationPayload,
    ) -> impl Future<Output = Result<ImageResult, GenerationError>> + Send;
}

/// HTTP client for a Stable Diffusion web UI instance. No retries.
#[derive(Debug, Clone)]
pub struct StableDiffusionClient {
    client: Client,
    base_url: String,
    tuning: ImageTuning,
}

impl StableDiffusionClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, GenerationError> {
        Self::with_options(base_url, ImageTuning::default(), None)
    }

    pub fn from_config(cfg: &ServiceConfig) -> Result<Self, GenerationError> {
        Self::with_options(
            cfg.base_url.clone(),
            ImageTuning {
                denoising_strength: cfg.denoising_strength,
                guidance_scale: cfg.guidance_scale,
            },
            cfg.request_timeout,
        )
    }

    pub fn with_options(
        base_url: impl Into<String>,
        tuning: ImageTuning,
        timeout: Option<Duration>,
    ) -> Result<Self, GenerationError> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(|e| {
            GenerationError::Transport(format!("failed to create HTTP client: {e}"))
        })?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            tuning,
        })
    }

    pub fn endpoint_url(&self, kind: EndpointKind) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), kind.path())
    }
}

impl ImageService for StableDiffusionClient {
    async fn send(
        &self,
        kind: EndpointKind,
        payload: &GenerationPayload,
    ) -> Result<ImageResult, GenerationError> {
        let url = self.endpoint_url(kind);
        let body = encode_body(kind, payload, self.tuning)?;
        debug!(endpoint = kind.as_str(), %url, "posting generation request");

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(GenerationError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let result: ImageResult = response.json().await.map_err(|e| {
            if e.is_decode() {
                GenerationError::Decode(format!("invalid response body: {e}"))
            } else {
                GenerationError::from_reqwest(e)
            }
        })?;
        trace!(images = result.images.len(), "generation response received");
        Ok(result)
    }
}
