//! Background image acquisition.
//!
//! [`ImagenClient`] talks to the Generative Language API `:predict` endpoint
//! and returns exactly one image per call. The studio only sees the
//! [`ImageGenerator`] trait so tests can swap in a fake.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument};
use url::Url;

use crate::card::GeneratedImage;
use crate::constants::{IMAGE_ASPECT_RATIO, IMAGE_MIME_TYPE};
use crate::error::GenerationError;

/// Something that turns a prompt into one image.
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    /// Performs one generation attempt. Never retries.
    async fn generate(&self, prompt: &str) -> Result<GeneratedImage, GenerationError>;
}

/// Secret for the image service. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    /// Returns `None` for blank input.
    pub fn new(value: impl Into<String>) -> Option<Self> {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ApiKey(<redacted>)")
    }
}

/// Request body for POST /v1beta/models/{model}:predict
#[derive(Serialize, Debug)]
struct PredictRequest<'a> {
    instances: [PredictInstance<'a>; 1],
    parameters: PredictParameters<'a>,
}

#[derive(Serialize, Debug)]
struct PredictInstance<'a> {
    prompt: &'a str,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct PredictParameters<'a> {
    sample_count: u8,
    aspect_ratio: &'a str,
    output_options: OutputOptions<'a>,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct OutputOptions<'a> {
    mime_type: &'a str,
}

#[derive(Deserialize, Debug)]
struct PredictResponse {
    #[serde(default)]
    predictions: Vec<Prediction>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct Prediction {
    bytes_base64_encoded: Option<String>,
    mime_type: Option<String>,
    rai_filtered_reason: Option<String>,
}

/// Imagen client holding the credential for its whole life.
#[derive(Clone, Debug)]
pub struct ImagenClient {
    http: reqwest::Client,
    api_key: Option<ApiKey>,
    endpoint: Url,
    model: String,
}

impl ImagenClient {
    /// Builds a client for `model` under `base_url`.
    ///
    /// A missing key is accepted here so the call-time check can report it;
    /// startup refuses to run without one.
    pub fn new(
        api_key: Option<ApiKey>,
        base_url: &Url,
        model: &str,
    ) -> Result<Self, url::ParseError> {
        let endpoint = base_url.join(&format!("v1beta/models/{model}:predict"))?;
        Ok(Self {
            http: reqwest::Client::new(),
            api_key,
            endpoint,
            model: model.to_string(),
        })
    }

    /// The full predict URL this client posts to.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl ImageGenerator for ImagenClient {
    #[instrument(skip_all, fields(model = %self.model))]
    async fn generate(&self, prompt: &str) -> Result<GeneratedImage, GenerationError> {
        let Some(api_key) = &self.api_key else {
            error!("Image generation attempted without an API key");
            return Err(GenerationError::MissingCredential);
        };

        let body = PredictRequest {
            instances: [PredictInstance { prompt }],
            parameters: PredictParameters {
                sample_count: 1,
                aspect_ratio: IMAGE_ASPECT_RATIO,
                output_options: OutputOptions {
                    mime_type: IMAGE_MIME_TYPE,
                },
            },
        };

        info!("Requesting card background");
        let resp = self
            .http
            .post(self.endpoint.clone())
            .header("x-goog-api-key", api_key.expose())
            .json(&body)
            .send()
            .await
            .map_err(|err| GenerationError::Transport(err.to_string()))?;

        let status = resp.status();
        let bytes = resp
            .bytes()
            .await
            .map_err(|err| GenerationError::Transport(err.to_string()))?;

        if !status.is_success() {
            let text = String::from_utf8_lossy(&bytes).to_string();
            error!("Image service error {status}: {text}");
            return Err(classify_failure(status, text));
        }

        let parsed: PredictResponse = serde_json::from_slice(&bytes)
            .map_err(|err| GenerationError::InvalidResponse(err.to_string()))?;

        let Some(first) = parsed.predictions.into_iter().next() else {
            return Err(GenerationError::NoImages);
        };
        let Some(encoded) = first.bytes_base64_encoded else {
            if let Some(reason) = first.rai_filtered_reason {
                debug!("Image filtered by the service: {reason}");
            }
            return Err(GenerationError::NoImages);
        };
        let mime_type = image_mime_type(first.mime_type);

        let image = GeneratedImage::from_base64(mime_type, &encoded)?;
        info!("Received {} byte background", image.bytes().len());
        Ok(image)
    }
}

/// Keeps the service's MIME type only when it is a plain `image/*` token.
fn image_mime_type(reported: Option<String>) -> String {
    reported
        .filter(|mime| {
            mime.starts_with("image/")
                && mime
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '/' | '+' | '-' | '.'))
        })
        .unwrap_or_else(|| IMAGE_MIME_TYPE.to_string())
}

fn classify_failure(status: StatusCode, body: String) -> GenerationError {
    let mentions_key = body.contains("API key") || body.contains("API_KEY_INVALID");
    if status == StatusCode::UNAUTHORIZED
        || status == StatusCode::FORBIDDEN
        || (status == StatusCode::BAD_REQUEST && mentions_key)
    {
        GenerationError::CredentialRejected(body)
    } else {
        GenerationError::Service {
            status: status.as_u16(),
            body,
        }
    }
}
