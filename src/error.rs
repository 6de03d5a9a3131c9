//! Error handling

use axum::response::IntoResponse;
use thiserror::Error;
use tracing::info;

/// Generic message shown when the background could not be generated.
pub const GENERATION_FAILED_MESSAGE: &str = "Không thể tạo hình ảnh. Vui lòng thử lại sau.";
/// Extra detail shown when the failure is a credential problem.
pub const CREDENTIAL_PROBLEM_MESSAGE: &str =
    "Khóa API không hợp lệ hoặc chưa được cấu hình.";
/// Message shown when the card could not be exported.
pub const EXPORT_FAILED_MESSAGE: &str = "Không thể tải thiệp. Vui lòng thử lại.";

/// Problems found while building the runtime configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No credential for the image service was supplied
    #[error("API key is not defined; set the {0} environment variable or pass --api-key")]
    MissingCredential(&'static str),
    /// The image service base URL does not parse
    #[error("invalid image service URL: {0}")]
    InvalidEndpoint(#[from] url::ParseError),
    /// A configured font file could not be loaded
    #[error("failed to load font {}: {reason}", path.display())]
    FontUnreadable {
        /// Path that was tried
        path: std::path::PathBuf,
        /// What went wrong
        reason: String,
    },
}

/// Failures of a single image generation attempt.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum GenerationError {
    /// No credential was configured when the call was attempted
    #[error("no API key configured for the image service")]
    MissingCredential,
    /// The service refused the credential
    #[error("the image service rejected the API key: {0}")]
    CredentialRejected(String),
    /// The service answered without any image
    #[error("no images were generated")]
    NoImages,
    /// The request never got a response
    #[error("request to the image service failed: {0}")]
    Transport(String),
    /// The service returned a non-success status
    #[error("image service returned {status}: {body}")]
    Service {
        /// HTTP status code
        status: u16,
        /// Response body, as text
        body: String,
    },
    /// The response could not be understood
    #[error("invalid response from the image service: {0}")]
    InvalidResponse(String),
}

impl GenerationError {
    /// True when the failure comes down to the credential.
    pub fn is_credential_problem(&self) -> bool {
        matches!(self, Self::MissingCredential | Self::CredentialRejected(_))
    }

    /// The message shown to the user for this failure.
    pub fn user_message(&self) -> String {
        if self.is_credential_problem() {
            format!("{GENERATION_FAILED_MESSAGE} {CREDENTIAL_PROBLEM_MESSAGE}")
        } else {
            GENERATION_FAILED_MESSAGE.to_string()
        }
    }
}

/// Failures while turning a card into PNG bytes.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ExportError {
    /// The background image could not be decoded
    #[error("failed to decode the card background: {0}")]
    Decode(String),
    /// No usable font was loaded
    #[error("no font available to draw the card text")]
    FontUnavailable,
    /// The PNG could not be written
    #[error("failed to encode the card: {0}")]
    Encode(String),
    /// The rasterizer task died
    #[error("rasterizer task failed: {0}")]
    Task(String),
    /// The requested pixel ratio is outside the supported range
    #[error("unsupported pixel ratio {0}")]
    PixelRatio(u32),
}

impl ExportError {
    /// The message shown to the user for this failure.
    pub fn user_message(&self) -> &'static str {
        EXPORT_FAILED_MESSAGE
    }
}

/// Errors returned by the web handlers.
#[derive(Debug)]
pub enum WishcardError {
    /// When you didn't do the right thing
    BadRequest,
    /// Missing or invalid session / CSRF token
    Unauthorized,
    /// When an internal server error occurs
    InternalServerError(String),
}

impl From<axum::http::Error> for WishcardError {
    fn from(err: axum::http::Error) -> Self {
        WishcardError::InternalServerError(err.to_string())
    }
}

impl IntoResponse for WishcardError {
    fn into_response(self) -> axum::response::Response {
        match self {
            WishcardError::BadRequest => {
                info!("Bad request received");
                let mut response =
                    axum::response::Response::new(axum::body::Body::from("Bad Request"));
                *response.status_mut() = axum::http::StatusCode::BAD_REQUEST;
                response
            }
            WishcardError::Unauthorized => {
                info!("Unauthorized request received");
                let mut response = axum::response::Response::new(axum::body::Body::from(
                    "Unauthorized: invalid or missing session.",
                ));
                *response.status_mut() = axum::http::StatusCode::UNAUTHORIZED;
                response
            }
            WishcardError::InternalServerError(message) => {
                tracing::error!("Internal server error: {}", message);
                let mut response =
                    axum::response::Response::new(axum::body::Body::from("Internal server error"));
                *response.status_mut() = axum::http::StatusCode::INTERNAL_SERVER_ERROR;
                response
            }
        }
    }
}
