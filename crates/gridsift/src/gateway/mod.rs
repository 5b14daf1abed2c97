//! Vision model access. One call sends one grid image plus a text prompt to
//! one model and returns the model's free-form answer.

use async_trait::async_trait;

pub mod error;
pub mod http;

pub use error::GatewayError;
pub use http::{HttpGatewayConfig, HttpVisionGateway};

#[async_trait]
pub trait VisionGateway: Send + Sync {
    /// Sends a JPEG image and prompt to `model` and returns its text reply.
    async fn query(
        &self,
        image_jpeg: &[u8],
        prompt: &str,
        model: &str,
    ) -> Result<String, GatewayError>;
}
