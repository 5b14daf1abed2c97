use thiserror::Error;

/// Failure of a single model round-trip. Consensus selection treats every
/// variant the same way: that model contributes nothing for the grid.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out after {0}s")]
    Timeout(u64),

    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Model returned an empty response")]
    EmptyResponse,

    #[error("Gateway configuration error: {0}")]
    Config(String),
}
