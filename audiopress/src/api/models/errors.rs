use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// JSON body returned for every handled error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    /// Human-readable summary of what went wrong
    #[schema(example = "FFmpeg compression failed")]
    pub error: String,
    /// Encoder diagnostic output, present only when the encoder itself failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(example = "Invalid data found when processing input")]
    pub details: Option<String>,
}

impl ErrorBody {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: None,
        }
    }

    pub fn with_details(error: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: Some(details.into()),
        }
    }
}
