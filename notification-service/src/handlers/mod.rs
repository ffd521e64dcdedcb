/// HTTP handlers for notification service API
pub mod devices;
pub mod health;
pub mod notifications;
pub mod preferences;

use serde::Serialize;

/// Shared response envelope for every handler in this module.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
        }
    }
}

pub use devices::*;
pub use health::*;
pub use notifications::*;
pub use preferences::*;
