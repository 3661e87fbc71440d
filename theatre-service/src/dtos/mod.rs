pub mod user;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Envelope shape for OpenAPI docs; the wire type is
/// `service_core::response::ApiResponse`.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    #[schema(value_type = Option<Object>)]
    pub data: Option<serde_json::Value>,
    pub success: bool,
    #[schema(example = "User already exists")]
    pub message: String,
    #[schema(example = "AlreadyExists")]
    pub error_code: Option<String>,
}
