//! HTTP models of the gateway that are not part of the engine's own types.

use serde::{Deserialize, Serialize};

/// Query string of `DELETE /insights/cache`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvalidateParams {
    pub tenant_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InvalidateResponse {
    pub deleted: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

impl ErrorBody {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

/// Body of an `insights.data_ingested` message.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DataIngested {
    #[serde(default)]
    pub tenant_id: Option<String>,
}
