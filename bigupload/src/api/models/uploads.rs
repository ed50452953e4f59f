use serde::{Deserialize, Serialize};

/// The JSON body every upload endpoint answers with.
#[derive(Debug, Serialize, Deserialize)]
pub struct MsgResponse {
    pub msg: String,
}

/// Query parameters for the terminate-here upload endpoints.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct UploadQuery {
    /// Profile this request and write a report keyed by content type and size
    pub profile: bool,
}

/// Query parameters for the relay endpoint.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RelayQuery {
    /// Downstream target as host:port; falls back to the configured default
    pub next: Option<String>,
    pub profile: bool,
}
