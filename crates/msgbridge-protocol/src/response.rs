//! Action response envelope.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionStatus {
    Ok,
    Failed,
}

/// Response body for one wire action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionResponse {
    pub status: ActionStatus,
    pub retcode: i32,
    pub data: Value,
    #[serde(default)]
    pub message: String,
    /// Stable machine-readable error code, empty on success.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error_code: String,
}

impl ActionResponse {
    pub fn ok(data: Value) -> Self {
        Self {
            status: ActionStatus::Ok,
            retcode: 0,
            data,
            message: String::new(),
            error_code: String::new(),
        }
    }

    pub fn failed(retcode: i32, error_code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status: ActionStatus::Failed,
            retcode,
            data: Value::Null,
            message: message.into(),
            error_code: error_code.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == ActionStatus::Ok
    }
}
