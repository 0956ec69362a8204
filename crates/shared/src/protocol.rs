use serde::{Deserialize, Serialize};

use crate::{
    domain::StatusCode,
    error::{ConsentFailure, ConsentResult, FailureKind},
};

pub const RESULT_OK: i32 = -1;
pub const RESULT_CANCELED: i32 = 0;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalTrigger(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionEvent {
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<StatusCode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approval_trigger: Option<ApprovalTrigger>,
}

impl DetectionEvent {
    pub fn new(action: impl Into<String>, status: StatusCode) -> Self {
        Self {
            action: action.into(),
            status: Some(status),
            approval_trigger: None,
        }
    }

    pub fn with_trigger(mut self, trigger: ApprovalTrigger) -> Self {
        self.approval_trigger = Some(trigger);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalLaunch {
    pub request_code: i32,
    pub trigger: ApprovalTrigger,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ApprovalData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawApprovalResult {
    pub result_code: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<ApprovalData>,
}

impl RawApprovalResult {
    pub fn approved(message: impl Into<String>) -> Self {
        Self {
            result_code: RESULT_OK,
            data: Some(ApprovalData {
                message: Some(message.into()),
            }),
        }
    }

    pub fn canceled() -> Self {
        Self {
            result_code: RESULT_CANCELED,
            data: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApprovalOutcome {
    Approved { text: String },
    Denied,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ConsentReply {
    Success {
        text: String,
    },
    Error {
        code: String,
        kind: FailureKind,
        message: String,
    },
}

impl ConsentReply {
    pub fn from_result(result: &ConsentResult) -> Self {
        match result {
            Ok(text) => Self::Success { text: text.clone() },
            Err(failure) => Self::from_failure(failure),
        }
    }

    pub fn from_failure(failure: &ConsentFailure) -> Self {
        Self::Error {
            code: failure.kind.host_code().to_string(),
            kind: failure.kind,
            message: failure.to_string(),
        }
    }
}

#[cfg(test)]
#[path = "tests/protocol_tests.rs"]
mod tests;
