use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    DependencyUnavailable,
    StartFailed,
    Timeout,
    DetectionError,
    MissingApprovalHandle,
    ApprovalLaunchFailed,
    Denied,
    Superseded,
    Aborted,
}

impl FailureKind {
    pub fn host_code(self) -> &'static str {
        match self {
            Self::DependencyUnavailable => "GOOGLE_PLAY_SERVICES_UNAVAILABLE",
            Self::StartFailed => "SMS_CONSENT_ERROR",
            Self::Timeout => "TIMEOUT",
            Self::DetectionError | Self::MissingApprovalHandle | Self::ApprovalLaunchFailed => {
                "ERROR"
            }
            Self::Denied => "DENIED",
            Self::Superseded | Self::Aborted => "CANCELLED",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::DependencyUnavailable => "dependency unavailable",
            Self::StartFailed => "start failed",
            Self::Timeout => "timeout",
            Self::DetectionError => "detection error",
            Self::MissingApprovalHandle => "missing approval handle",
            Self::ApprovalLaunchFailed => "approval launch failed",
            Self::Denied => "denied",
            Self::Superseded => "superseded",
            Self::Aborted => "aborted",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind}{}", detail_suffix(.detail))]
pub struct ConsentFailure {
    pub kind: FailureKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ConsentFailure {
    pub fn new(kind: FailureKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: Some(detail.into()),
        }
    }

    pub fn bare(kind: FailureKind) -> Self {
        Self { kind, detail: None }
    }
}

impl From<FailureKind> for ConsentFailure {
    fn from(kind: FailureKind) -> Self {
        Self::bare(kind)
    }
}

fn detail_suffix(detail: &Option<String>) -> String {
    detail
        .as_deref()
        .map(|detail| format!(": {detail}"))
        .unwrap_or_default()
}

pub type ConsentResult = Result<String, ConsentFailure>;
