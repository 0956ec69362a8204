use shared::{
    domain::StatusCode,
    error::{ConsentFailure, ConsentResult, FailureKind},
    protocol::{ApprovalOutcome, ApprovalTrigger, RawApprovalResult, RESULT_OK},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetectionVerdict {
    LaunchApproval(ApprovalTrigger),
    Fail(ConsentFailure),
}

pub fn classify_detection(status: StatusCode, trigger: Option<ApprovalTrigger>) -> DetectionVerdict {
    match (status, trigger) {
        (StatusCode::SUCCESS, Some(trigger)) => DetectionVerdict::LaunchApproval(trigger),
        (StatusCode::SUCCESS, None) => DetectionVerdict::Fail(ConsentFailure::new(
            FailureKind::MissingApprovalHandle,
            "consent trigger not available",
        )),
        (StatusCode::TIMEOUT, _) => DetectionVerdict::Fail(ConsentFailure::new(
            FailureKind::Timeout,
            "no qualifying message arrived before the platform timed out",
        )),
        (status, _) => DetectionVerdict::Fail(ConsentFailure::new(
            FailureKind::DetectionError,
            format!("message detection reported status {status}"),
        )),
    }
}

/// Only an OK result that carries data counts as approval; a missing message is
/// approval of an empty text.
pub fn classify_approval_result(result: &RawApprovalResult) -> ApprovalOutcome {
    match (&result.data, result.result_code) {
        (Some(data), RESULT_OK) => ApprovalOutcome::Approved {
            text: data.message.clone().unwrap_or_default(),
        },
        _ => ApprovalOutcome::Denied,
    }
}

pub fn classify_approval(outcome: ApprovalOutcome) -> ConsentResult {
    match outcome {
        ApprovalOutcome::Approved { text } => Ok(text),
        ApprovalOutcome::Denied => Err(ConsentFailure::new(
            FailureKind::Denied,
            "user denied consent",
        )),
    }
}

pub fn dependency_unavailable(code: i32, reason: &str) -> ConsentFailure {
    ConsentFailure::new(
        FailureKind::DependencyUnavailable,
        format!("{reason} (code {code})"),
    )
}

pub fn start_failed(message: &str) -> ConsentFailure {
    ConsentFailure::new(
        FailureKind::StartFailed,
        format!("failed to start consent watch: {message}"),
    )
}

pub fn approval_launch_failed(message: &str) -> ConsentFailure {
    ConsentFailure::new(
        FailureKind::ApprovalLaunchFailed,
        format!("failed to show approval step: {message}"),
    )
}

#[cfg(test)]
#[path = "tests/classifier_tests.rs"]
mod tests;
