use super::*;

#[test]
fn success_reply_serializes_with_status_tag() {
    let reply = ConsentReply::from_result(&Ok("123456".to_string()));
    let json = serde_json::to_value(&reply).expect("serialize");
    assert_eq!(json["status"], "success");
    assert_eq!(json["text"], "123456");
}

#[test]
fn failure_reply_carries_host_code_and_kind() {
    let failure = ConsentFailure::new(FailureKind::Superseded, "new consent request started");
    let json = serde_json::to_value(ConsentReply::from_failure(&failure)).expect("serialize");
    assert_eq!(json["status"], "error");
    assert_eq!(json["code"], "CANCELLED");
    assert_eq!(json["kind"], "superseded");
    assert_eq!(json["message"], "superseded: new consent request started");
}

#[test]
fn bare_failure_display_has_no_detail_suffix() {
    assert_eq!(ConsentFailure::bare(FailureKind::Denied).to_string(), "denied");
}

#[test]
fn known_status_codes_render_by_name() {
    assert_eq!(StatusCode::TIMEOUT.to_string(), "TIMEOUT (15)");
    assert_eq!(StatusCode(42).to_string(), "42");
}

#[test]
fn detection_event_without_status_deserializes() {
    let event: DetectionEvent =
        serde_json::from_str(r#"{"action":"sms.retrieved"}"#).expect("deserialize");
    assert!(event.status.is_none());
    assert!(event.approval_trigger.is_none());
}

#[test]
fn unavailable_dependency_reports_play_services_code() {
    let failure = ConsentFailure::new(
        FailureKind::DependencyUnavailable,
        "platform services need an update (code 2)",
    );
    let json = serde_json::to_value(ConsentReply::from_failure(&failure)).expect("serialize");
    assert_eq!(json["code"], "GOOGLE_PLAY_SERVICES_UNAVAILABLE");
    assert_eq!(json["kind"], "dependency_unavailable");
}
