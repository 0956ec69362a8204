use super::*;
use crate::{
    dispatch::CoordinatorInput,
    test_support::{detected, FakeSource, ACTION},
};
use shared::domain::StatusCode;

fn filter() -> EventFilter {
    EventFilter::new(ACTION, true)
}

#[test]
fn close_releases_listener_exactly_once() {
    let source = FakeSource::new();
    let (dispatcher, _inbox) = Dispatcher::channel();
    let mut subscription = EventSubscription::new(source.clone());

    let handle = subscription
        .open(&filter(), DetectionListener::new(FlowId(1), ACTION, dispatcher))
        .expect("open");
    assert!(subscription.is_open());
    assert!(source.is_registered(handle));

    assert!(subscription.close());
    assert!(!subscription.close());
    assert!(!subscription.close());

    assert!(!source.is_registered(handle));
    assert_eq!(source.unregister_calls(), 1);
}

#[test]
fn close_without_open_is_a_no_op() {
    let source = FakeSource::new();
    let mut subscription = EventSubscription::new(source.clone());

    assert!(!subscription.close());
    assert_eq!(source.unregister_calls(), 0);
    assert_eq!(subscription.handle(), None);
}

#[test]
fn unregister_failure_is_swallowed() {
    let source = FakeSource::new();
    let (dispatcher, _inbox) = Dispatcher::channel();
    let mut subscription = EventSubscription::new(source.clone());
    let handle = subscription
        .open(&filter(), DetectionListener::new(FlowId(1), ACTION, dispatcher))
        .expect("open");

    // Released behind the subscription's back, so its own unregister fails.
    source.unregister(handle).expect("external unregister");
    assert!(subscription.close());
    assert_eq!(source.unregister_calls(), 2);
    assert!(!subscription.is_open());
}

#[test]
fn second_open_is_rejected_while_registered() {
    let source = FakeSource::new();
    let (dispatcher, _inbox) = Dispatcher::channel();
    let mut subscription = EventSubscription::new(source.clone());
    let handle = subscription
        .open(
            &filter(),
            DetectionListener::new(FlowId(1), ACTION, dispatcher.clone()),
        )
        .expect("open");

    let err = subscription
        .open(&filter(), DetectionListener::new(FlowId(1), ACTION, dispatcher))
        .expect_err("second open");
    assert!(matches!(err, SubscriptionError::AlreadyOpen(existing) if existing == handle));
    assert_eq!(source.open_count(), 1);
}

#[test]
fn register_failure_leaves_subscription_closed() {
    let source = FakeSource::failing("receiver registration rejected");
    let (dispatcher, _inbox) = Dispatcher::channel();
    let mut subscription = EventSubscription::new(source.clone());

    let err = subscription
        .open(&filter(), DetectionListener::new(FlowId(1), ACTION, dispatcher))
        .expect_err("register fails");
    assert!(err.to_string().contains("receiver registration rejected"));
    assert!(!subscription.is_open());
    assert!(!subscription.close());
}

#[test]
fn dropping_subscription_releases_listener() {
    let source = FakeSource::new();
    let (dispatcher, _inbox) = Dispatcher::channel();
    let handle = {
        let mut subscription = EventSubscription::new(source.clone());
        subscription
            .open(&filter(), DetectionListener::new(FlowId(1), ACTION, dispatcher))
            .expect("open")
    };

    assert!(!source.is_registered(handle));
    assert_eq!(source.open_count(), 0);
}

#[test]
fn listener_routes_matching_broadcast_to_its_flow() {
    let (dispatcher, mut inbox) = Dispatcher::channel();
    let listener = DetectionListener::new(FlowId(7), ACTION, dispatcher);

    assert!(listener.deliver(detected(StatusCode::TIMEOUT)));

    match inbox.try_recv().expect("routed input") {
        CoordinatorInput::Flow { flow_id, input } => {
            assert_eq!(flow_id, FlowId(7));
            assert_eq!(input, FlowInput::Detected(detected(StatusCode::TIMEOUT)));
        }
        _ => panic!("expected flow input"),
    }
}

#[test]
fn listener_drops_foreign_action_and_missing_status() {
    let (dispatcher, mut inbox) = Dispatcher::channel();
    let listener = DetectionListener::new(FlowId(1), ACTION, dispatcher);

    assert!(!listener.deliver(DetectionEvent::new("other.action", StatusCode::SUCCESS)));
    assert!(!listener.deliver(DetectionEvent {
        action: ACTION.to_string(),
        status: None,
        approval_trigger: None,
    }));
    assert!(inbox.try_recv().is_err());
}
