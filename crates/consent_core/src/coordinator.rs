use std::{
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use chrono::{DateTime, Utc};
use futures::FutureExt;
use shared::{
    domain::{FlowId, FlowStateTag, RequestId},
    error::{ConsentFailure, ConsentResult, FailureKind},
    protocol::RawApprovalResult,
};
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::{
    classifier,
    config::ConsentSettings,
    dispatch::{CoordinatorInput, Dispatcher},
    flow::{ConsentFlowStateMachine, FlowContext, FlowInput},
    subscription::EventFilter,
    Availability, ConsentDependencies,
};

// Flow N launches its approval step with request code `base + (N - 1) % span`.
const APPROVAL_CODE_SPAN: u64 = 1 << 14;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsentRequestOptions {
    pub sender_hint: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowSnapshot {
    pub request_id: RequestId,
    pub flow_id: FlowId,
    pub state: FlowStateTag,
    pub created_at: DateTime<Utc>,
    pub subscription_open: bool,
    pub approval_request_code: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsentEvent {
    StateChanged {
        request_id: RequestId,
        state: FlowStateTag,
    },
    Resolved {
        request_id: RequestId,
        failure: Option<FailureKind>,
    },
}

/// Resolves `Aborted` if the coordinator stops without answering.
pub struct PendingConsent {
    rx: oneshot::Receiver<ConsentResult>,
}

impl Future for PendingConsent {
    type Output = ConsentResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.rx.poll_unpin(cx).map(|received| {
            received.unwrap_or_else(|_| {
                Err(ConsentFailure::new(
                    FailureKind::Aborted,
                    "consent coordinator is no longer running",
                ))
            })
        })
    }
}

pub struct RequestCoordinator {
    dispatcher: Dispatcher,
    events: broadcast::Sender<ConsentEvent>,
}

impl RequestCoordinator {
    pub fn start(dependencies: ConsentDependencies, settings: ConsentSettings) -> Arc<Self> {
        let (dispatcher, inbox) = Dispatcher::channel();
        let (events, _) = broadcast::channel(settings.event_capacity.max(1));
        let worker = CoordinatorWorker {
            dependencies,
            filter: EventFilter::new(settings.detection_action.clone(), settings.exported_receiver),
            settings,
            dispatcher: dispatcher.clone(),
            events: events.clone(),
            active: None,
            next_flow_id: 1,
        };
        tokio::spawn(worker.run(inbox));
        Arc::new(Self { dispatcher, events })
    }

    pub fn request(&self) -> PendingConsent {
        self.request_with(ConsentRequestOptions::default())
    }

    pub fn request_with(&self, options: ConsentRequestOptions) -> PendingConsent {
        let (reply, rx) = oneshot::channel();
        if !self
            .dispatcher
            .send(CoordinatorInput::Request { options, reply })
        {
            debug!("consent: request after coordinator stopped");
        }
        PendingConsent { rx }
    }

    /// Results are applied only when `request_code` matches the live flow's launch.
    pub fn deliver_approval_result(&self, request_code: i32, result: RawApprovalResult) {
        if !self.dispatcher.send(CoordinatorInput::ApprovalResult {
            request_code,
            result,
        }) {
            debug!("consent: approval result after coordinator stopped request_code={request_code}");
        }
    }

    pub async fn snapshot(&self) -> Option<FlowSnapshot> {
        let (reply, rx) = oneshot::channel();
        if !self.dispatcher.send(CoordinatorInput::Snapshot { reply }) {
            return None;
        }
        rx.await.ok().flatten()
    }

    pub async fn shutdown(&self) {
        let (reply, rx) = oneshot::channel();
        if self.dispatcher.send(CoordinatorInput::Shutdown { reply }) {
            let _ = rx.await;
        }
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ConsentEvent> {
        self.events.subscribe()
    }
}

impl Drop for RequestCoordinator {
    fn drop(&mut self) {
        let (reply, _) = oneshot::channel();
        let _ = self.dispatcher.send(CoordinatorInput::Shutdown { reply });
    }
}

pub(crate) struct PendingRequest {
    request_id: RequestId,
    created_at: DateTime<Utc>,
    completion: Option<oneshot::Sender<ConsentResult>>,
}

impl PendingRequest {
    pub(crate) fn new(request_id: RequestId, completion: oneshot::Sender<ConsentResult>) -> Self {
        Self {
            request_id,
            created_at: Utc::now(),
            completion: Some(completion),
        }
    }

    /// Only the first call reaches the caller; later calls return false.
    pub(crate) fn resolve(&mut self, result: ConsentResult) -> bool {
        let Some(completion) = self.completion.take() else {
            debug!(
                "consent: dropping duplicate resolution request={}",
                self.request_id
            );
            return false;
        };

        if completion.send(result).is_err() {
            debug!(
                "consent: caller stopped waiting request={}",
                self.request_id
            );
        }
        true
    }

    pub(crate) fn is_resolved(&self) -> bool {
        self.completion.is_none()
    }
}

impl Drop for PendingRequest {
    fn drop(&mut self) {
        if !self.is_resolved() {
            self.resolve(Err(ConsentFailure::new(
                FailureKind::Aborted,
                "request dropped before resolution",
            )));
        }
    }
}

// Field order is drop order: the listener is released before the caller is answered.
struct ActiveFlow {
    flow: ConsentFlowStateMachine,
    pending: PendingRequest,
}

struct CoordinatorWorker {
    dependencies: ConsentDependencies,
    settings: ConsentSettings,
    filter: EventFilter,
    dispatcher: Dispatcher,
    events: broadcast::Sender<ConsentEvent>,
    active: Option<ActiveFlow>,
    next_flow_id: u64,
}

impl CoordinatorWorker {
    async fn run(mut self, mut inbox: mpsc::UnboundedReceiver<CoordinatorInput>) {
        while let Some(input) = inbox.recv().await {
            match input {
                CoordinatorInput::Request { options, reply } => self.start_request(options, reply),
                CoordinatorInput::Flow { flow_id, input } => self.route(flow_id, input),
                CoordinatorInput::ApprovalResult {
                    request_code,
                    result,
                } => self.deliver_approval_result(request_code, result),
                CoordinatorInput::Snapshot { reply } => {
                    let _ = reply.send(self.snapshot());
                }
                CoordinatorInput::Shutdown { reply } => {
                    self.cancel_active(ConsentFailure::new(
                        FailureKind::Aborted,
                        "host shut down",
                    ));
                    let _ = reply.send(());
                    break;
                }
            }
        }

        self.cancel_active(ConsentFailure::new(
            FailureKind::Aborted,
            "consent coordinator stopped",
        ));
        info!("consent: coordinator stopped");
    }

    fn start_request(
        &mut self,
        options: ConsentRequestOptions,
        reply: oneshot::Sender<ConsentResult>,
    ) {
        let request_id = RequestId::new();
        info!("consent: request received request={request_id}");

        if let Availability::Unavailable { code, reason } =
            self.dependencies.probe.availability()
        {
            warn!("consent: dependency unavailable request={request_id} code={code} reason={reason}");
            let mut pending = PendingRequest::new(request_id, reply);
            pending.resolve(Err(classifier::dependency_unavailable(code, &reason)));
            self.emit(ConsentEvent::Resolved {
                request_id,
                failure: Some(FailureKind::DependencyUnavailable),
            });
            return;
        }

        self.cancel_active(ConsentFailure::new(
            FailureKind::Superseded,
            "new consent request started",
        ));

        let flow_id = FlowId(self.next_flow_id);
        self.next_flow_id += 1;
        let flow = ConsentFlowStateMachine::new(
            flow_id,
            Arc::clone(&self.dependencies.source),
            FlowContext {
                platform: Arc::clone(&self.dependencies.platform),
                dispatcher: self.dispatcher.clone(),
                filter: self.filter.clone(),
                approval_request_code: approval_code_for(
                    self.settings.approval_request_code,
                    flow_id,
                ),
            },
        );
        self.active = Some(ActiveFlow {
            flow,
            pending: PendingRequest::new(request_id, reply),
        });
        self.apply(FlowInput::Start {
            sender_hint: options.sender_hint,
        });
    }

    fn route(&mut self, flow_id: FlowId, input: FlowInput) {
        let is_live = self
            .active
            .as_ref()
            .is_some_and(|active| active.flow.flow_id() == flow_id);
        if is_live {
            self.apply(input);
        } else {
            debug!("consent: discarding input for inactive flow={flow_id}");
        }
    }

    fn deliver_approval_result(&mut self, request_code: i32, result: RawApprovalResult) {
        let Some(active) = self.active.as_ref() else {
            debug!("consent: approval result with no request in flight request_code={request_code}");
            return;
        };
        if active.flow.approval_request_code() != Some(request_code) {
            debug!(
                "consent: ignoring approval result request_code={request_code} flow={} expected={:?}",
                active.flow.flow_id(),
                active.flow.approval_request_code()
            );
            return;
        }
        let outcome = classifier::classify_approval_result(&result);
        self.apply(FlowInput::ApprovalCompleted(outcome));
    }

    fn cancel_active(&mut self, failure: ConsentFailure) {
        if self.active.is_some() {
            self.apply(FlowInput::Cancel(failure));
        }
    }

    fn apply(&mut self, input: FlowInput) {
        let Some(active) = self.active.as_mut() else {
            return;
        };

        let request_id = active.pending.request_id;
        let before = active.flow.state().tag();
        let resolution = active.flow.handle(input);
        let after = active.flow.state().tag();
        if before != after && after != FlowStateTag::Resolved {
            self.emit(ConsentEvent::StateChanged {
                request_id,
                state: after,
            });
        }

        let Some(result) = resolution else {
            return;
        };
        let failure = result.as_ref().err().map(|failure| failure.kind);
        if let Some(mut finished) = self.active.take() {
            match &result {
                Ok(text) => info!(
                    "consent: request resolved request={request_id} text_len={}",
                    text.len()
                ),
                Err(failure) => info!("consent: request failed request={request_id}: {failure}"),
            }
            finished.pending.resolve(result);
        }
        self.emit(ConsentEvent::Resolved {
            request_id,
            failure,
        });
    }

    fn snapshot(&self) -> Option<FlowSnapshot> {
        self.active.as_ref().map(|active| FlowSnapshot {
            request_id: active.pending.request_id,
            flow_id: active.flow.flow_id(),
            state: active.flow.state().tag(),
            created_at: active.pending.created_at,
            subscription_open: active.flow.subscription_open(),
            approval_request_code: active.flow.approval_request_code(),
        })
    }

    fn emit(&self, event: ConsentEvent) {
        let _ = self.events.send(event);
    }
}

fn approval_code_for(base: i32, flow_id: FlowId) -> i32 {
    let offset = flow_id.0.saturating_sub(1) % APPROVAL_CODE_SPAN;
    base.wrapping_add(offset as i32)
}

#[cfg(test)]
#[path = "tests/coordinator_tests.rs"]
mod tests;
