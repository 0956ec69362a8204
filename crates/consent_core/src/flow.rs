use std::{collections::VecDeque, sync::Arc};

use shared::{
    domain::{FlowId, FlowStateTag},
    error::{ConsentFailure, ConsentResult},
    protocol::{ApprovalLaunch, ApprovalOutcome, ApprovalTrigger, DetectionEvent},
};
use tracing::{debug, info, warn};

use crate::{
    classifier::{self, DetectionVerdict},
    dispatch::Dispatcher,
    subscription::{DetectionListener, EventFilter, EventSubscription},
    ConsentPlatform, DetectionEventSource,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowInput {
    Start { sender_hint: Option<String> },
    SubscriptionFailed(String),
    WatchFailed(String),
    Detected(DetectionEvent),
    ApprovalLaunchFailed(String),
    ApprovalCompleted(ApprovalOutcome),
    Cancel(ConsentFailure),
}

impl FlowInput {
    fn label(&self) -> &'static str {
        match self {
            Self::Start { .. } => "start",
            Self::SubscriptionFailed(_) => "subscription_failed",
            Self::WatchFailed(_) => "watch_failed",
            Self::Detected(_) => "detected",
            Self::ApprovalLaunchFailed(_) => "approval_launch_failed",
            Self::ApprovalCompleted(_) => "approval_completed",
            Self::Cancel(_) => "cancel",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowState {
    Idle,
    Watching,
    Approving,
    Resolved(ConsentResult),
}

impl FlowState {
    pub fn tag(&self) -> FlowStateTag {
        match self {
            Self::Idle => FlowStateTag::Idle,
            Self::Watching => FlowStateTag::Watching,
            Self::Approving => FlowStateTag::Approving,
            Self::Resolved(_) => FlowStateTag::Resolved,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Resolved(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowEffect {
    OpenSubscription,
    BeginWatching { sender_hint: Option<String> },
    LaunchApproval(ApprovalTrigger),
    CloseSubscription,
    Resolve(ConsentResult),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub next: FlowState,
    pub effects: Vec<FlowEffect>,
}

impl Transition {
    fn to(next: FlowState, effects: Vec<FlowEffect>) -> Self {
        Self { next, effects }
    }

    fn resolve(result: ConsentResult) -> Self {
        Self::to(
            FlowState::Resolved(result.clone()),
            vec![FlowEffect::CloseSubscription, FlowEffect::Resolve(result)],
        )
    }

    fn fail(failure: ConsentFailure) -> Self {
        Self::resolve(Err(failure))
    }
}

/// Returns `None` when `input` has no effect in `state`.
pub fn transition(state: &FlowState, input: FlowInput) -> Option<Transition> {
    use FlowState::{Approving, Idle, Resolved, Watching};

    match (state, input) {
        (Resolved(_), _) => None,
        (_, FlowInput::Cancel(failure)) => Some(Transition::fail(failure)),
        (Idle, FlowInput::Start { sender_hint }) => Some(Transition::to(
            Watching,
            vec![
                FlowEffect::OpenSubscription,
                FlowEffect::BeginWatching { sender_hint },
            ],
        )),
        (Idle, _) => None,
        (_, FlowInput::Start { .. }) => None,
        (_, FlowInput::SubscriptionFailed(message)) | (_, FlowInput::WatchFailed(message)) => {
            Some(Transition::fail(classifier::start_failed(&message)))
        }
        (Watching, FlowInput::Detected(event)) => {
            let status = event.status?;
            Some(match classifier::classify_detection(status, event.approval_trigger) {
                DetectionVerdict::LaunchApproval(trigger) => {
                    Transition::to(Approving, vec![FlowEffect::LaunchApproval(trigger)])
                }
                DetectionVerdict::Fail(failure) => Transition::fail(failure),
            })
        }
        (Approving, FlowInput::Detected(_)) => None,
        (Approving, FlowInput::ApprovalLaunchFailed(message)) => {
            Some(Transition::fail(classifier::approval_launch_failed(&message)))
        }
        (Approving, FlowInput::ApprovalCompleted(outcome)) => {
            Some(Transition::resolve(classifier::classify_approval(outcome)))
        }
        (Watching, FlowInput::ApprovalLaunchFailed(_))
        | (Watching, FlowInput::ApprovalCompleted(_)) => None,
    }
}

pub(crate) struct FlowContext {
    pub(crate) platform: Arc<dyn ConsentPlatform>,
    pub(crate) dispatcher: Dispatcher,
    pub(crate) filter: EventFilter,
    pub(crate) approval_request_code: i32,
}

pub struct ConsentFlowStateMachine {
    flow_id: FlowId,
    state: FlowState,
    subscription: EventSubscription,
    launched_request_code: Option<i32>,
    context: FlowContext,
}

impl ConsentFlowStateMachine {
    pub(crate) fn new(
        flow_id: FlowId,
        source: Arc<dyn DetectionEventSource>,
        context: FlowContext,
    ) -> Self {
        Self {
            flow_id,
            state: FlowState::Idle,
            subscription: EventSubscription::new(source),
            launched_request_code: None,
            context,
        }
    }

    pub fn flow_id(&self) -> FlowId {
        self.flow_id
    }

    pub fn state(&self) -> &FlowState {
        &self.state
    }

    pub fn subscription_open(&self) -> bool {
        self.subscription.is_open()
    }

    /// Request code of this flow's approval step, once it has been launched.
    pub fn approval_request_code(&self) -> Option<i32> {
        self.launched_request_code
    }

    /// Returns the result when this call moved the flow into `Resolved`.
    pub(crate) fn handle(&mut self, input: FlowInput) -> Option<ConsentResult> {
        let mut queue = VecDeque::from([input]);
        let mut resolution = None;

        while let Some(input) = queue.pop_front() {
            let label = input.label();
            let Some(Transition { next, effects }) = transition(&self.state, input) else {
                debug!(
                    "consent: flow={} ignoring input={label} state={:?}",
                    self.flow_id,
                    self.state.tag()
                );
                continue;
            };

            debug!(
                "consent: flow={} input={label} {:?} -> {:?}",
                self.flow_id,
                self.state.tag(),
                next.tag()
            );
            self.state = next;

            for effect in effects {
                match self.execute(effect) {
                    Ok(Some(result)) => resolution = Some(result),
                    Ok(None) => {}
                    Err(follow_up) => {
                        queue.push_back(follow_up);
                        break;
                    }
                }
            }
        }

        resolution
    }

    fn execute(&mut self, effect: FlowEffect) -> Result<Option<ConsentResult>, FlowInput> {
        match effect {
            FlowEffect::OpenSubscription => {
                let listener = DetectionListener::new(
                    self.flow_id,
                    self.context.filter.action.clone(),
                    self.context.dispatcher.clone(),
                );
                self.subscription
                    .open(&self.context.filter, listener)
                    .map_err(|err| {
                        warn!("consent: flow={} {err}", self.flow_id);
                        FlowInput::SubscriptionFailed(err.to_string())
                    })?;
                Ok(None)
            }
            FlowEffect::BeginWatching { sender_hint } => {
                self.spawn_begin_watching(sender_hint);
                Ok(None)
            }
            FlowEffect::LaunchApproval(trigger) => {
                let request_code = self.context.approval_request_code;
                let launch = ApprovalLaunch {
                    request_code,
                    trigger,
                };
                self.context.platform.launch_approval(launch).map_err(|err| {
                    warn!(
                        "consent: flow={} approval launch failed: {err:#}",
                        self.flow_id
                    );
                    FlowInput::ApprovalLaunchFailed(format!("{err:#}"))
                })?;
                self.launched_request_code = Some(request_code);
                info!(
                    "consent: flow={} approval step launched request_code={request_code}",
                    self.flow_id
                );
                Ok(None)
            }
            FlowEffect::CloseSubscription => {
                self.subscription.close();
                Ok(None)
            }
            FlowEffect::Resolve(result) => Ok(Some(result)),
        }
    }

    fn spawn_begin_watching(&self, sender_hint: Option<String>) {
        let platform = Arc::clone(&self.context.platform);
        let dispatcher = self.context.dispatcher.clone();
        let flow_id = self.flow_id;
        tokio::spawn(async move {
            match platform.begin_watching(sender_hint).await {
                Ok(()) => info!("consent: flow={flow_id} watching for a qualifying message"),
                Err(err) => {
                    warn!("consent: flow={flow_id} failed to begin watching: {err:#}");
                    dispatcher.route(flow_id, FlowInput::WatchFailed(format!("{err:#}")));
                }
            }
        });
    }
}

#[cfg(test)]
#[path = "tests/flow_tests.rs"]
mod tests;
