use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use shared::{
    domain::{ListenerHandle, StatusCode},
    protocol::{ApprovalLaunch, ApprovalTrigger, DetectionEvent},
};
use tokio::sync::broadcast;

use crate::{
    config::ConsentSettings, ConsentDependencies, ConsentEvent, ConsentPlatform,
    DependencyProbe, DetectionEventSource, DetectionListener, EventFilter, RequestCoordinator,
    Availability,
};

pub(crate) const ACTION: &str = "test.sms.retrieved";
pub(crate) const REQUEST_CODE: i32 = 1001;

pub(crate) fn test_settings() -> ConsentSettings {
    ConsentSettings {
        detection_action: ACTION.to_string(),
        exported_receiver: true,
        approval_request_code: REQUEST_CODE,
        event_capacity: 64,
    }
}

pub(crate) fn detected(status: StatusCode) -> DetectionEvent {
    DetectionEvent::new(ACTION, status)
}

pub(crate) fn detected_with_trigger(token: &str) -> DetectionEvent {
    DetectionEvent::new(ACTION, StatusCode::SUCCESS).with_trigger(ApprovalTrigger(token.into()))
}

#[derive(Default)]
struct SourceState {
    next_handle: u64,
    listeners: HashMap<ListenerHandle, DetectionListener>,
    retired: Vec<DetectionListener>,
    journal: Vec<String>,
    filters: Vec<EventFilter>,
    max_open: usize,
    unregister_calls: usize,
    fail_register: Option<String>,
    events: Option<broadcast::Receiver<ConsentEvent>>,
}

impl SourceState {
    fn drain_events(&mut self) {
        let Some(events) = self.events.as_mut() else {
            return;
        };
        let mut drained = Vec::new();
        while let Ok(event) = events.try_recv() {
            drained.push(match event {
                ConsentEvent::StateChanged { state, .. } => format!("state:{state:?}"),
                ConsentEvent::Resolved { failure, .. } => match failure {
                    Some(kind) => format!("resolved:{kind:?}"),
                    None => "resolved:ok".to_string(),
                },
            });
        }
        self.journal.extend(drained);
    }
}

#[derive(Default)]
pub(crate) struct FakeSource {
    state: Mutex<SourceState>,
}

impl FakeSource {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn failing(message: &str) -> Arc<Self> {
        let source = Self::default();
        source.state.lock().expect("source lock").fail_register = Some(message.to_string());
        Arc::new(source)
    }

    pub(crate) fn record_events(&self, events: broadcast::Receiver<ConsentEvent>) {
        self.state.lock().expect("source lock").events = Some(events);
    }

    pub(crate) fn broadcast(&self, event: DetectionEvent) -> usize {
        let listeners: Vec<_> = {
            let state = self.state.lock().expect("source lock");
            state.listeners.values().cloned().collect()
        };
        listeners
            .iter()
            .filter(|listener| listener.deliver(event.clone()))
            .count()
    }

    /// Delivers through listeners that were already unregistered.
    pub(crate) fn deliver_to_retired(&self, event: DetectionEvent) {
        let retired = self.state.lock().expect("source lock").retired.clone();
        for listener in retired {
            listener.deliver(event.clone());
        }
    }

    pub(crate) fn is_registered(&self, handle: ListenerHandle) -> bool {
        self.state
            .lock()
            .expect("source lock")
            .listeners
            .contains_key(&handle)
    }

    pub(crate) fn open_count(&self) -> usize {
        self.state.lock().expect("source lock").listeners.len()
    }

    pub(crate) fn max_open(&self) -> usize {
        self.state.lock().expect("source lock").max_open
    }

    pub(crate) fn register_count(&self) -> usize {
        self.state.lock().expect("source lock").filters.len()
    }

    pub(crate) fn unregister_calls(&self) -> usize {
        self.state.lock().expect("source lock").unregister_calls
    }

    pub(crate) fn filters(&self) -> Vec<EventFilter> {
        self.state.lock().expect("source lock").filters.clone()
    }

    pub(crate) fn journal(&self) -> Vec<String> {
        let mut state = self.state.lock().expect("source lock");
        state.drain_events();
        state.journal.clone()
    }
}

impl DetectionEventSource for FakeSource {
    fn register(&self, filter: &EventFilter, listener: DetectionListener) -> Result<ListenerHandle> {
        let mut state = self.state.lock().expect("source lock");
        state.drain_events();
        if let Some(message) = &state.fail_register {
            return Err(anyhow!(message.clone()));
        }
        state.next_handle += 1;
        let handle = ListenerHandle(state.next_handle);
        state.filters.push(filter.clone());
        state.listeners.insert(handle, listener);
        state.max_open = state.max_open.max(state.listeners.len());
        state.journal.push(format!("register:{handle}"));
        Ok(handle)
    }

    fn unregister(&self, handle: ListenerHandle) -> Result<()> {
        let mut state = self.state.lock().expect("source lock");
        state.drain_events();
        state.unregister_calls += 1;
        let listener = state
            .listeners
            .remove(&handle)
            .ok_or_else(|| anyhow!("receiver {handle} not registered"))?;
        state.retired.push(listener);
        state.journal.push(format!("unregister:{handle}"));
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct FakePlatform {
    watch_failure: Mutex<Option<String>>,
    launch_failure: Mutex<Option<String>>,
    hints: Mutex<Vec<Option<String>>>,
    launches: Mutex<Vec<ApprovalLaunch>>,
}

impl FakePlatform {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn failing_watch(message: &str) -> Arc<Self> {
        let platform = Self::default();
        *platform.watch_failure.lock().expect("platform lock") = Some(message.to_string());
        Arc::new(platform)
    }

    pub(crate) fn failing_launch(message: &str) -> Arc<Self> {
        let platform = Self::default();
        *platform.launch_failure.lock().expect("platform lock") = Some(message.to_string());
        Arc::new(platform)
    }

    pub(crate) fn launches(&self) -> Vec<ApprovalLaunch> {
        self.launches.lock().expect("platform lock").clone()
    }

    pub(crate) fn hints(&self) -> Vec<Option<String>> {
        self.hints.lock().expect("platform lock").clone()
    }
}

#[async_trait]
impl ConsentPlatform for FakePlatform {
    async fn begin_watching(&self, sender_hint: Option<String>) -> Result<()> {
        self.hints.lock().expect("platform lock").push(sender_hint);
        match self.watch_failure.lock().expect("platform lock").clone() {
            Some(message) => Err(anyhow!(message)),
            None => Ok(()),
        }
    }

    fn launch_approval(&self, launch: ApprovalLaunch) -> Result<()> {
        if let Some(message) = self.launch_failure.lock().expect("platform lock").clone() {
            return Err(anyhow!(message));
        }
        self.launches.lock().expect("platform lock").push(launch);
        Ok(())
    }
}

pub(crate) struct FakeProbe(pub(crate) Availability);

impl DependencyProbe for FakeProbe {
    fn availability(&self) -> Availability {
        self.0.clone()
    }
}

pub(crate) fn start_coordinator(
    source: &Arc<FakeSource>,
    platform: &Arc<FakePlatform>,
) -> Arc<RequestCoordinator> {
    start_coordinator_with_probe(source, platform, Availability::Available)
}

pub(crate) fn start_coordinator_with_probe(
    source: &Arc<FakeSource>,
    platform: &Arc<FakePlatform>,
    availability: Availability,
) -> Arc<RequestCoordinator> {
    let dependencies = ConsentDependencies::new(
        Arc::new(FakeProbe(availability)),
        Arc::clone(source) as Arc<dyn DetectionEventSource>,
        Arc::clone(platform) as Arc<dyn ConsentPlatform>,
    );
    let coordinator = RequestCoordinator::start(dependencies, test_settings());
    source.record_events(coordinator.subscribe_events());
    coordinator
}
