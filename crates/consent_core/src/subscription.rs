use std::sync::Arc;

use shared::{
    domain::{FlowId, ListenerHandle},
    protocol::DetectionEvent,
};
use thiserror::Error;
use tracing::debug;

use crate::{dispatch::Dispatcher, flow::FlowInput, DetectionEventSource};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventFilter {
    pub action: String,
    pub exported: bool,
}

impl EventFilter {
    pub fn new(action: impl Into<String>, exported: bool) -> Self {
        Self {
            action: action.into(),
            exported,
        }
    }
}

#[derive(Debug, Error)]
pub enum SubscriptionError {
    #[error("detection listener already registered with handle {0}")]
    AlreadyOpen(ListenerHandle),
    #[error("failed to register detection listener: {0}")]
    Register(String),
}

/// Listener handed to the event source. Bound to one flow; deliveries are queued to
/// the coordinator tagged with that flow's id, so a listener that outlives its flow
/// can only ever produce discarded input.
#[derive(Debug, Clone)]
pub struct DetectionListener {
    flow_id: FlowId,
    action: String,
    dispatcher: Dispatcher,
}

impl DetectionListener {
    pub(crate) fn new(flow_id: FlowId, action: impl Into<String>, dispatcher: Dispatcher) -> Self {
        Self {
            flow_id,
            action: action.into(),
            dispatcher,
        }
    }

    pub fn flow_id(&self) -> FlowId {
        self.flow_id
    }

    /// Forwards a broadcast to the owning flow. Returns false when the broadcast was
    /// dropped here: wrong action, no status, or the coordinator is gone.
    pub fn deliver(&self, event: DetectionEvent) -> bool {
        if event.action != self.action {
            debug!(
                "consent: listener flow={} ignoring action={}",
                self.flow_id, event.action
            );
            return false;
        }
        if event.status.is_none() {
            debug!(
                "consent: listener flow={} ignoring broadcast without status",
                self.flow_id
            );
            return false;
        }
        self.dispatcher
            .route(self.flow_id, FlowInput::Detected(event))
    }
}

pub struct EventSubscription {
    source: Arc<dyn DetectionEventSource>,
    handle: Option<ListenerHandle>,
}

impl EventSubscription {
    pub fn new(source: Arc<dyn DetectionEventSource>) -> Self {
        Self {
            source,
            handle: None,
        }
    }

    pub fn open(
        &mut self,
        filter: &EventFilter,
        listener: DetectionListener,
    ) -> Result<ListenerHandle, SubscriptionError> {
        if let Some(handle) = self.handle {
            return Err(SubscriptionError::AlreadyOpen(handle));
        }

        let flow_id = listener.flow_id();
        let handle = self
            .source
            .register(filter, listener)
            .map_err(|err| SubscriptionError::Register(format!("{err:#}")))?;
        debug!(
            "consent: registered detection listener handle={handle} flow={flow_id} action={} exported={}",
            filter.action, filter.exported
        );
        self.handle = Some(handle);
        Ok(handle)
    }

    /// Returns whether this call released a listener.
    pub fn close(&mut self) -> bool {
        let Some(handle) = self.handle.take() else {
            return false;
        };

        match self.source.unregister(handle) {
            Ok(()) => debug!("consent: unregistered detection listener handle={handle}"),
            Err(err) => debug!("consent: ignoring unregister failure handle={handle}: {err:#}"),
        }
        true
    }

    pub fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    pub fn handle(&self) -> Option<ListenerHandle> {
        self.handle
    }
}

impl Drop for EventSubscription {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
#[path = "tests/subscription_tests.rs"]
mod tests;
