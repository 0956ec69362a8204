//! Single-flight broker for the verification code consent flow.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use shared::{domain::ListenerHandle, protocol::ApprovalLaunch};

pub mod classifier;
pub mod config;
pub mod coordinator;
mod dispatch;
pub mod flow;
pub mod subscription;

pub use config::{load_settings, ConsentSettings};
pub use coordinator::{
    ConsentEvent, ConsentRequestOptions, FlowSnapshot, PendingConsent, RequestCoordinator,
};
pub use flow::{ConsentFlowStateMachine, FlowInput, FlowState};
pub use subscription::{DetectionListener, EventFilter, EventSubscription, SubscriptionError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Availability {
    Available,
    Unavailable { code: i32, reason: String },
}

pub trait DependencyProbe: Send + Sync {
    fn availability(&self) -> Availability;
}

pub struct MissingDependencyProbe;

impl DependencyProbe for MissingDependencyProbe {
    fn availability(&self) -> Availability {
        Availability::Unavailable {
            code: -1,
            reason: "no dependency probe configured".to_string(),
        }
    }
}

/// `unregister` may fail for handles that are unknown or already released.
pub trait DetectionEventSource: Send + Sync {
    fn register(&self, filter: &EventFilter, listener: DetectionListener)
        -> Result<ListenerHandle>;
    fn unregister(&self, handle: ListenerHandle) -> Result<()>;
}

pub struct MissingDetectionEventSource;

impl DetectionEventSource for MissingDetectionEventSource {
    fn register(
        &self,
        filter: &EventFilter,
        _listener: DetectionListener,
    ) -> Result<ListenerHandle> {
        Err(anyhow!(
            "detection event source is unavailable for action {}",
            filter.action
        ))
    }

    fn unregister(&self, handle: ListenerHandle) -> Result<()> {
        Err(anyhow!("listener {handle} is not registered"))
    }
}

#[async_trait]
pub trait ConsentPlatform: Send + Sync {
    /// Completion only means watching began. Detections arrive through the listener.
    async fn begin_watching(&self, sender_hint: Option<String>) -> Result<()>;

    fn launch_approval(&self, launch: ApprovalLaunch) -> Result<()>;
}

pub struct MissingConsentPlatform;

#[async_trait]
impl ConsentPlatform for MissingConsentPlatform {
    async fn begin_watching(&self, _sender_hint: Option<String>) -> Result<()> {
        Err(anyhow!("consent platform is unavailable"))
    }

    fn launch_approval(&self, _launch: ApprovalLaunch) -> Result<()> {
        Err(anyhow!("consent platform is unavailable"))
    }
}

#[derive(Clone)]
pub struct ConsentDependencies {
    pub probe: Arc<dyn DependencyProbe>,
    pub source: Arc<dyn DetectionEventSource>,
    pub platform: Arc<dyn ConsentPlatform>,
}

impl ConsentDependencies {
    pub fn new(
        probe: Arc<dyn DependencyProbe>,
        source: Arc<dyn DetectionEventSource>,
        platform: Arc<dyn ConsentPlatform>,
    ) -> Self {
        Self {
            probe,
            source,
            platform,
        }
    }
}

impl Default for ConsentDependencies {
    fn default() -> Self {
        Self::new(
            Arc::new(MissingDependencyProbe),
            Arc::new(MissingDetectionEventSource),
            Arc::new(MissingConsentPlatform),
        )
    }
}

#[cfg(test)]
#[path = "tests/support.rs"]
mod test_support;

#[cfg(test)]
#[path = "tests/property_tests.rs"]
mod property_tests;
