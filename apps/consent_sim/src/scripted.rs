use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Mutex,
    },
};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use consent_core::{
    Availability, ConsentPlatform, DependencyProbe, DetectionEventSource, DetectionListener,
    EventFilter,
};
use shared::{domain::ListenerHandle, protocol::ApprovalLaunch, protocol::DetectionEvent};
use tracing::info;

#[derive(Default)]
pub struct ScriptedSource {
    next_handle: AtomicU64,
    listeners: Mutex<HashMap<ListenerHandle, DetectionListener>>,
}

impl ScriptedSource {
    pub fn broadcast(&self, event: DetectionEvent) {
        let listeners: Vec<_> = match self.listeners.lock() {
            Ok(guard) => guard.values().cloned().collect(),
            Err(poisoned) => poisoned.into_inner().values().cloned().collect(),
        };
        info!(
            "sim: broadcasting action={} status={:?} listeners={}",
            event.action,
            event.status,
            listeners.len()
        );
        for listener in listeners {
            listener.deliver(event.clone());
        }
    }
}

impl DetectionEventSource for ScriptedSource {
    fn register(&self, filter: &EventFilter, listener: DetectionListener) -> Result<ListenerHandle> {
        let handle = ListenerHandle(self.next_handle.fetch_add(1, Ordering::Relaxed) + 1);
        self.listeners
            .lock()
            .map_err(|_| anyhow!("listener table poisoned"))?
            .insert(handle, listener);
        info!(
            "sim: receiver registered handle={handle} action={} exported={}",
            filter.action, filter.exported
        );
        Ok(handle)
    }

    fn unregister(&self, handle: ListenerHandle) -> Result<()> {
        self.listeners
            .lock()
            .map_err(|_| anyhow!("listener table poisoned"))?
            .remove(&handle)
            .map(|_| info!("sim: receiver unregistered handle={handle}"))
            .ok_or_else(|| anyhow!("receiver {handle} not registered"))
    }
}

pub struct ScriptedPlatform {
    pub fail_watch: bool,
    pub fail_launch: bool,
}

#[async_trait]
impl ConsentPlatform for ScriptedPlatform {
    async fn begin_watching(&self, sender_hint: Option<String>) -> Result<()> {
        if self.fail_watch {
            return Err(anyhow!("API_NOT_CONNECTED: consent service rejected the call"));
        }
        info!("sim: watching for consent message sender={sender_hint:?}");
        Ok(())
    }

    fn launch_approval(&self, launch: ApprovalLaunch) -> Result<()> {
        if self.fail_launch {
            return Err(anyhow!("no activity found to handle {}", launch.trigger.0));
        }
        info!(
            "sim: showing approval step request_code={} trigger={}",
            launch.request_code, launch.trigger.0
        );
        Ok(())
    }
}

pub struct ScriptedProbe {
    pub available: bool,
}

impl DependencyProbe for ScriptedProbe {
    fn availability(&self) -> Availability {
        if self.available {
            Availability::Available
        } else {
            Availability::Unavailable {
                code: 2,
                reason: "platform services need an update".to_string(),
            }
        }
    }
}
