use shared::{domain::FlowId, error::ConsentResult, protocol::RawApprovalResult};
use tokio::sync::{mpsc, oneshot};

use crate::{
    coordinator::{ConsentRequestOptions, FlowSnapshot},
    flow::FlowInput,
};

pub(crate) enum CoordinatorInput {
    Request {
        options: ConsentRequestOptions,
        reply: oneshot::Sender<ConsentResult>,
    },
    Flow {
        flow_id: FlowId,
        input: FlowInput,
    },
    ApprovalResult {
        request_code: i32,
        result: RawApprovalResult,
    },
    Snapshot {
        reply: oneshot::Sender<Option<FlowSnapshot>>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

#[derive(Debug, Clone)]
pub(crate) struct Dispatcher {
    tx: mpsc::UnboundedSender<CoordinatorInput>,
}

impl Dispatcher {
    pub(crate) fn channel() -> (Self, mpsc::UnboundedReceiver<CoordinatorInput>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Returns false once the dispatcher task has stopped.
    pub(crate) fn send(&self, input: CoordinatorInput) -> bool {
        self.tx.send(input).is_ok()
    }

    pub(crate) fn route(&self, flow_id: FlowId, input: FlowInput) -> bool {
        self.send(CoordinatorInput::Flow { flow_id, input })
    }
}
