use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use serde_json::Value;

use dualmint_core::{
    BroadcastChannelPort, BroadcastListener, BroadcastMessage, ContextId, ListenerId, PortError,
};

/// In-process message channel shared by one execution context and the
/// wallet extension posting into it.
#[derive(Clone)]
pub struct BroadcastBus {
    context: ContextId,
    inner: Arc<Mutex<BusState>>,
}

#[derive(Default)]
struct BusState {
    listeners: BTreeMap<ListenerId, BroadcastListener>,
    next_id: ListenerId,
    posted: u64,
}

impl BroadcastBus {
    pub fn new(context: impl Into<String>) -> Self {
        Self {
            context: ContextId(context.into()),
            inner: Arc::new(Mutex::new(BusState::default())),
        }
    }

    /// Posts a message originating from this bus's own context.
    pub fn post(&self, payload: Value) -> Result<usize, PortError> {
        self.post_from(self.context.clone(), payload)
    }

    /// Posts on behalf of another context (a frame, another tab).
    pub fn post_from(&self, origin: ContextId, payload: Value) -> Result<usize, PortError> {
        let listeners: Vec<BroadcastListener> = {
            let mut g = self
                .inner
                .lock()
                .map_err(|e| PortError::Transport(format!("broadcast lock poisoned: {e}")))?;
            g.posted = g.posted.saturating_add(1);
            g.listeners.values().cloned().collect()
        };
        let message = BroadcastMessage { origin, payload };
        for listener in &listeners {
            listener(message.clone());
        }
        Ok(listeners.len())
    }

    pub fn listener_count(&self) -> Result<usize, PortError> {
        let g = self
            .inner
            .lock()
            .map_err(|e| PortError::Transport(format!("broadcast lock poisoned: {e}")))?;
        Ok(g.listeners.len())
    }
}

impl BroadcastChannelPort for BroadcastBus {
    fn context_id(&self) -> ContextId {
        self.context.clone()
    }

    fn subscribe(&self, listener: BroadcastListener) -> Result<ListenerId, PortError> {
        let mut g = self
            .inner
            .lock()
            .map_err(|e| PortError::Transport(format!("broadcast lock poisoned: {e}")))?;
        g.next_id = g.next_id.saturating_add(1);
        let id = g.next_id;
        g.listeners.insert(id, listener);
        Ok(id)
    }

    fn unsubscribe(&self, id: ListenerId) -> Result<(), PortError> {
        let mut g = self
            .inner
            .lock()
            .map_err(|e| PortError::Transport(format!("broadcast lock poisoned: {e}")))?;
        g.listeners
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| PortError::NotFound(format!("broadcast listener {id}")))
    }
}
