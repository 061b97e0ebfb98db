use serde::{Deserialize, Serialize};

use crate::ports::PortError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Idle,
    Connecting,
    Connected { network_correct: bool },
    Disconnected,
}

impl SessionState {
    pub fn is_connected(self) -> bool {
        matches!(self, SessionState::Connected { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionAction {
    BeginConnect,
    ConnectSucceeded { network_correct: bool },
    ConnectFailed,
    NetworkChecked { correct: bool },
    AccountCleared,
    Disconnect,
    /// The selected chain kind changed.
    Reset,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateTransition {
    pub from: SessionState,
    pub to: SessionState,
    pub reason: &'static str,
}

pub fn session_transition(
    state: SessionState,
    action: SessionAction,
) -> Result<(SessionState, StateTransition), PortError> {
    use SessionAction as A;
    use SessionState as S;

    let (to, reason) = match (state, action) {
        (_, A::BeginConnect) => (S::Connecting, "connect requested"),
        (S::Connecting, A::ConnectSucceeded { network_correct }) => {
            (S::Connected { network_correct }, "wallet connected")
        }
        (S::Connecting, A::ConnectFailed) => (S::Disconnected, "connect failed"),
        (S::Connected { .. }, A::NetworkChecked { correct }) => (
            S::Connected {
                network_correct: correct,
            },
            "network re-checked",
        ),
        (S::Connected { .. }, A::AccountCleared) => (S::Disconnected, "wallet locked or revoked"),
        (_, A::Disconnect) => (S::Disconnected, "disconnect requested"),
        (_, A::Reset) => (S::Idle, "chain selection changed"),
        (from, action) => {
            return Err(PortError::Validation(format!(
                "illegal session transition: {from:?} via {action:?}"
            )))
        }
    };

    Ok((
        to,
        StateTransition {
            from: state,
            to,
            reason,
        },
    ))
}
