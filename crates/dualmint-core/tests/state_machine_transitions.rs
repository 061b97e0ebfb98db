use dualmint_core::{session_transition, SessionAction, SessionState};

#[test]
fn connect_happy_path_transitions() {
    let (s1, _) =
        session_transition(SessionState::Idle, SessionAction::BeginConnect).expect("idle -> connecting");
    assert_eq!(s1, SessionState::Connecting);
    let (s2, t) = session_transition(
        s1,
        SessionAction::ConnectSucceeded {
            network_correct: false,
        },
    )
    .expect("connecting -> connected");
    assert_eq!(
        s2,
        SessionState::Connected {
            network_correct: false
        }
    );
    assert_eq!(t.from, SessionState::Connecting);
    let (s3, _) = session_transition(s2, SessionAction::NetworkChecked { correct: true })
        .expect("network re-check");
    assert_eq!(
        s3,
        SessionState::Connected {
            network_correct: true
        }
    );
    assert!(s3.is_connected());
}

#[test]
fn failed_connect_ends_disconnected() {
    let (s1, _) = session_transition(SessionState::Disconnected, SessionAction::BeginConnect)
        .expect("reconnect");
    let (s2, t) = session_transition(s1, SessionAction::ConnectFailed).expect("fail");
    assert_eq!(s2, SessionState::Disconnected);
    assert_eq!(t.reason, "connect failed");
}

#[test]
fn cleared_account_disconnects() {
    let connected = SessionState::Connected {
        network_correct: true,
    };
    let (s, _) = session_transition(connected, SessionAction::AccountCleared).expect("cleared");
    assert_eq!(s, SessionState::Disconnected);
    assert!(!s.is_connected());
}

#[test]
fn reset_and_disconnect_apply_from_any_state() {
    for state in [
        SessionState::Idle,
        SessionState::Connecting,
        SessionState::Connected {
            network_correct: false,
        },
        SessionState::Disconnected,
    ] {
        let (reset, _) = session_transition(state, SessionAction::Reset).expect("reset");
        assert_eq!(reset, SessionState::Idle);
        let (gone, _) = session_transition(state, SessionAction::Disconnect).expect("disconnect");
        assert_eq!(gone, SessionState::Disconnected);
    }
}

#[test]
fn illegal_transitions_are_rejected() {
    let err = session_transition(SessionState::Idle, SessionAction::NetworkChecked { correct: true })
        .expect_err("must fail");
    assert!(err.to_string().contains("illegal session transition"));
    assert!(session_transition(
        SessionState::Disconnected,
        SessionAction::ConnectSucceeded {
            network_correct: true
        }
    )
    .is_err());
    assert!(session_transition(SessionState::Connecting, SessionAction::AccountCleared).is_err());
}
