// Connection state machine
//
// Pure transition table from (state, event) to the next state. Pairs that
// are not listed leave the state untouched.

use std::time::Duration;

use super::types::{ConnectionState, TransportState};

/// What to do when an established connection drops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectPolicy {
    /// Give the transport `window` to recover before failing
    Reconnect { window: Duration },
    /// Fail as soon as the transport reports a disconnect
    Fail,
}

impl DisconnectPolicy {
    /// A zero window means no recovery at all.
    pub fn from_window(window: Duration) -> Self {
        if window.is_zero() {
            DisconnectPolicy::Fail
        } else {
            DisconnectPolicy::Reconnect { window }
        }
    }

    pub fn window(&self) -> Option<Duration> {
        match self {
            DisconnectPolicy::Reconnect { window } => Some(*window),
            DisconnectPolicy::Fail => None,
        }
    }
}

impl Default for DisconnectPolicy {
    fn default() -> Self {
        DisconnectPolicy::Reconnect {
            window: Duration::from_secs(10),
        }
    }
}

/// Inputs to the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// Media acquired and the transport reports connected
    TransportConnected,
    /// Transport still negotiating
    TransportConnecting,
    TransportDisconnected,
    TransportFailed,
    MediaFailed,
    /// The reconnect window elapsed without recovery
    RecoveryTimedOut,
}

impl ConnectionEvent {
    /// Translate a raw transport state. `Closed` is produced by our own
    /// teardown and carries no connection meaning.
    pub fn from_transport(state: TransportState) -> Option<Self> {
        match state {
            TransportState::New | TransportState::Connecting => {
                Some(ConnectionEvent::TransportConnecting)
            }
            TransportState::Connected => Some(ConnectionEvent::TransportConnected),
            TransportState::Disconnected => Some(ConnectionEvent::TransportDisconnected),
            TransportState::Failed => Some(ConnectionEvent::TransportFailed),
            TransportState::Closed => None,
        }
    }
}

/// Outcome of applying one event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: ConnectionState,
    pub to: ConnectionState,
}

impl Transition {
    pub fn changed(&self) -> bool {
        self.from != self.to
    }
}

/// The transition table.
pub fn next_state(
    state: ConnectionState,
    event: ConnectionEvent,
    policy: DisconnectPolicy,
) -> ConnectionState {
    use ConnectionEvent as E;
    use ConnectionState as S;

    match (state, event) {
        (S::Connecting, E::TransportConnected) => S::Connected,
        (S::Connecting, E::MediaFailed | E::TransportFailed | E::TransportDisconnected) => {
            S::Failed
        }

        (S::Connected, E::TransportDisconnected) => match policy {
            DisconnectPolicy::Reconnect { .. } => S::Reconnecting,
            DisconnectPolicy::Fail => S::Failed,
        },
        (S::Connected, E::TransportFailed) => S::Failed,

        (S::Reconnecting, E::TransportConnected) => S::Connected,
        (S::Reconnecting, E::RecoveryTimedOut | E::TransportFailed) => S::Failed,

        // Failed is terminal for an attempt
        (current, _) => current,
    }
}

/// Connection state of a single call attempt
#[derive(Debug, Clone)]
pub struct ConnectionStateMachine {
    state: ConnectionState,
    policy: DisconnectPolicy,
}

impl ConnectionStateMachine {
    pub fn new(policy: DisconnectPolicy) -> Self {
        Self {
            state: ConnectionState::Connecting,
            policy,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn policy(&self) -> DisconnectPolicy {
        self.policy
    }

    pub fn apply(&mut self, event: ConnectionEvent) -> Transition {
        let from = self.state;
        self.state = next_state(from, event, self.policy);
        if from != self.state {
            log::debug!("Connection {} -> {} on {:?}", from, self.state, event);
        }
        Transition {
            from,
            to: self.state,
        }
    }

    pub fn is_failed(&self) -> bool {
        self.state == ConnectionState::Failed
    }
}
