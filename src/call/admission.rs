// Incoming call admission
//
// Callee-side gate: nothing touches camera, microphone or network until
// the user accepts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::{CallError, CallResult};
use super::types::{Participant, SessionDescriptor};

/// An incoming call as announced to the callee
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncomingCallOffer {
    pub caller: Participant,
    /// Session the call joins once accepted
    pub descriptor: SessionDescriptor,
    pub received_at: DateTime<Utc>,
}

impl IncomingCallOffer {
    /// Build an offer for `descriptor`; the caller is the remote side.
    pub fn new(descriptor: SessionDescriptor) -> Self {
        Self {
            caller: descriptor.remote().clone(),
            descriptor,
            received_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdmissionState {
    AwaitingDecision,
    Accepted,
    Declined,
}

/// One-shot accept/decline decision
#[derive(Debug, Clone)]
pub struct AdmissionGate {
    offer: IncomingCallOffer,
    state: AdmissionState,
}

impl AdmissionGate {
    pub fn new(offer: IncomingCallOffer) -> Self {
        Self {
            offer,
            state: AdmissionState::AwaitingDecision,
        }
    }

    pub fn offer(&self) -> &IncomingCallOffer {
        &self.offer
    }

    pub fn state(&self) -> AdmissionState {
        self.state
    }

    /// Accept and hand back the session to start.
    pub fn accept(&mut self) -> CallResult<SessionDescriptor> {
        self.decide(AdmissionState::Accepted)?;
        Ok(self.offer.descriptor.clone())
    }

    pub fn decline(&mut self) -> CallResult<()> {
        self.decide(AdmissionState::Declined)
    }

    fn decide(&mut self, decision: AdmissionState) -> CallResult<()> {
        if self.state != AdmissionState::AwaitingDecision {
            return Err(CallError::AlreadyAnswered);
        }
        log::info!("Incoming call from {} {:?}", self.offer.caller.name, decision);
        self.state = decision;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call::types::Role;

    fn offer() -> IncomingCallOffer {
        IncomingCallOffer::new(SessionDescriptor::new(
            "s-9",
            Participant::new("Coach Kim"),
            Participant::new("Alex"),
            600,
            Role::Participant,
        ))
    }

    #[test]
    fn test_caller_is_remote_side() {
        assert_eq!(offer().caller.name, "Coach Kim");
    }

    #[test]
    fn test_accept_once() {
        let mut gate = AdmissionGate::new(offer());
        let descriptor = gate.accept().unwrap();
        assert_eq!(descriptor.id, "s-9");
        assert_eq!(gate.state(), AdmissionState::Accepted);
        assert!(matches!(gate.decline(), Err(CallError::AlreadyAnswered)));
        assert_eq!(gate.state(), AdmissionState::Accepted);
    }

    #[test]
    fn test_decline_is_final() {
        let mut gate = AdmissionGate::new(offer());
        gate.decline().unwrap();
        assert!(matches!(gate.accept(), Err(CallError::AlreadyAnswered)));
        assert_eq!(gate.state(), AdmissionState::Declined);
    }
}
