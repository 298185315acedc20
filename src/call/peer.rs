// Peer connection controller
//
// Wraps one transport object: attaches every local track, starts
// negotiation and closes exactly once.

use async_trait::async_trait;
use log::{debug, info, warn};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::error::{CallError, CallResult};
use super::media::LocalStream;
use super::types::IceCandidate;
use super::{PeerTransport, SignalingChannel, TransportEvent, TransportFactory};
use crate::config::IceServerConfig;

/// Owns the transport for a single call attempt.
///
/// Construction requires a [`LocalStream`], so a transport can never exist
/// before local media was acquired.
pub struct PeerConnectionController {
    transport: Box<dyn PeerTransport>,
    attached: usize,
    closed: bool,
}

impl PeerConnectionController {
    /// Create the transport, attach all local tracks and begin negotiation.
    ///
    /// If attaching or negotiating fails, or `cancel` fires first, the
    /// half-built transport is closed before the error is returned.
    /// Cancellation yields [`CallError::Cancelled`].
    pub async fn create_connection(
        factory: &dyn TransportFactory,
        ice_servers: &[IceServerConfig],
        local: &LocalStream,
        events: mpsc::UnboundedSender<TransportEvent>,
        cancel: &CancellationToken,
    ) -> CallResult<Self> {
        let transport = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(CallError::Cancelled),
            created = factory.create(ice_servers, events) => created?,
        };
        let mut controller = Self {
            transport,
            attached: 0,
            closed: false,
        };

        let negotiated = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(CallError::Cancelled),
            result = controller.attach_and_negotiate(local) => result,
        };
        if let Err(e) = negotiated {
            controller.close().await;
            return Err(e);
        }

        info!(
            "Peer connection created with {} local tracks from {}",
            controller.attached,
            local.id()
        );
        Ok(controller)
    }

    async fn attach_and_negotiate(&mut self, local: &LocalStream) -> CallResult<()> {
        for track in local.track_infos() {
            self.transport.add_track(&track).await?;
            self.attached += 1;
            debug!("Attached local {} track {}", track.kind, track.id);
        }
        self.transport.start_negotiation().await
    }

    pub fn attached_tracks(&self) -> usize {
        self.attached
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Close the transport. Only the first call reaches it; errors while
    /// closing are logged and swallowed.
    pub async fn close(&mut self) -> bool {
        if self.closed {
            return false;
        }
        self.closed = true;
        if let Err(e) = self.transport.close().await {
            warn!("Error closing peer connection: {}", e);
        }
        debug!("Peer connection closed");
        true
    }
}

/// Signaling channel that only logs what it would send.
#[derive(Debug, Default)]
pub struct LogSignaling;

#[async_trait]
impl SignalingChannel for LogSignaling {
    async fn send_candidate(&self, session_id: &str, candidate: &IceCandidate) -> CallResult<()> {
        debug!("[{}] local candidate: {}", session_id, candidate.candidate);
        Ok(())
    }

    async fn send_offer(&self, session_id: &str, sdp: &str) -> CallResult<()> {
        debug!("[{}] local offer ({} bytes)", session_id, sdp.len());
        Ok(())
    }
}
