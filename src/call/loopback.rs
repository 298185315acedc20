// In-process loopback transport
//
// Stands in for a remote peer: reports connecting, then connected after a
// negotiation delay, and echoes each local track back as a remote one.

use async_trait::async_trait;
use log::debug;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::error::{CallError, CallResult};
use super::types::{IceCandidate, RemoteTrack, TransportState};
use super::{PeerTransport, TrackInfo, TransportEvent, TransportFactory};
use crate::config::IceServerConfig;

/// Factory for [`LoopbackTransport`]s
#[derive(Debug, Clone)]
pub struct LoopbackTransportFactory {
    negotiation_delay: Duration,
}

impl LoopbackTransportFactory {
    pub fn new(negotiation_delay: Duration) -> Self {
        Self { negotiation_delay }
    }
}

impl Default for LoopbackTransportFactory {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

#[async_trait]
impl TransportFactory for LoopbackTransportFactory {
    async fn create(
        &self,
        ice_servers: &[IceServerConfig],
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> CallResult<Box<dyn PeerTransport>> {
        debug!("Creating loopback transport ({} ICE servers ignored)", ice_servers.len());
        let _ = events.send(TransportEvent::StateChanged(TransportState::New));
        Ok(Box::new(LoopbackTransport {
            negotiation_delay: self.negotiation_delay,
            events,
            tracks: Mutex::new(Vec::new()),
            token: CancellationToken::new(),
        }))
    }
}

pub struct LoopbackTransport {
    negotiation_delay: Duration,
    events: mpsc::UnboundedSender<TransportEvent>,
    tracks: Mutex<Vec<TrackInfo>>,
    token: CancellationToken,
}

#[async_trait]
impl PeerTransport for LoopbackTransport {
    async fn add_track(&self, track: &TrackInfo) -> CallResult<()> {
        if self.token.is_cancelled() {
            return Err(CallError::transport("transport is closed"));
        }
        self.tracks
            .lock()
            .map_err(|_| CallError::transport("track list poisoned"))?
            .push(track.clone());
        Ok(())
    }

    async fn start_negotiation(&self) -> CallResult<()> {
        let tracks = self
            .tracks
            .lock()
            .map_err(|_| CallError::transport("track list poisoned"))?
            .clone();
        let events = self.events.clone();
        let token = self.token.clone();
        let delay = self.negotiation_delay;

        let _ = events.send(TransportEvent::LocalOffer {
            sdp: format!("v=0\r\ns=loopback\r\nm-lines={}\r\n", tracks.len()),
        });
        let _ = events.send(TransportEvent::StateChanged(TransportState::Connecting));
        let _ = events.send(TransportEvent::LocalCandidate(IceCandidate {
            candidate: "candidate:1 1 udp 2130706431 127.0.0.1 9 typ host".to_string(),
            sdp_mid: Some("0".to_string()),
            sdp_mline_index: Some(0),
        }));

        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
            let _ = events.send(TransportEvent::StateChanged(TransportState::Connected));
            for track in tracks {
                let _ = events.send(TransportEvent::RemoteTrack(RemoteTrack {
                    id: format!("remote-{}", track.id),
                    stream_id: "remote".to_string(),
                    kind: track.kind,
                }));
            }
        });
        Ok(())
    }

    async fn close(&self) -> CallResult<()> {
        if self.token.is_cancelled() {
            return Ok(());
        }
        self.token.cancel();
        let _ = self.events.send(TransportEvent::StateChanged(TransportState::Closed));
        Ok(())
    }
}

impl Drop for LoopbackTransport {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call::types::TrackKind;

    #[tokio::test(start_paused = true)]
    async fn test_connects_after_delay_and_echoes_tracks() {
        let factory = LoopbackTransportFactory::new(Duration::from_millis(500));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let transport = factory.create(&[], tx).await.unwrap();
        transport
            .add_track(&TrackInfo {
                id: "cam".into(),
                stream_id: "local".into(),
                kind: TrackKind::Video,
            })
            .await
            .unwrap();
        transport.start_negotiation().await.unwrap();

        tokio::time::sleep(Duration::from_secs(1)).await;

        let mut states = Vec::new();
        let mut remote = Vec::new();
        while let Ok(event) = rx.try_recv() {
            match event {
                TransportEvent::StateChanged(state) => states.push(state),
                TransportEvent::RemoteTrack(track) => remote.push(track),
                _ => {}
            }
        }
        assert_eq!(
            states,
            vec![TransportState::New, TransportState::Connecting, TransportState::Connected]
        );
        assert_eq!(remote.len(), 1);
        assert_eq!(remote[0].kind, TrackKind::Video);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_before_connect_suppresses_connected() {
        let factory = LoopbackTransportFactory::new(Duration::from_millis(500));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let transport = factory.create(&[], tx).await.unwrap();
        transport.start_negotiation().await.unwrap();
        transport.close().await.unwrap();
        transport.close().await.unwrap();

        tokio::time::sleep(Duration::from_secs(1)).await;

        let mut states = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let TransportEvent::StateChanged(state) = event {
                states.push(state);
            }
        }
        assert_eq!(states.last(), Some(&TransportState::Closed));
        assert!(!states.contains(&TransportState::Connected));
    }
}
