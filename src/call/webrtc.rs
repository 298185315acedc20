// WebRTC transport
//
// Peer connection backed by the webrtc crate. State changes, local ICE
// candidates and remote tracks are forwarded on the transport event channel.

use async_trait::async_trait;
use log::{debug, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::{MediaEngine, MIME_TYPE_OPUS, MIME_TYPE_VP8};
use webrtc::api::{APIBuilder, API};
use webrtc::ice_transport::ice_candidate::RTCIceCandidate;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::{RTCRtpCodecCapability, RTPCodecType};
use webrtc::rtp_transceiver::rtp_sender::RTCRtpSender;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;

use super::error::{CallError, CallResult};
use super::types::{IceCandidate, RemoteTrack, TrackKind, TransportState};
use super::{PeerTransport, TrackInfo, TransportEvent, TransportFactory};
use crate::config::IceServerConfig;

/// Builds [`WebRtcTransport`]s sharing one configured API instance
pub struct WebRtcTransportFactory {
    api: Arc<API>,
}

impl WebRtcTransportFactory {
    /// Register the default codecs and interceptors
    pub fn new() -> CallResult<Self> {
        let mut media_engine = MediaEngine::default();
        media_engine
            .register_default_codecs()
            .map_err(|e| CallError::transport(format!("Failed to register codecs: {}", e)))?;

        let mut registry = Registry::new();
        registry = register_default_interceptors(registry, &mut media_engine).map_err(|e| {
            CallError::transport(format!("Failed to register interceptors: {}", e))
        })?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        Ok(Self { api: Arc::new(api) })
    }
}

fn rtc_ice_servers(ice_servers: &[IceServerConfig]) -> Vec<RTCIceServer> {
    ice_servers
        .iter()
        .map(|server| RTCIceServer {
            urls: server.urls.clone(),
            username: server.username.clone().unwrap_or_default(),
            credential: server.credential.clone().unwrap_or_default(),
            ..Default::default()
        })
        .collect()
}

fn transport_state(state: RTCPeerConnectionState) -> Option<TransportState> {
    match state {
        RTCPeerConnectionState::New => Some(TransportState::New),
        RTCPeerConnectionState::Connecting => Some(TransportState::Connecting),
        RTCPeerConnectionState::Connected => Some(TransportState::Connected),
        RTCPeerConnectionState::Disconnected => Some(TransportState::Disconnected),
        RTCPeerConnectionState::Failed => Some(TransportState::Failed),
        RTCPeerConnectionState::Closed => Some(TransportState::Closed),
        RTCPeerConnectionState::Unspecified => None,
    }
}

fn codec_capability(kind: TrackKind) -> RTCRtpCodecCapability {
    match kind {
        TrackKind::Video => RTCRtpCodecCapability {
            mime_type: MIME_TYPE_VP8.to_owned(),
            clock_rate: 90000,
            ..Default::default()
        },
        TrackKind::Audio => RTCRtpCodecCapability {
            mime_type: MIME_TYPE_OPUS.to_owned(),
            clock_rate: 48000,
            channels: 2,
            ..Default::default()
        },
    }
}

#[async_trait]
impl TransportFactory for WebRtcTransportFactory {
    async fn create(
        &self,
        ice_servers: &[IceServerConfig],
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> CallResult<Box<dyn PeerTransport>> {
        let config = RTCConfiguration {
            ice_servers: rtc_ice_servers(ice_servers),
            ..Default::default()
        };

        let peer_connection = Arc::new(
            self.api
                .new_peer_connection(config)
                .await
                .map_err(|e| CallError::transport(format!("Failed to create peer connection: {}", e)))?,
        );

        let state_events = events.clone();
        peer_connection.on_peer_connection_state_change(Box::new(
            move |state: RTCPeerConnectionState| {
                let events = state_events.clone();
                Box::pin(async move {
                    debug!("Peer connection state: {}", state);
                    if let Some(state) = transport_state(state) {
                        let _ = events.send(TransportEvent::StateChanged(state));
                    }
                })
            },
        ));

        let candidate_events = events.clone();
        peer_connection.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
            let events = candidate_events.clone();
            Box::pin(async move {
                let Some(candidate) = candidate else {
                    return;
                };
                match candidate.to_json() {
                    Ok(init) => {
                        let _ = events.send(TransportEvent::LocalCandidate(IceCandidate {
                            candidate: init.candidate,
                            sdp_mid: init.sdp_mid,
                            sdp_mline_index: init.sdp_mline_index,
                        }));
                    }
                    Err(e) => warn!("Failed to serialize ICE candidate: {}", e),
                }
            })
        }));

        let track_events = events.clone();
        peer_connection.on_track(Box::new(move |track, _receiver, _transceiver| {
            let events = track_events.clone();
            Box::pin(async move {
                let kind = match track.kind() {
                    RTPCodecType::Audio => TrackKind::Audio,
                    RTPCodecType::Video => TrackKind::Video,
                    RTPCodecType::Unspecified => return,
                };
                info!("Received remote {} track {}", kind, track.id());
                let _ = events.send(TransportEvent::RemoteTrack(RemoteTrack {
                    id: track.id(),
                    stream_id: track.stream_id(),
                    kind,
                }));
            })
        }));

        Ok(Box::new(WebRtcTransport {
            peer_connection,
            events,
            local_tracks: Mutex::new(Vec::new()),
            senders: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        }))
    }
}

/// A single `RTCPeerConnection` with its local sample tracks
pub struct WebRtcTransport {
    peer_connection: Arc<RTCPeerConnection>,
    events: mpsc::UnboundedSender<TransportEvent>,
    local_tracks: Mutex<Vec<Arc<TrackLocalStaticSample>>>,
    senders: Mutex<Vec<Arc<RTCRtpSender>>>,
    closed: AtomicBool,
}

impl WebRtcTransport {
    /// Local tracks a capture pipeline should write samples into
    pub async fn local_tracks(&self) -> Vec<Arc<TrackLocalStaticSample>> {
        self.local_tracks.lock().await.clone()
    }
}

#[async_trait]
impl PeerTransport for WebRtcTransport {
    async fn add_track(&self, track: &TrackInfo) -> CallResult<()> {
        let local = Arc::new(TrackLocalStaticSample::new(
            codec_capability(track.kind),
            track.id.clone(),
            track.stream_id.clone(),
        ));

        let sender = self
            .peer_connection
            .add_track(Arc::clone(&local) as Arc<dyn TrackLocal + Send + Sync>)
            .await
            .map_err(|e| CallError::transport(format!("Failed to add {} track: {}", track.kind, e)))?;

        self.local_tracks.lock().await.push(local);
        self.senders.lock().await.push(sender);
        Ok(())
    }

    async fn start_negotiation(&self) -> CallResult<()> {
        let offer = self
            .peer_connection
            .create_offer(None)
            .await
            .map_err(|e| CallError::transport(format!("Failed to create offer: {}", e)))?;

        self.peer_connection
            .set_local_description(offer.clone())
            .await
            .map_err(|e| CallError::transport(format!("Failed to set local description: {}", e)))?;

        let _ = self.events.send(TransportEvent::LocalOffer { sdp: offer.sdp });
        Ok(())
    }

    async fn close(&self) -> CallResult<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.senders.lock().await.clear();
        self.local_tracks.lock().await.clear();
        self.peer_connection
            .close()
            .await
            .map_err(|e| CallError::transport(format!("Failed to close peer connection: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_mapping_skips_unspecified() {
        assert_eq!(transport_state(RTCPeerConnectionState::Unspecified), None);
        assert_eq!(
            transport_state(RTCPeerConnectionState::Disconnected),
            Some(TransportState::Disconnected)
        );
    }

    #[test]
    fn test_ice_server_conversion() {
        let servers = rtc_ice_servers(&[IceServerConfig {
            urls: vec!["turn:turn.example.com:3478".to_string()],
            username: Some("coach".to_string()),
            credential: None,
        }]);
        assert_eq!(servers.len(), 1);
        assert_eq!(servers[0].username, "coach");
        assert_eq!(servers[0].credential, "");
    }

    #[tokio::test]
    async fn test_creates_offer_with_local_tracks() {
        let factory = WebRtcTransportFactory::new().unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let transport = factory.create(&[], tx).await.unwrap();

        for (id, kind) in [("cam", TrackKind::Video), ("mic", TrackKind::Audio)] {
            transport
                .add_track(&TrackInfo {
                    id: id.to_string(),
                    stream_id: "local".to_string(),
                    kind,
                })
                .await
                .unwrap();
        }
        transport.start_negotiation().await.unwrap();

        let mut offer = None;
        while let Ok(event) = rx.try_recv() {
            if let TransportEvent::LocalOffer { sdp } = event {
                offer = Some(sdp);
            }
        }
        let sdp = offer.expect("offer should be emitted");
        assert!(sdp.contains("m=video"));
        assert!(sdp.contains("m=audio"));

        transport.close().await.unwrap();
        transport.close().await.unwrap();
    }
}
