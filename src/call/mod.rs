// Live video-session connection core
//
// Owns the full lifecycle of a one-to-one audio/video call between a host
// and a participant: admission, local media, peer connection, connection
// state, session countdown, teardown and feedback capture.

pub mod admission;
pub mod error;
pub mod feedback;
pub mod loopback;
pub mod manager;
pub mod media;
pub mod peer;
pub mod state;
pub mod timer;
pub mod types;
#[cfg(feature = "transport")]
pub mod webrtc;

pub use admission::{AdmissionGate, AdmissionState, IncomingCallOffer};
pub use error::{CallError, CallResult, DeviceFailure, FailureReason, MediaError};
pub use feedback::{FeedbackCapture, FeedbackOutcome, FeedbackRecord, MemoryFeedbackStore, Rating};
pub use loopback::LoopbackTransportFactory;
pub use manager::{CallEntry, SessionConnectionContext, SessionConnectionManager};
pub use media::{LocalStream, MediaAcquisition, SyntheticDevices};
pub use peer::{LogSignaling, PeerConnectionController};
pub use state::{ConnectionEvent, ConnectionStateMachine, DisconnectPolicy, Transition};
pub use timer::{SessionTimer, TimerEvent};
pub use types::*;

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::config::IceServerConfig;

/// A single capture track handed out by a device backend.
///
/// Implementations must tolerate `stop` being called more than once.
pub trait DeviceTrack: Send + Sync + std::fmt::Debug {
    fn id(&self) -> &str;
    fn kind(&self) -> TrackKind;
    fn set_enabled(&self, enabled: bool);
    fn stop(&self);
}

/// Camera and microphone access.
///
/// The only component allowed to trigger an OS/browser permission prompt.
#[async_trait]
pub trait MediaDevices: Send + Sync {
    async fn open_camera(&self) -> Result<Box<dyn DeviceTrack>, DeviceFailure>;
    async fn open_microphone(&self) -> Result<Box<dyn DeviceTrack>, DeviceFailure>;
}

/// Description of a local track the transport should send
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackInfo {
    pub id: String,
    pub stream_id: String,
    pub kind: TrackKind,
}

/// Callbacks raised by a transport, delivered in order on one channel
#[derive(Debug, Clone)]
pub enum TransportEvent {
    StateChanged(TransportState),
    LocalCandidate(IceCandidate),
    LocalOffer { sdp: String },
    RemoteTrack(RemoteTrack),
}

/// Builds transport objects for one call attempt
#[async_trait]
pub trait TransportFactory: Send + Sync {
    async fn create(
        &self,
        ice_servers: &[IceServerConfig],
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> CallResult<Box<dyn PeerTransport>>;
}

/// The connection object carrying audio/video to the remote peer
#[async_trait]
pub trait PeerTransport: Send + Sync {
    async fn add_track(&self, track: &TrackInfo) -> CallResult<()>;

    /// Kick off offer creation and candidate gathering
    async fn start_negotiation(&self) -> CallResult<()>;

    /// Must be idempotent
    async fn close(&self) -> CallResult<()>;
}

/// Relays negotiation data to the remote peer
#[async_trait]
pub trait SignalingChannel: Send + Sync {
    async fn send_candidate(&self, session_id: &str, candidate: &IceCandidate) -> CallResult<()>;
    async fn send_offer(&self, session_id: &str, sdp: &str) -> CallResult<()>;
}

/// Toast sink for short status messages
pub trait NotificationSink: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Receives the route to move to when the call view is left
pub trait NavigationSink: Send + Sync {
    fn navigate(&self, route: Route);
}

/// Persists submitted feedback
#[async_trait]
pub trait FeedbackStore: Send + Sync {
    async fn save(&self, record: &FeedbackRecord) -> CallResult<()>;
}

/// Resolves a session id into its descriptor
#[async_trait]
pub trait SessionMetadataProvider: Send + Sync {
    async fn descriptor(&self, session_id: &str) -> Option<SessionDescriptor>;
}

/// Notification sink that only writes to the log
#[derive(Debug, Default)]
pub struct LogNotifications;

impl NotificationSink for LogNotifications {
    fn notify(&self, notification: Notification) {
        match notification.level {
            NotificationLevel::Error => {
                log::error!("{}: {}", notification.title, notification.message)
            }
            NotificationLevel::Warning => {
                log::warn!("{}: {}", notification.title, notification.message)
            }
            _ => log::info!("{}: {}", notification.title, notification.message),
        }
    }
}

/// Navigation sink that only writes to the log
#[derive(Debug, Default)]
pub struct LogNavigation;

impl NavigationSink for LogNavigation {
    fn navigate(&self, route: Route) {
        log::info!("Navigating to {}", route.path());
    }
}

/// External collaborators of the session connection manager
#[derive(Clone)]
pub struct Collaborators {
    pub devices: Arc<dyn MediaDevices>,
    pub transports: Arc<dyn TransportFactory>,
    pub signaling: Arc<dyn SignalingChannel>,
    pub notifications: Arc<dyn NotificationSink>,
    pub navigation: Arc<dyn NavigationSink>,
    pub feedback_store: Arc<dyn FeedbackStore>,
    pub metadata: Option<Arc<dyn SessionMetadataProvider>>,
}

impl Collaborators {
    /// Devices and transports are mandatory; everything else starts out
    /// logging-only and can be replaced with the `with_*` builders.
    pub fn new(devices: Arc<dyn MediaDevices>, transports: Arc<dyn TransportFactory>) -> Self {
        Self {
            devices,
            transports,
            signaling: Arc::new(LogSignaling),
            notifications: Arc::new(LogNotifications),
            navigation: Arc::new(LogNavigation),
            feedback_store: Arc::new(MemoryFeedbackStore::new()),
            metadata: None,
        }
    }

    pub fn with_signaling(mut self, signaling: Arc<dyn SignalingChannel>) -> Self {
        self.signaling = signaling;
        self
    }

    pub fn with_notifications(mut self, notifications: Arc<dyn NotificationSink>) -> Self {
        self.notifications = notifications;
        self
    }

    pub fn with_navigation(mut self, navigation: Arc<dyn NavigationSink>) -> Self {
        self.navigation = navigation;
        self
    }

    pub fn with_feedback_store(mut self, store: Arc<dyn FeedbackStore>) -> Self {
        self.feedback_store = store;
        self
    }

    pub fn with_metadata(mut self, metadata: Arc<dyn SessionMetadataProvider>) -> Self {
        self.metadata = Some(metadata);
        self
    }
}
