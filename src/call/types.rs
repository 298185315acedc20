// Core call data types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

use super::error::{FailureReason, MediaError};

pub type SessionId = String;

/// Identifies one pipeline instance; a retry always gets a fresh one.
pub type AttemptId = Uuid;

/// Which side of the call the current user is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The trainer hosting the session
    Host,
    /// The member attending the session
    Participant,
}

impl Role {
    pub fn dashboard(&self) -> Route {
        match self {
            Role::Host => Route::HostDashboard,
            Role::Participant => Route::ParticipantDashboard,
        }
    }

    pub fn counterpart(&self) -> Role {
        match self {
            Role::Host => Role::Participant,
            Role::Participant => Role::Host,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Host => write!(f, "host"),
            Role::Participant => write!(f, "participant"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "host" | "trainer" => Ok(Role::Host),
            "participant" | "member" => Ok(Role::Participant),
            other => Err(format!("unknown role: {}", other)),
        }
    }
}

/// Display identity of one side of the call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub name: String,
    pub avatar_url: Option<String>,
}

impl Participant {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            avatar_url: None,
        }
    }

    pub fn with_avatar(mut self, avatar_url: impl Into<String>) -> Self {
        self.avatar_url = Some(avatar_url.into());
        self
    }
}

/// Immutable description of a scheduled call, supplied by the session
/// metadata collaborator when the call view is entered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescriptor {
    pub id: SessionId,
    pub host: Participant,
    pub participant: Participant,
    /// Scheduled length in seconds
    pub duration_secs: u64,
    pub category: String,
    /// Role of the local user
    pub local_role: Role,
}

impl SessionDescriptor {
    pub fn new(
        id: impl Into<SessionId>,
        host: Participant,
        participant: Participant,
        duration_secs: u64,
        local_role: Role,
    ) -> Self {
        Self {
            id: id.into(),
            host,
            participant,
            duration_secs,
            category: String::new(),
            local_role,
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_secs)
    }

    /// Identity rendered in the self-view tile
    pub fn local(&self) -> &Participant {
        match self.local_role {
            Role::Host => &self.host,
            Role::Participant => &self.participant,
        }
    }

    /// Identity rendered in the remote tile
    pub fn remote(&self) -> &Participant {
        match self.local_role {
            Role::Host => &self.participant,
            Role::Participant => &self.host,
        }
    }
}

/// Application-level connection state of the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Connecting,
    Connected,
    Reconnecting,
    Failed,
}

impl Default for ConnectionState {
    fn default() -> Self {
        ConnectionState::Connecting
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Reconnecting => write!(f, "reconnecting"),
            ConnectionState::Failed => write!(f, "failed"),
        }
    }
}

/// Connectivity state as reported by the underlying transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl fmt::Display for TransportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransportState::New => "new",
            TransportState::Connecting => "connecting",
            TransportState::Connected => "connected",
            TransportState::Disconnected => "disconnected",
            TransportState::Failed => "failed",
            TransportState::Closed => "closed",
        };
        write!(f, "{}", name)
    }
}

/// Lifecycle phase of the whole call view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallPhase {
    /// Nothing entered yet
    Idle,
    /// Incoming call waiting for accept/decline
    Admission,
    /// Media pipeline running (connecting, connected or reconnecting)
    InCall,
    /// Pipeline failed; go back or retry
    Failed,
    /// Resources released, waiting for submit/skip
    Feedback,
    /// Navigated away or disposed
    Exited,
}

impl fmt::Display for CallPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CallPhase::Idle => "idle",
            CallPhase::Admission => "awaiting admission",
            CallPhase::InCall => "in call",
            CallPhase::Failed => "failed",
            CallPhase::Feedback => "collecting feedback",
            CallPhase::Exited => "exited",
        };
        write!(f, "{}", name)
    }
}

/// Why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    UserEnded,
    TimerExpired,
}

/// Actions offered on the failure screen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureAction {
    GoBack,
    Retry,
}

/// Navigation targets handed to the navigation sink
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    HostDashboard,
    ParticipantDashboard,
}

impl Route {
    pub fn path(&self) -> &'static str {
        match self {
            Route::HostDashboard => "/trainer/dashboard",
            Route::ParticipantDashboard => "/member/dashboard",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// Short status message for the toast sink
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub level: NotificationLevel,
    pub title: String,
    pub message: String,
}

impl Notification {
    pub fn new(level: NotificationLevel, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level,
            title: title.into(),
            message: message.into(),
        }
    }

    pub fn info(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Info, title, message)
    }

    pub fn success(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Success, title, message)
    }

    pub fn error(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Error, title, message)
    }
}

/// Kind of a media track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Audio,
    Video,
}

impl fmt::Display for TrackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackKind::Audio => write!(f, "audio"),
            TrackKind::Video => write!(f, "video"),
        }
    }
}

/// Track received from the remote peer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteTrack {
    pub id: String,
    pub stream_id: String,
    pub kind: TrackKind,
}

/// Locally gathered connectivity candidate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceCandidate {
    pub candidate: String,
    pub sdp_mid: Option<String>,
    pub sdp_mline_index: Option<u16>,
}

/// Seconds left in the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RemainingTime(pub u64);

impl RemainingTime {
    pub fn secs(&self) -> u64 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for RemainingTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.0 / 60, self.0 % 60)
    }
}

/// What the call surface should render right now.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "view", rename_all = "snake_case")]
pub enum CallView {
    Idle,
    /// Accept/decline gate for an incoming call
    IncomingCall { caller: Participant },
    /// Loading indicator
    Connecting,
    /// Live call surface, with a non-blocking banner while reconnecting
    Live { reconnecting: bool },
    /// Dead-end screen
    Failed {
        reason: FailureReason,
        actions: Vec<FailureAction>,
    },
    /// Rating + comment dialog
    Feedback,
    Exited,
}

/// Point-in-time view of the call, for rendering and diagnostics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallSnapshot {
    pub phase: CallPhase,
    pub view: CallView,
    pub session_id: Option<SessionId>,
    pub attempt: Option<AttemptId>,
    pub connection_state: Option<ConnectionState>,
    pub remaining: Option<RemainingTime>,
    pub video_enabled: bool,
    pub audio_enabled: bool,
    pub remote_tracks: Vec<RemoteTrack>,
}

/// Events broadcast to observers of a call
#[derive(Debug, Clone)]
pub enum CallEvent {
    AdmissionRequested { caller: Participant },
    AttemptStarted { attempt: AttemptId },
    MediaAcquired { attempt: AttemptId },
    MediaFailed { attempt: AttemptId, error: MediaError },
    StateChanged {
        attempt: AttemptId,
        from: ConnectionState,
        to: ConnectionState,
    },
    Tick { remaining: RemainingTime },
    RemoteTrackAttached { track: RemoteTrack },
    SessionEnded { reason: EndReason },
    FeedbackOpened,
    Navigated { route: Route },
}
