// Shared fakes for call integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use coachcall::call::{
    CallError, CallResult, Collaborators, DeviceFailure, DeviceTrack, FeedbackRecord,
    FeedbackStore, MediaDevices, NavigationSink, Notification, NotificationLevel,
    NotificationSink, Participant, PeerTransport, Role, Route, SessionDescriptor,
    SessionMetadataProvider, TrackInfo, TrackKind, TransportEvent, TransportFactory,
    TransportState,
};
use coachcall::config::IceServerConfig;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// Ordered log of side effects shared by all fakes
#[derive(Clone, Default, Debug)]
pub struct Trace(Arc<Mutex<Vec<String>>>);

impl Trace {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn position(&self, entry: &str) -> Option<usize> {
        self.entries().iter().position(|e| e == entry)
    }

    pub fn count(&self, entry: &str) -> usize {
        self.entries().iter().filter(|e| *e == entry).count()
    }
}

#[derive(Debug)]
pub struct FakeTrack {
    kind: TrackKind,
    trace: Trace,
    enabled: Arc<AtomicBool>,
}

impl DeviceTrack for FakeTrack {
    fn id(&self) -> &str {
        match self.kind {
            TrackKind::Video => "fake-camera",
            TrackKind::Audio => "fake-microphone",
        }
    }

    fn kind(&self) -> TrackKind {
        self.kind
    }

    fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    fn stop(&self) {
        self.trace.push(format!("media:stop:{}", self.kind));
    }
}

/// Devices that log every open/stop and can fail or stall on request
pub struct RecordingDevices {
    trace: Trace,
    failure: Option<(&'static str, &'static str)>,
    delay: Duration,
    pub camera_enabled: Arc<AtomicBool>,
    pub microphone_enabled: Arc<AtomicBool>,
}

impl RecordingDevices {
    pub fn new(trace: Trace) -> Self {
        Self {
            trace,
            failure: None,
            delay: Duration::ZERO,
            camera_enabled: Arc::new(AtomicBool::new(true)),
            microphone_enabled: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn failing(mut self, name: &'static str, message: &'static str) -> Self {
        self.failure = Some((name, message));
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    async fn open(&self, kind: TrackKind) -> Result<Box<dyn DeviceTrack>, DeviceFailure> {
        self.trace.push(format!("media:request:{}", kind));
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Some((name, message)) = self.failure {
            return Err(DeviceFailure::named(name, message));
        }
        self.trace.push(format!("media:open:{}", kind));
        let enabled = match kind {
            TrackKind::Video => self.camera_enabled.clone(),
            TrackKind::Audio => self.microphone_enabled.clone(),
        };
        Ok(Box::new(FakeTrack {
            kind,
            trace: self.trace.clone(),
            enabled,
        }))
    }
}

#[async_trait]
impl MediaDevices for RecordingDevices {
    async fn open_camera(&self) -> Result<Box<dyn DeviceTrack>, DeviceFailure> {
        self.open(TrackKind::Video).await
    }

    async fn open_microphone(&self) -> Result<Box<dyn DeviceTrack>, DeviceFailure> {
        self.open(TrackKind::Audio).await
    }
}

struct ScriptedTransport {
    trace: Trace,
    closes: Arc<AtomicUsize>,
    negotiation_delay: Duration,
}

#[async_trait]
impl PeerTransport for ScriptedTransport {
    async fn add_track(&self, track: &TrackInfo) -> CallResult<()> {
        self.trace.push(format!("transport:add_track:{}", track.kind));
        Ok(())
    }

    async fn start_negotiation(&self) -> CallResult<()> {
        self.trace.push("transport:negotiate");
        if !self.negotiation_delay.is_zero() {
            tokio::time::sleep(self.negotiation_delay).await;
        }
        Ok(())
    }

    async fn close(&self) -> CallResult<()> {
        self.trace.push("transport:close");
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Transport factory whose connections only change state when the test
/// says so
pub struct ScriptedTransportFactory {
    trace: Trace,
    senders: Mutex<Vec<mpsc::UnboundedSender<TransportEvent>>>,
    closes: Arc<AtomicUsize>,
    fail_create: bool,
    negotiation_delay: Duration,
}

impl ScriptedTransportFactory {
    pub fn new(trace: Trace) -> Self {
        Self {
            trace,
            senders: Mutex::new(Vec::new()),
            closes: Arc::new(AtomicUsize::new(0)),
            fail_create: false,
            negotiation_delay: Duration::ZERO,
        }
    }

    pub fn failing(mut self) -> Self {
        self.fail_create = true;
        self
    }

    /// Make every negotiation hang for `delay`, like a slow signaling round trip
    pub fn stalling(mut self, delay: Duration) -> Self {
        self.negotiation_delay = delay;
        self
    }

    /// Deliver an event on the most recently created connection
    pub fn send(&self, event: TransportEvent) {
        if let Some(tx) = self.senders.lock().unwrap().last() {
            let _ = tx.send(event);
        }
    }

    pub fn set_state(&self, state: TransportState) {
        self.send(TransportEvent::StateChanged(state));
    }

    /// Deliver a state change on the connection created `index`-th
    pub fn set_state_on(&self, index: usize, state: TransportState) {
        if let Some(tx) = self.senders.lock().unwrap().get(index) {
            let _ = tx.send(TransportEvent::StateChanged(state));
        }
    }

    pub fn created(&self) -> usize {
        self.senders.lock().unwrap().len()
    }

    pub fn closed(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TransportFactory for ScriptedTransportFactory {
    async fn create(
        &self,
        _ice_servers: &[IceServerConfig],
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> CallResult<Box<dyn PeerTransport>> {
        if self.fail_create {
            self.trace.push("transport:create_failed");
            return Err(CallError::transport("no route to signaling server"));
        }
        self.trace.push("transport:create");
        self.senders.lock().unwrap().push(events);
        Ok(Box::new(ScriptedTransport {
            trace: self.trace.clone(),
            closes: self.closes.clone(),
            negotiation_delay: self.negotiation_delay,
        }))
    }
}

#[derive(Default)]
pub struct RecordingNotifications(Mutex<Vec<Notification>>);

impl RecordingNotifications {
    pub fn all(&self) -> Vec<Notification> {
        self.0.lock().unwrap().clone()
    }

    pub fn titles(&self) -> Vec<String> {
        self.all().into_iter().map(|n| n.title).collect()
    }

    pub fn at_level(&self, level: NotificationLevel) -> Vec<Notification> {
        self.all().into_iter().filter(|n| n.level == level).collect()
    }
}

impl NotificationSink for RecordingNotifications {
    fn notify(&self, notification: Notification) {
        self.0.lock().unwrap().push(notification);
    }
}

#[derive(Default)]
pub struct RecordingNavigation(Mutex<Vec<Route>>);

impl RecordingNavigation {
    pub fn routes(&self) -> Vec<Route> {
        self.0.lock().unwrap().clone()
    }
}

impl NavigationSink for RecordingNavigation {
    fn navigate(&self, route: Route) {
        self.0.lock().unwrap().push(route);
    }
}

pub struct FailingStore;

#[async_trait]
impl FeedbackStore for FailingStore {
    async fn save(&self, _record: &FeedbackRecord) -> CallResult<()> {
        Err(CallError::store("backend unavailable"))
    }
}

pub struct StaticMetadata(pub Vec<SessionDescriptor>);

#[async_trait]
impl SessionMetadataProvider for StaticMetadata {
    async fn descriptor(&self, session_id: &str) -> Option<SessionDescriptor> {
        self.0.iter().find(|d| d.id == session_id).cloned()
    }
}

pub fn descriptor(duration_secs: u64, role: Role) -> SessionDescriptor {
    SessionDescriptor::new(
        "session-42",
        Participant::new("Coach Kim"),
        Participant::new("Alex"),
        duration_secs,
        role,
    )
    .with_category("mobility")
}

/// Everything a test needs to drive and observe one manager
pub struct Harness {
    pub trace: Trace,
    pub transports: Arc<ScriptedTransportFactory>,
    pub notifications: Arc<RecordingNotifications>,
    pub navigation: Arc<RecordingNavigation>,
}

impl Harness {
    pub fn new(trace: Trace, transports: ScriptedTransportFactory) -> Self {
        Self {
            trace,
            transports: Arc::new(transports),
            notifications: Arc::new(RecordingNotifications::default()),
            navigation: Arc::new(RecordingNavigation::default()),
        }
    }

    pub fn collaborators(&self, devices: Arc<dyn MediaDevices>) -> Collaborators {
        Collaborators::new(devices, self.transports.clone())
            .with_notifications(self.notifications.clone())
            .with_navigation(self.navigation.clone())
    }
}

/// Let spawned tasks run without crossing a countdown tick
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}
