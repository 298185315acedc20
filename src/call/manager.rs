// Session connection manager
//
// Coordinates admission, local media, the peer connection, connection
// state, the session countdown and feedback for one call view. Every
// pipeline run lives in its own SessionConnectionContext; retrying throws
// the old context away and builds a fresh one.

use log::{debug, error, info, warn};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch, Mutex};
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::admission::{AdmissionGate, IncomingCallOffer};
use super::error::{CallError, CallResult, FailureReason};
use super::feedback::FeedbackCapture;
use super::media::{self, LocalStream, MediaAcquisition};
use super::peer::PeerConnectionController;
use super::state::{ConnectionEvent, ConnectionStateMachine, DisconnectPolicy, Transition};
use super::timer::{SessionTimer, TimerEvent};
use super::types::*;
use super::{Collaborators, TransportEvent};
use crate::config::CallConfig;

const EVENT_CAPACITY: usize = 128;

/// How the call view was entered
#[derive(Debug, Clone)]
pub enum CallEntry {
    /// Caller path: the session is known, start the pipeline immediately
    Known(SessionDescriptor),
    /// Callee path: show the accept/decline gate first
    Incoming(IncomingCallOffer),
}

/// Actions offered on the failure screen for `reason`.
pub fn failure_actions(reason: &FailureReason) -> Vec<FailureAction> {
    if reason.is_retryable() {
        vec![FailureAction::GoBack, FailureAction::Retry]
    } else {
        vec![FailureAction::GoBack]
    }
}

/// Resources of a single pipeline attempt.
///
/// Dropping the context cancels its token and stops its media tracks. A
/// transport that is still open gets closed on a spawned task when a tokio
/// runtime is available.
pub struct SessionConnectionContext {
    attempt: AttemptId,
    media: MediaAcquisition,
    peer: Option<PeerConnectionController>,
    machine: ConnectionStateMachine,
    connection: watch::Sender<ConnectionState>,
    timer: Option<SessionTimer>,
    remote_tracks: Vec<RemoteTrack>,
    token: CancellationToken,
}

impl SessionConnectionContext {
    fn new(
        attempt: AttemptId,
        media: MediaAcquisition,
        policy: DisconnectPolicy,
        token: CancellationToken,
    ) -> Self {
        let (connection, _) = watch::channel(ConnectionState::Connecting);
        Self {
            attempt,
            media,
            peer: None,
            machine: ConnectionStateMachine::new(policy),
            connection,
            timer: None,
            remote_tracks: Vec::new(),
            token,
        }
    }

    pub fn attempt(&self) -> AttemptId {
        self.attempt
    }

    pub fn state(&self) -> ConnectionState {
        self.machine.state()
    }

    pub fn local_stream(&self) -> Option<&LocalStream> {
        self.media.stream()
    }

    pub fn remote_tracks(&self) -> &[RemoteTrack] {
        &self.remote_tracks
    }

    pub fn remaining(&self) -> Option<RemainingTime> {
        self.timer.as_ref().map(SessionTimer::remaining)
    }

    pub fn is_released(&self) -> bool {
        self.token.is_cancelled()
    }

    fn is_current(&self, attempt: AttemptId) -> bool {
        self.attempt == attempt && !self.token.is_cancelled()
    }

    fn apply(&mut self, event: ConnectionEvent) -> Transition {
        let transition = self.machine.apply(event);
        if transition.changed() {
            self.connection.send_replace(transition.to);
        }
        transition
    }

    /// Cancel the countdown, stop local tracks and close the transport.
    /// Every step is idempotent.
    async fn release(&mut self) {
        self.token.cancel();
        if let Some(timer) = &self.timer {
            timer.cancel();
        }
        self.media.release();
        if let Some(peer) = self.peer.as_mut() {
            peer.close().await;
        }
        debug!("Released resources of attempt {}", self.attempt);
    }
}

impl Drop for SessionConnectionContext {
    fn drop(&mut self) {
        self.token.cancel();
        self.media.release();

        let Some(mut peer) = self.peer.take().filter(|peer| !peer.is_closed()) else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let attempt = self.attempt;
                handle.spawn(async move {
                    peer.close().await;
                    debug!("Closed transport of dropped attempt {}", attempt);
                });
            }
            Err(_) => warn!("Attempt {} dropped outside a runtime; transport left open", self.attempt),
        }
    }
}

struct Inner {
    phase: CallPhase,
    descriptor: Option<SessionDescriptor>,
    admission: Option<AdmissionGate>,
    admission_token: Option<CancellationToken>,
    context: Option<SessionConnectionContext>,
    failure: Option<FailureReason>,
    feedback: Option<FeedbackCapture>,
    video_enabled: bool,
    audio_enabled: bool,
}

impl Inner {
    fn is_current(&self, attempt: AttemptId) -> bool {
        self.context.as_ref().is_some_and(|ctx| ctx.is_current(attempt))
    }

    fn set_video_enabled(&mut self, enabled: bool) {
        self.video_enabled = enabled;
        if let Some(ctx) = self.context.as_mut() {
            ctx.media.set_video_enabled(enabled);
        }
    }

    fn set_audio_enabled(&mut self, enabled: bool) {
        self.audio_enabled = enabled;
        if let Some(ctx) = self.context.as_mut() {
            ctx.media.set_audio_enabled(enabled);
        }
    }

    fn descriptor(&self, operation: &'static str) -> CallResult<&SessionDescriptor> {
        self.descriptor
            .as_ref()
            .ok_or_else(|| CallError::invalid_phase(operation, self.phase))
    }

    fn view(&self) -> CallView {
        match self.phase {
            CallPhase::Idle => CallView::Idle,
            CallPhase::Admission => match &self.admission {
                Some(gate) => CallView::IncomingCall {
                    caller: gate.offer().caller.clone(),
                },
                None => CallView::Idle,
            },
            CallPhase::InCall => match self.context.as_ref().map(SessionConnectionContext::state) {
                Some(ConnectionState::Connected) => CallView::Live {
                    reconnecting: false,
                },
                Some(ConnectionState::Reconnecting) => CallView::Live { reconnecting: true },
                _ => CallView::Connecting,
            },
            CallPhase::Failed => {
                let reason = self
                    .failure
                    .clone()
                    .unwrap_or_else(|| FailureReason::Transport("unknown failure".to_string()));
                CallView::Failed {
                    actions: failure_actions(&reason),
                    reason,
                }
            }
            CallPhase::Feedback => CallView::Feedback,
            CallPhase::Exited => CallView::Exited,
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(token) = &self.admission_token {
            token.cancel();
        }
    }
}

struct Shared {
    config: CallConfig,
    collaborators: Collaborators,
    events: broadcast::Sender<CallEvent>,
}

/// Owns the lifecycle of one call view.
///
/// Cheap to clone; clones drive the same call.
#[derive(Clone)]
pub struct SessionConnectionManager {
    inner: Arc<Mutex<Inner>>,
    shared: Arc<Shared>,
}

/// Handle held by background tasks so they never keep a call alive
#[derive(Clone)]
struct WeakManager {
    inner: Weak<Mutex<Inner>>,
    shared: Weak<Shared>,
}

impl WeakManager {
    fn upgrade(&self) -> Option<SessionConnectionManager> {
        Some(SessionConnectionManager {
            inner: self.inner.upgrade()?,
            shared: self.shared.upgrade()?,
        })
    }
}

impl SessionConnectionManager {
    pub fn new(config: CallConfig, collaborators: Collaborators) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let inner = Inner {
            phase: CallPhase::Idle,
            descriptor: None,
            admission: None,
            admission_token: None,
            context: None,
            failure: None,
            feedback: None,
            video_enabled: config.video_enabled_on_start,
            audio_enabled: config.audio_enabled_on_start,
        };
        Self {
            inner: Arc::new(Mutex::new(inner)),
            shared: Arc::new(Shared {
                config,
                collaborators,
                events,
            }),
        }
    }

    pub fn config(&self) -> &CallConfig {
        &self.shared.config
    }

    /// Observe call events. Subscribe before `enter` to see everything.
    pub fn subscribe(&self) -> broadcast::Receiver<CallEvent> {
        self.shared.events.subscribe()
    }

    fn downgrade(&self) -> WeakManager {
        WeakManager {
            inner: Arc::downgrade(&self.inner),
            shared: Arc::downgrade(&self.shared),
        }
    }

    fn emit(&self, event: CallEvent) {
        let _ = self.shared.events.send(event);
    }

    fn notify(&self, notification: Notification) {
        self.shared.collaborators.notifications.notify(notification);
    }

    fn navigate(&self, route: Route) {
        info!("Leaving call view for {}", route.path());
        self.shared.collaborators.navigation.navigate(route);
        self.emit(CallEvent::Navigated { route });
    }

    /// Enter the call view.
    pub async fn enter(&self, entry: CallEntry) -> CallResult<()> {
        let mut inner = self.inner.lock().await;
        if inner.phase != CallPhase::Idle {
            return Err(CallError::invalid_phase("enter the call", inner.phase));
        }

        match entry {
            CallEntry::Known(descriptor) => {
                info!(
                    "Entering session {} as {} ({}s)",
                    descriptor.id, descriptor.local_role, descriptor.duration_secs
                );
                inner.descriptor = Some(descriptor);
                drop(inner);
                self.start_attempt().await.map(|_| ())
            }
            CallEntry::Incoming(offer) => {
                info!("Incoming call from {} for session {}", offer.caller.name, offer.descriptor.id);
                let caller = offer.caller.clone();
                inner.descriptor = Some(offer.descriptor.clone());
                inner.admission = Some(AdmissionGate::new(offer));
                inner.phase = CallPhase::Admission;

                if let Some(timeout) = self.shared.config.admission_timeout {
                    let token = CancellationToken::new();
                    inner.admission_token = Some(token.clone());
                    tokio::spawn(expire_admission(self.downgrade(), timeout, token));
                }
                drop(inner);

                self.emit(CallEvent::AdmissionRequested { caller });
                Ok(())
            }
        }
    }

    /// Enter a known session by id, resolving it through the metadata
    /// provider.
    pub async fn enter_session(&self, session_id: &str) -> CallResult<()> {
        let descriptor = match &self.shared.collaborators.metadata {
            Some(metadata) => metadata.descriptor(session_id).await,
            None => None,
        }
        .ok_or_else(|| CallError::SessionNotFound(session_id.to_string()))?;
        self.enter(CallEntry::Known(descriptor)).await
    }

    /// Accept the incoming call and start the pipeline.
    pub async fn accept(&self) -> CallResult<()> {
        {
            let mut inner = self.inner.lock().await;
            let phase = inner.phase;
            if phase != CallPhase::Admission {
                return Err(CallError::invalid_phase("accept the call", phase));
            }
            let gate = inner
                .admission
                .as_mut()
                .ok_or_else(|| CallError::invalid_phase("accept the call", phase))?;
            let descriptor = gate.accept()?;
            if let Some(token) = inner.admission_token.take() {
                token.cancel();
            }
            inner.descriptor = Some(descriptor);
        }
        self.start_attempt().await.map(|_| ())
    }

    /// Decline the incoming call and return to the dashboard.
    pub async fn decline(&self) -> CallResult<()> {
        self.close_admission(false).await
    }

    async fn close_admission(&self, missed: bool) -> CallResult<()> {
        let (caller, route) = {
            let mut inner = self.inner.lock().await;
            let phase = inner.phase;
            if phase != CallPhase::Admission {
                return Err(CallError::invalid_phase("decline the call", phase));
            }
            let gate = inner
                .admission
                .as_mut()
                .ok_or_else(|| CallError::invalid_phase("decline the call", phase))?;
            gate.decline()?;
            let caller = gate.offer().caller.name.clone();
            let route = gate.offer().descriptor.local_role.dashboard();
            if let Some(token) = inner.admission_token.take() {
                token.cancel();
            }
            inner.phase = CallPhase::Exited;
            (caller, route)
        };

        if missed {
            self.notify(Notification::new(
                NotificationLevel::Warning,
                "Missed call",
                format!("You missed a call from {}", caller),
            ));
        } else {
            self.notify(Notification::info("Call declined", format!("You declined the call from {}", caller)));
        }
        self.navigate(route);
        Ok(())
    }

    /// Run one pipeline attempt: media first, then the transport, then the
    /// countdown and event pump.
    async fn start_attempt(&self) -> CallResult<AttemptId> {
        let attempt = Uuid::new_v4();
        let token = CancellationToken::new();
        let devices = self.shared.collaborators.devices.clone();

        {
            let mut inner = self.inner.lock().await;
            if let Some(mut stale) = inner.context.take() {
                debug!("Disposing attempt {}", stale.attempt);
                stale.release().await;
            }
            let media = MediaAcquisition::new(devices.clone(), inner.video_enabled, inner.audio_enabled);
            inner.context = Some(SessionConnectionContext::new(
                attempt,
                media,
                self.shared.config.disconnect_policy,
                token.clone(),
            ));
            inner.phase = CallPhase::InCall;
            inner.failure = None;
        }
        info!("Starting call attempt {}", attempt);
        self.emit(CallEvent::AttemptStarted { attempt });

        let acquired = tokio::select! {
            biased;
            _ = token.cancelled() => {
                debug!("Attempt {} abandoned during media acquisition", attempt);
                return Ok(attempt);
            }
            result = media::acquire_local_media(devices.as_ref()) => result,
        };

        let mut inner = self.inner.lock().await;
        if !inner.is_current(attempt) {
            debug!("Attempt {} was torn down while acquiring media", attempt);
            return Ok(attempt);
        }

        let stream = match acquired {
            Ok(stream) => stream,
            Err(err) => {
                self.emit(CallEvent::MediaFailed {
                    attempt,
                    error: err.clone(),
                });
                self.drive(&mut inner, ConnectionEvent::MediaFailed, FailureReason::Media(err))
                    .await;
                return Ok(attempt);
            }
        };

        let duration_secs = inner.descriptor("start the call")?.duration_secs;
        let stream = match inner.context.as_mut() {
            Some(ctx) => ctx.media.install(stream),
            None => return Ok(attempt),
        };
        drop(inner);
        self.emit(CallEvent::MediaAcquired { attempt });

        // Teardown may run while the transport is being set up
        let (transport_tx, transport_rx) = mpsc::unbounded_channel();
        let created = PeerConnectionController::create_connection(
            self.shared.collaborators.transports.as_ref(),
            &self.shared.config.ice_servers,
            &stream,
            transport_tx,
            &token,
        )
        .await;

        let mut inner = self.inner.lock().await;
        if !inner.is_current(attempt) {
            drop(inner);
            if let Ok(mut peer) = created {
                peer.close().await;
            }
            debug!("Attempt {} was torn down during transport setup", attempt);
            return Ok(attempt);
        }

        match created {
            Ok(peer) => {
                let Some(ctx) = inner.context.as_mut() else {
                    return Ok(attempt);
                };
                ctx.peer = Some(peer);
                let (timer_tx, timer_rx) = mpsc::unbounded_channel();
                ctx.timer = Some(SessionTimer::start(
                    duration_secs,
                    self.shared.config.tick_interval,
                    ctx.connection.subscribe(),
                    timer_tx,
                ));
                tokio::spawn(pump_events(
                    self.downgrade(),
                    attempt,
                    token,
                    transport_rx,
                    timer_rx,
                    self.shared.config.disconnect_policy.window(),
                ));
            }
            Err(e) => {
                self.drive(
                    &mut inner,
                    ConnectionEvent::TransportFailed,
                    FailureReason::Transport(e.to_string()),
                )
                .await;
            }
        }
        Ok(attempt)
    }

    /// Feed one event to the current attempt's state machine and react to
    /// the resulting transition.
    async fn drive(
        &self,
        inner: &mut Inner,
        event: ConnectionEvent,
        failure: FailureReason,
    ) -> Option<Transition> {
        let ctx = inner.context.as_mut()?;
        let attempt = ctx.attempt;
        let transition = ctx.apply(event);
        if !transition.changed() {
            return None;
        }
        self.emit(CallEvent::StateChanged {
            attempt,
            from: transition.from,
            to: transition.to,
        });

        let remote = inner
            .descriptor
            .as_ref()
            .map(|d| d.remote().name.clone())
            .unwrap_or_default();

        match transition.to {
            ConnectionState::Connected if transition.from == ConnectionState::Reconnecting => {
                info!("Attempt {} recovered", attempt);
                self.notify(Notification::success("Reconnected", "The connection was restored"));
            }
            ConnectionState::Connected => {
                info!("Attempt {} connected", attempt);
                self.notify(Notification::success("Connected", format!("You are now live with {}", remote)));
            }
            ConnectionState::Reconnecting => {
                warn!("Attempt {} lost its connection, waiting for recovery", attempt);
                self.notify(Notification::new(
                    NotificationLevel::Warning,
                    "Connection lost",
                    "Trying to reconnect...",
                ));
            }
            ConnectionState::Failed => {
                ctx.release().await;
                error!("Attempt {} failed: {}", attempt, failure);
                self.notify(Notification::error("Call failed", failure.to_string()));
                inner.phase = CallPhase::Failed;
                inner.failure = Some(failure);
            }
            ConnectionState::Connecting => {}
        }
        Some(transition)
    }

    async fn on_transport_event(
        &self,
        attempt: AttemptId,
        event: TransportEvent,
    ) -> Option<ConnectionState> {
        let mut inner = self.inner.lock().await;
        if !inner.is_current(attempt) {
            return None;
        }

        match event {
            TransportEvent::StateChanged(state) => {
                debug!("Transport state for attempt {}: {}", attempt, state);
                let event = ConnectionEvent::from_transport(state)?;
                let failure = FailureReason::Transport(format!("peer connection {}", state));
                self.drive(&mut inner, event, failure).await.map(|t| t.to)
            }
            TransportEvent::LocalCandidate(candidate) => {
                let session_id = inner.descriptor.as_ref()?.id.clone();
                drop(inner);
                debug!("Forwarding local candidate for session {}", session_id);
                if let Err(e) = self
                    .shared
                    .collaborators
                    .signaling
                    .send_candidate(&session_id, &candidate)
                    .await
                {
                    warn!("Failed to forward candidate: {}", e);
                }
                None
            }
            TransportEvent::LocalOffer { sdp } => {
                let session_id = inner.descriptor.as_ref()?.id.clone();
                drop(inner);
                if let Err(e) = self.shared.collaborators.signaling.send_offer(&session_id, &sdp).await {
                    warn!("Failed to forward offer: {}", e);
                }
                None
            }
            TransportEvent::RemoteTrack(track) => {
                info!("Remote {} track {} attached", track.kind, track.id);
                inner.context.as_mut()?.remote_tracks.push(track.clone());
                drop(inner);
                self.emit(CallEvent::RemoteTrackAttached { track });
                None
            }
        }
    }

    async fn on_timer_event(&self, attempt: AttemptId, event: TimerEvent) {
        match event {
            TimerEvent::Tick(remaining) => {
                if self.inner.lock().await.is_current(attempt) {
                    self.emit(CallEvent::Tick { remaining });
                }
            }
            TimerEvent::Expired => {
                if let Err(e) = self.finish(EndReason::TimerExpired, Some(attempt)).await {
                    debug!("Ignoring timer expiry: {}", e);
                }
            }
        }
    }

    async fn on_recovery_timeout(&self, attempt: AttemptId) {
        let mut inner = self.inner.lock().await;
        if !inner.is_current(attempt) {
            return;
        }
        let window = self
            .shared
            .config
            .disconnect_policy
            .window()
            .unwrap_or_default();
        let failure = FailureReason::Transport(format!(
            "connection could not be restored within {}s",
            window.as_secs()
        ));
        self.drive(&mut inner, ConnectionEvent::RecoveryTimedOut, failure).await;
    }

    /// End the live session and open the feedback dialog.
    ///
    /// Calling it again after the session ended is a no-op.
    pub async fn end_session(&self) -> CallResult<()> {
        self.finish(EndReason::UserEnded, None).await
    }

    async fn finish(&self, reason: EndReason, attempt: Option<AttemptId>) -> CallResult<()> {
        let mut inner = self.inner.lock().await;
        match inner.phase {
            CallPhase::InCall => {}
            CallPhase::Feedback | CallPhase::Exited => return Ok(()),
            phase => return Err(CallError::invalid_phase("end the session", phase)),
        }
        if let Some(attempt) = attempt {
            if !inner.is_current(attempt) {
                return Ok(());
            }
        }

        let descriptor = inner.descriptor("end the session")?;
        let session_id = descriptor.id.clone();
        let role = descriptor.local_role;

        // Devices and transport are released before the dialog opens
        if let Some(ctx) = inner.context.as_mut() {
            ctx.release().await;
        }
        inner.feedback = Some(FeedbackCapture::new(session_id.clone(), role));
        inner.phase = CallPhase::Feedback;
        drop(inner);

        info!("Session {} ended ({:?})", session_id, reason);
        let message = match reason {
            EndReason::UserEnded => "You ended the session",
            EndReason::TimerExpired => "Session time is up",
        };
        self.notify(Notification::info("Session ended", message));
        self.emit(CallEvent::SessionEnded { reason });
        self.emit(CallEvent::FeedbackOpened);
        Ok(())
    }

    /// Restart the pipeline from a retryable failure with a brand-new
    /// context.
    pub async fn retry(&self) -> CallResult<()> {
        {
            let mut inner = self.inner.lock().await;
            if inner.phase != CallPhase::Failed {
                return Err(CallError::invalid_phase("retry", inner.phase));
            }
            if !inner.failure.as_ref().is_some_and(FailureReason::is_retryable) {
                return Err(CallError::RetryUnavailable);
            }
            inner.phase = CallPhase::InCall;
        }
        info!("Retrying call");
        self.start_attempt().await.map(|_| ())
    }

    /// Same as [`retry`](Self::retry)
    pub async fn restart(&self) -> CallResult<()> {
        self.retry().await
    }

    /// Leave the failure screen (or an unfinished connection) for the
    /// dashboard without feedback.
    pub async fn go_back(&self) -> CallResult<()> {
        let route = {
            let mut inner = self.inner.lock().await;
            match inner.phase {
                CallPhase::Failed | CallPhase::InCall => {}
                phase => return Err(CallError::invalid_phase("go back", phase)),
            }
            let route = inner.descriptor("go back")?.local_role.dashboard();
            if let Some(ctx) = inner.context.as_mut() {
                ctx.release().await;
            }
            inner.phase = CallPhase::Exited;
            route
        };
        self.navigate(route);
        Ok(())
    }

    /// Submit the rating and comment, then return to the dashboard.
    ///
    /// A store failure is reported but does not block navigation.
    pub async fn submit_feedback(&self, rating: u8, comment: impl Into<String>) -> CallResult<()> {
        let (record, route) = {
            let mut inner = self.inner.lock().await;
            let phase = inner.phase;
            let capture = match inner.feedback.as_mut() {
                Some(capture) if phase == CallPhase::Feedback => capture,
                Some(capture) if capture.is_decided() => {
                    return Err(CallError::FeedbackAlreadyRecorded);
                }
                _ => return Err(CallError::invalid_phase("submit feedback", phase)),
            };
            let record = capture.submit(rating, comment)?;
            let route = capture.destination();
            inner.phase = CallPhase::Exited;
            (record, route)
        };

        match self.shared.collaborators.feedback_store.save(&record).await {
            Ok(()) => {
                info!("Feedback for session {} saved ({} stars)", record.session_id, record.rating.value());
                self.notify(Notification::success("Thank you", "Your feedback was submitted"));
            }
            Err(e) => {
                error!("Failed to save feedback for session {}: {}", record.session_id, e);
                self.notify(Notification::error("Feedback not saved", e.to_string()));
            }
        }
        self.navigate(route);
        Ok(())
    }

    /// Close the feedback dialog without a rating.
    pub async fn skip_feedback(&self) -> CallResult<()> {
        let route = {
            let mut inner = self.inner.lock().await;
            let phase = inner.phase;
            let capture = match inner.feedback.as_mut() {
                Some(capture) if phase == CallPhase::Feedback => capture,
                Some(capture) if capture.is_decided() => {
                    return Err(CallError::FeedbackAlreadyRecorded);
                }
                _ => return Err(CallError::invalid_phase("skip feedback", phase)),
            };
            capture.skip()?;
            let route = capture.destination();
            inner.phase = CallPhase::Exited;
            route
        };
        self.notify(Notification::info("Feedback skipped", "Thanks for training with us"));
        self.navigate(route);
        Ok(())
    }

    /// Tear everything down without feedback or navigation, e.g. when the
    /// view is unmounted. Safe to call in any phase, any number of times.
    pub async fn dispose(&self) {
        let mut inner = self.inner.lock().await;
        if let Some(token) = inner.admission_token.take() {
            token.cancel();
        }
        if let Some(ctx) = inner.context.as_mut() {
            ctx.release().await;
        }
        if inner.phase != CallPhase::Exited {
            info!("Call view disposed while {}", inner.phase);
            inner.phase = CallPhase::Exited;
        }
    }

    pub async fn set_video_enabled(&self, enabled: bool) {
        self.inner.lock().await.set_video_enabled(enabled);
    }

    pub async fn set_audio_enabled(&self, enabled: bool) {
        self.inner.lock().await.set_audio_enabled(enabled);
    }

    /// Returns the new video state
    pub async fn toggle_video(&self) -> bool {
        let mut inner = self.inner.lock().await;
        let enabled = !inner.video_enabled;
        inner.set_video_enabled(enabled);
        enabled
    }

    /// Returns the new audio state
    pub async fn toggle_audio(&self) -> bool {
        let mut inner = self.inner.lock().await;
        let enabled = !inner.audio_enabled;
        inner.set_audio_enabled(enabled);
        enabled
    }

    pub async fn phase(&self) -> CallPhase {
        self.inner.lock().await.phase
    }

    /// Local stream of the current attempt, if media is held
    pub async fn local_stream(&self) -> Option<LocalStream> {
        let inner = self.inner.lock().await;
        inner.context.as_ref()?.local_stream().cloned()
    }

    pub async fn snapshot(&self) -> CallSnapshot {
        let inner = self.inner.lock().await;
        let ctx = inner.context.as_ref();
        CallSnapshot {
            phase: inner.phase,
            view: inner.view(),
            session_id: inner.descriptor.as_ref().map(|d| d.id.clone()),
            attempt: ctx.map(SessionConnectionContext::attempt),
            connection_state: ctx.map(SessionConnectionContext::state),
            remaining: ctx.and_then(SessionConnectionContext::remaining),
            video_enabled: inner.video_enabled,
            audio_enabled: inner.audio_enabled,
            remote_tracks: ctx.map(|c| c.remote_tracks.clone()).unwrap_or_default(),
        }
    }
}

async fn expire_admission(manager: WeakManager, timeout: Duration, token: CancellationToken) {
    tokio::select! {
        _ = token.cancelled() => return,
        _ = time::sleep(timeout) => {}
    }
    let Some(manager) = manager.upgrade() else {
        return;
    };
    info!("Incoming call was not answered within {}s", timeout.as_secs());
    if let Err(e) = manager.close_admission(true).await {
        debug!("Admission already closed: {}", e);
    }
}

/// Per-attempt event loop: transport callbacks, countdown events and the
/// reconnect window.
async fn pump_events(
    manager: WeakManager,
    attempt: AttemptId,
    token: CancellationToken,
    mut transport_rx: mpsc::UnboundedReceiver<TransportEvent>,
    mut timer_rx: mpsc::UnboundedReceiver<TimerEvent>,
    recovery_window: Option<Duration>,
) {
    let mut recovery_deadline: Option<Instant> = None;
    let mut transport_open = true;
    let mut timer_open = true;

    loop {
        let deadline = recovery_deadline;
        let recovery = async move {
            match deadline {
                Some(deadline) => time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            event = timer_rx.recv(), if timer_open => {
                let Some(event) = event else {
                    timer_open = false;
                    continue;
                };
                let Some(manager) = manager.upgrade() else { break };
                manager.on_timer_event(attempt, event).await;
            }
            event = transport_rx.recv(), if transport_open => {
                let Some(event) = event else {
                    transport_open = false;
                    continue;
                };
                let Some(manager) = manager.upgrade() else { break };
                match manager.on_transport_event(attempt, event).await {
                    Some(ConnectionState::Reconnecting) => {
                        recovery_deadline = recovery_window.map(|window| Instant::now() + window);
                    }
                    Some(_) => recovery_deadline = None,
                    None => {}
                }
            }
            _ = recovery => {
                recovery_deadline = None;
                let Some(manager) = manager.upgrade() else { break };
                manager.on_recovery_timeout(attempt).await;
            }
        }
    }
    debug!("Event pump for attempt {} stopped", attempt);
}
