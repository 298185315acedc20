// Local media acquisition
//
// Requests camera and microphone together, hands out a shareable stream
// handle and guarantees every track is stopped exactly once.

use async_trait::async_trait;
use log::{debug, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

use super::error::{DeviceFailure, MediaError};
use super::types::TrackKind;
use super::{DeviceTrack, MediaDevices, TrackInfo};

/// A device track plus its enable flag.
#[derive(Debug)]
pub struct LocalTrack {
    device: Box<dyn DeviceTrack>,
    enabled: AtomicBool,
    stopped: AtomicBool,
}

impl LocalTrack {
    fn new(device: Box<dyn DeviceTrack>) -> Self {
        Self {
            device,
            enabled: AtomicBool::new(true),
            stopped: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> &str {
        self.device.id()
    }

    pub fn kind(&self) -> TrackKind {
        self.device.kind()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    fn set_enabled(&self, enabled: bool) {
        if self.is_stopped() {
            return;
        }
        self.enabled.store(enabled, Ordering::SeqCst);
        self.device.set_enabled(enabled);
    }

    /// Returns true only for the call that actually stopped the device.
    fn stop(&self) -> bool {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.device.stop();
        true
    }
}

impl Drop for LocalTrack {
    fn drop(&mut self) {
        self.stop();
    }
}

#[derive(Debug)]
struct StreamInner {
    id: String,
    tracks: Vec<LocalTrack>,
}

/// Handle to the local camera + microphone stream.
///
/// Cheap to clone; all clones share the same tracks.
#[derive(Debug, Clone)]
pub struct LocalStream {
    inner: Arc<StreamInner>,
}

impl LocalStream {
    fn new(tracks: Vec<LocalTrack>) -> Self {
        Self {
            inner: Arc::new(StreamInner {
                id: format!("local-{}", Uuid::new_v4()),
                tracks,
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn tracks(&self) -> &[LocalTrack] {
        &self.inner.tracks
    }

    /// Track descriptions for attaching to a transport
    pub fn track_infos(&self) -> Vec<TrackInfo> {
        self.inner
            .tracks
            .iter()
            .map(|track| TrackInfo {
                id: track.id().to_string(),
                stream_id: self.inner.id.clone(),
                kind: track.kind(),
            })
            .collect()
    }

    pub fn set_video_enabled(&self, enabled: bool) {
        self.set_kind_enabled(TrackKind::Video, enabled);
    }

    pub fn set_audio_enabled(&self, enabled: bool) {
        self.set_kind_enabled(TrackKind::Audio, enabled);
    }

    fn set_kind_enabled(&self, kind: TrackKind, enabled: bool) {
        for track in self.inner.tracks.iter().filter(|t| t.kind() == kind) {
            track.set_enabled(enabled);
        }
    }

    /// Stop every track; returns how many were actually stopped by this call.
    pub fn stop_all(&self) -> usize {
        self.inner.tracks.iter().filter(|t| t.stop()).count()
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.tracks.iter().all(LocalTrack::is_stopped)
    }
}

/// Request camera and microphone concurrently and fold any failure into
/// the media error taxonomy.
///
/// If only one device opens, it is stopped before the error is returned.
pub async fn acquire_local_media(devices: &dyn MediaDevices) -> Result<LocalStream, MediaError> {
    let (camera, microphone) = tokio::join!(devices.open_camera(), devices.open_microphone());

    match (camera, microphone) {
        (Ok(camera), Ok(microphone)) => {
            let stream = LocalStream::new(vec![LocalTrack::new(camera), LocalTrack::new(microphone)]);
            info!("Local media acquired ({})", stream.id());
            Ok(stream)
        }
        (camera, microphone) => {
            let failure = match (&camera, &microphone) {
                (Err(failure), _) | (_, Err(failure)) => MediaError::classify(failure),
                _ => MediaError::Unknown("device acquisition failed".to_string()),
            };
            for track in [camera, microphone].into_iter().flatten() {
                track.stop();
            }
            warn!("Local media acquisition failed: {}", failure);
            Err(failure)
        }
    }
}

/// Media state owned by a single call attempt
pub struct MediaAcquisition {
    devices: Arc<dyn MediaDevices>,
    stream: Option<LocalStream>,
    video_enabled: bool,
    audio_enabled: bool,
}

impl MediaAcquisition {
    pub fn new(devices: Arc<dyn MediaDevices>, video_enabled: bool, audio_enabled: bool) -> Self {
        Self {
            devices,
            stream: None,
            video_enabled,
            audio_enabled,
        }
    }

    pub fn devices(&self) -> Arc<dyn MediaDevices> {
        self.devices.clone()
    }

    /// Acquire and hold a fresh stream.
    pub async fn acquire_local_media(&mut self) -> Result<LocalStream, MediaError> {
        self.release();
        let stream = acquire_local_media(self.devices.as_ref()).await?;
        Ok(self.install(stream))
    }

    /// Take ownership of a stream acquired elsewhere and apply the current
    /// enable flags to it.
    pub fn install(&mut self, stream: LocalStream) -> LocalStream {
        self.release();
        stream.set_video_enabled(self.video_enabled);
        stream.set_audio_enabled(self.audio_enabled);
        self.stream = Some(stream.clone());
        stream
    }

    pub fn stream(&self) -> Option<&LocalStream> {
        self.stream.as_ref()
    }

    pub fn video_enabled(&self) -> bool {
        self.video_enabled
    }

    pub fn audio_enabled(&self) -> bool {
        self.audio_enabled
    }

    /// Flip the video flag in place; no renegotiation, no-op on the track
    /// when nothing is held.
    pub fn set_video_enabled(&mut self, enabled: bool) {
        self.video_enabled = enabled;
        if let Some(stream) = &self.stream {
            stream.set_video_enabled(enabled);
        }
    }

    pub fn set_audio_enabled(&mut self, enabled: bool) {
        self.audio_enabled = enabled;
        if let Some(stream) = &self.stream {
            stream.set_audio_enabled(enabled);
        }
    }

    /// Stop every track and drop the handle. Safe to call at any time.
    pub fn release(&mut self) -> bool {
        match self.stream.take() {
            Some(stream) => {
                let stopped = stream.stop_all();
                debug!("Released local stream {} ({} tracks stopped)", stream.id(), stopped);
                true
            }
            None => false,
        }
    }
}

impl Drop for MediaAcquisition {
    fn drop(&mut self) {
        self.release();
    }
}

/// Track produced by [`SyntheticDevices`]
#[derive(Debug)]
pub struct SyntheticTrack {
    id: String,
    kind: TrackKind,
    enabled: AtomicBool,
    stopped: Arc<AtomicBool>,
}

impl DeviceTrack for SyntheticTrack {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> TrackKind {
        self.kind
    }

    fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }
}

/// Test-pattern camera and silent microphone, for simulation.
#[derive(Debug, Clone, Default)]
pub struct SyntheticDevices {
    failure: Option<(String, String)>,
}

impl SyntheticDevices {
    pub fn new() -> Self {
        Self::default()
    }

    /// Devices that fail with a platform-named error on every request
    pub fn failing(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            failure: Some((name.into(), message.into())),
        }
    }

    /// Devices whose permission prompt is always declined
    pub fn denied() -> Self {
        Self::failing("NotAllowedError", "Permission denied by user")
    }

    fn open(&self, kind: TrackKind) -> Result<Box<dyn DeviceTrack>, DeviceFailure> {
        if let Some((name, message)) = &self.failure {
            return Err(DeviceFailure::named(name.clone(), message.clone()));
        }
        Ok(Box::new(SyntheticTrack {
            id: format!("synthetic-{}-{}", kind, Uuid::new_v4()),
            kind,
            enabled: AtomicBool::new(true),
            stopped: Arc::new(AtomicBool::new(false)),
        }))
    }
}

#[async_trait]
impl MediaDevices for SyntheticDevices {
    async fn open_camera(&self) -> Result<Box<dyn DeviceTrack>, DeviceFailure> {
        self.open(TrackKind::Video)
    }

    async fn open_microphone(&self) -> Result<Box<dyn DeviceTrack>, DeviceFailure> {
        self.open(TrackKind::Audio)
    }
}
