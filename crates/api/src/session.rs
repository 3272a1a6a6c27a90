//! Session coordinator and frame loop
//!
//! HTTP handlers and the frame loop share one `SessionState` behind a mutex.
//! The loop runs on the blocking pool, owns the camera handle, and hands
//! encoded multipart chunks to the response body over a bounded channel.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use attention::{
    AttentionClock, AttentionMonitor, AttentionStatus, ClockTotals, Emotion, EmotionCounts,
    EmotionTally, FrameAnalysis,
};
use axum::body::Bytes;
use camera_capture::{encode_jpeg, CameraError, CameraProvider, FrameSource};
use serde::Serialize;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, error, info, warn};

use crate::config::SessionConfig;
use crate::error::ApiError;
use crate::overlay;

/// Multipart boundary of the MJPEG stream
pub const BOUNDARY: &str = "frame";

/// Pause between send attempts while the consumer is not reading
const SEND_RETRY: Duration = Duration::from_millis(10);

/// Shared session fields
#[derive(Debug, Default)]
struct SessionState {
    streaming: bool,
    /// Bumped by every stream start; loops with an older value stop
    generation: u64,
    session_open: bool,
    clock: AttentionClock,
    tally: EmotionTally,
    current_emotion: Emotion,
    last_status: AttentionStatus,
    frames: u64,
}

/// Results handed over when a session ends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTotals {
    pub clock: ClockTotals,
    pub emotions: EmotionCounts,
    pub frames: u64,
}

/// Live view of the session for the health endpoint
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub streaming: bool,
    pub session_open: bool,
    pub status: AttentionStatus,
    pub emotion: Emotion,
    pub attentive_secs: i64,
    pub distracted_secs: i64,
    pub frames: u64,
}

/// Owns the session lifecycle
pub struct SessionCoordinator {
    camera: Arc<dyn CameraProvider>,
    monitor: Arc<Mutex<AttentionMonitor>>,
    settings: SessionConfig,
    state: Arc<Mutex<SessionState>>,
    /// One permit: held by the frame loop that owns the camera handle
    camera_slot: Arc<Semaphore>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // state survives a panicked frame loop
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl SessionCoordinator {
    pub fn new(
        camera: Arc<dyn CameraProvider>,
        monitor: AttentionMonitor,
        settings: SessionConfig,
    ) -> Self {
        Self {
            camera,
            monitor: Arc::new(Mutex::new(monitor)),
            settings,
            state: Arc::new(Mutex::new(SessionState::default())),
            camera_slot: Arc::new(Semaphore::new(1)),
        }
    }

    pub fn settings(&self) -> &SessionConfig {
        &self.settings
    }

    /// Open the camera and start streaming.
    ///
    /// Begins a new session when none is open; otherwise the open session
    /// resumes. Any loop started earlier is superseded.
    pub async fn start_stream(&self) -> Result<mpsc::Receiver<Bytes>, ApiError> {
        let permit = self.take_camera().await?;
        let camera = Arc::clone(&self.camera);
        let source = tokio::task::spawn_blocking(move || camera.open())
            .await
            .map_err(|e| ApiError::Internal(format!("camera open task failed: {e}")))??;

        let generation = {
            let mut state = lock(&self.state);
            if !state.session_open {
                state.clock.reset();
                state.tally.reset();
                state.current_emotion = Emotion::default();
                state.last_status = AttentionStatus::default();
                state.frames = 0;
                state.session_open = true;
                info!("Session started");
            }
            state.generation += 1;
            state.streaming = true;
            if !state.clock.is_running() {
                state.clock.start(Instant::now());
            }
            state.generation
        };

        let (tx, rx) = mpsc::channel(self.settings.channel_capacity.max(1));
        let frame_loop = FrameLoop {
            generation,
            source,
            permit,
            monitor: Arc::clone(&self.monitor),
            state: Arc::clone(&self.state),
            settings: self.settings.clone(),
            tx,
        };
        tokio::task::spawn_blocking(move || frame_loop.run());

        info!("Stream {} started", generation);
        Ok(rx)
    }

    /// Stop any running loop and wait until it has dropped its camera handle.
    ///
    /// Retried until the slot frees, so the newest caller supersedes a loop
    /// that another caller started in the meantime.
    async fn take_camera(&self) -> Result<OwnedSemaphorePermit, ApiError> {
        // a loop notices within one read timeout plus one send retry
        let deadline = Instant::now() + self.settings.read_timeout() + Duration::from_secs(1);
        loop {
            {
                let mut state = lock(&self.state);
                if state.streaming {
                    state.clock.stop(Instant::now());
                    state.streaming = false;
                    debug!("Stream {} superseded", state.generation);
                }
            }

            if let Ok(permit) = Arc::clone(&self.camera_slot).try_acquire_owned() {
                return Ok(permit);
            }
            if Instant::now() >= deadline {
                return Err(ApiError::Camera(CameraError::Open(
                    "camera still held by the previous stream".to_string(),
                )));
            }
            tokio::time::sleep(SEND_RETRY).await;
        }
    }

    /// End the session: flush the clock, stop streaming, return the totals.
    ///
    /// Without an open session the totals are zero.
    pub fn stop_session(&self) -> SessionTotals {
        let mut state = lock(&self.state);
        if !state.session_open {
            return SessionTotals {
                clock: ClockTotals::default(),
                emotions: EmotionCounts::default(),
                frames: 0,
            };
        }

        let clock = state.clock.stop(Instant::now());
        state.streaming = false;
        state.session_open = false;
        info!(
            "Session ended: {}s attentive, {}s distracted over {} frames",
            clock.attentive_secs(),
            clock.distracted_secs(),
            state.frames
        );

        SessionTotals {
            clock,
            emotions: state.tally.counts(),
            frames: state.frames,
        }
    }

    /// Stop streaming and release the camera, keeping the session open.
    ///
    /// Returns whether a stream was running.
    pub fn release_camera(&self) -> bool {
        let mut state = lock(&self.state);
        if !state.streaming {
            return false;
        }
        state.clock.stop(Instant::now());
        state.streaming = false;
        info!("Camera released; session paused");
        true
    }

    pub fn is_streaming(&self) -> bool {
        lock(&self.state).streaming
    }

    pub fn current_emotion(&self) -> Emotion {
        lock(&self.state).current_emotion
    }

    /// Whether accumulated attentive time is strictly above the flag threshold
    pub fn threshold_exceeded(&self) -> bool {
        lock(&self.state).clock.totals().attentive > self.settings.flag_threshold()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let state = lock(&self.state);
        let totals = state.clock.totals();
        SessionSnapshot {
            streaming: state.streaming,
            session_open: state.session_open,
            status: state.last_status,
            emotion: state.current_emotion,
            attentive_secs: totals.attentive_secs(),
            distracted_secs: totals.distracted_secs(),
            frames: state.frames,
        }
    }
}

/// Frame loop actor for one stream
struct FrameLoop {
    generation: u64,
    source: Box<dyn FrameSource>,
    permit: OwnedSemaphorePermit,
    monitor: Arc<Mutex<AttentionMonitor>>,
    state: Arc<Mutex<SessionState>>,
    settings: SessionConfig,
    tx: mpsc::Sender<Bytes>,
}

impl FrameLoop {
    fn run(mut self) {
        lock(&self.monitor).reset();

        let timeout = self.settings.read_timeout();
        let mut failures = 0u32;

        loop {
            if !self.is_current() {
                debug!("Stream {} stopped at frame boundary", self.generation);
                break;
            }

            let frame = match self.source.read_frame(timeout) {
                Ok(frame) => {
                    failures = 0;
                    frame
                }
                Err(CameraError::Timeout) => {
                    failures += 1;
                    metrics::counter!("attention_frames_skipped_total").increment(1);
                    if failures >= self.settings.max_consecutive_failures {
                        error!("Camera timed out {} times in a row; ending stream", failures);
                        break;
                    }
                    warn!("Camera read timed out ({}/{})", failures, self.settings.max_consecutive_failures);
                    continue;
                }
                Err(e) => {
                    error!("Camera read failed: {}", e);
                    break;
                }
            };

            let started = Instant::now();
            let analysis = match lock(&self.monitor).analyze(&frame) {
                Ok(analysis) => analysis,
                Err(e) => {
                    warn!("Skipping frame {}: {}", frame.sequence, e);
                    metrics::counter!("attention_frames_skipped_total").increment(1);
                    continue;
                }
            };

            if !self.record(&analysis) {
                break;
            }

            let shown = if self.settings.overlay {
                overlay::annotate(&frame, &analysis)
            } else {
                frame
            };
            let jpeg = match encode_jpeg(&shown, self.settings.jpeg_quality) {
                Ok(jpeg) => jpeg,
                Err(e) => {
                    warn!("Frame {} not streamed: {}", shown.sequence, e);
                    continue;
                }
            };

            metrics::counter!("attention_frames_total").increment(1);
            metrics::histogram!("attention_frame_seconds").record(started.elapsed().as_secs_f64());

            if !self.send(multipart_part(&jpeg)) {
                break;
            }
        }

        self.finish();
    }

    /// Hand a part to the response body; false once the stream should end.
    ///
    /// A consumer that stops reading must not keep the loop from seeing a stop.
    fn send(&self, mut part: Bytes) -> bool {
        loop {
            match self.tx.try_send(part) {
                Ok(()) => return true,
                Err(TrySendError::Closed(_)) => {
                    info!("Stream {} consumer disconnected", self.generation);
                    return false;
                }
                Err(TrySendError::Full(back)) => {
                    if !self.is_current() {
                        debug!("Stream {} stopped while consumer stalled", self.generation);
                        return false;
                    }
                    part = back;
                    std::thread::sleep(SEND_RETRY);
                }
            }
        }
    }

    fn is_current(&self) -> bool {
        let state = lock(&self.state);
        state.streaming && state.generation == self.generation
    }

    /// One tick per frame plus the emotions; false once superseded
    fn record(&self, analysis: &FrameAnalysis) -> bool {
        let mut state = lock(&self.state);
        if !(state.streaming && state.generation == self.generation) {
            return false;
        }

        state.clock.tick(Instant::now(), analysis.bucket);
        for emotion in &analysis.emotions {
            state.tally.record(*emotion);
        }
        if let Some(emotion) = analysis.latest_emotion() {
            state.current_emotion = emotion;
        }
        state.last_status = analysis.status;
        state.frames += 1;
        true
    }

    fn finish(self) {
        let FrameLoop {
            generation,
            source,
            permit,
            state,
            ..
        } = self;
        drop(source);
        drop(permit);

        let mut state = lock(&state);
        if state.streaming && state.generation == generation {
            state.clock.stop(Instant::now());
            state.streaming = false;
        }
        info!("Stream {} ended; camera released", generation);
    }
}

/// One part of the multipart/x-mixed-replace body
pub fn multipart_part(jpeg: &[u8]) -> Bytes {
    let header = format!("--{BOUNDARY}\r\nContent-Type: image/jpeg\r\n\r\n");
    let mut part = Vec::with_capacity(header.len() + jpeg.len() + 2);
    part.extend_from_slice(header.as_bytes());
    part.extend_from_slice(jpeg);
    part.extend_from_slice(b"\r\n");
    Bytes::from(part)
}

#[cfg(test)]
mod tests {
    use super::*;
    use attention::synthetic::FaceSpec;
    use attention::{
        AttentionConfig, AttentionError, CameraIntrinsics, EmotionClassifier, FaceBbox,
        FaceLandmarks, LandmarkDetector,
    };
    use camera_capture::{CameraConfig, SourceKind, VideoFrame};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedFaces(Option<FaceSpec>);

    impl LandmarkDetector for FixedFaces {
        fn detect(&mut self, frame: &VideoFrame) -> Result<Vec<FaceLandmarks>, AttentionError> {
            let camera = CameraIntrinsics::for_frame(frame.width, frame.height);
            Ok(self.0.iter().map(|spec| spec.face(&camera)).collect())
        }
    }

    struct Always(Emotion);

    impl EmotionClassifier for Always {
        fn classify(&mut self, _frame: &VideoFrame, _face: &FaceBbox) -> Result<Emotion, AttentionError> {
            Ok(self.0)
        }
    }

    fn camera(frame_limit: Option<u64>) -> Arc<CameraConfig> {
        Arc::new(CameraConfig {
            source: SourceKind::Synthetic,
            width: 160,
            height: 120,
            fps: 100,
            frame_limit,
            ..Default::default()
        })
    }

    /// Wait until `pred` holds or `timeout` passes
    async fn wait_for(timeout: Duration, mut pred: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if pred() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        pred()
    }

    /// A single device: a second open fails while a handle is alive
    struct ExclusiveCamera {
        config: CameraConfig,
        handles: Arc<AtomicUsize>,
    }

    struct Handle {
        inner: Box<dyn FrameSource>,
        handles: Arc<AtomicUsize>,
    }

    impl FrameSource for Handle {
        fn read_frame(&mut self, timeout: Duration) -> Result<VideoFrame, CameraError> {
            self.inner.read_frame(timeout)
        }
    }

    impl Drop for Handle {
        fn drop(&mut self) {
            self.handles.fetch_sub(1, Ordering::SeqCst);
        }
    }

    impl CameraProvider for ExclusiveCamera {
        fn open(&self) -> Result<Box<dyn FrameSource>, CameraError> {
            if self.handles.fetch_add(1, Ordering::SeqCst) > 0 {
                self.handles.fetch_sub(1, Ordering::SeqCst);
                return Err(CameraError::Open("device busy".to_string()));
            }
            match self.config.open() {
                Ok(inner) => Ok(Box::new(Handle {
                    inner,
                    handles: Arc::clone(&self.handles),
                })),
                Err(e) => {
                    self.handles.fetch_sub(1, Ordering::SeqCst);
                    Err(e)
                }
            }
        }
    }

    fn monitor(face: Option<FaceSpec>) -> AttentionMonitor {
        AttentionMonitor::with_detectors(
            AttentionConfig::default(),
            Box::new(FixedFaces(face)),
            Box::new(Always(Emotion::Happy)),
        )
        .unwrap()
    }

    fn settings() -> SessionConfig {
        SessionConfig {
            flag_threshold_secs: 0,
            ..Default::default()
        }
    }

    fn coordinator(face: Option<FaceSpec>, frame_limit: Option<u64>) -> SessionCoordinator {
        SessionCoordinator::new(camera(frame_limit), monitor(face), settings())
    }

    fn exclusive(face: Option<FaceSpec>) -> (SessionCoordinator, Arc<AtomicUsize>) {
        let handles = Arc::new(AtomicUsize::new(0));
        let camera = Arc::new(ExclusiveCamera {
            config: (*camera(None)).clone(),
            handles: Arc::clone(&handles),
        });
        (SessionCoordinator::new(camera, monitor(face), settings()), handles)
    }

    async fn drain(rx: &mut mpsc::Receiver<Bytes>, n: usize) -> Vec<Bytes> {
        let mut parts = Vec::new();
        while parts.len() < n {
            match rx.recv().await {
                Some(part) => parts.push(part),
                None => break,
            }
        }
        parts
    }

    #[tokio::test]
    async fn test_open_eyes_session_is_attentive() {
        let session = coordinator(Some(FaceSpec::with_eyes(0.3)), Some(10));
        let mut rx = session.start_stream().await.unwrap();
        assert!(session.is_streaming());

        let parts = drain(&mut rx, 10).await;
        assert_eq!(parts.len(), 10);
        assert!(parts[0].starts_with(b"--frame\r\nContent-Type: image/jpeg\r\n\r\n"));
        assert!(parts[0].ends_with(b"\r\n"));

        // the exhausted camera ends the stream and pauses the clock
        assert!(rx.recv().await.is_none());
        assert!(wait_for(Duration::from_secs(2), || !session.is_streaming()).await);
        assert_eq!(session.current_emotion(), Emotion::Happy);

        let totals = session.stop_session();
        assert_eq!(totals.frames, 10);
        assert!(totals.clock.attentive > Duration::ZERO);
        assert_eq!(totals.clock.distracted, Duration::ZERO);
        assert_eq!(totals.emotions.happy, 10);
    }

    #[tokio::test]
    async fn test_absent_face_is_all_distracted() {
        let session = coordinator(None, None);
        let mut rx = session.start_stream().await.unwrap();
        drain(&mut rx, 5).await;

        let totals = session.stop_session();
        assert!(!session.is_streaming());
        assert_eq!(totals.clock.attentive, Duration::ZERO);
        assert!(totals.clock.distracted > Duration::ZERO);
        assert_eq!(totals.emotions, EmotionCounts::default());
        assert_eq!(session.current_emotion(), Emotion::Neutral);
    }

    #[tokio::test]
    async fn test_stop_ends_loop_and_discards_late_frames() {
        let session = coordinator(Some(FaceSpec::default()), None);
        let mut rx = session.start_stream().await.unwrap();
        drain(&mut rx, 2).await;

        let totals = session.stop_session();
        // the loop notices at the next frame boundary and closes the channel
        while rx.recv().await.is_some() {}
        let snapshot = session.snapshot();
        assert_eq!(snapshot.frames, totals.frames);
        assert!(!snapshot.session_open);
    }

    #[tokio::test]
    async fn test_new_session_resets_tally_and_totals() {
        let session = coordinator(Some(FaceSpec::default()), None);
        let mut rx = session.start_stream().await.unwrap();
        drain(&mut rx, 3).await;
        let first = session.stop_session();
        assert!(first.emotions.happy >= 3);
        drop(rx);

        let mut rx = session.start_stream().await.unwrap();
        drain(&mut rx, 1).await;
        let second = session.stop_session();
        // counts restart from zero rather than continuing the first session
        assert!(second.frames >= 1);
        assert_eq!(second.emotions.happy, second.frames);
    }

    #[tokio::test]
    async fn test_release_camera_keeps_session() {
        let session = coordinator(Some(FaceSpec::default()), None);
        let mut rx = session.start_stream().await.unwrap();
        drain(&mut rx, 3).await;

        assert!(session.release_camera());
        assert!(!session.release_camera());
        while rx.recv().await.is_some() {}
        let paused = session.snapshot();
        assert!(paused.session_open);
        assert!(!paused.streaming);

        // resuming continues the same tally
        let mut rx = session.start_stream().await.unwrap();
        drain(&mut rx, 2).await;
        let totals = session.stop_session();
        assert!(totals.frames >= paused.frames + 2);
        assert_eq!(totals.emotions.happy, totals.frames);
    }

    #[tokio::test]
    async fn test_dropped_consumer_stops_stream() {
        let session = coordinator(Some(FaceSpec::default()), None);
        let rx = session.start_stream().await.unwrap();
        drop(rx);
        assert!(wait_for(Duration::from_secs(2), || !session.is_streaming()).await);
    }

    #[tokio::test]
    async fn test_stop_with_stalled_consumer_releases_camera() {
        let (session, handles) = exclusive(Some(FaceSpec::default()));
        let _rx = session.start_stream().await.unwrap();
        assert_eq!(handles.load(Ordering::SeqCst), 1);

        // nobody reads: the channel fills and the loop waits on the consumer
        let capacity = session.settings().channel_capacity as u64;
        assert!(wait_for(Duration::from_secs(2), || session.snapshot().frames > capacity).await);

        session.stop_session();
        assert!(wait_for(Duration::from_secs(2), || handles.load(Ordering::SeqCst) == 0).await);
    }

    #[tokio::test]
    async fn test_restart_waits_for_previous_handle() {
        let (session, handles) = exclusive(Some(FaceSpec::default()));
        let mut first = session.start_stream().await.unwrap();
        drain(&mut first, 2).await;

        // a second viewer takes over the single device
        let mut second = session.start_stream().await.unwrap();
        while first.recv().await.is_some() {}
        assert_eq!(drain(&mut second, 3).await.len(), 3);
        assert_eq!(handles.load(Ordering::SeqCst), 1);
        assert!(session.is_streaming());

        session.stop_session();
        assert!(wait_for(Duration::from_secs(2), || handles.load(Ordering::SeqCst) == 0).await);
    }

    #[tokio::test]
    async fn test_camera_open_failure_is_reported() {
        let monitor = AttentionMonitor::with_detectors(
            AttentionConfig::default(),
            Box::new(FixedFaces(None)),
            Box::new(Always(Emotion::Neutral)),
        )
        .unwrap();
        let broken = Arc::new(CameraConfig {
            source: SourceKind::Directory,
            device: "/nonexistent/frames".into(),
            ..Default::default()
        });
        let session = SessionCoordinator::new(broken, monitor, SessionConfig::default());

        let err = session.start_stream().await.unwrap_err();
        assert!(matches!(err, ApiError::Camera(CameraError::Open(_))));
        assert!(!session.is_streaming());
        assert!(!session.snapshot().session_open);
    }

    #[tokio::test]
    async fn test_flag_threshold_is_strict() {
        let session = coordinator(Some(FaceSpec::default()), None);
        // zero threshold: any attentive time raises the flag
        assert!(!session.threshold_exceeded());
        let mut rx = session.start_stream().await.unwrap();
        drain(&mut rx, 3).await;
        assert!(session.threshold_exceeded());
        session.stop_session();
    }

    #[test]
    fn test_stop_without_session_is_zero() {
        let session = coordinator(None, None);
        let totals = session.stop_session();
        assert_eq!(totals.frames, 0);
        assert_eq!(totals.clock, ClockTotals::default());
    }
}
