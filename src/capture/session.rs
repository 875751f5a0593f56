//! Capture session state machine
//!
//! ```text
//!   Idle --start--> Starting --first frame--> Capturing --stop--> Stopping --> Idle
//!                      |                         |
//!                      +--failure/cancel--> Idle  +--start (implicit stop)--> Starting
//! ```
//!
//! At most one session exists per [`CaptureSession`]. A start while another
//! start or stop is in flight fails with [`ScoutError::SessionBusy`]; a start
//! while capturing stops and joins the running session first.
//!
//! Acquisition runs off the caller's thread. Target resolution goes through
//! `spawn_blocking`, then a dedicated worker thread opens the frame source,
//! waits for the first frame and reports back over a oneshot channel. The
//! same worker then keeps publishing into the [`FrameBuffer`] until stopped.
//!
//! Acquisition is all-or-nothing: on any failure the worker closes whatever
//! it opened before reporting the error. A start that is abandoned mid-way
//! (its future dropped) leaves the session in `Stopping` until the worker
//! has closed its source; the next start or stop waits for that.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::oneshot;

use super::config::SessionConfig;
use super::frame::Frame;
use super::frame_buffer::FrameBuffer;
use super::mailbox::StopSignal;
use super::traits::{CaptureBackend, FrameSource};
use crate::error::{ScoutError, ScoutResult};
use crate::model::{CaptureMode, ResolvedTarget, SessionInfo, SessionPhase, TargetDescriptor};
use crate::util::encode::{FrameEncoding, encode_frame};

/// Failed iterations between repeated warnings while a window stays unavailable
const WARN_EVERY_FAILURES: u64 = 50;

struct ActiveSession {
    target:     ResolvedTarget,
    mode:       CaptureMode,
    started_at: DateTime<Utc>,
    encoding:   FrameEncoding,
    stop:       StopSignal,
    /// Fires once the worker has closed its source and returned
    exited:     StopSignal,
    published:  Arc<AtomicU64>,
    worker:     Option<JoinHandle<()>>,
}

impl ActiveSession {
    fn info(&self) -> SessionInfo {
        SessionInfo {
            target:           self.target.clone(),
            mode:             self.mode,
            frames_published: self.published.load(Ordering::SeqCst),
            started_at:       self.started_at,
        }
    }

    /// Signals the worker and waits for it to release the frame source
    fn shutdown(mut self) {
        self.stop.trigger();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::error!("Capture worker panicked during shutdown");
            }
        }
    }
}

enum SessionState {
    Idle,
    Starting { cancel: StopSignal },
    Capturing(ActiveSession),
    Stopping,
    /// A start was abandoned while its worker still holds a source
    Releasing { exited: StopSignal },
}

impl SessionState {
    fn phase(&self) -> SessionPhase {
        match self {
            SessionState::Idle => SessionPhase::Idle,
            SessionState::Starting { .. } => SessionPhase::Starting,
            SessionState::Capturing(_) => SessionPhase::Capturing,
            SessionState::Stopping => SessionPhase::Stopping,
            SessionState::Releasing { exited } if exited.is_triggered() => SessionPhase::Idle,
            SessionState::Releasing { .. } => SessionPhase::Stopping,
        }
    }
}

/// What a start has to wind down before acquiring its own source
enum Superseded {
    Running(ActiveSession),
    Exiting(StopSignal),
}

/// Owner of the single live capture resource
pub struct CaptureSession {
    backend: Arc<dyn CaptureBackend>,
    buffer:  Arc<FrameBuffer>,
    state:   Mutex<SessionState>,
}

impl std::fmt::Debug for CaptureSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureSession")
            .field("backend", &self.backend.name())
            .field("phase", &self.phase())
            .finish()
    }
}

/// Returns the state to `Idle` if a start unwinds without committing
///
/// Covers early returns as well as the start future being dropped. While a
/// worker named by `pending` has not exited yet the state becomes
/// `Releasing` instead, so no second source can be opened next to it.
struct StartGuard<'a> {
    session: &'a CaptureSession,
    cancel:  StopSignal,
    pending: Option<StopSignal>,
    armed:   bool,
}

impl StartGuard<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for StartGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        // Lets a worker that is still acquiring wind down on its own
        self.cancel.trigger();
        let mut state = self.session.state.lock();
        if matches!(&*state, SessionState::Starting { cancel } if cancel.same_as(&self.cancel)) {
            *state = match self.pending.take() {
                Some(exited) if !exited.is_triggered() => {
                    tracing::debug!("Start abandoned while its worker is still running");
                    SessionState::Releasing { exited }
                }
                _ => SessionState::Idle,
            };
        }
    }
}

impl CaptureSession {
    pub fn new(backend: Arc<dyn CaptureBackend>) -> Self {
        Self {
            backend,
            buffer: Arc::new(FrameBuffer::new()),
            state: Mutex::new(SessionState::Idle),
        }
    }

    /// Name of the backend frames come from
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn phase(&self) -> SessionPhase {
        self.state.lock().phase()
    }

    /// Details of the running session, if capturing
    pub fn info(&self) -> Option<SessionInfo> {
        match &*self.state.lock() {
            SessionState::Capturing(active) => Some(active.info()),
            _ => None,
        }
    }

    /// Most recent frame; `None` unless a session is capturing
    ///
    /// Never waits on the capture worker.
    pub fn latest_frame(&self) -> Option<Arc<Frame>> {
        if !matches!(&*self.state.lock(), SessionState::Capturing(_)) {
            return None;
        }
        self.buffer.read_latest()
    }

    /// Most recent frame encoded per the session's configuration
    ///
    /// Returns an empty vector when no frame is available.
    pub fn latest_frame_encoded(&self) -> ScoutResult<Vec<u8>> {
        let encoding = match &*self.state.lock() {
            SessionState::Capturing(active) => active.encoding,
            _ => FrameEncoding::default(),
        };
        match self.latest_frame() {
            Some(frame) => encode_frame(&frame, encoding),
            None => Ok(Vec::new()),
        }
    }

    /// Starts capturing `target`
    ///
    /// Resolves once the first frame has been published (`Capturing`) or
    /// acquisition failed (`Idle`).
    #[tracing::instrument(skip_all, fields(target = %target, mode = %target.mode))]
    pub async fn start(
        &self,
        target: TargetDescriptor,
        config: SessionConfig,
    ) -> ScoutResult<SessionInfo> {
        let started = Instant::now();
        let cancel = StopSignal::new();

        let previous = {
            let mut state = self.state.lock();
            if matches!(&*state, SessionState::Starting { .. } | SessionState::Stopping) {
                let phase = state.phase();
                tracing::warn!(%phase, "Rejecting start while another transition is in flight");
                return Err(ScoutError::SessionBusy {
                    phase: phase.to_string(),
                });
            }
            let previous = std::mem::replace(
                &mut *state,
                SessionState::Starting {
                    cancel: cancel.clone(),
                },
            );
            match previous {
                SessionState::Capturing(active) => Some(Superseded::Running(active)),
                SessionState::Releasing { exited } if !exited.is_triggered() => {
                    Some(Superseded::Exiting(exited))
                }
                _ => None,
            }
        };
        let mut guard = StartGuard {
            session: self,
            cancel:  cancel.clone(),
            pending: None,
            armed:   true,
        };

        match previous {
            Some(Superseded::Running(active)) => {
                tracing::info!(window = %active.target.window, "Stopping running session before restart");
                guard.pending = Some(active.exited.clone());
                shutdown_blocking(active).await;
                self.buffer.clear();
            }
            Some(Superseded::Exiting(exited)) => {
                tracing::info!("Waiting for an abandoned capture worker to release its source");
                guard.pending = Some(exited.clone());
                wait_for_exit(exited).await;
                self.buffer.clear();
            }
            None => {}
        }
        guard.pending = None;
        if cancel.is_triggered() {
            return Err(ScoutError::SessionCancelled);
        }

        let resolved = self.resolve(&target, config.resolve_timeout).await?;
        if cancel.is_triggered() {
            return Err(ScoutError::SessionCancelled);
        }

        let published = Arc::new(AtomicU64::new(0));
        let exited = StopSignal::new();
        let (ready_tx, ready_rx) = oneshot::channel();
        let worker = CaptureWorker {
            backend:   Arc::clone(&self.backend),
            target:    resolved.clone(),
            requested: target.mode,
            config:    config.clone(),
            buffer:    Arc::clone(&self.buffer),
            stop:      cancel.clone(),
            exited:    exited.clone(),
            published: Arc::clone(&published),
        };
        let handle = thread::Builder::new()
            .name("screenscout-capture".to_string())
            .spawn(move || worker.run(ready_tx))?;
        guard.pending = Some(exited.clone());

        let mut active = ActiveSession {
            target: resolved,
            mode: target.mode,
            started_at: Utc::now(),
            encoding: config.encoding,
            stop: cancel.clone(),
            exited,
            published,
            worker: Some(handle),
        };

        let outcome = match ready_rx.await {
            Ok(outcome) => outcome,
            Err(_) => Err(ScoutError::init_failed(
                "worker",
                "capture worker exited before reporting",
            )),
        };
        let mode = match outcome {
            Ok(mode) => mode,
            Err(err) => {
                tracing::error!(error = %err, "Capture acquisition failed");
                shutdown_blocking(active).await;
                self.buffer.clear();
                return Err(err);
            }
        };
        active.mode = mode;

        let committed = {
            let mut state = self.state.lock();
            if cancel.is_triggered() {
                Err(active)
            } else {
                let info = active.info();
                *state = SessionState::Capturing(active);
                Ok(info)
            }
        };

        match committed {
            Ok(info) => {
                guard.disarm();
                tracing::info!(
                    window = %info.target.window,
                    pid = info.target.pid,
                    mode = %info.mode,
                    duration_ms = started.elapsed().as_millis() as u64,
                    "Capture session started"
                );
                Ok(info)
            }
            Err(abandoned) => {
                // Stop arrived between the first frame and the commit
                tracing::info!("Session start cancelled after acquisition");
                shutdown_blocking(abandoned).await;
                self.buffer.clear();
                Err(ScoutError::SessionCancelled)
            }
        }
    }

    /// Stops the running session and waits for the worker to release its
    /// capture resource
    ///
    /// Idempotent. While a start is in flight this cancels it instead; the
    /// start then fails with [`ScoutError::SessionCancelled`].
    #[tracing::instrument(skip_all, fields(backend = self.backend.name()))]
    pub fn stop(&self) -> ScoutResult<()> {
        let previous = {
            let mut state = self.state.lock();
            match std::mem::replace(&mut *state, SessionState::Stopping) {
                SessionState::Capturing(active) => Superseded::Running(active),
                SessionState::Releasing { exited } if !exited.is_triggered() => {
                    Superseded::Exiting(exited)
                }
                SessionState::Starting { cancel } => {
                    tracing::info!("Cancelling in-flight session start");
                    cancel.trigger();
                    *state = SessionState::Starting { cancel };
                    return Ok(());
                }
                other => {
                    let settled = match other {
                        SessionState::Releasing { .. } => SessionState::Idle,
                        other => other,
                    };
                    tracing::debug!(phase = %settled.phase(), "Nothing to stop");
                    *state = settled;
                    return Ok(());
                }
            }
        };

        let active = match previous {
            Superseded::Running(active) => active,
            Superseded::Exiting(exited) => {
                tracing::info!("Waiting for an abandoned capture worker to release its source");
                exited.wait();
                self.buffer.clear();
                *self.state.lock() = SessionState::Idle;
                return Ok(());
            }
        };

        let started = Instant::now();
        let window = active.target.window;
        let frames = active.published.load(Ordering::SeqCst);
        active.shutdown();
        self.buffer.clear();
        *self.state.lock() = SessionState::Idle;

        tracing::info!(
            %window,
            frames,
            duration_ms = started.elapsed().as_millis() as u64,
            "Capture session stopped"
        );
        Ok(())
    }

    async fn resolve(
        &self,
        target: &TargetDescriptor,
        timeout: Duration,
    ) -> ScoutResult<ResolvedTarget> {
        let backend = Arc::clone(&self.backend);
        let target = target.clone();
        let task = tokio::task::spawn_blocking(move || backend.resolve(&target));

        match tokio::time::timeout(timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => Err(ScoutError::init_failed("resolve", join_error)),
            Err(_) => {
                tracing::warn!(timeout_ms = timeout.as_millis() as u64, "Target resolution timed out");
                Err(ScoutError::CaptureTimeout {
                    duration_ms: timeout.as_millis() as u64,
                })
            }
        }
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        match std::mem::replace(self.state.get_mut(), SessionState::Idle) {
            SessionState::Capturing(active) => active.shutdown(),
            SessionState::Starting { cancel } => cancel.trigger(),
            _ => {}
        }
    }
}

async fn shutdown_blocking(active: ActiveSession) {
    if let Err(err) = tokio::task::spawn_blocking(move || active.shutdown()).await {
        tracing::error!(error = %err, "Failed to join capture worker");
    }
}

async fn wait_for_exit(exited: StopSignal) {
    if let Err(err) = tokio::task::spawn_blocking(move || exited.wait()).await {
        tracing::error!(error = %err, "Failed to wait for capture worker exit");
    }
}

/// Fires the worker's exit latch when the worker returns or unwinds
struct ExitLatch(StopSignal);

impl Drop for ExitLatch {
    fn drop(&mut self) {
        self.0.trigger();
    }
}

/// Everything the capture thread needs, moved into it at spawn time
struct CaptureWorker {
    backend:   Arc<dyn CaptureBackend>,
    target:    ResolvedTarget,
    requested: CaptureMode,
    config:    SessionConfig,
    buffer:    Arc<FrameBuffer>,
    stop:      StopSignal,
    exited:    StopSignal,
    published: Arc<AtomicU64>,
}

impl CaptureWorker {
    fn run(self, ready: oneshot::Sender<ScoutResult<CaptureMode>>) {
        // Declared first so it fires after the source below is dropped
        let _exit = ExitLatch(self.exited.clone());
        let _span = tracing::info_span!(
            "capture_worker",
            backend = self.backend.name(),
            window = %self.target.window
        )
        .entered();

        let mut source = match self.acquire() {
            Ok((source, first)) => {
                self.publish(first);
                if ready.send(Ok(source.mode())).is_err() {
                    tracing::debug!("Session start abandoned before the first frame was reported");
                }
                source
            }
            Err(err) => {
                let _ = ready.send(Err(err));
                return;
            }
        };

        self.capture_loop(source.as_mut());
        source.close();
        tracing::debug!("Capture worker exited");
    }

    fn acquire(&self) -> ScoutResult<(Box<dyn FrameSource>, Frame)> {
        match self.requested {
            CaptureMode::Auto => match self.acquire_with(CaptureMode::Push) {
                Err(ScoutError::SessionCancelled) => Err(ScoutError::SessionCancelled),
                Err(err) => {
                    tracing::warn!(error = %err, "Push capture unavailable, falling back to poll");
                    self.acquire_with(CaptureMode::Poll)
                }
                acquired => acquired,
            },
            mode => self.acquire_with(mode),
        }
    }

    fn acquire_with(&self, mode: CaptureMode) -> ScoutResult<(Box<dyn FrameSource>, Frame)> {
        if self.stop.is_triggered() {
            return Err(ScoutError::SessionCancelled);
        }
        let mut source = self.backend.open_source(&self.target, mode)?;
        match self.wait_first_frame(source.as_mut()) {
            Ok(frame) => Ok((source, frame)),
            Err(err) => {
                source.close();
                Err(err)
            }
        }
    }

    fn wait_first_frame(&self, source: &mut dyn FrameSource) -> ScoutResult<Frame> {
        let timeout = self.config.first_frame_timeout;
        let deadline = Instant::now() + timeout;

        loop {
            if self.stop.is_triggered() {
                return Err(ScoutError::SessionCancelled);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(ScoutError::CaptureTimeout {
                    duration_ms: timeout.as_millis() as u64,
                });
            }

            let retry = match source.acquire(remaining.min(self.config.push_wait)) {
                Ok(Some(frame)) => return Ok(frame),
                // Push sources already blocked for the wait slice
                Ok(None) => source.mode() == CaptureMode::Poll,
                Err(err) if err.is_transient() => {
                    tracing::debug!(error = %err, "First frame not ready");
                    true
                }
                Err(err) => return Err(err),
            };
            if retry && self.stop.wait_timeout(self.config.retry_backoff.min(remaining)) {
                return Err(ScoutError::SessionCancelled);
            }
        }
    }

    fn capture_loop(&self, source: &mut dyn FrameSource) {
        let poll = source.mode() == CaptureMode::Poll;
        let mut failures: u64 = 0;

        while !self.stop.is_triggered() {
            let iteration = Instant::now();
            let pause = match source.acquire(self.config.push_wait) {
                Ok(Some(frame)) => {
                    if failures > 0 {
                        tracing::info!(failures, "Capture recovered");
                        failures = 0;
                    }
                    self.publish(frame);
                    // Overruns skip the sleep instead of dropping the next frame
                    poll.then(|| self.config.poll_interval.saturating_sub(iteration.elapsed()))
                }
                Ok(None) => poll.then_some(self.config.retry_backoff),
                Err(err) => {
                    failures += 1;
                    if failures == 1 || failures % WARN_EVERY_FAILURES == 0 {
                        tracing::warn!(error = %err, failures, "Frame acquisition failed, retrying");
                    }
                    Some(self.config.retry_backoff)
                }
            };

            if let Some(pause) = pause.filter(|pause| !pause.is_zero()) {
                if self.stop.wait_timeout(pause) {
                    break;
                }
            }
        }
    }

    fn publish(&self, frame: Frame) {
        let (width, height) = frame.dimensions();
        let sequence = self.buffer.publish(frame);
        self.published.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(sequence, width, height, "Published frame");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::mock::MockBackend;
    use crate::model::WindowId;

    fn fast_config() -> SessionConfig {
        SessionConfig::builder()
            .poll_interval(Duration::from_millis(2))
            .retry_backoff(Duration::from_millis(5))
            .push_wait(Duration::from_millis(10))
            .first_frame_timeout(Duration::from_millis(300))
            .resolve_timeout(Duration::from_secs(2))
            .build()
    }

    fn session(backend: MockBackend) -> CaptureSession {
        CaptureSession::new(Arc::new(backend))
    }

    #[tokio::test]
    async fn test_start_publishes_first_frame() {
        let session = session(MockBackend::new().with_frame_size(32, 16));
        assert_eq!(session.phase(), SessionPhase::Idle);

        let info = session
            .start(TargetDescriptor::process_name("game.exe").with_mode(CaptureMode::Poll), fast_config())
            .await
            .unwrap();

        assert_eq!(info.target.window, WindowId(0x1002));
        assert_eq!(info.mode, CaptureMode::Poll);
        assert!(info.frames_published >= 1);
        assert_eq!(session.phase(), SessionPhase::Capturing);
        assert_eq!(session.latest_frame().unwrap().dimensions(), (32, 16));

        session.stop().unwrap();
    }

    #[tokio::test]
    async fn test_stop_clears_frame_and_is_idempotent() {
        let session = session(MockBackend::new());
        session
            .start(TargetDescriptor::process(4242), fast_config())
            .await
            .unwrap();

        session.stop().unwrap();
        assert_eq!(session.phase(), SessionPhase::Idle);
        assert!(session.latest_frame().is_none());
        assert!(session.info().is_none());
        assert!(session.latest_frame_encoded().unwrap().is_empty());

        session.stop().unwrap();
        assert_eq!(session.phase(), SessionPhase::Idle);
    }

    #[tokio::test]
    async fn test_auto_falls_back_to_poll() {
        let session = session(MockBackend::new().with_push_failure("E_ACCESSDENIED"));
        let info = session
            .start(TargetDescriptor::process(4242), fast_config())
            .await
            .unwrap();

        assert_eq!(info.mode, CaptureMode::Poll);
        session.stop().unwrap();
    }

    #[tokio::test]
    async fn test_resolution_failure_returns_to_idle() {
        let session = session(MockBackend::new());
        let result = session
            .start(TargetDescriptor::process_name("missing.exe"), fast_config())
            .await;

        assert!(matches!(result, Err(ScoutError::ProcessNotFound { .. })));
        assert_eq!(session.phase(), SessionPhase::Idle);
    }

    #[tokio::test]
    async fn test_stalled_source_times_out_and_releases() {
        let backend = MockBackend::new().with_stalled_frames();
        let stats = backend.stats();
        let session = session(backend);

        let result = session
            .start(TargetDescriptor::process(4242).with_mode(CaptureMode::Push), fast_config())
            .await;

        assert!(matches!(result, Err(ScoutError::CaptureTimeout { duration_ms: 300 })));
        assert_eq!(session.phase(), SessionPhase::Idle);
        assert_eq!(stats.opened(), 1);
        assert_eq!(stats.live(), 0);
    }

    #[tokio::test]
    async fn test_latest_frame_encoded_as_bmp() {
        let session = session(MockBackend::new().with_frame_size(8, 8));
        session
            .start(TargetDescriptor::process(4242), fast_config())
            .await
            .unwrap();

        let bytes = session.latest_frame_encoded().unwrap();
        assert_eq!(&bytes[0..2], b"BM");
        session.stop().unwrap();
    }

    #[tokio::test]
    async fn test_drop_joins_worker() {
        let backend = MockBackend::new();
        let stats = backend.stats();
        {
            let session = session(backend);
            session
                .start(TargetDescriptor::process(4242), fast_config())
                .await
                .unwrap();
            assert_eq!(stats.live(), 1);
        }
        assert_eq!(stats.live(), 0);
    }
}
