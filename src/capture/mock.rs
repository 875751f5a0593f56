//! Mock capture backend for testing
//!
//! `MockBackend` implements [`CaptureBackend`] and [`RegionGrabber`] without
//! touching a real windowing system. It serves a synthetic process tree and
//! window list, and its frame sources generate frames on demand.
//!
//! # Features
//!
//! - **Synthetic process tree:** a launcher/game/renderer hierarchy plus an
//!   unrelated editor process
//! - **Frame generator:** test pattern frames, or any closure of the frame
//!   number via [`MockBackend::with_frames`]
//! - **Configurable delay:** slow down source acquisition to exercise the
//!   `Starting` phase
//! - **Error injection:** fail resolution, push acquisition or poll
//!   acquisition independently
//! - **Resource accounting:** [`MockStats`] counts opened, closed and live
//!   sources so tests can verify nothing leaks
//!
//! # Examples
//!
//! ```
//! use std::time::Duration;
//!
//! use screenscout::capture::{CaptureBackend, mock::MockBackend};
//! use screenscout::model::{CaptureMode, TargetDescriptor};
//!
//! let backend = MockBackend::new().with_frame_size(64, 32);
//! let target = backend.resolve(&TargetDescriptor::process_name("game.exe")).unwrap();
//!
//! let mut source = backend.open_source(&target, CaptureMode::Poll).unwrap();
//! let frame = source.acquire(Duration::from_millis(10)).unwrap().unwrap();
//! assert_eq!(frame.dimensions(), (64, 32));
//!
//! source.close();
//! assert_eq!(backend.stats().live(), 0);
//! ```

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use async_trait::async_trait;

use super::frame::Frame;
use super::staging::ScreenRect;
use super::traits::{CaptureBackend, FrameSource, GrabbedRegion, RegionGrabber, SystemProbe};
use crate::error::{ScoutError, ScoutResult};
use crate::model::{
    CaptureMode, PixelRect, ProcessRecord, Region, ResolvedTarget, WindowId, WindowRecord,
};

/// Produces the frame with the given 1-based number
pub type FrameGenerator = Arc<dyn Fn(u64) -> Frame + Send + Sync>;

/// Push sources deliver at most one frame per interval, like a compositor
const MOCK_PUSH_INTERVAL: Duration = Duration::from_millis(5);

/// Shared counters describing mock source usage
#[derive(Debug, Default)]
pub struct MockStats {
    opened: AtomicUsize,
    closed: AtomicUsize,
    peak:   AtomicUsize,
    frames: AtomicU64,
}

impl MockStats {
    /// Sources opened so far
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// Sources closed so far
    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    /// Sources currently holding their (pretend) capture resource
    pub fn live(&self) -> usize {
        self.opened().saturating_sub(self.closed())
    }

    /// Most sources ever live at the same time
    pub fn peak_live(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// Frames produced across all sources
    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::SeqCst)
    }
}

/// Mock capture backend for testing and development
///
/// `MockBackend` is thread-safe and can be shared across tasks using `Arc`.
pub struct MockBackend {
    processes:       Vec<ProcessRecord>,
    windows:         Vec<WindowRecord>,
    /// Optional delay before a source is handed out
    open_delay:      Option<Duration>,
    /// Error returned by process/window enumeration
    error_injection: Option<ScoutError>,
    push_failure:    Option<String>,
    poll_failure:    Option<String>,
    /// Sources open fine but never produce a frame
    stalled:         bool,
    /// Every n-th poll acquisition reports "no frame"
    dropout_every:   Option<u64>,
    generator:       FrameGenerator,
    screen:          Frame,
    /// Desktop coordinates of the screen surface's top-left pixel
    screen_origin:   (i32, i32),
    stats:           Arc<MockStats>,
}

impl fmt::Debug for MockBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockBackend")
            .field("processes", &self.processes.len())
            .field("windows", &self.windows.len())
            .field("open_delay", &self.open_delay)
            .field("stalled", &self.stalled)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl MockBackend {
    /// Creates a MockBackend with the default process tree
    ///
    /// - `explorer.exe` (pid 1)
    /// - `launcher.exe` (pid 4200) owning a 640x480 "Game Launcher" window
    /// - `game.exe` (pid 4242, child of the launcher) owning the 1280x720
    ///   "Game" window and a hidden tray window
    /// - `notepad.exe` (pid 5000) owning an 800x600 editor window
    pub fn new() -> Self {
        Self {
            processes:       Self::create_mock_processes(),
            windows:         Self::create_mock_windows(),
            open_delay:      None,
            error_injection: None,
            push_failure:    None,
            poll_failure:    None,
            stalled:         false,
            dropout_every:   None,
            generator:       Arc::new(|_| Frame::from_test_pattern(320, 180)),
            screen:          Frame::from_test_pattern(640, 360),
            screen_origin:   (0, 0),
            stats:           Arc::new(MockStats::default()),
        }
    }

    /// Sleeps for `delay` before each source is handed out
    pub fn with_open_delay(mut self, delay: Duration) -> Self {
        self.open_delay = Some(delay);
        self
    }

    /// Injects an error returned by process and window enumeration
    pub fn with_error(mut self, error: ScoutError) -> Self {
        self.error_injection = Some(error);
        self
    }

    /// Makes push acquisition fail at the capture-session step
    pub fn with_push_failure(mut self, reason: impl Into<String>) -> Self {
        self.push_failure = Some(reason.into());
        self
    }

    /// Makes poll acquisition fail at the window-dc step
    pub fn with_poll_failure(mut self, reason: impl Into<String>) -> Self {
        self.poll_failure = Some(reason.into());
        self
    }

    /// Sources open but never deliver a frame
    pub fn with_stalled_frames(mut self) -> Self {
        self.stalled = true;
        self
    }

    /// Every `n`-th poll acquisition reports no frame (e.g. minimized window)
    pub fn with_dropouts(mut self, every: u64) -> Self {
        self.dropout_every = Some(every.max(1));
        self
    }

    /// Generates test pattern frames of the given size
    pub fn with_frame_size(self, width: u32, height: u32) -> Self {
        self.with_frames(move |_| Frame::from_test_pattern(width, height))
    }

    /// Generates frames with a custom closure of the frame number
    pub fn with_frames<F>(mut self, generator: F) -> Self
    where
        F: Fn(u64) -> Frame + Send + Sync + 'static,
    {
        self.generator = Arc::new(generator);
        self
    }

    /// Replaces the surface served by [`RegionGrabber::grab`]
    pub fn with_screen(mut self, screen: Frame) -> Self {
        self.screen = screen;
        self
    }

    /// Like [`with_screen`](Self::with_screen), with the surface's top-left
    /// pixel at `(left, top)` on the desktop
    pub fn with_screen_at(mut self, screen: Frame, left: i32, top: i32) -> Self {
        self.screen = screen;
        self.screen_origin = (left, top);
        self
    }

    /// Adds a process to the snapshot
    pub fn with_process(mut self, process: ProcessRecord) -> Self {
        self.processes.push(process);
        self
    }

    /// Adds a window to the snapshot
    pub fn with_window(mut self, window: WindowRecord) -> Self {
        self.windows.push(window);
        self
    }

    pub fn stats(&self) -> Arc<MockStats> {
        Arc::clone(&self.stats)
    }

    fn create_mock_processes() -> Vec<ProcessRecord> {
        vec![
            ProcessRecord::new(1, 0, "explorer.exe"),
            ProcessRecord::new(4200, 1, "launcher.exe"),
            ProcessRecord::new(4242, 4200, "game.exe"),
            ProcessRecord::new(5000, 1, "notepad.exe"),
        ]
    }

    fn create_mock_windows() -> Vec<WindowRecord> {
        let window = |id: u64, pid: u32, title: &str, visible: bool, w: u32, h: u32| WindowRecord {
            id: WindowId(id),
            pid,
            title: title.to_string(),
            visible,
            client_width: w,
            client_height: h,
        };
        vec![
            window(0x1001, 4200, "Game Launcher", true, 640, 480),
            window(0x1002, 4242, "Game", true, 1280, 720),
            window(0x1003, 4242, "Game Tray", false, 1, 1),
            window(0x2001, 5000, "Untitled - Notepad", true, 800, 600),
        ]
    }

    fn check_error_injection(&self) -> ScoutResult<()> {
        match &self.error_injection {
            Some(error) => Err(clone_error(error)),
            None => Ok(()),
        }
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Rebuilds an injected error; `ScoutError` is not `Clone` because of `io::Error`
fn clone_error(error: &ScoutError) -> ScoutError {
    match error {
        ScoutError::TemplatePathInvalid { path, reason } => ScoutError::TemplatePathInvalid {
            path:   path.clone(),
            reason: reason.clone(),
        },
        ScoutError::TemplateDecodeFailed { path, reason } => ScoutError::TemplateDecodeFailed {
            path:   path.clone(),
            reason: reason.clone(),
        },
        ScoutError::TemplateEmpty { path } => ScoutError::TemplateEmpty { path: path.clone() },
        ScoutError::ProcessNotFound { target } => ScoutError::ProcessNotFound {
            target: target.clone(),
        },
        ScoutError::WindowNotFound { target } => ScoutError::WindowNotFound {
            target: target.clone(),
        },
        ScoutError::WindowClosed => ScoutError::WindowClosed,
        ScoutError::SessionBusy { phase } => ScoutError::SessionBusy {
            phase: phase.clone(),
        },
        ScoutError::SessionCancelled => ScoutError::SessionCancelled,
        ScoutError::CaptureInitFailed { stage, reason } => ScoutError::CaptureInitFailed {
            stage,
            reason: reason.clone(),
        },
        ScoutError::CaptureTimeout { duration_ms } => ScoutError::CaptureTimeout {
            duration_ms: *duration_ms,
        },
        ScoutError::BackendNotAvailable { backend } => ScoutError::BackendNotAvailable {
            backend: backend.clone(),
        },
        ScoutError::InvalidParameter { parameter, reason } => ScoutError::InvalidParameter {
            parameter: parameter.clone(),
            reason:    reason.clone(),
        },
        ScoutError::ImageError(msg) => ScoutError::ImageError(msg.clone()),
        ScoutError::EncodingFailed { format, reason } => ScoutError::EncodingFailed {
            format: format.clone(),
            reason: reason.clone(),
        },
        ScoutError::IoError(e) => ScoutError::IoError(std::io::Error::new(e.kind(), e.to_string())),
    }
}

impl SystemProbe for MockBackend {
    fn processes(&self) -> ScoutResult<Vec<ProcessRecord>> {
        self.check_error_injection()?;
        Ok(self.processes.clone())
    }

    fn windows(&self) -> ScoutResult<Vec<WindowRecord>> {
        self.check_error_injection()?;
        Ok(self.windows.clone())
    }
}

impl CaptureBackend for MockBackend {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn open_source(
        &self,
        target: &ResolvedTarget,
        mode: CaptureMode,
    ) -> ScoutResult<Box<dyn FrameSource>> {
        if let Some(delay) = self.open_delay {
            thread::sleep(delay);
        }

        let failure = match mode {
            CaptureMode::Push => self.push_failure.as_ref().map(|r| ("capture-session", r)),
            CaptureMode::Poll => self.poll_failure.as_ref().map(|r| ("window-dc", r)),
            CaptureMode::Auto => {
                return Err(ScoutError::invalid_parameter(
                    "mode",
                    "frame sources are opened as push or poll",
                ));
            }
        };
        if let Some((stage, reason)) = failure {
            return Err(ScoutError::init_failed(stage, reason));
        }

        if !self.windows.iter().any(|window| window.id == target.window) {
            return Err(ScoutError::WindowClosed);
        }

        self.stats.opened.fetch_add(1, Ordering::SeqCst);
        self.stats.peak.fetch_max(self.stats.live(), Ordering::SeqCst);
        tracing::debug!(window = %target.window, %mode, "Opened mock frame source");

        Ok(Box::new(MockSource {
            mode,
            generator: Arc::clone(&self.generator),
            stats: Arc::clone(&self.stats),
            stalled: self.stalled,
            dropout_every: self.dropout_every,
            attempts: 0,
            produced: 0,
            closed: false,
        }))
    }
}

#[async_trait]
impl RegionGrabber for MockBackend {
    async fn grab(&self, region: Option<Region>) -> ScoutResult<GrabbedRegion> {
        let (width, height) = self.screen.dimensions();
        let (left, top) = self.screen_origin;
        let desktop = ScreenRect {
            left,
            top,
            right: left.saturating_add(width as i32),
            bottom: top.saturating_add(height as i32),
        };
        let rect = desktop.clip(region).ok_or_else(|| {
            ScoutError::invalid_parameter("region", format!("{region:?} is off screen"))
        })?;
        let crop = PixelRect::new(
            (rect.left - left) as u32,
            (rect.top - top) as u32,
            rect.width(),
            rect.height(),
        );
        Ok(GrabbedRegion {
            frame:    self.screen.crop(crop)?,
            origin_x: rect.left,
            origin_y: rect.top,
        })
    }
}

struct MockSource {
    mode:          CaptureMode,
    generator:     FrameGenerator,
    stats:         Arc<MockStats>,
    stalled:       bool,
    dropout_every: Option<u64>,
    attempts:      u64,
    produced:      u64,
    closed:        bool,
}

impl FrameSource for MockSource {
    fn mode(&self) -> CaptureMode {
        self.mode
    }

    fn acquire(&mut self, wait: Duration) -> ScoutResult<Option<Frame>> {
        if self.closed {
            return Err(ScoutError::WindowClosed);
        }
        if self.mode == CaptureMode::Push {
            let pause = if self.stalled { wait } else { wait.min(MOCK_PUSH_INTERVAL) };
            thread::sleep(pause);
        }
        if self.stalled {
            return Ok(None);
        }

        self.attempts += 1;
        if self.dropout_every.is_some_and(|every| self.attempts % every == 0) {
            return Ok(None);
        }

        self.produced += 1;
        self.stats.frames.fetch_add(1, Ordering::SeqCst);
        Ok(Some((self.generator)(self.produced)))
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.stats.closed.fetch_add(1, Ordering::SeqCst);
        }
    }
}

impl Drop for MockSource {
    fn drop(&mut self) {
        self.close();
    }
}
