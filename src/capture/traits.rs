//! Capability traits implemented by capture backends
//!
//! - [`SystemProbe`]: snapshot processes and top-level windows
//! - [`FrameSource`]: produce the next frame of one window or report that
//!   none is available
//! - [`CaptureBackend`]: open push or poll frame sources for a resolved window
//! - [`RegionGrabber`]: one-shot capture of a screen rectangle
//!
//! The session state machine only sees these traits, so it behaves the same
//! for the Windows backend and the mock.

use std::time::Duration;

use async_trait::async_trait;

use super::frame::Frame;
use super::resolve;
use crate::error::ScoutResult;
use crate::model::{CaptureMode, ProcessRecord, Region, ResolvedTarget, TargetDescriptor, WindowRecord};

/// Capability: snapshot the process table and the top-level windows.
pub trait SystemProbe: Send + Sync {
    /// Every running process with its parent
    fn processes(&self) -> ScoutResult<Vec<ProcessRecord>>;

    /// Every top-level window, visible or not
    fn windows(&self) -> ScoutResult<Vec<WindowRecord>>;
}

/// One continuously updating pixel surface of a target window.
///
/// A source is created and driven entirely on the capture worker thread, so
/// it does not need to be `Send`.
pub trait FrameSource {
    /// Strategy this source implements (`Push` or `Poll`)
    fn mode(&self) -> CaptureMode;

    /// Produces the next frame
    ///
    /// `Ok(None)` means no frame is available right now (nothing arrived
    /// within `wait`, window minimized, zero-sized client area). Push sources
    /// block up to `wait`; poll sources capture immediately and ignore it.
    fn acquire(&mut self, wait: Duration) -> ScoutResult<Option<Frame>>;

    /// Releases OS resources; called once when the worker exits
    fn close(&mut self);
}

/// Capability: open frame sources for resolved windows.
pub trait CaptureBackend: SystemProbe {
    /// Short backend name used in logs
    fn name(&self) -> &'static str;

    /// Acquires the capture resource for `target`
    ///
    /// `mode` is `Push` or `Poll`; the session handles `Auto` itself. On
    /// error nothing may remain allocated.
    fn open_source(
        &self,
        target: &ResolvedTarget,
        mode: CaptureMode,
    ) -> ScoutResult<Box<dyn FrameSource>>;

    /// Resolves a descriptor to one window
    fn resolve(&self, target: &TargetDescriptor) -> ScoutResult<ResolvedTarget> {
        resolve::resolve_target(self, target)
    }
}

/// Pixels grabbed for a screen rectangle
#[derive(Debug, Clone)]
pub struct GrabbedRegion {
    pub frame:    Frame,
    /// Top-left corner of `frame` in surface coordinates
    pub origin_x: i32,
    pub origin_y: i32,
}

/// Capability: capture pixels for a rectangle of the screen surface.
#[async_trait]
pub trait RegionGrabber: Send + Sync {
    /// Captures `region`, or the whole surface when `None`
    ///
    /// Regions hanging off the surface are clamped; the returned origin
    /// reflects the clamped rectangle.
    async fn grab(&self, region: Option<Region>) -> ScoutResult<GrabbedRegion>;
}
