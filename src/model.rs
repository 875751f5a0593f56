//! Data models shared by the capture and search halves of the engine
//!
//! This module defines:
//! - Template handles, regions and search results
//! - Capture target descriptors and capture modes
//! - Process/window records used for target resolution
//! - Session phase and introspection types

use std::fmt;

use serde::{Deserialize, Serialize};

// ============================================================================
// Search Types
// ============================================================================

/// Opaque identifier of a loaded template
///
/// Handles are positive and issued in strictly increasing order until the
/// registry is cleared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TemplateHandle(i32);

impl TemplateHandle {
    /// Wraps a raw handle value
    pub const fn new(raw: i32) -> Self {
        Self(raw)
    }

    /// Raw integer value as seen across the boundary API
    pub const fn get(self) -> i32 {
        self.0
    }
}

impl fmt::Display for TemplateHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i32> for TemplateHandle {
    fn from(raw: i32) -> Self {
        Self(raw)
    }
}

/// Rectangle in source-image coordinates
///
/// Coordinates are signed so callers can pass regions that hang off the
/// image; the matcher clamps them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub x:      i32,
    pub y:      i32,
    pub width:  i32,
    pub height: i32,
}

impl Region {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Interprets boundary ROI arguments
    ///
    /// A non-positive width or height is the "whole image" sentinel and
    /// yields `None`.
    ///
    /// # Examples
    ///
    /// ```
    /// use screenscout::model::Region;
    ///
    /// assert_eq!(Region::from_boundary(0, 0, -1, -1), None);
    /// assert!(Region::from_boundary(10, 10, 50, 20).is_some());
    /// ```
    pub fn from_boundary(x: i32, y: i32, width: i32, height: i32) -> Option<Self> {
        if width <= 0 || height <= 0 {
            None
        } else {
            Some(Self::new(x, y, width, height))
        }
    }

    /// Intersects the region with a `width` x `height` surface
    ///
    /// The origin is clamped into the surface and the extent trimmed so the
    /// result never exceeds the bounds. Returns `None` when nothing of the
    /// region remains.
    ///
    /// # Examples
    ///
    /// ```
    /// use screenscout::model::{PixelRect, Region};
    ///
    /// let clamped = Region::new(-10, 90, 50, 50).clamp_to(100, 100);
    /// assert_eq!(clamped, Some(PixelRect::new(0, 90, 40, 10)));
    /// assert_eq!(Region::new(100, 0, 10, 10).clamp_to(100, 100), None);
    /// ```
    pub fn clamp_to(&self, width: u32, height: u32) -> Option<PixelRect> {
        let left = i64::from(self.x).max(0);
        let top = i64::from(self.y).max(0);
        let right = (i64::from(self.x) + i64::from(self.width)).min(i64::from(width));
        let bottom = (i64::from(self.y) + i64::from(self.height)).min(i64::from(height));
        if right <= left || bottom <= top {
            return None;
        }
        Some(PixelRect::new(
            left as u32,
            top as u32,
            (right - left) as u32,
            (bottom - top) as u32,
        ))
    }
}

/// Unsigned rectangle inside a pixel surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelRect {
    pub x:      u32,
    pub y:      u32,
    pub width:  u32,
    pub height: u32,
}

impl PixelRect {
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Rectangle covering a whole `width` x `height` surface
    pub const fn full(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Whether the rectangle lies entirely inside a `width` x `height` surface
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        u64::from(self.x) + u64::from(self.width) <= u64::from(width)
            && u64::from(self.y) + u64::from(self.height) <= u64::from(height)
    }
}

/// Outcome of one search
///
/// `x = y = -1` with `score = 0` means no placement reached the threshold.
/// Other negative coordinates are real matches on monitors left of or above
/// the primary one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub x:     i32,
    pub y:     i32,
    pub score: f64,
}

impl SearchResult {
    /// The not-found sentinel
    pub const NOT_FOUND: SearchResult = SearchResult {
        x:     -1,
        y:     -1,
        score: 0.0,
    };

    pub fn found(x: i32, y: i32, score: f64) -> Self {
        Self { x, y, score }
    }

    pub fn is_found(&self) -> bool {
        !(self.x == -1 && self.y == -1)
    }

    /// Shifts a found result by an origin offset; not-found stays not-found
    pub fn offset(self, dx: i32, dy: i32) -> Self {
        if self.is_found() {
            Self::found(self.x + dx, self.y + dy, self.score)
        } else {
            self
        }
    }
}

impl Default for SearchResult {
    fn default() -> Self {
        Self::NOT_FOUND
    }
}

// ============================================================================
// Capture Types
// ============================================================================

/// Platform window identifier (an `HWND` on Windows)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WindowId(pub u64);

impl fmt::Display for WindowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// How frames are acquired for a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureMode {
    /// OS compositor pushes a notification per frame
    Push,
    /// Window pixels are re-captured on a fixed cadence
    Poll,
    /// Push first, falling back to poll if push cannot be acquired
    #[default]
    Auto,
}

impl CaptureMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaptureMode::Push => "push",
            CaptureMode::Poll => "poll",
            CaptureMode::Auto => "auto",
        }
    }
}

impl fmt::Display for CaptureMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CaptureMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "push" => Ok(CaptureMode::Push),
            "poll" => Ok(CaptureMode::Poll),
            "auto" => Ok(CaptureMode::Auto),
            other => Err(format!("unknown capture mode '{other}'")),
        }
    }
}

/// Identity used to pick the captured window
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum TargetKind {
    /// An explicit window
    Window(WindowId),
    /// A process id; descendants are searched too
    Process(u32),
    /// An executable name such as `notepad.exe` (case-insensitive)
    ProcessName(String),
}

/// What a capture session should attach to
///
/// # Examples
///
/// ```
/// use screenscout::model::{CaptureMode, TargetDescriptor};
///
/// let target = TargetDescriptor::process_name("game.exe")
///     .with_title_filter("Main")
///     .with_mode(CaptureMode::Poll);
/// assert_eq!(target.mode, CaptureMode::Poll);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetDescriptor {
    pub kind:         TargetKind,
    /// Case-insensitive substring the window title must contain
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title_filter: Option<String>,
    #[serde(default)]
    pub mode:         CaptureMode,
}

impl TargetDescriptor {
    fn with_kind(kind: TargetKind) -> Self {
        Self {
            kind,
            title_filter: None,
            mode: CaptureMode::default(),
        }
    }

    pub fn window(id: WindowId) -> Self {
        Self::with_kind(TargetKind::Window(id))
    }

    pub fn process(pid: u32) -> Self {
        Self::with_kind(TargetKind::Process(pid))
    }

    pub fn process_name(name: impl Into<String>) -> Self {
        Self::with_kind(TargetKind::ProcessName(name.into()))
    }

    pub fn with_title_filter(mut self, filter: impl Into<String>) -> Self {
        self.title_filter = Some(filter.into());
        self
    }

    pub fn with_mode(mut self, mode: CaptureMode) -> Self {
        self.mode = mode;
        self
    }
}

impl fmt::Display for TargetDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            TargetKind::Window(id) => write!(f, "window={id}")?,
            TargetKind::Process(pid) => write!(f, "pid={pid}")?,
            TargetKind::ProcessName(name) => write!(f, "name={name}")?,
        }
        if let Some(filter) = &self.title_filter {
            write!(f, " title~{filter:?}")?;
        }
        Ok(())
    }
}

/// One entry of a process snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessRecord {
    pub pid:        u32,
    pub parent_pid: u32,
    /// Executable file name, e.g. `game.exe`
    pub name:       String,
}

impl ProcessRecord {
    pub fn new(pid: u32, parent_pid: u32, name: impl Into<String>) -> Self {
        Self {
            pid,
            parent_pid,
            name: name.into(),
        }
    }
}

/// One top-level window as seen during resolution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowRecord {
    pub id:            WindowId,
    pub pid:           u32,
    pub title:         String,
    pub visible:       bool,
    pub client_width:  u32,
    pub client_height: u32,
}

impl WindowRecord {
    pub fn client_area(&self) -> u64 {
        u64::from(self.client_width) * u64::from(self.client_height)
    }
}

/// Window chosen for a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedTarget {
    pub window:        WindowId,
    pub pid:           u32,
    pub title:         String,
    pub client_width:  u32,
    pub client_height: u32,
}

impl From<&WindowRecord> for ResolvedTarget {
    fn from(record: &WindowRecord) -> Self {
        Self {
            window:        record.id,
            pid:           record.pid,
            title:         record.title.clone(),
            client_width:  record.client_width,
            client_height: record.client_height,
        }
    }
}

/// Lifecycle phase of the capture session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionPhase {
    Idle,
    Starting,
    Capturing,
    Stopping,
}

impl SessionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionPhase::Idle => "idle",
            SessionPhase::Starting => "starting",
            SessionPhase::Capturing => "capturing",
            SessionPhase::Stopping => "stopping",
        }
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of a running session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub target:           ResolvedTarget,
    /// Strategy actually in use (never `Auto`)
    pub mode:             CaptureMode,
    pub frames_published: u64,
    pub started_at:       chrono::DateTime<chrono::Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_sentinel() {
        assert_eq!(Region::from_boundary(5, 5, 0, 10), None);
        assert_eq!(Region::from_boundary(5, 5, 10, -1), None);
        assert_eq!(Region::from_boundary(-5, 3, 10, 10), Some(Region::new(-5, 3, 10, 10)));
    }

    #[test]
    fn test_region_clamp_inside() {
        let clamped = Region::new(10, 20, 30, 40).clamp_to(100, 100);
        assert_eq!(clamped, Some(PixelRect::new(10, 20, 30, 40)));
    }

    #[test]
    fn test_region_clamp_partially_outside() {
        assert_eq!(
            Region::new(80, -5, 50, 50).clamp_to(100, 100),
            Some(PixelRect::new(80, 0, 20, 45))
        );
        assert_eq!(
            Region::new(i32::MAX - 1, 0, i32::MAX, 10).clamp_to(100, 100),
            None
        );
    }

    #[test]
    fn test_region_clamp_fully_outside() {
        assert_eq!(Region::new(-50, 0, 50, 10).clamp_to(100, 100), None);
        assert_eq!(Region::new(0, 100, 10, 10).clamp_to(100, 100), None);
        assert_eq!(Region::new(0, 0, 0, 10).clamp_to(100, 100), None);
    }

    #[test]
    fn test_rect_fits_within() {
        assert!(PixelRect::full(10, 10).fits_within(10, 10));
        assert!(!PixelRect::new(1, 0, 10, 10).fits_within(10, 10));
        assert!(!PixelRect::new(u32::MAX, 0, 2, 1).fits_within(10, 10));
        assert!(PixelRect::new(3, 3, 0, 4).is_empty());
    }

    #[test]
    fn test_search_result_sentinel() {
        let result = SearchResult::default();
        assert_eq!(result, SearchResult::NOT_FOUND);
        assert!(!result.is_found());
        assert_eq!(result.offset(10, 10), SearchResult::NOT_FOUND);
    }

    #[test]
    fn test_negative_desktop_match_is_found() {
        let result = SearchResult::found(12, 30, 0.99).offset(-1920, -200);
        assert!(result.is_found());
        assert_eq!((result.x, result.y), (-1908, -170));
    }

    #[test]
    fn test_search_result_offset() {
        let result = SearchResult::found(3, 4, 0.97).offset(100, 200);
        assert_eq!(result.x, 103);
        assert_eq!(result.y, 204);
        assert_eq!(result.score, 0.97);
    }

    #[test]
    fn test_capture_mode_parse() {
        assert_eq!("push".parse::<CaptureMode>().unwrap(), CaptureMode::Push);
        assert_eq!("POLL".parse::<CaptureMode>().unwrap(), CaptureMode::Poll);
        assert!("gpu".parse::<CaptureMode>().is_err());
        assert_eq!(CaptureMode::default(), CaptureMode::Auto);
    }

    #[test]
    fn test_capture_mode_serialization() {
        assert_eq!(serde_json::to_string(&CaptureMode::Push).unwrap(), r#""push""#);
        assert_eq!(serde_json::from_str::<CaptureMode>(r#""auto""#).unwrap(), CaptureMode::Auto);
    }

    #[test]
    fn test_target_descriptor_display() {
        let target = TargetDescriptor::process_name("game.exe").with_title_filter("Lobby");
        let text = target.to_string();
        assert!(text.contains("name=game.exe"));
        assert!(text.contains("Lobby"));

        assert_eq!(TargetDescriptor::process(42).to_string(), "pid=42");
    }

    #[test]
    fn test_target_descriptor_deserialization() {
        let json = r#"{"kind":{"kind":"process_name","value":"notepad.exe"},"mode":"poll"}"#;
        let target: TargetDescriptor = serde_json::from_str(json).unwrap();

        assert_eq!(target.kind, TargetKind::ProcessName("notepad.exe".to_string()));
        assert_eq!(target.mode, CaptureMode::Poll);
        assert_eq!(target.title_filter, None);
    }

    #[test]
    fn test_template_handle_transparent() {
        let handle = TemplateHandle::new(7);
        assert_eq!(serde_json::to_string(&handle).unwrap(), "7");
        assert_eq!(handle.get(), 7);
        assert_eq!(TemplateHandle::from(7), handle);
    }

    #[test]
    fn test_window_client_area() {
        let window = WindowRecord {
            id:            WindowId(0x10),
            pid:           1,
            title:         "Main".to_string(),
            visible:       true,
            client_width:  800,
            client_height: 600,
        };
        assert_eq!(window.client_area(), 480_000);
        assert_eq!(ResolvedTarget::from(&window).client_width, 800);
    }
}
