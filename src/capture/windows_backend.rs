//! Windows capture backend
//!
//! - **Process snapshot**: Toolhelp32 for pid/parent/executable triples
//! - **Window enumeration**: Win32 `EnumWindows` with client-area metrics
//! - **Push frames**: Windows Graphics Capture (WGC) via the windows-capture
//!   crate, delivered through a latest-wins mailbox
//! - **Poll frames**: `PrintWindow` with `PW_RENDERFULLCONTENT` into a reused
//!   memory DC, read back with `GetDIBits`
//! - **Screen grab**: GDI `BitBlt` of the primary screen for one-shot searches
//!
//! WGC and `PrintWindow` both return the whole window surface, so every frame
//! is cropped to the client area before it is published.
//!
//! # Windows Version Requirements
//!
//! Windows Graphics Capture requires Windows 10 version 1803 or later. The
//! poll strategy and enumeration work on all supported versions.

use std::{
    ffi::{OsString, c_void},
    io, mem,
    os::windows::ffi::OsStringExt,
    ptr,
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use windows_capture::{
    capture::{CaptureControl, Context, GraphicsCaptureApiHandler},
    frame::Frame as WcFrame,
    graphics_capture_api::InternalCaptureControl,
    settings::{
        ColorFormat, CursorCaptureSettings, DirtyRegionSettings, DrawBorderSettings,
        MinimumUpdateIntervalSettings, SecondaryWindowSettings, Settings,
    },
    window::Window as WcWindow,
};
use windows_sys::Win32::{
    Foundation::{CloseHandle, HWND, INVALID_HANDLE_VALUE, POINT, RECT},
    Graphics::{
        Dwm::{DWMWA_EXTENDED_FRAME_BOUNDS, DwmGetWindowAttribute},
        Gdi::{
            BI_RGB, BITMAPINFO, BITMAPINFOHEADER, BitBlt, ClientToScreen, CreateCompatibleBitmap,
            CreateCompatibleDC, DIB_RGB_COLORS, DeleteDC, DeleteObject, GetDC, GetDIBits, HBITMAP,
            HDC, ReleaseDC, SRCCOPY, SelectObject,
        },
    },
    Storage::Xps::PrintWindow,
    System::Diagnostics::ToolHelp::{
        CreateToolhelp32Snapshot, PROCESSENTRY32W, Process32FirstW, Process32NextW,
        TH32CS_SNAPPROCESS,
    },
    UI::WindowsAndMessaging::{
        EnumWindows, GetClientRect, GetSystemMetrics, GetWindowRect, GetWindowTextLengthW,
        GetWindowTextW, GetWindowThreadProcessId, IsIconic, IsWindow, IsWindowVisible,
        SM_CXVIRTUALSCREEN, SM_CYVIRTUALSCREEN, SM_XVIRTUALSCREEN, SM_YVIRTUALSCREEN,
    },
};

#[allow(clippy::upper_case_acronyms)]
type BOOL = i32;
const TRUE: BOOL = 1;
const FALSE: BOOL = 0;

/// Renders DirectComposition/DirectX content that plain `PrintWindow` misses
const PW_RENDERFULLCONTENT: u32 = 0x0000_0002;

use super::{
    frame::{Frame, PixelFormat},
    mailbox::{LatestMailbox, Received},
    staging::{ScreenRect, StagingBuffer, SurfaceDesc, client_crop},
    traits::{CaptureBackend, FrameSource, GrabbedRegion, RegionGrabber, SystemProbe},
};
use crate::{
    error::{ScoutError, ScoutResult},
    model::{CaptureMode, ProcessRecord, Region, ResolvedTarget, WindowId, WindowRecord},
};

/// Windows capture backend using Win32 + WGC
///
/// Stateless; every frame source owns its own OS resources.
#[derive(Debug)]
pub struct WindowsBackend {
    _private: (),
}

impl WindowsBackend {
    pub fn new() -> ScoutResult<Self> {
        // WGC availability is checked when a push source is opened
        Ok(Self { _private: () })
    }
}

fn hwnd_of(id: WindowId) -> HWND {
    id.0 as usize as HWND
}

fn window_id(hwnd: HWND) -> WindowId {
    WindowId(hwnd as usize as u64)
}

fn empty_rect() -> RECT {
    RECT {
        left:   0,
        top:    0,
        right:  0,
        bottom: 0,
    }
}

impl From<RECT> for ScreenRect {
    fn from(rect: RECT) -> Self {
        ScreenRect {
            left:   rect.left,
            top:    rect.top,
            right:  rect.right,
            bottom: rect.bottom,
        }
    }
}

// ========== Enumeration ==========

fn enumerate_window_handles() -> Vec<HWND> {
    let mut handles: Vec<HWND> = Vec::new();

    unsafe extern "system" fn enum_callback(hwnd: HWND, lparam: isize) -> BOOL {
        // SAFETY: lparam is the Vec<HWND> passed by enumerate_window_handles
        let handles = unsafe { &mut *(lparam as *mut Vec<HWND>) };
        handles.push(hwnd);
        TRUE
    }

    // SAFETY: the callback only touches `handles`, which outlives the call
    unsafe {
        EnumWindows(Some(enum_callback), &mut handles as *mut Vec<HWND> as isize);
    }

    tracing::debug!(count = handles.len(), "Enumerated top-level windows");
    handles
}

fn window_title(hwnd: HWND) -> String {
    // SAFETY: hwnd comes from EnumWindows; the buffer has room for the
    // terminator that GetWindowTextLengthW leaves out
    unsafe {
        let len = GetWindowTextLengthW(hwnd);
        if len <= 0 {
            return String::new();
        }
        let mut buffer: Vec<u16> = vec![0; (len + 1) as usize];
        let copied = GetWindowTextW(hwnd, buffer.as_mut_ptr(), buffer.len() as i32);
        if copied <= 0 {
            return String::new();
        }
        buffer.truncate(copied as usize);
        OsString::from_wide(&buffer).to_string_lossy().into_owned()
    }
}

fn client_size(hwnd: HWND) -> (u32, u32) {
    let mut rect = empty_rect();
    // SAFETY: rect is a valid out pointer
    if unsafe { GetClientRect(hwnd, &mut rect) } == FALSE {
        return (0, 0);
    }
    let rect = ScreenRect::from(rect);
    (rect.width(), rect.height())
}

fn window_record(hwnd: HWND) -> WindowRecord {
    let mut pid: u32 = 0;
    // SAFETY: pid is a valid out pointer
    unsafe { GetWindowThreadProcessId(hwnd, &mut pid) };
    let (client_width, client_height) = client_size(hwnd);

    WindowRecord {
        id: window_id(hwnd),
        pid,
        title: window_title(hwnd),
        // SAFETY: plain query on a window handle
        visible: unsafe { IsWindowVisible(hwnd) } != FALSE,
        client_width,
        client_height,
    }
}

fn wide_to_string(wide: &[u16]) -> String {
    let len = wide.iter().position(|&c| c == 0).unwrap_or(wide.len());
    OsString::from_wide(&wide[..len]).to_string_lossy().into_owned()
}

fn snapshot_processes() -> ScoutResult<Vec<ProcessRecord>> {
    // SAFETY: the snapshot handle is closed on every path below
    unsafe {
        let snapshot = CreateToolhelp32Snapshot(TH32CS_SNAPPROCESS, 0);
        if snapshot == INVALID_HANDLE_VALUE {
            return Err(ScoutError::init_failed(
                "process-snapshot",
                io::Error::last_os_error(),
            ));
        }

        let mut entry: PROCESSENTRY32W = mem::zeroed();
        entry.dwSize = mem::size_of::<PROCESSENTRY32W>() as u32;

        let mut processes = Vec::new();
        let mut more = Process32FirstW(snapshot, &mut entry) != FALSE;
        while more {
            processes.push(ProcessRecord::new(
                entry.th32ProcessID,
                entry.th32ParentProcessID,
                wide_to_string(&entry.szExeFile),
            ));
            more = Process32NextW(snapshot, &mut entry) != FALSE;
        }
        CloseHandle(snapshot);

        tracing::debug!(count = processes.len(), "Snapshotted processes");
        Ok(processes)
    }
}

// ========== Geometry ==========

/// Where a window and its client area sit on screen
#[derive(Debug, Clone, Copy)]
struct WindowGeometry {
    /// `GetWindowRect`, the surface `PrintWindow` renders
    window_rect:   ScreenRect,
    /// DWM extended frame bounds, the surface WGC delivers
    frame_bounds:  ScreenRect,
    client_origin: (i32, i32),
    client_size:   (u32, u32),
}

fn window_geometry(hwnd: HWND) -> Option<WindowGeometry> {
    let mut window = empty_rect();
    // SAFETY: out pointers reference locals sized for the requested data
    unsafe {
        if GetWindowRect(hwnd, &mut window) == FALSE {
            return None;
        }

        let mut frame = empty_rect();
        let hr = DwmGetWindowAttribute(
            hwnd,
            DWMWA_EXTENDED_FRAME_BOUNDS as _,
            &mut frame as *mut RECT as *mut c_void,
            mem::size_of::<RECT>() as u32,
        );
        if hr < 0 {
            frame = window;
        }

        let mut origin = POINT { x: 0, y: 0 };
        if ClientToScreen(hwnd, &mut origin) == FALSE {
            return None;
        }

        Some(WindowGeometry {
            window_rect:   window.into(),
            frame_bounds:  frame.into(),
            client_origin: (origin.x, origin.y),
            client_size:   client_size(hwnd),
        })
    }
}

fn is_window(hwnd: HWND) -> bool {
    // SAFETY: IsWindow accepts any value
    unsafe { IsWindow(hwnd) != FALSE }
}

// ========== GDI readback ==========

fn bitmap_info(width: u32, height: u32) -> BITMAPINFO {
    // SAFETY: BITMAPINFO is plain data; zero is a valid bit pattern
    let mut info: BITMAPINFO = unsafe { mem::zeroed() };
    info.bmiHeader = BITMAPINFOHEADER {
        biSize:          mem::size_of::<BITMAPINFOHEADER>() as u32,
        biWidth:         width as i32,
        // Negative height requests top-down rows
        biHeight:        -(height as i32),
        biPlanes:        1,
        biBitCount:      32,
        biCompression:   BI_RGB as u32,
        biSizeImage:     0,
        biXPelsPerMeter: 0,
        biYPelsPerMeter: 0,
        biClrUsed:       0,
        biClrImportant:  0,
    };
    info
}

/// Copies a bitmap that is not selected into any DC into `staging`
fn read_bitmap(
    dc: HDC,
    bitmap: HBITMAP,
    width: u32,
    height: u32,
    staging: &mut StagingBuffer,
) -> ScoutResult<()> {
    staging.ensure(SurfaceDesc::packed(width, height, PixelFormat::Bgra8));
    let mut info = bitmap_info(width, height);
    // SAFETY: the staging slice holds width * height * 4 bytes
    let lines = unsafe {
        GetDIBits(
            dc,
            bitmap,
            0,
            height,
            staging.as_mut_slice().as_mut_ptr() as *mut c_void,
            &mut info,
            DIB_RGB_COLORS,
        )
    };
    if lines <= 0 {
        return Err(ScoutError::ImageError(format!(
            "GetDIBits copied no rows: {}",
            io::Error::last_os_error()
        )));
    }
    Ok(())
}

/// Memory DC plus a compatible bitmap, reallocated only when the size changes
struct GdiSurface {
    dc:     HDC,
    bitmap: HBITMAP,
    size:   (u32, u32),
}

impl GdiSurface {
    fn new() -> ScoutResult<Self> {
        // SAFETY: a null DC yields a memory DC compatible with the screen
        let dc = unsafe { CreateCompatibleDC(ptr::null_mut()) };
        if dc.is_null() {
            return Err(ScoutError::init_failed("window-dc", io::Error::last_os_error()));
        }
        Ok(Self {
            dc,
            bitmap: ptr::null_mut(),
            size: (0, 0),
        })
    }

    fn ensure(&mut self, width: u32, height: u32) -> ScoutResult<()> {
        if !self.bitmap.is_null() && self.size == (width, height) {
            return Ok(());
        }
        self.release_bitmap();

        // SAFETY: the screen DC is released before returning
        let bitmap = unsafe {
            let screen = GetDC(ptr::null_mut());
            let bitmap = CreateCompatibleBitmap(screen, width as i32, height as i32);
            ReleaseDC(ptr::null_mut(), screen);
            bitmap
        };
        if bitmap.is_null() {
            return Err(ScoutError::init_failed("bitmap", io::Error::last_os_error()));
        }
        tracing::debug!(width, height, "Allocated capture bitmap");
        self.bitmap = bitmap;
        self.size = (width, height);
        Ok(())
    }

    /// Runs `draw` with the bitmap selected into the memory DC
    fn draw<F: FnOnce(HDC) -> bool>(&self, draw: F) -> bool {
        // SAFETY: the previous object is restored before returning
        unsafe {
            let previous = SelectObject(self.dc, self.bitmap);
            let drawn = draw(self.dc);
            SelectObject(self.dc, previous);
            drawn
        }
    }

    fn read_into(&self, staging: &mut StagingBuffer) -> ScoutResult<()> {
        read_bitmap(self.dc, self.bitmap, self.size.0, self.size.1, staging)
    }

    fn release_bitmap(&mut self) {
        if !self.bitmap.is_null() {
            // SAFETY: the bitmap is never left selected into the DC
            unsafe { DeleteObject(self.bitmap) };
            self.bitmap = ptr::null_mut();
        }
    }
}

impl Drop for GdiSurface {
    fn drop(&mut self) {
        self.release_bitmap();
        if !self.dc.is_null() {
            // SAFETY: the DC was created by CreateCompatibleDC
            unsafe { DeleteDC(self.dc) };
        }
    }
}

// ========== Push source (WGC) ==========

struct PushFlags {
    hwnd:    usize,
    mailbox: Arc<LatestMailbox<Frame>>,
}

struct PushHandler {
    hwnd:    usize,
    mailbox: Arc<LatestMailbox<Frame>>,
    staging: StagingBuffer,
}

impl GraphicsCaptureApiHandler for PushHandler {
    type Flags = PushFlags;
    type Error = Box<dyn std::error::Error + Send + Sync>;

    fn new(ctx: Context<Self::Flags>) -> Result<Self, Self::Error> {
        Ok(Self {
            hwnd:    ctx.flags.hwnd,
            mailbox: ctx.flags.mailbox,
            staging: StagingBuffer::new(),
        })
    }

    fn on_frame_arrived(
        &mut self,
        frame: &mut WcFrame,
        capture_control: InternalCaptureControl,
    ) -> Result<(), Self::Error> {
        if self.mailbox.is_closed() {
            capture_control.stop();
            return Ok(());
        }

        let width = frame.width();
        let height = frame.height();
        let mut buffer = frame.buffer()?;
        let pixels = buffer.as_nopadding_buffer()?;

        let desc = SurfaceDesc::packed(width, height, PixelFormat::Bgra8);
        self.staging.copy_from(desc, pixels, desc.stride)?;

        let crop = window_geometry(self.hwnd as HWND).map(|geometry| {
            client_crop(
                geometry.frame_bounds,
                geometry.client_origin,
                geometry.client_size,
                (width, height),
            )
        });
        self.mailbox.post(self.staging.to_frame(crop)?);
        Ok(())
    }

    fn on_closed(&mut self) -> Result<(), Self::Error> {
        tracing::debug!("WGC capture item closed");
        self.mailbox.close();
        Ok(())
    }
}

struct PushSource {
    control: Option<CaptureControl<PushHandler, <PushHandler as GraphicsCaptureApiHandler>::Error>>,
    mailbox: Arc<LatestMailbox<Frame>>,
}

impl PushSource {
    fn open(target: &ResolvedTarget) -> ScoutResult<Self> {
        let hwnd = hwnd_of(target.window);
        if !is_window(hwnd) {
            return Err(ScoutError::WindowClosed);
        }

        let mailbox = Arc::new(LatestMailbox::new());
        let settings = Settings::new(
            WcWindow::from_raw_hwnd(hwnd as *mut c_void),
            CursorCaptureSettings::WithoutCursor,
            DrawBorderSettings::WithoutBorder,
            SecondaryWindowSettings::Default,
            MinimumUpdateIntervalSettings::Default,
            DirtyRegionSettings::Default,
            ColorFormat::Bgra8,
            PushFlags {
                hwnd:    hwnd as usize,
                mailbox: Arc::clone(&mailbox),
            },
        );

        let control = PushHandler::start_free_threaded(settings).map_err(|e| {
            tracing::warn!(error = %e, "Failed to start WGC capture");
            ScoutError::init_failed("capture-session", e)
        })?;

        tracing::debug!(window = %target.window, "Opened WGC frame source");
        Ok(Self {
            control: Some(control),
            mailbox,
        })
    }
}

impl FrameSource for PushSource {
    fn mode(&self) -> CaptureMode {
        CaptureMode::Push
    }

    fn acquire(&mut self, wait: Duration) -> ScoutResult<Option<Frame>> {
        match self.mailbox.take_timeout(wait) {
            Received::Value(frame) => Ok(Some(frame)),
            Received::Empty => Ok(None),
            Received::Closed => Err(ScoutError::WindowClosed),
        }
    }

    fn close(&mut self) {
        self.mailbox.close();
        if let Some(control) = self.control.take() {
            if let Err(e) = control.stop() {
                tracing::warn!(error = %e, "Failed to stop WGC capture");
            }
        }
    }
}

impl Drop for PushSource {
    fn drop(&mut self) {
        self.close();
    }
}

// ========== Poll source (PrintWindow) ==========

struct PollSource {
    hwnd:    usize,
    surface: Option<GdiSurface>,
    staging: StagingBuffer,
}

impl PollSource {
    fn open(target: &ResolvedTarget) -> ScoutResult<Self> {
        let hwnd = hwnd_of(target.window);
        if !is_window(hwnd) {
            return Err(ScoutError::WindowClosed);
        }
        let surface = GdiSurface::new()?;
        tracing::debug!(window = %target.window, "Opened PrintWindow frame source");
        Ok(Self {
            hwnd: hwnd as usize,
            surface: Some(surface),
            staging: StagingBuffer::new(),
        })
    }
}

impl FrameSource for PollSource {
    fn mode(&self) -> CaptureMode {
        CaptureMode::Poll
    }

    fn acquire(&mut self, _wait: Duration) -> ScoutResult<Option<Frame>> {
        let hwnd = self.hwnd as HWND;
        let Some(surface) = self.surface.as_mut() else {
            return Err(ScoutError::WindowClosed);
        };
        if !is_window(hwnd) {
            return Err(ScoutError::WindowClosed);
        }
        // SAFETY: plain query on a window handle
        if unsafe { IsIconic(hwnd) } != FALSE {
            return Ok(None);
        }

        let Some(geometry) = window_geometry(hwnd) else {
            return Ok(None);
        };
        let (width, height) = (geometry.window_rect.width(), geometry.window_rect.height());
        if width == 0 || height == 0 {
            return Ok(None);
        }

        surface.ensure(width, height)?;
        // SAFETY: the memory DC has the bitmap selected for the duration
        let printed = surface.draw(|dc| unsafe { PrintWindow(hwnd, dc, PW_RENDERFULLCONTENT) } != FALSE);
        if !printed {
            return Err(ScoutError::ImageError("PrintWindow failed".to_string()));
        }
        surface.read_into(&mut self.staging)?;

        let crop = client_crop(
            geometry.window_rect,
            geometry.client_origin,
            geometry.client_size,
            (width, height),
        );
        self.staging.to_frame(Some(crop)).map(Some)
    }

    fn close(&mut self) {
        self.surface = None;
    }
}

// ========== Screen grab (GDI) ==========

/// Bounding rectangle of all monitors, in desktop coordinates
///
/// The primary monitor's top-left corner is the origin, so monitors to its
/// left or above it have negative coordinates.
fn virtual_screen() -> ScreenRect {
    // SAFETY: plain metric queries
    let (left, top, width, height) = unsafe {
        (
            GetSystemMetrics(SM_XVIRTUALSCREEN),
            GetSystemMetrics(SM_YVIRTUALSCREEN),
            GetSystemMetrics(SM_CXVIRTUALSCREEN),
            GetSystemMetrics(SM_CYVIRTUALSCREEN),
        )
    };
    ScreenRect {
        left,
        top,
        right: left.saturating_add(width.max(0)),
        bottom: top.saturating_add(height.max(0)),
    }
}

fn grab_screen_sync(region: Option<Region>) -> ScoutResult<GrabbedRegion> {
    let desktop = virtual_screen();
    if desktop.width() == 0 || desktop.height() == 0 {
        return Err(ScoutError::BackendNotAvailable {
            backend: "gdi screen".to_string(),
        });
    }
    let rect = desktop.clip(region).ok_or_else(|| {
        ScoutError::invalid_parameter("region", format!("{region:?} is off the desktop"))
    })?;

    let mut surface = GdiSurface::new()?;
    surface.ensure(rect.width(), rect.height())?;
    // SAFETY: the screen DC is released inside the closure
    let copied = surface.draw(|dc| unsafe {
        let screen = GetDC(ptr::null_mut());
        let ok = BitBlt(
            dc,
            0,
            0,
            rect.width() as i32,
            rect.height() as i32,
            screen,
            rect.left,
            rect.top,
            SRCCOPY,
        );
        ReleaseDC(ptr::null_mut(), screen);
        ok != FALSE
    });
    if !copied {
        return Err(ScoutError::init_failed("screen-dc", io::Error::last_os_error()));
    }

    let mut staging = StagingBuffer::new();
    surface.read_into(&mut staging)?;
    Ok(GrabbedRegion {
        frame:    staging.to_frame(None)?,
        origin_x: rect.left,
        origin_y: rect.top,
    })
}

// ========== Trait impls ==========

impl SystemProbe for WindowsBackend {
    fn processes(&self) -> ScoutResult<Vec<ProcessRecord>> {
        snapshot_processes()
    }

    fn windows(&self) -> ScoutResult<Vec<WindowRecord>> {
        Ok(enumerate_window_handles().into_iter().map(window_record).collect())
    }
}

impl CaptureBackend for WindowsBackend {
    fn name(&self) -> &'static str {
        "windows"
    }

    fn open_source(
        &self,
        target: &ResolvedTarget,
        mode: CaptureMode,
    ) -> ScoutResult<Box<dyn FrameSource>> {
        match mode {
            CaptureMode::Push => Ok(Box::new(PushSource::open(target)?)),
            CaptureMode::Poll => Ok(Box::new(PollSource::open(target)?)),
            CaptureMode::Auto => Err(ScoutError::invalid_parameter(
                "mode",
                "frame sources are opened as push or poll",
            )),
        }
    }
}

#[async_trait]
impl RegionGrabber for WindowsBackend {
    async fn grab(&self, region: Option<Region>) -> ScoutResult<GrabbedRegion> {
        tokio::task::spawn_blocking(move || grab_screen_sync(region))
            .await
            .map_err(|e| ScoutError::init_failed("screen-grab", e))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_windows_backend_new() {
        assert!(WindowsBackend::new().is_ok());
    }

    #[test]
    fn test_snapshot_contains_current_process() {
        let processes = snapshot_processes().unwrap();
        let me = std::process::id();
        assert!(processes.iter().any(|p| p.pid == me));
    }

    #[test]
    fn test_window_title_invalid_handle() {
        assert!(window_title(ptr::null_mut()).is_empty());
    }

    #[test]
    fn test_window_geometry_invalid_handle() {
        assert!(window_geometry(ptr::null_mut()).is_none());
    }

    #[test]
    fn test_open_source_rejects_closed_window() {
        let backend = WindowsBackend::new().unwrap();
        let target = ResolvedTarget {
            window:        WindowId(0),
            pid:           0,
            title:         String::new(),
            client_width:  0,
            client_height: 0,
        };
        assert!(matches!(
            backend.open_source(&target, CaptureMode::Poll),
            Err(ScoutError::WindowClosed)
        ));
        assert!(backend.open_source(&target, CaptureMode::Auto).is_err());
    }

    #[test]
    fn test_wide_to_string_stops_at_nul() {
        let wide: Vec<u16> = "game.exe\0junk".encode_utf16().collect();
        assert_eq!(wide_to_string(&wide), "game.exe");
    }

    #[tokio::test]
    async fn test_grab_off_screen_region_fails() {
        let backend = WindowsBackend::new().unwrap();
        let result = backend.grab(Some(Region::new(-10_000, -10_000, 5, 5))).await;
        assert!(result.is_err());
    }
}
