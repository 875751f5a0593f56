//! Boundary facade over the template registry, matcher and capture session
//!
//! [`Scout`] owns one of each and exposes the operations an application
//! shell calls: template load/release, single and batch search, and the
//! capture session lifecycle. Template and search operations speak the
//! boundary's integer conventions (negative handle codes, `(-1, -1, 0)` for
//! not-found) and never fail; capture operations return [`ScoutResult`].
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//!
//! use image::{Rgb, RgbImage};
//! use screenscout::{
//!     capture::MockBackend,
//!     engine::Scout,
//!     search::{SearchRequest, Template},
//! };
//!
//! let scout = Scout::with_backend(Arc::new(MockBackend::new()));
//! let handle = scout
//!     .templates()
//!     .insert(Template::new(RgbImage::from_pixel(4, 4, Rgb([255, 0, 0]))).unwrap())
//!     .unwrap();
//!
//! let mut scene = RgbImage::new(32, 32);
//! image::imageops::replace(&mut scene, &RgbImage::from_pixel(4, 4, Rgb([255, 0, 0])), 9, 3);
//!
//! let result = scout.search_image(scene, &SearchRequest::new(handle, 0.9));
//! assert_eq!((result.x, result.y), (9, 3));
//! ```

use std::path::Path;
use std::sync::Arc;

use image::RgbImage;

use crate::capture::{
    CaptureBackend, CaptureSession, RegionGrabber, SessionConfig,
};
use crate::error::{ScoutError, ScoutResult};
use crate::model::{
    Region, SearchResult, SessionInfo, SessionPhase, TargetDescriptor, TemplateHandle,
};
use crate::search::{BatchResultItem, Matcher, SearchRequest, SourceImage, TemplateStore};

/// Capture and search engine
pub struct Scout {
    templates:      Arc<TemplateStore>,
    matcher:        Matcher,
    session:        Arc<CaptureSession>,
    grabber:        Arc<dyn RegionGrabber>,
    session_config: SessionConfig,
}

impl std::fmt::Debug for Scout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scout")
            .field("templates", &self.templates.len())
            .field("session", &self.session)
            .field("session_config", &self.session_config)
            .finish_non_exhaustive()
    }
}

impl Scout {
    /// Creates an engine on the platform capture backend
    ///
    /// # Errors
    ///
    /// [`ScoutError::BackendNotAvailable`] when the crate was built without a
    /// backend for this platform.
    #[cfg(all(target_os = "windows", feature = "windows-backend"))]
    pub fn new() -> ScoutResult<Self> {
        let backend = Arc::new(crate::capture::WindowsBackend::new()?);
        Ok(Self::with_backend(backend))
    }

    /// Creates an engine on the platform capture backend
    ///
    /// # Errors
    ///
    /// [`ScoutError::BackendNotAvailable`] when the crate was built without a
    /// backend for this platform.
    #[cfg(not(all(target_os = "windows", feature = "windows-backend")))]
    pub fn new() -> ScoutResult<Self> {
        Err(ScoutError::BackendNotAvailable {
            backend: std::env::consts::OS.to_string(),
        })
    }

    /// Creates an engine on an explicit backend (e.g. [`crate::capture::MockBackend`])
    pub fn with_backend<B>(backend: Arc<B>) -> Self
    where
        B: CaptureBackend + RegionGrabber + 'static,
    {
        let grabber: Arc<dyn RegionGrabber> = backend.clone();
        let capture: Arc<dyn CaptureBackend> = backend;
        let templates = Arc::new(TemplateStore::new());

        Self {
            matcher: Matcher::new(Arc::clone(&templates)),
            templates,
            session: Arc::new(CaptureSession::new(capture)),
            grabber,
            session_config: SessionConfig::default(),
        }
    }

    /// Replaces the configuration used by later session starts
    pub fn with_session_config(mut self, config: SessionConfig) -> Self {
        self.session_config = config;
        self
    }

    pub fn templates(&self) -> &Arc<TemplateStore> {
        &self.templates
    }

    pub fn matcher(&self) -> &Matcher {
        &self.matcher
    }

    pub fn session(&self) -> &Arc<CaptureSession> {
        &self.session
    }

    // ========== Templates ==========

    /// Loads a template, returning its handle or a negative error code
    ///
    /// `-1` unreadable path, `-2` undecodable image, `-3` empty image.
    pub fn load_template(&self, path: impl AsRef<Path>) -> i32 {
        match self.try_load_template(path) {
            Ok(handle) => handle.get(),
            Err(e) => e.code(),
        }
    }

    pub fn try_load_template(&self, path: impl AsRef<Path>) -> ScoutResult<TemplateHandle> {
        self.templates.load(path.as_ref())
    }

    /// Releases one template; unknown handles are ignored
    pub fn release_template(&self, handle: i32) {
        self.templates.release(TemplateHandle::new(handle));
    }

    /// Releases every template and restarts handle numbering
    pub fn release_all_templates(&self) {
        self.templates.release_all();
    }

    // ========== Search ==========

    /// Grabs a screen region and searches it for a template
    ///
    /// `w <= 0 || h <= 0` grabs the whole surface. Coordinates are reported
    /// in the grabbed surface's space, i.e. offset by the clamped region
    /// origin.
    pub async fn search(
        &self,
        handle: i32,
        x: i32,
        y: i32,
        w: i32,
        h: i32,
        threshold: f64,
    ) -> SearchResult {
        let handle = TemplateHandle::new(handle);
        if !self.templates.contains(handle) {
            tracing::debug!(%handle, "Template not registered, skipping grab");
            return SearchResult::NOT_FOUND;
        }

        let grabbed = match self.grabber.grab(Region::from_boundary(x, y, w, h)).await {
            Ok(grabbed) => grabbed,
            Err(e) => {
                tracing::warn!(error = %e, "Screen grab failed");
                return SearchResult::NOT_FOUND;
            }
        };
        let image = match grabbed.frame.to_rgb_image() {
            Ok(image) => image,
            Err(e) => {
                tracing::warn!(error = %e, "Grabbed region could not be converted");
                return SearchResult::NOT_FOUND;
            }
        };

        self.matcher
            .search_image(image, &SearchRequest::new(handle, threshold))
            .offset(grabbed.origin_x, grabbed.origin_y)
    }

    /// Searches an image the caller already decoded
    pub fn search_image(&self, image: RgbImage, request: &SearchRequest) -> SearchResult {
        self.matcher.search_image(image, request)
    }

    /// Searches the capture session's latest frame
    ///
    /// Not-found when no frame has been published yet.
    pub fn search_latest_frame(
        &self,
        handle: i32,
        roi: Option<Region>,
        threshold: f64,
    ) -> SearchResult {
        let Some(frame) = self.session.latest_frame() else {
            tracing::debug!("No frame published yet");
            return SearchResult::NOT_FOUND;
        };
        let image = match frame.to_rgb_image() {
            Ok(image) => image,
            Err(e) => {
                tracing::warn!(error = %e, "Latest frame could not be converted");
                return SearchResult::NOT_FOUND;
            }
        };

        let mut request = SearchRequest::new(TemplateHandle::new(handle), threshold);
        request.roi = roi;
        self.matcher.search_image(image, &request)
    }

    /// Runs many searches against one caller-supplied image
    ///
    /// `width > 0` means `bytes` holds raw BGRA rows of `stride` bytes
    /// (`stride <= 0` for tightly packed); `width == 0` means compressed
    /// image bytes. Invalid input yields not-found for every request.
    pub fn search_batch(
        &self,
        bytes: &[u8],
        width: i32,
        height: i32,
        stride: i32,
        requests: &[SearchRequest],
    ) -> Vec<BatchResultItem> {
        match SourceImage::from_boundary(bytes, width, height, stride) {
            Ok(source) => self.matcher.search_batch_source(source, requests),
            Err(e) => {
                tracing::warn!(error = %e, "Rejected batch source");
                requests
                    .iter()
                    .map(|request| BatchResultItem::not_found(request.template))
                    .collect()
            }
        }
    }

    /// [`Scout::search_batch`] writing into a caller-provided array
    ///
    /// Slots beyond `requests.len()` are left untouched.
    pub fn search_batch_into(
        &self,
        bytes: &[u8],
        width: i32,
        height: i32,
        stride: i32,
        requests: &[SearchRequest],
        results: &mut [BatchResultItem],
    ) {
        if results.len() < requests.len() {
            tracing::warn!(
                requests = requests.len(),
                slots = results.len(),
                "Result array shorter than request list, truncating"
            );
        }
        let computed = self.search_batch(bytes, width, height, stride, requests);
        for (slot, item) in results.iter_mut().zip(computed) {
            *slot = item;
        }
    }

    // ========== Capture session ==========

    /// Starts capturing a window, replacing any running session
    pub async fn start_capture_session(&self, target: TargetDescriptor) -> ScoutResult<SessionInfo> {
        self.session.start(target, self.session_config.clone()).await
    }

    /// Stops the running session and waits until its resources are released
    pub async fn stop_capture_session(&self) -> ScoutResult<()> {
        let session = Arc::clone(&self.session);
        tokio::task::spawn_blocking(move || session.stop())
            .await
            .map_err(|e| ScoutError::init_failed("session-stop", e))?
    }

    /// Latest frame as encoded image bytes; empty when none is available
    pub fn get_latest_frame(&self) -> Vec<u8> {
        self.session.latest_frame_encoded().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Failed to encode latest frame");
            Vec::new()
        })
    }

    pub fn session_phase(&self) -> SessionPhase {
        self.session.phase()
    }

    pub fn session_info(&self) -> Option<SessionInfo> {
        self.session.info()
    }
}
