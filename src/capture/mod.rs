//! Window capture: target resolution, frame sources and the capture session
//!
//! - [`resolve`]: turn a process/window descriptor into one window
//! - [`traits`]: the capabilities a platform backend provides
//! - [`CaptureSession`]: single-session state machine that keeps the latest
//!   frame of the target window in a [`FrameBuffer`]
//! - [`StagingBuffer`] and [`client_crop`]: CPU copy of a captured surface,
//!   cropped to the client area
//!
//! The Windows backend offers a push strategy (Windows Graphics Capture) and
//! a poll strategy (`PrintWindow`). [`mock::MockBackend`] implements the same
//! traits for tests.

pub mod config;
pub mod constants;
pub mod frame;
pub mod frame_buffer;
pub mod mailbox;
pub mod mock;
pub mod resolve;
pub mod session;
pub mod staging;
pub mod traits;

#[cfg(all(target_os = "windows", feature = "windows-backend"))]
pub mod windows_backend;

pub use config::{SessionConfig, SessionConfigBuilder};
pub use frame::{Frame, PixelFormat, pixels_to_rgb};
pub use frame_buffer::FrameBuffer;
pub use mailbox::{LatestMailbox, Received, StopSignal};
pub use mock::MockBackend;
pub use session::CaptureSession;
pub use staging::{ScreenRect, StagingBuffer, SurfaceDesc, client_crop};
pub use traits::{CaptureBackend, FrameSource, GrabbedRegion, RegionGrabber, SystemProbe};
#[cfg(all(target_os = "windows", feature = "windows-backend"))]
pub use windows_backend::WindowsBackend;

pub use crate::model::PixelRect;
