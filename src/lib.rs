//! screenscout: window capture sessions and template matching for on-screen
//! automation
//!
//! The library keeps the most recent frame of a target window up to date and
//! locates registered template images in frames, screen regions or
//! caller-supplied images using zero-mean normalized cross-correlation.
//!
//! - [`capture`]: target resolution, push/poll frame sources, the
//!   single-session state machine and the latest-frame buffer
//! - [`search`]: template registry, ZNCC kernel, single and batch search
//! - [`engine`]: the [`engine::Scout`] facade exposing the boundary operations

pub mod capture;
pub mod engine;
pub mod error;
pub mod model;
pub mod search;
pub mod util;

pub use engine::Scout;
pub use error::{ScoutError, ScoutResult};
