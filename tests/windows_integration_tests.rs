//! Windows backend integration tests
//!
//! These tests need an interactive Windows desktop with at least one visible
//! application window, so all of them are `#[ignore]`d. Run them manually:
//!
//! ```powershell
//! cargo test --test windows_integration_tests -- --ignored --nocapture
//!
//! # With debug logging
//! set RUST_LOG=screenscout=debug
//! cargo test --test windows_integration_tests -- --ignored --nocapture
//! ```
//!
//! Push capture requires Windows 10 1903 or later.

#![cfg(all(target_os = "windows", feature = "windows-backend"))]

mod common;

use std::time::{Duration, Instant};

use screenscout::{
    Scout,
    capture::{CaptureBackend, RegionGrabber, SystemProbe, WindowsBackend},
    model::{CaptureMode, Region, SessionPhase, TargetDescriptor},
};

use common::fast_config;

fn explorer() -> TargetDescriptor {
    TargetDescriptor::process_name("explorer.exe")
}

#[test]
#[ignore = "requires Windows desktop environment"]
fn test_enumerates_processes_and_windows() {
    let backend = WindowsBackend::new().expect("Failed to create backend");
    let processes = backend.processes().expect("Failed to snapshot processes");
    let windows = backend.windows().expect("Failed to enumerate windows");

    println!("{} processes, {} windows", processes.len(), windows.len());
    for window in windows.iter().filter(|w| w.visible).take(10) {
        println!(
            "  {} pid={} {}x{} '{}'",
            window.id, window.pid, window.client_width, window.client_height, window.title
        );
    }

    assert!(processes.iter().any(|p| p.name.eq_ignore_ascii_case("explorer.exe")));
    assert!(windows.iter().any(|w| w.visible));
}

#[test]
#[ignore = "requires Windows desktop environment"]
fn test_resolves_explorer_window() {
    let backend = WindowsBackend::new().expect("Failed to create backend");
    let target = backend.resolve(&explorer()).expect("Failed to resolve explorer");

    println!("Resolved {} ({}x{})", target.window, target.client_width, target.client_height);
    assert!(target.client_width > 0 && target.client_height > 0);
}

#[tokio::test]
#[ignore = "requires Windows desktop environment"]
async fn test_poll_session_round_trip() {
    let scout = Scout::new().expect("Failed to create engine").with_session_config(fast_config());

    let started = Instant::now();
    let info = scout
        .start_capture_session(explorer().with_mode(CaptureMode::Poll))
        .await
        .expect("Failed to start poll session");
    println!("Started {:?} in {:?}", info, started.elapsed());

    tokio::time::sleep(Duration::from_millis(200)).await;
    let bytes = scout.get_latest_frame();
    assert_eq!(&bytes[0..2], b"BM");

    scout.stop_capture_session().await.expect("Failed to stop");
    assert_eq!(scout.session_phase(), SessionPhase::Idle);
}

#[tokio::test]
#[ignore = "requires Windows 10 1903+ with Graphics Capture"]
async fn test_push_session_restart() {
    let scout = Scout::new().expect("Failed to create engine").with_session_config(fast_config());

    for attempt in 0..3 {
        let info = scout
            .start_capture_session(explorer().with_mode(CaptureMode::Auto))
            .await
            .expect("Failed to start session");
        println!("Attempt {attempt}: {} via {}", info.target.window, info.mode);
    }

    assert_eq!(scout.session_phase(), SessionPhase::Capturing);
    scout.stop_capture_session().await.expect("Failed to stop");
}

#[tokio::test]
#[ignore = "requires Windows desktop environment"]
async fn test_screen_grab_region() {
    let backend = WindowsBackend::new().expect("Failed to create backend");
    let grabbed = backend
        .grab(Some(Region::new(0, 0, 200, 100)))
        .await
        .expect("Failed to grab region");

    assert_eq!(grabbed.frame.dimensions(), (200, 100));
    assert_eq!((grabbed.origin_x, grabbed.origin_y), (0, 0));
}
