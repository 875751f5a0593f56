//! Target window resolution
//!
//! Turns a [`TargetDescriptor`] into one concrete window:
//!
//! 1. **Candidate processes** - the pid itself, or every process whose
//!    executable name matches (case-insensitive)
//! 2. **Descendants** - the whole child-process subtree of each candidate,
//!    walked iteratively over a parent to children map with a visited set
//! 3. **Window pick** - among visible top-level windows owned by any
//!    candidate (and matching the optional title filter), the one with the
//!    largest client area; ties keep the first enumerated window

use std::collections::{HashMap, HashSet};

use super::traits::SystemProbe;
use crate::error::{ScoutError, ScoutResult};
use crate::model::{ProcessRecord, ResolvedTarget, TargetDescriptor, TargetKind, WindowRecord};

/// Collects `roots` plus every descendant process
///
/// Cycles in the parent table (pid reuse can produce them) are tolerated.
pub fn descendant_pids(processes: &[ProcessRecord], roots: &[u32]) -> HashSet<u32> {
    let mut children: HashMap<u32, Vec<u32>> = HashMap::new();
    for process in processes {
        if process.pid != process.parent_pid {
            children.entry(process.parent_pid).or_default().push(process.pid);
        }
    }

    let mut visited = HashSet::new();
    let mut stack: Vec<u32> = roots.to_vec();
    while let Some(pid) = stack.pop() {
        if !visited.insert(pid) {
            continue;
        }
        if let Some(kids) = children.get(&pid) {
            stack.extend(kids.iter().copied().filter(|kid| !visited.contains(kid)));
        }
    }
    visited
}

fn title_matches(title: &str, filter: Option<&str>) -> bool {
    match filter {
        Some(filter) if !filter.is_empty() => title.to_lowercase().contains(&filter.to_lowercase()),
        _ => true,
    }
}

fn is_capturable(window: &WindowRecord) -> bool {
    window.visible && window.client_area() > 0
}

/// Picks the visible window with the largest client area among `pids`
pub fn pick_largest_window<'a>(
    windows: &'a [WindowRecord],
    pids: &HashSet<u32>,
    title_filter: Option<&str>,
) -> Option<&'a WindowRecord> {
    let mut best: Option<&WindowRecord> = None;
    for window in windows {
        if !pids.contains(&window.pid)
            || !is_capturable(window)
            || !title_matches(&window.title, title_filter)
        {
            continue;
        }
        if best.is_none_or(|current| window.client_area() > current.client_area()) {
            best = Some(window);
        }
    }
    best
}

/// Resolves `target` against a fresh process/window snapshot from `probe`
pub fn resolve_target<P>(probe: &P, target: &TargetDescriptor) -> ScoutResult<ResolvedTarget>
where
    P: SystemProbe + ?Sized,
{
    let title_filter = target.title_filter.as_deref();
    let not_found = || ScoutError::ProcessNotFound {
        target: target.to_string(),
    };
    let no_window = || ScoutError::WindowNotFound {
        target: target.to_string(),
    };

    let windows = probe.windows()?;

    match &target.kind {
        TargetKind::Window(id) => {
            let window = windows
                .iter()
                .find(|window| window.id == *id)
                .filter(|window| is_capturable(window) && title_matches(&window.title, title_filter))
                .ok_or_else(no_window)?;
            tracing::debug!(window = %window.id, title = %window.title, "Resolved explicit window");
            Ok(ResolvedTarget::from(window))
        }
        TargetKind::Process(0) => Err(not_found()),
        TargetKind::Process(pid) => {
            let processes = probe.processes()?;
            if !processes.iter().any(|process| process.pid == *pid) {
                return Err(not_found());
            }
            let pids = descendant_pids(&processes, &[*pid]);
            pick(&windows, &pids, title_filter).ok_or_else(no_window)
        }
        TargetKind::ProcessName(name) => {
            let processes = probe.processes()?;
            let roots: Vec<u32> = processes
                .iter()
                .filter(|process| process.name.eq_ignore_ascii_case(name))
                .map(|process| process.pid)
                .collect();
            if roots.is_empty() {
                return Err(not_found());
            }
            let pids = descendant_pids(&processes, &roots);
            pick(&windows, &pids, title_filter).ok_or_else(no_window)
        }
    }
}

fn pick(
    windows: &[WindowRecord],
    pids: &HashSet<u32>,
    title_filter: Option<&str>,
) -> Option<ResolvedTarget> {
    let window = pick_largest_window(windows, pids, title_filter)?;
    tracing::debug!(
        window = %window.id,
        pid = window.pid,
        candidates = pids.len(),
        width = window.client_width,
        height = window.client_height,
        "Resolved target window"
    );
    Some(ResolvedTarget::from(window))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::WindowId;

    struct StaticProbe {
        processes: Vec<ProcessRecord>,
        windows:   Vec<WindowRecord>,
    }

    impl SystemProbe for StaticProbe {
        fn processes(&self) -> ScoutResult<Vec<ProcessRecord>> {
            Ok(self.processes.clone())
        }

        fn windows(&self) -> ScoutResult<Vec<WindowRecord>> {
            Ok(self.windows.clone())
        }
    }

    fn window(id: u64, pid: u32, title: &str, visible: bool, w: u32, h: u32) -> WindowRecord {
        WindowRecord {
            id: WindowId(id),
            pid,
            title: title.to_string(),
            visible,
            client_width: w,
            client_height: h,
        }
    }

    fn launcher_tree() -> StaticProbe {
        StaticProbe {
            processes: vec![
                ProcessRecord::new(1, 0, "explorer.exe"),
                ProcessRecord::new(100, 1, "Launcher.exe"),
                ProcessRecord::new(101, 100, "game.exe"),
                ProcessRecord::new(102, 101, "renderer.exe"),
                ProcessRecord::new(200, 1, "notepad.exe"),
            ],
            windows:   vec![
                window(0xA, 100, "Launcher", true, 400, 300),
                window(0xB, 101, "Game Lobby", true, 1280, 720),
                window(0xC, 102, "Hidden Renderer", false, 1920, 1080),
                window(0xD, 200, "Untitled - Notepad", true, 800, 600),
            ],
        }
    }

    #[test]
    fn test_descendants_include_whole_subtree() {
        let probe = launcher_tree();
        let pids = descendant_pids(&probe.processes, &[100]);
        assert_eq!(pids, HashSet::from([100, 101, 102]));
    }

    #[test]
    fn test_descendants_tolerate_cycles() {
        let processes = vec![
            ProcessRecord::new(5, 6, "a.exe"),
            ProcessRecord::new(6, 5, "b.exe"),
            ProcessRecord::new(7, 7, "self.exe"),
        ];
        let pids = descendant_pids(&processes, &[5]);
        assert_eq!(pids, HashSet::from([5, 6]));
        assert_eq!(descendant_pids(&processes, &[7]), HashSet::from([7]));
    }

    #[test]
    fn test_name_picks_largest_visible_descendant_window() {
        let probe = launcher_tree();
        let resolved = resolve_target(&probe, &TargetDescriptor::process_name("launcher.EXE")).unwrap();

        // The hidden renderer window is larger but not visible
        assert_eq!(resolved.window, WindowId(0xB));
        assert_eq!(resolved.pid, 101);
        assert_eq!(resolved.client_width, 1280);
    }

    #[test]
    fn test_title_filter_narrows_choice() {
        let probe = launcher_tree();
        let target = TargetDescriptor::process(100).with_title_filter("launch");
        let resolved = resolve_target(&probe, &target).unwrap();
        assert_eq!(resolved.window, WindowId(0xA));
    }

    #[test]
    fn test_ties_keep_first_window() {
        let windows = vec![
            window(1, 9, "first", true, 100, 100),
            window(2, 9, "second", true, 100, 100),
        ];
        let pids = HashSet::from([9]);
        assert_eq!(pick_largest_window(&windows, &pids, None).unwrap().id, WindowId(1));
    }

    #[test]
    fn test_unknown_process_name() {
        let probe = launcher_tree();
        let result = resolve_target(&probe, &TargetDescriptor::process_name("missing.exe"));
        assert!(matches!(result, Err(ScoutError::ProcessNotFound { .. })));
    }

    #[test]
    fn test_pid_zero_is_not_a_process() {
        let probe = launcher_tree();
        let result = resolve_target(&probe, &TargetDescriptor::process(0));
        assert!(matches!(result, Err(ScoutError::ProcessNotFound { .. })));
    }

    #[test]
    fn test_process_without_visible_window() {
        let probe = launcher_tree();
        let result = resolve_target(&probe, &TargetDescriptor::process(102));
        assert!(matches!(result, Err(ScoutError::WindowNotFound { .. })));
    }

    #[test]
    fn test_explicit_window() {
        let probe = launcher_tree();
        let resolved = resolve_target(&probe, &TargetDescriptor::window(WindowId(0xD))).unwrap();
        assert_eq!(resolved.pid, 200);
        assert_eq!(resolved.title, "Untitled - Notepad");

        let hidden = resolve_target(&probe, &TargetDescriptor::window(WindowId(0xC)));
        assert!(matches!(hidden, Err(ScoutError::WindowNotFound { .. })));
    }
}
