//! Directory scanner - the repository's file-event source
//!
//! A timer thread periodically sweeps the watched root for `*.xml` file
//! units, hashes their content, and diffs against the previous sweep to
//! synthesize added/changed/deleted events.
//!
//! Reentry is guarded by a three-state sync point: a scan runs only when
//! a tick finds the state `Idle`, and `stop` spins until the state
//! returns to `Idle` before transitioning to `Stopped`, so no scan is in
//! flight once `stop` returns.

use crate::events::FileEvent;
use crate::parser::FileUnit;
use crate::repository::FactRepository;
use crate::Result;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

const STOPPED: u8 = 0;
const IDLE: u8 = 1;
const RUNNING: u8 = 2;

/// Periodic scanner feeding file events into a repository.
pub struct DirectoryScanner {
    state: Arc<AtomicU8>,
    handle: Option<JoinHandle<()>>,
}

impl DirectoryScanner {
    /// Start scanning `root` every `interval`. `known` seeds the
    /// content-hash baseline (path -> blake3 hex) so files already in the
    /// graph are not re-ingested on the first sweep.
    pub fn start(
        repo: Arc<FactRepository>,
        root: PathBuf,
        interval: Duration,
        known: HashMap<String, String>,
    ) -> Self {
        let state = Arc::new(AtomicU8::new(IDLE));
        let thread_state = Arc::clone(&state);
        let handle = thread::spawn(move || {
            let mut known = known;
            loop {
                // sleep in slices so stop() stays responsive
                let mut slept = Duration::ZERO;
                while slept < interval {
                    if thread_state.load(Ordering::SeqCst) == STOPPED {
                        return;
                    }
                    let slice = interval.saturating_sub(slept).min(Duration::from_millis(50));
                    thread::sleep(slice);
                    slept += slice;
                }
                match thread_state.compare_exchange(IDLE, RUNNING, Ordering::SeqCst, Ordering::SeqCst)
                {
                    Ok(_) => {
                        if let Err(e) = scan_once(&repo, &root, &mut known) {
                            tracing::error!(root = %root.display(), error = %e, "scan failed");
                        }
                        let _ = thread_state.compare_exchange(
                            RUNNING,
                            IDLE,
                            Ordering::SeqCst,
                            Ordering::SeqCst,
                        );
                    }
                    // a tick that does not find Idle means we are stopping
                    Err(_) => return,
                }
            }
        });
        Self {
            state,
            handle: Some(handle),
        }
    }

    /// Stop the scanner. Blocks until any in-flight scan has finished.
    pub fn stop(&mut self) {
        loop {
            match self
                .state
                .compare_exchange(IDLE, STOPPED, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) | Err(STOPPED) => break,
                // a scan is running; wait for it to come back to Idle
                Err(_) => std::hint::spin_loop(),
            }
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for DirectoryScanner {
    fn drop(&mut self) {
        self.stop();
    }
}

/// One sweep: diff the current file set against `known` and apply the
/// synthesized events. Returns the number of events applied.
pub fn scan_once(
    repo: &FactRepository,
    root: &Path,
    known: &mut HashMap<String, String>,
) -> Result<usize> {
    let mut current: HashMap<String, String> = HashMap::new();
    let mut contents: HashMap<String, String> = HashMap::new();

    for entry in walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
    {
        let path = entry.path();
        if path.extension().and_then(|s| s.to_str()) != Some("xml") {
            continue;
        }
        let relative = path
            .strip_prefix(root)
            .unwrap_or(path)
            .to_string_lossy()
            .to_string();
        let xml = match std::fs::read_to_string(path) {
            Ok(xml) => xml,
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "skipping unreadable file");
                continue;
            }
        };
        let hash = blake3::hash(xml.as_bytes()).to_hex().to_string();
        current.insert(relative.clone(), hash);
        contents.insert(relative, xml);
    }

    let mut applied = 0;

    for (path, hash) in &current {
        let event = match known.get(path) {
            None => FileEvent::added(path.clone()),
            Some(old) if old != hash => FileEvent::changed(path.clone()),
            Some(_) => continue,
        };
        let unit = contents
            .get(path)
            .map(|xml| FileUnit::new(path.clone(), xml.clone()));
        repo.handle_event(&event, unit.as_ref())?;
        applied += 1;
    }

    for path in known.keys() {
        if !current.contains_key(path) {
            repo.handle_event(&FileEvent::deleted(path.clone()), None)?;
            applied += 1;
        }
    }

    *known = current;
    Ok(applied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RepoConfig;

    fn write_unit(dir: &Path, name: &str, class_name: &str) {
        let xml = format!(
            r#"<unit language="C++" filename="{name}">
<class>class <name>{class_name}</name> <block>{{ }}</block>;</class>
</unit>"#
        );
        std::fs::write(dir.join(name), xml).unwrap();
    }

    #[test]
    fn test_scan_diffs_added_changed_deleted() {
        let dir = tempfile::tempdir().unwrap();
        let repo = FactRepository::new(RepoConfig::default());
        let mut known = HashMap::new();

        write_unit(dir.path(), "a.xml", "C");
        let applied = scan_once(&repo, dir.path(), &mut known).unwrap();
        assert_eq!(applied, 1);
        repo.with_graph(|g| {
            assert!(g.named_children(g.root(), "C", None).next().is_some());
        });

        // unchanged content: no events
        let applied = scan_once(&repo, dir.path(), &mut known).unwrap();
        assert_eq!(applied, 0);

        // changed content replaces the contribution
        write_unit(dir.path(), "a.xml", "D");
        let applied = scan_once(&repo, dir.path(), &mut known).unwrap();
        assert_eq!(applied, 1);
        repo.with_graph(|g| {
            assert!(g.named_children(g.root(), "C", None).next().is_none());
            assert!(g.named_children(g.root(), "D", None).next().is_some());
        });

        // deletion strips the file
        std::fs::remove_file(dir.path().join("a.xml")).unwrap();
        let applied = scan_once(&repo, dir.path(), &mut known).unwrap();
        assert_eq!(applied, 1);
        assert_eq!(repo.stats().scopes, 1);
    }

    #[test]
    fn test_seeded_baseline_suppresses_reingest() {
        let dir = tempfile::tempdir().unwrap();
        write_unit(dir.path(), "a.xml", "C");
        let xml = std::fs::read_to_string(dir.path().join("a.xml")).unwrap();

        let repo = FactRepository::new(RepoConfig::default());
        let mut known = HashMap::new();
        known.insert(
            "a.xml".to_string(),
            blake3::hash(xml.as_bytes()).to_hex().to_string(),
        );

        let applied = scan_once(&repo, dir.path(), &mut known).unwrap();
        assert_eq!(applied, 0);
    }

    #[test]
    fn test_scanner_thread_picks_up_files_and_stops_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        write_unit(dir.path(), "a.xml", "C");

        let repo = Arc::new(FactRepository::new(RepoConfig::default()));
        let mut scanner = DirectoryScanner::start(
            Arc::clone(&repo),
            dir.path().to_path_buf(),
            Duration::from_millis(10),
            HashMap::new(),
        );

        // give the timer a few ticks
        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while std::time::Instant::now() < deadline {
            let found = repo.with_graph(|g| g.named_children(g.root(), "C", None).next().is_some());
            if found {
                break;
            }
            thread::sleep(Duration::from_millis(10));
        }
        repo.with_graph(|g| {
            assert!(g.named_children(g.root(), "C", None).next().is_some());
        });

        scanner.stop();
        assert_eq!(scanner.state.load(Ordering::SeqCst), STOPPED);
    }
}
