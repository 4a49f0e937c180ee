//! Bulk ingest: parallel parse, serialized merge
//!
//! A pool of worker threads parses file units in parallel and hands the
//! resulting trees to a bounded queue. A single merge task drains the
//! queue, so every mutation of the global graph is serialized behind the
//! write lock. The pool closing the queue terminates the merger. Parse
//! order is unconstrained; the merged result is deterministic because the
//! merge algebra is order-independent up to its tiebreakers.

use crate::events::{FileEventKind, RepoEvent};
use crate::parser::{FileUnit, ParseOutcome};
use crate::repository::FactRepository;
use crate::scope::graph::ScopeGraph;
use crate::{Error, Result};
use serde::Serialize;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Outcome counts for one bulk ingest run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestStats {
    /// Units parsed and merged
    pub merged: usize,
    /// Units skipped (no registered parser)
    pub skipped: usize,
    /// Units that failed to parse and contributed nothing
    pub failed: usize,
}

impl std::fmt::Display for IngestStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "merged {} unit(s), skipped {}, failed {}",
            self.merged, self.skipped, self.failed
        )
    }
}

/// Parse `units` with up to `jobs` workers and fold every tree into the
/// repository's global graph. Readiness drops for the duration.
pub fn bulk_ingest(repo: &FactRepository, units: Vec<FileUnit>, jobs: usize) -> IngestStats {
    let jobs = jobs.max(1);
    repo.set_ready(false);

    let (work_tx, work_rx) = crossbeam::channel::unbounded::<FileUnit>();
    let (tree_tx, tree_rx) = crossbeam::channel::bounded::<(String, ScopeGraph)>((jobs * 2).max(4));
    let total = units.len();
    for unit in units {
        // the receiver outlives this loop; the send cannot fail
        let _ = work_tx.send(unit);
    }
    drop(work_tx);

    let merged = AtomicUsize::new(0);
    let skipped = AtomicUsize::new(0);
    let failed = AtomicUsize::new(0);

    std::thread::scope(|s| {
        for _ in 0..jobs {
            let work_rx = work_rx.clone();
            let tree_tx = tree_tx.clone();
            let skipped = &skipped;
            let failed = &failed;
            s.spawn(move || {
                for unit in work_rx.iter() {
                    match repo.parse_outcome(&unit) {
                        Ok(ParseOutcome::Tree(tree)) => {
                            if tree_tx.send((unit.path, tree)).is_err() {
                                // the merger is gone; stop producing
                                break;
                            }
                        }
                        Ok(ParseOutcome::UnknownLanguage(tag)) => {
                            skipped.fetch_add(1, Ordering::Relaxed);
                            if repo.config().strict_unknown_language {
                                repo.events().emit(RepoEvent::ErrorRaised {
                                    error: Error::UnknownLanguage(tag).to_string(),
                                });
                            } else {
                                tracing::debug!(path = %unit.path, language = %tag, "no parser registered; unit skipped");
                            }
                        }
                        Err(e) => {
                            failed.fetch_add(1, Ordering::Relaxed);
                            tracing::warn!(path = %unit.path, error = %e, "unit failed to parse");
                            repo.events().emit(RepoEvent::ErrorRaised {
                                error: e.to_string(),
                            });
                        }
                    }
                }
            });
        }
        drop(tree_tx);

        // the single merge task: the only writer for the whole run
        let merged = &merged;
        s.spawn(move || {
            for (path, tree) in tree_rx.iter() {
                match repo.merge_tree(tree) {
                    Ok(()) => {
                        merged.fetch_add(1, Ordering::Relaxed);
                        repo.events().emit(RepoEvent::FileProcessed {
                            kind: FileEventKind::Added,
                            path,
                        });
                    }
                    Err(e) => {
                        // invariant violation: stop the run, leave unready
                        tracing::error!(path = %path, error = %e, "merge failed; aborting ingest");
                        repo.events().emit(RepoEvent::ErrorRaised {
                            error: e.to_string(),
                        });
                        return;
                    }
                }
            }
        });
    });

    let stats = IngestStats {
        merged: merged.load(Ordering::Relaxed),
        skipped: skipped.load(Ordering::Relaxed),
        failed: failed.load(Ordering::Relaxed),
    };
    tracing::info!(total, %stats, "bulk ingest finished");
    repo.set_ready(true);
    stats
}

/// Gather every `*.xml` file unit under `root`, keyed by path relative
/// to it. Unreadable files are skipped.
pub fn collect_units(root: &Path) -> Result<Vec<FileUnit>> {
    let mut units = Vec::new();
    for entry in walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
    {
        let path = entry.path();
        if path.extension().and_then(|s| s.to_str()) != Some("xml") {
            continue;
        }
        let relative = path.strip_prefix(root).unwrap_or(path);
        match std::fs::read_to_string(path) {
            Ok(xml) => units.push(FileUnit::new(relative.to_string_lossy(), xml)),
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "skipping unreadable file");
            }
        }
    }
    units.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(units)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RepoConfig;
    use std::sync::atomic::AtomicBool;

    fn unit(i: usize) -> FileUnit {
        FileUnit::new(
            format!("file{:03}.xml", i),
            format!(
                r#"<unit language="C++" filename="file{i:03}.cpp">
<namespace>namespace <name>Shared</name> <block>{{
<class>class <name>C{i}</name> <block>{{ }}</block>;</class>
<function><type><name>void</name></type> <name>common</name><parameter_list>()</parameter_list> <block>{{ }}</block></function>
}}</block></namespace>
</unit>"#
            ),
        )
    }

    #[test]
    fn test_parallel_ingest_matches_sequential_merge() {
        let units: Vec<FileUnit> = (0..40).map(unit).collect();

        let sequential = FactRepository::new(RepoConfig::default());
        for u in &units {
            sequential.add_unit(u).unwrap();
        }
        let expected = sequential.with_graph(|g| g.dump());

        let parallel = FactRepository::new(RepoConfig::default());
        let stats = bulk_ingest(&parallel, units, 4);
        assert_eq!(stats.merged, 40);
        assert_eq!(stats.failed, 0);

        assert_eq!(parallel.with_graph(|g| g.dump()), expected);
        parallel.with_graph(|g| g.verify().unwrap());
    }

    #[test]
    fn test_readiness_transitions_during_ingest() {
        let repo = FactRepository::new(RepoConfig::default());
        let events = repo.subscribe();

        bulk_ingest(&repo, (0..4).map(unit).collect(), 2);
        assert!(repo.is_ready());

        let ready_flips: Vec<bool> = events
            .try_iter()
            .filter_map(|e| match e {
                RepoEvent::IsReadyChanged { is_ready } => Some(is_ready),
                _ => None,
            })
            .collect();
        assert_eq!(ready_flips, vec![false, true]);
    }

    #[test]
    fn test_bad_units_do_not_poison_the_run() {
        let mut units: Vec<FileUnit> = (0..8).map(unit).collect();
        units.push(FileUnit::new("broken.xml", "<unit language=\"C++\"><oops>"));
        units.push(FileUnit::new(
            "unknown.xml",
            r#"<unit language="Fortran"></unit>"#,
        ));

        let repo = FactRepository::new(RepoConfig::default());
        let stats = bulk_ingest(&repo, units, 3);

        assert_eq!(stats.merged, 8);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.skipped, 1);
        repo.with_graph(|g| g.verify().unwrap());
    }

    #[test]
    fn test_queries_race_safely_with_the_writer() {
        let repo = FactRepository::new(RepoConfig::default());
        let units: Vec<FileUnit> = (0..60).map(unit).collect();
        let stop = AtomicBool::new(false);

        std::thread::scope(|s| {
            for _ in 0..3 {
                let repo = &repo;
                let stop = &stop;
                s.spawn(move || {
                    while !stop.load(Ordering::Relaxed) {
                        repo.with_graph(|g| {
                            // readers must never observe a broken tree
                            g.verify().unwrap();
                        });
                        let _ = repo.find_scope_at("file000.xml", 3, 1);
                    }
                });
            }
            bulk_ingest(&repo, units, 4);
            stop.store(true, Ordering::Relaxed);
        });

        assert_eq!(repo.stats().files, 60);
    }
}
