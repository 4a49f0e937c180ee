//! The fact repository: global scope graph, locking, events, queries
//!
//! One shared-exclusive lock protects the global graph. Queries take it
//! shared (recursively, when configured); every mutation takes it
//! exclusive, so readers never observe a half-merged tree. Per-file
//! failures are swallowed with an error event; a graph-wide invariant
//! violation surfaces and flips the repository to unready.

use crate::config::RepoConfig;
use crate::events::{EventBus, FileEvent, FileEventKind, RepoEvent};
use crate::location::Location;
use crate::parser::{default_registry, FileUnit, ParseOutcome, ParserRegistry};
use crate::scope::graph::{GraphStats, ScopeGraph};
use crate::scope::model::{MethodCall, ScopeKindTag};
use crate::scope::resolver::Resolver;
use crate::snapshot;
use crate::{Error, Result};
use crossbeam::channel::Receiver;
use parking_lot::{RwLock, RwLockReadGuard};
use serde::Serialize;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// An owned description of a scope, safe to hand out without the lock.
#[derive(Debug, Clone, Serialize)]
pub struct ScopeSummary {
    pub kind: ScopeKindTag,
    pub qualified_name: Option<String>,
    pub location: Option<Location>,
    pub depth: usize,
}

/// The persistent, incrementally updating program-fact repository.
pub struct FactRepository {
    graph: RwLock<ScopeGraph>,
    parsers: ParserRegistry,
    events: EventBus,
    ready: AtomicBool,
    config: RepoConfig,
}

impl FactRepository {
    /// Create a repository with the built-in parser table.
    pub fn new(config: RepoConfig) -> Self {
        Self::with_registry(config, default_registry())
    }

    /// Create a repository with a caller-supplied parser table. The table
    /// is installed once and read-only thereafter.
    pub fn with_registry(config: RepoConfig, parsers: ParserRegistry) -> Self {
        Self {
            graph: RwLock::new(ScopeGraph::new()),
            parsers,
            events: EventBus::new(),
            ready: AtomicBool::new(true),
            config,
        }
    }

    pub fn config(&self) -> &RepoConfig {
        &self.config
    }

    pub(crate) fn events(&self) -> &EventBus {
        &self.events
    }

    /// Subscribe to repository events.
    pub fn subscribe(&self) -> Receiver<RepoEvent> {
        self.events.subscribe()
    }

    // ── Readiness ───────────────────────────────────────────────────────

    /// False while an ingest or merge is in progress.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    pub(crate) fn set_ready(&self, ready: bool) {
        let was = self.ready.swap(ready, Ordering::SeqCst);
        if was != ready {
            self.events.emit(RepoEvent::IsReadyChanged { is_ready: ready });
        }
    }

    // ── Locking ─────────────────────────────────────────────────────────

    fn read_guard(&self) -> RwLockReadGuard<'_, ScopeGraph> {
        if self.config.lock_recursion {
            self.graph.read_recursive()
        } else {
            self.graph.read()
        }
    }

    /// Run a query against the graph under the shared lock.
    pub fn with_graph<R>(&self, f: impl FnOnce(&ScopeGraph) -> R) -> R {
        f(&self.read_guard())
    }

    /// Bounded-wait variant: returns `None` when the lock could not be
    /// acquired within the timeout.
    pub fn try_with_graph<R>(
        &self,
        timeout: Duration,
        f: impl FnOnce(&ScopeGraph) -> R,
    ) -> Option<R> {
        let guard = self.graph.try_read_for(timeout)?;
        Some(f(&guard))
    }

    // ── Mutations ───────────────────────────────────────────────────────

    /// Parse one file unit and merge its tree into the global graph.
    /// Returns false when the unit was skipped (unknown language).
    pub fn add_unit(&self, unit: &FileUnit) -> Result<bool> {
        match self.parsers.parse(unit)? {
            ParseOutcome::Tree(tree) => {
                self.merge_tree(tree)?;
                Ok(true)
            }
            ParseOutcome::UnknownLanguage(tag) => {
                if self.config.strict_unknown_language {
                    self.events.emit(RepoEvent::ErrorRaised {
                        error: Error::UnknownLanguage(tag.clone()).to_string(),
                    });
                } else {
                    tracing::debug!(path = %unit.path, language = %tag, "skipping unit with no registered parser");
                }
                Ok(false)
            }
        }
    }

    pub(crate) fn parse_outcome(&self, unit: &FileUnit) -> Result<ParseOutcome> {
        self.parsers.parse(unit)
    }

    pub(crate) fn merge_tree(&self, tree: ScopeGraph) -> Result<()> {
        let mut graph = self.graph.write();
        graph.merge(tree);
        if let Err(e) = graph.verify() {
            drop(graph);
            self.set_ready(false);
            return Err(e);
        }
        Ok(())
    }

    /// Strip one file's contributions from the graph.
    pub fn remove_path(&self, path: &str) {
        self.graph.write().remove_file(path);
    }

    /// Reset to an empty graph. The way back from a fatal invariant
    /// violation.
    pub fn clear(&self) {
        *self.graph.write() = ScopeGraph::new();
        self.set_ready(true);
    }

    /// Dispatch one file event. `unit` carries the file's markup for the
    /// event kinds that (re)parse.
    pub fn handle_event(&self, event: &FileEvent, unit: Option<&FileUnit>) -> Result<()> {
        let processed = match event.kind {
            FileEventKind::Added => self.reparse(event, unit)?,
            FileEventKind::Changed => {
                self.remove_path(&event.path);
                self.reparse(event, unit)?
            }
            FileEventKind::Deleted => {
                self.remove_path(&event.path);
                true
            }
            FileEventKind::Renamed => {
                let old = event.old_path.as_deref().ok_or_else(|| {
                    Error::InvalidArgument("rename event without an old path".into())
                })?;
                self.remove_path(old);
                self.reparse(event, unit)?
            }
        };
        if processed {
            self.events.emit(RepoEvent::FileProcessed {
                kind: event.kind,
                path: event.path.clone(),
            });
        }
        Ok(())
    }

    /// Parse-and-merge for an event. Recoverable failures raise an event
    /// and report the file as not processed; fatal failures propagate.
    fn reparse(&self, event: &FileEvent, unit: Option<&FileUnit>) -> Result<bool> {
        let unit = unit.ok_or_else(|| {
            Error::InvalidArgument(format!(
                "{} event for {} carries no file unit",
                event.kind, event.path
            ))
        })?;
        match self.add_unit(unit) {
            Ok(merged) => Ok(merged),
            Err(e) if e.is_recoverable() => {
                tracing::warn!(path = %event.path, error = %e, "file contributes nothing");
                self.events.emit(RepoEvent::ErrorRaised {
                    error: e.to_string(),
                });
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    // ── Snapshots ───────────────────────────────────────────────────────

    /// Write the whole graph to `path` under the shared lock.
    pub fn save(&self, path: &Path) -> Result<()> {
        let guard = self.read_guard();
        snapshot::write_snapshot(&guard, path)
    }

    /// Read a snapshot and install it as the global graph.
    pub fn load(&self, path: &Path) -> Result<()> {
        let graph = snapshot::read_snapshot(path)?;
        *self.graph.write() = graph;
        Ok(())
    }

    /// Bulk initialization: install the configured snapshot when present
    /// and loadable, otherwise fall back to a full reparse of `units`.
    pub fn initialize(&self, units: Vec<FileUnit>) -> Result<crate::pipeline::IngestStats> {
        if let Some(path) = self.config.snapshot_path.clone() {
            if path.exists() {
                match self.load(&path) {
                    Ok(()) => {
                        tracing::info!(path = %path.display(), "snapshot loaded");
                        self.set_ready(true);
                        return Ok(crate::pipeline::IngestStats::default());
                    }
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "snapshot load failed; reparsing");
                        self.events.emit(RepoEvent::ErrorRaised {
                            error: e.to_string(),
                        });
                    }
                }
            }
        }
        Ok(crate::pipeline::bulk_ingest(
            self,
            units,
            self.config.parallelism,
        ))
    }

    // ── Queries ─────────────────────────────────────────────────────────

    /// Innermost scope containing a file position.
    pub fn find_scope_at(&self, file: &str, line: u32, column: u32) -> Result<Option<ScopeSummary>> {
        require_nonempty("file", file)?;
        let graph = self.read_guard();
        Ok(graph
            .find_scope_at(file, line, column)
            .map(|id| summarize(&graph, id)))
    }

    /// Innermost scope spanning an XPath within a file.
    pub fn find_scope_by_xpath(&self, file: &str, xpath: &str) -> Result<Option<ScopeSummary>> {
        require_nonempty("file", file)?;
        require_nonempty("xpath", xpath)?;
        let graph = self.read_guard();
        Ok(graph
            .find_scope_by_xpath(file, xpath)
            .map(|id| summarize(&graph, id)))
    }

    /// Nearest enclosing scope of one kind at a file position.
    pub fn find_enclosing_at(
        &self,
        kind: ScopeKindTag,
        file: &str,
        line: u32,
        column: u32,
    ) -> Result<Option<ScopeSummary>> {
        require_nonempty("file", file)?;
        let graph = self.read_guard();
        Ok(graph
            .find_scope_at(file, line, column)
            .and_then(|id| graph.enclosing(id, kind))
            .map(|id| summarize(&graph, id)))
    }

    /// Method calls whose location contains the position, nearest-first.
    pub fn find_method_calls_at(
        &self,
        file: &str,
        line: u32,
        column: u32,
    ) -> Result<Vec<MethodCall>> {
        require_nonempty("file", file)?;
        let graph = self.read_guard();
        Ok(graph
            .find_method_calls(file, line, column)
            .into_iter()
            .cloned()
            .collect())
    }

    /// Resolve a name as seen from a file position. Returns rendered
    /// candidate descriptions, nearest first.
    pub fn resolve_at(
        &self,
        file: &str,
        line: u32,
        column: u32,
        name: &str,
    ) -> Result<Vec<String>> {
        require_nonempty("file", file)?;
        require_nonempty("name", name)?;
        let graph = self.read_guard();
        let scope = graph
            .find_scope_at(file, line, column)
            .unwrap_or_else(|| graph.root());
        let site = Location::new(file, "", line, column, 1);
        let resolver = Resolver::new(&graph);
        Ok(resolver
            .resolve_name_at(scope, &site, name)
            .iter()
            .map(|m| resolver.describe(m))
            .collect())
    }

    pub fn stats(&self) -> GraphStats {
        self.read_guard().stats()
    }
}

impl Drop for FactRepository {
    fn drop(&mut self) {
        // dispose-time durability: best effort, never panics
        if let Some(path) = self.config.snapshot_path.clone() {
            if let Err(e) = self.save(&path) {
                tracing::error!(path = %path.display(), error = %e, "snapshot save on dispose failed");
            }
        }
    }
}

fn summarize(graph: &ScopeGraph, id: crate::scope::model::ScopeId) -> ScopeSummary {
    let scope = graph.scope(id);
    ScopeSummary {
        kind: scope.map(|s| s.kind.tag()).unwrap_or(ScopeKindTag::Program),
        qualified_name: graph.qualified_name(id),
        location: scope.and_then(|s| s.primary_location().cloned()),
        depth: graph.depth(id),
    }
}

fn require_nonempty(what: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(Error::InvalidArgument(format!("{} must not be empty", what)));
    }
    Ok(())
}
