//! Scope graph arena and traversal primitives
//!
//! The graph owns every scope, statement, and expression in id-keyed
//! arenas. There is exactly one Program root; every other scope has one
//! parent scope. Traversal primitives are restartable iterators and never
//! mutate the graph.

use crate::language::Language;
use crate::location::Location;
use crate::scope::model::*;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// The global (or per-file, before merge) scope graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScopeGraph {
    next_scope: u32,
    next_statement: u32,
    next_expression: u32,
    scopes: HashMap<ScopeId, Scope>,
    statements: HashMap<StatementId, Statement>,
    expressions: HashMap<ExpressionId, Expression>,
    /// Language of each contributing file, for keyword resolution rules
    file_languages: HashMap<String, Language>,
}

impl ScopeGraph {
    /// Create a graph holding only the Program root.
    pub fn new() -> Self {
        let mut scopes = HashMap::new();
        scopes.insert(ScopeId::root(), Scope::new(ScopeKind::Program, None, None));
        Self {
            next_scope: 1,
            next_statement: 0,
            next_expression: 0,
            scopes,
            statements: HashMap::new(),
            expressions: HashMap::new(),
            file_languages: HashMap::new(),
        }
    }

    pub fn root(&self) -> ScopeId {
        ScopeId::root()
    }

    pub fn scope(&self, id: ScopeId) -> Option<&Scope> {
        self.scopes.get(&id)
    }

    pub fn scope_mut(&mut self, id: ScopeId) -> Option<&mut Scope> {
        self.scopes.get_mut(&id)
    }

    pub fn statement(&self, id: StatementId) -> Option<&Statement> {
        self.statements.get(&id)
    }

    pub fn expression(&self, id: ExpressionId) -> Option<&Expression> {
        self.expressions.get(&id)
    }

    pub fn scope_count(&self) -> usize {
        self.scopes.len()
    }

    /// Iterate over all scopes in arbitrary order.
    pub fn all_scopes(&self) -> impl Iterator<Item = (ScopeId, &Scope)> {
        self.scopes.iter().map(|(id, s)| (*id, s))
    }

    // ── Construction ────────────────────────────────────────────────────

    /// Add a child scope under `parent`, appended in source order.
    pub fn add_scope(
        &mut self,
        parent: ScopeId,
        kind: ScopeKind,
        location: Option<Location>,
    ) -> ScopeId {
        let id = ScopeId(self.next_scope);
        self.next_scope += 1;
        self.scopes
            .insert(id, Scope::new(kind, Some(parent), location));
        if let Some(p) = self.scopes.get_mut(&parent) {
            p.children.push(id);
        }
        id
    }

    /// Add a statement to `scope`'s ordered statement list.
    pub fn add_statement(
        &mut self,
        scope: ScopeId,
        parent: Option<StatementId>,
        kind: StatementKind,
        location: Location,
    ) -> StatementId {
        let id = StatementId(self.next_statement);
        self.next_statement += 1;
        self.statements.insert(
            id,
            Statement {
                kind,
                scope,
                parent,
                expressions: Vec::new(),
                location,
            },
        );
        if let Some(s) = self.scopes.get_mut(&scope) {
            s.statements.push(id);
        }
        id
    }

    /// Add an expression, appending it to its parent's child list.
    pub fn add_expression(
        &mut self,
        parent: ExpressionParent,
        kind: ExpressionKind,
        location: Location,
    ) -> ExpressionId {
        let id = self.alloc_expression(parent, kind, location);
        match parent {
            ExpressionParent::Statement(s) => {
                if let Some(stmt) = self.statements.get_mut(&s) {
                    stmt.expressions.push(id);
                }
            }
            ExpressionParent::Expression(e) => {
                if let Some(expr) = self.expressions.get_mut(&e) {
                    expr.children.push(id);
                }
            }
        }
        id
    }

    /// Add an expression without appending it anywhere. Used for name
    /// prefixes and declaration type/initializer expressions, which are
    /// reached through dedicated fields rather than the child list.
    pub fn alloc_expression(
        &mut self,
        parent: ExpressionParent,
        kind: ExpressionKind,
        location: Location,
    ) -> ExpressionId {
        let id = ExpressionId(self.next_expression);
        self.next_expression += 1;
        self.expressions.insert(
            id,
            Expression {
                kind,
                parent,
                children: Vec::new(),
                location,
            },
        );
        id
    }

    /// Attach a qualification chain to a name expression.
    pub fn set_name_prefix(&mut self, name_expr: ExpressionId, prefix: ExpressionId) {
        if let Some(expr) = self.expressions.get_mut(&name_expr) {
            if let ExpressionKind::Name { prefix: p, .. } = &mut expr.kind {
                *p = Some(prefix);
            }
        }
    }

    pub fn set_language(&mut self, file_path: impl Into<String>, language: Language) {
        self.file_languages.insert(file_path.into(), language);
    }

    pub fn language_of(&self, file_path: &str) -> Option<Language> {
        self.file_languages.get(file_path).copied()
    }

    pub fn files(&self) -> impl Iterator<Item = &String> {
        self.file_languages.keys()
    }

    pub(crate) fn file_languages_mut(&mut self) -> &mut HashMap<String, Language> {
        &mut self.file_languages
    }

    pub(crate) fn take_scope(&mut self, id: ScopeId) -> Option<Scope> {
        self.scopes.remove(&id)
    }

    pub(crate) fn take_statement(&mut self, id: StatementId) -> Option<Statement> {
        self.statements.remove(&id)
    }

    pub(crate) fn take_expression(&mut self, id: ExpressionId) -> Option<Expression> {
        self.expressions.remove(&id)
    }

    pub(crate) fn reserve_scope_id(&mut self) -> ScopeId {
        let id = ScopeId(self.next_scope);
        self.next_scope += 1;
        id
    }

    pub(crate) fn install_scope(&mut self, id: ScopeId, scope: Scope) {
        self.scopes.insert(id, scope);
    }

    pub(crate) fn reserve_statement_id(&mut self) -> StatementId {
        let id = StatementId(self.next_statement);
        self.next_statement += 1;
        id
    }

    pub(crate) fn install_statement(&mut self, id: StatementId, stmt: Statement) {
        self.statements.insert(id, stmt);
    }

    pub(crate) fn reserve_expression_id(&mut self) -> ExpressionId {
        let id = ExpressionId(self.next_expression);
        self.next_expression += 1;
        id
    }

    pub(crate) fn install_expression(&mut self, id: ExpressionId, expr: Expression) {
        self.expressions.insert(id, expr);
    }

    pub(crate) fn remove_statement_entry(&mut self, id: StatementId) -> Option<Statement> {
        self.statements.remove(&id)
    }

    pub(crate) fn remove_expression_entry(&mut self, id: ExpressionId) -> Option<Expression> {
        self.expressions.remove(&id)
    }

    /// Insert `child` into `parent`'s child list keeping the cross-file
    /// interleaving order (primary location: file path, then line/column).
    pub(crate) fn insert_child_ordered(&mut self, parent: ScopeId, child: ScopeId) {
        let key = self
            .scopes
            .get(&child)
            .and_then(|s| s.primary_location())
            .cloned();
        let Some(parent_scope) = self.scopes.get(&parent) else {
            return;
        };
        let pos = match &key {
            Some(key) => parent_scope
                .children
                .iter()
                .position(|c| {
                    self.scopes
                        .get(c)
                        .and_then(|s| s.primary_location())
                        .map_or(false, |loc| loc > key)
                })
                .unwrap_or(parent_scope.children.len()),
            None => parent_scope.children.len(),
        };
        if let Some(parent_scope) = self.scopes.get_mut(&parent) {
            parent_scope.children.insert(pos, child);
        }
        if let Some(child_scope) = self.scopes.get_mut(&child) {
            child_scope.parent = Some(parent);
        }
    }

    // ── Traversal primitives ────────────────────────────────────────────

    /// Lazy walk from `start` to the root, inclusive.
    pub fn ancestors_and_self(&self, start: ScopeId) -> impl Iterator<Item = ScopeId> + '_ {
        std::iter::successors(Some(start), move |id| {
            self.scopes.get(id).and_then(|s| s.parent)
        })
    }

    /// Distance from the root (root has depth 0).
    pub fn depth(&self, id: ScopeId) -> usize {
        self.ancestors_and_self(id).count().saturating_sub(1)
    }

    /// Fully qualified name of a scope: named ancestors joined by `::`.
    pub fn qualified_name(&self, id: ScopeId) -> Option<String> {
        let mut parts: Vec<&str> = self
            .ancestors_and_self(id)
            .filter_map(|a| self.scopes.get(&a).and_then(|s| s.name()))
            .collect();
        if parts.is_empty() {
            return None;
        }
        parts.reverse();
        Some(parts.join("::"))
    }

    /// Child named scopes of `scope` whose simple name is `name`,
    /// optionally restricted to one kind.
    pub fn named_children<'a>(
        &'a self,
        scope: ScopeId,
        name: &'a str,
        kind: Option<ScopeKindTag>,
    ) -> impl Iterator<Item = ScopeId> + 'a {
        self.scopes
            .get(&scope)
            .into_iter()
            .flat_map(|s| s.children.iter())
            .copied()
            .filter(move |c| {
                self.scopes.get(c).map_or(false, |child| {
                    child.name() == Some(name)
                        && kind.map_or(true, |k| child.kind.tag() == k)
                })
            })
    }

    /// Lazy walk of ancestors (inclusive) restricted to one kind.
    pub fn ancestors_of_kind(
        &self,
        start: ScopeId,
        kind: ScopeKindTag,
    ) -> impl Iterator<Item = ScopeId> + '_ {
        self.ancestors_and_self(start)
            .filter(move |id| self.scopes.get(id).map_or(false, |s| s.kind.tag() == kind))
    }

    /// Nearest enclosing scope of the given kind, inclusive of `start`.
    pub fn enclosing(&self, start: ScopeId, kind: ScopeKindTag) -> Option<ScopeId> {
        self.ancestors_of_kind(start, kind).next()
    }

    /// Statements of the owning scope that precede `stmt` in source order.
    pub fn siblings_before(&self, stmt: StatementId) -> impl Iterator<Item = StatementId> + '_ {
        let (scope, position) = match self.statements.get(&stmt) {
            Some(s) => {
                let pos = self
                    .scopes
                    .get(&s.scope)
                    .and_then(|sc| sc.statements.iter().position(|x| *x == stmt))
                    .unwrap_or(0);
                (s.scope, pos)
            }
            None => (ScopeId::root(), 0),
        };
        self.scopes
            .get(&scope)
            .into_iter()
            .flat_map(move |s| s.statements[..position].iter())
            .copied()
    }

    // ── Location queries ────────────────────────────────────────────────

    /// Innermost scope whose location spans the given XPath within `file`.
    pub fn find_scope_by_xpath(&self, file: &str, xpath: &str) -> Option<ScopeId> {
        self.scopes
            .iter()
            .filter(|(_, s)| {
                s.locations
                    .iter()
                    .any(|l| l.file_path == file && l.spans_xpath(xpath))
            })
            .max_by_key(|(id, s)| {
                let matched = s
                    .locations
                    .iter()
                    .filter(|l| l.file_path == file && l.spans_xpath(xpath))
                    .map(|l| l.xpath.len())
                    .max()
                    .unwrap_or(0);
                (self.depth(**id), matched)
            })
            .map(|(id, _)| *id)
    }

    /// Innermost scope containing `line`/`column` in `file`. Ties are
    /// broken by tree depth, then by latest start.
    pub fn find_scope_at(&self, file: &str, line: u32, column: u32) -> Option<ScopeId> {
        self.scopes
            .iter()
            .filter_map(|(id, s)| {
                s.locations
                    .iter()
                    .filter(|l| l.file_path == file && l.contains_point(line, column))
                    .max()
                    .map(|l| (*id, l.clone()))
            })
            .max_by(|(a, la), (b, lb)| {
                self.depth(*a)
                    .cmp(&self.depth(*b))
                    .then(la.cmp(lb))
            })
            .map(|(id, _)| id)
    }

    /// Method calls whose location contains the query point, ordered
    /// nearest-first (descending start line, then start column).
    pub fn find_method_calls(&self, file: &str, line: u32, column: u32) -> Vec<&MethodCall> {
        let mut calls: Vec<&MethodCall> = self
            .scopes
            .values()
            .flat_map(|s| s.calls.iter())
            .filter(|c| c.location.file_path == file && c.location.contains_point(line, column))
            .collect();
        calls.sort_by(|a, b| {
            b.location
                .start_line
                .cmp(&a.location.start_line)
                .then(b.location.start_column.cmp(&a.location.start_column))
        });
        calls
    }

    // ── Integrity ───────────────────────────────────────────────────────

    /// Verify the ownership tree: every scope reachable from the root
    /// exactly once, child/parent links consistent, no cycles.
    pub fn verify(&self) -> Result<()> {
        let mut visited = HashSet::new();
        let mut stack = vec![self.root()];
        while let Some(id) = stack.pop() {
            if !visited.insert(id) {
                return Err(Error::Internal(format!(
                    "scope {:?} reachable through more than one path",
                    id
                )));
            }
            let Some(scope) = self.scopes.get(&id) else {
                return Err(Error::Internal(format!("dangling scope id {:?}", id)));
            };
            for child in &scope.children {
                match self.scopes.get(child) {
                    Some(c) if c.parent == Some(id) => stack.push(*child),
                    Some(_) => {
                        return Err(Error::Internal(format!(
                            "scope {:?} has inconsistent parent link",
                            child
                        )))
                    }
                    None => {
                        return Err(Error::Internal(format!("dangling child id {:?}", child)))
                    }
                }
            }
        }
        if visited.len() != self.scopes.len() {
            return Err(Error::Internal(format!(
                "{} scope(s) unreachable from the root",
                self.scopes.len() - visited.len()
            )));
        }
        Ok(())
    }

    /// Render the ownership tree as indented text. Arena ids are omitted,
    /// so two graphs with the same structure render identically; tests use
    /// this to compare merge results built in different orders.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        self.dump_scope(self.root(), 0, &mut out);
        out
    }

    fn dump_scope(&self, id: ScopeId, indent: usize, out: &mut String) {
        use std::fmt::Write;
        let Some(scope) = self.scopes.get(&id) else {
            return;
        };
        let pad = "  ".repeat(indent);
        let locs: Vec<String> = scope.locations.iter().map(|l| l.to_string()).collect();
        let _ = writeln!(out, "{}{:?} [{}]", pad, scope.kind, locs.join(", "));
        for decl in &scope.declarations {
            let _ = writeln!(out, "{}  decl {} @ {}", pad, decl.name, decl.location);
        }
        for call in &scope.calls {
            let _ = writeln!(out, "{}  call {} @ {}", pad, call.name, call.location);
        }
        for stmt in &scope.statements {
            if let Some(s) = self.statements.get(stmt) {
                let _ = writeln!(out, "{}  stmt {} @ {}", pad, s.kind.label(), s.location);
            }
        }
        for child in &scope.children {
            self.dump_scope(*child, indent + 1, out);
        }
    }

    /// Summary counts for display and the stats query.
    pub fn stats(&self) -> GraphStats {
        GraphStats {
            files: self.file_languages.len(),
            scopes: self.scopes.len(),
            declarations: self.scopes.values().map(|s| s.declarations.len()).sum(),
            calls: self.scopes.values().map(|s| s.calls.len()).sum(),
            statements: self.statements.len(),
            expressions: self.expressions.len(),
        }
    }
}

impl Default for ScopeGraph {
    fn default() -> Self {
        Self::new()
    }
}

/// Statistics about a scope graph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphStats {
    pub files: usize,
    pub scopes: usize,
    pub declarations: usize,
    pub calls: usize,
    pub statements: usize,
    pub expressions: usize,
}

impl std::fmt::Display for GraphStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Scope Graph Statistics:")?;
        writeln!(f, "  Files: {}", self.files)?;
        writeln!(f, "  Scopes: {}", self.scopes)?;
        writeln!(f, "  Declarations: {}", self.declarations)?;
        writeln!(f, "  Method calls: {}", self.calls)?;
        writeln!(
            f,
            "  Statements: {} (expressions: {})",
            self.statements, self.expressions
        )
    }
}
