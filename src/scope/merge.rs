//! Merge algebra: structural union of scope trees, and file removal
//!
//! `merge` folds a per-file tree into the global graph. Named scopes with
//! the same (kind, name, signature) under the same parent coalesce: the
//! surviving node absorbs the incoming node's locations and children.
//! Everything that cannot be de-duplicated (statements, declarations,
//! method calls) is retained from both sides, ordered by file path and
//! then source position, so the result is independent of merge order.
//!
//! `remove_file` is the inverse for a single contributing file: it strips
//! that file's locations everywhere, deletes nodes left with no location,
//! and promotes surviving children into the deleted node's position.

use crate::scope::graph::ScopeGraph;
use crate::scope::model::*;
use std::collections::HashMap;

/// Id remappings accumulated while absorbing one incoming tree.
#[derive(Default)]
struct Absorption {
    scopes: HashMap<ScopeId, ScopeId>,
    statements: HashMap<StatementId, StatementId>,
    expressions: HashMap<ExpressionId, ExpressionId>,
}

impl ScopeGraph {
    /// Fold `other` into this graph, consuming it.
    ///
    /// Commutative and associative up to the deterministic tiebreakers:
    /// merging the same set of file trees in any order yields the same
    /// structure.
    pub fn merge(&mut self, mut other: ScopeGraph) {
        let langs: Vec<_> = other.file_languages_mut().drain().collect();
        for (file, lang) in langs {
            self.file_languages_mut().insert(file, lang);
        }
        let mut ctx = Absorption::default();
        let src_root = other.root();
        self.coalesce(self.root(), &mut other, src_root, &mut ctx);
    }

    /// Absorb `src` (a scope of `other`) into the existing scope `dst`.
    fn coalesce(
        &mut self,
        dst: ScopeId,
        other: &mut ScopeGraph,
        src: ScopeId,
        ctx: &mut Absorption,
    ) {
        let Some(incoming) = other.take_scope(src) else {
            return;
        };
        ctx.scopes.insert(src, dst);

        for loc in incoming.locations {
            if let Some(scope) = self.scope_mut(dst) {
                scope.add_location(loc);
            }
        }
        self.union_supers(dst, &incoming.kind);

        // Children first: coalescing targets and transplanted ids must be
        // known before statements can remap block bodies.
        for child in incoming.children {
            let identity = other.scope(child).map(|c| c.kind.clone());
            let target = identity.filter(|k| k.is_named()).and_then(|k| {
                self.scope(dst).and_then(|d| {
                    d.children
                        .iter()
                        .copied()
                        .find(|c| self.scope(*c).map_or(false, |s| s.kind.same_identity(&k)))
                })
            });
            match target {
                Some(existing) => {
                    self.coalesce(existing, other, child, ctx);
                }
                None => {
                    if let Some(new_id) = self.transplant_scope(other, child, dst, ctx) {
                        self.insert_child_ordered(dst, new_id);
                    }
                }
            }
        }

        for stmt in incoming.statements {
            if let Some(new_id) = self.transplant_statement(other, stmt, dst, ctx) {
                if let Some(scope) = self.scope_mut(dst) {
                    scope.statements.push(new_id);
                }
            }
        }
        for decl in incoming.declarations {
            let mapped = self.remap_declaration(decl, ctx);
            if let Some(scope) = self.scope_mut(dst) {
                scope.declarations.push(mapped);
            }
        }
        for call in incoming.calls {
            let mapped = self.remap_call(call, ctx);
            if let Some(scope) = self.scope_mut(dst) {
                scope.calls.push(mapped);
            }
        }

        self.restore_order(dst);
    }

    /// Move an entire subtree of `other` into this graph under `parent`.
    fn transplant_scope(
        &mut self,
        other: &mut ScopeGraph,
        src: ScopeId,
        parent: ScopeId,
        ctx: &mut Absorption,
    ) -> Option<ScopeId> {
        let incoming = other.take_scope(src)?;
        let new_id = self.reserve_scope_id();
        ctx.scopes.insert(src, new_id);
        self.install_scope(
            new_id,
            Scope {
                kind: incoming.kind,
                parent: Some(parent),
                locations: incoming.locations,
                children: Vec::new(),
                declarations: Vec::new(),
                calls: Vec::new(),
                statements: Vec::new(),
            },
        );

        for child in incoming.children {
            if let Some(new_child) = self.transplant_scope(other, child, new_id, ctx) {
                if let Some(scope) = self.scope_mut(new_id) {
                    scope.children.push(new_child);
                }
            }
        }
        for stmt in incoming.statements {
            if let Some(new_stmt) = self.transplant_statement(other, stmt, new_id, ctx) {
                if let Some(scope) = self.scope_mut(new_id) {
                    scope.statements.push(new_stmt);
                }
            }
        }
        for decl in incoming.declarations {
            let mapped = self.remap_declaration(decl, ctx);
            if let Some(scope) = self.scope_mut(new_id) {
                scope.declarations.push(mapped);
            }
        }
        for call in incoming.calls {
            let mapped = self.remap_call(call, ctx);
            if let Some(scope) = self.scope_mut(new_id) {
                scope.calls.push(mapped);
            }
        }
        Some(new_id)
    }

    fn transplant_statement(
        &mut self,
        other: &mut ScopeGraph,
        src: StatementId,
        scope: ScopeId,
        ctx: &mut Absorption,
    ) -> Option<StatementId> {
        let incoming = other.take_statement(src)?;
        let new_id = self.reserve_statement_id();
        ctx.statements.insert(src, new_id);

        let mut expressions = Vec::new();
        for expr in incoming.expressions {
            if let Some(new_expr) =
                self.transplant_expression(other, expr, ExpressionParent::Statement(new_id), ctx)
            {
                expressions.push(new_expr);
            }
        }
        let kind = match incoming.kind {
            StatementKind::Block { body } => StatementKind::Block {
                body: ctx.scopes.get(&body).copied().unwrap_or(body),
            },
            k => k,
        };
        let parent = incoming
            .parent
            .and_then(|p| ctx.statements.get(&p).copied());
        self.install_statement(
            new_id,
            Statement {
                kind,
                scope,
                parent,
                expressions,
                location: incoming.location,
            },
        );
        Some(new_id)
    }

    fn transplant_expression(
        &mut self,
        other: &mut ScopeGraph,
        src: ExpressionId,
        parent: ExpressionParent,
        ctx: &mut Absorption,
    ) -> Option<ExpressionId> {
        let incoming = other.take_expression(src)?;
        let new_id = self.reserve_expression_id();
        ctx.expressions.insert(src, new_id);

        let mut children = Vec::new();
        for child in incoming.children {
            if let Some(new_child) =
                self.transplant_expression(other, child, ExpressionParent::Expression(new_id), ctx)
            {
                children.push(new_child);
            }
        }
        let kind = match incoming.kind {
            ExpressionKind::Name { name, prefix } => ExpressionKind::Name {
                name,
                prefix: prefix.and_then(|p| {
                    self.transplant_expression(
                        other,
                        p,
                        ExpressionParent::Expression(new_id),
                        ctx,
                    )
                }),
            },
            k => k,
        };
        self.install_expression(
            new_id,
            Expression {
                kind,
                parent,
                children,
                location: incoming.location,
            },
        );
        Some(new_id)
    }

    fn remap_declaration(
        &self,
        mut decl: VariableDeclaration,
        ctx: &Absorption,
    ) -> VariableDeclaration {
        decl.type_expr = decl.type_expr.and_then(|e| ctx.expressions.get(&e).copied());
        decl.init_expr = decl.init_expr.and_then(|e| ctx.expressions.get(&e).copied());
        decl
    }

    fn remap_call(&self, mut call: MethodCall, ctx: &Absorption) -> MethodCall {
        call.arguments = call
            .arguments
            .iter()
            .filter_map(|a| ctx.expressions.get(a).copied())
            .collect();
        call
    }

    /// Union declared supertypes when coalescing type definitions.
    fn union_supers(&mut self, dst: ScopeId, incoming: &ScopeKind) {
        let ScopeKind::Type { supers: new, .. } = incoming else {
            return;
        };
        let Some(scope) = self.scope_mut(dst) else {
            return;
        };
        if let ScopeKind::Type { supers, .. } = &mut scope.kind {
            for s in new {
                if !supers.contains(s) {
                    supers.push(s.clone());
                }
            }
        }
    }

    /// Restore the deterministic interleaving order of a scope's ordered
    /// collections after an absorption appended to them.
    fn restore_order(&mut self, id: ScopeId) {
        let Some(scope) = self.scope(id) else {
            return;
        };

        let mut children = scope.children.clone();
        let mut statements = scope.statements.clone();

        children.sort_by(|a, b| {
            let ka = self.scope(*a).and_then(|s| s.primary_location().cloned());
            let kb = self.scope(*b).and_then(|s| s.primary_location().cloned());
            ka.cmp(&kb)
        });
        statements.sort_by(|a, b| {
            let ka = self.statement(*a).map(|s| s.location.clone());
            let kb = self.statement(*b).map(|s| s.location.clone());
            ka.cmp(&kb)
        });

        if let Some(scope) = self.scope_mut(id) {
            scope.children = children;
            scope.statements = statements;
            scope.declarations.sort_by(|a, b| a.location.cmp(&b.location));
            scope.calls.sort_by(|a, b| a.location.cmp(&b.location));
        }
    }

    // ── File removal ────────────────────────────────────────────────────

    /// Strip every contribution of `path` from the graph. Nodes whose
    /// location set becomes empty are deleted; their surviving children
    /// are promoted into the parent at the deleted node's position.
    pub fn remove_file(&mut self, path: &str) {
        self.file_languages_mut().remove(path);
        let root = self.root();
        self.strip_file(root, path);
    }

    /// Post-order removal pass. Returns true when the scope itself must
    /// be deleted (no locations left).
    fn strip_file(&mut self, id: ScopeId, path: &str) -> bool {
        let Some(scope) = self.scope(id) else {
            return false;
        };
        let children = scope.children.clone();
        let statements = scope.statements.clone();

        let mut kept_children = Vec::new();
        for child in children {
            if self.strip_file(child, path) {
                // delete the child and splice its survivors into place
                if let Some(dead) = self.take_scope(child) {
                    for grandchild in dead.children {
                        if let Some(gc) = self.scope_mut(grandchild) {
                            gc.parent = Some(id);
                        }
                        kept_children.push(grandchild);
                    }
                    for stmt in dead.statements {
                        self.delete_statement(stmt);
                    }
                }
            } else {
                kept_children.push(child);
            }
        }

        let mut kept_statements = Vec::new();
        for stmt in statements {
            let from_file = self
                .statement(stmt)
                .map_or(true, |s| s.location.file_path == path);
            if from_file {
                self.delete_statement(stmt);
            } else {
                kept_statements.push(stmt);
            }
        }

        let Some(scope) = self.scope_mut(id) else {
            return false;
        };
        scope.children = kept_children;
        scope.statements = kept_statements;
        scope.declarations.retain(|d| d.location.file_path != path);
        scope.calls.retain(|c| c.location.file_path != path);
        scope.locations.retain(|l| l.file_path != path);

        scope.locations.is_empty() && id != self.root()
    }

    fn delete_statement(&mut self, id: StatementId) {
        if let Some(stmt) = self.remove_statement_entry(id) {
            for expr in stmt.expressions {
                self.delete_expression(expr);
            }
        }
    }

    fn delete_expression(&mut self, id: ExpressionId) {
        if let Some(expr) = self.remove_expression_entry(id) {
            for child in expr.children {
                self.delete_expression(child);
            }
            if let ExpressionKind::Name {
                prefix: Some(p), ..
            } = expr.kind
            {
                self.delete_expression(p);
            }
        }
    }
}
