//! Name resolution - maps a name occurrence to candidate declarations
//!
//! Resolution order:
//! 1. Keyword short-circuit (`this`, `base` in C#, `super` in Java)
//! 2. Qualified prefix chaining (`A.B` in `A.B.C`)
//! 3. Dotted sibling chain (`recv.name`, `recv->name`, `recv::name`)
//! 4. Lexical walk, innermost scope outward
//! 5. Imports and aliases visible before the use site, nearest last
//!
//! Candidates come back ordered: lexical proximity first, then imports,
//! then aliases. Callers typically take the first.

use crate::location::Location;
use crate::scope::graph::ScopeGraph;
use crate::scope::model::*;
use crate::{Error, Result};
use std::collections::HashSet;

/// Alias chains longer than this are treated as unresolvable.
const MAX_RESOLVE_DEPTH: usize = 16;

/// A resolution candidate: a named scope, or a variable declaration
/// addressed by its owning scope and position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Match {
    Scope(ScopeId),
    Variable { scope: ScopeId, index: usize },
}

/// Name resolver over a scope graph.
pub struct Resolver<'a> {
    graph: &'a ScopeGraph,
}

impl<'a> Resolver<'a> {
    pub fn new(graph: &'a ScopeGraph) -> Self {
        Self { graph }
    }

    /// Resolve a name-use expression to its ordered candidate set.
    ///
    /// Fails with a resolution error when the expression is detached from
    /// any statement (its environment is unknowable), and with an argument
    /// error when the expression carries no name.
    pub fn find_matches(&self, name_use: ExpressionId) -> Result<Vec<Match>> {
        self.resolve_expression(name_use, 0)
    }

    /// Resolve a bare name as seen from `scope` at `site`, without a
    /// backing expression. Used by the ad-hoc query surface.
    pub fn resolve_name_at(&self, scope: ScopeId, site: &Location, name: &str) -> Vec<Match> {
        self.resolve_in_context(scope, site, name, 0)
    }

    /// Human-readable description of a candidate, for display output.
    pub fn describe(&self, m: &Match) -> String {
        match m {
            Match::Scope(id) => {
                let qualified = self
                    .graph
                    .qualified_name(*id)
                    .unwrap_or_else(|| "<unnamed>".to_string());
                let kind = self
                    .graph
                    .scope(*id)
                    .map(|s| format!("{:?}", s.kind.tag()).to_lowercase())
                    .unwrap_or_default();
                match self.graph.scope(*id).and_then(|s| s.primary_location()) {
                    Some(loc) => format!("{} {} @ {}", kind, qualified, loc),
                    None => format!("{} {}", kind, qualified),
                }
            }
            Match::Variable { scope, index } => {
                match self
                    .graph
                    .scope(*scope)
                    .and_then(|s| s.declarations.get(*index))
                {
                    Some(decl) => format!("variable {} @ {}", decl.name, decl.location),
                    None => "variable <removed>".to_string(),
                }
            }
        }
    }

    fn resolve_expression(&self, id: ExpressionId, depth: usize) -> Result<Vec<Match>> {
        if depth > MAX_RESOLVE_DEPTH {
            return Ok(Vec::new());
        }
        let expr = self
            .graph
            .expression(id)
            .ok_or_else(|| Error::InvalidArgument(format!("unknown expression {:?}", id)))?;

        let (name, prefix) = match &expr.kind {
            ExpressionKind::Name { name, prefix } => (name.as_str(), *prefix),
            ExpressionKind::Call { name } => (name.as_str(), None),
            ExpressionKind::TypeUse { name } => (name.as_str(), None),
            other => {
                return Err(Error::InvalidArgument(format!(
                    "expression {:?} is not a name use",
                    other
                )))
            }
        };

        let stmt = self.enclosing_statement(id).ok_or_else(|| {
            Error::Resolution(format!("name '{}' has no parent statement", name))
        })?;
        let scope = self
            .graph
            .statement(stmt)
            .map(|s| s.scope)
            .unwrap_or_else(|| self.graph.root());
        let site = expr.location.clone();

        // 1. keyword short-circuit
        if let Some(matches) = self.resolve_keyword(name, scope, &site, depth) {
            return Ok(matches);
        }

        // 2. qualified name: search only the resolved prefix containers
        if let Some(prefix_id) = prefix {
            let containers = self.resolve_expression(prefix_id, depth + 1)?;
            return Ok(self.members_of(&containers, name));
        }

        // 3. dotted sibling chain: resolve the receiver, search its members
        if let Some(receiver) = self.dotted_receiver(id, stmt) {
            let receivers = self.resolve_expression(receiver, depth + 1)?;
            return Ok(self.members_of(&receivers, name));
        }

        // 4 + 5. lexical environment, then imports and aliases
        Ok(self.resolve_in_context(scope, &site, name, depth))
    }

    /// `this` / `base` / `super`, gated on the use site's language.
    fn resolve_keyword(
        &self,
        name: &str,
        scope: ScopeId,
        site: &Location,
        depth: usize,
    ) -> Option<Vec<Match>> {
        let language = self.graph.language_of(&site.file_path);
        match name {
            "this" => Some(
                self.graph
                    .enclosing(scope, ScopeKindTag::Type)
                    .map(Match::Scope)
                    .into_iter()
                    .collect(),
            ),
            "base" if language == Some(crate::Language::CSharp) => {
                Some(self.parent_type_of_enclosing(scope, site, depth))
            }
            "super" if language == Some(crate::Language::Java) => {
                Some(self.parent_type_of_enclosing(scope, site, depth))
            }
            _ => None,
        }
    }

    /// The first declared supertype of the enclosing type definition,
    /// resolved from the type's own environment.
    fn parent_type_of_enclosing(
        &self,
        scope: ScopeId,
        site: &Location,
        depth: usize,
    ) -> Vec<Match> {
        let Some(ty) = self.graph.enclosing(scope, ScopeKindTag::Type) else {
            return Vec::new();
        };
        let Some(ScopeKind::Type { supers, .. }) = self.graph.scope(ty).map(|s| &s.kind) else {
            return Vec::new();
        };
        let Some(first) = supers.first() else {
            return Vec::new();
        };
        let outer = self
            .graph
            .scope(ty)
            .and_then(|s| s.parent)
            .unwrap_or_else(|| self.graph.root());
        self.resolve_qualified_str(outer, site, first, depth + 1)
            .into_iter()
            .filter(|m| matches!(m, Match::Scope(_)))
            .collect()
    }

    /// Resolve a possibly qualified name given as text (`A.B` / `A::B`).
    fn resolve_qualified_str(
        &self,
        scope: ScopeId,
        site: &Location,
        text: &str,
        depth: usize,
    ) -> Vec<Match> {
        let mut segments = text.split("::").flat_map(|s| s.split('.'));
        let Some(first) = segments.next() else {
            return Vec::new();
        };
        let mut current = self.resolve_in_context(scope, site, first, depth);
        for segment in segments {
            current = self.members_of(&current, segment);
        }
        current
    }

    /// If the expression's immediately preceding siblings are a member
    /// operator and a name, return the receiving name expression.
    fn dotted_receiver(&self, id: ExpressionId, stmt: StatementId) -> Option<ExpressionId> {
        let expr = self.graph.expression(id)?;
        let siblings: &[ExpressionId] = match expr.parent {
            ExpressionParent::Statement(s) => {
                debug_assert_eq!(s, stmt);
                &self.graph.statement(s)?.expressions
            }
            ExpressionParent::Expression(e) => &self.graph.expression(e)?.children,
        };
        let pos = siblings.iter().position(|s| *s == id)?;
        if pos < 2 {
            return None;
        }
        let op = self.graph.expression(siblings[pos - 1])?;
        let ExpressionKind::Operator { text } = &op.kind else {
            return None;
        };
        if !matches!(text.as_str(), "." | "->" | "::") {
            return None;
        }
        let recv = self.graph.expression(siblings[pos - 2])?;
        matches!(recv.kind, ExpressionKind::Name { .. }).then_some(siblings[pos - 2])
    }

    /// Lexical walk plus the import/alias environment, ordered: nearer
    /// scopes first, then imports, then aliases.
    fn resolve_in_context(
        &self,
        scope: ScopeId,
        site: &Location,
        name: &str,
        depth: usize,
    ) -> Vec<Match> {
        let mut out = Vec::new();
        let mut seen = HashSet::new();

        for ancestor in self.graph.ancestors_and_self(scope) {
            for m in self.named_entities(ancestor, name) {
                if seen.insert(m) {
                    out.push(m);
                }
            }
        }

        let (imports, aliases) = self.import_alias_candidates(scope, site, name, depth);
        for m in imports.into_iter().chain(aliases) {
            if seen.insert(m) {
                out.push(m);
            }
        }
        out
    }

    /// Named entities directly inside `scope`: declarations first, then
    /// child named scopes, in source order.
    fn named_entities(&self, scope: ScopeId, name: &str) -> Vec<Match> {
        let mut out = Vec::new();
        if let Some(s) = self.graph.scope(scope) {
            for (index, decl) in s.declarations.iter().enumerate() {
                if decl.name == name {
                    out.push(Match::Variable { scope, index });
                }
            }
        }
        out.extend(
            self.graph
                .named_children(scope, name, None)
                .map(Match::Scope),
        );
        out
    }

    /// Members named `name` in any of the container candidates.
    fn members_of(&self, containers: &[Match], name: &str) -> Vec<Match> {
        let mut out = Vec::new();
        let mut seen = HashSet::new();
        for c in containers {
            if let Match::Scope(id) = c {
                for m in self.named_entities(*id, name) {
                    if seen.insert(m) {
                        out.push(m);
                    }
                }
            }
        }
        out
    }

    /// Import and alias statements visible at the use site: statements of
    /// the site's file, lexically before it, in the scope chain.
    fn import_alias_candidates(
        &self,
        scope: ScopeId,
        site: &Location,
        name: &str,
        depth: usize,
    ) -> (Vec<Match>, Vec<Match>) {
        let mut imports = Vec::new();
        let mut aliases = Vec::new();
        if depth > MAX_RESOLVE_DEPTH {
            return (imports, aliases);
        }

        for ancestor in self.graph.ancestors_and_self(scope) {
            let Some(s) = self.graph.scope(ancestor) else {
                continue;
            };
            for stmt_id in &s.statements {
                let Some(stmt) = self.graph.statement(*stmt_id) else {
                    continue;
                };
                if stmt.location.file_path != site.file_path || stmt.location >= *site {
                    continue;
                }
                match &stmt.kind {
                    StatementKind::Import => {
                        let Some(target) = stmt.expressions.first() else {
                            continue;
                        };
                        let Ok(resolved) = self.resolve_expression(*target, depth + 1) else {
                            continue;
                        };
                        for r in &resolved {
                            if let Match::Scope(id) = r {
                                // a specific import names the entity itself
                                if self.graph.scope(*id).and_then(|s| s.name()) == Some(name) {
                                    imports.push(*r);
                                }
                            }
                        }
                        // a namespace import exposes matching children
                        imports.extend(self.members_of(&resolved, name));
                    }
                    StatementKind::Alias { alias } if alias == name => {
                        let Some(target) = stmt.expressions.first() else {
                            continue;
                        };
                        if let Ok(resolved) = self.resolve_expression(*target, depth + 1) {
                            aliases.extend(resolved);
                        }
                    }
                    _ => {}
                }
            }
        }
        (imports, aliases)
    }

    /// Walk expression parents up to the owning statement.
    fn enclosing_statement(&self, expr: ExpressionId) -> Option<StatementId> {
        let mut current = expr;
        for _ in 0..MAX_RESOLVE_DEPTH * 8 {
            match self.graph.expression(current)?.parent {
                ExpressionParent::Statement(s) => {
                    return self.graph.statement(s).map(|_| s);
                }
                ExpressionParent::Expression(e) => current = e,
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::Language;

    fn loc(file: &str, xpath: &str, line: u32) -> Location {
        Location::new(file, xpath, line, 1, 1)
    }

    struct Fixture {
        graph: ScopeGraph,
    }

    impl Fixture {
        fn new(file: &str, language: Language) -> Self {
            let mut graph = ScopeGraph::new();
            graph.set_language(file, language);
            Self { graph }
        }

        fn decl(&mut self, scope: ScopeId, name: &str, file: &str, line: u32) {
            let l = loc(file, &format!("/unit[1]/decl[{}]", line), line);
            self.graph
                .add_statement(scope, None, StatementKind::Declaration, l.clone());
            if let Some(s) = self.graph.scope_mut(scope) {
                s.declarations.push(VariableDeclaration {
                    name: name.into(),
                    type_expr: None,
                    init_expr: None,
                    location: l,
                });
            }
        }

        /// An expression statement holding one name use; returns the use.
        fn name_use(&mut self, scope: ScopeId, name: &str, file: &str, line: u32) -> ExpressionId {
            let l = loc(file, &format!("/unit[1]/expr_stmt[{}]", line), line);
            let stmt = self
                .graph
                .add_statement(scope, None, StatementKind::Expr, l.clone());
            self.graph.add_expression(
                ExpressionParent::Statement(stmt),
                ExpressionKind::Name {
                    name: name.into(),
                    prefix: None,
                },
                l,
            )
        }
    }

    #[test]
    fn test_lexically_nearest_declaration_wins() {
        let mut f = Fixture::new("a.cpp", Language::Cpp);
        let method = f.graph.add_scope(
            f.graph.root(),
            ScopeKind::Method {
                name: "m".into(),
                signature: String::new(),
            },
            Some(loc("a.cpp", "/unit[1]/function[1]", 1)),
        );
        let block = f.graph.add_scope(
            method,
            ScopeKind::Block,
            Some(loc("a.cpp", "/unit[1]/function[1]/block[1]/block[1]", 3)),
        );
        f.decl(method, "x", "a.cpp", 2);
        f.decl(block, "x", "a.cpp", 4);
        let use_x = f.name_use(block, "x", "a.cpp", 5);

        let matches = Resolver::new(&f.graph).find_matches(use_x).unwrap();
        assert_eq!(matches.len(), 2);
        // the block-local declaration comes first
        assert_eq!(
            matches[0],
            Match::Variable {
                scope: block,
                index: 0
            }
        );
        assert_eq!(
            matches[1],
            Match::Variable {
                scope: method,
                index: 0
            }
        );
    }

    #[test]
    fn test_qualified_name_anchors_to_qualifier() {
        let mut f = Fixture::new("a.cs", Language::CSharp);
        let ns_a = f.graph.add_scope(
            f.graph.root(),
            ScopeKind::Namespace { name: "A".into() },
            Some(loc("a.cs", "/unit[1]/namespace[1]", 1)),
        );
        let ns_b = f.graph.add_scope(
            ns_a,
            ScopeKind::Namespace { name: "B".into() },
            Some(loc("a.cs", "/unit[1]/namespace[1]/block[1]/namespace[1]", 2)),
        );
        let c_in_b = f.graph.add_scope(
            ns_b,
            ScopeKind::Type {
                name: "C".into(),
                supers: vec![],
            },
            Some(loc(
                "a.cs",
                "/unit[1]/namespace[1]/block[1]/namespace[1]/block[1]/class[1]",
                3,
            )),
        );
        // a decoy C at the top level must not be found
        f.graph.add_scope(
            f.graph.root(),
            ScopeKind::Type {
                name: "C".into(),
                supers: vec![],
            },
            Some(loc("a.cs", "/unit[1]/class[1]", 9)),
        );

        // build `A.B.C` as a prefixed name use
        let l = loc("a.cs", "/unit[1]/expr_stmt[1]", 20);
        let stmt =
            f.graph
                .add_statement(f.graph.root(), None, StatementKind::Expr, l.clone());
        let use_c = f.graph.add_expression(
            ExpressionParent::Statement(stmt),
            ExpressionKind::Name {
                name: "C".into(),
                prefix: None,
            },
            l.clone(),
        );
        let prefix_a = f.graph.alloc_expression(
            ExpressionParent::Expression(use_c),
            ExpressionKind::Name {
                name: "A".into(),
                prefix: None,
            },
            l.clone(),
        );
        let prefix_b = f.graph.alloc_expression(
            ExpressionParent::Expression(use_c),
            ExpressionKind::Name {
                name: "B".into(),
                prefix: Some(prefix_a),
            },
            l,
        );
        f.graph.set_name_prefix(use_c, prefix_b);

        let matches = Resolver::new(&f.graph).find_matches(use_c).unwrap();
        assert_eq!(matches, vec![Match::Scope(c_in_b)]);
    }

    #[test]
    fn test_dotted_chain_resolves_receiver_members() {
        // class T { int f; void m() { this.f(); } }
        let mut f = Fixture::new("t.cs", Language::CSharp);
        let ty = f.graph.add_scope(
            f.graph.root(),
            ScopeKind::Type {
                name: "T".into(),
                supers: vec![],
            },
            Some(loc("t.cs", "/unit[1]/class[1]", 1)),
        );
        f.decl(ty, "f", "t.cs", 2);
        let method = f.graph.add_scope(
            ty,
            ScopeKind::Method {
                name: "m".into(),
                signature: String::new(),
            },
            Some(loc("t.cs", "/unit[1]/class[1]/block[1]/function[1]", 3)),
        );

        let l = loc("t.cs", "/unit[1]/class[1]/block[1]/function[1]/expr_stmt[1]", 4);
        let stmt = f
            .graph
            .add_statement(method, None, StatementKind::Expr, l.clone());
        let this_use = f.graph.add_expression(
            ExpressionParent::Statement(stmt),
            ExpressionKind::Name {
                name: "this".into(),
                prefix: None,
            },
            l.clone(),
        );
        f.graph.add_expression(
            ExpressionParent::Statement(stmt),
            ExpressionKind::Operator { text: ".".into() },
            l.clone(),
        );
        let call = f.graph.add_expression(
            ExpressionParent::Statement(stmt),
            ExpressionKind::Call { name: "f".into() },
            l,
        );

        let resolver = Resolver::new(&f.graph);
        // `this` resolves to the enclosing type and never touches lexical scope
        assert_eq!(
            resolver.find_matches(this_use).unwrap(),
            vec![Match::Scope(ty)]
        );
        // `f` after the dot resolves to T's member
        assert_eq!(
            resolver.find_matches(call).unwrap(),
            vec![Match::Variable { scope: ty, index: 0 }]
        );
    }

    #[test]
    fn test_wildcard_import_contributes_members() {
        // lib: namespace a { namespace c { class Y } }
        // use: import a.c; ... Y
        let mut f = Fixture::new("x.java", Language::Java);
        let ns_a = f.graph.add_scope(
            f.graph.root(),
            ScopeKind::Namespace { name: "a".into() },
            Some(loc("lib.java", "/unit[1]/package[1]", 1)),
        );
        let ns_c = f.graph.add_scope(
            ns_a,
            ScopeKind::Namespace { name: "c".into() },
            Some(loc("lib.java", "/unit[1]/package[2]", 1)),
        );
        let y = f.graph.add_scope(
            ns_c,
            ScopeKind::Type {
                name: "Y".into(),
                supers: vec![],
            },
            Some(loc("lib.java", "/unit[1]/class[1]", 2)),
        );

        // the import statement precedes the use in x.java
        let import_loc = loc("x.java", "/unit[1]/import[1]", 1);
        let import_stmt = f.graph.add_statement(
            f.graph.root(),
            None,
            StatementKind::Import,
            import_loc.clone(),
        );
        let target_c = f.graph.add_expression(
            ExpressionParent::Statement(import_stmt),
            ExpressionKind::Name {
                name: "c".into(),
                prefix: None,
            },
            import_loc.clone(),
        );
        let prefix_a = f.graph.alloc_expression(
            ExpressionParent::Expression(target_c),
            ExpressionKind::Name {
                name: "a".into(),
                prefix: None,
            },
            import_loc,
        );
        f.graph.set_name_prefix(target_c, prefix_a);

        let use_y = f.name_use(f.graph.root(), "Y", "x.java", 5);
        let matches = Resolver::new(&f.graph).find_matches(use_y).unwrap();
        assert_eq!(matches, vec![Match::Scope(y)]);
    }

    #[test]
    fn test_alias_substitutes_target() {
        // using F = N; ... F
        let mut f = Fixture::new("a.cs", Language::CSharp);
        let ns = f.graph.add_scope(
            f.graph.root(),
            ScopeKind::Namespace { name: "N".into() },
            Some(loc("a.cs", "/unit[1]/namespace[1]", 1)),
        );

        let alias_loc = loc("a.cs", "/unit[1]/using[1]", 2);
        let alias_stmt = f.graph.add_statement(
            f.graph.root(),
            None,
            StatementKind::Alias { alias: "F".into() },
            alias_loc.clone(),
        );
        f.graph.add_expression(
            ExpressionParent::Statement(alias_stmt),
            ExpressionKind::Name {
                name: "N".into(),
                prefix: None,
            },
            alias_loc,
        );

        let use_f = f.name_use(f.graph.root(), "F", "a.cs", 5);
        let matches = Resolver::new(&f.graph).find_matches(use_f).unwrap();
        assert_eq!(matches, vec![Match::Scope(ns)]);
    }

    #[test]
    fn test_base_returns_declared_supertype() {
        let mut f = Fixture::new("a.cs", Language::CSharp);
        let base_ty = f.graph.add_scope(
            f.graph.root(),
            ScopeKind::Type {
                name: "B".into(),
                supers: vec![],
            },
            Some(loc("a.cs", "/unit[1]/class[1]", 1)),
        );
        let derived = f.graph.add_scope(
            f.graph.root(),
            ScopeKind::Type {
                name: "D".into(),
                supers: vec!["B".into()],
            },
            Some(loc("a.cs", "/unit[1]/class[2]", 3)),
        );
        let method = f.graph.add_scope(
            derived,
            ScopeKind::Method {
                name: "m".into(),
                signature: String::new(),
            },
            Some(loc("a.cs", "/unit[1]/class[2]/block[1]/function[1]", 4)),
        );

        let use_base = f.name_use(method, "base", "a.cs", 5);
        let matches = Resolver::new(&f.graph).find_matches(use_base).unwrap();
        assert_eq!(matches, vec![Match::Scope(base_ty)]);

        // `super` is a plain identifier outside Java
        let use_super = f.name_use(method, "super", "a.cs", 6);
        assert!(Resolver::new(&f.graph)
            .find_matches(use_super)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_detached_name_is_a_resolution_error() {
        let mut f = Fixture::new("a.cpp", Language::Cpp);
        let orphan = f.graph.alloc_expression(
            ExpressionParent::Statement(StatementId(9999)),
            ExpressionKind::Name {
                name: "x".into(),
                prefix: None,
            },
            loc("a.cpp", "/unit[1]/expr[1]", 1),
        );

        let err = Resolver::new(&f.graph).find_matches(orphan).unwrap_err();
        assert!(matches!(err, Error::Resolution(_)));
    }
}
