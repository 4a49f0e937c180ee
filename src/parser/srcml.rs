//! Lowering from srcML-style file units to per-file scope trees
//!
//! All four languages share one walker; the language tag only switches
//! the few constructs that differ (alias forms, keyword rules live in the
//! resolver). The walker synthesizes an XPath and a line/column location
//! for every node it produces, and fails the whole unit on malformed
//! structure - it never returns a partial tree.

use crate::language::Language;
use crate::location::Location;
use crate::parser::{FileUnit, UnitParser};
use crate::scope::graph::ScopeGraph;
use crate::scope::model::*;
use crate::{Error, Result};
use roxmltree::{Document, Node};
use std::collections::HashMap;

/// Type names lowered as plain type uses rather than resolvable names.
const PRIMITIVE_TYPES: &[&str] = &[
    "void", "int", "char", "bool", "boolean", "float", "double", "long", "short", "byte",
    "signed", "unsigned", "auto", "var",
];

macro_rules! declare_parser {
    ($name:ident, $language:expr) => {
        pub struct $name;

        impl UnitParser for $name {
            fn language(&self) -> Language {
                $language
            }

            fn parse_unit(&self, unit: &FileUnit) -> Result<ScopeGraph> {
                lower_unit(unit, $language)
            }
        }
    };
}

declare_parser!(CParser, Language::C);
declare_parser!(CppParser, Language::Cpp);
declare_parser!(JavaParser, Language::Java);
declare_parser!(CSharpParser, Language::CSharp);

/// Lower one file unit into a fresh scope tree rooted at a Program
/// surrogate. The root scope carries the unit's location.
pub fn lower_unit(unit: &FileUnit, language: Language) -> Result<ScopeGraph> {
    let doc =
        Document::parse(&unit.xml).map_err(|e| Error::parse("/", e.to_string()))?;
    let root = doc.root_element();
    if root.tag_name().name() != "unit" {
        return Err(Error::parse(
            "/",
            format!("file unit root must be <unit>, found <{}>", root.tag_name().name()),
        ));
    }

    let file = if unit.path.is_empty() {
        root.attribute("filename").unwrap_or("<unit>").to_string()
    } else {
        unit.path.clone()
    };

    let mut lowering = Lowering {
        graph: ScopeGraph::new(),
        doc: &doc,
        file,
    };

    let root_xpath = "/unit[1]";
    let unit_loc = lowering.location(root, root_xpath);
    let file_key = lowering.file.clone();
    lowering.graph.set_language(file_key, language);
    let program = lowering.graph.root();
    if let Some(scope) = lowering.graph.scope_mut(program) {
        scope.add_location(unit_loc);
    }

    // a Java `package a.b;` nests the whole unit under namespace scopes
    let top = lowering.package_scope(root, program, root_xpath)?;
    lowering.walk_scope_level(root, top, root_xpath, None)?;
    Ok(lowering.graph)
}

struct Lowering<'a, 'input> {
    graph: ScopeGraph,
    doc: &'a Document<'input>,
    file: String,
}

impl<'a, 'input> Lowering<'a, 'input> {
    fn location(&self, node: Node, xpath: &str) -> Location {
        let range = node.range();
        let start = self.doc.text_pos_at(range.start);
        let end = self.doc.text_pos_at(range.end);
        let length = end.row.saturating_sub(start.row) + 1;
        Location::new(self.file.as_str(), xpath, start.row, start.col, length)
    }

    /// XPath of `target` among its siblings under `parent`.
    fn child_xpath(&self, parent: Node, parent_xpath: &str, target: Node) -> String {
        let tag = target.tag_name().name();
        let mut index = 0;
        for child in parent.children().filter(|c| c.is_element()) {
            if child.tag_name().name() == tag {
                index += 1;
            }
            if child == target {
                break;
            }
        }
        format!("{}/{}[{}]", parent_xpath, tag, index.max(1))
    }

    fn child_element(node: Node<'a, 'input>, tag: &str) -> Option<Node<'a, 'input>> {
        node.children()
            .find(|c| c.is_element() && c.tag_name().name() == tag)
    }

    /// Concatenated text content, trimmed.
    fn full_text(node: Node) -> String {
        let mut out = String::new();
        for d in node.descendants() {
            if d.is_text() {
                if let Some(t) = d.text() {
                    out.push_str(t);
                }
            }
        }
        out.trim().to_string()
    }

    /// If `pkg` is the innermost namespace for a `package` declaration,
    /// return it; otherwise the given default.
    fn package_scope(
        &mut self,
        unit: Node<'a, 'input>,
        program: ScopeId,
        unit_xpath: &str,
    ) -> Result<ScopeId> {
        let Some(package) = Self::child_element(unit, "package") else {
            return Ok(program);
        };
        let xpath = self.child_xpath(unit, unit_xpath, package);
        let Some(name_node) = Self::child_element(package, "name") else {
            return Err(Error::parse(xpath, "package declaration without a name"));
        };
        let loc = self.location(package, &xpath);
        let segments = Self::name_segments(name_node);
        let names: Vec<String> = if segments.is_empty() {
            vec![Self::full_text(name_node)]
        } else {
            segments.iter().map(|s| Self::full_text(s.node)).collect()
        };
        let mut scope = program;
        for text in names {
            if text.is_empty() {
                continue;
            }
            scope = self.graph.add_scope(
                scope,
                ScopeKind::Namespace { name: text },
                Some(loc.clone()),
            );
        }
        Ok(scope)
    }

    // ── Scope-level walk ────────────────────────────────────────────────

    fn walk_scope_level(
        &mut self,
        node: Node<'a, 'input>,
        scope: ScopeId,
        base: &str,
        parent_stmt: Option<StatementId>,
    ) -> Result<()> {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for child in node.children().filter(|c| c.is_element()) {
            let tag = child.tag_name().name();
            let index = counts.entry(tag).or_insert(0);
            *index += 1;
            let xpath = format!("{}/{}[{}]", base, tag, index);

            match tag {
                "package" => {} // handled at the unit level
                "namespace" => self.lower_namespace(child, scope, &xpath)?,
                "class" | "struct" | "interface" | "enum" => {
                    self.lower_type(child, scope, &xpath)?
                }
                "function" | "function_decl" | "constructor" | "constructor_decl"
                | "destructor" | "destructor_decl" => {
                    self.lower_method(child, scope, &xpath)?
                }
                "property" => self.lower_property(child, scope, &xpath)?,
                "extern" => self.lower_extern(child, scope, &xpath, parent_stmt)?,
                "import" | "using" => self.lower_import_or_alias(child, scope, &xpath, parent_stmt)?,
                "block" => self.lower_block_statement(child, scope, &xpath, parent_stmt)?,
                "decl_stmt" => self.lower_decl_stmt(child, scope, &xpath, parent_stmt)?,
                "expr_stmt" | "return" => {
                    self.lower_expr_stmt(child, scope, &xpath, parent_stmt)?
                }
                "if_stmt" | "if" | "else" | "for" | "foreach" | "while" | "do" | "switch"
                | "try" | "catch" | "finally" => {
                    self.lower_control(child, tag, scope, &xpath, parent_stmt)?
                }
                // transparent wrappers (public/private sections, etc.)
                _ => self.walk_scope_level(child, scope, &xpath, parent_stmt)?,
            }
        }
        Ok(())
    }

    fn lower_namespace(
        &mut self,
        node: Node<'a, 'input>,
        scope: ScopeId,
        xpath: &str,
    ) -> Result<()> {
        let Some(name_node) = Self::child_element(node, "name") else {
            // anonymous namespace: contents merge into the parent
            if let Some(block) = Self::child_element(node, "block") {
                let block_xpath = self.child_xpath(node, xpath, block);
                return self.walk_scope_level(block, scope, &block_xpath, None);
            }
            return Ok(());
        };
        let loc = self.location(node, xpath);
        let ns = self.graph.add_scope(
            scope,
            ScopeKind::Namespace {
                name: Self::full_text(name_node),
            },
            Some(loc),
        );
        if let Some(block) = Self::child_element(node, "block") {
            let block_xpath = self.child_xpath(node, xpath, block);
            self.walk_scope_level(block, ns, &block_xpath, None)?;
        }
        Ok(())
    }

    fn lower_type(&mut self, node: Node<'a, 'input>, scope: ScopeId, xpath: &str) -> Result<()> {
        let Some(name_node) = Self::child_element(node, "name") else {
            return Err(Error::parse(xpath, "type definition without a name"));
        };
        let supers = self.declared_supers(node);
        let loc = self.location(node, xpath);
        let ty = self.graph.add_scope(
            scope,
            ScopeKind::Type {
                name: Self::full_text(name_node),
                supers,
            },
            Some(loc),
        );
        if let Some(block) = Self::child_element(node, "block") {
            let block_xpath = self.child_xpath(node, xpath, block);
            self.walk_scope_level(block, ty, &block_xpath, None)?;
        }
        Ok(())
    }

    /// Base type names from `super_list`/`super`/`extends`/`implements`.
    fn declared_supers(&self, node: Node) -> Vec<String> {
        let mut out = Vec::new();
        for child in node.children().filter(|c| c.is_element()) {
            let tag = child.tag_name().name();
            if !matches!(tag, "super_list" | "super" | "extends" | "implements") {
                continue;
            }
            for name in child
                .descendants()
                .filter(|d| d.is_element() && d.tag_name().name() == "name")
            {
                // outermost names only; compound segments are their text
                let parent_is_name = name
                    .parent()
                    .map_or(false, |p| p.tag_name().name() == "name");
                if !parent_is_name {
                    let text = Self::full_text(name);
                    if !text.is_empty() && !out.contains(&text) {
                        out.push(text);
                    }
                }
            }
        }
        out
    }

    fn lower_method(&mut self, node: Node<'a, 'input>, scope: ScopeId, xpath: &str) -> Result<()> {
        let Some(name_node) = Self::child_element(node, "name") else {
            return Err(Error::parse(xpath, "function definition without a name"));
        };
        // out-of-class definitions carry a qualified name; the simple name
        // is the last segment
        let full = Self::full_text(name_node);
        let name = full
            .rsplit("::")
            .next()
            .and_then(|s| s.rsplit('.').next())
            .unwrap_or(full.as_str())
            .to_string();

        let loc = self.location(node, xpath);
        let signature = self.method_signature(node);
        let method = self.graph.add_scope(
            scope,
            ScopeKind::Method { name, signature },
            Some(loc.clone()),
        );
        self.add_parameter_declarations(node, method, xpath);
        if let Some(block) = Self::child_element(node, "block") {
            let block_xpath = self.child_xpath(node, xpath, block);
            self.walk_scope_level(block, method, &block_xpath, None)?;
        }
        Ok(())
    }

    /// Comma-joined parameter type list; this is the merge identity
    /// signature, so declarations and definitions must agree on it.
    fn method_signature(&self, node: Node<'a, 'input>) -> String {
        let Some(params) = Self::child_element(node, "parameter_list") else {
            return String::new();
        };
        params
            .children()
            .filter(|c| c.is_element() && c.tag_name().name() == "parameter")
            .filter_map(|p| {
                p.descendants()
                    .find(|d| d.is_element() && d.tag_name().name() == "type")
                    .map(|t| Self::full_text(t))
            })
            .collect::<Vec<_>>()
            .join(",")
    }

    fn add_parameter_declarations(&mut self, node: Node<'a, 'input>, method: ScopeId, xpath: &str) {
        let Some(params) = Self::child_element(node, "parameter_list") else {
            return;
        };
        let mut index = 0;
        for param in params
            .children()
            .filter(|c| c.is_element() && c.tag_name().name() == "parameter")
        {
            index += 1;
            let Some(decl) = Self::child_element(param, "decl") else {
                continue;
            };
            let Some(name) = Self::child_element(decl, "name") else {
                continue;
            };
            let param_xpath = format!("{}/parameter_list[1]/parameter[{}]", xpath, index);
            let location = self.location(param, &param_xpath);
            if let Some(scope) = self.graph.scope_mut(method) {
                scope.declarations.push(VariableDeclaration {
                    name: Self::full_text(name),
                    type_expr: None,
                    init_expr: None,
                    location,
                });
            }
        }
    }

    fn lower_property(
        &mut self,
        node: Node<'a, 'input>,
        scope: ScopeId,
        xpath: &str,
    ) -> Result<()> {
        let Some(name_node) = Self::child_element(node, "name") else {
            return Err(Error::parse(xpath, "property definition without a name"));
        };
        let loc = self.location(node, xpath);
        let property = self.graph.add_scope(
            scope,
            ScopeKind::Property {
                name: Self::full_text(name_node),
            },
            Some(loc),
        );
        if let Some(block) = Self::child_element(node, "block") {
            let block_xpath = self.child_xpath(node, xpath, block);
            self.walk_scope_level(block, property, &block_xpath, None)?;
        }
        Ok(())
    }

    /// `extern "C" { ... }` - the linkage statement is retained, but the
    /// contents lower directly into the enclosing scope so name matching
    /// sees through the linkage boundary.
    fn lower_extern(
        &mut self,
        node: Node<'a, 'input>,
        scope: ScopeId,
        xpath: &str,
        parent_stmt: Option<StatementId>,
    ) -> Result<()> {
        let linkage = node
            .descendants()
            .find(|d| d.is_element() && d.tag_name().name() == "literal")
            .map(|l| Self::full_text(l).trim_matches('"').to_string())
            .unwrap_or_default();
        let loc = self.location(node, xpath);
        self.graph
            .add_statement(scope, parent_stmt, StatementKind::Extern { linkage }, loc);

        if let Some(block) = Self::child_element(node, "block") {
            let block_xpath = self.child_xpath(node, xpath, block);
            self.walk_scope_level(block, scope, &block_xpath, None)
        } else {
            // single-declaration form: `extern "C" void f();`
            self.walk_scope_level(node, scope, xpath, parent_stmt)
        }
    }

    /// `import a.b;` / `using N;` / `using F = A.B;`
    fn lower_import_or_alias(
        &mut self,
        node: Node<'a, 'input>,
        scope: ScopeId,
        xpath: &str,
        parent_stmt: Option<StatementId>,
    ) -> Result<()> {
        let names: Vec<Node> = node
            .children()
            .filter(|c| c.is_element() && c.tag_name().name() == "name")
            .collect();
        let loc = self.location(node, xpath);
        match names.as_slice() {
            [] => Err(Error::parse(xpath, "import without a target name")),
            [target] => {
                let stmt =
                    self.graph
                        .add_statement(scope, parent_stmt, StatementKind::Import, loc);
                let target_xpath = self.child_xpath(node, xpath, *target);
                self.build_name_expr(*target, ExpressionParent::Statement(stmt), &target_xpath);
                Ok(())
            }
            [alias, target, ..] => {
                let stmt = self.graph.add_statement(
                    scope,
                    parent_stmt,
                    StatementKind::Alias {
                        alias: Self::full_text(*alias),
                    },
                    loc,
                );
                let target_xpath = self.child_xpath(node, xpath, *target);
                self.build_name_expr(*target, ExpressionParent::Statement(stmt), &target_xpath);
                Ok(())
            }
        }
    }

    fn lower_block_statement(
        &mut self,
        node: Node<'a, 'input>,
        scope: ScopeId,
        xpath: &str,
        parent_stmt: Option<StatementId>,
    ) -> Result<()> {
        let loc = self.location(node, xpath);
        let body = self
            .graph
            .add_scope(scope, ScopeKind::Block, Some(loc.clone()));
        self.graph
            .add_statement(scope, parent_stmt, StatementKind::Block { body }, loc);
        self.walk_scope_level(node, body, xpath, None)
    }

    fn lower_decl_stmt(
        &mut self,
        node: Node<'a, 'input>,
        scope: ScopeId,
        xpath: &str,
        parent_stmt: Option<StatementId>,
    ) -> Result<()> {
        let loc = self.location(node, xpath);
        let stmt =
            self.graph
                .add_statement(scope, parent_stmt, StatementKind::Declaration, loc);

        let mut decl_index = 0;
        for decl in node
            .children()
            .filter(|c| c.is_element() && c.tag_name().name() == "decl")
        {
            decl_index += 1;
            let decl_xpath = format!("{}/decl[{}]", xpath, decl_index);
            let Some(name_node) = Self::child_element(decl, "name") else {
                return Err(Error::parse(decl_xpath, "declaration without a name"));
            };

            let type_expr = Self::child_element(decl, "type").and_then(|ty| {
                let ty_xpath = self.child_xpath(decl, &decl_xpath, ty);
                self.build_type_expr(ty, ExpressionParent::Statement(stmt), &ty_xpath)
            });
            let init_expr = Self::child_element(decl, "init").and_then(|init| {
                let init_xpath = self.child_xpath(decl, &decl_xpath, init);
                let produced = self.lower_expr_children(
                    init,
                    ExpressionParent::Statement(stmt),
                    &init_xpath,
                    scope,
                );
                produced.first().copied()
            });

            let location = self.location(decl, &decl_xpath);
            if let Some(s) = self.graph.scope_mut(scope) {
                s.declarations.push(VariableDeclaration {
                    name: Self::full_text(name_node),
                    type_expr,
                    init_expr,
                    location,
                });
            }
        }
        Ok(())
    }

    fn lower_expr_stmt(
        &mut self,
        node: Node<'a, 'input>,
        scope: ScopeId,
        xpath: &str,
        parent_stmt: Option<StatementId>,
    ) -> Result<()> {
        let loc = self.location(node, xpath);
        let stmt = self
            .graph
            .add_statement(scope, parent_stmt, StatementKind::Expr, loc);
        self.lower_expr_children(node, ExpressionParent::Statement(stmt), xpath, scope);
        Ok(())
    }

    fn lower_control(
        &mut self,
        node: Node<'a, 'input>,
        tag: &str,
        scope: ScopeId,
        xpath: &str,
        parent_stmt: Option<StatementId>,
    ) -> Result<()> {
        let kind = match tag {
            "if_stmt" | "if" | "else" => StatementKind::If,
            "for" | "foreach" => StatementKind::For,
            "while" | "do" => StatementKind::While,
            "switch" => StatementKind::Switch,
            "try" | "finally" => StatementKind::Try,
            "catch" => StatementKind::Catch,
            _ => StatementKind::Expr,
        };
        let loc = self.location(node, xpath);
        let stmt = self.graph.add_statement(scope, parent_stmt, kind, loc);
        self.walk_control_children(node, scope, xpath, stmt)
    }

    fn walk_control_children(
        &mut self,
        node: Node<'a, 'input>,
        scope: ScopeId,
        base: &str,
        stmt: StatementId,
    ) -> Result<()> {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for child in node.children().filter(|c| c.is_element()) {
            let tag = child.tag_name().name();
            let index = counts.entry(tag).or_insert(0);
            *index += 1;
            let xpath = format!("{}/{}[{}]", base, tag, index);

            match tag {
                "block" => {
                    let loc = self.location(child, &xpath);
                    let body = self
                        .graph
                        .add_scope(scope, ScopeKind::Block, Some(loc));
                    self.walk_scope_level(child, body, &xpath, None)?;
                }
                "condition" | "control" | "init" | "incr" | "expr" => {
                    self.lower_expr_children(
                        child,
                        ExpressionParent::Statement(stmt),
                        &xpath,
                        scope,
                    );
                }
                "decl_stmt" => self.lower_decl_stmt(child, scope, &xpath, Some(stmt))?,
                "expr_stmt" | "return" => self.lower_expr_stmt(child, scope, &xpath, Some(stmt))?,
                "if_stmt" | "if" | "else" | "for" | "foreach" | "while" | "do" | "switch"
                | "try" | "catch" | "finally" => {
                    self.lower_control(child, tag, scope, &xpath, Some(stmt))?
                }
                _ => self.walk_control_children(child, scope, &xpath, stmt)?,
            }
        }
        Ok(())
    }

    // ── Expressions ─────────────────────────────────────────────────────

    /// Lower all expression-bearing element children of `node`, returning
    /// the produced top-level expression ids in source order.
    fn lower_expr_children(
        &mut self,
        node: Node<'a, 'input>,
        parent: ExpressionParent,
        base: &str,
        scope: ScopeId,
    ) -> Vec<ExpressionId> {
        let mut out = Vec::new();
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for child in node.children().filter(|c| c.is_element()) {
            let tag = child.tag_name().name();
            let index = counts.entry(tag).or_insert(0);
            *index += 1;
            let xpath = format!("{}/{}[{}]", base, tag, index);
            out.extend(self.lower_expr_node(child, tag, parent, &xpath, scope));
        }
        out
    }

    fn lower_expr_node(
        &mut self,
        node: Node<'a, 'input>,
        tag: &str,
        parent: ExpressionParent,
        xpath: &str,
        scope: ScopeId,
    ) -> Vec<ExpressionId> {
        match tag {
            "name" => self
                .build_name_expr(node, parent, xpath)
                .into_iter()
                .collect(),
            "operator" => {
                let loc = self.location(node, xpath);
                vec![self.graph.add_expression(
                    parent,
                    ExpressionKind::Operator {
                        text: Self::full_text(node),
                    },
                    loc,
                )]
            }
            "literal" => {
                let loc = self.location(node, xpath);
                vec![self.graph.add_expression(
                    parent,
                    ExpressionKind::Literal {
                        text: Self::full_text(node),
                    },
                    loc,
                )]
            }
            "call" => self.lower_call(node, parent, xpath, scope),
            // `expr` wrappers and anything unrecognized are transparent
            _ => self.lower_expr_children(node, parent, xpath, scope),
        }
    }

    /// A possibly-compound name. `A.B.C` becomes a name use `C` whose
    /// prefix chain holds `B` then `A`, resolving left to right.
    fn build_name_expr(
        &mut self,
        node: Node<'a, 'input>,
        parent: ExpressionParent,
        xpath: &str,
    ) -> Option<ExpressionId> {
        let segments = Self::name_segments(node);
        let loc = self.location(node, xpath);

        if segments.is_empty() {
            let text = Self::full_text(node);
            if text.is_empty() {
                return None;
            }
            return Some(self.graph.add_expression(
                parent,
                ExpressionKind::Name {
                    name: text,
                    prefix: None,
                },
                loc,
            ));
        }

        let last = segments.last()?;
        let use_id = self.graph.add_expression(
            parent,
            ExpressionKind::Name {
                name: Self::full_text(last.node),
                prefix: None,
            },
            loc.clone(),
        );
        let mut chain: Option<ExpressionId> = None;
        for segment in &segments[..segments.len() - 1] {
            let id = self.graph.alloc_expression(
                ExpressionParent::Expression(use_id),
                ExpressionKind::Name {
                    name: Self::full_text(segment.node),
                    prefix: chain,
                },
                loc.clone(),
            );
            chain = Some(id);
        }
        if let Some(prefix) = chain {
            self.graph.set_name_prefix(use_id, prefix);
        }
        Some(use_id)
    }

    /// A declared type: primitives become type uses, everything else a
    /// resolvable name use.
    fn build_type_expr(
        &mut self,
        node: Node<'a, 'input>,
        parent: ExpressionParent,
        xpath: &str,
    ) -> Option<ExpressionId> {
        let name_node = Self::child_element(node, "name")?;
        let text = Self::full_text(name_node);
        if PRIMITIVE_TYPES.contains(&text.as_str()) {
            let loc = self.location(node, xpath);
            return Some(self.graph.add_expression(
                parent,
                ExpressionKind::TypeUse { name: text },
                loc,
            ));
        }
        let name_xpath = self.child_xpath(node, xpath, name_node);
        self.build_name_expr(name_node, parent, &name_xpath)
    }

    /// A call. Qualified receivers (`obj.f()`) flatten into sibling
    /// name/operator expressions before the call itself, which is the
    /// shape the dotted-chain resolution rule walks.
    fn lower_call(
        &mut self,
        node: Node<'a, 'input>,
        parent: ExpressionParent,
        xpath: &str,
        scope: ScopeId,
    ) -> Vec<ExpressionId> {
        let Some(name_node) = Self::child_element(node, "name") else {
            return Vec::new();
        };
        let loc = self.location(node, xpath);
        let segments = Self::name_segments(name_node);
        let mut produced = Vec::new();

        let (call_name, target_hint) = if segments.is_empty() {
            (Self::full_text(name_node), None)
        } else {
            let mut leading = Vec::new();
            for segment in &segments[..segments.len() - 1] {
                let text = Self::full_text(segment.node);
                produced.push(self.graph.add_expression(
                    parent,
                    ExpressionKind::Name {
                        name: text.clone(),
                        prefix: None,
                    },
                    loc.clone(),
                ));
                produced.push(self.graph.add_expression(
                    parent,
                    ExpressionKind::Operator {
                        text: segment.separator_after.clone(),
                    },
                    loc.clone(),
                ));
                leading.push(text);
            }
            let last = Self::full_text(segments[segments.len() - 1].node);
            let hint = (!leading.is_empty()).then(|| leading.join("."));
            (last, hint)
        };

        let call_id = self.graph.add_expression(
            parent,
            ExpressionKind::Call {
                name: call_name.clone(),
            },
            loc.clone(),
        );
        produced.push(call_id);

        let mut arguments = Vec::new();
        if let Some(args) = Self::child_element(node, "argument_list") {
            let args_xpath = self.child_xpath(node, xpath, args);
            let mut index = 0;
            for arg in args
                .children()
                .filter(|c| c.is_element() && c.tag_name().name() == "argument")
            {
                index += 1;
                let arg_xpath = format!("{}/argument[{}]", args_xpath, index);
                arguments.extend(self.lower_expr_children(
                    arg,
                    ExpressionParent::Expression(call_id),
                    &arg_xpath,
                    scope,
                ));
            }
        }

        if let Some(s) = self.graph.scope_mut(scope) {
            s.calls.push(MethodCall {
                name: call_name,
                arguments,
                target: target_hint,
                location: loc,
            });
        }
        produced
    }

    /// Sub-name segments of a compound name, with the separator text
    /// following each segment (`.`, `->`, or `::`).
    fn name_segments(node: Node<'a, 'input>) -> Vec<NameSegment<'a, 'input>> {
        let mut out: Vec<NameSegment> = Vec::new();
        for child in node.children() {
            if child.is_element() && child.tag_name().name() == "name" {
                out.push(NameSegment {
                    node: child,
                    separator_after: ".".to_string(),
                });
            } else if let Some(last) = out.last_mut() {
                let text = if child.is_element() && child.tag_name().name() == "operator" {
                    Self::full_text(child)
                } else if child.is_text() {
                    child.text().unwrap_or("").trim().to_string()
                } else {
                    String::new()
                };
                if matches!(text.as_str(), "." | "->" | "::") {
                    last.separator_after = text;
                }
            }
        }
        out
    }
}

struct NameSegment<'a, 'input> {
    node: Node<'a, 'input>,
    separator_after: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::model::ScopeKindTag;
    use crate::scope::resolver::{Match, Resolver};

    fn parse(path: &str, language: Language, xml: &str) -> ScopeGraph {
        lower_unit(&FileUnit::new(path, xml), language).unwrap()
    }

    fn named(g: &ScopeGraph, parent: ScopeId, name: &str) -> Option<ScopeId> {
        g.named_children(parent, name, None).next()
    }

    #[test]
    fn test_cpp_namespace_class_method() {
        let g = parse(
            "a.cpp",
            Language::Cpp,
            r#"<unit language="C++" filename="a.cpp">
<namespace>namespace <name>N</name> <block>{
<class>class <name>C</name> <block>{
<function><type><name>void</name></type> <name>m</name><parameter_list>(<parameter><decl><type><name>int</name></type> <name>x</name></decl></parameter>)</parameter_list> <block>{
<expr_stmt><expr><call><name>f</name><argument_list>(<argument><expr><literal>1</literal></expr></argument>)</argument_list></call></expr>;</expr_stmt>
}</block></function>
}</block>;</class>
}</block></namespace>
</unit>"#,
        );

        let ns = named(&g, g.root(), "N").expect("namespace");
        let ty = named(&g, ns, "C").expect("class");
        let m = named(&g, ty, "m").expect("method");

        let method = g.scope(m).unwrap();
        assert_eq!(method.kind.signature(), Some("int"));
        // the parameter is a declaration of the method scope
        assert_eq!(method.declarations.len(), 1);
        assert_eq!(method.declarations[0].name, "x");
        // the call was recorded on the method scope
        assert_eq!(method.calls.len(), 1);
        assert_eq!(method.calls[0].name, "f");
        assert_eq!(method.calls[0].arguments.len(), 1);

        assert_eq!(g.qualified_name(m).unwrap(), "N::C::m");
        assert_eq!(g.language_of("a.cpp"), Some(Language::Cpp));
        g.verify().unwrap();
    }

    #[test]
    fn test_java_package_and_import() {
        let g = parse(
            "X.java",
            Language::Java,
            r#"<unit language="Java" filename="X.java">
<package>package <name><name>a</name>.<name>b</name></name>;</package>
<import>import <name><name>a</name>.<name>c</name></name>.*;</import>
<class>class <name>X</name> <block>{
<function><type><name>void</name></type> <name>m</name><parameter_list>()</parameter_list> <block>{
<decl_stmt><decl><type><name>Y</name></type> <name>y</name></decl>;</decl_stmt>
}</block></function>
}</block></class>
</unit>"#,
        );

        // package a.b nests the class
        let a = named(&g, g.root(), "a").expect("package a");
        let b = named(&g, a, "b").expect("package b");
        let x = named(&g, b, "X").expect("class X");
        assert_eq!(g.qualified_name(x).unwrap(), "a::b::X");

        // the import statement lives at the unit's top scope (the package)
        let top = g.scope(b).unwrap();
        assert_eq!(top.statements.len(), 1);
        let import = g.statement(top.statements[0]).unwrap();
        assert!(matches!(import.kind, StatementKind::Import));
        // its target is the compound name a.c
        let target = g.expression(import.expressions[0]).unwrap();
        assert!(
            matches!(&target.kind, ExpressionKind::Name { name, prefix } if name == "c" && prefix.is_some())
        );
    }

    #[test]
    fn test_csharp_using_alias() {
        let g = parse(
            "a.cs",
            Language::CSharp,
            r#"<unit language="C#" filename="a.cs">
<using>using <name>F</name> = <name><name>A</name>.<name>B</name></name>;</using>
<namespace>namespace <name>A</name> <block>{
<class>class <name>B</name> <block>{ }</block></class>
}</block></namespace>
</unit>"#,
        );

        let root = g.scope(g.root()).unwrap();
        let alias = g.statement(root.statements[0]).unwrap();
        assert!(matches!(&alias.kind, StatementKind::Alias { alias } if alias == "F"));
    }

    #[test]
    fn test_two_units_coalesce_and_remove() {
        let unit = |file: &str| {
            parse(
                file,
                Language::Cpp,
                &format!(
                    r#"<unit language="C++" filename="{file}">
<namespace>namespace <name>N</name> <block>{{
<class>class <name>C</name> <block>{{ }}</block>;</class>
}}</block></namespace>
</unit>"#
                ),
            )
        };

        let mut g = ScopeGraph::new();
        g.merge(unit("file1.cpp"));
        g.merge(unit("file2.cpp"));

        // one namespace and one type, each contributed by both files
        let ns = named(&g, g.root(), "N").expect("one namespace");
        assert_eq!(g.scope(ns).unwrap().locations.len(), 2);
        let ty = named(&g, ns, "C").expect("one type");
        assert_eq!(g.scope(ty).unwrap().locations.len(), 2);
        assert_eq!(g.qualified_name(ty).unwrap(), "N::C");

        // dropping file1 keeps both, each with file2's location only
        g.remove_file("file1.cpp");
        let ns = named(&g, g.root(), "N").expect("namespace survives");
        let ns_scope = g.scope(ns).unwrap();
        assert_eq!(ns_scope.locations.len(), 1);
        assert_eq!(ns_scope.primary_location().unwrap().file_path, "file2.cpp");
        let ty = named(&g, ns, "C").expect("type survives");
        assert_eq!(g.scope(ty).unwrap().locations.len(), 1);
        g.verify().unwrap();
    }

    #[test]
    fn test_extern_contents_are_transparent() {
        let g = parse(
            "a.c",
            Language::C,
            r#"<unit language="C" filename="a.c">
<extern>extern <literal type="string">"C"</literal> <block>{
<function_decl><type><name>void</name></type> <name>foo</name><parameter_list>()</parameter_list>;</function_decl>
}</block></extern>
</unit>"#,
        );

        // foo is a direct child of the program scope, not of an extern node
        let foo = named(&g, g.root(), "foo").expect("extern contents visible");
        assert_eq!(g.scope(foo).unwrap().kind.tag(), ScopeKindTag::Method);

        // the linkage statement is retained with its tag
        let root = g.scope(g.root()).unwrap();
        let stmt = g.statement(root.statements[0]).unwrap();
        assert!(matches!(&stmt.kind, StatementKind::Extern { linkage } if linkage == "C"));
    }

    #[test]
    fn test_extern_declaration_merges_with_definition() {
        // spec scenario: extern "C" declaration in one file, definition in
        // another; one method with two locations, extern retained
        let decl = parse(
            "a.c",
            Language::C,
            r#"<unit language="C" filename="a.c">
<extern>extern <literal type="string">"C"</literal> <block>{
<function_decl><type><name>void</name></type> <name>foo</name><parameter_list>()</parameter_list>;</function_decl>
}</block></extern>
</unit>"#,
        );
        let def = parse(
            "b.c",
            Language::C,
            r#"<unit language="C" filename="b.c">
<function><type><name>void</name></type> <name>foo</name><parameter_list>()</parameter_list> <block>{ }</block></function>
</unit>"#,
        );

        let mut g = ScopeGraph::new();
        g.merge(decl);
        g.merge(def);

        let foo = named(&g, g.root(), "foo").expect("merged method");
        assert_eq!(g.scope(foo).unwrap().locations.len(), 2);
        assert_eq!(g.named_children(g.root(), "foo", None).count(), 1);

        let root = g.scope(g.root()).unwrap();
        let externs: Vec<_> = root
            .statements
            .iter()
            .filter_map(|s| g.statement(*s))
            .filter(|s| matches!(&s.kind, StatementKind::Extern { linkage } if linkage == "C"))
            .collect();
        assert_eq!(externs.len(), 1);
        g.verify().unwrap();
    }

    #[test]
    fn test_wildcard_import_resolution_end_to_end() {
        // spec scenario: Y in class X resolves through `import a.c.*;`
        let lib = parse(
            "Y.java",
            Language::Java,
            r#"<unit language="Java" filename="Y.java">
<package>package <name><name>a</name>.<name>c</name></name>;</package>
<class>class <name>Y</name> <block>{ }</block></class>
</unit>"#,
        );
        let user = parse(
            "X.java",
            Language::Java,
            r#"<unit language="Java" filename="X.java">
<package>package <name><name>a</name>.<name>b</name></name>;</package>
<import>import <name><name>a</name>.<name>c</name></name>.*;</import>
<class>class <name>X</name> <block>{
<function><type><name>void</name></type> <name>m</name><parameter_list>()</parameter_list> <block>{
<decl_stmt><decl><type><name>Y</name></type> <name>y</name></decl>;</decl_stmt>
}</block></function>
}</block></class>
</unit>"#,
        );

        let mut g = ScopeGraph::new();
        g.merge(lib);
        g.merge(user);

        // find the Y name use: the declared type of y in X.m
        let a = named(&g, g.root(), "a").unwrap();
        let b = named(&g, a, "b").unwrap();
        let x = named(&g, b, "X").unwrap();
        let m = named(&g, x, "m").unwrap();
        let method = g.scope(m).unwrap();
        let use_y = method.declarations[0].type_expr.expect("type name use");

        let c = named(&g, a, "c").unwrap();
        let y = named(&g, c, "Y").unwrap();

        let matches = Resolver::new(&g).find_matches(use_y).unwrap();
        assert_eq!(matches.first(), Some(&Match::Scope(y)));
    }

    #[test]
    fn test_dotted_call_resolution_end_to_end() {
        // spec scenario: this.f() inside T resolves to T's field f
        let g = parse(
            "T.cs",
            Language::CSharp,
            r#"<unit language="C#" filename="T.cs">
<class>class <name>T</name> <block>{
<decl_stmt><decl><type><name>int</name></type> <name>f</name></decl>;</decl_stmt>
<function><type><name>void</name></type> <name>m</name><parameter_list>()</parameter_list> <block>{
<expr_stmt><expr><call><name><name>this</name><operator>.</operator><name>f</name></name><argument_list>()</argument_list></call></expr>;</expr_stmt>
}</block></function>
}</block></class>
</unit>"#,
        );

        let t = named(&g, g.root(), "T").unwrap();
        let m = named(&g, t, "m").unwrap();
        let method = g.scope(m).unwrap();

        // the call was recorded with its receiver hint
        assert_eq!(method.calls.len(), 1);
        assert_eq!(method.calls[0].name, "f");
        assert_eq!(method.calls[0].target.as_deref(), Some("this"));

        // resolve the call expression: T's field f
        let stmt = g.statement(method.statements[0]).unwrap();
        let call_id = *stmt.expressions.last().unwrap();
        let matches = Resolver::new(&g).find_matches(call_id).unwrap();
        assert_eq!(
            matches.first(),
            Some(&Match::Variable { scope: t, index: 0 })
        );

        // `this` itself resolves to T
        let this_id = stmt.expressions[0];
        let matches = Resolver::new(&g).find_matches(this_id).unwrap();
        assert_eq!(matches, vec![Match::Scope(t)]);
    }

    #[test]
    fn test_type_definition_without_name_fails_whole_unit() {
        let err = lower_unit(
            &FileUnit::new(
                "a.cpp",
                r#"<unit language="C++"><class>class <block>{ }</block></class></unit>"#,
            ),
            Language::Cpp,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));
    }
}
