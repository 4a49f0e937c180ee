//! Graph entities: scopes, statements, expressions, declarations, calls
//!
//! The node kinds form a small, closed set. Adding a variant is a breaking
//! change by design; every traversal dispatches with exhaustive matches.

use crate::location::Location;
use serde::{Deserialize, Serialize};

/// Unique identifier for a scope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScopeId(pub u32);

impl ScopeId {
    /// The id of the unique Program root
    pub fn root() -> Self {
        Self(0)
    }
}

/// Unique identifier for a statement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StatementId(pub u32);

/// Unique identifier for an expression
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExpressionId(pub u32);

/// The kind of a scope, carrying the name it introduces (if any).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScopeKind {
    /// Unique root; container for top-level declarations across all files
    Program,
    /// `namespace N { ... }` / `package a.b;`
    Namespace { name: String },
    /// Class, struct, interface, or enum definition. `supers` lists the
    /// declared base type names in source order.
    Type { name: String, supers: Vec<String> },
    /// Function, method, constructor, or destructor definition. The
    /// signature is the comma-joined parameter type list.
    Method { name: String, signature: String },
    /// C# property definition
    Property { name: String },
    /// Lexical block with no introduced name
    Block,
}

/// Kind discriminant without payload, for kind-filtered queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScopeKindTag {
    Program,
    Namespace,
    Type,
    Method,
    Property,
    Block,
}

impl ScopeKind {
    /// The introduced simple name, if this is a named scope.
    pub fn name(&self) -> Option<&str> {
        match self {
            ScopeKind::Program | ScopeKind::Block => None,
            ScopeKind::Namespace { name }
            | ScopeKind::Type { name, .. }
            | ScopeKind::Method { name, .. }
            | ScopeKind::Property { name } => Some(name),
        }
    }

    /// The signature participating in merge identity (methods only).
    pub fn signature(&self) -> Option<&str> {
        match self {
            ScopeKind::Method { signature, .. } => Some(signature),
            _ => None,
        }
    }

    pub fn is_named(&self) -> bool {
        self.name().is_some()
    }

    pub fn tag(&self) -> ScopeKindTag {
        match self {
            ScopeKind::Program => ScopeKindTag::Program,
            ScopeKind::Namespace { .. } => ScopeKindTag::Namespace,
            ScopeKind::Type { .. } => ScopeKindTag::Type,
            ScopeKind::Method { .. } => ScopeKindTag::Method,
            ScopeKind::Property { .. } => ScopeKindTag::Property,
            ScopeKind::Block => ScopeKindTag::Block,
        }
    }

    /// Merge identity: same kind, same name, same signature. Declared
    /// supertypes do not participate (a forward declaration and the full
    /// definition coalesce; their super lists union).
    pub fn same_identity(&self, other: &ScopeKind) -> bool {
        self.tag() == other.tag()
            && self.name() == other.name()
            && self.signature() == other.signature()
    }
}

/// A scope node: ordered children, declarations, calls, statements, and
/// the set of locations contributed by each file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scope {
    pub kind: ScopeKind,
    /// Back-reference; `None` only for the Program root
    pub parent: Option<ScopeId>,
    /// Sorted ascending; the first entry is the primary location
    pub locations: Vec<Location>,
    /// Child scopes in source order, cross-file interleaved by primary location
    pub children: Vec<ScopeId>,
    /// Variable declarations, never coalesced across files
    pub declarations: Vec<VariableDeclaration>,
    /// Method calls occurring directly in this scope, never coalesced
    pub calls: Vec<MethodCall>,
    /// Child statements in source order
    pub statements: Vec<StatementId>,
}

impl Scope {
    pub fn new(kind: ScopeKind, parent: Option<ScopeId>, location: Option<Location>) -> Self {
        Self {
            kind,
            parent,
            locations: location.into_iter().collect(),
            children: Vec::new(),
            declarations: Vec::new(),
            calls: Vec::new(),
            statements: Vec::new(),
        }
    }

    /// The lexically smallest of this scope's locations.
    pub fn primary_location(&self) -> Option<&Location> {
        self.locations.first()
    }

    /// Insert a location keeping the set sorted and de-duplicated.
    pub fn add_location(&mut self, location: Location) {
        match self.locations.binary_search(&location) {
            Ok(_) => {}
            Err(pos) => self.locations.insert(pos, location),
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.kind.name()
    }
}

/// The kind of a statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatementKind {
    /// Plain expression statement
    Expr,
    /// Variable declaration statement; the declarations live on the scope
    Declaration,
    /// `import a.b;` / `using N;` — the imported namespace is the
    /// statement's first expression
    Import,
    /// `using F = A.B;` — the target is the first expression
    Alias { alias: String },
    /// `extern "C" { ... }` — contents are lowered into the enclosing
    /// scope (linkage is transparent to name lookup); the statement is
    /// retained for round-tripping
    Extern { linkage: String },
    If,
    For,
    While,
    Switch,
    Try,
    Catch,
    /// A bare block in statement position; the body is a child scope
    Block { body: ScopeId },
}

impl StatementKind {
    /// Short tag for display; payloads are intentionally omitted.
    pub fn label(&self) -> &'static str {
        match self {
            StatementKind::Expr => "expr",
            StatementKind::Declaration => "decl",
            StatementKind::Import => "import",
            StatementKind::Alias { .. } => "alias",
            StatementKind::Extern { .. } => "extern",
            StatementKind::If => "if",
            StatementKind::For => "for",
            StatementKind::While => "while",
            StatementKind::Switch => "switch",
            StatementKind::Try => "try",
            StatementKind::Catch => "catch",
            StatementKind::Block { .. } => "block",
        }
    }
}

/// A statement: owned by a scope, optionally nested under another
/// statement, holding its child expressions in source order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statement {
    pub kind: StatementKind,
    /// The scope whose statement list holds this statement
    pub scope: ScopeId,
    /// Enclosing statement, if nested (e.g. a declaration in a for-init)
    pub parent: Option<StatementId>,
    /// Child expressions in source order
    pub expressions: Vec<ExpressionId>,
    pub location: Location,
}

/// What owns an expression: a statement or an enclosing expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExpressionParent {
    Statement(StatementId),
    Expression(ExpressionId),
}

/// The kind of an expression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExpressionKind {
    /// An occurrence of a name that resolution can be asked about. The
    /// prefix is the qualification chain (`A.B` in `A.B.C`), itself a
    /// name expression resolving left-to-right.
    Name {
        name: String,
        prefix: Option<ExpressionId>,
    },
    /// Operator text, e.g. `.`, `->`, `::`, `=`, `+`
    Operator { text: String },
    /// A call in expression position; arguments are the children
    Call { name: String },
    Literal { text: String },
    /// A type name in use position (declared types, casts)
    TypeUse { name: String },
}

/// An expression node in a statement's expression tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expression {
    pub kind: ExpressionKind,
    pub parent: ExpressionParent,
    /// Sub-expressions in source order
    pub children: Vec<ExpressionId>,
    pub location: Location,
}

impl Expression {
    /// The name this expression contributes to resolution, if any.
    pub fn name(&self) -> Option<&str> {
        match &self.kind {
            ExpressionKind::Name { name, .. } | ExpressionKind::Call { name } => Some(name),
            _ => None,
        }
    }
}

/// A variable declaration held by a scope.
///
/// Declarations are never coalesced across files: the C/C++ pattern of a
/// forward declaration in every translation unit keeps one entry per
/// contributing file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableDeclaration {
    pub name: String,
    /// Declared-type expression, when the markup carries one
    pub type_expr: Option<ExpressionId>,
    /// Initializer expression, when present
    pub init_expr: Option<ExpressionId>,
    pub location: Location,
}

/// A method call held by a scope, in source order. Never coalesced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodCall {
    pub name: String,
    /// Argument expressions in source order
    pub arguments: Vec<ExpressionId>,
    /// Receiver text when the call is qualified (`obj` in `obj.f()`),
    /// recorded as a resolution hint
    pub target: Option<String>,
    pub location: Location,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_kind_identity() {
        let a = ScopeKind::Type {
            name: "C".into(),
            supers: vec![],
        };
        let b = ScopeKind::Type {
            name: "C".into(),
            supers: vec!["Base".into()],
        };
        let c = ScopeKind::Namespace { name: "C".into() };

        // supers do not participate in identity; kind does
        assert!(a.same_identity(&b));
        assert!(!a.same_identity(&c));
    }

    #[test]
    fn test_method_identity_includes_signature() {
        let a = ScopeKind::Method {
            name: "f".into(),
            signature: "int".into(),
        };
        let b = ScopeKind::Method {
            name: "f".into(),
            signature: "int,char".into(),
        };
        let c = ScopeKind::Method {
            name: "f".into(),
            signature: "int".into(),
        };

        assert!(!a.same_identity(&b));
        assert!(a.same_identity(&c));
    }

    #[test]
    fn test_primary_location_is_minimum() {
        let mut scope = Scope::new(
            ScopeKind::Namespace { name: "N".into() },
            Some(ScopeId::root()),
            Some(Location::new("b.cpp", "/unit[1]/namespace[1]", 1, 1, 3)),
        );
        scope.add_location(Location::new("a.cpp", "/unit[1]/namespace[1]", 7, 1, 3));

        assert_eq!(scope.locations.len(), 2);
        assert_eq!(scope.primary_location().unwrap().file_path, "a.cpp");
    }

    #[test]
    fn test_duplicate_locations_deduplicate() {
        let loc = Location::new("a.cpp", "/unit[1]/class[1]", 2, 1, 4);
        let mut scope = Scope::new(
            ScopeKind::Type {
                name: "C".into(),
                supers: vec![],
            },
            Some(ScopeId::root()),
            Some(loc.clone()),
        );
        scope.add_location(loc);

        assert_eq!(scope.locations.len(), 1);
    }
}
