//! Scope graph: data model, merge algebra, and name resolution
//!
//! The graph is an arena of scopes, statements, and expressions with typed
//! index ids. Owning edges are the arena maps plus ordered child-id
//! vectors; parent edges are plain ids, so serialization traverses only
//! owning data and cycles cannot arise from references.

pub mod graph;
pub mod merge;
pub mod model;
pub mod resolver;

pub use graph::{GraphStats, ScopeGraph};
pub use model::{
    Expression, ExpressionId, ExpressionKind, ExpressionParent, MethodCall, Scope, ScopeId,
    ScopeKind, ScopeKindTag, Statement, StatementId, StatementKind, VariableDeclaration,
};
pub use resolver::{Match, Resolver};
