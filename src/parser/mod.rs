//! Parser plug-in surface
//!
//! A parser is a value keyed by [`Language`]. The registry inspects a file
//! unit's root `language` attribute and dispatches to the registered
//! parser, which lowers the unit into a per-file scope tree. Parsers hold
//! no global state and may run concurrently on distinct inputs.
//!
//! Units whose language has no registered parser produce
//! [`ParseOutcome::UnknownLanguage`]; whether that is silent or reported
//! is the repository's call.

pub mod srcml;

pub use srcml::{CParser, CSharpParser, CppParser, JavaParser};

use crate::language::Language;
use crate::scope::graph::ScopeGraph;
use crate::{Error, Result};
use std::collections::HashMap;

/// One file's syntactic markup, as produced by the external XML producer.
#[derive(Debug, Clone)]
pub struct FileUnit {
    /// File path relative to the ingest root
    pub path: String,
    /// The raw unit XML
    pub xml: String,
}

impl FileUnit {
    pub fn new(path: impl Into<String>, xml: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            xml: xml.into(),
        }
    }

    /// Read the unit root's `language` attribute. `None` means the
    /// attribute is missing or names no supported language.
    pub fn language_tag(&self) -> Result<Option<Language>> {
        let doc = roxmltree::Document::parse(&self.xml)
            .map_err(|e| Error::parse("/", e.to_string()))?;
        let root = doc.root_element();
        if root.tag_name().name() != "unit" {
            return Err(Error::parse(
                "/",
                format!("file unit root must be <unit>, found <{}>", root.tag_name().name()),
            ));
        }
        Ok(root.attribute("language").and_then(Language::from_unit_attr))
    }

    /// The raw `language` attribute text, for diagnostics.
    pub fn raw_language_attr(&self) -> Option<String> {
        let doc = roxmltree::Document::parse(&self.xml).ok()?;
        doc.root_element().attribute("language").map(str::to_string)
    }
}

/// Result of dispatching one file unit through the registry.
#[derive(Debug)]
pub enum ParseOutcome {
    /// A complete per-file scope tree, ready to merge
    Tree(ScopeGraph),
    /// No parser is registered for the unit's language tag
    UnknownLanguage(String),
}

/// Trait for language parsers
///
/// `parse_unit` must return a complete tree or an error; it never
/// produces a partial tree.
pub trait UnitParser: Send + Sync {
    /// The language this parser handles
    fn language(&self) -> Language;

    /// Lower a file unit into a per-file scope tree
    fn parse_unit(&self, unit: &FileUnit) -> Result<ScopeGraph>;
}

/// Registry of language parsers, installed once at construction.
pub struct ParserRegistry {
    parsers: HashMap<Language, Box<dyn UnitParser>>,
}

impl ParserRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            parsers: HashMap::new(),
        }
    }

    /// Register a parser under its language key
    pub fn register(&mut self, parser: impl UnitParser + 'static) {
        self.parsers.insert(parser.language(), Box::new(parser));
    }

    /// Find the parser for a language
    pub fn get(&self, language: Language) -> Option<&dyn UnitParser> {
        self.parsers.get(&language).map(|p| p.as_ref())
    }

    pub fn languages(&self) -> impl Iterator<Item = Language> + '_ {
        self.parsers.keys().copied()
    }

    /// Dispatch a unit to the parser its root attribute names.
    pub fn parse(&self, unit: &FileUnit) -> Result<ParseOutcome> {
        let Some(language) = unit.language_tag()? else {
            let tag = unit.raw_language_attr().unwrap_or_default();
            return Ok(ParseOutcome::UnknownLanguage(tag));
        };
        match self.get(language) {
            Some(parser) => parser.parse_unit(unit).map(ParseOutcome::Tree),
            None => Ok(ParseOutcome::UnknownLanguage(language.as_str().to_string())),
        }
    }
}

impl Default for ParserRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Create a registry with all built-in parsers
pub fn default_registry() -> ParserRegistry {
    let mut registry = ParserRegistry::new();
    registry.register(CParser);
    registry.register(CppParser);
    registry.register(JavaParser);
    registry.register(CSharpParser);
    registry
}
