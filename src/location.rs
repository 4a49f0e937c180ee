//! Source locations - stable positions into file-unit markup
//!
//! Every node in the scope graph carries one or more locations. A location
//! names an element of one file unit by file path, XPath into the unit,
//! and start line/column. Locations order by file path (lexicographic),
//! then start line, then start column; the smallest location in a node's
//! set is the node's primary location.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// A position within one file unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    /// File path the unit was produced from, relative to the ingest root
    pub file_path: String,
    /// XPath of the element within the unit, e.g. `/unit[1]/class[1]`
    pub xpath: String,
    /// Starting line (1-indexed)
    pub start_line: u32,
    /// Starting column (1-indexed)
    pub start_column: u32,
    /// Number of source lines the element spans (at least 1)
    pub length: u32,
}

impl Location {
    /// Create a new location
    pub fn new(
        file_path: impl Into<String>,
        xpath: impl Into<String>,
        start_line: u32,
        start_column: u32,
        length: u32,
    ) -> Self {
        Self {
            file_path: file_path.into(),
            xpath: xpath.into(),
            start_line,
            start_column,
            length: length.max(1),
        }
    }

    /// Whether this location's element encloses the element at `xpath`.
    ///
    /// Prefix matching respects step boundaries, so `/unit[1]/class[1]`
    /// spans `/unit[1]/class[1]/block[1]` but not `/unit[1]/class[10]`.
    pub fn spans_xpath(&self, xpath: &str) -> bool {
        if xpath == self.xpath {
            return true;
        }
        xpath.starts_with(&self.xpath) && xpath.as_bytes().get(self.xpath.len()) == Some(&b'/')
    }

    /// Whether the given line/column falls within this location's span.
    pub fn contains_point(&self, line: u32, column: u32) -> bool {
        if line < self.start_line || line >= self.start_line + self.length {
            return false;
        }
        if line == self.start_line && column < self.start_column {
            return false;
        }
        true
    }
}

impl Ord for Location {
    fn cmp(&self, other: &Self) -> Ordering {
        self.file_path
            .cmp(&other.file_path)
            .then(self.start_line.cmp(&other.start_line))
            .then(self.start_column.cmp(&other.start_column))
            .then(self.xpath.cmp(&other.xpath))
            .then(self.length.cmp(&other.length))
    }
}

impl PartialOrd for Location {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{} ({})",
            self.file_path, self.start_line, self.start_column, self.xpath
        )
    }
}
