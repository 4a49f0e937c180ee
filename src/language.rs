//! Language tags for file units
//!
//! Each file unit's root element carries a `language` attribute naming the
//! source language the markup was produced from. The repository dispatches
//! to a registered parser by this tag, and name resolution consults it for
//! the `this`/`base`/`super` keyword rules.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Source languages with registered lowering support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Language {
    C,
    Cpp,
    Java,
    CSharp,
}

impl Language {
    /// The tag as it appears in a file unit's `language` attribute.
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::C => "C",
            Language::Cpp => "C++",
            Language::Java => "Java",
            Language::CSharp => "C#",
        }
    }

    /// All supported languages
    pub fn all() -> &'static [Language] {
        &[Language::C, Language::Cpp, Language::Java, Language::CSharp]
    }

    /// Map a file unit's `language` attribute to a language tag.
    ///
    /// Only the exact producer-emitted values are recognized here; anything
    /// else is an unknown language and the unit is skipped (or reported,
    /// in strict mode).
    pub fn from_unit_attr(attr: &str) -> Option<Language> {
        match attr {
            "C" => Some(Language::C),
            "C++" => Some(Language::Cpp),
            "Java" => Some(Language::Java),
            "C#" => Some(Language::CSharp),
            _ => None,
        }
    }
}

impl FromStr for Language {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "c" => Ok(Language::C),
            "c++" | "cpp" | "cxx" => Ok(Language::Cpp),
            "java" => Ok(Language::Java),
            "c#" | "csharp" | "cs" => Ok(Language::CSharp),
            _ => Err(Error::UnknownLanguage(s.to_string())),
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_attr_roundtrip() {
        for lang in Language::all() {
            assert_eq!(Language::from_unit_attr(lang.as_str()), Some(*lang));
        }
        assert_eq!(Language::from_unit_attr("Objective-C"), None);
    }

    #[test]
    fn test_from_str_aliases() {
        assert_eq!(Language::from_str("cpp").unwrap(), Language::Cpp);
        assert_eq!(Language::from_str("csharp").unwrap(), Language::CSharp);
        assert_eq!(Language::from_str("JAVA").unwrap(), Language::Java);
        assert!(Language::from_str("cobol").is_err());
    }
}
