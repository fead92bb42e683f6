//! Parse cache keyed by exact formula text

use std::sync::Arc;

use ahash::AHashMap;

use crate::error::FormulaResult;
use crate::parser::{parse, ParseLimits, ParsedFormula};

/// Shares one parsed tree between every cell with identical formula text
///
/// Fatal parse results are never cached, so the same text fails again on
/// the next attempt instead of being remembered as broken.
#[derive(Debug, Default)]
pub struct FormulaCache {
    entries: AHashMap<Arc<str>, Arc<ParsedFormula>>,
    hits: u64,
    misses: u64,
}

/// Hit/miss counters of a [`FormulaCache`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}

impl FormulaCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parsed form of `text`, parsing it on first use
    pub fn get_or_parse(&mut self, text: &str, limits: &ParseLimits) -> FormulaResult<Arc<ParsedFormula>> {
        if let Some(parsed) = self.entries.get(text) {
            self.hits += 1;
            return Ok(Arc::clone(parsed));
        }

        self.misses += 1;
        let parsed = Arc::new(parse(text, limits)?);
        self.entries.insert(Arc::clone(&parsed.text), Arc::clone(&parsed));
        Ok(parsed)
    }

    pub fn get(&self, text: &str) -> Option<Arc<ParsedFormula>> {
        self.entries.get(text).cloned()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            hits: self.hits,
            misses: self.misses,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
