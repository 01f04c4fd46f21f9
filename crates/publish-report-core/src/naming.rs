//! Display names for published reports.
//!
//! A step may receive several input patterns, each matching several
//! sources. Names are disambiguated by position so the viewer can show one
//! tab per report:
//!
//! | Patterns (P) | Sources (S) | Name |
//! |--------------|-------------|------|
//! | `> 1` | `> 1` | `"{p+1}.{s+1}-{base}"` |
//! | `<= 1` | `> 1` | `"{s+1}-{base}"` |
//! | any | `1` | `"{base}"` |
//!
//! The name is the attachment file stem; the publisher adds `.html`.

use std::collections::HashSet;

/// Base name used when no user-supplied name lines up with a pattern.
pub const DEFAULT_BASE_NAME: &str = "Report";

/// Compute the positional display name for one source.
///
/// `pattern_index` and `source_index` are 0-based. `base` is trimmed.
pub fn positional_name(
    pattern_count: usize,
    pattern_index: usize,
    source_count: usize,
    source_index: usize,
    base: &str,
) -> String {
    let base = base.trim();
    if pattern_count > 1 && source_count > 1 {
        format!("{}.{}-{}", pattern_index + 1, source_index + 1, base)
    } else if source_count > 1 {
        format!("{}-{}", source_index + 1, base)
    } else {
        base.to_string()
    }
}

/// Allocates unique display names across one publishing run.
#[derive(Debug, Clone)]
pub struct NameAllocator {
    pattern_count: usize,
    bases: Vec<String>,
    used: HashSet<String>,
}

impl NameAllocator {
    /// `bases` are the user-supplied names, positionally aligned with the
    /// `pattern_count` input patterns. Missing or blank entries fall back to
    /// [`DEFAULT_BASE_NAME`].
    pub fn new(pattern_count: usize, bases: Vec<String>) -> Self {
        Self {
            pattern_count,
            bases,
            used: HashSet::new(),
        }
    }

    /// Base name for the pattern at `pattern_index`.
    pub fn base_for(&self, pattern_index: usize) -> &str {
        self.bases
            .get(pattern_index)
            .map(|b| b.trim())
            .filter(|b| !b.is_empty())
            .unwrap_or(DEFAULT_BASE_NAME)
    }

    /// Allocate the name for source `source_index` of `source_count` matched
    /// by pattern `pattern_index`.
    ///
    /// A name already handed out in this run gets a `-{n}` suffix with the
    /// smallest unused `n >= 2`.
    pub fn allocate(
        &mut self,
        pattern_index: usize,
        source_count: usize,
        source_index: usize,
    ) -> String {
        let base = self.base_for(pattern_index).to_string();
        let name = positional_name(
            self.pattern_count,
            pattern_index,
            source_count,
            source_index,
            &base,
        );
        if self.used.insert(name.clone()) {
            return name;
        }
        let mut n = 2;
        loop {
            let candidate = format!("{}-{}", name, n);
            if self.used.insert(candidate.clone()) {
                tracing::warn!(report = %name, renamed = %candidate, "duplicate report name");
                return candidate;
            }
            n += 1;
        }
    }

    /// Number of names handed out so far.
    pub fn allocated(&self) -> usize {
        self.used.len()
    }
}
