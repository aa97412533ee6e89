use crate::tree::document::Document;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// Sink for human-readable reports (consolidation divergences).
pub type LogSink = Arc<dyn Fn(&str) + Send + Sync>;

/// Minimum-size thresholds guarding the correlated-hash fast path against
/// tiny coincidental matches. Empirically tuned; preserved as named defaults
/// so tests can vary them rather than hardcode the magic numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrelationThresholds {
    /// A run of exactly one matching group is accepted only above this many
    /// atoms per side.
    pub single_group_min_atoms: usize,
    /// A run of 2..=`short_run_max_groups` matching groups is accepted only
    /// above this many atoms per side.
    pub short_run_min_atoms: usize,
    /// Upper bound of the "short run" band; longer runs are always accepted.
    pub short_run_max_groups: usize,
}

impl Default for CorrelationThresholds {
    fn default() -> Self {
        Self {
            single_group_min_atoms: 16,
            short_run_min_atoms: 32,
            short_run_max_groups: 3,
        }
    }
}

/// Settings for document comparison.
#[derive(Clone)]
pub struct ComparerSettings {
    /// Characters that end a word during atom grouping.
    pub word_separators: Vec<char>,

    /// Compare text case-insensitively.
    pub case_insensitive: bool,

    /// Casing culture recorded for callers that need it; uppercasing itself
    /// uses Unicode default casing.
    pub culture: Option<String>,

    /// Minimum fraction of the shorter side that a candidate common run must
    /// cover to be accepted.
    pub detail_threshold: f64,

    /// Fast-path acceptance thresholds.
    pub thresholds: CorrelationThresholds,

    /// Author written on generated revision marks.
    pub author: Option<String>,

    /// ISO-8601 date written on generated revision marks; current time when
    /// unset.
    pub date: Option<String>,

    /// Optional sink for human-readable reports.
    pub log: Option<LogSink>,

    /// Cooperative cancellation flag, checked inside the quadratic LCS scan.
    pub cancel: Option<Arc<AtomicBool>>,
}

impl Default for ComparerSettings {
    fn default() -> Self {
        Self {
            word_separators: vec![' ', '-', ')', '(', ';', ','],
            case_insensitive: false,
            culture: None,
            detail_threshold: 0.15,
            thresholds: CorrelationThresholds::default(),
            author: None,
            date: None,
            log: None,
            cancel: None,
        }
    }
}

impl fmt::Debug for ComparerSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComparerSettings")
            .field("word_separators", &self.word_separators)
            .field("case_insensitive", &self.case_insensitive)
            .field("culture", &self.culture)
            .field("detail_threshold", &self.detail_threshold)
            .field("thresholds", &self.thresholds)
            .field("author", &self.author)
            .field("date", &self.date)
            .field("log", &self.log.as_ref().map(|_| "<sink>"))
            .field("cancel", &self.cancel.is_some())
            .finish()
    }
}

impl ComparerSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    pub fn with_date(mut self, date: impl Into<String>) -> Self {
        self.date = Some(date.into());
        self
    }

    pub fn with_case_insensitive(mut self, case_insensitive: bool) -> Self {
        self.case_insensitive = case_insensitive;
        self
    }

    pub fn with_detail_threshold(mut self, threshold: f64) -> Self {
        self.detail_threshold = threshold;
        self
    }

    pub fn with_word_separators(mut self, separators: Vec<char>) -> Self {
        self.word_separators = separators;
        self
    }

    pub fn with_log(mut self, log: LogSink) -> Self {
        self.log = Some(log);
        self
    }

    pub fn with_cancel(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn is_word_separator(&self, c: char) -> bool {
        self.word_separators.contains(&c)
    }

    pub(crate) fn report(&self, message: &str) {
        if let Some(log) = &self.log {
            log(message);
        }
    }
}

/// Settings for consolidating multiple revised documents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsolidateSettings {
    /// Render divergent revisions inside a distinguishing table block; when
    /// false, revisions are emitted inline after the anchor.
    pub use_table: bool,
}

impl Default for ConsolidateSettings {
    fn default() -> Self {
        Self { use_table: true }
    }
}

/// One revised copy fed to the consolidator.
#[derive(Debug, Clone)]
pub struct RevisedDocumentInfo {
    pub document: Document,
    pub revisor: String,
    /// RGB fill for this revisor's blocks in the consolidated output.
    pub color: (u8, u8, u8),
}

/// Kind of an extracted revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RevisionKind {
    Inserted,
    Deleted,
    InsertedRow,
    DeletedRow,
    ParagraphMarkInserted,
    ParagraphMarkDeleted,
}

/// One revision extracted from a compared document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionRecord {
    pub kind: RevisionKind,
    pub author: String,
    pub date: String,
    /// Text affected by the revision; empty for non-text content.
    pub text: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_have_documented_values() {
        let settings = ComparerSettings::default();
        assert_eq!(settings.word_separators, vec![' ', '-', ')', '(', ';', ',']);
        assert!(!settings.case_insensitive);
        assert!((settings.detail_threshold - 0.15).abs() < f64::EPSILON);
        assert_eq!(settings.thresholds.single_group_min_atoms, 16);
        assert_eq!(settings.thresholds.short_run_min_atoms, 32);
        assert_eq!(settings.thresholds.short_run_max_groups, 3);
        assert!(settings.author.is_none());
    }

    #[test]
    fn builder_pattern_works() {
        let settings = ComparerSettings::new()
            .with_author("Reviewer")
            .with_date("2026-01-05T09:00:00Z")
            .with_case_insensitive(true)
            .with_detail_threshold(0.3);

        assert_eq!(settings.author.as_deref(), Some("Reviewer"));
        assert_eq!(settings.date.as_deref(), Some("2026-01-05T09:00:00Z"));
        assert!(settings.case_insensitive);
        assert!((settings.detail_threshold - 0.3).abs() < f64::EPSILON);
    }

    #[test]
    fn word_separator_lookup() {
        let settings = ComparerSettings::default();
        assert!(settings.is_word_separator(' '));
        assert!(settings.is_word_separator('-'));
        assert!(!settings.is_word_separator('a'));
        assert!(!settings.is_word_separator('.'));
    }

    #[test]
    fn consolidate_settings_default_to_table() {
        assert!(ConsolidateSettings::default().use_table);
    }
}
