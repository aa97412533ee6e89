//! blackline-core: structural, revision-aware comparison of rich-text
//! document trees.
//!
//! The crate compares two versions of a document (paragraphs, runs, tables,
//! text boxes, footnotes/endnotes) and produces a third document annotated
//! with insert/delete tracked changes, plus a consolidator that merges many
//! revised copies of one original into a single multi-reviewer document.
//!
//! The package/part model stays outside the crate: inputs arrive as
//! [`tree::Document`] values, a tagged node tree with ordered children,
//! attributes, and a relationship set resolving reference ids.

pub mod compare;
pub mod consolidate;
pub mod error;
pub mod hash;
pub mod settings;
pub mod tree;
pub mod util;

pub use compare::{compare, revisions};
pub use consolidate::consolidate;
pub use error::{BlacklineError, Result};
pub use settings::{
    ComparerSettings, ConsolidateSettings, CorrelationThresholds, RevisedDocumentInfo,
    RevisionKind, RevisionRecord,
};
pub use tree::{DocBuilder, DocTree, Document, RelTarget, RelationshipSet};
