//! Element vocabulary of the comparison dialect.
//!
//! Document-dialect names are plain local names; internal bookkeeping
//! attributes live in the reserved `meta` namespace and are stripped from
//! output.

use super::name::QName;
use once_cell::sync::Lazy;
use std::collections::HashSet;

// Structural containers
pub const DOCUMENT: &str = "document";
pub const BODY: &str = "body";
pub const PARAGRAPH: &str = "paragraph";
pub const RUN: &str = "run";
pub const TABLE: &str = "table";
pub const ROW: &str = "row";
pub const CELL: &str = "cell";
pub const TEXTBOX: &str = "textbox";
pub const LINK: &str = "link";
pub const FOOTNOTES: &str = "footnotes";
pub const FOOTNOTE: &str = "footnote";
pub const ENDNOTES: &str = "endnotes";
pub const ENDNOTE: &str = "endnote";

// Formatting-property children
pub const PARAGRAPH_PROPS: &str = "paragraph-props";
pub const RUN_PROPS: &str = "run-props";
pub const TABLE_PROPS: &str = "table-props";
pub const ROW_PROPS: &str = "row-props";
pub const CELL_PROPS: &str = "cell-props";

// Leaf content
pub const TEXT: &str = "text";
pub const BREAK: &str = "break";
pub const TAB: &str = "tab";
pub const FIELD: &str = "field";
pub const MATH: &str = "math";
pub const IMAGE: &str = "image";
pub const OBJECT: &str = "object";
pub const SYMBOL: &str = "symbol";
pub const NOTE_REF: &str = "note-ref";

// Revision markup
pub const INS: &str = "ins";
pub const DEL: &str = "del";
pub const INSERTED_ROW: &str = "inserted-row";
pub const DELETED_ROW: &str = "deleted-row";

// Discardable markers, removed before comparison
pub const BOOKMARK: &str = "bookmark";
pub const PROOF_MARK: &str = "proof-mark";
pub const COMMENT_REF: &str = "comment-ref";

// Constructs the model cannot represent; rejected pre-flight
pub const MOVED_FROM: &str = "moved-from";
pub const MOVED_TO: &str = "moved-to";
pub const ALT_CONTENT: &str = "alt-content";

// Plain dialect attributes
pub fn author() -> QName {
    QName::local("author")
}
pub fn date() -> QName {
    QName::local("date")
}
pub fn rev_id() -> QName {
    QName::local("rev-id")
}
pub fn reference() -> QName {
    QName::local("ref")
}
pub fn col_span() -> QName {
    QName::local("col-span")
}
pub fn v_merge() -> QName {
    QName::local("v-merge")
}
pub fn note_id() -> QName {
    QName::local("id")
}
pub fn note_kind() -> QName {
    QName::local("kind")
}
pub fn field_instruction() -> QName {
    QName::local("instruction")
}
pub fn symbol_font() -> QName {
    QName::local("font")
}
pub fn symbol_code() -> QName {
    QName::local("code")
}
pub fn fill_color() -> QName {
    QName::local("fill")
}

/// Reserved namespace for bookkeeping attributes.
pub mod meta {
    use super::QName;

    pub const NS: &str = "urn:blackline:meta";

    /// Identity token, minted per structural element before atomization.
    pub fn uid() -> QName {
        QName::new(NS, "uid")
    }
    /// Transient correlation status set during rebuild.
    pub fn status() -> QName {
        QName::new(NS, "status")
    }
    /// Correlated hash precomputed by the block-hash pre-pass.
    pub fn corr_hash() -> QName {
        QName::new(NS, "corr-hash")
    }
    /// Structure-only hash (tables), ignoring text content.
    pub fn struct_hash() -> QName {
        QName::new(NS, "struct-hash")
    }
}

/// Container tags that drive hierarchical grouping of comparison units.
pub static GROUPING_CONTAINERS: Lazy<HashSet<&'static str>> =
    Lazy::new(|| [PARAGRAPH, TABLE, ROW, CELL, TEXTBOX].into_iter().collect());

/// Property children skipped when recursing into their container.
pub static PROPERTY_CHILDREN: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        PARAGRAPH_PROPS,
        RUN_PROPS,
        TABLE_PROPS,
        ROW_PROPS,
        CELL_PROPS,
    ]
    .into_iter()
    .collect()
});

/// Markers that carry no comparable content.
pub static DISCARDABLE: Lazy<HashSet<&'static str>> =
    Lazy::new(|| [BOOKMARK, PROOF_MARK, COMMENT_REF].into_iter().collect());

/// Constructs that abort the comparison before atomization.
pub static UNSUPPORTED: Lazy<HashSet<&'static str>> =
    Lazy::new(|| [MOVED_FROM, MOVED_TO, ALT_CONTENT].into_iter().collect());

/// Map a property-child tag to its owning container tag.
pub fn props_tag_for(container: &str) -> Option<&'static str> {
    match container {
        PARAGRAPH => Some(PARAGRAPH_PROPS),
        RUN => Some(RUN_PROPS),
        TABLE => Some(TABLE_PROPS),
        ROW => Some(ROW_PROPS),
        CELL => Some(CELL_PROPS),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grouping_containers_cover_structural_tags() {
        assert!(GROUPING_CONTAINERS.contains(PARAGRAPH));
        assert!(GROUPING_CONTAINERS.contains(TEXTBOX));
        assert!(!GROUPING_CONTAINERS.contains(RUN));
    }

    #[test]
    fn props_tag_lookup() {
        assert_eq!(props_tag_for(TABLE), Some(TABLE_PROPS));
        assert_eq!(props_tag_for(LINK), None);
    }

    #[test]
    fn meta_names_share_namespace() {
        assert_eq!(meta::uid().namespace.as_deref(), Some(meta::NS));
        assert_eq!(meta::status().namespace.as_deref(), Some(meta::NS));
    }
}
