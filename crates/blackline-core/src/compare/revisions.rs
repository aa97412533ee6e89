//! Flat revision extraction from a compared document.
//!
//! Walks the markup produced by the reassembler and lists each revision
//! individually, without re-running the comparison or producing another
//! merged document.

use crate::settings::{RevisionKind, RevisionRecord};
use crate::tree::document::Document;
use crate::tree::schema;

/// Extract the flat list of revisions present in a compared document.
pub fn revisions(doc: &Document) -> Vec<RevisionRecord> {
    let mut records = Vec::new();

    for node in doc.tree.descendants(doc.root) {
        let Some(tag) = doc.tree.tag(node) else { continue };
        let kind = match tag {
            schema::INS | schema::DEL => {
                let in_props = doc
                    .tree
                    .parent(node)
                    .and_then(|p| doc.tree.tag(p))
                    .is_some_and(|t| t == schema::PARAGRAPH_PROPS);
                match (tag, in_props) {
                    (schema::INS, true) => RevisionKind::ParagraphMarkInserted,
                    (schema::DEL, true) => RevisionKind::ParagraphMarkDeleted,
                    (schema::INS, false) => RevisionKind::Inserted,
                    (schema::DEL, false) => RevisionKind::Deleted,
                    _ => unreachable!(),
                }
            }
            schema::INSERTED_ROW => RevisionKind::InsertedRow,
            schema::DELETED_ROW => RevisionKind::DeletedRow,
            _ => continue,
        };

        let text = match kind {
            RevisionKind::Inserted | RevisionKind::Deleted => doc.tree.subtree_text(node),
            RevisionKind::InsertedRow | RevisionKind::DeletedRow => {
                // marker -> row-props -> row
                doc.tree
                    .parent(node)
                    .and_then(|props| doc.tree.parent(props))
                    .map(|row| doc.tree.subtree_text(row))
                    .unwrap_or_default()
            }
            _ => String::new(),
        };

        records.push(RevisionRecord {
            kind,
            author: doc
                .tree
                .attribute(node, &schema::author())
                .unwrap_or_default()
                .to_string(),
            date: doc
                .tree
                .attribute(node, &schema::date())
                .unwrap_or_default()
                .to_string(),
            text,
        });
    }

    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compare::compare;
    use crate::settings::ComparerSettings;
    use crate::tree::builder::DocBuilder;

    #[test]
    fn extraction_matches_markup() {
        let settings = ComparerSettings::default().with_author("Reviewer");
        let out = compare(
            &DocBuilder::new().paragraph("The cat sat.").finish(),
            &DocBuilder::new().paragraph("The dog sat.").finish(),
            &settings,
        )
        .unwrap();

        let records = revisions(&out);
        let deleted: Vec<&RevisionRecord> = records
            .iter()
            .filter(|r| r.kind == RevisionKind::Deleted)
            .collect();
        let inserted: Vec<&RevisionRecord> = records
            .iter()
            .filter(|r| r.kind == RevisionKind::Inserted)
            .collect();

        assert_eq!(deleted.len(), 1);
        assert_eq!(inserted.len(), 1);
        assert_eq!(deleted[0].text, "cat");
        assert_eq!(inserted[0].text, "dog");
        assert!(records.iter().all(|r| r.author == "Reviewer"));
    }

    #[test]
    fn unchanged_document_extracts_nothing() {
        let settings = ComparerSettings::default();
        let make = || DocBuilder::new().paragraph("stable").finish();
        let out = compare(&make(), &make(), &settings).unwrap();
        assert!(revisions(&out).is_empty());
    }

    #[test]
    fn deleted_row_extracts_row_kind_with_text() {
        let settings = ComparerSettings::default();
        let out = compare(
            &DocBuilder::new().table(&[&["keep"], &["gone"]]).finish(),
            &DocBuilder::new().table(&[&["keep"]]).finish(),
            &settings,
        )
        .unwrap();

        let records = revisions(&out);
        let row_records: Vec<&RevisionRecord> = records
            .iter()
            .filter(|r| r.kind == RevisionKind::DeletedRow)
            .collect();
        assert_eq!(row_records.len(), 1);
        assert!(row_records[0].text.contains("gone"));
    }
}
