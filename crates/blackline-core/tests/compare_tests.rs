//! End-to-end comparison scenarios over built documents.

use blackline_core::compare::atomize::{assign_uids, atomize};
use blackline_core::compare::group::units_from_atoms;
use blackline_core::compare::{correlate, flatten, Side, Status};
use blackline_core::tree::schema;
use blackline_core::{compare, revisions, ComparerSettings, DocBuilder, Document, RevisionKind};
use pretty_assertions::assert_eq;
use proptest::prelude::*;

fn count_tag(doc: &Document, tag: &str) -> usize {
    doc.tree
        .descendants(doc.root)
        .filter(|&n| doc.tree.tag(n) == Some(tag))
        .count()
}

fn body_text(doc: &Document) -> String {
    doc.tree.subtree_text(doc.body().unwrap())
}

/// Run the front half of the pipeline and count atoms per status.
fn status_counts(
    original: &Document,
    revised: &Document,
    settings: &ComparerSettings,
) -> (usize, usize, usize) {
    let mut src1 = original.clone();
    let mut src2 = revised.clone();
    assign_uids(&mut src1);
    assign_uids(&mut src2);
    let atoms1 = atomize(&src1, Side::Original, settings).unwrap();
    let atoms2 = atomize(&src2, Side::Revised, settings).unwrap();
    let units1 = units_from_atoms(atoms1, settings);
    let units2 = units_from_atoms(atoms2, settings);
    let seqs = correlate(units1, units2, settings).unwrap();
    let atoms = flatten(&seqs);
    let equal = atoms.iter().filter(|a| a.status == Status::Equal).count();
    let deleted = atoms.iter().filter(|a| a.status == Status::Deleted).count();
    let inserted = atoms.iter().filter(|a| a.status == Status::Inserted).count();
    (equal, deleted, inserted)
}

fn atom_count(doc: &Document, settings: &ComparerSettings, side: Side) -> usize {
    let mut doc = doc.clone();
    assign_uids(&mut doc);
    atomize(&doc, side, settings).unwrap().len()
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[test]
fn comparing_document_to_itself_yields_single_equal_region() {
    let settings = ComparerSettings::default();
    let make = || {
        DocBuilder::new()
            .paragraph("A document with several words in it")
            .paragraph("And a second paragraph")
            .finish()
    };
    let (equal, deleted, inserted) = status_counts(&make(), &make(), &settings);
    let total = atom_count(&make(), &settings, Side::Original);

    assert_eq!(equal, total);
    assert_eq!(deleted, 0);
    assert_eq!(inserted, 0);
}

#[test]
fn empty_vs_empty_produces_empty_output() {
    let settings = ComparerSettings::default();
    let out = compare(&Document::new(), &Document::new(), &settings).unwrap();
    assert_eq!(count_tag(&out, schema::PARAGRAPH), 0);
    assert!(revisions(&out).is_empty());
}

#[test]
fn empty_vs_content_is_all_inserted() {
    let settings = ComparerSettings::default();
    let out = compare(
        &Document::new(),
        &DocBuilder::new().paragraph("brand new").finish(),
        &settings,
    )
    .unwrap();
    assert!(count_tag(&out, schema::INS) >= 1);
    assert_eq!(count_tag(&out, schema::DEL), 0);
    assert!(body_text(&out).contains("brand new"));
}

#[test]
fn content_vs_empty_is_all_deleted() {
    let settings = ComparerSettings::default();
    let out = compare(
        &DocBuilder::new().paragraph("old text").finish(),
        &Document::new(),
        &settings,
    )
    .unwrap();
    assert!(count_tag(&out, schema::DEL) >= 1);
    assert_eq!(count_tag(&out, schema::INS), 0);
    assert!(body_text(&out).contains("old text"));
}

#[test]
fn single_word_edit_marks_only_that_word() {
    let settings = ComparerSettings::default();
    let out = compare(
        &DocBuilder::new().paragraph("The cat sat.").finish(),
        &DocBuilder::new().paragraph("The dog sat.").finish(),
        &settings,
    )
    .unwrap();

    let records = revisions(&out);
    let deleted: Vec<_> = records
        .iter()
        .filter(|r| r.kind == RevisionKind::Deleted)
        .collect();
    let inserted: Vec<_> = records
        .iter()
        .filter(|r| r.kind == RevisionKind::Inserted)
        .collect();
    assert_eq!(deleted.len(), 1);
    assert_eq!(inserted.len(), 1);
    assert_eq!(deleted[0].text, "cat");
    assert_eq!(inserted[0].text, "dog");
    // The paragraph mark survives untouched.
    assert!(!records
        .iter()
        .any(|r| matches!(
            r.kind,
            RevisionKind::ParagraphMarkInserted | RevisionKind::ParagraphMarkDeleted
        )));
}

#[test]
fn paragraph_split_inserts_a_mark_without_faking_equality() {
    let settings = ComparerSettings::default();
    let out = compare(
        &DocBuilder::new().paragraph("Hello world").finish(),
        &DocBuilder::new().paragraph("Hello").paragraph("world").finish(),
        &settings,
    )
    .unwrap();

    let records = revisions(&out);
    let mark_inserts = records
        .iter()
        .filter(|r| r.kind == RevisionKind::ParagraphMarkInserted)
        .count();
    let mark_deletes = records
        .iter()
        .filter(|r| r.kind == RevisionKind::ParagraphMarkDeleted)
        .count();
    assert_eq!(mark_inserts, 1);
    assert_eq!(mark_deletes, 0);

    let text = body_text(&out);
    assert!(text.contains("Hello"));
    assert!(text.contains("world"));
    // Neither word was rewritten.
    assert!(!records
        .iter()
        .any(|r| r.text.contains("Hello") || r.text.contains("world")));
}

#[test]
fn unmodified_table_with_merged_cell_has_no_revisions() {
    let settings = ComparerSettings::default();
    let make = || {
        DocBuilder::new()
            .paragraph("before the table")
            .table_with_merged_first_column(&[&["span", "b"], &["", "c"], &["", "d"]])
            .paragraph("after the table")
            .finish()
    };
    let out = compare(&make(), &make(), &settings).unwrap();
    assert!(revisions(&out).is_empty());
}

#[test]
fn intra_row_edit_leaves_row_markers_alone() {
    let settings = ComparerSettings::default();
    let out = compare(
        &DocBuilder::new().table(&[&["a", "b"], &["c", "d"]]).finish(),
        &DocBuilder::new().table(&[&["a", "B2"], &["c", "d"]]).finish(),
        &settings,
    )
    .unwrap();

    assert_eq!(count_tag(&out, schema::INSERTED_ROW), 0);
    assert_eq!(count_tag(&out, schema::DELETED_ROW), 0);
    // Content-level markers exist inside the changed cell.
    assert!(count_tag(&out, schema::DEL) >= 1);
    assert!(count_tag(&out, schema::INS) >= 1);
}

#[test]
fn added_row_is_marked_at_row_level() {
    let settings = ComparerSettings::default();
    let out = compare(
        &DocBuilder::new().table(&[&["a", "b"]]).finish(),
        &DocBuilder::new().table(&[&["a", "b"], &["x", "y"]]).finish(),
        &settings,
    )
    .unwrap();
    assert_eq!(count_tag(&out, schema::INSERTED_ROW), 1);
    assert_eq!(count_tag(&out, schema::DELETED_ROW), 0);
}

#[test]
fn textbox_content_edit_is_tracked() {
    let settings = ComparerSettings::default();
    let out = compare(
        &DocBuilder::new().textbox(&["inside a box"]).finish(),
        &DocBuilder::new().textbox(&["inside the box"]).finish(),
        &settings,
    )
    .unwrap();
    let records = revisions(&out);
    assert!(records
        .iter()
        .any(|r| r.kind == RevisionKind::Deleted && r.text == "a"));
    assert!(records
        .iter()
        .any(|r| r.kind == RevisionKind::Inserted && r.text == "the"));
}

#[test]
fn case_insensitive_comparison_ignores_case_changes() {
    let sensitive = ComparerSettings::default();
    let insensitive = ComparerSettings::default().with_case_insensitive(true);

    let a = DocBuilder::new().paragraph("Hello World").finish();
    let b = DocBuilder::new().paragraph("hello world").finish();

    let out_sensitive = compare(&a, &b, &sensitive).unwrap();
    let out_insensitive = compare(&a, &b, &insensitive).unwrap();

    assert!(!revisions(&out_sensitive).is_empty());
    assert!(revisions(&out_insensitive).is_empty());
}

#[test]
fn image_swap_is_detected_through_reference_bytes() {
    let settings = ComparerSettings::default();
    let out = compare(
        &DocBuilder::new()
            .paragraph("intro")
            .image_paragraph("image/png", &[1, 2, 3])
            .finish(),
        &DocBuilder::new()
            .paragraph("intro")
            .image_paragraph("image/png", &[4, 5, 6])
            .finish(),
        &settings,
    )
    .unwrap();
    assert!(count_tag(&out, schema::DEL) >= 1);
    assert!(count_tag(&out, schema::INS) >= 1);
    // Both image versions are referenced and resolvable in the output.
    assert_eq!(out.rels.len(), 2);
}

#[test]
fn unchanged_image_produces_no_revisions() {
    let settings = ComparerSettings::default();
    let make = || {
        DocBuilder::new()
            .paragraph("intro")
            .image_paragraph("image/png", &[7, 8, 9])
            .finish()
    };
    let out = compare(&make(), &make(), &settings).unwrap();
    assert!(revisions(&out).is_empty());
}

#[test]
fn footnote_edit_surfaces_as_reference_change() {
    let settings = ComparerSettings::default();
    let out = compare(
        &DocBuilder::new()
            .footnote_paragraph("See note", "1", "original wording")
            .finish(),
        &DocBuilder::new()
            .footnote_paragraph("See note", "1", "revised wording")
            .finish(),
        &settings,
    )
    .unwrap();
    assert!(!revisions(&out).is_empty());
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

const WORD_POOL: &[&str] = &[
    "alpha", "bravo", "charlie", "delta", "echo", "foxtrot", "golf", "hotel",
];

fn doc_from_words(words: &[&str]) -> Document {
    DocBuilder::new().paragraph(&words.join(" ")).finish()
}

proptest! {
    #[test]
    fn prop_self_comparison_is_all_equal(
        words in proptest::sample::subsequence(WORD_POOL.to_vec(), 1..WORD_POOL.len())
    ) {
        let settings = ComparerSettings::default();
        let (equal, deleted, inserted) =
            status_counts(&doc_from_words(&words), &doc_from_words(&words), &settings);
        prop_assert_eq!(deleted, 0);
        prop_assert_eq!(inserted, 0);
        prop_assert_eq!(equal, atom_count(&doc_from_words(&words), &settings, Side::Original));
    }

    #[test]
    fn prop_flatten_conserves_every_atom(
        words1 in proptest::sample::subsequence(WORD_POOL.to_vec(), 1..WORD_POOL.len()),
        words2 in proptest::sample::subsequence(WORD_POOL.to_vec(), 1..WORD_POOL.len()),
    ) {
        let settings = ComparerSettings::default();
        let left = doc_from_words(&words1);
        let right = doc_from_words(&words2);
        let left_total = atom_count(&left, &settings, Side::Original);
        let right_total = atom_count(&right, &settings, Side::Revised);

        let (equal, deleted, inserted) = status_counts(&left, &right, &settings);
        prop_assert_eq!(equal + deleted, left_total);
        prop_assert_eq!(equal + inserted, right_total);
    }

    #[test]
    fn prop_raising_detail_threshold_is_monotone(
        words1 in proptest::sample::subsequence(WORD_POOL.to_vec(), 1..WORD_POOL.len()),
        words2 in proptest::sample::subsequence(WORD_POOL.to_vec(), 1..WORD_POOL.len()),
        low in 0.0f64..0.45,
        delta in 0.0f64..0.45,
    ) {
        let left = doc_from_words(&words1);
        let right = doc_from_words(&words2);

        let loose = ComparerSettings::default().with_detail_threshold(low);
        let strict = ComparerSettings::default().with_detail_threshold(low + delta);

        let (equal_loose, _, _) = status_counts(&left, &right, &loose);
        let (equal_strict, _, _) = status_counts(&left, &right, &strict);
        prop_assert!(equal_strict <= equal_loose);
    }
}
