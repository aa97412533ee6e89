//! Fluent construction of dialect documents, used by tests and callers that
//! assemble documents programmatically.

use super::arena::DocTree;
use super::document::{Document, RelTarget};
use super::name::QName;
use super::node::NodeData;
use super::schema;
use indextree::NodeId;

pub struct DocBuilder {
    doc: Document,
}

impl DocBuilder {
    pub fn new() -> Self {
        Self {
            doc: Document::new(),
        }
    }

    fn body(&self) -> NodeId {
        self.doc.body().expect("document always has a body")
    }

    /// Append a paragraph containing a single run of text.
    pub fn paragraph(self, text: &str) -> Self {
        self.paragraph_runs(&[text])
    }

    /// Append a paragraph containing one run per entry.
    pub fn paragraph_runs(mut self, runs: &[&str]) -> Self {
        let body = self.body();
        append_paragraph(&mut self.doc.tree, body, runs);
        self
    }

    /// Append a table; each entry of `rows` is one row of cell texts.
    pub fn table(mut self, rows: &[&[&str]]) -> Self {
        let body = self.body();
        let table = self
            .doc
            .tree
            .add_child(body, NodeData::element(QName::local(schema::TABLE)));
        self.doc
            .tree
            .add_child(table, NodeData::element(QName::local(schema::TABLE_PROPS)));
        for row_cells in rows {
            let row = self
                .doc
                .tree
                .add_child(table, NodeData::element(QName::local(schema::ROW)));
            self.doc
                .tree
                .add_child(row, NodeData::element(QName::local(schema::ROW_PROPS)));
            for cell_text in *row_cells {
                append_cell(&mut self.doc.tree, row, cell_text, None, false);
            }
        }
        self
    }

    /// Append a two-row table whose first column is vertically merged.
    pub fn table_with_merged_first_column(mut self, rows: &[&[&str]]) -> Self {
        let body = self.body();
        let table = self
            .doc
            .tree
            .add_child(body, NodeData::element(QName::local(schema::TABLE)));
        self.doc
            .tree
            .add_child(table, NodeData::element(QName::local(schema::TABLE_PROPS)));
        for (i, row_cells) in rows.iter().enumerate() {
            let row = self
                .doc
                .tree
                .add_child(table, NodeData::element(QName::local(schema::ROW)));
            self.doc
                .tree
                .add_child(row, NodeData::element(QName::local(schema::ROW_PROPS)));
            for (j, cell_text) in row_cells.iter().enumerate() {
                let merged = j == 0 && i > 0;
                append_cell(&mut self.doc.tree, row, cell_text, None, merged);
            }
        }
        self
    }

    /// Append a paragraph holding a textbox with the given inner paragraphs.
    pub fn textbox(mut self, inner_paragraphs: &[&str]) -> Self {
        let body = self.body();
        let para = self
            .doc
            .tree
            .add_child(body, NodeData::element(QName::local(schema::PARAGRAPH)));
        self.doc.tree.add_child(
            para,
            NodeData::element(QName::local(schema::PARAGRAPH_PROPS)),
        );
        let run = self
            .doc
            .tree
            .add_child(para, NodeData::element(QName::local(schema::RUN)));
        let textbox = self
            .doc
            .tree
            .add_child(run, NodeData::element(QName::local(schema::TEXTBOX)));
        for &text in inner_paragraphs {
            append_paragraph(&mut self.doc.tree, textbox, &[text]);
        }
        self
    }

    /// Append a paragraph holding an image that references external bytes.
    pub fn image_paragraph(mut self, content_type: &str, data: &[u8]) -> Self {
        let rel_id = self.doc.rels.insert(RelTarget::Bytes {
            content_type: content_type.to_string(),
            data: data.to_vec(),
        });
        let body = self.body();
        let para = self
            .doc
            .tree
            .add_child(body, NodeData::element(QName::local(schema::PARAGRAPH)));
        self.doc.tree.add_child(
            para,
            NodeData::element(QName::local(schema::PARAGRAPH_PROPS)),
        );
        let run = self
            .doc
            .tree
            .add_child(para, NodeData::element(QName::local(schema::RUN)));
        let image = self
            .doc
            .tree
            .add_child(run, NodeData::element(QName::local(schema::IMAGE)));
        self.doc
            .tree
            .set_attribute(image, &schema::reference(), &rel_id);
        self
    }

    /// Append a paragraph whose run carries a footnote reference, and the
    /// matching footnote body.
    pub fn footnote_paragraph(mut self, text: &str, note_id: &str, note_text: &str) -> Self {
        let body = self.body();
        let para = append_paragraph(&mut self.doc.tree, body, &[text]);
        let run = self
            .doc
            .tree
            .children(para)
            .find(|&c| self.doc.tree.tag(c) == Some(schema::RUN))
            .expect("paragraph has a run");
        let note_ref = self
            .doc
            .tree
            .add_child(run, NodeData::element(QName::local(schema::NOTE_REF)));
        self.doc
            .tree
            .set_attribute(note_ref, &schema::note_kind(), schema::FOOTNOTE);
        self.doc
            .tree
            .set_attribute(note_ref, &schema::note_id(), note_id);

        let section = self
            .doc
            .ensure_notes_section(schema::FOOTNOTE)
            .expect("footnotes section");
        let note = self
            .doc
            .tree
            .add_child(section, NodeData::element(QName::local(schema::FOOTNOTE)));
        self.doc
            .tree
            .set_attribute(note, &schema::note_id(), note_id);
        append_paragraph(&mut self.doc.tree, note, &[note_text]);
        self
    }

    pub fn finish(self) -> Document {
        self.doc
    }
}

impl Default for DocBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Append `paragraph > (paragraph-props, run*)` under `parent` and return
/// the paragraph node.
pub fn append_paragraph(tree: &mut DocTree, parent: NodeId, runs: &[&str]) -> NodeId {
    let para = tree.add_child(parent, NodeData::element(QName::local(schema::PARAGRAPH)));
    tree.add_child(
        para,
        NodeData::element(QName::local(schema::PARAGRAPH_PROPS)),
    );
    for text in runs {
        let run = tree.add_child(para, NodeData::element(QName::local(schema::RUN)));
        tree.add_child(run, NodeData::element(QName::local(schema::RUN_PROPS)));
        let t = tree.add_child(run, NodeData::element(QName::local(schema::TEXT)));
        tree.add_child(t, NodeData::text(text));
    }
    para
}

fn append_cell(
    tree: &mut DocTree,
    row: NodeId,
    text: &str,
    col_span: Option<u32>,
    v_merge: bool,
) -> NodeId {
    let cell = tree.add_child(row, NodeData::element(QName::local(schema::CELL)));
    let props = tree.add_child(cell, NodeData::element(QName::local(schema::CELL_PROPS)));
    if let Some(span) = col_span {
        tree.set_attribute(props, &schema::col_span(), &span.to_string());
    }
    if v_merge {
        tree.set_attribute(props, &schema::v_merge(), "continue");
    }
    append_paragraph(tree, cell, &[text]);
    cell
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_produces_expected_shape() {
        let doc = DocBuilder::new()
            .paragraph("Hello world")
            .table(&[&["a", "b"], &["c", "d"]])
            .finish();

        let body = doc.body().unwrap();
        let children: Vec<_> = doc.tree.children(body).collect();
        assert_eq!(children.len(), 2);
        assert_eq!(doc.tree.tag(children[0]), Some(schema::PARAGRAPH));
        assert_eq!(doc.tree.tag(children[1]), Some(schema::TABLE));

        let rows = doc
            .tree
            .children(children[1])
            .filter(|&n| doc.tree.tag(n) == Some(schema::ROW))
            .count();
        assert_eq!(rows, 2);
    }

    #[test]
    fn image_paragraph_registers_relationship() {
        let doc = DocBuilder::new()
            .image_paragraph("image/png", &[0xAA, 0xBB])
            .finish();
        assert_eq!(doc.rels.len(), 1);
    }

    #[test]
    fn footnote_paragraph_creates_note_body() {
        let doc = DocBuilder::new()
            .footnote_paragraph("See note", "1", "The note text")
            .finish();
        assert!(doc.find_note(schema::FOOTNOTE, "1").is_some());
    }
}
