//! Block-level hash pre-pass.
//!
//! Annotates every paragraph, table, and row with a correlated hash of its
//! normalized content, and every table with a structure-only hash of its
//! row/cell topology. The correlated hash lets the correlator short-circuit
//! runs of structurally identical blocks without descending into them; the
//! structure hash detects tables whose merge geometry is unchanged even when
//! cell text differs.

use crate::hash::{self, sha1_hex, subtree_hash};
use crate::settings::ComparerSettings;
use crate::tree::document::Document;
use crate::tree::node::NodeData;
use crate::tree::schema;
use indextree::NodeId;

/// Annotate `corr-hash` (paragraph/table/row) and `struct-hash` (table)
/// metadata attributes throughout the document.
pub fn annotate_block_hashes(doc: &mut Document, settings: &ComparerSettings) {
    let mut updates: Vec<(NodeId, String, Option<String>)> = Vec::new();

    for node in doc.tree.descendants(doc.root) {
        match doc.tree.tag(node) {
            Some(schema::PARAGRAPH) | Some(schema::ROW) => {
                let mut rendering = String::new();
                content_outline(doc, node, settings, &mut rendering);
                updates.push((node, sha1_hex(&rendering), None));
            }
            Some(schema::TABLE) => {
                let mut rendering = String::new();
                content_outline(doc, node, settings, &mut rendering);
                let mut skeleton = String::new();
                structure_outline(doc, node, &mut skeleton);
                updates.push((node, sha1_hex(&rendering), Some(sha1_hex(&skeleton))));
            }
            _ => {}
        }
    }

    let corr_name = schema::meta::corr_hash();
    let struct_name = schema::meta::struct_hash();
    for (node, corr, structure) in updates {
        doc.tree.set_attribute(node, &corr_name, &corr);
        if let Some(structure) = structure {
            doc.tree.set_attribute(node, &struct_name, &structure);
        }
    }
}

/// Normalized content rendering: formatting-property children are dropped
/// (cell merge geometry excepted), discardable markers are dropped, volatile
/// attributes are dropped, references resolve to their content surrogate.
fn content_outline(doc: &Document, node: NodeId, settings: &ComparerSettings, out: &mut String) {
    let Some(data) = doc.tree.get(node) else {
        return;
    };
    match data {
        NodeData::Element { name, attributes } => {
            let tag = name.local.as_str();
            if schema::DISCARDABLE.contains(tag) {
                return;
            }
            if schema::PROPERTY_CHILDREN.contains(tag) {
                if tag == schema::CELL_PROPS {
                    fold_merge_geometry(doc, node, out);
                }
                return;
            }
            if tag == schema::NOTE_REF {
                // The note id is volatile; fold the note body instead.
                out.push_str("<note-ref ");
                let kind = doc
                    .tree
                    .attribute(node, &schema::note_kind())
                    .unwrap_or(schema::FOOTNOTE);
                out.push_str(kind);
                out.push(' ');
                let body_hash = doc
                    .tree
                    .attribute(node, &schema::note_id())
                    .and_then(|id| doc.find_note(kind, id))
                    .map(|note| subtree_hash(doc, note, settings.case_insensitive))
                    .unwrap_or_else(|| hash::UNRESOLVED_REFERENCE.to_string());
                out.push_str(&body_hash);
                out.push('>');
                return;
            }

            out.push('<');
            out.push_str(tag);
            for attr in attributes {
                if attr.name.namespace.as_deref() == Some(schema::meta::NS)
                    || attr.name == schema::rev_id()
                {
                    continue;
                }
                out.push(' ');
                out.push_str(&attr.name.local);
                out.push('=');
                if attr.name == schema::reference() {
                    out.push_str(&resolve_reference(doc, &attr.value, settings));
                } else {
                    out.push_str(&attr.value);
                }
            }
            out.push('>');
            for child in doc.tree.children(node) {
                content_outline(doc, child, settings, out);
            }
            out.push_str("</");
            out.push_str(tag);
            out.push('>');
        }
        NodeData::Text(text) => {
            if settings.case_insensitive {
                out.push_str(&text.to_uppercase());
            } else {
                out.push_str(text);
            }
        }
    }
}

fn resolve_reference(doc: &Document, rel_id: &str, settings: &ComparerSettings) -> String {
    use crate::tree::document::RelTarget;
    match doc.rels.get(rel_id) {
        Some(RelTarget::Bytes { data, .. }) => hash::sha1_bytes(data),
        Some(RelTarget::Part(part)) => subtree_hash(part, part.root, settings.case_insensitive),
        Some(RelTarget::External(uri)) => uri.clone(),
        None => hash::UNRESOLVED_REFERENCE.to_string(),
    }
}

/// Topology-only rendering of a table: rows, cells, and merge geometry.
/// Text and formatting are ignored.
fn structure_outline(doc: &Document, node: NodeId, out: &mut String) {
    let Some(tag) = doc.tree.tag(node) else { return };
    match tag {
        schema::TABLE | schema::ROW => {
            out.push('<');
            out.push_str(tag);
            out.push('>');
            for child in doc.tree.children(node) {
                structure_outline(doc, child, out);
            }
            out.push_str("</");
            out.push_str(tag);
            out.push('>');
        }
        schema::CELL => {
            out.push_str("<cell");
            if let Some(props) = doc.tree.child_by_tag(node, schema::CELL_PROPS) {
                fold_merge_geometry(doc, props, out);
            }
            out.push('>');
        }
        _ => {}
    }
}

fn fold_merge_geometry(doc: &Document, props: NodeId, out: &mut String) {
    if let Some(span) = doc.tree.attribute(props, &schema::col_span()) {
        out.push_str(" col-span=");
        out.push_str(span);
    }
    if let Some(merge) = doc.tree.attribute(props, &schema::v_merge()) {
        out.push_str(" v-merge=");
        out.push_str(merge);
    }
}
