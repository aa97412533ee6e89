//! Content hashing over document subtrees.
//!
//! Hashes are computed from a normalized rendering of the subtree: internal
//! bookkeeping attributes and volatile revision ids are dropped, and `ref`
//! attributes are resolved through the relationship set so that the hash
//! covers the referenced content rather than the reference id. Two documents
//! carrying semantically identical content therefore produce identical
//! digests even when their ids differ.

use crate::tree::document::{Document, RelTarget};
use crate::tree::name::QName;
use crate::tree::node::NodeData;
use crate::tree::schema;
use indextree::NodeId;
use sha1::{Digest, Sha1};

/// Substituted when a `ref` attribute cannot be resolved; the comparison
/// proceeds with the placeholder instead of aborting.
pub const UNRESOLVED_REFERENCE: &str = "unresolved-reference";

pub fn sha1_hex(input: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

pub fn sha1_bytes(input: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(input);
    hex::encode(hasher.finalize())
}

pub fn sha1_concat<'a>(parts: impl IntoIterator<Item = &'a str>) -> String {
    let mut hasher = Sha1::new();
    for part in parts {
        hasher.update(part.as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Hash the subtree rooted at `node`, normalizing volatile identifiers.
pub fn subtree_hash(doc: &Document, node: NodeId, case_insensitive: bool) -> String {
    let mut rendering = String::new();
    fold_node(doc, node, case_insensitive, &mut rendering);
    sha1_hex(&rendering)
}

fn is_volatile_attribute(name: &QName) -> bool {
    name.namespace.as_deref() == Some(schema::meta::NS) || *name == schema::rev_id()
}

fn fold_node(doc: &Document, node: NodeId, case_insensitive: bool, out: &mut String) {
    let Some(data) = doc.tree.get(node) else {
        return;
    };
    match data {
        NodeData::Element { name, attributes } => {
            out.push('<');
            out.push_str(&name.local);
            for attr in attributes {
                if is_volatile_attribute(&attr.name) {
                    continue;
                }
                out.push(' ');
                out.push_str(&attr.name.local);
                out.push('=');
                if attr.name == schema::reference() {
                    out.push_str(&resolve_reference(doc, &attr.value, case_insensitive));
                } else {
                    out.push_str(&attr.value);
                }
            }
            out.push('>');
            for child in doc.tree.children(node) {
                fold_node(doc, child, case_insensitive, out);
            }
            out.push_str("</");
            out.push_str(&name.local);
            out.push('>');
        }
        NodeData::Text(text) => {
            if case_insensitive {
                out.push_str(&text.to_uppercase());
            } else {
                out.push_str(text);
            }
        }
    }
}

/// Resolve a reference id to a content surrogate: the digest of the target
/// bytes, the recursive hash of a sub-part, or the external URI itself.
fn resolve_reference(doc: &Document, rel_id: &str, case_insensitive: bool) -> String {
    match doc.rels.get(rel_id) {
        Some(RelTarget::Bytes { data, .. }) => sha1_bytes(data),
        Some(RelTarget::Part(part)) => subtree_hash(part, part.root, case_insensitive),
        Some(RelTarget::External(uri)) => uri.clone(),
        None => UNRESOLVED_REFERENCE.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::document::{Document, RelTarget};
    use crate::tree::name::QName;
    use crate::tree::node::NodeData;
    use crate::tree::schema;

    fn doc_with_text(text: &str) -> (Document, NodeId) {
        let mut doc = Document::new();
        let body = doc.body().unwrap();
        let para = doc
            .tree
            .add_child(body, NodeData::element(QName::local(schema::PARAGRAPH)));
        let t = doc
            .tree
            .add_child(para, NodeData::element(QName::local(schema::TEXT)));
        doc.tree.add_child(t, NodeData::text(text));
        (doc, para)
    }

    #[test]
    fn identical_content_hashes_identically() {
        let (doc1, p1) = doc_with_text("alpha");
        let (doc2, p2) = doc_with_text("alpha");
        assert_eq!(
            subtree_hash(&doc1, p1, false),
            subtree_hash(&doc2, p2, false)
        );
    }

    #[test]
    fn differing_text_changes_hash() {
        let (doc1, p1) = doc_with_text("alpha");
        let (doc2, p2) = doc_with_text("beta");
        assert_ne!(
            subtree_hash(&doc1, p1, false),
            subtree_hash(&doc2, p2, false)
        );
    }

    #[test]
    fn case_insensitive_folds_text() {
        let (doc1, p1) = doc_with_text("Alpha");
        let (doc2, p2) = doc_with_text("ALPHA");
        assert_ne!(
            subtree_hash(&doc1, p1, false),
            subtree_hash(&doc2, p2, false)
        );
        assert_eq!(subtree_hash(&doc1, p1, true), subtree_hash(&doc2, p2, true));
    }

    #[test]
    fn identity_tokens_do_not_affect_hash() {
        let (mut doc1, p1) = doc_with_text("alpha");
        let (doc2, p2) = doc_with_text("alpha");
        doc1.tree.set_attribute(p1, &schema::meta::uid(), "abc123");
        assert_eq!(
            subtree_hash(&doc1, p1, false),
            subtree_hash(&doc2, p2, false)
        );
    }

    #[test]
    fn reference_hash_covers_target_bytes_not_id() {
        let mut doc1 = Document::new();
        doc1.rels.insert_with_id(
            "ref-9",
            RelTarget::Bytes {
                content_type: "image/png".to_string(),
                data: vec![1, 2, 3],
            },
        );
        let body1 = doc1.body().unwrap();
        let img1 = doc1
            .tree
            .add_child(body1, NodeData::element(QName::local(schema::IMAGE)));
        doc1.tree.set_attribute(img1, &schema::reference(), "ref-9");

        let mut doc2 = Document::new();
        doc2.rels.insert_with_id(
            "ref-1",
            RelTarget::Bytes {
                content_type: "image/png".to_string(),
                data: vec![1, 2, 3],
            },
        );
        let body2 = doc2.body().unwrap();
        let img2 = doc2
            .tree
            .add_child(body2, NodeData::element(QName::local(schema::IMAGE)));
        doc2.tree.set_attribute(img2, &schema::reference(), "ref-1");

        // Same bytes behind different ids: identical hash.
        assert_eq!(
            subtree_hash(&doc1, img1, false),
            subtree_hash(&doc2, img2, false)
        );
    }

    #[test]
    fn unresolved_reference_uses_placeholder() {
        let mut doc = Document::new();
        let body = doc.body().unwrap();
        let img = doc
            .tree
            .add_child(body, NodeData::element(QName::local(schema::IMAGE)));
        doc.tree.set_attribute(img, &schema::reference(), "missing");

        // Must not panic; the placeholder keeps the hash stable.
        let h1 = subtree_hash(&doc, img, false);
        let h2 = subtree_hash(&doc, img, false);
        assert_eq!(h1, h2);
    }
}
