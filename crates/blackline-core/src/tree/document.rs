use super::arena::DocTree;
use super::name::QName;
use super::node::NodeData;
use super::schema;
use indextree::NodeId;
use std::collections::BTreeMap;

/// Resolution target of a `ref` attribute.
#[derive(Clone, Debug)]
pub enum RelTarget {
    /// External binary content (image bytes, embedded object payloads).
    Bytes { content_type: String, data: Vec<u8> },
    /// Another structured part of the same package.
    Part(Box<Document>),
    /// An external URI the package does not own.
    External(String),
}

/// The per-document relationship set: maps reference ids to their targets
/// and mints fresh ids for content moved between documents.
#[derive(Clone, Debug, Default)]
pub struct RelationshipSet {
    targets: BTreeMap<String, RelTarget>,
    next_id: u32,
}

impl RelationshipSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<&RelTarget> {
        self.targets.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.targets.contains_key(id)
    }

    /// Insert under a caller-chosen id. Replaces any existing target.
    pub fn insert_with_id(&mut self, id: &str, target: RelTarget) {
        self.targets.insert(id.to_string(), target);
    }

    /// Insert under a freshly minted id and return it.
    pub fn insert(&mut self, target: RelTarget) -> String {
        let id = self.fresh_id();
        self.targets.insert(id.clone(), target);
        id
    }

    /// Mint an id not present in this set.
    pub fn fresh_id(&mut self) -> String {
        loop {
            self.next_id += 1;
            let id = format!("ref-{}", self.next_id);
            if !self.targets.contains_key(&id) {
                return id;
            }
        }
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.targets.keys().map(|k| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

/// One logical document: a tagged tree plus its relationship set. This is
/// the whole surface the comparison needs from the underlying package model.
#[derive(Clone, Debug)]
pub struct Document {
    pub tree: DocTree,
    pub root: NodeId,
    pub rels: RelationshipSet,
}

impl Document {
    /// An empty document: `document` root with an empty `body`.
    pub fn new() -> Self {
        let mut tree = DocTree::new();
        let root = tree.add_root(NodeData::element(QName::local(schema::DOCUMENT)));
        tree.add_child(root, NodeData::element(QName::local(schema::BODY)));
        Self {
            tree,
            root,
            rels: RelationshipSet::new(),
        }
    }

    pub fn body(&self) -> Option<NodeId> {
        self.tree.child_by_tag(self.root, schema::BODY)
    }

    fn notes_section(&self, kind: &str) -> Option<NodeId> {
        let section = match kind {
            schema::FOOTNOTE => schema::FOOTNOTES,
            schema::ENDNOTE => schema::ENDNOTES,
            _ => return None,
        };
        self.tree.child_by_tag(self.root, section)
    }

    /// Locate the `footnote`/`endnote` element with the given id.
    pub fn find_note(&self, kind: &str, id: &str) -> Option<NodeId> {
        let section = self.notes_section(kind)?;
        self.tree.children(section).find(|&note| {
            self.tree.tag(note) == Some(kind)
                && self.tree.attribute(note, &schema::note_id()) == Some(id)
        })
    }

    /// Ensure the notes section for `kind` exists and return it.
    pub fn ensure_notes_section(&mut self, kind: &str) -> Option<NodeId> {
        let section = match kind {
            schema::FOOTNOTE => schema::FOOTNOTES,
            schema::ENDNOTE => schema::ENDNOTES,
            _ => return None,
        };
        if let Some(existing) = self.tree.child_by_tag(self.root, section) {
            return Some(existing);
        }
        Some(
            self.tree
                .add_child(self.root, NodeData::element(QName::local(section))),
        )
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_document_has_body() {
        let doc = Document::new();
        assert!(doc.body().is_some());
    }

    #[test]
    fn relationship_set_mints_unused_ids() {
        let mut rels = RelationshipSet::new();
        rels.insert_with_id(
            "ref-1",
            RelTarget::External("https://example.com".to_string()),
        );
        let id = rels.insert(RelTarget::Bytes {
            content_type: "image/png".to_string(),
            data: vec![1, 2, 3],
        });
        assert_ne!(id, "ref-1");
        assert!(rels.contains(&id));
        assert_eq!(rels.len(), 2);
    }

    #[test]
    fn find_note_by_kind_and_id() {
        let mut doc = Document::new();
        let section = doc.ensure_notes_section(schema::FOOTNOTE).unwrap();
        let note = doc
            .tree
            .add_child(section, NodeData::element(QName::local(schema::FOOTNOTE)));
        doc.tree.set_attribute(note, &schema::note_id(), "7");

        assert_eq!(doc.find_note(schema::FOOTNOTE, "7"), Some(note));
        assert_eq!(doc.find_note(schema::FOOTNOTE, "8"), None);
        assert_eq!(doc.find_note(schema::ENDNOTE, "7"), None);
    }
}
