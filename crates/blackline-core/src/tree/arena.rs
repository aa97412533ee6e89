use super::name::QName;
use super::node::NodeData;
use indextree::{Arena, NodeId};

/// Arena-backed mutable document tree. Nodes are addressed by `NodeId`;
/// removal detaches the whole subtree.
#[derive(Clone, Debug, Default)]
pub struct DocTree {
    arena: Arena<NodeData>,
    root: Option<NodeId>,
}

impl DocTree {
    pub fn new() -> Self {
        Self {
            arena: Arena::new(),
            root: None,
        }
    }

    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    pub fn get(&self, id: NodeId) -> Option<&NodeData> {
        self.arena.get(id).map(|node| node.get())
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut NodeData> {
        self.arena.get_mut(id).map(|node| node.get_mut())
    }

    pub fn add_root(&mut self, data: NodeData) -> NodeId {
        let id = self.arena.new_node(data);
        self.root = Some(id);
        id
    }

    /// Create a detached node; attach it later with `append` or
    /// `insert_before`/`insert_after`.
    pub fn new_node(&mut self, data: NodeData) -> NodeId {
        self.arena.new_node(data)
    }

    pub fn add_child(&mut self, parent: NodeId, data: NodeData) -> NodeId {
        let child = self.arena.new_node(data);
        parent.append(child, &mut self.arena);
        child
    }

    pub fn append(&mut self, parent: NodeId, child: NodeId) {
        parent.append(child, &mut self.arena);
    }

    pub fn insert_before(&mut self, sibling: NodeId, node: NodeId) {
        sibling.insert_before(node, &mut self.arena);
    }

    pub fn insert_after(&mut self, sibling: NodeId, node: NodeId) {
        sibling.insert_after(node, &mut self.arena);
    }

    pub fn detach(&mut self, node: NodeId) {
        node.detach(&mut self.arena);
    }

    pub fn remove(&mut self, node: NodeId) {
        node.remove_subtree(&mut self.arena);
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.arena.get(node)?.parent()
    }

    pub fn children(&self, parent: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        parent.children(&self.arena)
    }

    /// Depth-first descendants, including `node` itself.
    pub fn descendants(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        node.descendants(&self.arena)
    }

    /// Ancestors from `node`'s parent up to the root.
    pub fn ancestors(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        node.ancestors(&self.arena).skip(1)
    }

    pub fn tag(&self, node: NodeId) -> Option<&str> {
        self.get(node)
            .and_then(|d| d.name())
            .map(|n| n.local.as_str())
    }

    pub fn attribute(&self, node: NodeId, name: &QName) -> Option<&str> {
        self.get(node)
            .and_then(|d| d.attributes())
            .and_then(|attrs| attrs.iter().find(|a| &a.name == name))
            .map(|a| a.value.as_str())
    }

    pub fn set_attribute(&mut self, node: NodeId, name: &QName, value: &str) {
        if let Some(data) = self.get_mut(node) {
            if let Some(attrs) = data.attributes_mut() {
                if let Some(attr) = attrs.iter_mut().find(|a| &a.name == name) {
                    attr.value = value.to_string();
                } else {
                    attrs.push(super::name::Attribute::new(name.clone(), value));
                }
            }
        }
    }

    pub fn remove_attribute(&mut self, node: NodeId, name: &QName) {
        if let Some(data) = self.get_mut(node) {
            if let Some(attrs) = data.attributes_mut() {
                attrs.retain(|a| &a.name != name);
            }
        }
    }

    /// Concatenated text content of the subtree rooted at `node`.
    pub fn subtree_text(&self, node: NodeId) -> String {
        let mut out = String::new();
        for id in self.descendants(node) {
            if let Some(NodeData::Text(t)) = self.get(id) {
                out.push_str(t);
            }
        }
        out
    }

    pub fn child_by_tag(&self, parent: NodeId, tag: &str) -> Option<NodeId> {
        self.children(parent).find(|&c| self.tag(c) == Some(tag))
    }

    /// Deep-copy a subtree from another tree into this one, returning the
    /// detached copy's root.
    pub fn copy_subtree_from(&mut self, source: &DocTree, source_node: NodeId) -> Option<NodeId> {
        let data = source.get(source_node)?.clone();
        let copy = self.arena.new_node(data);
        for child in source.children(source_node) {
            if let Some(child_copy) = self.copy_subtree_from(source, child) {
                copy.append(child_copy, &mut self.arena);
            }
        }
        Some(copy)
    }
}

/// A detached, self-contained subtree; used to carry formatting-property
/// children and non-text leaf content through atomization.
#[derive(Clone, Debug)]
pub struct Fragment {
    pub tree: DocTree,
    pub root: NodeId,
}

impl Fragment {
    /// Capture the subtree rooted at `node` as a standalone fragment.
    pub fn capture(source: &DocTree, node: NodeId) -> Option<Self> {
        let mut tree = DocTree::new();
        let root = tree.copy_subtree_from(source, node)?;
        tree.root = Some(root);
        Some(Self { tree, root })
    }

    /// Instantiate this fragment inside `target`, returning the detached copy.
    pub fn instantiate(&self, target: &mut DocTree) -> Option<NodeId> {
        target.copy_subtree_from(&self.tree, self.root)
    }
}
