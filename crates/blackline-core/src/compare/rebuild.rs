//! Reassembly of the classified atom stream into an output document with
//! insert/delete markup.
//!
//! The rebuild groups the flattened atoms by identity token at each ancestor
//! depth, reconstructing each structural level with its formatting-property
//! children. Correlation statuses travel as metadata attributes until the
//! marking pass converts them into `ins`/`del` markup in the dialect's
//! convention: wrappers around runs (or around spans inside a mixed run),
//! revision children inside paragraph properties for paragraph marks,
//! row-level markers inside row properties, and explicit wrappers around
//! math. Cross-part resources referenced from the output are copied into the
//! output's relationship set under fresh ids.

use crate::compare::unit::{Atom, ContentToken, Status};
use crate::error::{BlacklineError, Result};
use crate::settings::ComparerSettings;
use crate::tree::arena::DocTree;
use crate::tree::document::Document;
use crate::tree::name::{Attribute, QName};
use crate::tree::node::NodeData;
use crate::tree::schema;
use crate::util::group_adjacent_ranges;
use indextree::NodeId;

/// Mints sequential revision-mark ids. Owned by one rebuild invocation;
/// never process-global, so parallel comparisons cannot interleave ids.
#[derive(Debug, Default)]
pub struct RevisionIds {
    next: u32,
}

impl RevisionIds {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&mut self) -> u32 {
        let id = self.next;
        self.next += 1;
        id
    }
}

/// Author/date stamped on every generated revision mark.
#[derive(Debug, Clone)]
struct RevisionStamp {
    author: String,
    date: String,
}

impl RevisionStamp {
    fn from_settings(settings: &ComparerSettings) -> Self {
        Self {
            author: settings
                .author
                .clone()
                .unwrap_or_else(|| "Unknown".to_string()),
            date: settings
                .date
                .clone()
                .unwrap_or_else(|| chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()),
        }
    }
}

/// Rebuild the output document from the classified atom stream.
///
/// `keep_identity` preserves identity tokens on block-level elements in the
/// output; the consolidator needs them to anchor contributions.
pub fn rebuild(
    atoms: &[Atom],
    original: &Document,
    revised: &Document,
    settings: &ComparerSettings,
    keep_identity: bool,
) -> Result<Document> {
    let mut out = Document::new();
    let body = out
        .body()
        .ok_or_else(|| BlacklineError::InternalInvariant("output document has no body".into()))?;

    coalesce_level(&mut out.tree, body, atoms, 0)?;

    copy_related_parts(&mut out, original, revised);
    merge_note_sections(&mut out, original, revised);

    let stamp = RevisionStamp::from_settings(settings);
    let mut ids = RevisionIds::new();
    mark_revised_rows(&mut out.tree, &stamp, &mut ids);
    apply_revision_marks(&mut out.tree, out.root, &stamp, &mut ids)?;

    strip_metadata(&mut out.tree, out.root, keep_identity);
    merge_adjacent_runs(&mut out.tree, out.root);
    merge_adjacent_text(&mut out.tree, out.root);
    conjoin_paragraph_marks(&mut out.tree, out.root);

    Ok(out)
}

// ---------------------------------------------------------------------------
// Recursive coalesce
// ---------------------------------------------------------------------------

fn uid_at(atom: &Atom, level: usize) -> String {
    atom.ancestor_uids.get(level).cloned().unwrap_or_default()
}

fn coalesce_level(tree: &mut DocTree, parent: NodeId, atoms: &[Atom], level: usize) -> Result<()> {
    let groups = group_adjacent_ranges(atoms, |a, _| uid_at(a, level));
    for (uid, range) in groups {
        emit_group(tree, parent, &atoms[range], level, &uid)?;
    }
    Ok(())
}

fn emit_group(
    tree: &mut DocTree,
    parent: NodeId,
    slice: &[Atom],
    level: usize,
    uid: &str,
) -> Result<()> {
    if uid.is_empty() {
        for atom in slice {
            emit_token_element(tree, parent, atom);
        }
        return Ok(());
    }

    let first = &slice[0];
    let ancestor = first.ancestors.get(level).ok_or_else(|| {
        BlacklineError::InternalInvariant(format!(
            "atom carries identity at level {} but no ancestor there",
            level
        ))
    })?;

    match ancestor.tag.as_str() {
        schema::PARAGRAPH => reconstruct_paragraph(tree, parent, slice, level),
        schema::TEXT => {
            reconstruct_text(tree, parent, slice);
            Ok(())
        }
        schema::BREAK
        | schema::TAB
        | schema::FIELD
        | schema::SYMBOL
        | schema::NOTE_REF
        | schema::MATH
        | schema::IMAGE
        | schema::OBJECT => {
            for atom in slice {
                emit_token_element(tree, parent, atom);
            }
            Ok(())
        }
        _ => {
            // Generic container: run, table, row, cell, textbox, link.
            let attrs = ancestor.attributes.as_ref().clone();
            let name = QName::local(&ancestor.tag);
            let element = tree.add_child(parent, NodeData::element_with_attrs(name, attrs));
            // The element's identity is the identity it was grouped under,
            // which for surviving content anchors to the original document.
            tree.set_attribute(element, &schema::meta::uid(), uid);
            if let Some(props) = &ancestor.props {
                if let Some(copy) = props.instantiate(tree) {
                    tree.append(element, copy);
                }
            }
            coalesce_level(tree, element, slice, level + 1)
        }
    }
}

/// Paragraphs take their formatting from the paragraph-mark atom that landed
/// in them (which, after identity propagation, may have originated in a
/// different source paragraph than some of the content). The mark's property
/// fragment is emitted first.
fn reconstruct_paragraph(
    tree: &mut DocTree,
    parent: NodeId,
    slice: &[Atom],
    level: usize,
) -> Result<()> {
    let ancestor = &slice[0].ancestors[level];
    let attrs = ancestor.attributes.as_ref().clone();
    let para = tree.add_child(
        parent,
        NodeData::element_with_attrs(QName::local(schema::PARAGRAPH), attrs),
    );
    let uid = uid_at(&slice[0], level);
    tree.set_attribute(para, &schema::meta::uid(), &uid);

    let groups = group_adjacent_ranges(slice, |a, _| uid_at(a, level + 1));

    // Paragraph marks first, so properties lead the paragraph.
    for (uid, range) in &groups {
        if uid.is_empty() {
            for atom in &slice[range.clone()] {
                if atom.is_paragraph_mark() {
                    emit_token_element(tree, para, atom);
                }
            }
        }
    }
    for (uid, range) in groups {
        if uid.is_empty() {
            for atom in &slice[range.clone()] {
                if !atom.is_paragraph_mark() {
                    emit_token_element(tree, para, atom);
                }
            }
        } else {
            emit_group(tree, para, &slice[range], level + 1, &uid)?;
        }
    }
    Ok(())
}

/// Rebuild text elements, splitting where correlation status changes so the
/// marking pass can wrap each span independently.
fn reconstruct_text(tree: &mut DocTree, parent: NodeId, slice: &[Atom]) {
    let groups = group_adjacent_ranges(slice, |a, _| a.status);
    for (status, range) in groups {
        let text: String = slice[range]
            .iter()
            .filter_map(|a| a.token.display_char())
            .collect();
        if text.is_empty() {
            continue;
        }
        let element = tree.add_child(
            parent,
            NodeData::element(QName::local(schema::TEXT)),
        );
        set_status_attr(tree, element, status);
        tree.add_child(element, NodeData::text(&text));
    }
}

/// Emit one element for a single atom's token.
fn emit_token_element(tree: &mut DocTree, parent: NodeId, atom: &Atom) {
    let element = match &atom.token {
        ContentToken::Text(ch) => {
            let t = tree.add_child(parent, NodeData::element(QName::local(schema::TEXT)));
            tree.add_child(t, NodeData::text(&ch.to_string()));
            t
        }
        ContentToken::ParagraphMark => match &atom.content {
            Some(fragment) => {
                let copy = fragment
                    .instantiate(tree)
                    .expect("paragraph-props fragment instantiates");
                tree.append(parent, copy);
                copy
            }
            None => tree.add_child(
                parent,
                NodeData::element(QName::local(schema::PARAGRAPH_PROPS)),
            ),
        },
        ContentToken::Break => tree.add_child(parent, NodeData::element(QName::local(schema::BREAK))),
        ContentToken::Tab => tree.add_child(parent, NodeData::element(QName::local(schema::TAB))),
        ContentToken::Field { instruction } => {
            let f = tree.add_child(parent, NodeData::element(QName::local(schema::FIELD)));
            tree.set_attribute(f, &schema::field_instruction(), instruction);
            f
        }
        ContentToken::Symbol { font, code } => {
            let s = tree.add_child(parent, NodeData::element(QName::local(schema::SYMBOL)));
            tree.set_attribute(s, &schema::symbol_font(), font);
            tree.set_attribute(s, &schema::symbol_code(), code);
            s
        }
        ContentToken::NoteRef { kind, id, .. } => {
            let n = tree.add_child(parent, NodeData::element(QName::local(schema::NOTE_REF)));
            tree.set_attribute(n, &schema::note_kind(), kind.tag());
            tree.set_attribute(n, &schema::note_id(), id);
            n
        }
        ContentToken::Math { .. } | ContentToken::Image { .. } | ContentToken::Object { .. } => {
            match &atom.content {
                Some(fragment) => {
                    let copy = fragment
                        .instantiate(tree)
                        .expect("leaf content fragment instantiates");
                    tree.append(parent, copy);
                    copy
                }
                None => tree.add_child(parent, NodeData::element(QName::local(atom.token.tag()))),
            }
        }
    };
    set_status_attr(tree, element, atom.status);
}

fn set_status_attr(tree: &mut DocTree, element: NodeId, status: Status) {
    match status {
        Status::Inserted => tree.set_attribute(element, &schema::meta::status(), "Inserted"),
        Status::Deleted => tree.set_attribute(element, &schema::meta::status(), "Deleted"),
        _ => {}
    }
}

// ---------------------------------------------------------------------------
// Relationship and note copying
// ---------------------------------------------------------------------------

/// Copy every referenced resource into the output's relationship set under a
/// fresh id. Deleted content resolves against the original document's set,
/// everything else against the revised document's. A sub-part target travels
/// as a whole, its internal relationship set included, which keeps nested
/// references resolvable.
fn copy_related_parts(out: &mut Document, original: &Document, revised: &Document) {
    let status_name = schema::meta::status();
    let ref_name = schema::reference();

    let mut pending: Vec<(NodeId, String, bool)> = Vec::new();
    collect_references(out, out.root, false, &status_name, &ref_name, &mut pending);

    for (node, rel_id, from_original) in pending {
        let source = if from_original { original } else { revised };
        if let Some(target) = source.rels.get(&rel_id) {
            let new_id = out.rels.insert(target.clone());
            out.tree.set_attribute(node, &ref_name, &new_id);
        }
    }
}

fn collect_references(
    doc: &Document,
    node: NodeId,
    inherited_deleted: bool,
    status_name: &QName,
    ref_name: &QName,
    out: &mut Vec<(NodeId, String, bool)>,
) {
    let deleted = match doc.tree.attribute(node, status_name) {
        Some("Deleted") => true,
        Some(_) => false,
        None => inherited_deleted,
    };
    if let Some(rel_id) = doc.tree.attribute(node, ref_name) {
        out.push((node, rel_id.to_string(), deleted));
    }
    let children: Vec<NodeId> = doc.tree.children(node).collect();
    for child in children {
        collect_references(doc, child, deleted, status_name, ref_name, out);
    }
}

/// Carry the revised document's note bodies into the output, then copy the
/// notes behind deleted references from the original under fresh ids.
fn merge_note_sections(out: &mut Document, original: &Document, revised: &Document) {
    for kind in [schema::FOOTNOTE, schema::ENDNOTE] {
        let section_tag = if kind == schema::FOOTNOTE {
            schema::FOOTNOTES
        } else {
            schema::ENDNOTES
        };
        if let Some(src_section) = revised.tree.child_by_tag(revised.root, section_tag) {
            let dst_section = out
                .ensure_notes_section(kind)
                .expect("known note kind has a section");
            let notes: Vec<NodeId> = revised.tree.children(src_section).collect();
            for note in notes {
                if let Some(copy) = out.tree.copy_subtree_from(&revised.tree, note) {
                    out.tree.append(dst_section, copy);
                }
            }
        }
    }

    // Deleted note references still need their bodies present.
    let status_name = schema::meta::status();
    let deleted_refs: Vec<NodeId> = out
        .tree
        .descendants(out.root)
        .filter(|&n| {
            out.tree.tag(n) == Some(schema::NOTE_REF)
                && out.tree.attribute(n, &status_name) == Some("Deleted")
        })
        .collect();

    for note_ref in deleted_refs {
        let kind = match out.tree.attribute(note_ref, &schema::note_kind()) {
            Some(schema::ENDNOTE) => schema::ENDNOTE,
            _ => schema::FOOTNOTE,
        };
        let Some(old_id) = out
            .tree
            .attribute(note_ref, &schema::note_id())
            .map(str::to_string)
        else {
            continue;
        };
        let Some(src_note) = original.find_note(kind, &old_id) else {
            continue;
        };
        let new_id = next_note_id(out, kind);
        let Some(section) = out.ensure_notes_section(kind) else {
            continue;
        };
        if let Some(copy) = out.tree.copy_subtree_from(&original.tree, src_note) {
            out.tree.append(section, copy);
            out.tree.set_attribute(copy, &schema::note_id(), &new_id);
            out.tree.set_attribute(note_ref, &schema::note_id(), &new_id);
        }
    }
}

fn next_note_id(out: &Document, kind: &str) -> String {
    let section_tag = if kind == schema::FOOTNOTE {
        schema::FOOTNOTES
    } else {
        schema::ENDNOTES
    };
    let max = out
        .tree
        .child_by_tag(out.root, section_tag)
        .map(|section| {
            out.tree
                .children(section)
                .filter_map(|n| out.tree.attribute(n, &schema::note_id()))
                .filter_map(|id| id.parse::<u32>().ok())
                .max()
                .unwrap_or(0)
        })
        .unwrap_or(0);
    (max + 1).to_string()
}

// ---------------------------------------------------------------------------
// Revision marking
// ---------------------------------------------------------------------------

/// Rows whose entire content carries one status get the row-level marker in
/// their row properties, matching the dialect's row revision convention.
fn mark_revised_rows(tree: &mut DocTree, stamp: &RevisionStamp, ids: &mut RevisionIds) {
    let Some(root) = tree.root() else { return };
    let status_name = schema::meta::status();

    let rows: Vec<NodeId> = tree
        .descendants(root)
        .filter(|&n| tree.tag(n) == Some(schema::ROW))
        .collect();

    for row in rows {
        let statuses: Vec<String> = tree
            .descendants(row)
            .filter_map(|n| tree.attribute(n, &status_name))
            .map(str::to_string)
            .collect();
        if statuses.is_empty() {
            continue;
        }
        let uniform = statuses.windows(2).all(|w| w[0] == w[1]);
        if !uniform {
            continue;
        }
        let marker_tag = match statuses[0].as_str() {
            "Deleted" => schema::DELETED_ROW,
            "Inserted" => schema::INSERTED_ROW,
            _ => continue,
        };
        let props = match tree.child_by_tag(row, schema::ROW_PROPS) {
            Some(p) => p,
            None => {
                let p = tree.new_node(NodeData::element(QName::local(schema::ROW_PROPS)));
                let first_child = tree.children(row).next();
                match first_child {
                    Some(first) => tree.insert_before(first, p),
                    None => tree.append(row, p),
                }
                p
            }
        };
        let marker = tree.add_child(props, NodeData::element(QName::local(marker_tag)));
        stamp_revision(tree, marker, stamp, ids);
    }
}

fn stamp_revision(tree: &mut DocTree, node: NodeId, stamp: &RevisionStamp, ids: &mut RevisionIds) {
    tree.set_attribute(node, &schema::rev_id(), &ids.next_id().to_string());
    tree.set_attribute(node, &schema::author(), &stamp.author);
    tree.set_attribute(node, &schema::date(), &stamp.date);
}

fn revision_wrapper(
    tree: &mut DocTree,
    status: &str,
    stamp: &RevisionStamp,
    ids: &mut RevisionIds,
) -> NodeId {
    let tag = if status == "Deleted" {
        schema::DEL
    } else {
        schema::INS
    };
    let node = tree.new_node(NodeData::element(QName::local(tag)));
    stamp_revision(tree, node, stamp, ids);
    node
}

/// Convert metadata status attributes into `ins`/`del` markup.
fn apply_revision_marks(
    tree: &mut DocTree,
    node: NodeId,
    stamp: &RevisionStamp,
    ids: &mut RevisionIds,
) -> Result<()> {
    let Some(tag) = tree.tag(node).map(str::to_string) else {
        return Ok(());
    };

    match tag.as_str() {
        schema::RUN => handle_run(tree, node, stamp, ids),
        schema::PARAGRAPH_PROPS => {
            handle_paragraph_props(tree, node, stamp, ids);
            Ok(())
        }
        schema::MATH => {
            handle_wrappable(tree, node, stamp, ids);
            Ok(())
        }
        _ => {
            let children: Vec<NodeId> = tree.children(node).collect();
            for child in children {
                apply_revision_marks(tree, child, stamp, ids)?;
            }
            Ok(())
        }
    }
}

fn handle_run(
    tree: &mut DocTree,
    run: NodeId,
    stamp: &RevisionStamp,
    ids: &mut RevisionIds,
) -> Result<()> {
    let status_name = schema::meta::status();

    // Content children that participate in the wrapping decision. Textboxes
    // track their own revisions and are excluded.
    let children: Vec<NodeId> = tree.children(run).collect();
    let mut content: Vec<(NodeId, Option<String>)> = Vec::new();
    let mut nested: Vec<NodeId> = Vec::new();
    for child in &children {
        match tree.tag(*child) {
            Some(schema::RUN_PROPS) => {}
            Some(schema::TEXTBOX) => nested.push(*child),
            Some(_) => content.push((
                *child,
                tree.attribute(*child, &status_name).map(str::to_string),
            )),
            None => {}
        }
    }

    let statuses: Vec<&String> = content.iter().filter_map(|(_, s)| s.as_ref()).collect();
    if !statuses.is_empty() {
        let uniform = statuses.windows(2).all(|w| w[0] == w[1])
            && statuses.len() == content.len();
        if uniform {
            let status = statuses[0].clone();
            for (child, _) in &content {
                tree.remove_attribute(*child, &status_name);
            }
            let wrapper = revision_wrapper(tree, &status, stamp, ids);
            tree.insert_before(run, wrapper);
            tree.detach(run);
            tree.append(wrapper, run);
        } else {
            // Mixed run: wrap each maximal same-status span inside the run.
            let spans = group_adjacent_ranges(&content, |(_, s), _| s.clone());
            for (status, range) in spans {
                let Some(status) = status else { continue };
                let span = &content[range];
                let wrapper = revision_wrapper(tree, &status, stamp, ids);
                tree.insert_before(span[0].0, wrapper);
                for (child, _) in span {
                    tree.remove_attribute(*child, &status_name);
                    tree.detach(*child);
                    tree.append(wrapper, *child);
                }
            }
        }
    }

    for textbox in nested {
        apply_revision_marks(tree, textbox, stamp, ids)?;
    }
    Ok(())
}

/// The paragraph mark's revision lives as an `ins`/`del` child inside the
/// paragraph properties.
fn handle_paragraph_props(
    tree: &mut DocTree,
    props: NodeId,
    stamp: &RevisionStamp,
    ids: &mut RevisionIds,
) {
    let status_name = schema::meta::status();
    let Some(status) = tree.attribute(props, &status_name).map(str::to_string) else {
        return;
    };
    tree.remove_attribute(props, &status_name);
    let mark = revision_wrapper(tree, &status, stamp, ids);
    tree.append(props, mark);
}

/// Math wraps in explicit marker elements rather than carrying a status
/// attribute.
fn handle_wrappable(tree: &mut DocTree, node: NodeId, stamp: &RevisionStamp, ids: &mut RevisionIds) {
    let status_name = schema::meta::status();
    let Some(status) = tree.attribute(node, &status_name).map(str::to_string) else {
        return;
    };
    tree.remove_attribute(node, &status_name);
    let wrapper = revision_wrapper(tree, &status, stamp, ids);
    tree.insert_before(node, wrapper);
    tree.detach(node);
    tree.append(wrapper, node);
}

// ---------------------------------------------------------------------------
// Cleanup passes
// ---------------------------------------------------------------------------

/// Drop bookkeeping attributes. With `keep_identity`, block-level elements
/// keep their identity token for downstream anchoring.
fn strip_metadata(tree: &mut DocTree, root: NodeId, keep_identity: bool) {
    let uid_name = schema::meta::uid();
    let nodes: Vec<NodeId> = tree.descendants(root).collect();
    for node in nodes {
        let keep_uid = keep_identity
            && matches!(
                tree.tag(node),
                Some(schema::PARAGRAPH) | Some(schema::TABLE)
            );
        let kept = if keep_uid {
            tree.attribute(node, &uid_name).map(str::to_string)
        } else {
            None
        };
        if let Some(data) = tree.get_mut(node) {
            if let Some(attrs) = data.attributes_mut() {
                attrs.retain(|a| a.name.namespace.as_deref() != Some(schema::meta::NS));
            }
        }
        if let Some(uid) = kept {
            tree.set_attribute(node, &uid_name, &uid);
        }
    }
}

fn attributes_of(tree: &DocTree, node: NodeId) -> Vec<Attribute> {
    tree.get(node)
        .and_then(|d| d.attributes())
        .map(|a| a.to_vec())
        .unwrap_or_default()
}

/// Stable rendering of a subtree, used to compare run properties for
/// mergeability.
fn subtree_signature(tree: &DocTree, node: NodeId) -> String {
    let mut out = String::new();
    render_signature(tree, node, &mut out);
    out
}

fn render_signature(tree: &DocTree, node: NodeId, out: &mut String) {
    match tree.get(node) {
        Some(NodeData::Element { name, attributes }) => {
            out.push('<');
            out.push_str(&name.local);
            for attr in attributes {
                out.push(' ');
                out.push_str(&attr.name.local);
                out.push('=');
                out.push_str(&attr.value);
            }
            out.push('>');
            for child in tree.children(node) {
                render_signature(tree, child, out);
            }
            out.push_str("</>");
        }
        Some(NodeData::Text(t)) => out.push_str(t),
        None => {}
    }
}

/// Merge adjacent sibling runs with identical attributes and identical run
/// properties. Fragmentation at unit granularity produces many of these.
fn merge_adjacent_runs(tree: &mut DocTree, root: NodeId) {
    let parents: Vec<NodeId> = tree
        .descendants(root)
        .filter(|&n| {
            tree.children(n)
                .filter(|&c| tree.tag(c) == Some(schema::RUN))
                .count()
                > 1
        })
        .collect();

    for parent in parents {
        loop {
            let children: Vec<NodeId> = tree.children(parent).collect();
            let mut merged = false;
            for pair in children.windows(2) {
                let (a, b) = (pair[0], pair[1]);
                if tree.tag(a) != Some(schema::RUN) || tree.tag(b) != Some(schema::RUN) {
                    continue;
                }
                if attributes_of(tree, a) != attributes_of(tree, b) {
                    continue;
                }
                let props_a = tree.child_by_tag(a, schema::RUN_PROPS);
                let props_b = tree.child_by_tag(b, schema::RUN_PROPS);
                let sig_a = props_a.map(|p| subtree_signature(tree, p));
                let sig_b = props_b.map(|p| subtree_signature(tree, p));
                if sig_a != sig_b {
                    continue;
                }
                // Move b's content (minus its duplicate props) into a.
                let b_children: Vec<NodeId> = tree.children(b).collect();
                for child in b_children {
                    if Some(child) == props_b {
                        continue;
                    }
                    tree.detach(child);
                    tree.append(a, child);
                }
                tree.remove(b);
                merged = true;
                break;
            }
            if !merged {
                break;
            }
        }
    }
}

/// Merge adjacent sibling text elements with identical attributes.
fn merge_adjacent_text(tree: &mut DocTree, root: NodeId) {
    let parents: Vec<NodeId> = tree
        .descendants(root)
        .filter(|&n| {
            tree.children(n)
                .filter(|&c| tree.tag(c) == Some(schema::TEXT))
                .count()
                > 1
        })
        .collect();

    for parent in parents {
        loop {
            let children: Vec<NodeId> = tree.children(parent).collect();
            let mut merged = false;
            for pair in children.windows(2) {
                let (a, b) = (pair[0], pair[1]);
                if tree.tag(a) != Some(schema::TEXT) || tree.tag(b) != Some(schema::TEXT) {
                    continue;
                }
                if attributes_of(tree, a) != attributes_of(tree, b) {
                    continue;
                }
                let combined = format!("{}{}", tree.subtree_text(a), tree.subtree_text(b));
                let a_children: Vec<NodeId> = tree.children(a).collect();
                for child in a_children {
                    tree.remove(child);
                }
                tree.add_child(a, NodeData::text(&combined));
                tree.remove(b);
                merged = true;
                break;
            }
            if !merged {
                break;
            }
        }
    }
}

/// A paragraph that collected two paragraph marks (one deleted, one
/// surviving) conjoins them, keeping the first's formatting.
fn conjoin_paragraph_marks(tree: &mut DocTree, root: NodeId) {
    let paragraphs: Vec<NodeId> = tree
        .descendants(root)
        .filter(|&n| tree.tag(n) == Some(schema::PARAGRAPH))
        .collect();
    for para in paragraphs {
        let marks: Vec<NodeId> = tree
            .children(para)
            .filter(|&c| tree.tag(c) == Some(schema::PARAGRAPH_PROPS))
            .collect();
        for extra in marks.into_iter().skip(1) {
            tree.remove(extra);
        }
    }
}
