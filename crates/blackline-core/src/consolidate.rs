//! Consolidation of many revised copies of one original into a single
//! document showing all reviewers' changes.
//!
//! The original is identity-tagged once; each revised copy is compared
//! against it with the full pipeline, and every revision-bearing block in a
//! delta is recorded in a side map keyed by its anchor block's identity
//! token (walking backward through preceding siblings when the block itself
//! is new). After all deltas are processed the anchors resolve: unanimous,
//! content-identical revisions collapse to a single attributed block, while
//! divergent ones render as visually distinguished per-revisor blocks after
//! the anchor, and the divergence is reported through the log sink.

use crate::compare::atomize::assign_uids;
use crate::compare::compare_internal;
use crate::error::{BlacklineError, Result};
use crate::hash::sha1_hex;
use crate::settings::{ComparerSettings, ConsolidateSettings, RevisedDocumentInfo};
use crate::tree::arena::Fragment;
use crate::tree::builder::append_paragraph;
use crate::tree::document::Document;
use crate::tree::name::QName;
use crate::tree::node::NodeData;
use crate::tree::schema;
use indextree::NodeId;
use std::collections::{HashMap, HashSet};

/// One revisor's pending contribution at an anchor.
struct Contribution {
    revisor: String,
    color: (u8, u8, u8),
    block: Fragment,
    /// Index into the per-revisor delta documents, for resource import.
    delta_index: usize,
    /// Punctuation/space-insensitive content hash, for unanimity detection.
    normalized: String,
    /// True when the block is a revised version of the anchor itself (the
    /// anchor is replaced on collapse); false when it is new content
    /// anchored after a preceding block.
    replaces: bool,
}

/// Consolidate all revised copies against the original.
pub fn consolidate(
    original: &Document,
    revised: &[RevisedDocumentInfo],
    settings: &ComparerSettings,
    consolidate_settings: &ConsolidateSettings,
) -> Result<Document> {
    let mut acc = original.clone();
    assign_uids(&mut acc);

    let body = acc
        .body()
        .ok_or_else(|| BlacklineError::InternalInvariant("original has no body".into()))?;
    let acc_blocks: Vec<(String, NodeId)> = acc
        .tree
        .children(body)
        .filter_map(|n| {
            acc.tree
                .attribute(n, &schema::meta::uid())
                .map(|uid| (uid.to_string(), n))
        })
        .collect();
    let known: HashSet<&str> = acc_blocks.iter().map(|(uid, _)| uid.as_str()).collect();

    // Side map: anchor identity token → pending contributions. None anchors
    // at the start of the body.
    let mut pending: HashMap<Option<String>, Vec<Contribution>> = HashMap::new();
    let mut deltas: Vec<Document> = Vec::new();

    for (delta_index, info) in revised.iter().enumerate() {
        let mut per_revisor = settings.clone();
        per_revisor.author = Some(info.revisor.clone());
        let delta = compare_internal(&acc, &info.document, &per_revisor, true)?;

        let delta_body = delta
            .body()
            .ok_or_else(|| BlacklineError::InternalInvariant("delta has no body".into()))?;
        let blocks: Vec<NodeId> = delta.tree.children(delta_body).collect();

        for (pos, &block) in blocks.iter().enumerate() {
            if !block_has_revisions(&delta, block) {
                continue;
            }
            let own_uid = delta
                .tree
                .attribute(block, &schema::meta::uid())
                .map(str::to_string);

            let (anchor, replaces) = match own_uid.as_deref().filter(|u| known.contains(u)) {
                Some(uid) => (Some(uid.to_string()), true),
                None => (anchor_before(&delta, &blocks[..pos], &known), false),
            };

            let fragment = Fragment::capture(&delta.tree, block).ok_or_else(|| {
                BlacklineError::InternalInvariant("delta block does not capture".into())
            })?;
            let normalized = normalized_text_hash(&delta, block);
            pending.entry(anchor).or_default().push(Contribution {
                revisor: info.revisor.clone(),
                color: info.color,
                block: fragment,
                delta_index,
                normalized,
                replaces,
            });
        }
        deltas.push(delta);
    }

    let total_revisors = revised.len();

    // Blocks new at the very start of the document.
    if let Some(contribs) = pending.remove(&None) {
        let insert_at = acc.tree.children(body).next();
        apply_contributions(
            &mut acc,
            AnchorPoint::BodyStart { body, before: insert_at },
            contribs,
            &deltas,
            total_revisors,
            settings,
            consolidate_settings,
        );
    }

    for (uid, node) in &acc_blocks {
        if let Some(contribs) = pending.remove(&Some(uid.clone())) {
            apply_contributions(
                &mut acc,
                AnchorPoint::Block(*node),
                contribs,
                &deltas,
                total_revisors,
                settings,
                consolidate_settings,
            );
        }
    }

    strip_all_metadata(&mut acc);
    Ok(acc)
}

enum AnchorPoint {
    Block(NodeId),
    BodyStart {
        body: NodeId,
        before: Option<NodeId>,
    },
}

fn apply_contributions(
    acc: &mut Document,
    anchor: AnchorPoint,
    contribs: Vec<Contribution>,
    deltas: &[Document],
    total_revisors: usize,
    settings: &ComparerSettings,
    consolidate_settings: &ConsolidateSettings,
) {
    let unique: HashSet<&str> = contribs.iter().map(|c| c.revisor.as_str()).collect();
    let unanimous = total_revisors > 0
        && unique.len() == total_revisors
        && contribs.len() == total_revisors
        && contribs
            .windows(2)
            .all(|w| w[0].normalized == w[1].normalized);

    if unanimous {
        let c = &contribs[0];
        let copy = c
            .block
            .instantiate(&mut acc.tree)
            .expect("captured fragment instantiates");
        insert_at(acc, &anchor, copy);
        import_block_resources(acc, &deltas[c.delta_index], copy);
        if c.replaces {
            if let AnchorPoint::Block(node) = anchor {
                acc.tree.remove(node);
            }
        }
        return;
    }

    let revisors: Vec<&str> = contribs.iter().map(|c| c.revisor.as_str()).collect();
    let message = format!(
        "revisors diverge ({} of {} agree required): {}",
        unique.len(),
        total_revisors,
        revisors.join(", ")
    );
    tracing::warn!("{}", message);
    settings.report(&message);

    let mut insert_point = anchor;
    for c in &contribs {
        for rendered in render_distinguished_block(acc, c, consolidate_settings) {
            insert_at(acc, &insert_point, rendered);
            import_block_resources(acc, &deltas[c.delta_index], rendered);
            insert_point = AnchorPoint::Block(rendered);
        }
    }
}

fn insert_at(acc: &mut Document, anchor: &AnchorPoint, node: NodeId) {
    match anchor {
        AnchorPoint::Block(after) => acc.tree.insert_after(*after, node),
        AnchorPoint::BodyStart { body, before } => match before {
            Some(first) => acc.tree.insert_before(*first, node),
            None => acc.tree.append(*body, node),
        },
    }
}

/// One revisor's divergent contribution, rendered as a visually
/// distinguished block: a single-cell table tinted with the revisor's color
/// and captioned with their name, or the caption plus raw content inline.
/// Returns detached nodes for the caller to insert in order.
fn render_distinguished_block(
    acc: &mut Document,
    c: &Contribution,
    consolidate_settings: &ConsolidateSettings,
) -> Vec<NodeId> {
    let caption = format!("Revised by {}", c.revisor);
    let fill = format!("#{:02X}{:02X}{:02X}", c.color.0, c.color.1, c.color.2);

    if consolidate_settings.use_table {
        let table = acc
            .tree
            .new_node(NodeData::element(QName::local(schema::TABLE)));
        let props = acc
            .tree
            .add_child(table, NodeData::element(QName::local(schema::TABLE_PROPS)));
        acc.tree.set_attribute(props, &schema::fill_color(), &fill);
        let row = acc
            .tree
            .add_child(table, NodeData::element(QName::local(schema::ROW)));
        acc.tree
            .add_child(row, NodeData::element(QName::local(schema::ROW_PROPS)));
        let cell = acc
            .tree
            .add_child(row, NodeData::element(QName::local(schema::CELL)));
        acc.tree
            .add_child(cell, NodeData::element(QName::local(schema::CELL_PROPS)));
        append_paragraph(&mut acc.tree, cell, &[&caption]);
        if let Some(content) = c.block.instantiate(&mut acc.tree) {
            acc.tree.append(cell, content);
        }
        vec![table]
    } else {
        let caption_para = detached_paragraph(acc, &caption);
        match c.block.instantiate(&mut acc.tree) {
            Some(content) => vec![caption_para, content],
            None => vec![caption_para],
        }
    }
}

fn detached_paragraph(acc: &mut Document, text: &str) -> NodeId {
    let para = acc
        .tree
        .new_node(NodeData::element(QName::local(schema::PARAGRAPH)));
    acc.tree.add_child(
        para,
        NodeData::element(QName::local(schema::PARAGRAPH_PROPS)),
    );
    let run = acc
        .tree
        .add_child(para, NodeData::element(QName::local(schema::RUN)));
    let t = acc
        .tree
        .add_child(run, NodeData::element(QName::local(schema::TEXT)));
    acc.tree.add_child(t, NodeData::text(text));
    para
}

/// Find the nearest preceding delta sibling whose identity is known to the
/// accumulator.
fn anchor_before(
    delta: &Document,
    preceding: &[NodeId],
    known: &HashSet<&str>,
) -> Option<String> {
    for &prev in preceding.iter().rev() {
        if let Some(uid) = delta.tree.attribute(prev, &schema::meta::uid()) {
            if known.contains(uid) {
                return Some(uid.to_string());
            }
        }
    }
    None
}

fn block_has_revisions(doc: &Document, block: NodeId) -> bool {
    doc.tree.descendants(block).any(|n| {
        matches!(
            doc.tree.tag(n),
            Some(schema::INS)
                | Some(schema::DEL)
                | Some(schema::INSERTED_ROW)
                | Some(schema::DELETED_ROW)
        )
    })
}

/// Content hash insensitive to whitespace, punctuation, and case, used to
/// decide whether revisors produced the same revision.
fn normalized_text_hash(doc: &Document, block: NodeId) -> String {
    let text: String = doc
        .tree
        .subtree_text(block)
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_uppercase)
        .collect();
    sha1_hex(&text)
}

/// Copy resources referenced by a consolidated block out of its delta into
/// the accumulator: relationship targets under fresh ids, and note bodies
/// renumbered past the accumulator's existing ids.
fn import_block_resources(acc: &mut Document, delta: &Document, block: NodeId) {
    let ref_name = schema::reference();
    let referencing: Vec<(NodeId, String)> = acc
        .tree
        .descendants(block)
        .filter_map(|n| {
            acc.tree
                .attribute(n, &ref_name)
                .map(|id| (n, id.to_string()))
        })
        .collect();
    for (node, rel_id) in referencing {
        if let Some(target) = delta.rels.get(&rel_id) {
            let new_id = acc.rels.insert(target.clone());
            acc.tree.set_attribute(node, &ref_name, &new_id);
        }
    }

    let note_refs: Vec<NodeId> = acc
        .tree
        .descendants(block)
        .filter(|&n| acc.tree.tag(n) == Some(schema::NOTE_REF))
        .collect();
    for note_ref in note_refs {
        let kind = match acc.tree.attribute(note_ref, &schema::note_kind()) {
            Some(schema::ENDNOTE) => schema::ENDNOTE,
            _ => schema::FOOTNOTE,
        };
        let Some(old_id) = acc
            .tree
            .attribute(note_ref, &schema::note_id())
            .map(str::to_string)
        else {
            continue;
        };
        let Some(src_note) = delta.find_note(kind, &old_id) else {
            continue;
        };
        let new_id = next_note_id(acc, kind);
        let Some(section) = acc.ensure_notes_section(kind) else {
            continue;
        };
        if let Some(copy) = acc.tree.copy_subtree_from(&delta.tree, src_note) {
            acc.tree.append(section, copy);
            acc.tree.set_attribute(copy, &schema::note_id(), &new_id);
            acc.tree.set_attribute(note_ref, &schema::note_id(), &new_id);
        }
    }
}

fn next_note_id(acc: &Document, kind: &str) -> String {
    let section_tag = if kind == schema::FOOTNOTE {
        schema::FOOTNOTES
    } else {
        schema::ENDNOTES
    };
    let max = acc
        .tree
        .child_by_tag(acc.root, section_tag)
        .map(|section| {
            acc.tree
                .children(section)
                .filter_map(|n| acc.tree.attribute(n, &schema::note_id()))
                .filter_map(|id| id.parse::<u32>().ok())
                .max()
                .unwrap_or(0)
        })
        .unwrap_or(0);
    (max + 1).to_string()
}

fn strip_all_metadata(doc: &mut Document) {
    let nodes: Vec<NodeId> = doc.tree.descendants(doc.root).collect();
    for node in nodes {
        if let Some(data) = doc.tree.get_mut(node) {
            if let Some(attrs) = data.attributes_mut() {
                attrs.retain(|a| a.name.namespace.as_deref() != Some(schema::meta::NS));
            }
        }
    }
}
