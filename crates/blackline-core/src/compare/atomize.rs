//! Decomposition of a document tree into the ordered atom list.
//!
//! Recursion is table-driven: structural containers recurse into their
//! children minus the formatting-property child, text splits into one atom
//! per character, and non-text leaves become one atom each. Every atom
//! records its ancestor chain (root→leaf, body excluded) with the identity
//! token minted for each element before atomization.

use crate::error::{BlacklineError, Result};
use crate::hash::{self, subtree_hash};
use crate::settings::ComparerSettings;
use crate::tree::arena::Fragment;
use crate::tree::document::Document;
use crate::tree::schema;
use crate::compare::unit::{Ancestor, Atom, ContentToken, NoteKind, Side};
use indextree::NodeId;
use std::sync::Arc;

/// Reject constructs the comparison model cannot represent. Runs before any
/// atom is produced; a failure aborts the whole comparison.
pub fn verify_supported(doc: &Document) -> Result<()> {
    for node in doc.tree.descendants(doc.root) {
        if let Some(tag) = doc.tree.tag(node) {
            if schema::UNSUPPORTED.contains(tag) {
                return Err(BlacklineError::UnsupportedContent {
                    construct: tag.to_string(),
                });
            }
        }
    }
    Ok(())
}

/// Mint a fresh identity token.
pub fn mint_uid() -> String {
    uuid::Uuid::new_v4().as_simple().to_string()
}

/// Attach an identity token to every element that lacks one.
pub fn assign_uids(doc: &mut Document) {
    let uid_name = schema::meta::uid();
    let nodes: Vec<NodeId> = doc.tree.descendants(doc.root).collect();
    for node in nodes {
        let is_element = doc.tree.get(node).is_some_and(|d| d.is_element());
        if is_element && doc.tree.attribute(node, &uid_name).is_none() {
            doc.tree.set_attribute(node, &uid_name, &mint_uid());
        }
    }
}

/// Produce the ordered atom list for the document body.
pub fn atomize(doc: &Document, side: Side, settings: &ComparerSettings) -> Result<Vec<Atom>> {
    let body = doc.body().ok_or_else(|| {
        BlacklineError::InternalInvariant("document has no body".to_string())
    })?;

    let mut atoms = Vec::new();
    for child in doc.tree.children(body) {
        recurse(doc, child, side, settings, &mut atoms)?;
    }
    Ok(atoms)
}

fn recurse(
    doc: &Document,
    node: NodeId,
    side: Side,
    settings: &ComparerSettings,
    atoms: &mut Vec<Atom>,
) -> Result<()> {
    let Some(tag) = doc.tree.tag(node) else {
        // Bare text outside a text element carries no comparable content.
        return Ok(());
    };

    if schema::DISCARDABLE.contains(tag) {
        return Ok(());
    }

    match tag {
        schema::PARAGRAPH => {
            for child in doc.tree.children(node) {
                if doc.tree.tag(child) != Some(schema::PARAGRAPH_PROPS) {
                    recurse(doc, child, side, settings, atoms)?;
                }
            }
            // The paragraph mark comes after the paragraph's content, so a
            // partial-paragraph match can never swallow the mark.
            let props = doc
                .tree
                .child_by_tag(node, schema::PARAGRAPH_PROPS)
                .and_then(|p| Fragment::capture(&doc.tree, p))
                .map(Arc::new);
            let ancestors = ancestor_chain(doc, node);
            atoms.push(Atom::new(
                ContentToken::ParagraphMark,
                props,
                ancestors,
                side,
                settings,
            ));
            Ok(())
        }
        schema::RUN => {
            for child in doc.tree.children(node) {
                if doc.tree.tag(child) != Some(schema::RUN_PROPS) {
                    recurse(doc, child, side, settings, atoms)?;
                }
            }
            Ok(())
        }
        schema::TEXT => {
            let text = doc.tree.subtree_text(node);
            let ancestors = ancestor_chain(doc, node);
            for ch in text.chars() {
                atoms.push(Atom::new(
                    ContentToken::Text(ch),
                    None,
                    Arc::clone(&ancestors),
                    side,
                    settings,
                ));
            }
            Ok(())
        }
        schema::BREAK => {
            push_leaf(doc, node, ContentToken::Break, None, side, settings, atoms);
            Ok(())
        }
        schema::TAB => {
            push_leaf(doc, node, ContentToken::Tab, None, side, settings, atoms);
            Ok(())
        }
        schema::FIELD => {
            let instruction = doc
                .tree
                .attribute(node, &schema::field_instruction())
                .unwrap_or_default()
                .to_string();
            push_leaf(
                doc,
                node,
                ContentToken::Field { instruction },
                None,
                side,
                settings,
                atoms,
            );
            Ok(())
        }
        schema::SYMBOL => {
            let font = doc
                .tree
                .attribute(node, &schema::symbol_font())
                .unwrap_or_default()
                .to_string();
            let code = doc
                .tree
                .attribute(node, &schema::symbol_code())
                .unwrap_or_default()
                .to_string();
            push_leaf(
                doc,
                node,
                ContentToken::Symbol { font, code },
                None,
                side,
                settings,
                atoms,
            );
            Ok(())
        }
        schema::MATH => {
            let hash = subtree_hash(doc, node, settings.case_insensitive);
            let fragment = Fragment::capture(&doc.tree, node).map(Arc::new);
            push_leaf(
                doc,
                node,
                ContentToken::Math { hash },
                fragment,
                side,
                settings,
                atoms,
            );
            Ok(())
        }
        schema::IMAGE | schema::OBJECT => {
            let hash = subtree_hash(doc, node, settings.case_insensitive);
            let reference = doc
                .tree
                .attribute(node, &schema::reference())
                .unwrap_or_default()
                .to_string();
            let fragment = Fragment::capture(&doc.tree, node).map(Arc::new);
            let token = if tag == schema::IMAGE {
                ContentToken::Image { hash, reference }
            } else {
                ContentToken::Object { hash, reference }
            };
            push_leaf(doc, node, token, fragment, side, settings, atoms);
            Ok(())
        }
        schema::NOTE_REF => {
            let kind = match doc.tree.attribute(node, &schema::note_kind()) {
                Some(schema::ENDNOTE) => NoteKind::Endnote,
                _ => NoteKind::Footnote,
            };
            let id = doc
                .tree
                .attribute(node, &schema::note_id())
                .unwrap_or_default()
                .to_string();
            // A dangling note reference hashes against a placeholder instead
            // of failing the comparison.
            let content_hash = doc
                .find_note(kind.tag(), &id)
                .map(|note| subtree_hash(doc, note, settings.case_insensitive))
                .unwrap_or_else(|| hash::UNRESOLVED_REFERENCE.to_string());
            push_leaf(
                doc,
                node,
                ContentToken::NoteRef {
                    kind,
                    id,
                    content_hash,
                },
                None,
                side,
                settings,
                atoms,
            );
            Ok(())
        }
        // Structural containers recurse, skipping their property child.
        schema::TABLE | schema::ROW | schema::CELL | schema::TEXTBOX | schema::LINK
        | schema::INS | schema::DEL => {
            let skip = schema::props_tag_for(tag);
            for child in doc.tree.children(node) {
                if doc.tree.tag(child) != skip {
                    recurse(doc, child, side, settings, atoms)?;
                }
            }
            Ok(())
        }
        _ => {
            for child in doc.tree.children(node) {
                recurse(doc, child, side, settings, atoms)?;
            }
            Ok(())
        }
    }
}

fn push_leaf(
    doc: &Document,
    node: NodeId,
    token: ContentToken,
    content: Option<Arc<Fragment>>,
    side: Side,
    settings: &ComparerSettings,
    atoms: &mut Vec<Atom>,
) {
    let ancestors = ancestor_chain(doc, node);
    atoms.push(Atom::new(token, content, ancestors, side, settings));
}

/// Ancestors of `node` (including `node` itself) from the nearest structural
/// root down, body and above excluded, root→leaf order.
fn ancestor_chain(doc: &Document, node: NodeId) -> Arc<Vec<Ancestor>> {
    let uid_name = schema::meta::uid();
    let mut chain = Vec::new();

    let mut current = Some(node);
    while let Some(id) = current {
        let Some(data) = doc.tree.get(id) else { break };
        let Some(name) = data.name() else {
            current = doc.tree.parent(id);
            continue;
        };
        let tag = name.local.clone();
        if tag == schema::BODY
            || tag == schema::DOCUMENT
            || tag == schema::FOOTNOTE
            || tag == schema::ENDNOTE
        {
            break;
        }

        let uid = doc
            .tree
            .attribute(id, &uid_name)
            .unwrap_or_default()
            .to_string();
        let attributes = Arc::new(data.attributes().unwrap_or(&[]).to_vec());
        let props = schema::props_tag_for(&tag)
            .and_then(|props_tag| doc.tree.child_by_tag(id, props_tag))
            .and_then(|p| Fragment::capture(&doc.tree, p))
            .map(Arc::new);
        let merged_cell = tag == schema::CELL && cell_has_merge_geometry(doc, id);

        chain.push(Ancestor {
            tag,
            uid,
            attributes,
            props,
            merged_cell,
        });
        current = doc.tree.parent(id);
    }

    chain.reverse();
    Arc::new(chain)
}

fn cell_has_merge_geometry(doc: &Document, cell: NodeId) -> bool {
    let Some(props) = doc.tree.child_by_tag(cell, schema::CELL_PROPS) else {
        return false;
    };
    let spans = doc
        .tree
        .attribute(props, &schema::col_span())
        .is_some_and(|v| v != "1");
    spans || doc.tree.attribute(props, &schema::v_merge()).is_some()
}
