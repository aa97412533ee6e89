//! Identity propagation over the flattened atom stream.
//!
//! After flattening, atoms that must land in the same output paragraph can
//! still carry ancestor identity from two different source documents (an
//! inserted word next to surviving text, for instance). Two backward scans
//! repair this: every atom between a qualifying paragraph mark and the
//! previous mark receives the mark's identity chain, so the rebuild step
//! groups them into one paragraph.
//!
//! The scans are explicit finite-state machines. The first pass handles
//! top-level paragraphs and seeds only on marks that survived (Equal): a
//! deleted or inserted mark owns its own paragraph. The second pass is
//! scoped to textbox-nested paragraphs, which cannot be inserted or deleted
//! as a whole, so their marks seed regardless of status.

use crate::compare::unit::{Atom, Status};
use crate::tree::schema;

/// State of one backward scan.
#[derive(Debug, Clone)]
enum ScanState {
    /// No qualifying mark seen yet (or propagation was cut off by a
    /// non-qualifying mark); atoms keep their own identity.
    Seeking,
    /// Atoms receive this identity prefix until the next mark.
    Propagating { prefix: Vec<String> },
}

/// Which atoms a scan touches and which marks seed it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanScope {
    TopLevel,
    TextboxScoped,
}

impl ScanScope {
    fn in_scope(self, atom: &Atom) -> bool {
        match self {
            Self::TopLevel => !atom.is_in_textbox(),
            Self::TextboxScoped => atom.is_in_textbox(),
        }
    }

    fn seeds(self, atom: &Atom) -> bool {
        match self {
            Self::TopLevel => atom.status == Status::Equal,
            // Textbox paragraph identity tracks regardless of status.
            Self::TextboxScoped => true,
        }
    }
}

/// Run both propagation passes in place.
pub fn propagate_identity(atoms: &mut [Atom]) {
    scan_backward(atoms, ScanScope::TopLevel);
    scan_backward(atoms, ScanScope::TextboxScoped);
}

fn scan_backward(atoms: &mut [Atom], scope: ScanScope) {
    let mut state = ScanState::Seeking;

    for atom in atoms.iter_mut().rev() {
        if !scope.in_scope(atom) {
            continue;
        }

        if atom.is_paragraph_mark() {
            state = if scope.seeds(atom) {
                ScanState::Propagating {
                    prefix: atom.ancestor_uids.clone(),
                }
            } else {
                ScanState::Seeking
            };
            continue;
        }

        if let ScanState::Propagating { prefix } = &state {
            apply_prefix(atom, prefix);
        }
    }
}

/// Overwrite the atom's identity entries covering its containers up through
/// the paragraph with the propagated prefix. Entries below the paragraph
/// (run, text) keep the atom's own identity. Applied only when the atom's
/// container depth agrees with the prefix; a mismatch means the atom sits in
/// a structurally different context and keeps its own chain.
fn apply_prefix(atom: &mut Atom, prefix: &[String]) {
    let Some(para_index) = atom.nearest_ancestor_index_of_kind(schema::PARAGRAPH) else {
        return;
    };
    if para_index + 1 != prefix.len() {
        return;
    }
    if atom.ancestor_uids.len() < prefix.len() {
        return;
    }
    atom.ancestor_uids[..prefix.len()].clone_from_slice(prefix);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compare::unit::{Ancestor, ContentToken, Side};
    use crate::settings::ComparerSettings;
    use std::sync::Arc;

    fn chain(tags_and_uids: &[(&str, &str)]) -> Arc<Vec<Ancestor>> {
        Arc::new(
            tags_and_uids
                .iter()
                .map(|(tag, uid)| Ancestor {
                    tag: tag.to_string(),
                    uid: uid.to_string(),
                    attributes: Arc::new(Vec::new()),
                    props: None,
                    merged_cell: false,
                })
                .collect(),
        )
    }

    fn text_atom(ch: char, ancestors: Arc<Vec<Ancestor>>, status: Status) -> Atom {
        let settings = ComparerSettings::default();
        let mut atom = Atom::new(ContentToken::Text(ch), None, ancestors, Side::Revised, &settings);
        atom.status = status;
        atom
    }

    fn mark_atom(ancestors: Arc<Vec<Ancestor>>, status: Status) -> Atom {
        let settings = ComparerSettings::default();
        let mut atom = Atom::new(
            ContentToken::ParagraphMark,
            None,
            ancestors,
            Side::Revised,
            &settings,
        );
        atom.status = status;
        atom
    }

    #[test]
    fn inserted_text_adopts_equal_marks_paragraph() {
        // Inserted word from the revised doc's paragraph "p-new"; the
        // surviving mark carries the original's "p-old".
        let inserted_chain = chain(&[
            (schema::PARAGRAPH, "p-new"),
            (schema::RUN, "r-new"),
            (schema::TEXT, "t-new"),
        ]);
        let mark_chain = chain(&[(schema::PARAGRAPH, "p-old")]);

        let mut atoms = vec![
            text_atom('x', inserted_chain, Status::Inserted),
            mark_atom(mark_chain, Status::Equal),
        ];
        propagate_identity(&mut atoms);

        assert_eq!(atoms[0].ancestor_uids[0], "p-old");
        // Run-level identity stays the atom's own.
        assert_eq!(atoms[0].ancestor_uids[1], "r-new");
    }

    #[test]
    fn deleted_mark_does_not_propagate() {
        let text_chain = chain(&[
            (schema::PARAGRAPH, "p-a"),
            (schema::RUN, "r-a"),
            (schema::TEXT, "t-a"),
        ]);
        let mark_chain = chain(&[(schema::PARAGRAPH, "p-b")]);

        let mut atoms = vec![
            text_atom('x', text_chain, Status::Deleted),
            mark_atom(mark_chain, Status::Deleted),
        ];
        propagate_identity(&mut atoms);

        // A deleted mark owns its own paragraph; no unification.
        assert_eq!(atoms[0].ancestor_uids[0], "p-a");
    }

    #[test]
    fn propagation_stops_at_previous_mark() {
        let first_para = chain(&[
            (schema::PARAGRAPH, "p-1"),
            (schema::RUN, "r-1"),
            (schema::TEXT, "t-1"),
        ]);
        let first_mark = chain(&[(schema::PARAGRAPH, "p-1")]);
        let second_para = chain(&[
            (schema::PARAGRAPH, "p-2x"),
            (schema::RUN, "r-2"),
            (schema::TEXT, "t-2"),
        ]);
        let second_mark = chain(&[(schema::PARAGRAPH, "p-2")]);

        let mut atoms = vec![
            text_atom('a', first_para, Status::Equal),
            mark_atom(first_mark, Status::Equal),
            text_atom('b', second_para, Status::Inserted),
            mark_atom(second_mark, Status::Equal),
        ];
        propagate_identity(&mut atoms);

        // 'b' adopts the second mark's paragraph, not the first's.
        assert_eq!(atoms[2].ancestor_uids[0], "p-2");
        assert_eq!(atoms[0].ancestor_uids[0], "p-1");
    }

    #[test]
    fn textbox_marks_seed_regardless_of_status() {
        let inner_text = chain(&[
            (schema::PARAGRAPH, "outer"),
            (schema::RUN, "or"),
            (schema::TEXTBOX, "tb"),
            (schema::PARAGRAPH, "ip-new"),
            (schema::RUN, "ir"),
            (schema::TEXT, "it"),
        ]);
        let inner_mark = chain(&[
            (schema::PARAGRAPH, "outer"),
            (schema::RUN, "or"),
            (schema::TEXTBOX, "tb"),
            (schema::PARAGRAPH, "ip-old"),
        ]);

        let mut atoms = vec![
            text_atom('x', inner_text, Status::Inserted),
            mark_atom(inner_mark, Status::Inserted),
        ];
        propagate_identity(&mut atoms);

        // Even an inserted mark unifies identity inside a textbox.
        assert_eq!(atoms[0].ancestor_uids[3], "ip-old");
    }

    #[test]
    fn structural_mismatch_leaves_identity_alone() {
        // Atom inside a table cell, mark at top level: depths disagree.
        let cell_text = chain(&[
            (schema::TABLE, "tbl"),
            (schema::ROW, "row"),
            (schema::CELL, "cell"),
            (schema::PARAGRAPH, "p-cell"),
            (schema::RUN, "r"),
            (schema::TEXT, "t"),
        ]);
        let top_mark = chain(&[(schema::PARAGRAPH, "p-top")]);

        let mut atoms = vec![
            text_atom('x', cell_text, Status::Inserted),
            mark_atom(top_mark, Status::Equal),
        ];
        propagate_identity(&mut atoms);

        assert_eq!(atoms[0].ancestor_uids[3], "p-cell");
    }
}
