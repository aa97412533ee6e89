//! Re-aggregation of atoms into words and structural group hierarchies.
//!
//! Words are delimited by the configurable separator set, by punctuation not
//! flanked by digits (so "3.14" and "1,000" hold together), and by non-text
//! tokens, which break on both sides. Words then nest into groups mirroring
//! the source document's paragraph/table/row/cell/textbox structure, keyed
//! per depth on the container's tag and identity token.

use crate::compare::unit::{Atom, ContentToken, Group, GroupKind, Unit, Word};
use crate::settings::ComparerSettings;
use crate::tree::schema;

/// Build the unit list the correlator consumes.
pub fn units_from_atoms(atoms: Vec<Atom>, settings: &ComparerSettings) -> Vec<Unit> {
    if atoms.is_empty() {
        return Vec::new();
    }
    let keys = assign_word_keys(&atoms, settings);
    let words = split_into_words(atoms, &keys);
    build_hierarchy(words, 0)
}

/// Assign each atom a word key; adjacent atoms sharing a key form one word.
fn assign_word_keys(atoms: &[Atom], settings: &ComparerSettings) -> Vec<usize> {
    let mut keys = Vec::with_capacity(atoms.len());
    let mut next = 0usize;

    for (i, atom) in atoms.iter().enumerate() {
        let key = match &atom.token {
            ContentToken::Text(ch) => {
                let ch = *ch;
                if ch == '.' || ch == ',' {
                    let digit_before = i
                        .checked_sub(1)
                        .and_then(|j| atoms.get(j))
                        .is_some_and(is_digit_atom);
                    let digit_after = atoms.get(i + 1).is_some_and(is_digit_atom);
                    if digit_before || digit_after {
                        next
                    } else {
                        isolated_key(&mut next)
                    }
                } else if settings.is_word_separator(ch) {
                    isolated_key(&mut next)
                } else {
                    next
                }
            }
            // Every non-text token breaks the word on both sides.
            _ => isolated_key(&mut next),
        };
        keys.push(key);
    }

    keys
}

fn isolated_key(next: &mut usize) -> usize {
    *next += 1;
    let key = *next;
    *next += 1;
    key
}

fn is_digit_atom(atom: &Atom) -> bool {
    matches!(atom.token, ContentToken::Text(c) if c.is_ascii_digit())
}

struct WordWithPath {
    word: Word,
    /// Grouping key per depth: `(kind, uid)` for each structural container
    /// on the word's first atom's chain.
    path: Vec<(GroupKind, String)>,
}

fn split_into_words(atoms: Vec<Atom>, keys: &[usize]) -> Vec<WordWithPath> {
    let mut result = Vec::new();
    let mut current: Vec<Atom> = Vec::new();
    let mut current_key = keys.first().copied().unwrap_or_default();

    for (atom, &key) in atoms.into_iter().zip(keys) {
        if key != current_key && !current.is_empty() {
            result.push(finish_word(std::mem::take(&mut current)));
            current_key = key;
        } else if current.is_empty() {
            current_key = key;
        }
        current.push(atom);
    }
    if !current.is_empty() {
        result.push(finish_word(current));
    }
    result
}

fn finish_word(atoms: Vec<Atom>) -> WordWithPath {
    let path = grouping_path(&atoms[0]);
    WordWithPath {
        word: Word::new(atoms),
        path,
    }
}

fn grouping_path(atom: &Atom) -> Vec<(GroupKind, String)> {
    atom.ancestors_root_to_leaf()
        .iter()
        .filter(|a| schema::GROUPING_CONTAINERS.contains(a.tag.as_str()))
        .filter_map(|a| GroupKind::from_tag(&a.tag).map(|kind| (kind, a.uid.clone())))
        .collect()
}

/// Group adjacent words sharing the same container key at this depth; words
/// with no container at this depth stay flat.
fn build_hierarchy(words: Vec<WordWithPath>, level: usize) -> Vec<Unit> {
    let mut result = Vec::new();
    let mut iter = words.into_iter().peekable();

    while let Some(first) = iter.next() {
        let key = first.path.get(level).cloned();
        let mut cluster = vec![first];
        while let Some(next) = iter.peek() {
            if next.path.get(level) == key.as_ref() {
                cluster.push(iter.next().expect("peeked item exists"));
            } else {
                break;
            }
        }

        match key {
            None => {
                for entry in cluster {
                    result.push(Unit::Word(entry.word));
                }
            }
            Some((kind, _)) => {
                let children = build_hierarchy(cluster, level + 1);
                result.push(Unit::Group(Group::new(children, kind, level)));
            }
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compare::atomize::{assign_uids, atomize};
    use crate::compare::unit::Side;
    use crate::tree::builder::DocBuilder;
    use crate::tree::document::Document;

    fn units_of(doc: &Document) -> Vec<Unit> {
        let mut doc = doc.clone();
        assign_uids(&mut doc);
        let settings = ComparerSettings::default();
        let atoms = atomize(&doc, Side::Original, &settings).unwrap();
        units_from_atoms(atoms, &settings)
    }

    fn word_texts(group: &Group) -> Vec<String> {
        group
            .children
            .iter()
            .filter_map(Unit::as_word)
            .map(Word::text)
            .collect()
    }

    #[test]
    fn words_split_on_separators() {
        let units = units_of(&DocBuilder::new().paragraph("The cat sat").finish());
        assert_eq!(units.len(), 1);
        let para = units[0].as_group().expect("paragraph group");
        assert_eq!(para.kind, GroupKind::Paragraph);
        // "The", " ", "cat", " ", "sat", paragraph mark
        assert_eq!(
            word_texts(para),
            vec!["The", " ", "cat", " ", "sat", ""]
        );
    }

    #[test]
    fn decimal_numbers_stay_one_word() {
        let units = units_of(&DocBuilder::new().paragraph("pi is 3.14").finish());
        let para = units[0].as_group().unwrap();
        assert!(word_texts(para).contains(&"3.14".to_string()));
    }

    #[test]
    fn thousands_separator_stays_one_word() {
        let units = units_of(&DocBuilder::new().paragraph("1,000 units").finish());
        let para = units[0].as_group().unwrap();
        assert!(word_texts(para).contains(&"1,000".to_string()));
    }

    #[test]
    fn sentence_punctuation_splits() {
        let units = units_of(&DocBuilder::new().paragraph("end. Next").finish());
        let para = units[0].as_group().unwrap();
        let texts = word_texts(para);
        assert!(texts.contains(&"end".to_string()));
        assert!(texts.contains(&".".to_string()));
        assert!(texts.contains(&"Next".to_string()));
    }

    #[test]
    fn table_nesting_mirrors_source() {
        let units = units_of(&DocBuilder::new().table(&[&["a", "b"], &["c", "d"]]).finish());
        assert_eq!(units.len(), 1);
        let table = units[0].as_group().unwrap();
        assert_eq!(table.kind, GroupKind::Table);
        assert_eq!(table.children.len(), 2);

        let row = table.children[0].as_group().unwrap();
        assert_eq!(row.kind, GroupKind::Row);
        assert_eq!(row.children.len(), 2);

        let cell = row.children[0].as_group().unwrap();
        assert_eq!(cell.kind, GroupKind::Cell);
        let para = cell.children[0].as_group().unwrap();
        assert_eq!(para.kind, GroupKind::Paragraph);
    }

    #[test]
    fn paragraph_mark_is_its_own_word() {
        let units = units_of(&DocBuilder::new().paragraph("x").finish());
        let para = units[0].as_group().unwrap();
        let last = para.children.last().unwrap().as_word().unwrap();
        assert!(last.is_paragraph_mark());
    }

    #[test]
    fn identical_paragraphs_group_to_identical_hashes() {
        let u1 = units_of(&DocBuilder::new().paragraph("same text").finish());
        let u2 = units_of(&DocBuilder::new().paragraph("same text").finish());
        assert_eq!(u1[0].hash(), u2[0].hash());
    }
}
