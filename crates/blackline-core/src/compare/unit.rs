//! The comparison-unit hierarchy: atoms, words, and structural groups.
//!
//! A closed tagged-variant model: leaves are atoms, words are contiguous
//! atom runs, groups mirror one structural container instance each. Every
//! unit exposes a content hash; two units are interchangeable for matching
//! purposes exactly when their hashes agree.

use crate::hash::{sha1_concat, sha1_hex};
use crate::settings::ComparerSettings;
use crate::tree::arena::Fragment;
use crate::tree::name::Attribute;
use crate::tree::schema;
use std::fmt;
use std::sync::Arc;

/// Correlation status of a unit or atom relative to the other document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Status {
    #[default]
    Normal,
    Unknown,
    Equal,
    Inserted,
    Deleted,
    Group,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Normal => "Normal",
            Self::Unknown => "Unknown",
            Self::Equal => "Equal",
            Self::Inserted => "Inserted",
            Self::Deleted => "Deleted",
            Self::Group => "Group",
        };
        write!(f, "{}", s)
    }
}

/// Which source document an atom came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Original,
    Revised,
}

/// Kind of a structural group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GroupKind {
    Paragraph,
    Table,
    Row,
    Cell,
    Textbox,
}

impl GroupKind {
    pub fn tag(self) -> &'static str {
        match self {
            Self::Paragraph => schema::PARAGRAPH,
            Self::Table => schema::TABLE,
            Self::Row => schema::ROW,
            Self::Cell => schema::CELL,
            Self::Textbox => schema::TEXTBOX,
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            schema::PARAGRAPH => Some(Self::Paragraph),
            schema::TABLE => Some(Self::Table),
            schema::ROW => Some(Self::Row),
            schema::CELL => Some(Self::Cell),
            schema::TEXTBOX => Some(Self::Textbox),
            _ => None,
        }
    }
}

impl fmt::Display for GroupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NoteKind {
    Footnote,
    Endnote,
}

impl NoteKind {
    pub fn tag(self) -> &'static str {
        match self {
            Self::Footnote => schema::FOOTNOTE,
            Self::Endnote => schema::ENDNOTE,
        }
    }
}

/// What one atom stands for.
#[derive(Debug, Clone, PartialEq)]
pub enum ContentToken {
    /// One character of text.
    Text(char),
    /// The paragraph mark; carries the paragraph's formatting identity.
    ParagraphMark,
    Break,
    Tab,
    Field { instruction: String },
    /// Math content, hashed as an opaque subtree.
    Math { hash: String },
    /// An image; hash covers the referenced bytes, not the reference id.
    Image { hash: String, reference: String },
    /// An embedded object, same treatment as images.
    Object { hash: String, reference: String },
    Symbol { font: String, code: String },
    /// A footnote/endnote reference; hash covers the note body so edits
    /// inside the note surface as a changed reference. The id is volatile
    /// and excluded.
    NoteRef {
        kind: NoteKind,
        id: String,
        content_hash: String,
    },
}

impl ContentToken {
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Text(_) => schema::TEXT,
            Self::ParagraphMark => schema::PARAGRAPH_PROPS,
            Self::Break => schema::BREAK,
            Self::Tab => schema::TAB,
            Self::Field { .. } => schema::FIELD,
            Self::Math { .. } => schema::MATH,
            Self::Image { .. } => schema::IMAGE,
            Self::Object { .. } => schema::OBJECT,
            Self::Symbol { .. } => schema::SYMBOL,
            Self::NoteRef { .. } => schema::NOTE_REF,
        }
    }

    /// The value folded into the identity hash alongside the tag.
    fn hash_text(&self, settings: &ComparerSettings) -> String {
        match self {
            Self::Text(ch) => {
                if settings.case_insensitive {
                    ch.to_uppercase().collect()
                } else {
                    ch.to_string()
                }
            }
            Self::ParagraphMark | Self::Break | Self::Tab => String::new(),
            Self::Field { instruction } => instruction.clone(),
            Self::Math { hash } => hash.clone(),
            Self::Image { hash, .. } => hash.clone(),
            Self::Object { hash, .. } => hash.clone(),
            Self::Symbol { font, code } => format!("{}:{}", font, code),
            Self::NoteRef {
                kind, content_hash, ..
            } => format!("{}:{}", kind.tag(), content_hash),
        }
    }

    pub fn identity_hash(&self, settings: &ComparerSettings) -> String {
        sha1_hex(&format!("{}{}", self.tag(), self.hash_text(settings)))
    }

    pub fn display_char(&self) -> Option<char> {
        match self {
            Self::Text(ch) => Some(*ch),
            _ => None,
        }
    }
}

/// One entry of an atom's ancestor chain, root→leaf order.
#[derive(Debug, Clone)]
pub struct Ancestor {
    pub tag: String,
    /// Identity token minted before atomization.
    pub uid: String,
    pub attributes: Arc<Vec<Attribute>>,
    /// The container's formatting-property child, captured for rebuild.
    pub props: Option<Arc<Fragment>>,
    /// Set on cells whose properties carry merge geometry.
    pub merged_cell: bool,
}

/// The smallest indivisible comparison unit.
#[derive(Debug, Clone)]
pub struct Atom {
    pub token: ContentToken,
    /// Canonical identity: two atoms match exactly when hashes agree.
    pub hash: String,
    /// Subtree behind non-text leaf tokens (math/image/object), and the
    /// paragraph-props subtree behind paragraph marks.
    pub content: Option<Arc<Fragment>>,
    /// Ancestors from the nearest structural root down to, but excluding,
    /// the atom itself.
    pub ancestors: Arc<Vec<Ancestor>>,
    pub side: Side,
    pub status: Status,
    /// Identity tokens indexed like `ancestors`; rewritten by the identity
    /// propagation pass so atoms destined for the same output container
    /// agree on every level.
    pub ancestor_uids: Vec<String>,
    /// The original-side atom this one was matched against, set when Equal.
    pub linked_before: Option<Box<Atom>>,
}

impl Atom {
    pub fn new(
        token: ContentToken,
        content: Option<Arc<Fragment>>,
        ancestors: Arc<Vec<Ancestor>>,
        side: Side,
        settings: &ComparerSettings,
    ) -> Self {
        let hash = token.identity_hash(settings);
        let ancestor_uids = ancestors.iter().map(|a| a.uid.clone()).collect();
        Self {
            token,
            hash,
            content,
            ancestors,
            side,
            status: Status::Normal,
            ancestor_uids,
            linked_before: None,
        }
    }

    /// Ancestors in root→leaf order. Identity tokens in `ancestor_uids` are
    /// indexed by this same ordering.
    pub fn ancestors_root_to_leaf(&self) -> &[Ancestor] {
        &self.ancestors
    }

    /// Nearest enclosing ancestor of the given tag, searching leaf→root.
    pub fn nearest_ancestor_of_kind(&self, tag: &str) -> Option<&Ancestor> {
        self.ancestors.iter().rev().find(|a| a.tag == tag)
    }

    /// Index (root→leaf) of the nearest enclosing ancestor of the given tag.
    pub fn nearest_ancestor_index_of_kind(&self, tag: &str) -> Option<usize> {
        self.ancestors.iter().rposition(|a| a.tag == tag)
    }

    pub fn is_paragraph_mark(&self) -> bool {
        matches!(self.token, ContentToken::ParagraphMark)
    }

    pub fn is_in_textbox(&self) -> bool {
        self.ancestors.iter().any(|a| a.tag == schema::TEXTBOX)
    }
}

/// Atoms match by identity hash, not structural equality.
impl PartialEq for Atom {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash
    }
}

impl Eq for Atom {}

/// A contiguous run of atoms delimited by word-boundary rules.
#[derive(Debug, Clone)]
pub struct Word {
    pub atoms: Vec<Atom>,
    pub hash: String,
    pub status: Status,
}

impl Word {
    pub fn new(atoms: Vec<Atom>) -> Self {
        let hash = sha1_concat(atoms.iter().map(|a| a.hash.as_str()));
        Self {
            atoms,
            hash,
            status: Status::Normal,
        }
    }

    pub fn first_atom(&self) -> Option<&Atom> {
        self.atoms.first()
    }

    pub fn text(&self) -> String {
        self.atoms
            .iter()
            .filter_map(|a| a.token.display_char())
            .collect()
    }

    /// A word consisting of exactly the paragraph mark.
    pub fn is_paragraph_mark(&self) -> bool {
        self.atoms.len() == 1 && self.atoms[0].is_paragraph_mark()
    }

    /// A word that starts with the paragraph mark (used by boundary rules).
    pub fn starts_with_paragraph_mark(&self) -> bool {
        self.atoms.first().is_some_and(Atom::is_paragraph_mark)
    }
}

/// One structural container instance and its nested content.
#[derive(Debug, Clone)]
pub struct Group {
    pub kind: GroupKind,
    pub children: Vec<Unit>,
    pub hash: String,
    /// Pre-pass hint: hash of the container's normalized content, read from
    /// the annotated source tree. Used only as a fast-path optimization.
    pub correlated_hash: Option<String>,
    /// Topology-only hash (tables), used to detect structurally identical
    /// tables with merged cells.
    pub structure_hash: Option<String>,
    pub status: Status,
    /// Nesting depth at which this group was formed (0 = outermost).
    pub level: usize,
    pub atom_count: usize,
}

impl Group {
    pub fn new(children: Vec<Unit>, kind: GroupKind, level: usize) -> Self {
        let hash = sha1_concat(children.iter().map(|u| u.hash()));
        let atom_count = children.iter().map(Unit::atom_count).sum();

        let (correlated_hash, structure_hash) = children
            .first()
            .and_then(Unit::first_atom)
            .and_then(|atom| atom.nearest_ancestor_of_kind(kind.tag()))
            .map(|ancestor| {
                let corr = attribute_value(&ancestor.attributes, &schema::meta::corr_hash());
                let structure = attribute_value(&ancestor.attributes, &schema::meta::struct_hash());
                (corr, structure)
            })
            .unwrap_or((None, None));

        Self {
            kind,
            children,
            hash,
            correlated_hash,
            structure_hash,
            status: Status::Normal,
            level,
            atom_count,
        }
    }

    pub fn first_atom(&self) -> Option<&Atom> {
        self.children.first().and_then(Unit::first_atom)
    }

    pub fn atoms(&self) -> Vec<&Atom> {
        let mut out = Vec::with_capacity(self.atom_count);
        collect_atoms_from_units(&self.children, &mut out);
        out
    }

    pub fn has_merged_cells(&self) -> bool {
        self.atoms()
            .iter()
            .any(|atom| atom.ancestors.iter().any(|a| a.merged_cell))
    }
}

fn attribute_value(attrs: &[Attribute], name: &crate::tree::name::QName) -> Option<String> {
    attrs
        .iter()
        .find(|a| &a.name == name)
        .map(|a| a.value.clone())
}

fn collect_atoms_from_units<'a>(units: &'a [Unit], out: &mut Vec<&'a Atom>) {
    for unit in units {
        match unit {
            Unit::Word(w) => out.extend(w.atoms.iter()),
            Unit::Group(g) => collect_atoms_from_units(&g.children, out),
        }
    }
}

/// A comparison unit: a word or a structural group.
#[derive(Debug, Clone)]
pub enum Unit {
    Word(Word),
    Group(Group),
}

impl Unit {
    pub fn hash(&self) -> &str {
        match self {
            Self::Word(w) => &w.hash,
            Self::Group(g) => &g.hash,
        }
    }

    pub fn status(&self) -> Status {
        match self {
            Self::Word(w) => w.status,
            Self::Group(g) => g.status,
        }
    }

    pub fn set_status(&mut self, status: Status) {
        match self {
            Self::Word(w) => w.status = status,
            Self::Group(g) => g.status = status,
        }
    }

    pub fn atom_count(&self) -> usize {
        match self {
            Self::Word(w) => w.atoms.len(),
            Self::Group(g) => g.atom_count,
        }
    }

    pub fn atoms(&self) -> Vec<&Atom> {
        match self {
            Self::Word(w) => w.atoms.iter().collect(),
            Self::Group(g) => g.atoms(),
        }
    }

    pub fn first_atom(&self) -> Option<&Atom> {
        match self {
            Self::Word(w) => w.first_atom(),
            Self::Group(g) => g.first_atom(),
        }
    }

    pub fn as_word(&self) -> Option<&Word> {
        match self {
            Self::Word(w) => Some(w),
            _ => None,
        }
    }

    pub fn as_group(&self) -> Option<&Group> {
        match self {
            Self::Group(g) => Some(g),
            _ => None,
        }
    }

    pub fn is_group_of(&self, kind: GroupKind) -> bool {
        matches!(self, Self::Group(g) if g.kind == kind)
    }

    /// Immediate children of a group, or the word itself for words.
    pub fn flattened_children(&self) -> Vec<Unit> {
        match self {
            Self::Word(w) => vec![Unit::Word(w.clone())],
            Self::Group(g) => g.children.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_atom(ch: char) -> Atom {
        let settings = ComparerSettings::default();
        Atom::new(
            ContentToken::Text(ch),
            None,
            Arc::new(Vec::new()),
            Side::Revised,
            &settings,
        )
    }

    #[test]
    fn identical_tokens_hash_identically() {
        let a = make_atom('x');
        let b = make_atom('x');
        assert_eq!(a, b);
        assert_ne!(a, make_atom('y'));
    }

    #[test]
    fn case_insensitive_setting_folds_text_hashes() {
        let sensitive = ComparerSettings::default();
        let insensitive = ComparerSettings::default().with_case_insensitive(true);

        let lower = ContentToken::Text('a');
        let upper = ContentToken::Text('A');
        assert_ne!(
            lower.identity_hash(&sensitive),
            upper.identity_hash(&sensitive)
        );
        assert_eq!(
            lower.identity_hash(&insensitive),
            upper.identity_hash(&insensitive)
        );
    }

    #[test]
    fn note_ref_hash_ignores_volatile_id() {
        let settings = ComparerSettings::default();
        let a = ContentToken::NoteRef {
            kind: NoteKind::Footnote,
            id: "1".to_string(),
            content_hash: "abc".to_string(),
        };
        let b = ContentToken::NoteRef {
            kind: NoteKind::Footnote,
            id: "99".to_string(),
            content_hash: "abc".to_string(),
        };
        assert_eq!(a.identity_hash(&settings), b.identity_hash(&settings));
    }

    #[test]
    fn word_hash_covers_all_atoms() {
        let w1 = Word::new(vec![make_atom('h'), make_atom('i')]);
        let w2 = Word::new(vec![make_atom('h'), make_atom('i')]);
        let w3 = Word::new(vec![make_atom('h'), make_atom('o')]);
        assert_eq!(w1.hash, w2.hash);
        assert_ne!(w1.hash, w3.hash);
    }

    #[test]
    fn group_counts_descendant_atoms() {
        let word = Word::new(vec![make_atom('a'), make_atom('b')]);
        let group = Group::new(vec![Unit::Word(word)], GroupKind::Paragraph, 0);
        assert_eq!(group.atom_count, 2);
        assert_eq!(group.atoms().len(), 2);
    }

    #[test]
    fn nearest_ancestor_searches_leaf_to_root() {
        let settings = ComparerSettings::default();
        let ancestors = vec![
            Ancestor {
                tag: schema::TABLE.to_string(),
                uid: "t1".to_string(),
                attributes: Arc::new(Vec::new()),
                props: None,
                merged_cell: false,
            },
            Ancestor {
                tag: schema::ROW.to_string(),
                uid: "r1".to_string(),
                attributes: Arc::new(Vec::new()),
                props: None,
                merged_cell: false,
            },
            Ancestor {
                tag: schema::ROW.to_string(),
                uid: "r2".to_string(),
                attributes: Arc::new(Vec::new()),
                props: None,
                merged_cell: false,
            },
        ];
        let atom = Atom::new(
            ContentToken::Text('x'),
            None,
            Arc::new(ancestors),
            Side::Original,
            &settings,
        );
        // Nearest means the last occurrence in root→leaf order.
        assert_eq!(
            atom.nearest_ancestor_of_kind(schema::ROW).map(|a| &a.uid[..]),
            Some("r2")
        );
        assert_eq!(atom.nearest_ancestor_index_of_kind(schema::ROW), Some(2));
    }
}
