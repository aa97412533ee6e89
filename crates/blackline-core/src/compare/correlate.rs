//! The correlation engine.
//!
//! Maintains a worklist of [`CorrelatedSequence`] entries and repeatedly
//! replaces the first Unknown entry until every region is classified Equal,
//! Inserted, or Deleted. Replacement tries, in order: the correlated-hash
//! fast path over structural groups, the common prefix/suffix pass, and the
//! full contiguous-run LCS scan with its rejection heuristics and structural
//! fallback ladder. Every replacement strictly shrinks the unresolved
//! region or converts it to a terminal status, so the worklist drains.

use crate::compare::unit::{Atom, GroupKind, Status, Unit};
use crate::error::{BlacklineError, Result};
use crate::settings::ComparerSettings;
use std::sync::atomic::Ordering;

/// Status of one correlated region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Correlation {
    #[default]
    Unknown,
    Equal,
    Deleted,
    Inserted,
}

/// A pairing of two (possibly absent) unit runs with a correlation status.
#[derive(Debug, Clone)]
pub struct CorrelatedSequence {
    pub status: Correlation,
    /// Units from the original document; None for Inserted.
    pub left: Option<Vec<Unit>>,
    /// Units from the revised document; None for Deleted.
    pub right: Option<Vec<Unit>>,
}

impl CorrelatedSequence {
    pub fn unknown(left: Vec<Unit>, right: Vec<Unit>) -> Self {
        Self {
            status: Correlation::Unknown,
            left: Some(left),
            right: Some(right),
        }
    }

    pub fn equal(left: Vec<Unit>, right: Vec<Unit>) -> Self {
        Self {
            status: Correlation::Equal,
            left: Some(left),
            right: Some(right),
        }
    }

    pub fn deleted(left: Vec<Unit>) -> Self {
        Self {
            status: Correlation::Deleted,
            left: Some(left),
            right: None,
        }
    }

    pub fn inserted(right: Vec<Unit>) -> Self {
        Self {
            status: Correlation::Inserted,
            left: None,
            right: Some(right),
        }
    }
}

/// Push a left/right remainder pair as the appropriate sequence kind.
fn push_remainder(out: &mut Vec<CorrelatedSequence>, left: Vec<Unit>, right: Vec<Unit>) {
    match (left.is_empty(), right.is_empty()) {
        (false, true) => out.push(CorrelatedSequence::deleted(left)),
        (true, false) => out.push(CorrelatedSequence::inserted(right)),
        (false, false) => out.push(CorrelatedSequence::unknown(left, right)),
        (true, true) => {}
    }
}

/// Correlate two unit sequences into a terminal edit script.
pub fn correlate(
    units1: Vec<Unit>,
    units2: Vec<Unit>,
    settings: &ComparerSettings,
) -> Result<Vec<CorrelatedSequence>> {
    if units1.is_empty() && units2.is_empty() {
        return Ok(Vec::new());
    }
    if let Some(shortcut) = detect_unrelated(&units1, &units2) {
        tracing::debug!("sources share no leading block hashes; skipping LCS");
        return Ok(shortcut);
    }

    let mut worklist = vec![CorrelatedSequence::unknown(units1, units2)];
    loop {
        let Some(idx) = worklist
            .iter()
            .position(|cs| cs.status == Correlation::Unknown)
        else {
            return Ok(worklist);
        };
        check_cancelled(settings)?;

        let unknown = worklist.remove(idx);
        let replacement = match correlated_hash_pass(&unknown, settings) {
            Some(seqs) => seqs,
            None => match common_edges_pass(&unknown, settings) {
                Some(seqs) => seqs,
                None => lcs_pass(&unknown, settings)?,
            },
        };
        for seq in replacement.into_iter().rev() {
            worklist.insert(idx, seq);
        }
    }
}

fn check_cancelled(settings: &ComparerSettings) -> Result<()> {
    if let Some(cancel) = &settings.cancel {
        if cancel.load(Ordering::Relaxed) {
            return Err(BlacklineError::Cancelled);
        }
    }
    Ok(())
}

/// Whole-document short-circuit: when both sides open with more than three
/// structural groups and none of the leading hashes intersect, the sources
/// are unrelated and the full quadratic scan is pointless.
fn detect_unrelated(units1: &[Unit], units2: &[Unit]) -> Option<Vec<CorrelatedSequence>> {
    let lead1: Vec<&str> = units1
        .iter()
        .filter_map(Unit::as_group)
        .take(4)
        .map(|g| g.hash.as_str())
        .collect();
    let lead2: Vec<&str> = units2
        .iter()
        .filter_map(Unit::as_group)
        .take(4)
        .map(|g| g.hash.as_str())
        .collect();

    if lead1.len() <= 3 || lead2.len() <= 3 {
        return None;
    }
    if lead1.iter().any(|h| lead2.contains(h)) {
        return None;
    }

    Some(vec![
        CorrelatedSequence::deleted(units1.to_vec()),
        CorrelatedSequence::inserted(units2.to_vec()),
    ])
}

// ---------------------------------------------------------------------------
// Correlated-hash fast path
// ---------------------------------------------------------------------------

fn fast_path_kind(unit: &Unit) -> bool {
    matches!(
        unit.as_group().map(|g| g.kind),
        Some(GroupKind::Paragraph) | Some(GroupKind::Table) | Some(GroupKind::Row)
    )
}

/// Split off the longest run of groups whose pre-computed correlated hashes
/// match pairwise. The matched pairs re-enter the worklist as per-pair
/// Unknowns: structure already matched, only content remains to diff.
fn correlated_hash_pass(
    unknown: &CorrelatedSequence,
    settings: &ComparerSettings,
) -> Option<Vec<CorrelatedSequence>> {
    let units1 = unknown.left.as_ref()?;
    let units2 = unknown.right.as_ref()?;

    // Too small for the optimization to pay off.
    if units1.len().min(units2.len()) < 3 {
        return None;
    }
    if !fast_path_kind(units1.first()?) || !fast_path_kind(units2.first()?) {
        return None;
    }

    // Longest pairwise run of same-kind groups with equal correlated hashes,
    // preferring the run covering the most atoms.
    let mut best_len = 0usize;
    let mut best_atoms = 0usize;
    let mut best_i1 = 0usize;
    let mut best_i2 = 0usize;

    for i1 in 0..units1.len() {
        for i2 in 0..units2.len() {
            let mut len = 0usize;
            let mut atoms = 0usize;
            while let (Some(Unit::Group(g1)), Some(Unit::Group(g2))) =
                (units1.get(i1 + len), units2.get(i2 + len))
            {
                let matched = g1.kind == g2.kind
                    && g1.correlated_hash.is_some()
                    && g1.correlated_hash == g2.correlated_hash;
                if !matched {
                    break;
                }
                atoms += g1.atom_count;
                len += 1;
            }
            if atoms > best_atoms {
                best_atoms = atoms;
                best_len = len;
                best_i1 = i1;
                best_i2 = i2;
            }
        }
    }

    if best_len == 0 {
        return None;
    }

    // Small coincidental runs are rejected by the named atom-count
    // thresholds.
    let t = &settings.thresholds;
    let accept = if best_len == 1 {
        let a1 = units1[best_i1].atom_count();
        let a2 = units2[best_i2].atom_count();
        a1 > t.single_group_min_atoms && a2 > t.single_group_min_atoms
    } else if best_len <= t.short_run_max_groups {
        let a1: usize = units1[best_i1..best_i1 + best_len]
            .iter()
            .map(Unit::atom_count)
            .sum();
        let a2: usize = units2[best_i2..best_i2 + best_len]
            .iter()
            .map(Unit::atom_count)
            .sum();
        a1 > t.short_run_min_atoms && a2 > t.short_run_min_atoms
    } else {
        true
    };
    if !accept {
        return None;
    }

    let mut result = Vec::new();
    push_remainder(
        &mut result,
        units1[..best_i1].to_vec(),
        units2[..best_i2].to_vec(),
    );
    for i in 0..best_len {
        result.push(CorrelatedSequence::unknown(
            vec![units1[best_i1 + i].clone()],
            vec![units2[best_i2 + i].clone()],
        ));
    }
    push_remainder(
        &mut result,
        units1[best_i1 + best_len..].to_vec(),
        units2[best_i2 + best_len..].to_vec(),
    );
    Some(result)
}

// ---------------------------------------------------------------------------
// Common prefix/suffix pass
// ---------------------------------------------------------------------------

fn is_paragraph_mark_word(unit: &Unit) -> bool {
    unit.as_word().is_some_and(|w| w.is_paragraph_mark())
}

fn starts_with_paragraph_mark(unit: &Unit) -> bool {
    unit.as_word().is_some_and(|w| w.starts_with_paragraph_mark())
}

fn common_edges_pass(
    unknown: &CorrelatedSequence,
    settings: &ComparerSettings,
) -> Option<Vec<CorrelatedSequence>> {
    let units1 = unknown.left.as_ref()?;
    let units2 = unknown.right.as_ref()?;
    let length_to_compare = units1.len().min(units2.len());
    if length_to_compare == 0 {
        return None;
    }

    // Common run at the very start.
    let mut common_at_start = units1
        .iter()
        .zip(units2.iter())
        .take(length_to_compare)
        .take_while(|(u1, u2)| u1.hash() == u2.hash())
        .count();
    if common_at_start > 0 {
        let ratio = common_at_start as f64 / length_to_compare as f64;
        if ratio < settings.detail_threshold {
            common_at_start = 0;
        }
    }

    if common_at_start > 0 {
        let mut result = vec![CorrelatedSequence::equal(
            units1[..common_at_start].to_vec(),
            units2[..common_at_start].to_vec(),
        )];
        push_remainder(
            &mut result,
            units1[common_at_start..].to_vec(),
            units2[common_at_start..].to_vec(),
        );
        return Some(result);
    }

    // No common start: try the very end.
    let mut common_at_end = units1
        .iter()
        .rev()
        .zip(units2.iter().rev())
        .take(length_to_compare)
        .take_while(|(u1, u2)| u1.hash() == u2.hash())
        .count();

    // Never open an equal island on a bare paragraph mark; shrink until the
    // run starts on real content.
    while common_at_end > 1 {
        let first_common = &units1[units1.len() - common_at_end];
        if is_paragraph_mark_word(first_common) {
            common_at_end -= 1;
        } else {
            break;
        }
    }

    // A run that is nothing but the trailing paragraph mark (alone, or a
    // one-atom word before it) carries no signal at the edges.
    let only_paragraph_mark = match common_at_end {
        1 => is_paragraph_mark_word(&units1[units1.len() - 1]),
        2 => {
            let first = &units1[units1.len() - 2];
            let second = &units1[units1.len() - 1];
            first.as_word().is_some_and(|w| w.atoms.len() == 1)
                && is_paragraph_mark_word(second)
        }
        _ => false,
    };

    if !only_paragraph_mark && common_at_end > 0 {
        let ratio = common_at_end as f64 / length_to_compare as f64;
        if ratio < settings.detail_threshold {
            common_at_end = 0;
        }
    }
    if only_paragraph_mark {
        common_at_end = 0;
    }
    if common_at_end == 0 {
        return None;
    }

    // If the common tail contains a paragraph mark, units physically inside
    // the same unterminated paragraph before it (on either side) must be
    // resolved against each other rather than leak into the preceding split.
    let boundary1 = units1.len() - common_at_end;
    let boundary2 = units2.len() - common_at_end;

    let common_contains_mark = units1[boundary1..]
        .iter()
        .any(|u| u.as_word().is_some_and(|w| w.starts_with_paragraph_mark()));
    let first_common_is_word = units1[boundary1].as_word().is_some();

    let (remaining1, remaining2) = if first_common_is_word && common_contains_mark {
        (
            count_remaining_in_paragraph(&units1[..boundary1]),
            count_remaining_in_paragraph(&units2[..boundary2]),
        )
    } else {
        (0, 0)
    };

    let before1 = boundary1 - remaining1;
    let before2 = boundary2 - remaining2;

    let mut result = Vec::new();
    push_remainder(
        &mut result,
        units1[..before1].to_vec(),
        units2[..before2].to_vec(),
    );
    push_remainder(
        &mut result,
        units1[before1..boundary1].to_vec(),
        units2[before2..boundary2].to_vec(),
    );
    result.push(CorrelatedSequence::equal(
        units1[boundary1..].to_vec(),
        units2[boundary2..].to_vec(),
    ));
    Some(result)
}

/// Scan backward from a split point counting units that belong to the same
/// unterminated paragraph (words not starting with a paragraph mark).
fn count_remaining_in_paragraph(units: &[Unit]) -> usize {
    units
        .iter()
        .rev()
        .take_while(|u| match u.as_word() {
            Some(w) => !w.starts_with_paragraph_mark(),
            None => false,
        })
        .count()
}

// ---------------------------------------------------------------------------
// Full LCS pass
// ---------------------------------------------------------------------------

fn lcs_pass(
    unknown: &CorrelatedSequence,
    settings: &ComparerSettings,
) -> Result<Vec<CorrelatedSequence>> {
    let empty: Vec<Unit> = Vec::new();
    let units1 = unknown.left.as_ref().unwrap_or(&empty);
    let units2 = unknown.right.as_ref().unwrap_or(&empty);

    // Base cases: one side empty.
    if units1.is_empty() && units2.is_empty() {
        return Ok(Vec::new());
    }
    if units2.is_empty() {
        return Ok(vec![CorrelatedSequence::deleted(units1.clone())]);
    }
    if units1.is_empty() {
        return Ok(vec![CorrelatedSequence::inserted(units2.clone())]);
    }

    // O(n·m) scan for the longest contiguous run of equal-hash units;
    // ascending scan order gives the earliest-position tie-break.
    let mut best_len = 0usize;
    let mut best: Option<(usize, usize)> = None;

    for i1 in 0..units1.len().saturating_sub(best_len) {
        check_cancelled(settings)?;
        for i2 in 0..units2.len().saturating_sub(best_len) {
            let mut len = 0usize;
            while i1 + len < units1.len()
                && i2 + len < units2.len()
                && units1[i1 + len].hash() == units2[i2 + len].hash()
            {
                len += 1;
            }
            if len > best_len {
                best_len = len;
                best = Some((i1, i2));
            }
        }
    }

    // Never start the equal run on a paragraph mark.
    while best_len > 1 {
        let (i1, i2) = best.expect("best set when best_len > 0");
        if is_paragraph_mark_word(&units1[i1]) {
            best_len -= 1;
            if best_len == 0 {
                best = None;
            } else {
                best = Some((i1 + 1, i2 + 1));
            }
        } else {
            break;
        }
    }

    let only_paragraph_mark = best_len == 1
        && best.is_some_and(|(i1, _)| is_paragraph_mark_word(&units1[i1]));

    // A single matched space is noise.
    if best_len == 1 {
        if let Some((_, i2)) = best {
            if units2[i2].as_word().is_some_and(|w| w.text() == " ") {
                best = None;
                best_len = 0;
            }
        }
    }

    // Short matches made of nothing but separator characters are noise.
    if (1..=3).contains(&best_len) {
        if let Some((i1, _)) = best {
            let run = &units1[i1..i1 + best_len];
            let all_words = run.iter().all(|u| u.as_word().is_some());
            if all_words {
                let has_content = run.iter().any(|u| {
                    let word = u.as_word().expect("checked all_words");
                    word.atoms.iter().any(|a| match a.token.display_char() {
                        Some(c) => !settings.is_word_separator(c),
                        None => true,
                    })
                });
                if !has_content {
                    best = None;
                    best_len = 0;
                }
            }
        }
    }

    // Word-only regions must clear the detail threshold.
    if !only_paragraph_mark && best_len > 0 {
        let all_words = units1.iter().chain(units2.iter()).all(|u| u.as_word().is_some());
        if all_words {
            let max_len = units1.len().max(units2.len());
            if (best_len as f64 / max_len as f64) < settings.detail_threshold {
                best = None;
                best_len = 0;
            }
        }
    }

    let Some((best_i1, best_i2)) = best else {
        return Ok(structural_fallback(units1, units2));
    };

    let mut result = Vec::new();

    // A partial-paragraph match must not let the preceding remainder span
    // out of its own unterminated paragraph.
    let match_contains_mark = units1[best_i1..best_i1 + best_len]
        .iter()
        .any(starts_with_paragraph_mark);
    let prefix1 = &units1[..best_i1];
    let prefix2 = &units2[..best_i2];
    if match_contains_mark && !prefix1.is_empty() && !prefix2.is_empty() {
        let remaining1 = count_remaining_in_paragraph(prefix1);
        let remaining2 = count_remaining_in_paragraph(prefix2);
        let before1 = prefix1.len() - remaining1;
        let before2 = prefix2.len() - remaining2;
        push_remainder(&mut result, prefix1[..before1].to_vec(), prefix2[..before2].to_vec());
        push_remainder(&mut result, prefix1[before1..].to_vec(), prefix2[before2..].to_vec());
    } else {
        push_remainder(&mut result, prefix1.to_vec(), prefix2.to_vec());
    }

    result.push(CorrelatedSequence::equal(
        units1[best_i1..best_i1 + best_len].to_vec(),
        units2[best_i2..best_i2 + best_len].to_vec(),
    ));

    push_remainder(
        &mut result,
        units1[best_i1 + best_len..].to_vec(),
        units2[best_i2 + best_len..].to_vec(),
    );
    Ok(result)
}

// ---------------------------------------------------------------------------
// Structural fallback ladder (no acceptable common run)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UnitClass {
    Word,
    Row,
    Textbox,
    Table,
    Paragraph,
    Cell,
}

fn classify(unit: &Unit) -> UnitClass {
    match unit {
        Unit::Word(_) => UnitClass::Word,
        Unit::Group(g) => match g.kind {
            GroupKind::Row => UnitClass::Row,
            GroupKind::Textbox => UnitClass::Textbox,
            GroupKind::Table => UnitClass::Table,
            GroupKind::Paragraph => UnitClass::Paragraph,
            GroupKind::Cell => UnitClass::Cell,
        },
    }
}

fn count_class(units: &[Unit], class: UnitClass) -> usize {
    units.iter().filter(|u| classify(u) == class).count()
}

fn structural_fallback(units1: &[Unit], units2: &[Unit]) -> Vec<CorrelatedSequence> {
    let words1 = count_class(units1, UnitClass::Word);
    let words2 = count_class(units2, UnitClass::Word);
    let rows1 = count_class(units1, UnitClass::Row);
    let rows2 = count_class(units2, UnitClass::Row);
    let boxes1 = count_class(units1, UnitClass::Textbox);
    let boxes2 = count_class(units2, UnitClass::Textbox);
    let tables1 = count_class(units1, UnitClass::Table);
    let tables2 = count_class(units2, UnitClass::Table);
    let paras1 = count_class(units1, UnitClass::Paragraph);
    let paras2 = count_class(units2, UnitClass::Paragraph);

    // (a) Heterogeneous words/rows/textboxes: zip adjacent same-kind spans.
    let left_wrt = units1.len() == words1 + rows1 + boxes1;
    let right_wrt = units2.len() == words2 + rows2 + boxes2;
    if (words1 > 0 || words2 > 0)
        && (rows1 + rows2 + boxes1 + boxes2 > 0)
        && left_wrt
        && right_wrt
    {
        return zip_spans_by_class(units1, units2);
    }

    // (b) Mixed tables and paragraphs: zip spans by kind.
    if tables1 > 0 && tables2 > 0 && paras1 > 0 && paras2 > 0
        && (units1.len() > 1 || units2.len() > 1)
    {
        return zip_table_paragraph_spans(units1, units2);
    }

    // (c) Single table vs single table.
    if tables1 == 1 && units1.len() == 1 && tables2 == 1 && units2.len() == 1 {
        if let Some(result) = table_fallback(units1, units2) {
            return result;
        }
    }

    // (d) Purely paragraphs/tables/textboxes on both sides: flatten one
    // level and retry.
    let left_ptb = units1.len() == tables1 + paras1 + boxes1;
    let right_ptb = units2.len() == tables2 + paras2 + boxes2;
    if left_ptb && right_ptb {
        let flat1: Vec<Unit> = units1.iter().flat_map(Unit::flattened_children).collect();
        let flat2: Vec<Unit> = units2.iter().flat_map(Unit::flattened_children).collect();
        return vec![CorrelatedSequence::unknown(flat1, flat2)];
    }

    // (e) Both lead with rows: zip the first rows cell-by-cell.
    if units1.first().is_some_and(|u| u.is_group_of(GroupKind::Row))
        && units2.first().is_some_and(|u| u.is_group_of(GroupKind::Row))
    {
        return zip_leading_rows(units1, units2);
    }

    // (f) Both lead with cells: recurse into cell contents plus remainder.
    if units1.first().is_some_and(|u| u.is_group_of(GroupKind::Cell))
        && units2.first().is_some_and(|u| u.is_group_of(GroupKind::Cell))
    {
        let mut result = vec![CorrelatedSequence::unknown(
            units1[0].flattened_children(),
            units2[0].flattened_children(),
        )];
        push_remainder(&mut result, units1[1..].to_vec(), units2[1..].to_vec());
        return result;
    }

    // Word against row: emit in an order that keeps the row intact.
    if units1.first().is_some_and(|u| u.as_word().is_some())
        && units2.first().is_some_and(|u| u.is_group_of(GroupKind::Row))
    {
        return vec![
            CorrelatedSequence::inserted(units2.to_vec()),
            CorrelatedSequence::deleted(units1.to_vec()),
        ];
    }
    if units1.first().is_some_and(|u| u.is_group_of(GroupKind::Row))
        && units2.first().is_some_and(|u| u.as_word().is_some())
    {
        return vec![
            CorrelatedSequence::deleted(units1.to_vec()),
            CorrelatedSequence::inserted(units2.to_vec()),
        ];
    }

    // (g) Absolute fallback; order the delete/insert pair so the side whose
    // last atom closes a paragraph comes second.
    let last1_is_mark = last_atom_is_paragraph_mark(units1);
    let last2_is_mark = last_atom_is_paragraph_mark(units2);
    if last1_is_mark && !last2_is_mark {
        vec![
            CorrelatedSequence::inserted(units2.to_vec()),
            CorrelatedSequence::deleted(units1.to_vec()),
        ]
    } else {
        vec![
            CorrelatedSequence::deleted(units1.to_vec()),
            CorrelatedSequence::inserted(units2.to_vec()),
        ]
    }
}

fn last_atom_is_paragraph_mark(units: &[Unit]) -> bool {
    units
        .iter()
        .filter_map(|u| u.atoms().last().map(|a| a.is_paragraph_mark()))
        .last()
        .unwrap_or(false)
}

/// Group adjacent units by class and zip same-class spans pairwise.
fn zip_spans_by_class(units1: &[Unit], units2: &[Unit]) -> Vec<CorrelatedSequence> {
    let spans1 = class_spans(units1);
    let spans2 = class_spans(units2);

    let mut result = Vec::new();
    let mut i1 = 0usize;
    let mut i2 = 0usize;
    while i1 < spans1.len() && i2 < spans2.len() {
        let (class1, span1) = &spans1[i1];
        let (class2, span2) = &spans2[i2];
        if class1 == class2 {
            result.push(CorrelatedSequence::unknown(span1.clone(), span2.clone()));
            i1 += 1;
            i2 += 1;
        } else if *class1 == UnitClass::Word {
            result.push(CorrelatedSequence::deleted(span1.clone()));
            i1 += 1;
        } else if *class2 == UnitClass::Word {
            result.push(CorrelatedSequence::inserted(span2.clone()));
            i2 += 1;
        } else {
            result.push(CorrelatedSequence::deleted(span1.clone()));
            i1 += 1;
        }
    }
    for (_, span) in &spans1[i1..] {
        result.push(CorrelatedSequence::deleted(span.clone()));
    }
    for (_, span) in &spans2[i2..] {
        result.push(CorrelatedSequence::inserted(span.clone()));
    }
    result
}

fn class_spans(units: &[Unit]) -> Vec<(UnitClass, Vec<Unit>)> {
    let mut spans: Vec<(UnitClass, Vec<Unit>)> = Vec::new();
    for unit in units {
        let class = classify(unit);
        match spans.last_mut() {
            Some((last_class, span)) if *last_class == class => span.push(unit.clone()),
            _ => spans.push((class, vec![unit.clone()])),
        }
    }
    spans
}

fn zip_table_paragraph_spans(units1: &[Unit], units2: &[Unit]) -> Vec<CorrelatedSequence> {
    let table_or_para = |u: &Unit| {
        if u.is_group_of(GroupKind::Table) {
            UnitClass::Table
        } else {
            UnitClass::Paragraph
        }
    };
    let spans1 = spans_by(units1, table_or_para);
    let spans2 = spans_by(units2, table_or_para);

    let mut result = Vec::new();
    let mut i1 = 0usize;
    let mut i2 = 0usize;
    while i1 < spans1.len() && i2 < spans2.len() {
        let (class1, span1) = &spans1[i1];
        let (class2, span2) = &spans2[i2];
        if class1 == class2 {
            result.push(CorrelatedSequence::unknown(span1.clone(), span2.clone()));
            i1 += 1;
            i2 += 1;
        } else if *class1 == UnitClass::Paragraph {
            result.push(CorrelatedSequence::deleted(span1.clone()));
            i1 += 1;
        } else {
            result.push(CorrelatedSequence::inserted(span2.clone()));
            i2 += 1;
        }
    }
    for (_, span) in &spans1[i1..] {
        result.push(CorrelatedSequence::deleted(span.clone()));
    }
    for (_, span) in &spans2[i2..] {
        result.push(CorrelatedSequence::inserted(span.clone()));
    }
    result
}

fn spans_by<F: Fn(&Unit) -> UnitClass>(units: &[Unit], class_of: F) -> Vec<(UnitClass, Vec<Unit>)> {
    let mut spans: Vec<(UnitClass, Vec<Unit>)> = Vec::new();
    for unit in units {
        let class = class_of(unit);
        match spans.last_mut() {
            Some((last, span)) if *last == class => span.push(unit.clone()),
            _ => spans.push((class, vec![unit.clone()])),
        }
    }
    spans
}

/// Single table against single table. Row counts and per-row correlated
/// hashes matching lets merged-cell tables diff row-by-row, because merge
/// geometry is baked into the hashes.
fn table_fallback(units1: &[Unit], units2: &[Unit]) -> Option<Vec<CorrelatedSequence>> {
    let table1 = units1.first()?.as_group()?;
    let table2 = units2.first()?.as_group()?;
    if table1.kind != GroupKind::Table || table2.kind != GroupKind::Table {
        return None;
    }

    // The zips below pair the tables' child lists; they only engage when
    // every child is a row, so nothing can fall out of the pairing.
    let all_rows = table1
        .children
        .iter()
        .chain(table2.children.iter())
        .all(|u| u.is_group_of(GroupKind::Row));
    if !all_rows {
        return None;
    }
    let rows1 = &table1.children;
    let rows2 = &table2.children;

    if rows1.len() == rows2.len() {
        let all_match = rows1.iter().zip(rows2.iter()).all(|(r1, r2)| {
            let g1 = r1.as_group().expect("children are row groups");
            let g2 = r2.as_group().expect("children are row groups");
            g1.correlated_hash.is_some() && g1.correlated_hash == g2.correlated_hash
        });
        if all_match {
            return Some(
                rows1
                    .iter()
                    .zip(rows2.iter())
                    .map(|(r1, r2)| {
                        CorrelatedSequence::unknown(vec![r1.clone()], vec![r2.clone()])
                    })
                    .collect(),
            );
        }
    }

    let merged = table1.has_merged_cells() || table2.has_merged_cells();
    if merged {
        if table1.structure_hash.is_some()
            && table1.structure_hash == table2.structure_hash
            && rows1.len() == rows2.len()
        {
            return Some(
                rows1
                    .iter()
                    .zip(rows2.iter())
                    .map(|(r1, r2)| {
                        CorrelatedSequence::unknown(vec![r1.clone()], vec![r2.clone()])
                    })
                    .collect(),
            );
        }
        // Merge geometry differs: flatten to rows and replace wholesale.
        return Some(vec![
            CorrelatedSequence::deleted(rows1.clone()),
            CorrelatedSequence::inserted(rows2.clone()),
        ]);
    }

    None
}

/// Both sequences lead with a row: zip their cells pairwise, padding the
/// shorter row (extra cells become deletes/inserts), then recurse on the
/// remaining rows.
fn zip_leading_rows(units1: &[Unit], units2: &[Unit]) -> Vec<CorrelatedSequence> {
    let row1 = units1[0].as_group().expect("leading unit is a row group");
    let row2 = units2[0].as_group().expect("leading unit is a row group");

    // Zip the rows' full child lists so no content can fall out of the
    // pairing; in well-formed documents these are exactly the cells.
    let cells1: Vec<Unit> = row1.children.clone();
    let cells2: Vec<Unit> = row2.children.clone();

    let mut result = Vec::new();
    let max = cells1.len().max(cells2.len());
    for i in 0..max {
        match (cells1.get(i), cells2.get(i)) {
            (Some(c1), Some(c2)) => {
                result.push(CorrelatedSequence::unknown(
                    vec![c1.clone()],
                    vec![c2.clone()],
                ));
            }
            (Some(c1), None) => result.push(CorrelatedSequence::deleted(vec![c1.clone()])),
            (None, Some(c2)) => result.push(CorrelatedSequence::inserted(vec![c2.clone()])),
            (None, None) => {}
        }
    }
    push_remainder(&mut result, units1[1..].to_vec(), units2[1..].to_vec());
    result
}

// ---------------------------------------------------------------------------
// Flatten
// ---------------------------------------------------------------------------

/// Flatten the terminal edit script into a classified atom stream. Equal
/// regions pair left/right atoms positionally and keep the revised atom with
/// a link to its original counterpart.
pub fn flatten(sequences: &[CorrelatedSequence]) -> Vec<Atom> {
    let mut result = Vec::new();

    for seq in sequences {
        match seq.status {
            Correlation::Equal => {
                let (Some(left), Some(right)) = (&seq.left, &seq.right) else {
                    continue;
                };
                for (u1, u2) in left.iter().zip(right.iter()) {
                    let atoms1 = u1.atoms();
                    let atoms2 = u2.atoms();
                    for (a1, a2) in atoms1.iter().zip(atoms2.iter()) {
                        let mut atom = (*a2).clone();
                        atom.status = Status::Equal;
                        // Anchor equal content to the original's identity so
                        // surviving and deleted content from one source
                        // paragraph reunite during rebuild.
                        if a1.ancestor_uids.len() == atom.ancestor_uids.len() {
                            atom.ancestor_uids = a1.ancestor_uids.clone();
                        }
                        atom.linked_before = Some(Box::new((*a1).clone()));
                        result.push(atom);
                    }
                }
            }
            Correlation::Deleted => {
                if let Some(left) = &seq.left {
                    for unit in left {
                        for a in unit.atoms() {
                            let mut atom = a.clone();
                            atom.status = Status::Deleted;
                            result.push(atom);
                        }
                    }
                }
            }
            Correlation::Inserted => {
                if let Some(right) = &seq.right {
                    for unit in right {
                        for a in unit.atoms() {
                            let mut atom = a.clone();
                            atom.status = Status::Inserted;
                            result.push(atom);
                        }
                    }
                }
            }
            Correlation::Unknown => {
                debug_assert!(false, "worklist drained with Unknown remaining");
                if let Some(left) = &seq.left {
                    for unit in left {
                        for a in unit.atoms() {
                            let mut atom = a.clone();
                            atom.status = Status::Deleted;
                            result.push(atom);
                        }
                    }
                }
                if let Some(right) = &seq.right {
                    for unit in right {
                        for a in unit.atoms() {
                            let mut atom = a.clone();
                            atom.status = Status::Inserted;
                            result.push(atom);
                        }
                    }
                }
            }
        }
    }

    result
}
