//! The comparison pipeline.
//!
//! Atomizer → Grouper → Correlator → flatten → identity propagation →
//! Reassembler. Each stage is its own module; this module wires them
//! together and exposes the public entry points.

pub mod atomize;
pub mod blockhash;
pub mod correlate;
pub mod group;
pub mod identity;
pub mod rebuild;
pub mod revisions;
pub mod unit;

pub use correlate::{correlate, flatten, CorrelatedSequence, Correlation};
pub use revisions::revisions;
pub use unit::{Atom, ContentToken, Group, GroupKind, Side, Status, Unit, Word};

use crate::error::Result;
use crate::settings::ComparerSettings;
use crate::tree::document::Document;

/// Compare two documents and produce a third annotated with insert/delete
/// tracked changes that reproduces the difference.
pub fn compare(
    original: &Document,
    revised: &Document,
    settings: &ComparerSettings,
) -> Result<Document> {
    compare_internal(original, revised, settings, false)
}

/// Full pipeline. `keep_identity` preserves block-level identity tokens in
/// the output for the consolidator's anchoring pass.
pub(crate) fn compare_internal(
    original: &Document,
    revised: &Document,
    settings: &ComparerSettings,
    keep_identity: bool,
) -> Result<Document> {
    atomize::verify_supported(original)?;
    atomize::verify_supported(revised)?;

    let mut source1 = original.clone();
    let mut source2 = revised.clone();
    atomize::assign_uids(&mut source1);
    atomize::assign_uids(&mut source2);
    blockhash::annotate_block_hashes(&mut source1, settings);
    blockhash::annotate_block_hashes(&mut source2, settings);

    let atoms1 = atomize::atomize(&source1, Side::Original, settings)?;
    let atoms2 = atomize::atomize(&source2, Side::Revised, settings)?;
    tracing::debug!(
        original_atoms = atoms1.len(),
        revised_atoms = atoms2.len(),
        "atomized both documents"
    );

    let units1 = group::units_from_atoms(atoms1, settings);
    let units2 = group::units_from_atoms(atoms2, settings);

    let sequences = correlate::correlate(units1, units2, settings)?;
    tracing::debug!(sequences = sequences.len(), "correlation complete");

    let mut atoms = correlate::flatten(&sequences);
    identity::propagate_identity(&mut atoms);

    rebuild::rebuild(&atoms, &source1, &source2, settings, keep_identity)
}
