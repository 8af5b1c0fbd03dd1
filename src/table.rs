//! The positional score table: per-cluster, per-residue, per-position substitution totals
//! against a whole binder set.
use crate::error::{Result, SequenceFault, TssError};
use crate::matrix::SubstitutionMatrixSet;
use crate::sequence::SequenceSet;
use crate::{Alphabet, CancelToken, ClusterSet, Code};
use ndarray::{Array2, Array3, Axis};

/// `lookup(c, a, p)` is the sum over every binder `b` of `M_c[a, b[p]]`.
///
/// Stored densely as a `(clusters, alphabet, length)` array. The table is tied to the
/// binder set and matrices it was built from; if either changes, build a new one.
#[derive(Debug, Clone)]
pub struct PositionalScoreTable {
    clusters: ClusterSet,
    alphabet: Alphabet,
    n_binders: usize,
    totals: Array3<f64>,
}

impl PositionalScoreTable {
    pub fn build(matrices: &SubstitutionMatrixSet, binders: &SequenceSet) -> Result<Self> {
        Self::build_with_cancel(matrices, binders, &CancelToken::new())
    }

    /// Builds the table, checking `cancel` per binder while counting and per cluster
    /// while summing.
    ///
    /// Binders only matter through their per-position residue counts, so the build
    /// costs one pass over the binders plus a `alphabet × alphabet × length` product per
    /// cluster, independent of how many peptides are scored later.
    pub fn build_with_cancel(
        matrices: &SubstitutionMatrixSet,
        binders: &SequenceSet,
        cancel: &CancelToken,
    ) -> Result<Self> {
        if binders.alphabet() != matrices.alphabet() {
            return Err(TssError::InvalidSequence {
                sequence: 0,
                position: 0,
                fault: SequenceFault::Alphabet,
            });
        }
        let alphabet = matrices.alphabet();
        let length = binders.length();

        // counts[[p, b]]: binders with residue b at position p
        let mut counts = Array2::<f64>::zeros((length, alphabet.len()));
        for binder in binders.codes().rows() {
            cancel.check()?;
            for (p, &b) in binder.iter().enumerate() {
                counts[[p, b as usize]] += 1.0;
            }
        }

        let clusters = matrices.clusters();
        let mut totals = Array3::<f64>::zeros((clusters.len(), alphabet.len(), length));
        for (c, mut slab) in totals.axis_iter_mut(Axis(0)).enumerate() {
            cancel.check()?;
            slab.assign(&matrices.matrix(c).dot(&counts.t()));
        }

        if binders.is_empty() {
            log::warn!("no binders supplied: every positional score is 0");
        } else {
            log::info!(
                "built positional scores for {} binders of length {} over {} clusters",
                binders.len(),
                length,
                clusters.len()
            );
        }

        Ok(Self {
            clusters: clusters.clone(),
            alphabet: alphabet.clone(),
            n_binders: binders.len(),
            totals,
        })
    }

    pub fn lookup(&self, cluster: usize, aa: Code, position: usize) -> f64 {
        self.totals[[cluster, aa as usize, position]]
    }

    /// Sequence length the table was built for.
    pub fn length(&self) -> usize {
        self.totals.len_of(Axis(2))
    }

    pub fn clusters(&self) -> &ClusterSet {
        &self.clusters
    }

    pub fn alphabet(&self) -> &Alphabet {
        &self.alphabet
    }

    pub fn n_binders(&self) -> usize {
        self.n_binders
    }

    /// True when built from no binders, so every score it yields is 0.
    pub fn is_degenerate(&self) -> bool {
        self.n_binders == 0
    }
}
