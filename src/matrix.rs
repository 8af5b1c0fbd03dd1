//! Per-cluster amino-acid substitution matrices.
use crate::error::{Result, TssError};
use crate::tables;
use crate::{Alphabet, ClusterSet, Code};
use ndarray::{Array2, Array3, ArrayView2, Axis};
use std::fs::File;
use std::path::Path;

/// One complete `alphabet × alphabet` score matrix per cluster.
///
/// `score(c, a, b)` is the score of query residue `a` against binder residue `b`; the
/// matrices need not be symmetric. Immutable once constructed.
#[derive(Debug, Clone)]
pub struct SubstitutionMatrixSet {
    clusters: ClusterSet,
    alphabet: Alphabet,
    scores: Array3<f64>,
}

impl SubstitutionMatrixSet {
    /// Reads `<dir>/<prefix><tag>.csv` for every cluster tag.
    ///
    /// A missing file, or a file lacking any alphabet pair, is a
    /// [`TssError::MatrixLoad`].
    pub fn load<P: AsRef<Path>>(
        dir: P,
        prefix: &str,
        clusters: &ClusterSet,
        alphabet: &Alphabet,
    ) -> Result<Self> {
        let mut matrices = Vec::with_capacity(clusters.len());
        for tag in clusters.tags() {
            let path = dir.as_ref().join(format!("{}{}.csv", prefix, tag));
            let file = File::open(&path).map_err(|e| {
                TssError::matrix(tag, format!("cannot open {}: {}", path.display(), e))
            })?;
            matrices.push(tables::read_matrix(file, tag, alphabet)?);
        }
        log::info!(
            "loaded {} substitution matrices from {}",
            matrices.len(),
            dir.as_ref().display()
        );
        Self::from_matrices(clusters, alphabet, matrices)
    }

    /// Assembles a set from in-memory matrices, one per cluster in cluster order.
    pub fn from_matrices(
        clusters: &ClusterSet,
        alphabet: &Alphabet,
        matrices: Vec<Array2<f64>>,
    ) -> Result<Self> {
        if matrices.len() != clusters.len() {
            return Err(TssError::matrix(
                clusters.tag(matrices.len().min(clusters.len() - 1)),
                format!(
                    "{} matrices supplied for {} clusters",
                    matrices.len(),
                    clusters.len()
                ),
            ));
        }
        let n = alphabet.len();
        let mut scores = Array3::zeros((clusters.len(), n, n));
        for (c, matrix) in matrices.iter().enumerate() {
            if matrix.dim() != (n, n) {
                return Err(TssError::matrix(
                    clusters.tag(c),
                    format!("shape {:?} does not cover a {}-symbol alphabet", matrix.dim(), n),
                ));
            }
            if let Some(((a, b), _)) = matrix.indexed_iter().find(|(_, v)| !v.is_finite()) {
                return Err(TssError::matrix(
                    clusters.tag(c),
                    format!(
                        "no finite score for ({}, {})",
                        alphabet.symbol(a as Code),
                        alphabet.symbol(b as Code)
                    ),
                ));
            }
            scores.index_axis_mut(Axis(0), c).assign(matrix);
        }
        Ok(Self {
            clusters: clusters.clone(),
            alphabet: alphabet.clone(),
            scores,
        })
    }

    pub fn clusters(&self) -> &ClusterSet {
        &self.clusters
    }

    pub fn alphabet(&self) -> &Alphabet {
        &self.alphabet
    }

    /// Score of residue `a` against residue `b` under cluster index `cluster`.
    pub fn score(&self, cluster: usize, a: Code, b: Code) -> f64 {
        self.scores[[cluster, a as usize, b as usize]]
    }

    /// Symbol-level lookup; `None` if the tag or either symbol is unknown.
    pub fn score_symbols(&self, tag: &str, a: char, b: char) -> Option<f64> {
        let c = self.clusters.index(tag)?;
        Some(self.score(c, self.alphabet.code(a)?, self.alphabet.code(b)?))
    }

    /// The full matrix of one cluster, rows indexed by query residue.
    pub fn matrix(&self, cluster: usize) -> ArrayView2<'_, f64> {
        self.scores.index_axis(Axis(0), cluster)
    }
}
