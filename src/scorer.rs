//! Total Similarity Scores of query peptides.
use crate::error::{Result, TssError};
use crate::sequence::{self, SequenceSet};
use crate::table::PositionalScoreTable;
use crate::{CancelToken, ClusterSet, Code};
use ndarray::{Array2, ArrayView1, ArrayView2, ArrayViewMut1, Axis, Zip};

/// Per-cluster TSS for a batch of peptides, rows in input order and columns in cluster
/// order.
#[derive(Debug, Clone, PartialEq)]
pub struct TssTable {
    labels: Vec<String>,
    clusters: ClusterSet,
    scores: Array2<f64>,
}

/// One peptide's row of a [`TssTable`].
#[derive(Debug, Clone, Copy)]
pub struct TssRecord<'a> {
    label: &'a str,
    values: ArrayView1<'a, f64>,
}

impl<'a> TssRecord<'a> {
    pub fn label(&self) -> &'a str {
        self.label
    }

    /// Scores in cluster order.
    pub fn values(&self) -> ArrayView1<'a, f64> {
        self.values
    }
}

impl TssTable {
    pub fn new(labels: Vec<String>, clusters: ClusterSet, scores: Array2<f64>) -> Result<Self> {
        if scores.dim() != (labels.len(), clusters.len()) {
            return Err(TssError::Table(format!(
                "{:?} scores for {} peptides and {} clusters",
                scores.dim(),
                labels.len(),
                clusters.len()
            )));
        }
        Ok(Self {
            labels,
            clusters,
            scores,
        })
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn clusters(&self) -> &ClusterSet {
        &self.clusters
    }

    /// The `(peptides, clusters)` score matrix.
    pub fn scores(&self) -> ArrayView2<'_, f64> {
        self.scores.view()
    }

    pub fn record(&self, index: usize) -> TssRecord<'_> {
        TssRecord {
            label: &self.labels[index],
            values: self.scores.row(index),
        }
    }

    pub fn records(&self) -> impl Iterator<Item = TssRecord<'_>> {
        self.labels
            .iter()
            .zip(self.scores.rows())
            .map(|(label, values)| TssRecord { label, values })
    }

    /// Score of one peptide under one cluster tag.
    pub fn get(&self, index: usize, tag: &str) -> Option<f64> {
        let c = self.clusters.index(tag)?;
        self.scores.get((index, c)).copied()
    }
}

/// Scores peptides against a [`PositionalScoreTable`].
///
/// Each peptide costs one table lookup per position and cluster, whatever the size of
/// the binder set. The table is only read, so any number of scorers may share it.
pub struct SimilarityScorer<'t> {
    table: &'t PositionalScoreTable,
    parallel: bool,
    progress_interval: usize,
    cancel: CancelToken,
}

impl<'t> SimilarityScorer<'t> {
    pub fn new(table: &'t PositionalScoreTable) -> Self {
        Self {
            table,
            parallel: false,
            progress_interval: 500,
            cancel: CancelToken::new(),
        }
    }

    /// Score peptides on the rayon thread pool. Results are identical either way.
    pub fn parallel(&mut self, parallel: bool) -> &mut Self {
        self.parallel = parallel;
        self
    }

    /// Log progress every `interval` peptides; 0 disables it.
    pub fn progress_interval(&mut self, interval: usize) -> &mut Self {
        self.progress_interval = interval;
        self
    }

    pub fn cancel_token(&mut self, cancel: CancelToken) -> &mut Self {
        self.cancel = cancel;
        self
    }

    /// Encodes raw peptide strings with the table's alphabet and length, then scores them.
    pub fn score_strs<S: AsRef<str>>(&self, peptides: &[S]) -> Result<TssTable> {
        let alphabet = self.table.alphabet();
        let length = self.table.length();
        let mut labels = Vec::with_capacity(peptides.len());
        let mut codes = Vec::with_capacity(peptides.len() * length);
        for (idx, peptide) in peptides.iter().enumerate() {
            let peptide = peptide.as_ref();
            sequence::encode(alphabet, idx, length, peptide, &mut codes)?;
            labels.push(peptide.to_owned());
        }
        self.score(&SequenceSet::from_parts(alphabet, length, labels, codes)?)
    }

    /// One [`TssRecord`] per peptide, in input order.
    pub fn score(&self, peptides: &SequenceSet) -> Result<TssTable> {
        let table = self.table;
        peptides.ensure_compatible(table.alphabet(), table.length())?;
        if table.is_degenerate() {
            log::warn!(
                "scoring {} peptides against a table built from no binders",
                peptides.len()
            );
        }

        let n_clusters = table.clusters().len();
        let mut scores = Array2::<f64>::zeros((peptides.len(), n_clusters));
        if self.parallel {
            Zip::from(scores.axis_iter_mut(Axis(0)))
                .and(peptides.codes().axis_iter(Axis(0)))
                .par_for_each(|row, peptide| {
                    if !self.cancel.is_cancelled() {
                        fill_row(table, peptide, row);
                    }
                });
            self.cancel.check()?;
        } else {
            let total = peptides.len();
            for (m, (row, peptide)) in scores
                .axis_iter_mut(Axis(0))
                .zip(peptides.codes().axis_iter(Axis(0)))
                .enumerate()
            {
                self.cancel.check()?;
                fill_row(table, peptide, row);
                if self.progress_interval > 0 && m % self.progress_interval == 0 {
                    log::info!("scored {}/{} peptides", m, total);
                }
            }
        }

        TssTable::new(peptides.labels().to_vec(), table.clusters().clone(), scores)
    }
}

fn fill_row(
    table: &PositionalScoreTable,
    peptide: ArrayView1<'_, Code>,
    mut row: ArrayViewMut1<'_, f64>,
) {
    for (c, out) in row.iter_mut().enumerate() {
        *out = peptide
            .iter()
            .enumerate()
            .map(|(p, &aa)| table.lookup(c, aa, p))
            .sum();
    }
}
