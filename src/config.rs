//! Run configuration.
use crate::error::{Result, TssError};
use crate::regression::RegressionModel;
use crate::tables::TableReader;
use crate::{Alphabet, ClusterSet};
use std::path::{Path, PathBuf};

/// Parameters of a scoring run. Build one with [`ScoringConfig::builder`]:
///
/// ```
/// use tss::ScoringConfig;
///
/// let config = ScoringConfig::builder()
///     .matrix_dir("matrices")
///     .parallel(true)
///     .phenotype_columns(Some("AA_seq"), "Survive3")
///     .build()
///     .unwrap();
/// assert!(config.parallel());
/// ```
#[derive(Debug, Clone)]
pub struct ScoringConfig {
    matrix_dir: PathBuf,
    matrix_prefix: String,
    clusters: ClusterSet,
    alphabet: Alphabet,
    delimiter: u8,
    parallel: bool,
    progress_interval: usize,
    model: RegressionModel,
    feature_range: (f64, f64),
    phenotype_id_column: Option<String>,
    phenotype_value_column: String,
}

impl Default for ScoringConfig {
    /// Stock matrices under `./improved`, the eight default clusters and the 20 amino
    /// acids; single-threaded, ordinary least squares on features scaled to `[-1, 1]`,
    /// phenotypes keyed by `AA_seq` in column `Survive3`.
    fn default() -> Self {
        Self {
            matrix_dir: PathBuf::from("./improved"),
            matrix_prefix: "cluster_".to_owned(),
            clusters: ClusterSet::default(),
            alphabet: Alphabet::amino_acids(),
            delimiter: b',',
            parallel: false,
            progress_interval: 500,
            model: RegressionModel::Ordinary,
            feature_range: (-1.0, 1.0),
            phenotype_id_column: Some("AA_seq".to_owned()),
            phenotype_value_column: "Survive3".to_owned(),
        }
    }
}

impl ScoringConfig {
    /// A builder starting from the defaults.
    pub fn builder() -> ScoringConfigBuilder {
        ScoringConfigBuilder::new()
    }

    pub fn matrix_dir(&self) -> &Path {
        &self.matrix_dir
    }

    /// File name prefix of each matrix; the cluster tag and `.csv` follow it.
    pub fn matrix_prefix(&self) -> &str {
        &self.matrix_prefix
    }

    pub fn clusters(&self) -> &ClusterSet {
        &self.clusters
    }

    pub fn alphabet(&self) -> &Alphabet {
        &self.alphabet
    }

    pub fn delimiter(&self) -> u8 {
        self.delimiter
    }

    pub fn parallel(&self) -> bool {
        self.parallel
    }

    pub fn progress_interval(&self) -> usize {
        self.progress_interval
    }

    pub fn model(&self) -> RegressionModel {
        self.model
    }

    pub fn feature_range(&self) -> (f64, f64) {
        self.feature_range
    }

    /// Id and value columns of the phenotype table.
    pub fn phenotype_columns(&self) -> (Option<&str>, &str) {
        (
            self.phenotype_id_column.as_deref(),
            &self.phenotype_value_column,
        )
    }

    pub(crate) fn table_reader(&self) -> TableReader {
        let mut reader = TableReader::new();
        reader.delimiter(self.delimiter);
        reader
    }

    fn validate(&self) -> Result<()> {
        let (lo, hi) = self.feature_range;
        if !(lo < hi) {
            return Err(TssError::InvalidParameter(format!(
                "feature range ({}, {}) is empty",
                lo, hi
            )));
        }
        if self.phenotype_value_column.is_empty() {
            return Err(TssError::InvalidParameter(
                "phenotype value column is unnamed".into(),
            ));
        }
        if let RegressionModel::ElasticNet {
            alpha,
            l1_ratio,
            max_iter,
            ..
        } = self.model
        {
            if !(alpha >= 0.0) || !(0.0..=1.0).contains(&l1_ratio) || max_iter == 0 {
                return Err(TssError::InvalidParameter(format!(
                    "bad elastic net parameters {:?}",
                    self.model
                )));
            }
        }
        Ok(())
    }
}

/// Chained setters over a [`ScoringConfig`]; [`build`](Self::build) checks the result.
#[derive(Debug, Clone, Default)]
pub struct ScoringConfigBuilder {
    config: ScoringConfig,
}

impl ScoringConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn matrix_dir<P: AsRef<Path>>(&mut self, dir: P) -> &mut Self {
        self.config.matrix_dir = dir.as_ref().to_path_buf();
        self
    }

    pub fn matrix_prefix(&mut self, prefix: &str) -> &mut Self {
        self.config.matrix_prefix = prefix.to_owned();
        self
    }

    pub fn clusters(&mut self, clusters: ClusterSet) -> &mut Self {
        self.config.clusters = clusters;
        self
    }

    pub fn alphabet(&mut self, alphabet: Alphabet) -> &mut Self {
        self.config.alphabet = alphabet;
        self
    }

    pub fn delimiter(&mut self, delimiter: u8) -> &mut Self {
        self.config.delimiter = delimiter;
        self
    }

    pub fn parallel(&mut self, parallel: bool) -> &mut Self {
        self.config.parallel = parallel;
        self
    }

    pub fn progress_interval(&mut self, interval: usize) -> &mut Self {
        self.config.progress_interval = interval;
        self
    }

    pub fn model(&mut self, model: RegressionModel) -> &mut Self {
        self.config.model = model;
        self
    }

    pub fn feature_range(&mut self, lo: f64, hi: f64) -> &mut Self {
        self.config.feature_range = (lo, hi);
        self
    }

    /// Columns of the phenotype table. Without an id column, the table's index column
    /// (or failing that, row order) aligns phenotypes to peptides.
    pub fn phenotype_columns(&mut self, id: Option<&str>, value: &str) -> &mut Self {
        self.config.phenotype_id_column = id.map(str::to_owned);
        self.config.phenotype_value_column = value.to_owned();
        self
    }

    pub fn build(&self) -> Result<ScoringConfig> {
        self.config.validate()?;
        Ok(self.config.clone())
    }
}
