//! File-to-file runs: TSS from peptide and binder tables, and phenotype predictions
//! from a TSS table.
use crate::config::ScoringConfig;
use crate::error::{Result, TssError};
use crate::matrix::SubstitutionMatrixSet;
use crate::regression::{PhenotypeRegressor, RegressionSummary};
use crate::scorer::{SimilarityScorer, TssTable};
use crate::sequence::SequenceSet;
use crate::table::PositionalScoreTable;
use crate::tables;
use crate::CancelToken;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

/// A configured run over one substitution matrix set.
pub struct Pipeline {
    config: ScoringConfig,
    matrices: SubstitutionMatrixSet,
    cancel: CancelToken,
}

impl Pipeline {
    /// Loads the configured matrices from disk.
    pub fn new(config: ScoringConfig) -> Result<Self> {
        let matrices = SubstitutionMatrixSet::load(
            config.matrix_dir(),
            config.matrix_prefix(),
            config.clusters(),
            config.alphabet(),
        )?;
        Ok(Self {
            config,
            matrices,
            cancel: CancelToken::new(),
        })
    }

    /// Uses matrices already in memory; they must match the configured clusters and
    /// alphabet.
    pub fn with_matrices(config: ScoringConfig, matrices: SubstitutionMatrixSet) -> Result<Self> {
        if matrices.clusters() != config.clusters() {
            return Err(TssError::InvalidParameter(format!(
                "matrices cover clusters {:?}, configuration names {:?}",
                matrices.clusters().tags(),
                config.clusters().tags()
            )));
        }
        if matrices.alphabet() != config.alphabet() {
            return Err(TssError::InvalidParameter(format!(
                "matrices use {:?}, configuration names {:?}",
                matrices.alphabet(),
                config.alphabet()
            )));
        }
        Ok(Self {
            config,
            matrices,
            cancel: CancelToken::new(),
        })
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    pub fn matrices(&self) -> &SubstitutionMatrixSet {
        &self.matrices
    }

    /// Token that aborts this pipeline's table builds and scoring runs.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn read_sequences<P: AsRef<Path>>(&self, path: P) -> Result<SequenceSet> {
        let file = BufReader::new(File::open(path)?);
        self.config
            .table_reader()
            .sequences(file, self.config.alphabet())
    }

    pub fn table(&self, binders: &SequenceSet) -> Result<PositionalScoreTable> {
        PositionalScoreTable::build_with_cancel(&self.matrices, binders, &self.cancel)
    }

    pub fn score(&self, table: &PositionalScoreTable, peptides: &SequenceSet) -> Result<TssTable> {
        SimilarityScorer::new(table)
            .parallel(self.config.parallel())
            .progress_interval(self.config.progress_interval())
            .cancel_token(self.cancel.clone())
            .score(peptides)
    }

    /// Scores every peptide of one table against the binders of another.
    pub fn calculate_tss<P, Q>(&self, peptides: P, binders: Q) -> Result<TssTable>
    where
        P: AsRef<Path>,
        Q: AsRef<Path>,
    {
        log::info!("storing peptides from {}", peptides.as_ref().display());
        let peptides = self.read_sequences(peptides)?;
        log::info!("storing binders from {}", binders.as_ref().display());
        let binders = self.read_sequences(binders)?;
        if peptides.length() != binders.length() {
            return Err(TssError::length(0, binders.length(), peptides.length()));
        }
        let table = self.table(&binders)?;
        self.score(&table, &peptides)
    }

    pub fn read_tss<P: AsRef<Path>>(&self, path: P) -> Result<TssTable> {
        let file = BufReader::new(File::open(path)?);
        self.config
            .table_reader()
            .tss(file, self.config.clusters())
    }

    pub fn write_tss<P: AsRef<Path>>(&self, tss: &TssTable, path: P) -> Result<()> {
        tables::write_tss(BufWriter::new(File::create(path)?), tss)
    }

    /// Regresses the phenotype table at `phenotypes` on the TSS table at `tss`.
    pub fn predict<P, Q>(&self, phenotypes: P, tss: Q) -> Result<RegressionSummary>
    where
        P: AsRef<Path>,
        Q: AsRef<Path>,
    {
        let (id_column, value_column) = self.config.phenotype_columns();
        let labels = self.config.table_reader().phenotypes(
            BufReader::new(File::open(phenotypes)?),
            id_column,
            value_column,
        )?;
        let tss = self.read_tss(tss)?;
        let (lo, hi) = self.config.feature_range();
        PhenotypeRegressor::new(self.config.model())
            .feature_range(lo, hi)
            .fit(&tss, &labels)
    }

    pub fn write_predictions<P: AsRef<Path>>(
        &self,
        summary: &RegressionSummary,
        path: P,
    ) -> Result<()> {
        tables::write_predictions(BufWriter::new(File::create(path)?), summary)?;
        log::info!(
            "wrote {} predictions, r = {:.4}",
            summary.labels().len(),
            summary.correlation()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Alphabet, ClusterSet};
    use std::error::Error;
    use std::fs;

    fn write(dir: &Path, name: &str, body: &str) -> std::io::Result<()> {
        fs::write(dir.join(name), body)
    }

    fn two_letter_config(dir: &Path) -> Result<ScoringConfig> {
        ScoringConfig::builder()
            .matrix_dir(dir)
            .clusters(ClusterSet::new(vec!["a", "b"])?)
            .alphabet(Alphabet::new("AC")?)
            .build()
    }

    #[test]
    fn test_files_end_to_end() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let dir = dir.path();
        write(dir, "cluster_a.csv", ",A,C\nA,1,0\nC,0,1\n")?;
        write(dir, "cluster_b.csv", ",A,C\nA,2,-1\nC,-1,3\n")?;
        write(dir, "binders.csv", ",0,1\n0,A,C\n1,A,A\n")?;
        write(dir, "peptides.csv", ",0,1\n0,A,C\n1,C,C\n2,C,A\n3,A,A\n")?;

        let pipeline = Pipeline::new(two_letter_config(dir)?)?;
        let tss = pipeline.calculate_tss(dir.join("peptides.csv"), dir.join("binders.csv"))?;
        assert_eq!(tss.labels(), &["AC", "CC", "CA", "AA"]);
        assert_eq!(tss.get(0, "a"), Some(3.0));
        // b: A@0 = 2+2, C@1 = 3-1 → 6
        assert_eq!(tss.get(0, "b"), Some(6.0));

        pipeline.write_tss(&tss, dir.join("TSS.csv"))?;
        assert_eq!(pipeline.read_tss(dir.join("TSS.csv"))?, tss);

        write(
            dir,
            "survival.csv",
            "Unnamed: 0,AA_seq,Survive3 \n0,CA,1\n1,AC,9\n2,AA,6\n3,CC,2\n",
        )?;
        // default columns: peptide ids in AA_seq, not the numeric index
        let summary = pipeline.predict(dir.join("survival.csv"), dir.join("TSS.csv"))?;
        assert_eq!(summary.observed().to_vec(), vec![9.0, 2.0, 1.0, 6.0]);
        assert!(summary.correlation() > 0.0 && summary.correlation() <= 1.0 + 1e-12);

        pipeline.write_predictions(&summary, dir.join("predictions.csv"))?;
        let written = fs::read_to_string(dir.join("predictions.csv"))?;
        assert!(written.starts_with(",observed,predicted\nAC,9,"));
        assert_eq!(written.lines().count(), 5);
        Ok(())
    }

    #[test]
    fn test_length_mismatch_between_tables() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let dir = dir.path();
        write(dir, "cluster_a.csv", ",A,C\nA,1,0\nC,0,1\n")?;
        write(dir, "cluster_b.csv", ",A,C\nA,1,0\nC,0,1\n")?;
        write(dir, "binders.csv", "0,1\nA,C\n")?;
        write(dir, "peptides.csv", "0,1,2\nA,C,C\n")?;
        let pipeline = Pipeline::new(two_letter_config(dir)?)?;
        let err = pipeline
            .calculate_tss(dir.join("peptides.csv"), dir.join("binders.csv"))
            .unwrap_err();
        assert!(matches!(err, TssError::InvalidSequence { .. }));
        Ok(())
    }

    #[test]
    fn test_mismatched_matrices_rejected() -> Result<(), Box<dyn Error>> {
        let alphabet = Alphabet::amino_acids();
        let clusters = ClusterSet::new(vec!["a"])?;
        let matrices = SubstitutionMatrixSet::from_matrices(
            &clusters,
            &alphabet,
            vec![ndarray::Array2::zeros((20, 20))],
        )?;
        // default configuration expects eight clusters
        assert!(Pipeline::with_matrices(ScoringConfig::default(), matrices.clone()).is_err());
        let config = ScoringConfig::builder().clusters(clusters).build()?;
        assert!(Pipeline::with_matrices(config, matrices).is_ok());
        Ok(())
    }
}
