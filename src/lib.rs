#![crate_name = "tss"]
//! Total Similarity Scores (TSS) of candidate peptides against a set of known strong
//! binders, under several amino-acid substitution matrices ("clusters").
//!
//! The expensive part of a naive comparison is the sum over every binder for every
//! peptide. Here it is paid once: [`PositionalScoreTable`] folds the binder set into a
//! dense (cluster, residue, position) table, after which [`SimilarityScorer`] scores each
//! peptide with one lookup per position and cluster. [`PhenotypeRegressor`] optionally
//! regresses an external phenotype on the resulting per-cluster scores.
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub mod prelude;

pub mod config;
pub mod error;
pub mod matrix;
pub mod pipeline;
pub mod regression;
pub mod scorer;
pub mod sequence;
pub mod table;
pub mod tables;

pub use config::{ScoringConfig, ScoringConfigBuilder};
pub use error::{Result, SequenceFault, TssError};
pub use matrix::SubstitutionMatrixSet;
pub use pipeline::Pipeline;
pub use regression::{PhenotypeRegressor, Phenotypes, RegressionModel, RegressionSummary};
pub use scorer::{SimilarityScorer, TssRecord, TssTable};
pub use sequence::SequenceSet;
pub use table::PositionalScoreTable;

/// Residue code within an [`Alphabet`].
pub type Code = u8;

/// The 20 standard amino acids, in the column order used by the matrix tables.
pub const AMINO_ACIDS: &str = "ACDEFGHIKLMNPQRSTVWY";

/// Cluster tags of the stock substitution matrices.
pub const DEFAULT_CLUSTERS: [&str; 8] = ["a", "b", "c", "e", "h", "i", "p", "r"];

const NO_CODE: Code = Code::MAX;

/// A fixed, ordered set of single-character residue symbols.
///
/// Lookup is case-sensitive: only the exact symbols given are members.
#[derive(Clone, PartialEq, Eq)]
pub struct Alphabet {
    symbols: Vec<u8>,
    codes: [Code; 256],
}

impl Alphabet {
    /// Constructs an alphabet from its symbols, in order.
    pub fn new(symbols: &str) -> Result<Self> {
        if symbols.is_empty() {
            return Err(TssError::InvalidParameter("alphabet is empty".into()));
        }
        let mut codes = [NO_CODE; 256];
        let mut ordered = Vec::with_capacity(symbols.len());
        for c in symbols.chars() {
            if !c.is_ascii_graphic() {
                return Err(TssError::InvalidParameter(format!(
                    "alphabet symbol {:?} is not a printable ASCII character",
                    c
                )));
            }
            let b = c as u8;
            if codes[b as usize] != NO_CODE {
                return Err(TssError::InvalidParameter(format!(
                    "alphabet symbol {:?} appears twice",
                    c
                )));
            }
            codes[b as usize] = ordered.len() as Code;
            ordered.push(b);
        }
        Ok(Self {
            symbols: ordered,
            codes,
        })
    }

    /// The 20 standard amino acids.
    pub fn amino_acids() -> Self {
        let mut codes = [NO_CODE; 256];
        for (i, b) in AMINO_ACIDS.bytes().enumerate() {
            codes[b as usize] = i as Code;
        }
        Self {
            symbols: AMINO_ACIDS.as_bytes().to_vec(),
            codes,
        }
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Code of a character, if it belongs to the alphabet.
    pub fn code(&self, c: char) -> Option<Code> {
        if !c.is_ascii() {
            return None;
        }
        match self.codes[c as usize] {
            NO_CODE => None,
            code => Some(code),
        }
    }

    /// Symbol for a code. Panics if the code is out of range.
    pub fn symbol(&self, code: Code) -> char {
        self.symbols[code as usize] as char
    }

    pub fn symbols(&self) -> impl Iterator<Item = char> + '_ {
        self.symbols.iter().map(|&b| b as char)
    }
}

impl Default for Alphabet {
    fn default() -> Self {
        Self::amino_acids()
    }
}

impl fmt::Debug for Alphabet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Alphabet")
            .field(&String::from_utf8_lossy(&self.symbols))
            .finish()
    }
}

/// The ordered cluster tags of a run.
///
/// The order is global: it indexes matrices and tables, and it is the column order of
/// every TSS table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterSet {
    tags: Vec<String>,
}

impl ClusterSet {
    pub fn new<I, S>(tags: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut ordered: Vec<String> = vec![];
        for tag in tags {
            let tag = tag.into();
            if tag.is_empty() {
                return Err(TssError::InvalidParameter("empty cluster tag".into()));
            }
            if ordered.contains(&tag) {
                return Err(TssError::InvalidParameter(format!(
                    "cluster tag {:?} appears twice",
                    tag
                )));
            }
            ordered.push(tag);
        }
        if ordered.is_empty() {
            return Err(TssError::InvalidParameter("no cluster tags".into()));
        }
        Ok(Self { tags: ordered })
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    pub fn index(&self, tag: &str) -> Option<usize> {
        self.tags.iter().position(|t| t == tag)
    }

    pub fn tag(&self, index: usize) -> &str {
        &self.tags[index]
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }
}

impl Default for ClusterSet {
    fn default() -> Self {
        Self {
            tags: DEFAULT_CLUSTERS.iter().map(|t| t.to_string()).collect(),
        }
    }
}

/// Shared flag that aborts a table build or scoring run at its next outer-loop step.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    pub(crate) fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(TssError::Cancelled)
        } else {
            Ok(())
        }
    }
}
