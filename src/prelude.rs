//! The types most runs need, for glob import.
pub use crate::regression::PhenotypeRegression;
pub use crate::{
    Alphabet, CancelToken, ClusterSet, PhenotypeRegressor, Phenotypes, Pipeline,
    PositionalScoreTable, RegressionModel, RegressionSummary, Result, ScoringConfig,
    SequenceSet, SimilarityScorer, SubstitutionMatrixSet, TssError, TssRecord, TssTable,
};
