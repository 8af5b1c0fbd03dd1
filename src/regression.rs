//! Regression of an external phenotype on per-cluster TSS features.
use crate::error::{Result, TssError};
use crate::scorer::TssTable;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis, Zip};
use std::collections::HashMap;

/// Scalar phenotype per peptide, optionally keyed by peptide id.
#[derive(Debug, Clone, PartialEq)]
pub struct Phenotypes {
    ids: Option<Vec<String>>,
    values: Vec<f64>,
}

impl Phenotypes {
    /// Phenotypes aligned to features by row order.
    pub fn new(values: Vec<f64>) -> Self {
        Self { ids: None, values }
    }

    /// Phenotypes aligned to features by peptide id.
    pub fn with_ids(ids: Vec<String>, values: Vec<f64>) -> Result<Self> {
        if ids.len() != values.len() {
            return Err(TssError::Alignment(format!(
                "{} phenotype ids for {} values",
                ids.len(),
                values.len()
            )));
        }
        Ok(Self {
            ids: Some(ids),
            values,
        })
    }

    pub fn ids(&self) -> Option<&[String]> {
        self.ids.as_deref()
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Phenotype values reordered to follow `labels`.
    fn aligned_to(&self, labels: &[String]) -> Result<Array1<f64>> {
        if self.len() != labels.len() {
            return Err(TssError::Alignment(format!(
                "{} TSS rows but {} phenotype rows",
                labels.len(),
                self.len()
            )));
        }
        let ids = match &self.ids {
            None => return Ok(Array1::from(self.values.clone())),
            Some(ids) => ids,
        };
        let mut index = HashMap::with_capacity(ids.len());
        for (i, id) in ids.iter().enumerate() {
            if index.insert(id.as_str(), i).is_some() {
                return Err(TssError::Alignment(format!("phenotype id {:?} appears twice", id)));
            }
        }
        let mut used = vec![false; ids.len()];
        labels
            .iter()
            .map(|label| {
                let &i = index.get(label.as_str()).ok_or_else(|| {
                    TssError::Alignment(format!("no phenotype for peptide {:?}", label))
                })?;
                if std::mem::replace(&mut used[i], true) {
                    return Err(TssError::Alignment(format!(
                        "peptide {:?} appears twice in the TSS table",
                        label
                    )));
                }
                Ok(self.values[i])
            })
            .collect()
    }
}

/// The linear model fit by [`PhenotypeRegressor`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RegressionModel {
    /// Ordinary least squares with intercept.
    Ordinary,
    /// Minimises `(1/2n)·‖y − Xw − b‖² + α·ρ·‖w‖₁ + α·(1 − ρ)/2·‖w‖²`, with `ρ` the
    /// `l1_ratio`, by cyclic coordinate descent.
    ElasticNet {
        alpha: f64,
        l1_ratio: f64,
        max_iter: usize,
        tol: f64,
    },
}

impl Default for RegressionModel {
    fn default() -> Self {
        Self::Ordinary
    }
}

/// Min-max scaling of each column into `[lo, hi]`.
///
/// Fit and applied to the same matrix here, so it is not safe for held-out
/// evaluation. Constant columns map to `lo`.
#[derive(Debug, Clone)]
pub struct MinMaxScaler {
    lo: f64,
    hi: f64,
    mins: Array1<f64>,
    ranges: Array1<f64>,
}

impl MinMaxScaler {
    pub fn fit(x: ArrayView2<'_, f64>, lo: f64, hi: f64) -> Self {
        let mins = x.fold_axis(Axis(0), f64::INFINITY, |&m, &v| m.min(v));
        let maxs = x.fold_axis(Axis(0), f64::NEG_INFINITY, |&m, &v| m.max(v));
        let ranges = Zip::from(&maxs)
            .and(&mins)
            .map_collect(|&max, &min| if max > min { max - min } else { 1.0 });
        Self {
            lo,
            hi,
            mins,
            ranges,
        }
    }

    pub fn transform(&self, x: ArrayView2<'_, f64>) -> Array2<f64> {
        let mut out = x.to_owned();
        for mut row in out.rows_mut() {
            Zip::from(&mut row)
                .and(&self.mins)
                .and(&self.ranges)
                .for_each(|v, &min, &range| {
                    *v = self.lo + (*v - min) / range * (self.hi - self.lo);
                });
        }
        out
    }
}

/// Outcome of a phenotype fit.
#[derive(Debug, Clone)]
pub struct RegressionSummary {
    labels: Vec<String>,
    observed: Array1<f64>,
    predicted: Array1<f64>,
    coefficients: Array1<f64>,
    intercept: f64,
    correlation: f64,
}

impl RegressionSummary {
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn observed(&self) -> ArrayView1<'_, f64> {
        self.observed.view()
    }

    /// In-sample predictions, aligned with [`observed`](Self::observed).
    pub fn predicted(&self) -> ArrayView1<'_, f64> {
        self.predicted.view()
    }

    /// Weights on the scaled features, in cluster order.
    pub fn coefficients(&self) -> ArrayView1<'_, f64> {
        self.coefficients.view()
    }

    pub fn intercept(&self) -> f64 {
        self.intercept
    }

    /// Pearson correlation of observed against predicted.
    pub fn correlation(&self) -> f64 {
        self.correlation
    }

    /// `(peptide, observed, predicted)` rows.
    pub fn predictions(&self) -> impl Iterator<Item = (&str, f64, f64)> + '_ {
        self.labels
            .iter()
            .zip(self.observed.iter().zip(self.predicted.iter()))
            .map(|(label, (&o, &p))| (label.as_str(), o, p))
    }
}

/// Fits a linear model of a phenotype on scaled TSS features.
#[derive(Debug, Clone)]
pub struct PhenotypeRegressor {
    model: RegressionModel,
    feature_range: (f64, f64),
}

impl PhenotypeRegressor {
    pub fn new(model: RegressionModel) -> Self {
        Self {
            model,
            feature_range: (-1.0, 1.0),
        }
    }

    /// Range the features are min-max scaled into before fitting.
    pub fn feature_range(&mut self, lo: f64, hi: f64) -> &mut Self {
        self.feature_range = (lo, hi);
        self
    }

    pub fn fit(&self, tss: &TssTable, phenotypes: &Phenotypes) -> Result<RegressionSummary> {
        let (lo, hi) = self.feature_range;
        if !(lo < hi) {
            return Err(TssError::InvalidParameter(format!(
                "feature range ({}, {}) is empty",
                lo, hi
            )));
        }
        let y = phenotypes.aligned_to(tss.labels())?;
        if y.len() < 2 {
            return Err(TssError::InsufficientData(format!(
                "{} rows; fitting needs at least 2",
                y.len()
            )));
        }

        if y.iter().chain(tss.scores().iter()).any(|v| !v.is_finite()) {
            return Err(TssError::InsufficientData(
                "features and phenotypes must be finite".into(),
            ));
        }

        let x = MinMaxScaler::fit(tss.scores(), lo, hi).transform(tss.scores());
        let (coefficients, intercept) = match self.model {
            RegressionModel::Ordinary => ordinary_least_squares(x.view(), y.view())?,
            RegressionModel::ElasticNet {
                alpha,
                l1_ratio,
                max_iter,
                tol,
            } => elastic_net(x.view(), y.view(), alpha, l1_ratio, max_iter, tol)?,
        };
        let predicted = x.dot(&coefficients) + intercept;
        let correlation = pearson(y.view(), predicted.view())?;
        log::info!(
            "fit {:?} on {} peptides: r = {:.4}",
            self.model,
            y.len(),
            correlation
        );

        Ok(RegressionSummary {
            labels: tss.labels().to_vec(),
            observed: y,
            predicted,
            coefficients,
            intercept,
            correlation,
        })
    }
}

impl Default for PhenotypeRegressor {
    fn default() -> Self {
        Self::new(RegressionModel::Ordinary)
    }
}

/// Regression straight from a TSS table.
pub trait PhenotypeRegression {
    fn regress(&self, phenotypes: &Phenotypes, model: RegressionModel)
        -> Result<RegressionSummary>;
}

impl PhenotypeRegression for TssTable {
    fn regress(
        &self,
        phenotypes: &Phenotypes,
        model: RegressionModel,
    ) -> Result<RegressionSummary> {
        PhenotypeRegressor::new(model).fit(self, phenotypes)
    }
}

/// Column means and the centred copy of `x`.
fn center(x: ArrayView2<'_, f64>) -> Result<(Array1<f64>, Array2<f64>)> {
    let means = x
        .mean_axis(Axis(0))
        .ok_or_else(|| TssError::InsufficientData("no rows to center".into()))?;
    let centered = &x - &means;
    Ok((means, centered))
}

fn ordinary_least_squares(
    x: ArrayView2<'_, f64>,
    y: ArrayView1<'_, f64>,
) -> Result<(Array1<f64>, f64)> {
    let (x_means, xc) = center(x)?;
    let y_mean = y.sum() / y.len() as f64;
    let yc = &y - y_mean;

    let xtx = xc.t().dot(&xc);
    let xty = xc.t().dot(&yc);
    let coefficients = solve_normal_equations(xtx, xty);
    let intercept = y_mean - x_means.dot(&coefficients);
    Ok((coefficients, intercept))
}

/// Solves `a · w = b` for symmetric positive semi-definite `a` by Gauss-Jordan
/// elimination with partial pivoting.
///
/// Columns whose best pivot is negligible (constant or collinear features) are left
/// free with weight 0, which keeps the fit defined when features are degenerate.
fn solve_normal_equations(mut a: Array2<f64>, mut b: Array1<f64>) -> Array1<f64> {
    let n = b.len();
    let scale = a.diag().iter().fold(0.0f64, |m, &v| m.max(v.abs()));
    let tol = scale * 1e-12;
    let mut pivots = vec![];
    let mut row = 0;
    for col in 0..n {
        if row == n {
            break;
        }
        let (best, best_val) = (row..n)
            .map(|r| (r, a[[r, col]].abs()))
            .fold((row, -1.0), |acc, cur| if cur.1 > acc.1 { cur } else { acc });
        if best_val <= tol {
            continue;
        }
        if best != row {
            for j in 0..n {
                a.swap([row, j], [best, j]);
            }
            b.swap(row, best);
        }
        let pivot = a[[row, col]];
        for r in 0..n {
            if r == row {
                continue;
            }
            let factor = a[[r, col]] / pivot;
            if factor == 0.0 {
                continue;
            }
            for j in col..n {
                let above = a[[row, j]];
                a[[r, j]] -= factor * above;
            }
            let above = b[row];
            b[r] -= factor * above;
        }
        pivots.push((row, col));
        row += 1;
    }

    let mut w = Array1::zeros(n);
    for (r, c) in pivots {
        w[c] = b[r] / a[[r, c]];
    }
    w
}

fn elastic_net(
    x: ArrayView2<'_, f64>,
    y: ArrayView1<'_, f64>,
    alpha: f64,
    l1_ratio: f64,
    max_iter: usize,
    tol: f64,
) -> Result<(Array1<f64>, f64)> {
    if !(alpha >= 0.0) {
        return Err(TssError::InvalidParameter("alpha must be >= 0".into()));
    }
    if !(0.0..=1.0).contains(&l1_ratio) {
        return Err(TssError::InvalidParameter("l1_ratio must be in [0, 1]".into()));
    }
    if max_iter == 0 {
        return Err(TssError::InvalidParameter("max_iter must be > 0".into()));
    }

    let n = y.len() as f64;
    let (x_means, xc) = center(x)?;
    let y_mean = y.sum() / n;
    let mut residual = &y - y_mean;

    let l1 = alpha * l1_ratio;
    let l2 = alpha * (1.0 - l1_ratio);
    let col_norms: Vec<f64> = xc
        .columns()
        .into_iter()
        .map(|col| col.dot(&col) / n)
        .collect();

    let mut w = Array1::<f64>::zeros(xc.ncols());
    let mut converged = false;
    for _ in 0..max_iter {
        let mut max_change = 0.0f64;
        for (j, col) in xc.columns().into_iter().enumerate() {
            let denom = col_norms[j] + l2;
            if denom <= f64::EPSILON {
                continue;
            }
            let old = w[j];
            let rho = col.dot(&residual) / n + old * col_norms[j];
            let new = soft_threshold(rho, l1) / denom;
            let delta = new - old;
            if delta != 0.0 {
                residual.scaled_add(-delta, &col);
                w[j] = new;
            }
            max_change = max_change.max(delta.abs());
        }
        if max_change < tol {
            converged = true;
            break;
        }
    }
    if !converged {
        log::warn!("elastic net did not converge in {} iterations", max_iter);
    }

    let intercept = y_mean - x_means.dot(&w);
    Ok((w, intercept))
}

/// `sign(x) · max(0, |x| − λ)`
fn soft_threshold(x: f64, lambda: f64) -> f64 {
    if x > lambda {
        x - lambda
    } else if x < -lambda {
        x + lambda
    } else {
        0.0
    }
}

/// Pearson product-moment correlation.
///
/// Undefined, and an error rather than NaN, for fewer than two observations or a
/// constant series.
pub fn pearson(x: ArrayView1<'_, f64>, y: ArrayView1<'_, f64>) -> Result<f64> {
    if x.len() != y.len() {
        return Err(TssError::Alignment(format!(
            "correlation of {} against {} values",
            x.len(),
            y.len()
        )));
    }
    if x.len() < 2 {
        return Err(TssError::InsufficientData(
            "correlation needs at least 2 observations".into(),
        ));
    }
    let n = x.len() as f64;
    let mean_x = x.sum() / n;
    let mean_y = y.sum() / n;
    let (mut cov, mut var_x, mut var_y) = (0.0, 0.0, 0.0);
    for (xi, yi) in x.iter().zip(y.iter()) {
        let dx = xi - mean_x;
        let dy = yi - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }
    let denom = (var_x * var_y).sqrt();
    if !denom.is_finite() || !cov.is_finite() {
        return Err(TssError::InsufficientData(
            "correlation is undefined for non-finite values".into(),
        ));
    }
    if denom == 0.0 {
        return Err(TssError::InsufficientData(
            "correlation is undefined for a constant series".into(),
        ));
    }
    Ok(cov / denom)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ClusterSet;
    use ndarray::array;
    use std::error::Error;

    fn labels(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("P{}", i)).collect()
    }

    fn tss(scores: Array2<f64>) -> Result<TssTable> {
        let clusters = ClusterSet::new((0..scores.ncols()).map(|c| format!("c{}", c)))?;
        TssTable::new(labels(scores.nrows()), clusters, scores)
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6
    }

    #[test]
    fn test_scaler_maps_columns_into_range() {
        let x = array![[1.0, 5.0, 2.0], [3.0, 5.0, 4.0], [2.0, 5.0, 6.0]];
        let scaled = MinMaxScaler::fit(x.view(), -1.0, 1.0).transform(x.view());
        assert_eq!(scaled.column(0).to_vec(), vec![-1.0, 1.0, 0.0]);
        assert_eq!(scaled.column(1).to_vec(), vec![-1.0, -1.0, -1.0]);
        assert_eq!(scaled.column(2).to_vec(), vec![-1.0, 0.0, 1.0]);
    }

    #[test]
    fn test_ordinary_fit_recovers_linear_phenotype() -> Result<(), Box<dyn Error>> {
        let scores = array![
            [574.0, 641.0],
            [612.0, 690.0],
            [719.0, 782.0],
            [650.0, 600.0],
            [700.0, 720.0],
            [580.0, 770.0]
        ];
        let y: Vec<f64> = scores
            .rows()
            .into_iter()
            .map(|r| 0.5 * r[0] - 0.25 * r[1] + 10.0)
            .collect();
        let summary =
            PhenotypeRegressor::default().fit(&tss(scores)?, &Phenotypes::new(y.clone()))?;
        assert!(close(summary.correlation(), 1.0));
        for (p, o) in summary.predicted().iter().zip(y.iter()) {
            assert!(close(*p, *o));
        }
        assert_eq!(summary.predictions().count(), 6);
        Ok(())
    }

    #[test]
    fn test_collinear_features_still_fit() -> Result<(), Box<dyn Error>> {
        let scores = array![[1.0, 2.0, 7.0], [2.0, 4.0, 7.0], [3.0, 6.0, 7.0], [4.0, 8.0, 7.0]];
        let y = vec![1.0, 3.0, 2.0, 5.0];
        let summary = tss(scores)?.regress(&Phenotypes::new(y), RegressionModel::Ordinary)?;
        assert!(summary.correlation() > 0.0);
        assert!(summary.predicted().iter().all(|v| v.is_finite()));
        assert_eq!(summary.coefficients()[2], 0.0);
        Ok(())
    }

    #[test]
    fn test_elastic_net_without_penalty_matches_ordinary() -> Result<(), Box<dyn Error>> {
        let scores = array![[1.0, 0.3], [2.0, 0.1], [3.0, 0.9], [4.0, 0.4], [5.0, 0.8]];
        let y = Phenotypes::new(vec![2.0, 2.5, 4.5, 4.0, 6.0]);
        let table = tss(scores)?;
        let ols = table.regress(&y, RegressionModel::Ordinary)?;
        let enet = table.regress(
            &y,
            RegressionModel::ElasticNet {
                alpha: 0.0,
                l1_ratio: 0.5,
                max_iter: 100_000,
                tol: 1e-12,
            },
        )?;
        for (a, b) in ols.predicted().iter().zip(enet.predicted().iter()) {
            assert!(close(*a, *b));
        }
        Ok(())
    }

    #[test]
    fn test_strong_lasso_zeroes_every_weight() -> Result<(), Box<dyn Error>> {
        let scores = array![[1.0, 0.3], [2.0, 0.1], [3.0, 0.9], [4.0, 0.4]];
        let model = RegressionModel::ElasticNet {
            alpha: 100.0,
            l1_ratio: 1.0,
            max_iter: 1000,
            tol: 1e-9,
        };
        let result = tss(scores)?.regress(&Phenotypes::new(vec![1.0, 2.0, 3.0, 4.0]), model);
        // constant predictions leave the correlation undefined
        assert!(matches!(result, Err(TssError::InsufficientData(_))));
        Ok(())
    }

    #[test]
    fn test_bad_elastic_net_parameters() -> Result<(), Box<dyn Error>> {
        let table = tss(array![[1.0], [2.0], [3.0]])?;
        let y = Phenotypes::new(vec![1.0, 2.0, 2.5]);
        for (alpha, l1_ratio, max_iter) in [(-1.0, 0.5, 10), (1.0, 1.5, 10), (1.0, 0.5, 0)] {
            let model = RegressionModel::ElasticNet {
                alpha,
                l1_ratio,
                max_iter,
                tol: 1e-6,
            };
            assert!(matches!(
                table.regress(&y, model),
                Err(TssError::InvalidParameter(_))
            ));
        }
        Ok(())
    }

    #[test]
    fn test_row_count_mismatch_is_alignment_error() -> Result<(), Box<dyn Error>> {
        let table = tss(Array2::from_shape_fn((5, 2), |(i, j)| (i * 3 + j) as f64))?;
        let y = Phenotypes::new(vec![1.0, 2.0, 3.0, 4.0]);
        let result = PhenotypeRegressor::default().fit(&table, &y);
        assert!(matches!(result, Err(TssError::Alignment(_))));
        Ok(())
    }

    #[test]
    fn test_phenotypes_aligned_by_id() -> Result<(), Box<dyn Error>> {
        let table = tss(array![[1.0], [2.0], [3.0]])?;
        let shuffled = Phenotypes::with_ids(
            vec!["P2".into(), "P0".into(), "P1".into()],
            vec![30.0, 10.0, 20.0],
        )?;
        let summary = table.regress(&shuffled, RegressionModel::Ordinary)?;
        assert_eq!(summary.observed().to_vec(), vec![10.0, 20.0, 30.0]);
        assert!(close(summary.correlation(), 1.0));

        let unknown = Phenotypes::with_ids(
            vec!["P2".into(), "P0".into(), "Q1".into()],
            vec![30.0, 10.0, 20.0],
        )?;
        assert!(matches!(
            table.regress(&unknown, RegressionModel::Ordinary),
            Err(TssError::Alignment(_))
        ));
        let duplicated = Phenotypes::with_ids(
            vec!["P2".into(), "P0".into(), "P0".into()],
            vec![30.0, 10.0, 20.0],
        )?;
        assert!(matches!(
            table.regress(&duplicated, RegressionModel::Ordinary),
            Err(TssError::Alignment(_))
        ));
        Ok(())
    }

    #[test]
    fn test_repeated_peptide_is_alignment_error() -> Result<(), Box<dyn Error>> {
        let table = TssTable::new(
            vec!["P0".into(), "P0".into(), "P2".into()],
            ClusterSet::new(vec!["c0"])?,
            array![[1.0], [2.0], [3.0]],
        )?;
        let y = Phenotypes::with_ids(
            vec!["P0".into(), "P1".into(), "P2".into()],
            vec![10.0, 20.0, 30.0],
        )?;
        assert!(matches!(
            table.regress(&y, RegressionModel::Ordinary),
            Err(TssError::Alignment(_))
        ));
        Ok(())
    }

    #[test]
    fn test_non_finite_values_never_correlate() -> Result<(), Box<dyn Error>> {
        let table = tss(array![[1.0], [f64::NAN], [3.0]])?;
        let y = Phenotypes::new(vec![1.0, 2.0, 3.0]);
        let result = table.regress(&y, RegressionModel::Ordinary);
        assert!(matches!(result, Err(TssError::InsufficientData(_))));
        assert!(matches!(
            pearson(array![1.0, 2.0, 3.0].view(), array![1.0, f64::INFINITY, 2.0].view()),
            Err(TssError::InsufficientData(_))
        ));
        Ok(())
    }

    #[test]
    fn test_single_row_is_insufficient() -> Result<(), Box<dyn Error>> {
        let table = tss(array![[1.0, 2.0]])?;
        let result = table.regress(&Phenotypes::new(vec![1.0]), RegressionModel::Ordinary);
        assert!(matches!(result, Err(TssError::InsufficientData(_))));
        assert!(matches!(
            pearson(array![1.0].view(), array![2.0].view()),
            Err(TssError::InsufficientData(_))
        ));
        Ok(())
    }

    #[test]
    fn test_pearson_sign() -> Result<(), Box<dyn Error>> {
        let x = array![1.0, 2.0, 3.0, 4.0];
        assert!(close(pearson(x.view(), array![2.0, 4.0, 6.0, 8.0].view())?, 1.0));
        assert!(close(pearson(x.view(), array![8.0, 6.0, 4.0, 2.0].view())?, -1.0));
        Ok(())
    }
}
