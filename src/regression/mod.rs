//! Least-squares fitting for interaction models
//!
//! The model-selection core only consumes the `RegressionFitter` trait: it
//! hands over a design matrix and a response and gets back coefficients, the
//! residual sum of squares and the predicted values. `LeastSquares` is the
//! default implementation, solving the normal equations by Cholesky
//! decomposition for ordinary least squares and running Lawson-Hanson active
//! sets when coefficients are constrained to be non-negative.

use ndarray::{Array1, Array2};

use crate::error::{DeconError, Result};

/// Threshold below which a coefficient or gradient entry counts as zero
const TOL: f64 = 1e-10;

/// Iteration cap for the NNLS active-set loop
const NNLS_MAX_ITER_PER_TERM: usize = 30;

/// Output of a single regression fit
#[derive(Debug, Clone)]
pub struct FitSummary {
    pub coefficients: Array1<f64>,
    pub rss: f64,
    pub predicted: Array1<f64>,
}

/// Black-box fitting routine consumed by the model-selection core
pub trait RegressionFitter {
    /// Fit `response ~ design`, without an intercept term. With
    /// `non_negative` the coefficients are constrained to be >= 0.
    fn fit(
        &self,
        design: &Array2<f64>,
        response: &Array1<f64>,
        non_negative: bool,
    ) -> Result<FitSummary>;
}

/// Default fitter: OLS via normal equations, NNLS via Lawson-Hanson
#[derive(Debug, Clone, Copy, Default)]
pub struct LeastSquares;

impl RegressionFitter for LeastSquares {
    fn fit(
        &self,
        design: &Array2<f64>,
        response: &Array1<f64>,
        non_negative: bool,
    ) -> Result<FitSummary> {
        if design.nrows() != response.len() {
            return Err(DeconError::DimensionMismatch {
                reason: format!(
                    "design matrix has {} rows but response has {} values",
                    design.nrows(),
                    response.len()
                ),
            });
        }
        if design.ncols() == 0 {
            return Err(DeconError::EmptyData {
                reason: "design matrix has no columns".to_string(),
            });
        }

        let coefficients = if non_negative {
            nnls(design, response)?
        } else {
            ols(design, response)?
        };

        let predicted = design.dot(&coefficients);
        let rss = response
            .iter()
            .zip(predicted.iter())
            .map(|(y, p)| {
                let r = y - p;
                r * r
            })
            .sum();

        Ok(FitSummary {
            coefficients,
            rss,
            predicted,
        })
    }
}

/// Unconstrained least squares via X'X beta = X'y
fn ols(design: &Array2<f64>, response: &Array1<f64>) -> Result<Array1<f64>> {
    let xtx = design.t().dot(design);
    let xty = design.t().dot(response);
    solve_symmetric_system(&xtx, &xty)
}

/// Solve a symmetric positive-definite system by Cholesky decomposition.
///
/// Fails with `SingularMatrix` when a pivot collapses, which happens when
/// design columns are linearly dependent (or there are more terms than
/// samples).
fn solve_symmetric_system(a: &Array2<f64>, b: &Array1<f64>) -> Result<Array1<f64>> {
    let n = b.len();
    let max_diag = (0..n).map(|i| a[[i, i]].abs()).fold(0.0f64, f64::max);
    let pivot_tol = (max_diag * 1e-12).max(f64::MIN_POSITIVE);

    let mut l = Array2::<f64>::zeros((n, n));
    for i in 0..n {
        for j in 0..=i {
            let mut sum = a[[i, j]];
            for k in 0..j {
                sum -= l[[i, k]] * l[[j, k]];
            }
            if i == j {
                if sum <= pivot_tol {
                    return Err(DeconError::SingularMatrix {
                        operation: "least squares solve".to_string(),
                        details: "design matrix columns are linearly dependent".to_string(),
                    });
                }
                l[[i, j]] = sum.sqrt();
            } else {
                l[[i, j]] = sum / l[[j, j]];
            }
        }
    }

    // Forward substitution L y = b
    let mut y = Array1::<f64>::zeros(n);
    for i in 0..n {
        let mut sum = b[i];
        for j in 0..i {
            sum -= l[[i, j]] * y[j];
        }
        y[i] = sum / l[[i, i]];
    }

    // Back substitution L' x = y
    let mut x = Array1::<f64>::zeros(n);
    for i in (0..n).rev() {
        let mut sum = y[i];
        for j in (i + 1)..n {
            sum -= l[[j, i]] * x[j];
        }
        x[i] = sum / l[[i, i]];
    }
    Ok(x)
}

/// Lawson-Hanson non-negative least squares.
///
/// Starts from the all-zero solution with an empty passive set, repeatedly
/// moves the variable with the largest positive gradient into the passive set
/// and re-solves the unconstrained subproblem, stepping back along the
/// feasible direction whenever a passive coefficient would go negative.
fn nnls(design: &Array2<f64>, response: &Array1<f64>) -> Result<Array1<f64>> {
    let n_terms = design.ncols();
    let mut beta = Array1::<f64>::zeros(n_terms);
    let mut passive = vec![false; n_terms];
    let max_iter = NNLS_MAX_ITER_PER_TERM * n_terms.max(1);

    for _ in 0..max_iter {
        // Gradient of the objective at the current point
        let residual = response - &design.dot(&beta);
        let gradient = design.t().dot(&residual);

        let mut candidate: Option<usize> = None;
        for j in 0..n_terms {
            if passive[j] || gradient[j] <= TOL {
                continue;
            }
            if candidate.map_or(true, |c| gradient[j] > gradient[c]) {
                candidate = Some(j);
            }
        }
        let Some(j_new) = candidate else {
            // Karush-Kuhn-Tucker conditions hold
            return Ok(beta);
        };
        passive[j_new] = true;

        loop {
            let z = solve_passive_subproblem(design, response, &passive)?;
            if (0..n_terms).all(|j| !passive[j] || z[j] > TOL) {
                beta = z;
                break;
            }

            // Step toward z only as far as feasibility allows
            let mut alpha = f64::INFINITY;
            for j in 0..n_terms {
                if passive[j] && z[j] <= TOL {
                    let step = beta[j] / (beta[j] - z[j]);
                    if step < alpha {
                        alpha = step;
                    }
                }
            }
            for j in 0..n_terms {
                if passive[j] {
                    beta[j] += alpha * (z[j] - beta[j]);
                    if beta[j] <= TOL {
                        beta[j] = 0.0;
                        passive[j] = false;
                    }
                }
            }
        }
    }

    log::warn!(
        "NNLS did not converge within {} iterations; returning current iterate",
        max_iter
    );
    Ok(beta)
}

/// Unconstrained solve restricted to the passive columns; active-set
/// coefficients come back as exact zeros.
fn solve_passive_subproblem(
    design: &Array2<f64>,
    response: &Array1<f64>,
    passive: &[bool],
) -> Result<Array1<f64>> {
    let columns: Vec<usize> = (0..passive.len()).filter(|&j| passive[j]).collect();
    let mut sub = Array2::<f64>::zeros((design.nrows(), columns.len()));
    for (dest, &src) in columns.iter().enumerate() {
        sub.column_mut(dest).assign(&design.column(src));
    }
    let sub_beta = ols(&sub, response)?;

    let mut full = Array1::<f64>::zeros(passive.len());
    for (dest, &src) in columns.iter().enumerate() {
        full[src] = sub_beta[dest];
    }
    Ok(full)
}
