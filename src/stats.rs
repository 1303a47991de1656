//! Shared statistics used across modules
//!
//! The AIC here is the Gaussian log-likelihood form, which is the standard
//! choice when only the residual sum of squares of a least-squares fit is
//! available.

/// Floor applied to RSS/n before taking the log, to keep AIC finite for
/// (near-)perfect fits.
const MIN_MEAN_RSS: f64 = 1e-12;

/// Akaike Information Criterion from a residual sum of squares.
///
/// AIC = n * ln(RSS/n) + 2 * (k + 1)
///
/// where n is the sample count and k the number of fitted coefficients. The
/// +1 accounts for the estimated residual variance.
pub fn aic(rss: f64, n_params: usize, n_samples: usize) -> f64 {
    let n = n_samples as f64;
    let ll_term = n * (rss / n).max(MIN_MEAN_RSS).ln();
    ll_term + 2.0 * (n_params as f64 + 1.0)
}
