//! Significance testing for cell-type interaction effects
//!
//! The effect of one cell type's genotype interaction is tested by comparing
//! the full model against the ct model that drops that interaction term: an
//! ANOVA F-test on the two residual sums of squares. The resulting p-value
//! is reported per cell type, alongside the AIC delta of the same model pair.

use statrs::distribution::{ContinuousCDF, FisherSnedecor};

use crate::error::{DeconError, Result};

/// F-test comparing a restricted (ct) model against the full model it is
/// nested in.
///
/// `rss_restricted` comes from the model with `n_params_restricted` terms,
/// `rss_full` from the larger model. Returns the probability of an F at least
/// as extreme under the null that the dropped terms have no effect.
pub fn anova_f_test(
    rss_restricted: f64,
    rss_full: f64,
    n_params_restricted: usize,
    n_params_full: usize,
    n_samples: usize,
) -> Result<f64> {
    if n_params_full <= n_params_restricted {
        return Err(DeconError::InvalidInput {
            reason: format!(
                "full model must have more terms than the restricted model \
                 ({} vs {})",
                n_params_full, n_params_restricted
            ),
        });
    }
    if n_samples <= n_params_full {
        return Err(DeconError::InvalidInput {
            reason: format!(
                "F-test needs more samples than full-model terms ({} samples, {} terms)",
                n_samples, n_params_full
            ),
        });
    }
    if !rss_restricted.is_finite() || !rss_full.is_finite() || rss_full < 0.0 {
        return Err(DeconError::InvalidInput {
            reason: format!(
                "residual sums of squares must be finite and non-negative \
                 (restricted {}, full {})",
                rss_restricted, rss_full
            ),
        });
    }

    let df_numerator = (n_params_full - n_params_restricted) as f64;
    let df_denominator = (n_samples - n_params_full) as f64;

    // NNLS fits are not guaranteed to improve when terms are added; a
    // restricted model that fits at least as well is simply not significant.
    if rss_restricted <= rss_full {
        return Ok(1.0);
    }
    // Perfect full-model fit: the improvement is unbounded
    if rss_full == 0.0 {
        return Ok(0.0);
    }

    let f_statistic =
        ((rss_restricted - rss_full) / df_numerator) / (rss_full / df_denominator);
    let distribution =
        FisherSnedecor::new(df_numerator, df_denominator).map_err(|e| DeconError::InvalidInput {
            reason: format!(
                "invalid F distribution (df {} and {}): {}",
                df_numerator, df_denominator, e
            ),
        })?;
    Ok(distribution.sf(f_statistic))
}
