//! Per-sample cell-type composition
//!
//! The composition matrix is locus-invariant: it is read once per run and
//! injected by reference into every per-locus model collection.

use ndarray::{Array2, ArrayView1, ArrayView2};

use crate::error::{DeconError, Result};

/// How far a row sum may drift from 100 before the matrix is rejected.
const ROW_SUM_TOLERANCE: f64 = 0.5;

/// Cell-type proportions per sample (samples x cell types, percentages)
///
/// Rows sum to 100. Immutable after construction.
#[derive(Debug, Clone)]
pub struct CellComposition {
    celltypes: Vec<String>,
    samples: Vec<String>,
    /// samples x celltypes, percentages
    proportions: Array2<f64>,
}

impl CellComposition {
    /// Create a new composition matrix, validating shape and row sums.
    pub fn new(
        celltypes: Vec<String>,
        samples: Vec<String>,
        proportions: Array2<f64>,
    ) -> Result<Self> {
        let (n_samples, n_celltypes) = proportions.dim();

        if celltypes.is_empty() {
            return Err(DeconError::EmptyData {
                reason: "No cell types in cell count matrix".to_string(),
            });
        }
        if celltypes.len() != n_celltypes {
            return Err(DeconError::DimensionMismatch {
                reason: format!(
                    "{} cell type names for {} proportion columns",
                    celltypes.len(),
                    n_celltypes
                ),
            });
        }
        if samples.len() != n_samples {
            return Err(DeconError::DimensionMismatch {
                reason: format!(
                    "{} sample names for {} proportion rows",
                    samples.len(),
                    n_samples
                ),
            });
        }
        if proportions
            .iter()
            .any(|&p| p < 0.0 || p.is_nan() || p.is_infinite())
        {
            return Err(DeconError::InvalidCellCounts {
                reason: "Cell percentages must be non-negative finite values".to_string(),
            });
        }
        for (i, row) in proportions.rows().into_iter().enumerate() {
            let sum: f64 = row.sum();
            if (sum - 100.0).abs() > ROW_SUM_TOLERANCE {
                return Err(DeconError::InvalidCellCounts {
                    reason: format!(
                        "Cell percentages for sample '{}' sum to {:.3}, expected 100",
                        samples[i], sum
                    ),
                });
            }
        }

        Ok(CellComposition {
            celltypes,
            samples,
            proportions,
        })
    }

    pub fn celltypes(&self) -> &[String] {
        &self.celltypes
    }

    pub fn celltype(&self, index: usize) -> &str {
        &self.celltypes[index]
    }

    pub fn sample_names(&self) -> &[String] {
        &self.samples
    }

    /// samples x celltypes percentage matrix
    pub fn proportions(&self) -> ArrayView2<'_, f64> {
        self.proportions.view()
    }

    /// Percentage of `celltype` in `sample`
    pub fn proportion(&self, sample: usize, celltype: usize) -> f64 {
        self.proportions[[sample, celltype]]
    }

    /// One sample's full composition row
    pub fn sample_row(&self, sample: usize) -> ArrayView1<'_, f64> {
        self.proportions.row(sample)
    }

    pub fn n_celltypes(&self) -> usize {
        self.celltypes.len()
    }

    pub fn n_samples(&self) -> usize {
        self.samples.len()
    }
}
