//! Deconvolution result structures

use serde::{Deserialize, Serialize};

/// Outcome of the interaction test for one cell type at one QTL
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CelltypeResult {
    /// Cell type name from the cell counts table
    pub celltype: String,
    /// ANOVA p-value: full model vs the ct model dropping this cell type's
    /// interaction term
    pub pvalue: f64,
    /// AIC(configuration-matched ct model) - AIC(best full model)
    pub aic_delta: f64,
    /// This cell type's interaction coefficient in the best full model
    pub interaction_beta: f64,
    /// True when the best full model uses the swapped genotype encoding for
    /// this cell type's interaction term
    pub swapped: bool,
}

/// All reported numbers for one QTL (one gene / SNP pair)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeconResult {
    /// QTL label, `<gene>_<snp>`
    pub qtl: String,
    /// Winning genotype-orientation configuration of the joint full model;
    /// absent in the per-cell-type reduced variant where each cell type has
    /// its own winner
    pub configuration: Option<String>,
    /// Per cell type, in cell counts column order
    pub celltypes: Vec<CelltypeResult>,
    /// Element-wise maximum of full-model coefficients over all candidate
    /// configurations, when requested
    pub best_betas: Option<Vec<f64>>,
}

impl DeconResult {
    /// Smallest per-cell-type p-value, for quick triage of a result set
    pub fn min_pvalue(&self) -> Option<f64> {
        self.celltypes
            .iter()
            .map(|ct| ct.pvalue)
            .fold(None, |acc, p| match acc {
                Some(best) if best <= p => Some(best),
                _ => Some(p),
            })
    }
}
