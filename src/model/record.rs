//! One regression model instance and its typed registry key

use std::fmt;

use ndarray::{Array1, Array2};

use crate::error::{DeconError, Result};
use crate::regression::FitSummary;
use crate::stats;

use super::config::GenotypeConfiguration;

/// What role a model plays in the collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelKind {
    /// Interaction terms for every cell type
    Full,
    /// One cell type's interaction term removed
    Ct,
    /// Auxiliary 3-term model fixing the genotype orientation of the rest
    /// term in the reduced per-cell-type variant; AIC baseline only, never a
    /// best-model candidate
    CtRest,
}

/// Registry key for one model: kind, owning cell type (by index into the
/// cell composition) and genotype configuration.
///
/// Full models in the joint (non-base) modes have no owning cell type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModelId {
    pub kind: ModelKind,
    pub celltype: Option<usize>,
    pub configuration: GenotypeConfiguration,
}

impl ModelId {
    pub fn full(configuration: GenotypeConfiguration) -> Self {
        ModelId {
            kind: ModelKind::Full,
            celltype: None,
            configuration,
        }
    }

    pub fn full_for(celltype: usize, configuration: GenotypeConfiguration) -> Self {
        ModelId {
            kind: ModelKind::Full,
            celltype: Some(celltype),
            configuration,
        }
    }

    pub fn ct(celltype: usize, configuration: GenotypeConfiguration) -> Self {
        ModelId {
            kind: ModelKind::Ct,
            celltype: Some(celltype),
            configuration,
        }
    }

    pub fn ct_rest(celltype: usize, configuration: GenotypeConfiguration) -> Self {
        ModelId {
            kind: ModelKind::CtRest,
            celltype: Some(celltype),
            configuration,
        }
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            ModelKind::Full => "fullModel",
            ModelKind::Ct => "ctModel",
            ModelKind::CtRest => "restModel",
        };
        match self.celltype {
            Some(ct) => write!(f, "{}_ct{}_{}", kind, ct, self.configuration),
            None => write!(f, "{}_{}", kind, self.configuration),
        }
    }
}

/// One regression model: design matrix, metadata and, once fitted, the
/// coefficients and fit statistics.
///
/// Large arrays (design matrix, predicted values) are droppable so that
/// losing candidates and finished loci release memory while the summary
/// scalars stay available for reporting.
#[derive(Debug, Clone)]
pub struct InteractionModel {
    id: ModelId,
    /// Owning cell type name, for ct and per-celltype full variants
    celltype_name: Option<String>,
    design: Option<Array2<f64>>,
    variable_names: Vec<String>,
    /// Per cell type, the design columns belonging to it: the proportion
    /// column plus, when present, the interaction column.
    celltype_term_groups: Vec<Vec<usize>>,
    coefficients: Option<Array1<f64>>,
    rss: Option<f64>,
    predicted: Option<Array1<f64>>,
    aic: Option<f64>,
    aic_delta: Option<f64>,
    /// Linked rest-model id (reduced ct variant only)
    rest_model: Option<ModelId>,
}

impl InteractionModel {
    pub fn new(
        id: ModelId,
        celltype_name: Option<String>,
        design: Array2<f64>,
        variable_names: Vec<String>,
        celltype_term_groups: Vec<Vec<usize>>,
    ) -> Self {
        debug_assert_eq!(design.ncols(), variable_names.len());
        InteractionModel {
            id,
            celltype_name,
            design: Some(design),
            variable_names,
            celltype_term_groups,
            coefficients: None,
            rss: None,
            predicted: None,
            aic: None,
            aic_delta: None,
            rest_model: None,
        }
    }

    pub fn id(&self) -> ModelId {
        self.id
    }

    pub fn kind(&self) -> ModelKind {
        self.id.kind
    }

    pub fn configuration(&self) -> GenotypeConfiguration {
        self.id.configuration
    }

    pub fn celltype_name(&self) -> Option<&str> {
        self.celltype_name.as_deref()
    }

    pub fn variable_names(&self) -> &[String] {
        &self.variable_names
    }

    pub fn celltype_term_groups(&self) -> &[Vec<usize>] {
        &self.celltype_term_groups
    }

    /// Number of fitted terms (design columns)
    pub fn n_terms(&self) -> usize {
        self.variable_names.len()
    }

    /// Design matrix; `InvalidState` once released
    pub fn design(&self) -> Result<&Array2<f64>> {
        self.design.as_ref().ok_or_else(|| DeconError::InvalidState {
            reason: format!("design matrix of model {} was already released", self.id),
        })
    }

    /// Store the outcome of a regression fit
    pub fn record_fit(&mut self, fit: FitSummary) {
        self.coefficients = Some(fit.coefficients);
        self.rss = Some(fit.rss);
        self.predicted = Some(fit.predicted);
    }

    pub fn is_fitted(&self) -> bool {
        self.rss.is_some()
    }

    pub fn coefficients(&self) -> Result<&Array1<f64>> {
        self.coefficients
            .as_ref()
            .ok_or_else(|| DeconError::InvalidState {
                reason: format!("model {} has not been fitted", self.id),
            })
    }

    pub fn rss(&self) -> Result<f64> {
        self.rss.ok_or_else(|| DeconError::InvalidState {
            reason: format!("model {} has not been fitted", self.id),
        })
    }

    pub fn predicted(&self) -> Option<&Array1<f64>> {
        self.predicted.as_ref()
    }

    /// Count of strictly positive coefficients at column `start` and beyond.
    /// With `start` = the proportion-column count this is the non-zero
    /// interaction-coefficient count used by the selection tie-break.
    pub fn positive_coefficients_from(&self, start: usize) -> Result<usize> {
        let coefficients = self.coefficients()?;
        Ok(coefficients.iter().skip(start).filter(|&&b| b > 0.0).count())
    }

    /// Compute and store the AIC from the recorded RSS
    pub fn compute_aic(&mut self, n_samples: usize) -> Result<f64> {
        let rss = self.rss()?;
        let aic = stats::aic(rss, self.n_terms(), n_samples);
        self.aic = Some(aic);
        Ok(aic)
    }

    pub fn aic(&self) -> Result<f64> {
        self.aic.ok_or_else(|| DeconError::InvalidState {
            reason: format!("AIC of model {} has not been computed", self.id),
        })
    }

    /// Store AIC(self) - AIC(best full model); ct models only
    pub fn set_aic_delta(&mut self, full_model_aic: f64) -> Result<()> {
        let own = self.aic()?;
        self.aic_delta = Some(own - full_model_aic);
        Ok(())
    }

    pub fn aic_delta(&self) -> Option<f64> {
        self.aic_delta
    }

    pub fn set_rest_model(&mut self, id: ModelId) {
        self.rest_model = Some(id);
    }

    pub fn rest_model(&self) -> Option<ModelId> {
        self.rest_model
    }

    /// Drop the large per-model arrays, keeping names, coefficients, RSS and
    /// AIC for reporting.
    pub fn release_arrays(&mut self, drop_predicted: bool) {
        self.design = None;
        if drop_predicted {
            self.predicted = None;
        }
    }
}
