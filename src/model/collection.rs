//! Interaction model collection for one locus
//!
//! Owns every competing model for one QTL: the full models across all
//! genotype-orientation configurations, the per-cell-type ct models, and the
//! auxiliary rest models of the reduced variant. Drives fitting, applies the
//! RSS / non-zero-coefficient selection rule, evicts losing candidates
//! promptly (the configuration space is exponential in the number of cell
//! types) and computes the full-vs-ct AIC deltas consumed by the
//! significance test.
//!
//! The analysis runs in strict phase order:
//! build -> select full -> select ct -> AIC -> cleanup. Out-of-order calls
//! fail with `InvalidState` rather than producing partial results.

use std::collections::HashMap;

use ndarray::Array1;
use rayon::prelude::*;

use crate::data::CellComposition;
use crate::error::{DeconError, Result};
use crate::regression::RegressionFitter;

use super::builder;
use super::config::{
    ct_configurations, full_configurations, ConfigurationMode, GenotypeConfiguration,
};
use super::record::{InteractionModel, ModelId};

/// Swapped genotype encoding: dose 0 <-> 2. Involutive.
pub fn swap_genotypes(genotypes: &Array1<f64>) -> Array1<f64> {
    genotypes.mapv(|dose| 2.0 - dose)
}

/// Analysis phases; each transition is driven by one public operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Unbuilt,
    Built,
    FullSelected,
    CtSelected,
    AicComputed,
}

/// Per-locus knobs for the model search
#[derive(Debug, Clone, Copy)]
pub struct CollectionOptions {
    /// How the genotype-orientation space is enumerated
    pub mode: ConfigurationMode,
    /// Prefer candidates with more strictly-positive interaction
    /// coefficients, breaking ties by RSS
    pub select_most_betas: bool,
    /// Maintain the element-wise maximum of full-model coefficients across
    /// all candidates (diagnostic; joint modes only)
    pub track_best_betas: bool,
}

impl Default for CollectionOptions {
    fn default() -> Self {
        CollectionOptions {
            mode: ConfigurationMode::All,
            select_most_betas: false,
            track_best_betas: false,
        }
    }
}

impl CollectionOptions {
    fn use_base_model(&self) -> bool {
        self.mode == ConfigurationMode::Base
    }

    /// OLS needs no orientation search and no non-negativity constraint;
    /// every other mode fits NNLS.
    fn non_negative(&self) -> bool {
        self.mode != ConfigurationMode::OlsDefault
    }
}

/// All interaction models and shared data for one locus.
///
/// There are n+1 model shapes per configuration, where n is the number of
/// cell types: one full model with every interaction term, and per cell type
/// one ct model with that cell type's interaction term removed.
#[derive(Debug)]
pub struct InteractionModelCollection<'a> {
    composition: &'a CellComposition,
    options: CollectionOptions,
    qtl_name: String,
    expression: Array1<f64>,
    genotypes: Array1<f64>,
    swapped_genotypes: Array1<f64>,

    /// Live model registry; losing candidates are removed as soon as they
    /// lose
    models: HashMap<ModelId, InteractionModel>,
    full_model_ids: Vec<ModelId>,
    /// Base mode: one candidate pool per cell type
    full_model_ids_by_celltype: Vec<Vec<ModelId>>,
    ct_model_ids: Vec<Vec<ModelId>>,
    /// Full-model configuration -> the k derived ct-model ids, one per cell
    /// type, each obtained by deleting that cell type's position
    genotype_config_map: HashMap<GenotypeConfiguration, Vec<ModelId>>,

    best_full: Option<ModelId>,
    best_full_per_celltype: Vec<Option<ModelId>>,
    best_ct: Vec<Option<ModelId>>,
    /// Ct model whose configuration matches the best full model's; the AIC
    /// comparison partner. May coincide with `best_ct`.
    matched_ct: Vec<Option<ModelId>>,
    best_betas: Option<Array1<f64>>,
    phase: Phase,
}

impl<'a> InteractionModelCollection<'a> {
    /// Create a collection for one locus. Sample counts of the expression
    /// and genotype vectors are validated against the cell composition here,
    /// before any matrix work.
    pub fn new(
        composition: &'a CellComposition,
        qtl_name: impl Into<String>,
        expression: Array1<f64>,
        genotypes: Array1<f64>,
        options: CollectionOptions,
    ) -> Result<Self> {
        let m = composition.n_samples();
        let k = composition.n_celltypes();
        if expression.len() != m {
            return Err(DeconError::DimensionMismatch {
                reason: format!(
                    "expression vector has {} samples but the cell counts table has {}; \
                     the expression and cell counts files likely cover different samples",
                    expression.len(),
                    m
                ),
            });
        }
        if genotypes.len() != m {
            return Err(DeconError::DimensionMismatch {
                reason: format!(
                    "genotype vector has {} samples but the cell counts table has {}; \
                     the genotype and cell counts files likely cover different samples",
                    genotypes.len(),
                    m
                ),
            });
        }

        let swapped_genotypes = swap_genotypes(&genotypes);
        let best_betas = if options.track_best_betas && !options.use_base_model() {
            Some(Array1::zeros(2 * k))
        } else {
            None
        };

        Ok(InteractionModelCollection {
            composition,
            options,
            qtl_name: qtl_name.into(),
            expression,
            genotypes,
            swapped_genotypes,
            models: HashMap::new(),
            full_model_ids: Vec::new(),
            full_model_ids_by_celltype: vec![Vec::new(); k],
            ct_model_ids: vec![Vec::new(); k],
            genotype_config_map: HashMap::new(),
            best_full: None,
            best_full_per_celltype: vec![None; k],
            best_ct: vec![None; k],
            matched_ct: vec![None; k],
            best_betas,
            phase: Phase::Unbuilt,
        })
    }

    pub fn qtl_name(&self) -> &str {
        &self.qtl_name
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn composition(&self) -> &CellComposition {
        self.composition
    }

    pub fn expression(&self) -> &Array1<f64> {
        &self.expression
    }

    pub fn genotypes(&self) -> &Array1<f64> {
        &self.genotypes
    }

    pub fn swapped_genotypes(&self) -> &Array1<f64> {
        &self.swapped_genotypes
    }

    /// Look up a live model; evicted or never-created ids are a usage error.
    pub fn model(&self, id: ModelId) -> Result<&InteractionModel> {
        self.models.get(&id).ok_or_else(|| DeconError::InvalidState {
            reason: format!("model {} was evicted or never created", id),
        })
    }

    fn model_mut(&mut self, id: ModelId) -> Result<&mut InteractionModel> {
        self.models.get_mut(&id).ok_or_else(|| DeconError::InvalidState {
            reason: format!("model {} was evicted or never created", id),
        })
    }

    pub fn full_model_ids(&self) -> &[ModelId] {
        &self.full_model_ids
    }

    pub fn ct_model_ids(&self, celltype: usize) -> &[ModelId] {
        &self.ct_model_ids[celltype]
    }

    /// The k ct-model ids derived from one full-model configuration
    pub fn ct_ids_for_full_configuration(
        &self,
        configuration: GenotypeConfiguration,
    ) -> Option<&[ModelId]> {
        self.genotype_config_map
            .get(&configuration)
            .map(|ids| ids.as_slice())
    }

    fn expect_phase(&self, expected: Phase, operation: &str) -> Result<()> {
        if self.phase != expected {
            return Err(DeconError::InvalidState {
                reason: format!(
                    "{} requires phase {:?} but the collection is in {:?}",
                    operation, expected, self.phase
                ),
            });
        }
        Ok(())
    }

    /// Build every candidate model's design matrix.
    ///
    /// The fitter is needed here because the reduced variant's rest models
    /// are fitted at construction time: the two orientation candidates are
    /// compared immediately and only the better one is kept.
    pub fn build_models(&mut self, fitter: &dyn RegressionFitter) -> Result<()> {
        self.expect_phase(Phase::Unbuilt, "build_models")?;
        let k = self.composition.n_celltypes();
        let full_configs = full_configurations(k, self.options.mode)?;
        let ct_configs = ct_configurations(k, self.options.mode)?;

        if self.options.use_base_model() {
            self.build_base_models(fitter, &full_configs, &ct_configs)?;
        } else {
            self.build_joint_models(&full_configs, &ct_configs);
        }

        log::debug!(
            "{}: built {} candidate models ({} full configurations)",
            self.qtl_name,
            self.models.len(),
            full_configs.len()
        );
        self.phase = Phase::Built;
        Ok(())
    }

    fn build_joint_models(
        &mut self,
        full_configs: &[GenotypeConfiguration],
        ct_configs: &[GenotypeConfiguration],
    ) {
        let k = self.composition.n_celltypes();
        let composition = self.composition;
        let genotypes = &self.genotypes;
        let swapped = &self.swapped_genotypes;

        // Candidate matrices are independent; build them in parallel and
        // register sequentially.
        let full_models: Vec<InteractionModel> = full_configs
            .par_iter()
            .map(|&config| builder::full_model(composition, genotypes, swapped, config))
            .collect();
        for model in full_models {
            let id = model.id();
            // Mode "one" enumerates duplicate configurations for small k;
            // each configuration is registered and fitted once
            if self.models.insert(id, model).is_none() {
                self.full_model_ids.push(id);
            }
        }

        for &config in full_configs {
            let derived: Vec<ModelId> = (0..k)
                .map(|celltype| ModelId::ct(celltype, config.without(celltype)))
                .collect();
            self.genotype_config_map.insert(config, derived);
        }

        let pairs: Vec<(usize, GenotypeConfiguration)> = (0..k)
            .flat_map(|celltype| ct_configs.iter().map(move |&config| (celltype, config)))
            .collect();
        let ct_models: Vec<InteractionModel> = pairs
            .par_iter()
            .map(|&(celltype, config)| {
                builder::ct_model(composition, genotypes, swapped, celltype, config)
            })
            .collect();
        for (&(celltype, _), model) in pairs.iter().zip(ct_models) {
            self.ct_model_ids[celltype].push(model.id());
            self.models.insert(model.id(), model);
        }
    }

    fn build_base_models(
        &mut self,
        fitter: &dyn RegressionFitter,
        full_configs: &[GenotypeConfiguration],
        ct_configs: &[GenotypeConfiguration],
    ) -> Result<()> {
        let k = self.composition.n_celltypes();
        for celltype in 0..k {
            for &config in full_configs {
                let model = builder::base_full_model(
                    self.composition,
                    &self.genotypes,
                    &self.swapped_genotypes,
                    celltype,
                    config,
                );
                self.full_model_ids_by_celltype[celltype].push(model.id());
                self.models.insert(model.id(), model);
            }
            for &config in ct_configs {
                let mut models = builder::base_ct_models(
                    self.composition,
                    &self.genotypes,
                    &self.swapped_genotypes,
                    celltype,
                    config,
                );

                // Orientation of the cc:GT rest term is unknown; fit both
                // candidates now and keep the better one as the AIC baseline.
                let fit_normal =
                    fitter.fit(models.rest_normal.design()?, &self.expression, true)?;
                let fit_swapped =
                    fitter.fit(models.rest_swapped.design()?, &self.expression, true)?;
                let mut rest = if fit_normal.rss < fit_swapped.rss {
                    models.rest_normal.record_fit(fit_normal);
                    models.rest_normal
                } else {
                    models.rest_swapped.record_fit(fit_swapped);
                    models.rest_swapped
                };
                rest.release_arrays(false);
                models.ct.set_rest_model(rest.id());
                self.models.insert(rest.id(), rest);

                self.ct_model_ids[celltype].push(models.ct.id());
                self.models.insert(models.ct.id(), models.ct);
            }
        }
        Ok(())
    }

    /// Fit all full-model candidates and keep only the winner(s).
    pub fn select_best_full_model(&mut self, fitter: &dyn RegressionFitter) -> Result<()> {
        self.expect_phase(Phase::Built, "select_best_full_model")?;
        let k = self.composition.n_celltypes();

        if self.options.use_base_model() {
            for celltype in 0..k {
                let ids = self.full_model_ids_by_celltype[celltype].clone();
                let most_betas = self.options.select_most_betas;
                let best = self.run_selection(&ids, fitter, most_betas, 2, false, None)?;
                self.best_full_per_celltype[celltype] = Some(best);
            }
        } else {
            let ids = self.full_model_ids.clone();
            let track = self.best_betas.is_some();
            let most_betas = self.options.select_most_betas;
            let best = self.run_selection(&ids, fitter, most_betas, k, track, None)?;
            log::debug!("{}: best full model {}", self.qtl_name, best);
            self.best_full = Some(best);
        }
        self.phase = Phase::FullSelected;
        Ok(())
    }

    /// Fit all ct-model candidates per cell type and keep, per cell type, the
    /// winner plus the candidate whose configuration matches the best full
    /// model (needed as the AIC comparison partner even when it loses).
    ///
    /// Ct winners are ranked by the number of positive coefficients first and
    /// RSS second, independent of the full-model tie-break option.
    pub fn select_best_ct_model(&mut self, fitter: &dyn RegressionFitter) -> Result<()> {
        self.expect_phase(Phase::FullSelected, "select_best_ct_model")?;
        let k = self.composition.n_celltypes();
        let base = self.options.use_base_model();

        if !base {
            let best_full = self.best_full.ok_or_else(|| DeconError::InvalidState {
                reason: "no best full model recorded before ct selection".to_string(),
            })?;
            let derived = self
                .genotype_config_map
                .get(&best_full.configuration)
                .cloned()
                .ok_or_else(|| DeconError::InvalidState {
                    reason: format!(
                        "no derived ct configurations for full configuration {}",
                        best_full.configuration
                    ),
                })?;
            for (celltype, id) in derived.into_iter().enumerate() {
                self.matched_ct[celltype] = Some(id);
            }
        }

        for celltype in 0..k {
            let ids = self.ct_model_ids[celltype].clone();
            let keep = self.matched_ct[celltype];
            // Ct candidates always prefer more positive coefficients, counted
            // over every column, with RSS breaking ties.
            let best = self.run_selection(&ids, fitter, true, 0, false, keep)?;
            self.best_ct[celltype] = Some(best);
            if base {
                // The reduced variant has no configuration matching across
                // arities; the winner doubles as the AIC partner.
                self.matched_ct[celltype] = Some(best);
            }
        }
        self.phase = Phase::CtSelected;
        Ok(())
    }

    /// One pass of the selection loop over a candidate pool.
    ///
    /// The accept rule, evaluated against the running best:
    /// - `prefer_positive`: accept iff the candidate has strictly more
    ///   positive coefficients at column `positive_start` and beyond, or
    ///   equally many and RSS <= best;
    /// - otherwise: accept iff RSS <= best.
    ///
    /// The non-strict `<=` makes the last candidate win exact RSS ties;
    /// iteration order is part of the contract. Rejected candidates and
    /// dethroned winners are evicted immediately unless they are the
    /// protected AIC partner.
    fn run_selection(
        &mut self,
        candidate_ids: &[ModelId],
        fitter: &dyn RegressionFitter,
        prefer_positive: bool,
        positive_start: usize,
        track_betas: bool,
        always_retain: Option<ModelId>,
    ) -> Result<ModelId> {
        let non_negative = self.options.non_negative();
        let mut best: Option<(ModelId, f64, usize)> = None;

        for &id in candidate_ids {
            let fit = {
                let model = self.model(id)?;
                fitter.fit(model.design()?, &self.expression, non_negative)?
            };
            let (rss, n_positive, coefficients) = {
                let model = self.model_mut(id)?;
                model.record_fit(fit);
                let rss = model.rss()?;
                let n_positive = model.positive_coefficients_from(positive_start)?;
                let coefficients = if track_betas {
                    Some(model.coefficients()?.clone())
                } else {
                    None
                };
                (rss, n_positive, coefficients)
            };
            if let Some(coefficients) = coefficients {
                self.update_best_betas(&coefficients);
            }

            let accept = match best {
                None => true,
                Some((_, best_rss, best_positive)) => {
                    if prefer_positive {
                        n_positive > best_positive
                            || (n_positive == best_positive && rss <= best_rss)
                    } else {
                        rss <= best_rss
                    }
                }
            };

            if accept {
                if let Some((previous, _, _)) = best.replace((id, rss, n_positive)) {
                    self.evict(previous, always_retain);
                }
            } else {
                self.evict(id, always_retain);
            }
        }

        best.map(|(id, _, _)| id)
            .ok_or_else(|| DeconError::InvalidState {
                reason: "selection ran over an empty candidate pool".to_string(),
            })
    }

    /// Release a losing candidate, unless it is the protected AIC partner.
    fn evict(&mut self, id: ModelId, protected: Option<ModelId>) {
        if Some(id) == protected {
            return;
        }
        self.models.remove(&id);
    }

    fn update_best_betas(&mut self, coefficients: &Array1<f64>) {
        if let Some(best) = self.best_betas.as_mut() {
            debug_assert_eq!(best.len(), coefficients.len());
            for (current, &candidate) in best.iter_mut().zip(coefficients.iter()) {
                if candidate > *current {
                    *current = candidate;
                }
            }
        }
    }

    /// Compute AIC for the retained winners and the per-cell-type delta
    /// AIC(matched ct model) - AIC(best full model).
    pub fn compute_aic(&mut self) -> Result<()> {
        self.expect_phase(Phase::CtSelected, "compute_aic")?;
        let n_samples = self.composition.n_samples();
        let k = self.composition.n_celltypes();

        if self.options.use_base_model() {
            for celltype in 0..k {
                let full_id = self.require(self.best_full_per_celltype[celltype])?;
                let full_aic = self.model_mut(full_id)?.compute_aic(n_samples)?;

                let ct_id = self.require(self.matched_ct[celltype])?;
                if let Some(rest_id) = self.model(ct_id)?.rest_model() {
                    self.model_mut(rest_id)?.compute_aic(n_samples)?;
                }
                let ct_model = self.model_mut(ct_id)?;
                ct_model.compute_aic(n_samples)?;
                ct_model.set_aic_delta(full_aic)?;
            }
        } else {
            let full_id = self.require(self.best_full)?;
            let full_aic = self.model_mut(full_id)?.compute_aic(n_samples)?;
            for celltype in 0..k {
                let ct_id = self.require(self.matched_ct[celltype])?;
                let ct_model = self.model_mut(ct_id)?;
                ct_model.compute_aic(n_samples)?;
                ct_model.set_aic_delta(full_aic)?;
            }
        }
        self.phase = Phase::AicComputed;
        Ok(())
    }

    fn require(&self, id: Option<ModelId>) -> Result<ModelId> {
        id.ok_or_else(|| DeconError::InvalidState {
            reason: "model selection has not recorded a winner".to_string(),
        })
    }

    /// Globally best full model (joint modes)
    pub fn best_full_model(&self) -> Result<&InteractionModel> {
        if self.options.use_base_model() {
            return Err(DeconError::InvalidState {
                reason: "the reduced variant selects one full model per cell type; \
                         use best_full_model_for"
                    .to_string(),
            });
        }
        self.model(self.require(self.best_full)?)
    }

    /// Best full model for one cell type (reduced variant)
    pub fn best_full_model_for(&self, celltype: usize) -> Result<&InteractionModel> {
        if self.options.use_base_model() {
            self.model(self.require(self.best_full_per_celltype[celltype])?)
        } else {
            self.best_full_model()
        }
    }

    /// RSS-best ct model for one cell type (reporting coefficients)
    pub fn best_ct_model(&self, celltype: usize) -> Result<&InteractionModel> {
        self.model(self.require(self.best_ct[celltype])?)
    }

    /// Ct model whose configuration matches the best full model's (the AIC
    /// delta carrier); may be the same record as `best_ct_model`.
    pub fn matched_ct_model(&self, celltype: usize) -> Result<&InteractionModel> {
        self.model(self.require(self.matched_ct[celltype])?)
    }

    pub fn full_model_aic(&self) -> Result<f64> {
        self.best_full_model()?.aic()
    }

    /// AIC of the configuration-matched ct model for one cell type
    pub fn ct_model_aic(&self, celltype: usize) -> Result<f64> {
        self.matched_ct_model(celltype)?.aic()
    }

    pub fn aic_delta(&self, celltype: usize) -> Result<f64> {
        self.matched_ct_model(celltype)?
            .aic_delta()
            .ok_or_else(|| DeconError::InvalidState {
                reason: format!("AIC delta for cell type {} has not been computed", celltype),
            })
    }

    /// Element-wise maximum of full-model coefficients across all candidates
    pub fn best_betas(&self) -> Option<&Array1<f64>> {
        self.best_betas.as_ref()
    }

    /// Number of live (non-evicted) model records
    pub fn n_live_models(&self) -> usize {
        self.models.len()
    }

    /// Drop the locus-scoped large arrays. Summary scalars (names, RSS, AIC,
    /// coefficients) stay available for reporting.
    pub fn cleanup(&mut self, drop_predicted: bool) {
        self.expression = Array1::zeros(0);
        self.genotypes = Array1::zeros(0);
        self.swapped_genotypes = Array1::zeros(0);
        for model in self.models.values_mut() {
            model.release_arrays(drop_predicted);
        }
        self.genotype_config_map.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelKind;
    use crate::regression::{FitSummary, LeastSquares};
    use ndarray::{array, Array2};
    use std::cell::RefCell;
    use std::collections::VecDeque;

    fn composition() -> CellComposition {
        CellComposition::new(
            vec!["Neut".to_string(), "Mono".to_string()],
            vec!["s0".to_string(), "s1".to_string(), "s2".to_string()],
            array![[60.0, 40.0], [50.0, 50.0], [70.0, 30.0]],
        )
        .unwrap()
    }

    fn collection(options: CollectionOptions) -> InteractionModelCollection<'static> {
        // Leak the composition so the collection can borrow it with 'static
        // lifetime in tests
        let composition: &'static CellComposition = Box::leak(Box::new(composition()));
        InteractionModelCollection::new(
            composition,
            "gene0_snp0",
            array![1.0, 2.0, 3.0],
            array![0.0, 1.0, 2.0],
            options,
        )
        .unwrap()
    }

    /// Four samples so that even the widest (4-term) designs stay full rank
    /// for the real solver
    fn collection4(options: CollectionOptions) -> InteractionModelCollection<'static> {
        let composition: &'static CellComposition = Box::leak(Box::new(
            CellComposition::new(
                vec!["Neut".to_string(), "Mono".to_string()],
                vec![
                    "s0".to_string(),
                    "s1".to_string(),
                    "s2".to_string(),
                    "s3".to_string(),
                ],
                array![[60.0, 40.0], [50.0, 50.0], [70.0, 30.0], [55.0, 45.0]],
            )
            .unwrap(),
        ));
        InteractionModelCollection::new(
            composition,
            "gene0_snp0",
            array![1.0, 2.0, 3.0, 2.5],
            array![0.0, 1.0, 2.0, 1.0],
            options,
        )
        .unwrap()
    }

    /// Deterministic stand-in for the solver: RSS is the sum of squared
    /// design entries, coefficients are all zero.
    struct SumOfSquaresFitter;

    impl RegressionFitter for SumOfSquaresFitter {
        fn fit(
            &self,
            design: &Array2<f64>,
            _response: &Array1<f64>,
            _non_negative: bool,
        ) -> crate::error::Result<FitSummary> {
            let rss = design.iter().map(|v| v * v).sum();
            Ok(FitSummary {
                coefficients: Array1::zeros(design.ncols()),
                rss,
                predicted: Array1::zeros(design.nrows()),
            })
        }
    }

    /// Replays a script of fit summaries in call order.
    struct ScriptedFitter {
        fits: RefCell<VecDeque<FitSummary>>,
    }

    impl ScriptedFitter {
        fn new(fits: Vec<FitSummary>) -> Self {
            ScriptedFitter {
                fits: RefCell::new(fits.into()),
            }
        }

        fn summary(coefficients: Vec<f64>, rss: f64) -> FitSummary {
            FitSummary {
                coefficients: Array1::from(coefficients),
                rss,
                predicted: Array1::zeros(3),
            }
        }
    }

    impl RegressionFitter for ScriptedFitter {
        fn fit(
            &self,
            _design: &Array2<f64>,
            _response: &Array1<f64>,
            _non_negative: bool,
        ) -> crate::error::Result<FitSummary> {
            Ok(self.fits.borrow_mut().pop_front().expect("script exhausted"))
        }
    }

    #[test]
    fn test_swap_is_involutive() {
        let genotypes = array![0.0, 0.5, 1.0, 1.5, 2.0];
        let swapped = swap_genotypes(&genotypes);
        for (g, s) in genotypes.iter().zip(swapped.iter()) {
            assert_eq!(g + s, 2.0);
        }
        assert_eq!(swap_genotypes(&swapped), genotypes);
    }

    #[test]
    fn test_dimension_mismatch_raised_at_construction() {
        let composition = composition();
        let err = InteractionModelCollection::new(
            &composition,
            "qtl",
            array![1.0, 2.0, 3.0],
            array![0.0, 1.0], // two doses, three samples
            CollectionOptions::default(),
        )
        .unwrap_err();
        let msg = format!("{}", err);
        assert!(matches!(err, DeconError::DimensionMismatch { .. }));
        assert!(msg.contains("genotype"), "should name the input: {}", msg);
    }

    #[test]
    fn test_genotype_config_map_shape() {
        let mut collection = collection(CollectionOptions::default());
        collection.build_models(&SumOfSquaresFitter).unwrap();

        for &full_id in collection.full_model_ids() {
            let config = full_id.configuration;
            let derived = collection.ct_ids_for_full_configuration(config).unwrap();
            assert_eq!(derived.len(), 2, "one ct id per cell type");
            for (celltype, id) in derived.iter().enumerate() {
                assert_eq!(id.kind, ModelKind::Ct);
                assert_eq!(id.celltype, Some(celltype));
                assert_eq!(id.configuration, config.without(celltype));
            }
        }
    }

    #[test]
    fn test_phase_order_is_enforced() {
        let mut collection = collection(CollectionOptions::default());
        let err = collection.compute_aic().unwrap_err();
        assert!(matches!(err, DeconError::InvalidState { .. }));
        let err = collection.select_best_full_model(&SumOfSquaresFitter).unwrap_err();
        assert!(matches!(err, DeconError::InvalidState { .. }));

        collection.build_models(&SumOfSquaresFitter).unwrap();
        let err = collection.select_best_ct_model(&SumOfSquaresFitter).unwrap_err();
        assert!(matches!(err, DeconError::InvalidState { .. }));
    }

    #[test]
    fn test_two_mode_end_to_end_with_stub_solver() {
        let mut collection = collection(CollectionOptions {
            mode: ConfigurationMode::Two,
            ..CollectionOptions::default()
        });
        collection.build_models(&SumOfSquaresFitter).unwrap();

        let configs: Vec<String> = collection
            .full_model_ids()
            .iter()
            .map(|id| id.configuration.to_string())
            .collect();
        assert_eq!(configs, vec!["00", "11"]);
        for &id in collection.full_model_ids() {
            assert_eq!(collection.model(id).unwrap().design().unwrap().ncols(), 4);
        }

        collection.select_best_full_model(&SumOfSquaresFitter).unwrap();

        // Stub RSS: "00" uses genotype [0,1,2] -> 44200, "11" the swapped
        // [2,1,0] -> 41800, so "11" wins.
        let best = collection.best_full_model().unwrap();
        assert_eq!(best.configuration().to_string(), "11");
        assert!((best.rss().unwrap() - 41800.0).abs() < 1e-9);

        // The loser must be gone
        let loser = ModelId::full("00".parse().unwrap());
        let err = collection.model(loser).unwrap_err();
        assert!(matches!(err, DeconError::InvalidState { .. }));
    }

    #[test]
    fn test_one_mode_deduplicates_coinciding_configurations() {
        // k=2: the single-bit deviations of 00 and 11 coincide pairwise, so
        // the 6 enumerated configurations collapse to 4 distinct models
        let mut collection = collection(CollectionOptions {
            mode: ConfigurationMode::One,
            ..CollectionOptions::default()
        });
        collection.build_models(&SumOfSquaresFitter).unwrap();

        let configs: Vec<String> = collection
            .full_model_ids()
            .iter()
            .map(|id| id.configuration.to_string())
            .collect();
        assert_eq!(configs, vec!["00", "11", "10", "01"]);

        collection.select_best_full_model(&SumOfSquaresFitter).unwrap();
        collection.select_best_ct_model(&SumOfSquaresFitter).unwrap();
        assert!(collection.best_full_model().is_ok());
    }

    #[test]
    fn test_selection_tie_break_prefers_most_betas_then_rss() {
        // k=2, mode all -> candidates 00, 01, 10, 11 in order
        let mut collection = collection(CollectionOptions {
            mode: ConfigurationMode::All,
            select_most_betas: true,
            ..CollectionOptions::default()
        });
        collection.build_models(&SumOfSquaresFitter).unwrap();

        // (positive interaction coefficients, rss):
        // candidate 1: (1, 10), 2: (2, 50), 3: (2, 5), 4: (2, 5)
        let fitter = ScriptedFitter::new(vec![
            ScriptedFitter::summary(vec![1.0, 1.0, 1.0, 0.0], 10.0),
            ScriptedFitter::summary(vec![1.0, 1.0, 2.0, 3.0], 50.0),
            ScriptedFitter::summary(vec![1.0, 1.0, 1.0, 1.0], 5.0),
            ScriptedFitter::summary(vec![1.0, 1.0, 0.5, 0.5], 5.0),
        ]);
        collection.select_best_full_model(&fitter).unwrap();

        // More betas beats lower RSS; among equal (nz, rss) the last
        // candidate iterated wins.
        let best = collection.best_full_model().unwrap();
        assert_eq!(best.configuration().to_string(), "11");
        assert_eq!(best.rss().unwrap(), 5.0);

        for config in ["00", "01", "10"] {
            let id = ModelId::full(config.parse().unwrap());
            assert!(collection.model(id).is_err(), "{} should be evicted", config);
        }
    }

    #[test]
    fn test_best_betas_track_all_candidates() {
        let mut collection = collection(CollectionOptions {
            mode: ConfigurationMode::Two,
            track_best_betas: true,
            ..CollectionOptions::default()
        });
        collection.build_models(&SumOfSquaresFitter).unwrap();

        let fitter = ScriptedFitter::new(vec![
            ScriptedFitter::summary(vec![1.0, 5.0, 2.0, 0.0], 1.0),
            ScriptedFitter::summary(vec![3.0, 1.0, 1.0, 4.0], 2.0),
        ]);
        collection.select_best_full_model(&fitter).unwrap();

        // First candidate wins (rss 1 < 2) but the maximum is taken across
        // both, element-wise
        let best_betas = collection.best_betas().unwrap();
        assert_eq!(best_betas, &array![3.0, 5.0, 2.0, 4.0]);
    }

    #[test]
    fn test_memory_invariant_after_selection() {
        let mut collection = collection(CollectionOptions {
            mode: ConfigurationMode::All,
            ..CollectionOptions::default()
        });
        collection.build_models(&SumOfSquaresFitter).unwrap();
        assert_eq!(collection.n_live_models(), 4 + 2 * 2); // 2^2 full + k * 2^(k-1) ct

        collection.select_best_full_model(&SumOfSquaresFitter).unwrap();
        collection.select_best_ct_model(&SumOfSquaresFitter).unwrap();

        // One best full model, and per cell type at most the winning ct
        // model plus the configuration-matched partner
        assert!(collection.n_live_models() <= 1 + 2 * 2);
        for celltype in 0..2 {
            assert!(collection.best_ct_model(celltype).is_ok());
            assert!(collection.matched_ct_model(celltype).is_ok());
        }
    }

    #[test]
    fn test_matched_ct_model_survives_even_when_losing() {
        let mut collection = collection(CollectionOptions {
            mode: ConfigurationMode::Two,
            ..CollectionOptions::default()
        });
        collection.build_models(&SumOfSquaresFitter).unwrap();
        collection.select_best_full_model(&SumOfSquaresFitter).unwrap();

        // Best full is "11"; its derived ct configurations are both "1".
        // Script the ct fits so the matched candidate ("1") always loses to
        // "0": per cell type the candidates are "0" then "1".
        let fitter = ScriptedFitter::new(vec![
            // celltype 0: "0" wins
            ScriptedFitter::summary(vec![0.0, 0.0, 0.0], 1.0),
            ScriptedFitter::summary(vec![0.0, 0.0, 0.0], 9.0),
            // celltype 1: "0" wins
            ScriptedFitter::summary(vec![0.0, 0.0, 0.0], 1.0),
            ScriptedFitter::summary(vec![0.0, 0.0, 0.0], 9.0),
        ]);
        collection.select_best_ct_model(&fitter).unwrap();

        for celltype in 0..2 {
            let best = collection.best_ct_model(celltype).unwrap();
            assert_eq!(best.configuration().to_string(), "0");
            let matched = collection.matched_ct_model(celltype).unwrap();
            assert_eq!(matched.configuration().to_string(), "1");
            assert_eq!(matched.rss().unwrap(), 9.0);
        }

        collection.compute_aic().unwrap();
        let full_aic = collection.full_model_aic().unwrap();
        for celltype in 0..2 {
            let matched_aic = collection.matched_ct_model(celltype).unwrap().aic().unwrap();
            let delta = collection.aic_delta(celltype).unwrap();
            assert!((delta - (matched_aic - full_aic)).abs() < 1e-12);
        }
    }

    #[test]
    fn test_ct_selection_ranks_positive_coefficients_before_rss() {
        // Unlike full-model selection, ct selection always prefers the
        // candidate with more positive coefficients, even with the
        // most-betas option off and even at a higher RSS.
        let mut collection = collection(CollectionOptions {
            mode: ConfigurationMode::Two,
            ..CollectionOptions::default()
        });
        collection.build_models(&SumOfSquaresFitter).unwrap();
        collection.select_best_full_model(&SumOfSquaresFitter).unwrap();

        // Per cell type the candidates are "0" then "1": "0" fits tighter
        // (rss 1) but has no positive coefficients, "1" has three.
        let fitter = ScriptedFitter::new(vec![
            ScriptedFitter::summary(vec![0.0, 0.0, 0.0], 1.0),
            ScriptedFitter::summary(vec![0.5, 0.5, 0.5], 2.0),
            ScriptedFitter::summary(vec![0.0, 0.0, 0.0], 1.0),
            ScriptedFitter::summary(vec![0.5, 0.5, 0.5], 2.0),
        ]);
        collection.select_best_ct_model(&fitter).unwrap();

        for celltype in 0..2 {
            let best = collection.best_ct_model(celltype).unwrap();
            assert_eq!(best.configuration().to_string(), "1");
            assert_eq!(best.rss().unwrap(), 2.0);
        }
    }

    #[test]
    fn test_aic_delta_against_best_full_model() {
        let mut collection = collection(CollectionOptions {
            mode: ConfigurationMode::Two,
            ..CollectionOptions::default()
        });
        collection.build_models(&SumOfSquaresFitter).unwrap();
        collection.select_best_full_model(&SumOfSquaresFitter).unwrap();
        collection.select_best_ct_model(&SumOfSquaresFitter).unwrap();
        collection.compute_aic().unwrap();

        let full_aic = collection.full_model_aic().unwrap();
        for celltype in 0..2 {
            let matched = collection.matched_ct_model(celltype).unwrap();
            let expected = matched.aic().unwrap() - full_aic;
            assert!((collection.aic_delta(celltype).unwrap() - expected).abs() < 1e-12);
        }
    }

    #[test]
    fn test_ols_default_mode_single_configuration() {
        let mut collection = collection4(CollectionOptions {
            mode: ConfigurationMode::OlsDefault,
            ..CollectionOptions::default()
        });
        collection.build_models(&LeastSquares).unwrap();
        assert_eq!(collection.full_model_ids().len(), 1);
        assert_eq!(collection.ct_model_ids(0).len(), 1);

        collection.select_best_full_model(&LeastSquares).unwrap();
        collection.select_best_ct_model(&LeastSquares).unwrap();
        collection.compute_aic().unwrap();
        assert!(collection.aic_delta(0).is_ok());
    }

    #[test]
    fn test_base_mode_pools_and_rest_models() {
        let mut collection = collection4(CollectionOptions {
            mode: ConfigurationMode::Base,
            ..CollectionOptions::default()
        });
        collection.build_models(&LeastSquares).unwrap();

        // Per cell type: 4 reduced full models, 2 ct models, 2 rest records
        // (one retained per ct configuration)
        for celltype in 0..2 {
            assert_eq!(collection.ct_model_ids(celltype).len(), 2);
        }

        collection.select_best_full_model(&LeastSquares).unwrap();
        collection.select_best_ct_model(&LeastSquares).unwrap();
        collection.compute_aic().unwrap();

        for celltype in 0..2 {
            let full = collection.best_full_model_for(celltype).unwrap();
            assert_eq!(full.n_terms(), 4);
            let ct = collection.best_ct_model(celltype).unwrap();
            assert_eq!(ct.n_terms(), 3);
            let rest_id = ct.rest_model().expect("reduced ct models link a rest model");
            let rest = collection.model(rest_id).unwrap();
            assert!(rest.rss().is_ok());
            assert!(rest.aic().is_ok());
            assert!(collection.aic_delta(celltype).is_ok());
        }

        // The joint accessor is a usage error in base mode
        assert!(collection.best_full_model().is_err());
    }

    #[test]
    fn test_cleanup_releases_arrays_keeps_summaries() {
        let mut collection = collection(CollectionOptions {
            mode: ConfigurationMode::Two,
            ..CollectionOptions::default()
        });
        collection.build_models(&SumOfSquaresFitter).unwrap();
        collection.select_best_full_model(&SumOfSquaresFitter).unwrap();
        collection.select_best_ct_model(&SumOfSquaresFitter).unwrap();
        collection.compute_aic().unwrap();
        collection.cleanup(true);

        assert_eq!(collection.expression().len(), 0);
        assert_eq!(collection.genotypes().len(), 0);
        let best = collection.best_full_model().unwrap();
        assert!(best.design().is_err());
        assert!(best.rss().is_ok());
        assert!(best.aic().is_ok());
        assert!(best.coefficients().is_ok());
    }
}
