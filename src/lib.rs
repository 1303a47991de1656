//! decon_eqtl: cell-type-specific eQTL deconvolution
//!
//! For each genetic locus (a gene / SNP pair), bulk expression is modelled as
//! a sum of cell-type proportion terms and proportion-times-genotype
//! interaction terms. Because the effect allele orientation per cell type is
//! unknown, every combination of normal and swapped (2 - dose) genotype
//! encodings is a candidate model; the best full model is chosen by residual
//! sum of squares, and each cell type's interaction effect is tested by
//! comparing that model against the nested model dropping the term.
//!
//! # Example
//!
//! ```ignore
//! use decon_eqtl::prelude::*;
//!
//! let composition = read_cell_counts("cellcounts.txt")?;
//! let expression = read_expression_matrix("expression.txt")?;
//! let genotypes = read_genotype_matrix("genotypes.txt")?;
//!
//! let results = run_deconvolution(
//!     &composition,
//!     &expression,
//!     &genotypes,
//!     CollectionOptions::default(),
//! )?;
//! write_results("results.txt", composition.celltypes(), &results)?;
//! ```

pub mod cli;
pub mod data;
pub mod error;
pub mod io;
pub mod model;
pub mod regression;
pub mod stats;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::data::CellComposition;
    pub use crate::error::{DeconError, Result};
    pub use crate::io::{
        read_cell_counts, read_expression_matrix, read_genotype_matrix, write_results,
        write_results_json, CelltypeResult, DeconResult, NamedMatrix,
    };
    pub use crate::model::{
        CollectionOptions, ConfigurationMode, GenotypeConfiguration, InteractionModelCollection,
    };
    pub use crate::regression::{FitSummary, LeastSquares, RegressionFitter};
    pub use crate::run_deconvolution;
    pub use crate::testing::anova_f_test;
}

use rayon::prelude::*;

use data::CellComposition;
use error::{DeconError, Result};
use io::{CelltypeResult, DeconResult, NamedMatrix};
use model::{CollectionOptions, ConfigurationMode, InteractionModelCollection};
use ndarray::Array1;
use regression::LeastSquares;
use testing::anova_f_test;

/// Run the whole deconvolution pipeline: one locus per expression/genotype
/// row pair, processed in parallel.
///
/// Row i of the genotype matrix is paired with row i of the expression
/// matrix; sample columns of both must match the cell counts table in name
/// and order. Loci whose regression fails on a data problem (for example a
/// degenerate design matrix) are skipped with a warning; configuration and
/// usage errors abort the run.
pub fn run_deconvolution(
    composition: &CellComposition,
    expression: &NamedMatrix,
    genotypes: &NamedMatrix,
    options: CollectionOptions,
) -> Result<Vec<DeconResult>> {
    validate_inputs(composition, expression, genotypes, &options)?;

    let n_loci = expression.n_rows();
    log::info!(
        "deconvolving {} loci across {} samples and {} cell types (mode {})",
        n_loci,
        composition.n_samples(),
        composition.n_celltypes(),
        options.mode
    );

    let results: Result<Vec<Option<DeconResult>>> = (0..n_loci)
        .into_par_iter()
        .map(|locus| {
            let qtl = format!("{}_{}", expression.row_name(locus), genotypes.row_name(locus));
            let outcome = analyze_locus(
                composition,
                &qtl,
                expression.row(locus).to_owned(),
                genotypes.row(locus).to_owned(),
                options,
            );
            match outcome {
                Ok(result) => Ok(Some(result)),
                Err(e) if e.is_data_error() => {
                    log::warn!("skipping {}: {}", qtl, e);
                    Ok(None)
                }
                Err(e) => Err(e),
            }
        })
        .collect();

    let results: Vec<DeconResult> = results?.into_iter().flatten().collect();
    log::info!("finished: {} of {} loci produced results", results.len(), n_loci);
    Ok(results)
}

fn validate_inputs(
    composition: &CellComposition,
    expression: &NamedMatrix,
    genotypes: &NamedMatrix,
    options: &CollectionOptions,
) -> Result<()> {
    if expression.sample_names() != composition.sample_names() {
        return Err(DeconError::DimensionMismatch {
            reason: "expression matrix samples do not match the cell counts table \
                     (same names, same order required)"
                .to_string(),
        });
    }
    if genotypes.sample_names() != composition.sample_names() {
        return Err(DeconError::DimensionMismatch {
            reason: "genotype matrix samples do not match the cell counts table \
                     (same names, same order required)"
                .to_string(),
        });
    }
    if expression.n_rows() != genotypes.n_rows() {
        return Err(DeconError::DimensionMismatch {
            reason: format!(
                "{} expression rows but {} genotype rows; row i of each file forms one QTL",
                expression.n_rows(),
                genotypes.n_rows()
            ),
        });
    }
    if options.track_best_betas && options.mode == ConfigurationMode::Base {
        return Err(DeconError::Configuration {
            reason: "best-betas tracking is not available with the per-cell-type \
                     reduced variant (mode base)"
                .to_string(),
        });
    }
    Ok(())
}

/// Full phase sequence for one locus, producing the reported numbers
fn analyze_locus(
    composition: &CellComposition,
    qtl_name: &str,
    expression: Array1<f64>,
    genotypes: Array1<f64>,
    options: CollectionOptions,
) -> Result<DeconResult> {
    let fitter = LeastSquares;
    let mut collection =
        InteractionModelCollection::new(composition, qtl_name, expression, genotypes, options)?;
    collection.build_models(&fitter)?;
    collection.select_best_full_model(&fitter)?;
    collection.select_best_ct_model(&fitter)?;
    collection.compute_aic()?;

    let n_samples = composition.n_samples();
    let k = composition.n_celltypes();
    let base = options.mode == ConfigurationMode::Base;

    let mut celltypes = Vec::with_capacity(k);
    for ct in 0..k {
        let full = collection.best_full_model_for(ct)?;
        let matched = collection.matched_ct_model(ct)?;
        let pvalue = anova_f_test(
            matched.rss()?,
            full.rss()?,
            matched.n_terms(),
            full.n_terms(),
            n_samples,
        )?;
        let config = full.configuration();
        // In the reduced variant the cell type's own interaction is always
        // the third column and its orientation the first configuration bit
        let (beta_column, swapped) = if base {
            (2, config.bit(0))
        } else {
            (k + ct, config.bit(ct))
        };
        celltypes.push(CelltypeResult {
            celltype: composition.celltype(ct).to_string(),
            pvalue,
            aic_delta: collection.aic_delta(ct)?,
            interaction_beta: full.coefficients()?[beta_column],
            swapped,
        });
    }

    let configuration = if base {
        None
    } else {
        Some(collection.best_full_model()?.configuration().to_string())
    };
    let best_betas = collection.best_betas().map(|betas| betas.to_vec());

    collection.cleanup(true);
    Ok(DeconResult {
        qtl: collection.qtl_name().to_string(),
        configuration,
        celltypes,
        best_betas,
    })
}
