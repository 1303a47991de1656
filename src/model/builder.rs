//! Design-matrix construction for full, ct and reduced ("base") models
//!
//! All builders take the locus-invariant cell composition plus the normal and
//! swapped genotype vectors and produce unfitted `InteractionModel` records.
//! Sample-count agreement between the inputs is validated by the collection
//! before any builder runs, so the loops here never go out of bounds.

use ndarray::{Array1, Array2};

use crate::data::CellComposition;

use super::config::GenotypeConfiguration;
use super::record::{InteractionModel, ModelId};

/// Pick the genotype vector for one interaction term: swapped when the
/// configuration bit is set.
fn oriented<'a>(
    swap: bool,
    genotypes: &'a Array1<f64>,
    swapped: &'a Array1<f64>,
) -> &'a Array1<f64> {
    if swap {
        swapped
    } else {
        genotypes
    }
}

/// Full model: 2k terms. Columns 0..k are the cell-type proportions, columns
/// k..2k the proportion x genotype interactions, orientation per
/// configuration bit.
pub(super) fn full_model(
    composition: &CellComposition,
    genotypes: &Array1<f64>,
    swapped: &Array1<f64>,
    config: GenotypeConfiguration,
) -> InteractionModel {
    let k = composition.n_celltypes();
    let m = composition.n_samples();
    debug_assert_eq!(config.len(), k);

    let mut design = Array2::<f64>::zeros((m, 2 * k));
    for sample in 0..m {
        for celltype in 0..k {
            let proportion = composition.proportion(sample, celltype);
            let genotype = oriented(config.bit(celltype), genotypes, swapped)[sample];
            design[[sample, celltype]] = proportion;
            design[[sample, k + celltype]] = proportion * genotype;
        }
    }

    let mut variable_names: Vec<String> =
        composition.celltypes().iter().cloned().collect();
    variable_names.extend(
        composition
            .celltypes()
            .iter()
            .map(|name| format!("{}:GT", name)),
    );
    let term_groups: Vec<Vec<usize>> = (0..k).map(|i| vec![i, k + i]).collect();

    InteractionModel::new(ModelId::full(config), None, design, variable_names, term_groups)
}

/// Ct model for `celltype`: 2k-1 terms. All k proportion columns are kept;
/// interaction columns exist for every cell type except the model's own,
/// with configuration bits assigned in cell-type order skipping it.
pub(super) fn ct_model(
    composition: &CellComposition,
    genotypes: &Array1<f64>,
    swapped: &Array1<f64>,
    celltype: usize,
    config: GenotypeConfiguration,
) -> InteractionModel {
    let k = composition.n_celltypes();
    let m = composition.n_samples();
    debug_assert_eq!(config.len(), k - 1);

    let mut design = Array2::<f64>::zeros((m, 2 * k - 1));
    let mut variable_names: Vec<String> =
        composition.celltypes().iter().cloned().collect();
    let mut term_groups: Vec<Vec<usize>> = Vec::with_capacity(k);

    let mut interaction_column = k;
    let mut config_position = 0;
    for other in 0..k {
        if other == celltype {
            term_groups.push(vec![other]);
            continue;
        }
        term_groups.push(vec![other, interaction_column]);
        variable_names.push(format!("{}:GT", composition.celltype(other)));

        let genotype = oriented(config.bit(config_position), genotypes, swapped);
        for sample in 0..m {
            design[[sample, interaction_column]] =
                composition.proportion(sample, other) * genotype[sample];
        }
        interaction_column += 1;
        config_position += 1;
    }

    for sample in 0..m {
        for other in 0..k {
            design[[sample, other]] = composition.proportion(sample, other);
        }
    }

    InteractionModel::new(
        ModelId::ct(celltype, config),
        Some(composition.celltype(celltype).to_string()),
        design,
        variable_names,
        term_groups,
    )
}

/// Reduced full model for one cell type against "the rest":
/// y ~ cc + (100-cc) + cc*GT_a + (100-cc)*GT_b, the two orientations chosen
/// independently by the 2-bit configuration.
pub(super) fn base_full_model(
    composition: &CellComposition,
    genotypes: &Array1<f64>,
    swapped: &Array1<f64>,
    celltype: usize,
    config: GenotypeConfiguration,
) -> InteractionModel {
    let m = composition.n_samples();
    debug_assert_eq!(config.len(), 2);

    let own_genotype = oriented(config.bit(0), genotypes, swapped);
    let rest_genotype = oriented(config.bit(1), genotypes, swapped);

    let mut design = Array2::<f64>::zeros((m, 4));
    for sample in 0..m {
        let proportion = composition.proportion(sample, celltype);
        let rest = 100.0 - proportion;
        design[[sample, 0]] = proportion;
        design[[sample, 1]] = rest;
        design[[sample, 2]] = proportion * own_genotype[sample];
        design[[sample, 3]] = rest * rest_genotype[sample];
    }

    let name = composition.celltype(celltype);
    let variable_names = vec![
        name.to_string(),
        format!("100-{}", name),
        format!("{}:GT", name),
        format!("100-{}:GT", name),
    ];

    InteractionModel::new(
        ModelId::full_for(celltype, config),
        Some(name.to_string()),
        design,
        variable_names,
        vec![vec![0, 2], vec![1, 3]],
    )
}

/// Reduced ct model plus its two rest-model candidates.
pub(super) struct BaseCtModels {
    pub ct: InteractionModel,
    /// y ~ cc + (100-cc) + cc*GT with the normal genotype
    pub rest_normal: InteractionModel,
    /// Same with the swapped genotype
    pub rest_swapped: InteractionModel,
}

/// Reduced ct model: y ~ cc + (100-cc) + (100-cc)*GT, the single
/// configuration bit selecting the orientation. The two rest models keep the
/// cc*GT term instead, one per orientation; the caller fits both and retains
/// whichever has the lower RSS as the AIC baseline.
pub(super) fn base_ct_models(
    composition: &CellComposition,
    genotypes: &Array1<f64>,
    swapped: &Array1<f64>,
    celltype: usize,
    config: GenotypeConfiguration,
) -> BaseCtModels {
    let m = composition.n_samples();
    debug_assert_eq!(config.len(), 1);

    let rest_oriented = oriented(config.bit(0), genotypes, swapped);

    let mut ct_design = Array2::<f64>::zeros((m, 3));
    let mut rest_design = Array2::<f64>::zeros((m, 3));
    let mut rest_swapped_design = Array2::<f64>::zeros((m, 3));
    for sample in 0..m {
        let proportion = composition.proportion(sample, celltype);
        let rest = 100.0 - proportion;
        for design in [&mut ct_design, &mut rest_design, &mut rest_swapped_design] {
            design[[sample, 0]] = proportion;
            design[[sample, 1]] = rest;
        }
        ct_design[[sample, 2]] = rest * rest_oriented[sample];
        rest_design[[sample, 2]] = proportion * genotypes[sample];
        rest_swapped_design[[sample, 2]] = proportion * swapped[sample];
    }

    let name = composition.celltype(celltype);
    let ct_names = vec![
        name.to_string(),
        format!("100-{}", name),
        format!("100-{}:GT", name),
    ];
    let rest_names = vec![
        name.to_string(),
        format!("100-{}", name),
        format!("{}:GT", name),
    ];

    let ct = InteractionModel::new(
        ModelId::ct(celltype, config),
        Some(name.to_string()),
        ct_design,
        ct_names,
        vec![vec![0], vec![1, 2]],
    );
    let rest_id = ModelId::ct_rest(celltype, config);
    let rest_normal = InteractionModel::new(
        rest_id,
        Some(name.to_string()),
        rest_design,
        rest_names.clone(),
        vec![vec![0, 2], vec![1]],
    );
    let rest_swapped = InteractionModel::new(
        rest_id,
        Some(name.to_string()),
        rest_swapped_design,
        rest_names,
        vec![vec![0, 2], vec![1]],
    );

    BaseCtModels {
        ct,
        rest_normal,
        rest_swapped,
    }
}
