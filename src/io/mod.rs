//! Input/output for the deconvolution pipeline

mod csv;
mod results;

pub use self::csv::{
    read_cell_counts, read_expression_matrix, read_genotype_matrix, write_results,
    write_results_json, NamedMatrix,
};
pub use results::{CelltypeResult, DeconResult};
