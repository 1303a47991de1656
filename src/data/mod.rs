//! Data structures shared across the deconvolution analysis

mod cell_composition;

pub use cell_composition::CellComposition;
