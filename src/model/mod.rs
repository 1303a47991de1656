//! Interaction models: configuration enumeration, design matrices, selection

mod builder;
mod collection;
mod config;
mod record;

pub use collection::{swap_genotypes, CollectionOptions, InteractionModelCollection, Phase};
pub use config::{ct_configurations, full_configurations, ConfigurationMode, GenotypeConfiguration};
pub use record::{InteractionModel, ModelId, ModelKind};
