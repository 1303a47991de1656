//! decon_eqtl command-line interface

use clap::Parser;
use log::LevelFilter;

use decon_eqtl::cli::{Cli, Commands};
use decon_eqtl::prelude::*;

fn main() {
    let cli = Cli::parse();

    // Set up logging
    let log_level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    env_logger::Builder::new()
        .filter_level(log_level)
        .format_timestamp(None)
        .init();

    let result = match cli.command {
        Commands::Run {
            cellcounts,
            expression,
            genotypes,
            output,
            mode,
            most_betas,
            best_betas,
            json,
        } => run(
            &cellcounts,
            &expression,
            &genotypes,
            &output,
            &mode,
            most_betas,
            best_betas,
            json.as_deref(),
        ),
    };

    if let Err(e) = result {
        log::error!("{}", e);
        std::process::exit(1);
    }
}

#[allow(clippy::too_many_arguments)]
fn run(
    cellcounts: &str,
    expression: &str,
    genotypes: &str,
    output: &str,
    mode: &str,
    most_betas: bool,
    best_betas: bool,
    json: Option<&str>,
) -> Result<()> {
    let mode: ConfigurationMode = mode.parse()?;
    let options = CollectionOptions {
        mode,
        select_most_betas: most_betas,
        track_best_betas: best_betas,
    };

    let composition = read_cell_counts(cellcounts)?;
    log::info!(
        "cell counts: {} samples, {} cell types",
        composition.n_samples(),
        composition.n_celltypes()
    );
    let expression = read_expression_matrix(expression)?;
    let genotypes = read_genotype_matrix(genotypes)?;

    let results = run_deconvolution(&composition, &expression, &genotypes, options)?;

    write_results(output, composition.celltypes(), &results)?;
    if let Some(json_path) = json {
        write_results_json(json_path, &results)?;
    }
    log::info!("wrote {} results to {}", results.len(), output);
    Ok(())
}
