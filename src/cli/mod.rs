//! Command-line interface for decon_eqtl

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "decon_eqtl")]
#[command(version)]
#[command(about = "Cell-type-specific eQTL deconvolution")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the deconvolution analysis
    #[command(
        about = "Run the deconvolution analysis",
        long_about = "Run the deconvolution analysis\n\n\
            For each gene/SNP pair, fits interaction models between cell type\n\
            proportions and genotype dosage, searches the genotype orientation\n\
            space for the best full model, and tests each cell type's\n\
            interaction term with a nested-model ANOVA.",
        after_long_help = "\
Examples:
  # Default NNLS analysis over the full orientation space
  decon_eqtl run -c cellcounts.txt -e expression.txt -g genotypes.txt -o results.txt

  # Restrict the search to the all-normal and all-swapped orientations
  decon_eqtl run -c cellcounts.txt -e expression.txt -g genotypes.txt \\
    -o results.txt --mode two

  # Unconstrained OLS without an orientation search
  decon_eqtl run -c cellcounts.txt -e expression.txt -g genotypes.txt \\
    -o results.txt --mode ols-default"
    )]
    Run {
        /// Path to the cell counts table
        #[arg(short, long,
            long_help = "Path to the cell counts table.\n\
                Format: first column = sample IDs, remaining columns = cell type\n\
                percentages. Each row must sum to 100.\n\
                Supports both CSV (comma) and TSV (tab) delimiters (auto-detected).")]
        cellcounts: String,

        /// Path to the expression matrix
        #[arg(short, long,
            long_help = "Path to the expression matrix.\n\
                Format: first column = gene IDs, remaining columns = bulk expression\n\
                per sample. Sample columns must match the cell counts table.")]
        expression: String,

        /// Path to the genotype dosage matrix
        #[arg(short, long,
            long_help = "Path to the genotype dosage matrix.\n\
                Format: first column = SNP IDs, remaining columns = dosages in [0, 2].\n\
                Row i is paired with row i of the expression matrix.")]
        genotypes: String,

        /// Output file path [default: decon_results.txt]
        #[arg(short, long, default_value = "decon_results.txt")]
        output: String,

        /// Genotype configuration mode [default: all]
        #[arg(long, default_value = "all",
            long_help = "How the genotype orientation space is enumerated.\n\
                all:         every orientation combination (2^k full models)\n\
                two:         all-normal and all-swapped only\n\
                one:         'two' plus every single-position deviation\n\
                ols-default: single all-normal configuration, fitted with OLS\n\
                base:        per-cell-type reduced models (each cell type vs the rest)")]
        mode: String,

        /// Prefer full models with more non-zero interaction coefficients
        #[arg(long,
            long_help = "Selection tie-break: prefer the candidate with more strictly\n\
                positive interaction coefficients, using RSS only among equals.")]
        most_betas: bool,

        /// Report the element-wise maximum coefficients over all candidates
        #[arg(long,
            long_help = "Track and report, per QTL, the element-wise maximum of the\n\
                full-model coefficients across every candidate configuration.\n\
                Not available with --mode base.")]
        best_betas: bool,

        /// Also write the full result set as JSON
        #[arg(long, value_name = "FILE")]
        json: Option<String>,
    },
}
