//! CSV/TSV reading and writing for the deconvolution inputs and results

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use ndarray::{Array2, ArrayView1};

use crate::data::CellComposition;
use crate::error::{DeconError, Result};

use super::results::DeconResult;

/// Strip surrounding quotes from a string
fn strip_quotes(s: &str) -> String {
    let s = s.trim();
    if (s.starts_with('"') && s.ends_with('"')) || (s.starts_with('\'') && s.ends_with('\'')) {
        s[1..s.len() - 1].to_string()
    } else {
        s.to_string()
    }
}

/// A labelled numeric matrix: rows are genes or SNPs, columns are samples
#[derive(Debug, Clone)]
pub struct NamedMatrix {
    row_names: Vec<String>,
    sample_names: Vec<String>,
    values: Array2<f64>,
}

impl NamedMatrix {
    pub fn new(
        row_names: Vec<String>,
        sample_names: Vec<String>,
        values: Array2<f64>,
    ) -> Result<Self> {
        if values.nrows() != row_names.len() || values.ncols() != sample_names.len() {
            return Err(DeconError::DimensionMismatch {
                reason: format!(
                    "matrix is {}x{} but {} row names and {} sample names were given",
                    values.nrows(),
                    values.ncols(),
                    row_names.len(),
                    sample_names.len()
                ),
            });
        }
        Ok(NamedMatrix {
            row_names,
            sample_names,
            values,
        })
    }

    pub fn n_rows(&self) -> usize {
        self.row_names.len()
    }

    pub fn row_names(&self) -> &[String] {
        &self.row_names
    }

    pub fn row_name(&self, row: usize) -> &str {
        &self.row_names[row]
    }

    pub fn sample_names(&self) -> &[String] {
        &self.sample_names
    }

    pub fn row(&self, row: usize) -> ArrayView1<'_, f64> {
        self.values.row(row)
    }
}

/// Read a labelled matrix file: first row is sample IDs, first column is row
/// IDs (gene or SNP names). Tab and comma delimiters are auto-detected.
fn read_named_matrix<P: AsRef<Path>>(path: P, what: &str) -> Result<NamedMatrix> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let mut lines = reader.lines();

    let header_line = lines.next().ok_or_else(|| DeconError::EmptyData {
        reason: format!("Empty {} file", what),
    })??;

    // Detect delimiter
    let delimiter = if header_line.contains('\t') { '\t' } else { ',' };

    let header: Vec<&str> = header_line.split(delimiter).collect();
    if header.len() < 2 {
        return Err(DeconError::InvalidInput {
            reason: format!("Not enough columns in {} header", what),
        });
    }
    let sample_names: Vec<String> = header[1..].iter().map(|s| strip_quotes(s)).collect();
    let n_samples = sample_names.len();

    let mut row_names: Vec<String> = Vec::new();
    let mut rows: Vec<Vec<f64>> = Vec::new();

    for line in lines {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let fields: Vec<&str> = line.split(delimiter).collect();
        if fields.len() != n_samples + 1 {
            return Err(DeconError::InvalidInput {
                reason: format!(
                    "Row {} of the {} has {} columns, expected {}",
                    row_names.len() + 2,
                    what,
                    fields.len(),
                    n_samples + 1
                ),
            });
        }

        row_names.push(strip_quotes(fields[0]));

        let row: Result<Vec<f64>> = fields[1..]
            .iter()
            .map(|s| {
                let val = strip_quotes(s);
                val.parse::<f64>().map_err(|_| DeconError::InvalidInput {
                    reason: format!("Invalid value in {}: {}", what, val),
                })
            })
            .collect();
        rows.push(row?);
    }

    if row_names.is_empty() {
        return Err(DeconError::EmptyData {
            reason: format!("No data rows in {}", what),
        });
    }

    let mut values = Array2::zeros((row_names.len(), n_samples));
    for (i, row) in rows.iter().enumerate() {
        for (j, &val) in row.iter().enumerate() {
            values[[i, j]] = val;
        }
    }

    Ok(NamedMatrix {
        row_names,
        sample_names,
        values,
    })
}

/// Read the expression matrix: rows are genes, columns are samples
pub fn read_expression_matrix<P: AsRef<Path>>(path: P) -> Result<NamedMatrix> {
    read_named_matrix(path, "expression matrix")
}

/// Read the genotype dosage matrix: rows are SNPs, columns are samples.
/// Dosages must lie in [0, 2] for the swapped encoding (2 - dose) to stay in
/// range.
pub fn read_genotype_matrix<P: AsRef<Path>>(path: P) -> Result<NamedMatrix> {
    let matrix = read_named_matrix(path, "genotype matrix")?;
    for (i, row) in matrix.values.rows().into_iter().enumerate() {
        for &dose in row {
            if !dose.is_finite() || !(0.0..=2.0).contains(&dose) {
                return Err(DeconError::InvalidInput {
                    reason: format!(
                        "Genotype dosage {} for SNP {} outside [0, 2]",
                        dose,
                        matrix.row_names[i]
                    ),
                });
            }
        }
    }
    Ok(matrix)
}

/// Read the cell counts table: rows are samples, columns are cell types,
/// values are percentages summing to 100 per sample.
pub fn read_cell_counts<P: AsRef<Path>>(path: P) -> Result<CellComposition> {
    let table = read_named_matrix(path, "cell counts table")?;
    CellComposition::new(
        table.sample_names, // header = cell type names
        table.row_names,    // first column = sample IDs
        table.values,
    )
}

/// Write results as a tab-separated table, one row per QTL with per-cell-type
/// p-value, AIC delta, interaction coefficient and orientation columns.
pub fn write_results<P: AsRef<Path>>(
    path: P,
    celltypes: &[String],
    results: &[DeconResult],
) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_path(path.as_ref())?;

    let mut header = vec!["qtl".to_string()];
    for ct in celltypes {
        header.push(format!("{}_pvalue", ct));
    }
    for ct in celltypes {
        header.push(format!("{}_aicDelta", ct));
    }
    for ct in celltypes {
        header.push(format!("{}_beta", ct));
    }
    for ct in celltypes {
        header.push(format!("{}_swapped", ct));
    }
    header.push("configuration".to_string());
    writer.write_record(&header)?;

    for result in results {
        if result.celltypes.len() != celltypes.len() {
            return Err(DeconError::DimensionMismatch {
                reason: format!(
                    "result for {} has {} cell types, header has {}",
                    result.qtl,
                    result.celltypes.len(),
                    celltypes.len()
                ),
            });
        }
        let mut record = vec![result.qtl.clone()];
        for ct in &result.celltypes {
            record.push(format!("{:.6e}", ct.pvalue));
        }
        for ct in &result.celltypes {
            record.push(format!("{:.6}", ct.aic_delta));
        }
        for ct in &result.celltypes {
            record.push(format!("{:.6}", ct.interaction_beta));
        }
        for ct in &result.celltypes {
            record.push(if ct.swapped { "1" } else { "0" }.to_string());
        }
        record.push(result.configuration.clone().unwrap_or_default());
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

/// Write the full result set as JSON, keeping the nested per-cell-type
/// structure
pub fn write_results_json<P: AsRef<Path>>(path: P, results: &[DeconResult]) -> Result<()> {
    let file = File::create(path)?;
    serde_json::to_writer_pretty(file, results)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::results::CelltypeResult;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_read_expression_matrix_tsv() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "gene_id\ts1\ts2\ts3").unwrap();
        writeln!(file, "geneA\t1.5\t2.0\t0.5").unwrap();
        writeln!(file, "geneB\t3.0\t1.0\t2.5").unwrap();

        let matrix = read_expression_matrix(file.path()).unwrap();
        assert_eq!(matrix.n_rows(), 2);
        assert_eq!(matrix.sample_names(), &["s1", "s2", "s3"]);
        assert_eq!(matrix.row_name(1), "geneB");
        assert_eq!(matrix.row(0)[1], 2.0);
    }

    #[test]
    fn test_read_matrix_comma_delimited_and_quoted() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "\"gene_id\",\"s1\",\"s2\"").unwrap();
        writeln!(file, "\"geneA\",1.0,2.0").unwrap();

        let matrix = read_expression_matrix(file.path()).unwrap();
        assert_eq!(matrix.sample_names(), &["s1", "s2"]);
        assert_eq!(matrix.row_name(0), "geneA");
    }

    #[test]
    fn test_genotype_dosage_out_of_range() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "snp_id\ts1\ts2").unwrap();
        writeln!(file, "rs1\t0.5\t2.5").unwrap();

        let err = read_genotype_matrix(file.path()).unwrap_err();
        let msg = format!("{}", err);
        assert!(msg.contains("rs1"), "error should name the SNP: {}", msg);
    }

    #[test]
    fn test_ragged_row_is_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "gene_id\ts1\ts2").unwrap();
        writeln!(file, "geneA\t1.0").unwrap();

        assert!(read_expression_matrix(file.path()).is_err());
    }

    #[test]
    fn test_read_cell_counts() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "sample\tNeut\tMono").unwrap();
        writeln!(file, "s1\t60\t40").unwrap();
        writeln!(file, "s2\t55.5\t44.5").unwrap();

        let composition = read_cell_counts(file.path()).unwrap();
        assert_eq!(composition.n_samples(), 2);
        assert_eq!(composition.celltypes(), &["Neut", "Mono"]);
        assert_eq!(composition.proportion(1, 0), 55.5);
    }

    #[test]
    fn test_write_results_round_trip_header() {
        let celltypes = vec!["Neut".to_string(), "Mono".to_string()];
        let results = vec![DeconResult {
            qtl: "geneA_rs1".to_string(),
            configuration: Some("01".to_string()),
            celltypes: vec![
                CelltypeResult {
                    celltype: "Neut".to_string(),
                    pvalue: 0.04,
                    aic_delta: -1.25,
                    interaction_beta: 0.5,
                    swapped: false,
                },
                CelltypeResult {
                    celltype: "Mono".to_string(),
                    pvalue: 0.8,
                    aic_delta: 2.0,
                    interaction_beta: 0.0,
                    swapped: true,
                },
            ],
            best_betas: None,
        }];

        let file = NamedTempFile::new().unwrap();
        write_results(file.path(), &celltypes, &results).unwrap();

        let written = std::fs::read_to_string(file.path()).unwrap();
        let mut lines = written.lines();
        let header = lines.next().unwrap();
        assert!(header.starts_with("qtl\tNeut_pvalue\tMono_pvalue"));
        let row = lines.next().unwrap();
        assert!(row.starts_with("geneA_rs1\t"));
        assert!(row.ends_with("\t01"));
    }
}
