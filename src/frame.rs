//! DataFrame helpers shared by the loaders and the pipeline stages.
use std::fs::File;
use std::path::Path;

use polars::prelude::*;

use crate::error::PanelError;

/// Read a CSV file with all columns as String dtype.
/// Trims whitespace from column names and renames any header that matches one
/// of `canonical` case-insensitively to the canonical spelling.
pub fn read_csv_as_strings(
    path: &Path,
    separator: u8,
    canonical: &[&str],
) -> Result<DataFrame, PanelError> {
    let mut df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(0)) // all columns as String
        .map_parse_options(|opts| opts.with_separator(separator))
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()?;

    let renamed: Vec<String> = df
        .get_column_names_str()
        .iter()
        .map(|c| canonical_name(c.trim(), canonical))
        .collect();
    df.set_column_names(renamed.as_slice())?;

    Ok(df)
}

/// Read a CSV, retrying with a pipe separator when the comma read fails or
/// its header lacks any of the `required` columns.
pub fn read_csv_any_separator(
    path: &Path,
    required: &[&str],
    canonical: &[&str],
) -> Result<DataFrame, PanelError> {
    let comma = read_csv_as_strings(path, b',', canonical);
    if let Ok(df) = &comma {
        if has_columns(df, required) {
            return comma;
        }
    }
    match read_csv_as_strings(path, b'|', canonical) {
        Ok(piped) if has_columns(&piped, required) => Ok(piped),
        Ok(piped) => comma.or(Ok(piped)),
        Err(e) => comma.map_err(|_| e),
    }
}

fn canonical_name(name: &str, canonical: &[&str]) -> String {
    canonical
        .iter()
        .find(|c| c.eq_ignore_ascii_case(name))
        .map(|c| c.to_string())
        .unwrap_or_else(|| name.to_string())
}

fn has_columns(df: &DataFrame, required: &[&str]) -> bool {
    required.iter().all(|c| df.column(c).is_ok())
}

pub fn require_columns(df: &DataFrame, table: &str, required: &[&str]) -> Result<(), PanelError> {
    for &col_name in required {
        if df.column(col_name).is_err() {
            return Err(PanelError::missing_column(table, col_name));
        }
    }
    Ok(())
}

// ── Parse expressions ───────────────────────────────────────────────────────

/// String column to Float64; unparseable values become null.
pub fn parse_float(column: &str) -> Expr {
    col(column)
        .str()
        .strip_chars(lit(" \t\r\n"))
        .cast(DataType::Float64)
}

/// String column to Int64 through Float64, so "10397.0" reads as 10397.
pub fn parse_int(column: &str) -> Expr {
    parse_float(column).cast(DataType::Int64)
}

/// Trimmed, upper-cased code column ("aa " -> "AA").
pub fn parse_code(column: &str) -> Expr {
    col(column)
        .str()
        .strip_chars(lit(" \t\r\n"))
        .str()
        .to_uppercase()
}

/// Boolean-like column as a 0.0 / 1.0 Float64.
/// Accepts numeric flags and TRUE/T/Y/YES; anything else is 0.0.
pub fn parse_flag(column: &str) -> Expr {
    let text = parse_code(column);
    let truthy = text
        .clone()
        .eq(lit("TRUE"))
        .or(text.clone().eq(lit("T")))
        .or(text.clone().eq(lit("Y")))
        .or(text.eq(lit("YES")));
    when(truthy)
        .then(lit(1.0))
        .otherwise(
            when(parse_float(column).gt(lit(0.0)))
                .then(lit(1.0))
                .otherwise(lit(0.0)),
        )
        .alias(column)
}

// ── Output ──────────────────────────────────────────────────────────────────

/// Write a frame as Parquet when the path ends in `.parquet`, CSV otherwise.
pub fn write_frame(df: &mut DataFrame, path: &Path) -> Result<(), PanelError> {
    let fail = |reason: String| PanelError::OutputWriteFailure {
        path: path.display().to_string(),
        reason,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| fail(e.to_string()))?;
    }
    let file = File::create(path).map_err(|e| fail(e.to_string()))?;

    let is_parquet = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("parquet"))
        .unwrap_or(false);

    if is_parquet {
        ParquetWriter::new(file)
            .finish(df)
            .map_err(|e| fail(e.to_string()))?;
    } else {
        let mut file = file;
        CsvWriter::new(&mut file)
            .include_header(true)
            .finish(df)
            .map_err(|e| fail(e.to_string()))?;
    }
    Ok(())
}
