//! Reads the SSP model tables from disk into a [`GridStore`].
//!
//! IMF tables hold a wavelength column followed by 256 IMF columns and are
//! named `<prefix>_<tag>_<tag>_t<age>_Z<sign><value>...`. Abundance tables
//! skip two header lines, hold a wavelength column followed by the 34
//! abundance variants and are named `<prefix>_<tag>_t<age>_Z<sign><value>...`.
//! A sign character of `m` marks a negative metallicity.

use super::store::{GridKey, GridPoint, GridStore};
use crate::common::config::GridConfig;
use crate::common::constants::{ABUNDANCE_AGE_ALIAS, ABUNDANCE_COLUMN_COUNT, IMF_COLUMN_COUNT};
use crate::domain::{FitError, FitResult};
use crate::numerics::DenseMatrix;
use globset::{Glob, GlobMatcher};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const ABUNDANCE_HEADER_LINES: usize = 2;

#[derive(Debug, thiserror::Error)]
pub enum GridLoadError {
    #[error("failed to read grid file '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to list grid directory '{}': {source}", path.display())]
    ListDirectory {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid glob pattern '{pattern}': {source}")]
    InvalidGlob {
        pattern: String,
        source: globset::Error,
    },
    #[error("no files matching '{pattern}' in '{}'", directory.display())]
    NoFiles { directory: PathBuf, pattern: String },
    #[error("cannot derive age/metallicity from file name '{name}': {reason}")]
    FileName { name: String, reason: String },
    #[error("'{}' line {line}: {reason}", path.display())]
    Parse {
        path: PathBuf,
        line: usize,
        reason: String,
    },
    #[error("'{}' line {line}: expected {expected} columns, got {actual}", path.display())]
    ColumnCount {
        path: PathBuf,
        line: usize,
        expected: usize,
        actual: usize,
    },
    #[error("'{}' does not share the grid wavelength axis", path.display())]
    WavelengthMismatch { path: PathBuf },
}

impl From<GridLoadError> for FitError {
    fn from(error: GridLoadError) -> Self {
        match error {
            GridLoadError::Read { .. } | GridLoadError::ListDirectory { .. } => {
                FitError::io_system("IO.GRID_READ", error.to_string())
            }
            _ => FitError::input_validation("INPUT.GRID_FILE", error.to_string()),
        }
    }
}

/// One parsed model table: the wavelength column and the remaining columns.
#[derive(Debug, Clone, PartialEq)]
pub struct GridTable {
    pub wavelength: Vec<f64>,
    pub values: DenseMatrix,
}

pub fn parse_imf_file_name(name: &str) -> Result<GridKey, GridLoadError> {
    let fields: Vec<&str> = name.split('_').collect();
    let age_field = fields.get(3).copied().unwrap_or_default();
    let metallicity_field = fields.get(4).copied().unwrap_or_default();
    let age = parse_age_field(name, age_field)?;
    let metallicity = parse_metallicity_field(name, metallicity_field)?;
    Ok(GridKey::new(age, metallicity))
}

pub fn parse_abundance_file_name(name: &str) -> Result<GridKey, GridLoadError> {
    let fields: Vec<&str> = name.split('_').collect();
    let age_field = fields.get(2).copied().unwrap_or_default();
    let metallicity_field = fields.get(3).copied().unwrap_or_default();
    let mut age = parse_age_field(name, age_field)?;
    let metallicity = parse_metallicity_field(name, metallicity_field)?;
    if age == ABUNDANCE_AGE_ALIAS.0 {
        age = ABUNDANCE_AGE_ALIAS.1;
    }
    Ok(GridKey::new(age, metallicity))
}

fn file_name_error(name: &str, reason: impl Into<String>) -> GridLoadError {
    GridLoadError::FileName {
        name: name.to_string(),
        reason: reason.into(),
    }
}

fn parse_age_field(name: &str, field: &str) -> Result<f64, GridLoadError> {
    let mut characters = field.chars();
    if characters.next() != Some('t') {
        return Err(file_name_error(
            name,
            format!("age field '{}' must start with 't'", field),
        ));
    }
    characters
        .as_str()
        .parse::<f64>()
        .map_err(|_| file_name_error(name, format!("age field '{}' is not numeric", field)))
}

/// `Z<sign><value>`; the value is the three characters after the sign, so
/// `Zm0.25` reads as -0.2 and trailing extensions such as `.ssp` are ignored.
fn parse_metallicity_field(name: &str, field: &str) -> Result<f64, GridLoadError> {
    let bytes = field.as_bytes();
    if bytes.len() < 3 || bytes[0] != b'Z' {
        return Err(file_name_error(
            name,
            format!("metallicity field '{}' must look like Z<sign><value>", field),
        ));
    }

    let sign = if bytes[1] == b'm' { -1.0 } else { 1.0 };
    field
        .get(2..field.len().min(5))
        .and_then(|digits| digits.parse::<f64>().ok())
        .map(|value| sign * value)
        .ok_or_else(|| {
            file_name_error(
                name,
                format!("metallicity field '{}' has no numeric value", field),
            )
        })
}

pub fn read_grid_table(
    path: &Path,
    skip_lines: usize,
    value_columns: usize,
) -> Result<GridTable, GridLoadError> {
    let source = fs::read_to_string(path).map_err(|source| GridLoadError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let expected = value_columns + 1;
    let mut wavelength = Vec::new();
    let mut rows: Vec<Vec<f64>> = Vec::new();
    for (index, line) in source.lines().enumerate().skip(skip_lines) {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let values = trimmed
            .split_whitespace()
            .map(|token| token.parse::<f64>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|error| GridLoadError::Parse {
                path: path.to_path_buf(),
                line: index + 1,
                reason: error.to_string(),
            })?;
        if values.len() != expected {
            return Err(GridLoadError::ColumnCount {
                path: path.to_path_buf(),
                line: index + 1,
                expected,
                actual: values.len(),
            });
        }

        wavelength.push(values[0]);
        rows.push(values[1..].to_vec());
    }

    let values = DenseMatrix::from_fn(rows.len(), value_columns, |row, col| rows[row][col]);
    Ok(GridTable { wavelength, values })
}

fn matching_files(directory: &Path, pattern: &str) -> Result<Vec<PathBuf>, GridLoadError> {
    let matcher: GlobMatcher = Glob::new(pattern)
        .map_err(|source| GridLoadError::InvalidGlob {
            pattern: pattern.to_string(),
            source,
        })?
        .compile_matcher();

    let entries = fs::read_dir(directory).map_err(|source| GridLoadError::ListDirectory {
        path: directory.to_path_buf(),
        source,
    })?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| GridLoadError::ListDirectory {
            path: directory.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        let matches = path
            .file_name()
            .is_some_and(|name| matcher.is_match(Path::new(name)));
        if path.is_file() && matches {
            files.push(path);
        }
    }
    files.sort();

    if files.is_empty() {
        return Err(GridLoadError::NoFiles {
            directory: directory.to_path_buf(),
            pattern: pattern.to_string(),
        });
    }
    Ok(files)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn read_keyed_tables(
    files: &[PathBuf],
    skip_lines: usize,
    value_columns: usize,
    parse_name: fn(&str) -> Result<GridKey, GridLoadError>,
) -> Result<Vec<(PathBuf, GridKey, GridTable)>, GridLoadError> {
    files
        .par_iter()
        .map(|path| {
            let key = parse_name(&file_name(path))?;
            let table = read_grid_table(path, skip_lines, value_columns)?;
            debug!(path = %path.display(), %key, rows = table.wavelength.len(), "read grid table");
            Ok((path.clone(), key, table))
        })
        .collect()
}

/// Load every IMF table and attach the matching abundance table. Abundance
/// tables without an IMF counterpart are skipped with a warning.
pub fn load_grid_store(config: &GridConfig) -> FitResult<GridStore> {
    let imf_directory = config.imf_directory();
    let abundance_directory = config.abundance_directory();
    info!(
        imf = %imf_directory.display(),
        abundance = %abundance_directory.display(),
        "loading SSP model grid"
    );

    let imf_files = matching_files(&imf_directory, &config.imf_glob)?;
    let imf_tables = read_keyed_tables(&imf_files, 0, IMF_COLUMN_COUNT, parse_imf_file_name)?;

    let abundance_files = if abundance_directory.is_dir() {
        matching_files(&abundance_directory, &config.abundance_glob)?
    } else {
        warn!(
            directory = %abundance_directory.display(),
            "abundance directory missing; loading IMF blocks only"
        );
        Vec::new()
    };
    let abundance_tables = read_keyed_tables(
        &abundance_files,
        ABUNDANCE_HEADER_LINES,
        ABUNDANCE_COLUMN_COUNT,
        parse_abundance_file_name,
    )?;

    let wavelength = imf_tables
        .first()
        .map(|(_, _, table)| table.wavelength.clone())
        .unwrap_or_default();

    let mut abundance_by_key: BTreeMap<GridKey, DenseMatrix> = BTreeMap::new();
    for (path, key, table) in abundance_tables {
        if table.wavelength != wavelength {
            return Err(GridLoadError::WavelengthMismatch { path }.into());
        }
        abundance_by_key.insert(key, table.values);
    }

    let mut store = GridStore::new(wavelength.clone())?;
    for (path, key, table) in imf_tables {
        if table.wavelength != wavelength {
            return Err(GridLoadError::WavelengthMismatch { path }.into());
        }
        let abundance = abundance_by_key.remove(&key);
        store.insert(key, GridPoint::new(table.values, abundance))?;
    }
    for key in abundance_by_key.keys() {
        warn!(%key, "abundance table has no matching IMF table; skipped");
    }

    info!(
        points = store.len(),
        rows = store.wavelength().len(),
        "finished loading SSP model grid"
    );
    Ok(store)
}
