// src/indicators/table.rs

use csv::ReaderBuilder;
use std::{fs::File, io::Read, path::Path};
use tracing::{info, instrument};

use crate::error::TableError;

pub const LOCALITY_COLUMN: &str = "Localidade";
pub const VARIABLE_COLUMN: &str = "Variável";
/// Cell text meaning "no data"; stored as `"0"`.
pub const MISSING_PLACEHOLDER: &str = "-";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndicatorRow {
    pub locality: String,
    pub variable: String,
    /// Raw cell text, one per year column, in header order.
    pub values: Vec<String>,
}

/// The semicolon-delimited indicator file, held in memory as text.
///
/// Every column other than locality and variable is a year column. All rows
/// carry the same year columns in the same order; a ragged row fails the load.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndicatorTable {
    years: Vec<String>,
    rows: Vec<IndicatorRow>,
}

fn normalize(cell: &str) -> String {
    if cell == MISSING_PLACEHOLDER {
        "0".to_string()
    } else {
        cell.to_string()
    }
}

impl IndicatorTable {
    #[instrument(level = "info", skip(path), fields(path = %path.as_ref().display()))]
    pub fn load(path: impl AsRef<Path>) -> Result<Self, TableError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| TableError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let table = Self::from_reader(file)?;
        info!(
            rows = table.rows.len(),
            years = table.years.len(),
            "indicator table loaded"
        );
        Ok(table)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, TableError> {
        let mut rdr = ReaderBuilder::new().delimiter(b';').from_reader(reader);

        // 1) Locate the two key columns; everything else is a year
        let headers = rdr.headers()?.clone();
        let position = |name: &'static str| {
            headers
                .iter()
                .position(|h| h == name)
                .ok_or(TableError::MissingColumn(name))
        };
        let loc_idx = position(LOCALITY_COLUMN)?;
        let var_idx = position(VARIABLE_COLUMN)?;
        let year_idx: Vec<usize> = (0..headers.len())
            .filter(|&i| i != loc_idx && i != var_idx)
            .collect();
        let years = year_idx.iter().map(|&i| headers[i].to_string()).collect();

        // 2) Read rows, replacing the placeholder as we go
        let mut rows = Vec::new();
        for result in rdr.records() {
            let record = result?;
            let cell = |i: usize| normalize(record.get(i).unwrap_or_default());
            rows.push(IndicatorRow {
                locality: cell(loc_idx),
                variable: cell(var_idx),
                values: year_idx.iter().map(|&i| cell(i)).collect(),
            });
        }

        Ok(Self { years, rows })
    }

    pub fn years(&self) -> &[String] {
        &self.years
    }

    pub fn rows(&self) -> &[IndicatorRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Distinct localities in order of first appearance.
    pub fn localities(&self) -> Vec<&str> {
        unique_in_order(self.rows.iter().map(|r| r.locality.as_str()))
    }

    /// Distinct variables across the whole table, in order of first appearance.
    pub fn variables(&self) -> Vec<&str> {
        unique_in_order(self.rows.iter().map(|r| r.variable.as_str()))
    }

    /// First row for the pair. Later duplicates are ignored.
    pub fn find(&self, locality: &str, variable: &str) -> Option<&IndicatorRow> {
        self.rows
            .iter()
            .find(|r| r.locality == locality && r.variable == variable)
    }
}

fn unique_in_order<'a>(items: impl Iterator<Item = &'a str>) -> Vec<&'a str> {
    let mut out: Vec<&str> = Vec::new();
    for item in items {
        if !out.contains(&item) {
            out.push(item);
        }
    }
    out
}
