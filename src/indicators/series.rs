// src/indicators/series.rs

use serde::Serialize;

use super::table::IndicatorTable;
use crate::error::SeriesError;

/// One row of the indicator table as chartable numbers, aligned with the year labels.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesResult {
    pub years: Vec<String>,
    pub values: Vec<f64>,
}

impl SeriesResult {
    pub fn points(&self) -> impl Iterator<Item = (&str, f64)> {
        self.years
            .iter()
            .map(String::as_str)
            .zip(self.values.iter().copied())
    }
}

/// Parse pt-BR formatted numbers: `.` groups thousands, `,` marks decimals.
pub fn parse_locale_number(cell: &str) -> Option<f64> {
    cell.replace('.', "")
        .replace(',', ".")
        .trim()
        .parse::<f64>()
        .ok()
}

/// Chart heading for a selection.
pub fn chart_title(locality: &str, variable: &str) -> String {
    format!("{} - {}", variable, locality)
}

/// Project the first row matching `locality` and `variable` into a numeric series.
/// Recomputed on every call; a cell that does not parse fails the whole projection.
pub fn project(
    table: &IndicatorTable,
    locality: &str,
    variable: &str,
) -> Result<SeriesResult, SeriesError> {
    let row = table
        .find(locality, variable)
        .ok_or_else(|| SeriesError::NoMatch {
            locality: locality.to_string(),
            variable: variable.to_string(),
        })?;

    let values = table
        .years()
        .iter()
        .zip(&row.values)
        .map(|(year, cell)| {
            parse_locale_number(cell).ok_or_else(|| SeriesError::Parse {
                year: year.clone(),
                cell: cell.clone(),
            })
        })
        .collect::<Result<Vec<f64>, _>>()?;

    Ok(SeriesResult {
        years: table.years().to_vec(),
        values,
    })
}
