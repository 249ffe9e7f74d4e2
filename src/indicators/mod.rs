pub mod series;
pub mod table;

pub use series::{chart_title, parse_locale_number, project, SeriesResult};
pub use table::{IndicatorRow, IndicatorTable};
