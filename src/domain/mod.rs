//! Domain values: daily records, jurisdictions and the series derived from them.

pub mod jurisdiction;
pub mod records;
pub mod series;
