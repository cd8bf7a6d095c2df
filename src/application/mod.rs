//! Application services: the fetch pipeline and the chart payload built on it.

pub mod chart;
pub mod dataset;
pub mod error;
pub mod fetch;
pub mod ports;
