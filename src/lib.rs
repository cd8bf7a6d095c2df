//! Cache-aside chart server for covidtracking.com daily data.

pub mod application;
pub mod config;
pub mod domain;
pub mod infra;
pub mod presentation;
pub mod util;
