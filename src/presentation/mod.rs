//! HTML views.

pub mod views;
