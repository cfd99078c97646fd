pub mod config;
pub mod dashboard;
pub mod db;
pub mod error;
pub mod formulas;
pub mod kpi;
pub mod membership;
pub mod models;
pub mod report;
pub mod schedule;
pub mod service;
pub mod store;
pub mod sync;

#[cfg(test)]
mod testing;

pub use error::StudioError;
