//! Reclassification progress tracking for English-language learners.
//!
//! The scoring engine (`scoring`, `thresholds`, `models`) is pure: raw score
//! entries go in, plain serializable records come out. `db`, `report` and
//! `roster` are the collaborators the command-line front end uses to persist,
//! print and batch-process those records.

pub mod config;
pub mod db;
pub mod models;
pub mod report;
pub mod roster;
pub mod scoring;
pub mod thresholds;
