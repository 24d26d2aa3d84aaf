//! `feedmatch-recon`: Catalog reconciliation engine.
//!
//! Links rows of an external content feed to internal catalog ids by
//! fuzzy-joining the feed against two reference datasets and unioning
//! the results. Pure engine crate: receives header + chunk streams,
//! returns id mappings. No CLI dependencies.

pub mod config;
pub mod engine;
pub mod error;
pub mod index;
pub mod matcher;
pub mod model;
pub mod parse;

pub use config::ReconConfig;
pub use engine::{run, Reconciler};
pub use error::ReconError;
pub use model::{CsvStream, FeedType, IdMapping, ReconInput, ReconResult, Record};
