pub mod checksum;
pub mod config;
pub mod dupes;
pub mod entry;
pub mod error;
pub mod family;
pub mod merge;
pub mod mirror;
pub mod paths;
pub mod pipeline;
pub mod progress;
pub mod scan;
pub mod sort;
pub mod store;

pub use error::{CatalogError, Result};
