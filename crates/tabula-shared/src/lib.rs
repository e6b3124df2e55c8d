//! Shared configuration and observability for Tabula

pub mod config;
pub mod observability;

pub use config::*;
pub use observability::*;
