//! `tabula`: convenience facade that re-exports `tabula-core` and adds the
//! request service wired to configuration and metrics.

#![deny(missing_docs)]

/// Re-export **everything** from tabula-core at the crate root, so users can `use tabula::*;`.
#[doc(inline)]
pub use tabula_core::*;

/// Also expose tabula-core as a nested module for `tabula::core::...` paths.
pub use tabula_core as core;

/// Configuration and observability helpers.
pub use tabula_shared as shared;

pub mod service;

pub use service::{connect, TableService};
