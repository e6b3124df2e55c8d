//! Minimal query construction primitive: partial projections, joins, predicate
//! groups with bound parameters, sort terms and a page window.

pub(crate) mod helpers;
mod on;
mod predicate;
mod query;
mod selector;

pub use on::*;
pub use predicate::*;
pub use query::*;
pub use selector::*;
