//! Request planning: one walk over the columns yields the joins, the
//! selections and the search/order targets; compilation turns them into SQL.

mod compiled;
mod plan;
#[allow(clippy::module_inception)]
mod planner;
mod request;

pub use compiled::{CacheOptions, CompiledQuery, CountQuery, CountStrategy};
pub use plan::{label, FieldSlot, JoinEntry, JoinPlan, Plan, SelectEntry, SelectPlan};
pub use planner::{PlannedQuery, QueryPlanner};
pub use request::{OrderParam, RequestColumn, RequestParams, SearchParam, DISABLE_PAGINATION};
