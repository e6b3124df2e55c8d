use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::error::Result;
use crate::exec::{count, Executor};
use crate::hydrate::Hydrator;
use crate::planner::PlannedQuery;
use crate::value::Record;

/// Body returned to the table client.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableResponse {
    pub draw: i64,
    pub records_total: u64,
    pub records_filtered: u64,
    pub data: Vec<Record>,
}

/// Runs the page, total and filtered count queries and nests the page rows.
#[instrument(level = "debug", skip_all, fields(table = %planned.table().name()))]
pub async fn fetch_page<E: Executor + ?Sized>(planned: &PlannedQuery<'_>, executor: &E) -> Result<TableResponse> {
    let page = planned.compile_filtered_query()?;
    let total = planned.compile_count_query()?;
    let filtered = planned.compile_filtered_count_query()?;

    let rows = executor.fetch_rows(&page).await?;
    let data = Hydrator::new(planned.plan()).hydrate(&rows);
    let records_total = count(executor, &total).await?;
    let records_filtered = count(executor, &filtered).await?;
    debug!(rows = rows.len(), records = data.len(), records_total, records_filtered, "page fetched");

    Ok(TableResponse {
        draw: planned.request().draw.unwrap_or_default(),
        records_total,
        records_filtered,
        data,
    })
}
