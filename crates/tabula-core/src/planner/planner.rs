use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, instrument};

use super::compiled::{CacheOptions, CompiledQuery, CountQuery, CountStrategy};
use super::plan::{label, FieldSlot, JoinEntry, JoinPlan, Plan, SelectEntry, SelectPlan};
use super::request::RequestParams;
use crate::column::ColumnDefinition;
use crate::error::{Result, TabulaError};
use crate::filter::{Filter, FilterStrategy, ParameterCounter, SearchTerm};
use crate::schema::SchemaProvider;
use crate::sql::{FieldRef, OnClause, PredicateGroup, Query, Selector};
use crate::table::{ResultCache, TableDefinition};

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{(\w+)\}").expect("valid regex"));

/// `{x}` -> `x` in custom select expressions.
fn select_expression(expr: &str) -> String {
    PLACEHOLDER.replace_all(expr, "$1").into_owned()
}

/// `{x}` -> `x_search`, so a searched sub-select never shadows the selected one.
fn search_expression(expr: &str) -> String {
    PLACEHOLDER.replace_all(expr, "${1}_search").into_owned()
}

fn safe_alias(schema: &dyn SchemaProvider, name: &str) -> String {
    if schema.is_reserved_keyword(name) {
        format!("_{name}")
    } else {
        name.to_string()
    }
}

fn to_config(err: anyhow::Error) -> TabulaError {
    TabulaError::config(err.to_string())
}

/// Entry point of a request: owns the base query and walks the columns once.
pub struct QueryPlanner<'a> {
    table: &'a TableDefinition,
    request: RequestParams,
    base: Query,
    root_alias: String,
}

impl<'a> QueryPlanner<'a> {
    /// Base query is `FROM <root table> AS <root alias>` plus the table's
    /// own restrictions and grouping.
    pub fn new(table: &'a TableDefinition, request: RequestParams) -> Result<Self> {
        let registry = table.registry();
        let meta = registry.metadata()?;
        let root_alias = safe_alias(registry.schema(), &meta.short_name());

        let mut base = Query::new(&meta.table, &root_alias);
        for sql in table.base_predicates() {
            base = base.filter_raw(sql);
        }
        for field in table.group_by_fields() {
            base = base.group_by(field.clone());
        }

        Ok(Self { table, request, base, root_alias })
    }

    pub fn root_alias(&self) -> &str {
        &self.root_alias
    }

    pub fn base_query(&self) -> &Query {
        &self.base
    }

    /// Replaces the base query. Joins and selections of the plan are added on
    /// top of it at compile time.
    pub fn set_base_query(&mut self, query: Query) {
        self.base = query;
    }

    #[instrument(level = "debug", skip(self), fields(table = %self.table.name()))]
    pub fn plan(self) -> Result<PlannedQuery<'a>> {
        let plan = build_plan(self.table, &self.root_alias)?;
        debug!(
            joins = plan.joins.len(),
            selects = plan.select.entries().len(),
            "columns planned"
        );
        Ok(PlannedQuery {
            table: self.table,
            request: self.request,
            base: self.base,
            cache: self.table.cache.clone(),
            plan,
        })
    }
}

fn build_plan(table: &TableDefinition, root_alias: &str) -> Result<Plan> {
    let registry = table.registry();
    let schema = registry.schema();
    let root = registry.metadata()?;
    let root_identifier = root.identifier()?.to_string();

    let mut joins = JoinPlan::default();
    let mut select = SelectPlan::default();
    let mut search = Vec::with_capacity(registry.len());
    let mut order = Vec::with_capacity(registry.len());
    let mut overrides = Vec::new();

    select.add_field(root_alias, &root_identifier);

    for column in registry.columns() {
        if column.is_custom_dql() {
            let (alias, expr) = match (column.data_path(), column.dql()) {
                (Some(data), Some(expr)) => (data.alias(), expr),
                _ => {
                    return Err(TabulaError::config(format!(
                        "column {} has a custom expression but no data",
                        column.index()
                    )))
                }
            };
            select.add_raw(&select_expression(expr), &alias);
            order.push(if column.is_orderable() {
                FieldSlot::One(FieldRef::Alias(alias))
            } else {
                FieldSlot::Empty
            });
            search.push(if column.is_searchable() {
                FieldSlot::One(FieldRef::Expression(search_expression(expr)))
            } else {
                FieldSlot::Empty
            });
        } else if column.is_selectable() {
            let Some(dql) = column.dql() else {
                search.push(FieldSlot::Empty);
                order.push(FieldSlot::Empty);
                continue;
            };
            let parts: Vec<&str> = dql.split('.').collect();
            let Some((field, hops)) = parts.split_last() else {
                return Err(TabulaError::config(format!("column {} has an empty path", column.index())));
            };

            let mut meta = root;
            let mut alias = root_alias.to_string();
            let mut path = String::new();
            for rel in hops {
                let association = meta.association(rel)?;
                if !path.is_empty() {
                    path.push('_');
                }
                path.push_str(rel);
                let target = schema.entity(&association.target)?;
                let entry = joins.get_or_insert(JoinEntry {
                    parent_alias: alias.clone(),
                    relationship: rel.to_string(),
                    alias: safe_alias(schema, &path),
                    kind: column.join_type(),
                    entity: target.name.clone(),
                    table: target.table.clone(),
                    identifier: target.identifier()?.to_string(),
                    association: association.clone(),
                });
                alias = entry.alias.clone();
                select.add_field(&alias, &entry.identifier);
                meta = target;
            }

            select.add_field(&alias, meta.identifier()?);
            select.add_field(&alias, field);
            let target = FieldRef::column(&alias, meta.column_for(field));
            order.push(if column.is_orderable() { FieldSlot::One(target.clone()) } else { FieldSlot::Empty });
            search.push(if column.is_searchable() { FieldSlot::One(target) } else { FieldSlot::Empty });
        } else {
            // resolved once every join is known
            search.push(FieldSlot::Empty);
            order.push(FieldSlot::Empty);
            overrides.push(column);
        }
    }

    let mut plan = Plan {
        root_alias: root_alias.to_string(),
        root_entity: root.name.clone(),
        root_table: root.table.clone(),
        root_identifier,
        joins,
        select,
        search,
        order,
    };

    for column in overrides {
        let index = column.index();
        if column.is_orderable() {
            if let Some(list) = column.order_column() {
                plan.order[index] = resolve_overrides(table, &plan, list, true);
            }
        }
        if column.is_searchable() {
            if let Some(list) = column.search_column() {
                plan.search[index] = resolve_overrides(table, &plan, list, false);
            }
        }
    }

    Ok(plan)
}

/// Maps `order_column`/`search_column` entries of a virtual column to fields.
///
/// Bare names are qualified with the root alias; for ordering, a bare name
/// that registers a custom expression orders by that expression's alias.
fn resolve_overrides(table: &TableDefinition, plan: &Plan, list: &[String], ordering: bool) -> FieldSlot {
    let registry = table.registry();
    let fields: Vec<_> = list
        .iter()
        .map(|raw| {
            let raw = raw.trim();
            if !raw.contains('.') {
                if ordering {
                    let custom = registry
                        .lookup(raw)
                        .and_then(|i| registry.column(i))
                        .filter(|c| c.is_custom_dql())
                        .and_then(ColumnDefinition::data_path);
                    if let Some(data) = custom {
                        return FieldRef::Alias(data.alias());
                    }
                }
                return qualify(registry.schema(), plan, &plan.root_alias, raw);
            }
            match FieldRef::parse(raw) {
                FieldRef::Column { alias, column } => {
                    qualify(registry.schema(), plan, &alias, &column)
                }
                other => other,
            }
        })
        .collect();

    match fields.len() {
        0 => FieldSlot::Empty,
        1 => fields.into_iter().next().map(FieldSlot::One).unwrap_or_default(),
        _ => FieldSlot::Many(fields),
    }
}

fn qualify(schema: &dyn SchemaProvider, plan: &Plan, alias: &str, field: &str) -> FieldRef {
    let column = plan
        .entity_of(alias)
        .and_then(|entity| schema.entity(entity).ok())
        .map(|meta| meta.column_for(field).to_string())
        .unwrap_or_else(|| field.to_string());
    FieldRef::column(alias, column)
}

/// A planned request, ready to compile into SQL.
pub struct PlannedQuery<'a> {
    table: &'a TableDefinition,
    request: RequestParams,
    base: Query,
    cache: crate::table::CacheSettings,
    plan: Plan,
}

impl<'a> PlannedQuery<'a> {
    pub fn plan(&self) -> &Plan {
        &self.plan
    }

    pub fn table(&self) -> &TableDefinition {
        self.table
    }

    pub fn request(&self) -> &RequestParams {
        &self.request
    }

    pub fn use_query_cache(&mut self, enabled: bool) -> &mut Self {
        self.cache.use_query_cache = enabled;
        self
    }

    pub fn use_count_query_cache(&mut self, enabled: bool) -> &mut Self {
        self.cache.use_count_query_cache = enabled;
        self
    }

    pub fn use_result_cache(&mut self, cache: ResultCache) -> &mut Self {
        self.cache.use_result_cache = cache;
        self
    }

    pub fn use_count_result_cache(&mut self, cache: ResultCache) -> &mut Self {
        self.cache.use_count_result_cache = cache;
        self
    }

    /// Page query: selections, joins, both search groups, ordering and the
    /// page window.
    #[instrument(level = "debug", skip(self), fields(table = %self.table.name()))]
    pub fn compile_filtered_query(&self) -> Result<CompiledQuery> {
        let paging = self.table.features.paging_enabled();
        if !paging && self.table.ajax.pipeline > 0 {
            return Err(TabulaError::config(format!(
                "table `{}` pipelines {} pages but paging is disabled",
                self.table.name(),
                self.table.ajax.pipeline
            )));
        }

        let mut query = self.with_joins(self.base.clone())?;
        for selector in self.selectors() {
            query = query.add_select(selector);
        }
        query = self.with_search(query);

        for param in &self.request.order {
            let orderable = self.request.columns.get(param.column).is_some_and(|c| c.orderable);
            let Some(slot) = self.plan.order.get(param.column) else { continue };
            if !orderable {
                continue;
            }
            for field in slot.fields() {
                query = query.order_by(field.clone(), param.dir);
            }
        }

        if paging {
            if let Some((offset, limit)) = self.request.page_window() {
                query = query.offset(offset).limit(limit);
            }
        }

        let (sql, binds) = query.to_sql().map_err(to_config)?;
        debug!(binds = binds.len(), "page query compiled");
        Ok(CompiledQuery::new(
            sql,
            binds,
            CacheOptions {
                use_query_cache: self.cache.use_query_cache,
                result_cache: self.cache.use_result_cache.clone(),
            },
        ))
    }

    /// Number of root rows before any search.
    #[instrument(level = "debug", skip(self), fields(table = %self.table.name()))]
    pub fn compile_count_query(&self) -> Result<CountQuery> {
        self.count(false)
    }

    /// Number of root rows matching both search groups.
    #[instrument(level = "debug", skip(self), fields(table = %self.table.name()))]
    pub fn compile_filtered_count_query(&self) -> Result<CountQuery> {
        self.count(true)
    }

    fn count(&self, filtered: bool) -> Result<CountQuery> {
        let root = self.table.registry().metadata()?;
        let mut query = self
            .with_joins(self.base.clone())?
            .with_selectors(vec![Selector::count_distinct(
                &self.plan.root_alias,
                root.column_for(&self.plan.root_identifier),
            )])
            .reset_order_by();
        if filtered {
            query = self.with_search(query);
        }

        let strategy = if query.has_group_by() {
            CountStrategy::MaterializedRows
        } else {
            CountStrategy::Scalar
        };
        // a cache id names the total; the filtered count is keyed by its SQL and values
        let mut result_cache = self.cache.use_count_result_cache.clone();
        if filtered {
            result_cache.cache_id = None;
        }
        let (sql, binds) = query.to_sql().map_err(to_config)?;
        Ok(CountQuery {
            query: CompiledQuery::new(
                sql,
                binds,
                CacheOptions { use_query_cache: self.cache.use_count_query_cache, result_cache },
            ),
            strategy,
        })
    }

    fn selectors(&self) -> Vec<Selector> {
        let schema = self.table.registry().schema();
        let mut out = Vec::new();
        for entry in self.plan.select.entries() {
            match entry {
                SelectEntry::Partial { alias, fields } => {
                    let meta = self.plan.entity_of(alias).and_then(|e| schema.entity(e).ok());
                    for field in fields {
                        let column = meta.map(|m| m.column_for(field)).unwrap_or(field);
                        out.push(
                            Selector::new(column)
                                .set_source(alias)
                                .set_alias(&label(alias, field)),
                        );
                    }
                }
                SelectEntry::Raw { expr, alias } => out.push(Selector::expression(expr, alias)),
            }
        }
        out
    }

    /// Joins in plan order; many-to-many hops go through their link table.
    fn with_joins(&self, mut query: Query) -> Result<Query> {
        for entry in self.plan.joins.entries() {
            let assoc = &entry.association;
            query = match &assoc.join_table {
                Some(link) => {
                    let link_alias = entry.link_alias();
                    let on = OnClause::columns(&entry.parent_alias, &assoc.local_column, &link_alias, &link.source_column)
                        .map_err(to_config)?;
                    let query = query
                        .join_on(entry.kind, &link.table, &link_alias, vec![on])
                        .map_err(to_config)?;
                    let on = OnClause::columns(&link_alias, &link.target_column, &entry.alias, &assoc.foreign_column)
                        .map_err(to_config)?;
                    query.join_on(entry.kind, &entry.table, &entry.alias, vec![on]).map_err(to_config)?
                }
                None => {
                    let on = OnClause::columns(&entry.parent_alias, &assoc.local_column, &entry.alias, &assoc.foreign_column)
                        .map_err(to_config)?;
                    query.join_on(entry.kind, &entry.table, &entry.alias, vec![on]).map_err(to_config)?
                }
            };
        }
        Ok(query)
    }

    fn with_search(&self, query: Query) -> Query {
        query.filter(self.global_search()).filter(self.individual_search())
    }

    /// OR group over every searchable column for the global search value.
    fn global_search(&self) -> PredicateGroup {
        let mut acc = PredicateGroup::or();
        let Some(value) = self.request.global_search() else { return acc };
        let options = &self.table.options;
        let fallback = Filter::default();

        for column in self.table.registry().columns() {
            if !column.is_searchable_in(options.search_in_non_visible_columns) {
                continue;
            }
            let filter = column.filter().unwrap_or(&fallback);
            let Some(slot) = self.plan.search.get(column.index()) else { continue };
            for field in slot.fields() {
                let term = SearchTerm::new(field, value, column.field_type());
                acc = filter.build_or_predicate(acc, &term, options.global_search_type, column.index());
            }
        }
        acc
    }

    /// AND group over the per-column search values.
    fn individual_search(&self) -> PredicateGroup {
        let mut acc = PredicateGroup::and();
        let options = &self.table.options;
        if !options.individual_filtering {
            return acc;
        }
        let mut counter = ParameterCounter::default();
        let fallback = Filter::default();

        for column in self.table.registry().columns() {
            if !column.is_searchable_in(options.search_in_non_visible_columns) {
                continue;
            }
            let Some(value) = self.request.column_search(column.index()) else { continue };
            let filter = column.filter().unwrap_or(&fallback);
            let Some(slot) = self.plan.search.get(column.index()) else { continue };
            for field in slot.fields() {
                let term = SearchTerm::new(field, value, column.field_type());
                acc = filter.build_and_predicate(acc, &term, &mut counter);
            }
        }
        acc
    }
}
