//! Query specifications and their rendering to SQL text.

use gridsql_core::{Error, Result};
use serde::{Deserialize, Serialize};

use crate::dialect::Dialect;
use crate::filter::Filter;
use crate::resolve::{MacroResolver, RowAccessor};

/// Alias given to the base query when it is wrapped as a subselect.
const SUBSELECT_ALIAS: &str = "FOO";

/// What a rendered query is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderMode {
    /// Rows of one page: ordering, filter wrapper and pagination.
    FetchRows,
    /// Number of matching rows; ordering and pagination are dropped.
    CountOnly,
    /// At most one row, for existence checks; ordering and pagination are dropped.
    SingleRow,
}

/// The clauses of one query before rendering.
///
/// Fields are plain text except for `filter`, which is layered over the
/// base query as an outer subselect, and `parameters`, which is merged
/// into the base WHERE clause.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuerySpec {
    pub select: String,
    pub from: String,
    pub where_clause: String,
    pub order_by: String,
    pub group_by: String,
    pub having: String,
    /// Page size; `0` means unbounded.
    pub limit: u64,
    pub offset: u64,
    pub ignore_case: bool,
    pub distinct: bool,
    /// Table targeted by INSERT/UPDATE/DELETE; `from` when empty.
    pub delete_from: String,
    pub filter: Option<Filter>,
    pub parameters: Option<Filter>,
}

fn present(s: &str) -> Option<&str> {
    let s = s.trim();
    if s.is_empty() { None } else { Some(s) }
}

impl QuerySpec {
    pub fn new(select: impl Into<String>, from: impl Into<String>) -> Self {
        Self {
            select: select.into(),
            from: from.into(),
            ..Self::default()
        }
    }

    pub fn where_clause(mut self, clause: impl Into<String>) -> Self {
        self.where_clause = clause.into();
        self
    }

    pub fn order_by(mut self, order_by: impl Into<String>) -> Self {
        self.order_by = order_by.into();
        self
    }

    pub fn group_by(mut self, group_by: impl Into<String>) -> Self {
        self.group_by = group_by.into();
        self
    }

    pub fn having(mut self, having: impl Into<String>) -> Self {
        self.having = having.into();
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = limit;
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }

    pub fn ignore_case(mut self, ignore_case: bool) -> Self {
        self.ignore_case = ignore_case;
        self
    }

    pub fn distinct(mut self, distinct: bool) -> Self {
        self.distinct = distinct;
        self
    }

    pub fn delete_from(mut self, table: impl Into<String>) -> Self {
        self.delete_from = table.into();
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn parameters(mut self, parameters: Filter) -> Self {
        self.parameters = Some(parameters);
        self
    }

    /// AND another condition onto the base WHERE clause.
    pub fn add_where(&mut self, clause: &str) -> &mut Self {
        let clause = clause.trim();
        if !clause.is_empty() {
            self.where_clause = match present(&self.where_clause) {
                Some(w) => format!("({w}) AND ({clause})"),
                None => clause.to_string(),
            };
        }
        self
    }

    /// Append a term to the base ORDER BY list.
    pub fn add_order_by(&mut self, term: &str) -> &mut Self {
        let term = term.trim();
        if !term.is_empty() {
            self.order_by = match present(&self.order_by) {
                Some(o) => format!("{o},{term}"),
                None => term.to_string(),
            };
        }
        self
    }

    /// Append an expression to the select list.
    pub fn add_select(&mut self, expr: &str) -> &mut Self {
        let expr = expr.trim();
        if !expr.is_empty() {
            self.select = match present(&self.select) {
                Some(s) => format!("{s},{expr}"),
                None => expr.to_string(),
            };
        }
        self
    }

    /// Whether the filter contributes an outer subselect.
    pub fn has_filter(&self) -> bool {
        self.filter
            .as_ref()
            .is_some_and(|f| f.has_where() || f.has_order_by())
    }

    fn filter_has_order_by(&self) -> bool {
        self.filter.as_ref().is_some_and(Filter::has_order_by)
    }

    fn target(&self) -> Result<&str> {
        present(&self.delete_from)
            .or_else(|| present(&self.from))
            .ok_or_else(|| Error::unsupported("query has no target table"))
    }

    /// Render the base query, without the filter wrapper or pagination.
    ///
    /// The base ORDER BY is only emitted when `use_order_by` is set and the
    /// filter brings no ordering of its own.
    pub fn render_base(&self, dialect: &dyn Dialect, use_order_by: bool) -> Result<String> {
        let select = present(&self.select)
            .ok_or_else(|| Error::unsupported("query has no select list"))?;
        let from =
            present(&self.from).ok_or_else(|| Error::unsupported("query has no FROM clause"))?;

        let mut sql = if self.distinct {
            format!("SELECT DISTINCT {select} FROM {from}")
        } else {
            format!("SELECT {select} FROM {from}")
        };

        let params = match &self.parameters {
            Some(p) => p.render_where(dialect, self.ignore_case)?,
            None => None,
        };
        match (present(&self.where_clause), params) {
            (Some(w), Some(p)) => sql.push_str(&format!(" WHERE ({w}) AND {p}")),
            (Some(w), None) => sql.push_str(&format!(" WHERE {w}")),
            (None, Some(p)) => sql.push_str(&format!(" WHERE {p}")),
            (None, None) => {}
        }

        if let Some(group_by) = present(&self.group_by) {
            sql.push_str(&format!(" GROUP BY {group_by}"));
        }
        if let Some(having) = present(&self.having) {
            sql.push_str(&format!(" HAVING {having}"));
        }
        if use_order_by && !self.filter_has_order_by() {
            if let Some(order_by) = present(&self.order_by) {
                sql.push_str(&format!(" ORDER BY {order_by}"));
            }
        }
        Ok(sql)
    }

    /// Render the query for the given purpose.
    pub fn render(&self, dialect: &dyn Dialect, mode: RenderMode) -> Result<String> {
        let sql = match mode {
            RenderMode::FetchRows => {
                let wrapped = self.has_filter();
                let inner_order = !wrapped || dialect.orders_derived_tables();
                let mut sql = self.render_base(dialect, inner_order)?;
                let mut ordered = !wrapped && present(&self.order_by).is_some();
                if let Some(filter) = self.filter.as_ref().filter(|_| wrapped) {
                    sql = format!("SELECT * FROM {}", dialect.derived_table(&sql, SUBSELECT_ALIAS));
                    if let Some(w) = filter.render_where(dialect, self.ignore_case)? {
                        sql.push_str(&format!(" WHERE {w}"));
                    }
                    // without ordered derived tables the base ordering moves out
                    let outer = filter.render_order_by().or_else(|| {
                        present(&self.order_by)
                            .filter(|_| !inner_order)
                            .map(str::to_owned)
                    });
                    if let Some(o) = outer {
                        sql.push_str(&format!(" ORDER BY {o}"));
                        ordered = true;
                    }
                }
                if self.limit != 0 {
                    sql = dialect.paginate(&sql, self.offset, self.limit, ordered);
                }
                sql
            }
            RenderMode::CountOnly => match &self.filter {
                Some(filter) => self.render_count_with(dialect, filter)?,
                None => self.render_count(dialect)?,
            },
            RenderMode::SingleRow => {
                let mut sql = self.render_base(dialect, false)?;
                if let Some(filter) = self.filter.as_ref() {
                    if let Some(w) = filter.render_where(dialect, self.ignore_case)? {
                        sql = format!(
                            "SELECT * FROM {} WHERE {w}",
                            dialect.derived_table(&sql, SUBSELECT_ALIAS)
                        );
                    }
                }
                dialect.limit_to_one(&sql)
            }
        };
        tracing::trace!(sql = %sql, mode = ?mode, dialect = dialect.name(), "Rendered query");
        Ok(sql)
    }

    /// Count of the unfiltered base query.
    pub fn render_count(&self, dialect: &dyn Dialect) -> Result<String> {
        Ok(dialect.count_query(&self.render_base(dialect, false)?))
    }

    /// Count of the base query restricted by `filter`.
    pub fn render_count_with(&self, dialect: &dyn Dialect, filter: &Filter) -> Result<String> {
        let mut sql = self.render_count(dialect)?;
        if let Some(w) = filter.render_where(dialect, self.ignore_case)? {
            sql.push_str(&format!(" WHERE {w}"));
        }
        Ok(sql)
    }

    /// The base query as a derived table, `(base) AS foo` in most dialects.
    pub fn render_view(&self, dialect: &dyn Dialect) -> Result<String> {
        Ok(dialect.derived_table(&self.render_base(dialect, false)?, dialect.view_alias()))
    }

    /// Render a page using the select list, WHERE and ORDER BY of `filter`
    /// in place of the spec's own.
    pub fn render_select_with(&self, dialect: &dyn Dialect, filter: &Filter) -> Result<String> {
        let mut spec = self.clone();
        if let Some(select) = filter.render_select() {
            spec.select = select;
        }
        spec.where_clause = filter
            .render_where(dialect, self.ignore_case)?
            .unwrap_or_default();
        spec.order_by = filter.render_order_by().unwrap_or_default();
        spec.filter = None;
        spec.render(dialect, RenderMode::FetchRows)
    }

    /// `INSERT INTO target(fields) VALUES (values)` from the filter's inserts.
    pub fn render_insert(&self, dialect: &dyn Dialect, filter: &Filter) -> Result<String> {
        let (fields, values) = filter
            .render_insert(dialect)?
            .ok_or_else(|| Error::unsupported("insert without values"))?;
        Ok(format!(
            "INSERT INTO {}({fields}) VALUES ({values})",
            self.target()?
        ))
    }

    /// `UPDATE target SET ..` from the filter's updates, restricted by its WHERE.
    pub fn render_update(&self, dialect: &dyn Dialect, filter: &Filter) -> Result<String> {
        let sets = filter
            .render_update(dialect)?
            .ok_or_else(|| Error::unsupported("update without assignments"))?;
        let target = self.target()?;
        Ok(match filter.render_where(dialect, self.ignore_case)? {
            Some(w) => format!("UPDATE {target} SET {sets} WHERE {w}"),
            None => format!("UPDATE {target} SET {sets}"),
        })
    }

    /// `UPDATE target SET sets`, restricted by the spec's own WHERE clause.
    pub fn render_update_raw(&self, sets: &str) -> Result<String> {
        let target = self.target()?;
        Ok(match present(&self.where_clause) {
            Some(w) => format!("UPDATE {target} SET {sets} WHERE {w}"),
            None => format!("UPDATE {target} SET {sets}"),
        })
    }

    /// `DELETE FROM target` restricted by the filter's WHERE.
    pub fn render_delete(&self, dialect: &dyn Dialect, filter: &Filter) -> Result<String> {
        let target = self.target()?;
        Ok(match filter.render_where(dialect, self.ignore_case)? {
            Some(w) => format!("DELETE FROM {target} WHERE {w}"),
            None => format!("DELETE FROM {target}"),
        })
    }

    /// `DELETE FROM target` restricted by the spec's own WHERE clause.
    pub fn render_delete_raw(&self) -> Result<String> {
        let target = self.target()?;
        Ok(match present(&self.where_clause) {
            Some(w) => format!("DELETE FROM {target} WHERE {w}"),
            None => format!("DELETE FROM {target}"),
        })
    }

    /// A literal copy of this spec with every `#`/`@` macro resolved.
    pub fn resolve_macros(
        &self,
        resolver: &MacroResolver,
        row: &dyn RowAccessor,
    ) -> Result<QuerySpec> {
        let mut out = self.clone();
        for text in [
            &mut out.select,
            &mut out.from,
            &mut out.where_clause,
            &mut out.order_by,
            &mut out.group_by,
            &mut out.having,
        ] {
            *text = resolver.resolve_text(text, row)?;
        }
        if let Some(filter) = &self.filter {
            out.filter = Some(resolver.resolve_filter(filter, row)?);
        }
        if let Some(parameters) = &self.parameters {
            out.parameters = Some(resolver.resolve_filter(parameters, row)?);
        }
        Ok(out)
    }
}
