//! Bounded-memory streaming over a paginated query.

use gridsql_core::error::ConfigError;
use gridsql_core::{Connection, Error, Result, Row};
use gridsql_query::{Dialect, QuerySpec, RenderMode};

/// Chunked fetch configuration.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Rows per round-trip
    pub batch_size: u64,
    /// Fetch everything in one query instead of paging
    pub unique: bool,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            batch_size: 500,
            unique: false,
        }
    }
}

impl FetchConfig {
    pub fn batch_size(mut self, rows: u64) -> Self {
        self.batch_size = rows;
        self
    }

    pub fn unique(mut self, unique: bool) -> Self {
        self.unique = unique;
        self
    }
}

/// What a [`ChunkedFetcher::stream_all`] call did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchStats {
    /// Queries issued (and consumer calls made)
    pub batches: usize,
    pub rows: u64,
}

/// Re-renders a query with advancing offsets and hands each page to a
/// consumer, so at most one page is held in memory.
#[derive(Debug, Clone)]
pub struct ChunkedFetcher {
    dialect: &'static dyn Dialect,
    config: FetchConfig,
}

impl ChunkedFetcher {
    pub fn new(dialect: &'static dyn Dialect, config: FetchConfig) -> Self {
        Self { dialect, config }
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// Stream every row of `spec` through `consumer`.
    ///
    /// Paging stops after the first batch shorter than the batch size, so a
    /// result that is an exact multiple of it ends with an empty batch. The
    /// spec is cloned; its own limit and offset are ignored. The query needs
    /// a stable ordering for pages not to overlap.
    #[tracing::instrument(level = "debug", skip(self, conn, spec, consumer))]
    pub fn stream_all<C, F>(&self, conn: &C, spec: &QuerySpec, mut consumer: F) -> Result<FetchStats>
    where
        C: Connection + ?Sized,
        F: FnMut(&[Row]) -> Result<()>,
    {
        let mut stats = FetchStats::default();

        if self.config.unique {
            let page = spec.clone().limit(0).offset(0);
            let rows = conn.query(&page.render(self.dialect, RenderMode::FetchRows)?, &[])?;
            stats.batches = 1;
            stats.rows = rows.len() as u64;
            tracing::debug!(rows = rows.len(), "fetched whole result");
            consumer(&rows)?;
            return Ok(stats);
        }

        let batch = self.config.batch_size;
        if batch == 0 {
            return Err(Error::Config(ConfigError {
                message: "batch size must be positive".to_string(),
                source: None,
            }));
        }

        let mut page = spec.clone().limit(batch).offset(0);
        loop {
            let sql = page.render(self.dialect, RenderMode::FetchRows)?;
            let rows = conn.query(&sql, &[])?;
            stats.batches += 1;
            stats.rows += rows.len() as u64;
            tracing::debug!(offset = page.offset, rows = rows.len(), "fetched batch");
            consumer(&rows)?;
            if (rows.len() as u64) < batch {
                return Ok(stats);
            }
            page.offset += batch;
        }
    }

    /// Collect every row. Convenience for results known to be small.
    pub fn fetch_all<C>(&self, conn: &C, spec: &QuerySpec) -> Result<Vec<Row>>
    where
        C: Connection + ?Sized,
    {
        let mut all = Vec::new();
        self.stream_all(conn, spec, |rows| {
            all.extend_from_slice(rows);
            Ok(())
        })?;
        Ok(all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridsql_query::{DialectKind, Filter, Operator, ValueKind};
    use gridsql_sqlite::SqliteConnection;

    fn numbers(n: i64) -> SqliteConnection {
        let conn = SqliteConnection::open_memory().unwrap();
        conn.execute_raw("CREATE TABLE nums (id INTEGER PRIMARY KEY, parity TEXT)")
            .unwrap();
        for i in 1..=n {
            let parity = if i % 2 == 0 { "even" } else { "odd" };
            conn.execute(
                "INSERT INTO nums (id, parity) VALUES (?, ?)",
                &[i.into(), parity.into()],
            )
            .unwrap();
        }
        conn
    }

    fn fetcher(batch: u64) -> ChunkedFetcher {
        ChunkedFetcher::new(
            DialectKind::Sqlite.dialect(),
            FetchConfig::default().batch_size(batch),
        )
    }

    fn ids(rows: &[Row]) -> Vec<i64> {
        rows.iter().map(|r| r.get_named::<i64>("id").unwrap()).collect()
    }

    #[test]
    fn test_exact_multiple_ends_with_empty_batch() {
        let conn = numbers(30);
        let spec = QuerySpec::new("*", "nums").order_by("id");
        let mut sizes = Vec::new();
        let mut seen = Vec::new();
        let stats = fetcher(10)
            .stream_all(&conn, &spec, |rows| {
                sizes.push(rows.len());
                seen.extend(ids(rows));
                Ok(())
            })
            .unwrap();
        assert_eq!(sizes, vec![10, 10, 10, 0]);
        assert_eq!(stats, FetchStats { batches: 4, rows: 30 });
        assert_eq!(seen, (1..=30).collect::<Vec<_>>());
    }

    #[test]
    fn test_short_last_batch_stops() {
        let conn = numbers(25);
        let spec = QuerySpec::new("*", "nums").order_by("id");
        let stats = fetcher(10).stream_all(&conn, &spec, |_| Ok(())).unwrap();
        assert_eq!(stats, FetchStats { batches: 3, rows: 25 });
    }

    #[test]
    fn test_filtered_stream() {
        let conn = numbers(20);
        let mut filter = Filter::new();
        filter
            .add_where("parity", Operator::Equal, "even", ValueKind::String)
            .unwrap();
        filter.add_order_by("id", gridsql_query::SortDirection::Desc);
        let spec = QuerySpec::new("*", "nums").filter(filter).limit(3).offset(7);
        let all = fetcher(4).fetch_all(&conn, &spec).unwrap();
        assert_eq!(ids(&all), vec![20, 18, 16, 14, 12, 10, 8, 6, 4, 2]);
    }

    #[test]
    fn test_unique_mode_single_query() {
        let conn = numbers(12);
        let spec = QuerySpec::new("*", "nums").order_by("id").limit(5);
        let fetcher = ChunkedFetcher::new(
            DialectKind::Sqlite.dialect(),
            FetchConfig::default().batch_size(5).unique(true),
        );
        let mut calls = 0;
        let stats = fetcher
            .stream_all(&conn, &spec, |rows| {
                calls += 1;
                assert_eq!(rows.len(), 12);
                Ok(())
            })
            .unwrap();
        assert_eq!(calls, 1);
        assert_eq!(stats.rows, 12);
    }

    #[test]
    fn test_consumer_error_stops() {
        let conn = numbers(30);
        let spec = QuerySpec::new("*", "nums").order_by("id");
        let mut calls = 0;
        let err = fetcher(10)
            .stream_all(&conn, &spec, |_| {
                calls += 1;
                Err(Error::Custom("disk full".into()))
            })
            .unwrap_err();
        assert!(matches!(err, Error::Custom(_)));
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_zero_batch_is_config_error() {
        let conn = numbers(1);
        let spec = QuerySpec::new("*", "nums");
        let err = fetcher(0).stream_all(&conn, &spec, |_| Ok(())).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
