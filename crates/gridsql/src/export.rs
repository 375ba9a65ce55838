//! JSON-lines export over the chunked fetcher.

use std::io::Write;

use gridsql_core::Result;
use gridsql_pool::ConnectionProducer;
use gridsql_query::{Dialect, QuerySpec};
use gridsql_session::{ChunkedFetcher, FetchConfig, TransactionAgent};

/// Write every row of `spec` to `writer` as one JSON object per line.
///
/// Rows are fetched page by page inside a read-only run of `agent`, so only
/// one page is in memory at a time. Returns the number of rows written.
#[tracing::instrument(level = "debug", skip(agent, dialect, spec, writer))]
pub fn export_json_lines<P, W>(
    agent: &TransactionAgent<P>,
    dialect: &'static dyn Dialect,
    spec: &QuerySpec,
    config: FetchConfig,
    writer: &mut W,
) -> Result<u64>
where
    P: ConnectionProducer,
    W: Write + ?Sized,
{
    let fetcher = ChunkedFetcher::new(dialect, config);
    let stats = agent.execute_return_read_only(|conn| {
        fetcher.stream_all(conn, spec, |rows| {
            for row in rows {
                serde_json::to_writer(&mut *writer, &row.to_json_object())?;
                writer.write_all(b"\n")?;
            }
            Ok(())
        })
    })?;
    writer.flush()?;
    tracing::debug!(rows = stats.rows, batches = stats.batches, "export finished");
    Ok(stats.rows)
}
