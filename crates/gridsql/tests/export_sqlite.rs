use std::sync::Arc;

use gridsql::prelude::*;
use gridsql::{FetchStats, ThreadRegistry};
use gridsql_sqlite::SqliteConnection;

const BATCH: u64 = 7;

fn agent_with_rows(
    n: i64,
) -> TransactionAgent<SingleConnectionProducer<SqliteConnection, fn() -> Result<SqliteConnection>>>
{
    let producer = SingleConnectionProducer::new(
        SingleConnectionConfig::default(),
        SqliteConnection::open_memory as fn() -> Result<SqliteConnection>,
    );
    let agent =
        TransactionAgent::new(Arc::new(producer)).with_registry(Arc::new(ThreadRegistry::new()));
    agent
        .execute(|conn, _| {
            conn.execute_raw("CREATE TABLE orders (id INTEGER PRIMARY KEY, customer TEXT, total REAL)")?;
            for i in 1..=n {
                let customer = if i % 3 == 0 { "acme" } else { "globex" };
                conn.execute(
                    "INSERT INTO orders (id, customer, total) VALUES (?, ?, ?)",
                    &[i.into(), customer.into(), Value::Double(i as f64 * 1.5)],
                )?;
            }
            Ok(())
        })
        .expect("seed orders");
    agent
}

#[test]
fn stream_of_exact_multiple_calls_consumer_one_extra_time() {
    let agent = agent_with_rows(3 * BATCH as i64);
    let spec = QuerySpec::new("id, customer", "orders").order_by("id");
    let fetcher = ChunkedFetcher::new(
        DialectKind::Sqlite.dialect(),
        FetchConfig::default().batch_size(BATCH),
    );

    let mut calls = 0;
    let mut ids = Vec::new();
    let stats = agent
        .execute_return_read_only(|conn| {
            fetcher.stream_all(conn, &spec, |rows| {
                calls += 1;
                for row in rows {
                    ids.push(row.get_named::<i64>("id")?);
                }
                Ok(())
            })
        })
        .expect("stream");

    assert!(calls >= 4);
    assert_eq!(stats, FetchStats { batches: 4, rows: 3 * BATCH });
    assert_eq!(ids, (1..=3 * BATCH as i64).collect::<Vec<_>>());
}

#[test]
fn export_writes_one_json_object_per_row() {
    let agent = agent_with_rows(20);
    let mut filter = Filter::new();
    filter
        .add_where("customer", Operator::Equal, "ACME", ValueKind::String)
        .expect("predicate");
    filter.add_order_by("id", SortDirection::Asc);
    let spec = QuerySpec::new("*", "orders").filter(filter).ignore_case(true);

    let mut out = Vec::new();
    let written = export_json_lines(
        &agent,
        DialectKind::Sqlite.dialect(),
        &spec,
        FetchConfig::default().batch_size(4),
        &mut out,
    )
    .expect("export");
    assert_eq!(written, 6);

    let text = String::from_utf8(out).expect("utf-8");
    let lines: Vec<serde_json::Value> = text
        .lines()
        .map(|l| serde_json::from_str(l).expect("json line"))
        .collect();
    assert_eq!(lines.len(), 6);
    assert_eq!(lines[0]["id"], 3);
    assert_eq!(lines[0]["customer"], "acme");
    assert_eq!(lines[5]["id"], 18);
}

#[test]
fn export_leaves_connection_writable() {
    let agent = agent_with_rows(3);
    let spec = QuerySpec::new("*", "orders").order_by("id");
    let mut out = Vec::new();
    export_json_lines(
        &agent,
        DialectKind::Sqlite.dialect(),
        &spec,
        FetchConfig::default().unique(true),
        &mut out,
    )
    .expect("export");
    assert_eq!(out.iter().filter(|&&b| b == b'\n').count(), 3);

    agent
        .execute(|conn, _| {
            conn.execute("DELETE FROM orders", &[])?;
            Ok(())
        })
        .expect("write after export");
}
