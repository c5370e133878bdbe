//! End to end migration tests: corpora are written as real TSM files and
//! migrated against a local capture HTTP server standing in for the
//! destination.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use warp::http::StatusCode;
use warp::Filter;

use migrate::migrator::Migrator;
use migrate::options::{DataMigrateOptions, MigrateConfig};
use migrate::stats::GlobalStats;
use migrate_tsdb::engine::tsm1::file_store::tombstone::TombstoneWriter;
use migrate_tsdb::engine::tsm1::file_store::writer::TsmWriter;
use migrate_tsdb::engine::tsm1::series_field_key;
use migrate_tsdb::engine::tsm1::value::{Value, Values};

#[derive(Debug, Clone)]
struct WriteReq {
    db: String,
    precision: String,
    body: String,
}

/// Capture collects every successful /write request and can fail the first
/// N requests with a 500 to exercise the retry path.
#[derive(Clone, Default)]
struct Capture {
    writes: Arc<Mutex<Vec<WriteReq>>>,
    fail_remaining: Arc<AtomicUsize>,
    attempts: Arc<AtomicUsize>,
}

impl Capture {
    fn lines(&self) -> Vec<String> {
        self.writes
            .lock()
            .unwrap()
            .iter()
            .flat_map(|w| w.body.lines().map(str::to_string).collect::<Vec<_>>())
            .collect()
    }

    fn requests(&self) -> Vec<WriteReq> {
        self.writes.lock().unwrap().clone()
    }
}

async fn start_server(capture: Capture) -> SocketAddr {
    let cap = capture.clone();
    let write = warp::path("write")
        .and(warp::post())
        .and(warp::query::<HashMap<String, String>>())
        .and(warp::body::bytes())
        .map(move |q: HashMap<String, String>, body: bytes::Bytes| {
            cap.attempts.fetch_add(1, Ordering::SeqCst);

            if cap.fail_remaining.load(Ordering::SeqCst) > 0 {
                cap.fail_remaining.fetch_sub(1, Ordering::SeqCst);
                return warp::reply::with_status("boom", StatusCode::INTERNAL_SERVER_ERROR);
            }

            cap.writes.lock().unwrap().push(WriteReq {
                db: q.get("db").cloned().unwrap_or_default(),
                precision: q.get("precision").cloned().unwrap_or_default(),
                body: String::from_utf8_lossy(&body).into_owned(),
            });
            warp::reply::with_status("", StatusCode::NO_CONTENT)
        });

    let (addr, server) = warp::serve(write).bind_ephemeral(([127, 0, 0, 1], 0));
    tokio::spawn(server);
    addr
}

fn test_config(addr: SocketAddr, batch_size: usize) -> MigrateConfig {
    DataMigrateOptions {
        out: addr.to_string(),
        database: "db0".to_string(),
        batch_size,
        retry_interval_secs: 0,
        ..Default::default()
    }
    .resolve()
    .unwrap()
}

async fn write_corpus(path: &Path, corpus: Vec<(Vec<u8>, Values)>) {
    let mut corpus = corpus;
    // Index keys must be written in sorted order, like the engine does.
    corpus.sort_by(|a, b| a.0.cmp(&b.0));

    let mut w = TsmWriter::create(path).await.unwrap();
    for (key, values) in &corpus {
        w.write(key, values).await.unwrap();
    }
    w.write_index().await.unwrap();
    w.close().await.unwrap();
}

async fn run_migration(files: Vec<PathBuf>, config: MigrateConfig) -> anyhow::Result<()> {
    let gstat = Arc::new(GlobalStats::default());
    let mut migrator = Migrator::new(Arc::new(config), "db0".to_string(), gstat);
    let result = migrator.migrate_tsm_files(files).await;
    migrator.release();
    result
}

fn basic_corpus() -> Vec<(Vec<u8>, Values)> {
    vec![
        (
            series_field_key(b"floats,k=f", b"f"),
            Values::Float(vec![Value::new(1, 1.5), Value::new(2, 3.0)]),
        ),
        (
            series_field_key(b"ints,k=i", b"i"),
            Values::Integer(vec![Value::new(10, 15), Value::new(20, 30)]),
        ),
        (
            series_field_key(b"bools,k=b", b"b"),
            Values::Boolean(vec![Value::new(100, true), Value::new(200, false)]),
        ),
        (
            series_field_key(b"strings,k=s", b"s"),
            Values::Str(vec![
                Value::new(1000, b"1k".to_vec()),
                Value::new(2000, b"2k".to_vec()),
            ]),
        ),
        (
            series_field_key(b"uints,k=u", b"u"),
            Values::Unsigned(vec![Value::new(3000, 45_u64), Value::new(4000, 60_u64)]),
        ),
    ]
}

/// makes a corpus of float series with one global, increasing timestamp
/// counter starting at 1
fn floats_corpus(num_series: usize, values_per_series: usize) -> Vec<(Vec<u8>, Values)> {
    let mut unix_nano = 1_i64;
    let mut corpus = Vec::with_capacity(num_series);
    for i in 0..num_series {
        let mut values = Vec::with_capacity(values_per_series);
        for _ in 0..values_per_series {
            values.push(Value::new(unix_nano, unix_nano as f64));
            unix_nano += 1;
        }
        let key = series_field_key(format!("m,t={}", i).as_bytes(), b"x");
        corpus.push((key, Values::Float(values)));
    }
    corpus
}

#[tokio::test]
async fn s1_basic_mixed_corpus() {
    let capture = Capture::default();
    let addr = start_server(capture.clone()).await;
    let dir = tempfile::tempdir().unwrap();

    let file = dir.path().join("000000001-000000001.tsm");
    write_corpus(&file, basic_corpus()).await;

    run_migration(vec![file], test_config(addr, 1000))
        .await
        .unwrap();

    let mut lines = capture.lines();
    lines.sort();
    let mut expected = vec![
        "floats,k=f f=1.5 1",
        "floats,k=f f=3 2",
        "ints,k=i i=15i 10",
        "ints,k=i i=30i 20",
        "bools,k=b b=true 100",
        "bools,k=b b=false 200",
        "strings,k=s s=\"1k\" 1000",
        "strings,k=s s=\"2k\" 2000",
        "uints,k=u u=45u 3000",
        "uints,k=u u=60u 4000",
    ];
    expected.sort();
    assert_eq!(lines, expected);

    for req in capture.requests() {
        assert_eq!(req.precision, "ns");
        assert_eq!(req.db, "db0");
    }
}

#[tokio::test]
async fn s2_escape_stress() {
    let capture = Capture::default();
    let addr = start_server(capture.clone()).await;
    let dir = tempfile::tempdir().unwrap();

    // measurement and tag carry escaped commas, spaces and equals signs
    let series = br"mea\,sure\ ment,tag\ key\=1=tag\,value";
    let file = dir.path().join("000000001-000000001.tsm");
    write_corpus(
        &file,
        vec![(
            series_field_key(series, b"field key"),
            Values::Float(vec![Value::new(7, 2.5)]),
        )],
    )
    .await;

    run_migration(vec![file], test_config(addr, 1000))
        .await
        .unwrap();

    let lines = capture.lines();
    assert_eq!(lines.len(), 1);
    // the measurement keeps its wire escapes; the tag and field key are
    // re-escaped on write
    assert_eq!(
        lines[0],
        r"mea\,sure\ ment,tag\ key\=1=tag\,value field\ key=2.5 7"
    );
}

#[tokio::test]
async fn s3_empty_window() {
    let capture = Capture::default();
    let addr = start_server(capture.clone()).await;
    let dir = tempfile::tempdir().unwrap();

    let file = dir.path().join("000000001-000000001.tsm");
    write_corpus(&file, floats_corpus(100, 250)).await;

    let mut config = test_config(addr, 1000);
    config.start_time = 0;
    config.end_time = 0;

    run_migration(vec![file], config).await.unwrap();

    assert!(capture.requests().is_empty(), "no points may be posted");
}

#[tokio::test]
async fn s4_missing_file() {
    let capture = Capture::default();
    let addr = start_server(capture.clone()).await;

    let files = vec![PathBuf::from("file-that-does-not-exist.tsm")];
    run_migration(files, test_config(addr, 1000))
        .await
        .unwrap();

    assert!(capture.requests().is_empty());
}

#[tokio::test]
async fn s5_overlapping_blocks() {
    let capture = Capture::default();
    let addr = start_server(capture.clone()).await;
    let dir = tempfile::tempdir().unwrap();

    let key = series_field_key(b"m,t=1", b"x");

    // Two files whose blocks overlap, with a conflicting value at ts=75.
    let file1 = dir.path().join("000000001-000000001.tsm");
    write_corpus(
        &file1,
        vec![(
            key.clone(),
            Values::Float(vec![
                Value::new(0, 0.0),
                Value::new(75, 1.0),
                Value::new(100, 100.0),
            ]),
        )],
    )
    .await;

    let file2 = dir.path().join("000000002-000000001.tsm");
    write_corpus(
        &file2,
        vec![(
            key.clone(),
            Values::Float(vec![
                Value::new(50, 50.0),
                Value::new(75, 2.0),
                Value::new(150, 150.0),
            ]),
        )],
    )
    .await;

    run_migration(vec![file1, file2], test_config(addr, 1000))
        .await
        .unwrap();

    let lines = capture.lines();
    let at_75: Vec<&String> = lines.iter().filter(|l| l.ends_with(" 75")).collect();
    assert_eq!(at_75.len(), 1, "exactly one value at ts=75: {:?}", lines);
    // the later-read overlapping block wins the conflict
    assert_eq!(at_75[0].as_str(), "m,t=1 x=2 75");

    let mut timestamps: Vec<i64> = lines
        .iter()
        .map(|l| l.rsplit(' ').next().unwrap().parse().unwrap())
        .collect();
    timestamps.sort();
    assert_eq!(timestamps, vec![0, 50, 75, 100, 150]);
}

#[tokio::test]
async fn s6_tombstone_endpoints() {
    let capture = Capture::default();
    let addr = start_server(capture.clone()).await;
    let dir = tempfile::tempdir().unwrap();

    let key = series_field_key(b"m,t=1", b"x");
    let file = dir.path().join("000000001-000000001.tsm");
    write_corpus(
        &file,
        vec![(
            key.clone(),
            Values::Float(vec![
                Value::new(10, 10.0),
                Value::new(30, 30.0),
                Value::new(50, 50.0),
                Value::new(60, 60.0),
            ]),
        )],
    )
    .await;

    let mut tw = TombstoneWriter::new(&file);
    tw.add_range(&[key.as_slice()], 10, 50);
    tw.flush().await.unwrap();

    run_migration(vec![file], test_config(addr, 1000))
        .await
        .unwrap();

    // strict-open endpoints: 30 is deleted, the boundary values survive
    let mut timestamps: Vec<i64> = capture
        .lines()
        .iter()
        .map(|l| l.rsplit(' ').next().unwrap().parse().unwrap())
        .collect();
    timestamps.sort();
    assert_eq!(timestamps, vec![10, 50, 60]);
}

#[tokio::test]
async fn batches_are_capped() {
    let capture = Capture::default();
    let addr = start_server(capture.clone()).await;
    let dir = tempfile::tempdir().unwrap();

    let file = dir.path().join("000000001-000000001.tsm");
    write_corpus(&file, floats_corpus(1, 25)).await;

    run_migration(vec![file], test_config(addr, 10))
        .await
        .unwrap();

    let sizes: Vec<usize> = capture
        .requests()
        .iter()
        .map(|r| r.body.lines().count())
        .collect();
    assert_eq!(sizes, vec![10, 10, 5]);
}

#[tokio::test]
async fn window_bounds_are_inclusive() {
    let capture = Capture::default();
    let addr = start_server(capture.clone()).await;
    let dir = tempfile::tempdir().unwrap();

    let key = series_field_key(b"m,t=1", b"x");
    let values: Vec<Value<f64>> = (0..=20).map(|i| Value::new(i, i as f64)).collect();
    let file = dir.path().join("000000001-000000001.tsm");
    write_corpus(&file, vec![(key, Values::Float(values))]).await;

    let mut config = test_config(addr, 1000);
    config.start_time = 5;
    config.end_time = 15;

    run_migration(vec![file], config).await.unwrap();

    let mut timestamps: Vec<i64> = capture
        .lines()
        .iter()
        .map(|l| l.rsplit(' ').next().unwrap().parse().unwrap())
        .collect();
    timestamps.sort();
    assert_eq!(timestamps, (5..=15).collect::<Vec<i64>>());
}

#[tokio::test]
async fn multi_field_points_are_merged() {
    let capture = Capture::default();
    let addr = start_server(capture.clone()).await;
    let dir = tempfile::tempdir().unwrap();

    let file = dir.path().join("000000001-000000001.tsm");
    write_corpus(
        &file,
        vec![
            (
                series_field_key(b"m,t=1", b"a"),
                Values::Float(vec![Value::new(1, 1.5), Value::new(2, 2.5)]),
            ),
            (
                series_field_key(b"m,t=1", b"b"),
                Values::Integer(vec![Value::new(1, 10), Value::new(3, 30)]),
            ),
        ],
    )
    .await;

    run_migration(vec![file], test_config(addr, 1000))
        .await
        .unwrap();

    let mut lines = capture.lines();
    lines.sort();
    assert_eq!(
        lines,
        vec![
            "m,t=1 a=1.5,b=10i 1".to_string(),
            "m,t=1 a=2.5 2".to_string(),
            "m,t=1 b=30i 3".to_string(),
        ]
    );
}

#[tokio::test]
async fn transient_errors_are_retried() {
    let capture = Capture::default();
    capture.fail_remaining.store(2, Ordering::SeqCst);
    let addr = start_server(capture.clone()).await;
    let dir = tempfile::tempdir().unwrap();

    let file = dir.path().join("000000001-000000001.tsm");
    write_corpus(&file, basic_corpus()).await;

    run_migration(vec![file], test_config(addr, 1000))
        .await
        .unwrap();

    // two attempts failed but every point still arrived exactly once
    assert_eq!(capture.lines().len(), 10);
    assert!(capture.attempts.load(Ordering::SeqCst) >= 7);
}

#[tokio::test]
async fn bounded_retries_give_up() {
    let capture = Capture::default();
    capture.fail_remaining.store(usize::MAX, Ordering::SeqCst);
    let addr = start_server(capture.clone()).await;
    let dir = tempfile::tempdir().unwrap();

    let file = dir.path().join("000000001-000000001.tsm");
    write_corpus(&file, floats_corpus(1, 2)).await;

    let mut config = test_config(addr, 1000);
    config.max_write_retries = 3;

    let err = run_migration(vec![file], config).await.unwrap_err();
    assert!(err.to_string().contains("3 attempts"), "{}", err);
}

#[tokio::test]
async fn timestamps_are_strictly_increasing_per_series() {
    let capture = Capture::default();
    let addr = start_server(capture.clone()).await;
    let dir = tempfile::tempdir().unwrap();

    // Overlapping files force merge rounds; the posted order per series
    // must still be strictly ascending.
    let key = series_field_key(b"m,t=1", b"x");
    let file1 = dir.path().join("000000001-000000001.tsm");
    let values: Vec<Value<f64>> = (0..100).map(|i| Value::new(i, i as f64)).collect();
    write_corpus(&file1, vec![(key.clone(), Values::Float(values))]).await;

    let file2 = dir.path().join("000000002-000000001.tsm");
    let values: Vec<Value<f64>> = (50..200).map(|i| Value::new(i, (i * 2) as f64)).collect();
    write_corpus(&file2, vec![(key.clone(), Values::Float(values))]).await;

    run_migration(vec![file1, file2], test_config(addr, 17))
        .await
        .unwrap();

    let timestamps: Vec<i64> = capture
        .lines()
        .iter()
        .map(|l| l.rsplit(' ').next().unwrap().parse().unwrap())
        .collect();
    assert_eq!(timestamps, (0..200).collect::<Vec<i64>>());
}
