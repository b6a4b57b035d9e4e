//! Component wiring tests: monitor, dispatcher and agents assembled by hand,
//! plus the HTTP transport and the JSON-lines store end to end.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use turbine_fleet::config::{FleetConfig, TransportKind};
use turbine_fleet::ingest::{ingestion_queue, QueueSink, TelemetryError, TelemetrySink};
use turbine_fleet::repair::repair_dispatcher;
use turbine_fleet::storage::{InMemoryMetricStore, JsonlMetricStore, MetricStore};
use turbine_fleet::{
    CentralMonitor, EngineerPool, Fleet, MetricRecord, OperationalStatus, RepairBoard, RetryPolicy,
    TurbineAgent, TurbineError, TurbineSpec,
};

/// Sink whose monitor always answers 503.
struct UnreachableMonitor;

#[async_trait]
impl TelemetrySink for UnreachableMonitor {
    async fn send(&self, _record: &MetricRecord) -> Result<(), TelemetryError> {
        Err(TelemetryError::ServerError(reqwest::StatusCode::SERVICE_UNAVAILABLE))
    }

    fn sink_name(&self) -> &str {
        "unreachable"
    }
}

#[tokio::test(start_paused = true)]
async fn test_telemetry_failure_halts_only_that_turbine() {
    let (tx, rx) = ingestion_queue();
    let store = Arc::new(InMemoryMetricStore::new());
    let pool = EngineerPool::new(1);
    let board = RepairBoard::new();
    let (dispatcher, worker) = repair_dispatcher(pool.clone(), board.clone());
    let cancel = CancellationToken::new();
    let retry = RetryPolicy::new(3, Duration::from_millis(100), Duration::from_secs(1));

    let mut turbines = JoinSet::new();
    let healthy = TurbineAgent::new(
        TurbineSpec::new(1, 1.0, 100.0, 1.0),
        Arc::new(QueueSink::new(tx)),
        board.clone(),
        retry,
    );
    let cut_off = TurbineAgent::new(
        TurbineSpec::new(2, 1.0, 100.0, 1.0),
        Arc::new(UnreachableMonitor),
        board.clone(),
        retry,
    );
    turbines.spawn(healthy.run(cancel.clone()));
    let failed = tokio::spawn(cut_off.run(cancel.clone()));

    tokio::spawn(worker.run(cancel.clone()));
    let monitor = tokio::spawn(
        CentralMonitor::new(rx, Arc::clone(&store) as Arc<dyn MetricStore>, dispatcher, retry)
            .run(cancel.clone()),
    );

    match failed.await.unwrap() {
        Err(TurbineError::TelemetryExhausted(e)) => assert_eq!(e.attempts, 3),
        other => panic!("expected telemetry exhaustion, got {other:?}"),
    }

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(store.records(1).len() >= 5);
    assert!(store.records(2).is_empty());
    assert!(!monitor.is_finished());

    cancel.cancel();
    while let Some(res) = turbines.join_next().await {
        res.unwrap().unwrap();
    }
    monitor.await.unwrap().unwrap();
    pool.check_quiescent().unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_monitor_drives_full_repair_cycle() {
    let (tx, rx) = ingestion_queue();
    let pool = EngineerPool::new(1);
    let board = RepairBoard::new();
    let (dispatcher, worker) = repair_dispatcher(pool.clone(), board.clone());
    let stats = dispatcher.stats();
    let cancel = CancellationToken::new();

    let agent = TurbineAgent::new(
        TurbineSpec::new(3, 0.7, 1.0, 3.0),
        Arc::new(QueueSink::new(tx)),
        board,
        RetryPolicy::no_retry(),
    );
    let handle = agent.handle();

    tokio::spawn(worker.run(cancel.clone()));
    tokio::spawn(agent.run(cancel.clone()));
    let monitor = tokio::spawn(
        CentralMonitor::new(rx, InMemoryMetricStore::new(), dispatcher, RetryPolicy::no_retry())
            .run(cancel.clone()),
    );

    // Breaks at 1.4s, engineer assigned at once, repaired at 4.4s.
    tokio::time::sleep(Duration::from_millis(4300)).await;
    assert_eq!(handle.snapshot().await.status, OperationalStatus::Broken);
    assert_eq!(pool.available(), 0);

    tokio::time::sleep(Duration::from_millis(200)).await;
    let state = handle.snapshot().await;
    assert_eq!(state.status, OperationalStatus::Ok);
    assert!(state.elapsed_secs.abs() < f64::EPSILON);
    assert_eq!(pool.available(), 1);
    assert_eq!(stats.completed(), 1);

    cancel.cancel();
    let report = monitor.await.unwrap().unwrap();
    assert_eq!(report.dispatches, 1);
    assert_eq!(report.repairs_completed, 1);
}

#[tokio::test(start_paused = true)]
async fn test_stray_broken_record_for_running_turbine() {
    let (tx, rx) = ingestion_queue();
    let injector = tx.clone();
    let pool = EngineerPool::new(1);
    let board = RepairBoard::new();
    let (dispatcher, worker) = repair_dispatcher(pool.clone(), board.clone());
    let stats = dispatcher.stats();
    let cancel = CancellationToken::new();

    let agent = TurbineAgent::new(
        TurbineSpec::new(1, 1.0, 5.0, 1.2),
        Arc::new(QueueSink::new(tx)),
        board,
        RetryPolicy::no_retry(),
    );
    let handle = agent.handle();

    tokio::spawn(worker.run(cancel.clone()));
    tokio::spawn(agent.run(cancel.clone()));
    let monitor = tokio::spawn(
        CentralMonitor::new(rx, InMemoryMetricStore::new(), dispatcher, RetryPolicy::no_retry())
            .run(cancel.clone()),
    );

    // A broken record for turbine 1 arrives from outside while it runs.
    tokio::time::sleep(Duration::from_millis(500)).await;
    injector
        .send(MetricRecord {
            turbine_id: 1,
            wind_speed: 12.0,
            power_output_kwh: 800.0,
            status: OperationalStatus::Broken,
            timestamp: 0.0,
        })
        .unwrap();

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(handle.snapshot().await.status, OperationalStatus::Ok);
    assert_eq!(pool.available(), 1);

    // Real breakdown at 5s is dispatched and repaired by 6.2s.
    tokio::time::sleep(Duration::from_secs(5)).await;
    let state = handle.snapshot().await;
    assert_eq!(state.status, OperationalStatus::Ok);
    assert_eq!(stats.completed(), 1);
    assert_eq!(pool.available(), 1);
    assert!(!monitor.is_finished());

    cancel.cancel();
    let report = monitor.await.unwrap().unwrap();
    assert_eq!(report.unconfirmed_breakdowns, 1);
    assert_eq!(report.dispatches, 1);
    pool.check_quiescent().unwrap();
}

#[tokio::test]
async fn test_http_transport_end_to_end() {
    // Reserve a free port for the ingestion server.
    let port = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();

    let mut config = FleetConfig::default();
    config.telemetry.transport = TransportKind::Http;
    config.telemetry.bind_addr = format!("127.0.0.1:{port}");
    config.telemetry.monitor_url = format!("http://127.0.0.1:{port}");
    config.fleet.engineer_count = 2;

    let store = Arc::new(InMemoryMetricStore::new());
    let fleet = Fleet::new(config, Arc::clone(&store) as Arc<dyn MetricStore>).with_turbines(vec![
        TurbineSpec::new(1, 0.1, 0.2, 0.1),
        TurbineSpec::new(2, 0.1, 0.2, 0.1),
    ]);

    let cancel = CancellationToken::new();
    let task = tokio::spawn(fleet.run(cancel.clone()));
    tokio::time::sleep(Duration::from_millis(1500)).await;
    cancel.cancel();
    let report = task.await.unwrap().unwrap();

    assert!(report.records_ingested >= 4);
    assert!(!store.records(1).is_empty());
    assert!(!store.records(2).is_empty());
    assert!(report.total_dispatches() >= 1);
    assert!(report.failed_turbines.is_empty());
}

#[tokio::test]
async fn test_jsonl_store_end_to_end() {
    let tmp = tempfile::tempdir().unwrap();
    let store = JsonlMetricStore::open(tmp.path().join("metrics_data")).unwrap();

    let mut config = FleetConfig::default();
    config.fleet.engineer_count = 1;
    let fleet = Fleet::new(config, Arc::new(store.clone())).with_turbines(vec![
        TurbineSpec::new(1, 0.05, 0.1, 0.05),
        TurbineSpec::new(2, 0.05, 0.1, 0.05),
    ]);

    let cancel = CancellationToken::new();
    let task = tokio::spawn(fleet.run(cancel.clone()));
    tokio::time::sleep(Duration::from_millis(600)).await;
    cancel.cancel();
    let report = task.await.unwrap().unwrap();

    let one = store.read_turbine(1).await.unwrap();
    let two = store.read_turbine(2).await.unwrap();
    assert_eq!((one.len() + two.len()) as u64, report.records_ingested);
    assert!(one.iter().all(|r| r.turbine_id == 1));
    assert!(one.iter().any(|r| r.status.is_broken()));
    assert!(tmp.path().join("metrics_data").join("turbine_2.jsonl").exists());
}
