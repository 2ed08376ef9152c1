//! End-to-end refresh cycles against mock discovery, monitor, and
//! instance servers.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use roster_core::{ProbeRecord, Record, RosterConfig};
use roster_probe::{AbortReason, CycleOutcome, Refresher};
use roster_state::InstanceStore;
use serde_json::{Value, json};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::watch;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Serves the instance list and the monitor listing.
struct Hub {
    server: MockServer,
}

impl Hub {
    async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    async fn instance_list(&self, body: String) {
        Mock::given(method("GET"))
            .and(path("/instances.md"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&self.server)
            .await;
    }

    async fn monitor_page(&self, page: u32, total: u64, per_page: u64, names: &[&str]) {
        let monitors: Vec<Value> = names
            .iter()
            .map(|n| json!({ "name": n, "dailyRatios": [{ "ratio": "99.9" }] }))
            .collect();
        Mock::given(method("GET"))
            .and(path("/monitors"))
            .and(query_param("page", page.to_string()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "psp": { "monitors": monitors, "totalMonitors": total, "perPage": per_page }
            })))
            .mount(&self.server)
            .await;
    }

    async fn failing_monitor_page(&self, page: u32) {
        Mock::given(method("GET"))
            .and(path("/monitors"))
            .and(query_param("page", page.to_string()))
            .respond_with(ResponseTemplate::new(500))
            .mount(&self.server)
            .await;
    }

    fn config(&self) -> RosterConfig {
        let mut config = RosterConfig::default();
        config.discovery.url = format!("{}/instances.md", self.server.uri());
        config.monitor.url = format!("{}/monitors", self.server.uri());
        config.probe.target_timeout = Duration::from_millis(500);
        config.refresh.monitor_timeout = Duration::from_secs(5);
        config.refresh.probe_timeout = Duration::from_secs(5);
        config.refresh.interval = Duration::from_millis(50);
        config
    }
}

/// An instance answering both probe endpoints, optionally slowly.
async fn instance(users: i64, delay: Option<Duration>) -> MockServer {
    let server = MockServer::start().await;
    let mut stats = ResponseTemplate::new(200)
        .set_body_json(json!({ "usage": { "users": { "total": users } } }));
    if let Some(delay) = delay {
        stats = stats.set_delay(delay);
    }
    Mock::given(method("GET"))
        .and(path("/api/v1/stats"))
        .respond_with(stats)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/trending"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("access-control-allow-origin", "*")
                .set_body_json(json!([{ "videoId": "abc" }])),
        )
        .mount(&server)
        .await;
    server
}

/// Serves a document that never completes: the headers promise a large
/// body, then one byte arrives every 200ms, so no single read times out.
async fn trickling_document() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut request = [0u8; 4096];
                let _ = socket.read(&mut request).await;
                let head = b"HTTP/1.1 200 OK\r\ncontent-type: text/markdown\r\ncontent-length: 100000000\r\n\r\n";
                if socket.write_all(head).await.is_err() {
                    return;
                }
                loop {
                    tokio::time::sleep(Duration::from_millis(200)).await;
                    if socket.write_all(b"*").await.is_err() {
                        return;
                    }
                }
            });
        }
    });
    format!("http://{addr}/instances.md")
}

fn existing_snapshot() -> BTreeMap<String, Record> {
    let probe = ProbeRecord {
        kind: "https".to_string(),
        region: None,
        flag: None,
        stats: None,
        cors: Some(false),
        api: Some(false),
        uri: "https://old.example".to_string(),
    };
    BTreeMap::from([(
        "old.example".to_string(),
        Record::new(probe, json!({ "name": "old.example" })),
    )])
}

#[tokio::test]
async fn publishes_hosts_present_in_both_sources() {
    let hub = Hub::start().await;
    let a = instance(10, None).await;
    let b = instance(20, None).await;

    hub.instance_list(format!(
        "# Instances\n\
         * [a.example]({}) 🇩🇪\n\
         * [b.example]({})\n\
         * [c.onion](http://c.onion) 🇫🇷\n\
         ### Blocked instances\n\
         * [blocked.example]({})\n",
        a.uri(),
        b.uri(),
        a.uri()
    ))
    .await;
    // Three monitors over two pages; "pending.example" has no listed instance.
    hub.monitor_page(1, 3, 2, &["a.example", "pending.example"]).await;
    hub.monitor_page(2, 3, 2, &["c.onion"]).await;

    let store = InstanceStore::new();
    let refresher = Refresher::new(&hub.config(), store.clone()).unwrap();
    let report = refresher.run_cycle().await;

    assert_eq!(report.discovered, 3);
    assert_eq!(report.probed, 3);
    assert_eq!(report.timed_out, 0);
    assert_eq!(report.monitors, 3);
    assert!(report.failed_pages.is_empty());
    assert_eq!(
        report.outcome,
        CycleOutcome::Published { version: 1, instances: 2 }
    );

    let snapshot = store.snapshot();
    assert_eq!(
        snapshot.records.keys().collect::<Vec<_>>(),
        vec!["a.example", "c.onion"]
    );

    let a_record = &snapshot.records["a.example"];
    assert_eq!(a_record.region.as_deref(), Some("DE"));
    assert_eq!(a_record.api, Some(true));
    assert_eq!(a_record.cors, Some(true));
    assert_eq!(a_record.total_users(), Some(10));
    assert_eq!(a_record.monitor["name"], "a.example");
    assert_eq!(a_record.latest_uptime_ratio(), Some(99.9));

    let onion = &snapshot.records["c.onion"];
    assert_eq!(onion.kind, "onion");
    assert_eq!(onion.stats, None);
    assert_eq!(onion.region.as_deref(), Some("FR"));
}

#[tokio::test]
async fn failed_monitor_page_keeps_other_pages() {
    let hub = Hub::start().await;
    let a = instance(10, None).await;
    let b = instance(20, None).await;

    hub.instance_list(format!(
        "* [a.example]({})\n* [b.example]({})\n",
        a.uri(),
        b.uri()
    ))
    .await;
    hub.monitor_page(1, 3, 1, &["a.example"]).await;
    hub.failing_monitor_page(2).await;
    hub.monitor_page(3, 3, 1, &["b.example"]).await;

    let store = InstanceStore::new();
    let refresher = Refresher::new(&hub.config(), store.clone()).unwrap();
    let report = refresher.run_cycle().await;

    assert_eq!(report.failed_pages, vec![2]);
    assert_eq!(report.monitors, 2);
    assert!(report.published());
    assert_eq!(store.snapshot().len(), 2);
}

#[tokio::test]
async fn missing_monitors_keep_previous_snapshot() {
    let hub = Hub::start().await;
    let a = instance(10, None).await;
    hub.instance_list(format!("* [a.example]({})\n", a.uri())).await;
    hub.failing_monitor_page(1).await;

    let store = InstanceStore::new();
    store.publish(existing_snapshot());
    let before = store.snapshot();

    let refresher = Refresher::new(&hub.config(), store.clone()).unwrap();
    let report = refresher.run_cycle().await;

    assert_eq!(report.outcome, CycleOutcome::Aborted(AbortReason::NoMonitors));
    assert_eq!(report.probed, 1);
    assert_eq!(*store.snapshot(), *before);
    assert_eq!(store.version(), 1);
}

#[tokio::test]
async fn missing_instance_list_keeps_previous_snapshot() {
    let hub = Hub::start().await;
    // No instance list mounted: discovery gets a 404.
    hub.monitor_page(1, 1, 50, &["a.example"]).await;

    let store = InstanceStore::new();
    store.publish(existing_snapshot());
    let before = store.snapshot();

    let refresher = Refresher::new(&hub.config(), store.clone()).unwrap();
    let report = refresher.run_cycle().await;

    assert_eq!(report.discovered, 0);
    assert_eq!(report.outcome, CycleOutcome::Aborted(AbortReason::NoProbes));
    assert_eq!(*store.snapshot(), *before);
}

#[tokio::test]
async fn disjoint_sources_publish_an_empty_set() {
    let hub = Hub::start().await;
    let a = instance(10, None).await;
    hub.instance_list(format!("* [a.example]({})\n", a.uri())).await;
    hub.monitor_page(1, 1, 50, &["other.example"]).await;

    let store = InstanceStore::new();
    store.publish(existing_snapshot());

    let refresher = Refresher::new(&hub.config(), store.clone()).unwrap();
    let report = refresher.run_cycle().await;

    assert_eq!(report.probed, 1);
    assert_eq!(report.monitors, 1);
    assert_eq!(report.outcome, CycleOutcome::Published { version: 2, instances: 0 });
    assert!(store.snapshot().is_empty());
    assert_eq!(store.version(), 2);
}

#[tokio::test]
async fn stalled_discovery_is_bounded_by_the_probe_deadline() {
    let hub = Hub::start().await;
    hub.monitor_page(1, 1, 50, &["a.example"]).await;

    let mut config = hub.config();
    config.discovery.url = trickling_document().await;
    config.refresh.probe_timeout = Duration::from_secs(1);
    config.refresh.monitor_timeout = Duration::from_secs(1);

    let store = InstanceStore::new();
    store.publish(existing_snapshot());
    let before = store.snapshot();

    let refresher = Refresher::new(&config, store.clone()).unwrap();
    let report = tokio::time::timeout(Duration::from_secs(8), refresher.run_cycle())
        .await
        .expect("cycle outlived the probe deadline");

    assert_eq!(report.discovered, 0);
    assert_eq!(report.probed, 0);
    assert_eq!(report.monitors, 1);
    assert_eq!(report.outcome, CycleOutcome::Aborted(AbortReason::NoProbes));
    assert_eq!(*store.snapshot(), *before);
}

#[tokio::test]
async fn staggered_probe_completion_keeps_records_with_their_hosts() {
    let hub = Hub::start().await;
    let first = instance(1, Some(Duration::from_millis(200))).await;
    let second = instance(2, None).await;
    let third = instance(3, Some(Duration::from_millis(100))).await;

    hub.instance_list(format!(
        "* [first.example]({})\n* [second.example]({})\n* [third.example]({})\n",
        first.uri(),
        second.uri(),
        third.uri()
    ))
    .await;
    hub.monitor_page(1, 3, 50, &["third.example", "first.example", "second.example"])
        .await;

    let store = InstanceStore::new();
    let refresher = Refresher::new(&hub.config(), store.clone()).unwrap();
    let report = refresher.run_cycle().await;

    assert_eq!(report.outcome, CycleOutcome::Published { version: 1, instances: 3 });
    let snapshot = store.snapshot();
    for (host, server, users) in [
        ("first.example", &first, 1),
        ("second.example", &second, 2),
        ("third.example", &third, 3),
    ] {
        let record = &snapshot.records[host];
        assert_eq!(record.uri, server.uri(), "{host}");
        assert_eq!(record.total_users(), Some(users), "{host}");
        assert_eq!(record.monitor["name"], host);
    }
}

#[tokio::test]
async fn slow_target_is_dropped_without_aborting() {
    let hub = Hub::start().await;
    let slow = instance(10, Some(Duration::from_secs(5))).await;
    let fast = instance(20, None).await;

    hub.instance_list(format!(
        "* [slow.example]({})\n* [fast.example]({})\n",
        slow.uri(),
        fast.uri()
    ))
    .await;
    hub.monitor_page(1, 2, 50, &["slow.example", "fast.example"]).await;

    let store = InstanceStore::new();
    let refresher = Refresher::new(&hub.config(), store.clone()).unwrap();
    let report = refresher.run_cycle().await;

    assert_eq!(report.discovered, 2);
    assert_eq!(report.timed_out, 1);
    assert_eq!(report.probed, 1);
    assert!(report.published());
    assert_eq!(
        store.snapshot().records.keys().collect::<Vec<_>>(),
        vec!["fast.example"]
    );
}

#[tokio::test]
async fn probe_deadline_discards_the_fan_out() {
    let hub = Hub::start().await;
    let slow = instance(10, Some(Duration::from_secs(5))).await;
    hub.instance_list(format!("* [slow.example]({})\n", slow.uri())).await;
    hub.monitor_page(1, 1, 50, &["slow.example"]).await;

    let mut config = hub.config();
    config.probe.target_timeout = Duration::from_secs(30);
    config.refresh.probe_timeout = Duration::from_millis(300);

    let store = InstanceStore::new();
    let refresher = Refresher::new(&config, store.clone()).unwrap();
    let report = refresher.run_cycle().await;

    assert_eq!(report.probed, 0);
    assert_eq!(report.outcome, CycleOutcome::Aborted(AbortReason::NoProbes));
}

#[tokio::test]
async fn each_cycle_replaces_the_snapshot() {
    let hub = Hub::start().await;
    let a = instance(10, None).await;
    hub.instance_list(format!("* [a.example]({})\n", a.uri())).await;
    hub.monitor_page(1, 1, 50, &["a.example"]).await;

    let store = InstanceStore::new();
    store.publish(existing_snapshot());

    let refresher = Refresher::new(&hub.config(), store.clone()).unwrap();
    let first = refresher.run_cycle().await;
    let second = refresher.run_cycle().await;

    assert_eq!(first.outcome, CycleOutcome::Published { version: 2, instances: 1 });
    assert_eq!(second.outcome, CycleOutcome::Published { version: 3, instances: 1 });
    assert_eq!(
        store.snapshot().records.keys().collect::<Vec<_>>(),
        vec!["a.example"]
    );
}

#[tokio::test]
async fn run_loop_publishes_and_stops_on_shutdown() {
    let hub = Hub::start().await;
    let a = instance(10, None).await;
    hub.instance_list(format!("* [a.example]({})\n", a.uri())).await;
    hub.monitor_page(1, 1, 50, &["a.example"]).await;

    let store = InstanceStore::new();
    let refresher = Arc::new(Refresher::new(&hub.config(), store.clone()).unwrap());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let handle = tokio::spawn({
        let refresher = refresher.clone();
        async move { refresher.run(shutdown_rx).await }
    });

    // Interval is 50ms, so a few cycles complete quickly.
    tokio::time::timeout(Duration::from_secs(10), async {
        while store.version() < 2 {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("refresher never published twice");

    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(10), handle)
        .await
        .expect("refresher did not stop")
        .unwrap();

    assert!(store.snapshot().records.contains_key("a.example"));
}
