use super::{
    Api, Apps, Daemon, Identity, Lifecycle, Locations, Logs, Node, NodeBox, Ports, Prober,
    Reinstaller, Runtime, Scheduler, Store, Upnp, Volumes, Watcher,
};
use std::path::PathBuf;
use std::time::Duration;

/// Creates a new test configuration.
///
/// Every loop delay is shortened so scenario tests run in milliseconds.
pub fn new_test_config() -> Node {
    Node {
        node: NodeBox {
            env: super::TEST.to_string(),
            logs: Some(Logs {
                level: Some("debug".to_string()),
            }),
            api: Some(Api {
                name: Some("fleetd-test".to_string()),
                port: Some("16127".to_string()),
                timeout: Some(Duration::from_secs(5)),
            }),
            identity: Identity {
                ip: "10.0.0.1".to_string(),
                api_port: 16127,
                secret: Some(hex::encode([42u8; 32])),
                geolocation: Some("EU_CZ_PRG".to_string()),
                tier: None,
            },
            ports: Ports::default(),
            upnp: Upnp {
                enabled: false,
                firewall: true,
            },
            daemon: Daemon {
                url: "http://127.0.0.1:16124".to_string(),
                user: Some("user".to_string()),
                password: Some("pass".to_string()),
                payment_address: "t1FleetPayments".to_string(),
                timeout: Some(Duration::from_secs(5)),
            },
            runtime: Runtime::default(),
            volumes: Volumes {
                dir: PathBuf::from("/tmp/fleetd-test-volumes"),
                mount_jobs: false,
            },
            store: Store {
                dump_enabled: false,
                path: PathBuf::from("/tmp/fleetd-test.store.json"),
                interval: Some(Duration::from_secs(60)),
            },
            apps: Apps::default(),
            scheduler: Scheduler {
                base_delay: Some(Duration::from_millis(10)),
                ..Scheduler::default()
            },
            prober: Prober {
                short: Some(Duration::from_millis(10)),
                medium: Some(Duration::from_millis(20)),
                normal: Some(Duration::from_millis(30)),
                long: Some(Duration::from_millis(200)),
                guard: Some(Duration::from_millis(10)),
                peer_timeout: Some(Duration::from_millis(200)),
                ..Prober::default()
            },
            lifecycle: Lifecycle {
                settle_delay: Some(Duration::from_millis(1)),
                monitor_short_period: Some(Duration::from_millis(20)),
                monitor_long_period: Some(Duration::from_millis(50)),
                ..Lifecycle::default()
            },
            locations: Locations::default(),
            watcher: Watcher {
                interval: Some(Duration::from_millis(10)),
                ..Watcher::default()
            },
            reinstaller: Reinstaller {
                interval: Some(Duration::from_millis(10)),
                ..Reinstaller::default()
            },
        },
    }
}
