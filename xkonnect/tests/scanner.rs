use std::net::Ipv4Addr;
use std::time::Duration;

use tokio::sync::broadcast::error::TryRecvError;
use xkonnect::{ConsoleScanner, CpuKey, ScanConfig};

#[tokio::test]
async fn start_and_stop_are_idempotent() {
    let scanner = ConsoleScanner::new(ScanConfig::default());
    assert!(!scanner.is_scanning());

    scanner.start().await.expect("first start");
    assert!(scanner.is_scanning());
    scanner.start().await.expect("second start is a no-op");
    assert!(scanner.is_scanning());

    scanner.stop().await;
    assert!(!scanner.is_scanning());
    scanner.stop().await;
    assert!(!scanner.is_scanning());

    // the engine restarts cleanly on the same instance
    scanner.start().await.expect("restart");
    assert!(scanner.is_scanning());
    scanner.stop().await;
}

#[tokio::test]
async fn launch_honors_auto_start() {
    let config = ScanConfig { auto_start: true, ..ScanConfig::default() };
    let scanner = ConsoleScanner::launch(config).await.expect("launch");
    assert!(scanner.is_scanning());
    scanner.stop().await;

    let scanner = ConsoleScanner::launch(ScanConfig::default()).await.expect("launch");
    assert!(!scanner.is_scanning());
}

#[tokio::test]
async fn purge_on_an_empty_registry_emits_nothing() {
    let scanner = ConsoleScanner::new(ScanConfig::default());
    let mut removed = scanner.on_remove();
    scanner.purge();
    assert!(matches!(removed.try_recv(), Err(TryRecvError::Empty)));
    assert!(scanner.connections().is_empty());
}

#[tokio::test]
async fn cpu_key_for_an_unknown_console_is_refused() {
    let scanner = ConsoleScanner::new(ScanConfig::default());
    assert!(!scanner.set_cpu_key(Ipv4Addr::new(192, 168, 1, 10), CpuKey::random()));
    assert!(scanner.connection(Ipv4Addr::new(192, 168, 1, 10)).is_none());
}

#[test]
fn disconnect_timeout_resolves_from_frequency_and_attempts() {
    let config = ScanConfig::default();
    assert_eq!(config.scan_frequency(), Duration::from_secs(3));
    assert_eq!(config.disconnect_timeout(), Duration::from_secs(6));

    let explicit = ScanConfig {
        scan_frequency_ms: 2000,
        disconnect_timeout_ms: Some(4000),
        ..ScanConfig::default()
    };
    assert_eq!(explicit.disconnect_timeout(), Duration::from_secs(4));
}
