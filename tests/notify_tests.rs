use std::time::Duration;

use pretty_assertions::assert_eq;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpListener;
use tokio::time::timeout;

use duelhub::notify::Notifier;

#[tokio::test]
async fn test_unconfigured_notifier_is_a_noop() {
    let notifier = Notifier::new(None);
    assert!(!notifier.connect().await.unwrap());
    assert!(!notifier.is_connected().await);

    // a send without a channel returns immediately
    timeout(Duration::from_secs(1), notifier.notify_complete("s1"))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_connect_failure_is_an_error_but_sends_stay_swallowed() {
    // grab a port nobody listens on
    let probe = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = probe.local_addr().unwrap();
    drop(probe);

    let notifier = Notifier::new(Some(addr.to_string()));
    assert!(notifier.connect().await.is_err());
    assert!(!notifier.is_connected().await);

    timeout(Duration::from_secs(1), notifier.notify_complete("s1"))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_completion_event_is_one_json_line() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let notifier = Notifier::new(Some(addr.to_string()));
    assert!(notifier.connect().await.unwrap());
    assert!(notifier.is_connected().await);

    let (stream, _) = listener.accept().await.unwrap();
    notifier.notify_complete("4815162342").await;

    let mut line = String::new();
    BufReader::new(stream).read_line(&mut line).await.unwrap();
    let event: serde_json::Value = serde_json::from_str(&line).unwrap();
    assert_eq!(event["event"], "finish_judge");
    assert_eq!(event["submission_id"], "4815162342");
}

#[tokio::test]
async fn test_reconnect_after_consumer_comes_online() {
    let probe = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = probe.local_addr().unwrap();
    drop(probe);

    // consumer is down at startup: degraded mode
    let notifier = Notifier::new(Some(addr.to_string()));
    assert!(notifier.connect().await.is_err());

    // it comes online and announces itself
    let listener = TcpListener::bind(addr).await.unwrap();
    assert!(notifier.connect().await.unwrap());

    let (stream, _) = listener.accept().await.unwrap();
    notifier.notify_complete("s7").await;

    let mut line = String::new();
    BufReader::new(stream).read_line(&mut line).await.unwrap();
    assert!(line.contains("s7"));
}
