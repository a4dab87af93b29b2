mod common;

use common::CaptureLogger;
use std::sync::Arc;
use std::time::Duration;

use navi_coordinator::adapters::outbound::{init_noop_logger, BufferedLogger, FanoutLogger};
use navi_coordinator::domains::logger::{DomainLogger, DynLogger, LogLevel};

#[tokio::test]
async fn test_buffered_and_noop_logger() {
    let capture = Arc::new(CaptureLogger::new());
    let bridge = capture.clone() as DynLogger;

    let buffered = BufferedLogger::spawn(bridge, 8);
    buffered.info("one");
    buffered.warn("two");
    buffered.error("three");

    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(capture.contains("INFO:one"));
    assert!(capture.contains("WARN:two"));
    assert!(capture.contains("ERR:three"));
    assert_eq!(buffered.dropped(), 0);

    let noop = init_noop_logger();
    noop.info("ignored");
    noop.error("ignored-err");
}

#[tokio::test]
async fn test_buffered_logger_drops_when_full() {
    let capture = Arc::new(CaptureLogger::new());
    let buffered = BufferedLogger::spawn(capture.clone() as DynLogger, 1);

    // No await in between: the forwarding task cannot drain the queue yet.
    for i in 0..5 {
        buffered.info(&format!("line {}", i));
    }
    assert_eq!(buffered.dropped(), 4);
}

#[test]
fn test_fanout_reaches_every_sink() {
    let first = Arc::new(CaptureLogger::new());
    let second = Arc::new(CaptureLogger::new());
    let fanout = FanoutLogger::new(vec![first.clone() as DynLogger, second.clone() as DynLogger]);

    fanout.log(LogLevel::Warn, "map mismatch");

    assert!(first.contains("WARN:map mismatch"));
    assert!(second.contains("WARN:map mismatch"));
}
