use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, warn};

use crate::common::ApplicationResult;
use crate::domains::navigation::actors::{CoordinatorHandle, CoordinatorInput};
use crate::domains::navigation::costmap::MapMetadata;
use crate::domains::navigation::messages::{EmergencyCommand, NavigationCommand};

/// Topic-tagged inbound message, one per line: `{"topic": ..., "payload": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "topic", content = "payload", rename_all = "snake_case")]
pub enum InboundMessage {
    NaviCmd(NavigationCommand),
    EmergencyCmd(EmergencyCommand),
    MapMetadata(MapMetadata),
    Battery { voltage: f64 },
    Covariance { covariance: Vec<f64> },
}

impl From<InboundMessage> for CoordinatorInput {
    fn from(message: InboundMessage) -> Self {
        match message {
            InboundMessage::NaviCmd(cmd) => CoordinatorInput::Navigation(cmd),
            InboundMessage::EmergencyCmd(cmd) => CoordinatorInput::Emergency(cmd),
            InboundMessage::MapMetadata(metadata) => CoordinatorInput::MapMetadata(metadata),
            InboundMessage::Battery { voltage } => CoordinatorInput::Battery(voltage),
            InboundMessage::Covariance { covariance } => CoordinatorInput::Covariance(covariance),
        }
    }
}

/// Feeds a coordinator from a stream of JSON lines. Malformed lines are
/// logged and skipped.
pub struct JsonLinesCommandReader<R> {
    reader: R,
}

impl<R: AsyncBufRead + Unpin> JsonLinesCommandReader<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    /// Forwards every well-formed line until end of input. Returns how many
    /// messages were delivered.
    pub async fn run(self, handle: CoordinatorHandle) -> ApplicationResult<usize> {
        let mut lines = self.reader.lines();
        let mut forwarded = 0;
        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    warn!("Stopped reading commands: {}", e);
                    break;
                }
            };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<InboundMessage>(line) {
                Ok(message) => {
                    debug!("Inbound {}", message_topic(&message));
                    handle.send(message.into()).await?;
                    forwarded += 1;
                }
                Err(e) => warn!("Skipping malformed input line: {}", e),
            }
        }
        Ok(forwarded)
    }
}

fn message_topic(message: &InboundMessage) -> &'static str {
    match message {
        InboundMessage::NaviCmd(_) => "navi_cmd",
        InboundMessage::EmergencyCmd(_) => "emergency_cmd",
        InboundMessage::MapMetadata(_) => "map_metadata",
        InboundMessage::Battery { .. } => "battery",
        InboundMessage::Covariance { .. } => "covariance",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_reader_forwards_known_topics_and_skips_garbage() {
        let input = concat!(
            r#"{"topic":"navi_cmd","payload":{"id":"robot_01","time":"t0","cmd":"navi","destination":{"position":{"x":1.0,"y":2.0}}}}"#,
            "\n",
            "not json\n",
            "\n",
            r#"{"topic":"emergency_cmd","payload":{"id":"robot_01","time":"t1","emergency_cmd":"stop"}}"#,
            "\n",
            r#"{"topic":"battery","payload":{"voltage":24.5}}"#,
            "\n",
        );
        let (tx, mut rx) = mpsc::channel(8);
        let reader = JsonLinesCommandReader::new(input.as_bytes());
        let forwarded = reader.run(CoordinatorHandle::new(tx)).await.unwrap();
        assert_eq!(forwarded, 3);

        match rx.recv().await {
            Some(CoordinatorInput::Navigation(cmd)) => {
                assert_eq!(cmd.cmd, "navi");
                assert_eq!(cmd.destination.position.y, 2.0);
                assert!(cmd.costmap.is_empty());
            }
            other => panic!("unexpected input {:?}", other),
        }
        assert!(matches!(rx.recv().await, Some(CoordinatorInput::Emergency(cmd)) if cmd.cmd == "stop"));
        assert!(matches!(rx.recv().await, Some(CoordinatorInput::Battery(v)) if v == 24.5));
    }
}
