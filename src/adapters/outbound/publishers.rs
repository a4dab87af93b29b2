use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, Mutex};

use crate::common::{DomainError, DomainResult};
use crate::domains::navigation::costmap::OccupancyGrid;
use crate::domains::navigation::messages::{EmergencyResult, NavigationResult, RobotInfo, RobotStatusReport};
use crate::domains::navigation::ports::CoordinatorPublisher;

/// Topic-tagged outbound message, serialized as `{"topic": ..., "payload": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "topic", content = "payload", rename_all = "snake_case")]
pub enum OutboundMessage {
    NaviCmdResult(NavigationResult),
    EmergencyResult(EmergencyResult),
    RobotStatus(RobotStatusReport),
    Costmap(OccupancyGrid),
    RobotInfo(RobotInfo),
}

/// Writes one JSON document per line to any async writer.
pub struct JsonLinesPublisher<W> {
    writer: Mutex<W>,
}

impl<W: AsyncWrite + Unpin + Send> JsonLinesPublisher<W> {
    pub fn new(writer: W) -> Self {
        Self { writer: Mutex::new(writer) }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }

    async fn write(&self, message: OutboundMessage) -> DomainResult<()> {
        let mut line = serde_json::to_vec(&message)?;
        line.push(b'\n');
        let mut writer = self.writer.lock().await;
        writer
            .write_all(&line)
            .await
            .map_err(|e| DomainError::InfrastructureError(format!("Failed to write message: {}", e)))?;
        writer
            .flush()
            .await
            .map_err(|e| DomainError::InfrastructureError(format!("Failed to flush writer: {}", e)))
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> CoordinatorPublisher for JsonLinesPublisher<W> {
    async fn navigation_result(&self, result: &NavigationResult) -> DomainResult<()> {
        self.write(OutboundMessage::NaviCmdResult(result.clone())).await
    }

    async fn emergency_result(&self, result: &EmergencyResult) -> DomainResult<()> {
        self.write(OutboundMessage::EmergencyResult(result.clone())).await
    }

    async fn status(&self, report: &RobotStatusReport) -> DomainResult<()> {
        self.write(OutboundMessage::RobotStatus(report.clone())).await
    }

    async fn costmap(&self, grid: &OccupancyGrid) -> DomainResult<()> {
        self.write(OutboundMessage::Costmap(grid.clone())).await
    }

    async fn robot_info(&self, info: &RobotInfo) -> DomainResult<()> {
        self.write(OutboundMessage::RobotInfo(info.clone())).await
    }
}

/// Forwards outbound messages to an in-process consumer.
pub struct ChannelPublisher {
    sender: mpsc::Sender<OutboundMessage>,
}

impl ChannelPublisher {
    pub fn new(sender: mpsc::Sender<OutboundMessage>) -> Self {
        Self { sender }
    }

    async fn forward(&self, message: OutboundMessage) -> DomainResult<()> {
        self.sender
            .send(message)
            .await
            .map_err(|e| DomainError::InfrastructureError(format!("Outbound channel closed: {}", e)))
    }
}

#[async_trait]
impl CoordinatorPublisher for ChannelPublisher {
    async fn navigation_result(&self, result: &NavigationResult) -> DomainResult<()> {
        self.forward(OutboundMessage::NaviCmdResult(result.clone())).await
    }

    async fn emergency_result(&self, result: &EmergencyResult) -> DomainResult<()> {
        self.forward(OutboundMessage::EmergencyResult(result.clone())).await
    }

    async fn status(&self, report: &RobotStatusReport) -> DomainResult<()> {
        self.forward(OutboundMessage::RobotStatus(report.clone())).await
    }

    async fn costmap(&self, grid: &OccupancyGrid) -> DomainResult<()> {
        self.forward(OutboundMessage::Costmap(grid.clone())).await
    }

    async fn robot_info(&self, info: &RobotInfo) -> DomainResult<()> {
        self.forward(OutboundMessage::RobotInfo(info.clone())).await
    }
}
