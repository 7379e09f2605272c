//! Dispatch: gateway seam, immediate row marking, and pacing.

pub mod smtp;

pub use smtp::{DryRunGateway, SmtpGateway};

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use tracing::{debug, info};

use crate::compose::DispatchRequest;
use crate::config::{MergeConfig, ThrottleBounds};
use crate::error::{DispatchError, SourceError};
use crate::source::{CellValue, TableSnapshot, TabularSource};

/// Outbound email gateway.
#[async_trait]
pub trait EmailGateway: Send + Sync {
    /// One send attempt for a fully composed message.
    async fn send(&self, request: &DispatchRequest, body: &str) -> Result<(), DispatchError>;
}

/// Outcome of one row's dispatch attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Sent(u32),
    Failed { row: u32, message: String },
}

impl DispatchOutcome {
    pub fn row(&self) -> u32 {
        match self {
            DispatchOutcome::Sent(row) => *row,
            DispatchOutcome::Failed { row, .. } => *row,
        }
    }
}

/// Uniform delay in whole seconds drawn from the inclusive bounds. When
/// min equals max the delay is exactly that value.
pub fn throttle_delay(bounds: &ThrottleBounds) -> Duration {
    let secs = if bounds.seconds_min >= bounds.seconds_max {
        bounds.seconds_min
    } else {
        rand::thread_rng().gen_range(bounds.seconds_min..=bounds.seconds_max)
    };
    Duration::from_secs(secs)
}

/// Sends through the gateway, marks row state immediately on success, and
/// paces between attempts.
pub struct DispatchController {
    gateway: Arc<dyn EmailGateway>,
    source: Arc<dyn TabularSource>,
    config: MergeConfig,
}

impl DispatchController {
    pub fn new(
        gateway: Arc<dyn EmailGateway>,
        source: Arc<dyn TabularSource>,
        config: MergeConfig,
    ) -> Self {
        Self {
            gateway,
            source,
            config,
        }
    }

    /// One send attempt.
    pub async fn send(&self, request: &DispatchRequest, body: &str) -> Result<(), DispatchError> {
        self.gateway.send(request, body).await?;
        info!(row = request.row_number, to = %request.recipients, "Message sent");
        Ok(())
    }

    /// Mark a row sent: set the sent flag, optionally clear the to-send
    /// flag, optionally write the timestamp, then flush, all before
    /// control returns, so an interrupted batch leaves processed rows
    /// correctly marked and an operator watching the source sees progress.
    pub async fn mark_sent_now(
        &self,
        snapshot: &TableSnapshot,
        row_number: u32,
    ) -> Result<(), SourceError> {
        let sent_column = snapshot
            .get_index(&self.config.sent_header)
            .ok_or_else(|| SourceError::WriteFailed {
                source_id: self.source.identifier(),
                reason: format!("column {:?} not found", self.config.sent_header),
            })?;
        self.source
            .write_cell(row_number, sent_column, CellValue::Bool(true))
            .await?;

        if self.config.marking.clear_to_send
            && let Some(to_send_column) = snapshot.get_index(&self.config.to_send_header)
        {
            self.source
                .write_cell(row_number, to_send_column, CellValue::Bool(false))
                .await?;
        }

        if self.config.marking.write_timestamp
            && let Some(sent_at_column) = snapshot.get_index(&self.config.sent_at_header)
        {
            let stamp = Utc::now()
                .format(&self.config.marking.timestamp_format)
                .to_string();
            self.source
                .write_cell(row_number, sent_at_column, CellValue::Text(stamp))
                .await?;
        }

        self.source.flush().await
    }

    /// Pacing delay, applied after every dispatch attempt regardless of
    /// outcome.
    pub async fn throttle(&self) {
        let delay = throttle_delay(&self.config.throttle);
        debug!(seconds = delay.as_secs(), "Throttling before next send");
        tokio::time::sleep(delay).await;
    }
}
