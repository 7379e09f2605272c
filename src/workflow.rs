//! Workflow coordination: validate, select, confirm, dispatch, report.
//!
//! One invocation moves through
//! `Idle → Validating → (Blocked | AwaitingConfirmation) → (Cancelled |
//! Dispatching) → Completed`. Blocking happens before any row is touched;
//! once dispatching starts, a per-row failure is recorded and the loop
//! moves on. Dispatch is strictly sequential: pacing needs a single
//! in-flight send, marking must be causally ordered with its row, and
//! failure attribution stays unambiguous.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::compose::{normalize_address_list, Composer};
use crate::config::{CampaignSettings, MergeConfig, ThrottleBounds};
use crate::dispatch::{DispatchController, DispatchOutcome};
use crate::error::{ConfigError, Error};
use crate::source::snapshot::Row;
use crate::source::{TableSnapshot, TabularSource};
use crate::template::TemplateEngine;

/// What the operator is asked to approve before dispatch begins.
#[derive(Debug, Clone)]
pub struct BatchPreview {
    pub candidate_count: usize,
    pub source_id: String,
    pub throttle: ThrottleBounds,
}

/// Explicit operator approval gate.
#[async_trait]
pub trait ConfirmationGate: Send + Sync {
    async fn confirm(&self, preview: &BatchPreview) -> bool;
}

/// Pre-accepted gate, for `--yes` runs.
pub struct AlwaysConfirm;

#[async_trait]
impl ConfirmationGate for AlwaysConfirm {
    async fn confirm(&self, _preview: &BatchPreview) -> bool {
        true
    }
}

/// External execution ceiling, polled between rows. The host platform may
/// kill a long invocation; the loop checks this so already-marked rows
/// stay consistent and a re-run re-selects what remains.
pub trait Cancellation: Send + Sync {
    fn is_cancelled(&self) -> bool;
}

pub struct NeverCancelled;

impl Cancellation for NeverCancelled {
    fn is_cancelled(&self) -> bool {
        false
    }
}

/// One row's failure as shown in the end-of-run summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowFailure {
    pub row: u32,
    pub message: String,
}

impl std::fmt::Display for RowFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Row {}: {}", self.row, self.message)
    }
}

/// Aggregated result of a completed dispatch loop.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub attempted: usize,
    pub sent: usize,
    pub failures: Vec<RowFailure>,
}

impl RunSummary {
    fn from_outcomes(outcomes: &[DispatchOutcome]) -> Self {
        let mut summary = Self {
            attempted: outcomes.len(),
            ..Self::default()
        };
        for outcome in outcomes {
            match outcome {
                DispatchOutcome::Sent(_) => summary.sent += 1,
                DispatchOutcome::Failed { row, message } => summary.failures.push(RowFailure {
                    row: *row,
                    message: message.clone(),
                }),
            }
        }
        summary
    }

    /// User-facing report; the failure listing is bounded to `max_listed`.
    pub fn report(&self, max_listed: usize) -> String {
        let mut out = format!("Sent {} message(s).", self.sent);
        if self.failures.is_empty() {
            return out;
        }
        out.push_str(&format!(" {} failure(s):", self.failures.len()));
        for failure in self.failures.iter().take(max_listed) {
            out.push_str(&format!("\n  {failure}"));
        }
        if self.failures.len() > max_listed {
            out.push_str(&format!("\n  (and {} more)", self.failures.len() - max_listed));
        }
        out
    }
}

/// Terminal state of one workflow invocation.
#[derive(Debug)]
pub enum RunOutcome {
    /// Validation or selection refused the batch; no row was touched.
    Blocked(String),
    /// The operator declined at the confirmation gate; no row was touched.
    Cancelled,
    /// The dispatch loop ran; failures, if any, are in the summary.
    Completed(RunSummary),
}

/// Top-level coordinator for the send workflow.
pub struct WorkflowCoordinator {
    source: Arc<dyn TabularSource>,
    composer: Composer,
    engine: TemplateEngine,
    controller: DispatchController,
    gate: Arc<dyn ConfirmationGate>,
    cancellation: Arc<dyn Cancellation>,
    config: MergeConfig,
}

impl WorkflowCoordinator {
    pub fn new(
        source: Arc<dyn TabularSource>,
        composer: Composer,
        engine: TemplateEngine,
        controller: DispatchController,
        gate: Arc<dyn ConfirmationGate>,
        config: MergeConfig,
    ) -> Self {
        Self {
            source,
            composer,
            engine,
            controller,
            gate,
            cancellation: Arc::new(NeverCancelled),
            config,
        }
    }

    /// Replace the cancellation check polled between rows.
    pub fn with_cancellation(mut self, cancellation: Arc<dyn Cancellation>) -> Self {
        self.cancellation = cancellation;
        self
    }

    /// Run the full send workflow.
    ///
    /// `Err` is reserved for infrastructure failures (the source cannot be
    /// read at all); every expected terminal state is a [`RunOutcome`].
    pub async fn run(&self, settings: &CampaignSettings) -> Result<RunOutcome, Error> {
        // ── Validating ──────────────────────────────────────────────
        if settings.template_id.trim().is_empty() {
            return Ok(RunOutcome::Blocked(
                "No template is configured. Set campaign.template before sending.".to_string(),
            ));
        }
        if settings.default_subject.trim().is_empty() {
            return Ok(RunOutcome::Blocked(
                "No default subject is configured. Set campaign.subject before sending."
                    .to_string(),
            ));
        }

        let snapshot = self.source.load_snapshot().await?;

        let duplicates = snapshot.validate_no_duplicate_headers();
        if !duplicates.is_empty() {
            let listed = duplicates
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ");
            return Ok(RunOutcome::Blocked(listed));
        }

        let Some(to_send_index) = snapshot.get_index(&self.config.to_send_header) else {
            return Ok(missing_required_column(&self.config.to_send_header));
        };
        let Some(sent_index) = snapshot.get_index(&self.config.sent_header) else {
            return Ok(missing_required_column(&self.config.sent_header));
        };
        let Some(email_index) = snapshot.get_index("email") else {
            return Ok(missing_required_column("email"));
        };

        // ── Selection ───────────────────────────────────────────────
        let candidates: Vec<&Row> = snapshot
            .rows()
            .iter()
            .filter(|row| row.is_truthy(to_send_index) && !row.is_truthy(sent_index))
            .collect();

        let missing_address: Vec<u32> = candidates
            .iter()
            .filter(|row| normalize_address_list(&row.text(email_index)).is_empty())
            .map(|row| row.number)
            .collect();
        if !missing_address.is_empty() {
            // Mixing valid and invalid candidates is never partially
            // honored: one bad row blocks the whole batch.
            return Ok(RunOutcome::Blocked(format!(
                "{} candidate row(s) have no recipient address: rows {}. Fix them (or clear their to-send flag) and run again.",
                missing_address.len(),
                bounded_row_list(&missing_address, self.config.max_listed_rows)
            )));
        }

        if candidates.is_empty() {
            return Ok(RunOutcome::Blocked(
                "No rows are marked to send. Nothing to do.".to_string(),
            ));
        }

        // ── AwaitingConfirmation ────────────────────────────────────
        let preview = BatchPreview {
            candidate_count: candidates.len(),
            source_id: self.source.identifier(),
            throttle: self.config.throttle.clone(),
        };
        if !self.gate.confirm(&preview).await {
            info!("Operator declined the batch");
            return Ok(RunOutcome::Cancelled);
        }

        // ── Dispatching ─────────────────────────────────────────────
        info!(
            candidates = candidates.len(),
            source = %preview.source_id,
            "Dispatch loop starting"
        );
        let mut outcomes = Vec::with_capacity(candidates.len());
        for row in candidates {
            if self.cancellation.is_cancelled() {
                warn!(
                    processed = outcomes.len(),
                    "Cancellation requested, stopping before next row"
                );
                break;
            }
            let outcome = self.dispatch_row(&snapshot, row, settings).await;
            if let DispatchOutcome::Failed { row, message } = &outcome {
                warn!(row, message = %message, "Row dispatch failed");
            }
            outcomes.push(outcome);
            // Uniform cadence: pace after every attempt, success or not.
            self.controller.throttle().await;
        }

        // ── Completed ───────────────────────────────────────────────
        let summary = RunSummary::from_outcomes(&outcomes);
        info!(
            sent = summary.sent,
            failed = summary.failures.len(),
            "Batch complete"
        );
        Ok(RunOutcome::Completed(summary))
    }

    /// Compose, render, send, and mark one row. Every failure becomes a
    /// recorded outcome; nothing here aborts the batch.
    async fn dispatch_row(
        &self,
        snapshot: &TableSnapshot,
        row: &Row,
        settings: &CampaignSettings,
    ) -> DispatchOutcome {
        let request = match self.composer.build_dispatch_request(snapshot, row, settings) {
            Ok(request) => request,
            Err(e) => {
                return DispatchOutcome::Failed {
                    row: row.number,
                    message: e.to_string(),
                };
            }
        };

        let variables = self.composer.build_template_variables(snapshot, row);
        let body = match self.engine.render(&settings.template_id, &variables).await {
            Ok(body) => body,
            Err(e) => {
                return DispatchOutcome::Failed {
                    row: row.number,
                    message: e.to_string(),
                };
            }
        };

        if let Err(e) = self.controller.send(&request, &body).await {
            return DispatchOutcome::Failed {
                row: row.number,
                message: e.to_string(),
            };
        }

        if let Err(e) = self.controller.mark_sent_now(snapshot, row.number).await {
            // The message already left the gateway; the failure entry
            // warns the operator this row may resend on a re-run.
            return DispatchOutcome::Failed {
                row: row.number,
                message: format!("message sent but row could not be marked: {e}"),
            };
        }

        DispatchOutcome::Sent(row.number)
    }

    /// Dispatch exactly one row by absolute number, which may sit outside
    /// the candidate block (e.g. a test row above the header). Identical
    /// composition/render/send path, but no confirmation, no aggregation,
    /// and no row-state mutation.
    pub async fn send_test_row(
        &self,
        row_number: u32,
        settings: &CampaignSettings,
    ) -> Result<(), Error> {
        if settings.template_id.trim().is_empty() {
            return Err(ConfigError::MissingRequired {
                key: "campaign.template".to_string(),
                hint: "A test send needs a template to render.".to_string(),
            }
            .into());
        }
        if settings.default_subject.trim().is_empty() {
            return Err(ConfigError::MissingRequired {
                key: "campaign.subject".to_string(),
                hint: "A test send needs a default subject.".to_string(),
            }
            .into());
        }

        let snapshot = self.source.load_snapshot().await?;
        let row = self.source.read_absolute_row(row_number).await?;

        let request = self.composer.build_dispatch_request(&snapshot, &row, settings)?;
        let variables = self.composer.build_template_variables(&snapshot, &row);
        let body = self.engine.render(&settings.template_id, &variables).await?;
        self.controller.send(&request, &body).await?;

        info!(row = row_number, "Test send complete");
        Ok(())
    }
}

fn missing_required_column(name: &str) -> RunOutcome {
    RunOutcome::Blocked(format!(
        "Required column {name:?} was not found in the header row."
    ))
}

/// Bounded `"4, 7, 9 (and 2 more)"` row listing.
fn bounded_row_list(rows: &[u32], max_listed: usize) -> String {
    let listed: Vec<String> = rows.iter().take(max_listed).map(u32::to_string).collect();
    let mut out = listed.join(", ");
    if rows.len() > max_listed {
        out.push_str(&format!(" (and {} more)", rows.len() - max_listed));
    }
    out
}
