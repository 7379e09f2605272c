//! End-to-end batch runs over a real CSV file and filesystem templates.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use sheetmail::compose::{Composer, DispatchRequest};
use sheetmail::config::{CampaignSettings, MergeConfig, ThrottleBounds};
use sheetmail::dispatch::{DispatchController, EmailGateway};
use sheetmail::error::DispatchError;
use sheetmail::source::{CsvSource, TabularSource};
use sheetmail::template::{FileTemplateStore, TemplateEngine};
use sheetmail::workflow::{AlwaysConfirm, RunOutcome, WorkflowCoordinator};

/// Records every send; optionally fails one row.
struct RecordingGateway {
    sent: Mutex<Vec<(u32, String, String, String)>>,
    fail_row: Option<u32>,
}

impl RecordingGateway {
    fn new(fail_row: Option<u32>) -> Arc<Self> {
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
            fail_row,
        })
    }
}

#[async_trait]
impl EmailGateway for RecordingGateway {
    async fn send(&self, request: &DispatchRequest, body: &str) -> Result<(), DispatchError> {
        if Some(request.row_number) == self.fail_row {
            return Err(DispatchError::SendFailed {
                reason: "mailbox unavailable".to_string(),
            });
        }
        self.sent.lock().unwrap().push((
            request.row_number,
            request.recipients.clone(),
            request.subject.clone(),
            body.to_string(),
        ));
        Ok(())
    }
}

const CAMPAIGN: &str = "\
Email,First Name,To Send,Sent,Sent At
alice@example.com,Alice,true,,
bob@example.com,Bob,true,,
carol@example.com,Carol,true,,
dave@example.com,Dave,true,true,2026-01-01 09:00:00
";

fn zero_throttle() -> MergeConfig {
    MergeConfig {
        throttle: ThrottleBounds {
            seconds_min: 0,
            seconds_max: 0,
        },
        ..MergeConfig::default()
    }
}

fn settings() -> CampaignSettings {
    CampaignSettings {
        template_id: "welcome".to_string(),
        default_subject: "Welcome aboard".to_string(),
    }
}

struct Fixture {
    _dir: tempfile::TempDir,
    csv_path: PathBuf,
    gateway: Arc<RecordingGateway>,
    coordinator: WorkflowCoordinator,
}

fn fixture(fail_row: Option<u32>) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let csv_path = dir.path().join("campaign.csv");
    std::fs::write(&csv_path, CAMPAIGN).unwrap();
    std::fs::write(
        dir.path().join("welcome.txt"),
        "Dear $First Name$,\n\nWelcome aboard!\n",
    )
    .unwrap();

    let config = zero_throttle();
    let source: Arc<dyn TabularSource> = Arc::new(CsvSource::open(&csv_path, 1).unwrap());
    let gateway = RecordingGateway::new(fail_row);
    let store = Arc::new(FileTemplateStore::new(dir.path()));

    let coordinator = WorkflowCoordinator::new(
        Arc::clone(&source),
        Composer::new(config.clone()),
        TemplateEngine::new(store, config.marker),
        DispatchController::new(
            Arc::clone(&gateway) as Arc<dyn EmailGateway>,
            source,
            config.clone(),
        ),
        Arc::new(AlwaysConfirm),
        config,
    );

    Fixture {
        _dir: dir,
        csv_path,
        gateway,
        coordinator,
    }
}

#[tokio::test]
async fn batch_over_csv_sends_marks_and_persists() {
    let fx = fixture(None);

    let outcome = fx.coordinator.run(&settings()).await.unwrap();
    let summary = match outcome {
        RunOutcome::Completed(summary) => summary,
        other => panic!("Expected Completed, got {:?}", other),
    };
    assert_eq!(summary.sent, 3);
    assert!(summary.failures.is_empty());

    let sends = fx.gateway.sent.lock().unwrap().clone();
    assert_eq!(sends.len(), 3);
    // Dave (already sent) is not a candidate.
    assert_eq!(
        sends.iter().map(|s| s.0).collect::<Vec<_>>(),
        vec![2, 3, 4]
    );
    assert!(sends[0].3.starts_with("Dear Alice,"));
    assert_eq!(sends[1].2, "Welcome aboard");

    // Marks survived to disk: reopening the file shows them.
    let reopened = CsvSource::open(&fx.csv_path, 1).unwrap();
    let snapshot = reopened.load_snapshot().await.unwrap();
    for row in &snapshot.rows()[..3] {
        assert!(row.is_truthy(3), "row {} should be marked sent", row.number);
        assert!(!row.is_truthy(2), "row {} to-send should be cleared", row.number);
        let stamp = row.text(4);
        assert!(
            chrono::NaiveDateTime::parse_from_str(&stamp, "%Y-%m-%d %H:%M:%S").is_ok(),
            "row {} timestamp {stamp:?} is not in the fixed format",
            row.number
        );
    }
}

#[tokio::test]
async fn failed_row_stays_unmarked_and_batch_completes() {
    let fx = fixture(Some(3));

    let outcome = fx.coordinator.run(&settings()).await.unwrap();
    let summary = match outcome {
        RunOutcome::Completed(summary) => summary,
        other => panic!("Expected Completed, got {:?}", other),
    };
    assert_eq!(summary.sent, 2);
    assert_eq!(summary.failures.len(), 1);
    assert_eq!(summary.failures[0].row, 3);
    assert!(summary.failures[0].message.contains("mailbox unavailable"));

    // Bob's row is untouched on disk; Alice and Carol are marked.
    let reopened = CsvSource::open(&fx.csv_path, 1).unwrap();
    let snapshot = reopened.load_snapshot().await.unwrap();
    let by_number = |n: u32| {
        snapshot
            .rows()
            .iter()
            .find(|r| r.number == n)
            .unwrap()
            .clone()
    };
    assert!(by_number(2).is_truthy(3));
    assert!(!by_number(3).is_truthy(3));
    assert!(by_number(3).is_truthy(2), "failed row keeps its to-send flag");
    assert!(by_number(4).is_truthy(3));

    // A re-run re-selects only what is still eligible: exactly Bob.
    let gateway2 = RecordingGateway::new(None);
    let config = zero_throttle();
    let source2: Arc<dyn TabularSource> = Arc::new(CsvSource::open(&fx.csv_path, 1).unwrap());
    let store = Arc::new(FileTemplateStore::new(fx._dir.path()));
    let coordinator2 = WorkflowCoordinator::new(
        Arc::clone(&source2),
        Composer::new(config.clone()),
        TemplateEngine::new(store, config.marker),
        DispatchController::new(
            Arc::clone(&gateway2) as Arc<dyn EmailGateway>,
            source2,
            config.clone(),
        ),
        Arc::new(AlwaysConfirm),
        config,
    );

    let outcome = coordinator2.run(&settings()).await.unwrap();
    match outcome {
        RunOutcome::Completed(summary) => {
            assert_eq!(summary.sent, 1);
            let sends = gateway2.sent.lock().unwrap().clone();
            assert_eq!(sends.len(), 1);
            assert_eq!(sends[0].0, 3);
            assert_eq!(sends[0].1, "bob@example.com");
        }
        other => panic!("Expected Completed, got {:?}", other),
    }
}
