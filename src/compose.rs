//! Per-row composition: resolves addresses, subject, sender options, and
//! the template variable map from a snapshot row.

use std::collections::HashMap;

use crate::config::{CampaignSettings, MergeConfig};
use crate::error::ComposeError;
use crate::source::headers;
use crate::source::snapshot::{Row, TableSnapshot};

/// Options bundle handed to the email gateway alongside the recipients.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendOptions {
    pub cc: Option<String>,
    pub bcc: Option<String>,
    pub reply_to: Option<String>,
    pub from_email: Option<String>,
    pub from_name: Option<String>,
}

/// Fully resolved recipient/subject/options bundle ready for dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchRequest {
    pub row_number: u32,
    /// Comma-separated recipient list.
    pub recipients: String,
    pub subject: String,
    pub options: SendOptions,
}

/// Normalize a multi-address cell into a `", "`-joined list.
///
/// Accepts comma-, semicolon-, and newline-separated input; entries are
/// trimmed and empties dropped. No deduplication; the list is forwarded
/// as the operator wrote it.
pub fn normalize_address_list(raw: &str) -> String {
    raw.replace(';', ",")
        .split([',', '\n'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Builds dispatch requests and template variable maps for snapshot rows.
pub struct Composer {
    config: MergeConfig,
}

impl Composer {
    pub fn new(config: MergeConfig) -> Self {
        Self { config }
    }

    /// Resolve the outbound address set, effective subject, and sender
    /// options for one row.
    pub fn build_dispatch_request(
        &self,
        snapshot: &TableSnapshot,
        row: &Row,
        settings: &CampaignSettings,
    ) -> Result<DispatchRequest, ComposeError> {
        let email_index =
            snapshot
                .get_index("email")
                .ok_or_else(|| ComposeError::MissingColumn {
                    name: "email".to_string(),
                })?;
        let recipients = normalize_address_list(&row.text(email_index));
        if recipients.is_empty() {
            return Err(ComposeError::MissingRecipient { row: row.number });
        }

        let cc = self.address_list(snapshot, row, "cc");
        let bcc = self.address_list(snapshot, row, "bcc");

        let no_reply = snapshot
            .get_index("no reply")
            .is_some_and(|i| row.is_truthy(i));

        let row_from_name = self.non_empty_text(snapshot, row, "from name");

        let options = if no_reply {
            // Sender is forced to the configured no-reply address; row-level
            // reply-to and from-email are ignored. The display name keeps a
            // row-level value when given, otherwise the no-reply fallback.
            SendOptions {
                cc,
                bcc,
                reply_to: None,
                from_email: Some(self.config.no_reply_address.clone()),
                from_name: row_from_name.or_else(|| Some(self.config.no_reply_name.clone())),
            }
        } else {
            SendOptions {
                cc,
                bcc,
                reply_to: self.address_list(snapshot, row, "reply to"),
                from_email: self.non_empty_text(snapshot, row, "from email"),
                from_name: row_from_name,
            }
        };

        let subject = self
            .non_empty_text(snapshot, row, "subject")
            .unwrap_or_else(|| settings.default_subject.clone());

        Ok(DispatchRequest {
            row_number: row.number,
            recipients,
            subject,
            options,
        })
    }

    /// Map every non-reserved, non-control header label to the row's
    /// stringified cell value (`Empty` → `""`).
    pub fn build_template_variables(
        &self,
        snapshot: &TableSnapshot,
        row: &Row,
    ) -> HashMap<String, String> {
        let mut variables = HashMap::new();
        for (i, label) in snapshot.headers().iter().enumerate() {
            let normalized = headers::normalize(label);
            if normalized.is_empty() {
                continue;
            }
            if self.config.is_reserved(&normalized) || self.config.is_control_header(&normalized) {
                continue;
            }
            variables.insert(label.clone(), row.text(i));
        }
        variables
    }

    fn address_list(&self, snapshot: &TableSnapshot, row: &Row, name: &str) -> Option<String> {
        let index = snapshot.get_index(name)?;
        let list = normalize_address_list(&row.text(index));
        (!list.is_empty()).then_some(list)
    }

    fn non_empty_text(&self, snapshot: &TableSnapshot, row: &Row, name: &str) -> Option<String> {
        let index = snapshot.get_index(name)?;
        let text = row.text(index).trim().to_string();
        (!text.is_empty()).then_some(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::cell::CellValue;

    fn settings() -> CampaignSettings {
        CampaignSettings {
            template_id: "welcome".to_string(),
            default_subject: "Default subject".to_string(),
        }
    }

    fn config() -> MergeConfig {
        MergeConfig {
            no_reply_address: "no-reply@example.com".to_string(),
            ..MergeConfig::default()
        }
    }

    fn snapshot_with_row(headers: &[&str], cells: &[&str]) -> (TableSnapshot, Row) {
        let row = Row::new(
            2,
            cells.iter().map(|c| CellValue::parse(c)).collect(),
        );
        let snap = TableSnapshot::new(
            headers.iter().map(|s| s.to_string()).collect(),
            vec![row.clone()],
        );
        (snap, row)
    }

    // ── Address list normalization tests ────────────────────────────

    #[test]
    fn address_list_accepts_mixed_separators() {
        assert_eq!(
            normalize_address_list("a@x.com; b@x.com,c@x.com\nd@x.com"),
            "a@x.com, b@x.com, c@x.com, d@x.com"
        );
    }

    #[test]
    fn address_list_trims_and_drops_empties() {
        assert_eq!(
            normalize_address_list("  a@x.com ,, ;\n b@x.com  "),
            "a@x.com, b@x.com"
        );
        assert_eq!(normalize_address_list("   "), "");
    }

    #[test]
    fn address_list_never_deduplicates() {
        assert_eq!(
            normalize_address_list("a@x.com, a@x.com"),
            "a@x.com, a@x.com"
        );
    }

    // ── Dispatch request tests ──────────────────────────────────────

    #[test]
    fn minimal_row_uses_default_subject() {
        let (snap, row) = snapshot_with_row(&["Email"], &["alice@x.com"]);
        let request = Composer::new(config())
            .build_dispatch_request(&snap, &row, &settings())
            .unwrap();
        assert_eq!(request.row_number, 2);
        assert_eq!(request.recipients, "alice@x.com");
        assert_eq!(request.subject, "Default subject");
        assert_eq!(request.options, SendOptions::default());
    }

    #[test]
    fn row_subject_overrides_default() {
        let (snap, row) = snapshot_with_row(
            &["Email", "Subject"],
            &["alice@x.com", "Special offer"],
        );
        let request = Composer::new(config())
            .build_dispatch_request(&snap, &row, &settings())
            .unwrap();
        assert_eq!(request.subject, "Special offer");
    }

    #[test]
    fn blank_row_subject_falls_back_to_default() {
        let (snap, row) = snapshot_with_row(&["Email", "Subject"], &["alice@x.com", "  "]);
        let request = Composer::new(config())
            .build_dispatch_request(&snap, &row, &settings())
            .unwrap();
        assert_eq!(request.subject, "Default subject");
    }

    #[test]
    fn empty_email_is_missing_recipient() {
        let (snap, row) = snapshot_with_row(&["Email", "Name"], &["", "Alice"]);
        let err = Composer::new(config())
            .build_dispatch_request(&snap, &row, &settings())
            .unwrap_err();
        assert!(matches!(err, ComposeError::MissingRecipient { row: 2 }));
    }

    #[test]
    fn cc_bcc_and_reply_to_are_normalized() {
        let (snap, row) = snapshot_with_row(
            &["Email", "CC", "BCC", "Reply-To"],
            &[
                "alice@x.com",
                "b@x.com; c@x.com",
                "",
                "boss@x.com",
            ],
        );
        let request = Composer::new(config())
            .build_dispatch_request(&snap, &row, &settings())
            .unwrap();
        assert_eq!(request.options.cc.as_deref(), Some("b@x.com, c@x.com"));
        assert_eq!(request.options.bcc, None);
        assert_eq!(request.options.reply_to.as_deref(), Some("boss@x.com"));
    }

    #[test]
    fn no_reply_forces_sender_and_ignores_overrides() {
        let (snap, row) = snapshot_with_row(
            &["Email", "No Reply", "Reply-To", "From Email"],
            &["alice@x.com", "true", "boss@x.com", "me@x.com"],
        );
        let request = Composer::new(config())
            .build_dispatch_request(&snap, &row, &settings())
            .unwrap();
        assert_eq!(request.options.reply_to, None);
        assert_eq!(
            request.options.from_email.as_deref(),
            Some("no-reply@example.com")
        );
        assert_eq!(request.options.from_name.as_deref(), Some("No reply"));
    }

    #[test]
    fn no_reply_keeps_row_level_display_name() {
        let (snap, row) = snapshot_with_row(
            &["Email", "No Reply", "From Name"],
            &["alice@x.com", "yes", "Billing Team"],
        );
        let request = Composer::new(config())
            .build_dispatch_request(&snap, &row, &settings())
            .unwrap();
        assert_eq!(request.options.from_name.as_deref(), Some("Billing Team"));
        assert_eq!(
            request.options.from_email.as_deref(),
            Some("no-reply@example.com")
        );
    }

    #[test]
    fn overrides_apply_when_no_reply_is_false() {
        let (snap, row) = snapshot_with_row(
            &["Email", "No Reply", "From Email", "From Name"],
            &["alice@x.com", "false", "team@x.com", "The Team"],
        );
        let request = Composer::new(config())
            .build_dispatch_request(&snap, &row, &settings())
            .unwrap();
        assert_eq!(request.options.from_email.as_deref(), Some("team@x.com"));
        assert_eq!(request.options.from_name.as_deref(), Some("The Team"));
    }

    // ── Template variable tests ─────────────────────────────────────

    #[test]
    fn variables_exclude_reserved_and_control_headers() {
        let (snap, row) = snapshot_with_row(
            &["Email", "First Name", "To Send", "Sent", "Sent At", "CC", "Topic"],
            &["a@x.com", "Alice", "true", "", "", "", "Rust"],
        );
        let vars = Composer::new(config()).build_template_variables(&snap, &row);
        assert_eq!(vars.len(), 2);
        assert_eq!(vars.get("First Name").map(String::as_str), Some("Alice"));
        assert_eq!(vars.get("Topic").map(String::as_str), Some("Rust"));
    }

    #[test]
    fn variables_use_display_labels_and_stringified_values() {
        let (snap, row) = snapshot_with_row(
            &["Email", "Count", "Joined"],
            &["a@x.com", "42", "2026-01-15T10:00:00Z"],
        );
        let vars = Composer::new(config()).build_template_variables(&snap, &row);
        assert_eq!(vars.get("Count").map(String::as_str), Some("42"));
        assert_eq!(
            vars.get("Joined").map(String::as_str),
            Some("2026-01-15 10:00:00")
        );
    }

    #[test]
    fn empty_cells_map_to_empty_strings() {
        let (snap, row) = snapshot_with_row(&["Email", "Nickname"], &["a@x.com", ""]);
        let vars = Composer::new(config()).build_template_variables(&snap, &row);
        assert_eq!(vars.get("Nickname").map(String::as_str), Some(""));
    }

    #[test]
    fn header_named_email_never_becomes_a_variable() {
        let (snap, row) = snapshot_with_row(&["Email"], &["a@x.com"]);
        let vars = Composer::new(config()).build_template_variables(&snap, &row);
        assert!(vars.is_empty());
    }
}
