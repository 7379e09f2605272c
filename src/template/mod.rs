//! Template rendering: placeholder substitution over a disposable
//! working copy of a stored template.

pub mod file_store;

pub use file_store::FileTemplateStore;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;
use tracing::warn;

use crate::error::RenderError;

/// A disposable, exclusively owned working copy of one template.
///
/// Acquired, substituted, read, and released within a single row's
/// processing step; never shared or retained across rows.
#[async_trait]
pub trait WorkingCopy: Send {
    /// Apply one pattern substitution across the copy's text content.
    async fn substitute(&mut self, pattern: &Regex, replacement: &str)
    -> Result<(), RenderError>;

    /// Commit pending substitutions.
    async fn commit(&mut self) -> Result<(), RenderError>;

    /// Reopen the committed copy and extract its final text. Reading back
    /// rather than trusting the in-memory view guards a stale cache.
    async fn read_text(&mut self) -> Result<String, RenderError>;

    /// Release the copy. Idempotent.
    async fn discard(&mut self) -> Result<(), RenderError>;
}

/// Template storage addressable by opaque identifier.
#[async_trait]
pub trait TemplateStore: Send + Sync {
    /// Produce an independent working copy; the source template is never
    /// mutated.
    async fn create_working_copy(
        &self,
        template_id: &str,
    ) -> Result<Box<dyn WorkingCopy>, RenderError>;
}

/// Merges a variable map into a stored template and returns the fully
/// substituted plain-text body.
pub struct TemplateEngine {
    store: Arc<dyn TemplateStore>,
    marker: char,
}

impl TemplateEngine {
    pub fn new(store: Arc<dyn TemplateStore>, marker: char) -> Self {
        Self { store, marker }
    }

    /// Placeholder pattern for one variable key: the key wrapped in the
    /// marker character on both sides, tolerating arbitrary whitespace
    /// between marker and key (`$Key$` and `$ Key $` both match). The key
    /// is escaped, so labels may contain pattern metacharacters.
    pub fn placeholder_pattern(marker: char, key: &str) -> Result<Regex, RenderError> {
        let m = regex::escape(&marker.to_string());
        let pattern = format!("{m}\\s*{k}\\s*{m}", k = regex::escape(key));
        Regex::new(&pattern).map_err(|e| RenderError::SubstitutionFailed {
            key: key.to_string(),
            reason: e.to_string(),
        })
    }

    /// Render `template_id` with `variables`.
    ///
    /// The working copy is discarded on every exit path (success,
    /// substitution failure, or read failure).
    pub async fn render(
        &self,
        template_id: &str,
        variables: &HashMap<String, String>,
    ) -> Result<String, RenderError> {
        let mut copy = self.store.create_working_copy(template_id).await?;
        let result = self.apply(copy.as_mut(), variables).await;
        if let Err(e) = copy.discard().await {
            warn!(template_id, error = %e, "Failed to discard working copy");
        }
        result
    }

    async fn apply(
        &self,
        copy: &mut dyn WorkingCopy,
        variables: &HashMap<String, String>,
    ) -> Result<String, RenderError> {
        for (key, value) in variables {
            let pattern = Self::placeholder_pattern(self.marker, key)?;
            copy.substitute(&pattern, value).await?;
        }
        copy.commit().await?;
        copy.read_text().await
    }
}
