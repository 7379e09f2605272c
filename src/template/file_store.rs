//! Filesystem template store.
//!
//! A template id resolves to a UTF-8 text file under the templates
//! directory (`<id>` or `<id>.txt`). The working copy is a sibling temp
//! file with a collision-resistant UUID suffix; dropping an undisposed
//! copy removes the file as a backstop.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use regex::Regex;
use uuid::Uuid;

use crate::error::RenderError;
use crate::template::{TemplateStore, WorkingCopy};

pub struct FileTemplateStore {
    dir: PathBuf,
}

impl FileTemplateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn resolve(&self, template_id: &str) -> Option<PathBuf> {
        let direct = self.dir.join(template_id);
        if direct.is_file() {
            return Some(direct);
        }
        let with_ext = self.dir.join(format!("{template_id}.txt"));
        with_ext.is_file().then_some(with_ext)
    }
}

#[async_trait]
impl TemplateStore for FileTemplateStore {
    async fn create_working_copy(
        &self,
        template_id: &str,
    ) -> Result<Box<dyn WorkingCopy>, RenderError> {
        let source = self
            .resolve(template_id)
            .ok_or_else(|| RenderError::TemplateNotFound {
                id: template_id.to_string(),
            })?;

        let bytes = std::fs::read(&source)?;
        let text = String::from_utf8(bytes).map_err(|_| RenderError::NotText {
            id: template_id.to_string(),
        })?;

        let copy_path = self
            .dir
            .join(format!(".{template_id}.{}.tmp", Uuid::new_v4()));
        std::fs::write(&copy_path, &text)?;

        Ok(Box::new(FileWorkingCopy {
            path: copy_path,
            text,
            discarded: false,
        }))
    }
}

struct FileWorkingCopy {
    path: PathBuf,
    text: String,
    discarded: bool,
}

#[async_trait]
impl WorkingCopy for FileWorkingCopy {
    async fn substitute(
        &mut self,
        pattern: &Regex,
        replacement: &str,
    ) -> Result<(), RenderError> {
        self.text = pattern
            .replace_all(&self.text, regex::NoExpand(replacement))
            .into_owned();
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), RenderError> {
        std::fs::write(&self.path, &self.text)?;
        Ok(())
    }

    async fn read_text(&mut self) -> Result<String, RenderError> {
        std::fs::read_to_string(&self.path).map_err(|e| RenderError::ReadBackFailed {
            reason: format!("{}: {e}", self.path.display()),
        })
    }

    async fn discard(&mut self) -> Result<(), RenderError> {
        if self.discarded {
            return Ok(());
        }
        self.discarded = true;
        remove_if_present(&self.path)?;
        Ok(())
    }
}

impl Drop for FileWorkingCopy {
    fn drop(&mut self) {
        if !self.discarded {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

fn remove_if_present(path: &Path) -> std::io::Result<()> {
    match std::fs::remove_file(path) {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}
