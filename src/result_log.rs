use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::debug;

use crate::error::{CaptionError, Result};

/// One accepted caption pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultLogEntry {
    pub original_name: String,
    pub base: String,
    pub marketing: String,
}

impl ResultLogEntry {
    pub fn new(
        original_name: impl Into<String>,
        base: impl Into<String>,
        marketing: impl Into<String>,
    ) -> Self {
        Self {
            original_name: original_name.into(),
            base: base.into(),
            marketing: marketing.into(),
        }
    }

    /// `<original_name>\t<base>\t<marketing>\n`, with field-internal tabs and
    /// line breaks flattened to spaces.
    pub fn to_line(&self) -> String {
        format!(
            "{}\t{}\t{}\n",
            flatten(&self.original_name),
            flatten(&self.base),
            flatten(&self.marketing)
        )
    }
}

fn flatten(field: &str) -> String {
    field.replace(['\t', '\r', '\n'], " ")
}

/// Append-only TSV log of accepted results. Appends from concurrent callers
/// are serialized so lines never interleave.
pub struct ResultLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl ResultLog {
    pub fn open(path: &Path) -> Result<Self> {
        let open = || -> std::io::Result<File> {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    fs::create_dir_all(parent)?;
                }
            }
            OpenOptions::new().create(true).append(true).open(path)
        };

        let file = open().map_err(|err| CaptionError::log_write(path, err))?;
        debug!("Result log open at {:?}", path);

        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
        })
    }

    pub fn append(&self, entry: &ResultLogEntry) -> Result<()> {
        let line = entry.to_line();
        let mut file = match self.file.lock() {
            Ok(guard) => guard,
            // appends are whole-line writes; nothing to repair after a panic
            Err(poisoned) => poisoned.into_inner(),
        };

        file.write_all(line.as_bytes())
            .and_then(|_| file.flush())
            .map_err(|err| CaptionError::log_write(&self.path, err))?;

        debug!(
            name = entry.original_name.as_str(),
            "Appended result to {:?}", self.path
        );
        Ok(())
    }
}
