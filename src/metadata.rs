use std::fmt;
use std::path::Path;
use std::process::Command;

use anyhow::{bail, Context, Result};

#[cfg(test)]
use mockall::automock;

/// Embedded timestamp fields this tool reads and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    DateTimeOriginal,
    CreateDate,
    ModifyDate,
    TrackCreateDate,
    TrackModifyDate,
    MediaCreateDate,
    MediaModifyDate,
}

impl Field {
    pub fn tag_name(&self) -> &'static str {
        match self {
            Field::DateTimeOriginal => "DateTimeOriginal",
            Field::CreateDate => "CreateDate",
            Field::ModifyDate => "ModifyDate",
            Field::TrackCreateDate => "TrackCreateDate",
            Field::TrackModifyDate => "TrackModifyDate",
            Field::MediaCreateDate => "MediaCreateDate",
            Field::MediaModifyDate => "MediaModifyDate",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag_name())
    }
}

/// The pattern every timestamp value uses when crossing the store
/// boundary, in both directions.
pub const DATETIME_FORMAT: &str = "%Y:%m:%d %H:%M:%S";

/// Read/write access to embedded metadata timestamps.
/// Injected into the orchestrators so production runs against exiftool
/// while tests substitute an in-memory double.
#[cfg_attr(test, automock)]
pub trait MetadataStore {
    /// Read one field, formatted as `YYYY:MM:DD HH:MM:SS`. A field the
    /// file does not carry is `Ok(None)`; `Err` means the tool itself
    /// failed on this file.
    fn read(&self, path: &Path, field: Field) -> Result<Option<String>>;

    /// Write all given fields to the file in a single pass.
    fn write_many(&self, path: &Path, fields: &[(Field, String)]) -> Result<()>;
}

/// Production store backed by the `exiftool` command-line tool.
pub struct ExifToolStore;

impl ExifToolStore {
    pub fn new() -> Self {
        Self
    }

    /// Probe for a usable exiftool binary and return its version. Called
    /// once before any file is touched; a missing tool aborts the whole
    /// run.
    pub fn ensure_available() -> Result<String> {
        let output = Command::new("exiftool")
            .arg("-ver")
            .output()
            .context("exiftool is not installed or not found in PATH")?;
        if !output.status.success() {
            bail!("exiftool -ver exited with {}", output.status);
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

impl Default for ExifToolStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MetadataStore for ExifToolStore {
    fn read(&self, path: &Path, field: Field) -> Result<Option<String>> {
        let output = Command::new("exiftool")
            .arg("-j")
            .arg("-d")
            .arg(DATETIME_FORMAT)
            .arg(format!("-{}", field.tag_name()))
            .arg(path)
            .output()
            .with_context(|| format!("failed to run exiftool on {}", path.display()))?;
        if !output.status.success() {
            bail!(
                "exiftool failed on {}: {}",
                path.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        let entries: Vec<serde_json::Value> =
            serde_json::from_slice(&output.stdout).context("exiftool produced unparsable JSON")?;
        let value = entries
            .first()
            .and_then(|entry| entry.get(field.tag_name()))
            .and_then(|value| value.as_str())
            .filter(|value| !value.is_empty())
            .map(str::to_string);
        Ok(value)
    }

    fn write_many(&self, path: &Path, fields: &[(Field, String)]) -> Result<()> {
        if fields.is_empty() {
            return Ok(());
        }

        let mut command = Command::new("exiftool");
        // -P preserves the filesystem mtime across the rewrite
        command.arg("-overwrite_original").arg("-P");
        for (field, value) in fields {
            command.arg(format!("-{}={}", field.tag_name(), value));
        }
        let output = command
            .arg(path)
            .output()
            .with_context(|| format!("failed to run exiftool on {}", path.display()))?;
        if !output.status.success() {
            bail!(
                "exiftool write failed on {}: {}",
                path.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(())
    }
}
