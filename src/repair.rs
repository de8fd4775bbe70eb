use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Local};

use crate::metadata::{MetadataStore, DATETIME_FORMAT};
use crate::mover::MediaMover;
use crate::query::{DateWindow, FileQuery};
use crate::timestamp::parse_stem;
use crate::writer::TimestampWriter;

/// Extensions the repair scan enumerates. This only scopes the directory
/// walk; what gets metadata written is still decided by content.
pub const IMAGE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "bmp", "tiff", "heic", "cr2", "arw",
];
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "avi", "mkv"];

pub struct RepairOptions {
    pub root: PathBuf,
    pub recursive: bool,
    pub window: DateWindow,
    pub dry_run: bool,
}

/// Result of a repair run
#[derive(Debug, Default)]
pub struct RepairReport {
    pub candidates: usize,
    pub repaired: usize,
    pub skipped: usize,
    pub errors: Vec<String>,
}

/// Rewrites timestamps on files whose names encode a Unix instant. The
/// filename is the single source of truth here; existing metadata is
/// never read to decide what gets written.
pub struct TimestampRepairer<'a> {
    store: &'a dyn MetadataStore,
    options: RepairOptions,
    mover: Option<MediaMover<'a>>,
}

impl<'a> TimestampRepairer<'a> {
    pub fn new(store: &'a dyn MetadataStore, options: RepairOptions) -> Self {
        Self {
            store,
            options,
            mover: None,
        }
    }

    /// Chain every successfully repaired file straight into the mover.
    pub fn with_mover(mut self, mover: MediaMover<'a>) -> Self {
        self.mover = Some(mover);
        self
    }

    pub fn run(&self) -> Result<RepairReport> {
        if !self.options.root.is_dir() {
            bail!(
                "root directory does not exist: {}",
                self.options.root.display()
            );
        }

        let patterns: Vec<String> = IMAGE_EXTENSIONS
            .iter()
            .chain(VIDEO_EXTENSIONS)
            .map(|ext| format!("*.{}", ext))
            .collect();
        let query = FileQuery::new(&self.options.root)
            .recursive(self.options.recursive)
            .window(self.options.window)
            .patterns(&patterns)?;

        let writer = TimestampWriter::new(self.store, self.options.dry_run);
        let mut report = RepairReport::default();

        for path in query.run() {
            report.candidates += 1;
            match self.repair_one(&writer, &path) {
                Ok(true) => report.repaired += 1,
                Ok(false) => report.skipped += 1,
                Err(e) => {
                    report.skipped += 1;
                    report.errors.push(format!("{}: {:#}", path.display(), e));
                    tracing::error!("{}: {:#}", path.display(), e);
                }
            }
        }
        Ok(report)
    }

    fn repair_one(&self, writer: &TimestampWriter, path: &Path) -> Result<bool> {
        let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("");
        let Some(instant) = parse_stem(stem) else {
            tracing::warn!(
                "Skipping {}: filename is not a Unix timestamp",
                path.display()
            );
            return Ok(false);
        };

        let before = modified_time(path);
        writer.apply(path, instant)?;
        let after = modified_time(path);
        tracing::info!(
            "{}: mtime {} -> {}",
            path.display(),
            format_mtime(before),
            format_mtime(after)
        );

        if let Some(mover) = &self.mover {
            mover
                .move_one(path)
                .context("failed to organize repaired file")?;
        }
        Ok(true)
    }
}

fn modified_time(path: &Path) -> Option<DateTime<Local>> {
    std::fs::metadata(path)
        .and_then(|meta| meta.modified())
        .ok()
        .map(DateTime::<Local>::from)
}

fn format_mtime(mtime: Option<DateTime<Local>>) -> String {
    mtime
        .map(|t| t.format(DATETIME_FORMAT).to_string())
        .unwrap_or_else(|| "unknown".to_string())
}
