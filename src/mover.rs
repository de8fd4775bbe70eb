use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use crate::classify::{classify, MediaKind};
use crate::destination::{ensure_month_dir, resolve_destination, CollisionPolicy};
use crate::metadata::MetadataStore;
use crate::query::{FileQuery, THUMBNAIL_MARKER};
use crate::resolve::resolve_capture_date;

pub struct MoveOptions {
    pub target_root: PathBuf,
    pub recursive: bool,
    pub policy: CollisionPolicy,
    /// Copy instead of moving; the source stays in place.
    pub copy: bool,
    pub preserve_owner: bool,
    pub dry_run: bool,
}

/// Result of a mover run
#[derive(Debug, Default)]
pub struct MoveReport {
    pub candidates: usize,
    pub moved: usize,
    pub skipped: usize,
    pub errors: Vec<String>,
}

/// Relocates media into `<target>/<year>/<month>/` based on capture
/// metadata (mtime fallback). The filename is never consulted for the
/// date; that authority belongs to the repair pipeline alone.
pub struct MediaMover<'a> {
    store: &'a dyn MetadataStore,
    options: MoveOptions,
}

impl<'a> MediaMover<'a> {
    pub fn new(store: &'a dyn MetadataStore, options: MoveOptions) -> Self {
        Self { store, options }
    }

    /// Process a source file or directory tree. Per-file failures are
    /// collected and reported; only missing preconditions abort.
    pub fn run(&self, source: &Path) -> Result<MoveReport> {
        if !source.exists() {
            bail!("source path does not exist: {}", source.display());
        }
        fs::create_dir_all(&self.options.target_root).with_context(|| {
            format!(
                "failed to create target root {}",
                self.options.target_root.display()
            )
        })?;

        let mut report = MoveReport::default();

        if source.is_file() {
            report.candidates = 1;
            self.track(&mut report, source);
            return Ok(report);
        }

        let query = FileQuery::new(source)
            .recursive(self.options.recursive)
            .skip_thumbnails(true);
        for path in query.run() {
            report.candidates += 1;
            self.track(&mut report, &path);
        }
        Ok(report)
    }

    fn track(&self, report: &mut MoveReport, path: &Path) {
        match self.move_one(path) {
            Ok(Some(_)) => report.moved += 1,
            Ok(None) => report.skipped += 1,
            Err(e) => {
                report.skipped += 1;
                report.errors.push(format!("{}: {:#}", path.display(), e));
                tracing::error!("{}: {:#}", path.display(), e);
            }
        }
    }

    /// Move (or copy) one file into its year/month directory. `Ok(None)`
    /// means the file was out of scope and skipped, not an error.
    pub fn move_one(&self, path: &Path) -> Result<Option<PathBuf>> {
        if path.to_string_lossy().contains(THUMBNAIL_MARKER) {
            tracing::warn!("Skipping {}: vendor thumbnail artifact", path.display());
            return Ok(None);
        }

        let kind = classify(path);
        if kind == MediaKind::Unsupported {
            tracing::warn!("Skipping {}: unsupported content type", path.display());
            return Ok(None);
        }

        let date = resolve_capture_date(self.store, path, kind)?;
        let basename = path
            .file_name()
            .and_then(|name| name.to_str())
            .with_context(|| format!("{} has no usable file name", path.display()))?;

        if self.options.dry_run {
            let dest = self
                .options
                .target_root
                .join(&date.year)
                .join(&date.month)
                .join(basename);
            tracing::info!("Would move {} -> {}", path.display(), dest.display());
            return Ok(Some(dest));
        }

        let month_dir = ensure_month_dir(
            &self.options.target_root,
            &date.year,
            &date.month,
            self.options.preserve_owner,
        )?;
        let dest = resolve_destination(&month_dir, basename, self.options.policy);

        if self.options.copy {
            fs::copy(path, &dest)
                .with_context(|| format!("failed to copy to {}", dest.display()))?;
        } else {
            relocate(path, &dest)
                .with_context(|| format!("failed to move to {}", dest.display()))?;
        }
        tracing::info!("Moved {} -> {}", path.display(), dest.display());
        Ok(Some(dest))
    }
}

/// Rename, falling back to copy+remove when source and destination live
/// on different filesystems.
fn relocate(src: &Path, dst: &Path) -> std::io::Result<()> {
    match fs::rename(src, dst) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::CrossesDevices => {
            fs::copy(src, dst)?;
            fs::remove_file(src)
        }
        Err(e) => Err(e),
    }
}
