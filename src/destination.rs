use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Local;
use clap::ValueEnum;

/// How an occupied destination name is disambiguated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum CollisionPolicy {
    /// Append an incrementing `_1`, `_2`, … before the extension,
    /// re-checking until a free name is found.
    #[default]
    Counter,
    /// Append a compact timestamp of the current wall clock. Collisions
    /// within the same second are possible and deliberately not resolved
    /// further.
    Timestamp,
}

/// Create `target/year/month`, optionally propagating the owner of
/// `target` onto the directories created underneath it. Owner
/// propagation matters on NAS shares where this tool runs as root; a
/// failure there is a warning, never fatal.
pub fn ensure_month_dir(
    target_root: &Path,
    year: &str,
    month: &str,
    preserve_owner: bool,
) -> Result<PathBuf> {
    let month_dir = target_root.join(year).join(month);
    if !month_dir.exists() {
        fs::create_dir_all(&month_dir)
            .with_context(|| format!("failed to create directory {}", month_dir.display()))?;
        if preserve_owner {
            copy_owner(target_root, &month_dir);
        }
    }
    Ok(month_dir)
}

#[cfg(unix)]
fn copy_owner(source: &Path, month_dir: &Path) {
    use std::os::unix::fs::MetadataExt;

    let meta = match fs::metadata(source) {
        Ok(meta) => meta,
        Err(e) => {
            tracing::warn!(
                "{}: cannot stat for owner propagation: {}",
                source.display(),
                e
            );
            return;
        }
    };

    for dir in [month_dir.parent(), Some(month_dir)].into_iter().flatten() {
        if let Err(e) = std::os::unix::fs::chown(dir, Some(meta.uid()), Some(meta.gid())) {
            tracing::warn!("{}: failed to change owner: {}", dir.display(), e);
        }
    }
}

#[cfg(not(unix))]
fn copy_owner(_source: &Path, _month_dir: &Path) {}

/// Pick the final destination for `basename` inside the month directory.
/// The original basename is preserved whenever it is free; otherwise the
/// chosen policy appends a suffix before the (lowercased) extension.
pub fn resolve_destination(
    month_dir: &Path,
    basename: &str,
    policy: CollisionPolicy,
) -> PathBuf {
    let plain = month_dir.join(basename);
    if !plain.exists() {
        return plain;
    }

    let stem = Path::new(basename)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(basename);
    let extension = Path::new(basename)
        .extension()
        .and_then(|s| s.to_str())
        .map(str::to_lowercase);

    match policy {
        CollisionPolicy::Timestamp => {
            let suffix = Local::now().format("%Y%m%d%H%M%S").to_string();
            month_dir.join(suffixed_name(stem, &suffix, extension.as_deref()))
        }
        CollisionPolicy::Counter => {
            let mut counter = 1u32;
            loop {
                let candidate =
                    month_dir.join(suffixed_name(stem, &counter.to_string(), extension.as_deref()));
                if !candidate.exists() {
                    break candidate;
                }
                counter += 1;
            }
        }
    }
}

fn suffixed_name(stem: &str, suffix: &str, extension: Option<&str>) -> String {
    match extension {
        Some(extension) => format!("{}_{}.{}", stem, suffix, extension),
        None => format!("{}_{}", stem, suffix),
    }
}
