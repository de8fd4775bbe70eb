use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Local};

use crate::classify::MediaKind;
use crate::metadata::{Field, MetadataStore, DATETIME_FORMAT};

/// Probe order for images.
const IMAGE_DATE_FIELDS: &[Field] = &[
    Field::DateTimeOriginal,
    Field::CreateDate,
    Field::ModifyDate,
];

/// Probe order for videos.
const VIDEO_DATE_FIELDS: &[Field] = &[
    Field::DateTimeOriginal,
    Field::CreateDate,
    Field::TrackCreateDate,
    Field::MediaCreateDate,
];

/// Capture date of a media file, reduced to the grouping key the mover
/// needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedDate {
    pub year: String,
    pub month: String,
    pub datetime: String,
}

impl ResolvedDate {
    /// Split a `YYYY:MM:DD HH:MM:SS` value into its grouping components.
    fn from_datetime(datetime: String) -> Option<Self> {
        let mut parts = datetime.split(':');
        let year = parts.next()?.to_string();
        let month = parts.next()?.to_string();
        if year.len() != 4 || month.len() != 2 {
            return None;
        }
        Some(Self {
            year,
            month,
            datetime,
        })
    }
}

/// Determine when a file was taken: the first usable metadata field wins,
/// filesystem modification time otherwise. The filename is never
/// consulted here.
pub fn resolve_capture_date(
    store: &dyn MetadataStore,
    path: &Path,
    kind: MediaKind,
) -> Result<ResolvedDate> {
    let fields: &[Field] = match kind {
        MediaKind::Image => IMAGE_DATE_FIELDS,
        MediaKind::Video => VIDEO_DATE_FIELDS,
        MediaKind::Unsupported => &[],
    };

    for field in fields {
        match store.read(path, *field) {
            Ok(Some(value)) if is_usable(&value) => {
                if let Some(resolved) = ResolvedDate::from_datetime(value) {
                    return Ok(resolved);
                }
            }
            Ok(_) => {}
            Err(e) => {
                tracing::debug!("{}: could not read {}: {}", path.display(), field, e);
            }
        }
    }

    mtime_date(path)
}

/// Some cameras write `0000:00:00 00:00:00` placeholders; those never win
/// over the mtime fallback.
fn is_usable(value: &str) -> bool {
    !value.is_empty() && !value.starts_with("0000")
}

fn mtime_date(path: &Path) -> Result<ResolvedDate> {
    let mtime = std::fs::metadata(path)
        .and_then(|meta| meta.modified())
        .with_context(|| format!("cannot stat {}", path.display()))?;
    let local: DateTime<Local> = mtime.into();
    let datetime = local.format(DATETIME_FORMAT).to_string();
    ResolvedDate::from_datetime(datetime)
        .context("modification time did not format as a calendar date")
}
