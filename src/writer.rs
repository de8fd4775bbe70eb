use std::path::Path;

use anyhow::{bail, Context, Result};
use chrono::{Local, TimeZone};
use filetime::FileTime;

use crate::classify::{classify, MediaKind};
use crate::metadata::{Field, MetadataStore, DATETIME_FORMAT};

/// Fields stamped onto images during repair.
const IMAGE_WRITE_FIELDS: &[Field] = &[
    Field::DateTimeOriginal,
    Field::CreateDate,
    Field::ModifyDate,
];

/// Video containers carry track- and media-level copies of the same
/// clock; all of them are stamped.
const VIDEO_WRITE_FIELDS: &[Field] = &[
    Field::DateTimeOriginal,
    Field::CreateDate,
    Field::ModifyDate,
    Field::TrackCreateDate,
    Field::TrackModifyDate,
    Field::MediaCreateDate,
    Field::MediaModifyDate,
];

/// Applies a repaired instant to a file: filesystem times first, embedded
/// metadata second. A failed metadata write leaves the new mtime in
/// place; there is no rollback across the two steps.
pub struct TimestampWriter<'a> {
    store: &'a dyn MetadataStore,
    dry_run: bool,
}

impl<'a> TimestampWriter<'a> {
    pub fn new(store: &'a dyn MetadataStore, dry_run: bool) -> Self {
        Self { store, dry_run }
    }

    /// Render `instant` as local calendar time. Fails for values the
    /// calendar cannot represent; callers treat that like an invalid
    /// filename and skip the file untouched.
    pub fn format_instant(instant: i64) -> Result<String> {
        match Local.timestamp_opt(instant, 0).single() {
            Some(local) => Ok(local.format(DATETIME_FORMAT).to_string()),
            None => bail!("timestamp {} is outside the representable range", instant),
        }
    }

    pub fn apply(&self, path: &Path, instant: i64) -> Result<()> {
        // Format before mutating anything so an out-of-range value leaves
        // the file untouched
        let formatted = Self::format_instant(instant)?;
        let kind = classify(path);

        if self.dry_run {
            tracing::info!(
                "{}: would set mtime and metadata to {}",
                path.display(),
                formatted
            );
            return Ok(());
        }

        let file_time = FileTime::from_unix_time(instant, 0);
        filetime::set_file_times(path, file_time, file_time)
            .with_context(|| format!("failed to set mtime on {}", path.display()))?;

        let fields: &[Field] = match kind {
            MediaKind::Image => IMAGE_WRITE_FIELDS,
            MediaKind::Video => VIDEO_WRITE_FIELDS,
            // mtime is already updated; there is just no metadata to write
            MediaKind::Unsupported => return Ok(()),
        };
        let values: Vec<(Field, String)> = fields
            .iter()
            .map(|field| (*field, formatted.clone()))
            .collect();
        self.store
            .write_many(path, &values)
            .with_context(|| format!("failed to write metadata on {}", path.display()))?;
        Ok(())
    }
}
