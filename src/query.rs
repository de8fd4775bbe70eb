use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::{bail, Context, Result};
use chrono::{Local, NaiveDate, NaiveDateTime, TimeZone};
use regex::RegexSet;
use walkdir::WalkDir;

/// Synology photo-station thumbnail marker. Paths carrying it are vendor
/// artifacts and are never organized.
pub const THUMBNAIL_MARKER: &str = "SYNOPHOTO_THUMB";

/// Optional modification-time window. Both bounds are strict: `after`
/// keeps files modified strictly later than the bound, `before` strictly
/// earlier.
#[derive(Debug, Clone, Copy, Default)]
pub struct DateWindow {
    pub after: Option<SystemTime>,
    pub before: Option<SystemTime>,
}

impl DateWindow {
    pub fn contains(&self, mtime: SystemTime) -> bool {
        if let Some(after) = self.after {
            if mtime <= after {
                return false;
            }
        }
        if let Some(before) = self.before {
            if mtime >= before {
                return false;
            }
        }
        true
    }

    pub fn is_unbounded(&self) -> bool {
        self.after.is_none() && self.before.is_none()
    }
}

const DATETIME_INPUT_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y/%m/%d %H:%M:%S"];
const DATE_INPUT_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%d.%m.%Y"];

/// Parse a user-supplied `--after`/`--before` value into an absolute
/// instant, interpreted in the local timezone. Accepts a small set of
/// common date and date-time shapes; anything else is a precondition
/// error for the whole run.
pub fn parse_instant(input: &str) -> Result<SystemTime> {
    let trimmed = input.trim();

    for format in DATETIME_INPUT_FORMATS {
        if let Ok(datetime) = NaiveDateTime::parse_from_str(trimmed, format) {
            return local_instant(datetime);
        }
    }
    for format in DATE_INPUT_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            if let Some(datetime) = date.and_hms_opt(0, 0, 0) {
                return local_instant(datetime);
            }
        }
    }

    bail!("unrecognized date: {:?}", trimmed)
}

fn local_instant(datetime: NaiveDateTime) -> Result<SystemTime> {
    let local = Local
        .from_local_datetime(&datetime)
        .earliest()
        .with_context(|| format!("{} does not exist in the local timezone", datetime))?;
    Ok(SystemTime::from(local))
}

/// Builds the candidate enumeration shared by both pipelines: which
/// directory, how deep, which basenames, which modification times.
pub struct FileQuery {
    root: PathBuf,
    recursive: bool,
    patterns: Option<RegexSet>,
    window: DateWindow,
    skip_thumbnails: bool,
}

impl FileQuery {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            recursive: false,
            patterns: None,
            window: DateWindow::default(),
            skip_thumbnails: false,
        }
    }

    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    pub fn window(mut self, window: DateWindow) -> Self {
        self.window = window;
        self
    }

    pub fn skip_thumbnails(mut self, skip: bool) -> Self {
        self.skip_thumbnails = skip;
        self
    }

    /// Case-insensitive basename globs (`*` and `?` wildcards). When any
    /// are given, a file must match at least one to qualify.
    pub fn patterns(mut self, globs: &[String]) -> Result<Self> {
        if globs.is_empty() {
            self.patterns = None;
            return Ok(self);
        }
        let regexes: Vec<String> = globs.iter().map(|glob| glob_to_regex(glob)).collect();
        let set = RegexSet::new(&regexes).context("invalid filename pattern")?;
        self.patterns = Some(set);
        Ok(self)
    }

    /// Lazily yields matching regular files. Traversal order follows the
    /// filesystem and is not guaranteed; nothing may rely on it beyond
    /// display.
    pub fn run(&self) -> impl Iterator<Item = PathBuf> + '_ {
        let depth = if self.recursive { usize::MAX } else { 1 };
        WalkDir::new(&self.root)
            .max_depth(depth)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .filter(move |path| self.matches(path))
    }

    fn matches(&self, path: &Path) -> bool {
        if self.skip_thumbnails && path.to_string_lossy().contains(THUMBNAIL_MARKER) {
            return false;
        }

        if let Some(set) = &self.patterns {
            let basename = match path.file_name().and_then(|name| name.to_str()) {
                Some(basename) => basename,
                None => return false,
            };
            if !set.is_match(basename) {
                return false;
            }
        }

        if !self.window.is_unbounded() {
            let mtime = match std::fs::metadata(path).and_then(|meta| meta.modified()) {
                Ok(mtime) => mtime,
                Err(_) => return false,
            };
            if !self.window.contains(mtime) {
                return false;
            }
        }

        true
    }
}

fn glob_to_regex(glob: &str) -> String {
    let mut regex = String::with_capacity(glob.len() + 8);
    regex.push_str("(?i)^");
    for c in glob.chars() {
        match c {
            '*' => regex.push_str(".*"),
            '?' => regex.push('.'),
            other => regex.push_str(&regex::escape(&other.to_string())),
        }
    }
    regex.push('$');
    regex
}
