//! Pure predicates gating which discovered resources become jobs.
//!
//! A `Filters` value is validated once at construction and then evaluated
//! statelessly against candidates: file size, extension, filename, and
//! publish date. Every dimension has an "allow all" disabled state, and a
//! resource whose publish date is unknown always passes the date window —
//! failing closed would silently drop legitimate content.

use std::path::Path;

use chrono::{DateTime, Utc};
use regex::Regex;
use thiserror::Error;

/// Errors rejected at filter construction time, never at evaluation time.
#[derive(Debug, Error)]
pub enum FilterError {
    /// Minimum size exceeds maximum size.
    #[error("minimum file size ({min} bytes) cannot exceed maximum ({max} bytes)")]
    SizeRangeInverted {
        /// Configured minimum.
        min: u64,
        /// Configured maximum.
        max: u64,
    },

    /// Start of the date window is after its end.
    #[error("start date {start} cannot be after end date {end}")]
    DateRangeInverted {
        /// Configured window start.
        start: DateTime<Utc>,
        /// Configured window end.
        end: DateTime<Utc>,
    },

    /// An extension entry is empty or missing its leading dot.
    #[error("invalid file extension {0:?}: extensions must start with a period")]
    InvalidExtension(String),
}

/// Validated filter set.
///
/// `Filters::default()` allows everything.
#[derive(Debug, Clone, Default)]
pub struct Filters {
    /// Minimum file size in bytes; 0 disables the lower bound.
    min_size: u64,
    /// Maximum file size in bytes; `None` disables the upper bound.
    max_size: Option<u64>,
    /// Allowed extensions including the leading dot; empty allows all.
    extensions: Vec<String>,
    /// Filename pattern; `None` allows all.
    name_pattern: Option<Regex>,
    /// Publish-date window start; `None` disables it.
    start_date: Option<DateTime<Utc>>,
    /// Publish-date window end; `None` disables it.
    end_date: Option<DateTime<Utc>>,
}

impl Filters {
    /// Creates a validated filter set.
    ///
    /// Sizes are in bytes (`u64`, so negative sizes are unrepresentable);
    /// extensions must carry their leading dot and are deduplicated.
    ///
    /// # Errors
    ///
    /// Returns [`FilterError`] when `min_size > max_size`, `start > end`,
    /// or an extension entry is malformed.
    pub fn new(
        min_size: u64,
        max_size: Option<u64>,
        extensions: Vec<String>,
        name_pattern: Option<Regex>,
        start_date: Option<DateTime<Utc>>,
        end_date: Option<DateTime<Utc>>,
    ) -> Result<Self, FilterError> {
        if let Some(max) = max_size {
            if min_size > max {
                return Err(FilterError::SizeRangeInverted { min: min_size, max });
            }
        }
        if let (Some(start), Some(end)) = (start_date, end_date) {
            if start > end {
                return Err(FilterError::DateRangeInverted { start, end });
            }
        }

        let mut seen = Vec::with_capacity(extensions.len());
        for ext in extensions {
            let ext = ext.trim().to_ascii_lowercase();
            if ext.len() < 2 || !ext.starts_with('.') {
                return Err(FilterError::InvalidExtension(ext));
            }
            if !seen.contains(&ext) {
                seen.push(ext);
            }
        }

        Ok(Self {
            min_size,
            max_size,
            extensions: seen,
            name_pattern,
            start_date,
            end_date,
        })
    }

    /// Size-only convenience constructor.
    ///
    /// # Errors
    ///
    /// Returns [`FilterError::SizeRangeInverted`] when `min > max`.
    pub fn size_range(min_size: u64, max_size: Option<u64>) -> Result<Self, FilterError> {
        Self::new(min_size, max_size, Vec::new(), None, None, None)
    }

    /// Returns `true` when `size` falls inside the configured range.
    #[must_use]
    pub fn size_in_range(&self, size: u64) -> bool {
        if size < self.min_size {
            return false;
        }
        self.max_size.is_none_or(|max| size <= max)
    }

    /// Returns `true` when `extension` (with leading dot) is allowed.
    /// An empty allow-list allows everything.
    #[must_use]
    pub fn extension_allowed(&self, extension: &str) -> bool {
        if self.extensions.is_empty() {
            return true;
        }
        let extension = extension.to_ascii_lowercase();
        self.extensions.iter().any(|ext| *ext == extension)
    }

    /// Returns `true` when the path's extension is allowed.
    #[must_use]
    pub fn path_extension_allowed(&self, path: &Path) -> bool {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| format!(".{ext}"))
            .unwrap_or_default();
        self.extension_allowed(&extension)
    }

    /// Returns `true` when `file_name` matches the configured pattern
    /// (or no pattern is configured).
    #[must_use]
    pub fn file_name_allowed(&self, file_name: &str) -> bool {
        self.name_pattern
            .as_ref()
            .is_none_or(|pattern| pattern.is_match(file_name))
    }

    /// Returns `true` when the path's file name passes the name filter.
    #[must_use]
    pub fn path_file_name_allowed(&self, path: &Path) -> bool {
        let name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or_default();
        self.file_name_allowed(name)
    }

    /// Returns `true` when a resource published at `date` falls inside the
    /// window. Unknown dates (`None`) always pass.
    #[must_use]
    pub fn date_allowed(&self, date: Option<DateTime<Utc>>) -> bool {
        let Some(date) = date else {
            return true;
        };
        if self.start_date.is_some_and(|start| date < start) {
            return false;
        }
        !self.end_date.is_some_and(|end| date > end)
    }

    /// Combined path check: extension and filename.
    #[must_use]
    pub fn path_allowed(&self, path: &Path) -> bool {
        self.path_extension_allowed(path) && self.path_file_name_allowed(path)
    }
}
