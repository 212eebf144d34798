//! Pre-transfer probe: what the server expects vs what is on disk.

/// Sizes learned immediately before a transfer. Computed per job from the
/// HEAD probe and local file metadata; never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadProbe {
    /// Content length reported by the HEAD probe, when the server sent one.
    pub expected_size: Option<u64>,
    /// Bytes already on disk at the destination path.
    pub already_written: u64,
    /// Whether this endpoint honors range requests.
    pub supports_range: bool,
}

impl DownloadProbe {
    /// Whether the transfer can be skipped entirely.
    ///
    /// - a local file exactly the expected size is complete;
    /// - without a reliable content length, any non-empty local file is
    ///   assumed complete unless overwriting;
    /// - a non-empty local file on a range-less endpoint cannot be
    ///   resumed, so it is likewise assumed complete.
    #[must_use]
    pub fn can_skip(&self, overwrite: bool) -> bool {
        if overwrite || self.already_written == 0 {
            return false;
        }
        match self.expected_size {
            Some(expected) => self.already_written == expected || !self.supports_range,
            None => true,
        }
    }

    /// The byte offset a resume should continue from, if resuming is safe.
    ///
    /// The on-disk byte count is only trusted when it is strictly smaller
    /// than the expected size; a local file *larger* than expected is
    /// corrupt and forces a full re-download instead.
    #[must_use]
    pub fn resume_offset(&self) -> Option<u64> {
        if !self.supports_range || self.already_written == 0 {
            return None;
        }
        match self.expected_size {
            Some(expected) if self.already_written < expected => Some(self.already_written),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn probe(expected: Option<u64>, written: u64, ranges: bool) -> DownloadProbe {
        DownloadProbe {
            expected_size: expected,
            already_written: written,
            supports_range: ranges,
        }
    }

    #[test]
    fn test_fresh_download_never_skips() {
        assert!(!probe(Some(1000), 0, true).can_skip(false));
        assert!(!probe(None, 0, false).can_skip(false));
    }

    #[test]
    fn test_complete_file_skips() {
        assert!(probe(Some(1000), 1000, true).can_skip(false));
    }

    #[test]
    fn test_overwrite_disables_skip() {
        assert!(!probe(Some(1000), 1000, true).can_skip(true));
    }

    #[test]
    fn test_unknown_length_nonzero_local_skips() {
        assert!(probe(None, 512, true).can_skip(false));
    }

    #[test]
    fn test_rangeless_partial_skips_rather_than_redownload() {
        assert!(probe(Some(1000), 400, false).can_skip(false));
    }

    #[test]
    fn test_partial_with_ranges_resumes() {
        let p = probe(Some(1000), 400, true);
        assert!(!p.can_skip(false));
        assert_eq!(p.resume_offset(), Some(400));
    }

    #[test]
    fn test_oversized_local_file_forces_full_redownload() {
        let p = probe(Some(1000), 1400, true);
        assert!(!p.can_skip(false));
        assert_eq!(p.resume_offset(), None);
    }

    #[test]
    fn test_no_resume_without_range_support_or_length() {
        assert_eq!(probe(Some(1000), 400, false).resume_offset(), None);
        assert_eq!(probe(None, 400, true).resume_offset(), None);
    }
}
