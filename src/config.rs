//! Runtime configuration for a reading session.

use std::path::{Path, PathBuf};

/// Default target size of one allocator block, in bytes.
pub const DEFAULT_BLOCK_SIZE: u32 = 131_072;

/// Default minimum criterion score a language matcher must clear.
pub const DEFAULT_LANGUAGE_THRESHOLD: f64 = 0.0;

/// Bundles the knobs a host tunes for one [`crate::epub::read_book`] call.
///
/// Constructed with [`ReaderConfig::new`] and refined through chained
/// `with_*` methods, mirroring the rest of the crate's builder-style APIs.
#[derive(Debug, Clone)]
pub struct ReaderConfig {
    pub cache_dir: PathBuf,
    pub block_size: u32,
    pub language_threshold: f64,
    pub skip_encrypted: bool,
}

impl ReaderConfig {
    pub fn new<P: AsRef<Path>>(cache_dir: P) -> Self {
        Self {
            cache_dir: cache_dir.as_ref().to_path_buf(),
            block_size: DEFAULT_BLOCK_SIZE,
            language_threshold: DEFAULT_LANGUAGE_THRESHOLD,
            skip_encrypted: false,
        }
    }

    pub fn with_block_size(mut self, block_size: u32) -> Self {
        self.block_size = block_size;
        self
    }

    pub fn with_language_threshold(mut self, threshold: f64) -> Self {
        self.language_threshold = threshold;
        self
    }

    /// When true, encrypted spine items are skipped entirely instead of
    /// being surfaced as an encrypted-section paragraph.
    pub fn with_skip_encrypted(mut self, skip: bool) -> Self {
        self.skip_encrypted = skip;
        self
    }
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self::new(std::env::temp_dir().join("boko-cache"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_spec_constants() {
        let config = ReaderConfig::default();
        assert_eq!(config.block_size, 131_072);
        assert!(!config.skip_encrypted);
    }

    #[test]
    fn builder_chain_overrides_fields() {
        let config = ReaderConfig::new("/tmp/cache")
            .with_block_size(4096)
            .with_language_threshold(0.5)
            .with_skip_encrypted(true);
        assert_eq!(config.block_size, 4096);
        assert_eq!(config.language_threshold, 0.5);
        assert!(config.skip_encrypted);
    }
}
