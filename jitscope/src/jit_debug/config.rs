//! Reader configuration

use std::path::PathBuf;
use std::time::Duration;

/// Default periodic read interval
pub const DEFAULT_READ_INTERVAL: Duration = Duration::from_millis(100);

/// Largest JIT symfile pulled out of a target
pub const DEFAULT_MAX_SYMFILE_SIZE: u64 = 1024 * 1024;

/// Basenames of the ART runtime library (release and debug builds)
pub const DEFAULT_RUNTIME_LIBRARY_NAMES: [&str; 2] = ["libart.so", "libartd.so"];

/// Knobs for [`super::JitDebugReader`]
///
/// ```
/// use jitscope::jit_debug::ReaderConfig;
///
/// let config = ReaderConfig::default().keep_symfiles(true).sync_with_records(true);
/// assert!(config.keep_symfiles);
/// ```
#[derive(Debug, Clone)]
pub struct ReaderConfig {
    /// Leave JIT symfiles on disk after the reader is dropped
    pub keep_symfiles: bool,
    /// Hold debug info until the record stream passes its timestamp
    pub sync_with_records: bool,
    pub read_interval: Duration,
    pub max_symfile_size: u64,
    pub symfile_dir: PathBuf,
    pub runtime_library_names: Vec<String>,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            keep_symfiles: false,
            sync_with_records: false,
            read_interval: DEFAULT_READ_INTERVAL,
            max_symfile_size: DEFAULT_MAX_SYMFILE_SIZE,
            symfile_dir: std::env::temp_dir(),
            runtime_library_names: DEFAULT_RUNTIME_LIBRARY_NAMES
                .iter()
                .map(ToString::to_string)
                .collect(),
        }
    }
}

impl ReaderConfig {
    #[must_use]
    pub fn keep_symfiles(mut self, keep: bool) -> Self {
        self.keep_symfiles = keep;
        self
    }

    #[must_use]
    pub fn sync_with_records(mut self, sync: bool) -> Self {
        self.sync_with_records = sync;
        self
    }

    #[must_use]
    pub fn read_interval(mut self, interval: Duration) -> Self {
        self.read_interval = interval;
        self
    }

    #[must_use]
    pub fn max_symfile_size(mut self, size: u64) -> Self {
        self.max_symfile_size = size;
        self
    }

    #[must_use]
    pub fn symfile_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.symfile_dir = dir.into();
        self
    }

    #[must_use]
    pub fn runtime_library_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.runtime_library_names = names.into_iter().map(Into::into).collect();
        self
    }

    /// Does the mapping `path` name the runtime library?
    #[must_use]
    pub fn is_runtime_library(&self, path: &str) -> bool {
        self.runtime_library_names
            .iter()
            .any(|name| path.ends_with(&format!("/{name}")) || path == name)
    }
}
