//! Filesystem scenario tests for the scan → decide → execute pipeline.


use crate::config::{
    Config, DirectoryConfig, GeneralConfig, PerformanceConfig, Policy, SubdirSpec,
};
use crate::fingerprint::{HashAlgorithm, DEFAULT_CHUNK_SIZE};
use crate::index::StatIndex;
use crate::logging::LogConfig;
use crate::pattern::Pattern;
use camino::{Utf8Path, Utf8PathBuf};

pub(crate) fn utf8(path: &std::path::Path) -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(path.to_path_buf()).unwrap()
}

pub(crate) fn write_file(dir: &Utf8Path, name: &str, content: &[u8]) -> Utf8PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, content).unwrap();
    path
}

pub(crate) fn dir_config(path: &Utf8Path, policy: Policy, priority: i64) -> DirectoryConfig {
    DirectoryConfig {
        path: path.to_owned(),
        priority,
        subdirs: SubdirSpec::Enabled(true),
        policy,
        rename: false,
        pattern: None,
        skip_subdirs: Vec::new(),
        hidden: false,
    }
}

pub(crate) fn test_config(directories: Vec<DirectoryConfig>) -> Config {
    Config {
        directories,
        pattern: Pattern::match_all(),
        logging: LogConfig::default(),
        performance: PerformanceConfig {
            algorithm: HashAlgorithm::Sha256,
            max_threads: 1,
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_read: None,
            small_file_size: None,
        },
        general: GeneralConfig {
            follow_symlinks: false,
            dry_run: false,
            confirm_deletion: true,
            cache_file: None,
        },
    }
}

pub(crate) fn loaded_index() -> StatIndex {
    let index = StatIndex::new(None);
    index.load().unwrap();
    index
}
