//! Tests for configuration parsing.

use crate::config::{parse_config, Policy, SubdirSpec};
use crate::fingerprint::HashAlgorithm;
use crate::index::FileStat;
use crate::pattern::Pattern;
use camino::Utf8PathBuf;

fn stat(path: &str, size: u64) -> FileStat {
    FileStat {
        path: Utf8PathBuf::from(path),
        size,
        modified: 0,
        accessed: 0,
        created: 0,
        inode: 1,
        device: 1,
    }
}

#[test]
fn minimal_config_gets_defaults() {
    let config = parse_config("directories:\n  - path: /data\n").unwrap();

    assert_eq!(config.directories.len(), 1);
    let dir = &config.directories[0];
    assert_eq!(dir.path, "/data");
    assert_eq!(dir.priority, 0);
    assert_eq!(dir.subdirs, SubdirSpec::Enabled(true));
    assert_eq!(dir.policy, Policy::Prompt);
    assert!(!dir.rename);
    assert!(dir.pattern.is_none());
    assert!(dir.skip_subdirs.is_empty());
    assert!(!dir.hidden);

    // The global pattern defaults to match-everything.
    assert!(config.pattern.matches(&stat("/data/x", 1), 0));

    assert_eq!(config.performance.algorithm, HashAlgorithm::Sha256);
    assert_eq!(config.performance.max_threads, 1);
    assert_eq!(config.performance.chunk_size, 8 * 1024);
    assert_eq!(config.performance.max_read, None);
    assert_eq!(config.performance.small_file_size, None);

    assert!(!config.general.follow_symlinks);
    assert!(!config.general.dry_run);
    assert!(config.general.confirm_deletion);
    assert_eq!(config.general.cache_file, None);
}

#[test]
fn full_directory_entry() {
    let text = r#"
directories:
  - path: /photos
    priority: 5
    subdirs: 2
    policy: keep
    rename: true
    pattern: "['.jpg']"
    skip_subdirs: [thumbs, cache]
    hidden: true
  - path: /downloads
    policy: "discard!"
    subdirs: false
"#;
    let config = parse_config(text).unwrap();
    let photos = &config.directories[0];
    assert_eq!(photos.priority, 5);
    assert_eq!(photos.subdirs, SubdirSpec::Depth(2));
    assert_eq!(photos.subdirs.depth_cap(), 2);
    assert_eq!(photos.policy, Policy::Keep);
    assert!(photos.rename);
    assert!(photos.pattern.is_some());
    assert_eq!(photos.skip_subdirs, vec!["thumbs", "cache"]);
    assert!(photos.hidden);

    let downloads = &config.directories[1];
    assert_eq!(downloads.policy, Policy::Discard);
    assert_eq!(downloads.subdirs, SubdirSpec::Enabled(false));
    assert_eq!(downloads.subdirs.depth_cap(), 0);
}

#[test]
fn policy_weights_and_ordering() {
    assert_eq!(Policy::Keep.weight(), 100);
    assert_eq!(Policy::Prompt.weight(), 75);
    assert_eq!(Policy::Hardlink.weight(), 50);
    assert_eq!(Policy::Trash.weight(), 40);
    assert_eq!(Policy::Delete.weight(), 30);
    assert_eq!(Policy::Discard.weight(), 20);
    assert_eq!(Policy::Erase.weight(), 10);
    assert_eq!(Policy::NoAction.weight(), 0);

    assert!(Policy::Keep > Policy::Trash);
    assert!(Policy::Trash > Policy::Delete);
    assert!(Policy::Delete > Policy::NoAction);
}

#[test]
fn unknown_policy_is_rejected() {
    let text = "directories:\n  - path: /d\n    policy: vaporize\n";
    assert!(parse_config(text).is_err());
}

#[test]
fn performance_sizes_accept_strings_and_integers() {
    let text = r#"
performance:
  algorithm: xxh3
  max_threads: 4
  chunk_size: 64KiB
  max_read: 1048576
  small_file_size: 1MB
"#;
    let config = parse_config(text).unwrap();
    assert_eq!(config.performance.algorithm, HashAlgorithm::Xxh3);
    assert_eq!(config.performance.max_threads, 4);
    assert_eq!(config.performance.chunk_size, 64 * 1024);
    assert_eq!(config.performance.max_read, Some(1_048_576));
    assert_eq!(config.performance.small_file_size, Some(1 << 20));
}

#[test]
fn zero_threads_means_auto() {
    let config = parse_config("performance:\n  max_threads: 0\n").unwrap();
    assert!(config.performance.max_threads >= 1);
}

#[test]
fn legacy_algorithm_name_is_accepted() {
    let config = parse_config("performance:\n  algorithm: md5\n").unwrap();
    assert_eq!(config.performance.algorithm, HashAlgorithm::Sha256);

    assert!(parse_config("performance:\n  algorithm: crc32\n").is_err());
}

#[test]
fn match_tree_name_list() {
    let text = r#"
match:
  name: ['.jpg', '/^IMG.*$/', 'exact.txt']
"#;
    let config = parse_config(text).unwrap();
    assert!(config.pattern.matches(&stat("/d/photo.jpg", 1), 0));
    assert!(config.pattern.matches(&stat("/d/IMG_001.raw", 1), 0));
    assert!(config.pattern.matches(&stat("/d/exact.txt", 1), 0));
    assert!(!config.pattern.matches(&stat("/d/other.bin", 1), 0));
}

#[test]
fn match_tree_include_exclude() {
    let text = r#"
match:
  include:
    size:
      min: 10
  exclude:
    name: ['.tmp']
"#;
    let config = parse_config(text).unwrap();
    assert!(config.pattern.matches(&stat("/d/big.bin", 100), 0));
    assert!(!config.pattern.matches(&stat("/d/small.bin", 5), 0));
    assert!(!config.pattern.matches(&stat("/d/big.tmp", 100), 0));
}

#[test]
fn match_tree_size_bounds() {
    let text = r#"
match:
  size:
    min: 1KB
    max: 1MB
"#;
    let config = parse_config(text).unwrap();
    match &config.pattern {
        Pattern::Size(size) => {
            assert_eq!(size.min, Some(1024));
            assert_eq!(size.max, Some(1 << 20));
        }
        other => panic!("expected size leaf, got {other:?}"),
    }
}

#[test]
fn match_tree_pattern_string() {
    let text = r#"
match:
  pattern: "(['.txt']&[10B..])"
"#;
    let config = parse_config(text).unwrap();
    assert!(config.pattern.matches(&stat("/d/a.txt", 50), 0));
    assert!(!config.pattern.matches(&stat("/d/a.txt", 5), 0));
    assert!(!config.pattern.matches(&stat("/d/a.md", 50), 0));
}

#[test]
fn match_tree_null_pattern_string_is_rejected() {
    let text = "match:\n  pattern: \"[..]\"\n";
    assert!(parse_config(text).is_err());
}

#[test]
fn unknown_match_node_is_rejected() {
    assert!(parse_config("match:\n  flavor: [sweet]\n").is_err());
}

#[test]
fn unknown_top_level_key_is_rejected() {
    assert!(parse_config("surprises: true\n").is_err());
}
