//! Directory walking and the parallel fingerprint pipeline.
//!
//! Enumeration walks each configured directory with its own depth cap and
//! pruning rules, stats every regular file (lstat, so symlinked trees are
//! not silently entered), and feeds candidates to a fixed pool of
//! fingerprint workers over one shared channel. Each worker reconciles its
//! candidate against the stat index: new files are fingerprinted and
//! inserted, moved files are recognized by `(device, inode)` and
//! relocated without a rehash when their identity checks out, and files
//! already up to date are skipped. Filesystem errors on individual files
//! are logged and never abort the walk.
//!
//! After all workers have joined, paths still indexed but not visited in
//! this run are swept out as stale.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};

use camino::{Utf8Path, Utf8PathBuf};
use crossbeam::channel::{Receiver, Sender};
use dashmap::DashSet;

use crate::config::{Config, DirectoryConfig};
use crate::fingerprint::{first_16b, hash_file};
use crate::index::{FileStat, StatIndex};
use crate::pattern::FileMeta;
use crate::util::{now_ns, system_time_ns};
use crate::{anyhow_loc, function_name};

const CANDIDATE_CHANNEL_BOUND: usize = 1024;

#[derive(Debug, Default)]
pub struct ScanSummary {
    pub visited: usize,
    pub added: usize,
    pub updated: usize,
    pub stale_removed: usize,
}

// ----------------------------------------------------------------------------
// Stat
// ----------------------------------------------------------------------------

/// Stat a path into a [`FileStat`]. Uses lstat unless symlink following is
/// on, so a symlink is described as itself rather than its target.
pub fn read_file_stat(path: &Utf8Path, follow_symlinks: bool) -> io::Result<FileStat> {
    let meta = if follow_symlinks {
        fs::metadata(path)?
    } else {
        fs::symlink_metadata(path)?
    };

    let (device, inode) = file_identity(path, &meta);

    Ok(FileStat {
        path: path.to_owned(),
        size: meta.len(),
        modified: system_time_ns(meta.modified().ok()),
        accessed: system_time_ns(meta.accessed().ok()),
        created: system_time_ns(meta.created().ok()),
        inode,
        device,
    })
}

#[cfg(unix)]
fn file_identity(_path: &Utf8Path, meta: &fs::Metadata) -> (u64, u64) {
    use std::os::unix::fs::MetadataExt;
    (meta.dev(), meta.ino())
}

#[cfg(not(unix))]
fn file_identity(path: &Utf8Path, _meta: &fs::Metadata) -> (u64, u64) {
    // No stable storage identity off unix; derive one from the path so the
    // (device, inode) key stays unique. Rename detection is lost.
    (0, xxhash_rust::xxh3::xxh3_64(path.as_str().as_bytes()))
}

fn is_hidden(name: &str, path: &std::path::Path) -> bool {
    if name.starts_with('.') {
        return true;
    }
    #[cfg(windows)]
    {
        use std::os::windows::fs::MetadataExt;
        const FILE_ATTRIBUTE_HIDDEN: u32 = 0x2;
        if let Ok(meta) = fs::symlink_metadata(path) {
            return meta.file_attributes() & FILE_ATTRIBUTE_HIDDEN != 0;
        }
    }
    let _ = path;
    false
}

// ----------------------------------------------------------------------------
// Enumeration
// ----------------------------------------------------------------------------

fn enumerate_directory(dircfg: &DirectoryConfig, follow_symlinks: bool, tx: &Sender<FileStat>) {
    let skip: HashSet<String> = dircfg.skip_subdirs.iter().cloned().collect();
    let show_hidden = dircfg.hidden;

    let walker = jwalk::WalkDir::new(dircfg.path.as_std_path())
        .skip_hidden(false)
        .follow_links(follow_symlinks)
        // depth cap counts directories below the root; files sit one level
        // deeper than the directories they live in
        .max_depth(dircfg.subdirs.depth_cap().saturating_add(1))
        .parallelism(jwalk::Parallelism::Serial)
        .process_read_dir(move |_depth, _dir, _state, children| {
            children.retain(|entry| {
                let Ok(entry) = entry else { return true };
                let name = entry.file_name().to_string_lossy();
                if entry.file_type().is_dir() && skip.contains(name.as_ref()) {
                    return false;
                }
                if !show_hidden && is_hidden(&name, &entry.path()) {
                    return false;
                }
                true
            });
        });

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!("Walk error under {}: {e}", dircfg.path);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let path = match Utf8PathBuf::from_path_buf(entry.path()) {
            Ok(path) => path,
            Err(path) => {
                tracing::warn!("Skipping non-UTF-8 path {}", path.display());
                continue;
            }
        };
        match read_file_stat(&path, follow_symlinks) {
            Ok(stat) => {
                if tx.send(stat).is_err() {
                    return;
                }
            }
            Err(e) => tracing::error!("Error accessing file {path}: {e}"),
        }
    }
}

// ----------------------------------------------------------------------------
// DirectoryConfig selection
// ----------------------------------------------------------------------------

/// Resolve the responsible directory config for a file:
/// ancestors whose pattern (if any) matches, deepest first and declaration
/// order within a depth, narrowed to pattern-carrying configs when any
/// remain, then to the maximum `priority`, then to the highest-priority
/// policy. The first survivor wins, which makes the final tie-break
/// "deepest ancestor, then declaration order".
pub fn directory_config_for<'a, F: FileMeta>(
    file: &F,
    directories: &'a [DirectoryConfig],
    now_ns: i64,
) -> Option<&'a DirectoryConfig> {
    let mut candidates: Vec<(usize, usize, &DirectoryConfig)> = Vec::new();
    for (decl_order, dircfg) in directories.iter().enumerate() {
        let Ok(relative) = file.path().strip_prefix(&dircfg.path) else {
            continue;
        };
        if let Some(pattern) = &dircfg.pattern {
            if !pattern.matches(file, now_ns) {
                continue;
            }
        }
        let distance = relative.components().count().saturating_sub(1);
        candidates.push((distance, decl_order, dircfg));
    }

    if candidates.is_empty() {
        return None;
    }
    candidates.sort_by_key(|&(distance, decl_order, _)| (distance, decl_order));

    if candidates.iter().any(|(_, _, d)| d.pattern.is_some()) {
        candidates.retain(|(_, _, d)| d.pattern.is_some());
    }

    let highest_priority = candidates.iter().map(|(_, _, d)| d.priority).max()?;
    candidates.retain(|(_, _, d)| d.priority == highest_priority);

    let mut best = candidates[0].2;
    for &(_, _, dircfg) in &candidates[1..] {
        if dircfg.policy.weight() > best.policy.weight() {
            best = dircfg;
        }
    }
    Some(best)
}

// ----------------------------------------------------------------------------
// Candidate reconciliation
// ----------------------------------------------------------------------------

struct ScanCounters {
    added: AtomicUsize,
    updated: AtomicUsize,
}

fn process_candidate(
    stat: FileStat,
    config: &Config,
    index: &StatIndex,
    visited: &DashSet<Utf8PathBuf>,
    now: i64,
    counters: &ScanCounters,
) {
    if !config.pattern.matches(&stat, now) {
        return;
    }
    // Overlapping directory configs can emit the same path twice.
    if visited.contains(&stat.path) {
        return;
    }
    if directory_config_for(&stat, &config.directories, now).is_none() {
        return;
    }
    if !visited.insert(stat.path.clone()) {
        return;
    }

    let path = stat.path.clone();
    if let Err(e) = reconcile(stat, config, index, counters) {
        tracing::error!("Error accessing file {path}: {e}");
    }
}

fn reconcile(
    stat: FileStat,
    config: &Config,
    index: &StatIndex,
    counters: &ScanCounters,
) -> anyhow::Result<()> {
    let perf = &config.performance;
    let full_hash = |path: &Utf8Path| -> io::Result<String> {
        hash_file(path, perf.algorithm, perf.chunk_size, perf.max_read)
    };

    let by_path = index.find_by_path(&stat.path)?;
    let by_dvin = index.find_by_device_inode(stat.device, stat.inode)?;

    match (by_path, by_dvin) {
        (None, None) => {
            // First sighting.
            let f16b = first_16b(&stat.path)?;
            let hash = full_hash(&stat.path)?;
            let info = stat.complete(hash, f16b);
            tracing::info!(
                "Added file: {} (size: {}, modified: {}, hash: {})",
                info.path,
                info.size,
                info.modified,
                info.file_hash
            );
            index.add_item(info).map_err(|e| anyhow_loc!("{}", e))?;
            counters.added.fetch_add(1, Ordering::Relaxed);
        }
        (Some((idx, _)), None) => {
            // Same path, different storage object: replaced in place.
            let f16b = first_16b(&stat.path)?;
            let hash = full_hash(&stat.path)?;
            let info = stat.complete(hash, f16b);
            tracing::info!(
                "Updated file: {} (size: {}, modified: {}, hash: {})",
                info.path,
                info.size,
                info.modified,
                info.file_hash
            );
            index.update_item(info, Some(idx)).map_err(|e| anyhow_loc!("{}", e))?;
            counters.updated.fetch_add(1, Ordering::Relaxed);
        }
        (None, Some((idx, known))) => {
            reconcile_moved(stat, idx, known, config, index, counters)?;
        }
        (Some((_, by_path)), Some((_, by_dvin))) => {
            if by_path.path != by_dvin.path {
                tracing::warn!(
                    "File {} has conflicting index entries. Consider deleting cached data. Skipping...",
                    stat.path
                );
            } else {
                tracing::debug!(
                    "Processed file: {} (mtime: {}, size: {}, hash: {})",
                    by_path.path,
                    by_path.modified,
                    by_path.size,
                    by_path.file_hash
                );
            }
        }
    }
    Ok(())
}

/// The storage object is known but its path changed: moved or renamed.
/// Verify identity cheaply before trusting the old record.
fn reconcile_moved(
    stat: FileStat,
    idx: u64,
    known: crate::index::FileInfo,
    config: &Config,
    index: &StatIndex,
    counters: &ScanCounters,
) -> anyhow::Result<()> {
    let perf = &config.performance;
    let full_hash = |path: &Utf8Path| -> io::Result<String> {
        hash_file(path, perf.algorithm, perf.chunk_size, perf.max_read)
    };

    let f16b = first_16b(&stat.path)?;

    if stat.size != known.size || stat.modified != known.modified {
        // Contents changed too; treat as a brand-new file.
        let hash = full_hash(&stat.path)?;
        let info = stat.complete(hash, f16b);
        tracing::info!(
            "Added file: {} (size: {}, modified: {}, hash: {})",
            info.path,
            info.size,
            info.modified,
            info.file_hash
        );
        index.add_item(info).map_err(|e| anyhow_loc!("{}", e))?;
        counters.added.fetch_add(1, Ordering::Relaxed);
        return Ok(());
    }

    let small = match perf.small_file_size {
        None => true,
        Some(threshold) => stat.size <= threshold,
    };

    let identical = if small {
        full_hash(&stat.path)? == known.file_hash
    } else {
        f16b == known.first_16b
    };

    if identical {
        tracing::info!("Updated file path: {} -> {}", known.path, stat.path);
        index
            .relocate_item(idx, &stat.path)
            .map_err(|e| anyhow_loc!("{}", e))?;
        counters.updated.fetch_add(1, Ordering::Relaxed);
    } else {
        let hash = full_hash(&stat.path)?;
        let info = stat.complete(hash, f16b);
        tracing::info!(
            "Added file: {} (size: {}, modified: {}, hash: {})",
            info.path,
            info.size,
            info.modified,
            info.file_hash
        );
        index.add_item(info).map_err(|e| anyhow_loc!("{}", e))?;
        counters.added.fetch_add(1, Ordering::Relaxed);
    }
    Ok(())
}

// ----------------------------------------------------------------------------
// The scan
// ----------------------------------------------------------------------------

/// Walk every configured directory, bring the index up to date, and sweep
/// out records whose paths were not seen in this run.
pub fn scan(config: &Config, index: &StatIndex) -> anyhow::Result<ScanSummary> {
    let now = now_ns();
    let visited: DashSet<Utf8PathBuf> = DashSet::new();
    let counters = ScanCounters {
        added: AtomicUsize::new(0),
        updated: AtomicUsize::new(0),
    };

    let workers = config.performance.max_threads.max(1);
    tracing::debug!("Starting file check with {workers} workers...");

    let (tx, rx) = crossbeam::channel::bounded::<FileStat>(CANDIDATE_CHANNEL_BOUND);

    std::thread::scope(|scope| {
        scope.spawn(move || {
            for dircfg in &config.directories {
                enumerate_directory(dircfg, config.general.follow_symlinks, &tx);
            }
            drop(tx);
        });

        for worker_id in 0..workers {
            let rx: Receiver<FileStat> = rx.clone();
            let visited = &visited;
            let counters = &counters;
            scope.spawn(move || {
                let _span = tracing::debug_span!("fingerprint_worker", id = worker_id).entered();
                while let Ok(stat) = rx.recv() {
                    process_candidate(stat, config, index, visited, now, counters);
                }
            });
        }
    });

    // Stale sweep: workers have joined, so `visited` is complete.
    let visited: HashSet<Utf8PathBuf> = visited.into_iter().collect();
    let mut stale_removed = 0usize;
    for path in index.paths()? {
        if !visited.contains(&path) {
            match index.pop_by_path(&path) {
                Ok(_) => {
                    tracing::info!("Removed stale file from index: {path}");
                    stale_removed += 1;
                }
                Err(e) => tracing::error!("Failed to remove stale entry {path}: {e}"),
            }
        }
    }

    let summary = ScanSummary {
        visited: visited.len(),
        added: counters.added.load(Ordering::Relaxed),
        updated: counters.updated.load(Ordering::Relaxed),
        stale_removed,
    };
    tracing::info!(
        "Index update complete. {} entries in index ({} added, {} updated, {} stale removed).",
        index.len(),
        summary.added,
        summary.updated,
        summary.stale_removed
    );
    Ok(summary)
}
