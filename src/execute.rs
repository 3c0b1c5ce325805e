//! Apply planned decisions to the filesystem and the index.
//!
//! Runs single-threaded after the decision engine has fully populated the
//! queue. Individual failures are logged and skipped; the return value is
//! the number of bytes freed (or that would be freed, in a dry run).

use std::collections::VecDeque;

use filetime::FileTime;

use crate::decide::{Action, Decision};
use crate::index::StatIndex;
use crate::util::{human_size, NANOS_PER_SEC};

fn file_time_from_ns(ns: i64) -> FileTime {
    FileTime::from_unix_time(ns.div_euclid(NANOS_PER_SEC), ns.rem_euclid(NANOS_PER_SEC) as u32)
}

/// Drain the decision queue. Returns cumulative freed bytes.
pub fn execute_decisions(decisions: VecDeque<Decision>, index: &StatIndex, dry_run: bool) -> u64 {
    let mut saved_space: u64 = 0;

    for decision in decisions {
        let path = &decision.file_info.path;
        match decision.action {
            Action::Undefined => {
                tracing::error!("Undefined action for file {path}, skipping...");
            }
            Action::NoAction => {
                tracing::debug!("Keeping file {path} (no action).");
            }
            Action::Keep => {
                tracing::info!("Keeping file {path}.");
            }
            Action::Link => {
                tracing::warn!("Hardlinking not yet implemented, keeping file {path}");
            }
            Action::Retime => {
                let Some(time) = decision.time else {
                    tracing::error!("Retime action for file {path} has no time set, skipping...");
                    continue;
                };
                if dry_run {
                    tracing::info!("Dry run: would update modified time of file {path} to {time}.");
                    continue;
                }
                let atime = file_time_from_ns(decision.file_info.accessed);
                let mtime = file_time_from_ns(time);
                match filetime::set_file_times(path.as_std_path(), atime, mtime) {
                    Ok(()) => {
                        tracing::info!("Updated modified time of file {path} to {time}.");
                    }
                    Err(e) => tracing::error!("Error updating modified time of file {path}: {e}"),
                }
            }
            Action::Trash => {
                let duplicate_note = decision
                    .target
                    .as_ref()
                    .map(|t| format!(", duplicate of {t}"))
                    .unwrap_or_default();
                if dry_run {
                    tracing::info!("Dry run: would send to trash file {path}{duplicate_note}");
                    saved_space += decision.file_info.size;
                    continue;
                }
                match trash::delete(path.as_std_path()) {
                    Ok(()) => {
                        if let Err(e) = index.pop_by_index(decision.file_index) {
                            tracing::error!("Failed to drop index entry for {path}: {e}");
                        }
                        saved_space += decision.file_info.size;
                        tracing::info!(
                            "Sent to trash file {path}{duplicate_note}. Freed {}.",
                            human_size(decision.file_info.size)
                        );
                    }
                    Err(e) => tracing::error!("Error sending file {path} to trash: {e}"),
                }
            }
            Action::Delete => {
                let duplicate_note = decision
                    .target
                    .as_ref()
                    .map(|t| format!(", duplicate of {t}"))
                    .unwrap_or_default();
                if dry_run {
                    tracing::info!("Dry run: would delete file {path}{duplicate_note}");
                    saved_space += decision.file_info.size;
                    continue;
                }
                match std::fs::remove_file(path.as_std_path()) {
                    Ok(()) => {
                        if let Err(e) = index.pop_by_index(decision.file_index) {
                            tracing::error!("Failed to drop index entry for {path}: {e}");
                        }
                        saved_space += decision.file_info.size;
                        tracing::info!(
                            "Deleted file {path}{duplicate_note}, freed {}.",
                            human_size(decision.file_info.size)
                        );
                    }
                    Err(e) => tracing::error!("Error deleting file {path}: {e}"),
                }
            }
        }
    }

    saved_space
}
