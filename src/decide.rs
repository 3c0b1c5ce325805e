//! The decision engine: resolve per-directory policies into one action per
//! file of every duplicate group.
//!
//! For each group of records sharing a content hash, the engine picks a
//! **winner** (highest policy weight, ties broken by directory priority,
//! then by older mtime, then by insertion order) and walks the group again
//! assigning actions relative to that winner. `discard!` and `erase!`
//! apply to the winner even when the group has a single member. A
//! directory with the rename flag set retimes its surviving file to the
//! newest mtime among same-directory duplicates before the others go.

use std::collections::VecDeque;

use camino::Utf8PathBuf;

use crate::config::{Config, Policy};
use crate::error::IndexError;
use crate::index::{FileInfo, StatIndex};
use crate::scanner::directory_config_for;

/// Per-file verdict, totally ordered for tie-breaks: `Keep` is the
/// strongest, `Undefined` the weakest.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Action {
    Undefined,
    NoAction,
    Delete,
    Trash,
    Link,
    Retime,
    Keep,
}

#[derive(Clone, Debug)]
pub struct Decision {
    pub file_index: u64,
    pub file_info: FileInfo,
    pub action: Action,
    /// The winner path this file is a duplicate of, for trash/delete.
    pub target: Option<Utf8PathBuf>,
    /// Nanosecond mtime to write when the action is `Retime`.
    pub time: Option<i64>,
}

impl Decision {
    fn new(file_index: u64, file_info: FileInfo, action: Action) -> Self {
        Decision {
            file_index,
            file_info,
            action,
            target: None,
            time: None,
        }
    }
}

/// Walk the whole index grouped by hash and emit one decision per record.
pub fn plan_decisions(
    config: &Config,
    index: &StatIndex,
    now_ns: i64,
) -> Result<VecDeque<Decision>, IndexError> {
    let mut queue = VecDeque::new();
    for (_hash, idxs) in index.groups_by_hash()? {
        plan_group(config, index, &idxs, now_ns, &mut queue)?;
    }
    Ok(queue)
}

fn plan_group(
    config: &Config,
    index: &StatIndex,
    idxs: &[u64],
    now_ns: i64,
    queue: &mut VecDeque<Decision>,
) -> Result<(), IndexError> {
    struct Entry<'a> {
        idx: u64,
        info: FileInfo,
        dircfg: &'a crate::config::DirectoryConfig,
    }

    let mut entries: Vec<Entry<'_>> = Vec::new();
    for &idx in idxs {
        let Some(info) = index.find_by_index(idx)? else {
            tracing::error!("Error retrieving file info for index {idx}, skipping...");
            continue;
        };
        match directory_config_for(&info, &config.directories, now_ns) {
            Some(dircfg) => entries.push(Entry { idx, info, dircfg }),
            None => {
                // Unconfigured files are kept and excluded from the group.
                tracing::warn!(
                    "File {} has no matching directory configuration, keeping by default.",
                    info.path
                );
                queue.push_back(Decision::new(idx, info, Action::NoAction));
            }
        }
    }
    if entries.is_empty() {
        return Ok(());
    }

    // Winner: highest policy weight, then directory priority, then older
    // mtime. Strict comparisons keep the first maximal entry, i.e.
    // insertion order decides full ties.
    let mut winner_pos = 0;
    for pos in 1..entries.len() {
        let better_policy =
            entries[pos].dircfg.policy.weight() > entries[winner_pos].dircfg.policy.weight();
        let same_policy =
            entries[pos].dircfg.policy.weight() == entries[winner_pos].dircfg.policy.weight();
        let key = (entries[pos].dircfg.priority, -entries[pos].info.modified);
        let winner_key = (
            entries[winner_pos].dircfg.priority,
            -entries[winner_pos].info.modified,
        );
        if better_policy || (same_policy && key > winner_key) {
            winner_pos = pos;
        }
    }

    let winner_cfg = entries[winner_pos].dircfg;
    let winner_path = entries[winner_pos].info.path.clone();
    let winner_policy = winner_cfg.policy;

    let mut decisions: Vec<Decision> = entries
        .iter()
        .map(|e| Decision::new(e.idx, e.info.clone(), Action::Undefined))
        .collect();

    for pos in 0..entries.len() {
        let dircfg = entries[pos].dircfg;
        let mtime = entries[pos].info.modified;

        if pos == winner_pos {
            match dircfg.policy {
                // Unconditional policies hit the winner itself.
                Policy::Discard => decisions[pos].action = Action::Trash,
                Policy::Erase => decisions[pos].action = Action::Delete,
                Policy::Trash | Policy::Delete if dircfg.rename => {
                    decisions[pos].action = Action::Retime;
                    decisions[pos].time =
                        Some(decisions[pos].time.map_or(mtime, |t| t.max(mtime)));
                }
                _ => {
                    // Never downgrade a retime already accumulated from a
                    // same-directory duplicate.
                    if decisions[pos].action == Action::Undefined {
                        decisions[pos].action = Action::NoAction;
                    }
                }
            }
            continue;
        }

        if dircfg.path == winner_cfg.path
            && dircfg.rename
            && matches!(dircfg.policy, Policy::Trash | Policy::Delete)
        {
            // Same directory as the winner: the winner inherits this
            // file's mtime if newer, this file goes the way of its policy.
            // Anything weaker than retime is upgrade-eligible.
            match decisions[winner_pos].action {
                Action::Undefined | Action::NoAction | Action::Retime => {
                    decisions[winner_pos].action = Action::Retime;
                    decisions[winner_pos].time =
                        Some(decisions[winner_pos].time.map_or(mtime, |t| t.max(mtime)));
                }
                other => {
                    tracing::debug!(
                        "Winner {} already resolved to {:?}, not retiming",
                        winner_path,
                        other
                    );
                }
            }
            decisions[pos].action = match dircfg.policy {
                Policy::Trash => Action::Trash,
                _ => Action::Delete,
            };
            decisions[pos].target = Some(winner_path.clone());
            continue;
        }

        match dircfg.policy {
            Policy::Keep => decisions[pos].action = Action::Keep,
            Policy::Prompt => {
                tracing::warn!(
                    "Policy prompt not yet implemented, treating as keep for file {}...",
                    entries[pos].info.path
                );
                decisions[pos].action = Action::Keep;
            }
            Policy::Hardlink => {
                tracing::warn!(
                    "Policy hardlink not yet implemented, treating as keep for file {}...",
                    entries[pos].info.path
                );
                decisions[pos].action = Action::Keep;
            }
            Policy::Trash if winner_policy >= Policy::Trash => {
                decisions[pos].action = Action::Trash;
                decisions[pos].target = Some(winner_path.clone());
            }
            Policy::Delete if winner_policy >= Policy::Delete => {
                decisions[pos].action = Action::Delete;
                decisions[pos].target = Some(winner_path.clone());
            }
            _ => decisions[pos].action = Action::NoAction,
        }
    }

    for mut decision in decisions {
        // A retime that would write the file's current mtime is a no-op.
        if decision.action == Action::Retime && decision.time == Some(decision.file_info.modified)
        {
            decision.action = Action::NoAction;
            decision.time = None;
        }
        tracing::debug!(
            "Decision for file {}: {:?} (target: {:?})",
            decision.file_info.path,
            decision.action,
            decision.target
        );
        queue.push_back(decision);
    }
    Ok(())
}
