//! Configuration document loading and validation.
//!
//! The document is YAML. Top-level keys: `directories` (ordered list of
//! per-directory configs), `match` (global pattern subtree), `logging`,
//! `performance`, `general`. Size-valued keys accept either an integer
//! byte count or an SI-suffixed string such as `8KiB`.

use std::env;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;

use crate::error::ConfigError;
use crate::fingerprint::{HashAlgorithm, DEFAULT_CHUNK_SIZE};
use crate::logging::LogConfig;
use crate::pattern::{
    parse_pattern, DateKind, GroupPattern, MergeMode, NameKind, NamePattern, Pattern,
};
use crate::util::{parse_duration, parse_size};

pub const CONFIG_ENV_VAR: &str = "FILESWEEP_CONFIG";

// ----------------------------------------------------------------------------
// Policy
// ----------------------------------------------------------------------------

/// What to do with files under a directory once duplicates are known.
/// `Discard` and `Erase` are unconditional siblings of `Trash` and
/// `Delete`: they apply even without a duplicate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Policy {
    Keep,
    Prompt,
    Hardlink,
    Trash,
    Delete,
    #[serde(rename = "discard!")]
    Discard,
    #[serde(rename = "erase!")]
    Erase,
    NoAction,
}

impl Policy {
    /// Fixed priority weight; higher wins when choosing a duplicate
    /// group's winner.
    pub fn weight(&self) -> u32 {
        match self {
            Policy::Keep => 100,
            Policy::Prompt => 75,
            Policy::Hardlink => 50,
            Policy::Trash => 40,
            Policy::Delete => 30,
            Policy::Discard => 20,
            Policy::Erase => 10,
            Policy::NoAction => 0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Policy::Keep => "keep",
            Policy::Prompt => "prompt",
            Policy::Hardlink => "hardlink",
            Policy::Trash => "trash",
            Policy::Delete => "delete",
            Policy::Discard => "discard!",
            Policy::Erase => "erase!",
            Policy::NoAction => "noaction",
        }
    }
}

impl PartialOrd for Policy {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Policy {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.weight().cmp(&other.weight())
    }
}

impl std::fmt::Display for Policy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Policy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "keep" => Ok(Policy::Keep),
            "prompt" => Ok(Policy::Prompt),
            "hardlink" => Ok(Policy::Hardlink),
            "trash" => Ok(Policy::Trash),
            "delete" => Ok(Policy::Delete),
            "discard!" => Ok(Policy::Discard),
            "erase!" => Ok(Policy::Erase),
            "noaction" => Ok(Policy::NoAction),
            other => Err(ConfigError::Directory {
                index: 0,
                message: format!("unknown policy {other:?}"),
            }),
        }
    }
}

// ----------------------------------------------------------------------------
// Directory configuration
// ----------------------------------------------------------------------------

/// `subdirs` accepts `true` (unbounded), `false` (no recursion) or an
/// integer maximum recursion depth.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum SubdirSpec {
    Enabled(bool),
    Depth(u32),
}

impl SubdirSpec {
    /// Maximum recursion depth below the configured root. "Unbounded" is a
    /// large sentinel.
    pub fn depth_cap(&self) -> usize {
        match self {
            SubdirSpec::Enabled(true) => 4096,
            SubdirSpec::Enabled(false) => 0,
            SubdirSpec::Depth(n) => *n as usize,
        }
    }
}

#[derive(Clone, Debug)]
pub struct DirectoryConfig {
    pub path: Utf8PathBuf,
    pub priority: i64,
    pub subdirs: SubdirSpec,
    pub policy: Policy,
    /// Retime the surviving duplicate to the newest same-directory
    /// duplicate's mtime before the others are removed.
    pub rename: bool,
    pub pattern: Option<Pattern>,
    pub skip_subdirs: Vec<String>,
    pub hidden: bool,
}

#[derive(Clone, Debug)]
pub struct PerformanceConfig {
    pub algorithm: HashAlgorithm,
    pub max_threads: usize,
    pub chunk_size: usize,
    pub max_read: Option<u64>,
    pub small_file_size: Option<u64>,
}

#[derive(Clone, Debug)]
pub struct GeneralConfig {
    pub follow_symlinks: bool,
    pub dry_run: bool,
    pub confirm_deletion: bool,
    pub cache_file: Option<Utf8PathBuf>,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub directories: Vec<DirectoryConfig>,
    pub pattern: Pattern,
    pub logging: LogConfig,
    pub performance: PerformanceConfig,
    pub general: GeneralConfig,
}

// ----------------------------------------------------------------------------
// Raw (serde) form
// ----------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    #[serde(default)]
    directories: Vec<RawDirectory>,
    #[serde(rename = "match", default)]
    match_tree: Option<serde_yaml::Value>,
    #[serde(default)]
    logging: LogConfig,
    #[serde(default)]
    performance: RawPerformance,
    #[serde(default)]
    general: RawGeneral,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawDirectory {
    path: Utf8PathBuf,
    #[serde(default)]
    priority: i64,
    #[serde(default = "default_subdirs")]
    subdirs: SubdirSpec,
    #[serde(default = "default_policy")]
    policy: Policy,
    #[serde(default)]
    rename: bool,
    #[serde(default)]
    pattern: Option<String>,
    #[serde(default)]
    skip_subdirs: Vec<String>,
    #[serde(default)]
    hidden: bool,
}

fn default_subdirs() -> SubdirSpec {
    SubdirSpec::Enabled(true)
}

fn default_policy() -> Policy {
    Policy::Prompt
}

/// A size-valued config entry: either a raw byte count or an SI string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum SizeValue {
    Bytes(u64),
    Text(String),
}

impl SizeValue {
    fn to_bytes(&self) -> Result<u64, ConfigError> {
        match self {
            SizeValue::Bytes(n) => Ok(*n),
            SizeValue::Text(s) => parse_size(s).ok_or_else(|| ConfigError::BadSize(s.clone())),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawPerformance {
    #[serde(default = "default_algorithm")]
    algorithm: String,
    #[serde(default)]
    max_threads: Option<usize>,
    #[serde(default)]
    chunk_size: Option<SizeValue>,
    #[serde(default)]
    max_read: Option<SizeValue>,
    #[serde(default)]
    small_file_size: Option<SizeValue>,
}

fn default_algorithm() -> String {
    "md5".to_string()
}

impl Default for RawPerformance {
    fn default() -> Self {
        RawPerformance {
            algorithm: default_algorithm(),
            max_threads: None,
            chunk_size: None,
            max_read: None,
            small_file_size: None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawGeneral {
    #[serde(default)]
    follow_symlinks: bool,
    #[serde(default)]
    dry_run: bool,
    #[serde(default = "default_confirm_deletion")]
    confirm_deletion: bool,
    #[serde(default)]
    cache_file: Option<String>,
}

fn default_confirm_deletion() -> bool {
    true
}

impl Default for RawGeneral {
    fn default() -> Self {
        RawGeneral {
            follow_symlinks: false,
            dry_run: false,
            confirm_deletion: true,
            cache_file: None,
        }
    }
}

// ----------------------------------------------------------------------------
// Loading
// ----------------------------------------------------------------------------

pub fn load_config(path: &Utf8Path) -> Result<Config, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_owned(),
        source,
    })?;
    parse_config(&text)
}

pub fn parse_config(text: &str) -> Result<Config, ConfigError> {
    let raw: RawConfig = serde_yaml::from_str(text)?;

    let mut directories = Vec::with_capacity(raw.directories.len());
    for (index, dir) in raw.directories.into_iter().enumerate() {
        let pattern = match &dir.pattern {
            // A null pattern string leaves the directory unfiltered.
            Some(text) => parse_pattern(text).map_err(|e| ConfigError::Directory {
                index,
                message: e.to_string(),
            })?,
            None => None,
        };
        directories.push(DirectoryConfig {
            path: dir.path,
            priority: dir.priority,
            subdirs: dir.subdirs,
            policy: dir.policy,
            rename: dir.rename,
            pattern,
            skip_subdirs: dir.skip_subdirs,
            hidden: dir.hidden,
        });
    }

    let pattern = match &raw.match_tree {
        Some(value) => pattern_from_yaml(value)?,
        None => Pattern::match_all(),
    };

    let algorithm = HashAlgorithm::parse(&raw.performance.algorithm)
        .ok_or_else(|| ConfigError::UnsupportedAlgorithm(raw.performance.algorithm.clone()))?;
    let max_threads = match raw.performance.max_threads {
        // 0 means one worker per logical CPU.
        Some(0) => num_cpus::get(),
        Some(n) => n,
        None => 1,
    };
    let performance = PerformanceConfig {
        algorithm,
        max_threads,
        chunk_size: raw
            .performance
            .chunk_size
            .map(|v| v.to_bytes())
            .transpose()?
            .map(|v| v as usize)
            .unwrap_or(DEFAULT_CHUNK_SIZE),
        max_read: raw.performance.max_read.map(|v| v.to_bytes()).transpose()?,
        small_file_size: raw
            .performance
            .small_file_size
            .map(|v| v.to_bytes())
            .transpose()?,
    };

    let general = GeneralConfig {
        follow_symlinks: raw.general.follow_symlinks,
        dry_run: raw.general.dry_run,
        confirm_deletion: raw.general.confirm_deletion,
        cache_file: raw.general.cache_file.as_deref().map(expand_tilde),
    };

    let mut logging = raw.logging;
    logging.file = logging.file.as_deref().map(|p| expand_tilde(p.as_str()));

    Ok(Config {
        directories,
        pattern,
        logging,
        performance,
        general,
    })
}

fn expand_tilde(path: &str) -> Utf8PathBuf {
    if let Some(rest) = path.strip_prefix("~") {
        if let Some(home) = dirs::home_dir().and_then(|p| Utf8PathBuf::from_path_buf(p).ok()) {
            return home.join(rest.trim_start_matches('/'));
        }
    }
    Utf8PathBuf::from(path)
}

// ----------------------------------------------------------------------------
// The structural `match` subtree
// ----------------------------------------------------------------------------

/// Recursively convert a `match` node. Mirrors the document shape:
/// `include` children merge with `all`, `exclude` children merge with
/// `any` and invert, `name` lists become name leaves merged with `any`,
/// and `size` / `modified` / `accessed` / `created` nodes are range
/// leaves. A node may instead carry a `pattern` string in the surface
/// syntax.
pub fn pattern_from_yaml(value: &serde_yaml::Value) -> Result<Pattern, ConfigError> {
    let Some(map) = value.as_mapping() else {
        return Err(ConfigError::UnknownMatchNode(format!("{value:?}")));
    };

    if let Some(pattern_value) = value.get("pattern") {
        let text = pattern_value
            .as_str()
            .ok_or_else(|| ConfigError::UnknownMatchNode("non-string pattern".to_string()))?;
        return parse_pattern(text)?.ok_or_else(|| ConfigError::NullPattern(text.to_string()));
    }

    let mut children: Vec<Pattern> = Vec::new();
    let mut mode = MergeMode::All;

    for (key, node) in map {
        let key = key
            .as_str()
            .ok_or_else(|| ConfigError::UnknownMatchNode(format!("{key:?}")))?;
        match key {
            "include" | "exclude" => {
                let Some(node_map) = node.as_mapping() else {
                    return Err(ConfigError::UnknownMatchNode(format!("{key}: {node:?}")));
                };
                let mut subpatterns = Vec::new();
                for (sub_key, sub_value) in node_map {
                    let mut single = serde_yaml::Mapping::new();
                    single.insert(sub_key.clone(), sub_value.clone());
                    subpatterns.push(pattern_from_yaml(&serde_yaml::Value::Mapping(single))?);
                }
                let inverted = key == "exclude";
                children.push(Pattern::Group(GroupPattern {
                    children: subpatterns,
                    inverted,
                    mode: if inverted { MergeMode::Any } else { MergeMode::All },
                }));
            }
            "name" => {
                let Some(names) = node.as_sequence() else {
                    return Err(ConfigError::UnknownMatchNode(format!("name: {node:?}")));
                };
                mode = MergeMode::Any;
                for name in names {
                    let name = name
                        .as_str()
                        .ok_or_else(|| ConfigError::UnknownMatchNode(format!("{name:?}")))?;
                    let leaf = if name.starts_with('.') {
                        NamePattern::new(NameKind::Extension, name)
                    } else if name.len() >= 2 && name.starts_with('/') && name.ends_with('/') {
                        NamePattern::new(NameKind::Regex, &name[1..name.len() - 1])
                    } else {
                        NamePattern::new(NameKind::Name, name)
                    };
                    children.push(Pattern::Name(leaf?));
                }
            }
            "size" => {
                let (min, max) = range_bounds(node, |s| {
                    parse_size(s).ok_or_else(|| ConfigError::BadSize(s.to_string()))
                })?;
                return Ok(Pattern::Size(crate::pattern::SizePattern {
                    min,
                    max,
                }));
            }
            "modified" | "accessed" | "created" => {
                let kind = match key {
                    "modified" => DateKind::Modified,
                    "accessed" => DateKind::Accessed,
                    _ => DateKind::Created,
                };
                let (min, max) = range_bounds(node, |s| {
                    parse_duration(s).ok_or_else(|| ConfigError::BadDuration(s.to_string()))
                })?;
                return Ok(Pattern::Date(crate::pattern::DatePattern { min, max, kind }));
            }
            other => return Err(ConfigError::UnknownMatchNode(other.to_string())),
        }
    }

    Ok(Pattern::Group(GroupPattern {
        children,
        inverted: false,
        mode,
    }))
}

fn range_bounds<T: Copy>(
    node: &serde_yaml::Value,
    parse: impl Fn(&str) -> Result<T, ConfigError>,
) -> Result<(Option<T>, Option<T>), ConfigError>
where
    T: TryFrom<u64>,
{
    if node.as_mapping().is_none() {
        return Err(ConfigError::UnknownMatchNode(format!("{node:?}")));
    }
    let bound = |key: &str| -> Result<Option<T>, ConfigError> {
        match node.get(key) {
            None => Ok(None),
            Some(value) => {
                if let Some(n) = value.as_u64() {
                    return T::try_from(n)
                        .map(Some)
                        .map_err(|_| ConfigError::BadSize(n.to_string()));
                }
                let text = value
                    .as_str()
                    .ok_or_else(|| ConfigError::UnknownMatchNode(format!("{value:?}")))?;
                parse(text).map(Some)
            }
        }
    };
    Ok((bound("min")?, bound("max")?))
}

// ----------------------------------------------------------------------------
// Config-file discovery
// ----------------------------------------------------------------------------

/// Locations searched for the configuration document, in order. The
/// `FILESWEEP_CONFIG` environment variable takes precedence over all of
/// them.
pub fn config_search_paths() -> Vec<Utf8PathBuf> {
    let mut paths = Vec::new();

    if let Ok(value) = env::var(CONFIG_ENV_VAR) {
        paths.push(Utf8PathBuf::from(value));
    }

    let home = dirs::home_dir().and_then(|p| Utf8PathBuf::from_path_buf(p).ok());
    if let Some(home) = &home {
        for rel in [
            ".filesweep/config.yaml",
            ".filesweep/config.yml",
            ".config/filesweep/config.yaml",
            ".config/filesweep/config.yml",
            ".filesweep.yaml",
            ".filesweep.yml",
        ] {
            paths.push(home.join(rel));
        }
    }

    if let Ok(cwd) = env::current_dir() {
        if let Ok(cwd) = Utf8PathBuf::from_path_buf(cwd) {
            for name in ["filesweep.yaml", "filesweep.yml", "config.yaml", "config.yml"] {
                paths.push(cwd.join(name));
            }
        }
    }

    if Utf8Path::new("/etc").exists() {
        for p in [
            "/etc/filesweep/filesweep.yaml",
            "/etc/filesweep/filesweep.yml",
            "/etc/filesweep/config.yaml",
            "/etc/filesweep/config.yml",
            "/etc/filesweep.yaml",
            "/etc/filesweep.yml",
        ] {
            paths.push(Utf8PathBuf::from(p));
        }
    }

    paths
}

/// First existing config file among [`config_search_paths`].
pub fn find_config_file() -> Option<Utf8PathBuf> {
    config_search_paths().into_iter().find(|p| p.is_file())
}
