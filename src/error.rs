use camino::Utf8PathBuf;

#[macro_export]
macro_rules! function_name {
    () => {{
        fn f() {}
        fn type_name_of<T>(_: T) -> &'static str {
            std::any::type_name::<T>()
        }
        type_name_of(f)
            .rsplit("::")
            .find(|&part| part != "f" && part != "{{closure}}")
            .expect("Short function name")
    }};
}

#[macro_export]
macro_rules! bail_loc {
    ($msg:expr) => {
        anyhow::bail!("[{}:{} - {}] {}", file!(), function_name!(), line!(), $msg)
    };
    ($fmt:expr, $($arg:tt)*) => {
        anyhow::bail!("[{}:{} - {}] {}", file!(), function_name!(), line!(), format!($fmt, $($arg)*))
    };
}

#[macro_export]
macro_rules! anyhow_loc {
    ($msg:expr) => {
        anyhow::anyhow!("[{}:{} - {}] {}", file!(), function_name!(), line!(), $msg)
    };
    ($fmt:expr, $($arg:tt)*) => {
        anyhow::anyhow!("[{}:{} - {}] {}", file!(), function_name!(), line!(), format!($fmt, $($arg)*))
    };
}

/// Structural failures of the stat index. These indicate misuse of the
/// index API rather than filesystem trouble; the pipeline logs them and
/// skips the offending file.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IndexError {
    #[error("item with path {0} already exists")]
    ItemExists(Utf8PathBuf),
    #[error("item not found: {0}")]
    ItemNotFound(String),
    #[error("invalid item: {0}")]
    InvalidItem(String),
    #[error("stat index is already loaded")]
    AlreadyLoaded,
    #[error("stat index is not loaded")]
    NotLoaded,
    #[error("snapshot {path}: {message}")]
    Snapshot { path: Utf8PathBuf, message: String },
}

/// Failures of the pattern surface syntax.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PatternError {
    #[error("composite pattern must be enclosed in parentheses: {0:?}")]
    MissingParens(String),
    #[error("cannot mix '&' and '|' at the same level in {0:?}")]
    MixedOperators(String),
    #[error("invalid regex {pattern:?}: {message}")]
    BadRegex { pattern: String, message: String },
}

/// Fatal configuration problems. Raised before the pipeline starts.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Io {
        path: Utf8PathBuf,
        source: std::io::Error,
    },
    #[error("malformed config: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("{0}")]
    Pattern(#[from] PatternError),
    #[error("pattern {0:?} is null (matches nothing it can name)")]
    NullPattern(String),
    #[error("unsupported hash algorithm: {0:?}")]
    UnsupportedAlgorithm(String),
    #[error("invalid size value {0:?}")]
    BadSize(String),
    #[error("invalid duration value {0:?}")]
    BadDuration(String),
    #[error("unknown match node {0:?}")]
    UnknownMatchNode(String),
    #[error("directory entry {index}: {message}")]
    Directory { index: usize, message: String },
}
