//! Error types for modsync-core.

use thiserror::Error;

/// A registry identity string could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    #[error("module identity {input:?} must have the form <remote>/<owner>/<repository>")]
    Shape { input: String },

    #[error("module identity {input:?} has an invalid remote {remote:?}")]
    Remote { input: String, remote: String },

    #[error("module identity {input:?} has an invalid {part} {value:?}")]
    Segment {
        input: String,
        part: &'static str,
        value: String,
    },
}

/// A git object name could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid git hash {input:?}: expected 40 or 64 hex characters")]
pub struct HashError {
    pub input: String,
}

/// A module could not be constructed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModuleError {
    #[error("module directory {dir:?} must be relative to the repository root")]
    AbsoluteDir { dir: String },

    #[error("module directory {dir:?} escapes the repository root")]
    EscapesRoot { dir: String },
}

/// The module declaration is absent or malformed at a commit.
#[derive(Debug, Error)]
pub enum ModuleConfigError {
    #[error("module declaration {file} not found")]
    Missing { file: &'static str },

    #[error("failed to parse module declaration {file}: {source}")]
    Parse {
        file: &'static str,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("unsupported module declaration version {0:?}; expected \"v1\"")]
    UnsupportedVersion(String),

    #[error("module declaration has an invalid name: {0}")]
    InvalidName(#[from] IdentityError),

    #[error("module declaration does not name the module and no identity override is configured")]
    MissingName,
}

/// The module declaration is present but its content fails validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    #[error("exclude {0:?} must be a normalized relative directory")]
    InvalidExclude(String),

    #[error("exclude {0:?} does not exist in the module")]
    ExcludeNotFound(String),

    #[error("module has no source files with extensions {extensions:?}")]
    NoSourceFiles { extensions: Vec<String> },

    #[error("source file {0} is not valid UTF-8")]
    InvalidUtf8(String),
}
