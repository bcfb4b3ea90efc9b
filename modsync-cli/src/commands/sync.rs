//! `modsync sync`: push unsynced module commits to the local registry.

use std::fmt;
use std::io::{self, Write};
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{bail, Context, Result};
use clap::Args;
use serde_json::json;

use modsync_core::{
    BuildError, Commit, GitHash, Module, ModuleCommit, ModuleConfigError, ModuleIdentity,
};
use modsync_git::{GitRepository, Repository};
use modsync_sync::{
    AncestryPolicy, BoxError, CancelToken, ErrorHandler, GitSyncPoint, LocalRegistry,
    LoggingErrorHandler, RegistryError, SyncPointError, Syncer, Visibility,
};

/// Arguments for `modsync sync`.
#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Repository to sync; any directory inside the work tree.
    #[arg(long, default_value = ".")]
    pub repo: PathBuf,

    /// Local registry directory [default: ~/.modsync/registry].
    #[arg(long)]
    pub registry_dir: Option<PathBuf>,

    /// Module to sync, as `<dir>:<identity>`. Repeat for several modules.
    #[arg(long = "module", value_name = "DIR:IDENTITY")]
    pub modules: Vec<ModuleArg>,

    /// Sync every remote-tracking branch, default branch first.
    #[arg(long)]
    pub all_branches: bool,

    /// Create modules that do not exist in the registry yet.
    #[arg(long)]
    pub create: bool,

    /// Visibility of created modules: public or private.
    #[arg(long, value_name = "VISIBILITY")]
    pub create_visibility: Option<Visibility>,

    /// How recoverable errors are reported: text or json.
    #[arg(long, default_value = "text")]
    pub error_format: ErrorFormat,

    /// Deliver commits reachable through every merge parent, not only the first.
    #[arg(long)]
    pub topological: bool,

    /// Follow symlinks that stay inside the repository.
    #[arg(long)]
    pub follow_symlinks: bool,
}

// ---------------------------------------------------------------------------
// Argument types
// ---------------------------------------------------------------------------

/// `<dir>:<identity>`, parsed into a [`Module`] with an identity override.
#[derive(Debug, Clone)]
pub struct ModuleArg(pub Module);

impl FromStr for ModuleArg {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (dir, identity) = s
            .split_once(':')
            .ok_or_else(|| format!("module '{s}' must be <dir>:<identity>"))?;
        let identity = identity.parse().map_err(|e| format!("{e}"))?;
        Module::new(dir, Some(identity))
            .map(Self)
            .map_err(|e| e.to_string())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ErrorFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for ErrorFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!(
                "unknown error format '{other}'; expected: text, json"
            )),
        }
    }
}

impl fmt::Display for ErrorFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text => f.write_str("text"),
            Self::Json => f.write_str("json"),
        }
    }
}

// ---------------------------------------------------------------------------
// run
// ---------------------------------------------------------------------------

impl SyncArgs {
    pub fn run(self) -> Result<()> {
        let create = self.create_visibility()?;
        if self.modules.is_empty() {
            tracing::info!("no modules to sync");
            return Ok(());
        }

        let registry_dir = match self.registry_dir {
            Some(dir) => dir,
            None => crate::default_registry_dir()?,
        };
        let mut repo = GitRepository::discover(&self.repo)
            .with_context(|| format!("failed to open repository at {}", self.repo.display()))?;
        if self.follow_symlinks {
            repo = repo.with_symlinks();
        }
        let registry = LocalRegistry::new(registry_dir);
        let handler = CliErrorHandler {
            format: self.error_format,
        };
        let ancestry = if self.topological {
            AncestryPolicy::Topological
        } else {
            AncestryPolicy::FirstParent
        };

        let mut builder = Syncer::builder(&repo, &repo, &handler)
            .resumption(&registry)
            .commit_checker(&registry)
            .default_branch_getter(&registry)
            .all_branches(self.all_branches)
            .ancestry(ancestry);
        for module in self.modules {
            builder = builder.module(module.0);
        }
        let syncer = builder.build()?;

        let cancel = CancelToken::new();
        cancel_on_ctrl_c(cancel.clone());

        syncer
            .sync(&cancel, |module_commit| {
                let point = push_or_create(&registry, &repo, &module_commit, create)?;
                write_pushed(&mut io::stderr(), &point, &module_commit.identity)?;
                Ok(())
            })
            .context("sync failed")?;
        Ok(())
    }

    /// Visibility for created modules, or `None` when creation is off.
    fn create_visibility(&self) -> Result<Option<Visibility>> {
        match (self.create, self.create_visibility) {
            (true, Some(visibility)) => Ok(Some(visibility)),
            (true, None) => bail!("--create requires --create-visibility"),
            (false, Some(_)) => bail!("--create-visibility requires --create"),
            (false, None) => Ok(None),
        }
    }
}

/// Push, creating the module first when it is missing and creation is on.
fn push_or_create(
    registry: &LocalRegistry,
    repo: &GitRepository,
    module_commit: &ModuleCommit,
    create: Option<Visibility>,
) -> std::result::Result<GitSyncPoint, BoxError> {
    match (registry.push(module_commit), create) {
        (Err(RegistryError::ModuleNotFound(identity)), Some(visibility)) => {
            registry.create(&identity, visibility, &repo.default_branch()?)?;
            Ok(registry.push(module_commit)?)
        }
        (Err(RegistryError::ModuleNotFound(identity)), None) => Err(format!(
            "module {identity} does not exist in the registry; rerun with --create"
        )
        .into()),
        (result, _) => Ok(result?),
    }
}

/// `<branch>:<git-hash> -> <identity>:<commit-name>`
fn write_pushed(
    out: &mut dyn Write,
    point: &GitSyncPoint,
    identity: &ModuleIdentity,
) -> io::Result<()> {
    writeln!(
        out,
        "{}:{} -> {}:{}",
        point.branch, point.git_commit_hash, identity, point.commit_name
    )
}

/// Cancel `token` on the first Ctrl-C.
fn cancel_on_ctrl_c(token: CancelToken) {
    std::thread::spawn(move || {
        let runtime = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(e) => {
                tracing::warn!("Ctrl-C handling unavailable: {e}");
                return;
            }
        };
        runtime.block_on(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupted; stopping before the next module");
                token.cancel();
            }
        });
    });
}

// ---------------------------------------------------------------------------
// Error handler
// ---------------------------------------------------------------------------

/// Reports skipped commits as log warnings or JSON lines on stderr.
struct CliErrorHandler {
    format: ErrorFormat,
}

impl CliErrorHandler {
    fn report(
        &self,
        kind: &str,
        module: &Module,
        commit: &GitHash,
        error: &dyn fmt::Display,
    ) -> io::Result<()> {
        match self.format {
            ErrorFormat::Text => {
                tracing::warn!("{kind}: module={module} commit={commit} error={error}");
                Ok(())
            }
            ErrorFormat::Json => writeln!(
                io::stderr(),
                "{}",
                json!({
                    "kind": kind,
                    "module": module.to_string(),
                    "commit": commit.as_str(),
                    "error": error.to_string(),
                })
            ),
        }
    }
}

impl ErrorHandler for CliErrorHandler {
    fn invalid_module_config(
        &self,
        module: &Module,
        commit: &Commit,
        err: &ModuleConfigError,
    ) -> std::result::Result<(), BoxError> {
        Ok(self.report("invalid_module_config", module, &commit.hash, err)?)
    }

    fn build_failure(
        &self,
        module: &Module,
        commit: &Commit,
        err: &BuildError,
    ) -> std::result::Result<(), BoxError> {
        Ok(self.report("build_failure", module, &commit.hash, err)?)
    }

    fn invalid_sync_point(
        &self,
        module: &Module,
        branch: &str,
        sync_point: &GitHash,
        err: &SyncPointError,
    ) -> std::result::Result<(), BoxError> {
        LoggingErrorHandler.invalid_sync_point(module, branch, sync_point, err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn module_arg_needs_identity() {
        let err = "proto".parse::<ModuleArg>().unwrap_err();
        assert!(err.contains("<dir>:<identity>"), "got: {err}");
    }

    #[test]
    fn module_arg_normalizes_dir() {
        let arg: ModuleArg = "./proto/:buf.build/acme/petapis".parse().unwrap();
        assert_eq!(arg.0.to_string(), "proto:buf.build/acme/petapis");
    }

    #[test]
    fn module_arg_rejects_bad_identity() {
        assert!("proto:petapis".parse::<ModuleArg>().is_err());
    }

    fn sync_point() -> GitSyncPoint {
        GitSyncPoint {
            branch: "main".to_owned(),
            git_commit_hash: GitHash::from_hex(&"ab".repeat(20)).unwrap(),
            commit_name: "0123abcd".to_owned(),
        }
    }

    #[test]
    fn pushed_line_names_branch_hash_and_commit() {
        let identity: ModuleIdentity = "buf.build/acme/petapis".parse().unwrap();
        let mut out = Vec::new();
        write_pushed(&mut out, &sync_point(), &identity).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            format!("main:{} -> buf.build/acme/petapis:0123abcd\n", "ab".repeat(20))
        );
    }

    struct ClosedPipe;

    impl Write for ClosedPipe {
        fn write(&mut self, _: &[u8]) -> io::Result<usize> {
            Err(io::ErrorKind::BrokenPipe.into())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn pushed_line_write_failure_is_returned() {
        let identity: ModuleIdentity = "buf.build/acme/petapis".parse().unwrap();
        let err = write_pushed(&mut ClosedPipe, &sync_point(), &identity).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }

    #[test]
    fn error_format_parses_case_insensitively() {
        assert_eq!("JSON".parse::<ErrorFormat>().unwrap(), ErrorFormat::Json);
        assert!("yaml".parse::<ErrorFormat>().is_err());
    }
}
