//! End-to-end engine behaviour over an in-memory repository.

use std::cell::RefCell;
use std::collections::BTreeSet;

use modsync_core::{
    BuildError, Commit, GitHash, Module, ModuleCommit, ModuleConfigError, ModuleIdentity,
};
use modsync_git::MemoryRepository;
use modsync_sync::{
    AncestryPolicy, BoxError, CancelToken, ErrorHandler, LocalRegistry, RemoteDefaultBranch,
    SyncError, SyncPointError, Syncer, Visibility,
};
use tempfile::TempDir;

const PETAPIS: &str = "buf.build/acme/petapis";

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn petapis() -> ModuleIdentity {
    PETAPIS.parse().unwrap()
}

fn proto_module() -> Module {
    Module::new("proto", Some(petapis())).unwrap()
}

/// A valid `proto` module whose single source file says `label`.
fn proto_files(label: &str) -> Vec<(String, String)> {
    vec![
        ("proto/modsync.yaml".to_owned(), "version: v1\n".to_owned()),
        ("proto/pet/v1/pet.proto".to_owned(), format!("// {label}\n")),
    ]
}

/// c1 -> c2 -> c3 on `main`, which is both the default and the checkout.
fn linear() -> (MemoryRepository, Vec<GitHash>) {
    let mut repo = MemoryRepository::new();
    let c1 = repo.add_commit(&[], proto_files("c1"));
    let c2 = repo.add_commit(&[&c1], proto_files("c2"));
    let c3 = repo.add_commit(&[&c2], proto_files("c3"));
    repo.set_remote_branch("main", &c3);
    repo.set_default_branch("main");
    repo.checkout("main");
    (repo, vec![c1, c2, c3])
}

/// Records every hook call and answers with a fixed decision.
#[derive(Default)]
struct RecordingHandler {
    abort: bool,
    events: RefCell<Vec<String>>,
}

impl RecordingHandler {
    fn aborting() -> Self {
        Self {
            abort: true,
            ..Self::default()
        }
    }

    fn record(&self, event: String) -> Result<(), BoxError> {
        self.events.borrow_mut().push(event);
        if self.abort {
            Err("handler abort".into())
        } else {
            Ok(())
        }
    }

    fn events(&self) -> Vec<String> {
        self.events.borrow().clone()
    }
}

impl ErrorHandler for RecordingHandler {
    fn invalid_module_config(
        &self,
        module: &Module,
        commit: &Commit,
        _err: &ModuleConfigError,
    ) -> Result<(), BoxError> {
        self.record(format!("config {module} {}", commit.hash))
    }

    fn build_failure(
        &self,
        module: &Module,
        commit: &Commit,
        _err: &BuildError,
    ) -> Result<(), BoxError> {
        self.record(format!("build {module} {}", commit.hash))
    }

    fn invalid_sync_point(
        &self,
        module: &Module,
        branch: &str,
        sync_point: &GitHash,
        err: &SyncPointError,
    ) -> Result<(), BoxError> {
        let kind = match err {
            SyncPointError::NotFound => "not-found",
            SyncPointError::NotInHistory { .. } => "not-in-history",
        };
        self.record(format!("sync-point {module} {branch} {sync_point} {kind}"))
    }
}

fn run(syncer: &Syncer<'_>) -> (Result<(), SyncError>, Vec<ModuleCommit>) {
    let mut delivered = Vec::new();
    let result = syncer.sync(&CancelToken::new(), |mc| {
        delivered.push(mc);
        Ok(())
    });
    (result, delivered)
}

fn hashes(delivered: &[ModuleCommit]) -> Vec<GitHash> {
    delivered.iter().map(|mc| mc.commit.hash.clone()).collect()
}

// ---------------------------------------------------------------------------
// Delivery and resumption
// ---------------------------------------------------------------------------

#[test]
fn delivers_linear_history_oldest_first() {
    init_logging();
    let (repo, c) = linear();
    let handler = RecordingHandler::default();
    let syncer = Syncer::builder(&repo, &repo, &handler)
        .module(proto_module())
        .build()
        .unwrap();

    let (result, delivered) = run(&syncer);
    result.unwrap();
    assert_eq!(hashes(&delivered), c);
    for mc in &delivered {
        assert_eq!(mc.identity, petapis());
        assert_eq!(mc.branch, "main");
        assert!(mc.bucket.get("pet/v1/pet.proto").is_some());
    }
    assert!(handler.events().is_empty());
}

#[test]
fn resumes_after_sync_point() {
    init_logging();
    let (repo, c) = linear();
    let handler = RecordingHandler::default();
    let c2 = c[1].clone();
    let resolver = move |module: &ModuleIdentity, branch: &str| -> Result<Option<GitHash>, BoxError> {
        assert_eq!(module.to_string(), PETAPIS);
        assert_eq!(branch, "main");
        Ok(Some(c2.clone()))
    };
    let syncer = Syncer::builder(&repo, &repo, &handler)
        .module(proto_module())
        .resumption(&resolver)
        .build()
        .unwrap();

    let (result, delivered) = run(&syncer);
    result.unwrap();
    assert_eq!(hashes(&delivered), vec![c[2].clone()]);
}

fn push_all(syncer: &Syncer<'_>, registry: &LocalRegistry) -> Vec<GitHash> {
    let mut pushed = Vec::new();
    syncer
        .sync(&CancelToken::new(), |mc| {
            registry.push(&mc)?;
            pushed.push(mc.commit.hash);
            Ok(())
        })
        .unwrap();
    pushed
}

#[test]
fn rerun_against_registry_delivers_nothing() {
    init_logging();
    let (repo, c) = linear();
    let tmp = TempDir::new().unwrap();
    let registry = LocalRegistry::new(tmp.path());
    registry
        .create(&petapis(), Visibility::Public, "main")
        .unwrap();
    let handler = RecordingHandler::default();
    let syncer = Syncer::builder(&repo, &repo, &handler)
        .module(proto_module())
        .resumption(&registry)
        .commit_checker(&registry)
        .default_branch_getter(&registry)
        .build()
        .unwrap();

    assert_eq!(push_all(&syncer, &registry), c);
    assert!(push_all(&syncer, &registry).is_empty());
}

#[test]
fn checker_wins_over_sync_point() {
    init_logging();
    let (repo, c) = linear();
    let handler = RecordingHandler::default();
    let c1 = c[0].clone();
    let c3 = c[2].clone();
    let resolver = move |_: &ModuleIdentity, _: &str| -> Result<Option<GitHash>, BoxError> {
        Ok(Some(c1.clone()))
    };
    let checker = move |_: &ModuleIdentity,
                        candidates: &BTreeSet<GitHash>|
          -> Result<BTreeSet<GitHash>, BoxError> {
        Ok(candidates.iter().filter(|h| **h == c3).cloned().collect())
    };
    let syncer = Syncer::builder(&repo, &repo, &handler)
        .module(proto_module())
        .resumption(&resolver)
        .commit_checker(&checker)
        .build()
        .unwrap();

    let (result, delivered) = run(&syncer);
    result.unwrap();
    assert_eq!(hashes(&delivered), vec![c[1].clone()]);
}

#[test]
fn resolver_failure_is_fatal() {
    let (repo, _) = linear();
    let handler = RecordingHandler::default();
    let resolver = |_: &ModuleIdentity, _: &str| -> Result<Option<GitHash>, BoxError> {
        Err("registry unavailable".into())
    };
    let syncer = Syncer::builder(&repo, &repo, &handler)
        .module(proto_module())
        .resumption(&resolver)
        .build()
        .unwrap();
    let (result, delivered) = run(&syncer);
    assert!(matches!(result, Err(SyncError::Resolver { .. })));
    assert!(delivered.is_empty());
}

// ---------------------------------------------------------------------------
// Invalid sync points
// ---------------------------------------------------------------------------

#[test]
fn missing_sync_point_restarts_from_root_once() {
    init_logging();
    let (repo, c) = linear();
    let handler = RecordingHandler::default();
    let ghost = GitHash::from_hex(&"f".repeat(40)).unwrap();
    let lost = ghost.clone();
    let resolver = move |_: &ModuleIdentity, _: &str| -> Result<Option<GitHash>, BoxError> {
        Ok(Some(lost.clone()))
    };
    let syncer = Syncer::builder(&repo, &repo, &handler)
        .module(proto_module())
        .resumption(&resolver)
        .build()
        .unwrap();

    let (result, delivered) = run(&syncer);
    result.unwrap();
    assert_eq!(hashes(&delivered), c);
    assert_eq!(
        handler.events(),
        vec![format!("sync-point proto:{PETAPIS} main {ghost} not-found")]
    );
}

#[test]
fn missing_sync_point_aborts_when_handler_refuses() {
    let (repo, _) = linear();
    let handler = RecordingHandler::aborting();
    let resolver = |_: &ModuleIdentity, _: &str| -> Result<Option<GitHash>, BoxError> {
        Ok(Some(GitHash::from_hex(&"f".repeat(40)).unwrap()))
    };
    let syncer = Syncer::builder(&repo, &repo, &handler)
        .module(proto_module())
        .resumption(&resolver)
        .build()
        .unwrap();

    let (result, delivered) = run(&syncer);
    assert!(matches!(result, Err(SyncError::Aborted { .. })), "got: {result:?}");
    assert!(delivered.is_empty());
    assert_eq!(handler.events().len(), 1);
}

#[test]
fn sync_point_off_branch_is_not_in_history() {
    init_logging();
    let (mut repo, c) = linear();
    let stray = repo.add_commit(&[&c[0]], proto_files("stray"));
    let handler = RecordingHandler::default();
    let off = stray.clone();
    let resolver = move |_: &ModuleIdentity, _: &str| -> Result<Option<GitHash>, BoxError> {
        Ok(Some(off.clone()))
    };
    let syncer = Syncer::builder(&repo, &repo, &handler)
        .module(proto_module())
        .resumption(&resolver)
        .build()
        .unwrap();

    let (result, delivered) = run(&syncer);
    result.unwrap();
    assert_eq!(hashes(&delivered), c);
    assert_eq!(
        handler.events(),
        vec![format!("sync-point proto:{PETAPIS} main {stray} not-in-history")]
    );
}

// ---------------------------------------------------------------------------
// Branches
// ---------------------------------------------------------------------------

/// `linear()` plus `feature` = c3 -> f1.
fn with_feature() -> (MemoryRepository, Vec<GitHash>, GitHash) {
    let (mut repo, c) = linear();
    let f1 = repo.add_commit(&[&c[2]], proto_files("f1"));
    repo.set_remote_branch("feature", &f1);
    (repo, c, f1)
}

#[test]
fn single_branch_mode_ignores_other_branches() {
    let (repo, c, f1) = with_feature();
    let handler = RecordingHandler::default();
    let syncer = Syncer::builder(&repo, &repo, &handler)
        .module(proto_module())
        .build()
        .unwrap();

    let (result, delivered) = run(&syncer);
    result.unwrap();
    assert_eq!(hashes(&delivered), c);
    assert!(!hashes(&delivered).contains(&f1));
    assert!(delivered.iter().all(|mc| mc.branch == "main"));
}

#[test]
fn all_branches_walks_default_branch_first() {
    let (mut repo, _, f1) = with_feature();
    repo.checkout("feature");
    let handler = RecordingHandler::default();
    let syncer = Syncer::builder(&repo, &repo, &handler)
        .module(proto_module())
        .all_branches(true)
        .build()
        .unwrap();

    let (result, delivered) = run(&syncer);
    result.unwrap();
    let branches: Vec<&str> = delivered.iter().map(|mc| mc.branch.as_str()).collect();
    assert_eq!(
        branches,
        vec!["main", "main", "main", "feature", "feature", "feature", "feature"]
    );
    assert_eq!(delivered.last().map(|mc| &mc.commit.hash), Some(&f1));
}

#[test]
fn default_branch_mismatch_delivers_nothing() {
    let (repo, _) = linear();
    let handler = RecordingHandler::default();
    let getter =
        |_: &ModuleIdentity| -> Result<RemoteDefaultBranch, BoxError> {
            Ok(RemoteDefaultBranch::Branch("trunk".to_owned()))
        };
    let syncer = Syncer::builder(&repo, &repo, &handler)
        .module(proto_module())
        .default_branch_getter(&getter)
        .build()
        .unwrap();

    let (result, delivered) = run(&syncer);
    match result {
        Err(SyncError::DefaultBranchMismatch { local, remote, .. }) => {
            assert_eq!(local, "main");
            assert_eq!(remote, "trunk");
        }
        other => panic!("expected mismatch, got {other:?}"),
    }
    assert!(delivered.is_empty());
}

#[test]
fn missing_module_passes_default_branch_gate() {
    let (repo, c) = linear();
    let handler = RecordingHandler::default();
    let getter = |_: &ModuleIdentity| -> Result<RemoteDefaultBranch, BoxError> {
        Ok(RemoteDefaultBranch::ModuleDoesNotExist)
    };
    let syncer = Syncer::builder(&repo, &repo, &handler)
        .module(proto_module())
        .default_branch_getter(&getter)
        .build()
        .unwrap();
    let (result, delivered) = run(&syncer);
    result.unwrap();
    assert_eq!(hashes(&delivered), c);
}

// ---------------------------------------------------------------------------
// Commit contents
// ---------------------------------------------------------------------------

#[test]
fn commit_with_three_tags_carries_each_once() {
    let (mut repo, c) = linear();
    for tag in ["v1.0.0", "stable", "latest"] {
        repo.tag(tag, &c[1]);
    }
    let handler = RecordingHandler::default();
    let syncer = Syncer::builder(&repo, &repo, &handler)
        .module(proto_module())
        .build()
        .unwrap();

    let (result, delivered) = run(&syncer);
    result.unwrap();
    assert_eq!(delivered[1].tags, vec!["latest", "stable", "v1.0.0"]);
    assert!(delivered[0].tags.is_empty());
    assert!(delivered[2].tags.is_empty());
}

#[test]
fn identity_comes_from_declaration_without_override() {
    let mut repo = MemoryRepository::new();
    let decl = "version: v1\nname: buf.build/acme/declared\n";
    let c1 = repo.add_commit(&[], [("modsync.yaml", decl), ("a.proto", "// a")]);
    repo.set_remote_branch("main", &c1);
    repo.checkout("main");

    let seen = RefCell::new(Vec::new());
    let resolver = |module: &ModuleIdentity, _: &str| -> Result<Option<GitHash>, BoxError> {
        seen.borrow_mut().push(module.to_string());
        Ok(None)
    };
    let handler = RecordingHandler::default();
    let syncer = Syncer::builder(&repo, &repo, &handler)
        .module(Module::new(".", None).unwrap())
        .resumption(&resolver)
        .build()
        .unwrap();

    let (result, delivered) = run(&syncer);
    result.unwrap();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].identity.to_string(), "buf.build/acme/declared");
    assert_eq!(seen.into_inner(), vec!["buf.build/acme/declared"]);
}

#[test]
fn unnamed_head_resumes_under_last_declared_name() {
    init_logging();
    let mut repo = MemoryRepository::new();
    let named = format!("version: v1\nname: {PETAPIS}\n");
    let c1 = repo.add_commit(&[], [("modsync.yaml", named.as_str()), ("a.proto", "// 1")]);
    let c2 = repo.add_commit(&[&c1], [("modsync.yaml", named.as_str()), ("a.proto", "// 2")]);
    let c3 = repo.add_commit(&[&c2], [("modsync.yaml", "version: v1\n"), ("a.proto", "// 3")]);
    repo.set_remote_branch("main", &c3);
    repo.set_default_branch("main");
    repo.checkout("main");

    let tmp = TempDir::new().unwrap();
    let registry = LocalRegistry::new(tmp.path());
    registry
        .create(&petapis(), Visibility::Public, "main")
        .unwrap();
    let handler = RecordingHandler::default();
    let syncer = Syncer::builder(&repo, &repo, &handler)
        .module(Module::new(".", None).unwrap())
        .resumption(&registry)
        .commit_checker(&registry)
        .default_branch_getter(&registry)
        .build()
        .unwrap();

    assert_eq!(push_all(&syncer, &registry), vec![c1, c2]);
    assert!(push_all(&syncer, &registry).is_empty());
    // The unnamed head is reported on each run, never pushed.
    assert_eq!(
        handler.events(),
        vec![format!("config . {c3}"), format!("config . {c3}")]
    );
}

#[test]
fn modules_within_a_commit_follow_registration_order() {
    let mut repo = MemoryRepository::new();
    let files = [
        ("b/modsync.yaml", "version: v1\n"),
        ("b/b.proto", "// b"),
        ("a/modsync.yaml", "version: v1\n"),
        ("a/a.proto", "// a"),
    ];
    let c1 = repo.add_commit(&[], files);
    repo.set_remote_branch("main", &c1);
    repo.checkout("main");

    let handler = RecordingHandler::default();
    let syncer = Syncer::builder(&repo, &repo, &handler)
        .module(Module::new("b", Some("buf.build/acme/b".parse().unwrap())).unwrap())
        .module(Module::new("a", Some("buf.build/acme/a".parse().unwrap())).unwrap())
        .build()
        .unwrap();

    let (result, delivered) = run(&syncer);
    result.unwrap();
    let ids: Vec<String> = delivered.iter().map(|mc| mc.identity.to_string()).collect();
    assert_eq!(ids, vec!["buf.build/acme/b", "buf.build/acme/a"]);
}

// ---------------------------------------------------------------------------
// Merges
// ---------------------------------------------------------------------------

/// c1 -> c2 -> m (merge of c2 and s1), with s1 branching from c1.
fn merged() -> (MemoryRepository, [GitHash; 4]) {
    let mut repo = MemoryRepository::new();
    let c1 = repo.add_commit(&[], proto_files("c1"));
    let c2 = repo.add_commit(&[&c1], proto_files("c2"));
    let s1 = repo.add_commit(&[&c1], proto_files("s1"));
    let m = repo.add_commit(&[&c2, &s1], proto_files("m"));
    repo.set_remote_branch("main", &m);
    repo.checkout("main");
    (repo, [c1, c2, s1, m])
}

#[test]
fn first_parent_policy_skips_side_branch() {
    let (repo, [c1, c2, _, m]) = merged();
    let handler = RecordingHandler::default();
    let syncer = Syncer::builder(&repo, &repo, &handler)
        .module(proto_module())
        .build()
        .unwrap();
    let (result, delivered) = run(&syncer);
    result.unwrap();
    assert_eq!(hashes(&delivered), vec![c1, c2, m]);
}

#[test]
fn topological_policy_delivers_parents_before_merge() {
    let (repo, [c1, c2, s1, m]) = merged();
    let handler = RecordingHandler::default();
    let syncer = Syncer::builder(&repo, &repo, &handler)
        .module(proto_module())
        .ancestry(AncestryPolicy::Topological)
        .build()
        .unwrap();
    let (result, delivered) = run(&syncer);
    result.unwrap();
    assert_eq!(hashes(&delivered), vec![c1, c2, s1, m]);
}

#[test]
fn topological_resume_keeps_unsynced_side_branch() {
    let (repo, [_, c2, s1, m]) = merged();
    let handler = RecordingHandler::default();
    let resolver = move |_: &ModuleIdentity, _: &str| -> Result<Option<GitHash>, BoxError> {
        Ok(Some(c2.clone()))
    };
    let syncer = Syncer::builder(&repo, &repo, &handler)
        .module(proto_module())
        .resumption(&resolver)
        .ancestry(AncestryPolicy::Topological)
        .build()
        .unwrap();
    let (result, delivered) = run(&syncer);
    result.unwrap();
    assert_eq!(hashes(&delivered), vec![s1, m]);
}

// ---------------------------------------------------------------------------
// Failure handling
// ---------------------------------------------------------------------------

#[test]
fn sink_error_stops_the_run() {
    let (repo, c) = linear();
    let handler = RecordingHandler::default();
    let syncer = Syncer::builder(&repo, &repo, &handler)
        .module(proto_module())
        .build()
        .unwrap();

    let mut calls = Vec::new();
    let result = syncer.sync(&CancelToken::new(), |mc| {
        calls.push(mc.commit.hash.clone());
        if mc.commit.hash == c[1] {
            return Err("push rejected".into());
        }
        Ok(())
    });
    match result {
        Err(SyncError::Sink { commit, .. }) => assert_eq!(commit, c[1]),
        other => panic!("expected sink error, got {other:?}"),
    }
    assert_eq!(calls, vec![c[0].clone(), c[1].clone()]);
}

#[test]
fn cancellation_is_the_terminal_error() {
    let (repo, c) = linear();
    let handler = RecordingHandler::default();
    let syncer = Syncer::builder(&repo, &repo, &handler)
        .module(proto_module())
        .build()
        .unwrap();

    let token = CancelToken::new();
    let mut delivered = Vec::new();
    let result = syncer.sync(&token, |mc| {
        delivered.push(mc.commit.hash);
        token.cancel();
        Ok(())
    });
    assert!(matches!(result, Err(SyncError::Cancelled)));
    assert_eq!(delivered, vec![c[0].clone()]);
}

#[test]
fn duplicate_modules_are_rejected_at_build() {
    let (repo, _) = linear();
    let handler = RecordingHandler::default();
    let result = Syncer::builder(&repo, &repo, &handler)
        .module(proto_module())
        .module(Module::new("./proto/", Some(petapis())).unwrap())
        .build();
    match result {
        Err(SyncError::DuplicateModule(name)) => assert_eq!(name, format!("proto:{PETAPIS}")),
        Err(other) => panic!("expected duplicate module, got {other:?}"),
        Ok(_) => panic!("expected duplicate module"),
    }
}

#[test]
fn no_modules_is_a_no_op() {
    let repo = MemoryRepository::new();
    let handler = RecordingHandler::default();
    let syncer = Syncer::builder(&repo, &repo, &handler).build().unwrap();
    let (result, delivered) = run(&syncer);
    result.unwrap();
    assert!(delivered.is_empty());
}

fn broken_middle(c2_files: Vec<(String, String)>) -> (MemoryRepository, Vec<GitHash>) {
    let mut repo = MemoryRepository::new();
    let c1 = repo.add_commit(&[], proto_files("c1"));
    let c2 = repo.add_commit(&[&c1], c2_files);
    let c3 = repo.add_commit(&[&c2], proto_files("c3"));
    repo.set_remote_branch("main", &c3);
    repo.checkout("main");
    (repo, vec![c1, c2, c3])
}

#[test]
fn invalid_config_is_reported_and_skipped() {
    let (repo, c) = broken_middle(vec![
        ("proto/modsync.yaml".to_owned(), "version: [".to_owned()),
        ("proto/pet.proto".to_owned(), "// c2".to_owned()),
    ]);
    let handler = RecordingHandler::default();
    let syncer = Syncer::builder(&repo, &repo, &handler)
        .module(proto_module())
        .build()
        .unwrap();
    let (result, delivered) = run(&syncer);
    result.unwrap();
    assert_eq!(hashes(&delivered), vec![c[0].clone(), c[2].clone()]);
    assert_eq!(handler.events(), vec![format!("config proto:{PETAPIS} {}", c[1])]);
}

#[test]
fn invalid_config_aborts_when_handler_refuses() {
    let (repo, c) = broken_middle(vec![("proto/pet.proto".to_owned(), "// c2".to_owned())]);
    let handler = RecordingHandler::aborting();
    let syncer = Syncer::builder(&repo, &repo, &handler)
        .module(proto_module())
        .build()
        .unwrap();
    let (result, delivered) = run(&syncer);
    assert!(matches!(result, Err(SyncError::Aborted { .. })));
    assert_eq!(hashes(&delivered), vec![c[0].clone()]);
}

#[test]
fn build_failure_is_reported_and_skipped() {
    let (repo, c) = broken_middle(vec![
        ("proto/modsync.yaml".to_owned(), "version: v1\n".to_owned()),
        ("proto/README.md".to_owned(), "no sources here".to_owned()),
    ]);
    let handler = RecordingHandler::default();
    let syncer = Syncer::builder(&repo, &repo, &handler)
        .module(proto_module())
        .build()
        .unwrap();
    let (result, delivered) = run(&syncer);
    result.unwrap();
    assert_eq!(hashes(&delivered), vec![c[0].clone(), c[2].clone()]);
    assert_eq!(handler.events(), vec![format!("build proto:{PETAPIS} {}", c[1])]);
}
