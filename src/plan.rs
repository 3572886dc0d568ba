//! C6 Planner: diffs local projects against the manifest-resolved project
//! set and emits one ordered [`Operation`] per union key (spec.md §4.6).

use std::collections::HashMap;

use crate::loader::ResolvedProject;
use crate::scan::LocalProject;

#[derive(Debug, Clone, Copy, Default)]
pub struct PlanFlags {
    pub gc: bool,
    pub rebase_tracked: bool,
    pub rebase_untracked: bool,
    pub rebase_all: bool,
    pub snapshot: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum Kind {
    Delete,
    ChangeRemote,
    Move,
    Create,
    Update,
    Null,
}

#[derive(Debug, Clone)]
pub enum Operation {
    Create { project: ResolvedProject },
    Delete { project: LocalProject },
    Move { local: LocalProject, remote: ResolvedProject },
    ChangeRemote { local: LocalProject, remote: ResolvedProject },
    Update { local: LocalProject, remote: ResolvedProject },
    Null { local: LocalProject, remote: ResolvedProject },
}

impl Operation {
    pub fn path(&self) -> &std::path::Path {
        match self {
            Operation::Create { project } => &project.path,
            Operation::Delete { project } => &project.path,
            Operation::Move { remote, .. } => &remote.path,
            Operation::ChangeRemote { remote, .. } => &remote.path,
            Operation::Update { remote, .. } => &remote.path,
            Operation::Null { remote, .. } => &remote.path,
        }
    }

    fn kind(&self) -> Kind {
        match self {
            Operation::Create { .. } => Kind::Create,
            Operation::Delete { .. } => Kind::Delete,
            Operation::Move { .. } => Kind::Move,
            Operation::ChangeRemote { .. } => Kind::ChangeRemote,
            Operation::Update { .. } => Kind::Update,
            Operation::Null { .. } => Kind::Null,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Operation::Create { project } => format!("create {} ({})", project.path.display(), project.remote),
            Operation::Delete { project } => format!("delete {}", project.path.display()),
            Operation::Move { local, remote } => {
                format!("move {} -> {}", local.path.display(), remote.path.display())
            }
            Operation::ChangeRemote { local, remote } => {
                format!("change remote of {} from {} to {}", local.path.display(), local.remote, remote.remote)
            }
            Operation::Update { remote, .. } => format!("update {} to {}", remote.path.display(), remote.target_revision()),
            Operation::Null { remote, .. } => format!("no-op {}", remote.path.display()),
        }
    }
}

/// Computes the ordered operation list for one run (spec.md §4.6).
pub fn plan(
    local: HashMap<String, LocalProject>,
    remote: HashMap<String, ResolvedProject>,
    flags: PlanFlags,
) -> Vec<Operation> {
    let (local, remote) = match_loose_rename(local, remote);

    let mut keys: Vec<String> = local.keys().chain(remote.keys()).cloned().collect();
    keys.sort();
    keys.dedup();

    let mut local = local;
    let mut remote = remote;
    let mut ops = Vec::with_capacity(keys.len());
    for key in keys {
        let local_project = local.remove(&key);
        let remote_project = remote.remove(&key);
        if let Some(op) = build_operation(local_project, remote_project, flags) {
            ops.push(op);
        }
    }

    ops.sort_by(|a, b| (a.kind(), a.path()).cmp(&(b.kind(), b.path())));
    order_deletes_deepest_first(&mut ops);
    ops
}

/// Any local project whose key has no remote match, but whose
/// `(remote, path)` pair matches a remote project with no local
/// counterpart, is re-keyed to that remote project's key — this models a
/// project rename (spec.md §4.6 "match-loose").
fn match_loose_rename(
    mut local: HashMap<String, LocalProject>,
    remote: HashMap<String, ResolvedProject>,
) -> (HashMap<String, LocalProject>, HashMap<String, ResolvedProject>) {
    let unmatched_local: Vec<String> = local.keys().filter(|k| !remote.contains_key(*k)).cloned().collect();
    let unmatched_remote_keys: Vec<String> = remote.keys().filter(|k| !local.contains_key(*k)).cloned().collect();

    let mut renamed = HashMap::new();
    for local_key in unmatched_local {
        let Some((project_remote, project_path)) = local.get(&local_key).map(|p| (p.remote.clone(), p.path.clone()))
        else {
            continue;
        };
        let rename_target = unmatched_remote_keys
            .iter()
            .find(|remote_key| remote.get(*remote_key).is_some_and(|r| r.remote == project_remote && r.path == project_path));
        if let Some(new_key) = rename_target {
            if let Some(project) = local.remove(&local_key) {
                renamed.insert(new_key.clone(), project);
            }
        }
    }
    local.extend(renamed);
    (local, remote)
}

fn build_operation(local: Option<LocalProject>, remote: Option<ResolvedProject>, flags: PlanFlags) -> Option<Operation> {
    match (local, remote) {
        (None, Some(remote)) => Some(Operation::Create { project: remote }),
        (Some(local), None) => Some(Operation::Delete { project: local }),
        (Some(local), Some(remote)) => Some(diff_existing(local, remote, flags)),
        (None, None) => None,
    }
}

fn diff_existing(local: LocalProject, remote: ResolvedProject, flags: PlanFlags) -> Operation {
    if local.remote != remote.remote {
        return Operation::ChangeRemote { local, remote };
    }
    if local.path != remote.path {
        return Operation::Move { local, remote };
    }
    if flags.snapshot && local.revision != remote.target_revision() {
        return Operation::Update { local, remote };
    }
    if needs_update(&local, &remote, flags) {
        return Operation::Update { local, remote };
    }
    Operation::Null { local, remote }
}

fn needs_update(local: &LocalProject, remote: &ResolvedProject, flags: PlanFlags) -> bool {
    let target = remote.target_revision();

    // Any tracked local branch (not just the current one) behind its
    // upstream is its own, independent condition (spec.md's table lists it
    // apart from the detached-head row) and must be checked regardless of
    // what HEAD is doing.
    let any_tracked_behind = local.state.branches.values().any(|b| match (&b.tracking_branch, &b.tracking_revision) {
        (Some(_), Some(tracking_rev)) => &b.revision != tracking_rev,
        _ => false,
    });
    if any_tracked_behind {
        return true;
    }

    // Detached head: only the pinned revision matters.
    let Some(current) = &local.state.current_branch else {
        return local.revision != target;
    };

    // Current branch tracks nothing: same rule as detached.
    if let Some(current_state) = local.state.branches.get(current) {
        if current_state.tracking_branch.is_none() && local.revision != target {
            return true;
        }
    }

    if flags.rebase_all && flags.rebase_untracked {
        let has_untracked_branch = local.state.branches.values().any(|b| b.tracking_branch.is_none());
        if has_untracked_branch {
            return true;
        }
    }

    false
}

/// Deletes sort deepest-path-first; every other kind sorts shallowest-path
/// first (spec.md §4.6 "Ordering"). The primary `sort_by` above already
/// gives shallowest-first for everything via path comparison, so here we
/// only need to reverse the contiguous run of `Delete` operations.
fn order_deletes_deepest_first(ops: &mut [Operation]) {
    let end = ops.iter().position(|op| !matches!(op, Operation::Delete { .. })).unwrap_or(ops.len());
    ops[..end].reverse();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scan::{BranchState, ProjectState};
    use std::path::{Path, PathBuf};

    fn remote(name: &str, path: &str, revision: &str) -> ResolvedProject {
        ResolvedProject {
            name: name.to_string(),
            path: PathBuf::from(path),
            remote: format!("https://example/{name}"),
            remote_branch: "master".to_string(),
            revision: revision.to_string(),
            gerrit_host: None,
            git_hooks: None,
            history_depth: 0,
        }
    }

    fn clean_state(current_branch: Option<&str>) -> ProjectState {
        ProjectState {
            current_branch: current_branch.map(str::to_string),
            branches: HashMap::new(),
            has_uncommitted_changes: false,
            has_untracked_files: false,
        }
    }

    fn local(name: &str, path: &str, revision: &str, state: ProjectState) -> LocalProject {
        LocalProject {
            name: name.to_string(),
            path: PathBuf::from(path),
            remote: format!("https://example/{name}"),
            remote_branch: "master".to_string(),
            revision: revision.to_string(),
            local_config: repox_manifest::LocalConfig::default(),
            state,
        }
    }

    #[test]
    fn new_project_is_a_create() {
        let mut remotes = HashMap::new();
        remotes.insert("foo#https://example/foo".to_string(), remote("foo", "foo", "HEAD"));
        let ops = plan(HashMap::new(), remotes, PlanFlags::default());
        assert_eq!(ops.len(), 1);
        assert!(matches!(ops[0], Operation::Create { .. }));
    }

    #[test]
    fn removed_project_without_gc_is_still_a_delete_op() {
        let mut locals = HashMap::new();
        locals.insert(
            "bar#https://example/bar".to_string(),
            local("bar", "bar", "origin/master", clone_detached_state()),
        );
        let ops = plan(locals, HashMap::new(), PlanFlags::default());
        assert_eq!(ops.len(), 1);
        assert!(matches!(ops[0], Operation::Delete { .. }));
    }

    fn clone_detached_state() -> ProjectState {
        clean_state(None)
    }

    #[test]
    fn unchanged_project_is_null() {
        let key = "foo#https://example/foo".to_string();
        let mut locals = HashMap::new();
        locals.insert(key.clone(), local("foo", "foo", "origin/master", clean_state(None)));
        let mut remotes = HashMap::new();
        remotes.insert(key, remote("foo", "foo", "HEAD"));
        let ops = plan(locals, remotes, PlanFlags::default());
        assert_eq!(ops.len(), 1);
        assert!(matches!(ops[0], Operation::Null { .. }));
    }

    #[test]
    fn detached_head_behind_target_is_update() {
        let key = "foo#https://example/foo".to_string();
        let mut locals = HashMap::new();
        locals.insert(key.clone(), local("foo", "foo", "deadbeef", clean_state(None)));
        let mut remotes = HashMap::new();
        remotes.insert(key, remote("foo", "foo", "cafef00d"));
        let ops = plan(locals, remotes, PlanFlags::default());
        assert_eq!(ops.len(), 1);
        assert!(matches!(ops[0], Operation::Update { .. }));
    }

    #[test]
    fn tracked_branch_behind_upstream_is_update_even_when_current_rev_matches() {
        let key = "foo#https://example/foo".to_string();
        let mut state = clean_state(Some("feature"));
        state.branches.insert(
            "feature".to_string(),
            BranchState {
                revision: "aaa".to_string(),
                tracking_branch: Some("origin/master".to_string()),
                tracking_revision: Some("bbb".to_string()),
            },
        );
        let mut locals = HashMap::new();
        locals.insert(key.clone(), local("foo", "foo", "origin/master", state));
        let mut remotes = HashMap::new();
        remotes.insert(key, remote("foo", "foo", "HEAD"));
        let ops = plan(locals, remotes, PlanFlags::default());
        assert!(matches!(ops[0], Operation::Update { .. }));
    }

    #[test]
    fn changed_remote_url_takes_priority_over_path_or_revision() {
        let key = "foo#https://example/foo".to_string();
        let mut locals = HashMap::new();
        let mut l = local("foo", "foo", "origin/master", clean_state(None));
        l.remote = "https://example/old-foo".to_string();
        locals.insert(key.clone(), l);
        let mut remotes = HashMap::new();
        remotes.insert(key, remote("foo", "foo", "HEAD"));
        let ops = plan(locals, remotes, PlanFlags::default());
        assert!(matches!(ops[0], Operation::ChangeRemote { .. }));
    }

    #[test]
    fn moved_path_is_a_move_op() {
        let key = "foo#https://example/foo".to_string();
        let mut locals = HashMap::new();
        locals.insert(key.clone(), local("foo", "third_party/foo", "origin/master", clean_state(None)));
        let mut remotes = HashMap::new();
        remotes.insert(key, remote("foo", "vendor/foo", "HEAD"));
        let ops = plan(locals, remotes, PlanFlags::default());
        assert!(matches!(ops[0], Operation::Move { .. }));
    }

    #[test]
    fn renamed_project_with_stable_remote_and_path_is_not_delete_plus_create() {
        let mut local_project = local("old-name", "foo", "origin/master", clean_state(None));
        local_project.remote = "https://example/foo".to_string();
        let mut remote_project = remote("new-name", "foo", "HEAD");
        remote_project.remote = "https://example/foo".to_string();

        let mut locals = HashMap::new();
        locals.insert("old-name#https://example/foo".to_string(), local_project);
        let mut remotes = HashMap::new();
        remotes.insert("new-name#https://example/foo".to_string(), remote_project);

        let ops = plan(locals, remotes, PlanFlags::default());
        assert_eq!(ops.len(), 1);
        assert!(matches!(ops[0], Operation::Null { .. } | Operation::Update { .. }));
    }

    #[test]
    fn delete_precedes_create_at_overlapping_paths_and_deletes_are_deepest_first() {
        let mut locals = HashMap::new();
        locals.insert("a#https://example/a".to_string(), local("a", "a", "origin/master", clean_state(None)));
        locals.insert(
            "nested#https://example/nested".to_string(),
            local("nested", "a/nested", "origin/master", clean_state(None)),
        );
        let mut remotes = HashMap::new();
        remotes.insert("b#https://example/b".to_string(), remote("b", "b", "HEAD"));
        remotes.insert("b-child#https://example/b-child".to_string(), remote("b-child", "b/child", "HEAD"));

        let ops = plan(locals, remotes, PlanFlags { gc: true, ..Default::default() });

        let delete_positions: Vec<usize> =
            ops.iter().enumerate().filter(|(_, op)| matches!(op, Operation::Delete { .. })).map(|(i, _)| i).collect();
        let create_positions: Vec<usize> =
            ops.iter().enumerate().filter(|(_, op)| matches!(op, Operation::Create { .. })).map(|(i, _)| i).collect();
        assert!(delete_positions.iter().all(|d| create_positions.iter().all(|c| d < c)));

        // deepest delete ("a/nested") must precede its shallower parent ("a").
        let nested_pos = ops.iter().position(|op| op.path() == Path::new("a/nested")).unwrap();
        let parent_pos = ops.iter().position(|op| op.path() == Path::new("a")).unwrap();
        assert!(nested_pos < parent_pos);

        // shallower create ("b") must precede its nested child ("b/child").
        let b_pos = ops.iter().position(|op| op.path() == Path::new("b")).unwrap();
        let b_child_pos = ops.iter().position(|op| op.path() == Path::new("b/child")).unwrap();
        assert!(b_pos < b_child_pos);
    }

    #[test]
    fn idempotent_second_plan_is_all_nulls() {
        let key = "foo#https://example/foo".to_string();
        let mut locals = HashMap::new();
        locals.insert(key.clone(), local("foo", "foo", "origin/master", clean_state(None)));
        let mut remotes = HashMap::new();
        remotes.insert(key, remote("foo", "foo", "HEAD"));
        let ops = plan(locals, remotes, PlanFlags::default());
        assert!(ops.iter().all(|op| matches!(op, Operation::Null { .. })));
    }
}

