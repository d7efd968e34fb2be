//! Git integration: repository provenance and the version-control
//! collaborator used to publish results.

use std::path::Path;
use std::process::Command;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::error::{Result, VandvError};
use crate::settings::CommitIdentity;

/// Capture the HEAD commit SHA from a git repository.
///
/// Runs `git rev-parse HEAD` in the given directory. Returns an error if the
/// directory is not inside a git repository or if git is not available.
pub fn capture_head_sha(repo_dir: &Path) -> Result<String> {
    let output = Command::new("git")
        .args(["rev-parse", "HEAD"])
        .current_dir(repo_dir)
        .output()
        .map_err(|e| VandvError::GitError(format!("failed to run git: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(VandvError::GitError(format!(
            "git rev-parse HEAD failed: {stderr}"
        )));
    }

    let sha = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if sha.is_empty() {
        return Err(VandvError::GitError(
            "git rev-parse HEAD returned empty output".to_string(),
        ));
    }

    Ok(sha)
}

/// Minimal version-control surface used by publishing and combining.
///
/// Every operation after `checkout` acts on the work tree it produced.
#[async_trait]
pub trait VersionControl: Send + Sync {
    /// Clone `source` into `work_tree`, or refresh and clean an existing
    /// clone, and leave HEAD detached at the base new branches start from:
    /// `reference` (remote-tracking when available) or the remote's default
    /// branch.
    async fn checkout(&self, source: &str, reference: Option<&str>, work_tree: &Path)
        -> Result<()>;

    /// Switch to `branch`: the remote branch of that name when one exists,
    /// otherwise a new branch at the base left by `checkout`.
    async fn create_or_switch_branch(&self, work_tree: &Path, branch: &str) -> Result<()>;

    /// Stage everything and commit. Returns `false` without committing when
    /// the tree has no changes.
    async fn commit_if_changed(&self, work_tree: &Path, message: &str) -> Result<bool>;

    /// Push `branch` to `origin`.
    async fn push(&self, work_tree: &Path, branch: &str) -> Result<()>;
}

/// [`VersionControl`] backed by the `git` command line.
#[derive(Debug, Clone, Default)]
pub struct GitCli {
    identity: CommitIdentity,
}

impl GitCli {
    pub fn new(identity: CommitIdentity) -> Self {
        Self { identity }
    }

    async fn git(&self, work_tree: &Path, args: &[&str]) -> Result<String> {
        debug!(cwd = %work_tree.display(), ?args, "git");
        let output = tokio::process::Command::new("git")
            .args(args)
            .current_dir(work_tree)
            .output()
            .await
            .map_err(|e| VandvError::GitError(format!("failed to run git: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(VandvError::GitError(format!(
                "git {} failed: {}",
                args.join(" "),
                stderr.trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn ref_exists(&self, work_tree: &Path, reference: &str) -> bool {
        self.git(work_tree, &["rev-parse", "--verify", "--quiet", reference])
            .await
            .is_ok()
    }

    /// Commit new branches start from: the remote-tracking `reference`, the
    /// reference itself (tag or SHA), or `origin/HEAD`.
    async fn resolve_base(&self, work_tree: &Path, reference: Option<&str>) -> Option<String> {
        let candidates = match reference {
            Some(r) => vec![format!("refs/remotes/origin/{r}"), format!("{r}^{{commit}}")],
            None => vec!["refs/remotes/origin/HEAD".to_string()],
        };
        for candidate in candidates {
            if self.ref_exists(work_tree, &candidate).await {
                return Some(candidate);
            }
        }
        None
    }
}

#[async_trait]
impl VersionControl for GitCli {
    async fn checkout(
        &self,
        source: &str,
        reference: Option<&str>,
        work_tree: &Path,
    ) -> Result<()> {
        let reused = work_tree.join(".git").exists();
        if reused {
            info!(work_tree = %work_tree.display(), "Refreshing existing clone");
            self.git(work_tree, &["fetch", "--prune", "origin"]).await?;
            // Drop whatever an earlier run left behind.
            if self.ref_exists(work_tree, "HEAD").await {
                self.git(work_tree, &["reset", "--hard", "--quiet"]).await?;
            }
            self.git(work_tree, &["clean", "-fdxq"]).await?;
        } else {
            if let Some(parent) = work_tree.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            let target = work_tree.to_string_lossy();
            info!(source, work_tree = %target, "Cloning results repository");
            self.git(Path::new("."), &["clone", source, &target]).await?;
        }

        match (self.resolve_base(work_tree, reference).await, reference) {
            (Some(base), _) => {
                debug!(%base, "Detaching at base");
                self.git(work_tree, &["checkout", "--quiet", "--detach", &base])
                    .await?;
            }
            (None, Some(reference)) => {
                return Err(VandvError::GitError(format!(
                    "reference {reference:?} not found in {source}"
                )));
            }
            // No default branch: a fresh clone has an unborn HEAD and nothing
            // to inherit, a reused one would still sit on an earlier run's branch.
            (None, None) if reused && self.ref_exists(work_tree, "HEAD").await => {
                return Err(VandvError::GitError(format!(
                    "{source} has no default branch; set a base ref"
                )));
            }
            (None, None) => {}
        }
        Ok(())
    }

    async fn create_or_switch_branch(&self, work_tree: &Path, branch: &str) -> Result<()> {
        let remote = format!("origin/{branch}");
        if self
            .ref_exists(work_tree, &format!("refs/remotes/{remote}"))
            .await
        {
            info!(branch, "Reusing remote branch");
            self.git(work_tree, &["checkout", "--quiet", "-B", branch, "--track", &remote])
                .await?;
        } else {
            info!(branch, "Creating branch");
            self.git(work_tree, &["checkout", "--quiet", "-B", branch])
                .await?;
        }
        Ok(())
    }

    async fn commit_if_changed(&self, work_tree: &Path, message: &str) -> Result<bool> {
        self.git(work_tree, &["add", "--all"]).await?;
        let status = self.git(work_tree, &["status", "--porcelain"]).await?;
        if status.trim().is_empty() {
            info!("No changes to commit");
            return Ok(false);
        }

        let name = format!("user.name={}", self.identity.name);
        let email = format!("user.email={}", self.identity.email);
        self.git(
            work_tree,
            &["-c", &name, "-c", &email, "commit", "-m", message],
        )
        .await?;
        Ok(true)
    }

    async fn push(&self, work_tree: &Path, branch: &str) -> Result<()> {
        self.git(work_tree, &["push", "-u", "origin", branch]).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::process::Command as StdCommand;

    fn run_git(repo_dir: &Path, args: &[&str]) -> String {
        let output = StdCommand::new("git")
            .args(args)
            .current_dir(repo_dir)
            .output()
            .unwrap();
        assert!(
            output.status.success(),
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
        String::from_utf8_lossy(&output.stdout).into_owned()
    }

    fn make_git_repo() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        run_git(dir.path(), &["init"]);
        run_git(dir.path(), &["config", "user.name", "test-user"]);
        run_git(dir.path(), &["config", "user.email", "test@example.com"]);
        run_git(dir.path(), &["commit", "--allow-empty", "-m", "initial"]);
        dir
    }

    /// Bare remote holding one branch `2DML_alice` with an unrelated file.
    fn make_remote() -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let remote = dir.path().join("website.git");
        let seed = dir.path().join("seed");
        std::fs::create_dir_all(&seed).unwrap();
        run_git(dir.path(), &["init", "--bare", remote.to_str().unwrap()]);
        run_git(&seed, &["init"]);
        run_git(&seed, &["config", "user.name", "test-user"]);
        run_git(&seed, &["config", "user.email", "test@example.com"]);
        run_git(&seed, &["checkout", "-b", "2DML_alice"]);
        std::fs::create_dir_all(seed.join("vandv_files/OTHER")).unwrap();
        std::fs::write(seed.join("vandv_files/OTHER/keep.txt"), "keep").unwrap();
        run_git(&seed, &["add", "--all"]);
        run_git(&seed, &["commit", "-m", "seed"]);
        run_git(&seed, &["remote", "add", "origin", remote.to_str().unwrap()]);
        run_git(&seed, &["push", "origin", "2DML_alice"]);
        (dir, remote)
    }

    /// Bare remote whose default branch `main` holds a README.
    fn make_remote_with_default() -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let remote = dir.path().join("website.git");
        let seed = dir.path().join("seed");
        std::fs::create_dir_all(&seed).unwrap();
        run_git(dir.path(), &["init", "--bare", remote.to_str().unwrap()]);
        run_git(&seed, &["init"]);
        run_git(&seed, &["config", "user.name", "test-user"]);
        run_git(&seed, &["config", "user.email", "test@example.com"]);
        run_git(&seed, &["checkout", "-b", "main"]);
        std::fs::write(seed.join("README"), "results").unwrap();
        run_git(&seed, &["add", "--all"]);
        run_git(&seed, &["commit", "-m", "seed"]);
        run_git(&seed, &["remote", "add", "origin", remote.to_str().unwrap()]);
        run_git(&seed, &["push", "origin", "main"]);
        run_git(&remote, &["symbolic-ref", "HEAD", "refs/heads/main"]);
        (dir, remote)
    }

    #[test]
    fn capture_head_sha_returns_40_hex_chars() {
        let repo = make_git_repo();
        let sha = capture_head_sha(repo.path()).unwrap();
        assert_eq!(sha.len(), 40, "SHA should be 40 hex chars, got: {sha}");
        assert!(sha.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn capture_head_sha_fails_outside_repo() {
        let dir = tempfile::tempdir().unwrap();
        assert!(capture_head_sha(dir.path()).is_err());
    }

    #[tokio::test]
    async fn existing_remote_branch_is_reused_and_extended() {
        let (dir, remote) = make_remote();
        let work_tree = dir.path().join("checkout");
        let git = GitCli::default();

        git.checkout(remote.to_str().unwrap(), None, &work_tree)
            .await
            .unwrap();
        git.create_or_switch_branch(&work_tree, "2DML_alice")
            .await
            .unwrap();
        assert!(work_tree.join("vandv_files/OTHER/keep.txt").exists());

        std::fs::create_dir_all(work_tree.join("vandv_files/2DML")).unwrap();
        std::fs::write(work_tree.join("vandv_files/2DML/plot.png"), "png").unwrap();
        assert!(git.commit_if_changed(&work_tree, "add plots").await.unwrap());
        git.push(&work_tree, "2DML_alice").await.unwrap();

        let tree = run_git(&remote, &["ls-tree", "-r", "--name-only", "2DML_alice"]);
        assert!(tree.contains("vandv_files/OTHER/keep.txt"));
        assert!(tree.contains("vandv_files/2DML/plot.png"));
    }

    #[tokio::test]
    async fn commit_without_changes_is_noop() {
        let (dir, remote) = make_remote();
        let work_tree = dir.path().join("checkout");
        let git = GitCli::default();

        git.checkout(remote.to_str().unwrap(), None, &work_tree)
            .await
            .unwrap();
        git.create_or_switch_branch(&work_tree, "2DML_alice")
            .await
            .unwrap();
        assert!(!git.commit_if_changed(&work_tree, "nothing").await.unwrap());
    }

    #[tokio::test]
    async fn new_branch_is_created_when_absent() {
        let (dir, remote) = make_remote();
        let work_tree = dir.path().join("checkout");
        let git = GitCli::default();

        git.checkout(remote.to_str().unwrap(), Some("2DML_alice"), &work_tree)
            .await
            .unwrap();
        git.create_or_switch_branch(&work_tree, "3DWB_bob").await.unwrap();

        let head = run_git(&work_tree, &["rev-parse", "--abbrev-ref", "HEAD"]);
        assert_eq!(head.trim(), "3DWB_bob");
    }

    #[tokio::test]
    async fn reused_clone_starts_new_branch_from_default_branch() {
        let (dir, remote) = make_remote_with_default();
        let source = remote.to_str().unwrap();
        let work_tree = dir.path().join("checkout");
        let git = GitCli::default();

        git.checkout(source, None, &work_tree).await.unwrap();
        git.create_or_switch_branch(&work_tree, "3DWB_bob").await.unwrap();
        std::fs::create_dir_all(work_tree.join("vandv_files/3DWB")).unwrap();
        std::fs::write(work_tree.join("vandv_files/3DWB/p.png"), "png").unwrap();
        assert!(git.commit_if_changed(&work_tree, "bob").await.unwrap());
        // Never pushed, and a half-written file is left behind.
        std::fs::write(work_tree.join("vandv_files/3DWB/partial.png"), "half").unwrap();

        git.checkout(source, None, &work_tree).await.unwrap();
        git.create_or_switch_branch(&work_tree, "2DML_alice").await.unwrap();
        assert!(!work_tree.join("vandv_files/3DWB").exists());
        std::fs::create_dir_all(work_tree.join("vandv_files/2DML")).unwrap();
        std::fs::write(work_tree.join("vandv_files/2DML/q.png"), "png").unwrap();
        assert!(git.commit_if_changed(&work_tree, "alice").await.unwrap());
        git.push(&work_tree, "2DML_alice").await.unwrap();

        let tree = run_git(&remote, &["ls-tree", "-r", "--name-only", "2DML_alice"]);
        let files: Vec<&str> = tree.lines().collect();
        assert_eq!(files, ["README", "vandv_files/2DML/q.png"]);
    }

    #[tokio::test]
    async fn reused_clone_resets_stale_local_branch_to_remote() {
        let (dir, remote) = make_remote();
        let source = remote.to_str().unwrap();
        let work_tree = dir.path().join("checkout");
        let git = GitCli::default();

        git.checkout(source, Some("2DML_alice"), &work_tree).await.unwrap();
        git.create_or_switch_branch(&work_tree, "2DML_alice").await.unwrap();
        std::fs::write(work_tree.join("unpushed.txt"), "stale").unwrap();
        assert!(git.commit_if_changed(&work_tree, "stale").await.unwrap());

        git.checkout(source, Some("2DML_alice"), &work_tree).await.unwrap();
        git.create_or_switch_branch(&work_tree, "2DML_alice").await.unwrap();
        assert!(!work_tree.join("unpushed.txt").exists());
        assert!(work_tree.join("vandv_files/OTHER/keep.txt").exists());
    }

    #[tokio::test]
    async fn reused_clone_without_default_branch_needs_base_ref() {
        let (dir, remote) = make_remote();
        let source = remote.to_str().unwrap();
        let work_tree = dir.path().join("checkout");
        let git = GitCli::default();

        git.checkout(source, None, &work_tree).await.unwrap();
        git.create_or_switch_branch(&work_tree, "3DWB_bob").await.unwrap();
        std::fs::write(work_tree.join("bob.txt"), "bob").unwrap();
        assert!(git.commit_if_changed(&work_tree, "bob").await.unwrap());

        let err = git.checkout(source, None, &work_tree).await.unwrap_err();
        assert!(err.to_string().contains("no default branch"));
        let err = git
            .checkout(source, Some("missing"), &work_tree)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not found"));

        git.checkout(source, Some("2DML_alice"), &work_tree).await.unwrap();
        git.create_or_switch_branch(&work_tree, "4XYZ_carol").await.unwrap();
        assert!(!work_tree.join("bob.txt").exists());
        assert!(work_tree.join("vandv_files/OTHER/keep.txt").exists());
    }
}
