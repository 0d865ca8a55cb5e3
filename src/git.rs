//! Project and corpus repository handling through the `git` CLI.
//!
//! Repository URLs may carry access tokens, so every URL passes through
//! [`sanitize_url`] before it reaches a log line or an error message.

use std::path::Path;
use std::process::Stdio;

use anyhow::Context;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::info;
use url::Url;

use crate::config::{FuzzConfig, GitIdentityConfig, WorkspacePaths};

/// Placeholder substituted for URL credentials.
pub const CREDENTIAL_MASK: &str = "*****";

/// Replace any user info in `raw` with [`CREDENTIAL_MASK`].
///
/// Input that does not parse as a URL is returned unchanged.
pub fn sanitize_url(raw: &str) -> String {
    let Ok(mut parsed) = Url::parse(raw) else {
        return raw.to_owned();
    };
    if parsed.username().is_empty() && parsed.password().is_none() {
        return raw.to_owned();
    }
    if parsed.set_password(None).is_err() || parsed.set_username(CREDENTIAL_MASK).is_err() {
        return CREDENTIAL_MASK.to_owned();
    }
    parsed.to_string()
}

/// Clone the project and corpus repositories concurrently.
///
/// The first failure aborts the other clone. Cancellation stops both and
/// is not an error.
///
/// # Errors
///
/// Returns an error if either clone fails.
pub async fn clone_repositories(
    config: &FuzzConfig,
    paths: &WorkspacePaths,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    let project = clone_repo(&config.project_src_path, &paths.project_dir, "project", cancel);
    let storage = clone_repo(&config.git_storage_repo, &paths.corpus_dir, "storage", cancel);

    tokio::try_join!(project, storage).context("error cloning repository")?;
    Ok(())
}

async fn clone_repo(
    url: &str,
    path: &Path,
    desc: &str,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    let safe_url = sanitize_url(url);
    info!(url = %safe_url, path = %path.display(), desc, "cloning repository");

    let mut cmd = Command::new("git");
    cmd.arg("clone")
        .arg("--quiet")
        .arg("--")
        .arg(url)
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let output = tokio::select! {
        biased;
        () = cancel.cancelled() => {
            info!(desc, "clone canceled");
            return Ok(());
        }
        output = cmd.output() => output.with_context(|| format!("failed to run git clone for {desc}"))?,
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).replace(url, &safe_url);
        anyhow::bail!("{desc} repository clone failed: {}", stderr.trim());
    }
    Ok(())
}

/// Commit every change in the corpus checkout and push it.
///
/// A clean checkout is logged and left alone.
///
/// # Errors
///
/// Returns an error if any git step fails.
pub async fn commit_and_push(identity: &GitIdentityConfig, corpus_dir: &Path) -> anyhow::Result<()> {
    let status = run_git(corpus_dir, &["status", "--porcelain"]).await?;
    if status.trim().is_empty() {
        info!("no corpus changes to commit");
        return Ok(());
    }

    run_git(corpus_dir, &["add", "--all"])
        .await
        .context("failed to stage changes")?;

    let name = format!("user.name={}", identity.user_name);
    let email = format!("user.email={}", identity.user_email);
    run_git(
        corpus_dir,
        &["-c", &name, "-c", &email, "commit", "--quiet", "-m", &identity.commit_message],
    )
    .await
    .context("commit failed")?;

    run_git(corpus_dir, &["push", "--quiet"])
        .await
        .context("push failed")?;

    info!("successfully updated corpus repository");
    Ok(())
}

async fn run_git(dir: &Path, args: &[&str]) -> anyhow::Result<String> {
    let output = Command::new("git")
        .arg("-C")
        .arg(dir)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .await
        .with_context(|| format!("failed to run git {}", args.join(" ")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        anyhow::bail!("git {} failed: {}", args.join(" "), stderr.trim());
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}
