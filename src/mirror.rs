// src/mirror.rs

//! Default build logic for the `kiln` binary: mirror the source tree into
//! the target directory, copying only files that changed.
//!
//! Runs in two phases. The first creates every directory, the second copies
//! files. A failed first phase stops the build before any copy is queued.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context as _;
use tracing::debug;

use crate::context::Context;
use crate::exec::Job;
use crate::fs::{absolutize, FileSystem};

/// Source tree contents, relative to the source directory.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct TreePlan {
    pub dirs: Vec<PathBuf>,
    pub files: Vec<PathBuf>,
}

/// Walk `source`, skipping dot-entries and anything inside `target`.
///
/// `target` may be spelled differently from the paths under `source` (one
/// absolute, one relative), so directories are compared in absolute form.
pub fn plan_tree(fs: &dyn FileSystem, source: &Path, target: &Path) -> std::io::Result<TreePlan> {
    let skip = absolutize(target);
    let mut plan = TreePlan::default();
    let mut pending = vec![PathBuf::new()];

    while let Some(rel) = pending.pop() {
        let dir = source.join(&rel);
        for entry in fs.read_dir(&dir)? {
            let Some(name) = entry.file_name() else {
                continue;
            };
            if name.to_string_lossy().starts_with('.') {
                continue;
            }
            let child = rel.join(name);
            if fs.is_dir(&entry) {
                if absolutize(&entry) == skip {
                    continue;
                }
                plan.dirs.push(child.clone());
                pending.push(child);
            } else {
                plan.files.push(child);
            }
        }
    }

    plan.dirs.sort();
    plan.files.sort();
    Ok(plan)
}

/// Build function mirroring `ctx.source_dir()` into `ctx.target_dir()`.
pub async fn mirror_tree(ctx: Context) -> anyhow::Result<()> {
    let fs: Arc<dyn FileSystem> = Arc::clone(ctx.fs());
    let source = ctx.source_dir().to_path_buf();
    let target = ctx.target_dir().to_path_buf();

    let plan = plan_tree(fs.as_ref(), &source, &target)
        .with_context(|| format!("reading source tree {}", source.display()))?;
    debug!(
        dirs = plan.dirs.len(),
        files = plan.files.len(),
        workers = ctx.concurrency(),
        "planned mirror"
    );

    fs.create_dir_all(&target)
        .with_context(|| format!("creating {}", target.display()))?;

    for rel in plan.dirs {
        let fs = Arc::clone(&fs);
        let dir = target.join(&rel);
        ctx.enqueue(Job::blocking(format!("mkdir {}", rel.display()), move || {
            fs.create_dir_all(&dir)
                .with_context(|| format!("creating {}", dir.display()))?;
            Ok(false)
        }))
        .await;
    }

    if !ctx.wait().await {
        return Ok(());
    }

    for rel in plan.files {
        let fs = Arc::clone(&fs);
        let job_ctx = ctx.clone();
        let from = source.join(&rel);
        let to = target.join(&rel);
        ctx.enqueue(Job::blocking(format!("copy {}", rel.display()), move || {
            if job_ctx.is_unchanged(&from) && !job_ctx.forced() {
                return Ok(false);
            }
            fs.copy(&from, &to)
                .with_context(|| format!("copying {} to {}", from.display(), to.display()))?;
            Ok(true)
        }))
        .await;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextArgs;
    use crate::fs::mock::MockFileSystem;
    use crate::fs::RealFileSystem;
    use std::time::Duration;
    use tracing::Dispatch;

    fn site() -> MockFileSystem {
        let fs = MockFileSystem::new();
        fs.add_file("src/index.html", "<h1>hi</h1>");
        fs.add_file("src/css/site.css", "body {}");
        fs.add_file("src/.git/HEAD", "ref");
        fs.add_file("src/public/stale.html", "old");
        fs
    }

    fn context(fs: &MockFileSystem, target: &str) -> Context {
        Context::new(ContextArgs {
            concurrency: 2,
            log: tracing::dispatcher::get_default(Dispatch::clone),
            fs: Arc::new(fs.clone()),
            source_dir: PathBuf::from("src"),
            target_dir: PathBuf::from(target),
        })
    }

    #[test]
    fn plan_skips_dot_entries_and_target() {
        let fs = site();
        let plan = plan_tree(&fs, Path::new("src"), Path::new("src/public")).unwrap();

        assert_eq!(plan.dirs, vec![PathBuf::from("css")]);
        assert_eq!(
            plan.files,
            vec![PathBuf::from("css/site.css"), PathBuf::from("index.html")]
        );
    }

    #[cfg(unix)]
    #[test]
    fn plan_skips_target_spelled_relative_to_an_absolute_source() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().canonicalize().unwrap();
        std::fs::write(source.join("a.txt"), "a").unwrap();
        std::fs::create_dir_all(source.join("public")).unwrap();
        std::fs::write(source.join("public/a.txt"), "old output").unwrap();

        // Same directory, reached from the working directory through `..`.
        let cwd = std::env::current_dir().unwrap();
        let mut target = PathBuf::new();
        for _ in cwd.components().skip(1) {
            target.push("..");
        }
        let target = target.join(source.strip_prefix("/").unwrap()).join("public");
        assert!(target.is_relative());

        let plan = plan_tree(&RealFileSystem, &source, &target).unwrap();
        assert!(plan.dirs.is_empty());
        assert_eq!(plan.files, vec![PathBuf::from("a.txt")]);
    }

    #[tokio::test]
    async fn copies_only_changed_files() {
        let fs = site();
        let ctx = context(&fs, "out");

        ctx.begin_iteration();
        mirror_tree(ctx.clone()).await.unwrap();
        assert!(ctx.finish_phase().await);
        assert_eq!(ctx.stats().num_jobs_executed(), 3);
        assert_eq!(fs.contents("out/css/site.css").unwrap(), b"body {}");
        assert_eq!(fs.contents("out/public/stale.html").unwrap(), b"old");

        ctx.begin_iteration();
        mirror_tree(ctx.clone()).await.unwrap();
        assert!(ctx.finish_phase().await);
        assert_eq!(ctx.stats().num_jobs_executed(), 0);

        fs.touch("src/index.html", Duration::from_secs(1));
        ctx.begin_iteration();
        mirror_tree(ctx.clone()).await.unwrap();
        assert!(ctx.finish_phase().await);
        assert_eq!(ctx.stats().num_jobs_executed(), 1);
        let executed = ctx.stats().executed_jobs();
        assert_eq!(executed.len(), 1);
        assert_eq!(executed[0].name, "copy index.html");
    }

    #[tokio::test]
    async fn forced_context_copies_everything() {
        let fs = site();
        let ctx = context(&fs, "out");

        ctx.begin_iteration();
        mirror_tree(ctx.clone()).await.unwrap();
        assert!(ctx.finish_phase().await);

        ctx.begin_iteration();
        mirror_tree(ctx.forced_context()).await.unwrap();
        assert!(ctx.finish_phase().await);
        assert_eq!(ctx.stats().executed_jobs().len(), 3);
    }

    #[tokio::test]
    async fn failed_copy_is_reported_as_a_job_error() {
        let fs = site();
        fs.fail_with("src/index.html", std::io::ErrorKind::PermissionDenied);
        let ctx = context(&fs, "out");

        ctx.begin_iteration();
        mirror_tree(ctx.clone()).await.unwrap();
        assert!(!ctx.finish_phase().await);

        let errors = ctx.take_errors();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].to_string().contains("copy index.html"));
    }
}
