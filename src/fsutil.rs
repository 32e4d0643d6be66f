use std::fs;
use std::io;
use std::path::Path;
use std::thread;
use std::time::Duration;

use walkdir::WalkDir;

use crate::cancel::{CancellationToken, Outcome, StepResult};
use crate::check_cancelled;

const REMOVE_ATTEMPTS: usize = 5;

/// Recursively removes a directory, tolerating read-only entries and
/// transient locks.
///
/// Distribution trees regularly contain read-only files, and antivirus or
/// indexing services can hold handles briefly after extraction. Each
/// attempt first clears read-only flags across the tree, then retries with
/// a growing backoff before giving up.
pub fn remove_dir_all_robust(path: &Path) -> io::Result<()> {
    if !path.exists() {
        return Ok(());
    }

    for attempt in 1..=REMOVE_ATTEMPTS {
        clear_readonly(path);
        match fs::remove_dir_all(path) {
            Ok(()) => return Ok(()),
            Err(err) if attempt < REMOVE_ATTEMPTS => {
                log::debug!(
                    "removing '{}' failed on attempt {attempt}: {err}; retrying",
                    path.display()
                );
                thread::sleep(Duration::from_millis(100 * attempt as u64));
            }
            Err(err) => return Err(err),
        }
    }
    Ok(())
}

/// Best-effort removal that only logs on failure, for cleanup paths where
/// a leftover directory must not mask the original error.
pub fn remove_dir_best_effort(path: &Path) {
    if let Err(err) = remove_dir_all_robust(path) {
        log::warn!("could not remove '{}': {err}", path.display());
    }
}

/// Best-effort removal of a single file.
pub fn remove_file_best_effort(path: &Path) {
    if path.exists() {
        if let Err(err) = fs::remove_file(path) {
            log::warn!("could not remove '{}': {err}", path.display());
        }
    }
}

fn clear_readonly(path: &Path) {
    for entry in WalkDir::new(path).into_iter().flatten() {
        if let Ok(metadata) = entry.metadata() {
            let mut permissions = metadata.permissions();
            if permissions.readonly() {
                #[allow(clippy::permissions_set_readonly_false)]
                permissions.set_readonly(false);
                if let Err(err) = fs::set_permissions(entry.path(), permissions) {
                    log::debug!(
                        "could not clear read-only flag on '{}': {err}",
                        entry.path().display()
                    );
                }
            }
        }
    }
}

/// Copies the content of `src` into `dst`, creating directories as needed
/// and overwriting files that already exist. Checks the cancellation token
/// between entries.
pub fn copy_dir_merge(src: &Path, dst: &Path, token: &CancellationToken) -> StepResult<()> {
    fs::create_dir_all(dst)?;

    for entry in WalkDir::new(src) {
        check_cancelled!(token);
        let entry = entry.map_err(|err| {
            io::Error::other(format!("could not walk '{}': {err}", src.display()))
        })?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(|err| io::Error::other(err.to_string()))?;
        if relative.as_os_str().is_empty() {
            continue;
        }
        let target = dst.join(relative);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(Outcome::Completed(()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;

    fn write_file(path: &Path, content: &str) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        let mut file = File::create(path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
    }

    #[test]
    fn removes_tree_with_readonly_entries() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("dist");
        let locked = root.join("sub").join("locked.dll");
        write_file(&locked, "bytes");
        let mut permissions = fs::metadata(&locked).unwrap().permissions();
        permissions.set_readonly(true);
        fs::set_permissions(&locked, permissions).unwrap();

        remove_dir_all_robust(&root).unwrap();
        assert!(!root.exists());
    }

    #[test]
    fn removing_a_missing_directory_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        remove_dir_all_robust(&dir.path().join("nope")).unwrap();
    }

    #[test]
    fn merge_copy_overwrites_and_creates() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        let dst = dir.path().join("dst");
        write_file(&src.join("a.txt"), "new");
        write_file(&src.join("nested/b.txt"), "b");
        write_file(&dst.join("a.txt"), "old");
        write_file(&dst.join("keep.txt"), "kept");

        let token = CancellationToken::new();
        let outcome = copy_dir_merge(&src, &dst, &token).unwrap();
        assert_eq!(outcome, Outcome::Completed(()));
        assert_eq!(fs::read_to_string(dst.join("a.txt")).unwrap(), "new");
        assert_eq!(fs::read_to_string(dst.join("nested/b.txt")).unwrap(), "b");
        assert_eq!(fs::read_to_string(dst.join("keep.txt")).unwrap(), "kept");
    }

    #[test]
    fn merge_copy_observes_cancellation() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        write_file(&src.join("a.txt"), "a");
        let token = CancellationToken::new();
        token.cancel();
        let outcome = copy_dir_merge(&src, &dir.path().join("dst"), &token).unwrap();
        assert!(outcome.is_cancelled());
    }
}
