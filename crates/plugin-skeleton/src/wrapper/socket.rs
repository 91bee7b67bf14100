//! Socket paths of a wrapped plugin: one per registration directory.

use std::collections::HashMap;
use std::fs::DirBuilder;
use std::io;
use std::os::unix::fs::DirBuilderExt;
use std::os::unix::fs::MetadataExt;
use std::path::Path;
use std::path::PathBuf;

use error_stack::Report;
use error_stack::ResultExt;
use tracing::warn;

use crate::error::LifecycleError;

const REGISTRATION_DIR_MODE: u32 = 0o755;

/// `<dir>/<name>.sock` for every registration directory, in order.
pub(crate) fn socket_paths(registration_dirs: &[PathBuf], plugin_name: &str) -> Vec<PathBuf> {
    registration_dirs
        .iter()
        .map(|dir| dir.join(format!("{plugin_name}.sock")))
        .collect()
}

/// Readies every socket path for binding.
///
/// Creates missing registration directories, drops sockets whose directory is
/// the same filesystem location as an earlier one, and removes stale files at
/// the remaining paths.
pub(crate) fn prepare(
    plugin_name: &str,
    sockets: &mut Vec<PathBuf>,
) -> Result<(), Report<LifecycleError>> {
    let mut seen: HashMap<(u64, u64), PathBuf> = HashMap::with_capacity(sockets.len());
    let mut keep = Vec::with_capacity(sockets.len());

    for socket in sockets.iter() {
        let dir = registration_dir(socket);
        let dir_error = || LifecycleError::SocketDirectory {
            plugin: plugin_name.to_string(),
            dir: dir.to_path_buf(),
        };

        DirBuilder::new()
            .recursive(true)
            .mode(REGISTRATION_DIR_MODE)
            .create(dir)
            .change_context_lazy(dir_error)?;
        let metadata = std::fs::metadata(dir).change_context_lazy(dir_error)?;

        if let Some(first) = seen.get(&(metadata.dev(), metadata.ino())) {
            warn!(
                "registration dir {} is the same location as {}, skip socket {}",
                dir.display(),
                first.display(),
                socket.display()
            );
            keep.push(false);
            continue;
        }
        seen.insert((metadata.dev(), metadata.ino()), dir.to_path_buf());
        keep.push(true);
    }

    let mut keep = keep.into_iter();
    sockets.retain(|_| keep.next().unwrap_or(false));

    if sockets.is_empty() {
        return Err(Report::new(LifecycleError::EmptySockets {
            plugin: plugin_name.to_string(),
        }));
    }

    remove_sockets(plugin_name, sockets)
}

/// Removes the socket files; paths that do not exist are fine.
pub(crate) fn remove_sockets(
    plugin_name: &str,
    sockets: &[PathBuf],
) -> Result<(), Report<LifecycleError>> {
    for socket in sockets {
        match std::fs::remove_file(socket) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(Report::new(e)
                    .change_context(LifecycleError::Cleanup {
                        plugin: plugin_name.to_string(),
                    })
                    .attach_printable(format!("remove {}", socket.display())));
            }
        }
    }
    Ok(())
}

fn registration_dir(socket: &Path) -> &Path {
    socket
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
}

#[cfg(test)]
mod tests {
    use std::os::unix::fs::PermissionsExt;

    use similar_asserts::assert_eq;

    use super::*;

    #[test]
    fn one_socket_per_dir() {
        let sockets = socket_paths(
            &[PathBuf::from("/var/lib/a"), PathBuf::from("/var/lib/b/")],
            "cpu-plugin",
        );
        assert_eq!(
            sockets,
            vec![
                PathBuf::from("/var/lib/a/cpu-plugin.sock"),
                PathBuf::from("/var/lib/b/cpu-plugin.sock")
            ]
        );
        assert!(socket_paths(&[], "cpu-plugin").is_empty());
    }

    #[test]
    fn prepare_creates_dirs_and_removes_stale_files() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let existing = tmp.path().join("existing");
        std::fs::create_dir(&existing).expect("mkdir");
        std::fs::write(existing.join("cpu-plugin.sock"), b"stale").expect("stale file");
        let missing = tmp.path().join("nested").join("missing");

        let mut sockets = socket_paths(&[existing.clone(), missing.clone()], "cpu-plugin");
        prepare("cpu-plugin", &mut sockets).expect("prepare");

        assert_eq!(sockets.len(), 2);
        assert!(!existing.join("cpu-plugin.sock").exists());
        assert!(missing.is_dir());
        let mode = std::fs::metadata(&missing).expect("stat").permissions().mode();
        assert_eq!(mode & 0o022, 0, "group/other must not be writable");
    }

    #[test]
    fn prepare_collapses_aliased_dirs() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let real = tmp.path().join("real");
        std::fs::create_dir(&real).expect("mkdir");
        let alias = tmp.path().join("alias");
        std::os::unix::fs::symlink(&real, &alias).expect("symlink");
        let other = tmp.path().join("other");

        let mut sockets = socket_paths(&[real.clone(), alias, other.clone()], "cpu-plugin");
        prepare("cpu-plugin", &mut sockets).expect("prepare");

        assert_eq!(
            sockets,
            vec![real.join("cpu-plugin.sock"), other.join("cpu-plugin.sock")]
        );
    }

    #[test]
    fn prepare_rejects_empty_set() {
        let mut sockets = Vec::new();
        let err = prepare("cpu-plugin", &mut sockets).expect_err("no sockets");
        assert_eq!(
            err.current_context().to_string(),
            "cpu-plugin plugin got empty sockets"
        );
    }

    #[test]
    fn remove_sockets_ignores_missing_files() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let present = tmp.path().join("present.sock");
        std::fs::write(&present, b"").expect("file");

        remove_sockets("p", &[present.clone(), tmp.path().join("absent.sock")])
            .expect("missing files are fine");
        assert!(!present.exists());
    }

    #[test]
    fn remove_sockets_surfaces_other_errors() {
        let tmp = tempfile::tempdir().expect("tempdir");
        // remove_file on a directory fails with something other than NotFound
        let dir_socket = tmp.path().join("busy.sock");
        std::fs::create_dir(&dir_socket).expect("mkdir");

        let err = remove_sockets("p", &[dir_socket]).expect_err("cannot remove a directory");
        assert_eq!(err.current_context().to_string(), "cleanup failed for p");
    }
}
