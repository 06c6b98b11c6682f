//! Copy-if-absent provisioning of extension data directories

use std::fs;
use std::io;
use std::path::Path;
use trellis_core::{DataDirEntry, Provisioner};
use walkdir::WalkDir;

/// Copies an extension's declared data directory into the application tree
/// the first time the application starts. An existing target is left alone
/// so local edits survive restarts.
#[derive(Debug, Default)]
pub struct CopyProvisioner;

impl Provisioner for CopyProvisioner {
    fn provision(&self, entry: &DataDirEntry) -> io::Result<bool> {
        if entry.target.exists() {
            tracing::debug!(
                "Data for {} already present at {}",
                entry.extension,
                entry.target.display()
            );
            return Ok(false);
        }
        if !entry.declared.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("data directory {} not found", entry.declared.display()),
            ));
        }

        // Stage next to the target so a failed copy never leaves a partial tree
        let parent = entry.target.parent().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} has no parent directory", entry.target.display()),
            )
        })?;
        fs::create_dir_all(parent)?;
        let staging = tempfile::Builder::new()
            .prefix(".provision-")
            .tempdir_in(parent)?;

        let copied = copy_tree(&entry.declared, staging.path())?;
        fs::rename(staging.path(), &entry.target)?;
        tracing::debug!("Copied {} files for {}", copied, entry.extension);
        Ok(true)
    }
}

fn copy_tree(from: &Path, to: &Path) -> io::Result<usize> {
    let mut copied = 0;
    for entry in WalkDir::new(from).follow_links(true) {
        let entry = entry.map_err(io::Error::from)?;
        let relative = entry
            .path()
            .strip_prefix(from)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        let dest = to.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&dest)?;
        } else if entry.file_type().is_file() {
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(entry.path(), &dest)?;
            copied += 1;
        }
    }
    Ok(copied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn entry(declared: PathBuf, target: PathBuf) -> DataDirEntry {
        DataDirEntry {
            extension: "app/foo".to_string(),
            declared,
            target,
        }
    }

    #[test]
    fn test_copies_when_absent() {
        let src = tempfile::tempdir().unwrap();
        fs::create_dir_all(src.path().join("templates")).unwrap();
        fs::write(src.path().join("templates/hello.html"), "hi").unwrap();
        fs::write(src.path().join("settings.toml"), "x = 1").unwrap();

        let app = tempfile::tempdir().unwrap();
        let target = app.path().join("extensions/foo");
        let written = CopyProvisioner
            .provision(&entry(src.path().to_path_buf(), target.clone()))
            .unwrap();

        assert!(written);
        assert_eq!(fs::read_to_string(target.join("templates/hello.html")).unwrap(), "hi");
        assert!(target.join("settings.toml").is_file());
    }

    #[test]
    fn test_existing_target_is_kept() {
        let src = tempfile::tempdir().unwrap();
        fs::write(src.path().join("settings.toml"), "x = 1").unwrap();

        let app = tempfile::tempdir().unwrap();
        let target = app.path().join("extensions/foo");
        fs::create_dir_all(&target).unwrap();
        fs::write(target.join("settings.toml"), "x = 2").unwrap();

        let written = CopyProvisioner
            .provision(&entry(src.path().to_path_buf(), target.clone()))
            .unwrap();

        assert!(!written);
        assert_eq!(fs::read_to_string(target.join("settings.toml")).unwrap(), "x = 2");
    }

    #[cfg(unix)]
    #[test]
    fn test_failed_copy_leaves_no_target() {
        let src = tempfile::tempdir().unwrap();
        fs::write(src.path().join("settings.toml"), "x = 1").unwrap();
        std::os::unix::fs::symlink(src.path().join("gone"), src.path().join("dangling")).unwrap();

        let app = tempfile::tempdir().unwrap();
        let target = app.path().join("extensions/foo");
        let provisioned = CopyProvisioner.provision(&entry(src.path().to_path_buf(), target.clone()));

        assert!(provisioned.is_err());
        assert!(!target.exists());
        assert_eq!(fs::read_dir(app.path().join("extensions")).unwrap().count(), 0);

        // Once the source is repaired the next start provisions normally
        fs::remove_file(src.path().join("dangling")).unwrap();
        assert!(CopyProvisioner
            .provision(&entry(src.path().to_path_buf(), target.clone()))
            .unwrap());
        assert!(target.join("settings.toml").is_file());
    }

    #[test]
    fn test_missing_source_is_an_error() {
        let app = tempfile::tempdir().unwrap();
        let err = CopyProvisioner
            .provision(&entry(
                app.path().join("does-not-exist"),
                app.path().join("extensions/foo"),
            ))
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
