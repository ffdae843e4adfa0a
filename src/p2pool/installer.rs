//! Installation of a verified release archive
//!
//! Write, extract, always remove the archive, then check that the binary is
//! where the release table says it is.

use super::extractor::{cleanup_archive, extract_archive};
use super::platform::PlatformTarget;
use crate::error::DownloadFailureReason;
use std::fs;
use std::path::{Path, PathBuf};

/// Install already-verified archive bytes for `target`
///
/// Blocking; callers on an async runtime should use `spawn_blocking`.
pub fn install_archive(
    bytes: &[u8],
    target: &PlatformTarget,
) -> Result<PathBuf, DownloadFailureReason> {
    let archive_path = target.archive_path();

    if let Err(e) = fs::create_dir_all(&target.install_root) {
        log::error!(
            "Failed to create install root {}: {}",
            target.install_root.display(),
            e
        );
        return Err(DownloadFailureReason::InstallationFailed);
    }

    if let Err(e) = fs::write(&archive_path, bytes) {
        log::error!("Failed to write {}: {}", archive_path.display(), e);
        if let Err(e) = cleanup_archive(&archive_path) {
            log::warn!("{}", e);
        }
        return Err(DownloadFailureReason::InstallationFailed);
    }

    let extracted = extract_archive(&archive_path, &target.install_root);

    // Cleanup runs whether or not extraction worked
    if let Err(e) = cleanup_archive(&archive_path) {
        log::warn!("{}", e);
    }

    if let Err(e) = extracted {
        log::error!("Extraction failed: {}", e);
        return Err(DownloadFailureReason::InstallationFailed);
    }

    let binary = &target.installed_binary_path;
    if !is_regular_file(binary) {
        log::error!("p2pool binary missing after extraction: {}", binary.display());
        return Err(DownloadFailureReason::InstallationFailed);
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Err(e) = fs::set_permissions(binary, fs::Permissions::from_mode(0o755)) {
            log::warn!("Failed to set executable permission: {}", e);
        }
    }

    log::info!("p2pool installed to {}", binary.display());
    Ok(binary.clone())
}

pub(crate) fn is_regular_file(path: &Path) -> bool {
    fs::metadata(path).map(|m| m.is_file()).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::p2pool::extractor::tests::build_tar_gz;
    use crate::p2pool::platform::{Platform, ReleaseTable};
    use tempfile::TempDir;

    fn linux_target(root: &Path) -> PlatformTarget {
        ReleaseTable::builtin()
            .resolve(Platform::LinuxX64, root)
            .unwrap()
    }

    #[test]
    fn test_install_success() {
        let dir = TempDir::new().unwrap();
        let target = linux_target(dir.path());
        let bytes = build_tar_gz(&[("p2pool-v4.9-linux-x64/p2pool", b"binary", 0o644)]);

        let installed = install_archive(&bytes, &target).unwrap();

        assert_eq!(installed, target.installed_binary_path);
        assert!(is_regular_file(&installed));
        assert!(!target.archive_path().exists());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&installed).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o755);
        }
    }

    #[test]
    fn test_install_missing_binary() {
        let dir = TempDir::new().unwrap();
        let target = linux_target(dir.path());
        let bytes = build_tar_gz(&[("p2pool-v4.9-linux-x64/README.md", b"docs", 0o644)]);

        let result = install_archive(&bytes, &target);

        assert_eq!(result.unwrap_err(), DownloadFailureReason::InstallationFailed);
        assert!(!target.archive_path().exists());
    }

    #[test]
    fn test_install_corrupt_archive_is_cleaned_up() {
        let dir = TempDir::new().unwrap();
        let target = linux_target(dir.path());

        let result = install_archive(b"not an archive", &target);

        assert_eq!(result.unwrap_err(), DownloadFailureReason::InstallationFailed);
        assert!(!target.archive_path().exists());
        assert!(!target.installed_binary_path.exists());
    }

    #[test]
    fn test_install_unwritable_archive_path() {
        let dir = TempDir::new().unwrap();
        let target = linux_target(dir.path());
        // A directory in the archive's place makes both the write and the cleanup fail
        fs::create_dir_all(target.archive_path()).unwrap();

        let result = install_archive(b"bytes", &target);

        assert_eq!(result.unwrap_err(), DownloadFailureReason::InstallationFailed);
        assert!(target.archive_path().is_dir());
        assert!(!target.installed_binary_path.exists());
    }

    #[test]
    fn test_install_creates_root() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("nested").join("p2pool");
        let target = linux_target(&root);
        let bytes = build_tar_gz(&[("top/p2pool", b"binary", 0o755)]);

        install_archive(&bytes, &target).unwrap();
        assert!(root.join("p2pool").is_file());
    }
}
