//! Archive extraction for p2pool releases
//!
//! Release archives wrap everything in a single top-level directory
//! (`p2pool-v4.9-linux-x64/p2pool`). Extraction drops exactly that first path
//! component, so the binary lands directly in the install root.

use std::fs::{self, File};
use std::io;
use std::path::{Component, Path, PathBuf};

/// Extract `archive_path` into `dest_dir`, choosing the format by file name
pub fn extract_archive(archive_path: &Path, dest_dir: &Path) -> Result<(), String> {
    log::info!(
        "Extracting {} into {}",
        archive_path.display(),
        dest_dir.display()
    );

    let archive_name = archive_path
        .file_name()
        .map(|s| s.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    fs::create_dir_all(dest_dir)
        .map_err(|e| format!("Failed to create destination directory: {}", e))?;

    if archive_name.ends_with(".zip") {
        extract_from_zip(archive_path, dest_dir)
    } else if archive_name.ends_with(".tar.gz") || archive_name.ends_with(".tgz") {
        extract_from_tar_gz(archive_path, dest_dir)
    } else {
        Err(format!("Unknown archive format: {}", archive_name))
    }
}

/// Drop the first component of an archive path
///
/// Returns `None` for the top-level directory itself and for anything that
/// would escape the destination.
fn strip_first_component(path: &Path) -> Option<PathBuf> {
    let mut components = path.components();

    match components.next() {
        Some(Component::Normal(_)) => {}
        _ => return None,
    }

    let mut stripped = PathBuf::new();
    for component in components {
        match component {
            Component::Normal(part) => stripped.push(part),
            Component::CurDir => {}
            _ => return None,
        }
    }

    if stripped.as_os_str().is_empty() {
        None
    } else {
        Some(stripped)
    }
}

/// Extract a tar.gz archive (Linux, macOS)
fn extract_from_tar_gz(archive_path: &Path, dest_dir: &Path) -> Result<(), String> {
    let file = File::open(archive_path).map_err(|e| format!("Failed to open archive: {}", e))?;

    let gz = flate2::read::GzDecoder::new(file);
    let mut archive = tar::Archive::new(gz);

    let entries = archive
        .entries()
        .map_err(|e| format!("Failed to read tar archive: {}", e))?;

    let mut extracted = 0usize;
    for entry in entries {
        let mut entry = entry.map_err(|e| format!("Failed to read tar entry: {}", e))?;

        let path = entry
            .path()
            .map_err(|e| format!("Failed to get entry path: {}", e))?
            .into_owned();

        let Some(relative) = strip_first_component(&path) else {
            log::debug!("Skipping tar entry {}", path.display());
            continue;
        };

        let output_path = dest_dir.join(&relative);
        if let Some(parent) = output_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create directory: {}", e))?;
        }

        // unpack keeps the file mode, so the binary stays executable
        entry
            .unpack(&output_path)
            .map_err(|e| format!("Failed to extract {}: {}", relative.display(), e))?;
        extracted += 1;
    }

    log::info!("Extracted {} entries from tar archive", extracted);
    Ok(())
}

/// Extract a ZIP archive (Windows)
fn extract_from_zip(archive_path: &Path, dest_dir: &Path) -> Result<(), String> {
    let file = File::open(archive_path).map_err(|e| format!("Failed to open archive: {}", e))?;

    let mut archive =
        zip::ZipArchive::new(file).map_err(|e| format!("Failed to read ZIP archive: {}", e))?;

    let mut extracted = 0usize;
    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| format!("Failed to read archive entry {}: {}", i, e))?;

        let Some(path) = entry.enclosed_name() else {
            log::warn!("Skipping unsafe zip entry {}", entry.name());
            continue;
        };
        let Some(relative) = strip_first_component(&path) else {
            continue;
        };

        let output_path = dest_dir.join(&relative);
        if entry.is_dir() {
            fs::create_dir_all(&output_path)
                .map_err(|e| format!("Failed to create directory: {}", e))?;
            continue;
        }

        if let Some(parent) = output_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create directory: {}", e))?;
        }

        let mut outfile = File::create(&output_path)
            .map_err(|e| format!("Failed to create destination file: {}", e))?;
        io::copy(&mut entry, &mut outfile)
            .map_err(|e| format!("Failed to extract {}: {}", relative.display(), e))?;

        #[cfg(unix)]
        if let Some(mode) = entry.unix_mode() {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&output_path, fs::Permissions::from_mode(mode))
                .map_err(|e| format!("Failed to set permissions: {}", e))?;
        }

        extracted += 1;
    }

    log::info!("Extracted {} entries from zip archive", extracted);
    Ok(())
}

/// Clean up downloaded archive
pub fn cleanup_archive(archive_path: &Path) -> Result<(), String> {
    if archive_path.exists() {
        fs::remove_file(archive_path).map_err(|e| format!("Failed to remove archive: {}", e))?;
        log::info!("Cleaned up archive: {}", archive_path.display());
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    /// Build a tar.gz with the given (path, contents, mode) entries
    pub(crate) fn build_tar_gz(entries: &[(&str, &[u8], u32)]) -> Vec<u8> {
        let encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        let mut builder = tar::Builder::new(encoder);

        for (path, data, mode) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_entry_type(tar::EntryType::Regular);
            header.set_size(data.len() as u64);
            header.set_mode(*mode);
            header.set_cksum();
            builder.append_data(&mut header, path, *data).unwrap();
        }

        builder.into_inner().unwrap().finish().unwrap()
    }

    fn build_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(io::Cursor::new(Vec::new()));
        let options = zip::write::SimpleFileOptions::default();
        for (path, data) in entries {
            writer.start_file(*path, options).unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn test_strip_first_component() {
        assert_eq!(
            strip_first_component(Path::new("p2pool-v4.9/p2pool")),
            Some(PathBuf::from("p2pool"))
        );
        assert_eq!(
            strip_first_component(Path::new("p2pool-v4.9/doc/README.md")),
            Some(PathBuf::from("doc/README.md"))
        );
        assert_eq!(strip_first_component(Path::new("p2pool-v4.9/")), None);
        assert_eq!(strip_first_component(Path::new("p2pool-v4.9/../evil")), None);
        assert_eq!(strip_first_component(Path::new("/abs/p2pool")), None);
    }

    #[test]
    fn test_extract_tar_gz_strips_top_level() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("p2pool-v4.9-linux-x64.tar.gz");
        fs::write(
            &archive,
            build_tar_gz(&[
                ("p2pool-v4.9-linux-x64/p2pool", b"#!/bin/sh\n", 0o755),
                ("p2pool-v4.9-linux-x64/LICENSE", b"license", 0o644),
            ]),
        )
        .unwrap();

        extract_archive(&archive, dir.path()).unwrap();

        assert!(dir.path().join("p2pool").is_file());
        assert!(dir.path().join("LICENSE").is_file());
        assert!(!dir.path().join("p2pool-v4.9-linux-x64").exists());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(dir.path().join("p2pool"))
                .unwrap()
                .permissions()
                .mode();
            assert_eq!(mode & 0o111, 0o111);
        }
    }

    #[test]
    fn test_extract_zip_strips_top_level() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("p2pool-v4.9-windows-x64.zip");
        fs::write(
            &archive,
            build_zip(&[
                ("p2pool-v4.9-windows-x64/p2pool.exe", b"MZ"),
                ("p2pool-v4.9-windows-x64/README.md", b"readme"),
            ]),
        )
        .unwrap();

        extract_archive(&archive, dir.path()).unwrap();

        assert_eq!(fs::read(dir.path().join("p2pool.exe")).unwrap(), b"MZ");
        assert!(dir.path().join("README.md").is_file());
    }

    #[test]
    fn test_extract_corrupt_archive() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("broken.tar.gz");
        fs::write(&archive, b"definitely not gzip").unwrap();

        assert!(extract_archive(&archive, dir.path()).is_err());
    }

    #[test]
    fn test_extract_unknown_format() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("p2pool.rar");
        fs::write(&archive, b"rar").unwrap();

        let err = extract_archive(&archive, dir.path()).unwrap_err();
        assert!(err.contains("Unknown archive format"));
    }

    #[test]
    fn test_cleanup_archive() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("p2pool.tar.gz");
        fs::write(&archive, b"x").unwrap();

        cleanup_archive(&archive).unwrap();
        assert!(!archive.exists());
        // Second call is a no-op
        cleanup_archive(&archive).unwrap();
    }
}
