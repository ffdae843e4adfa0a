//! Platform detection and the p2pool release table
//!
//! Maps the running OS/architecture to the release archive that has to be
//! downloaded and the binary it installs.

use crate::error::SupervisorError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use url::Url;

/// Release tag shipped in the built-in table
pub const BUILTIN_RELEASE: &str = "v4.9";

/// Platforms with a published p2pool build
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Platform {
    WindowsX64,
    LinuxX64,
    MacosAarch64,
    MacosX64,
}

impl Platform {
    pub const ALL: [Platform; 4] = [
        Platform::WindowsX64,
        Platform::LinuxX64,
        Platform::MacosAarch64,
        Platform::MacosX64,
    ];

    /// Detect the platform this binary was compiled for
    pub fn current() -> Result<Self, SupervisorError> {
        let detected = if cfg!(all(target_os = "windows", target_arch = "x86_64")) {
            Some(Platform::WindowsX64)
        } else if cfg!(all(target_os = "linux", target_arch = "x86_64")) {
            Some(Platform::LinuxX64)
        } else if cfg!(all(target_os = "macos", target_arch = "aarch64")) {
            // Apple silicon gets the native build, never the Rosetta one
            Some(Platform::MacosAarch64)
        } else if cfg!(all(target_os = "macos", target_arch = "x86_64")) {
            Some(Platform::MacosX64)
        } else {
            None
        };

        detected.ok_or_else(|| SupervisorError::UnsupportedPlatform {
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::WindowsX64 => "windows-x64",
            Platform::LinuxX64 => "linux-x64",
            Platform::MacosAarch64 => "macos-aarch64",
            Platform::MacosX64 => "macos-x64",
        }
    }

    pub fn is_windows(&self) -> bool {
        matches!(self, Platform::WindowsX64)
    }

    /// Name of the helper executable inside the install root
    pub fn binary_name(&self) -> &'static str {
        if self.is_windows() {
            "p2pool.exe"
        } else {
            "p2pool"
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the release table, as stored in configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseEntry {
    /// Where the archive is published
    pub download_url: String,
    /// File name the archive is written to inside the install root
    pub archive_file_name: String,
    /// Expected SHA-256 of the archive (lowercase hex)
    pub sha256: String,
    /// Executable name relative to the install root
    pub binary_name: String,
}

/// Release table keyed by platform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReleaseTable {
    entries: BTreeMap<Platform, ReleaseEntry>,
}

impl ReleaseTable {
    pub fn new(entries: BTreeMap<Platform, ReleaseEntry>) -> Self {
        Self { entries }
    }

    /// The release pinned by this crate
    pub fn builtin() -> Self {
        let base = format!(
            "https://github.com/SChernykh/p2pool/releases/download/{}",
            BUILTIN_RELEASE
        );
        let rows = [
            (
                Platform::WindowsX64,
                "windows-x64.zip",
                "d109b6dcb01907695a8728063a1495a0d339cc7d03bbc5ad08262d0b876fab2d",
            ),
            (
                Platform::LinuxX64,
                "linux-x64.tar.gz",
                "db33e4c1cd1a48008f1c52b0d0eb1a2d6a2bae6fe5191277c94dbbf5b098907a",
            ),
            (
                Platform::MacosAarch64,
                "macos-aarch64.tar.gz",
                "6116cc25e34d1840c3f0e5697b444049cd936deee072dfd7e67d83577c1dc546",
            ),
            (
                Platform::MacosX64,
                "macos-x64.tar.gz",
                "a275d4c2a66481833926b181e3e910126d9e67169d7a31c905d6bb39e80f1e8f",
            ),
        ];

        let entries = rows
            .into_iter()
            .map(|(platform, suffix, sha256)| {
                let archive_file_name = format!("p2pool-{}-{}", BUILTIN_RELEASE, suffix);
                let entry = ReleaseEntry {
                    download_url: format!("{}/{}", base, archive_file_name),
                    archive_file_name,
                    sha256: sha256.to_string(),
                    binary_name: platform.binary_name().to_string(),
                };
                (platform, entry)
            })
            .collect();

        Self { entries }
    }

    pub fn get(&self, platform: Platform) -> Option<&ReleaseEntry> {
        self.entries.get(&platform)
    }

    pub fn insert(&mut self, platform: Platform, entry: ReleaseEntry) {
        self.entries.insert(platform, entry);
    }

    /// Resolve the target for `platform`, installing below `install_root`
    pub fn resolve(
        &self,
        platform: Platform,
        install_root: &Path,
    ) -> Result<PlatformTarget, SupervisorError> {
        let entry = self
            .get(platform)
            .ok_or_else(|| SupervisorError::UnsupportedPlatform {
                os: std::env::consts::OS.to_string(),
                arch: std::env::consts::ARCH.to_string(),
            })?;

        PlatformTarget::from_entry(platform, entry, install_root)
    }
}

impl Default for ReleaseTable {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Fully resolved download/install target for the running platform
#[derive(Debug, Clone, PartialEq)]
pub struct PlatformTarget {
    pub platform: Platform,
    pub download_url: Url,
    pub archive_file_name: String,
    pub expected_hash: String,
    pub install_root: PathBuf,
    pub installed_binary_path: PathBuf,
}

impl PlatformTarget {
    /// Validate a release entry and anchor it below `install_root`
    pub fn from_entry(
        platform: Platform,
        entry: &ReleaseEntry,
        install_root: &Path,
    ) -> Result<Self, SupervisorError> {
        let invalid = |reason: String| SupervisorError::InvalidRelease {
            platform: platform.to_string(),
            reason,
        };

        let download_url = Url::parse(&entry.download_url)
            .map_err(|e| invalid(format!("bad download URL: {}", e)))?;
        if download_url.scheme() != "https" {
            return Err(invalid(format!(
                "download URL must use https, got {}",
                download_url.scheme()
            )));
        }

        if !is_sha256_hex(&entry.sha256) {
            return Err(invalid(
                "sha256 must be 64 lowercase hex characters".to_string(),
            ));
        }

        for (field, value) in [
            ("archive file name", &entry.archive_file_name),
            ("binary name", &entry.binary_name),
        ] {
            if value.is_empty() || value.contains(['/', '\\']) || value == ".." {
                return Err(invalid(format!("{} must be a plain file name", field)));
            }
        }

        Ok(Self {
            platform,
            download_url,
            archive_file_name: entry.archive_file_name.clone(),
            expected_hash: entry.sha256.clone(),
            install_root: install_root.to_path_buf(),
            installed_binary_path: install_root.join(&entry.binary_name),
        })
    }

    /// Where the downloaded archive is written before extraction
    pub fn archive_path(&self) -> PathBuf {
        self.install_root.join(&self.archive_file_name)
    }

    /// Process name used for kill-by-name and process lookup
    pub fn process_name(&self) -> String {
        self.installed_binary_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.platform.binary_name().to_string())
    }
}

fn is_sha256_hex(value: &str) -> bool {
    value.len() == 64 && value.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_table_is_valid() {
        let table = ReleaseTable::builtin();
        let root = Path::new("/opt/p2pool");

        for platform in Platform::ALL {
            let target = table.resolve(platform, root).unwrap();
            assert_eq!(target.download_url.scheme(), "https");
            assert_eq!(target.expected_hash.len(), 64);
            assert!(target
                .expected_hash
                .chars()
                .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
            assert!(target.download_url.path().ends_with(&target.archive_file_name));
        }
    }

    #[test]
    fn test_binary_names() {
        let table = ReleaseTable::builtin();
        let root = Path::new("/opt/p2pool");

        let windows = table.resolve(Platform::WindowsX64, root).unwrap();
        assert_eq!(windows.installed_binary_path, root.join("p2pool.exe"));
        assert_eq!(windows.process_name(), "p2pool.exe");
        assert!(windows.archive_file_name.ends_with(".zip"));

        let linux = table.resolve(Platform::LinuxX64, root).unwrap();
        assert_eq!(linux.installed_binary_path, root.join("p2pool"));
        assert!(linux.archive_file_name.ends_with(".tar.gz"));
    }

    #[test]
    fn test_current_platform() {
        let detected = Platform::current();
        let supported = cfg!(any(
            all(target_os = "windows", target_arch = "x86_64"),
            all(target_os = "linux", target_arch = "x86_64"),
            all(target_os = "macos", target_arch = "aarch64"),
            all(target_os = "macos", target_arch = "x86_64"),
        ));
        assert_eq!(detected.is_ok(), supported);
    }

    #[test]
    fn test_missing_entry_is_unsupported() {
        let table = ReleaseTable::new(BTreeMap::new());
        let result = table.resolve(Platform::LinuxX64, Path::new("/tmp"));
        assert!(matches!(
            result,
            Err(SupervisorError::UnsupportedPlatform { .. })
        ));
    }

    #[test]
    fn test_rejects_plain_http_and_bad_hash() {
        let mut entry = ReleaseTable::builtin()
            .get(Platform::LinuxX64)
            .unwrap()
            .clone();
        entry.download_url = "http://example.com/p2pool.tar.gz".to_string();
        let result = PlatformTarget::from_entry(Platform::LinuxX64, &entry, Path::new("/tmp"));
        assert!(matches!(result, Err(SupervisorError::InvalidRelease { .. })));

        let mut entry = ReleaseTable::builtin()
            .get(Platform::LinuxX64)
            .unwrap()
            .clone();
        entry.sha256 = entry.sha256.to_uppercase();
        let result = PlatformTarget::from_entry(Platform::LinuxX64, &entry, Path::new("/tmp"));
        assert!(matches!(result, Err(SupervisorError::InvalidRelease { .. })));

        let mut entry = ReleaseTable::builtin()
            .get(Platform::LinuxX64)
            .unwrap()
            .clone();
        entry.binary_name = "../p2pool".to_string();
        let result = PlatformTarget::from_entry(Platform::LinuxX64, &entry, Path::new("/tmp"));
        assert!(matches!(result, Err(SupervisorError::InvalidRelease { .. })));
    }

    #[test]
    fn test_table_serialization() {
        let table = ReleaseTable::builtin();
        let json = serde_json::to_string(&table).unwrap();
        assert!(json.contains("\"linux-x64\""));
        assert!(json.contains("\"archiveFileName\""));
        let parsed: ReleaseTable = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, table);
    }
}
