use std::env::consts::OS;
use std::path::PathBuf;

use serde::Serialize;

use crate::error::{AppError, Result};

/// Platforms for which fingerprint-chromium builds are published.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Windows,
    MacOs,
}

impl Platform {
    /// Detect the host platform. Builds are only published for Windows and
    /// macOS; other hosts must construct state with an explicit platform.
    pub fn host() -> Result<Self> {
        match OS {
            "windows" => Ok(Self::Windows),
            "macos" => Ok(Self::MacOs),
            other => Err(AppError::other(format!("unsupported platform: {other}"))),
        }
    }

    /// Keyword a release asset name must contain for this platform.
    pub fn asset_keyword(self) -> &'static str {
        match self {
            Self::Windows => "windows",
            Self::MacOs => "macos",
        }
    }

    /// Archive extension published for this platform.
    pub fn archive_extension(self) -> &'static str {
        match self {
            Self::Windows => ".zip",
            Self::MacOs => ".dmg",
        }
    }

    /// Whether a release asset name is one of this platform's builds.
    /// Matching is case-insensitive on the full asset name.
    pub fn matches_asset(self, asset_name: &str) -> bool {
        let name = asset_name.to_lowercase();
        name.contains(self.asset_keyword()) && name.ends_with(self.archive_extension())
    }

    /// Directory name holding this platform's installs under the app root.
    pub fn install_dir_name(self) -> &'static str {
        match self {
            Self::Windows => "win_x64",
            Self::MacOs => "macos",
        }
    }

    /// Relative executable locations probed inside a versioned install,
    /// in probe order.
    pub fn executable_candidates(self) -> &'static [&'static str] {
        match self {
            Self::Windows => &[
                "chrome.exe",
                "Chromium/chrome.exe",
                "chrome-win/chrome.exe",
            ],
            Self::MacOs => &[
                "Chromium.app/Contents/MacOS/Chromium",
                "Chromium/Contents/MacOS/Chromium",
            ],
        }
    }

    /// Default root under which new instance profile directories are numbered.
    pub fn default_profile_root(self) -> PathBuf {
        match self {
            Self::Windows => PathBuf::from(r"C:\temp\chromium"),
            Self::MacOs => PathBuf::from("/tmp/chromium"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Platform;

    #[test]
    fn windows_assets_need_keyword_and_zip() {
        let p = Platform::Windows;
        assert!(p.matches_asset("fingerprint-chromium-135.0-Windows-x64.zip"));
        assert!(p.matches_asset("windows_build.ZIP"));
        assert!(!p.matches_asset("fingerprint-chromium-135.0-macos.dmg"));
        assert!(!p.matches_asset("windows-symbols.tar.gz"));
    }

    #[test]
    fn macos_assets_need_keyword_and_dmg() {
        let p = Platform::MacOs;
        assert!(p.matches_asset("fingerprint-chromium-135.0-macOS-arm64.dmg"));
        assert!(!p.matches_asset("fingerprint-chromium-135.0-Windows-x64.zip"));
        assert!(!p.matches_asset("macos-debug-symbols.zip"));
    }
}
