use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::platform::Platform;

const RELEASE_REPO: &str = "adryfish/fingerprint-chromium";

const USER_AGENT: &str = "chromium-fleet";

/// Whole-request deadline for one feed fetch.
const FEED_TIMEOUT: Duration = Duration::from_secs(10);

/// Significant prefix of `published_at`: the calendar date.
const PUBLISHED_DATE_LEN: usize = 10;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubRelease {
    pub tag_name: String,
    pub published_at: String,
    pub assets: Vec<GitHubAsset>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubAsset {
    pub name: String,
    pub browser_download_url: String,
    pub size: u64,
}

/// One installable build offered by the release feed. Produced fresh on
/// every refresh, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReleaseAsset {
    pub tag: String,
    pub asset_name: String,
    pub download_url: String,
    pub size_bytes: u64,
    /// First 10 characters of the release `published_at` stamp.
    pub published_at: String,
}

pub fn releases_url() -> String {
    format!("https://api.github.com/repos/{}/releases", RELEASE_REPO)
}

pub async fn fetch_releases(client: &Client) -> Result<Vec<GitHubRelease>> {
    let url = releases_url();
    let resp = client
        .get(&url)
        .header("User-Agent", USER_AGENT)
        .header("Accept", "application/vnd.github.v3+json")
        .timeout(FEED_TIMEOUT)
        .send()
        .await
        .map_err(|e| AppError::github(format!("Failed to fetch releases: {}", e)))?;

    if !resp.status().is_success() {
        return Err(AppError::github(format!(
            "GitHub API returned status: {}",
            resp.status()
        )));
    }

    let body = resp
        .text()
        .await
        .map_err(|e| AppError::github(format!("Failed to read releases: {}", e)))?;
    serde_json::from_str(&body)
        .map_err(|e| AppError::github(format!("Failed to parse releases: {}", e)))
}

/// Filter a release list down to this platform's installable assets,
/// newest-published-first. One entry per matching asset.
pub fn collect_platform_assets(releases: &[GitHubRelease], platform: Platform) -> Vec<ReleaseAsset> {
    let mut assets: Vec<ReleaseAsset> = Vec::new();
    for release in releases {
        let published = release
            .published_at
            .get(..PUBLISHED_DATE_LEN)
            .unwrap_or(&release.published_at);
        for asset in &release.assets {
            if platform.matches_asset(&asset.name) {
                assets.push(ReleaseAsset {
                    tag: release.tag_name.clone(),
                    asset_name: asset.name.clone(),
                    download_url: asset.browser_download_url.clone(),
                    size_bytes: asset.size,
                    published_at: published.to_string(),
                });
            }
        }
    }
    assets.sort_by(|a, b| b.published_at.cmp(&a.published_at));
    assets
}

/// Fetch the release feed and return this platform's installable versions.
pub async fn fetch_available_versions(
    client: &Client,
    platform: Platform,
) -> Result<Vec<ReleaseAsset>> {
    let releases = fetch_releases(client).await?;
    Ok(collect_platform_assets(&releases, platform))
}
