//! Public IP lookup used to seed new-instance defaults.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

const IP_INFO_URL: &str = "http://iprust.io/ip.json";

const IP_INFO_TIMEOUT: Duration = Duration::from_secs(5);

/// Best-effort description of the host's public address. All fields may be
/// empty; the lookup is purely advisory.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IpInfo {
    #[serde(default)]
    pub ip: String,
    #[serde(default)]
    pub country_long: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub timezone: String,
}

/// Fetch IP info. Callers treat failure as non-fatal and fall back to
/// [`IpInfo::default`].
pub async fn fetch_ip_info(client: &Client) -> Result<IpInfo> {
    let resp = client
        .get(IP_INFO_URL)
        .timeout(IP_INFO_TIMEOUT)
        .send()
        .await
        .map_err(|e| AppError::network_with_url(IP_INFO_URL, e.to_string()))?;

    if !resp.status().is_success() {
        return Err(AppError::network_with_url(
            IP_INFO_URL,
            format!("status {}", resp.status()),
        ));
    }

    resp.json::<IpInfo>()
        .await
        .map_err(|e| AppError::network_with_url(IP_INFO_URL, e.to_string()))
}
