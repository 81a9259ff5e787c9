//! Creation defaults for new instances.

use std::path::Path;

use crate::config::Instance;
use crate::ipinfo::IpInfo;
use crate::platform::Platform;

const NAME_PREFIX: &str = "Instance ";
const PROFILE_PREFIX: &str = "default";
const FALLBACK_TIMEZONE: &str = "Asia/Shanghai";
const FIRST_FINGERPRINT: u64 = 1000;

/// Next free number for values shaped `{prefix}{n}`. Takes the max rather
/// than the first gap, so numbers of deleted instances are not reused while
/// later ones exist.
fn next_number<'a>(values: impl Iterator<Item = &'a str>, prefix: &str, start: u64) -> u64 {
    values
        .filter_map(|value| value.strip_prefix(prefix))
        .filter_map(|rest| rest.parse::<u64>().ok())
        .max()
        .unwrap_or(start - 1)
        + 1
}

fn next_profile_number(existing: &[Instance], profile_root: &Path) -> u64 {
    existing
        .iter()
        .filter(|instance| instance.profile_dir.parent() == Some(profile_root))
        .filter_map(|instance| instance.profile_dir.file_name()?.to_str())
        .filter_map(|name| name.strip_prefix(PROFILE_PREFIX))
        .filter_map(|rest| rest.parse::<u64>().ok())
        .max()
        .unwrap_or(0)
        + 1
}

/// Compute the defaults for a new instance: the next free name, fingerprint
/// seed, and profile directory, with timezone taken from the IP lookup.
/// When instances already exist, timezone, proxy, version, and the env map
/// are carried over from the last one instead.
pub fn default_instance(existing: &[Instance], ip_info: &IpInfo, platform: Platform) -> Instance {
    let name_num = next_number(existing.iter().map(|i| i.name.as_str()), NAME_PREFIX, 1);
    let fingerprint_num = next_number(
        existing.iter().map(|i| i.fingerprint.as_str()),
        "",
        FIRST_FINGERPRINT,
    );
    let profile_root = platform.default_profile_root();
    let profile_num = next_profile_number(existing, &profile_root);

    let timezone = if ip_info.timezone.is_empty() {
        FALLBACK_TIMEZONE.to_string()
    } else {
        ip_info.timezone.clone()
    };

    let mut instance = Instance {
        name: format!("{NAME_PREFIX}{name_num}"),
        fingerprint: fingerprint_num.to_string(),
        profile_dir: profile_root.join(format!("{PROFILE_PREFIX}{profile_num:03}")),
        timezone,
        ..Instance::default()
    };

    if let Some(last) = existing.last() {
        instance.timezone = last.timezone.clone();
        instance.proxy_server = last.proxy_server.clone();
        instance.version = last.version.clone();
        instance.env = last.env.clone();
    }

    instance
}

#[cfg(test)]
mod tests {
    use super::default_instance;
    use crate::config::{default_env, Instance, DEFAULT_VERSION_TAG};
    use crate::ipinfo::IpInfo;
    use crate::platform::Platform;

    #[test]
    fn first_instance_gets_baseline_defaults() {
        let instance = default_instance(&[], &IpInfo::default(), Platform::MacOs);

        assert_eq!(instance.name, "Instance 1");
        assert_eq!(instance.fingerprint, "1000");
        assert_eq!(
            instance.profile_dir.to_str(),
            Some("/tmp/chromium/default001")
        );
        assert_eq!(instance.timezone, "Asia/Shanghai");
        assert!(instance.proxy_server.is_empty());
        assert_eq!(instance.version, DEFAULT_VERSION_TAG);
        assert_eq!(instance.env, default_env());
    }

    #[test]
    fn timezone_comes_from_ip_info_when_present() {
        let ip_info = IpInfo {
            timezone: "Europe/Berlin".to_string(),
            ..IpInfo::default()
        };
        let instance = default_instance(&[], &ip_info, Platform::MacOs);
        assert_eq!(instance.timezone, "Europe/Berlin");
    }

    #[test]
    fn numbering_advances_past_the_maximum() {
        let existing = vec![
            Instance {
                name: "Instance 5".to_string(),
                fingerprint: "1200".to_string(),
                profile_dir: "/tmp/chromium/default002".into(),
                ..Instance::default()
            },
            Instance {
                name: "scraper".to_string(),
                fingerprint: "not-a-number".to_string(),
                profile_dir: "/home/me/profiles/custom".into(),
                ..Instance::default()
            },
        ];

        let instance = default_instance(&existing, &IpInfo::default(), Platform::MacOs);
        assert_eq!(instance.name, "Instance 6");
        assert_eq!(instance.fingerprint, "1201");
        assert_eq!(
            instance.profile_dir.to_str(),
            Some("/tmp/chromium/default003")
        );
    }

    #[test]
    fn settings_carry_over_from_the_last_instance() {
        let mut last = Instance {
            name: "Instance 1".to_string(),
            fingerprint: "1000".to_string(),
            timezone: "America/New_York".to_string(),
            proxy_server: "socks5://127.0.0.1:1080".to_string(),
            version: "135.0.7049.114".to_string(),
            ..Instance::default()
        };
        last.env
            .insert("canvas".to_string(), "custom".to_string());

        let instance = default_instance(
            &[last.clone()],
            &IpInfo {
                timezone: "Europe/Berlin".to_string(),
                ..IpInfo::default()
            },
            Platform::MacOs,
        );

        assert_eq!(instance.name, "Instance 2");
        assert_eq!(instance.fingerprint, "1001");
        assert_eq!(instance.timezone, "America/New_York");
        assert_eq!(instance.proxy_server, "socks5://127.0.0.1:1080");
        assert_eq!(instance.version, "135.0.7049.114");
        assert_eq!(instance.env, last.env);
    }
}
