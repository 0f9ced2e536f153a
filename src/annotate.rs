/// Request Annotator - Device record to named string attributes
use crate::directory::Device;

/// Attribute names and values describing `device`, without any header prefix
///
/// Fields the record does not carry (empty strings, empty lists, flags only
/// one API returns) produce no pair at all.
pub fn device_attributes(device: &Device) -> Vec<(&'static str, String)> {
    let mut attrs = Vec::with_capacity(16);

    let mut text = |name: &'static str, value: &str| {
        if !value.is_empty() {
            attrs.push((name, value.to_string()));
        }
    };

    text("Device-ID", &device.id);
    text("Device-Name", &device.name);
    text("Device-User", &device.user);
    text("Device-Hostname", &device.hostname);
    text("Device-OS", &device.os);
    text("Device-NodeID", &device.node_id);
    text("Device-ClientVersion", &device.client_version);
    text("Device-LastSeen", &device.last_seen);
    text("Device-Created", &device.created);

    if let Some(profile) = &device.user_profile {
        text("User-ID", &profile.id);
        text("User-Login", &profile.login_name);
        text("User-DisplayName", &profile.display_name);
    }

    let flags = [
        ("Device-Authorized", device.authorized),
        ("Device-Online", device.online),
        ("Device-Expired", device.expired),
    ];
    for (name, flag) in flags {
        if let Some(flag) = flag {
            attrs.push((name, flag.to_string()));
        }
    }

    if !device.addresses.is_empty() {
        attrs.push(("Device-Addresses", device.addresses.join(",")));
    }
    if !device.tags.is_empty() {
        attrs.push(("Device-Tags", device.tags.join(",")));
    }

    attrs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::UserProfile;

    fn value<'a>(attrs: &'a [(&'static str, String)], name: &str) -> Option<&'a str> {
        attrs
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v.as_str())
    }

    #[test]
    fn test_device_listing_attributes() {
        let device = Device {
            id: "d2".to_string(),
            name: "laptop.example.ts.net".to_string(),
            user: "alice@example.com".to_string(),
            os: "linux".to_string(),
            addresses: vec!["100.64.0.9".to_string(), "fd7a:115c:a1e0::9".to_string()],
            authorized: Some(false),
            ..Device::default()
        };

        let attrs = device_attributes(&device);
        assert_eq!(value(&attrs, "Device-ID"), Some("d2"));
        assert_eq!(value(&attrs, "Device-Authorized"), Some("false"));
        assert_eq!(
            value(&attrs, "Device-Addresses"),
            Some("100.64.0.9,fd7a:115c:a1e0::9")
        );
        assert_eq!(value(&attrs, "Device-Online"), None);
        assert_eq!(value(&attrs, "Device-Hostname"), None);
    }

    #[test]
    fn test_empty_lists_emit_nothing() {
        let device = Device {
            id: "d3".to_string(),
            authorized: Some(true),
            ..Device::default()
        };

        let attrs = device_attributes(&device);
        assert_eq!(value(&attrs, "Device-Authorized"), Some("true"));
        assert_eq!(value(&attrs, "Device-Addresses"), None);
        assert_eq!(value(&attrs, "Device-Tags"), None);
        assert!(attrs.iter().all(|(_, v)| !v.is_empty()));
    }

    #[test]
    fn test_whois_attributes() {
        let device = Device {
            id: "n1".to_string(),
            addresses: vec!["100.64.0.9".to_string()],
            online: Some(true),
            expired: Some(false),
            tags: vec!["tag:server".to_string(), "tag:prod".to_string()],
            user_profile: Some(UserProfile {
                login_name: "bob@example.com".to_string(),
                display_name: "Bob".to_string(),
                ..UserProfile::default()
            }),
            ..Device::default()
        };

        let attrs = device_attributes(&device);
        assert_eq!(value(&attrs, "Device-Online"), Some("true"));
        assert_eq!(value(&attrs, "Device-Expired"), Some("false"));
        assert_eq!(value(&attrs, "Device-Authorized"), None);
        assert_eq!(value(&attrs, "Device-Tags"), Some("tag:server,tag:prod"));
        assert_eq!(value(&attrs, "User-Login"), Some("bob@example.com"));
        assert_eq!(value(&attrs, "User-ID"), None);
    }
}
