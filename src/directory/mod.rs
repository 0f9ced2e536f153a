/// Tailnet Directory
///
/// Device records as returned by the Tailscale API, the in-memory
/// address-to-device snapshot, and the pieces that fetch, persist and
/// serve it.

pub mod cache;
pub mod client;
pub mod store;

pub use cache::{ResolutionCache, SnapshotStats};
pub use client::{DirectoryClient, TailscaleClient};
pub use store::SnapshotStore;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// A Tailscale device, as listed by the devices API or described by whois
///
/// Whois answers fill `online`, `expired`, `tags` and `user_profile` and leave
/// `authorized` unset; device listings do the opposite.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Device {
    pub addresses: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorized: Option<bool>,
    pub blocks_incoming_connections: bool,
    pub client_version: String,
    pub created: String,
    pub expires: String,
    pub hostname: String,
    pub id: String,
    pub is_external: bool,
    pub key_expiry_disabled: bool,
    pub last_seen: String,
    pub machine_key: String,
    pub name: String,
    pub node_id: String,
    pub node_key: String,
    pub os: String,
    pub tailnet_lock_error: String,
    pub tailnet_lock_key: String,
    pub update_available: bool,
    pub user: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub online: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expired: Option<bool>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_profile: Option<UserProfile>,
}

/// Login identity attached to a whois answer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserProfile {
    pub id: String,
    pub login_name: String,
    pub display_name: String,
    #[serde(rename = "profilePicURL")]
    pub profile_pic_url: String,
}

/// Response of `GET /api/v2/tailnet/{tailnet}/devices`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DevicesResponse {
    #[serde(default)]
    pub devices: Vec<Device>,
}

/// Response of `GET /api/v2/tailnet/{tailnet}/whois?addr=...`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WhoIsResponse {
    #[serde(rename = "Node", default)]
    pub node: WhoIsNode,
    #[serde(rename = "UserProfile", default)]
    pub user_profile: Option<UserProfile>,
    #[serde(rename = "CapMap", default)]
    pub cap_map: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WhoIsNode {
    pub id: String,
    pub name: String,
    pub user: String,
    pub tailnet: String,
    pub hostname: String,
    pub client_version: String,
    pub os: String,
    pub created: String,
    pub last_seen: String,
    pub online: bool,
    pub expired: bool,
    pub key_expiry: String,
    pub machine_key: String,
    pub node_key: String,
    pub addresses: Vec<String>,
    pub tags: Vec<String>,
}

impl From<WhoIsResponse> for Device {
    fn from(whois: WhoIsResponse) -> Self {
        let node = whois.node;
        Device {
            addresses: node.addresses,
            client_version: node.client_version,
            created: node.created,
            expires: node.key_expiry,
            hostname: node.hostname,
            id: node.id,
            last_seen: node.last_seen,
            machine_key: node.machine_key,
            name: node.name,
            node_key: node.node_key,
            os: node.os,
            user: node.user,
            online: Some(node.online),
            expired: Some(node.expired),
            tags: node.tags,
            user_profile: whois.user_profile,
            ..Device::default()
        }
    }
}

/// One consistent copy of the tailnet's address-to-device mapping
///
/// Every key is contained in its device's `addresses`. A snapshot is never
/// edited in place; a refresh builds a new one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DirectorySnapshot {
    #[serde(default)]
    ip_to_device: HashMap<String, Arc<Device>>,
    /// `Date` header of the API response that produced this snapshot
    #[serde(default)]
    last_update: String,
}

impl DirectorySnapshot {
    /// Empty snapshot
    pub fn empty() -> Self {
        Self::default()
    }

    /// Index a device listing by address
    ///
    /// When two devices claim the same address the later one wins.
    pub fn from_devices(devices: Vec<Device>, last_update: impl Into<String>) -> Self {
        let mut ip_to_device = HashMap::new();

        for device in devices {
            let device = Arc::new(device);
            for addr in &device.addresses {
                ip_to_device.insert(addr.clone(), Arc::clone(&device));
            }
        }

        Self {
            ip_to_device,
            last_update: last_update.into(),
        }
    }

    /// Drop entries whose device no longer lists the key address
    ///
    /// Returns the number of entries removed.
    pub(crate) fn prune_inconsistent(&mut self) -> usize {
        let before = self.ip_to_device.len();
        self.ip_to_device
            .retain(|addr, device| device.addresses.iter().any(|a| a == addr));
        before - self.ip_to_device.len()
    }

    /// Look up a device by exact address
    pub fn get(&self, addr: &str) -> Option<&Arc<Device>> {
        self.ip_to_device.get(addr)
    }

    /// Number of address mappings
    pub fn len(&self) -> usize {
        self.ip_to_device.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ip_to_device.is_empty()
    }

    /// Number of distinct devices
    pub fn device_count(&self) -> usize {
        self.ip_to_device
            .values()
            .map(|d| d.id.as_str())
            .collect::<HashSet<_>>()
            .len()
    }

    pub fn last_update(&self) -> &str {
        &self.last_update
    }

    /// Freshness marker parsed as an HTTP date, if it is one
    pub fn last_update_time(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc2822(&self.last_update)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }
}
