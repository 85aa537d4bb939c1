//! Peer identity and the discovery candidate set.
//!
//! A [`PeerRecord`] is what the transport reports for every device it has
//! heard broadcasting on the LAN.  The [`PeerSet`] holds the records of the
//! most recent snapshot only: the transport always returns the full list, so
//! each poll replaces the set instead of merging into it.

use std::collections::HashMap;
use std::fmt;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};

/// Opaque, stable identifier a peer advertises for itself.
pub type PeerId = String;

/// Presence status a peer advertises in its broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PeerStatus {
    Online,
    Offline,
    Busy,
}

/// Operating system family advertised by a peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OsType {
    Linux,
    Windows,
    Macos,
    IOS,
    Android,
}

impl fmt::Display for OsType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Linux => "linux",
            Self::Windows => "windows",
            Self::Macos => "macos",
            Self::IOS => "ios",
            Self::Android => "android",
        };
        f.write_str(name)
    }
}

/// Operating system description carried in a [`PeerRecord`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OsInfo {
    pub platform: String,
    pub os_type: OsType,
    pub version: String,
}

impl OsInfo {
    /// Describes the operating system this binary was compiled for.
    ///
    /// The release version is not probed; it is reported as `"unknown"`.
    pub fn current() -> Self {
        Self {
            platform: std::env::consts::OS.to_string(),
            os_type: native_os_type(),
            version: "unknown".to_string(),
        }
    }
}

fn native_os_type() -> OsType {
    #[cfg(target_os = "windows")]
    return OsType::Windows;
    #[cfg(target_os = "macos")]
    return OsType::Macos;
    #[cfg(target_os = "ios")]
    return OsType::IOS;
    #[cfg(target_os = "android")]
    return OsType::Android;
    #[cfg(not(any(
        target_os = "windows",
        target_os = "macos",
        target_os = "ios",
        target_os = "android"
    )))]
    return OsType::Linux;
}

/// A device discovered on the local network.
///
/// Field names on the wire follow the transport's JSON contract (`addr`,
/// `last_seen`, `os_info`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerRecord {
    pub id: PeerId,
    #[serde(rename = "addr")]
    pub address: IpAddr,
    pub port: u16,
    pub hostname: String,
    /// Seconds since the Unix epoch at which the peer was last heard.
    pub last_seen: u64,
    pub status: PeerStatus,
    #[serde(alias = "protocol_version")]
    pub version: String,
    pub os_info: OsInfo,
}

impl PeerRecord {
    /// An online record for this build's protocol version and OS.
    pub fn new(id: impl Into<PeerId>, hostname: impl Into<String>, address: IpAddr, port: u16) -> Self {
        Self {
            id: id.into(),
            address,
            port,
            hostname: hostname.into(),
            last_seen: 0,
            status: PeerStatus::Online,
            version: env!("CARGO_PKG_VERSION").to_string(),
            os_info: OsInfo::current(),
        }
    }
}

/// The discovery candidate set, keyed by peer id.
#[derive(Debug, Default, Clone)]
pub struct PeerSet {
    peers: HashMap<PeerId, PeerRecord>,
}

impl PeerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole set with `snapshot`.
    ///
    /// Peers absent from the snapshot are dropped.  If the snapshot lists the
    /// same id twice, the later record wins.
    pub fn replace_with(&mut self, snapshot: Vec<PeerRecord>) {
        self.peers = snapshot
            .into_iter()
            .map(|record| (record.id.clone(), record))
            .collect();
    }

    pub fn get(&self, id: &str) -> Option<&PeerRecord> {
        self.peers.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.peers.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn clear(&mut self) {
        self.peers.clear();
    }

    /// Returns every record, sorted by hostname then id for a stable listing.
    pub fn sorted(&self) -> Vec<PeerRecord> {
        let mut list: Vec<PeerRecord> = self.peers.values().cloned().collect();
        list.sort_by(|a, b| a.hostname.cmp(&b.hostname).then_with(|| a.id.cmp(&b.id)));
        list
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_peer(id: &str, hostname: &str) -> PeerRecord {
        PeerRecord {
            id: id.to_string(),
            address: "192.168.1.20".parse().unwrap(),
            port: 53317,
            hostname: hostname.to_string(),
            last_seen: 1_700_000_000,
            status: PeerStatus::Online,
            version: "1.0".to_string(),
            os_info: OsInfo {
                platform: "linux".to_string(),
                os_type: OsType::Linux,
                version: "6.1".to_string(),
            },
        }
    }

    #[test]
    fn test_peer_set_starts_empty() {
        let set = PeerSet::new();
        assert!(set.is_empty());
        assert!(set.sorted().is_empty());
    }

    #[test]
    fn test_replace_with_drops_peers_missing_from_snapshot() {
        // Arrange
        let mut set = PeerSet::new();
        set.replace_with(vec![make_peer("a", "alpha"), make_peer("b", "bravo")]);

        // Act
        set.replace_with(vec![make_peer("c", "charlie")]);

        // Assert
        assert_eq!(set.len(), 1);
        assert!(set.contains("c"));
        assert!(!set.contains("a"));
        assert!(!set.contains("b"));
    }

    #[test]
    fn test_replace_with_keeps_last_record_for_duplicate_ids() {
        let mut set = PeerSet::new();
        set.replace_with(vec![make_peer("a", "old-name"), make_peer("a", "new-name")]);

        assert_eq!(set.len(), 1);
        assert_eq!(set.get("a").unwrap().hostname, "new-name");
    }

    #[test]
    fn test_sorted_orders_by_hostname() {
        let mut set = PeerSet::new();
        set.replace_with(vec![
            make_peer("3", "zulu"),
            make_peer("1", "alpha"),
            make_peer("2", "mike"),
        ]);

        let names: Vec<String> = set.sorted().into_iter().map(|p| p.hostname).collect();
        assert_eq!(names, vec!["alpha", "mike", "zulu"]);
    }

    #[test]
    fn test_clear_empties_the_set() {
        let mut set = PeerSet::new();
        set.replace_with(vec![make_peer("a", "alpha")]);
        set.clear();
        assert!(set.is_empty());
    }

    #[test]
    fn test_peer_record_deserializes_transport_json() {
        // Arrange: the shape the transport reports for `get_peers`
        let json = r#"{
            "id": "f3c1",
            "hostname": "desk",
            "addr": "10.0.0.7",
            "last_seen": 1700000123,
            "protocol_version": "1.0",
            "status": "Busy",
            "port": 53317,
            "os_info": { "platform": "windows", "os_type": "Windows", "version": "11" }
        }"#;

        // Act
        let peer: PeerRecord = serde_json::from_str(json).expect("deserialize");

        // Assert
        assert_eq!(peer.id, "f3c1");
        assert_eq!(peer.address, "10.0.0.7".parse::<IpAddr>().unwrap());
        assert_eq!(peer.status, PeerStatus::Busy);
        assert_eq!(peer.version, "1.0");
        assert_eq!(peer.os_info.os_type, OsType::Windows);
    }

    #[test]
    fn test_os_type_display_is_lowercase() {
        assert_eq!(OsType::Macos.to_string(), "macos");
        assert_eq!(OsType::IOS.to_string(), "ios");
    }

    #[test]
    fn test_current_os_info_reports_compile_target_platform() {
        let info = OsInfo::current();
        assert_eq!(info.platform, std::env::consts::OS);
    }
}
