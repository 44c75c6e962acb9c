//! Utility functions for Pombo
//!
//! Common helper functions used across the codebase.

use std::sync::LazyLock;

use if_addrs::IfAddr;

/// Regex pattern for validating identifiers (systemId, groupName, etc.)
static VALID_PATTERN: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new("^[a-zA-Z0-9_.:-]*$").expect("Invalid regex pattern"));

/// Validate a string contains only allowed characters
///
/// Allowed characters: alphanumeric, underscore, dot, colon, hyphen
pub fn is_valid(str: &str) -> bool {
    VALID_PATTERN.is_match(str)
}

/// Build the process-local group index key for a `(systemId, groupName)` pair.
///
/// A group is scoped to its system, so two systems may use the same group
/// name without sharing members.
pub fn group_key(system_id: &str, group_name: &str) -> String {
    format!("{}:{}", system_id, group_name)
}

/// Get the local IP address
///
/// Returns the first non-loopback IPv4 address found,
/// or "127.0.0.1" as fallback.
pub fn local_ip() -> String {
    if_addrs::get_if_addrs()
        .ok()
        .and_then(|addrs| {
            addrs
                .into_iter()
                .find(|iface| !iface.is_loopback() && matches!(iface.addr, IfAddr::V4(_)))
                .and_then(|iface| match iface.addr {
                    IfAddr::V4(addr) => Some(addr.ip.to_string()),
                    _ => None,
                })
        })
        .unwrap_or_else(|| "127.0.0.1".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_valid_identifiers() {
        assert!(is_valid("sys1"));
        assert!(is_valid("group_name-1"));
        assert!(is_valid("host:9190"));
        assert!(!is_valid("with spaces"));
        assert!(!is_valid("a/b"));
    }

    #[test]
    fn test_group_key() {
        assert_eq!(group_key("sys1", "g1"), "sys1:g1");
        // Distinct systems never collide on the same group name
        assert_ne!(group_key("sys1", "g1"), group_key("sys2", "g1"));
    }

    #[test]
    fn test_local_ip_returns_valid_ip() {
        let ip = local_ip();
        assert!(
            ip == "127.0.0.1" || ip.split('.').filter_map(|s| s.parse::<u8>().ok()).count() == 4
        );
    }
}
