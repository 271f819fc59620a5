//! Identifier aliases and capability-string helpers shared across modules.

/// Opaque client-supplied reservation identifier (the run "uuid").
pub type ReservationId = String;

/// Cloud instance identifier of a dynamically provisioned node.
pub type NodeId = String;

/// Capability key carrying the owning reservation id on sessions and dynamic nodes.
pub const RESERVATION_ID_KEY: &str = "uuid";

/// Capability key carrying the cloud instance id of a dynamic node.
pub const INSTANCE_ID_KEY: &str = "instanceId";

/// Capability key for the browser name.
pub const BROWSER_NAME_KEY: &str = "browserName";

/// Capability key for the platform / operating system.
pub const PLATFORM_KEY: &str = "platform";

/// Capability key for the browser version.
pub const VERSION_KEY: &str = "version";

/// Normalize a capability string for comparison: whitespace removed, lowercased,
/// and the short `ie` alias expanded to `internetexplorer`.
pub fn normalize_capability(value: &str) -> String {
    let compact: String = value
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect();
    if compact == "ie" {
        "internetexplorer".to_string()
    } else {
        compact
    }
}

/// Whether a declared capability satisfies a requested one (normalized substring match).
pub fn capability_matches(declared: &str, requested: &str) -> bool {
    normalize_capability(declared).contains(&normalize_capability(requested))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_whitespace_and_case() {
        assert_eq!(normalize_capability(" Internet Explorer "), "internetexplorer");
        assert_eq!(normalize_capability("IE"), "internetexplorer");
        assert_eq!(normalize_capability("Chrome"), "chrome");
    }

    #[test]
    fn test_capability_matches_substring() {
        assert!(capability_matches("internet explorer", "ie"));
        assert!(capability_matches("Windows 2008", "windows"));
        assert!(capability_matches("googlechrome", "chrome"));
        assert!(!capability_matches("firefox", "chrome"));
    }
}
