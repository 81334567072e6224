//! Shared User-Agent strings for extraction and media HTTP clients.

/// Project URL for User-Agent identification.
const PROJECT_UA_URL: &str = "https://github.com/fierce/vidgrab";

/// Default User-Agent for extraction endpoint requests (identifies the tool).
#[must_use]
pub(crate) fn default_extract_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("vidgrab/{version} (+{PROJECT_UA_URL})")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_ua_contains_version_and_project_url() {
        let ua = default_extract_user_agent();
        assert!(ua.contains(PROJECT_UA_URL), "UA must contain project URL: {ua}");
        assert_eq!(
            Some(env!("CARGO_PKG_VERSION")),
            ua.strip_prefix("vidgrab/").and_then(|s| s.split(' ').next()),
            "UA must contain crate version: {ua}"
        );
    }
}
