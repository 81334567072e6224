//! Shared reqwest client construction for extraction and transfer clients.
//!
//! Both clients take explicit connect/read timeouts and gzip support; proxy
//! settings come from the environment when the system lookup is unusable.

use std::time::Duration;

use reqwest::{Client, ClientBuilder, NoProxy, Proxy};

use super::DownloadError;

/// Browser User-Agent sent to media origins.
///
/// Many video CDNs reject requests that do not look like they come from a
/// browser page on the catalog site.
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// Builds a reqwest client with the given timeouts and User-Agent.
///
/// # Errors
///
/// Returns [`DownloadError::Internal`] when the client cannot be built
/// (for example when the TLS backend fails to initialize).
pub(crate) fn build_http_client(
    connect_timeout_secs: u64,
    read_timeout_secs: u64,
    user_agent: &str,
) -> Result<Client, DownloadError> {
    apply_env_proxy(base_client_builder(
        connect_timeout_secs,
        read_timeout_secs,
        user_agent,
    ))
    .build()
    .map_err(|e| DownloadError::internal(format!("failed to build HTTP client: {e}")))
}

fn base_client_builder(
    connect_timeout_secs: u64,
    read_timeout_secs: u64,
    user_agent: &str,
) -> ClientBuilder {
    Client::builder()
        .connect_timeout(Duration::from_secs(connect_timeout_secs))
        .timeout(Duration::from_secs(read_timeout_secs))
        .gzip(true)
        .user_agent(user_agent.to_string())
}

fn apply_env_proxy(mut builder: ClientBuilder) -> ClientBuilder {
    if let Some(proxy) = env_proxy_for_scheme("https")
        && let Ok(resolved) = Proxy::https(&proxy)
    {
        builder = builder.proxy(resolved.no_proxy(NoProxy::from_env()));
    }
    if let Some(proxy) = env_proxy_for_scheme("http")
        && let Ok(resolved) = Proxy::http(&proxy)
    {
        builder = builder.proxy(resolved.no_proxy(NoProxy::from_env()));
    }
    builder
}

fn env_proxy_for_scheme(scheme: &str) -> Option<String> {
    match scheme {
        "https" => find_first_proxy_var(&["HTTPS_PROXY", "https_proxy", "ALL_PROXY", "all_proxy"]),
        "http" => find_first_proxy_var(&["HTTP_PROXY", "http_proxy", "ALL_PROXY", "all_proxy"]),
        _ => None,
    }
}

fn find_first_proxy_var(names: &[&str]) -> Option<String> {
    names.iter().find_map(|name| {
        std::env::var(name)
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_build_http_client_succeeds_with_static_configuration() {
        assert!(build_http_client(5, 10, BROWSER_USER_AGENT).is_ok());
    }

    #[test]
    fn test_env_proxy_unknown_scheme_is_none() {
        assert_eq!(env_proxy_for_scheme("ftp"), None);
    }

    #[test]
    fn test_browser_user_agent_looks_like_browser() {
        assert!(BROWSER_USER_AGENT.starts_with("Mozilla/5.0"));
    }
}
