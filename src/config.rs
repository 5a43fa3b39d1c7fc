use crate::constants::{
    AI_GATEWAY_CHAT_COMPLETIONS, DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_MAX_BODY_SIZE,
    DEFAULT_MODEL, DEFAULT_REQUEST_TIMEOUT_SECS, ENV_CLIENT_KEY, ENV_GATEWAY_API_KEY,
    ENV_RELAY_KEY, ENV_RELAY_URL, PLACEHOLDER_MARKERS, RELAY_CHAT_PATH,
};
use crate::main_helper::ServeArgs;
use std::time::Duration;

/// Relay settings, resolved once at startup.
///
/// A missing upstream credential is not fatal here: the relay still starts
/// and answers chat requests with a configuration error.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub upstream_url: String,
    pub model: String,
    pub upstream_api_key: Option<String>,
    pub client_key: Option<String>,
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    pub max_body_size: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            upstream_url: AI_GATEWAY_CHAT_COMPLETIONS.to_string(),
            model: DEFAULT_MODEL.to_string(),
            upstream_api_key: None,
            client_key: None,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            max_body_size: DEFAULT_MAX_BODY_SIZE,
        }
    }
}

impl RelayConfig {
    pub fn from_args(args: &ServeArgs) -> Self {
        Self {
            upstream_url: args.upstream_url.clone(),
            model: args.model.clone(),
            upstream_api_key: non_empty_env(ENV_GATEWAY_API_KEY),
            client_key: non_empty_env(ENV_CLIENT_KEY),
            request_timeout: Duration::from_secs(args.request_timeout_secs),
            connect_timeout: Duration::from_secs(args.connect_timeout_secs),
            max_body_size: args.max_body_size,
        }
    }

    pub fn has_credential(&self) -> bool {
        self.upstream_api_key.is_some()
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    match std::env::var(key) {
        Ok(v) if !v.trim().is_empty() => Some(v.trim().to_string()),
        _ => None,
    }
}

/// What the chat client needs to reach the relay.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientConfig {
    pub relay_base_url: Option<String>,
    pub relay_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMode {
    Live { endpoint: String, key: String },
    /// Relay unusable; replies come from the fallback responder.
    Fallback { reason: String },
}

impl ClientConfig {
    pub fn new(relay_base_url: impl Into<String>, relay_key: impl Into<String>) -> Self {
        Self {
            relay_base_url: Some(relay_base_url.into()),
            relay_key: Some(relay_key.into()),
        }
    }

    pub fn from_env() -> Self {
        Self {
            relay_base_url: std::env::var(ENV_RELAY_URL).ok(),
            relay_key: std::env::var(ENV_RELAY_KEY).ok(),
        }
    }

    pub fn validate(&self) -> ClientMode {
        let base_url = match self.relay_base_url.as_deref().map(str::trim) {
            Some(u) if !u.is_empty() && !is_placeholder(u) => u,
            _ => {
                return ClientMode::Fallback {
                    reason: format!("{} is missing or a placeholder", ENV_RELAY_URL),
                }
            }
        };
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return ClientMode::Fallback {
                reason: format!("{} must be an http(s) URL", ENV_RELAY_URL),
            };
        }
        let key = match self.relay_key.as_deref().map(str::trim) {
            Some(k) if !k.is_empty() && !is_placeholder(k) => k,
            _ => {
                return ClientMode::Fallback {
                    reason: format!("{} is missing or a placeholder", ENV_RELAY_KEY),
                }
            }
        };

        ClientMode::Live {
            endpoint: format!("{}{}", base_url.trim_end_matches('/'), RELAY_CHAT_PATH),
            key: key.to_string(),
        }
    }
}

/// True when the value (or a URL's host) starts with a placeholder marker or
/// an angle-bracketed template. Markers inside a value do not count.
pub fn is_placeholder(value: &str) -> bool {
    let lower = value.trim().to_lowercase();
    let subject = match lower.split_once("://") {
        Some((_, host)) => host,
        None => lower.as_str(),
    };
    subject.starts_with('<') || PLACEHOLDER_MARKERS.iter().any(|m| subject.starts_with(m))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn complete_config_is_live() {
        let mode = ClientConfig::new("https://relay.test/", "pk_live_123").validate();
        assert_eq!(
            mode,
            ClientMode::Live {
                endpoint: "https://relay.test/functions/v1/medical-chat".to_string(),
                key: "pk_live_123".to_string(),
            }
        );
    }

    #[test]
    fn missing_fields_select_fallback() {
        assert!(matches!(
            ClientConfig::default().validate(),
            ClientMode::Fallback { .. }
        ));
        let no_key = ClientConfig {
            relay_base_url: Some("https://relay.test".into()),
            relay_key: Some("   ".into()),
        };
        assert!(matches!(no_key.validate(), ClientMode::Fallback { .. }));
    }

    #[test]
    fn markers_inside_real_values_stay_live() {
        for (url, key) in [
            ("https://relay.test", "pk_live_9xxxQ2"),
            ("https://relay.test", "sb_publishable_ExAmPlE42"),
            ("https://api.example.org", "pk_live_123"),
            ("https://myproject.supabase.co", "key-your-team"),
        ] {
            let mode = ClientConfig::new(url, key).validate();
            assert!(
                matches!(mode, ClientMode::Live { .. }),
                "{url} / {key} should stay live"
            );
        }
    }

    #[test]
    fn placeholder_values_select_fallback() {
        for (url, key) in [
            ("https://your-project.supabase.co", "real"),
            ("https://relay.test", "<publishable-key>"),
            ("https://relay.test", "CHANGEME"),
            ("ftp://relay.test", "real"),
            ("https://<project>.supabase.co", "real"),
            ("https://relay.test", "xxx"),
        ] {
            let mode = ClientConfig::new(url, key).validate();
            assert!(
                matches!(mode, ClientMode::Fallback { .. }),
                "{url} / {key} should fall back"
            );
        }
    }
}
