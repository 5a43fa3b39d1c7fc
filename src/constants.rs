use std::time::Duration;

/// AI gateway endpoints
pub const AI_GATEWAY_CHAT_COMPLETIONS: &str = "https://ai.gateway.lovable.dev/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "google/gemini-3-flash-preview";

/// Environment variables
pub const ENV_GATEWAY_API_KEY: &str = "AI_GATEWAY_API_KEY";
pub const ENV_CLIENT_KEY: &str = "VAIDYA_CLIENT_KEY";
pub const ENV_RELAY_URL: &str = "VAIDYA_RELAY_URL";
pub const ENV_RELAY_KEY: &str = "VAIDYA_RELAY_KEY";

/// Relay route, kept at the path the web client already calls.
pub const RELAY_CHAT_PATH: &str = "/functions/v1/medical-chat";

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Request headers a browser may send on the relay route.
pub const CORS_ALLOWED_HEADERS: &[&str] = &["authorization", "x-client-info", "apikey", "content-type"];

pub const EVENT_STREAM_CONTENT_TYPE: &str = "text/event-stream";

/// Event stream framing
pub const DATA_PREFIX: &str = "data: ";
pub const DONE_SENTINEL: &str = "[DONE]";
pub const MAX_FRAME_LENGTH: usize = 1024 * 1024;
pub const MAX_HELD_FRAGMENT: usize = 1024 * 1024;

/// Client-facing error messages
pub const RATE_LIMITED_MESSAGE: &str = "Rate limit exceeded. Please try again later.";
pub const QUOTA_EXHAUSTED_MESSAGE: &str = "Service credits exhausted. Please add funds.";
pub const UPSTREAM_FAILURE_MESSAGE: &str = "Failed to get AI response";
pub const RELAY_FAILURE_MESSAGE: &str = "Failed to get response";

/// Delay before the fallback reply lands, so it reads like a real response.
pub const FALLBACK_REPLY_DELAY: Duration = Duration::from_millis(600);

pub const EMERGENCY_HELPLINE: &str = "112";

/// Values that mark a config entry as never filled in.
pub const PLACEHOLDER_MARKERS: &[&str] = &[
    "your-",
    "your_",
    "changeme",
    "change-me",
    "placeholder",
    "example",
    "xxx",
];

pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_MAX_BODY_SIZE: usize = 2 * 1024 * 1024;
