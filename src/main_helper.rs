use crate::config::RelayConfig;
use crate::constants::{
    AI_GATEWAY_CHAT_COMPLETIONS, DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_MAX_BODY_SIZE,
    DEFAULT_MODEL, DEFAULT_REQUEST_TIMEOUT_SECS,
};
use crate::types::*;
use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
    #[arg(long, global = true, default_value = "logs")]
    pub log_dir: PathBuf,
    #[arg(long, global = true, default_value_t = false)]
    pub json_logs: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the streaming relay service.
    Serve(ServeArgs),
    /// Chat with a relay from the terminal.
    Chat(ChatArgs),
}

#[derive(ClapArgs, Debug, Clone)]
pub struct ServeArgs {
    #[arg(long, default_value_t = 8080)]
    pub port: u16,
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,
    #[arg(long, default_value = AI_GATEWAY_CHAT_COMPLETIONS)]
    pub upstream_url: String,
    #[arg(long, default_value = DEFAULT_MODEL)]
    pub model: String,
    #[arg(long, default_value_t = DEFAULT_REQUEST_TIMEOUT_SECS)]
    pub request_timeout_secs: u64,
    #[arg(long, default_value_t = DEFAULT_CONNECT_TIMEOUT_SECS)]
    pub connect_timeout_secs: u64,
    #[arg(long, default_value_t = DEFAULT_MAX_BODY_SIZE)]
    pub max_body_size: usize,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct ChatArgs {
    /// Reply language, by name or ISO code.
    #[arg(long, default_value = "english")]
    pub language: String,
    /// Key the local history is stored under.
    #[arg(long, default_value = "local")]
    pub user: String,
    #[arg(long, default_value = "vaidya.db")]
    pub database: PathBuf,
    #[arg(long, default_value_t = DEFAULT_REQUEST_TIMEOUT_SECS)]
    pub request_timeout_secs: u64,
}

#[derive(Clone)]
pub struct AppState {
    pub client: reqwest::Client,
    pub config: Arc<RelayConfig>,
}

impl AppState {
    pub fn new(config: RelayConfig) -> Result<Self> {
        let client = build_http_client(config.request_timeout, config.connect_timeout)?;
        Ok(Self {
            client,
            config: Arc::new(config),
        })
    }
}

/// Pooled client; the request timeout is the only guard on a stalled stream.
pub fn build_http_client(request_timeout: Duration, connect_timeout: Duration) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .timeout(request_timeout)
        .connect_timeout(connect_timeout)
        .pool_idle_timeout(Duration::from_secs(90))
        .pool_max_idle_per_host(10)
        .tcp_keepalive(Some(Duration::from_secs(60)))
        .build()?;
    Ok(client)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serve_defaults_target_the_gateway() {
        let args = Args::parse_from(["vaidya", "serve"]);
        match args.command {
            Command::Serve(serve) => {
                assert_eq!(serve.port, 8080);
                assert_eq!(serve.upstream_url, AI_GATEWAY_CHAT_COMPLETIONS);
                assert_eq!(serve.model, DEFAULT_MODEL);
            }
            other => panic!("expected serve, got {:?}", other),
        }
    }

    #[test]
    fn chat_accepts_language_and_global_flags() {
        let args = Args::parse_from(["vaidya", "chat", "--language", "ta", "--json-logs"]);
        assert!(args.json_logs);
        match args.command {
            Command::Chat(chat) => assert_eq!(chat.language, "ta"),
            other => panic!("expected chat, got {:?}", other),
        }
    }
}
