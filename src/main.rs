use clap::Parser;
use colored::*;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use vaidya::capability::{CapabilityGate, CapabilityState, TerminalProbe};
use vaidya::client::ChatSession;
use vaidya::config::{ClientConfig, RelayConfig};
use vaidya::constants::{DEFAULT_CONNECT_TIMEOUT_SECS, RELAY_CHAT_PATH};
use vaidya::conversation::{CancellationPolicy, ConversationUpdate, Outcome, Phase};
use vaidya::history::init_db;
use vaidya::language::Language;
use vaidya::main_helper::{build_http_client, ChatArgs, Command, ServeArgs};
use vaidya::types::{Message, Role};
use vaidya::{AppState, Args};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let console = matches!(args.command, Command::Serve(_));
    let guard = vaidya::logging::init_tracing(&args.log_dir, args.json_logs, console);
    vaidya::logging::setup_panic_hook();

    match args.command {
        Command::Serve(serve) => run_server(serve).await,
        Command::Chat(chat) => {
            run_chat(chat).await;
            // a pending stdin read would otherwise hold the runtime open
            drop(guard);
            std::process::exit(0);
        }
    }
}

async fn run_server(args: ServeArgs) {
    let config = RelayConfig::from_args(&args);
    if !config.has_credential() {
        tracing::warn!(
            "{} is not set; chat requests will fail until it is configured",
            vaidya::constants::ENV_GATEWAY_API_KEY
        );
    }

    let state = match AppState::new(config) {
        Ok(s) => Arc::new(s),
        Err(e) => {
            tracing::error!("Failed to build HTTP client: {}", e);
            std::process::exit(1);
        }
    };
    let app = vaidya::relay::build_router(state);

    let addr = format!("{}:{}", args.host, args.port);
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!("Failed to bind to {}: {}", addr, e);
            std::process::exit(1);
        }
    };

    tracing::info!("Vaidya relay listening on {}{}", addr, RELAY_CHAT_PATH);
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for shutdown signal: {}", e);
        }
        tracing::info!("Shutting down");
    };
    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
    {
        tracing::error!("Server error: {}", e);
    }
}

async fn run_chat(args: ChatArgs) {
    let language = Language::parse_or_default(&args.language);
    let mode = ClientConfig::from_env().validate();

    let http = match build_http_client(
        Duration::from_secs(args.request_timeout_secs),
        Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
    ) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to build HTTP client: {}", e);
            std::process::exit(1);
        }
    };

    let mut session = ChatSession::new(mode, http, language, CancellationPolicy::default());
    if let Some(reason) = session.fallback_reason() {
        println!("{} {}", "Offline mode:".yellow().bold(), reason);
    }
    let renderer = tokio::spawn(render_updates(BroadcastStream::new(session.subscribe())));

    match init_db(&args.database).await {
        Ok(pool) => {
            session.attach_history(pool, args.user.clone()).await;
        }
        Err(e) => {
            tracing::warn!("History disabled: {}", e);
            println!("{}", "History is disabled for this session.".dimmed());
            print_conversation(language, session.conversation().messages());
        }
    }

    let voice = CapabilityGate::detect(&TerminalProbe);
    if voice.state() == CapabilityState::Unavailable {
        tracing::debug!("Voice input unavailable in the terminal");
    }
    println!(
        "{}",
        "Commands: /lang <name>, /clear, /quit. Ctrl-C stops a reply, or exits when idle.".dimmed()
    );

    let (turn_tx, turn_rx) = watch::channel::<Option<CancellationToken>>(None);
    let quit = CancellationToken::new();
    let interrupts = tokio::spawn(watch_interrupts(turn_rx, quit.clone()));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let next = tokio::select! {
            _ = quit.cancelled() => break,
            next = lines.next_line() => next,
        };
        let line = match next {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                tracing::error!("Failed to read input: {}", e);
                break;
            }
        };
        let input = line.trim();

        if input == "/quit" {
            break;
        } else if input == "/clear" {
            if let Err(e) = session.clear_history().await {
                println!("{} {}", "Could not clear history:".red(), e);
            }
        } else if let Some(name) = input.strip_prefix("/lang") {
            match Language::from_name(name) {
                Some(next) => {
                    session.set_language(next).await;
                }
                None => {
                    let names: Vec<&str> = Language::ALL.iter().map(|l| l.as_str()).collect();
                    println!("{} {}", "Languages:".yellow(), names.join(", "));
                }
            }
        } else if !input.is_empty() {
            let cancel = CancellationToken::new();
            turn_tx.send_replace(Some(cancel.clone()));
            let outcome = session.send(input, &cancel).await;
            turn_tx.send_replace(None);
            tracing::debug!("Turn finished: {:?}", outcome);
        }
    }

    interrupts.abort();
    drop(session);
    let _ = renderer.await;
}

/// One Ctrl-C listener for the whole session: it cancels the turn in flight,
/// or ends the session when idle.
async fn watch_interrupts(turn: watch::Receiver<Option<CancellationToken>>, quit: CancellationToken) {
    loop {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            return;
        }
        let current = turn.borrow().clone();
        match current {
            Some(cancel) => cancel.cancel(),
            None => {
                println!();
                quit.cancel();
                return;
            }
        }
    }
}

async fn render_updates(mut updates: BroadcastStream<ConversationUpdate>) {
    while let Some(update) = updates.next().await {
        let update = match update {
            Ok(u) => u,
            Err(e) => {
                tracing::warn!("Renderer lagged: {}", e);
                continue;
            }
        };
        match update {
            ConversationUpdate::Reset { language, messages } => {
                print_conversation(language, &messages);
            }
            ConversationUpdate::MessageAppended(message) => match message.role {
                Role::User => {}
                Role::Assistant if message.content.is_empty() => {
                    print!("{} ", "assistant>".green().bold());
                }
                Role::Assistant => {
                    println!("{} {}", "assistant>".green().bold(), message.content);
                }
            },
            ConversationUpdate::PendingGrew { delta } => {
                print!("{}", delta);
            }
            ConversationUpdate::PendingRemoved => {
                print!("\r");
            }
            ConversationUpdate::PhaseChanged(Phase::Sending) => {
                println!("{}", "…".dimmed());
            }
            ConversationUpdate::PhaseChanged(Phase::Settled(Outcome::Success)) => {
                println!();
            }
            ConversationUpdate::PhaseChanged(Phase::Settled(Outcome::Failed(notice))) => {
                println!();
                println!("{} {}", "!".red().bold(), notice.message.red());
            }
            ConversationUpdate::PhaseChanged(_) => {}
        }
        let _ = std::io::stdout().flush();
    }
}

fn print_conversation(language: Language, messages: &[Message]) {
    println!("{}", format!("── {} ──", language.label()).cyan());
    for message in messages {
        let tag = match message.role {
            Role::User => "you>".blue().bold(),
            Role::Assistant => "assistant>".green().bold(),
        };
        println!("{} {}", tag, message.content);
    }
}
