//! hearth - terminal client for the hearth personal site.
//!
//! Logs in against the REST backend, keeps the session between runs, and
//! offers an interactive shell with unread-message notifications.

use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use hearth_core::api::MESSAGE_PAGE_SIZE;
use hearth_core::auth::{self, GuardOutcome};
use hearth_core::models::{MessageCreate, Role, MAX_MESSAGE_LENGTH};
use hearth_core::nav::{self, NavigationEvents, Route};
use hearth_core::{
    ApiClient, Config, CredentialStore, SessionGuard, Shell, UnreadEvent, UnreadSnapshot,
    ViewOutcome,
};

// ============================================================================
// Constants
// ============================================================================

const USAGE: &str = "\
Usage: hearth [--log-file] <command>

Commands:
  login [username]   Log in (password from HEARTH_PASSWORD or prompt)
  logout             End the stored session
  whoami             Verify the session with the server
  open <path>        Open one page, e.g. /app/messages
  shell [path]       Interactive session with unread notifications
  send <text>        Post a message to the wall

Environment:
  HEARTH_API_URL     Server base URL (overrides config)
  HEARTH_USERNAME    Default username for login
  HEARTH_PASSWORD    Password for non-interactive login
  RUST_LOG           Log filter, e.g. RUST_LOG=debug";

/// Log file name prefix inside the cache directory
const LOG_FILE_PREFIX: &str = "hearth.log";

// ============================================================================
// Arguments
// ============================================================================

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Login(Option<String>),
    Logout,
    Whoami,
    Open(String),
    Shell(Option<String>),
    Send(String),
    Help,
}

#[derive(Debug, PartialEq, Eq)]
struct Args {
    log_file: bool,
    command: Command,
}

fn parse_args(args: &[String]) -> Result<Args> {
    let mut log_file = false;
    let mut rest = Vec::new();
    for arg in args {
        match arg.as_str() {
            "--log-file" => log_file = true,
            "-h" | "--help" => {
                return Ok(Args {
                    log_file,
                    command: Command::Help,
                })
            }
            _ => rest.push(arg.as_str()),
        }
    }

    let command = match rest.as_slice() {
        [] | ["help"] => Command::Help,
        ["login"] => Command::Login(None),
        ["login", username] => Command::Login(Some((*username).to_string())),
        ["logout"] => Command::Logout,
        ["whoami"] => Command::Whoami,
        ["open", path] => Command::Open((*path).to_string()),
        ["shell"] => Command::Shell(None),
        ["shell", path] => Command::Shell(Some((*path).to_string())),
        ["send", words @ ..] if !words.is_empty() => Command::Send(words.join(" ")),
        _ => bail!("Unrecognized arguments: {}\n\n{}", rest.join(" "), USAGE),
    };

    Ok(Args { log_file, command })
}

// ============================================================================
// Setup
// ============================================================================

/// Initialize the tracing subscriber for logging.
///
/// Logs go to stderr unless a log directory is given, in which case they go
/// to a daily-rotated file there. The returned guard must be held until exit
/// so buffered lines are flushed.
fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(fmt::layer().with_writer(writer).with_ansi(false))
                .with(filter)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(fmt::layer().with_writer(io::stderr))
                .with(filter)
                .init();
            None
        }
    }
}

/// Open the persisted session and build the API client around it.
fn connect(config: &Config) -> Result<(ApiClient, NavigationEvents)> {
    let store = Arc::new(CredentialStore::open(config.open_backend()?));
    let (navigator, events) = nav::channel();
    let env_url = std::env::var("HEARTH_API_URL").ok();
    let base_url = config.resolve_api_base_url(env_url.as_deref());
    info!(base_url = %base_url, "Using API server");

    let client = ApiClient::new(&base_url, store, navigator)
        .context("Failed to create HTTP client")?;
    Ok((client, events))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let raw: Vec<String> = std::env::args().skip(1).collect();
    let args = parse_args(&raw)?;

    let mut config = Config::load().unwrap_or_else(|e| {
        eprintln!("Warning: could not load config ({}), using defaults", e);
        Config::default()
    });

    let log_dir = if args.log_file {
        let dir = config.cache_dir()?;
        std::fs::create_dir_all(&dir).context("Failed to create log directory")?;
        Some(dir)
    } else {
        None
    };
    let _log_guard = init_tracing(log_dir.as_deref());

    if args.command == Command::Help {
        println!("{}", USAGE);
        return Ok(());
    }

    let (client, events) = connect(&config)?;

    match args.command {
        Command::Login(username) => cmd_login(&client, &mut config, username).await,
        Command::Logout => {
            if auth::logout(client.credentials()) {
                println!("Logged out.");
            } else {
                println!("Not logged in.");
            }
            Ok(())
        }
        Command::Whoami => cmd_whoami(&client).await,
        Command::Open(path) => cmd_open(&client, &config, &path).await,
        Command::Shell(path) => run_shell(client, events, &config, path).await,
        Command::Send(text) => cmd_send(&client, &text).await,
        Command::Help => Ok(()),
    }
}

// ============================================================================
// Commands
// ============================================================================

async fn cmd_login(
    client: &ApiClient,
    config: &mut Config,
    username: Option<String>,
) -> Result<()> {
    let username = match username.or_else(|| std::env::var("HEARTH_USERNAME").ok()) {
        Some(name) => name,
        None => prompt_username(config.last_username.as_deref())?,
    };

    let password = match std::env::var("HEARTH_PASSWORD") {
        Ok(password) => password,
        Err(_) => rpassword::prompt_password("Password: ").context("Failed to read password")?,
    };

    let outcome = auth::login(client, &username, &password)
        .await
        .map_err(|e| anyhow!(e.user_message()))?;

    config.last_username = Some(username.trim().to_string());
    if let Err(e) = config.save() {
        warn!(error = %e, "Failed to save config");
    }

    println!("Logged in as {} ({}).", username.trim(), outcome.role);
    println!("Start page: {}", outcome.landing.path());
    Ok(())
}

fn prompt_username(last: Option<&str>) -> Result<String> {
    match last {
        Some(last) => print!("Username [{}]: ", last),
        None => print!("Username: "),
    }
    io::stdout().flush()?;

    let mut line = String::new();
    io::stdin()
        .read_line(&mut line)
        .context("Failed to read username")?;
    let entered = line.trim();
    Ok(match (entered.is_empty(), last) {
        (true, Some(last)) => last.to_string(),
        _ => entered.to_string(),
    })
}

async fn cmd_whoami(client: &ApiClient) -> Result<()> {
    let mut guard = SessionGuard::new(client.clone());
    match guard.enter(&[Role::Admin, Role::Friend]).await {
        GuardOutcome::Granted(user) => {
            println!("{} ({})", user.username, user.role);
            Ok(())
        }
        GuardOutcome::Denied { role } => bail!("Role {} has no pages", role),
        GuardOutcome::RedirectToLogin => bail!("Not logged in. Run `hearth login`."),
    }
}

async fn cmd_open(client: &ApiClient, config: &Config, path: &str) -> Result<()> {
    let route = parse_page(path)?;
    let (tx, _rx) = mpsc::unbounded_channel();
    let mut shell = Shell::new(client.clone(), config.poller(), tx);
    let outcome = shell.navigate(route).await;
    render(client, &outcome).await;
    Ok(())
}

async fn cmd_send(client: &ApiClient, text: &str) -> Result<()> {
    let message = MessageCreate::new(text)
        .ok_or_else(|| anyhow!("Message must be 1-{} characters", MAX_MESSAGE_LENGTH))?;

    match client.post_message(&message).await {
        Ok(posted) => {
            println!("Sent at {}.", posted.display_time());
            Ok(())
        }
        Err(e) if e.is_session_terminal() => bail!("Session expired. Run `hearth login`."),
        Err(e) => Err(e).context("Failed to send message"),
    }
}

fn parse_page(path: &str) -> Result<Route> {
    let route = Route::parse(path);
    if route == Route::Login && path.trim_end_matches('/') != "/login" {
        bail!("Unknown page: {}", path);
    }
    Ok(route)
}

// ============================================================================
// Rendering
// ============================================================================

async fn render(client: &ApiClient, outcome: &ViewOutcome) {
    match outcome {
        ViewOutcome::Login => println!("Not logged in. Run `hearth login`."),
        ViewOutcome::Denied { route, role } => {
            println!("Access denied: {} is not available to {}.", route.title(), role);
        }
        ViewOutcome::Rendered { route, user } => {
            println!("== {} ({}) ==", route.title(), user.username);
            if route.is_message_view() {
                print_messages(client).await;
            } else {
                print_menu(user.role, *route);
            }
        }
    }
}

async fn print_messages(client: &ApiClient) {
    match client.list_messages(MESSAGE_PAGE_SIZE, 0).await {
        Ok(messages) if messages.is_empty() => println!("No messages yet."),
        Ok(messages) => {
            for message in messages {
                println!(
                    "[{}] {}: {}",
                    message.display_time(),
                    message.sender_username,
                    message.content
                );
            }
        }
        Err(e) => println!("Could not load messages: {}", e),
    }
}

fn print_menu(role: Role, current: Route) {
    for route in Route::menu(role) {
        let marker = if *route == current { '>' } else { ' ' };
        println!("{} {:<28} {}", marker, route.path(), route.title());
    }
}

fn print_unread(event: UnreadEvent) {
    match event {
        UnreadEvent::Toast { count } if count == 1 => println!("\n** 1 new message **"),
        UnreadEvent::Toast { count } => println!("\n** {} new messages **", count),
        UnreadEvent::Badge { .. } | UnreadEvent::ToastCleared => {}
    }
}

fn print_status(unread: Option<UnreadSnapshot>) {
    let Some(unread) = unread else {
        println!("Not polling.");
        return;
    };
    let checked = unread
        .last_polled_at
        .map(|at| at.with_timezone(&chrono::Local).format("%H:%M:%S").to_string())
        .unwrap_or_else(|| "never".to_string());
    println!("Unread: {} (last checked {})", unread.count, checked);
}

fn prompt(shell: &Shell) {
    let badge = shell.unread().and_then(|u| u.badge_label());
    match badge {
        Some(label) => print!("{} [{}]> ", shell.current().path(), label),
        None => print!("{}> ", shell.current().path()),
    }
    let _ = io::stdout().flush();
}

// ============================================================================
// Interactive shell
// ============================================================================

/// Read page paths from stdin until logout, quit, or a forced logout.
async fn run_shell(
    client: ApiClient,
    mut events: NavigationEvents,
    config: &Config,
    start: Option<String>,
) -> Result<()> {
    let (unread_tx, mut unread_rx) = mpsc::unbounded_channel();
    let mut shell = Shell::new(client.clone(), config.poller(), unread_tx);

    let start = match start {
        Some(path) => parse_page(&path)?,
        None => client
            .credentials()
            .get()
            .map(|c| Route::landing(c.role))
            .unwrap_or(Route::Login),
    };

    let outcome = shell.navigate(start).await;
    render(&client, &outcome).await;
    if outcome == ViewOutcome::Login {
        return Ok(());
    }
    println!("Commands: <page path>, menu, status, dismiss, send <text>, logout, quit");
    prompt(&shell);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let input = line.trim();
                match input {
                    "" => {}
                    "quit" | "exit" => break,
                    "logout" => {
                        shell.logout();
                        println!("Logged out.");
                        break;
                    }
                    "status" => print_status(shell.unread()),
                    "dismiss" => shell.dismiss_toast(),
                    "menu" => {
                        if let Some(credential) = client.credentials().get() {
                            print_menu(credential.role, shell.current());
                        }
                    }
                    _ if input.starts_with("send ") => {
                        if let Err(e) = cmd_send(&client, &input["send ".len()..]).await {
                            println!("{}", e);
                        }
                    }
                    _ if input.starts_with('/') => match parse_page(input) {
                        Ok(route) => {
                            let outcome = shell.navigate(route).await;
                            render(&client, &outcome).await;
                            if outcome == ViewOutcome::Login {
                                break;
                            }
                        }
                        Err(e) => println!("{}", e),
                    },
                    _ => println!("Unknown command: {}", input),
                }
                prompt(&shell);
            }
            Some(route) = events.next() => {
                shell.handle_redirect(route);
                if route == Route::Login {
                    println!("\nSession expired. Run `hearth login` to continue.");
                    break;
                }
            }
            Some(event) = unread_rx.recv() => {
                print_unread(event);
                if matches!(event, UnreadEvent::Toast { .. }) {
                    prompt(&shell);
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Result<Args> {
        let owned: Vec<String> = list.iter().map(|s| s.to_string()).collect();
        parse_args(&owned)
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(args(&[]).unwrap().command, Command::Help);
        assert_eq!(args(&["login"]).unwrap().command, Command::Login(None));
        assert_eq!(
            args(&["login", "mia"]).unwrap().command,
            Command::Login(Some("mia".to_string()))
        );
        assert_eq!(
            args(&["open", "/app/todos"]).unwrap().command,
            Command::Open("/app/todos".to_string())
        );
        assert_eq!(
            args(&["send", "hello", "there"]).unwrap().command,
            Command::Send("hello there".to_string())
        );
    }

    #[test]
    fn test_parse_log_file_flag_anywhere() {
        let parsed = args(&["shell", "--log-file"]).unwrap();
        assert!(parsed.log_file);
        assert_eq!(parsed.command, Command::Shell(None));
    }

    #[test]
    fn test_parse_rejects_unknown() {
        assert!(args(&["frobnicate"]).is_err());
        assert!(args(&["send"]).is_err());
        assert!(args(&["open"]).is_err());
    }

    #[test]
    fn test_parse_page() {
        assert_eq!(parse_page("/login").unwrap(), Route::Login);
        assert!(parse_page("/app/messages").unwrap().is_message_view());
        assert!(parse_page("/nowhere").is_err());
    }
}
