//! shiptrack - command line front end for the shipment tracking API.
//!
//! Keeps an authenticated session on disk (or in the OS keyring) so that
//! successive invocations share it, and renews the access token while a
//! long-running command is active.

use std::io::{self, IsTerminal, Write};
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{Map, Value};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use shiptrack_core::api::{ApiError, Method};
use shiptrack_core::auth::{open_store, TokenStore};
use shiptrack_core::config::ENV_API_URL;
use shiptrack_core::{
    ApiClient, Config, HttpAuthApi, Navigator, Notice, NoticeLevel, Notifier, Registration,
    RouteTracker, SessionManager, SessionSnapshot, TracingNotifier,
};

// ============================================================================
// Constants
// ============================================================================

const ENV_PASSWORD: &str = "SHIPTRACK_PASSWORD";
const LOG_FILE_PREFIX: &str = "shiptrack.log";

#[derive(Parser, Debug)]
#[command(name = "shiptrack", version, about = "Shipment tracking API client")]
struct Cli {
    /// Base URL of the API server
    #[arg(long, env = ENV_API_URL)]
    api_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Log in and store the session
    Login {
        /// Defaults to the last email used
        email: Option<String>,
    },
    /// Create an account and log into it
    Signup {
        email: String,
        #[arg(long)]
        first_name: String,
        #[arg(long)]
        last_name: String,
    },
    /// End the stored session
    Logout,
    /// Show the stored session state
    Status,
    /// Keep the session renewed until interrupted or expired
    KeepAlive,
    /// Send an authenticated request and print the response body
    Request {
        /// HTTP method (GET, POST, PATCH, DELETE, ...)
        method: String,
        /// Path relative to the API base URL
        path: String,
        /// JSON request body
        #[arg(long)]
        data: Option<String>,
        /// Query parameter as key=value (repeatable)
        #[arg(long = "query", value_parser = parse_query_pair)]
        query: Vec<(String, String)>,
    },
}

fn parse_query_pair(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected key=value, got `{}`", raw))
}

/// Prints notices to stderr so stdout stays clean for response bodies.
/// Notices are also logged, so they reach the log file.
struct ConsoleNotifier {
    log: TracingNotifier,
}

impl Notifier for ConsoleNotifier {
    fn notify(&self, notice: Notice) {
        self.log.notify(notice.clone());
        match notice.level {
            NoticeLevel::Success => eprintln!("✓ {}", notice.message),
            NoticeLevel::Error => eprintln!("✗ {}", notice.message),
        }
    }
}

/// Initialize the tracing subscriber: stderr plus a daily log file.
/// Use RUST_LOG to control the level (e.g., RUST_LOG=shiptrack_core=debug).
fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let stderr_layer = fmt::layer().with_writer(io::stderr);

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_ansi(false).with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();
    guard
}

struct App {
    config: Config,
    session: SessionManager,
    client: ApiClient,
    navigator: Arc<RouteTracker>,
}

fn build(config: Config) -> Result<App> {
    let store = open_store(&config)?;
    let start_path = if store.access_token()?.is_some() {
        config.landing_path.clone()
    } else {
        config.login_path.clone()
    };
    let navigator = Arc::new(RouteTracker::new(start_path));

    let auth = Arc::new(HttpAuthApi::new(&config)?);
    let session = SessionManager::new(
        config.session(),
        auth,
        store.clone(),
        Arc::new(ConsoleNotifier {
            log: TracingNotifier,
        }),
        navigator.clone(),
    );
    let client = ApiClient::new(&config, store, navigator.clone())?;

    Ok(App {
        config,
        session,
        client,
        navigator,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let mut config = Config::load().unwrap_or_else(|e| {
        eprintln!("Warning: {:#}; using default configuration", e);
        Config::default()
    });
    if let Some(url) = cli.api_url {
        config.api_base_url = url;
    }

    let log_dir = config.data_dir().ok().filter(|dir| std::fs::create_dir_all(dir).is_ok());
    let _guard = init_tracing(log_dir.as_deref());
    info!(api = %config.api_base_url, "shiptrack starting");

    let app = build(config)?;
    match cli.command {
        Command::Login { email } => login(app, email).await,
        Command::Signup {
            email,
            first_name,
            last_name,
        } => signup(app, email, first_name, last_name).await,
        Command::Logout => {
            app.session.logout();
            eprintln!("Logged out");
            Ok(())
        }
        Command::Status => status(&app),
        Command::KeepAlive => keep_alive(app).await,
        Command::Request {
            method,
            path,
            data,
            query,
        } => request(&app, &method, &path, data.as_deref(), &query).await,
    }
}

fn prompt(label: &str) -> Result<String> {
    eprint!("{}: ", label);
    io::stderr().flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

fn read_password() -> Result<String> {
    if let Ok(password) = std::env::var(ENV_PASSWORD) {
        return Ok(password);
    }
    if !io::stdin().is_terminal() {
        anyhow::bail!("No terminal for password input; set {}", ENV_PASSWORD);
    }
    rpassword::prompt_password("Password: ").context("Failed to read password")
}

/// Persist the email for the next login prompt
fn remember_email(config: &mut Config, email: &str) {
    if config.last_email.as_deref() == Some(email) {
        return;
    }
    config.last_email = Some(email.to_string());
    if let Err(e) = config.save() {
        warn!(error = %format!("{:#}", e), "Failed to save config");
    }
}

async fn login(mut app: App, email: Option<String>) -> Result<()> {
    let email = match email.or_else(|| app.config.last_email.clone()) {
        Some(email) => email,
        None => prompt("Email")?,
    };
    if email.is_empty() {
        anyhow::bail!("An email address is required");
    }
    let password = read_password()?;

    app.session.login(&email, &password).await?;
    remember_email(&mut app.config, &email);
    Ok(())
}

async fn signup(
    mut app: App,
    email: String,
    first_name: String,
    last_name: String,
) -> Result<()> {
    let registration = Registration {
        email,
        password: read_password()?,
        first_name,
        last_name,
    };

    app.session.signup(&registration).await?;
    remember_email(&mut app.config, &registration.email);
    Ok(())
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}

fn describe_renewal(snapshot: &SessionSnapshot) -> String {
    match (snapshot.last_renewed_at, snapshot.minutes_since_renewal()) {
        (Some(at), Some(minutes)) => format!("{} ({} min ago)", at.to_rfc3339(), minutes),
        _ => "not yet in this process".to_string(),
    }
}

fn status(app: &App) -> Result<()> {
    let snapshot = app.session.snapshot();
    println!("API:              {}", app.config.api_base_url);
    println!("Token store:      {:?}", app.config.token_store);
    println!("Authenticated:    {}", yes_no(snapshot.authenticated));
    println!(
        "Refresh token:    {}",
        if snapshot.has_refresh_token { "present" } else { "absent" }
    );
    println!("Renewal active:   {}", yes_no(snapshot.renewal_active));
    println!("Renewal every:    {}s", app.config.refresh_interval_secs);
    println!("Last renewed:     {}", describe_renewal(&snapshot));
    println!("Renewal failures: {}", snapshot.consecutive_refresh_failures);
    if let Some(email) = &app.config.last_email {
        println!("Last email:       {}", email);
    }
    Ok(())
}

/// Run the renewal loop in the foreground. Exits on Ctrl-C, or when the
/// session ends and the navigator is sent back to the login surface.
async fn keep_alive(app: App) -> Result<()> {
    if !app.session.snapshot().has_refresh_token {
        anyhow::bail!("No stored session; run `shiptrack login` first");
    }

    let mut route = app.navigator.subscribe();
    eprintln!(
        "Keeping session alive (renewing every {}s), Ctrl-C to stop",
        app.config.refresh_interval_secs
    );

    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result.context("Failed to listen for Ctrl-C")?;
                info!("Interrupted, leaving stored session in place");
                return Ok(());
            }
            changed = route.changed() => {
                if changed.is_err() {
                    return Ok(());
                }
                let path = route.borrow_and_update().clone();
                if path == app.config.login_path {
                    anyhow::bail!("Session ended");
                }
            }
        }

        let snapshot = app.session.snapshot();
        if let Some(at) = snapshot.last_renewed_at {
            info!(renewed_at = %at, failures = snapshot.consecutive_refresh_failures, "Session state");
        }
    }
}

async fn request(
    app: &App,
    method: &str,
    path: &str,
    data: Option<&str>,
    query: &[(String, String)],
) -> Result<()> {
    let method: Method = method
        .to_ascii_uppercase()
        .parse()
        .with_context(|| format!("Invalid HTTP method: {}", method))?;
    let body: Option<Value> = data
        .map(serde_json::from_str)
        .transpose()
        .context("--data is not valid JSON")?;

    let response = match app.client.request(method, path, query, body.as_ref()).await {
        Err(ApiError::Unauthorized) => {
            anyhow::bail!("Not authorized; run `shiptrack login`")
        }
        result => result?,
    };

    if !response.ok() {
        eprintln!("HTTP {}", response.status);
    }
    match response.body {
        Some(Value::String(text)) => println!("{}", text),
        Some(body) => println!("{}", serde_json::to_string_pretty(&body)?),
        None => {
            let mut empty = Map::new();
            empty.insert("status".to_string(), Value::from(response.status.as_u16()));
            println!("{}", Value::Object(empty));
        }
    }

    if response.status.is_success() {
        Ok(())
    } else {
        anyhow::bail!("Request failed with HTTP {}", response.status)
    }
}
