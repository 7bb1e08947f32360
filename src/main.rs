use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use libris::config::Config;
use libris::db::queries::users;
use libris::lending::requests;
use libris::notify::Outbox;
use libris::notify::mailer::Transport;
use libris::notify::templates::Templates;
use libris::shop::payments::StripeGateway;
use libris::shop::sweep;
use libris::state::AppState;
use libris::web::auth;
use libris::{build_router, db, notify, scheduler};

const APP_NAME: &str = "Libris";

#[derive(Parser)]
#[command(name = "libris", version, about = "Library lending and bookshop service")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Queue reminders for requests due tomorrow, deliver them and exit
    #[arg(long)]
    remind_due: bool,

    /// Run one abandoned-cart sweep and exit
    #[arg(long)]
    sweep_carts: bool,

    /// Print a signed session value for the given user id and exit
    #[arg(long, value_name = "USER_ID")]
    issue_session: Option<i64>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Load configuration
    let mut config = Config::load(&cli.config).unwrap_or_else(|e| {
        eprintln!("Error loading config: {e}");
        std::process::exit(1);
    });

    // Setup tracing/logging
    let filter =
        EnvFilter::try_new(&config.server.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // Auto-generate session secret if not set
    if config.server.session_secret.is_empty() {
        if cli.issue_session.is_some() {
            tracing::error!("server.session_secret must be set to issue sessions");
            std::process::exit(1);
        }
        use std::time::{SystemTime, UNIX_EPOCH};
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        config.server.session_secret = format!("libris-auto-{seed}");
        tracing::warn!("server.session_secret is empty; sessions will not survive a restart");
    }

    if let Err(e) = scheduler::validate_config(&config.scheduler) {
        tracing::error!("Invalid scheduler config: {e}");
        std::process::exit(1);
    }

    // Initialize database
    let pool = db::create_pool(&config.database).await.unwrap_or_else(|e| {
        tracing::error!("Failed to initialize database: {e}");
        std::process::exit(1);
    });
    tracing::info!("Database initialized ({:?})", pool.backend());

    if let Some(user_id) = cli.issue_session {
        match users::get_by_id(&pool, user_id).await {
            Ok(Some(_)) => {
                let token = auth::sign_session(
                    user_id,
                    config.server.session_secret.as_bytes(),
                    config.server.session_ttl_hours,
                );
                println!("{token}");
                return;
            }
            Ok(None) => {
                tracing::error!("User {user_id} does not exist");
                std::process::exit(1);
            }
            Err(e) => {
                tracing::error!("Failed to look up user {user_id}: {e}");
                std::process::exit(1);
            }
        }
    }

    let mailer = Transport::from_config(&config.mail).unwrap_or_else(|e| {
        tracing::error!("Failed to set up mail transport: {e}");
        std::process::exit(1);
    });
    let new_templates = || {
        Templates::new(APP_NAME, &config.server.public_url).unwrap_or_else(|e| {
            tracing::error!("Failed to load email templates: {e}");
            std::process::exit(1);
        })
    };
    let payments = StripeGateway::new(&config.payments).unwrap_or_else(|e| {
        tracing::error!("Failed to set up payment gateway: {e}");
        std::process::exit(1);
    });
    if config.payments.stripe_secret_key.is_empty() {
        tracing::warn!("payments.stripe_secret_key is empty; checkout will fail");
    }

    let worker_templates = new_templates();
    let scheduler_templates = Arc::new(new_templates());
    let (outbox, rx) = Outbox::channel();
    let worker = tokio::spawn(notify::worker::run(rx, mailer.clone(), worker_templates));

    let addr = SocketAddr::new(
        config.server.host.parse().unwrap_or_else(|_| {
            tracing::warn!(
                "Invalid host '{}', falling back to 0.0.0.0",
                config.server.host
            );
            std::net::Ipv4Addr::UNSPECIFIED.into()
        }),
        config.server.port,
    );
    let state = AppState::new(config, pool, outbox, payments);

    // One-shot reminder mode
    if cli.remind_due {
        let now = chrono::Utc::now().naive_utc();
        let result = requests::remind_due_tomorrow(&state, now).await;
        // Closing the outbox lets the worker drain and stop.
        drop(state);
        let _ = worker.await;
        match result {
            Ok(n) => tracing::info!("Reminders sent: {n}"),
            Err(e) => {
                tracing::error!("Reminders failed: {e}");
                std::process::exit(1);
            }
        }
        return;
    }

    // One-shot cart sweep mode
    if cli.sweep_carts {
        let now = chrono::Utc::now().naive_utc();
        match sweep::sweep_abandoned_carts(&state, &mailer, &scheduler_templates, now).await {
            Ok(report) => tracing::info!(
                "Cart sweep finished: claimed={}, sent={}, failed={}",
                report.claimed,
                report.sent,
                report.failed
            ),
            Err(e) => {
                tracing::error!("Cart sweep failed: {e}");
                std::process::exit(1);
            }
        }
        return;
    }

    tracing::info!("libris v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Listening on {addr}");

    // Start background scheduler
    if state.config.scheduler.enable {
        tokio::spawn(scheduler::run(state.clone(), mailer, scheduler_templates));
    }

    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .unwrap_or_else(|e| {
            tracing::error!("Failed to bind to {addr}: {e}");
            std::process::exit(1);
        });

    axum::serve(listener, app).await.unwrap_or_else(|e| {
        tracing::error!("Server error: {e}");
        std::process::exit(1);
    });
}
