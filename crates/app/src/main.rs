//! SquadUp - command-line session client
//!
//! Wires the session core onto reqwest, the local file system and the
//! system clock, then runs one subcommand.

mod cli;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use squadup_application::{LoginRequest, SessionCoordinator, SessionEvent};
use squadup_domain::{ApiRequest, HttpMethod, SessionSettings, UserProfile};
use squadup_infrastructure::{
    FileSessionStorage, ReqwestTransport, SystemClock, TokioFileSystem, load_settings,
    session_path,
};
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::{Cli, Commands};

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

#[tokio::main]
async fn main() -> CliResult<()> {
    let cli = Cli::parse();
    let settings = load_settings(cli.config.as_deref())?;

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&settings.log_filter)),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let session = connect(settings)?;
    session.restore().await;

    match cli.command {
        Commands::Login {
            login,
            password,
            remember,
        } => {
            let credentials = LoginRequest::new(login, password).remember(remember);
            let user = session.login(&credentials).await?;
            println!("Signed in as {}", display_name(&user));
            forget_hint(remember);
        }
        Commands::Register {
            username,
            email,
            password,
            remember,
        } => {
            let payload = serde_json::json!({
                "username": username,
                "email": email,
                "password": password,
            });
            let user = session.register(&payload, remember).await?;
            println!("Registered and signed in as {}", display_name(&user));
            forget_hint(remember);
        }
        Commands::Status { force } => status(&session, force).await,
        Commands::Request { method, url, body } => {
            let method: HttpMethod = method.parse()?;
            let mut request = ApiRequest::new(method, url);
            if let Some(body) = body {
                let body: serde_json::Value = serde_json::from_str(&body)?;
                request = request.with_json(&body);
            }
            let response = session.authenticated_request(request).await?;
            println!("{}", response.status);
            println!("{}", response.body);
        }
        Commands::Logout => {
            session.logout().await;
            println!("Signed out");
        }
        Commands::Watch => watch(&session).await?,
    }

    Ok(())
}

fn connect(settings: SessionSettings) -> CliResult<SessionCoordinator> {
    let path = session_path(&settings)?;
    tracing::debug!(path = %path.display(), "session file");

    let storage = Arc::new(FileSessionStorage::new(TokioFileSystem::new(), path));
    let transport = Arc::new(ReqwestTransport::new(Duration::from_secs(
        settings.request_timeout_secs,
    ))?);
    let clock = Arc::new(SystemClock::new());

    Ok(SessionCoordinator::new(
        settings, transport, storage, clock,
    )?)
}

async fn status(session: &SessionCoordinator, force: bool) {
    if session.check_status(force).await {
        let name = session
            .current_user()
            .map_or_else(|| "unknown user".to_string(), |u| display_name(&u));
        println!("Signed in as {name}");
        println!("Token: {}", session.token_status().display_message());
    } else {
        println!("Not signed in");
    }
}

async fn watch(session: &SessionCoordinator) -> CliResult<()> {
    if !session.bootstrap().await {
        println!("Not signed in");
        return Ok(());
    }

    let shutdown = CancellationToken::new();
    let observer = session.observer().spawn(shutdown.clone());
    let mut events = session.subscribe();
    println!("Watching session, press Ctrl-C to stop");

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    report(&event);
                    if event.requires_login() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "missed session events");
                }
                Err(RecvError::Closed) => break,
            },
            result = tokio::signal::ctrl_c() => {
                result?;
                break;
            }
        }
    }

    shutdown.cancel();
    observer.await?;
    Ok(())
}

fn report(event: &SessionEvent) {
    match event {
        SessionEvent::SignedIn { user } => println!("Signed in as {}", display_name(user)),
        SessionEvent::TokenRefreshed => println!("Access token refreshed"),
        SessionEvent::SessionExpired { reason } => {
            println!("Session expired ({reason}), sign in again");
        }
        SessionEvent::SignedOut => println!("Signed out"),
    }
}

fn forget_hint(remember: bool) {
    if !remember {
        println!("Session not saved, pass --remember to stay signed in");
    }
}

fn display_name(user: &UserProfile) -> String {
    user.str_field("username")
        .or_else(|| user.str_field("email"))
        .unwrap_or("unknown user")
        .to_string()
}
