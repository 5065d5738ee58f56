//! Command-line surface.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// SquadUp session client
#[derive(Parser)]
#[command(name = "squadup", about = "Sign in to SquadUp and call its API", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Settings file (defaults to ./squadup.toml when present)
    #[arg(long, global = true, env = "SQUADUP_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Sign in with a username or email
    Login {
        /// Username or email address
        login: String,

        /// Password
        #[arg(long, env = "SQUADUP_PASSWORD", hide_env_values = true)]
        password: String,

        /// Keep the session on disk for later commands
        #[arg(long)]
        remember: bool,
    },

    /// Create an account and sign in with it
    Register {
        /// Username
        username: String,

        /// Email address
        #[arg(long)]
        email: String,

        /// Password
        #[arg(long, env = "SQUADUP_PASSWORD", hide_env_values = true)]
        password: String,

        /// Keep the session on disk for later commands
        #[arg(long)]
        remember: bool,
    },

    /// Show whether the stored session is still valid
    Status {
        /// Verify with the server even if verified recently
        #[arg(long)]
        force: bool,
    },

    /// Send an authenticated request and print the response
    Request {
        /// HTTP method (GET, POST, PUT, PATCH, DELETE)
        method: String,

        /// Absolute URL or path relative to the API base URL
        url: String,

        /// JSON body
        #[arg(long)]
        body: Option<String>,
    },

    /// Sign out and forget the stored session
    Logout,

    /// Keep the session fresh in the background until Ctrl-C
    Watch,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_request_with_body() {
        let cli = Cli::try_parse_from([
            "squadup",
            "request",
            "post",
            "/api/squads",
            "--body",
            r#"{"name":"alpha"}"#,
        ])
        .unwrap();

        match cli.command {
            Commands::Request { method, url, body } => {
                assert_eq!(method, "post");
                assert_eq!(url, "/api/squads");
                assert_eq!(body.as_deref(), Some(r#"{"name":"alpha"}"#));
            }
            _ => panic!("expected request command"),
        }
    }

    #[test]
    fn test_login_is_not_remembered_by_default() {
        let cli = Cli::try_parse_from(["squadup", "login", "neo", "--password", "pw"]).unwrap();
        assert!(matches!(cli.command, Commands::Login { remember: false, .. }));

        let cli = Cli::try_parse_from([
            "squadup",
            "register",
            "neo",
            "--email",
            "neo@zion.io",
            "--password",
            "pw",
            "--remember",
        ])
        .unwrap();
        assert!(matches!(cli.command, Commands::Register { remember: true, .. }));
    }

    #[test]
    fn test_config_is_global() {
        let cli =
            Cli::try_parse_from(["squadup", "status", "--force", "--config", "dev.toml"]).unwrap();

        assert_eq!(cli.config, Some(PathBuf::from("dev.toml")));
        assert!(matches!(cli.command, Commands::Status { force: true }));
    }
}
