//! Command-line interface definition.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// certflow - certificates from a spreadsheet, delivered by mail
#[derive(Debug, Parser)]
#[command(name = "certflow")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, short, global = true, env = "CERTFLOW_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, short = 'v', global = true)]
    pub debug: bool,

    #[command(flatten)]
    pub google: GoogleArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// OAuth client overrides; they take precedence over `[google]` in the config.
#[derive(Debug, Clone, Default, Args)]
pub struct GoogleArgs {
    /// OAuth client ID
    #[arg(long, global = true, env = "GOOGLE_CLIENT_ID", hide_env_values = true)]
    pub client_id: Option<String>,

    /// OAuth client secret
    #[arg(long, global = true, env = "GOOGLE_CLIENT_SECRET", hide_env_values = true)]
    pub client_secret: Option<String>,

    /// OAuth redirect URI registered for the dashboard
    #[arg(long, global = true, env = "GOOGLE_REDIRECT_URI")]
    pub redirect_uri: Option<String>,
}

/// Tokens for one-shot batch commands.
#[derive(Debug, Clone, Args)]
pub struct TokenArgs {
    /// OAuth access token
    #[arg(long, env = "CERTFLOW_ACCESS_TOKEN", hide_env_values = true)]
    pub access_token: String,

    /// OAuth refresh token, used when the access token expires mid-run
    #[arg(long, env = "CERTFLOW_REFRESH_TOKEN", hide_env_values = true)]
    pub refresh_token: Option<String>,
}

/// Which spreadsheet tab to work on.
#[derive(Debug, Clone, Args)]
pub struct SheetArgs {
    /// Spreadsheet ID (from the sheet URL)
    #[arg(long)]
    pub spreadsheet_id: String,

    /// Tab name
    #[arg(long, default_value = "Sheet1")]
    pub sheet_name: String,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the dashboard server in the foreground
    Serve {
        /// Address to listen on (overrides `[server] bind_addr`)
        #[arg(long)]
        bind: Option<SocketAddr>,

        /// Mark session cookies Secure (serve behind HTTPS)
        #[arg(long)]
        secure_cookies: bool,
    },

    /// Create certificate decks for rows without one
    Create {
        #[command(flatten)]
        sheet: SheetArgs,

        #[command(flatten)]
        tokens: TokenArgs,

        /// Presentation to copy for every row
        #[arg(long)]
        template_id: String,

        /// Folder the copies go into
        #[arg(long)]
        destination_id: String,

        /// Delete everything in the destination folder first
        #[arg(long)]
        purge: bool,

        /// Print the response as JSON
        #[arg(long)]
        json: bool,
    },

    /// Mail the created certificates as PDF
    Send {
        #[command(flatten)]
        sheet: SheetArgs,

        #[command(flatten)]
        tokens: TokenArgs,

        /// Event name used in the message
        #[arg(long)]
        event_name: String,

        /// Print the response as JSON
        #[arg(long)]
        json: bool,
    },

    /// Inspect or replace sheet contents
    Sheet {
        #[command(subcommand)]
        action: SheetAction,
    },

    /// Configuration commands
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Sheet actions.
#[derive(Debug, Subcommand)]
pub enum SheetAction {
    /// Print the rows of a sheet
    Show {
        #[command(flatten)]
        sheet: SheetArgs,

        #[command(flatten)]
        tokens: TokenArgs,

        /// Also check the headers a run needs
        #[arg(long, value_enum)]
        check: Option<RunKind>,

        /// Print the rows as JSON
        #[arg(long)]
        json: bool,
    },

    /// Replace the sheet with rows from a JSON array of objects
    Upload {
        #[command(flatten)]
        sheet: SheetArgs,

        #[command(flatten)]
        tokens: TokenArgs,

        /// JSON file to upload
        file: PathBuf,
    },
}

/// A batch kind, for header checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RunKind {
    Create,
    Send,
}

/// Configuration actions.
#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Dump current configuration
    Dump,

    /// Validate configuration
    Validate,

    /// Show configuration file path
    Path,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_create() {
        let cli = Cli::try_parse_from([
            "certflow",
            "create",
            "--spreadsheet-id",
            "sheet-1",
            "--access-token",
            "at",
            "--template-id",
            "tpl",
            "--destination-id",
            "out",
            "--purge",
        ])
        .unwrap();
        match cli.command {
            Command::Create {
                sheet,
                tokens,
                purge,
                ..
            } => {
                assert_eq!(sheet.sheet_name, "Sheet1");
                assert_eq!(tokens.access_token, "at");
                assert!(purge);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn sheet_show_check() {
        let cli = Cli::try_parse_from([
            "certflow",
            "sheet",
            "show",
            "--spreadsheet-id",
            "s",
            "--access-token",
            "at",
            "--check",
            "send",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Command::Sheet {
                action: SheetAction::Show {
                    check: Some(RunKind::Send),
                    ..
                }
            }
        ));
    }
}
