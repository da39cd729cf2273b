//! certflow CLI entry point.

use std::process::ExitCode;

use clap::Parser;

use certflow_cli::cli::{Cli, Command, ConfigAction, SheetAction};
use certflow_cli::commands;
use certflow_cli::config::CertflowConfig;
use certflow_cli::error::ClientResult;
use certflow_core::{TracingConfig, init_tracing};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let tracing = match cli.command {
        Command::Serve { .. } if !cli.debug => TracingConfig::server(),
        _ => TracingConfig::cli(cli.debug),
    };
    if let Err(e) = init_tracing(tracing) {
        eprintln!("warning: {}", e);
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> ClientResult<()> {
    let config = match cli.config {
        Some(ref path) => CertflowConfig::load_from(path)?,
        None => CertflowConfig::load()?,
    };
    let google = &cli.google;

    match cli.command {
        Command::Serve {
            bind,
            secure_cookies,
        } => commands::serve::run(&config, google, bind, secure_cookies).await,
        Command::Create {
            sheet,
            tokens,
            template_id,
            destination_id,
            purge,
            json,
        } => {
            commands::batch::create(
                &config,
                google,
                sheet,
                tokens,
                template_id,
                destination_id,
                purge,
                json,
            )
            .await
        }
        Command::Send {
            sheet,
            tokens,
            event_name,
            json,
        } => commands::batch::send(&config, google, sheet, tokens, event_name, json).await,
        Command::Sheet { action } => match action {
            SheetAction::Show {
                sheet,
                tokens,
                check,
                json,
            } => commands::batch::show(&config, google, sheet, tokens, check, json).await,
            SheetAction::Upload {
                sheet,
                tokens,
                file,
            } => commands::batch::upload(&config, google, sheet, tokens, &file).await,
        },
        Command::Config { action } => match action {
            ConfigAction::Dump => commands::config::dump(&config),
            ConfigAction::Validate => commands::config::validate(&config, google),
            ConfigAction::Path => commands::config::path(),
        },
    }
}
