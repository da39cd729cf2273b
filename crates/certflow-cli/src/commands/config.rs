//! Configuration commands.

use crate::cli::GoogleArgs;
use crate::config::CertflowConfig;
use crate::error::{ClientError, ClientResult};

/// Prints the effective configuration as TOML.
pub fn dump(config: &CertflowConfig) -> ClientResult<()> {
    let toml_str = toml::to_string_pretty(config)
        .map_err(|e| ClientError::config(format!("failed to serialize config: {}", e)))?;
    println!("# config.toml ({})", CertflowConfig::default_path().display());
    println!("{}", toml_str);
    Ok(())
}

/// Checks that the Google client resolves and the server settings are usable.
pub fn validate(config: &CertflowConfig, google: &GoogleArgs) -> ClientResult<()> {
    let google_config = config.google_config(google)?;
    println!("Google client: {}", google_config.credentials.client_id);
    println!("Redirect URI:  {}", google_config.redirect_uri);

    let server = config.to_server_config();
    println!("Listen on:     {}", server.bind_addr);
    if server.mail.sender_address.is_none() {
        println!("note: [mail] sender_address is unset; messages go out as the signed-in account");
    }

    println!("Configuration is valid.");
    Ok(())
}

pub fn path() -> ClientResult<()> {
    println!("config: {}", CertflowConfig::default_path().display());
    Ok(())
}
