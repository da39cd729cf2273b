//! `certflow serve`: the dashboard server in the foreground.

use std::net::SocketAddr;
use std::sync::Arc;

use certflow_providers::google::OAuthClient;
use certflow_server::{AppState, CertificateService, GoogleConnector, SignalHandler};
use tracing::info;

use crate::cli::GoogleArgs;
use crate::config::CertflowConfig;
use crate::error::ClientResult;

/// Runs until SIGTERM/SIGINT.
pub async fn run(
    config: &CertflowConfig,
    google: &GoogleArgs,
    bind: Option<SocketAddr>,
    secure_cookies: bool,
) -> ClientResult<()> {
    let mut server_config = config.to_server_config();
    if let Some(addr) = bind {
        server_config.bind_addr = addr;
    }
    if secure_cookies {
        server_config.secure_cookies = true;
    }

    let google_config = config.google_config(google)?;
    info!(redirect_uri = %google_config.redirect_uri, "OAuth client configured");
    let oauth = Arc::new(OAuthClient::new(google_config)?);

    let service = Arc::new(CertificateService::new(server_config));
    let state = AppState::new(
        service,
        Arc::new(GoogleConnector::new(oauth.clone())),
        oauth,
    );

    let signals = SignalHandler::new();
    signals.spawn_listener();
    certflow_server::serve(state, signals.shutdown().wait()).await?;
    Ok(())
}
