//! One-shot batch commands: `create`, `send`, `sheet show`, `sheet upload`.
//!
//! They run the same service as the dashboard, with tokens from the
//! command line instead of cookies.

use std::fmt::Write as _;
use std::path::Path;
use std::sync::Arc;

use certflow_core::{BatchReport, RowStatus};
use certflow_protocol::{
    CreateBatchRequest, Credentials, SendBatchRequest, SheetDataRequest, UploadRequest,
};
use certflow_providers::Workspace;
use certflow_providers::google::OAuthClient;
use certflow_server::{
    CREATE_COLUMNS, CertificateService, GoogleConnector, SEND_COLUMNS, ServerError,
    WorkspaceConnector, check_columns,
};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::cli::{GoogleArgs, RunKind, SheetArgs, TokenArgs};
use crate::config::CertflowConfig;
use crate::error::{ClientError, ClientResult};

struct Session {
    service: CertificateService,
    workspace: Workspace,
    credentials: Credentials,
}

fn connect(config: &CertflowConfig, google: &GoogleArgs, tokens: &TokenArgs) -> ClientResult<Session> {
    let oauth = Arc::new(OAuthClient::new(config.google_config(google)?)?);
    let credentials = Credentials::new(tokens.access_token.clone(), tokens.refresh_token.clone());
    let workspace = GoogleConnector::new(oauth).connect(&credentials)?;
    debug!(refresh = credentials.refresh_token.is_some(), "connected to Google Workspace");
    Ok(Session {
        service: CertificateService::new(config.to_server_config()),
        workspace,
        credentials,
    })
}

#[allow(clippy::too_many_arguments)]
pub async fn create(
    config: &CertflowConfig,
    google: &GoogleArgs,
    sheet: SheetArgs,
    tokens: TokenArgs,
    template_id: String,
    destination_id: String,
    purge: bool,
    json: bool,
) -> ClientResult<()> {
    let session = connect(config, google, &tokens)?;
    let request = CreateBatchRequest {
        credentials: Some(session.credentials.clone()),
        sheet_name: Some(sheet.sheet_name),
        spreadsheet_id: Some(sheet.spreadsheet_id),
        template_id: Some(template_id),
        destination_container_id: Some(destination_id),
        delete_existing_in_destination: purge,
    }
    .validate()?;

    let result = session.service.create_batch(&session.workspace, request).await;
    let response = finish(result)?;
    if json {
        print_json(&response)?;
    } else {
        print!("{}", render_report(&response.report));
        println!("{}", response.message);
    }
    Ok(())
}

pub async fn send(
    config: &CertflowConfig,
    google: &GoogleArgs,
    sheet: SheetArgs,
    tokens: TokenArgs,
    event_name: String,
    json: bool,
) -> ClientResult<()> {
    let session = connect(config, google, &tokens)?;
    let request = SendBatchRequest {
        credentials: Some(session.credentials.clone()),
        sheet_name: Some(sheet.sheet_name),
        spreadsheet_id: Some(sheet.spreadsheet_id),
        event_name: Some(event_name),
    }
    .validate()?;

    let result = session.service.send_batch(&session.workspace, request).await;
    let response = finish(result)?;
    if json {
        print_json(&response)?;
    } else {
        print!("{}", render_report(&response.report));
        println!("{}", response.message);
    }
    Ok(())
}

pub async fn show(
    config: &CertflowConfig,
    google: &GoogleArgs,
    sheet: SheetArgs,
    tokens: TokenArgs,
    check: Option<RunKind>,
    json: bool,
) -> ClientResult<()> {
    let session = connect(config, google, &tokens)?;
    let (_, target) = SheetDataRequest {
        credentials: Some(session.credentials.clone()),
        sheet_name: Some(sheet.sheet_name),
        spreadsheet_id: Some(sheet.spreadsheet_id),
    }
    .validate()?;

    let response = session.service.sheet_data(&session.workspace, &target).await?;
    if json {
        print_json(&response.data)?;
    } else {
        for row in &response.data {
            println!("{}", row.join("\t"));
        }
    }

    if let Some(kind) = check {
        let required = match kind {
            RunKind::Create => CREATE_COLUMNS,
            RunKind::Send => SEND_COLUMNS,
        };
        check_columns(&session.workspace, &target, required).await?;
        eprintln!("all columns for a {:?} run are present", kind);
    }
    Ok(())
}

pub async fn upload(
    config: &CertflowConfig,
    google: &GoogleArgs,
    sheet: SheetArgs,
    tokens: TokenArgs,
    file: &Path,
) -> ClientResult<()> {
    let data = read_rows(file)?;
    let upload = UploadRequest {
        sheet_name: Some(sheet.sheet_name),
        spreadsheet_id: Some(sheet.spreadsheet_id),
        data,
    }
    .validate()?;

    let session = connect(config, google, &tokens)?;
    let response = session.service.upload(&session.workspace, upload).await?;
    println!("{}", response.message);
    Ok(())
}

/// Reads a JSON array of row objects.
fn read_rows(file: &Path) -> ClientResult<Vec<Value>> {
    let content = std::fs::read_to_string(file)?;
    match serde_json::from_str(&content)? {
        Value::Array(rows) => Ok(rows),
        _ => Err(ClientError::config(format!(
            "{} must contain a JSON array of objects",
            file.display()
        ))),
    }
}

/// Prints the partial report of an interrupted run before failing.
fn finish<T>(result: Result<T, ServerError>) -> ClientResult<T> {
    result.map_err(|e| {
        if let Some(report) = e.report() {
            eprint!("{}", render_report(report));
        }
        ClientError::from(e)
    })
}

fn print_json<T: Serialize>(value: &T) -> ClientResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// One line per row, aligned for a terminal.
pub fn render_report(report: &BatchReport) -> String {
    let width = report
        .rows
        .iter()
        .map(|r| r.name.chars().count())
        .max()
        .unwrap_or(0)
        .max(4);
    let mut out = String::new();
    for line in &report.rows {
        let (status, detail) = match line.status {
            RowStatus::Succeeded { ref reference } => ("done", reference.as_str()),
            RowStatus::Skipped { ref reason } => ("skipped", reason.as_str()),
            RowStatus::AlreadyComplete => ("complete", ""),
            RowStatus::Failed { ref error } => ("FAILED", error.as_str()),
        };
        let _ = writeln!(
            out,
            "{:>5}  {:<width$}  {:<8}  {}",
            line.row,
            line.name,
            status,
            detail,
            width = width
        );
    }
    if let Some(ref reason) = report.aborted {
        let _ = writeln!(out, "stopped: {}", reason);
    }
    out
}
