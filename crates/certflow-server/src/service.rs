//! Certificate operations behind the dashboard routes and the CLI.
//!
//! Each batch operation holds a [`RunLease`](crate::lease::RunLease) on the
//! spreadsheet, loads the sheet, resolves the columns it needs, and only
//! then starts calling the document and mail services.

use std::sync::Arc;

use certflow_core::{ColumnIndex, SubstitutionTable, Table, a1, columns};
use certflow_protocol::{
    CreateBatch, CreateBatchResponse, Credentials, MessageResponse, SendBatch, SendBatchResponse,
    SheetDataResponse, SheetTarget, Upload,
};
use certflow_providers::Workspace;
use certflow_providers::google::{GoogleWorkspaceClient, OAuthClient};
use tracing::{info, instrument};

use crate::adapters::{CreateCertificate, DeliverCertificate};
use crate::batch::{BatchProcessor, Gate};
use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::lease::{RunLease, RunLeases};
use crate::writer::ReconciliationWriter;

/// Columns a create run reads or writes.
pub const CREATE_COLUMNS: &[&str] = &[
    columns::NAME,
    columns::DATE,
    columns::DESCRIPTION,
    columns::SLIDE_ID,
    columns::STATUS,
];

/// Columns a send run reads or writes.
pub const SEND_COLUMNS: &[&str] = &[
    columns::NAME,
    columns::EMAIL,
    columns::DATE,
    columns::SLIDE_ID,
    columns::STATUS,
];

/// Binds request credentials to service clients.
pub trait WorkspaceConnector: Send + Sync {
    fn connect(&self, credentials: &Credentials) -> ServerResult<Workspace>;
}

/// Connects to Google Workspace, refreshing through the shared OAuth client.
#[derive(Debug, Clone)]
pub struct GoogleConnector {
    oauth: Arc<OAuthClient>,
}

impl GoogleConnector {
    pub fn new(oauth: Arc<OAuthClient>) -> Self {
        Self { oauth }
    }
}

impl WorkspaceConnector for GoogleConnector {
    fn connect(&self, credentials: &Credentials) -> ServerResult<Workspace> {
        let client = GoogleWorkspaceClient::connect(
            self.oauth.clone(),
            credentials.access_token.clone(),
            credentials.refresh_token.clone(),
        )?;
        Ok(client.into_workspace())
    }
}

pub struct CertificateService {
    config: ServerConfig,
    processor: BatchProcessor,
    leases: RunLeases,
}

impl CertificateService {
    pub fn new(config: ServerConfig) -> Self {
        let processor = BatchProcessor::new(config.batch.clone());
        Self {
            config,
            processor,
            leases: RunLeases::new(),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn leases(&self) -> &RunLeases {
        &self.leases
    }

    /// Creates a deck for every row not yet CREATED or SENT.
    #[instrument(skip_all, fields(spreadsheet = %request.target.spreadsheet_id, sheet = %request.target.sheet_name))]
    pub async fn create_batch(
        &self,
        workspace: &Workspace,
        request: CreateBatch,
    ) -> ServerResult<CreateBatchResponse> {
        let _lease = self.lease(&request.target)?;
        let table = load_table(workspace, &request.target).await?;
        let index = table.column_index(CREATE_COLUMNS)?;
        let writer =
            ReconciliationWriter::for_create(workspace.sheets.clone(), &request.target, &index)?;

        if request.purge_destination {
            self.purge(workspace, &request.destination_id).await?;
        }

        let handler = CreateCertificate::new(
            workspace.documents.clone(),
            request.template_id,
            request.destination_id,
            SubstitutionTable::certificate(&self.config.certificate),
        );
        let run = self
            .processor
            .run(&table, &index, Gate::CREATE, &handler, &writer)
            .await?;

        let created_count = run.report.succeeded();
        let message = if created_count == 0 {
            "No certificates to create".to_string()
        } else {
            format!("Created {} certificate(s)", created_count)
        };
        info!(created_count, "create batch complete");
        Ok(CreateBatchResponse {
            created_count,
            message,
            report: run.report,
        })
    }

    /// Mails the PDF of every created deck not yet SENT.
    #[instrument(skip_all, fields(spreadsheet = %request.target.spreadsheet_id, sheet = %request.target.sheet_name))]
    pub async fn send_batch(
        &self,
        workspace: &Workspace,
        request: SendBatch,
    ) -> ServerResult<SendBatchResponse> {
        let _lease = self.lease(&request.target)?;
        let table = load_table(workspace, &request.target).await?;
        let index = table.column_index(SEND_COLUMNS)?;
        let writer =
            ReconciliationWriter::for_send(workspace.sheets.clone(), &request.target, &index)?;

        let handler = DeliverCertificate::new(
            workspace.documents.clone(),
            workspace.delivery.clone(),
            request.event_name,
            self.config.mail.clone(),
        );
        let run = self
            .processor
            .run(&table, &index, Gate::SEND, &handler, &writer)
            .await?;

        let sent_count = run.report.succeeded();
        let message = if sent_count == 0 {
            "No certificates to send".to_string()
        } else {
            format!("Sent {} certificate(s)", sent_count)
        };
        info!(sent_count, "send batch complete");
        Ok(SendBatchResponse {
            sent_count,
            message,
            report: run.report,
        })
    }

    /// Returns the raw rows of a sheet, header included.
    pub async fn sheet_data(
        &self,
        workspace: &Workspace,
        target: &SheetTarget,
    ) -> ServerResult<SheetDataResponse> {
        let data = workspace
            .sheets
            .read_range(&target.spreadsheet_id, &a1::full_sheet(&target.sheet_name))
            .await?;
        Ok(SheetDataResponse {
            data,
            message: "Sheet data fetched successfully".to_string(),
        })
    }

    /// Replaces the sheet contents with an uploaded grid.
    #[instrument(skip_all, fields(spreadsheet = %upload.target.spreadsheet_id, rows = upload.grid.len()))]
    pub async fn upload(&self, workspace: &Workspace, upload: Upload) -> ServerResult<MessageResponse> {
        let _lease = self.lease(&upload.target)?;
        let target = &upload.target;
        workspace
            .sheets
            .clear_range(&target.spreadsheet_id, &a1::full_sheet(&target.sheet_name))
            .await?;
        workspace
            .sheets
            .update_range(
                &target.spreadsheet_id,
                &a1::anchor(&target.sheet_name),
                &upload.grid,
            )
            .await?;
        info!("sheet replaced from upload");
        Ok(MessageResponse::new(
            "Data uploaded to Google Sheet successfully",
        ))
    }

    fn lease(&self, target: &SheetTarget) -> ServerResult<RunLease> {
        self.leases
            .acquire(&target.spreadsheet_id)
            .ok_or_else(|| ServerError::run_in_progress(&target.spreadsheet_id))
    }

    async fn purge(&self, workspace: &Workspace, folder_id: &str) -> ServerResult<()> {
        let files = workspace.documents.list_children(folder_id).await?;
        info!(count = files.len(), folder_id, "purging destination folder");
        for file in &files {
            workspace.documents.delete(&file.id).await?;
        }
        Ok(())
    }
}

async fn load_table(workspace: &Workspace, target: &SheetTarget) -> ServerResult<Table> {
    let rows = workspace
        .sheets
        .read_range(&target.spreadsheet_id, &a1::full_sheet(&target.sheet_name))
        .await?;
    Ok(Table::from_rows(&target.sheet_name, rows)?)
}

/// Resolves `required` against a sheet without running anything.
pub async fn check_columns(
    workspace: &Workspace,
    target: &SheetTarget,
    required: &[&str],
) -> ServerResult<ColumnIndex> {
    let table = load_table(workspace, target).await?;
    Ok(table.column_index(required)?)
}
