//! Request and response bodies of the dashboard API.
//!
//! Requests accept both the camelCase field names and the snake_case names
//! the original dashboard form posts (`sheet_name`, `sheet_ID`, ...).
//! Every field is optional at the serde level so that a missing field is
//! reported by [`validate`](CreateBatchRequest::validate) with its name
//! instead of a generic parse failure.

use std::fmt;

use certflow_core::BatchReport;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ProtocolError, ProtocolResult};

/// Query parameters the OAuth relay carries through the `state` parameter.
pub const RELAY_PARAMS: [&str; 5] = ["sheet", "event", "tempFolder", "slideTemplate", "sheetId"];

/// OAuth tokens supplied by the caller with every batch request.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    #[serde(alias = "access_token")]
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "refresh_token")]
    pub refresh_token: Option<String>,
}

impl Credentials {
    /// Creates credentials from an access token and optional refresh token.
    pub fn new(access_token: impl Into<String>, refresh_token: Option<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token,
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_token", &"***")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "***"),
            )
            .finish()
    }
}

/// Spreadsheet and tab a batch operates on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetTarget {
    pub spreadsheet_id: String,
    pub sheet_name: String,
}

fn required(value: Option<String>, field: &'static str) -> ProtocolResult<String> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ProtocolError::missing(field)),
    }
}

fn required_credentials(value: Option<Credentials>) -> ProtocolResult<Credentials> {
    match value {
        Some(c) if !c.access_token.is_empty() => Ok(c),
        _ => Err(ProtocolError::missing("credentials")),
    }
}

/// Body of `POST /api/create-certificates`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBatchRequest {
    #[serde(default, alias = "token")]
    pub credentials: Option<Credentials>,
    #[serde(default, alias = "sheet_name")]
    pub sheet_name: Option<String>,
    #[serde(default, alias = "sheet_ID")]
    pub spreadsheet_id: Option<String>,
    #[serde(default, alias = "slide_template_id")]
    pub template_id: Option<String>,
    #[serde(default, alias = "temp_folder_id")]
    pub destination_container_id: Option<String>,
    #[serde(default, alias = "delete_old")]
    pub delete_existing_in_destination: bool,
}

/// A validated create request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateBatch {
    pub credentials: Credentials,
    pub target: SheetTarget,
    pub template_id: String,
    pub destination_id: String,
    pub purge_destination: bool,
}

impl CreateBatchRequest {
    /// Checks required fields, credentials first.
    pub fn validate(self) -> ProtocolResult<CreateBatch> {
        let credentials = required_credentials(self.credentials)?;
        Ok(CreateBatch {
            credentials,
            target: SheetTarget {
                sheet_name: required(self.sheet_name, "sheetName")?,
                spreadsheet_id: required(self.spreadsheet_id, "spreadsheetId")?,
            },
            template_id: required(self.template_id, "templateId")?,
            destination_id: required(self.destination_container_id, "destinationContainerId")?,
            purge_destination: self.delete_existing_in_destination,
        })
    }
}

/// Body of `POST /api/send-certificates`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendBatchRequest {
    #[serde(default, alias = "token")]
    pub credentials: Option<Credentials>,
    #[serde(default, alias = "sheet_name")]
    pub sheet_name: Option<String>,
    #[serde(default, alias = "sheet_ID")]
    pub spreadsheet_id: Option<String>,
    #[serde(default, alias = "event_name")]
    pub event_name: Option<String>,
}

/// A validated send request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendBatch {
    pub credentials: Credentials,
    pub target: SheetTarget,
    pub event_name: String,
}

impl SendBatchRequest {
    /// Checks required fields. Sheet fields are checked before credentials,
    /// matching the order the dashboard reports them.
    pub fn validate(self) -> ProtocolResult<SendBatch> {
        let sheet_name = required(self.sheet_name, "sheetName")?;
        let event_name = required(self.event_name, "eventName")?;
        let spreadsheet_id = required(self.spreadsheet_id, "spreadsheetId")?;
        let credentials = required_credentials(self.credentials)?;
        Ok(SendBatch {
            credentials,
            target: SheetTarget {
                spreadsheet_id,
                sheet_name,
            },
            event_name,
        })
    }
}

/// Body of `POST /api/get-sheet-data`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetDataRequest {
    #[serde(default, alias = "token")]
    pub credentials: Option<Credentials>,
    #[serde(default, alias = "sheet_name")]
    pub sheet_name: Option<String>,
    #[serde(default, alias = "sheet_ID")]
    pub spreadsheet_id: Option<String>,
}

impl SheetDataRequest {
    pub fn validate(self) -> ProtocolResult<(Credentials, SheetTarget)> {
        let credentials = required_credentials(self.credentials)?;
        Ok((
            credentials,
            SheetTarget {
                sheet_name: required(self.sheet_name, "sheetName")?,
                spreadsheet_id: required(self.spreadsheet_id, "spreadsheetId")?,
            },
        ))
    }
}

/// Body of `POST /api/upload`. Credentials come from the session cookies.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadRequest {
    #[serde(default, alias = "sheet_name")]
    pub sheet_name: Option<String>,
    #[serde(default, alias = "sheet_ID")]
    pub spreadsheet_id: Option<String>,
    #[serde(default)]
    pub data: Vec<Value>,
}

/// A validated upload: a sheet target plus the grid to write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upload {
    pub target: SheetTarget,
    /// Header row followed by data rows.
    pub grid: Vec<Vec<String>>,
}

impl UploadRequest {
    /// Converts JSON objects into a grid.
    ///
    /// The header is the key order of the first object; later objects are
    /// projected onto it and missing keys become empty cells.
    pub fn validate(self) -> ProtocolResult<Upload> {
        let target = SheetTarget {
            sheet_name: required(self.sheet_name, "sheetName")?,
            spreadsheet_id: required(self.spreadsheet_id, "spreadsheetId")?,
        };

        let first = self.data.first().ok_or(ProtocolError::EmptyUpload)?;
        let header: Vec<String> = first
            .as_object()
            .ok_or(ProtocolError::InvalidUploadRow { index: 0 })?
            .keys()
            .cloned()
            .collect();

        let mut grid = Vec::with_capacity(self.data.len() + 1);
        grid.push(header.clone());
        for (index, row) in self.data.iter().enumerate() {
            let object = row
                .as_object()
                .ok_or(ProtocolError::InvalidUploadRow { index })?;
            grid.push(
                header
                    .iter()
                    .map(|key| object.get(key).map(cell_text).unwrap_or_default())
                    .collect(),
            );
        }

        Ok(Upload { target, grid })
    }
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Successful create run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBatchResponse {
    pub created_count: usize,
    pub message: String,
    #[serde(flatten)]
    pub report: BatchReport,
}

/// Successful send run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendBatchResponse {
    pub sent_count: usize,
    pub message: String,
    #[serde(flatten)]
    pub report: BatchReport,
}

/// Raw sheet rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SheetDataResponse {
    pub data: Vec<Vec<String>>,
    pub message: String,
}

/// Generic acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Body of `GET /api/auth/status`.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthStatus {
    pub logged_in: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

impl fmt::Debug for AuthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthStatus")
            .field("logged_in", &self.logged_in)
            .finish_non_exhaustive()
    }
}

/// Machine-readable error category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// The request was malformed or incomplete.
    BadRequest,
    /// A required sheet column is absent.
    MissingColumn,
    /// The sheet returned no rows.
    SourceUnavailable,
    /// Credentials were rejected; the caller should log in again.
    AuthExpired,
    /// Another run holds the lease for this spreadsheet.
    RunInProgress,
    /// An external service call failed.
    AdapterFailure,
    /// The batch deadline elapsed.
    DeadlineExceeded,
    /// Unexpected server-side failure.
    Internal,
}

/// Error body returned by every endpoint.
///
/// A batch that stopped part-way also carries the report of the rows it
/// reached; their outcomes were persisted before the error was returned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: ErrorCode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report: Option<BatchReport>,
}

impl ErrorResponse {
    pub fn new(code: ErrorCode, error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code,
            report: None,
        }
    }

    pub fn with_report(mut self, report: BatchReport) -> Self {
        self.report = Some(report);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn create_request_accepts_dashboard_field_names() {
        let body = json!({
            "token": { "accessToken": "ya29.a", "refreshToken": "1//r" },
            "sheet_name": "Sheet1",
            "sheet_ID": "sheet-id",
            "slide_template_id": "tmpl",
            "temp_folder_id": "folder",
            "delete_old": true
        });
        let request: CreateBatchRequest = serde_json::from_value(body).unwrap();
        let batch = request.validate().unwrap();
        assert_eq!(batch.target.sheet_name, "Sheet1");
        assert_eq!(batch.target.spreadsheet_id, "sheet-id");
        assert_eq!(batch.template_id, "tmpl");
        assert_eq!(batch.destination_id, "folder");
        assert!(batch.purge_destination);
        assert_eq!(batch.credentials.refresh_token.as_deref(), Some("1//r"));
    }

    #[test]
    fn create_request_camel_case() {
        let body = json!({
            "credentials": { "access_token": "a" },
            "sheetName": "S",
            "spreadsheetId": "id",
            "templateId": "t",
            "destinationContainerId": "d"
        });
        let batch = serde_json::from_value::<CreateBatchRequest>(body)
            .unwrap()
            .validate()
            .unwrap();
        assert!(!batch.purge_destination);
        assert!(batch.credentials.refresh_token.is_none());
    }

    #[test]
    fn missing_credentials_reported_first() {
        let err = CreateBatchRequest::default().validate().unwrap_err();
        assert_eq!(err, ProtocolError::missing("credentials"));
    }

    #[test]
    fn blank_fields_count_as_missing() {
        let request = SendBatchRequest {
            credentials: Some(Credentials::new("a", None)),
            sheet_name: Some("Sheet1".into()),
            spreadsheet_id: Some("id".into()),
            event_name: Some("   ".into()),
        };
        assert_eq!(
            request.validate().unwrap_err(),
            ProtocolError::missing("eventName")
        );
    }

    #[test]
    fn send_request_checks_sheet_fields_before_credentials() {
        let request = SendBatchRequest {
            sheet_name: Some("Sheet1".into()),
            event_name: Some("Meetup".into()),
            spreadsheet_id: None,
            credentials: None,
        };
        assert_eq!(
            request.validate().unwrap_err(),
            ProtocolError::missing("spreadsheetId")
        );
    }

    #[test]
    fn upload_projects_rows_onto_first_keys() {
        let request: UploadRequest = serde_json::from_value(json!({
            "sheetName": "Sheet1",
            "spreadsheetId": "id",
            "data": [
                { "Name": "Ada", "Email": "ada@example.com", "Score": 3 },
                { "Email": "bob@example.com", "Name": "Bob", "Extra": "x" },
                { "Name": null }
            ]
        }))
        .unwrap();

        let upload = request.validate().unwrap();
        assert_eq!(
            upload.grid,
            vec![
                vec!["Name", "Email", "Score"],
                vec!["Ada", "ada@example.com", "3"],
                vec!["Bob", "bob@example.com", ""],
                vec!["", "", ""],
            ]
        );
    }

    #[test]
    fn empty_upload_rejected() {
        let request = UploadRequest {
            sheet_name: Some("S".into()),
            spreadsheet_id: Some("id".into()),
            data: Vec::new(),
        };
        assert_eq!(request.validate().unwrap_err(), ProtocolError::EmptyUpload);
    }

    #[test]
    fn credentials_debug_is_redacted() {
        let creds = Credentials::new("secret-access", Some("secret-refresh".into()));
        let debug = format!("{:?}", creds);
        assert!(!debug.contains("secret"));
    }

    #[test]
    fn error_response_shape() {
        let err = ErrorResponse::new(ErrorCode::MissingColumn, "required column missing: 'Status'");
        insta::assert_json_snapshot!(err, @r#"
        {
          "error": "required column missing: 'Status'",
          "code": "missing_column"
        }
        "#);
    }

    #[test]
    fn create_response_flattens_report() {
        let mut report = BatchReport::begin();
        report.push(
            2,
            "Ada",
            certflow_core::RowStatus::Succeeded {
                reference: "slide-1".into(),
            },
        );
        let response = CreateBatchResponse {
            created_count: 1,
            message: "1 certificate created".into(),
            report,
        };
        insta::assert_json_snapshot!(response, {
            ".startedAt" => "[time]",
            ".finishedAt" => "[time]",
        }, @r#"
        {
          "createdCount": 1,
          "message": "1 certificate created",
          "startedAt": "[time]",
          "finishedAt": "[time]",
          "rows": [
            {
              "row": 2,
              "name": "Ada",
              "status": "succeeded",
              "reference": "slide-1"
            }
          ]
        }
        "#);
    }

    #[test]
    fn auth_status_omits_absent_tokens() {
        let status = AuthStatus::default();
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json, json!({ "loggedIn": false }));
    }
}
