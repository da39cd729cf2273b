//! REST client for Sheets v4, Drive v3, Slides v1 and Gmail v1.
//!
//! One client is built per request from the caller's credentials. Every
//! call goes through [`GoogleWorkspaceClient::execute`], which maps HTTP
//! statuses to [`ProviderError`] codes and, on a 401, refreshes the access
//! token once and replays the request.

use std::sync::Arc;

use certflow_core::{RangeUpdate, TextReplacement};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::api::{
    BoxFuture, DeliveryApi, DocumentApi, DriveFile, OutgoingMessage, SpreadsheetApi, Workspace,
};
use crate::error::{ProviderError, ProviderResult, Service};

use super::config::GoogleConfig;
use super::mime;
use super::oauth::OAuthClient;
use super::tokens::GoogleSession;

const SHEETS_API_BASE: &str = "https://sheets.googleapis.com/v4/spreadsheets";
const DRIVE_API_BASE: &str = "https://www.googleapis.com/drive/v3/files";
const SLIDES_API_BASE: &str = "https://slides.googleapis.com/v1/presentations";
const GMAIL_API_BASE: &str = "https://gmail.googleapis.com/gmail/v1/users/me";

/// Page size for folder listings.
const LIST_PAGE_SIZE: &str = "100";

/// Google Workspace client bound to one set of credentials.
#[derive(Debug, Clone)]
pub struct GoogleWorkspaceClient {
    http_client: reqwest::Client,
    session: Arc<GoogleSession>,
}

impl GoogleWorkspaceClient {
    pub fn new(config: &GoogleConfig, session: GoogleSession) -> ProviderResult<Self> {
        Ok(Self {
            http_client: config.http_client()?,
            session: Arc::new(session),
        })
    }

    /// Builds a client that refreshes through `oauth` when a refresh token is given.
    pub fn connect(
        oauth: Arc<OAuthClient>,
        access_token: impl Into<String>,
        refresh_token: Option<String>,
    ) -> ProviderResult<Self> {
        let config = oauth.config().clone();
        let session = GoogleSession::new(access_token, refresh_token).with_oauth(oauth);
        Self::new(&config, session)
    }

    /// Exposes the client through the three service traits.
    pub fn into_workspace(self) -> Workspace {
        let client = Arc::new(self);
        Workspace {
            sheets: client.clone(),
            documents: client.clone(),
            delivery: client,
        }
    }

    async fn execute<F>(&self, service: Service, build: F) -> ProviderResult<reqwest::Response>
    where
        F: Fn(&reqwest::Client, &str) -> reqwest::RequestBuilder,
    {
        let token = self.session.access_token().await;
        let response = send(build(&self.http_client, &token), service).await?;

        if response.status() == StatusCode::UNAUTHORIZED && self.session.can_refresh() {
            debug!(%service, "access token rejected, refreshing");
            let fresh = self
                .session
                .refresh(&token)
                .await
                .map_err(|e| e.with_service(service))?;
            let retry = send(build(&self.http_client, &fresh), service).await?;
            return check_status(retry, service).await;
        }

        check_status(response, service).await
    }

    async fn execute_json<T, F>(&self, service: Service, build: F) -> ProviderResult<T>
    where
        T: DeserializeOwned,
        F: Fn(&reqwest::Client, &str) -> reqwest::RequestBuilder,
    {
        let response = self.execute(service, build).await?;
        let body = response.text().await.map_err(|e| {
            ProviderError::network(format!("failed to read response: {}", e)).with_service(service)
        })?;
        serde_json::from_str(&body).map_err(|e| {
            ProviderError::invalid_response(format!("failed to parse response: {}", e))
                .with_service(service)
        })
    }

    async fn get_values(&self, spreadsheet_id: &str, range: &str) -> ProviderResult<Vec<Vec<String>>> {
        let url = format!(
            "{}/{}/values/{}",
            SHEETS_API_BASE,
            urlencoding::encode(spreadsheet_id),
            urlencoding::encode(range)
        );
        let value_range: ValueRange = self
            .execute_json(Service::Sheets, |http, token| http.get(&url).bearer_auth(token))
            .await?;
        debug!(range, rows = value_range.values.len(), "read range");
        Ok(value_range.into_strings())
    }

    async fn batch_update_values(
        &self,
        spreadsheet_id: &str,
        updates: &[RangeUpdate],
    ) -> ProviderResult<()> {
        if updates.is_empty() {
            return Ok(());
        }
        let url = format!(
            "{}/{}/values:batchUpdate",
            SHEETS_API_BASE,
            urlencoding::encode(spreadsheet_id)
        );
        let body = batch_update_body(updates);
        self.execute(Service::Sheets, |http, token| http.post(&url).bearer_auth(token).json(&body))
            .await?;
        debug!(ranges = updates.len(), "wrote ranges");
        Ok(())
    }

    async fn clear_values(&self, spreadsheet_id: &str, range: &str) -> ProviderResult<()> {
        let url = format!(
            "{}/{}/values/{}:clear",
            SHEETS_API_BASE,
            urlencoding::encode(spreadsheet_id),
            urlencoding::encode(range)
        );
        self.execute(Service::Sheets, |http, token| {
            http.post(&url).bearer_auth(token).json(&serde_json::json!({}))
        })
        .await?;
        Ok(())
    }

    async fn put_values(
        &self,
        spreadsheet_id: &str,
        range: &str,
        values: &[Vec<String>],
    ) -> ProviderResult<()> {
        let url = format!(
            "{}/{}/values/{}",
            SHEETS_API_BASE,
            urlencoding::encode(spreadsheet_id),
            urlencoding::encode(range)
        );
        let body = ValueRangeBody { range: None, values };
        self.execute(Service::Sheets, |http, token| {
            http.put(&url)
                .bearer_auth(token)
                .query(&[("valueInputOption", "RAW")])
                .json(&body)
        })
        .await?;
        Ok(())
    }

    async fn copy_file(&self, source_id: &str, parent_id: &str, name: &str) -> ProviderResult<String> {
        let url = format!("{}/{}/copy", DRIVE_API_BASE, urlencoding::encode(source_id));
        let body = CopyRequest {
            name,
            parents: [parent_id],
        };
        let file: FileId = self
            .execute_json(Service::Drive, |http, token| {
                http.post(&url)
                    .bearer_auth(token)
                    .query(&[("supportsAllDrives", "true")])
                    .json(&body)
            })
            .await?;
        debug!(source_id, new_id = %file.id, "copied file");
        Ok(file.id)
    }

    async fn replace_all_text(
        &self,
        presentation_id: &str,
        replacements: &[TextReplacement],
    ) -> ProviderResult<()> {
        if replacements.is_empty() {
            return Ok(());
        }
        let url = format!(
            "{}/{}:batchUpdate",
            SLIDES_API_BASE,
            urlencoding::encode(presentation_id)
        );
        let body = replace_text_body(replacements);
        self.execute(Service::Slides, |http, token| http.post(&url).bearer_auth(token).json(&body))
            .await?;
        Ok(())
    }

    async fn export_file(&self, file_id: &str, mime_type: &str) -> ProviderResult<Vec<u8>> {
        let url = format!("{}/{}/export", DRIVE_API_BASE, urlencoding::encode(file_id));
        let response = self
            .execute(Service::Drive, |http, token| {
                http.get(&url)
                    .bearer_auth(token)
                    .query(&[("mimeType", mime_type)])
            })
            .await?;
        let bytes = response.bytes().await.map_err(|e| {
            ProviderError::network(format!("failed to read export: {}", e)).with_service(Service::Drive)
        })?;
        debug!(file_id, bytes = bytes.len(), "exported file");
        Ok(bytes.to_vec())
    }

    async fn list_folder(&self, folder_id: &str) -> ProviderResult<Vec<DriveFile>> {
        let query = format!(
            "'{}' in parents and trashed = false",
            folder_id.replace('\\', "\\\\").replace('\'', "\\'")
        );
        let mut files = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let page: FileList = self
                .execute_json(Service::Drive, |http, token| {
                    let mut request = http.get(DRIVE_API_BASE).bearer_auth(token).query(&[
                        ("q", query.as_str()),
                        ("fields", "nextPageToken, files(id, name)"),
                        ("pageSize", LIST_PAGE_SIZE),
                        ("supportsAllDrives", "true"),
                        ("includeItemsFromAllDrives", "true"),
                    ]);
                    if let Some(ref t) = page_token {
                        request = request.query(&[("pageToken", t.as_str())]);
                    }
                    request
                })
                .await?;

            files.extend(page.files.into_iter().map(|f| DriveFile {
                id: f.id,
                name: f.name,
            }));

            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        debug!(folder_id, count = files.len(), "listed folder");
        Ok(files)
    }

    async fn delete_file(&self, file_id: &str) -> ProviderResult<()> {
        let url = format!("{}/{}", DRIVE_API_BASE, urlencoding::encode(file_id));
        self.execute(Service::Drive, |http, token| {
            http.delete(&url)
                .bearer_auth(token)
                .query(&[("supportsAllDrives", "true")])
        })
        .await?;
        Ok(())
    }

    async fn send_message(&self, message: &OutgoingMessage) -> ProviderResult<String> {
        let url = format!("{}/messages/send", GMAIL_API_BASE);
        let body = RawMessage {
            raw: mime::encode_raw(message),
        };
        let sent: MessageId = self
            .execute_json(Service::Gmail, |http, token| http.post(&url).bearer_auth(token).json(&body))
            .await?;
        debug!(message_id = %sent.id, "sent message");
        Ok(sent.id)
    }
}

impl SpreadsheetApi for GoogleWorkspaceClient {
    fn read_range<'a>(
        &'a self,
        spreadsheet_id: &'a str,
        range: &'a str,
    ) -> BoxFuture<'a, ProviderResult<Vec<Vec<String>>>> {
        Box::pin(self.get_values(spreadsheet_id, range))
    }

    fn write_ranges<'a>(
        &'a self,
        spreadsheet_id: &'a str,
        updates: &'a [RangeUpdate],
    ) -> BoxFuture<'a, ProviderResult<()>> {
        Box::pin(self.batch_update_values(spreadsheet_id, updates))
    }

    fn clear_range<'a>(
        &'a self,
        spreadsheet_id: &'a str,
        range: &'a str,
    ) -> BoxFuture<'a, ProviderResult<()>> {
        Box::pin(self.clear_values(spreadsheet_id, range))
    }

    fn update_range<'a>(
        &'a self,
        spreadsheet_id: &'a str,
        range: &'a str,
        values: &'a [Vec<String>],
    ) -> BoxFuture<'a, ProviderResult<()>> {
        Box::pin(self.put_values(spreadsheet_id, range, values))
    }
}

impl DocumentApi for GoogleWorkspaceClient {
    fn duplicate<'a>(
        &'a self,
        source_id: &'a str,
        parent_id: &'a str,
        name: &'a str,
    ) -> BoxFuture<'a, ProviderResult<String>> {
        Box::pin(self.copy_file(source_id, parent_id, name))
    }

    fn substitute_text<'a>(
        &'a self,
        document_id: &'a str,
        replacements: &'a [TextReplacement],
    ) -> BoxFuture<'a, ProviderResult<()>> {
        Box::pin(self.replace_all_text(document_id, replacements))
    }

    fn export_as<'a>(
        &'a self,
        document_id: &'a str,
        mime_type: &'a str,
    ) -> BoxFuture<'a, ProviderResult<Vec<u8>>> {
        Box::pin(self.export_file(document_id, mime_type))
    }

    fn list_children<'a>(
        &'a self,
        folder_id: &'a str,
    ) -> BoxFuture<'a, ProviderResult<Vec<DriveFile>>> {
        Box::pin(self.list_folder(folder_id))
    }

    fn delete<'a>(&'a self, file_id: &'a str) -> BoxFuture<'a, ProviderResult<()>> {
        Box::pin(self.delete_file(file_id))
    }
}

impl DeliveryApi for GoogleWorkspaceClient {
    fn send<'a>(&'a self, message: &'a OutgoingMessage) -> BoxFuture<'a, ProviderResult<String>> {
        Box::pin(self.send_message(message))
    }
}

async fn send(request: reqwest::RequestBuilder, service: Service) -> ProviderResult<reqwest::Response> {
    request.send().await.map_err(|e| {
        let err = if e.is_timeout() {
            ProviderError::network("request timeout")
        } else if e.is_connect() {
            ProviderError::network(format!("connection failed: {}", e))
        } else {
            ProviderError::network(format!("request failed: {}", e))
        };
        err.with_service(service)
    })
}

async fn check_status(
    response: reqwest::Response,
    service: Service,
) -> ProviderResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let retry_after = response
        .headers()
        .get("Retry-After")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<u64>().ok());
    let body = response.text().await.unwrap_or_default();
    Err(error_for_status(status, retry_after, &body)
        .with_status(status.as_u16())
        .with_service(service))
}

/// Maps a non-success status to an error code.
///
/// Google reports quota exhaustion as 403 with a `rateLimitExceeded`
/// reason, so those are treated as rate limiting.
fn error_for_status(status: StatusCode, retry_after: Option<u64>, body: &str) -> ProviderError {
    match status {
        StatusCode::UNAUTHORIZED => ProviderError::authentication("access token expired or invalid"),
        StatusCode::FORBIDDEN if body.contains("ateLimitExceeded") => {
            ProviderError::rate_limited(format!("quota exceeded: {}", body))
        }
        StatusCode::FORBIDDEN => ProviderError::authorization(format!("access denied: {}", body)),
        StatusCode::NOT_FOUND => ProviderError::not_found(format!("not found: {}", body)),
        StatusCode::TOO_MANY_REQUESTS => ProviderError::rate_limited(format!(
            "rate limit exceeded{}",
            retry_after
                .map(|s| format!(", retry after {} seconds", s))
                .unwrap_or_default()
        )),
        s if s.is_client_error() => ProviderError::bad_request(format!("API error ({}): {}", s, body)),
        s => ProviderError::server(format!("API error ({}): {}", s, body)),
    }
}

#[derive(Debug, Default, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

impl ValueRange {
    fn into_strings(self) -> Vec<Vec<String>> {
        self.values
            .into_iter()
            .map(|row| {
                row.into_iter()
                    .map(|cell| match cell {
                        Value::String(s) => s,
                        Value::Null => String::new(),
                        other => other.to_string(),
                    })
                    .collect()
            })
            .collect()
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ValueRangeBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    range: Option<&'a str>,
    values: &'a [Vec<String>],
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BatchUpdateValues<'a> {
    value_input_option: &'static str,
    data: Vec<ValueRangeBody<'a>>,
}

fn batch_update_body(updates: &[RangeUpdate]) -> BatchUpdateValues<'_> {
    BatchUpdateValues {
        value_input_option: "RAW",
        data: updates
            .iter()
            .map(|u| ValueRangeBody {
                range: Some(&u.range),
                values: &u.values,
            })
            .collect(),
    }
}

fn replace_text_body(replacements: &[TextReplacement]) -> Value {
    let requests: Vec<Value> = replacements
        .iter()
        .map(|r| {
            serde_json::json!({
                "replaceAllText": {
                    "containsText": { "text": r.find, "matchCase": r.match_case },
                    "replaceText": r.replace_with,
                }
            })
        })
        .collect();
    serde_json::json!({ "requests": requests })
}

#[derive(Debug, Serialize)]
struct CopyRequest<'a> {
    name: &'a str,
    parents: [&'a str; 1],
}

#[derive(Debug, Deserialize)]
struct FileId {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileList {
    #[serde(default)]
    files: Vec<FileEntry>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FileEntry {
    id: String,
    #[serde(default)]
    name: String,
}

#[derive(Debug, Serialize)]
struct RawMessage {
    raw: String,
}

#[derive(Debug, Deserialize)]
struct MessageId {
    id: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderErrorCode;
    use crate::google::config::OAuthCredentials;
    use serde_json::json;

    #[test]
    fn status_mapping() {
        let code = |s, body| error_for_status(s, None, body).code();
        assert_eq!(code(StatusCode::UNAUTHORIZED, ""), ProviderErrorCode::AuthenticationFailed);
        assert_eq!(code(StatusCode::FORBIDDEN, "{}"), ProviderErrorCode::AuthorizationFailed);
        assert_eq!(
            code(StatusCode::FORBIDDEN, r#"{"reason":"userRateLimitExceeded"}"#),
            ProviderErrorCode::RateLimited
        );
        assert_eq!(code(StatusCode::NOT_FOUND, ""), ProviderErrorCode::NotFound);
        assert_eq!(code(StatusCode::BAD_REQUEST, ""), ProviderErrorCode::BadRequest);
        assert_eq!(code(StatusCode::BAD_GATEWAY, ""), ProviderErrorCode::ServerError);
    }

    #[test]
    fn rate_limit_message_includes_retry_after() {
        let err = error_for_status(StatusCode::TOO_MANY_REQUESTS, Some(7), "");
        assert!(err.is_retryable());
        assert!(err.message().contains("retry after 7 seconds"));
    }

    #[test]
    fn value_range_cells_become_strings() {
        let range: ValueRange = serde_json::from_value(json!({
            "range": "'Sheet1'!A1:Z3",
            "values": [["Name", "Score"], ["Ada", 3], ["Bob", null]]
        }))
        .unwrap();
        assert_eq!(
            range.into_strings(),
            vec![vec!["Name", "Score"], vec!["Ada", "3"], vec!["Bob", ""]]
        );
    }

    #[test]
    fn value_range_without_values_is_empty() {
        let range: ValueRange = serde_json::from_value(json!({ "range": "'S'!A1:Z" })).unwrap();
        assert!(range.into_strings().is_empty());
    }

    #[test]
    fn batch_update_body_shape() {
        let updates = vec![RangeUpdate {
            range: "'Sheet1'!E2:E3".into(),
            values: vec![vec!["CREATED".into()], vec!["CREATED".into()]],
        }];
        let body = serde_json::to_value(batch_update_body(&updates)).unwrap();
        assert_eq!(
            body,
            json!({
                "valueInputOption": "RAW",
                "data": [{ "range": "'Sheet1'!E2:E3", "values": [["CREATED"], ["CREATED"]] }]
            })
        );
    }

    #[test]
    fn replace_text_body_keeps_order() {
        let body = replace_text_body(&[
            TextReplacement::exact("Receiver Name", "Ada"),
            TextReplacement::exact("Team Name", "CSI"),
        ]);
        let requests = body["requests"].as_array().unwrap();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0]["replaceAllText"]["containsText"]["text"], "Receiver Name");
        assert_eq!(requests[0]["replaceAllText"]["containsText"]["matchCase"], true);
        assert_eq!(requests[1]["replaceAllText"]["replaceText"], "CSI");
    }

    #[test]
    fn copy_request_shape() {
        let body = serde_json::to_value(CopyRequest {
            name: "Ada",
            parents: ["folder"],
        })
        .unwrap();
        assert_eq!(body, json!({ "name": "Ada", "parents": ["folder"] }));
    }

    #[test]
    fn into_workspace_shares_client() {
        let config = GoogleConfig::new(OAuthCredentials::new(
            "id.apps.googleusercontent.com",
            "secret",
        ));
        let client = GoogleWorkspaceClient::new(&config, GoogleSession::new("token", None)).unwrap();
        let workspace = client.into_workspace();
        assert_eq!(format!("{:?}", workspace), "Workspace { .. }");
    }
}
