//! Dashboard HTTP API.
//!
//! | route                        | method |
//! |------------------------------|--------|
//! | `/api/auth/start`            | GET    |
//! | `/api/auth/callback`         | GET    |
//! | `/api/auth/status`           | GET    |
//! | `/api/create-certificates`   | POST   |
//! | `/api/send-certificates`     | POST   |
//! | `/api/get-sheet-data`        | POST   |
//! | `/api/upload`                | POST   |
//! | `/api/health`                | GET    |
//! | `/`                          | GET    |
//!
//! Batch routes take credentials from the body and fall back to the session
//! cookies; upload only reads the cookies.

use std::future::Future;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::header::{LOCATION, SET_COOKIE};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use certflow_protocol::{
    AuthStatus, CreateBatchRequest, CreateBatchResponse, Credentials, MessageResponse,
    RELAY_PARAMS, SendBatchRequest, SendBatchResponse, SheetDataRequest, SheetDataResponse,
    UploadRequest,
};
use certflow_providers::google::{OAuthClient, PkceFlow, RelayState, TokenSet};
use certflow_providers::{BoxFuture, ProviderResult};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use crate::cookies::{self, ACCESS_TOKEN, CookieJar, FLOW_MAX_AGE, OAUTH_FLOW, REFRESH_TOKEN};
use crate::error::{ServerError, ServerResult};
use crate::service::{CertificateService, WorkspaceConnector};

const DASHBOARD_HTML: &str = include_str!("../assets/dashboard.html");

/// The OAuth half of the login flow.
pub trait Authorizer: Send + Sync {
    fn authorization_url(&self, pkce: &PkceFlow, state: &RelayState) -> String;

    fn exchange_code<'a>(
        &'a self,
        code: &'a str,
        verifier: &'a str,
    ) -> BoxFuture<'a, ProviderResult<TokenSet>>;
}

impl Authorizer for OAuthClient {
    fn authorization_url(&self, pkce: &PkceFlow, state: &RelayState) -> String {
        OAuthClient::authorization_url(self, pkce, state)
    }

    fn exchange_code<'a>(
        &'a self,
        code: &'a str,
        verifier: &'a str,
    ) -> BoxFuture<'a, ProviderResult<TokenSet>> {
        Box::pin(OAuthClient::exchange_code(self, code, verifier))
    }
}

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    service: Arc<CertificateService>,
    connector: Arc<dyn WorkspaceConnector>,
    authorizer: Arc<dyn Authorizer>,
    cookies: CookieJar,
}

impl AppState {
    pub fn new(
        service: Arc<CertificateService>,
        connector: Arc<dyn WorkspaceConnector>,
        authorizer: Arc<dyn Authorizer>,
    ) -> Self {
        let cookies = CookieJar::new(service.config().secure_cookies);
        Self {
            service,
            connector,
            authorizer,
            cookies,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(dashboard))
        .route("/api/health", get(health))
        .route("/api/auth/start", get(auth_start))
        .route("/api/auth/callback", get(auth_callback))
        .route("/api/auth/status", get(auth_status))
        .route("/api/create-certificates", post(create_certificates))
        .route("/api/send-certificates", post(send_certificates))
        .route("/api/get-sheet-data", post(get_sheet_data))
        .route("/api/upload", post(upload))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serves the dashboard until `shutdown` completes.
pub async fn serve<F>(state: AppState, shutdown: F) -> ServerResult<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = state.service.config().bind_addr;
    let listener = TcpListener::bind(addr).await?;
    info!("dashboard listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    info!("dashboard stopped");
    Ok(())
}

async fn dashboard() -> Html<&'static str> {
    Html(DASHBOARD_HTML)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn auth_start(
    State(state): State<AppState>,
    Query(query): Query<Vec<(String, String)>>,
) -> ServerResult<Response> {
    let pkce = PkceFlow::new();
    let relay = RelayState::capture(
        pkce.nonce.clone(),
        query.iter().map(|(k, v)| (k.as_str(), v.as_str())),
        &RELAY_PARAMS,
    );
    let url = state.authorizer.authorization_url(&pkce, &relay);
    debug!(relayed = relay.params.len(), "redirecting to consent screen");

    let flow_cookie = state
        .cookies
        .set(OAUTH_FLOW, &pkce.to_cookie_value(), Some(FLOW_MAX_AGE))
        .map_err(|e| ServerError::config(e.to_string()))?;
    redirect(&url, vec![flow_cookie])
}

#[derive(Debug, Deserialize)]
struct CallbackQuery {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

async fn auth_callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<CallbackQuery>,
) -> ServerResult<Response> {
    if let Some(error) = query.error {
        return Err(ServerError::oauth_callback(format!("consent denied: {}", error)));
    }
    let code = query
        .code
        .ok_or_else(|| ServerError::oauth_callback("missing code"))?;
    let relay = query
        .state
        .as_deref()
        .map(RelayState::decode)
        .transpose()
        .map_err(|e| ServerError::oauth_callback(e.message().to_string()))?
        .ok_or_else(|| ServerError::oauth_callback("missing state"))?;
    let flow = cookies::get(&headers, OAUTH_FLOW)
        .and_then(|value| PkceFlow::from_cookie_value(&value))
        .ok_or_else(|| ServerError::oauth_callback("login flow expired, start again"))?;
    if flow.nonce != relay.nonce {
        return Err(ServerError::oauth_callback("state does not match this login"));
    }

    let tokens = state
        .authorizer
        .exchange_code(&code, &flow.verifier)
        .await?;
    info!(expires_at = ?tokens.expires_at, "login completed");

    let jar = state.cookies;
    let mut set = vec![jar.set(ACCESS_TOKEN, &tokens.access_token, None)];
    if let Some(ref refresh) = tokens.refresh_token {
        set.push(jar.set(REFRESH_TOKEN, refresh, None));
    }
    set.push(jar.clear(OAUTH_FLOW));
    let set = set
        .into_iter()
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ServerError::config(e.to_string()))?;

    let query = relay.query();
    let location = if query.is_empty() {
        "/".to_string()
    } else {
        format!("/?{}", query)
    };
    redirect(&location, set)
}

async fn auth_status(headers: HeaderMap) -> Json<AuthStatus> {
    let status = match cookies::credentials(&headers) {
        Some(credentials) => AuthStatus {
            logged_in: true,
            access_token: Some(credentials.access_token),
            refresh_token: credentials.refresh_token,
        },
        None => AuthStatus::default(),
    };
    Json(status)
}

async fn create_certificates(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<CreateBatchRequest>, JsonRejection>,
) -> ServerResult<Json<CreateBatchResponse>> {
    let Json(mut request) = body?;
    fill_credentials(&mut request.credentials, &headers);
    let request = request.validate()?;
    let workspace = state.connector.connect(&request.credentials)?;
    Ok(Json(state.service.create_batch(&workspace, request).await?))
}

async fn send_certificates(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<SendBatchRequest>, JsonRejection>,
) -> ServerResult<Json<SendBatchResponse>> {
    let Json(mut request) = body?;
    fill_credentials(&mut request.credentials, &headers);
    let request = request.validate()?;
    let workspace = state.connector.connect(&request.credentials)?;
    Ok(Json(state.service.send_batch(&workspace, request).await?))
}

async fn get_sheet_data(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<SheetDataRequest>, JsonRejection>,
) -> ServerResult<Json<SheetDataResponse>> {
    let Json(mut request) = body?;
    fill_credentials(&mut request.credentials, &headers);
    let (credentials, target) = request.validate()?;
    let workspace = state.connector.connect(&credentials)?;
    Ok(Json(state.service.sheet_data(&workspace, &target).await?))
}

async fn upload(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<UploadRequest>, JsonRejection>,
) -> ServerResult<Json<MessageResponse>> {
    let credentials = cookies::credentials(&headers).ok_or(ServerError::NotLoggedIn)?;
    let Json(request) = body?;
    let upload = request.validate()?;
    let workspace = state.connector.connect(&credentials)?;
    Ok(Json(state.service.upload(&workspace, upload).await?))
}

fn fill_credentials(slot: &mut Option<Credentials>, headers: &HeaderMap) {
    if slot.is_none() {
        *slot = cookies::credentials(headers);
    }
}

fn redirect(location: &str, cookies: Vec<HeaderValue>) -> ServerResult<Response> {
    let location =
        HeaderValue::from_str(location).map_err(|e| ServerError::config(e.to_string()))?;
    let mut response = StatusCode::FOUND.into_response();
    let headers = response.headers_mut();
    headers.insert(LOCATION, location);
    for cookie in cookies {
        headers.append(SET_COOKIE, cookie);
    }
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BatchConfig, ServerConfig};
    use crate::testing::{Fakes, MemoryDocuments, MemorySheets};
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use axum::http::header::{CONTENT_TYPE, COOKIE};
    use certflow_core::RetryPolicy;
    use certflow_providers::{ProviderError, Workspace};
    use std::sync::Mutex;
    use tower::ServiceExt;

    struct FixedConnector {
        workspace: Workspace,
        seen: Mutex<Vec<Credentials>>,
    }

    impl WorkspaceConnector for FixedConnector {
        fn connect(&self, credentials: &Credentials) -> ServerResult<Workspace> {
            self.seen.lock().unwrap().push(credentials.clone());
            Ok(self.workspace.clone())
        }
    }

    struct StubAuthorizer;

    impl Authorizer for StubAuthorizer {
        fn authorization_url(&self, pkce: &PkceFlow, state: &RelayState) -> String {
            format!(
                "https://auth.test/?challenge={}&state={}",
                pkce.challenge,
                urlencoding::encode(&state.encode())
            )
        }

        fn exchange_code<'a>(
            &'a self,
            code: &'a str,
            _verifier: &'a str,
        ) -> BoxFuture<'a, ProviderResult<TokenSet>> {
            Box::pin(async move {
                if code == "good" {
                    Ok(TokenSet::new("at-1", Some("rt-1".into()), Some(3600), vec![]))
                } else {
                    Err(ProviderError::authentication("invalid_grant"))
                }
            })
        }
    }

    struct Harness {
        fakes: Fakes,
        connector: Arc<FixedConnector>,
        app: Router,
    }

    fn harness(rows: &[&[&str]]) -> Harness {
        let fakes = Fakes::new(
            MemorySheets::with_grid(rows),
            MemoryDocuments::with_file("tpl", "Template", "templates", "Receiver Name"),
        );
        let connector = Arc::new(FixedConnector {
            workspace: fakes.workspace(),
            seen: Mutex::new(Vec::new()),
        });
        let config = ServerConfig::default()
            .with_batch(BatchConfig::default().with_retry(RetryPolicy::none()));
        let state = AppState::new(
            Arc::new(CertificateService::new(config)),
            connector.clone(),
            Arc::new(StubAuthorizer),
        );
        Harness {
            fakes,
            connector,
            app: router(state),
        }
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::post(uri)
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn set_cookies(response: &Response) -> Vec<String> {
        response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .map(|v| v.to_str().unwrap().to_string())
            .collect()
    }

    const HEADER: &[&str] = &["Name", "Email", "Date", "Description", "Slide ID", "Status"];

    #[tokio::test]
    async fn health_and_dashboard() {
        let h = harness(&[HEADER]);
        let response = h
            .app
            .clone()
            .oneshot(Request::get("/api/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await, json!({ "status": "ok" }));

        let response = h
            .app
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn create_returns_count_and_rows() {
        let h = harness(&[
            HEADER,
            &["Ada", "ada@example.com", "d", "x", "", ""],
            &["Bob", "bob@example.com", "d", "y", "s", "CREATED"],
        ]);
        let body = json!({
            "token": { "accessToken": "at" },
            "sheet_name": "Attendees",
            "sheet_ID": "sheet-1",
            "slide_template_id": "tpl",
            "temp_folder_id": "out"
        });

        let response = h
            .app
            .oneshot(post_json("/api/create-certificates", body))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["createdCount"], 1);
        assert_eq!(json["rows"][0]["status"], "succeeded");
        assert_eq!(json["rows"][1]["status"], "already_complete");
        assert_eq!(h.fakes.sheets.cell(5, 1), "CREATED");
    }

    #[tokio::test]
    async fn missing_field_is_rejected_before_connecting() {
        let h = harness(&[HEADER]);
        let body = json!({ "credentials": { "accessToken": "at" }, "sheetName": "Attendees" });

        let response = h
            .app
            .oneshot(post_json("/api/send-certificates", body))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = json_body(response).await;
        assert_eq!(json["code"], "bad_request");
        assert!(h.connector.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn malformed_body_uses_error_shape() {
        let h = harness(&[HEADER]);
        let request = Request::post("/api/create-certificates")
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();

        let response = h.app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["code"], "bad_request");
    }

    #[tokio::test]
    async fn missing_column_maps_to_400() {
        let h = harness(&[&["Name", "Email", "Date", "Slide ID"], &["Ada", "a@x", "d", "s"]]);
        let body = json!({
            "credentials": { "accessToken": "at" },
            "sheetName": "Attendees",
            "spreadsheetId": "sheet-1",
            "eventName": "Hack Night"
        });

        let response = h
            .app
            .oneshot(post_json("/api/send-certificates", body))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = json_body(response).await;
        assert_eq!(json["code"], "missing_column");
        assert!(h.fakes.mailer.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn sheet_data_falls_back_to_cookies() {
        let h = harness(&[HEADER, &["Ada"]]);
        let request = Request::post("/api/get-sheet-data")
            .header(CONTENT_TYPE, "application/json")
            .header(COOKIE, "access_token=cookie-at; refresh_token=cookie-rt")
            .body(Body::from(
                json!({ "sheetName": "Attendees", "spreadsheetId": "sheet-1" }).to_string(),
            ))
            .unwrap();

        let response = h.app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["data"][1][0], "Ada");
        let seen = h.connector.seen.lock().unwrap();
        assert_eq!(seen[0].access_token, "cookie-at");
        assert_eq!(seen[0].refresh_token.as_deref(), Some("cookie-rt"));
    }

    #[tokio::test]
    async fn upload_requires_session_cookie() {
        let h = harness(&[HEADER]);
        let body = json!({
            "sheetName": "Attendees",
            "spreadsheetId": "sheet-1",
            "data": [{ "Name": "Ada" }]
        });

        let response = h
            .app
            .clone()
            .oneshot(post_json("/api/upload", body.clone()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let request = Request::post("/api/upload")
            .header(CONTENT_TYPE, "application/json")
            .header(COOKIE, "access_token=at")
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = h.app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(h.fakes.sheets.cell(0, 0), "Name");
        assert_eq!(h.fakes.sheets.cell(0, 1), "Ada");
    }

    #[tokio::test]
    async fn auth_status_reflects_cookies() {
        let h = harness(&[HEADER]);
        let response = h
            .app
            .clone()
            .oneshot(Request::get("/api/auth/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(json_body(response).await, json!({ "loggedIn": false }));

        let request = Request::get("/api/auth/status")
            .header(COOKIE, "access_token=at")
            .body(Body::empty())
            .unwrap();
        let response = h.app.oneshot(request).await.unwrap();
        assert_eq!(
            json_body(response).await,
            json!({ "loggedIn": true, "accessToken": "at" })
        );
    }

    #[tokio::test]
    async fn login_round_trip_relays_query() {
        let h = harness(&[HEADER]);

        let start = h
            .app
            .clone()
            .oneshot(
                Request::get("/api/auth/start?sheet=Attendees&event=Hack%20Night&other=x")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(start.status(), StatusCode::FOUND);
        let location = start.headers()[LOCATION].to_str().unwrap().to_string();
        assert!(location.starts_with("https://auth.test/"));
        let flow_cookie = set_cookies(&start)
            .into_iter()
            .find(|c| c.starts_with("oauth_flow="))
            .unwrap();
        let flow_value = flow_cookie
            .split(';')
            .next()
            .unwrap()
            .trim_start_matches("oauth_flow=")
            .to_string();
        let state = url::Url::parse(&location)
            .unwrap()
            .query_pairs()
            .find(|(k, _)| k == "state")
            .map(|(_, v)| v.into_owned())
            .unwrap();

        let callback = Request::get(format!(
            "/api/auth/callback?code=good&state={}",
            urlencoding::encode(&state)
        ))
        .header(COOKIE, format!("oauth_flow={}", flow_value))
        .body(Body::empty())
        .unwrap();
        let response = h.app.oneshot(callback).await.unwrap();

        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(
            response.headers()[LOCATION],
            "/?sheet=Attendees&event=Hack+Night"
        );
        let cookies = set_cookies(&response);
        assert!(cookies.iter().any(|c| c.starts_with("access_token=at-1;")));
        assert!(cookies.iter().any(|c| c.starts_with("refresh_token=rt-1;")));
        assert!(cookies.iter().any(|c| c.starts_with("oauth_flow=;") && c.contains("Max-Age=0")));
    }

    #[tokio::test]
    async fn callback_rejects_foreign_state() {
        let h = harness(&[HEADER]);
        let flow = PkceFlow::new();
        let request = Request::get("/api/auth/callback?code=good&state=other-nonce.sheet%3DX")
            .header(COOKIE, format!("oauth_flow={}", flow.to_cookie_value()))
            .body(Body::empty())
            .unwrap();

        let response = h.app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(set_cookies(&response).is_empty());
    }

    #[tokio::test]
    async fn failed_exchange_is_unauthorized() {
        let h = harness(&[HEADER]);
        let flow = PkceFlow::new();
        let request = Request::get(format!(
            "/api/auth/callback?code=bad&state={}.",
            flow.nonce
        ))
        .header(COOKIE, format!("oauth_flow={}", flow.to_cookie_value()))
        .body(Body::empty())
        .unwrap();

        let response = h.app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(response).await["code"], "auth_expired");
    }
}
