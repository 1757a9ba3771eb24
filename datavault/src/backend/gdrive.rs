//! Google Drive provider (Drive v3 REST API).
//!
//! Folders are file objects with the folder MIME type and string IDs; the
//! global root is addressed with the `root` alias. Authentication uses an
//! OAuth client secret file plus a previously authorized token file, with
//! access tokens refreshed through the `refresh_token` grant.

use super::{RemoteEntry, RemoteKind, RemoteProvider};
use crate::utils::{DataVaultError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::io::ReaderStream;
use tracing::debug;

pub const DEFAULT_API_URL: &str = "https://www.googleapis.com";
pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

const PROVIDER: &str = "Google Drive";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Access tokens this close to expiry are refreshed before use
const EXPIRY_MARGIN_SECS: i64 = 60;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Longest silence tolerated on a connection. There is no total timeout
/// so large uploads can stream for as long as they keep making progress.
const READ_TIMEOUT: Duration = Duration::from_secs(60);

/// OAuth client secret as downloaded from the Google Cloud console
#[derive(Debug, Clone, Deserialize)]
pub struct ClientSecret {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

#[derive(Debug, Deserialize)]
struct CredentialsFile {
    installed: Option<ClientSecret>,
    web: Option<ClientSecret>,
}

/// Previously authorized token (`token.json`)
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StoredToken {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expiry: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
struct AccessToken {
    value: String,
    expires_at: Option<DateTime<Utc>>,
}

impl AccessToken {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(at) => at - chrono::Duration::seconds(EXPIRY_MARGIN_SECS) > now,
            None => true,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveFile {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    mime_type: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct NewFile<'a> {
    name: &'a str,
    mime_type: &'a str,
    parents: [&'a str; 1],
}

#[derive(Debug, Deserialize)]
struct GoogleErrorBody {
    error: GoogleError,
}

#[derive(Debug, Deserialize)]
struct GoogleError {
    #[serde(default)]
    message: String,
}

/// Google Drive client
#[derive(Debug)]
pub struct GoogleDriveClient {
    http: Client,
    api_url: String,
    secret: ClientSecret,
    refresh_token: Option<String>,
    token: Mutex<Option<AccessToken>>,
}

impl GoogleDriveClient {
    pub fn new(secret: ClientSecret, token: StoredToken, api_url: &str) -> Result<Self> {
        if token.access_token.is_none() && token.refresh_token.is_none() {
            return Err(DataVaultError::Authentication(
                "token file holds neither an access token nor a refresh token".into(),
            ));
        }

        let http = http_client(READ_TIMEOUT)?;

        let access = token.access_token.map(|value| AccessToken {
            value,
            expires_at: token.expiry.filter(|at| at.timestamp() > 0),
        });

        Ok(Self {
            http,
            api_url: api_url.trim_end_matches('/').to_string(),
            secret,
            refresh_token: token.refresh_token,
            token: Mutex::new(access),
        })
    }

    /// Load the client secret and authorized token from disk.
    pub fn from_files(credentials_file: &Path, token_file: &Path, api_url: &str) -> Result<Self> {
        let raw = std::fs::read_to_string(credentials_file).map_err(|e| {
            DataVaultError::Authentication(format!(
                "failed to read credentials file {}: {}",
                credentials_file.display(),
                e
            ))
        })?;
        let credentials: CredentialsFile = serde_json::from_str(&raw)?;
        let secret = credentials
            .installed
            .or(credentials.web)
            .ok_or_else(|| {
                DataVaultError::Authentication(
                    "credentials file has no \"installed\" or \"web\" client section".into(),
                )
            })?;

        let raw = std::fs::read_to_string(token_file).map_err(|e| {
            DataVaultError::Authentication(format!(
                "no usable token file at {} ({}); authorize DataVault and save the token there",
                token_file.display(),
                e
            ))
        })?;
        let token: StoredToken = serde_json::from_str(&raw)?;

        Self::new(secret, token, api_url)
    }

    /// Current access token, refreshed when missing or about to expire.
    async fn access_token(&self) -> Result<String> {
        let mut guard = self.token.lock().await;
        if let Some(token) = guard.as_ref().filter(|t| t.is_fresh(Utc::now())) {
            return Ok(token.value.clone());
        }

        let refresh_token = self.refresh_token.as_deref().ok_or_else(|| {
            DataVaultError::Authentication(
                "access token expired and no refresh token available".into(),
            )
        })?;

        debug!("Refreshing Google Drive access token");
        let resp = self
            .http
            .post(&self.secret.token_uri)
            .form(&[
                ("client_id", self.secret.client_id.as_str()),
                ("client_secret", self.secret.client_secret.as_str()),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(DataVaultError::Authentication(format!(
                "token refresh failed with status {}: {}",
                status, body
            )));
        }

        let refreshed: TokenResponse = resp.json().await?;
        let token = AccessToken {
            value: refreshed.access_token,
            expires_at: refreshed
                .expires_in
                .map(|secs| Utc::now() + chrono::Duration::seconds(secs)),
        };
        let value = token.value.clone();
        *guard = Some(token);
        Ok(value)
    }

    fn files_url(&self) -> String {
        format!("{}/drive/v3/files", self.api_url)
    }

    async fn create_object(&self, parent: &str, name: &str, mime_type: &str) -> Result<String> {
        let token = self.access_token().await?;
        let resp = self
            .http
            .post(self.files_url())
            .bearer_auth(token)
            .query(&[("fields", "id")])
            .json(&NewFile {
                name,
                mime_type,
                parents: [parent],
            })
            .send()
            .await?;

        let created: DriveFile = check(resp).await?.json().await?;
        Ok(created.id)
    }

    /// Open a resumable upload session and return its URL.
    ///
    /// Nothing is created in Drive until the content is sent to that URL.
    async fn start_upload_session(
        &self,
        parent: &str,
        name: &str,
        mime_type: &str,
        size: u64,
    ) -> Result<String> {
        let token = self.access_token().await?;
        let resp = self
            .http
            .post(format!("{}/upload/drive/v3/files", self.api_url))
            .bearer_auth(token)
            .query(&[("uploadType", "resumable"), ("fields", "id")])
            .header("X-Upload-Content-Type", mime_type)
            .header("X-Upload-Content-Length", size)
            .json(&NewFile {
                name,
                mime_type,
                parents: [parent],
            })
            .send()
            .await?;

        let resp = check(resp).await?;
        resp.headers()
            .get(reqwest::header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| DataVaultError::Api {
                provider: PROVIDER,
                code: i64::from(resp.status().as_u16()),
                message: format!("upload session for {} returned no Location", name),
            })
    }
}

fn http_client(read_timeout: Duration) -> Result<Client> {
    Ok(Client::builder()
        .user_agent(concat!("datavault/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(CONNECT_TIMEOUT)
        .read_timeout(read_timeout)
        .build()?)
}

/// Turn a non-success response into an API error carrying Google's message.
async fn check(resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let body = resp.text().await.unwrap_or_default();
    let message = serde_json::from_str::<GoogleErrorBody>(&body)
        .map(|b| b.error.message)
        .unwrap_or(body);

    Err(DataVaultError::Api {
        provider: PROVIDER,
        code: i64::from(status.as_u16()),
        message,
    })
}

/// Guess a MIME type from the file extension
pub fn detect_mime_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "txt" => "text/plain",
        "pdf" => "application/pdf",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "json" => "application/json",
        _ => "application/octet-stream",
    }
}

#[async_trait]
impl RemoteProvider for GoogleDriveClient {
    type Id = String;

    fn name(&self) -> &str {
        PROVIDER
    }

    fn global_root(&self) -> String {
        "root".to_string()
    }

    async fn list_children(&self, parent: &String) -> Result<Vec<RemoteEntry<String>>> {
        let query = format!("'{}' in parents and trashed=false", parent);
        let mut entries = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let token = self.access_token().await?;
            let mut request = self
                .http
                .get(self.files_url())
                .bearer_auth(token)
                .query(&[
                    ("q", query.as_str()),
                    ("fields", "nextPageToken, files(id, name, mimeType)"),
                    ("pageSize", "1000"),
                ]);
            if let Some(page) = &page_token {
                request = request.query(&[("pageToken", page.as_str())]);
            }

            let list: FileList = check(request.send().await?).await?.json().await?;
            entries.extend(list.files.into_iter().map(|f| RemoteEntry {
                kind: if f.mime_type == FOLDER_MIME_TYPE {
                    RemoteKind::Folder
                } else {
                    RemoteKind::File
                },
                id: f.id,
                name: f.name,
            }));

            match list.next_page_token {
                Some(next) if !next.is_empty() => page_token = Some(next),
                _ => break,
            }
        }

        Ok(entries)
    }

    async fn create_folder(&self, parent: &String, name: &str) -> Result<String> {
        self.create_object(parent, name, FOLDER_MIME_TYPE).await
    }

    async fn upload_file(&self, parent: &String, name: &str, local_path: &Path) -> Result<u64> {
        let file = tokio::fs::File::open(local_path).await?;
        let size = file.metadata().await?.len();
        let mime_type = detect_mime_type(local_path);

        let session = self
            .start_upload_session(parent, name, mime_type, size)
            .await?;

        let token = self.access_token().await?;
        let body = reqwest::Body::wrap_stream(ReaderStream::new(file));
        let resp = self
            .http
            .put(session)
            .bearer_auth(token)
            .header(reqwest::header::CONTENT_TYPE, mime_type)
            .body(body)
            .send()
            .await?;
        let uploaded: DriveFile = check(resp).await?.json().await?;

        debug!("Uploaded {} to Drive as {}", name, uploaded.id);
        Ok(size)
    }
}
