//! pCloud provider.
//!
//! Folders are addressed by numeric IDs with `0` as the account root. Every
//! response carries a `result` code (0 on success) next to its payload, so a
//! 200 response can still be an API error.

use super::{RemoteEntry, RemoteKind, RemoteProvider};
use crate::utils::{DataVaultError, Result};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tokio_util::io::ReaderStream;
use tracing::debug;

pub const DEFAULT_API_URL: &str = "https://api.pcloud.com";

const PROVIDER: &str = "pCloud";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    result: i64,
    #[serde(default)]
    error: Option<String>,
    metadata: Option<T>,
}

impl<T> ApiResponse<T> {
    fn into_metadata(self) -> Result<T> {
        if self.result != 0 {
            return Err(DataVaultError::Api {
                provider: PROVIDER,
                code: self.result,
                message: self.error.unwrap_or_default(),
            });
        }
        self.metadata.ok_or_else(|| DataVaultError::Api {
            provider: PROVIDER,
            code: self.result,
            message: "response carried no metadata".into(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct FolderMetadata {
    #[serde(default)]
    name: String,
    #[serde(default)]
    folderid: Option<u64>,
    #[serde(default)]
    fileid: Option<u64>,
    #[serde(default)]
    isfolder: bool,
    #[serde(default)]
    contents: Vec<FolderMetadata>,
}

#[derive(Debug, Deserialize)]
struct UploadedFile {
    #[serde(default)]
    name: String,
}

/// pCloud client
#[derive(Debug, Clone)]
pub struct PCloudClient {
    http: Client,
    api_url: String,
    access_token: String,
}

impl PCloudClient {
    pub fn new(access_token: &str, api_url: &str) -> Result<Self> {
        if access_token.trim().is_empty() {
            return Err(DataVaultError::Authentication("pCloud access token is empty".into()));
        }

        let http = Client::builder()
            .user_agent(concat!("datavault/", env!("CARGO_PKG_VERSION")))
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            http,
            api_url: api_url.trim_end_matches('/').to_string(),
            access_token: access_token.to_string(),
        })
    }

    /// Call a GET method and unwrap its `metadata` payload.
    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: &[(&str, String)],
    ) -> Result<T> {
        let resp = self
            .http
            .get(format!("{}/{}", self.api_url, method))
            .query(&[("access_token", self.access_token.as_str())])
            .query(params)
            .send()
            .await?;

        decode(resp).await
    }
}

async fn decode<T: DeserializeOwned>(resp: Response) -> Result<T> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(DataVaultError::Api {
            provider: PROVIDER,
            code: i64::from(status.as_u16()),
            message: body,
        });
    }

    let body = resp.bytes().await?;
    serde_json::from_slice::<ApiResponse<T>>(&body)?.into_metadata()
}

#[async_trait]
impl RemoteProvider for PCloudClient {
    type Id = u64;

    fn name(&self) -> &str {
        PROVIDER
    }

    fn global_root(&self) -> u64 {
        0
    }

    async fn list_children(&self, parent: &u64) -> Result<Vec<RemoteEntry<u64>>> {
        let folder: FolderMetadata = self
            .call("listfolder", &[("folderid", parent.to_string())])
            .await?;

        Ok(folder
            .contents
            .into_iter()
            .map(|item| RemoteEntry {
                id: if item.isfolder {
                    item.folderid.unwrap_or_default()
                } else {
                    item.fileid.unwrap_or_default()
                },
                kind: if item.isfolder {
                    RemoteKind::Folder
                } else {
                    RemoteKind::File
                },
                name: item.name,
            })
            .collect())
    }

    async fn create_folder(&self, parent: &u64, name: &str) -> Result<u64> {
        let folder: FolderMetadata = self
            .call(
                "createfolder",
                &[("folderid", parent.to_string()), ("name", name.to_string())],
            )
            .await?;

        folder.folderid.ok_or_else(|| DataVaultError::Api {
            provider: PROVIDER,
            code: 0,
            message: format!("createfolder returned no folder id for {}", name),
        })
    }

    async fn upload_file(&self, parent: &u64, name: &str, local_path: &Path) -> Result<u64> {
        let file = tokio::fs::File::open(local_path).await?;
        let size = file.metadata().await?.len();

        let body = reqwest::Body::wrap_stream(ReaderStream::new(file));
        let part = Part::stream_with_length(body, size).file_name(name.to_string());
        let form = Form::new()
            .text("access_token", self.access_token.clone())
            .text("folderid", parent.to_string())
            .part("file", part);

        let resp = self
            .http
            .post(format!("{}/uploadfile", self.api_url))
            .multipart(form)
            .send()
            .await?;

        let uploaded: Vec<UploadedFile> = decode(resp).await?;
        if uploaded.is_empty() {
            return Err(DataVaultError::Api {
                provider: PROVIDER,
                code: 0,
                message: format!("uploadfile accepted no file for {}", name),
            });
        }

        debug!("Uploaded {} to pCloud folder {}", uploaded[0].name, parent);
        Ok(size)
    }
}
