//! Azure Blob Storage backend over the REST API
//!
//! Blobs are named `assessments/<owner|anonymous>/<YYYYMMDD>/<uuid>.<ext>` and
//! the locator is the blob URL. Requests are authorized with a SharedKey
//! signature, or with a SAS token when the connection string carries one.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::{Method, StatusCode};
use sha2::Sha256;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{sanitize_segment, BlobStore, StorageError};

const API_VERSION: &str = "2021-08-06";
const BLOB_CONTENT_TYPE: &str = "application/octet-stream";
const REQUEST_TIMEOUT_SECS: u64 = 120;

type HmacSha256 = Hmac<Sha256>;

#[derive(Clone)]
enum Credential {
    SharedKey { account: String, key: Vec<u8> },
    Sas(String),
}

pub struct AzureBlobStore {
    http_client: reqwest::Client,
    endpoint: String,
    container: String,
    credential: Credential,
}

impl std::fmt::Debug for AzureBlobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AzureBlobStore")
            .field("endpoint", &self.endpoint)
            .field("container", &self.container)
            .finish_non_exhaustive()
    }
}

/// Parse `Key=Value;Key=Value` pairs; values may themselves contain `=`
fn parse_connection_string(raw: &str) -> HashMap<String, String> {
    raw.split(';')
        .filter_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            Some((key.trim().to_string(), value.trim().to_string()))
        })
        .filter(|(key, _)| !key.is_empty())
        .collect()
}

/// Build the SharedKey string-to-sign for a Blob service request
///
/// `ms_headers` must contain every `x-ms-*` header sent with the request.
fn string_to_sign(
    method: &Method,
    account: &str,
    path: &str,
    query: &[(&str, &str)],
    content_length: usize,
    content_type: &str,
    ms_headers: &[(&str, String)],
) -> String {
    let length = if content_length == 0 {
        String::new()
    } else {
        content_length.to_string()
    };

    let mut headers: Vec<(String, &str)> = ms_headers
        .iter()
        .map(|(name, value)| (name.to_ascii_lowercase(), value.as_str()))
        .collect();
    headers.sort();
    let canonical_headers: String = headers
        .iter()
        .map(|(name, value)| format!("{}:{}\n", name, value.trim()))
        .collect();

    let mut params: Vec<(String, &str)> = query
        .iter()
        .map(|(name, value)| (name.to_ascii_lowercase(), *value))
        .collect();
    params.sort();
    let mut canonical_resource = format!("/{}{}", account, path);
    for (name, value) in params {
        canonical_resource.push_str(&format!("\n{}:{}", name, value));
    }

    format!(
        "{}\n\n\n{}\n\n{}\n\n\n\n\n\n\n{}{}",
        method.as_str(),
        length,
        content_type,
        canonical_headers,
        canonical_resource
    )
}

fn sign(key: &[u8], string_to_sign: &str) -> Result<String, StorageError> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| StorageError::Config(format!("Invalid account key: {}", e)))?;
    mac.update(string_to_sign.as_bytes());
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

impl AzureBlobStore {
    /// Accepts account-key connection strings
    /// (`DefaultEndpointsProtocol=…;AccountName=…;AccountKey=…;EndpointSuffix=…`)
    /// and SAS connection strings (`BlobEndpoint=…;SharedAccessSignature=…`)
    pub fn from_connection_string(raw: &str, container: &str) -> Result<Self, StorageError> {
        let parts = parse_connection_string(raw);

        let account = parts.get("AccountName").cloned();
        let endpoint = match (parts.get("BlobEndpoint"), &account) {
            (Some(endpoint), _) => endpoint.trim_end_matches('/').to_string(),
            (None, Some(account)) => {
                let protocol = parts
                    .get("DefaultEndpointsProtocol")
                    .map(String::as_str)
                    .unwrap_or("https");
                let suffix = parts
                    .get("EndpointSuffix")
                    .map(String::as_str)
                    .unwrap_or("core.windows.net");
                format!("{}://{}.blob.{}", protocol, account, suffix)
            }
            (None, None) => {
                return Err(StorageError::Config(
                    "Connection string needs AccountName or BlobEndpoint".to_string(),
                ))
            }
        };

        let credential = if let Some(sas) = parts.get("SharedAccessSignature") {
            Credential::Sas(sas.trim_start_matches('?').to_string())
        } else {
            let account = account.ok_or_else(|| {
                StorageError::Config("Connection string is missing AccountName".to_string())
            })?;
            let key = parts
                .get("AccountKey")
                .ok_or_else(|| {
                    StorageError::Config("Connection string is missing AccountKey".to_string())
                })
                .and_then(|key| {
                    STANDARD.decode(key).map_err(|e| {
                        StorageError::Config(format!("AccountKey is not valid base64: {}", e))
                    })
                })?;
            Credential::SharedKey { account, key }
        };

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| StorageError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            endpoint,
            container: container.to_string(),
            credential,
        })
    }

    fn blob_url(&self, blob_name: &str) -> String {
        format!("{}/{}/{}", self.endpoint, self.container, blob_name)
    }

    /// Blob name from a locator: everything after `/<container>/`
    fn blob_name<'a>(&self, locator: &'a str) -> Result<&'a str, StorageError> {
        let without_query = locator.split('?').next().unwrap_or(locator);
        without_query
            .split_once(&format!("/{}/", self.container))
            .map(|(_, name)| name)
            .filter(|name| !name.is_empty())
            .ok_or_else(|| StorageError::UnsupportedLocator(locator.to_string()))
    }

    /// Send one signed request; `path` is `/<container>[/<blob>]`
    async fn send(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<Vec<u8>>,
        extra_ms_headers: &[(&str, String)],
    ) -> Result<reqwest::Response, StorageError> {
        let date = Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string();
        let mut ms_headers: Vec<(&str, String)> = vec![
            ("x-ms-date", date),
            ("x-ms-version", API_VERSION.to_string()),
        ];
        ms_headers.extend(extra_ms_headers.iter().cloned());

        let content_length = body.as_ref().map(Vec::len).unwrap_or(0);
        let content_type = if body.is_some() { BLOB_CONTENT_TYPE } else { "" };

        let mut url = format!("{}{}", self.endpoint, path);
        let mut query_string: Vec<String> =
            query.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
        if let Credential::Sas(sas) = &self.credential {
            query_string.push(sas.clone());
        }
        if !query_string.is_empty() {
            url.push('?');
            url.push_str(&query_string.join("&"));
        }

        let mut request = self.http_client.request(method.clone(), &url);
        for (name, value) in &ms_headers {
            request = request.header(*name, value);
        }
        if !content_type.is_empty() {
            request = request.header(reqwest::header::CONTENT_TYPE, content_type);
        }

        if let Credential::SharedKey { account, key } = &self.credential {
            let to_sign = string_to_sign(
                &method,
                account,
                path,
                query,
                content_length,
                content_type,
                &ms_headers,
            );
            let signature = sign(key, &to_sign)?;
            request = request.header(
                reqwest::header::AUTHORIZATION,
                format!("SharedKey {}:{}", account, signature),
            );
        }

        let request = match body {
            Some(body) => request.body(body),
            None => request.header(reqwest::header::CONTENT_LENGTH, 0),
        };

        request
            .send()
            .await
            .map_err(|e| StorageError::Network(e.to_string()))
    }

    async fn remote_error(response: reqwest::Response) -> StorageError {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        StorageError::Remote(status, body)
    }

    /// Create the container if it does not exist yet
    pub async fn ensure_container(&self) -> Result<(), StorageError> {
        let path = format!("/{}", self.container);
        let response = self
            .send(Method::PUT, &path, &[("restype", "container")], None, &[])
            .await?;

        match response.status() {
            StatusCode::CREATED => {
                info!(container = %self.container, "Created blob container");
                Ok(())
            }
            StatusCode::CONFLICT => {
                debug!(container = %self.container, "Blob container already exists");
                Ok(())
            }
            _ => Err(Self::remote_error(response).await),
        }
    }
}

#[async_trait]
impl BlobStore for AzureBlobStore {
    fn name(&self) -> &'static str {
        "azure"
    }

    fn handles(&self, locator: &str) -> bool {
        locator.starts_with("https://") || locator.starts_with("http://")
    }

    async fn upload(
        &self,
        data: &[u8],
        extension: &str,
        owner: Option<&str>,
    ) -> Result<String, StorageError> {
        let owner = owner
            .map(sanitize_segment)
            .unwrap_or_else(|| "anonymous".to_string());
        let blob_name = format!(
            "assessments/{}/{}/{}.{}",
            owner,
            Utc::now().format("%Y%m%d"),
            Uuid::new_v4(),
            sanitize_segment(extension)
        );
        let path = format!("/{}/{}", self.container, blob_name);

        let response = self
            .send(
                Method::PUT,
                &path,
                &[],
                Some(data.to_vec()),
                &[("x-ms-blob-type", "BlockBlob".to_string())],
            )
            .await?;

        if !response.status().is_success() {
            return Err(Self::remote_error(response).await);
        }

        info!(bytes = data.len(), blob = %blob_name, "Uploaded blob to Azure");
        Ok(self.blob_url(&blob_name))
    }

    async fn download(&self, locator: &str) -> Result<Vec<u8>, StorageError> {
        let blob_name = self.blob_name(locator)?;
        let path = format!("/{}/{}", self.container, blob_name);

        let response = self.send(Method::GET, &path, &[], None, &[]).await?;
        match response.status() {
            status if status.is_success() => {
                let bytes = response
                    .bytes()
                    .await
                    .map_err(|e| StorageError::Network(e.to_string()))?;
                debug!(bytes = bytes.len(), blob = %blob_name, "Downloaded blob from Azure");
                Ok(bytes.to_vec())
            }
            StatusCode::NOT_FOUND => Err(StorageError::NotFound(locator.to_string())),
            _ => Err(Self::remote_error(response).await),
        }
    }

    async fn delete(&self, locator: &str) -> Result<bool, StorageError> {
        let blob_name = self.blob_name(locator)?;
        let path = format!("/{}/{}", self.container, blob_name);

        let response = self.send(Method::DELETE, &path, &[], None, &[]).await?;
        match response.status() {
            status if status.is_success() => {
                info!(blob = %blob_name, "Removed blob from Azure");
                Ok(true)
            }
            StatusCode::NOT_FOUND => {
                warn!(blob = %blob_name, "Azure blob already absent");
                Ok(false)
            }
            _ => Err(Self::remote_error(response).await),
        }
    }
}
