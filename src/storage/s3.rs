//! S3-compatible storage backend
//!
//! Talks to AWS S3 or any store speaking the same REST dialect (MinIO, R2,
//! ...) using path-style addressing and SigV4-signed requests.

use async_trait::async_trait;
use futures::TryStreamExt;
use reqwest::{header, Client, Method, Response, StatusCode};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio_util::io::StreamReader;
use tracing::debug;
use url::Url;

use super::listing::parse_list_objects_v2;
use super::sigv4::{self, Credentials};
use super::{ObjectStore, Page};
use crate::config::StoreConfig;
use crate::error::{SyncError, SyncResult};
use crate::remote::ByteStream;

/// S3 storage client
pub struct S3Store {
    config: StoreConfig,
    client: Client,
    base: Url,
}

/// Pieces of one outgoing request
struct Call<'a> {
    method: Method,
    bucket: &'a str,
    key: Option<&'a str>,
    query: Vec<(&'a str, &'a str)>,
    headers: Vec<(&'static str, String)>,
    body: Vec<u8>,
}

impl<'a> Call<'a> {
    fn new(method: Method, bucket: &'a str, key: Option<&'a str>) -> Self {
        Self {
            method,
            bucket,
            key,
            query: Vec::new(),
            headers: Vec::new(),
            body: Vec::new(),
        }
    }
}

impl S3Store {
    /// Create new S3 storage client
    pub fn new(config: StoreConfig) -> SyncResult<Self> {
        if config.access_key_id.is_empty() || config.secret_access_key.is_empty() {
            return Err(SyncError::Config(
                "object store credentials are not set (AWS_ACCESS_KEY_ID / AWS_SECRET_ACCESS_KEY)"
                    .into(),
            ));
        }
        let base = Url::parse(&config.endpoint_url())
            .map_err(|e| SyncError::Config(format!("invalid store endpoint: {e}")))?;
        if base.host_str().is_none() {
            return Err(SyncError::Config("store endpoint has no host".into()));
        }
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| SyncError::Config(format!("http client: {e}")))?;

        Ok(Self {
            config,
            client,
            base,
        })
    }

    fn host(&self) -> String {
        let host = self.base.host_str().unwrap_or_default();
        match self.base.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        }
    }

    fn canonical_uri(&self, bucket: &str, key: Option<&str>) -> String {
        let mut uri = self.base.path().trim_end_matches('/').to_string();
        uri.push('/');
        uri.push_str(&sigv4::uri_encode(bucket, true));
        if let Some(key) = key {
            uri.push('/');
            uri.push_str(&sigv4::uri_encode(key, false));
        }
        uri
    }

    async fn send(&self, call: Call<'_>) -> Result<Response, String> {
        let now = chrono::Utc::now();
        let canonical_uri = self.canonical_uri(call.bucket, call.key);
        let query = sigv4::canonical_query(&call.query);
        let payload_hash = sigv4::sha256_hex(&call.body);

        let mut headers: BTreeMap<String, String> = BTreeMap::new();
        headers.insert("host".into(), self.host());
        headers.insert("x-amz-date".into(), sigv4::amz_date(now));
        headers.insert("x-amz-content-sha256".into(), payload_hash.clone());
        if let Some(token) = &self.config.session_token {
            headers.insert("x-amz-security-token".into(), token.expose().to_string());
        }
        for (name, value) in &call.headers {
            headers.insert(name.to_string(), value.clone());
        }

        let creds = Credentials {
            access_key_id: &self.config.access_key_id,
            secret_access_key: self.config.secret_access_key.expose(),
            region: &self.config.region,
        };
        let authorization = sigv4::authorization(
            &creds,
            call.method.as_str(),
            &canonical_uri,
            &query,
            &headers,
            &payload_hash,
            now,
        )
        .map_err(|e| format!("signing failed: {e}"))?;

        let mut url = format!("{}://{}{}", self.base.scheme(), self.host(), canonical_uri);
        if !query.is_empty() {
            url.push('?');
            url.push_str(&query);
        }
        debug!(method = %call.method, %url, "s3 request");

        let mut request = self
            .client
            .request(call.method, &url)
            .header(header::AUTHORIZATION, authorization);
        // reqwest derives Host from the URL
        for (name, value) in headers.iter().filter(|(name, _)| name.as_str() != "host") {
            request = request.header(name.as_str(), value.as_str());
        }
        if !call.body.is_empty() {
            request = request.header(header::CONTENT_TYPE, "application/octet-stream");
        }

        request
            .body(call.body)
            .send()
            .await
            .map_err(|e| e.to_string())
    }
}

/// Describe a non-success response
async fn failure(response: Response) -> String {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    format!("{status} - {}", body.trim())
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        token: Option<&str>,
    ) -> SyncResult<Page> {
        let mut call = Call::new(Method::GET, bucket, None);
        call.query = vec![("list-type", "2"), ("prefix", prefix), ("delimiter", "/")];
        if let Some(token) = token {
            call.query.push(("continuation-token", token));
        }

        let response = self
            .send(call)
            .await
            .map_err(|e| SyncError::store("list", prefix, e))?;
        if !response.status().is_success() {
            return Err(SyncError::store("list", prefix, failure(response).await));
        }
        let xml = response
            .text()
            .await
            .map_err(|e| SyncError::store("list", prefix, e))?;
        parse_list_objects_v2(&xml).ok_or_else(|| {
            SyncError::store("list", prefix, "response is not a ListBucketResult")
        })
    }

    async fn get_object(&self, bucket: &str, key: &str) -> SyncResult<ByteStream> {
        let response = self
            .send(Call::new(Method::GET, bucket, Some(key)))
            .await
            .map_err(|e| SyncError::store("get", key, e))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(SyncError::NotFound {
                key: key.to_string(),
            });
        }
        if !response.status().is_success() {
            return Err(SyncError::store("get", key, failure(response).await));
        }

        let body = response.bytes_stream().map_err(std::io::Error::other);
        Ok(Box::pin(StreamReader::new(body)))
    }

    async fn object_exists(&self, bucket: &str, key: &str) -> SyncResult<bool> {
        let response = self
            .send(Call::new(Method::HEAD, bucket, Some(key)))
            .await
            .map_err(|e| SyncError::store("head", key, e))?;

        match response.status() {
            status if status.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => Err(SyncError::store("head", key, status)),
        }
    }

    async fn put_object(&self, bucket: &str, key: &str, mut data: ByteStream) -> SyncResult<()> {
        // S3 wants a content length up front
        let mut body = Vec::new();
        data.read_to_end(&mut body)
            .await
            .map_err(|e| SyncError::transfer(key, e))?;

        let mut call = Call::new(Method::PUT, bucket, Some(key));
        call.body = body;
        let response = self
            .send(call)
            .await
            .map_err(|e| SyncError::store("put", key, e))?;

        if !response.status().is_success() {
            return Err(SyncError::store("put", key, failure(response).await));
        }
        Ok(())
    }

    async fn copy_object(&self, bucket: &str, src_key: &str, dst_key: &str) -> SyncResult<()> {
        let source = format!(
            "/{}/{}",
            sigv4::uri_encode(bucket, true),
            sigv4::uri_encode(src_key, false)
        );
        let mut call = Call::new(Method::PUT, bucket, Some(dst_key));
        call.headers.push(("x-amz-copy-source", source));

        let response = self
            .send(call)
            .await
            .map_err(|e| SyncError::store("copy", src_key, e))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(SyncError::NotFound {
                key: src_key.to_string(),
            });
        }
        if !response.status().is_success() {
            return Err(SyncError::store("copy", src_key, failure(response).await));
        }
        // CopyObject can report failure inside a 200 response
        let body = response
            .text()
            .await
            .map_err(|e| SyncError::store("copy", src_key, e))?;
        if body.contains("<Error>") {
            return Err(SyncError::store("copy", src_key, body.trim()));
        }
        Ok(())
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> SyncResult<()> {
        let response = self
            .send(Call::new(Method::DELETE, bucket, Some(key)))
            .await
            .map_err(|e| SyncError::store("delete", key, e))?;

        if !response.status().is_success() && response.status() != StatusCode::NOT_FOUND {
            return Err(SyncError::store("delete", key, failure(response).await));
        }
        Ok(())
    }
}
