// SPDX-License-Identifier: Apache-2.0

use crate::observer::ProgressReader;
use crate::{GatewayError, GatewayErrorCode, NoopObserver, RetryPolicy, TransferObserver};
use dataledger_core::hash_file;
use reqwest::blocking::{Body, Client, RequestBuilder, Response};
use reqwest::header::CONTENT_LENGTH;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Instant;
use tracing::{debug, info, warn};

pub const HEADER_META_SHA256: &str = "x-amz-meta-sha256";
pub const HEADER_COPY_SOURCE: &str = "x-amz-copy-source";

/// What a HEAD on an object reveals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectHead {
    pub content_length: Option<u64>,
    pub sha256: Option<String>,
}

/// Capability-scoped client for one named bucket behind an S3-compatible
/// HTTP endpoint. Authentication is a bearer token; everything else is plain
/// `{endpoint}/{bucket}/{key}` addressing.
pub struct BucketClient {
    pub endpoint: String,
    pub bucket: String,
    bearer_token: Option<String>,
    retry: RetryPolicy,
    client: Client,
    observer: Arc<dyn TransferObserver>,
}

impl BucketClient {
    #[must_use]
    pub fn new(endpoint: String, bucket: String) -> Self {
        Self {
            endpoint,
            bucket,
            bearer_token: None,
            retry: RetryPolicy::default(),
            client: Client::new(),
            observer: Arc::new(NoopObserver),
        }
    }

    #[must_use]
    pub fn with_bearer_token(mut self, token: Option<String>) -> Self {
        self.bearer_token = token.filter(|t| !t.trim().is_empty());
        self
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn TransferObserver>) -> Self {
        self.observer = observer;
        self
    }

    fn bucket_url(&self) -> String {
        format!("{}/{}", self.endpoint.trim_end_matches('/'), self.bucket)
    }

    fn object_url(&self, key: &str) -> String {
        format!("{}/{}", self.bucket_url(), key.trim_start_matches('/'))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.bearer_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    fn send_error(&self, verb: &str, key: &str, err: &reqwest::Error) -> GatewayError {
        GatewayError::new(
            GatewayErrorCode::Transfer,
            format!("{verb} '{key}' against bucket '{}' failed: {err}", self.bucket),
        )
    }

    fn status_error(&self, verb: &str, key: &str, response: &Response) -> GatewayError {
        let status = response.status();
        let code = match status.as_u16() {
            403 => GatewayErrorCode::PermissionDenied,
            404 => GatewayErrorCode::NotFound,
            _ => GatewayErrorCode::Transfer,
        };
        GatewayError::new(
            code,
            format!("{verb} '{key}' against bucket '{}' failed: {status}", self.bucket),
        )
    }

    /// Streams a local file into the bucket under `key`, stamping the content
    /// digest as object metadata. The upload only counts once a follow-up
    /// HEAD confirms the bucket holds the full byte count (and digest, when
    /// the endpoint echoes metadata); anything less is deleted and reported
    /// as a transfer failure.
    pub fn upload(&self, local_path: &Path, key: &str, sha256: &str) -> Result<(), GatewayError> {
        let total = fs::metadata(local_path)
            .map_err(|e| {
                GatewayError::new(
                    GatewayErrorCode::Io,
                    format!("cannot stat '{}': {e}", local_path.display()),
                )
            })?
            .len();
        let file = File::open(local_path).map_err(|e| {
            GatewayError::new(
                GatewayErrorCode::Io,
                format!("cannot open '{}': {e}", local_path.display()),
            )
        })?;
        debug!(bucket = %self.bucket, key, bytes = total, "uploading object");

        let reader = ProgressReader::new(
            file,
            self.bucket.clone(),
            key.to_string(),
            total,
            Arc::clone(&self.observer),
        );
        let started = Instant::now();
        let response = self
            .authorize(self.client.put(self.object_url(key)))
            .header(HEADER_META_SHA256, sha256)
            .body(Body::sized(reader, total))
            .send();

        let response = match response {
            Ok(response) => response,
            Err(err) => {
                self.cleanup_after_failed_upload(key);
                return Err(self.send_error("upload of", key, &err));
            }
        };
        if !response.status().is_success() {
            let err = self.status_error("upload of", key, &response);
            self.cleanup_after_failed_upload(key);
            return Err(err);
        }

        match self.head(key)? {
            None => {
                self.cleanup_after_failed_upload(key);
                return Err(GatewayError::new(
                    GatewayErrorCode::Transfer,
                    format!(
                        "object '{key}' not visible in bucket '{}' after upload",
                        self.bucket
                    ),
                ));
            }
            Some(head) => {
                if let Some(stored) = head.content_length {
                    if stored != total {
                        self.cleanup_after_failed_upload(key);
                        return Err(GatewayError::new(
                            GatewayErrorCode::Transfer,
                            format!(
                                "short upload of '{key}' to bucket '{}': {stored} of {total} bytes",
                                self.bucket
                            ),
                        ));
                    }
                }
                if let Some(stored) = head.sha256 {
                    if stored != sha256 {
                        self.cleanup_after_failed_upload(key);
                        return Err(GatewayError::new(
                            GatewayErrorCode::Transfer,
                            format!(
                                "upload of '{key}' to bucket '{}' stored digest {stored}, expected {sha256}",
                                self.bucket
                            ),
                        ));
                    }
                }
            }
        }

        self.observer
            .observe_upload(&self.bucket, total, started.elapsed());
        info!(bucket = %self.bucket, key, bytes = total, "upload complete");
        Ok(())
    }

    fn cleanup_after_failed_upload(&self, key: &str) {
        if let Err(err) = self.delete(key) {
            warn!(bucket = %self.bucket, key, %err, "failed to clean up partial upload");
        }
    }

    /// Streaming fetch. Bytes land on a `.partial` sibling and are renamed
    /// into place only after the transfer completed at full length, so the
    /// caller-requested path never holds a truncated object.
    pub fn download(&self, key: &str, local_path: &Path) -> Result<(), GatewayError> {
        let partial = partial_path(local_path);
        let started = Instant::now();
        let mut attempt = 0_usize;
        loop {
            match self.fetch_once(key, &partial) {
                Ok(bytes) => {
                    fs::rename(&partial, local_path).map_err(|e| {
                        GatewayError::new(
                            GatewayErrorCode::Io,
                            format!("cannot move download into '{}': {e}", local_path.display()),
                        )
                    })?;
                    self.observer
                        .observe_download(&self.bucket, bytes, started.elapsed());
                    info!(bucket = %self.bucket, key, bytes, "download complete");
                    return Ok(());
                }
                Err(err) => {
                    let _ = fs::remove_file(&partial);
                    attempt += 1;
                    if err.code != GatewayErrorCode::Transfer || attempt >= self.retry.max_attempts {
                        return Err(err);
                    }
                    warn!(bucket = %self.bucket, key, attempt, %err, "retrying download");
                    thread::sleep(self.retry.delay_for_attempt(attempt));
                }
            }
        }
    }

    fn fetch_once(&self, key: &str, partial: &Path) -> Result<u64, GatewayError> {
        let mut response = self
            .authorize(self.client.get(self.object_url(key)))
            .send()
            .map_err(|e| self.send_error("download of", key, &e))?;
        if !response.status().is_success() {
            return Err(self.status_error("download of", key, &response));
        }
        let expected = header_u64(&response, CONTENT_LENGTH.as_str());

        let mut file = File::create(partial).map_err(|e| {
            GatewayError::new(
                GatewayErrorCode::Io,
                format!("cannot create '{}': {e}", partial.display()),
            )
        })?;
        let written = response
            .copy_to(&mut file)
            .map_err(|e| self.send_error("download of", key, &e))?;
        file.sync_all().map_err(|e| {
            GatewayError::new(
                GatewayErrorCode::Io,
                format!("cannot sync '{}': {e}", partial.display()),
            )
        })?;

        if let Some(expected) = expected {
            if written != expected {
                return Err(GatewayError::new(
                    GatewayErrorCode::Transfer,
                    format!(
                        "short download of '{key}' from bucket '{}': {written} of {expected} bytes",
                        self.bucket
                    ),
                ));
            }
        }
        Ok(written)
    }

    /// Removing a key that is already gone is success, so deletes can be
    /// retried and used as best-effort cleanup.
    pub fn delete(&self, key: &str) -> Result<(), GatewayError> {
        let response = self
            .authorize(self.client.delete(self.object_url(key)))
            .send()
            .map_err(|e| self.send_error("delete of", key, &e))?;
        if response.status().is_success() || response.status().as_u16() == 404 {
            debug!(bucket = %self.bucket, key, "object deleted");
            return Ok(());
        }
        Err(self.status_error("delete of", key, &response))
    }

    pub fn head(&self, key: &str) -> Result<Option<ObjectHead>, GatewayError> {
        let response = self
            .authorize(self.client.head(self.object_url(key)))
            .send()
            .map_err(|e| self.send_error("head of", key, &e))?;
        if response.status().as_u16() == 404 {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(self.status_error("head of", key, &response));
        }
        Ok(Some(ObjectHead {
            content_length: header_u64(&response, CONTENT_LENGTH.as_str()),
            sha256: header_string(&response, HEADER_META_SHA256),
        }))
    }

    pub fn exists(&self, key: &str) -> Result<bool, GatewayError> {
        Ok(self.head(key)?.is_some())
    }

    /// HEAD on the bucket itself; distinguishes missing bucket, denied
    /// access, and connection trouble for the verification report.
    pub fn head_bucket(&self) -> Result<(), GatewayError> {
        let response = self
            .authorize(self.client.head(self.bucket_url()))
            .send()
            .map_err(|e| self.send_error("head of bucket", &self.bucket, &e))?;
        if response.status().is_success() {
            return Ok(());
        }
        Err(self.status_error("head of bucket", &self.bucket, &response))
    }

    pub fn list_probe(&self) -> Result<(), GatewayError> {
        let url = format!("{}?list-type=2&max-keys=1", self.bucket_url());
        let response = self
            .authorize(self.client.get(url))
            .send()
            .map_err(|e| self.send_error("list probe of", &self.bucket, &e))?;
        if response.status().is_success() {
            return Ok(());
        }
        Err(self.status_error("list probe of", &self.bucket, &response))
    }

    /// Enumerates every key in the bucket, following continuation tokens.
    pub fn list_keys(&self) -> Result<Vec<String>, GatewayError> {
        let mut keys = Vec::new();
        let mut continuation: Option<String> = None;
        loop {
            let mut url = format!("{}?list-type=2", self.bucket_url());
            if let Some(token) = &continuation {
                url.push_str("&continuation-token=");
                url.push_str(token);
            }
            let response = self
                .authorize(self.client.get(url))
                .send()
                .map_err(|e| self.send_error("list of", &self.bucket, &e))?;
            if !response.status().is_success() {
                return Err(self.status_error("list of", &self.bucket, &response));
            }
            let body = response
                .text()
                .map_err(|e| self.send_error("list of", &self.bucket, &e))?;
            keys.extend(xml_values(&body, "Key"));
            continuation = xml_values(&body, "NextContinuationToken").into_iter().next();
            if continuation.is_none() {
                return Ok(keys);
            }
        }
    }

    pub fn put_bytes(&self, key: &str, bytes: &[u8]) -> Result<(), GatewayError> {
        let response = self
            .authorize(self.client.put(self.object_url(key)))
            .body(bytes.to_vec())
            .send()
            .map_err(|e| self.send_error("put of", key, &e))?;
        if response.status().is_success() {
            return Ok(());
        }
        Err(self.status_error("put of", key, &response))
    }

    /// Server-side copy of `key` from `source` into this bucket. The object
    /// never transits the caller.
    pub fn copy_from(&self, source: &BucketClient, key: &str) -> Result<(), GatewayError> {
        let response = self
            .authorize(self.client.put(self.object_url(key)))
            .header(HEADER_COPY_SOURCE, format!("/{}/{}", source.bucket, key))
            .send()
            .map_err(|e| self.send_error("copy of", key, &e))?;
        if response.status().is_success() {
            info!(
                from = %source.bucket,
                to = %self.bucket,
                key,
                "server-side copy complete"
            );
            return Ok(());
        }
        Err(self.status_error("copy of", key, &response))
    }

    /// Downloads `key`, re-hashes the bytes on disk, and compares against
    /// `expected_sha256`. On mismatch the file is removed so a corrupt
    /// artifact never survives under the caller-requested name.
    pub fn pull_and_verify(
        &self,
        key: &str,
        expected_sha256: &str,
        output: &Path,
    ) -> Result<(), GatewayError> {
        self.download(key, output)?;
        let actual = hash_file(output).map_err(|e| {
            GatewayError::new(
                GatewayErrorCode::Io,
                format!("cannot hash '{}': {e}", output.display()),
            )
        })?;
        if actual != expected_sha256 {
            let _ = fs::remove_file(output);
            return Err(GatewayError::new(
                GatewayErrorCode::Integrity,
                format!(
                    "integrity check failed for '{key}' from bucket '{}': expected {expected_sha256}, got {actual}",
                    self.bucket
                ),
            ));
        }
        info!(bucket = %self.bucket, key, "integrity verified");
        Ok(())
    }
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "download".into());
    name.push(".partial");
    path.with_file_name(name)
}

fn header_u64(response: &Response, name: &str) -> Option<u64> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
}

fn header_string(response: &Response, name: &str) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(ToString::to_string)
}

fn xml_values(body: &str, tag: &str) -> Vec<String> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let mut values = Vec::new();
    let mut rest = body;
    while let Some(start) = rest.find(&open) {
        rest = &rest[start + open.len()..];
        let Some(end) = rest.find(&close) else {
            break;
        };
        values.push(rest[..end].to_string());
        rest = &rest[end + close.len()..];
    }
    values
}
