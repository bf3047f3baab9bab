//! HTTP clients for Azure Blob Storage and Video Indexer.

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use rand::RngCore;
use std::io::Read;
use std::time::Duration;

use super::VideoIndex;
use crate::signing::sign_base64_key;

const STORAGE_API_VERSION: &str = "2020-10-02";
const INDEXER_API: &str = "https://api.videoindexer.ai";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
const MAX_BLOB_BYTES: u64 = 2 * 1024 * 1024 * 1024;

fn agent() -> ureq::Agent {
    ureq::AgentBuilder::new().timeout(REQUEST_TIMEOUT).build()
}

/// Read-only access to one storage account with its Shared Key.
pub struct BlobClient {
    agent: ureq::Agent,
    account: String,
    key: String,
}

impl BlobClient {
    pub fn new(account: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            agent: agent(),
            account: account.into(),
            key: key.into(),
        }
    }

    pub fn blob_url(&self, container: &str, blob: &str) -> Result<url::Url> {
        let mut url = url::Url::parse(&format!("https://{}.blob.core.windows.net/", self.account))
            .with_context(|| format!("invalid storage account name '{}'", self.account))?;
        url.path_segments_mut()
            .map_err(|_| anyhow!("blob url cannot carry a path"))?
            .pop_if_empty()
            .push(container)
            .extend(blob.split('/'));
        Ok(url)
    }

    /// Shared Key `Authorization` value for a GET of `url` at `date`.
    pub fn authorization(&self, url: &url::Url, date: &str) -> Result<String> {
        // Verb, eleven empty standard headers, canonical headers, resource.
        let string_to_sign = format!(
            "GET\n{}x-ms-date:{}\nx-ms-version:{}\n/{}{}",
            "\n".repeat(11),
            date,
            STORAGE_API_VERSION,
            self.account,
            url.path()
        );
        let signature = sign_base64_key(&self.key, &string_to_sign)?;
        Ok(format!("SharedKey {}:{}", self.account, signature))
    }

    pub fn download(&self, container: &str, blob: &str) -> Result<Vec<u8>> {
        let url = self.blob_url(container, blob)?;
        let date = Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string();
        let response = self
            .agent
            .get(url.as_str())
            .set("x-ms-date", &date)
            .set("x-ms-version", STORAGE_API_VERSION)
            .set("Authorization", &self.authorization(&url, &date)?)
            .call()
            .with_context(|| format!("download blob {}/{}", container, blob))?;
        let mut bytes = Vec::new();
        response
            .into_reader()
            .take(MAX_BLOB_BYTES)
            .read_to_end(&mut bytes)
            .context("read blob body")?;
        if bytes.is_empty() {
            return Err(anyhow!("blob {}/{} is empty", container, blob));
        }
        Ok(bytes)
    }
}

/// Client for one Video Indexer account.
pub struct VideoIndexerClient {
    agent: ureq::Agent,
    base: String,
    region: String,
    account_id: String,
    api_key: String,
}

impl VideoIndexerClient {
    pub fn new(region: &str, account_id: &str, api_key: &str) -> Self {
        Self::with_base_url(INDEXER_API, region, account_id, api_key)
    }

    pub fn with_base_url(base: &str, region: &str, account_id: &str, api_key: &str) -> Self {
        Self {
            agent: agent(),
            base: base.trim_end_matches('/').to_string(),
            region: region.to_string(),
            account_id: account_id.to_string(),
            api_key: api_key.to_string(),
        }
    }

    fn videos_url(&self) -> String {
        format!(
            "{}/{}/Accounts/{}/Videos",
            self.base, self.region, self.account_id
        )
    }

    pub fn access_token(&self) -> Result<String> {
        let url = format!(
            "{}/auth/{}/Accounts/{}/AccessToken",
            self.base, self.region, self.account_id
        );
        let body = self
            .agent
            .get(&url)
            .query("allowEdit", "true")
            .set("Ocp-Apim-Subscription-Key", &self.api_key)
            .call()
            .context("request video indexer access token")?
            .into_string()
            .context("read access token")?;
        let token = body.trim().replace('"', "");
        if token.is_empty() {
            return Err(anyhow!("video indexer returned an empty access token"));
        }
        Ok(token)
    }

    /// Upload a clip for indexing; returns the video id.
    pub fn upload(&self, token: &str, file_name: &str, content: &[u8]) -> Result<String> {
        let boundary = multipart_boundary();
        let body = multipart_body(&boundary, file_name, content);
        let response = self
            .agent
            .post(&self.videos_url())
            .query("name", file_name)
            .query("accessToken", token)
            .query("streamingPreset", "Default")
            .query("fileName", file_name)
            .query("description", "#testfile")
            .query("privacy", "Private")
            .query("indexingPreset", "Default")
            .query("sendSuccessEmail", "False")
            .set(
                "Content-Type",
                &format!("multipart/form-data; boundary={}", boundary),
            )
            .send_bytes(&body)
            .with_context(|| format!("upload {} to video indexer", file_name))?;
        let reply: serde_json::Value = serde_json::from_str(
            &response.into_string().context("read upload response")?,
        )
        .context("parse upload response")?;
        reply
            .get("id")
            .and_then(|id| id.as_str())
            .map(str::to_string)
            .ok_or_else(|| anyhow!("upload response has no video id"))
    }

    pub fn index(&self, token: &str, video_id: &str) -> Result<VideoIndex> {
        let url = format!("{}/{}/Index", self.videos_url(), video_id);
        let body = self
            .agent
            .get(&url)
            .query("accessToken", token)
            .query("reTranslate", "False")
            .query("includeStreamingUrls", "True")
            .call()
            .with_context(|| format!("fetch index of video {}", video_id))?
            .into_string()
            .context("read video index")?;
        serde_json::from_str(&body).context("parse video index")
    }

    /// Poll the index every `interval` until processing finishes, reporting
    /// each state seen to `on_state`.
    pub fn wait_for_index(
        &self,
        token: &str,
        video_id: &str,
        interval: Duration,
        mut on_state: impl FnMut(&str),
    ) -> Result<VideoIndex> {
        loop {
            let index = self.index(token, video_id)?;
            let state = index.state.as_deref().unwrap_or("unknown");
            log::info!("video {}: {}", video_id, state);
            on_state(state);
            if index.is_processed() {
                return Ok(index);
            }
            if index.is_failed() {
                return Err(anyhow!("video indexer failed to process {}", video_id));
            }
            std::thread::sleep(interval);
        }
    }
}

fn multipart_boundary() -> String {
    let mut bytes = [0u8; 12];
    rand::thread_rng().fill_bytes(&mut bytes);
    let suffix: String = bytes.iter().map(|b| format!("{:02x}", b)).collect();
    format!("camera-trap-{}", suffix)
}

/// A `multipart/form-data` body holding `content` as the `file` field.
///
/// ureq 2 has no form-data encoder, so the single-part body is assembled here.
pub(crate) fn multipart_body(boundary: &str, file_name: &str, content: &[u8]) -> Vec<u8> {
    let safe_name = file_name.replace(['"', '\r', '\n'], "_");
    let mut body = Vec::with_capacity(content.len() + 256);
    body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\n",
            safe_name
        )
        .as_bytes(),
    );
    body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());
    body
}
