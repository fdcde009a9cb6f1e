//! `BlobStore` over the GitHub REST "contents" endpoint.
//!
//! Every put/delete becomes its own commit on the target branch. Blob
//! content travels base64-encoded in both directions.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use bytes::Bytes;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use drive_platform::credential::CredentialSource;
use drive_platform::error::StoreError;
use drive_platform::memory::DEFAULT_MAX_BLOB_BYTES;
use drive_platform::store::{Blob, BlobStore, EntryKind, StoreEntry};

const ACCEPT: &str = "application/vnd.github.v3+json";
const USER_AGENT: &str = concat!("repodrive/", env!("CARGO_PKG_VERSION"));

/// Which repository (and branch) the drive lives in
#[derive(Debug, Clone)]
pub struct GitHubTarget {
    /// API base, e.g. https://api.github.com
    pub api_url: String,
    pub owner: String,
    pub repo: String,
    pub branch: Option<String>,
}

impl GitHubTarget {
    fn contents_url(&self, path: &str) -> String {
        let base = self.api_url.trim_end_matches('/');
        let encoded = encode_path(path);
        if encoded.is_empty() {
            format!("{}/repos/{}/{}/contents", base, self.owner, self.repo)
        } else {
            format!(
                "{}/repos/{}/{}/contents/{}",
                base, self.owner, self.repo, encoded
            )
        }
    }
}

pub struct GitHubStore {
    client: reqwest::Client,
    target: GitHubTarget,
    credential: Arc<dyn CredentialSource>,
}

#[derive(Debug, Deserialize)]
struct ContentItem {
    name: String,
    path: String,
    sha: String,
    #[serde(default)]
    size: u64,
    #[serde(rename = "type")]
    kind: String,
    download_url: Option<String>,
    content: Option<String>,
    encoding: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ContentsResponse {
    Listing(Vec<ContentItem>),
    Item(ContentItem),
}

#[derive(Debug, Deserialize)]
struct PutResponse {
    content: CommittedContent,
}

#[derive(Debug, Deserialize)]
struct CommittedContent {
    sha: String,
}

#[derive(Debug, Serialize)]
struct PutRequest<'a> {
    message: &'a str,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    branch: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct DeleteRequest<'a> {
    message: &'a str,
    sha: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    branch: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

impl GitHubStore {
    pub fn new(
        target: GitHubTarget,
        credential: Arc<dyn CredentialSource>,
        timeout: Duration,
    ) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| StoreError::unavailable("", format!("failed to build http client: {}", e)))?;

        info!(
            "github store: {}/{} (branch {})",
            target.owner,
            target.repo,
            target.branch.as_deref().unwrap_or("default")
        );
        Ok(Self {
            client,
            target,
            credential,
        })
    }

    fn request(&self, method: Method, url: &str) -> Result<RequestBuilder, StoreError> {
        let token = self.credential.credential()?;
        Ok(self
            .client
            .request(method, url)
            .header(reqwest::header::AUTHORIZATION, format!("token {}", token))
            .header(reqwest::header::ACCEPT, ACCEPT))
    }

    fn read_request(&self, path: &str) -> Result<RequestBuilder, StoreError> {
        let req = self.request(Method::GET, &self.target.contents_url(path))?;
        Ok(match &self.target.branch {
            Some(branch) => req.query(&[("ref", branch.as_str())]),
            None => req,
        })
    }

    async fn send(&self, path: &str, req: RequestBuilder) -> Result<Response, StoreError> {
        let resp = req.send().await.map_err(|e| transport_error(path, e))?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ApiErrorBody>(&body)
            .map(|b| b.message)
            .unwrap_or(body);
        debug!("github: {} on {}: {}", status, path, message);
        Err(map_status(status, path, message))
    }

    async fn fetch_raw(&self, path: &str, url: &str) -> Result<Bytes, StoreError> {
        debug!("github: fetching raw content for {}", path);
        let req = self.request(Method::GET, url)?;
        let resp = self.send(path, req).await?;
        resp.bytes().await.map_err(|e| transport_error(path, e))
    }
}

#[async_trait]
impl BlobStore for GitHubStore {
    async fn list(&self, path: &str) -> Result<Vec<StoreEntry>, StoreError> {
        let resp = self.send(path, self.read_request(path)?).await?;
        let parsed: ContentsResponse = resp.json().await.map_err(|e| transport_error(path, e))?;
        match parsed {
            ContentsResponse::Listing(items) => Ok(items.into_iter().filter_map(to_store_entry).collect()),
            ContentsResponse::Item(_) => Err(StoreError::NotADirectory {
                path: path.to_string(),
            }),
        }
    }

    async fn get(&self, path: &str) -> Result<Blob, StoreError> {
        let resp = self.send(path, self.read_request(path)?).await?;
        let parsed: ContentsResponse = resp.json().await.map_err(|e| transport_error(path, e))?;
        let item = match parsed {
            ContentsResponse::Item(item) if item.kind != "dir" => item,
            _ => {
                debug!("github: {} is a directory, not a blob", path);
                return Err(StoreError::not_found(path));
            }
        };

        let content = match content_source(path, &item)? {
            ContentSource::Inline(bytes) => bytes,
            ContentSource::Remote(url) => self.fetch_raw(path, url).await?,
        };

        Ok(Blob {
            path: item.path,
            size: item.size,
            content,
            content_id: item.sha,
            download_url: item.download_url,
        })
    }

    async fn put(
        &self,
        path: &str,
        content: &[u8],
        message: &str,
        expected_content_id: Option<&str>,
    ) -> Result<String, StoreError> {
        let body = PutRequest {
            message,
            content: BASE64.encode(content),
            sha: expected_content_id,
            branch: self.target.branch.as_deref(),
        };
        let req = self
            .request(Method::PUT, &self.target.contents_url(path))?
            .json(&body);
        let resp = self
            .send(path, req)
            .await
            .map_err(|e| with_payload_size(e, content.len()))?;
        let committed: PutResponse = resp.json().await.map_err(|e| transport_error(path, e))?;
        debug!("github: put {} -> {}", path, committed.content.sha);
        Ok(committed.content.sha)
    }

    async fn delete(
        &self,
        path: &str,
        expected_content_id: &str,
        message: &str,
    ) -> Result<(), StoreError> {
        let body = DeleteRequest {
            message,
            sha: expected_content_id,
            branch: self.target.branch.as_deref(),
        };
        let req = self
            .request(Method::DELETE, &self.target.contents_url(path))?
            .json(&body);
        self.send(path, req).await?;
        debug!("github: deleted {}", path);
        Ok(())
    }
}

fn to_store_entry(item: ContentItem) -> Option<StoreEntry> {
    let kind = match item.kind.as_str() {
        "dir" => EntryKind::Directory,
        "file" | "symlink" => EntryKind::File,
        other => {
            debug!("github: skipping {} entry {}", other, item.path);
            return None;
        }
    };
    Some(StoreEntry {
        content_id: (!kind.is_dir()).then_some(item.sha),
        size: if kind.is_dir() { 0 } else { item.size },
        name: item.name,
        path: item.path,
        kind,
        modified: None,
    })
}

/// Where a blob's bytes come from
#[derive(Debug, PartialEq)]
enum ContentSource<'a> {
    Inline(Bytes),
    Remote(&'a str),
}

/// Files above 1 MB come back without inline content (`encoding: "none"`)
/// and have to be fetched through their download url.
fn content_source<'a>(
    path: &str,
    item: &'a ContentItem,
) -> Result<ContentSource<'a>, StoreError> {
    let inline = item.encoding.as_deref() == Some("base64");
    match (&item.content, inline, &item.download_url) {
        (Some(encoded), true, _) => decode_content(encoded)
            .map(|bytes| ContentSource::Inline(Bytes::from(bytes)))
            .map_err(|e| StoreError::unavailable(path, format!("invalid base64 content: {}", e))),
        (_, _, Some(url)) => Ok(ContentSource::Remote(url)),
        _ => Err(StoreError::unavailable(
            path,
            "response carries neither content nor download url",
        )),
    }
}

/// A 413 carries no sizes; fill in what the rejected request tried to store.
fn with_payload_size(err: StoreError, size: usize) -> StoreError {
    match err {
        StoreError::TooLarge { path, .. } => StoreError::TooLarge {
            path,
            size: size as u64,
            max: DEFAULT_MAX_BLOB_BYTES,
        },
        other => other,
    }
}

/// Percent-encode each path segment, dropping empty ones.
fn encode_path(path: &str) -> String {
    path.split('/')
        .filter(|s| !s.is_empty())
        .map(|s| urlencoding::encode(s).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// GitHub wraps base64 payloads at 60 columns.
fn decode_content(encoded: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let compact: String = encoded.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    BASE64.decode(compact)
}

fn map_status(status: StatusCode, path: &str, message: String) -> StoreError {
    match status {
        StatusCode::NOT_FOUND => StoreError::not_found(path),
        StatusCode::CONFLICT | StatusCode::UNPROCESSABLE_ENTITY => StoreError::conflict(path),
        StatusCode::PAYLOAD_TOO_LARGE => StoreError::TooLarge {
            path: path.to_string(),
            size: 0,
            max: 0,
        },
        StatusCode::UNAUTHORIZED => StoreError::AuthRequired,
        other => StoreError::unavailable(path, format!("HTTP {}: {}", other, message)),
    }
}

fn transport_error(path: &str, err: reqwest::Error) -> StoreError {
    StoreError::unavailable(path, err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> GitHubTarget {
        GitHubTarget {
            api_url: "https://api.github.com/".to_string(),
            owner: "octo".to_string(),
            repo: "my-personal-drive".to_string(),
            branch: None,
        }
    }

    #[test]
    fn test_contents_url_root_and_nested() {
        let t = target();
        assert_eq!(
            t.contents_url(""),
            "https://api.github.com/repos/octo/my-personal-drive/contents"
        );
        assert_eq!(
            t.contents_url("/docs/My File.txt"),
            "https://api.github.com/repos/octo/my-personal-drive/contents/docs/My%20File.txt"
        );
    }

    #[test]
    fn test_encode_path_escapes_segments() {
        assert_eq!(encode_path("a b/c#d"), "a%20b/c%23d");
        assert_eq!(encode_path("//a//b/"), "a/b");
    }

    #[test]
    fn test_decode_wrapped_base64() {
        let encoded = "aGVsbG8g\nd29ybGQ=\n";
        assert_eq!(decode_content(encoded).unwrap(), b"hello world");
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            map_status(StatusCode::NOT_FOUND, "a", String::new()),
            StoreError::not_found("a")
        );
        assert_eq!(
            map_status(StatusCode::CONFLICT, "a", String::new()),
            StoreError::conflict("a")
        );
        assert_eq!(
            map_status(StatusCode::UNPROCESSABLE_ENTITY, "a", "sha wasn't supplied".into()),
            StoreError::conflict("a")
        );
        assert_eq!(
            map_status(StatusCode::UNAUTHORIZED, "a", String::new()),
            StoreError::AuthRequired
        );
        match map_status(StatusCode::BAD_GATEWAY, "a", "upstream".into()) {
            StoreError::Unavailable { path, reason } => {
                assert_eq!(path, "a");
                assert!(reason.contains("502"));
                assert!(reason.contains("upstream"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parse_listing_and_item() {
        let listing = r#"[
            {"name":"docs","path":"docs","sha":"t1","size":0,"type":"dir","download_url":null},
            {"name":"a.txt","path":"a.txt","sha":"b1","size":5,"type":"file","download_url":"https://raw/a.txt"},
            {"name":"mod","path":"mod","sha":"s1","size":0,"type":"submodule","download_url":null}
        ]"#;
        let parsed: ContentsResponse = serde_json::from_str(listing).unwrap();
        let ContentsResponse::Listing(items) = parsed else {
            panic!("expected listing");
        };
        let entries: Vec<StoreEntry> = items.into_iter().filter_map(to_store_entry).collect();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].kind, EntryKind::Directory);
        assert!(entries[0].content_id.is_none());
        assert_eq!(entries[1].content_id.as_deref(), Some("b1"));
        assert_eq!(entries[1].size, 5);

        let item = r#"{"name":"a.txt","path":"a.txt","sha":"b1","size":5,"type":"file",
            "download_url":null,"content":"aGVsbG8=\n","encoding":"base64"}"#;
        let parsed: ContentsResponse = serde_json::from_str(item).unwrap();
        assert!(matches!(parsed, ContentsResponse::Item(_)));
    }

    fn item(json: &str) -> ContentItem {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_small_file_content_is_inline() {
        let small = item(
            r#"{"name":"a.txt","path":"a.txt","sha":"b1","size":11,"type":"file",
            "download_url":"https://raw/a.txt","content":"aGVsbG8g\nd29ybGQ=\n","encoding":"base64"}"#,
        );
        assert_eq!(
            content_source("a.txt", &small).unwrap(),
            ContentSource::Inline(Bytes::from_static(b"hello world"))
        );
    }

    #[test]
    fn test_large_file_falls_back_to_download_url() {
        let large = item(
            r#"{"name":"big.bin","path":"big.bin","sha":"b2","size":2000000,"type":"file",
            "download_url":"https://raw/big.bin","content":"","encoding":"none"}"#,
        );
        assert_eq!(
            content_source("big.bin", &large).unwrap(),
            ContentSource::Remote("https://raw/big.bin")
        );

        let neither = item(
            r#"{"name":"big.bin","path":"big.bin","sha":"b2","size":2000000,"type":"file",
            "download_url":null,"encoding":"none"}"#,
        );
        assert!(matches!(
            content_source("big.bin", &neither),
            Err(StoreError::Unavailable { .. })
        ));
    }

    #[test]
    fn test_rejected_upload_reports_its_size() {
        let err = map_status(StatusCode::PAYLOAD_TOO_LARGE, "big.bin", String::new());
        assert_eq!(
            with_payload_size(err, 30_000_000),
            StoreError::TooLarge {
                path: "big.bin".into(),
                size: 30_000_000,
                max: DEFAULT_MAX_BLOB_BYTES,
            }
        );
        let other = StoreError::conflict("a");
        assert_eq!(with_payload_size(other.clone(), 5), other);
    }

    #[test]
    fn test_put_body_omits_absent_sha() {
        let body = PutRequest {
            message: "Upload a.txt",
            content: BASE64.encode(b"hi"),
            sha: None,
            branch: None,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["content"], "aGk=");
        assert!(json.get("sha").is_none());
        assert!(json.get("branch").is_none());
    }
}
