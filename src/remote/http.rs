//! JSON-over-HTTP client for the remote store.
//!
//! Every operation is a unary RPC: `POST {endpoint}/{package}.{Service}/{Method}`
//! with a JSON body using protobuf JSON conventions (camelCase fields, 64-bit
//! integers as strings, RFC 3339 timestamps). Failures come back as a non-2xx
//! status with an optional `{"code", "message"}` body.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, instrument};
use url::Url;

use super::error::{CODE_NOT_FOUND, CODE_PERMISSION_DENIED};
use super::{
    BlockRead, FileAddress, FileKind, Location, RemoteError, RemoteFile, RemoteStore,
    UploadTarget, WriteCommit,
};
use crate::constants::{CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS};

/// Protobuf package the store's services are registered under.
pub const DEFAULT_RPC_PACKAGE: &str = "pixelfs.v1";

const FILE_SYSTEM_SERVICE: &str = "FileSystemService";
const STORAGE_SERVICE: &str = "StorageService";
const LOCATION_SERVICE: &str = "LocationService";

/// Blocks are addressed by fixed size, never by media duration.
const BLOCK_TYPE_SIZE: &str = "SIZE";

// Numeric fallbacks for enums, used only when the server sends numbers.
const FILE_TYPE_DIR: i64 = 1;
const BLOCK_STATUS_PENDING: i64 = 1;

/// HTTP implementation of [`RemoteStore`].
///
/// Cheap to clone; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct HttpRemoteStore {
    client: Client,
    base: Url,
    package: String,
    token: Option<String>,
}

impl HttpRemoteStore {
    /// Creates a client for `endpoint` with default timeouts.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::InvalidEndpoint`] if `endpoint` is not an absolute
    /// base URL, or [`RemoteError::Client`] if the HTTP client cannot be built.
    pub fn new(endpoint: &str) -> Result<Self, RemoteError> {
        Self::with_timeouts(endpoint, CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS)
    }

    /// Creates a client with explicit timeout values.
    ///
    /// # Errors
    ///
    /// Same as [`HttpRemoteStore::new`].
    pub fn with_timeouts(
        endpoint: &str,
        connect_timeout_secs: u64,
        read_timeout_secs: u64,
    ) -> Result<Self, RemoteError> {
        let base = parse_base(endpoint)?;
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(connect_timeout_secs))
            .read_timeout(Duration::from_secs(read_timeout_secs))
            .build()
            .map_err(RemoteError::Client)?;

        Ok(Self {
            client,
            base,
            package: DEFAULT_RPC_PACKAGE.to_string(),
            token: None,
        })
    }

    /// Attaches a bearer token to every call.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Overrides the protobuf package prefix of method paths.
    #[must_use]
    pub fn with_package(mut self, package: impl Into<String>) -> Self {
        self.package = package.into();
        self
    }

    /// Normalized base URL (always ends with `/`).
    #[must_use]
    pub fn endpoint(&self) -> &Url {
        &self.base
    }

    fn method_url(&self, service: &str, method: &str) -> Result<Url, RemoteError> {
        self.base
            .join(&format!("{}.{service}/{method}", self.package))
            .map_err(|_| RemoteError::InvalidEndpoint {
                endpoint: self.base.to_string(),
            })
    }

    #[instrument(level = "debug", skip(self, body))]
    async fn call<Req, Resp>(
        &self,
        service: &'static str,
        method: &'static str,
        body: &Req,
    ) -> Result<Resp, RemoteError>
    where
        Req: Serialize + Sync + ?Sized,
        Resp: DeserializeOwned,
    {
        let url = self.method_url(service, method)?;
        let mut request = self.client.post(url).json(body);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| RemoteError::transport(method, e))?;
        let status = response.status();
        let payload = response
            .bytes()
            .await
            .map_err(|e| RemoteError::transport(method, e))?;

        if !status.is_success() {
            let error = decode_rpc_error(method, status, &payload);
            debug!(%status, error = %error, "rpc call failed");
            return Err(error);
        }

        serde_json::from_slice(&payload)
            .map_err(|e| RemoteError::invalid_response(method, e.to_string()))
    }
}

fn parse_base(endpoint: &str) -> Result<Url, RemoteError> {
    let invalid = || RemoteError::InvalidEndpoint {
        endpoint: endpoint.to_string(),
    };
    let mut url = Url::parse(endpoint).map_err(|_| invalid())?;
    if url.cannot_be_a_base() || !matches!(url.scheme(), "http" | "https") {
        return Err(invalid());
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

fn decode_rpc_error(method: &'static str, status: StatusCode, body: &[u8]) -> RemoteError {
    let parsed: Option<RpcErrorBody> = serde_json::from_slice(body).ok();
    let code = parsed
        .as_ref()
        .and_then(|b| b.code.clone())
        .unwrap_or_else(|| code_for_status(status).to_string());
    let message = parsed
        .and_then(|b| b.message)
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown error").to_string());
    RemoteError::rpc(method, code, message)
}

/// Maps an HTTP status to the RPC code the store would have sent.
#[allow(clippy::match_same_arms)]
fn code_for_status(status: StatusCode) -> &'static str {
    match status.as_u16() {
        400 => "invalid_argument",
        401 => "unauthenticated",
        403 => CODE_PERMISSION_DENIED,
        404 => CODE_NOT_FOUND,
        408 | 504 => "deadline_exceeded",
        409 => "already_exists",
        429 => "resource_exhausted",
        501 => "unimplemented",
        503 => "unavailable",
        _ => "unknown",
    }
}

// ==================== Wire types ====================

#[derive(Serialize)]
struct ContextRequest<'a> {
    context: &'a FileAddress,
}

#[derive(Serialize)]
struct StatRequest<'a> {
    context: &'a FileAddress,
    hash: bool,
}

#[derive(Serialize)]
struct MkdirRequest<'a> {
    context: &'a FileAddress,
    #[serde(skip_serializing_if = "Option::is_none")]
    mtime: Option<DateTime<Utc>>,
}

#[derive(Serialize)]
struct RemoveRequest<'a> {
    context: &'a FileAddress,
    recursive: bool,
}

#[derive(Serialize)]
struct PairRequest<'a> {
    src: &'a FileAddress,
    dest: &'a FileAddress,
}

#[derive(Serialize)]
struct ChtimesRequest<'a> {
    context: &'a FileAddress,
    atime: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    mtime: Option<DateTime<Utc>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ReadRequest<'a> {
    context: &'a FileAddress,
    block_type: &'static str,
    block_index: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WriteRequest<'a> {
    context: &'a FileAddress,
    hash: &'a str,
    block_type: &'static str,
    block_index: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    offset: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    url: Option<&'a str>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UploadRequest<'a> {
    context: &'a FileAddress,
    hash: &'a str,
    block_type: &'static str,
    block_index: String,
    block_size: String,
}

#[derive(Serialize, Default)]
struct EmptyMessage {}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StreamRequest<'a> {
    context: &'a FileAddress,
    block_settings: EmptyMessage,
}

#[derive(Deserialize)]
struct StatResponse {
    file: WireFile,
}

#[derive(Deserialize)]
struct ListResponse {
    #[serde(default)]
    files: Vec<WireFile>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReadResponse {
    #[serde(default)]
    block_status: Option<WireEnum>,
    #[serde(default)]
    url: Option<String>,
}

#[derive(Deserialize)]
struct UrlResponse {
    #[serde(default)]
    url: String,
}

#[derive(Deserialize)]
struct LocationResponse {
    location: WireLocation,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireLocation {
    #[serde(default, deserialize_with = "de_u64")]
    block_size: u64,
    #[serde(default)]
    network: Option<WireEnum>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireFile {
    #[serde(default)]
    name: String,
    #[serde(default, rename = "type")]
    kind: Option<WireEnum>,
    #[serde(default, deserialize_with = "de_u64")]
    size: u64,
    #[serde(default)]
    hash: Option<String>,
    #[serde(default)]
    modified_at: Option<DateTime<Utc>>,
}

impl From<WireFile> for RemoteFile {
    fn from(file: WireFile) -> Self {
        let is_dir = file
            .kind
            .as_ref()
            .is_some_and(|kind| kind.is("DIR", FILE_TYPE_DIR));
        Self {
            name: file.name,
            kind: if is_dir { FileKind::Dir } else { FileKind::File },
            size: file.size,
            hash: file.hash.filter(|h| !h.is_empty()),
            modified_at: file.modified_at,
        }
    }
}

/// Protobuf enum as either its name or its number.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireEnum {
    Name(String),
    Number(i64),
}

impl WireEnum {
    /// Matches `DIR`, `FILE_TYPE_DIR` style names or the numeric value.
    fn is(&self, name: &str, number: i64) -> bool {
        match self {
            Self::Name(value) => {
                value.eq_ignore_ascii_case(name)
                    || value
                        .to_ascii_uppercase()
                        .ends_with(&format!("_{}", name.to_ascii_uppercase()))
            }
            Self::Number(value) => *value == number,
        }
    }

    fn label(&self) -> String {
        match self {
            Self::Name(value) => value.clone(),
            Self::Number(value) => value.to_string(),
        }
    }
}

/// Accepts protobuf int64 encoded either as a JSON string or a number.
fn de_u64<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(value) => Ok(value),
        Raw::Text(text) => text.parse().map_err(serde::de::Error::custom),
    }
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
    #[instrument(skip(self), fields(address = %address))]
    async fn stat(
        &self,
        address: &FileAddress,
        with_hash: bool,
    ) -> Result<RemoteFile, RemoteError> {
        let response: StatResponse = self
            .call(
                FILE_SYSTEM_SERVICE,
                "Stat",
                &StatRequest {
                    context: address,
                    hash: with_hash,
                },
            )
            .await?;
        Ok(response.file.into())
    }

    #[instrument(skip(self), fields(address = %address))]
    async fn list(&self, address: &FileAddress) -> Result<Vec<RemoteFile>, RemoteError> {
        let response: ListResponse = self
            .call(FILE_SYSTEM_SERVICE, "List", &ContextRequest { context: address })
            .await?;
        Ok(response.files.into_iter().map(RemoteFile::from).collect())
    }

    #[instrument(skip(self), fields(address = %address))]
    async fn mkdir(
        &self,
        address: &FileAddress,
        mtime: Option<DateTime<Utc>>,
    ) -> Result<(), RemoteError> {
        let _: IgnoredAny = self
            .call(
                FILE_SYSTEM_SERVICE,
                "Mkdir",
                &MkdirRequest {
                    context: address,
                    mtime,
                },
            )
            .await?;
        Ok(())
    }

    #[instrument(skip(self), fields(address = %address))]
    async fn remove(&self, address: &FileAddress, recursive: bool) -> Result<(), RemoteError> {
        let _: IgnoredAny = self
            .call(
                FILE_SYSTEM_SERVICE,
                "Remove",
                &RemoveRequest {
                    context: address,
                    recursive,
                },
            )
            .await?;
        Ok(())
    }

    #[instrument(skip(self), fields(src = %src, dest = %dest))]
    async fn rename(&self, src: &FileAddress, dest: &FileAddress) -> Result<(), RemoteError> {
        let _: IgnoredAny = self
            .call(FILE_SYSTEM_SERVICE, "Move", &PairRequest { src, dest })
            .await?;
        Ok(())
    }

    #[instrument(skip(self), fields(src = %src, dest = %dest))]
    async fn copy(&self, src: &FileAddress, dest: &FileAddress) -> Result<(), RemoteError> {
        let _: IgnoredAny = self
            .call(FILE_SYSTEM_SERVICE, "Copy", &PairRequest { src, dest })
            .await?;
        Ok(())
    }

    #[instrument(skip(self), fields(address = %address))]
    async fn change_times(
        &self,
        address: &FileAddress,
        atime: DateTime<Utc>,
        mtime: Option<DateTime<Utc>>,
    ) -> Result<(), RemoteError> {
        let _: IgnoredAny = self
            .call(
                FILE_SYSTEM_SERVICE,
                "Chtimes",
                &ChtimesRequest {
                    context: address,
                    atime,
                    mtime,
                },
            )
            .await?;
        Ok(())
    }

    #[instrument(level = "debug", skip(self), fields(address = %address))]
    async fn read_block(
        &self,
        address: &FileAddress,
        index: u64,
    ) -> Result<BlockRead, RemoteError> {
        let response: ReadResponse = self
            .call(
                FILE_SYSTEM_SERVICE,
                "Read",
                &ReadRequest {
                    context: address,
                    block_type: BLOCK_TYPE_SIZE,
                    block_index: index.to_string(),
                },
            )
            .await?;

        let pending = response
            .block_status
            .as_ref()
            .is_some_and(|status| status.is("PENDING", BLOCK_STATUS_PENDING));
        if pending {
            return Ok(BlockRead::pending());
        }

        match response.url.filter(|url| !url.is_empty()) {
            Some(url) => Ok(BlockRead::ready(url)),
            None => Err(RemoteError::invalid_response(
                "Read",
                format!("block {index} is ready but has no url"),
            )),
        }
    }

    #[instrument(level = "debug", skip(self, hash), fields(address = %address))]
    async fn request_upload_target(
        &self,
        address: &FileAddress,
        hash: &str,
        index: u64,
        size: u64,
    ) -> Result<UploadTarget, RemoteError> {
        let response: UrlResponse = self
            .call(
                STORAGE_SERVICE,
                "Upload",
                &UploadRequest {
                    context: address,
                    hash,
                    block_type: BLOCK_TYPE_SIZE,
                    block_index: index.to_string(),
                    block_size: size.to_string(),
                },
            )
            .await?;

        if response.url.is_empty() {
            return Err(RemoteError::invalid_response(
                "Upload",
                format!("no upload url for block {index}"),
            ));
        }
        Ok(UploadTarget { url: response.url })
    }

    #[instrument(level = "debug", skip(self, commit), fields(address = %address, index = commit.index))]
    async fn commit_write_block(
        &self,
        address: &FileAddress,
        commit: &WriteCommit,
    ) -> Result<(), RemoteError> {
        let _: IgnoredAny = self
            .call(
                FILE_SYSTEM_SERVICE,
                "Write",
                &WriteRequest {
                    context: address,
                    hash: &commit.hash,
                    block_type: BLOCK_TYPE_SIZE,
                    block_index: commit.index.to_string(),
                    offset: commit.offset.map(|offset| offset.to_string()),
                    url: commit.source_url.as_deref(),
                },
            )
            .await?;
        Ok(())
    }

    #[instrument(skip(self), fields(address = %address))]
    async fn resolve_location(&self, address: &FileAddress) -> Result<Location, RemoteError> {
        let response: LocationResponse = self
            .call(
                LOCATION_SERVICE,
                "GetLocationByContext",
                &ContextRequest { context: address },
            )
            .await?;

        if response.location.block_size == 0 {
            return Err(RemoteError::invalid_response(
                "GetLocationByContext",
                "location block size is zero",
            ));
        }
        Ok(Location {
            block_size: response.location.block_size,
            network: response.location.network.map(|n| n.label()),
        })
    }

    #[instrument(skip(self), fields(address = %address))]
    async fn streaming_url(&self, address: &FileAddress) -> Result<String, RemoteError> {
        let response: UrlResponse = self
            .call(
                FILE_SYSTEM_SERVICE,
                "M3U8",
                &StreamRequest {
                    context: address,
                    block_settings: EmptyMessage::default(),
                },
            )
            .await?;
        Ok(response.url)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_base_appends_trailing_slash() {
        let url = parse_base("https://store.example.com/api").unwrap();
        assert_eq!(url.as_str(), "https://store.example.com/api/");
    }

    #[test]
    fn test_parse_base_rejects_non_http() {
        assert!(parse_base("not a url").is_err());
        assert!(parse_base("mailto:someone@example.com").is_err());
        assert!(parse_base("ftp://example.com").is_err());
    }

    #[test]
    fn test_method_url_uses_package_and_service() {
        let store = HttpRemoteStore::new("http://127.0.0.1:9000/rpc").unwrap();
        let url = store.method_url(FILE_SYSTEM_SERVICE, "Stat").unwrap();
        assert_eq!(
            url.as_str(),
            "http://127.0.0.1:9000/rpc/pixelfs.v1.FileSystemService/Stat"
        );

        let custom = store.with_package("store.v2");
        let url = custom.method_url(LOCATION_SERVICE, "GetLocationByContext").unwrap();
        assert!(url.path().ends_with("/store.v2.LocationService/GetLocationByContext"));
    }

    #[test]
    fn test_decode_rpc_error_prefers_body() {
        let err = decode_rpc_error(
            "Stat",
            StatusCode::NOT_FOUND,
            br#"{"code":"not_found","message":"no such file"}"#,
        );
        assert!(err.is_not_found());
        assert!(err.to_string().contains("no such file"));
    }

    #[test]
    fn test_decode_rpc_error_falls_back_to_status() {
        let err = decode_rpc_error("Remove", StatusCode::FORBIDDEN, b"<html>denied</html>");
        assert_eq!(err.code(), Some(CODE_PERMISSION_DENIED));
    }

    #[test]
    fn test_wire_file_accepts_string_and_number_sizes() {
        let file: WireFile =
            serde_json::from_str(r#"{"name":"a","type":"DIR","size":"1024"}"#).unwrap();
        let file = RemoteFile::from(file);
        assert!(file.is_dir());
        assert_eq!(file.size, 1024);

        let file: WireFile = serde_json::from_str(r#"{"name":"b","size":7}"#).unwrap();
        let file = RemoteFile::from(file);
        assert_eq!(file.kind, FileKind::File);
        assert_eq!(file.size, 7);
    }

    #[test]
    fn test_wire_enum_matches_prefixed_names_and_numbers() {
        assert!(WireEnum::Name("BLOCK_STATUS_PENDING".into()).is("PENDING", 1));
        assert!(WireEnum::Name("pending".into()).is("PENDING", 1));
        assert!(WireEnum::Number(1).is("PENDING", 1));
        assert!(!WireEnum::Name("READY".into()).is("PENDING", 1));
    }

    #[test]
    fn test_write_request_omits_copy_fields_for_uploads() {
        let address = FileAddress::new("n", "l", "/a");
        let body = serde_json::to_value(WriteRequest {
            context: &address,
            hash: "h",
            block_type: BLOCK_TYPE_SIZE,
            block_index: "3".to_string(),
            offset: None,
            url: None,
        })
        .unwrap();
        assert_eq!(body["blockIndex"], "3");
        assert_eq!(body["context"]["nodeId"], "n");
        assert!(body.get("offset").is_none());
        assert!(body.get("url").is_none());
    }
}
