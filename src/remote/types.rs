//! Value types exchanged with the remote store.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// `(node, location, path)` triple naming a file or directory in the remote store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileAddress {
    /// Remote node hosting the location.
    pub node_id: String,
    /// Location name on that node.
    pub location: String,
    /// Slash-separated path inside the location.
    pub path: String,
}

impl FileAddress {
    /// Builds an address from its three parts.
    pub fn new(
        node_id: impl Into<String>,
        location: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        Self {
            node_id: node_id.into(),
            location: location.into(),
            path: path.into(),
        }
    }

    /// Address of the child `name` under this directory address.
    #[must_use]
    pub fn join(&self, name: &str) -> Self {
        let base = self.path.trim_end_matches('/');
        let name = name.trim_start_matches('/');
        Self {
            node_id: self.node_id.clone(),
            location: self.location.clone(),
            path: format!("{base}/{name}"),
        }
    }

    /// Last path segment, if any.
    #[must_use]
    pub fn file_name(&self) -> Option<&str> {
        self.path
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .filter(|name| !name.is_empty())
    }

    /// Whether both addresses live on the same remote node.
    #[must_use]
    pub fn same_node(&self, other: &Self) -> bool {
        self.node_id == other.node_id
    }
}

impl fmt::Display for FileAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.node_id, self.location, self.path)
    }
}

/// Parses `NODE:LOCATION:PATH`; the path keeps any further colons.
impl FromStr for FileAddress {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, ':');
        let (Some(node_id), Some(location), Some(path)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(format!("expected NODE:LOCATION:PATH, got '{s}'"));
        };
        if node_id.is_empty() || location.is_empty() {
            return Err(format!("node and location must not be empty in '{s}'"));
        }
        let path = if path.is_empty() { "/" } else { path };
        Ok(Self::new(node_id, location, path))
    }
}

/// Whether a remote entry is a regular file or a directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileKind {
    /// Regular file.
    File,
    /// Directory.
    Dir,
}

/// Metadata of one remote entry, as returned by stat and list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFile {
    /// Entry name (last path segment).
    pub name: String,
    /// File or directory.
    pub kind: FileKind,
    /// Size in bytes (0 for directories).
    pub size: u64,
    /// Content hash, only filled when requested from stat.
    pub hash: Option<String>,
    /// Last modification time.
    pub modified_at: Option<DateTime<Utc>>,
}

impl RemoteFile {
    /// Whether this entry is a directory.
    #[must_use]
    pub fn is_dir(&self) -> bool {
        self.kind == FileKind::Dir
    }
}

/// Materialization state of a requested block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockStatus {
    /// Payload is available at the returned URL.
    Ready,
    /// Backing data not materialized yet; ask again later.
    Pending,
}

/// Result of a block read request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockRead {
    /// Whether the block can be fetched now.
    pub status: BlockStatus,
    /// Where to GET the payload once ready.
    pub url: Option<String>,
}

impl BlockRead {
    /// A ready block served from `url`.
    pub fn ready(url: impl Into<String>) -> Self {
        Self {
            status: BlockStatus::Ready,
            url: Some(url.into()),
        }
    }

    /// A block that is not materialized yet.
    #[must_use]
    pub fn pending() -> Self {
        Self {
            status: BlockStatus::Pending,
            url: None,
        }
    }

    /// Whether the block must be requested again.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.status == BlockStatus::Pending
    }
}

/// Storage location settings that govern block layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    /// Fixed block size in bytes.
    pub block_size: u64,
    /// Network kind of the backing storage, when reported.
    pub network: Option<String>,
}

/// Where to PUT one block of an upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadTarget {
    /// Pre-signed upload URL.
    pub url: String,
}

/// Commit of one written block.
///
/// Uploads send only hash and index; remote-to-remote copies also carry the
/// destination offset and the source block URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteCommit {
    /// Whole-file content hash.
    pub hash: String,
    /// Block index.
    pub index: u64,
    /// Destination byte offset.
    pub offset: Option<u64>,
    /// Source block URL the store pulls from.
    pub source_url: Option<String>,
}

impl WriteCommit {
    /// Commit for an uploaded block whose bytes were already PUT.
    pub fn uploaded(hash: impl Into<String>, index: u64) -> Self {
        Self {
            hash: hash.into(),
            index,
            offset: None,
            source_url: None,
        }
    }

    /// Commit asking the store to pull a block from another node.
    pub fn copied(
        hash: impl Into<String>,
        index: u64,
        offset: u64,
        source_url: impl Into<String>,
    ) -> Self {
        Self {
            hash: hash.into(),
            index,
            offset: Some(offset),
            source_url: Some(source_url.into()),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_join_handles_trailing_and_root_slashes() {
        let root = FileAddress::new("n", "loc", "/");
        assert_eq!(root.join("a.txt").path, "/a.txt");

        let dir = FileAddress::new("n", "loc", "/photos/");
        assert_eq!(dir.join("b.jpg").path, "/photos/b.jpg");
        assert_eq!(dir.join("b.jpg").node_id, "n");
    }

    #[test]
    fn test_file_name_is_last_segment() {
        assert_eq!(FileAddress::new("n", "l", "/a/b.txt").file_name(), Some("b.txt"));
        assert_eq!(FileAddress::new("n", "l", "/a/dir/").file_name(), Some("dir"));
        assert_eq!(FileAddress::new("n", "l", "/").file_name(), None);
    }

    #[test]
    fn test_parse_address_keeps_colons_in_path() {
        let address: FileAddress = "node-1:media:/clips/a:b.mp4".parse().unwrap();
        assert_eq!(address.node_id, "node-1");
        assert_eq!(address.location, "media");
        assert_eq!(address.path, "/clips/a:b.mp4");
        assert_eq!(address.to_string(), "node-1:media:/clips/a:b.mp4");
    }

    #[test]
    fn test_parse_address_rejects_missing_parts() {
        assert!("node-only".parse::<FileAddress>().is_err());
        assert!(":loc:/a".parse::<FileAddress>().is_err());
        assert_eq!("n:l:".parse::<FileAddress>().unwrap().path, "/");
    }

    #[test]
    fn test_address_serializes_camel_case() {
        let json = serde_json::to_value(FileAddress::new("n", "l", "/p")).unwrap();
        assert_eq!(json["nodeId"], "n");
        assert_eq!(json["location"], "l");
        assert_eq!(json["path"], "/p");
    }

    #[test]
    fn test_write_commit_constructors() {
        let upload = WriteCommit::uploaded("abc", 3);
        assert_eq!(upload.offset, None);
        assert_eq!(upload.source_url, None);

        let copy = WriteCommit::copied("abc", 2, 2048, "http://x/b2");
        assert_eq!(copy.offset, Some(2048));
        assert_eq!(copy.source_url.as_deref(), Some("http://x/b2"));
    }
}
