//! In-memory remote store for pipeline tests.
//!
//! Files and directories live in a sorted map keyed by address. Block reads
//! hand out URLs under a configurable base (usually a wiremock server) so
//! the real blob client can fetch them. Every call is recorded in order.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use blockdrive_core::remote::CODE_NOT_FOUND;
use blockdrive_core::{
    BlockPlan, BlockRead, FileAddress, FileKind, Location, RemoteError, RemoteFile, RemoteStore,
    UploadTarget, WriteCommit,
};
use chrono::{DateTime, Utc};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// One recorded call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Stat(String),
    List(String),
    Mkdir(String, Option<DateTime<Utc>>),
    Remove(String, bool),
    Rename(String, String),
    Copy(String, String),
    ChangeTimes(String, Option<DateTime<Utc>>),
    Read(String, u64),
    UploadTarget(String, u64, u64),
    Write(String, WriteCommit),
    ResolveLocation(String),
    StreamingUrl(String),
}

#[derive(Debug, Clone)]
struct Entry {
    kind: FileKind,
    content: Vec<u8>,
    modified_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct State {
    entries: BTreeMap<String, Entry>,
    pending: HashMap<(String, u64), u32>,
    failing: HashMap<&'static str, String>,
    extra_children: HashMap<String, Vec<RemoteFile>>,
    calls: Vec<Call>,
}

type Observer = Box<dyn Fn(&Call) + Send + Sync>;

/// Fake [`RemoteStore`].
pub struct FakeRemote {
    base_url: String,
    block_size: u64,
    state: Mutex<State>,
    observer: Mutex<Option<Observer>>,
}

fn key(address: &FileAddress) -> String {
    address.to_string()
}

impl FakeRemote {
    pub fn new(base_url: impl Into<String>, block_size: u64) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            block_size,
            state: Mutex::new(State::default()),
            observer: Mutex::new(None),
        }
    }

    /// Runs `observer` on every call as it is received.
    pub fn observe(&self, observer: impl Fn(&Call) + Send + Sync + 'static) {
        *self.observer.lock().unwrap() = Some(Box::new(observer));
    }

    /// Appends a raw entry to the listing of `dir`, whatever its name.
    pub fn add_listing_entry(&self, dir: &FileAddress, entry: RemoteFile) {
        self.state
            .lock()
            .unwrap()
            .extra_children
            .entry(key(dir))
            .or_default()
            .push(entry);
    }

    /// Adds a file with the given content.
    pub fn add_file(&self, address: &FileAddress, content: &[u8]) {
        self.add_file_with_mtime(address, content, None);
    }

    pub fn add_file_with_mtime(
        &self,
        address: &FileAddress,
        content: &[u8],
        modified_at: Option<DateTime<Utc>>,
    ) {
        self.state.lock().unwrap().entries.insert(
            key(address),
            Entry {
                kind: FileKind::File,
                content: content.to_vec(),
                modified_at,
            },
        );
    }

    /// Adds a directory.
    pub fn add_dir(&self, address: &FileAddress) {
        self.state.lock().unwrap().entries.insert(
            key(address),
            Entry {
                kind: FileKind::Dir,
                content: Vec::new(),
                modified_at: None,
            },
        );
    }

    /// Makes the next `times` reads of block `index` answer pending.
    pub fn set_pending(&self, address: &FileAddress, index: u64, times: u32) {
        self.state
            .lock()
            .unwrap()
            .pending
            .insert((key(address), index), times);
    }

    /// Makes every call of `method` fail with an RPC error.
    pub fn fail_method(&self, method: &'static str, message: &str) {
        self.state
            .lock()
            .unwrap()
            .failing
            .insert(method, message.to_string());
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn exists(&self, address: &FileAddress) -> bool {
        self.state.lock().unwrap().entries.contains_key(&key(address))
    }

    /// URL the fake hands out for block `index` of `address`.
    pub fn block_url(&self, address: &FileAddress, index: u64) -> String {
        format!("{}{}", self.base_url, block_path(address))
            + &format!("?block={index}")
    }

    /// Serves the content of `address` block by block on `server`.
    ///
    /// `delays_ms[i]` delays the response of block `i`.
    pub async fn serve_blocks(&self, server: &MockServer, address: &FileAddress, delays_ms: &[u64]) {
        let content = self.state.lock().unwrap().entries[&key(address)].content.clone();
        let plan = BlockPlan::new(content.len() as u64, self.block_size).unwrap();
        for block in plan.blocks() {
            let start = usize::try_from(block.offset).unwrap();
            let end = usize::try_from(block.end()).unwrap();
            let delay = delays_ms
                .get(usize::try_from(block.index).unwrap())
                .copied()
                .unwrap_or(0);
            Mock::given(method("GET"))
                .and(path(block_path(address)))
                .and(query_param("block", block.index.to_string()))
                .respond_with(
                    ResponseTemplate::new(200)
                        .set_body_bytes(content[start..end].to_vec())
                        .set_delay(std::time::Duration::from_millis(delay)),
                )
                .mount(server)
                .await;
        }
    }

    fn record(&self, call: Call) {
        if let Some(observer) = self.observer.lock().unwrap().as_ref() {
            observer(&call);
        }
        self.state.lock().unwrap().calls.push(call);
    }

    fn check_failing(&self, method: &'static str) -> Result<(), RemoteError> {
        match self.state.lock().unwrap().failing.get(method) {
            Some(message) => Err(RemoteError::rpc(method, "internal", message.clone())),
            None => Ok(()),
        }
    }

    fn entry(&self, method: &'static str, address: &FileAddress) -> Result<Entry, RemoteError> {
        self.state
            .lock()
            .unwrap()
            .entries
            .get(&key(address))
            .cloned()
            .ok_or_else(|| RemoteError::rpc(method, CODE_NOT_FOUND, format!("{address} not found")))
    }
}

fn block_path(address: &FileAddress) -> String {
    format!("/blob/{}/{}{}", address.node_id, address.location, address.path)
}

fn to_remote_file(address: &FileAddress, entry: &Entry, with_hash: bool) -> RemoteFile {
    RemoteFile {
        name: address.file_name().unwrap_or_default().to_string(),
        kind: entry.kind,
        size: entry.content.len() as u64,
        hash: with_hash.then(|| format!("hash:{}", address.path)),
        modified_at: entry.modified_at,
    }
}

impl std::fmt::Debug for FakeRemote {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FakeRemote")
            .field("base_url", &self.base_url)
            .field("block_size", &self.block_size)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl RemoteStore for FakeRemote {
    async fn stat(&self, address: &FileAddress, with_hash: bool) -> Result<RemoteFile, RemoteError> {
        self.record(Call::Stat(key(address)));
        self.check_failing("Stat")?;
        let entry = self.entry("Stat", address)?;
        Ok(to_remote_file(address, &entry, with_hash))
    }

    async fn list(&self, address: &FileAddress) -> Result<Vec<RemoteFile>, RemoteError> {
        self.record(Call::List(key(address)));
        self.check_failing("List")?;
        let prefix = format!("{}/", key(address).trim_end_matches('/'));
        let state = self.state.lock().unwrap();
        let mut files: Vec<RemoteFile> = state
            .entries
            .iter()
            .filter(|(k, _)| k.starts_with(&prefix) && !k[prefix.len()..].contains('/'))
            .map(|(k, entry)| {
                let child: FileAddress = k.parse().unwrap();
                to_remote_file(&child, entry, false)
            })
            .collect();
        files.extend(state.extra_children.get(&key(address)).cloned().unwrap_or_default());
        Ok(files)
    }

    async fn mkdir(
        &self,
        address: &FileAddress,
        mtime: Option<DateTime<Utc>>,
    ) -> Result<(), RemoteError> {
        self.record(Call::Mkdir(key(address), mtime));
        self.check_failing("Mkdir")?;
        self.add_dir(address);
        Ok(())
    }

    async fn remove(&self, address: &FileAddress, recursive: bool) -> Result<(), RemoteError> {
        self.record(Call::Remove(key(address), recursive));
        self.check_failing("Remove")?;
        let root = key(address);
        let prefix = format!("{}/", root.trim_end_matches('/'));
        self.state
            .lock()
            .unwrap()
            .entries
            .retain(|k, _| k != &root && !k.starts_with(&prefix));
        Ok(())
    }

    async fn rename(&self, src: &FileAddress, dest: &FileAddress) -> Result<(), RemoteError> {
        self.record(Call::Rename(key(src), key(dest)));
        self.check_failing("Move")?;
        let entry = self.entry("Move", src)?;
        let mut state = self.state.lock().unwrap();
        state.entries.remove(&key(src));
        state.entries.insert(key(dest), entry);
        Ok(())
    }

    async fn copy(&self, src: &FileAddress, dest: &FileAddress) -> Result<(), RemoteError> {
        self.record(Call::Copy(key(src), key(dest)));
        self.check_failing("Copy")?;
        let entry = self.entry("Copy", src)?;
        self.state.lock().unwrap().entries.insert(key(dest), entry);
        Ok(())
    }

    async fn change_times(
        &self,
        address: &FileAddress,
        _atime: DateTime<Utc>,
        mtime: Option<DateTime<Utc>>,
    ) -> Result<(), RemoteError> {
        self.record(Call::ChangeTimes(key(address), mtime));
        self.check_failing("Chtimes")
    }

    async fn read_block(&self, address: &FileAddress, index: u64) -> Result<BlockRead, RemoteError> {
        self.record(Call::Read(key(address), index));
        self.check_failing("Read")?;
        self.entry("Read", address)?;
        {
            let mut state = self.state.lock().unwrap();
            if let Some(remaining) = state.pending.get_mut(&(key(address), index))
                && *remaining > 0
            {
                *remaining -= 1;
                return Ok(BlockRead::pending());
            }
        }
        Ok(BlockRead::ready(self.block_url(address, index)))
    }

    async fn request_upload_target(
        &self,
        address: &FileAddress,
        _hash: &str,
        index: u64,
        size: u64,
    ) -> Result<UploadTarget, RemoteError> {
        self.record(Call::UploadTarget(key(address), index, size));
        self.check_failing("Upload")?;
        Ok(UploadTarget {
            url: format!("{}/upload{}?block={index}", self.base_url, address.path),
        })
    }

    async fn commit_write_block(
        &self,
        address: &FileAddress,
        commit: &WriteCommit,
    ) -> Result<(), RemoteError> {
        self.record(Call::Write(key(address), commit.clone()));
        self.check_failing("Write")
    }

    async fn resolve_location(&self, address: &FileAddress) -> Result<Location, RemoteError> {
        self.record(Call::ResolveLocation(key(address)));
        self.check_failing("GetLocationByContext")?;
        Ok(Location {
            block_size: self.block_size,
            network: None,
        })
    }

    async fn streaming_url(&self, address: &FileAddress) -> Result<String, RemoteError> {
        self.record(Call::StreamingUrl(key(address)));
        Ok(format!("{}/stream{}.m3u8", self.base_url, address.path))
    }
}
