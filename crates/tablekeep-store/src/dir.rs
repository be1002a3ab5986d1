// ABOUTME: Directory-backed durable key-value store with one file per key.
// ABOUTME: Writes go to a temp file, are fsynced, then atomically renamed over the target.

use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::kv::{KvStore, StoreError};

const VALUE_SUFFIX: &str = ".kv";
const TMP_SUFFIX: &str = ".tmp";

/// A durable store rooted at a directory.
pub struct DirKvStore {
    root: PathBuf,
}

impl DirKvStore {
    /// Open a store rooted at `root`, creating the directory if needed.
    pub fn open(root: &Path) -> Result<Self, StoreError> {
        fs::create_dir_all(root)?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{}{}", encode_key(key), VALUE_SUFFIX))
    }
}

#[async_trait]
impl KvStore for DirKvStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        match fs::read(self.path_for(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        let final_path = self.path_for(key);
        let tmp_path = self
            .root
            .join(format!("{}{}", encode_key(key), TMP_SUFFIX));

        let mut file = File::create(&tmp_path)?;
        file.write_all(value)?;
        file.sync_all()?;
        drop(file);

        fs::rename(&tmp_path, &final_path)?;

        // Best-effort: the rename already happened, so a failed directory
        // fsync leaves consistent data behind.
        if let Ok(dir) = File::open(&self.root) {
            let _ = dir.sync_all();
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_keys(&self) -> Result<Vec<String>, StoreError> {
        let mut keys = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let name = entry.file_name();
            let name_str = name.to_string_lossy();

            if let Some(encoded) = name_str.strip_suffix(VALUE_SUFFIX) {
                match decode_key(encoded) {
                    Some(key) => keys.push(key),
                    None => tracing::warn!("skipping unrecognized store file {}", name_str),
                }
            }
        }
        keys.sort();
        Ok(keys)
    }
}

/// Percent-encode everything outside `[A-Za-z0-9_-]` so any key is a safe file name.
fn encode_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for b in key.bytes() {
        if b.is_ascii_alphanumeric() || b == b'_' || b == b'-' {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{:02X}", b));
        }
    }
    out
}

fn decode_key(encoded: &str) -> Option<String> {
    let bytes = encoded.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = encoded.get(i + 1..i + 3)?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}
