use std::collections::HashMap;
use std::io::Read;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use shroudfs::crypto::obscure;
use shroudfs::store::MemoryStore;
use shroudfs::{CryptOverlay, FilenameMode, ObjectInfo, ObjectStore};

/// Mount an overlay over a fresh in-memory store, returning both so tests
/// can inspect the raw encrypted layout.
pub fn mount(mode: FilenameMode, password: &str) -> (Arc<MemoryStore>, CryptOverlay) {
    let store = Arc::new(MemoryStore::new());
    let mode_str = match mode {
        FilenameMode::Off => "off",
        FilenameMode::Standard => "standard",
        FilenameMode::Obfuscate => "obfuscate",
    };
    let obscured = obscure(password);
    let params: HashMap<String, String> = [
        ("type", "crypt"),
        ("remote", "memory:"),
        ("password", obscured.as_str()),
        ("filename_encryption", mode_str),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();

    let overlay = shroudfs::CryptConfig::from_params(&params)
        .expect("valid test config")
        .mount(store.clone())
        .expect("mount should succeed");
    (store, overlay)
}

pub fn test_mtime() -> SystemTime {
    SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000)
}

pub fn put(overlay: &CryptOverlay, path: &str, data: &[u8]) {
    overlay
        .put(
            &mut &data[..],
            &ObjectInfo {
                path: path.to_owned(),
                size: data.len() as u64,
                mtime: test_mtime(),
            },
        )
        .unwrap_or_else(|err| panic!("put {path} failed: {err}"));
}

pub fn read_all(overlay: &CryptOverlay, path: &str) -> Vec<u8> {
    let mut out = Vec::new();
    overlay
        .open(path, 0, None)
        .unwrap_or_else(|err| panic!("open {path} failed: {err}"))
        .read_to_end(&mut out)
        .unwrap_or_else(|err| panic!("read {path} failed: {err}"));
    out
}

/// Content of `len` bytes that differs at every offset window.
pub fn sized_content(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}
