//! In-memory object store.
//!
//! Backs the integration tests and doubles as a reference for the trait
//! contract: full feature flags, nanosecond mtime precision, and strict
//! size checking on put. Every open is recorded so tests can assert which
//! byte ranges the overlay actually requested.

use std::collections::{BTreeMap, BTreeSet};
use std::io::{self, Read};
use std::sync::Mutex;
use std::time::{Duration, SystemTime};

use super::{
    Entry, Features, HashKind, ListDepth, ObjectInfo, ObjectMeta, ObjectStore, StoreError, Usage,
};

#[derive(Clone)]
struct StoredObject {
    data: Vec<u8>,
    mtime: SystemTime,
}

#[derive(Default)]
struct State {
    objects: BTreeMap<String, StoredObject>,
    dirs: BTreeSet<String>,
    opens: Vec<(String, u64)>,
}

/// A thread-safe in-memory store with all optional features enabled.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// `(path, offset)` pairs recorded for every `open` call, oldest first.
    pub fn recorded_opens(&self) -> Vec<(String, u64)> {
        self.lock().opens.clone()
    }

    /// Raw stored names, for asserting on the encrypted layout.
    pub fn object_names(&self) -> Vec<String> {
        self.lock().objects.keys().cloned().collect()
    }

    /// Raw stored bytes of one object.
    pub fn raw_object(&self, path: &str) -> Option<Vec<u8>> {
        self.lock().objects.get(path).map(|o| o.data.clone())
    }

    /// Overwrite or insert raw bytes, bypassing the trait. Lets tests
    /// plant foreign or corrupted objects.
    pub fn insert_raw(&self, path: &str, data: Vec<u8>) {
        self.lock().objects.insert(
            path.to_owned(),
            StoredObject {
                data,
                mtime: SystemTime::now(),
            },
        );
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn child_prefix(prefix: &str) -> String {
    if prefix.is_empty() {
        String::new()
    } else {
        format!("{prefix}/")
    }
}

impl ObjectStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    fn features(&self) -> Features {
        Features {
            copy: true,
            move_object: true,
            dir_move: true,
            purge: true,
            put_unchecked: true,
            duplicate_files: false,
            about: true,
        }
    }

    fn hashes(&self) -> Vec<HashKind> {
        vec![HashKind::Md5, HashKind::Sha1]
    }

    fn precision(&self) -> Duration {
        Duration::from_nanos(1)
    }

    fn list(&self, prefix: &str, depth: ListDepth) -> Result<Vec<Entry>, StoreError> {
        let state = self.lock();
        let pfx = child_prefix(prefix);

        let mut dirs: BTreeSet<String> = BTreeSet::new();
        let mut objects = Vec::new();

        for (path, object) in &state.objects {
            let rel = match path.strip_prefix(&pfx) {
                Some(rel) if !rel.is_empty() => rel,
                _ => continue,
            };
            match depth {
                ListDepth::Single => {
                    if let Some((head, _)) = rel.split_once('/') {
                        dirs.insert(format!("{pfx}{head}"));
                    } else {
                        objects.push(Entry::Object(ObjectMeta {
                            path: path.clone(),
                            size: object.data.len() as u64,
                            mtime: object.mtime,
                        }));
                    }
                }
                ListDepth::Recursive => {
                    let mut acc = pfx.clone();
                    let components: Vec<&str> = rel.split('/').collect();
                    for head in &components[..components.len() - 1] {
                        acc.push_str(head);
                        dirs.insert(acc.clone());
                        acc.push('/');
                    }
                    objects.push(Entry::Object(ObjectMeta {
                        path: path.clone(),
                        size: object.data.len() as u64,
                        mtime: object.mtime,
                    }));
                }
            }
        }

        for dir in &state.dirs {
            let rel = match dir.strip_prefix(&pfx) {
                Some(rel) if !rel.is_empty() => rel,
                _ => continue,
            };
            match depth {
                ListDepth::Single => {
                    let head = rel.split('/').next().unwrap_or(rel);
                    dirs.insert(format!("{pfx}{head}"));
                }
                ListDepth::Recursive => {
                    dirs.insert(dir.clone());
                }
            }
        }

        let mut entries: Vec<Entry> = dirs.into_iter().map(|path| Entry::Dir { path }).collect();
        entries.extend(objects);
        Ok(entries)
    }

    fn new_object(&self, path: &str) -> Result<ObjectMeta, StoreError> {
        let state = self.lock();
        let object = state
            .objects
            .get(path)
            .ok_or_else(|| StoreError::NotFound(path.to_owned()))?;
        Ok(ObjectMeta {
            path: path.to_owned(),
            size: object.data.len() as u64,
            mtime: object.mtime,
        })
    }

    fn open(
        &self,
        path: &str,
        offset: u64,
        limit: Option<u64>,
    ) -> Result<Box<dyn Read + Send>, StoreError> {
        let mut state = self.lock();
        state.opens.push((path.to_owned(), offset));
        let object = state
            .objects
            .get(path)
            .ok_or_else(|| StoreError::NotFound(path.to_owned()))?;

        let start = (offset as usize).min(object.data.len());
        let end = match limit {
            Some(limit) => (start + limit as usize).min(object.data.len()),
            None => object.data.len(),
        };
        Ok(Box::new(io::Cursor::new(object.data[start..end].to_vec())))
    }

    fn put(&self, reader: &mut dyn Read, info: &ObjectInfo) -> Result<ObjectMeta, StoreError> {
        let mut data = Vec::with_capacity(info.size.min(1 << 20) as usize);
        reader.read_to_end(&mut data)?;
        if data.len() as u64 != info.size {
            return Err(StoreError::SizeMismatch {
                declared: info.size,
                actual: data.len() as u64,
            });
        }

        let meta = ObjectMeta {
            path: info.path.clone(),
            size: data.len() as u64,
            mtime: info.mtime,
        };
        self.lock().objects.insert(
            info.path.clone(),
            StoredObject {
                data,
                mtime: info.mtime,
            },
        );
        Ok(meta)
    }

    fn put_unchecked(
        &self,
        reader: &mut dyn Read,
        info: &ObjectInfo,
    ) -> Result<ObjectMeta, StoreError> {
        self.put(reader, info)
    }

    fn remove(&self, path: &str) -> Result<(), StoreError> {
        self.lock()
            .objects
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(path.to_owned()))
    }

    fn mkdir(&self, path: &str) -> Result<(), StoreError> {
        if !path.is_empty() {
            self.lock().dirs.insert(path.to_owned());
        }
        Ok(())
    }

    fn rmdir(&self, path: &str) -> Result<(), StoreError> {
        let mut state = self.lock();
        let pfx = child_prefix(path);
        let has_children = state.objects.keys().any(|k| k.starts_with(&pfx))
            || state.dirs.iter().any(|d| d.starts_with(&pfx));
        if has_children {
            return Err(StoreError::DirNotEmpty(path.to_owned()));
        }
        if state.dirs.remove(path) {
            Ok(())
        } else {
            Err(StoreError::DirNotFound(path.to_owned()))
        }
    }

    fn purge(&self, path: &str) -> Result<(), StoreError> {
        let mut state = self.lock();
        let pfx = child_prefix(path);
        state.objects.retain(|k, _| !k.starts_with(&pfx) && k != path);
        state.dirs.retain(|d| !d.starts_with(&pfx) && d != path);
        Ok(())
    }

    fn copy(&self, src: &str, dst: &str) -> Result<ObjectMeta, StoreError> {
        let mut state = self.lock();
        let object = state
            .objects
            .get(src)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(src.to_owned()))?;
        let meta = ObjectMeta {
            path: dst.to_owned(),
            size: object.data.len() as u64,
            mtime: object.mtime,
        };
        state.objects.insert(dst.to_owned(), object);
        Ok(meta)
    }

    fn move_object(&self, src: &str, dst: &str) -> Result<ObjectMeta, StoreError> {
        let mut state = self.lock();
        let object = state
            .objects
            .remove(src)
            .ok_or_else(|| StoreError::NotFound(src.to_owned()))?;
        let meta = ObjectMeta {
            path: dst.to_owned(),
            size: object.data.len() as u64,
            mtime: object.mtime,
        };
        state.objects.insert(dst.to_owned(), object);
        Ok(meta)
    }

    fn dir_move(&self, src: &str, dst: &str) -> Result<(), StoreError> {
        let mut state = self.lock();
        let src_pfx = child_prefix(src);
        let dst_pfx = child_prefix(dst);

        let moved: Vec<(String, StoredObject)> = state
            .objects
            .iter()
            .filter(|(k, _)| k.starts_with(&src_pfx))
            .map(|(k, v)| (format!("{dst_pfx}{}", &k[src_pfx.len()..]), v.clone()))
            .collect();
        state.objects.retain(|k, _| !k.starts_with(&src_pfx));
        state.objects.extend(moved);

        let moved_dirs: Vec<String> = state
            .dirs
            .iter()
            .filter(|d| d.starts_with(&src_pfx) || *d == src)
            .cloned()
            .collect();
        for dir in moved_dirs {
            state.dirs.remove(&dir);
            if dir == src {
                state.dirs.insert(dst.to_owned());
            } else {
                state.dirs.insert(format!("{dst_pfx}{}", &dir[src_pfx.len()..]));
            }
        }
        Ok(())
    }

    fn about(&self) -> Result<Usage, StoreError> {
        let used: u64 = self
            .lock()
            .objects
            .values()
            .map(|o| o.data.len() as u64)
            .sum();
        Ok(Usage {
            total: None,
            used: Some(used),
            free: None,
        })
    }
}
