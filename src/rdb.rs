//! Point-in-time snapshot of the whole dataset (`SPEC_FULL.md` §4.6).
//!
//! `SPEC_FULL.md` leaves the on-disk format unspecified beyond "a single
//! round-trippable file that `BGSAVE`/startup can write and read"; rather
//! than replicate Redis's bit-exact RDB binary layout (opcodes, length
//! encoding, LZF compression), this snapshots through `serde` + `bincode`,
//! which gets the same durability property for a fraction of the surface
//! area.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use crate::store::Containers;

/// Process-wide registry of per-path locks, keyed by the literal path string
/// a caller constructed `Rdb::new` with. `BGSAVE [filename]`
/// (`src/command/system.rs`) builds a throwaway `Rdb` per call, so without
/// this, two concurrent `BGSAVE`s naming the same file would each hold a
/// private `Mutex` and never actually serialize against each other.
fn lock_for(path: &Path) -> Arc<Mutex<()>> {
    static REGISTRY: OnceLock<Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>> = OnceLock::new();
    let registry = REGISTRY.get_or_init(|| Mutex::new(HashMap::new()));
    let mut locks = registry.lock().expect("lock poisoned");
    Arc::clone(locks.entry(path.to_path_buf()).or_insert_with(|| Arc::new(Mutex::new(()))))
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    dict: Vec<(Bytes, Bytes, Option<u128>)>,
    set: Vec<(Bytes, HashSet<Bytes>, Option<u128>)>,
    list: Vec<(Bytes, Vec<Bytes>)>,
    hash: Vec<(Bytes, HashMap<Bytes, Bytes>)>,
}

impl Snapshot {
    fn capture(containers: &Containers) -> Snapshot {
        Snapshot {
            dict: containers.dict.dump_with_expiry(),
            set: containers.set.dump_with_expiry(),
            list: containers.list.dump(),
            hash: containers.hash.dump(),
        }
    }

    fn restore_into(self, containers: &Containers) {
        for (key, value, expires_at_ms) in self.dict {
            containers.dict.restore(key, value, expires_at_ms);
        }
        for (key, members, expires_at_ms) in self.set {
            containers.set.restore(key, members, expires_at_ms);
        }
        for (key, values) in self.list {
            containers.list.restore(key, values);
        }
        for (key, fields) in self.hash {
            containers.hash.restore(key, fields);
        }
    }
}

/// Tracks the snapshot file path and whether a `BGSAVE` is currently
/// running, for `INFO`'s `rdb_bgsave_in_progress` field. `io_lock`
/// serializes `save`/`load` against each other (`SPEC_FULL.md` §4.6) so two
/// concurrent `BGSAVE`s, or a shutdown-time save racing an in-flight
/// background one, cannot interleave writes to the same temp path. The lock
/// is shared across every `Rdb` constructed with the same path (see
/// [`lock_for`]), not just held per-instance, since `BGSAVE filename`
/// creates a fresh `Rdb` on every call.
pub struct Rdb {
    path: PathBuf,
    in_progress: Arc<AtomicBool>,
    io_lock: Arc<Mutex<()>>,
}

impl Rdb {
    pub fn new(path: impl Into<PathBuf>) -> Rdb {
        let path = path.into();
        let io_lock = lock_for(&path);
        Rdb {
            path,
            in_progress: Arc::new(AtomicBool::new(false)),
            io_lock,
        }
    }

    pub fn in_progress(&self) -> bool {
        self.in_progress.load(Ordering::Acquire)
    }

    /// Load the snapshot into `containers` if the file exists and is
    /// non-empty. A missing or zero-length file is not an error: it is the
    /// "no prior snapshot" sentinel (`SPEC_FULL.md` §4.6).
    pub fn load(&self, containers: &Containers) -> io::Result<bool> {
        let _guard = self.io_lock.lock().expect("lock poisoned");
        let metadata = match fs::metadata(&self.path) {
            Ok(metadata) => metadata,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(error) => return Err(error),
        };
        if metadata.len() == 0 {
            return Ok(false);
        }
        let file = File::open(&self.path)?;
        let snapshot: Snapshot = bincode::deserialize_from(file)
            .map_err(|error| io::Error::new(io::ErrorKind::InvalidData, error))?;
        snapshot.restore_into(containers);
        Ok(true)
    }

    /// Write a snapshot of `containers` to a temp file, fsync it, then
    /// atomically rename it over the live path.
    pub fn save(&self, containers: &Containers) -> io::Result<()> {
        let _guard = self.io_lock.lock().expect("lock poisoned");
        self.in_progress.store(true, Ordering::Release);
        let result = self.save_inner(containers);
        self.in_progress.store(false, Ordering::Release);
        result
    }

    fn save_inner(&self, containers: &Containers) -> io::Result<()> {
        let snapshot = Snapshot::capture(containers);
        let tmp_path = self.path.with_extension("rdb.tmp");
        let mut file = File::create(&tmp_path)?;
        let encoded = bincode::serialize(&snapshot).map_err(|error| io::Error::new(io::ErrorKind::InvalidData, error))?;
        file.write_all(&encoded)?;
        file.sync_all()?;
        drop(file);
        fs::rename(&tmp_path, &self.path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_instances_for_the_same_path_share_an_io_lock() {
        let a = Rdb::new("/tmp/sparrowdb-shared-lock-test.rdb");
        let b = Rdb::new("/tmp/sparrowdb-shared-lock-test.rdb");
        assert!(Arc::ptr_eq(&a.io_lock, &b.io_lock));

        let c = Rdb::new("/tmp/sparrowdb-shared-lock-test-other.rdb");
        assert!(!Arc::ptr_eq(&a.io_lock, &c.io_lock));
    }

    #[test]
    fn missing_file_loads_as_empty_without_error() {
        let rdb = Rdb::new("/nonexistent/path/to/dump.rdb");
        let containers = Containers::default();
        assert!(!rdb.load(&containers).unwrap());
    }

    #[test]
    fn save_then_load_round_trips_every_kind() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::remove_file(tmp.path()).ok();
        let rdb = Rdb::new(tmp.path());

        let containers = Containers::default();
        containers.dict.set(Bytes::from_static(b"k"), Bytes::from_static(b"v"), None);
        containers.set.sadd(&Bytes::from_static(b"s"), [Bytes::from_static(b"m")]);
        containers.list.push(Bytes::from_static(b"l"), [Bytes::from_static(b"a")], false);
        containers.hash.hset(Bytes::from_static(b"h"), [(Bytes::from_static(b"f"), Bytes::from_static(b"v"))]);

        rdb.save(&containers).unwrap();

        let restored = Containers::default();
        assert!(rdb.load(&restored).unwrap());
        assert_eq!(restored.dict.get(b"k"), Some(Bytes::from_static(b"v")));
        assert!(restored.set.sismember(b"s", b"m"));
        assert_eq!(restored.list.range(b"l", 0, -1), vec![Bytes::from_static(b"a")]);
        assert_eq!(restored.hash.hget(b"h", b"f"), Some(Bytes::from_static(b"v")));
    }

    #[test]
    fn save_preserves_ttl() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::remove_file(tmp.path()).ok();
        let rdb = Rdb::new(tmp.path());

        let containers = Containers::default();
        containers.dict.set(Bytes::from_static(b"k"), Bytes::from_static(b"v"), Some(120));
        rdb.save(&containers).unwrap();

        let restored = Containers::default();
        rdb.load(&restored).unwrap();
        assert!(restored.dict.ttl_secs(b"k") > 0);
    }
}
