//! Append-only command log (`SPEC_FULL.md` §4.5): every write command is
//! appended as a RESP array, fsynced, and can be replayed or rewritten into
//! a compact equivalent form.

use bytes::Bytes;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::resp::{self, Value};

/// The append-only log file. Writes are synchronous and go through a
/// [`Mutex`] since the file handle is not `Sync` on its own; callers run
/// inside `spawn_blocking` to keep the async runtime responsive.
pub struct Aof {
    path: PathBuf,
    file: Mutex<Option<File>>,
    /// Set while replaying at startup, so replayed commands are not
    /// logged again.
    replaying: std::sync::atomic::AtomicBool,
}

impl Aof {
    /// Open (creating if absent) the log at `path` for appending.
    pub fn open(path: impl Into<PathBuf>) -> io::Result<Aof> {
        let path = path.into();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Aof {
            path,
            file: Mutex::new(Some(file)),
            replaying: std::sync::atomic::AtomicBool::new(false),
        })
    }

    /// Append one command as a RESP array of bulk strings, then fsync.
    /// A no-op while [`Aof::load`] is replaying into a fresh store.
    pub fn log(&self, name: &[u8], args: &[Bytes]) -> io::Result<()> {
        if self.replaying.load(std::sync::atomic::Ordering::Acquire) {
            return Ok(());
        }
        let mut items = Vec::with_capacity(1 + args.len());
        items.push(Value::bulk(Bytes::copy_from_slice(name)));
        items.extend(args.iter().cloned().map(Value::bulk));
        let encoded = resp::to_bytes(&Value::array(items));

        let mut guard = self.file.lock().expect("lock poisoned");
        let file = guard.as_mut().expect("aof file closed");
        file.write_all(&encoded)?;
        file.sync_data()
    }

    /// Replay every logged command, in order, through `apply`. Stops
    /// cleanly at a truncated final frame (a crash mid-write), which is not
    /// an error per §4.5.
    pub fn load(path: impl AsRef<Path>, mut apply: impl FnMut(&[u8], &[Bytes])) -> io::Result<usize> {
        let path = path.as_ref();
        let file = match File::open(path) {
            Ok(file) => file,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(error) => return Err(error),
        };
        let mut reader = BufReader::new(file);
        let mut replayed = 0;
        loop {
            let value = match read_sync_value(&mut reader) {
                Ok(Some(value)) => value,
                Ok(None) => break,
                // A truncated final frame (crash mid-write) ends replay
                // cleanly rather than failing startup.
                Err(_) => break,
            };
            let Some((name, args)) = value.as_command() else {
                continue;
            };
            let args: Vec<Bytes> = args
                .iter()
                .filter_map(|value| match value {
                    Value::Bulk(Some(bytes)) => Some(bytes.clone()),
                    _ => None,
                })
                .collect();
            apply(name, &args);
            replayed += 1;
        }
        Ok(replayed)
    }

    /// Atomically replace the log with the minimal set of commands needed
    /// to reconstruct `entries` (a `(name, args)` sequence produced by the
    /// caller from the live dataset), fsyncing the new file before the
    /// rename so a crash mid-rewrite leaves the old log intact.
    ///
    /// Holds the file lock for the whole gather/write/fsync/rename sequence,
    /// not just the handle swap, so a concurrent [`Aof::log`] blocks until
    /// the rename has happened rather than appending to the file descriptor
    /// that is about to be replaced underneath it.
    pub fn rewrite(&self, entries: impl IntoIterator<Item = (Bytes, Vec<Bytes>)>) -> io::Result<()> {
        let mut guard = self.file.lock().expect("lock poisoned");

        let tmp_path = self.path.with_extension("rewrite.tmp");
        let mut tmp = File::create(&tmp_path)?;
        for (name, args) in entries {
            let mut items = Vec::with_capacity(1 + args.len());
            items.push(Value::bulk(name));
            items.extend(args.into_iter().map(Value::bulk));
            tmp.write_all(&resp::to_bytes(&Value::array(items)))?;
        }
        tmp.sync_all()?;
        drop(tmp);
        fs::rename(&tmp_path, &self.path)?;

        let file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        *guard = Some(file);
        Ok(())
    }

    /// Mark the log as currently replaying, suppressing [`Aof::log`].
    pub fn set_replaying(&self, replaying: bool) {
        self.replaying.store(replaying, std::sync::atomic::Ordering::Release);
    }
}

/// Build the minimal command sequence that reproduces `containers`' current
/// state: one `SET`/`SADD`/`RPUSH`/`HSET` per key, then a `PEXPIREAT` for
/// every key that carries a live deadline (`SPEC_FULL.md` §4.5).
pub fn rewrite_entries(containers: &crate::store::Containers) -> Vec<(Bytes, Vec<Bytes>)> {
    let mut entries = Vec::new();

    for (key, value, expires_at_ms) in containers.dict.dump_with_expiry() {
        entries.push((Bytes::from_static(b"SET"), vec![key.clone(), value]));
        if let Some(deadline) = expires_at_ms {
            entries.push((Bytes::from_static(b"PEXPIREAT"), vec![key, Bytes::from(deadline.to_string())]));
        }
    }
    for (key, members, expires_at_ms) in containers.set.dump_with_expiry() {
        if !members.is_empty() {
            let mut args = vec![key.clone()];
            args.extend(members);
            entries.push((Bytes::from_static(b"SADD"), args));
        }
        if let Some(deadline) = expires_at_ms {
            entries.push((Bytes::from_static(b"PEXPIREAT"), vec![key, Bytes::from(deadline.to_string())]));
        }
    }
    for (key, values) in containers.list.dump() {
        if values.is_empty() {
            continue;
        }
        let mut args = vec![key];
        args.extend(values);
        entries.push((Bytes::from_static(b"RPUSH"), args));
    }
    for (key, fields) in containers.hash.dump() {
        if fields.is_empty() {
            continue;
        }
        let mut args = vec![key];
        for (field, value) in fields {
            args.push(field);
            args.push(value);
        }
        entries.push((Bytes::from_static(b"HSET"), args));
    }

    entries
}

/// A minimal synchronous RESP reader for AOF replay, since the log only
/// ever contains arrays of bulk strings written by [`Aof::log`]. Mirrors
/// the shape of [`resp::read_value`] without the async plumbing that
/// decoding a live socket needs.
fn read_sync_value(reader: &mut impl BufRead) -> io::Result<Option<Value>> {
    let mut prefix = [0u8; 1];
    match reader.read(&mut prefix)? {
        0 => return Ok(None),
        _ => {}
    }
    let mut line = Vec::new();
    reader.read_until(b'\n', &mut line)?;
    if line.last() == Some(&b'\n') {
        line.pop();
    }
    if line.last() == Some(&b'\r') {
        line.pop();
    }
    let header = std::str::from_utf8(&line).map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "non-utf8 header"))?;

    match prefix[0] {
        b'*' => {
            let count: i64 = header
                .parse()
                .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "bad array length"))?;
            if count < 0 {
                return Ok(Some(Value::NULL_ARRAY));
            }
            let mut items = Vec::with_capacity(count as usize);
            for _ in 0..count {
                match read_sync_value(reader)? {
                    Some(value) => items.push(value),
                    None => return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "truncated array")),
                }
            }
            Ok(Some(Value::array(items)))
        }
        b'$' => {
            let len: i64 = header
                .parse()
                .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "bad bulk length"))?;
            if len < 0 {
                return Ok(Some(Value::NULL_BULK));
            }
            let len = len as usize;
            let mut buf = vec![0u8; len + 2];
            reader.read_exact(&mut buf)?;
            buf.truncate(len);
            Ok(Some(Value::bulk(buf)))
        }
        b'+' => Ok(Some(Value::simple(line))),
        b':' => {
            let n: i64 = header
                .parse()
                .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "bad integer"))?;
            Ok(Some(Value::Integer(n)))
        }
        b'-' => Ok(Some(Value::error(line))),
        other => Err(io::Error::new(io::ErrorKind::InvalidData, format!("unknown RESP prefix {other}"))),
    }
}
