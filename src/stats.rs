//! Process-wide counters and the `MONITOR` command feed (`SPEC_FULL.md` §4.9).

use bytes::Bytes;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::Instant;
use tokio::sync::mpsc;

const MONITOR_CHANNEL_CAPACITY: usize = 1024;

pub struct Stats {
    total_commands: AtomicU64,
    total_connections: AtomicU64,
    current_connections: AtomicU64,
    bgsave_in_progress: AtomicBool,
    started_at: Instant,
    monitors: RwLock<Vec<mpsc::Sender<Bytes>>>,
}

impl Default for Stats {
    fn default() -> Self {
        Stats {
            total_commands: AtomicU64::new(0),
            total_connections: AtomicU64::new(0),
            current_connections: AtomicU64::new(0),
            bgsave_in_progress: AtomicBool::new(false),
            started_at: Instant::now(),
            monitors: RwLock::new(Vec::new()),
        }
    }
}

impl Stats {
    pub fn new() -> Self {
        Stats::default()
    }

    pub fn record_connection_opened(&self) {
        self.total_connections.fetch_add(1, Ordering::Relaxed);
        self.current_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_connection_closed(&self) {
        self.current_connections.fetch_sub(1, Ordering::Relaxed);
    }

    /// Record a dispatched command and fan it out to every `MONITOR`
    /// subscriber as `CMD arg1 arg2 ...`.
    pub fn record_command(&self, name: &[u8], args: &[Bytes]) {
        self.total_commands.fetch_add(1, Ordering::Relaxed);
        let monitors = self.monitors.read().expect("lock poisoned");
        if monitors.is_empty() {
            return;
        }
        let mut line = Vec::with_capacity(name.len() + args.iter().map(|a| a.len() + 1).sum::<usize>());
        line.extend_from_slice(name);
        for arg in args {
            line.push(b' ');
            line.extend_from_slice(arg);
        }
        let line = Bytes::from(line);
        for monitor in monitors.iter() {
            let _ = monitor.try_send(line.clone());
        }
    }

    pub fn set_bgsave_in_progress(&self, in_progress: bool) {
        self.bgsave_in_progress.store(in_progress, Ordering::Relaxed);
    }

    /// Register a new `MONITOR` subscriber, returning the receiving end of
    /// its feed.
    pub fn subscribe_monitor(&self) -> mpsc::Receiver<Bytes> {
        let (sender, receiver) = mpsc::channel(MONITOR_CHANNEL_CAPACITY);
        self.monitors.write().expect("lock poisoned").push(sender);
        receiver
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            total_commands: self.total_commands.load(Ordering::Relaxed),
            total_connections: self.total_connections.load(Ordering::Relaxed),
            current_connections: self.current_connections.load(Ordering::Relaxed),
            bgsave_in_progress: self.bgsave_in_progress.load(Ordering::Relaxed),
            uptime_secs: self.started_at.elapsed().as_secs(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct StatsSnapshot {
    pub total_commands: u64,
    pub total_connections: u64,
    pub current_connections: u64,
    pub bgsave_in_progress: bool,
    pub uptime_secs: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_connection_counts() {
        let stats = Stats::new();
        stats.record_connection_opened();
        stats.record_connection_opened();
        stats.record_connection_closed();
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.total_connections, 2);
        assert_eq!(snapshot.current_connections, 1);
    }

    #[test]
    fn monitor_receives_formatted_commands() {
        let stats = Stats::new();
        let mut receiver = stats.subscribe_monitor();
        stats.record_command(b"SET", &[Bytes::from_static(b"k"), Bytes::from_static(b"v")]);
        let line = receiver.try_recv().unwrap();
        assert_eq!(&line[..], b"SET k v");
    }

    #[test]
    fn total_commands_counts_regardless_of_monitors() {
        let stats = Stats::new();
        stats.record_command(b"PING", &[]);
        assert_eq!(stats.snapshot().total_commands, 1);
    }
}
