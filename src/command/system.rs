use bytes::Bytes;
use std::sync::Arc;

use super::{AofEntry, Context, HandlerResult, ReplyError};
use crate::rdb::Rdb;
use crate::resp::Value;
use crate::stats::Stats;
use crate::store::Containers;

pub fn ping(_ctx: &Context, args: &[Bytes]) -> HandlerResult {
    let reply = match args {
        [] => Value::simple("PONG"),
        [message] => Value::bulk(message.clone()),
        _ => return HandlerResult::read_only(ReplyError::WrongArity("ping").into()),
    };
    HandlerResult::read_only(reply)
}

/// `AUTH` is command-level only (`SPEC_FULL.md` §4.7, Non-goals): it checks
/// `secret` against the configured value and replies accordingly, but does
/// not gate any other command on the connection.
pub fn auth(ctx: &Context, args: &[Bytes]) -> HandlerResult {
    let [secret] = args else {
        return HandlerResult::read_only(ReplyError::WrongArity("auth").into());
    };
    match &ctx.auth_secret {
        None => HandlerResult::read_only(ReplyError::AuthNotSet.into()),
        Some(expected) if expected.as_bytes() == &secret[..] => HandlerResult::read_only(Value::OK),
        Some(_) => HandlerResult::read_only(ReplyError::AuthFailed.into()),
    }
}

pub fn info(ctx: &Context, args: &[Bytes]) -> HandlerResult {
    let section = match args {
        [] => "all",
        [section] => match std::str::from_utf8(section) {
            Ok(section) => section,
            Err(_) => return HandlerResult::read_only(ReplyError::UnknownSection(String::from_utf8_lossy(section).into_owned()).into()),
        },
        _ => return HandlerResult::read_only(ReplyError::WrongArity("info").into()),
    };
    let section = section.to_ascii_lowercase();
    let snapshot = ctx.stats.snapshot();
    let keyspace = ctx.containers.all_keys().len();

    let mut lines = String::new();
    let include = |name: &str| section == "all" || section == name;

    if include("server") {
        lines.push_str("# Server\r\n");
        lines.push_str(&format!("uptime_in_seconds:{}\r\n", snapshot.uptime_secs));
        lines.push('\n');
    }
    if include("clients") {
        lines.push_str("# Clients\r\n");
        lines.push_str(&format!("connected_clients:{}\r\n", snapshot.current_connections));
        lines.push_str(&format!("total_connections_received:{}\r\n", snapshot.total_connections));
        lines.push('\n');
    }
    if include("memory") {
        lines.push_str("# Memory\r\n");
        lines.push_str(&format!("keyspace_keys:{keyspace}\r\n"));
        lines.push('\n');
    }
    if include("persistence") {
        lines.push_str("# Persistence\r\n");
        lines.push_str(&format!("rdb_bgsave_in_progress:{}\r\n", i32::from(snapshot.bgsave_in_progress)));
        lines.push('\n');
    }
    if include("stats") {
        lines.push_str("# Stats\r\n");
        lines.push_str(&format!("total_commands_processed:{}\r\n", snapshot.total_commands));
        lines.push('\n');
    }
    if include("keyspace") {
        lines.push_str("# Keyspace\r\n");
        lines.push_str(&format!("db0:keys={keyspace}\r\n"));
        lines.push('\n');
    }
    if lines.is_empty() {
        return HandlerResult::read_only(ReplyError::UnknownSection(section).into());
    }
    HandlerResult::read_only(Value::bulk(Bytes::from(lines)))
}

/// Spawns the snapshot off the request path so a slow save does not stall
/// the connection; `ctx.stats` surfaces `in_progress` for `INFO` readers.
/// `BGSAVE filename` (`SPEC_FULL.md` §4.7/§6) saves to `filename` relative
/// to the working directory instead of the configured path, via a throwaway
/// `Rdb` that still shares its `io_lock` with any other `Rdb` for the same
/// path (see `Rdb::new`), so concurrent `BGSAVE`s to the same filename still
/// serialize.
pub fn bgsave(ctx: &Context, args: &[Bytes]) -> HandlerResult {
    let rdb = match args {
        [] => Arc::clone(&ctx.rdb),
        [filename] => match std::str::from_utf8(filename) {
            Ok(filename) => Arc::new(Rdb::new(filename)),
            Err(_) => return HandlerResult::read_only(ReplyError::WrongArity("bgsave").into()),
        },
        _ => return HandlerResult::read_only(ReplyError::WrongArity("bgsave").into()),
    };
    let containers = Arc::clone(&ctx.containers);
    let stats = Arc::clone(&ctx.stats);
    std::thread::spawn(move || run_bgsave(containers, rdb, stats));
    HandlerResult {
        reply: Value::simple("Background saving started"),
        aof: AofEntry::None,
    }
}

fn run_bgsave(containers: Arc<Containers>, rdb: Arc<Rdb>, stats: Arc<Stats>) {
    stats.set_bgsave_in_progress(true);
    if let Err(error) = rdb.save(&containers) {
        tracing::warn!(%error, "bgsave failed");
    }
    stats.set_bgsave_in_progress(false);
}

pub fn keys(ctx: &Context, args: &[Bytes]) -> HandlerResult {
    let [pattern] = args else {
        return HandlerResult::read_only(ReplyError::WrongArity("keys").into());
    };
    let matched: Vec<Bytes> = ctx
        .containers
        .all_keys()
        .into_iter()
        .filter(|key| crate::glob::matches(key, pattern))
        .collect();
    HandlerResult::read_only(matched.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pubsub::Pubsub;
    use crate::rdb::Rdb as RdbStore;
    use crate::stats::Stats as StatsStore;
    use std::sync::Arc;

    fn ctx() -> Context {
        Context {
            containers: Arc::new(Containers::default()),
            pubsub: Arc::new(Pubsub::new()),
            aof: None,
            rdb: Arc::new(RdbStore::new("/tmp/x.rdb")),
            stats: Arc::new(StatsStore::new()),
            auth_secret: Some("hunter2".to_string()),
        }
    }

    #[test]
    fn ping_without_message() {
        let ctx = ctx();
        let result = ping(&ctx, &[]);
        assert_eq!(result.reply, Value::simple("PONG"));
    }

    #[test]
    fn auth_rejects_wrong_secret() {
        let ctx = ctx();
        let result = auth(&ctx, &[Bytes::from_static(b"wrong")]);
        assert!(matches!(result.reply, Value::Error(_)));
    }

    #[test]
    fn auth_accepts_correct_secret() {
        let ctx = ctx();
        let result = auth(&ctx, &[Bytes::from_static(b"hunter2")]);
        assert_eq!(result.reply, Value::OK);
    }

    #[test]
    fn keys_filters_by_glob() {
        let ctx = ctx();
        ctx.containers.dict.set(Bytes::from_static(b"user:1"), Bytes::from_static(b"a"), None);
        ctx.containers.dict.set(Bytes::from_static(b"other"), Bytes::from_static(b"b"), None);
        let result = keys(&ctx, &[Bytes::from_static(b"user:*")]);
        assert_eq!(result.reply, Value::array(vec![Value::bulk(Bytes::from_static(b"user:1"))]));
    }

    #[test]
    fn info_all_includes_every_section() {
        let ctx = ctx();
        let result = info(&ctx, &[]);
        match result.reply {
            Value::Bulk(Some(body)) => {
                let body = String::from_utf8(body.to_vec()).unwrap();
                assert!(body.contains("# Server"));
                assert!(body.contains("# Keyspace"));
            }
            other => panic!("unexpected reply: {other:?}"),
        }
    }
}
