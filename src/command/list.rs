use bytes::Bytes;

use super::{AofEntry, Context, HandlerResult, ReplyError};
use crate::resp::Value;

fn parse_usize(bytes: &[u8]) -> Option<usize> {
    std::str::from_utf8(bytes).ok()?.parse().ok()
}

fn parse_i64(bytes: &[u8]) -> Option<i64> {
    std::str::from_utf8(bytes).ok()?.parse().ok()
}

pub fn lpush(ctx: &Context, args: &[Bytes]) -> HandlerResult {
    push(ctx, args, true, "lpush")
}

pub fn rpush(ctx: &Context, args: &[Bytes]) -> HandlerResult {
    push(ctx, args, false, "rpush")
}

fn push(ctx: &Context, args: &[Bytes], front: bool, name: &'static str) -> HandlerResult {
    let [key, values @ ..] = args else {
        return HandlerResult::read_only(ReplyError::WrongArity(name).into());
    };
    if values.is_empty() {
        return HandlerResult::read_only(ReplyError::WrongArity(name).into());
    }
    let len = ctx.containers.list.push(key.clone(), values.iter().cloned(), front);
    HandlerResult::write(len.into())
}

pub fn lpop(ctx: &Context, args: &[Bytes]) -> HandlerResult {
    pop(ctx, args, true, "lpop")
}

pub fn rpop(ctx: &Context, args: &[Bytes]) -> HandlerResult {
    pop(ctx, args, false, "rpop")
}

/// Logs the actual number of elements removed, never the client's requested
/// count, so replay is idempotent against the AOF's own preceding state
/// (`SPEC_FULL.md` §4.5).
fn pop(ctx: &Context, args: &[Bytes], front: bool, name: &'static str) -> HandlerResult {
    let (key, count, singular) = match args {
        [key] => (key, 1usize, true),
        [key, count] => match parse_usize(count) {
            Some(count) => (key, count, false),
            None => return HandlerResult::read_only(ReplyError::NotAnInteger.into()),
        },
        _ => return HandlerResult::read_only(ReplyError::WrongArity(name).into()),
    };
    let popped = ctx.containers.list.pop(key, count, front);
    let aof = if popped.is_empty() {
        AofEntry::None
    } else {
        AofEntry::Custom(vec![(name, vec![key.clone(), Bytes::from(popped.len().to_string())])])
    };
    let reply = if singular {
        popped.into_iter().next().into()
    } else {
        popped.into_iter().collect()
    };
    HandlerResult { reply, aof }
}

pub fn llen(ctx: &Context, args: &[Bytes]) -> HandlerResult {
    let [key] = args else {
        return HandlerResult::read_only(ReplyError::WrongArity("llen").into());
    };
    HandlerResult::read_only(ctx.containers.list.len(key).into())
}

pub fn lrange(ctx: &Context, args: &[Bytes]) -> HandlerResult {
    let [key, start, stop] = args else {
        return HandlerResult::read_only(ReplyError::WrongArity("lrange").into());
    };
    let (Some(start), Some(stop)) = (parse_i64(start), parse_i64(stop)) else {
        return HandlerResult::read_only(ReplyError::NotAnInteger.into());
    };
    HandlerResult::read_only(ctx.containers.list.range(key, start, stop).into_iter().collect())
}

/// Logged as `LCLEAR key` followed by `RPUSH key <sorted order>`, idempotent
/// under replay regardless of the list's starting order. `LCLEAR` clears
/// only the List container for `key`, unlike `DEL`'s cross-container union
/// (`SPEC_FULL.md` §4.7) — `SORT` never touches a Set/Hash/Dict value a key
/// happens to cohabit with, so its replay log must not either.
pub fn sort(ctx: &Context, args: &[Bytes]) -> HandlerResult {
    let [key, rest @ ..] = args else {
        return HandlerResult::read_only(ReplyError::WrongArity("sort").into());
    };
    let mut ascending = true;
    let mut alpha = false;
    for flag in rest {
        match flag.to_ascii_uppercase().as_slice() {
            b"ASC" => ascending = true,
            b"DESC" => ascending = false,
            b"ALPHA" => alpha = true,
            _ => return HandlerResult::read_only(ReplyError::Syntax.into()),
        }
    }
    ctx.containers.list.sort(key, ascending, alpha);
    let sorted = ctx.containers.list.range(key, 0, -1);
    let aof = if sorted.is_empty() {
        AofEntry::None
    } else {
        let mut rpush_args = vec![key.clone()];
        rpush_args.extend(sorted.iter().cloned());
        AofEntry::Custom(vec![("lclear", vec![key.clone()]), ("rpush", rpush_args)])
    };
    HandlerResult {
        reply: sorted.into_iter().collect(),
        aof,
    }
}

/// Clears only the List container for `key`. Not reachable from a real
/// client workflow in `SPEC_FULL.md`'s command surface — it exists solely
/// as the list-scoped counterpart to `DEL` that `SORT`'s AOF log replays
/// (see [`sort`]), so cohabiting Dict/Set/Hash data for the same key
/// survives a replay.
pub fn lclear(ctx: &Context, args: &[Bytes]) -> HandlerResult {
    let [key] = args else {
        return HandlerResult::read_only(ReplyError::WrongArity("lclear").into());
    };
    ctx.containers.list.remove_key(key);
    HandlerResult::write(Value::OK)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pubsub::Pubsub;
    use crate::rdb::Rdb;
    use crate::stats::Stats;
    use crate::store::Containers;
    use std::sync::Arc;

    fn ctx() -> Context {
        Context {
            containers: Arc::new(Containers::default()),
            pubsub: Arc::new(Pubsub::new()),
            aof: None,
            rdb: Arc::new(Rdb::new("/tmp/x.rdb")),
            stats: Arc::new(Stats::new()),
            auth_secret: None,
        }
    }

    #[test]
    fn rpush_then_lrange() {
        let ctx = ctx();
        rpush(&ctx, &[Bytes::from_static(b"L"), Bytes::from_static(b"a"), Bytes::from_static(b"b")]);
        let result = lrange(&ctx, &[Bytes::from_static(b"L"), Bytes::from_static(b"0"), Bytes::from_static(b"-1")]);
        assert_eq!(
            result.reply,
            Value::array(vec![Value::bulk(Bytes::from_static(b"a")), Value::bulk(Bytes::from_static(b"b"))])
        );
    }

    #[test]
    fn lpop_count_logs_actual_removed() {
        let ctx = ctx();
        rpush(&ctx, &[Bytes::from_static(b"L"), Bytes::from_static(b"a"), Bytes::from_static(b"b")]);
        let result = lpop(&ctx, &[Bytes::from_static(b"L"), Bytes::from_static(b"5")]);
        match result.aof {
            AofEntry::Custom(entries) => {
                assert_eq!(entries, vec![("lpop", vec![Bytes::from_static(b"L"), Bytes::from(2usize.to_string())])])
            }
            _ => panic!("expected custom aof entry"),
        }
    }

    #[test]
    fn lpop_on_missing_key_logs_nothing() {
        let ctx = ctx();
        let result = lpop(&ctx, &[Bytes::from_static(b"missing")]);
        assert!(matches!(result.aof, AofEntry::None));
    }

    #[test]
    fn sort_logs_lclear_then_rpush() {
        let ctx = ctx();
        rpush(&ctx, &[Bytes::from_static(b"L"), Bytes::from_static(b"3"), Bytes::from_static(b"1"), Bytes::from_static(b"2")]);
        let result = sort(&ctx, &[Bytes::from_static(b"L")]);
        match result.aof {
            AofEntry::Custom(entries) => {
                assert_eq!(entries[0].0, "lclear");
                assert_eq!(entries[1].0, "rpush");
            }
            _ => panic!("expected custom aof entry"),
        }
    }

    #[test]
    fn sort_replay_does_not_destroy_a_cohabiting_hash() {
        let ctx = ctx();
        rpush(&ctx, &[Bytes::from_static(b"k"), Bytes::from_static(b"3"), Bytes::from_static(b"1")]);
        ctx.containers.hash.hset(Bytes::from_static(b"k"), [(Bytes::from_static(b"f"), Bytes::from_static(b"v"))]);

        let result = sort(&ctx, &[Bytes::from_static(b"k")]);
        let AofEntry::Custom(entries) = result.aof else {
            panic!("expected custom aof entry");
        };
        for (name, args) in entries {
            let handler: super::super::Handler = match name {
                "lclear" => lclear,
                "rpush" => rpush,
                other => panic!("unexpected replay verb: {other}"),
            };
            handler(&ctx, &args);
        }

        assert_eq!(ctx.containers.hash.hget(b"k", b"f"), Some(Bytes::from_static(b"v")));
        assert_eq!(ctx.containers.list.range(b"k", 0, -1), vec![Bytes::from_static(b"1"), Bytes::from_static(b"3")]);
    }
}
