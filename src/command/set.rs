use bytes::Bytes;

use super::{Context, HandlerResult, ReplyError};
use crate::resp::Value;
use crate::store::ExpireOutcome;

fn parse_i64(bytes: &[u8]) -> Option<i64> {
    std::str::from_utf8(bytes).ok()?.parse().ok()
}

pub fn sadd(ctx: &Context, args: &[Bytes]) -> HandlerResult {
    let [key, members @ ..] = args else {
        return HandlerResult::read_only(ReplyError::WrongArity("sadd").into());
    };
    if members.is_empty() {
        return HandlerResult::read_only(ReplyError::WrongArity("sadd").into());
    }
    let added = ctx.containers.set.sadd(key, members.iter().cloned());
    HandlerResult::write(added.into())
}

pub fn srem(ctx: &Context, args: &[Bytes]) -> HandlerResult {
    let [key, members @ ..] = args else {
        return HandlerResult::read_only(ReplyError::WrongArity("srem").into());
    };
    if members.is_empty() {
        return HandlerResult::read_only(ReplyError::WrongArity("srem").into());
    }
    let removed = ctx.containers.set.srem(key, members.iter().map(|m| &m[..]));
    HandlerResult::write(removed.into())
}

pub fn smembers(ctx: &Context, args: &[Bytes]) -> HandlerResult {
    let [key] = args else {
        return HandlerResult::read_only(ReplyError::WrongArity("smembers").into());
    };
    let members = ctx.containers.set.smembers(key).unwrap_or_default();
    HandlerResult::read_only(members.into_iter().collect())
}

pub fn sismember(ctx: &Context, args: &[Bytes]) -> HandlerResult {
    let [key, member] = args else {
        return HandlerResult::read_only(ReplyError::WrongArity("sismember").into());
    };
    HandlerResult::read_only(ctx.containers.set.sismember(key, member).into())
}

pub fn scard(ctx: &Context, args: &[Bytes]) -> HandlerResult {
    let [key] = args else {
        return HandlerResult::read_only(ReplyError::WrongArity("scard").into());
    };
    HandlerResult::read_only(ctx.containers.set.scard(key).into())
}

pub fn sexpire(ctx: &Context, args: &[Bytes]) -> HandlerResult {
    let [key, seconds] = args else {
        return HandlerResult::read_only(ReplyError::WrongArity("sexpire").into());
    };
    let Some(secs) = parse_i64(seconds) else {
        return HandlerResult::read_only(ReplyError::NotAnInteger.into());
    };
    let reply = match ctx.containers.set.expire(key, secs) {
        ExpireOutcome::Missing => Value::Integer(0),
        ExpireOutcome::Deleted | ExpireOutcome::Set => Value::Integer(1),
    };
    HandlerResult::write(reply)
}

pub fn sttl(ctx: &Context, args: &[Bytes]) -> HandlerResult {
    let [key] = args else {
        return HandlerResult::read_only(ReplyError::WrongArity("sttl").into());
    };
    HandlerResult::read_only(Value::Integer(ctx.containers.set.ttl_secs(key)))
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
    fn sadd_then_sismember() {
        let ctx = ctx();
        sadd(&ctx, &[Bytes::from_static(b"s"), Bytes::from_static(b"a"), Bytes::from_static(b"b")]);
        let result = sismember(&ctx, &[Bytes::from_static(b"s"), Bytes::from_static(b"a")]);
        assert_eq!(result.reply, Value::Integer(1));
    }

    #[test]
    fn srem_reports_actual_removed_count() {
        let ctx = ctx();
        sadd(&ctx, &[Bytes::from_static(b"s"), Bytes::from_static(b"a")]);
        let result = srem(&ctx, &[Bytes::from_static(b"s"), Bytes::from_static(b"a"), Bytes::from_static(b"missing")]);
        assert_eq!(result.reply, Value::Integer(1));
    }
}
