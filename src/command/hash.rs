use bytes::Bytes;

use super::{Context, HandlerResult, ReplyError};

pub fn hset(ctx: &Context, args: &[Bytes]) -> HandlerResult {
    let [key, rest @ ..] = args else {
        return HandlerResult::read_only(ReplyError::WrongArity("hset").into());
    };
    if rest.is_empty() || rest.len() % 2 != 0 {
        return HandlerResult::read_only(ReplyError::WrongArity("hset").into());
    }
    let pairs: Vec<(Bytes, Bytes)> = rest.chunks_exact(2).map(|pair| (pair[0].clone(), pair[1].clone())).collect();
    let created = ctx.containers.hash.hset(key.clone(), pairs);
    HandlerResult::write(created.into())
}

pub fn hget(ctx: &Context, args: &[Bytes]) -> HandlerResult {
    let [key, field] = args else {
        return HandlerResult::read_only(ReplyError::WrongArity("hget").into());
    };
    HandlerResult::read_only(ctx.containers.hash.hget(key, field).into())
}

pub fn hdel(ctx: &Context, args: &[Bytes]) -> HandlerResult {
    let [key, fields @ ..] = args else {
        return HandlerResult::read_only(ReplyError::WrongArity("hdel").into());
    };
    if fields.is_empty() {
        return HandlerResult::read_only(ReplyError::WrongArity("hdel").into());
    }
    let removed = ctx.containers.hash.hdel(key, fields.iter().map(|f| &f[..]));
    HandlerResult::write(removed.into())
}

pub fn hgetall(ctx: &Context, args: &[Bytes]) -> HandlerResult {
    let [key] = args else {
        return HandlerResult::read_only(ReplyError::WrongArity("hgetall").into());
    };
    let flattened = ctx
        .containers
        .hash
        .hgetall(key)
        .into_iter()
        .flat_map(|(field, value)| [field, value])
        .collect();
    HandlerResult::read_only(flattened)
}

pub fn hexists(ctx: &Context, args: &[Bytes]) -> HandlerResult {
    let [key, field] = args else {
        return HandlerResult::read_only(ReplyError::WrongArity("hexists").into());
    };
    HandlerResult::read_only(ctx.containers.hash.hexists(key, field).into())
}

pub fn hlen(ctx: &Context, args: &[Bytes]) -> HandlerResult {
    let [key] = args else {
        return HandlerResult::read_only(ReplyError::WrongArity("hlen").into());
    };
    HandlerResult::read_only(ctx.containers.hash.hlen(key).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pubsub::Pubsub;
    use crate::rdb::Rdb;
    use crate::resp::Value;
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
    fn hset_then_hget() {
        let ctx = ctx();
        hset(&ctx, &[Bytes::from_static(b"u"), Bytes::from_static(b"name"), Bytes::from_static(b"Ada")]);
        let result = hget(&ctx, &[Bytes::from_static(b"u"), Bytes::from_static(b"name")]);
        assert_eq!(result.reply, Value::bulk(Bytes::from_static(b"Ada")));
    }

    #[test]
    fn hset_rejects_odd_arity() {
        let ctx = ctx();
        let result = hset(&ctx, &[Bytes::from_static(b"u"), Bytes::from_static(b"name")]);
        assert!(matches!(result.reply, Value::Error(_)));
    }

    #[test]
    fn hdel_missing_field_returns_zero() {
        let ctx = ctx();
        hset(&ctx, &[Bytes::from_static(b"u"), Bytes::from_static(b"name"), Bytes::from_static(b"Ada")]);
        let result = hdel(&ctx, &[Bytes::from_static(b"u"), Bytes::from_static(b"missing")]);
        assert_eq!(result.reply, Value::Integer(0));
    }
}
