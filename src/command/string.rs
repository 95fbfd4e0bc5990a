use bytes::Bytes;

use super::{Context, HandlerResult, ReplyError};
use crate::resp::Value;

fn parse_i64(bytes: &[u8]) -> Option<i64> {
    std::str::from_utf8(bytes).ok()?.parse().ok()
}

pub fn set(ctx: &Context, args: &[Bytes]) -> HandlerResult {
    let (key, value, ttl_secs) = match args {
        [key, value] => (key, value, None),
        [key, value, seconds] => match parse_i64(seconds).and_then(|secs| u64::try_from(secs).ok()) {
            Some(secs) => (key, value, Some(secs)),
            None => return HandlerResult::read_only(ReplyError::InvalidExpireTime.into()),
        },
        _ => return HandlerResult::read_only(ReplyError::WrongArity("set").into()),
    };
    ctx.containers.dict.set(key.clone(), value.clone(), ttl_secs);
    HandlerResult::write(Value::OK)
}

pub fn get(ctx: &Context, args: &[Bytes]) -> HandlerResult {
    let [key] = args else {
        return HandlerResult::read_only(ReplyError::WrongArity("get").into());
    };
    HandlerResult::read_only(ctx.containers.dict.get(key).into())
}

pub fn del(ctx: &Context, args: &[Bytes]) -> HandlerResult {
    if args.is_empty() {
        return HandlerResult::read_only(ReplyError::WrongArity("del").into());
    }
    let removed = args.iter().filter(|key| ctx.containers.delete_key(key)).count();
    HandlerResult::write(removed.into())
}

pub fn expire(ctx: &Context, args: &[Bytes]) -> HandlerResult {
    let [key, seconds] = args else {
        return HandlerResult::read_only(ReplyError::WrongArity("expire").into());
    };
    let Some(secs) = parse_i64(seconds) else {
        return HandlerResult::read_only(ReplyError::NotAnInteger.into());
    };
    use crate::store::ExpireOutcome;
    let reply = match ctx.containers.dict.expire(key, secs) {
        ExpireOutcome::Missing => Value::Integer(0),
        ExpireOutcome::Deleted | ExpireOutcome::Set => Value::Integer(1),
    };
    HandlerResult::write(reply)
}

pub fn pexpireat(ctx: &Context, args: &[Bytes]) -> HandlerResult {
    let [key, unix_ms] = args else {
        return HandlerResult::read_only(ReplyError::WrongArity("pexpireat").into());
    };
    let Some(deadline_ms) = parse_i64(unix_ms) else {
        return HandlerResult::read_only(ReplyError::NotAnInteger.into());
    };
    use crate::store::ExpireOutcome;
    let reply = match ctx.containers.dict.expire_at_ms(key, deadline_ms) {
        ExpireOutcome::Missing => Value::Integer(0),
        ExpireOutcome::Deleted | ExpireOutcome::Set => Value::Integer(1),
    };
    HandlerResult::write(reply)
}

pub fn ttl(ctx: &Context, args: &[Bytes]) -> HandlerResult {
    let [key] = args else {
        return HandlerResult::read_only(ReplyError::WrongArity("ttl").into());
    };
    HandlerResult::read_only(Value::Integer(ctx.containers.dict.ttl_secs(key)))
}
