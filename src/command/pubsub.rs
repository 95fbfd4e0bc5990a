use bytes::Bytes;

use super::{Context, HandlerResult, ReplyError};
use crate::resp::Value;

/// A connection only ever reaches [`super::CommandKind::Unsubscribe`] from
/// `READY` state, since a successful `SUBSCRIBE` permanently converts it to
/// PUBSUB mode and it never dispatches through here again
/// (`SPEC_FULL.md` §4.8). It therefore never has an active subscription to
/// remove; the reply always reports zero remaining subscriptions.
pub fn unsubscribe(_ctx: &Context, args: &[Bytes]) -> HandlerResult {
    if args.len() > 1 {
        return HandlerResult::read_only(ReplyError::WrongArity("unsubscribe").into());
    }
    let channel = args.first().cloned().unwrap_or_default();
    HandlerResult::read_only(Value::array(vec![
        Value::bulk(Bytes::from_static(b"unsubscribe")),
        channel.into(),
        Value::Integer(0),
    ]))
}

pub fn publish(ctx: &Context, args: &[Bytes]) -> HandlerResult {
    let [channel, message] = args else {
        return HandlerResult::read_only(ReplyError::WrongArity("publish").into());
    };
    let delivered = ctx.pubsub.publish(channel, message);
    HandlerResult::read_only(delivered.into())
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
    fn publish_with_no_subscribers_delivers_to_nobody() {
        let ctx = ctx();
        let result = publish(&ctx, &[Bytes::from_static(b"news"), Bytes::from_static(b"hi")]);
        assert_eq!(result.reply, Value::Integer(0));
    }

    #[test]
    fn publish_counts_subscribers() {
        let ctx = ctx();
        let (_id, _rx) = ctx.pubsub.subscribe(Bytes::from_static(b"news"));
        let result = publish(&ctx, &[Bytes::from_static(b"news"), Bytes::from_static(b"hi")]);
        assert_eq!(result.reply, Value::Integer(1));
    }

    #[test]
    fn unsubscribe_always_reports_zero_remaining() {
        let ctx = ctx();
        let result = unsubscribe(&ctx, &[Bytes::from_static(b"news")]);
        match result.reply {
            Value::Array(Some(frame)) => assert_eq!(frame[2], Value::Integer(0)),
            other => panic!("unexpected reply: {other:?}"),
        }
    }
}
