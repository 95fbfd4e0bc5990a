//! Command registry and dispatch (`SPEC_FULL.md` §4.7). A case-insensitive
//! mapping from command name to a pure handler over the ambient containers,
//! resolved once per request via a [`logos`] lexer rather than a hash
//! lookup.

mod error;
mod hash;
mod list;
mod pubsub;
mod set;
mod string;
mod system;

pub use error::ReplyError;

use bytes::Bytes;
use logos::Logos;
use std::sync::Arc;

use crate::aof::Aof;
use crate::pubsub::Pubsub;
use crate::rdb::Rdb;
use crate::resp::Value;
use crate::stats::Stats;
use crate::store::Containers;

/// Shared, read-only (from a handler's perspective) access to everything a
/// command might need. Cloned cheaply per connection since every field is
/// an `Arc`.
#[derive(Clone)]
pub struct Context {
    pub containers: Arc<Containers>,
    pub pubsub: Arc<Pubsub>,
    pub aof: Option<Arc<Aof>>,
    pub rdb: Arc<Rdb>,
    pub stats: Arc<Stats>,
    pub auth_secret: Option<String>,
}

/// What the AOF should record for a successfully dispatched write command.
/// Most commands log their own verbatim name and arguments; a few rewrite
/// what actually happened so replay is idempotent (`SPEC_FULL.md` §4.5).
pub enum AofEntry {
    None,
    Verbatim,
    Custom(Vec<(&'static str, Vec<Bytes>)>),
}

pub struct HandlerResult {
    pub reply: Value,
    pub aof: AofEntry,
}

impl HandlerResult {
    fn read_only(reply: Value) -> HandlerResult {
        HandlerResult {
            reply,
            aof: AofEntry::None,
        }
    }

    fn write(reply: Value) -> HandlerResult {
        HandlerResult {
            reply,
            aof: AofEntry::Verbatim,
        }
    }
}

/// The outcome of dispatching one request. [`Outcome::Subscribe`] and
/// [`Outcome::Monitor`] are special-cased by the connection loop, which owns
/// creating the subscriber/monitor channel and switching the connection into
/// a permanent feed mode (`SPEC_FULL.md` §4.8) — a command handler has no
/// connection to hold a receiver on.
#[derive(Debug)]
pub enum Outcome {
    Reply(Value),
    Subscribe(Bytes),
    Monitor,
}

type Handler = fn(&Context, &[Bytes]) -> HandlerResult;

#[derive(Clone, Copy, Debug, Eq, Hash, Logos, PartialEq)]
enum CommandKind {
    #[regex(b"(?i:set)")]
    Set,
    #[regex(b"(?i:get)")]
    Get,
    #[regex(b"(?i:del)")]
    Del,
    #[regex(b"(?i:expire)")]
    Expire,
    #[regex(b"(?i:pexpireat)")]
    Pexpireat,
    #[regex(b"(?i:ttl)")]
    Ttl,
    #[regex(b"(?i:ping)")]
    Ping,
    #[regex(b"(?i:sadd)")]
    Sadd,
    #[regex(b"(?i:srem)")]
    Srem,
    #[regex(b"(?i:smembers)")]
    Smembers,
    #[regex(b"(?i:sismember)")]
    Sismember,
    #[regex(b"(?i:scard)")]
    Scard,
    #[regex(b"(?i:sexpire)")]
    Sexpire,
    #[regex(b"(?i:sttl)")]
    Sttl,
    #[regex(b"(?i:lpush)")]
    Lpush,
    #[regex(b"(?i:rpush)")]
    Rpush,
    #[regex(b"(?i:lpop)")]
    Lpop,
    #[regex(b"(?i:rpop)")]
    Rpop,
    #[regex(b"(?i:llen)")]
    Llen,
    #[regex(b"(?i:lrange)")]
    Lrange,
    #[regex(b"(?i:sort)")]
    Sort,
    /// Replay-only: clears just the List container for a key. Rejected by
    /// [`dispatch`] (only [`dispatch_replay`] accepts it) so a client can
    /// never invoke it directly.
    #[regex(b"(?i:lclear)")]
    Lclear,
    #[regex(b"(?i:hset)")]
    Hset,
    #[regex(b"(?i:hget)")]
    Hget,
    #[regex(b"(?i:hdel)")]
    Hdel,
    #[regex(b"(?i:hgetall)")]
    Hgetall,
    #[regex(b"(?i:hexists)")]
    Hexists,
    #[regex(b"(?i:hlen)")]
    Hlen,
    #[regex(b"(?i:subscribe)")]
    Subscribe,
    #[regex(b"(?i:unsubscribe)")]
    Unsubscribe,
    #[regex(b"(?i:publish)")]
    Publish,
    #[regex(b"(?i:auth)")]
    Auth,
    #[regex(b"(?i:info)")]
    Info,
    #[regex(b"(?i:bgsave)")]
    Bgsave,
    #[regex(b"(?i:keys)")]
    Keys,
    #[regex(b"(?i:monitor)")]
    Monitor,
}

/// Parse `bytes` as exactly one `CommandKind` token, rejecting trailing
/// garbage the way [`logos`] would if fed a multi-token input.
fn lex(bytes: &[u8]) -> Option<CommandKind> {
    let mut lexer = CommandKind::lexer(bytes);
    let token = lexer.next()?.ok()?;
    lexer.remainder().is_empty().then_some(token)
}

/// Dispatch one request from a live connection. Returns a
/// [`ReplyError::UnknownCommand`] wrapped in [`Outcome::Reply`] for anything
/// the lexer does not recognize, or for a replay-only verb like `LCLEAR`
/// (see [`dispatch_replay`]) that a client has no business invoking directly.
pub fn dispatch(ctx: &Context, name: &[u8], args: &[Bytes]) -> Outcome {
    dispatch_inner(ctx, name, args, false)
}

/// Dispatch one request from AOF replay (`main.rs`'s startup replay loop).
/// Unlike [`dispatch`], this accepts replay-only verbs such as `LCLEAR`
/// that [`super::list::sort`] logs in place of the union-scoped `DEL`.
pub fn dispatch_replay(ctx: &Context, name: &[u8], args: &[Bytes]) -> Outcome {
    dispatch_inner(ctx, name, args, true)
}

fn dispatch_inner(ctx: &Context, name: &[u8], args: &[Bytes], internal: bool) -> Outcome {
    use CommandKind::*;

    let Some(kind) = lex(name) else {
        return Outcome::Reply(ReplyError::UnknownCommand(String::from_utf8_lossy(name).into_owned()).into());
    };

    if kind == Lclear && !internal {
        return Outcome::Reply(ReplyError::UnknownCommand(String::from_utf8_lossy(name).into_owned()).into());
    }

    if kind == Subscribe {
        return match args {
            [channel] => Outcome::Subscribe(channel.clone()),
            _ => Outcome::Reply(ReplyError::WrongArity("subscribe").into()),
        };
    }

    if kind == Monitor {
        return if args.is_empty() {
            Outcome::Monitor
        } else {
            Outcome::Reply(ReplyError::WrongArity("monitor").into())
        };
    }

    let handler: Handler = match kind {
        Set => string::set,
        Get => string::get,
        Del => string::del,
        Expire => string::expire,
        Pexpireat => string::pexpireat,
        Ttl => string::ttl,
        Ping => system::ping,
        Sadd => set::sadd,
        Srem => set::srem,
        Smembers => set::smembers,
        Sismember => set::sismember,
        Scard => set::scard,
        Sexpire => set::sexpire,
        Sttl => set::sttl,
        Lpush => list::lpush,
        Rpush => list::rpush,
        Lpop => list::lpop,
        Rpop => list::rpop,
        Llen => list::llen,
        Lrange => list::lrange,
        Sort => list::sort,
        Lclear => list::lclear,
        Hset => hash::hset,
        Hget => hash::hget,
        Hdel => hash::hdel,
        Hgetall => hash::hgetall,
        Hexists => hash::hexists,
        Hlen => hash::hlen,
        Unsubscribe => pubsub::unsubscribe,
        Publish => pubsub::publish,
        Auth => system::auth,
        Info => system::info,
        Bgsave => system::bgsave,
        Keys => system::keys,
        Monitor => unreachable!("handled above"),
        Subscribe => unreachable!("handled above"),
    };

    let result = handler(ctx, args);
    if let Some(aof) = &ctx.aof {
        log_to_aof(aof, name, args, &result.aof);
    }
    Outcome::Reply(result.reply)
}

/// An append failure is logged but never changes the reply already computed
/// by the handler (`SPEC_FULL.md` §7): the client still gets the result of
/// the command it asked for even if durability for it was not recorded.
fn log_to_aof(aof: &Aof, name: &[u8], args: &[Bytes], entry: &AofEntry) {
    match entry {
        AofEntry::None => {}
        AofEntry::Verbatim => {
            if let Err(error) = aof.log(name, args) {
                tracing::warn!(%error, command = %String::from_utf8_lossy(name), "AOF append failed");
            }
        }
        AofEntry::Custom(entries) => {
            for (name, args) in entries {
                if let Err(error) = aof.log(name.as_bytes(), args) {
                    tracing::warn!(%error, command = %name, "AOF append failed");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_context() -> Context {
        Context {
            containers: Arc::new(Containers::default()),
            pubsub: Arc::new(Pubsub::new()),
            aof: None,
            rdb: Arc::new(Rdb::new("/tmp/does-not-matter.rdb")),
            stats: Arc::new(Stats::new()),
            auth_secret: None,
        }
    }

    #[test]
    fn dispatches_case_insensitively() {
        let ctx = test_context();
        dispatch(&ctx, b"SeT", &[Bytes::from_static(b"k"), Bytes::from_static(b"v")]);
        match dispatch(&ctx, b"get", &[Bytes::from_static(b"k")]) {
            Outcome::Reply(Value::Bulk(Some(value))) => assert_eq!(value, Bytes::from_static(b"v")),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn unknown_command_is_an_error_reply() {
        let ctx = test_context();
        match dispatch(&ctx, b"NOPE", &[]) {
            Outcome::Reply(Value::Error(_)) => {}
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn subscribe_is_special_cased() {
        let ctx = test_context();
        match dispatch(&ctx, b"SUBSCRIBE", &[Bytes::from_static(b"news")]) {
            Outcome::Subscribe(channel) => assert_eq!(channel, Bytes::from_static(b"news")),
            _ => panic!("expected Subscribe outcome"),
        }
    }

    #[test]
    fn monitor_is_special_cased() {
        let ctx = test_context();
        match dispatch(&ctx, b"MONITOR", &[]) {
            Outcome::Monitor => {}
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn lclear_is_rejected_from_a_live_connection_but_works_under_replay() {
        let ctx = test_context();
        dispatch(&ctx, b"RPUSH", &[Bytes::from_static(b"k"), Bytes::from_static(b"v")]);

        match dispatch(&ctx, b"LCLEAR", &[Bytes::from_static(b"k")]) {
            Outcome::Reply(Value::Error(_)) => {}
            other => panic!("expected lclear to be rejected as unknown, got {other:?}"),
        }

        match dispatch_replay(&ctx, b"LCLEAR", &[Bytes::from_static(b"k")]) {
            Outcome::Reply(Value::Simple(_)) => {}
            other => panic!("expected lclear to succeed under replay, got {other:?}"),
        }
    }

    #[test]
    fn write_commands_are_logged_to_the_aof() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::remove_file(tmp.path()).ok();
        let aof = Arc::new(Aof::open(tmp.path()).unwrap());
        let mut ctx = test_context();
        ctx.aof = Some(Arc::clone(&aof));

        dispatch(&ctx, b"SET", &[Bytes::from_static(b"k"), Bytes::from_static(b"v")]);

        let mut seen = Vec::new();
        Aof::load(tmp.path(), |name, args| seen.push((name.to_vec(), args.to_vec()))).unwrap();
        assert_eq!(seen, vec![(b"SET".to_vec(), vec![Bytes::from_static(b"k"), Bytes::from_static(b"v")])]);
    }
}
