use bytes::Bytes;

/// A single RESP wire value.
///
/// Only the five frame kinds needed by the RESP2 subset of the protocol are
/// represented: simple strings, errors, integers, (nullable) bulk strings and
/// (nullable) arrays. There is no RESP3 push/map/double/boolean family here;
/// the server never negotiates a protocol version above 2.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Simple(Bytes),
    Error(Bytes),
    Integer(i64),
    Bulk(Option<Bytes>),
    Array(Option<Vec<Value>>),
}

impl Value {
    pub const NULL_BULK: Value = Value::Bulk(None);
    pub const NULL_ARRAY: Value = Value::Array(None);
    pub const OK: Value = Value::Simple(Bytes::from_static(b"OK"));

    pub fn simple(value: impl Into<Bytes>) -> Value {
        Value::Simple(value.into())
    }

    pub fn error(message: impl Into<Bytes>) -> Value {
        Value::Error(message.into())
    }

    pub fn bulk(value: impl Into<Bytes>) -> Value {
        Value::Bulk(Some(value.into()))
    }

    pub fn array(values: Vec<Value>) -> Value {
        Value::Array(Some(values))
    }

    /// The command name and arguments, if this value is a well-formed
    /// non-empty array of bulk strings (the only shape a client request may
    /// take).
    pub fn as_command(&self) -> Option<(&[u8], &[Value])> {
        let Value::Array(Some(items)) = self else {
            return None;
        };
        let [first, rest @ ..] = items.as_slice() else {
            return None;
        };
        let Value::Bulk(Some(name)) = first else {
            return None;
        };
        Some((&name[..], rest))
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Integer(i64::from(value))
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<usize> for Value {
    fn from(value: usize) -> Self {
        match i64::try_from(value) {
            Ok(value) => Value::Integer(value),
            Err(_) => Value::error("ERR value too large to represent as an integer"),
        }
    }
}

impl From<Bytes> for Value {
    fn from(value: Bytes) -> Self {
        Value::bulk(value)
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Value::bulk(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(value) => value.into(),
            None => Value::NULL_BULK,
        }
    }
}

impl<T: Into<Value>> FromIterator<T> for Value {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Value::array(iter.into_iter().map(Into::into).collect())
    }
}
