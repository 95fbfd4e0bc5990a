use super::Value;
use std::io::Write;

/// Append the wire representation of `value` to `out`. Total over every
/// well-formed [`Value`]; never fails.
pub fn encode(value: &Value, out: &mut Vec<u8>) {
    match value {
        Value::Simple(bytes) => {
            out.push(b'+');
            out.extend_from_slice(bytes);
            out.extend_from_slice(b"\r\n");
        }
        Value::Error(bytes) => {
            out.push(b'-');
            out.extend_from_slice(bytes);
            out.extend_from_slice(b"\r\n");
        }
        Value::Integer(n) => {
            out.push(b':');
            let _ = write!(out, "{n}");
            out.extend_from_slice(b"\r\n");
        }
        Value::Bulk(None) => out.extend_from_slice(b"$-1\r\n"),
        Value::Bulk(Some(bytes)) => {
            out.push(b'$');
            let _ = write!(out, "{}", bytes.len());
            out.extend_from_slice(b"\r\n");
            out.extend_from_slice(bytes);
            out.extend_from_slice(b"\r\n");
        }
        Value::Array(None) => out.extend_from_slice(b"*-1\r\n"),
        Value::Array(Some(items)) => {
            out.push(b'*');
            let _ = write!(out, "{}", items.len());
            out.extend_from_slice(b"\r\n");
            for item in items {
                encode(item, out);
            }
        }
    }
}

/// Encode `value` into a freshly allocated buffer.
pub fn to_bytes(value: &Value) -> Vec<u8> {
    let mut out = Vec::new();
    encode(value, &mut out);
    out
}
