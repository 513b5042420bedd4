//! Serialization strategies for cached results.

use fedq_proto::{Entry, Value};

use crate::connector::{Group, QueryResult};
use crate::error::CacheError;

/// Turns a query result into bytes and back.
pub trait Codec: Send + Sync {
    /// File extension, including the dot.
    fn extension(&self) -> &'static str;

    fn encode(&self, result: &QueryResult) -> Result<Vec<u8>, CacheError>;

    fn decode(&self, data: &[u8]) -> Result<QueryResult, CacheError>;
}

/// Pretty-printed JSON.
///
/// JSON has no NaN or infinity, so results holding non-finite floats are
/// refused rather than stored as null.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn extension(&self) -> &'static str {
        ".json"
    }

    fn encode(&self, result: &QueryResult) -> Result<Vec<u8>, CacheError> {
        let non_finite = match result {
            QueryResult::Entries(entries) => entries.iter().any(entry_has_non_finite),
            QueryResult::Count(_) => false,
            QueryResult::Groups(groups) => groups
                .iter()
                .any(|g| has_non_finite(&g.key) || g.entries.iter().any(entry_has_non_finite)),
        };
        if non_finite {
            return Err(CacheError::Serialization("non-finite float has no JSON form".into()));
        }
        serde_json::to_vec_pretty(result).map_err(|e| CacheError::Serialization(e.to_string()))
    }

    fn decode(&self, data: &[u8]) -> Result<QueryResult, CacheError> {
        serde_json::from_slice(data).map_err(|e| CacheError::Corrupt(e.to_string()))
    }
}

fn entry_has_non_finite(entry: &Entry) -> bool {
    entry.into_iter().any(|(_, value)| has_non_finite(value))
}

fn has_non_finite(value: &Value) -> bool {
    match value {
        Value::Float(v) => !v.is_finite(),
        Value::List(items) => items.iter().any(has_non_finite),
        Value::Map(entry) => entry_has_non_finite(entry),
        _ => false,
    }
}

const MAGIC: &[u8; 4] = b"FQC1";
const MAX_DEPTH: usize = 128;

/// Result kind tag.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResultTag {
    Entries = 0,
    Count = 1,
    Groups = 2,
}

impl TryFrom<u8> for ResultTag {
    type Error = CacheError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ResultTag::Entries),
            1 => Ok(ResultTag::Count),
            2 => Ok(ResultTag::Groups),
            _ => Err(CacheError::Corrupt(format!("unknown result tag: {}", value))),
        }
    }
}

/// Type tag for encoded values.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ValueTag {
    Null = 0,
    Bool = 1,
    Int = 2,
    Float = 3,
    String = 4,
    List = 5,
    Map = 6,
}

impl TryFrom<u8> for ValueTag {
    type Error = CacheError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ValueTag::Null),
            1 => Ok(ValueTag::Bool),
            2 => Ok(ValueTag::Int),
            3 => Ok(ValueTag::Float),
            4 => Ok(ValueTag::String),
            5 => Ok(ValueTag::List),
            6 => Ok(ValueTag::Map),
            _ => Err(CacheError::Corrupt(format!("unknown value tag: {}", value))),
        }
    }
}

/// Compact tagged little-endian encoding.
///
/// Format:
/// - Magic `FQC1`
/// - Result tag (1 byte), then:
///   - entries: count (4 bytes) followed by each entry
///   - count: value (8 bytes)
///   - groups: count (4 bytes), then per group its key value and entry list
///
/// An entry is a field count (4 bytes) followed by, per field, the name
/// length (2 bytes), the UTF-8 name, a value tag (1 byte) and the value data.
/// Strings carry a 4-byte length; lists and maps a 4-byte element count.
#[derive(Debug, Clone, Copy, Default)]
pub struct BinaryCodec;

impl Codec for BinaryCodec {
    fn extension(&self) -> &'static str {
        ".bin"
    }

    fn encode(&self, result: &QueryResult) -> Result<Vec<u8>, CacheError> {
        let mut buf = Vec::with_capacity(256);
        buf.extend_from_slice(MAGIC);

        match result {
            QueryResult::Entries(entries) => {
                buf.push(ResultTag::Entries as u8);
                encode_entries(&mut buf, entries)?;
            }
            QueryResult::Count(n) => {
                buf.push(ResultTag::Count as u8);
                buf.extend_from_slice(&(*n as u64).to_le_bytes());
            }
            QueryResult::Groups(groups) => {
                buf.push(ResultTag::Groups as u8);
                write_len(&mut buf, groups.len())?;
                for group in groups {
                    encode_value(&mut buf, &group.key)?;
                    encode_entries(&mut buf, &group.entries)?;
                }
            }
        }
        Ok(buf)
    }

    fn decode(&self, data: &[u8]) -> Result<QueryResult, CacheError> {
        let mut reader = Reader::new(data);
        if reader.take(MAGIC.len())? != MAGIC {
            return Err(CacheError::Corrupt("bad magic".into()));
        }

        let result = match ResultTag::try_from(reader.u8()?)? {
            ResultTag::Entries => QueryResult::Entries(decode_entries(&mut reader)?),
            ResultTag::Count => {
                let n = u64::from_le_bytes(reader.array()?);
                QueryResult::Count(
                    usize::try_from(n).map_err(|_| CacheError::Corrupt(format!("count {} overflows", n)))?,
                )
            }
            ResultTag::Groups => {
                let count = reader.len()?;
                let mut groups = Vec::with_capacity(count.min(1024));
                for _ in 0..count {
                    let key = decode_value(&mut reader, 0)?;
                    let entries = decode_entries(&mut reader)?;
                    groups.push(Group { key, entries });
                }
                QueryResult::Groups(groups)
            }
        };

        if !reader.is_done() {
            return Err(CacheError::Corrupt("trailing bytes".into()));
        }
        Ok(result)
    }
}

fn write_len(buf: &mut Vec<u8>, len: usize) -> Result<(), CacheError> {
    let len = u32::try_from(len).map_err(|_| CacheError::Serialization(format!("length {} too large", len)))?;
    buf.extend_from_slice(&len.to_le_bytes());
    Ok(())
}

fn encode_entries(buf: &mut Vec<u8>, entries: &[Entry]) -> Result<(), CacheError> {
    write_len(buf, entries.len())?;
    for entry in entries {
        encode_entry(buf, entry)?;
    }
    Ok(())
}

fn encode_entry(buf: &mut Vec<u8>, entry: &Entry) -> Result<(), CacheError> {
    write_len(buf, entry.len())?;
    for (name, value) in entry {
        let name_bytes = name.as_bytes();
        if name_bytes.len() > u16::MAX as usize {
            return Err(CacheError::Serialization("field name too long".into()));
        }
        buf.extend_from_slice(&(name_bytes.len() as u16).to_le_bytes());
        buf.extend_from_slice(name_bytes);
        encode_value(buf, value)?;
    }
    Ok(())
}

fn encode_value(buf: &mut Vec<u8>, value: &Value) -> Result<(), CacheError> {
    match value {
        Value::Null => buf.push(ValueTag::Null as u8),
        Value::Bool(v) => {
            buf.push(ValueTag::Bool as u8);
            buf.push(u8::from(*v));
        }
        Value::Int(v) => {
            buf.push(ValueTag::Int as u8);
            buf.extend_from_slice(&v.to_le_bytes());
        }
        Value::Float(v) => {
            buf.push(ValueTag::Float as u8);
            buf.extend_from_slice(&v.to_le_bytes());
        }
        Value::String(v) => {
            buf.push(ValueTag::String as u8);
            write_len(buf, v.len())?;
            buf.extend_from_slice(v.as_bytes());
        }
        Value::List(items) => {
            buf.push(ValueTag::List as u8);
            write_len(buf, items.len())?;
            for item in items {
                encode_value(buf, item)?;
            }
        }
        Value::Map(entry) => {
            buf.push(ValueTag::Map as u8);
            encode_entry(buf, entry)?;
        }
    }
    Ok(())
}

struct Reader<'a> {
    data: &'a [u8],
    cursor: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, cursor: 0 }
    }

    fn is_done(&self) -> bool {
        self.cursor == self.data.len()
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], CacheError> {
        let end = self
            .cursor
            .checked_add(n)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| CacheError::Corrupt(format!("truncated at byte {}", self.cursor)))?;
        let bytes = &self.data[self.cursor..end];
        self.cursor = end;
        Ok(bytes)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], CacheError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8, CacheError> {
        Ok(self.take(1)?[0])
    }

    fn len(&mut self) -> Result<usize, CacheError> {
        Ok(u32::from_le_bytes(self.array()?) as usize)
    }

    fn string(&mut self, len: usize) -> Result<String, CacheError> {
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| CacheError::Corrupt("invalid UTF-8".into()))
    }
}

fn decode_entries(reader: &mut Reader<'_>) -> Result<Vec<Entry>, CacheError> {
    let count = reader.len()?;
    let mut entries = Vec::with_capacity(count.min(1024));
    for _ in 0..count {
        entries.push(decode_entry(reader, 0)?);
    }
    Ok(entries)
}

fn decode_entry(reader: &mut Reader<'_>, depth: usize) -> Result<Entry, CacheError> {
    let count = reader.len()?;
    let mut entry = Entry::new();
    for _ in 0..count {
        let name_len = u16::from_le_bytes(reader.array()?) as usize;
        let name = reader.string(name_len)?;
        let value = decode_value(reader, depth + 1)?;
        entry.insert(name, value);
    }
    Ok(entry)
}

fn decode_value(reader: &mut Reader<'_>, depth: usize) -> Result<Value, CacheError> {
    if depth > MAX_DEPTH {
        return Err(CacheError::Corrupt("value nesting too deep".into()));
    }

    let value = match ValueTag::try_from(reader.u8()?)? {
        ValueTag::Null => Value::Null,
        ValueTag::Bool => Value::Bool(reader.u8()? != 0),
        ValueTag::Int => Value::Int(i64::from_le_bytes(reader.array()?)),
        ValueTag::Float => Value::Float(f64::from_le_bytes(reader.array()?)),
        ValueTag::String => {
            let len = reader.len()?;
            Value::String(reader.string(len)?)
        }
        ValueTag::List => {
            let count = reader.len()?;
            let mut items = Vec::with_capacity(count.min(1024));
            for _ in 0..count {
                items.push(decode_value(reader, depth + 1)?);
            }
            Value::List(items)
        }
        ValueTag::Map => Value::Map(decode_entry(reader, depth + 1)?),
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<Entry> {
        vec![
            Entry::from([
                ("id", Value::Int(-7)),
                ("score", Value::Float(0.25)),
                ("name", Value::from("Zoë")),
                ("tags", Value::from(vec!["a", "b"])),
                ("missing", Value::Null),
                ("flag", Value::Bool(true)),
            ]),
            Entry::from([("nested", Value::Map(Entry::from([("x", 1)])))]),
        ]
    }

    #[test]
    fn test_binary_result_kinds() {
        let codec = BinaryCodec;
        let results = [
            QueryResult::Entries(sample()),
            QueryResult::Count(42),
            QueryResult::Groups(vec![Group {
                key: Value::from(vec![1, 2]),
                entries: sample(),
            }]),
        ];
        for result in results {
            let bytes = codec.encode(&result).unwrap();
            assert_eq!(codec.decode(&bytes).unwrap(), result);
        }
    }

    #[test]
    fn test_json_keeps_int_float_distinction() {
        let codec = JsonCodec;
        let result = QueryResult::Entries(vec![Entry::from([("i", Value::Int(3)), ("f", Value::Float(3.0))])]);
        let decoded = codec.decode(&codec.encode(&result).unwrap()).unwrap();
        assert_eq!(decoded, result);
    }

    #[test]
    fn test_json_refuses_non_finite_floats() {
        let codec = JsonCodec;
        for v in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let nested = Entry::from([("x", Value::from(vec![Value::Float(v)]))]);
            let result = QueryResult::Entries(vec![Entry::from([("ok", 1)]), nested]);
            assert!(matches!(codec.encode(&result), Err(CacheError::Serialization(_))));

            let groups = QueryResult::Groups(vec![Group {
                key: Value::Float(v),
                entries: vec![],
            }]);
            assert!(matches!(codec.encode(&groups), Err(CacheError::Serialization(_))));
        }

        let bytes = BinaryCodec
            .encode(&QueryResult::Entries(vec![Entry::from([("x", Value::Float(f64::INFINITY))])]))
            .unwrap();
        assert!(BinaryCodec.decode(&bytes).is_ok());
    }

    #[test]
    fn test_binary_rejects_corrupt_input() {
        let codec = BinaryCodec;
        let bytes = codec.encode(&QueryResult::Entries(sample())).unwrap();

        assert!(matches!(codec.decode(b"nope"), Err(CacheError::Corrupt(_))));
        assert!(matches!(codec.decode(&bytes[..bytes.len() - 3]), Err(CacheError::Corrupt(_))));

        let mut bad_tag = bytes.clone();
        bad_tag[4] = 9;
        assert!(matches!(codec.decode(&bad_tag), Err(CacheError::Corrupt(_))));

        let mut trailing = bytes;
        trailing.push(0);
        assert!(matches!(codec.decode(&trailing), Err(CacheError::Corrupt(_))));
    }

    #[test]
    fn test_json_rejects_garbage() {
        assert!(matches!(JsonCodec.decode(b"{not json"), Err(CacheError::Corrupt(_))));
    }
}
