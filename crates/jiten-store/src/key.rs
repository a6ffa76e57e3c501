use serde_json::Value;

/// A secondary-index key: an integer or a string.
///
/// Keys are compared through their byte encoding, which orders all integers
/// before all strings and each kind naturally within itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexKey {
    Int(i64),
    Str(String),
}

const TAG_INT: u8 = 0x01;
const TAG_STR: u8 = 0x02;

impl IndexKey {
    /// Extracts an index key from one field of a serialized row.
    ///
    /// Rows whose field is absent or of a non-key type are simply not
    /// present in that index.
    pub fn from_field(value: &Value) -> Option<IndexKey> {
        match value {
            Value::Number(n) => n.as_i64().map(IndexKey::Int),
            Value::String(s) => Some(IndexKey::Str(s.clone())),
            _ => None,
        }
    }

    /// Order-preserving byte encoding.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            // Sign-flipped big-endian keeps negative integers ordered below
            // positive ones in unsigned byte comparison.
            IndexKey::Int(i) => {
                let mut out = Vec::with_capacity(9);
                out.push(TAG_INT);
                out.extend_from_slice(&((*i as u64) ^ (1 << 63)).to_be_bytes());
                out
            }
            IndexKey::Str(s) => {
                let mut out = Vec::with_capacity(1 + s.len());
                out.push(TAG_STR);
                out.extend_from_slice(s.as_bytes());
                out
            }
        }
    }
}

impl From<&str> for IndexKey {
    fn from(s: &str) -> Self {
        IndexKey::Str(s.to_string())
    }
}

impl From<String> for IndexKey {
    fn from(s: String) -> Self {
        IndexKey::Str(s)
    }
}

impl From<i64> for IndexKey {
    fn from(i: i64) -> Self {
        IndexKey::Int(i)
    }
}
