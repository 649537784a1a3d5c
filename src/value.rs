/// A column value as seen by host code.
///
/// Native integers and floats collapse into `Number`; text and blobs both
/// become `Bytes` with their exact length, embedded NULs included. A native
/// NULL is `Absent`, which the Lua surface shows as `false`.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Number(f64),
    Bytes(Vec<u8>),
    Absent,
}

impl Value {
    #[must_use]
    pub fn is_absent(&self) -> bool {
        matches!(self, Value::Absent)
    }

    #[must_use]
    pub fn as_number(&self) -> Option<f64> {
        if let Value::Number(n) = self {
            Some(*n)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        if let Value::Bytes(bytes) = self {
            Some(bytes)
        } else {
            None
        }
    }

    /// The bytes as UTF-8 text, if they are valid UTF-8.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        self.as_bytes().and_then(|b| std::str::from_utf8(b).ok())
    }
}
