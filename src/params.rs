//! Parameter lists and their binding onto a compiled statement.
//!
//! A [`Params`] list mixes named and positional entries in one ordered list,
//! mirroring a Lua parameter table. Binding is deliberately lenient: keys that
//! resolve to no parameter and values of unsupported types are skipped rather
//! than reported.

use tracing::trace;

use crate::native::RawStatement;

/// How a parameter entry addresses its slot.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamKey {
    /// A parameter name including its prefix, e.g. `:x`.
    Name(Vec<u8>),
    /// A 1-based parameter position.
    Index(i32),
    /// Any other key; resolves to no parameter.
    Other,
}

impl ParamKey {
    /// Key for a numeric host value; fractions truncate toward zero.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn from_number(n: f64) -> Self {
        if n.is_finite() && n >= f64::from(i32::MIN) && n <= f64::from(i32::MAX) {
            ParamKey::Index(n as i32)
        } else {
            ParamKey::Index(0)
        }
    }

    #[must_use]
    pub fn from_integer(i: i64) -> Self {
        ParamKey::Index(i32::try_from(i).unwrap_or(0))
    }

    fn resolve(&self, stmt: &RawStatement) -> i32 {
        match self {
            ParamKey::Name(name) => stmt.parameter_index(name),
            ParamKey::Index(idx) => *idx,
            ParamKey::Other => 0,
        }
    }
}

impl From<&str> for ParamKey {
    fn from(name: &str) -> Self {
        ParamKey::Name(name.as_bytes().to_vec())
    }
}

impl From<i32> for ParamKey {
    fn from(idx: i32) -> Self {
        ParamKey::Index(idx)
    }
}

/// A value to bind.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    /// Bound as text of exactly these bytes.
    Text(Vec<u8>),
    /// Bound as a floating-point value.
    Number(f64),
    /// A host value with no binding; skipped.
    Unsupported,
}

impl From<&str> for ParamValue {
    fn from(text: &str) -> Self {
        ParamValue::Text(text.as_bytes().to_vec())
    }
}

impl From<&[u8]> for ParamValue {
    fn from(bytes: &[u8]) -> Self {
        ParamValue::Text(bytes.to_vec())
    }
}

impl From<Vec<u8>> for ParamValue {
    fn from(bytes: Vec<u8>) -> Self {
        ParamValue::Text(bytes)
    }
}

impl From<f64> for ParamValue {
    fn from(n: f64) -> Self {
        ParamValue::Number(n)
    }
}

impl From<i64> for ParamValue {
    #[allow(clippy::cast_precision_loss)]
    fn from(n: i64) -> Self {
        ParamValue::Number(n as f64)
    }
}

/// Ordered parameter entries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params(pub Vec<(ParamKey, ParamValue)>);

impl Params {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry, builder style.
    #[must_use]
    pub fn with(mut self, key: impl Into<ParamKey>, value: impl Into<ParamValue>) -> Self {
        self.push(key, value);
        self
    }

    pub fn push(&mut self, key: impl Into<ParamKey>, value: impl Into<ParamValue>) {
        self.0.push((key.into(), value.into()));
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(ParamKey, ParamValue)> {
        self.0.iter()
    }

    /// Bind every entry in order. Native bind status codes are not reported.
    pub(crate) fn bind_to(&self, stmt: &RawStatement) {
        for (key, value) in &self.0 {
            let index = key.resolve(stmt);
            let rc = match value {
                ParamValue::Text(bytes) => stmt.bind_text(index, bytes),
                ParamValue::Number(n) => stmt.bind_double(index, *n),
                ParamValue::Unsupported => {
                    trace!(?key, "skipping parameter with unsupported value");
                    continue;
                }
            };
            trace!(?key, index, code = rc, "bound parameter");
        }
    }
}

impl<K: Into<ParamKey>, V: Into<ParamValue>> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Params(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}
