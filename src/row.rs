use std::sync::Arc;

use crate::value::Value;

/// One result row produced by a single step.
///
/// Values are addressable by column name or by 1-based position, the two
/// addressing modes the Lua row table exposes.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    column_names: Arc<Vec<Vec<u8>>>,
    values: Vec<Value>,
}

impl Row {
    #[must_use]
    pub fn new(column_names: Arc<Vec<Vec<u8>>>, values: Vec<Value>) -> Self {
        Self {
            column_names,
            values,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Column names as the raw bytes the engine reported.
    #[must_use]
    pub fn column_names(&self) -> &[Vec<u8>] {
        &self.column_names
    }

    /// Value of the named column.
    ///
    /// With duplicate names the last such column wins, matching the row table
    /// handed to Lua where later columns overwrite the name key.
    #[must_use]
    pub fn get(&self, column_name: impl AsRef<[u8]>) -> Option<&Value> {
        let column_name = column_name.as_ref();
        let idx = self
            .column_names
            .iter()
            .rposition(|name| name.as_slice() == column_name)?;
        self.values.get(idx)
    }

    /// Value at a 1-based column position.
    #[must_use]
    pub fn get_by_position(&self, position: usize) -> Option<&Value> {
        position.checked_sub(1).and_then(|idx| self.values.get(idx))
    }

    /// `(name, value)` pairs in column order.
    pub fn iter(&self) -> impl Iterator<Item = (&[u8], &Value)> {
        self.column_names
            .iter()
            .map(Vec::as_slice)
            .zip(self.values.iter())
    }

    #[must_use]
    pub fn into_values(self) -> Vec<Value> {
        self.values
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(names: &[&str], values: Vec<Value>) -> Row {
        Row::new(
            Arc::new(names.iter().map(|name| name.as_bytes().to_vec()).collect()),
            values,
        )
    }

    #[test]
    fn name_and_position_address_the_same_value() {
        let r = row(
            &["a", "b"],
            vec![Value::Number(1.0), Value::Bytes(b"x".to_vec())],
        );
        assert_eq!(r.get("a"), r.get_by_position(1));
        assert_eq!(r.get("b"), r.get_by_position(2));
        assert_eq!(r.get_by_position(0), None);
        assert_eq!(r.get_by_position(3), None);
        assert_eq!(r.get("c"), None);
    }

    #[test]
    fn duplicate_names_resolve_to_last_column() {
        let r = row(&["v", "v"], vec![Value::Number(1.0), Value::Number(2.0)]);
        assert_eq!(r.get("v"), Some(&Value::Number(2.0)));
        assert_eq!(r.get_by_position(1), Some(&Value::Number(1.0)));
    }

    #[test]
    fn names_are_matched_as_raw_bytes() {
        let r = Row::new(
            Arc::new(vec![b"caf\xe9".to_vec()]),
            vec![Value::Number(1.0)],
        );
        assert_eq!(r.get(b"caf\xe9"), Some(&Value::Number(1.0)));
        assert_eq!(r.get("caf\u{e9}"), None);
        assert_eq!(r.iter().next().map(|(name, _)| name), Some(&b"caf\xe9"[..]));
    }
}
