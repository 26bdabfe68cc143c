use std::collections::HashMap;

use crate::CellValue;

/// A host-supplied data object for one logical row.
///
/// Records are flat field → value maps. Column specs reference fields by
/// name; fields a column points at may be absent, in which case the cell
/// reads as [`CellValue::Null`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RowRecord {
    fields: HashMap<String, CellValue>,
}

impl RowRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style field setter.
    pub fn with(mut self, field: impl Into<String>, value: impl Into<CellValue>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }

    pub fn set(&mut self, field: impl Into<String>, value: impl Into<CellValue>) {
        self.fields.insert(field.into(), value.into());
    }

    pub fn get(&self, field: &str) -> Option<&CellValue> {
        self.fields.get(field)
    }

    /// Cell value for a field, `Null` when the field is absent.
    pub fn value_of(&self, field: &str) -> CellValue {
        self.fields.get(field).cloned().unwrap_or(CellValue::Null)
    }

    /// Merges `patch`'s fields into this record, overwriting on collision.
    /// Used by point updates, which carry partial records.
    pub fn merge(&mut self, patch: &RowRecord) {
        for (k, v) in &patch.fields {
            self.fields.insert(k.clone(), v.clone());
        }
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &CellValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
