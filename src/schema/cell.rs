//! Mutable storage cells holding a single typed field value.
//!
//! A cell is reused across documents by the write workers: `write_cell`
//! parses the incoming string per the field kind, and a parse failure is
//! answered with `write_default` so one bad field never fails the document.

use serde::{Deserialize, Serialize};

use super::{FieldDescriptor, FieldKind};
use crate::error::{Error, Result};

/// The typed payload of a cell.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Text(String),
    Long(i64),
    Double(f64),
    Bool(bool),
}

/// A single mutable storage slot for one field of a document template.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldCell {
    pub value: CellValue,
}

/// Sort codec backing a field, mirroring the underlying primitive kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortType {
    Str,
    Int,
    Long,
    Double,
}

/// Create a cell holding the field's default value.
pub fn create_cell(descriptor: &FieldDescriptor) -> FieldCell {
    let mut cell = FieldCell {
        value: CellValue::Text(String::new()),
    };
    write_default(descriptor, &mut cell);
    cell
}

/// Parse `raw` according to the field kind and store it in the cell.
/// Returns `Err` on a parse failure; callers fall back to [`write_default`].
pub fn write_cell(descriptor: &FieldDescriptor, cell: &mut FieldCell, raw: &str) -> Result<()> {
    match descriptor.kind {
        FieldKind::Int | FieldKind::Long | FieldKind::Date | FieldKind::DateTime => {
            let parsed: i64 = raw.trim().parse().map_err(|_| {
                Error::InvalidCondition(format!(
                    "'{}' is not a valid {:?} for field '{}'",
                    raw, descriptor.kind, descriptor.name
                ))
            })?;
            cell.value = CellValue::Long(parsed);
        }
        FieldKind::Double => {
            let parsed: f64 = raw.trim().parse().map_err(|_| {
                Error::InvalidCondition(format!(
                    "'{}' is not a valid double for field '{}'",
                    raw, descriptor.name
                ))
            })?;
            cell.value = CellValue::Double(parsed);
        }
        FieldKind::Bool => {
            let parsed = match raw.trim().to_lowercase().as_str() {
                "true" => true,
                "false" => false,
                _ => {
                    return Err(Error::InvalidCondition(format!(
                        "'{}' is not a valid bool for field '{}'",
                        raw, descriptor.name
                    )))
                }
            };
            cell.value = CellValue::Bool(parsed);
        }
        FieldKind::ExactText
        | FieldKind::Text
        | FieldKind::Highlight
        | FieldKind::Custom
        | FieldKind::Stored => {
            cell.value = CellValue::Text(raw.to_string());
        }
    }
    Ok(())
}

/// Reset the cell to the field's default value.
pub fn write_default(descriptor: &FieldDescriptor, cell: &mut FieldCell) {
    cell.value = match descriptor.kind {
        FieldKind::Int | FieldKind::Long | FieldKind::Date | FieldKind::DateTime => {
            CellValue::Long(0)
        }
        FieldKind::Double => CellValue::Double(0.0),
        FieldKind::Bool => CellValue::Bool(false),
        _ => CellValue::Text(String::new()),
    };
}

/// The sort codec for a field kind.
pub fn sort_type(descriptor: &FieldDescriptor) -> SortType {
    match descriptor.kind {
        FieldKind::Int | FieldKind::Date => SortType::Int,
        FieldKind::Long | FieldKind::DateTime => SortType::Long,
        FieldKind::Double => SortType::Double,
        _ => SortType::Str,
    }
}
