//! Field schema: the static table that maps byte ranges of a datagram to
//! named numeric fields.
//!
//! A schema is built once at startup from a YAML definition, validated, and
//! then shared read-only (behind an `Arc`) by every decode call.

use std::collections::HashMap;
use std::fmt;
use std::ops::Range;
use std::str::FromStr;

use serde::Deserialize;
use simracing_telemetry_errors::SchemaError;

/// Wire type of a single field. All values are little-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    S32,
    U32,
    F32,
    U16,
    U8,
    S8,
}

impl DataType {
    /// Number of bytes the type occupies on the wire.
    pub const fn width(self) -> usize {
        match self {
            DataType::S32 | DataType::U32 | DataType::F32 => 4,
            DataType::U16 => 2,
            DataType::U8 | DataType::S8 => 1,
        }
    }

    /// Read a value of this type from exactly [`width`](Self::width) bytes,
    /// widened to `f32`.
    ///
    /// Integers are converted numerically, never reinterpreted; `F32` is a
    /// bit-exact reinterpretation. Returns `None` if `bytes` has the wrong
    /// length.
    pub fn read(self, bytes: &[u8]) -> Option<f32> {
        match self {
            DataType::F32 => bytes.try_into().ok().map(f32::from_le_bytes),
            DataType::U32 => bytes
                .try_into()
                .ok()
                .map(|b| u32::from_le_bytes(b) as f32),
            DataType::S32 => bytes
                .try_into()
                .ok()
                .map(|b| i32::from_le_bytes(b) as f32),
            DataType::U16 => bytes
                .try_into()
                .ok()
                .map(|b| f32::from(u16::from_le_bytes(b))),
            DataType::U8 => bytes
                .try_into()
                .ok()
                .map(|b| f32::from(u8::from_le_bytes(b))),
            DataType::S8 => bytes
                .try_into()
                .ok()
                .map(|b| f32::from(i8::from_le_bytes(b))),
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            DataType::S32 => "S32",
            DataType::U32 => "U32",
            DataType::F32 => "F32",
            DataType::U16 => "U16",
            DataType::U8 => "U8",
            DataType::S8 => "S8",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "S32" => Ok(DataType::S32),
            "U32" => Ok(DataType::U32),
            "F32" => Ok(DataType::F32),
            "U16" => Ok(DataType::U16),
            "U8" => Ok(DataType::U8),
            "S8" => Ok(DataType::S8),
            _ => Err(()),
        }
    }
}

/// One named field of a packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: String,
    pub data_type: DataType,
    /// Half-open byte range `[start, end)` inside the datagram.
    pub byte_range: Range<usize>,
    /// Declaration position, used for column ordering.
    pub ordinal: usize,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, data_type: DataType, start: usize, ordinal: usize) -> Self {
        Self {
            name: name.into(),
            data_type,
            byte_range: start..start.saturating_add(data_type.width()),
            ordinal,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SchemaDefinition {
    fields: Vec<FieldDefinition>,
}

#[derive(Debug, Deserialize)]
struct FieldDefinition {
    name: String,
    #[serde(rename = "type")]
    data_type: String,
}

/// Validated, immutable field table.
///
/// Invariants, checked by every constructor:
/// - at least one field
/// - field names are unique
/// - ranges start at 0, are contiguous and never overlap
/// - every range is exactly as wide as its data type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSchema {
    fields: Vec<FieldSpec>,
    index: HashMap<String, usize>,
    packet_len: usize,
}

impl FieldSchema {
    /// Build a schema from explicit field specs, validating all invariants.
    /// Ordinals are reassigned from the slice position.
    pub fn new(mut fields: Vec<FieldSpec>) -> Result<Self, SchemaError> {
        if fields.is_empty() {
            return Err(SchemaError::Empty);
        }

        let mut index = HashMap::with_capacity(fields.len());
        let mut expected_start = 0usize;

        for (ordinal, field) in fields.iter_mut().enumerate() {
            field.ordinal = ordinal;

            let actual = field.byte_range.end.saturating_sub(field.byte_range.start);
            if actual != field.data_type.width() {
                return Err(SchemaError::WidthMismatch {
                    field: field.name.clone(),
                    expected: field.data_type.width(),
                    actual,
                });
            }

            if field.byte_range.start != expected_start {
                return Err(SchemaError::NonContiguous {
                    field: field.name.clone(),
                    expected: expected_start,
                    actual: field.byte_range.start,
                });
            }
            expected_start = field.byte_range.end;

            if index.insert(field.name.clone(), ordinal).is_some() {
                return Err(SchemaError::DuplicateField(field.name.clone()));
            }
        }

        Ok(Self {
            fields,
            index,
            packet_len: expected_start,
        })
    }

    /// Build a schema from `(name, type)` pairs, deriving byte ranges by
    /// packing the fields back to back from offset 0.
    pub fn from_types<I, S>(declarations: I) -> Result<Self, SchemaError>
    where
        I: IntoIterator<Item = (S, DataType)>,
        S: Into<String>,
    {
        let mut offset = 0usize;
        let fields = declarations
            .into_iter()
            .enumerate()
            .map(|(ordinal, (name, data_type))| {
                let spec = FieldSpec::new(name, data_type, offset, ordinal);
                offset = spec.byte_range.end;
                spec
            })
            .collect();
        Self::new(fields)
    }

    /// Parse a YAML definition of the form
    ///
    /// ```yaml
    /// game: fms2023
    /// fields:
    ///   - { name: IsRaceOn, type: S32 }
    ///   - { name: TimestampMS, type: U32 }
    /// ```
    pub fn from_yaml(definition: &str) -> Result<Self, SchemaError> {
        let parsed: SchemaDefinition =
            serde_yaml::from_str(definition).map_err(|e| SchemaError::Parse(e.to_string()))?;

        let mut declarations = Vec::with_capacity(parsed.fields.len());
        for field in parsed.fields {
            let data_type = field.data_type.parse::<DataType>().map_err(|()| {
                SchemaError::UnknownDataType {
                    field: field.name.clone(),
                    data_type: field.data_type.clone(),
                }
            })?;
            declarations.push((field.name, data_type));
        }

        Self::from_types(declarations)
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Minimum datagram length: the end offset of the last field.
    pub fn packet_len(&self) -> usize {
        self.packet_len
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.ordinal(name).and_then(|i| self.fields.get(i))
    }

    pub fn ordinal(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Field names in declaration order.
    pub fn field_names(&self) -> impl ExactSizeIterator<Item = &str> + '_ {
        self.fields.iter().map(|f| f.name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[test]
    fn test_widths() {
        assert_eq!(DataType::S32.width(), 4);
        assert_eq!(DataType::U32.width(), 4);
        assert_eq!(DataType::F32.width(), 4);
        assert_eq!(DataType::U16.width(), 2);
        assert_eq!(DataType::U8.width(), 1);
        assert_eq!(DataType::S8.width(), 1);
    }

    #[test]
    fn test_read_widens_integers() {
        assert_eq!(DataType::S8.read(&[0xFF]), Some(-1.0));
        assert_eq!(DataType::U8.read(&[0xFF]), Some(255.0));
        assert_eq!(DataType::U16.read(&[0x34, 0x12]), Some(4660.0));
        assert_eq!(DataType::S32.read(&(-42i32).to_le_bytes()), Some(-42.0));
        assert_eq!(DataType::U32.read(&7u32.to_le_bytes()), Some(7.0));
        assert_eq!(DataType::U16.read(&[0x01]), None);
    }

    #[test]
    fn test_read_f32_is_bit_exact() {
        let value = f32::from_bits(0x7F7F_FFFF);
        let read = DataType::F32.read(&value.to_le_bytes());
        assert_eq!(read.map(f32::to_bits), Some(value.to_bits()));
    }

    #[test]
    fn test_from_types_packs_ranges() -> TestResult {
        let schema = FieldSchema::from_types([
            ("IsRaceOn", DataType::S32),
            ("LapNumber", DataType::U16),
            ("Gear", DataType::U8),
            ("Steer", DataType::S8),
        ])?;

        assert_eq!(schema.packet_len(), 8);
        let lap = schema.field("LapNumber").ok_or("missing LapNumber")?;
        assert_eq!(lap.byte_range, 4..6);
        assert_eq!(lap.ordinal, 1);
        assert_eq!(
            schema.field_names().collect::<Vec<_>>(),
            ["IsRaceOn", "LapNumber", "Gear", "Steer"]
        );
        Ok(())
    }

    #[test]
    fn test_rejects_gap() {
        let fields = vec![
            FieldSpec::new("A", DataType::U8, 0, 0),
            FieldSpec::new("B", DataType::U8, 2, 1),
        ];
        assert_eq!(
            FieldSchema::new(fields),
            Err(SchemaError::NonContiguous {
                field: "B".into(),
                expected: 1,
                actual: 2,
            })
        );
    }

    #[test]
    fn test_rejects_overlap() {
        let fields = vec![
            FieldSpec::new("A", DataType::F32, 0, 0),
            FieldSpec::new("B", DataType::U16, 2, 1),
        ];
        assert!(matches!(
            FieldSchema::new(fields),
            Err(SchemaError::NonContiguous { .. })
        ));
    }

    #[test]
    fn test_rejects_width_mismatch() {
        let mut field = FieldSpec::new("Speed", DataType::F32, 0, 0);
        field.byte_range = 0..2;
        assert_eq!(
            FieldSchema::new(vec![field]),
            Err(SchemaError::WidthMismatch {
                field: "Speed".into(),
                expected: 4,
                actual: 2,
            })
        );
    }

    #[test]
    fn test_rejects_duplicates_and_empty() {
        assert_eq!(
            FieldSchema::from_types([("A", DataType::U8), ("A", DataType::U8)]),
            Err(SchemaError::DuplicateField("A".into()))
        );
        assert_eq!(
            FieldSchema::from_types(Vec::<(String, DataType)>::new()),
            Err(SchemaError::Empty)
        );
    }

    #[test]
    fn test_from_yaml_unknown_type() {
        let yaml = "fields:\n  - { name: Boost, type: F64 }\n";
        assert_eq!(
            FieldSchema::from_yaml(yaml),
            Err(SchemaError::UnknownDataType {
                field: "Boost".into(),
                data_type: "F64".into(),
            })
        );
    }

    #[test]
    fn test_from_yaml_garbage() {
        assert!(matches!(
            FieldSchema::from_yaml("fields: 12"),
            Err(SchemaError::Parse(_))
        ));
    }
}
