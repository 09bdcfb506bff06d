//! Field schema definition errors.

/// Errors raised while building a field schema.
///
/// Every variant is a startup failure: a schema is built once from a static
/// definition and never changes afterwards.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    /// The definition names a data type the decoder does not know.
    #[error("unknown data type '{data_type}' for field '{field}'")]
    UnknownDataType {
        /// Field name
        field: String,
        /// The unrecognised type token
        data_type: String,
    },

    /// A byte range does not match the width of its data type.
    #[error("field '{field}' spans {actual} bytes but its type needs {expected}")]
    WidthMismatch {
        /// Field name
        field: String,
        /// Width implied by the data type
        expected: usize,
        /// Width of the declared range
        actual: usize,
    },

    /// A byte range leaves a gap or overlaps the previous field.
    #[error("field '{field}' starts at byte {actual} but the previous field ends at {expected}")]
    NonContiguous {
        /// Field name
        field: String,
        /// Offset where the field should start
        expected: usize,
        /// Offset where the field actually starts
        actual: usize,
    },

    /// Two fields share a name.
    #[error("duplicate field name '{0}'")]
    DuplicateField(String),

    /// The definition has no fields.
    #[error("schema has no fields")]
    Empty,

    /// The definition document could not be parsed.
    #[error("invalid schema definition: {0}")]
    Parse(String),
}
