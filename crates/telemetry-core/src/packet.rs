//! Packet encoding for a field schema.
//!
//! The inverse of the decoder, used to replay captured values and to build
//! datagrams in tests.

use crate::schema::{DataType, FieldSchema};

/// Builds a zero-filled datagram of `schema.packet_len()` bytes and writes
/// individual fields into it.
#[derive(Debug, Clone)]
pub struct PacketWriter<'a> {
    schema: &'a FieldSchema,
    buffer: Vec<u8>,
}

impl<'a> PacketWriter<'a> {
    pub fn new(schema: &'a FieldSchema) -> Self {
        Self {
            schema,
            buffer: vec![0u8; schema.packet_len()],
        }
    }

    /// Encode `value` into the named field using the field's wire type.
    /// Integer types truncate toward zero and saturate at their bounds.
    ///
    /// Returns `false` if the schema has no such field.
    pub fn set(&mut self, name: &str, value: f64) -> bool {
        let Some(field) = self.schema.field(name) else {
            return false;
        };

        let encoded: Vec<u8> = match field.data_type {
            DataType::F32 => (value as f32).to_le_bytes().to_vec(),
            DataType::U32 => (value as u32).to_le_bytes().to_vec(),
            DataType::S32 => (value as i32).to_le_bytes().to_vec(),
            DataType::U16 => (value as u16).to_le_bytes().to_vec(),
            DataType::U8 => (value as u8).to_le_bytes().to_vec(),
            DataType::S8 => (value as i8).to_le_bytes().to_vec(),
        };

        match self.buffer.get_mut(field.byte_range.clone()) {
            Some(slot) => {
                slot.copy_from_slice(&encoded);
                true
            }
            None => false,
        }
    }

    /// Write raw bits into an `F32` field, bypassing `f64` conversion.
    pub fn set_f32_bits(&mut self, name: &str, bits: u32) -> bool {
        let Some(field) = self.schema.field(name) else {
            return false;
        };
        if field.data_type != DataType::F32 {
            return false;
        }
        match self.buffer.get_mut(field.byte_range.clone()) {
            Some(slot) => {
                slot.copy_from_slice(&bits.to_le_bytes());
                true
            }
            None => false,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }
}
