//! Table-driven packet decoder.
//!
//! Decoding is a pure function of the datagram and the schema: no I/O, no
//! shared mutable state. Datagrams shorter than the schema are rejected up
//! front so no field read can go out of bounds; longer datagrams are accepted
//! and the trailing bytes ignored.

use std::sync::Arc;

use chrono::{DateTime, Local};
use simracing_telemetry_errors::DecodeError;

use crate::schema::FieldSchema;
use crate::snapshot::TelemetrySnapshot;

/// Decode `buffer`, stamping the snapshot with the current local time.
pub fn decode(buffer: &[u8], schema: &Arc<FieldSchema>) -> Result<TelemetrySnapshot, DecodeError> {
    decode_at(buffer, schema, Local::now())
}

/// Decode `buffer` with an explicit receive time.
pub fn decode_at(
    buffer: &[u8],
    schema: &Arc<FieldSchema>,
    received_at: DateTime<Local>,
) -> Result<TelemetrySnapshot, DecodeError> {
    let malformed = || DecodeError::MalformedPacket {
        expected: schema.packet_len(),
        actual: buffer.len(),
    };

    if buffer.len() < schema.packet_len() {
        return Err(malformed());
    }

    let values = schema
        .fields()
        .iter()
        .map(|field| {
            buffer
                .get(field.byte_range.clone())
                .and_then(|bytes| field.data_type.read(bytes))
                .ok_or_else(malformed)
        })
        .collect::<Result<Vec<f32>, DecodeError>>()?;

    Ok(TelemetrySnapshot::new(
        Arc::clone(schema),
        values,
        buffer.to_vec(),
        received_at,
    ))
}

/// Decoder bound to one schema, as held by an ingestion endpoint.
#[derive(Debug, Clone)]
pub struct PacketDecoder {
    schema: Arc<FieldSchema>,
}

impl PacketDecoder {
    pub fn new(schema: Arc<FieldSchema>) -> Self {
        Self { schema }
    }

    pub fn schema(&self) -> &Arc<FieldSchema> {
        &self.schema
    }

    pub fn decode(&self, buffer: &[u8]) -> Result<TelemetrySnapshot, DecodeError> {
        decode(buffer, &self.schema)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::PacketWriter;
    use crate::schema::DataType;
    use chrono::TimeZone;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    fn small_schema() -> Result<Arc<FieldSchema>, Box<dyn std::error::Error>> {
        Ok(Arc::new(FieldSchema::from_types([
            ("IsRaceOn", DataType::S32),
            ("TimestampMS", DataType::U32),
            ("Speed", DataType::F32),
            ("LapNumber", DataType::U16),
            ("Gear", DataType::U8),
            ("Steer", DataType::S8),
        ])?))
    }

    #[test]
    fn test_decode_all_types() -> TestResult {
        let schema = small_schema()?;
        let mut packet = PacketWriter::new(&schema);
        packet.set("IsRaceOn", 1.0);
        packet.set("TimestampMS", 4_000_000.0);
        packet.set("Speed", 42.5);
        packet.set("LapNumber", 65_535.0);
        packet.set("Gear", 3.0);
        packet.set("Steer", -127.0);

        let snapshot = decode(&packet.into_bytes(), &schema)?;

        assert_eq!(snapshot.len(), 6);
        assert_eq!(snapshot.get("IsRaceOn"), Some(1.0));
        assert_eq!(snapshot.get("TimestampMS"), Some(4_000_000.0));
        assert_eq!(snapshot.get("Speed"), Some(42.5));
        assert_eq!(snapshot.get("LapNumber"), Some(65_535.0));
        assert_eq!(snapshot.get("Gear"), Some(3.0));
        assert_eq!(snapshot.get("Steer"), Some(-127.0));
        assert!(snapshot.is_race_on());
        Ok(())
    }

    #[test]
    fn test_decode_short_buffer_is_malformed() -> TestResult {
        let schema = small_schema()?;
        let err = decode(&[0u8; 15], &schema).err();
        assert_eq!(
            err,
            Some(DecodeError::MalformedPacket {
                expected: 16,
                actual: 15
            })
        );
        Ok(())
    }

    #[test]
    fn test_decode_keeps_full_datagram() -> TestResult {
        let schema = small_schema()?;
        let mut buffer = vec![0u8; 20];
        buffer[16..].copy_from_slice(&[1, 2, 3, 4]);

        let snapshot = decode(&buffer, &schema)?;
        assert_eq!(snapshot.raw_bytes(), buffer.as_slice());
        Ok(())
    }

    #[test]
    fn test_decode_at_stamps_time() -> TestResult {
        let schema = small_schema()?;
        let at = Local
            .with_ymd_and_hms(2021, 1, 1, 12, 0, 0)
            .single()
            .ok_or("ambiguous time")?;
        let snapshot = decode_at(&[0u8; 16], &schema, at)?;
        assert_eq!(snapshot.received_at(), at);
        assert!(!snapshot.is_race_on());
        Ok(())
    }

    #[test]
    fn test_field_order_follows_schema() -> TestResult {
        let schema = small_schema()?;
        let snapshot = PacketDecoder::new(Arc::clone(&schema)).decode(&[0u8; 16])?;
        let names: Vec<&str> = snapshot.field_names().collect();
        assert_eq!(
            names,
            ["IsRaceOn", "TimestampMS", "Speed", "LapNumber", "Gear", "Steer"]
        );
        Ok(())
    }
}
