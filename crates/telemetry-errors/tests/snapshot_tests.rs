//! Snapshot tests for error message formatting.
//!
//! Operators grep logs for these messages; keep them stable.

use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use insta::assert_snapshot;
use simracing_telemetry_errors::{
    DecodeError, EndpointError, SchemaError, SinkError, TelemetryError,
};

#[test]
fn test_malformed_packet() {
    let err = DecodeError::MalformedPacket {
        expected: 331,
        actual: 12,
    };
    assert_snapshot!(err.to_string(), @"malformed packet: expected at least 331 bytes, got 12");
}

#[test]
fn test_width_mismatch() {
    let err = SchemaError::WidthMismatch {
        field: "LapNumber".into(),
        expected: 2,
        actual: 4,
    };
    assert_snapshot!(err.to_string(), @"field 'LapNumber' spans 4 bytes but its type needs 2");
}

#[test]
fn test_unknown_data_type() {
    let err = SchemaError::UnknownDataType {
        field: "Boost".into(),
        data_type: "F64".into(),
    };
    assert_snapshot!(err.to_string(), @"unknown data type 'F64' for field 'Boost'");
}

#[test]
fn test_invalid_path() {
    let err = SinkError::InvalidPath(PathBuf::from("/var/log/simracing/test.txt"));
    assert_snapshot!(err.to_string(), @"invalid file path: /var/log/simracing/test.txt");
}

#[test]
fn test_invalid_retention() {
    let err = SinkError::InvalidRetention("weekly".into());
    assert_snapshot!(err.to_string(), @"invalid retention type 'weekly', expected 'none' or 'daily'");
}

#[test]
fn test_wrapped_sink_error() {
    let err: TelemetryError = SinkError::DuplicateRecord.into();
    assert_snapshot!(err.to_string(), @"Sink error: record already exists");
}

#[test]
fn test_bind_error() {
    let err = EndpointError::Bind {
        addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 5300)),
        source: std::io::Error::new(std::io::ErrorKind::AddrInUse, "address in use"),
    };
    assert_snapshot!(err.to_string(), @"could not bind UDP socket on 0.0.0.0:5300: address in use");
}
