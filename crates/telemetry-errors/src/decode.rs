//! Packet decoding errors.

/// Errors raised while decoding a datagram against a field schema.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// The datagram is shorter than the schema's last byte offset.
    #[error("malformed packet: expected at least {expected} bytes, got {actual}")]
    MalformedPacket {
        /// Minimum datagram length required by the schema
        expected: usize,
        /// Length of the datagram that was received
        actual: usize,
    },
}
