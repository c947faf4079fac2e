//! Protocol constants: packet opcodes, revision gates, compression tags.
//!
//! The protocol revision is a monotonically increasing integer negotiated
//! once per session as `min(client, server)`; optional wire fields are gated
//! on the `MIN_REVISION_*` thresholds below.

use crate::Error;

/// The revision this client speaks. The negotiated revision is the minimum
/// of this and the server's.
pub const CLIENT_TCP_PROTOCOL_REVISION: u64 = 54453;

/// Oldest server revision the handshake accepts. Below this the settings
/// section of the Query message has a different (binary) layout that the
/// core does not encode.
pub const MIN_SUPPORTED_SERVER_REVISION: u64 = 54429;

/// Data packets carry an external-table name string.
pub const MIN_REVISION_WITH_TEMPORARY_TABLES: u64 = 50264;
/// Blocks are preceded by a BlockInfo field set.
pub const MIN_REVISION_WITH_BLOCK_INFO: u64 = 51903;
/// The Query message carries a client-info section.
pub const MIN_REVISION_WITH_CLIENT_INFO: u64 = 54032;
/// The server Hello reports its time zone.
pub const MIN_REVISION_WITH_SERVER_TIMEZONE: u64 = 54058;
/// Client info carries a quota key.
pub const MIN_REVISION_WITH_QUOTA_KEY: u64 = 54060;
/// The server Hello reports its display name.
pub const MIN_REVISION_WITH_SERVER_DISPLAY_NAME: u64 = 54372;
/// Version patch numbers travel in Hello and client info.
pub const MIN_REVISION_WITH_VERSION_PATCH: u64 = 54401;
/// Progress packets report written rows and bytes.
pub const MIN_REVISION_WITH_CLIENT_WRITE_INFO: u64 = 54420;
/// Query settings are serialised as strings with an importance flag.
pub const MIN_REVISION_WITH_SETTINGS_AS_STRINGS: u64 = 54429;
/// The Query message carries an interserver secret.
pub const MIN_REVISION_WITH_INTERSERVER_SECRET: u64 = 54441;
/// Client info carries an optional OpenTelemetry span.
pub const MIN_REVISION_WITH_OPENTELEMETRY: u64 = 54442;
/// Client info carries the distributed-query depth.
pub const MIN_REVISION_WITH_DISTRIBUTED_DEPTH: u64 = 54448;
/// Client info carries the initial query start time.
pub const MIN_REVISION_WITH_INITIAL_QUERY_START_TIME: u64 = 54449;
/// Client info carries the parallel-replica coordination fields.
pub const MIN_REVISION_WITH_PARALLEL_REPLICAS: u64 = 54453;
/// Each column carries a custom-serialisation marker byte.
pub const MIN_REVISION_WITH_CUSTOM_SERIALIZATION: u64 = 54454;
/// The client sends a quota-key addendum after the handshake.
pub const MIN_REVISION_WITH_ADDENDUM: u64 = 54458;

/// Opcodes of packets sent by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u64)]
pub enum ClientCode {
    /// Handshake: client name, version, default database, credentials.
    Hello = 0,
    /// Query: id, client info, settings, stage, compression flag, text.
    Query = 1,
    /// Data block (bulk insert payload or the query-terminating empty block).
    Data = 2,
    /// Cancel the in-flight query.
    Cancel = 3,
    /// Liveness check; the server answers with Pong.
    Ping = 4,
}

/// Opcodes of packets received from the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u64)]
pub enum ServerCode {
    /// Handshake response: server name, version, revision, timezone.
    Hello = 0,
    /// A data block, compressed when compression was negotiated.
    Data = 1,
    /// A server-side exception, possibly with nested causes.
    Exception = 2,
    /// Query progress: rows and bytes read so far.
    Progress = 3,
    /// Answer to a client Ping.
    Pong = 4,
    /// All packets for the current operation have been sent.
    EndOfStream = 5,
    /// Query profiling counters.
    ProfileInfo = 6,
    /// The totals block of a WITH TOTALS query.
    Totals = 7,
    /// The extremes block (column minimums and maximums).
    Extremes = 8,
    /// Response to a TablesStatus request. Recognised, not implemented.
    TablesStatusResponse = 9,
    /// Server log block, always uncompressed. Read and discarded.
    Log = 10,
    /// Column descriptions for default-value calculation.
    TableColumns = 11,
    /// Unique part UUIDs. Recognised, not implemented.
    PartUuids = 12,
    /// Distributed read-task request. Recognised, not implemented.
    ReadTaskRequest = 13,
    /// Server profile-event counters, always uncompressed.
    ProfileEvents = 14,
    /// MergeTree all-ranges announcement. Recognised, not implemented.
    MergeTreeAllRangesAnnouncement = 15,
    /// MergeTree read-task request. Recognised, not implemented.
    MergeTreeReadTaskRequest = 16,
    /// The server timezone changed mid-session.
    TimezoneUpdate = 17,
}

impl TryFrom<u64> for ServerCode {
    type Error = Error;

    fn try_from(value: u64) -> Result<Self, Error> {
        Ok(match value {
            0 => ServerCode::Hello,
            1 => ServerCode::Data,
            2 => ServerCode::Exception,
            3 => ServerCode::Progress,
            4 => ServerCode::Pong,
            5 => ServerCode::EndOfStream,
            6 => ServerCode::ProfileInfo,
            7 => ServerCode::Totals,
            8 => ServerCode::Extremes,
            9 => ServerCode::TablesStatusResponse,
            10 => ServerCode::Log,
            11 => ServerCode::TableColumns,
            12 => ServerCode::PartUuids,
            13 => ServerCode::ReadTaskRequest,
            14 => ServerCode::ProfileEvents,
            15 => ServerCode::MergeTreeAllRangesAnnouncement,
            16 => ServerCode::MergeTreeReadTaskRequest,
            17 => ServerCode::TimezoneUpdate,
            other => {
                return Err(Error::Protocol(format!(
                    "unknown server opcode: {other}"
                )))
            }
        })
    }
}

/// Query processing stage requested by the client. Only `Complete` is sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u64)]
pub enum Stage {
    /// Fully process the query and return the final result.
    Complete = 2,
}

/// Kind of a query within a (possibly distributed) execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum QueryKind {
    /// No query attached (bare client info).
    NoQuery = 0,
    /// A query initiated by this client.
    InitialQuery = 1,
    /// A fan-out query from another server. Not implemented.
    SecondaryQuery = 2,
}

/// Block compression negotiated for the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompressionMethod {
    /// No compression; frames still carry header and checksum.
    None,
    /// LZ4 block compression (the protocol default).
    #[default]
    Lz4,
    /// ZSTD block compression.
    Zstd,
}

impl CompressionMethod {
    /// The algorithm tag byte used in the frame header.
    pub fn tag(self) -> u8 {
        match self {
            CompressionMethod::None => 0x02,
            CompressionMethod::Lz4 => 0x82,
            CompressionMethod::Zstd => 0x90,
        }
    }

    /// Inverse of [`tag`](Self::tag).
    pub fn from_tag(tag: u8) -> crate::Result<Self> {
        Ok(match tag {
            0x02 => CompressionMethod::None,
            0x82 => CompressionMethod::Lz4,
            0x90 => CompressionMethod::Zstd,
            other => {
                return Err(Error::Compression(format!(
                    "unknown compression method byte: 0x{other:02x}"
                )))
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_code_decode() {
        assert_eq!(ServerCode::try_from(0).unwrap(), ServerCode::Hello);
        assert_eq!(ServerCode::try_from(10).unwrap(), ServerCode::Log);
        assert_eq!(
            ServerCode::try_from(17).unwrap(),
            ServerCode::TimezoneUpdate
        );
        assert!(ServerCode::try_from(99).is_err());
    }

    #[test]
    fn compression_tags_round_trip() {
        for method in [
            CompressionMethod::None,
            CompressionMethod::Lz4,
            CompressionMethod::Zstd,
        ] {
            assert_eq!(
                CompressionMethod::from_tag(method.tag()).unwrap(),
                method
            );
        }
        assert!(CompressionMethod::from_tag(0xFF).is_err());
    }

    #[test]
    fn revision_gates_are_ordered() {
        assert!(MIN_REVISION_WITH_BLOCK_INFO < MIN_REVISION_WITH_CLIENT_INFO);
        assert!(
            MIN_REVISION_WITH_PARALLEL_REPLICAS
                <= CLIENT_TCP_PROTOCOL_REVISION
        );
    }
}
