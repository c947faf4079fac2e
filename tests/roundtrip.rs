//! Property-based round-trip invariants: varints, strings, compression
//! frames, column codecs, and the type renderer.

use std::sync::Arc;

use bytes::BytesMut;
use proptest::prelude::*;

use clickhouse_native_core::column::{
    Column, ColumnArray, ColumnInt32, ColumnNullable, ColumnString,
};
use clickhouse_native_core::compression::{
    compress_frame, compress_frames, decompress_frame, CHECKSUM_SIZE,
    HEADER_SIZE,
};
use clickhouse_native_core::types::TypeNode;
use clickhouse_native_core::wire;
use clickhouse_native_core::CompressionMethod;

proptest! {
    #[test]
    fn varint_round_trip(value: u64) {
        let mut buf = BytesMut::new();
        wire::put_varint(&mut buf, value);

        // Encoded length is ceil(bits/7), minimum 1.
        let bits = 64 - value.leading_zeros() as usize;
        let expected_len = usize::max(1, bits.div_ceil(7));
        prop_assert_eq!(buf.len(), expected_len);
        prop_assert_eq!(buf.len(), wire::varint_len(value));

        let mut slice = &buf[..];
        prop_assert_eq!(wire::get_varint(&mut slice).unwrap(), value);
        prop_assert!(slice.is_empty());
    }

    #[test]
    fn string_round_trip(value in ".{0,64}") {
        let mut buf = BytesMut::new();
        wire::put_string(&mut buf, &value);
        let mut slice = &buf[..];
        prop_assert_eq!(wire::get_string(&mut slice).unwrap(), value);
    }

    #[test]
    fn frame_round_trip(
        payload in proptest::collection::vec(any::<u8>(), 0..4096),
        lz4 in any::<bool>(),
    ) {
        let method = if lz4 {
            CompressionMethod::Lz4
        } else {
            CompressionMethod::Zstd
        };
        let framed = compress_frame(method, &payload).unwrap();
        prop_assert!(framed.len() >= CHECKSUM_SIZE + HEADER_SIZE);
        let restored = decompress_frame(&framed).unwrap();
        prop_assert_eq!(&restored[..], &payload[..]);
    }

    #[test]
    fn frame_corruption_detected(
        payload in proptest::collection::vec(any::<u8>(), 1..512),
        flip in 0usize..100,
    ) {
        let framed =
            compress_frame(CompressionMethod::Lz4, &payload).unwrap();
        let mut corrupted = framed.to_vec();
        let index = flip % corrupted.len();
        corrupted[index] ^= 0x01;
        // Any single bit flip must be rejected, whatever byte it hits.
        prop_assert!(decompress_frame(&corrupted).is_err());
    }

    #[test]
    fn split_framing_preserves_payload(
        payload in proptest::collection::vec(any::<u8>(), 0..100_000),
        block_size in 1024usize..16384,
    ) {
        let framed =
            compress_frames(CompressionMethod::Lz4, &payload, block_size)
                .unwrap();
        let mut restored = Vec::new();
        let mut rest = &framed[..];
        while !rest.is_empty() {
            let declared = u32::from_le_bytes(
                rest[CHECKSUM_SIZE + 1..CHECKSUM_SIZE + 5]
                    .try_into()
                    .unwrap(),
            ) as usize;
            let len = CHECKSUM_SIZE + declared;
            restored.extend_from_slice(
                &decompress_frame(&rest[..len]).unwrap(),
            );
            rest = &rest[len..];
        }
        prop_assert_eq!(restored, payload);
    }

    #[test]
    fn int32_column_round_trip(values in proptest::collection::vec(any::<i32>(), 0..256)) {
        let node = TypeNode::parse("Int32").unwrap();
        let column = ColumnInt32::from_values(node.clone(), values.clone());

        let mut buf = BytesMut::new();
        column.save_body(&mut buf).unwrap();

        let mut restored = ColumnInt32::new(node);
        let mut slice = &buf[..];
        restored.load_body(&mut slice, values.len()).unwrap();
        prop_assert!(slice.is_empty());
        prop_assert_eq!(restored.values(), &values[..]);
    }

    #[test]
    fn string_column_round_trip(
        values in proptest::collection::vec(".{0,32}", 0..64),
    ) {
        let node = TypeNode::parse("String").unwrap();
        let column = ColumnString::from_values(node.clone(), values.clone());

        let mut buf = BytesMut::new();
        column.save_body(&mut buf).unwrap();

        let mut restored = ColumnString::new(node);
        let mut slice = &buf[..];
        restored.load_body(&mut slice, values.len()).unwrap();
        let collected: Vec<&str> = restored.iter().collect();
        prop_assert_eq!(collected, values.iter().map(String::as_str).collect::<Vec<_>>());
    }

    #[test]
    fn array_of_nullable_round_trip(
        rows in proptest::collection::vec(
            proptest::collection::vec(proptest::option::of(any::<i32>()), 0..8),
            0..16,
        ),
    ) {
        let node = TypeNode::parse("Array(Nullable(Int32))").unwrap();
        let mut column = ColumnArray::new(node.clone()).unwrap();
        for row in &rows {
            {
                let nullable = column
                    .nested_mut()
                    .as_any_mut()
                    .downcast_mut::<ColumnNullable>()
                    .unwrap();
                for value in row {
                    match value {
                        Some(v) => {
                            nullable.append_non_null();
                            nullable
                                .nested_mut()
                                .as_any_mut()
                                .downcast_mut::<ColumnInt32>()
                                .unwrap()
                                .append(*v);
                        }
                        None => nullable.append_null(),
                    }
                }
            }
            column.push_len(row.len()).unwrap();
        }

        let mut buf = BytesMut::new();
        column.save_body(&mut buf).unwrap();

        let mut restored = ColumnArray::new(node).unwrap();
        let mut slice = &buf[..];
        restored.load_body(&mut slice, rows.len()).unwrap();
        prop_assert!(slice.is_empty());
        prop_assert_eq!(restored.len(), rows.len());

        let nullable = restored
            .nested()
            .as_any()
            .downcast_ref::<ColumnNullable>()
            .unwrap();
        let ints = nullable
            .nested()
            .as_any()
            .downcast_ref::<ColumnInt32>()
            .unwrap();
        for (i, row) in rows.iter().enumerate() {
            let (start, end) = restored.row_range(i).unwrap();
            prop_assert_eq!(end - start, row.len());
            for (j, value) in row.iter().enumerate() {
                let at = start + j;
                match value {
                    Some(v) => {
                        prop_assert!(!nullable.is_null(at));
                        prop_assert_eq!(ints.get(at), Some(*v));
                    }
                    None => prop_assert!(nullable.is_null(at)),
                }
            }
        }
    }

    #[test]
    fn type_render_fixed_point(spelling in type_strategy()) {
        let node = TypeNode::parse(&spelling).unwrap();
        let reparsed = TypeNode::parse(node.full_name()).unwrap();
        prop_assert_eq!(reparsed.full_name(), node.full_name());
        prop_assert!(Arc::ptr_eq(&node, &reparsed));
    }
}

/// Random well-formed type spellings, nested up to three levels.
fn type_strategy() -> impl Strategy<Value = String> {
    let leaf = prop_oneof![
        Just("Int8".to_string()),
        Just("UInt64".to_string()),
        Just("Float64".to_string()),
        Just("String".to_string()),
        Just("Date".to_string()),
        Just("UUID".to_string()),
        Just("IPv4".to_string()),
        Just("Decimal(19, 6)".to_string()),
        Just("FixedString(16)".to_string()),
        Just("Enum8('a' = 1, 'b' = 2)".to_string()),
    ];
    leaf.prop_recursive(3, 16, 3, |inner| {
        prop_oneof![
            inner.clone().prop_map(|t| format!("Array({t})")),
            inner.clone().prop_map(|t| format!("Nullable({t})")),
            (inner.clone(), inner.clone())
                .prop_map(|(k, v)| format!("Map({k}, {v})")),
            proptest::collection::vec(inner, 1..4)
                .prop_map(|items| format!("Tuple({})", items.join(", "))),
        ]
    })
}
