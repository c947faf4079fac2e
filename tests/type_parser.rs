//! Type grammar fixtures: argument counts, escape handling, canonical
//! rendering, and malformed inputs.

use clickhouse_native_core::types::{TypeArg, TypeNode};
use clickhouse_native_core::{DbType, Error};

#[test]
fn fixture_table() {
    // (input, type_name, generic args, type args)
    let fixtures = [
        ("Nullable(Nothing)", "Nullable", 1, 1),
        ("LowCardinality(Decimal(28, 10))", "LowCardinality", 1, 1),
        (
            "Tuple(Decimal(19,6), String, Nullable(String))",
            "Tuple",
            3,
            3,
        ),
        ("Array(Array(Nothing))", "Array", 1, 1),
        ("Decimal32(5)", "Decimal32", 0, 1),
        ("DateTime64(3, 'Africa/Addis_Ababa')", "DateTime64", 0, 2),
        ("FixedString(42)", "FixedString", 0, 1),
    ];

    for (input, name, generics, args) in fixtures {
        let node = TypeNode::parse(input).unwrap();
        assert_eq!(node.name(), name, "{input}");
        assert_eq!(node.generics().len(), generics, "{input}");
        assert_eq!(node.args().len(), args, "{input}");
    }
}

#[test]
fn rendering_is_a_fixed_point() {
    let canonical = [
        "Nullable(Nothing)",
        "LowCardinality(Decimal(28, 10))",
        "Tuple(Decimal(19, 6), String, Nullable(String))",
        "Array(Array(Nothing))",
        "Decimal32(5)",
        "DateTime64(3, 'Africa/Addis_Ababa')",
        "FixedString(42)",
        "Map(LowCardinality(String), Array(Nullable(UInt64)))",
        "Tuple(a UInt32, b String)",
    ];
    for input in canonical {
        let once = TypeNode::parse(input).unwrap();
        assert_eq!(once.full_name(), input, "not canonical: {input}");
        let twice = TypeNode::parse(once.full_name()).unwrap();
        assert_eq!(twice.full_name(), once.full_name());
    }
}

#[test]
fn whitespace_normalises_to_canonical() {
    let node =
        TypeNode::parse("Tuple(Decimal(19,6),String,  Nullable( String ))")
            .unwrap();
    assert_eq!(
        node.full_name(),
        "Tuple(Decimal(19, 6), String, Nullable(String))"
    );
}

#[test]
fn enum_escape_vector() {
    let input = r"Enum8('\'a\'' = -5, ' \tescaped \'value\' ({[ ' = -9, '\r\n\t\\d\\' = 18)";
    let node = TypeNode::parse(input).unwrap();

    let items: Vec<(String, i64)> = node
        .args()
        .iter()
        .map(|arg| match arg {
            TypeArg::EnumItem { name, value } => (name.clone(), *value),
            other => panic!("unexpected arg {other:?}"),
        })
        .collect();

    assert_eq!(items[0], ("'a'".to_string(), -5));
    assert_eq!(items[1], (" \tescaped 'value' ({[ ".to_string(), -9));
    assert_eq!(items[2], ("\r\n\t\\d\\".to_string(), 18));

    // Byte-for-byte round trip through the canonical rendering.
    assert_eq!(node.full_name(), input);
}

#[test]
fn backticked_tuple_name_vector() {
    let input = r"Tuple(`escaped \`C\` with \\\` :)` String)";
    let node = TypeNode::parse(input).unwrap();
    match &node.args()[0] {
        TypeArg::Named { name, node } => {
            assert_eq!(name, "escaped `C` with \\` :)");
            assert_eq!(node.name(), "String");
        }
        other => panic!("unexpected arg {other:?}"),
    }
    assert_eq!(node.full_name(), input);
}

#[test]
fn nested_named_tuples() {
    let input = "Tuple(outer Tuple(inner Nullable(Int32), String), UInt8)";
    let node = TypeNode::parse(input).unwrap();
    assert_eq!(node.generics().len(), 2);
    let outer = &node.generics()[0];
    assert_eq!(outer.name(), "Tuple");
    assert_eq!(outer.generics().len(), 2);
    assert_eq!(node.full_name(), input);
}

#[test]
fn malformed_inputs() {
    let bad = [
        "",
        "Array(",
        "Array(Int32",
        "Array(Int32))",
        "Nullable()",
        "Enum8('a' = )",
        "Enum8('a' 1)",
        "FixedString(184467440737095516151)",
        "DateTime64(3, 'Europe/Prague",
        "Tuple(`unterminated String)",
        "123",
        "Int32 extra",
    ];
    for input in bad {
        assert!(
            matches!(
                TypeNode::parse(input),
                Err(Error::MalformedTypeName(_))
            ),
            "expected MalformedTypeName for {input:?}"
        );
    }
}

#[test]
fn interning_is_process_wide() {
    let a = TypeNode::parse("Map(String, Array(Int64))").unwrap();
    let b = TypeNode::parse("Map(String,Array(Int64))").unwrap();
    assert!(std::sync::Arc::ptr_eq(&a, &b));
}

#[test]
fn db_type_tags_cover_catalogue() {
    for (input, tag) in [
        ("Int256", DbType::Int256),
        ("Bool", DbType::Bool),
        ("Decimal64(4)", DbType::Decimal),
        ("LowCardinality(String)", DbType::LowCardinality),
        ("Nullable(Nothing)", DbType::Nullable),
        ("Map(String, String)", DbType::Map),
    ] {
        assert_eq!(
            TypeNode::parse(input).unwrap().db_type().unwrap(),
            tag,
            "{input}"
        );
    }
}

#[test]
fn simple_aggregate_function_unwraps() {
    let node = TypeNode::parse("SimpleAggregateFunction(sum, UInt64)").unwrap();
    assert_eq!(node.name(), "UInt64");
}
