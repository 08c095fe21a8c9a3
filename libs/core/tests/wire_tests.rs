use cmwlight_core::{
    error::Error,
    wire::{
        decode_map, encode_map, map_to_bytes, ValueType, WireField, WireMap, WireReader,
        WireValue, WireWriter,
    },
};

fn sample_map() -> WireMap {
    WireMap::new()
        .with("name", "testdev")
        .with("count", 5)
        .with("stamp", 1_234_567_890_123i64)
        .with("enabled", true)
        .with(
            "nested",
            WireMap::new()
                .with("inner", "value")
                .with("deeper", WireMap::new().with("x", 1)),
        )
}

#[test]
fn map_roundtrip_preserves_order_and_nesting() {
    let map = sample_map();
    let bytes = map_to_bytes(&map).unwrap();
    let decoded = decode_map(&bytes).unwrap();

    assert_eq!(decoded, map);
    let keys: Vec<_> = decoded.keys().collect();
    assert_eq!(keys, vec!["name", "count", "stamp", "enabled", "nested"]);
}

#[test]
fn empty_and_absent_nested_maps_stay_distinct() {
    let with_empty = WireMap::new().with("filters", WireMap::new());
    let without = WireMap::new();

    let decoded_empty = decode_map(&map_to_bytes(&with_empty).unwrap()).unwrap();
    let decoded_without = decode_map(&map_to_bytes(&without).unwrap()).unwrap();

    assert_eq!(decoded_empty.get("filters"), Some(&WireValue::Map(WireMap::new())));
    assert!(decoded_without.get("filters").is_none());
}

#[test]
fn frame_is_bracketed_by_markers() {
    let bytes = map_to_bytes(&WireMap::new().with("a", 1)).unwrap();
    let mut reader = WireReader::new(&bytes);

    assert_eq!(
        reader.next_field().unwrap(),
        Some(WireField::Start { key: String::new() })
    );
    assert_eq!(
        reader.next_field().unwrap(),
        Some(WireField::Value {
            key: "a".to_string(),
            value: WireValue::Int(1)
        })
    );
    assert_eq!(reader.next_field().unwrap(), Some(WireField::End));
    assert_eq!(reader.next_field().unwrap(), None);
    assert_eq!(*bytes.last().unwrap(), ValueType::EndMarker.code());
}

#[test]
fn duplicate_key_fails_encoding() {
    let mut map = WireMap::new();
    map.push("0", 1);
    map.push("0", 2);

    let mut buf = Vec::new();
    match encode_map(&map, &mut buf) {
        Err(Error::DuplicateKey(key)) => assert_eq!(key, "0"),
        other => panic!("Expected DuplicateKey, got {:?}", other),
    }
}

#[test]
fn duplicate_key_in_nested_map_fails_encoding() {
    let mut inner = WireMap::new();
    inner.push("k", "a");
    inner.push("k", "b");
    let map = WireMap::new().with("outer", inner);

    assert!(matches!(
        map_to_bytes(&map),
        Err(Error::DuplicateKey(key)) if key == "k"
    ));
}

#[test]
fn insert_replaces_existing_key() {
    let mut map = WireMap::new();
    assert_eq!(map.insert("a", 1), None);
    assert_eq!(map.insert("a", 2), Some(WireValue::Int(1)));
    assert_eq!(map.len(), 1);
    assert_eq!(map.get("a"), Some(&WireValue::Int(2)));
}

#[test]
fn unsupported_value_types_fail_encoding() {
    let cases = vec![
        ("f", WireValue::Float(1.5), ValueType::Float),
        ("d", WireValue::Double(2.5), ValueType::Double),
        ("s", WireValue::Short(7), ValueType::Short),
        ("b", WireValue::Byte(1), ValueType::Byte),
    ];

    for (key, value, expected_type) in cases {
        let map = WireMap::new().with(key, value);
        match map_to_bytes(&map) {
            Err(Error::UnsupportedValueType { key: k, value_type }) => {
                assert_eq!(k, key);
                assert_eq!(value_type, expected_type);
            }
            other => panic!("Expected UnsupportedValueType, got {:?}", other),
        }
    }
}

#[test]
fn low_level_writer_handles_every_scalar() {
    let mut buf = Vec::new();
    let mut writer = WireWriter::new(&mut buf);
    writer.start("").unwrap();
    writer.put("f", &WireValue::Float(1.5)).unwrap();
    writer.put("d", &WireValue::Double(-0.25)).unwrap();
    writer.put("s", &WireValue::Short(-3)).unwrap();
    writer.put("b", &WireValue::Byte(200)).unwrap();
    writer.end().unwrap();
    writer.finish().unwrap();

    let mut reader = WireReader::new(&buf);
    let mut values = Vec::new();
    while let Some(field) = reader.next_field().unwrap() {
        if let WireField::Value { value, .. } = field {
            values.push(value);
        }
    }
    assert_eq!(
        values,
        vec![
            WireValue::Float(1.5),
            WireValue::Double(-0.25),
            WireValue::Short(-3),
            WireValue::Byte(200)
        ]
    );

    // The map decoder only accepts the closed value set
    assert!(matches!(
        decode_map(&buf),
        Err(Error::UnsupportedValueType { .. })
    ));
}

#[test]
fn writer_rejects_unbalanced_markers() {
    let mut buf = Vec::new();
    let mut writer = WireWriter::new(&mut buf);
    assert!(matches!(writer.end(), Err(Error::UnbalancedMarkers(_))));

    let mut buf = Vec::new();
    let mut writer = WireWriter::new(&mut buf);
    writer.start("").unwrap();
    assert!(matches!(writer.finish(), Err(Error::UnbalancedMarkers(_))));
}

#[test]
fn decoder_rejects_truncated_and_trailing_input() {
    let bytes = map_to_bytes(&sample_map()).unwrap();

    let truncated = &bytes[..bytes.len() - 1];
    assert!(matches!(
        decode_map(truncated),
        Err(Error::UnbalancedMarkers(_))
    ));

    let cut_mid_field = &bytes[..10];
    assert!(matches!(decode_map(cut_mid_field), Err(Error::Truncated { .. })));

    let mut trailing = bytes.clone();
    trailing.push(ValueType::EndMarker.code());
    assert!(matches!(
        decode_map(&trailing),
        Err(Error::UnbalancedMarkers(_))
    ));

    assert!(matches!(decode_map(&[]), Err(Error::Truncated { .. })));
}

#[test]
fn decoder_rejects_duplicate_keys_from_peer() {
    let mut buf = Vec::new();
    let mut writer = WireWriter::new(&mut buf);
    writer.start("").unwrap();
    writer.put("k", &WireValue::Int(1)).unwrap();
    writer.put("k", &WireValue::Int(2)).unwrap();
    writer.end().unwrap();
    writer.finish().unwrap();

    assert!(matches!(decode_map(&buf), Err(Error::DuplicateKey(key)) if key == "k"));
}

#[test]
fn decoder_rejects_unknown_type_codes() {
    let mut bytes = map_to_bytes(&WireMap::new().with("a", 1)).unwrap();
    // First field after the root start marker (1 type byte + 4 length + 1 NUL)
    bytes[6] = 0x42;
    assert!(matches!(decode_map(&bytes), Err(Error::UnknownTypeCode(0x42))));
}

#[test]
fn decoder_limits_nesting_depth() {
    let mut map = WireMap::new().with("leaf", 1);
    for level in 0..20 {
        map = WireMap::new().with(format!("level{level}"), map);
    }
    let bytes = map_to_bytes(&map).unwrap();
    assert!(matches!(
        decode_map(&bytes),
        Err(Error::UnbalancedMarkers(msg)) if msg.contains("nesting")
    ));
}

#[test]
fn strings_carry_utf8() {
    let map = WireMap::new().with("greeting", "grüße ☃");
    let decoded = decode_map(&map_to_bytes(&map).unwrap()).unwrap();
    assert_eq!(decoded.get("greeting").and_then(WireValue::as_str), Some("grüße ☃"));
}
