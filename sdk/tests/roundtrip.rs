#![cfg(test)]

use gschema::{dump_to_json, ByteOrder, SchemaCache, Value};
use gschema_compiler::{compile_schema, encode_schema_set, write_schema_set};
use tempfile::TempDir;

const SOURCE: &str = r#"
<schemalist gettext-domain="myapp">
  <schema id="org.example.app" path="/org/example/app/">
    <key name="volume" type="i">
      <default>50</default>
      <summary>Playback volume</summary>
      <range><min>0</min><max>100</max></range>
    </key>
    <key name="greeting" type="s">
      <default l10n="messages" context="greet">Hello</default>
    </key>
    <key name="modes" type="as">
      <default>['fast']</default>
      <range><choice value="fast"/><choice value="slow"/></range>
    </key>
    <key name="ratio" type="d"><default>0.25</default></key>
    <key name="size" type="(ii)"><default>(640, 480)</default></key>
    <key name="extra" type="a{sv}"><default>{'a': &lt;1&gt;, 'b': &lt;'x'&gt;}</default></key>
    <key name="maybe" type="mu"><default>nothing</default></key>
    <key name="data" type="ay"><default>b'abc'</default></key>
    <child name="window" schema="org.example.app.window"/>
  </schema>
  <schema id="org.example.app.window">
    <key name="maximized" type="b"><default>false</default></key>
  </schema>
</schemalist>
"#;

#[test]
fn test_defaults_roundtrip_in_both_orders() {
    let set = compile_schema(SOURCE).unwrap();

    for order in [ByteOrder::Little, ByteOrder::Big] {
        let cache = SchemaCache::from_bytes(encode_schema_set(&set, order)).unwrap();
        assert_eq!(cache.byte_order(), order);
        assert_eq!(cache.schema_ids().unwrap(), vec!["org.example.app", "org.example.app.window"]);

        for schema in set.iter() {
            let view = cache.schema(&schema.id).unwrap().unwrap();
            let mut expected: Vec<&str> = schema.keys().map(|key| key.name.as_str()).collect();
            expected.sort_unstable();
            assert_eq!(view.keys().unwrap(), expected);

            for key in schema.keys() {
                assert_eq!(view.default_value(&key.name).unwrap().as_ref(), key.default.as_ref());
                assert_eq!(view.options(&key.name).unwrap(), key.stored_options());
            }
        }
    }
}

#[test]
fn test_schema_metadata() {
    let set = compile_schema(SOURCE).unwrap();
    let cache = SchemaCache::from_bytes(encode_schema_set(&set, ByteOrder::Little)).unwrap();
    let app = cache.schema("org.example.app").unwrap().unwrap();

    assert_eq!(app.id(), "org.example.app");
    assert_eq!(app.path().unwrap().as_deref(), Some("/org/example/app/"));
    assert_eq!(app.gettext_domain().unwrap().as_deref(), Some("myapp"));
    assert_eq!(app.children().unwrap(), vec!["window"]);
    assert_eq!(app.child("window").unwrap().as_deref(), Some("org.example.app.window"));
    assert_eq!(app.child("door").unwrap(), None);

    assert_eq!(app.l10n("greeting").unwrap(), Some(('m', "greet\u{4}Hello".to_string())));
    assert_eq!(app.l10n("volume").unwrap(), None);
    assert_eq!(app.range("volume").unwrap(), Some((Value::Int32(0), Value::Int32(100))));
    assert_eq!(app.choices("modes").unwrap(), vec!["fast", "slow"]);
    assert_eq!(app.choices("volume").unwrap(), Vec::<String>::new());

    assert_eq!(app.default_value("window/").unwrap(), None);
    assert_eq!(app.default_value("missing").unwrap(), None);
    assert!(cache.schema("org.missing").unwrap().is_none());
}

#[test]
fn test_open_written_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("gschemas.compiled");
    let set = compile_schema(SOURCE).unwrap();
    write_schema_set(&set, &path, ByteOrder::Big).unwrap();

    let cache = SchemaCache::open(&path).unwrap();
    assert_eq!(cache.byte_order(), ByteOrder::Big);
    let window = cache.schema("org.example.app.window").unwrap().unwrap();
    assert_eq!(window.default_value("maximized").unwrap(), Some(Value::Boolean(false)));
    assert_eq!(window.path().unwrap(), None);
}

#[test]
fn test_rejects_garbage() {
    assert!(SchemaCache::from_bytes(b"definitely not a cache".to_vec()).is_err());
    assert!(dump_to_json(&[]).is_err());
}

#[test]
fn test_dump_to_json() {
    let set = compile_schema(SOURCE).unwrap();
    let json = dump_to_json(&encode_schema_set(&set, ByteOrder::Little)).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();

    let app = &parsed["org.example.app"];
    assert_eq!(app["path"], "/org/example/app/");
    assert_eq!(app["gettext-domain"], "myapp");
    assert_eq!(app["keys"]["volume"]["type"], "i");
    assert_eq!(app["keys"]["volume"]["default"], "50");
    assert_eq!(app["keys"]["volume"]["options"]["range"], "(0, 100)");
    assert_eq!(app["keys"]["modes"]["default"], "['fast']");
    assert_eq!(app["children"]["window"], "org.example.app.window");
    assert!(parsed["org.example.app.window"]["keys"]["maximized"].is_object());
}
