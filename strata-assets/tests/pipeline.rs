use std::io::Read;
use std::sync::Arc;

use eyre::Result;
use strata_assets::{
    Asset, Assets, BasicFormat, ChangeEvent, ChangeKind, ChangeReceiver, FileStore, JsonDocument,
    JsonDocumentFormat, MemoryStore, QueryError, Source,
};

#[derive(Debug)]
struct Text {
    value: String,
    reloads: usize,
}

impl Asset for Text {}

#[derive(Default)]
struct TextFormat;

impl BasicFormat for TextFormat {
    type Data = String;
    type Asset = Text;

    fn decode(&self, bytes: Vec<u8>, _path: &str) -> Result<String> {
        Ok(String::from_utf8(bytes)?)
    }

    fn construct(&self, _path: &str, data: &String) -> Text {
        Text {
            value: data.clone(),
            reloads: 0,
        }
    }

    fn reload(&self, asset: &mut Text, data: &String) {
        asset.value = data.clone();
        asset.reloads += 1;
    }
}

fn mem_source(name: &str, files: &[(&str, &str)]) -> (Arc<Source>, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    for (path, contents) in files {
        store.insert(*path, contents.as_bytes().to_vec());
    }
    let source = Arc::new(Source::new(name, store.clone() as Arc<dyn FileStore>));
    (source, store)
}

fn text_world() -> Assets {
    let mut assets = Assets::with_worker_threads(1);
    assets.register_basic("txt", TextFormat);
    assets
}

fn events_of(receiver: &ChangeReceiver) -> Vec<ChangeEvent> {
    receiver.try_iter().collect()
}

#[test]
fn test_basic_priority_resolution() {
    let mut assets = text_world();
    let (a, _) = mem_source("a", &[("f.txt", "from a")]);
    let (b, _) = mem_source("b", &[("f.txt", "from b")]);
    assets.add_source(&a);
    assets.add_source(&b);

    assets.load("f.txt");
    assert_eq!(assets.get::<Text>("f.txt").unwrap().value, "from b");
    assert_eq!(assets.source_names_of("f.txt").unwrap(), vec!["b"]);

    assets.remove_source(&b);
    assets.load("f.txt");
    assert_eq!(assets.get::<Text>("f.txt").unwrap().value, "from a");
    assert_eq!(assets.source_names_of("f.txt").unwrap(), vec!["a"]);
}

#[test]
fn test_compound_merge_order() {
    let mut assets = Assets::with_worker_threads(1);
    assets.register_compound("json", JsonDocumentFormat);

    let (a, _) = mem_source("a", &[("lang/en.json", r#"{"k": "A", "a": 1}"#)]);
    let (b, _) = mem_source("b", &[("lang/en.json", r#"{"k": "B", "b": 2}"#)]);
    assets.add_source(&a);
    assets.add_source(&b);

    assets.load("lang/en.json");

    let doc = assets.get::<JsonDocument>("lang/en.json").unwrap();
    assert_eq!(doc.len(), 3);
    assert_eq!(doc.get("k").unwrap().as_str(), Some("B"));
    assert_eq!(doc.get("a").unwrap().as_i64(), Some(1));
    assert_eq!(doc.get("b").unwrap().as_i64(), Some(2));
}

#[test]
fn test_compound_reload_drops_removed_layer() {
    let mut assets = Assets::with_worker_threads(1);
    assets.register_compound("json", JsonDocumentFormat);

    let (a, _) = mem_source("a", &[("lang/en.json", r#"{"k": "A", "a": 1}"#)]);
    let (b, _) = mem_source("b", &[("lang/en.json", r#"{"k": "B", "b": 2}"#)]);
    assets.add_source(&a);
    assets.add_source(&b);
    assets.load("lang/en.json");

    assets.remove_source(&b);
    assets.load("lang/en.json");

    // the overlay's keys are gone and its overrides revert
    let doc = assets.get::<JsonDocument>("lang/en.json").unwrap();
    assert_eq!(doc.len(), 2);
    assert_eq!(doc.get("k").unwrap().as_str(), Some("A"));
    assert_eq!(doc.get("a").unwrap().as_i64(), Some(1));
    assert!(doc.get("b").is_none());
    assert_eq!(assets.source_names_of("lang/en.json").unwrap(), vec!["a"]);
}

#[test]
fn test_load_is_idempotent() {
    let mut assets = text_world();
    let (a, _) = mem_source("a", &[("f.txt", "hello")]);
    assets.add_source(&a);

    let receiver = assets.subscribe_changes();

    assets.load("f.txt");
    assets.load("f.txt");

    let events = events_of(&receiver);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, ChangeKind::Loaded);
    assert_eq!(assets.get::<Text>("f.txt").unwrap().reloads, 0);
}

#[test]
fn test_reload_preserves_identity() {
    let mut assets = text_world();
    let (a, store) = mem_source("a", &[("f.txt", "v1")]);
    assets.add_source(&a);

    assets.load("f.txt");
    let before: *const Text = assets.get::<Text>("f.txt").unwrap();

    store.insert("f.txt", b"v2".to_vec());
    assets.reload_all();

    let text = assets.get::<Text>("f.txt").unwrap();
    let after: *const Text = text;
    assert_eq!(before, after);
    assert_eq!(text.value, "v2");
    assert_eq!(text.reloads, 1);
}

#[test]
fn test_fallback_substitution() {
    let mut assets = text_world();
    let (a, _) = mem_source("a", &[("defaults/default.txt", "default text")]);
    assets.add_source(&a);
    assets.load_all();

    let text = assets.get::<Text>("missing/file.txt").unwrap();
    assert_eq!(text.value, "default text");
    assert_eq!(assets.is_fallback("missing/file.txt"), Some(true));

    // fallback entries are invisible to enumeration
    assert!(!assets.exists::<Text>("missing/file.txt"));
    assert_eq!(assets.find::<Text>("").len(), 1);
    assert!(assets.list::<Text>("missing").is_empty());
}

#[test]
fn test_unload_clears_fallback_slot() {
    let mut assets = text_world();
    let (a, _) = mem_source("a", &[("defaults/default.txt", "default text")]);
    assets.add_source(&a);
    assets.load_all();

    assert!(assets.get::<Text>("missing/one.txt").is_ok());

    assets.unload("defaults/default.txt");

    let error = assets.get::<Text>("missing/two.txt").unwrap_err();
    assert!(matches!(error, QueryError::NoSuchAsset { .. }));
}

#[test]
fn test_reload_all_batches_notifications() {
    let mut assets = text_world();
    let (a, _) = mem_source("a", &[("a.txt", "1"), ("b.txt", "2"), ("c.txt", "3")]);
    assets.add_source(&a);
    assets.load_all();

    let receiver = assets.subscribe_changes();
    assets.reload_all();

    let events = events_of(&receiver);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, ChangeKind::Reloaded);
    assert_eq!(events[0].paths.len(), 3);
}

#[test]
fn test_unload_unsourced() {
    let mut assets = text_world();
    let (a, store_a) = mem_source("a", &[("keep.txt", "1"), ("stale.txt", "2")]);
    let (b, _) = mem_source("b", &[("gone.txt", "3")]);
    assets.add_source(&a);
    assets.add_source(&b);
    assets.load_all();
    assert_eq!(assets.loaded_paths().len(), 3);

    assets.remove_source(&b);
    store_a.remove("stale.txt");

    let receiver = assets.subscribe_changes();
    assets.unload_unsourced();

    let mut paths = assets.loaded_paths();
    paths.sort();
    assert_eq!(paths, vec!["keep.txt".into()]);

    let events = events_of(&receiver);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, ChangeKind::Unloaded);
    assert_eq!(events[0].paths.len(), 2);
}

#[test]
fn test_type_mismatch() {
    let mut assets = text_world();
    assets.register_compound("json", JsonDocumentFormat);
    let (a, _) = mem_source("a", &[("f.txt", "hello")]);
    assets.add_source(&a);
    assets.load("f.txt");

    let error = assets.get::<JsonDocument>("f.txt").unwrap_err();
    assert!(matches!(error, QueryError::TypeMismatch { .. }));
}

#[test]
fn test_streaming() {
    let mut assets = text_world();
    assets.register_compound("json", JsonDocumentFormat);

    let (a, _) = mem_source(
        "a",
        &[
            ("f.txt", "stream me"),
            ("lang/en.json", r#"{"k": 1}"#),
            ("defaults/default.txt", "default"),
        ],
    );
    assets.add_source(&a);
    assets.load_all();

    let mut stream = assets.open_streaming_asset("f.txt").unwrap();
    let mut contents = String::new();
    stream.read_to_string(&mut contents).unwrap();
    assert_eq!(contents, "stream me");

    let error = assets.open_streaming_asset("lang/en.json").err().unwrap();
    assert!(matches!(error, QueryError::StreamingUnsupported { .. }));

    let error = assets.open_streaming_asset("nope.txt").err().unwrap();
    assert!(matches!(error, QueryError::NoSuchAsset { .. }));

    // fallback entries stream the fallback path's own bytes
    assets.get::<Text>("missing/file.txt").unwrap();
    let mut stream = assets.open_streaming_asset("missing/file.txt").unwrap();
    let mut contents = String::new();
    stream.read_to_string(&mut contents).unwrap();
    assert_eq!(contents, "default");
}

#[test]
fn test_decode_failure_skips_path() {
    let mut assets = text_world();
    let (a, store) = mem_source("a", &[("good.txt", "fine")]);
    store.insert("bad.txt", vec![0xff, 0xfe, 0xff]);
    assets.add_source(&a);

    assets.load_all();

    assert!(assets.exists::<Text>("good.txt"));
    assert!(!assets.exists::<Text>("bad.txt"));
}

#[test]
fn test_unregistered_extension_is_ignored() {
    let mut assets = text_world();
    let (a, _) = mem_source("a", &[("model.obj", "v 0 0 0")]);
    assets.add_source(&a);

    assets.load_asset("model.obj");
    assets.load_all();

    assert!(assets.loaded_paths().is_empty());
}

#[test]
fn test_unregister_all_when_empty() {
    let mut assets = text_world();
    assets.unregister_all();
    assets.register_basic("txt", TextFormat);
}

#[test]
#[should_panic(expected = "cannot unregister")]
fn test_unregister_all_with_loaded_assets_panics() {
    let mut assets = text_world();
    let (a, _) = mem_source("a", &[("f.txt", "hello")]);
    assets.add_source(&a);
    assets.load("f.txt");
    assets.unregister_all();
}
