use std::fs;

use strata_assets::{DirStore, FileStore, MemoryStore, WritableFileStore};

#[test]
fn test_memory_store() {
    let store = MemoryStore::new();
    assert!(store.enumerate().is_empty());

    store.insert("a/b.txt", b"hello".to_vec());
    assert!(store.exists("a/b.txt"));
    assert!(!store.exists("a/b"));
    assert_eq!(store.read_bytes("a/b.txt").unwrap(), b"hello");

    store.save("c.txt", b"world").unwrap();
    assert_eq!(store.enumerate().len(), 2);

    store.delete("c.txt").unwrap();
    assert!(!store.exists("c.txt"));
    assert!(store.read_bytes("c.txt").is_err());
}

#[test]
fn test_dir_store_index() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("textures/blocks")).unwrap();
    fs::write(dir.path().join("root.txt"), "root").unwrap();
    fs::write(dir.path().join("textures/blocks/stone.png"), "png").unwrap();

    let store = DirStore::new(dir.path()).unwrap();
    assert!(store.exists("root.txt"));
    assert!(store.exists("textures/blocks/stone.png"));
    assert!(!store.exists("textures/blocks"));

    let mut paths = store.enumerate();
    paths.sort();
    assert_eq!(paths.len(), 2);
    assert_eq!(&*paths[1], "textures/blocks/stone.png");

    assert_eq!(store.read_bytes("root.txt").unwrap(), b"root");
}

#[test]
fn test_dir_store_reload_index() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("a.txt"), "a").unwrap();

    let store = DirStore::new(dir.path()).unwrap();
    assert!(!store.exists("b.txt"));

    // external change is invisible until the index is rescanned
    fs::write(dir.path().join("b.txt"), "b").unwrap();
    assert!(!store.exists("b.txt"));

    store.reload_index();
    assert!(store.exists("b.txt"));
}

#[test]
fn test_dir_store_save_delete() {
    let dir = tempfile::tempdir().unwrap();
    let store = DirStore::new(dir.path()).unwrap();

    store.save("saves/world.dat", b"state").unwrap();
    assert!(store.exists("saves/world.dat"));
    assert_eq!(store.read_bytes("saves/world.dat").unwrap(), b"state");
    assert!(dir.path().join("saves/world.dat").is_file());

    store.delete("saves/world.dat").unwrap();
    assert!(!store.exists("saves/world.dat"));
    assert!(!dir.path().join("saves/world.dat").exists());
}
