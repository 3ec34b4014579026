//! Store Durability and Recovery Tests
//!
//! - Committed data survives close and reopen
//! - A torn final write is discarded, earlier data is kept
//! - Corruption before the tail fails Connect
//! - The backing file is exclusively locked
//! - Compaction preserves live data and order

use std::fs::{self, OpenOptions};
use std::io::Write;

use bucketdb::schema::RecordSchema;
use bucketdb::store::{Record, Store};
use serde::{Deserialize, Serialize};
use tempfile::TempDir;

// =============================================================================
// Test Utilities
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Item {
    sku: String,
    title: String,
}

impl Record for Item {
    fn schema() -> RecordSchema {
        RecordSchema::new("Item").identifier("sku").unique("title")
    }
}

fn item(sku: &str, title: &str) -> Item {
    Item {
        sku: sku.to_string(),
        title: title.to_string(),
    }
}

fn skus(items: &[Item]) -> Vec<&str> {
    items.iter().map(|i| i.sku.as_str()).collect()
}

// =============================================================================
// Reopen
// =============================================================================

#[test]
fn test_data_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("app.db");
    {
        let store = Store::open(&path).unwrap();
        store.save(&item("b", "Bolt")).unwrap();
        store.save(&item("a", "Anvil")).unwrap();
        store.save(&item("c", "Crate")).unwrap();
        store.delete(&item("c", "Crate")).unwrap();
        store.update(&item("b", "Big Bolt")).unwrap();
        store.set_key("meta", "version", &3).unwrap();
        store.close();
    }

    let store = Store::open(&path).unwrap();
    let items: Vec<Item> = store.all().unwrap();
    assert_eq!(items, vec![item("b", "Big Bolt"), item("a", "Anvil")]);

    let found: Item = store.one("title", "Big Bolt").unwrap();
    assert_eq!(found.sku, "b");
    assert_eq!(store.get_key::<_, i32>("meta", "version").unwrap(), 3);

    // unique index is rebuilt from replayed rows
    assert!(store.save(&item("z", "Anvil")).is_err());
}

#[test]
fn test_cleared_kind_stays_cleared() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("app.db");
    {
        let store = Store::open(&path).unwrap();
        store.save(&item("a", "Anvil")).unwrap();
        store.clear_db::<Item>().unwrap();
        store.save(&item("b", "Bolt")).unwrap();
    }

    let store = Store::open(&path).unwrap();
    let items: Vec<Item> = store.all().unwrap();
    assert_eq!(skus(&items), vec!["b"]);
}

// =============================================================================
// Torn writes and corruption
// =============================================================================

#[test]
fn test_torn_tail_is_discarded() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("app.db");
    let good_len;
    {
        let store = Store::open(&path).unwrap();
        store.save(&item("a", "Anvil")).unwrap();
        good_len = store.log_size().unwrap();
        store.save(&item("b", "Bolt")).unwrap();
    }

    // cut the last frame in half
    let full_len = fs::metadata(&path).unwrap().len();
    let file = OpenOptions::new().write(true).open(&path).unwrap();
    file.set_len(good_len + (full_len - good_len) / 2).unwrap();
    drop(file);

    let store = Store::open(&path).unwrap();
    let items: Vec<Item> = store.all().unwrap();
    assert_eq!(skus(&items), vec!["a"]);
    assert_eq!(fs::metadata(&path).unwrap().len(), good_len);

    // the store keeps working after repair
    store.save(&item("b", "Bolt")).unwrap();
    drop(store);
    let store = Store::open(&path).unwrap();
    assert_eq!(store.all::<Item>().unwrap().len(), 2);
}

#[test]
fn test_trailing_garbage_is_discarded() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("app.db");
    {
        let store = Store::open(&path).unwrap();
        store.save(&item("a", "Anvil")).unwrap();
    }
    let mut file = OpenOptions::new().append(true).open(&path).unwrap();
    file.write_all(&[0xAB, 0xCD, 0xEF]).unwrap();
    drop(file);

    let store = Store::open(&path).unwrap();
    assert_eq!(store.all::<Item>().unwrap().len(), 1);
}

#[test]
fn test_corruption_before_tail_fails_connect() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("app.db");
    let first_len;
    {
        let store = Store::open(&path).unwrap();
        store.save(&item("a", "Anvil")).unwrap();
        first_len = store.log_size().unwrap();
        store.save(&item("b", "Bolt")).unwrap();
    }

    let mut contents = fs::read(&path).unwrap();
    contents[(first_len / 2) as usize] ^= 0xFF;
    fs::write(&path, contents).unwrap();

    let err = Store::open(&path).err().unwrap();
    assert_eq!(err.code(), "BUCKETDB_CONNECTION");
}

#[test]
fn test_damaged_frame_length_fails_connect_and_keeps_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("app.db");
    {
        let store = Store::open(&path).unwrap();
        store.set_key("settings", "theme", "dark").unwrap();
        store.set_key("settings", "lang", "en").unwrap();
        store.set_key("settings", "tz", "UTC").unwrap();
    }

    let original = fs::read(&path).unwrap();
    let mut damaged = original.clone();
    damaged[2] ^= 0x01;
    fs::write(&path, &damaged).unwrap();

    let err = Store::open(&path).err().unwrap();
    assert_eq!(err.code(), "BUCKETDB_CONNECTION");
    assert!(err.to_string().contains("cannot open"));
    assert_eq!(fs::read(&path).unwrap(), damaged);

    // nothing was discarded, so repairing the byte recovers every key
    fs::write(&path, &original).unwrap();
    let store = Store::open(&path).unwrap();
    assert_eq!(store.get_key::<_, String>("settings", "theme").unwrap(), "dark");
    assert_eq!(store.get_key::<_, String>("settings", "tz").unwrap(), "UTC");
}

// =============================================================================
// Locking
// =============================================================================

#[test]
fn test_second_connect_fails_while_locked() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("app.db");
    let first = Store::open(&path).unwrap();

    let second = Store::new(&path);
    let err = second.connect().unwrap_err();
    assert_eq!(err.code(), "BUCKETDB_CONNECTION");
    assert!(!second.is_connected());

    first.close();
    second.connect().unwrap();
}

#[test]
fn test_connect_fails_for_inaccessible_path() {
    let dir = TempDir::new().unwrap();
    let blocker = dir.path().join("not-a-dir");
    fs::write(&blocker, b"file").unwrap();

    let err = Store::open(blocker.join("app.db")).err().unwrap();
    assert_eq!(err.code(), "BUCKETDB_CONNECTION");
}

// =============================================================================
// Compaction
// =============================================================================

#[test]
fn test_compaction_shrinks_and_preserves() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("app.db");
    let store = Store::open(&path).unwrap();

    store.save(&item("c", "Crate")).unwrap();
    store.save(&item("a", "Anvil")).unwrap();
    for i in 0..50 {
        store.update(&item("c", &format!("Crate v{}", i))).unwrap();
        store.set_key("meta", "rev", &i).unwrap();
    }
    store.save(&item("tmp", "Temp")).unwrap();
    store.delete(&item("tmp", "Temp")).unwrap();

    let before = store.log_size().unwrap();
    store.compact().unwrap();
    let after = store.log_size().unwrap();
    assert!(after < before);

    // writes after compaction land in the new file
    store.save(&item("b", "Bolt")).unwrap();
    drop(store);

    let store = Store::open(&path).unwrap();
    let items: Vec<Item> = store.all().unwrap();
    assert_eq!(skus(&items), vec!["c", "a", "b"]);
    assert_eq!(items[0].title, "Crate v49");
    assert_eq!(store.get_key::<_, i32>("meta", "rev").unwrap(), 49);
}
