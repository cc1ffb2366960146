//! Integration tests for the extendible hash table

use tarndb::container::ExtendibleHashTable;

#[test]
fn test_tight_buckets_force_splits() {
    // Three inserts into bucket_size = 2 must overflow some bucket and grow
    // the structure until everything fits.
    let table = ExtendibleHashTable::<i32, &str>::new(2);

    table.insert(1, "a");
    table.insert(5, "b");
    table.insert(9, "c");

    assert_eq!(table.find(&1), Some("a"));
    assert_eq!(table.find(&5), Some("b"));
    assert_eq!(table.find(&9), Some("c"));

    // Directory size always matches the global depth
    assert_eq!(table.dir_size(), 1 << table.global_depth());
    for slot in 0..table.dir_size() {
        assert!(table.local_depth(slot) <= table.global_depth());
    }
}

#[test]
fn test_update_existing_key() {
    let table = ExtendibleHashTable::<i32, i32>::new(2);

    table.insert(1, 10);
    table.insert(1, 20);
    assert_eq!(table.find(&1), Some(20));
}

#[test]
fn test_remove() {
    let table = ExtendibleHashTable::<i32, String>::new(4);

    for i in 0..16 {
        table.insert(i, format!("v{}", i));
    }

    assert!(table.remove(&7));
    assert!(!table.remove(&7));
    assert_eq!(table.find(&7), None);

    for i in (0..16).filter(|&i| i != 7) {
        assert_eq!(table.find(&i), Some(format!("v{}", i)), "lost key {}", i);
    }
}

#[test]
fn test_heavy_load_keeps_every_key() {
    let table = ExtendibleHashTable::<u64, u64>::new(2);

    for i in 0..512 {
        table.insert(i, i ^ 0xdead);
    }

    assert!(table.global_depth() >= 1);
    assert!(table.num_buckets() > 1);
    assert_eq!(table.dir_size(), 1 << table.global_depth());

    for i in 0..512 {
        assert_eq!(table.find(&i), Some(i ^ 0xdead), "lost key {}", i);
    }
}

#[test]
fn test_string_keys() {
    let table = ExtendibleHashTable::<String, usize>::new(3);

    let words = ["page", "frame", "latch", "pin", "evict", "split", "merge"];
    for (i, word) in words.iter().enumerate() {
        table.insert(word.to_string(), i);
    }

    for (i, word) in words.iter().enumerate() {
        assert_eq!(table.find(&word.to_string()), Some(i));
    }
    assert_eq!(table.find(&"missing".to_string()), None);
}

#[test]
fn test_concurrent_inserts_and_finds() {
    use std::sync::Arc;
    use std::thread;

    let table = Arc::new(ExtendibleHashTable::<u32, u32>::new(4));

    let writers: Vec<_> = (0..4u32)
        .map(|t| {
            let table = Arc::clone(&table);
            thread::spawn(move || {
                for i in 0..200 {
                    let key = t * 1000 + i;
                    table.insert(key, key * 2);
                }
            })
        })
        .collect();

    for handle in writers {
        handle.join().unwrap();
    }

    for t in 0..4u32 {
        for i in 0..200 {
            let key = t * 1000 + i;
            assert_eq!(table.find(&key), Some(key * 2));
        }
    }
}
