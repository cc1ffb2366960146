use std::collections::hash_map::DefaultHasher;
use std::hash::{BuildHasher, BuildHasherDefault, Hash};
use std::sync::Arc;

use parking_lot::Mutex;

struct Bucket<K, V> {
    /// Number of low hash bits this bucket is keyed on
    depth: usize,
    items: Vec<(K, V)>,
}

impl<K: PartialEq, V> Bucket<K, V> {
    fn new(depth: usize) -> Self {
        Self {
            depth,
            items: Vec::new(),
        }
    }

    fn is_full(&self, bucket_size: usize) -> bool {
        self.items.len() >= bucket_size
    }

    fn find(&self, key: &K) -> Option<&V> {
        self.items.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    fn remove(&mut self, key: &K) -> bool {
        match self.items.iter().position(|(k, _)| k == key) {
            Some(pos) => {
                self.items.remove(pos);
                true
            }
            None => false,
        }
    }
}

struct HashTableState<K, V> {
    global_depth: usize,
    num_buckets: usize,
    /// Directory indexed by the low `global_depth` bits of the key hash.
    /// Entries alias the same bucket whenever they agree on the bucket's
    /// low `depth` bits.
    dir: Vec<Arc<Mutex<Bucket<K, V>>>>,
}

/// In-memory extendible hash table. Buckets split on overflow; the
/// directory doubles when a splitting bucket's local depth has caught up
/// with the global depth. A single mutex guards the whole structure, so the
/// per-bucket locks below it never contend.
pub struct ExtendibleHashTable<K, V> {
    bucket_size: usize,
    /// Deterministic hasher so directory layouts are reproducible
    hash_builder: BuildHasherDefault<DefaultHasher>,
    state: Mutex<HashTableState<K, V>>,
}

impl<K, V> ExtendibleHashTable<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    /// Creates a table with a single empty bucket of the given capacity.
    pub fn new(bucket_size: usize) -> Self {
        assert!(bucket_size > 0, "bucket_size must be positive");
        Self {
            bucket_size,
            hash_builder: BuildHasherDefault::default(),
            state: Mutex::new(HashTableState {
                global_depth: 0,
                num_buckets: 1,
                dir: vec![Arc::new(Mutex::new(Bucket::new(0)))],
            }),
        }
    }

    fn hash(&self, key: &K) -> usize {
        self.hash_builder.hash_one(key) as usize
    }

    fn index_of(&self, key: &K, global_depth: usize) -> usize {
        self.hash(key) & ((1 << global_depth) - 1)
    }

    /// Looks up the value for `key`.
    pub fn find(&self, key: &K) -> Option<V> {
        let state = self.state.lock();
        let index = self.index_of(key, state.global_depth);
        let bucket = state.dir[index].lock();
        bucket.find(key).cloned()
    }

    /// Removes the entry for `key`, reporting whether it existed.
    pub fn remove(&self, key: &K) -> bool {
        let state = self.state.lock();
        let index = self.index_of(key, state.global_depth);
        let mut bucket = state.dir[index].lock();
        bucket.remove(key)
    }

    /// Inserts or updates `key`. A full target bucket splits, doubling the
    /// directory first whenever its local depth equals the global depth,
    /// until the target has room.
    pub fn insert(&self, key: K, value: V) {
        let mut state = self.state.lock();

        loop {
            let index = self.index_of(&key, state.global_depth);
            let target = Arc::clone(&state.dir[index]);
            let local_depth = {
                let bucket = target.lock();
                if !bucket.is_full(self.bucket_size) {
                    break;
                }
                bucket.depth
            };

            if local_depth == state.global_depth {
                // Double the directory; new slot capacity + i aliases slot i
                let capacity = state.dir.len();
                for i in 0..capacity {
                    let alias = Arc::clone(&state.dir[i]);
                    state.dir.push(alias);
                }
                state.global_depth += 1;
            }

            // Split the target by the next hash bit
            let mask = 1usize << local_depth;
            let bucket_0 = Arc::new(Mutex::new(Bucket::new(local_depth + 1)));
            let bucket_1 = Arc::new(Mutex::new(Bucket::new(local_depth + 1)));

            for (k, v) in &target.lock().items {
                let chosen = if self.hash(k) & mask != 0 {
                    &bucket_1
                } else {
                    &bucket_0
                };
                chosen.lock().items.push((k.clone(), v.clone()));
            }

            if !bucket_0.lock().items.is_empty() && !bucket_1.lock().items.is_empty() {
                state.num_buckets += 1;
            }

            for i in 0..state.dir.len() {
                if Arc::ptr_eq(&state.dir[i], &target) {
                    state.dir[i] = if i & mask != 0 {
                        Arc::clone(&bucket_1)
                    } else {
                        Arc::clone(&bucket_0)
                    };
                }
            }
        }

        let index = self.index_of(&key, state.global_depth);
        let mut bucket = state.dir[index].lock();
        for (k, v) in bucket.items.iter_mut() {
            if *k == key {
                *v = value;
                return;
            }
        }
        bucket.items.push((key, value));
    }

    pub fn global_depth(&self) -> usize {
        self.state.lock().global_depth
    }

    /// Local depth of the bucket behind the given directory slot.
    pub fn local_depth(&self, dir_index: usize) -> usize {
        let state = self.state.lock();
        let depth = state.dir[dir_index].lock().depth;
        depth
    }

    /// Number of distinct buckets holding entries.
    pub fn num_buckets(&self) -> usize {
        self.state.lock().num_buckets
    }

    pub fn dir_size(&self) -> usize {
        self.state.lock().dir.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_find_remove() {
        let table = ExtendibleHashTable::<i32, String>::new(4);

        table.insert(1, "a".to_string());
        table.insert(2, "b".to_string());
        table.insert(3, "c".to_string());

        assert_eq!(table.find(&1), Some("a".to_string()));
        assert_eq!(table.find(&2), Some("b".to_string()));
        assert_eq!(table.find(&3), Some("c".to_string()));
        assert_eq!(table.find(&4), None);

        assert!(table.remove(&2));
        assert!(!table.remove(&2));
        assert_eq!(table.find(&2), None);
    }

    #[test]
    fn test_insert_updates_in_place() {
        let table = ExtendibleHashTable::<i32, i32>::new(2);

        table.insert(7, 1);
        table.insert(7, 2);
        assert_eq!(table.find(&7), Some(2));
    }

    #[test]
    fn test_directory_grows_under_load() {
        let table = ExtendibleHashTable::<i32, i32>::new(2);

        for i in 0..64 {
            table.insert(i, i * 10);
        }

        assert!(table.global_depth() > 0);
        assert_eq!(table.dir_size(), 1 << table.global_depth());
        for i in 0..64 {
            assert_eq!(table.find(&i), Some(i * 10), "lost key {}", i);
        }
    }

    #[test]
    fn test_local_depth_bounded_by_global() {
        let table = ExtendibleHashTable::<i32, i32>::new(2);

        for i in 0..32 {
            table.insert(i, i);
        }

        let global = table.global_depth();
        for slot in 0..table.dir_size() {
            assert!(table.local_depth(slot) <= global);
        }
    }
}
