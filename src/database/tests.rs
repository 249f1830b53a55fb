use super::*;
use crate::config::HashConfig;
use crate::types::{IdentityHasher, Item, ModuloHasher};
use crate::StorageError;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::io::{Seek, SeekFrom, Write};
use tempfile::TempDir;

fn identity_store(dir: &TempDir, config: HashConfig) -> DynamicHash<Item, IdentityHasher> {
    DynamicHash::open_with_hasher(dir.path(), config.without_sync(), IdentityHasher).unwrap()
}

fn item(id: u64) -> Item {
    Item::new(id, format!("item-{}", id))
}

#[test]
fn test_insert_find_roundtrip() {
    let dir = TempDir::new().unwrap();
    let mut store: DynamicHash<Item> = DynamicHash::open(dir.path(), HashConfig::default().without_sync()).unwrap();

    for id in 0..200 {
        store.insert(item(id)).unwrap();
    }
    assert_eq!(store.len(), 200);
    for id in 0..200 {
        assert_eq!(store.find(&id).unwrap(), item(id));
    }
    store.verify().unwrap();
}

#[test]
fn test_duplicate_key_rejected() {
    let dir = TempDir::new().unwrap();
    let mut store = identity_store(&dir, HashConfig::compact());

    store.insert(item(7)).unwrap();
    let err = store.insert(Item::new(7, "other")).unwrap_err();
    assert!(matches!(err, StorageError::DuplicateKey(_)));
    assert_eq!(store.len(), 1);
    assert!(!store.is_poisoned());
}

#[test]
fn test_duplicate_key_found_in_overflow() {
    let dir = TempDir::new().unwrap();
    let mut store = identity_store(&dir, HashConfig::new(2, 2, 1));

    for id in [1, 3, 5] {
        store.insert(item(id)).unwrap();
    }
    assert!(store.bucket_of(&5).unwrap().has_overflow());
    assert!(matches!(store.insert(item(5)), Err(StorageError::DuplicateKey(_))));
    assert_eq!(store.len(), 3);
}

#[test]
fn test_delete_tombstone() {
    let dir = TempDir::new().unwrap();
    let mut store = identity_store(&dir, HashConfig::compact());

    for id in 0..10 {
        store.insert(item(id)).unwrap();
    }
    let removed = store.delete(&4).unwrap();
    assert_eq!(removed, item(4));
    assert!(matches!(store.find(&4), Err(StorageError::NotFound(_))));
    assert!(!store.contains(&item(4)).unwrap());
    assert!(matches!(store.delete(&4), Err(StorageError::NotFound(_))));
    assert_eq!(store.len(), 9);
    store.verify().unwrap();
}

#[test]
fn test_contains_compares_payload() {
    let dir = TempDir::new().unwrap();
    let mut store = identity_store(&dir, HashConfig::compact());

    store.insert(item(3)).unwrap();
    assert!(store.contains(&item(3)).unwrap());
    assert!(!store.contains(&Item::new(3, "different")).unwrap());
    assert!(!store.contains(&item(4)).unwrap());
}

#[test]
fn test_edit_main_and_overflow() {
    let dir = TempDir::new().unwrap();
    let mut store = identity_store(&dir, HashConfig::new(2, 2, 1));

    for id in [1, 3, 5, 7] {
        store.insert(item(id)).unwrap();
    }

    store.edit(&item(1), Item::new(1, "renamed")).unwrap();
    assert_eq!(store.find(&1).unwrap().label, "renamed");

    // 5 and 7 live in the overflow chain
    store.edit(&item(7), Item::new(7, "spilled")).unwrap();
    assert_eq!(store.find(&7).unwrap().label, "spilled");
    assert_eq!(store.len(), 4);
    store.verify().unwrap();
}

#[test]
fn test_edit_errors() {
    let dir = TempDir::new().unwrap();
    let mut store = identity_store(&dir, HashConfig::compact());
    store.insert(item(1)).unwrap();

    assert!(matches!(
        store.edit(&item(1), item(2)),
        Err(StorageError::KeyMismatch(_))
    ));
    assert!(matches!(
        store.edit(&item(9), Item::new(9, "x")),
        Err(StorageError::NotFound(_))
    ));
    // Stale payload does not match the stored record
    assert!(matches!(
        store.edit(&Item::new(1, "stale"), Item::new(1, "x")),
        Err(StorageError::NotFound(_))
    ));
    assert_eq!(store.find(&1).unwrap(), item(1));
}

#[test]
fn test_split_on_third_insert() {
    let dir = TempDir::new().unwrap();
    let mut store = identity_store(&dir, HashConfig::new(2, 2, 4));
    assert_eq!(store.depth(), 1);

    // All share bit 0 = 1; 1 and 3 differ on bit 1
    for id in [0b001, 0b011, 0b101] {
        store.insert(item(id)).unwrap();
    }

    assert_eq!(store.depth(), 2);
    for id in [0b001, 0b011, 0b101] {
        assert_eq!(store.find(&id).unwrap(), item(id));
    }
    assert_eq!(store.bucket_of(&0b001).unwrap().main_size, 2);
    assert_eq!(store.bucket_of(&0b011).unwrap().main_size, 1);
    store.verify().unwrap();
}

#[test]
fn test_split_cascades_when_child_stays_full() {
    let dir = TempDir::new().unwrap();
    let mut store = identity_store(&dir, HashConfig::new(2, 2, 4));

    // 1 and 5 agree on bits 0 and 1, so the first split leaves them together
    for id in [0b001, 0b101, 0b1001] {
        store.insert(item(id)).unwrap();
    }

    assert!(store.depth() >= 3);
    for id in [0b001, 0b101, 0b1001] {
        assert!(store.find(&id).is_ok());
    }
    store.verify().unwrap();
}

#[test]
fn test_overflow_roundtrip_and_pull_back() {
    let dir = TempDir::new().unwrap();
    let mut store = identity_store(&dir, HashConfig::new(2, 2, 1));

    // Every odd key routes to leaf "1", which cannot split at max depth 1
    let ids = [1, 3, 5, 7, 9];
    for id in ids {
        store.insert(item(id)).unwrap();
    }

    let bucket = store.bucket_of(&1).unwrap();
    assert_eq!(bucket.main_size, 2);
    assert_eq!(bucket.overflow_size, 3);
    assert_eq!(bucket.chain_length, 3);
    for id in ids {
        assert_eq!(store.find(&id).unwrap(), item(id));
    }

    for id in [9, 1, 3] {
        store.delete(&id).unwrap();
    }

    let bucket = store.bucket_of(&5).unwrap();
    assert_eq!(bucket.overflow_size, 0);
    assert_eq!(bucket.chain_length, 1);
    assert_eq!(bucket.main_size, 2);
    assert!(store.overflow.blocks().is_empty());
    assert_eq!(store.find(&5).unwrap(), item(5));
    assert_eq!(store.find(&7).unwrap(), item(7));
    store.verify().unwrap();
}

#[test]
fn test_empty_main_block_refilled_from_chain_tail() {
    let dir = TempDir::new().unwrap();
    let mut store = identity_store(&dir, HashConfig::new(2, 2, 1));

    for id in [1, 3, 5, 7, 9, 11] {
        store.insert(item(id)).unwrap();
    }
    // Main block holds 1 and 3; emptying it leaves 4 overflow records
    store.delete(&1).unwrap();
    store.delete(&3).unwrap();

    let bucket = store.bucket_of(&5).unwrap();
    assert_eq!(bucket.main_size, 2);
    assert_eq!(bucket.overflow_size, 2);
    assert_eq!(bucket.chain_length, 2);
    for id in [5, 7, 9, 11] {
        assert!(store.find(&id).is_ok());
    }
    store.verify().unwrap();
}

#[test]
fn test_overflow_disabled_exhausts_capacity() {
    let dir = TempDir::new().unwrap();
    let mut store = identity_store(&dir, HashConfig::new(2, 0, 1));

    store.insert(item(1)).unwrap();
    store.insert(item(3)).unwrap();
    let err = store.insert(item(5)).unwrap_err();
    assert!(matches!(err, StorageError::CapacityExhausted(_)));
    assert!(!store.is_poisoned());
    assert_eq!(store.len(), 2);
    assert!(store.find(&5).is_err());
}

#[test]
fn test_delete_all_restores_initial_layout() {
    let dir = TempDir::new().unwrap();
    let mut store = identity_store(&dir, HashConfig::new(2, 2, 4));
    let block_size = store.main.block_size();

    let mut ids: Vec<u64> = (0..60).collect();
    for &id in &ids {
        store.insert(item(id)).unwrap();
    }
    assert!(store.depth() > 1);

    let mut rng = StdRng::seed_from_u64(17);
    ids.shuffle(&mut rng);
    for id in ids {
        store.delete(&id).unwrap();
    }

    let stats = store.stats().unwrap();
    assert_eq!(stats.size, 0);
    assert_eq!(stats.leaf_count, 2);
    assert_eq!(stats.depth, 1);
    assert_eq!(stats.main_file_len, 2 * block_size);
    assert_eq!(stats.main_free_blocks, 0);
    assert_eq!(stats.overflow_file_len, 0);

    let rows = store.trie().dump();
    assert_eq!(rows.len(), 2);
    assert_eq!((rows[0].route.as_str(), rows[0].block_address), ("0", 0));
    assert_eq!((rows[1].route.as_str(), rows[1].block_address), ("1", block_size));
    assert!(rows.iter().all(|row| row.main_size == 0 && row.chain_length == 1));
}

#[test]
fn test_free_chain_reused() {
    let dir = TempDir::new().unwrap();
    let mut store = identity_store(&dir, HashConfig::new(2, 2, 4));
    let block_size = store.main.block_size();

    for id in [0, 2, 4, 1, 3, 5] {
        store.insert(item(id)).unwrap();
    }
    // "01" empties and folds into "00"; block 2 sits before the live block 3
    store.delete(&2).unwrap();
    assert_eq!(store.main.free_chain().unwrap(), vec![2 * block_size]);

    // Splitting "0" again takes the freed block
    store.insert(item(6)).unwrap();
    assert!(store.main.free_chain().unwrap().is_empty());
    assert_eq!(store.main.block_count(), 4);
    store.verify().unwrap();
}

#[test]
fn test_free_chain_corruption_poisons_store() {
    let dir = TempDir::new().unwrap();
    let mut store = identity_store(&dir, HashConfig::new(2, 2, 4));
    let block_size = store.main.block_size();

    for id in [0, 2, 4, 1, 3, 5] {
        store.insert(item(id)).unwrap();
    }
    store.delete(&2).unwrap();

    // Claim one valid record in the free block
    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .open(store.main.path())
        .unwrap();
    file.seek(SeekFrom::Start(2 * block_size)).unwrap();
    file.write_all(&1i32.to_le_bytes()).unwrap();
    file.sync_all().unwrap();

    let err = store.insert(item(6)).unwrap_err();
    assert!(matches!(err, StorageError::FreeChainCorruption(_)));
    assert!(store.is_poisoned());
    assert!(matches!(store.find(&0), Err(StorageError::Corruption(_))));
    assert!(matches!(store.insert(item(8)), Err(StorageError::Corruption(_))));
}

#[test]
fn test_save_and_reopen() {
    let dir = TempDir::new().unwrap();
    let config = HashConfig::compact().without_sync();

    let before = {
        let mut store: DynamicHash<Item> = DynamicHash::open(dir.path(), config.clone()).unwrap();
        for id in 0..150 {
            store.insert(item(id)).unwrap();
        }
        for id in (0..150).step_by(3) {
            store.delete(&id).unwrap();
        }
        let stats = store.stats().unwrap();
        store.close().unwrap();
        stats
    };

    let store: DynamicHash<Item> = DynamicHash::open(dir.path(), config).unwrap();
    assert_eq!(store.stats().unwrap(), before);
    for id in 0..150 {
        if id % 3 == 0 {
            assert!(store.find(&id).is_err());
        } else {
            assert_eq!(store.find(&id).unwrap(), item(id));
        }
    }
    store.verify().unwrap();
}

#[test]
fn test_reopen_with_other_block_factor_fails() {
    let dir = TempDir::new().unwrap();
    {
        let mut store: DynamicHash<Item> =
            DynamicHash::open(dir.path(), HashConfig::new(6, 10, 5).without_sync()).unwrap();
        for id in 0..20 {
            store.insert(item(id)).unwrap();
        }
        store.save().unwrap();
    }
    let main_before = std::fs::read(dir.path().join("main.bin")).unwrap();
    let meta_before = std::fs::read(dir.path().join("main_meta.json")).unwrap();

    let result: crate::Result<DynamicHash<Item>> =
        DynamicHash::open(dir.path(), HashConfig::new(8, 10, 5).without_sync());
    assert!(matches!(result, Err(StorageError::IncompatibleMetadata(_))));

    assert_eq!(std::fs::read(dir.path().join("main.bin")).unwrap(), main_before);
    assert_eq!(std::fs::read(dir.path().join("main_meta.json")).unwrap(), meta_before);

    // Matching geometry still opens
    let store: DynamicHash<Item> =
        DynamicHash::open(dir.path(), HashConfig::new(6, 10, 5).without_sync()).unwrap();
    assert_eq!(store.len(), 20);
}

#[test]
fn test_open_with_default_hasher() {
    let dir = TempDir::new().unwrap();
    let mut store = DynamicHash::<Item>::open(dir.path(), HashConfig::default().without_sync()).unwrap();
    store.insert(item(7)).unwrap();
    assert_eq!(store.find(&7).unwrap(), item(7));
    store.close().unwrap();

    let store = DynamicHash::<Item>::open(dir.path(), HashConfig::default().without_sync()).unwrap();
    assert_eq!(store.len(), 1);
}

#[test]
fn test_reset_changes_geometry() {
    let dir = TempDir::new().unwrap();
    let old = HashConfig::new(6, 10, 5).without_sync();
    let new = HashConfig::new(8, 10, 5).without_sync();

    {
        let mut store = DynamicHash::<Item>::open(dir.path(), old.clone()).unwrap();
        for id in 0..20 {
            store.insert(item(id)).unwrap();
        }
        store.save().unwrap();

        store.reset(new.clone()).unwrap();
        assert!(store.is_empty());
        assert_eq!(store.config().block_factor, 8);
        assert_eq!(store.trie().leaf_count(), 2);
        for id in 0..20 {
            assert!(matches!(store.find(&id), Err(StorageError::NotFound(_))));
        }
        let stats = store.stats().unwrap();
        assert_eq!(stats.main_blocks, 2);
        assert_eq!(stats.overflow_file_len, 0);

        for id in 100..130 {
            store.insert(item(id)).unwrap();
        }
        store.verify().unwrap();
        store.save().unwrap();
    }

    // The old geometry no longer matches what is on disk
    let result: crate::Result<DynamicHash<Item>> = DynamicHash::open(dir.path(), old);
    assert!(matches!(result, Err(StorageError::IncompatibleMetadata(_))));

    let store = DynamicHash::<Item>::open(dir.path(), new).unwrap();
    assert_eq!(store.len(), 30);
    for id in 100..130 {
        assert_eq!(store.find(&id).unwrap(), item(id));
    }
    store.verify().unwrap();
}

#[test]
fn test_reset_rejects_invalid_config() {
    let dir = TempDir::new().unwrap();
    let mut store = identity_store(&dir, HashConfig::compact());
    for id in 0..5 {
        store.insert(item(id)).unwrap();
    }

    let result = store.reset(HashConfig::new(0, 2, 4));
    assert!(matches!(result, Err(StorageError::InvalidArgument(_))));
    assert!(!store.is_poisoned());
    assert_eq!(store.len(), 5);
    assert_eq!(store.find(&3).unwrap(), item(3));
}

#[test]
fn test_reset_clears_poison() {
    let dir = TempDir::new().unwrap();
    let mut store = identity_store(&dir, HashConfig::compact());
    store.poisoned = true;
    assert!(matches!(store.find(&1), Err(StorageError::Corruption(_))));

    store.reset(HashConfig::compact().without_sync()).unwrap();
    assert!(!store.is_poisoned());
    store.insert(item(1)).unwrap();
    assert_eq!(store.find(&1).unwrap(), item(1));
}

#[test]
fn test_corrupted_trie_dump_rejected() {
    let dir = TempDir::new().unwrap();
    {
        let mut store = identity_store(&dir, HashConfig::compact());
        for id in 0..12 {
            store.insert(item(id)).unwrap();
        }
        store.save().unwrap();
    }

    let path = dir.path().join("trie.bin");
    let mut bytes = std::fs::read(&path).unwrap();
    let mid = bytes.len() / 2;
    bytes[mid] ^= 0xFF;
    std::fs::write(&path, bytes).unwrap();

    let result = DynamicHash::<Item, IdentityHasher>::open_with_hasher(
        dir.path(),
        HashConfig::compact().without_sync(),
        IdentityHasher,
    );
    assert!(matches!(result, Err(StorageError::Corruption(_))));
}

#[test]
fn test_records_and_describe() {
    let dir = TempDir::new().unwrap();
    let mut store = identity_store(&dir, HashConfig::new(2, 2, 1));
    for id in [1, 2, 3, 5, 7] {
        store.insert(item(id)).unwrap();
    }

    let mut ids: Vec<u64> = store.records().unwrap().iter().map(|r| r.id).collect();
    ids.sort_unstable();
    assert_eq!(ids, vec![1, 2, 3, 5, 7]);

    let description = store.describe().unwrap();
    assert!(description.main.contains("Bucket '1'"));
    assert!(description.main.contains("label: \"item-3\""));
    assert!(description.overflow.contains("label: \"item-7\""));
    assert!(description.to_string().contains("=== Overflow file ==="));
}

#[test]
fn test_random_workload_matches_model() {
    let dir = TempDir::new().unwrap();
    let mut store: DynamicHash<Item, ModuloHasher> = DynamicHash::open_with_hasher(
        dir.path(),
        HashConfig::new(3, 2, 4).without_sync(),
        ModuloHasher::new(40),
    )
    .unwrap();
    let mut model: HashMap<u64, Item> = HashMap::new();
    let mut rng = StdRng::seed_from_u64(0x5eed);

    for step in 0..3000 {
        let id = rng.gen_range(0..400u64);
        match rng.gen_range(0..10) {
            0..=4 => {
                let record = Item::new(id, format!("v{}", step));
                let result = store.insert(record.clone());
                if model.contains_key(&id) {
                    assert!(matches!(result, Err(StorageError::DuplicateKey(_))));
                } else {
                    result.unwrap();
                    model.insert(id, record);
                }
            }
            5..=7 => match model.remove(&id) {
                Some(expected) => assert_eq!(store.delete(&id).unwrap(), expected),
                None => assert!(matches!(store.delete(&id), Err(StorageError::NotFound(_)))),
            },
            8 => {
                if let Some(old) = model.get(&id).cloned() {
                    let new = Item::new(id, format!("e{}", step));
                    store.edit(&old, new.clone()).unwrap();
                    model.insert(id, new);
                }
            }
            _ => match model.get(&id) {
                Some(expected) => assert_eq!(&store.find(&id).unwrap(), expected),
                None => assert!(store.find(&id).is_err()),
            },
        }

        assert_eq!(store.len(), model.len());
        if step % 250 == 0 {
            store.verify().unwrap();
        }
    }

    store.verify().unwrap();
    for (id, expected) in &model {
        assert_eq!(&store.find(id).unwrap(), expected);
    }
}
