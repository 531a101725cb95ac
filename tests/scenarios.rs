//! End-to-end scenarios exercising the public `Art`/`ConcurrentArt`/
//! serialization surface together, as opposed to the unit tests living
//! alongside each module.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use part_art::{art_key, Art, ArtConfig, ConcurrentArt, Deserializer, MemBlockDevice, Serializer};

#[test]
fn inline_leaf_chain_promotion() {
    let mut art = Art::new();
    let key = art_key(&10i64);
    art.put(&key, 123).unwrap();
    art.put(&key, 124).unwrap();
    art.put(&key, 123).unwrap();
    assert_eq!(art.get(&key), vec![123, 124, 123]);
}

#[test]
fn deep_prefix_splits_at_first_differing_byte() {
    let mut art = Art::new();
    let k1 = art_key(&0x0000_0001i32);
    let k2 = art_key(&0x0000_0002i32);
    art.put(&k1, 1).unwrap();
    art.put(&k2, 2).unwrap();
    assert_eq!(art.get(&k1), vec![1]);
    assert_eq!(art.get(&k2), vec![2]);
}

#[test]
fn node_grows_to_node48_and_every_key_stays_reachable() {
    let mut art = Art::new();
    for i in 0..48i32 {
        art.put(&art_key(&i), i as u64).unwrap();
    }
    for i in 0..48i32 {
        assert_eq!(art.get(&art_key(&i)), vec![i as u64]);
    }
}

#[test]
fn serialize_round_trip_preserves_every_key() {
    let mut art = Art::new();
    for i in 0..2000i64 {
        art.put(&art_key(&i), i as u64).unwrap();
    }

    let device = MemBlockDevice::new();
    let bp = {
        let mut serializer = Serializer::new(&device);
        let bp = art.serialize(&mut serializer).unwrap();
        serializer.flush().unwrap();
        bp
    };

    let deserializer = Deserializer::new(&device);
    let restored = Art::deserialize_root(&deserializer, bp, ArtConfig::default()).unwrap();

    for i in 0..2000i64 {
        assert_eq!(restored.get(&art_key(&i)), vec![i as u64]);
    }
}

#[test]
fn hybrid_persistence_mixes_serialized_and_fresh_inserts() {
    let mut art = Art::new();
    for i in 0..500i64 {
        art.put(&art_key(&i), i as u64).unwrap();
    }

    let device = MemBlockDevice::new();
    let bp = {
        let mut serializer = Serializer::new(&device);
        let bp = art.serialize(&mut serializer).unwrap();
        serializer.flush().unwrap();
        bp
    };

    let deserializer = Deserializer::new(&device);
    let mut restored = Art::deserialize_root(&deserializer, bp, ArtConfig::default()).unwrap();

    for i in 500..1000i64 {
        restored.put(&art_key(&i), i as u64).unwrap();
    }

    for i in 0..1000i64 {
        assert_eq!(restored.get(&art_key(&i)), vec![i as u64]);
    }
}

#[test]
fn concurrent_reader_eventually_observes_late_writer() {
    let tree = Arc::new(ConcurrentArt::new());
    let writer_tree = tree.clone();
    let handle = thread::spawn(move || {
        thread::sleep(Duration::from_millis(1));
        writer_tree.put(&art_key(&10i64), 1).unwrap();
    });

    loop {
        let result = tree.get(&art_key(&10i64));
        if !result.is_empty() {
            assert_eq!(result, vec![1]);
            break;
        }
    }
    handle.join().unwrap();
}
