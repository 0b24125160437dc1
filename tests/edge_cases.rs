use std::sync::Arc;
use std::thread;

use geoknn::{CancellationToken, Knn};
use rand::Rng;

/// Test 1: invalid constructor precision
#[test]
fn test_invalid_precision() {
    for precision in [31, -1, 500, -500] {
        let err = Knn::<i32>::new(precision).expect_err("precision should be rejected");
        assert_eq!(
            err.to_string(),
            format!(
                "invalid precision {}: precision must be between 0 and 30",
                precision
            )
        );
    }
}

/// Test 2: out-of-range coordinates abort with the exact diagnostic
#[test]
#[should_panic(
    expected = "invalid latitude 0.000000 (Min:-90, Max 90) or longitude 181.000000 (Min: -180, Max 180)"
)]
fn test_longitude_too_far_east_panics() {
    let index = Knn::new(10).unwrap();
    index.add_value("x", 2, 0.0, 181.0);
}

#[test]
#[should_panic(
    expected = "invalid latitude 0.000000 (Min:-90, Max 90) or longitude -181.000000 (Min: -180, Max 180)"
)]
fn test_longitude_too_far_west_panics() {
    let index = Knn::new(10).unwrap();
    index.add_value("x", 2, 0.0, -181.0);
}

#[test]
#[should_panic(
    expected = "invalid latitude 91.000000 (Min:-90, Max 90) or longitude 0.000000 (Min: -180, Max 180)"
)]
fn test_latitude_too_far_north_panics() {
    let index = Knn::new(10).unwrap();
    index.add_value("x", 2, 91.0, 0.0);
}

#[test]
#[should_panic(
    expected = "invalid latitude -91.000000 (Min:-90, Max 90) or longitude 0.000000 (Min: -180, Max 180)"
)]
fn test_latitude_too_far_south_panics() {
    let index = Knn::new(10).unwrap();
    index.add_value("x", 2, -91.0, 0.0);
}

#[test]
#[should_panic(expected = "invalid latitude")]
fn test_upsert_validates_coordinates_too() {
    let index = Knn::new(10).unwrap();
    index.upsert_value("x", 2, 120.0, 0.0);
}

/// Test 3: extreme but valid coordinates
#[test]
fn test_extreme_coordinates_accepted() {
    let index = Knn::new(10).unwrap();

    index.add_value("north_pole", 1, 90.0, 0.0);
    index.add_value("south_pole", 2, -90.0, 0.0);
    index.add_value("date_line_east", 3, 0.0, 180.0);
    index.add_value("date_line_west", 4, 0.0, -180.0);
    assert_eq!(index.len(), 4);

    let mut nearest = None;
    index.search(&CancellationToken::new(), 89.0, 10.0, |value| {
        nearest = Some(value.key().to_string());
        true
    });
    assert_eq!(nearest.as_deref(), Some("north_pole"));
}

/// Test 4: very long keys
#[test]
fn test_very_long_keys() {
    let index = Knn::new(12).unwrap();
    let long_key = "x".repeat(1_000);

    index.add_value(long_key.clone(), 1, 10.0, 10.0);
    assert!(index.has_value(&long_key));
    assert!(index.remove_value(&long_key));
    assert!(!index.has_value(&long_key));
}

/// Test 5: searching an empty index
#[test]
fn test_empty_index_search() {
    let index = Knn::<i32>::new(14).unwrap();

    let mut emitted = 0;
    index.search(&CancellationToken::new(), 0.0, 0.0, |_| {
        emitted += 1;
        false
    });
    index.search_approximate(&CancellationToken::new(), 0.0, 0.0, |_| {
        emitted += 1;
        false
    });
    assert_eq!(emitted, 0);
}

/// Test 6: dense-cluster stress, keeping sizes reasonable for CI
#[test]
fn test_dense_cluster_stress() {
    let index = Knn::new(25).unwrap();
    let mut rng = rand::rng();

    // 10K points inside one city block force deep adaptive splitting.
    for i in 0..10_000 {
        let lat = 40.7128 + rng.random_range(-0.005..0.005);
        let lng = -74.0060 + rng.random_range(-0.005..0.005);
        index.add_value(format!("p{}", i), i, lat, lng);
    }
    assert_eq!(index.len(), 10_000);

    let mut seen = 0;
    index.search(&CancellationToken::new(), 40.7128, -74.0060, |_| {
        seen += 1;
        seen >= 100
    });
    assert_eq!(seen, 100);

    let stats = index.stats();
    assert_eq!(stats.value_count, 10_000);
    assert!(stats.leaf_count > 1);
}

/// Test 7: concurrent inserts, removals, and searches
#[test]
fn test_concurrent_mutation_and_search() {
    let index = Arc::new(Knn::new(22).unwrap());
    let writers: usize = 4;
    let per_writer: usize = 500;

    let mut handles = Vec::new();
    for w in 0..writers {
        let index = Arc::clone(&index);
        handles.push(thread::spawn(move || {
            let mut rng = rand::rng();
            for i in 0..per_writer {
                let lat = rng.random_range(-85.0..85.0);
                let lng = rng.random_range(-179.0..179.0);
                index.add_value(format!("w{}:{}", w, i), i, lat, lng);
            }
        }));
    }
    for r in 0..2 {
        let index = Arc::clone(&index);
        handles.push(thread::spawn(move || {
            for _ in 0..20 {
                let mut count = 0;
                index.search(&CancellationToken::new(), 10.0 * r as f64, 20.0, |_| {
                    count += 1;
                    count >= 50
                });
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(index.len(), writers * per_writer);

    // Every key is removable afterwards: the lookup map survived the splits
    // performed by competing writers.
    for w in 0..writers {
        for i in 0..per_writer {
            assert!(index.remove_value(&format!("w{}:{}", w, i)));
        }
    }
    index.prune();
    assert!(index.is_empty());
    assert_eq!(index.stats().leaf_count, 0);
}

/// Test 8: pruning concurrently with readers does not deadlock
#[test]
fn test_prune_alternating_with_operations() {
    let index = Arc::new(Knn::new(16).unwrap());
    for i in 0..200 {
        index.add_value(format!("k{}", i), i, (i % 90) as f64, (i % 180) as f64);
    }
    for i in 0..100 {
        index.remove_value(&format!("k{}", i));
    }

    let pruner = {
        let index = Arc::clone(&index);
        thread::spawn(move || {
            for _ in 0..10 {
                index.prune();
            }
        })
    };
    let reader = {
        let index = Arc::clone(&index);
        thread::spawn(move || {
            for _ in 0..10 {
                let mut count = 0;
                index.search(&CancellationToken::new(), 45.0, 90.0, |_| {
                    count += 1;
                    false
                });
                assert_eq!(count, 100);
            }
        })
    };
    pruner.join().unwrap();
    reader.join().unwrap();
}
