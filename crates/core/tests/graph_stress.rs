//! Structural invariants, recall thresholds, mass deletion, and concurrent
//! access.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use vsim_core::{HnswConfig, HnswIndex, Quantization};

fn random_unit_vectors(n: usize, dim: usize, seed: u64) -> Vec<Vec<f32>> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|_| {
            loop {
                let v: Vec<f32> = (0..dim).map(|_| rng.gen_range(-1.0..1.0)).collect();
                if v.iter().any(|&x| x != 0.0) {
                    break v;
                }
            }
        })
        .collect()
}

fn build(
    vectors: &[Vec<f32>],
    quant: Quantization,
    ef_construction: usize,
    ef_search: usize,
) -> HnswIndex<usize> {
    let dim = vectors[0].len();
    let config = HnswConfig {
        ef_search,
        ..HnswConfig::default()
    };
    let idx = HnswIndex::with_config(dim, quant, config).unwrap();
    for (i, v) in vectors.iter().enumerate() {
        idx.insert(v, None, i as u64, i, ef_construction).unwrap();
    }
    idx
}

fn assert_valid(idx: &HnswIndex<usize>) {
    let check = idx.validate_graph();
    assert!(check.reciprocal, "non-reciprocal link found");
    assert!(check.within_caps, "a neighbor list exceeds its layer cap");
    assert_eq!(
        check.connected_nodes,
        idx.len() as u64,
        "live nodes unreachable from the entry point"
    );
}

#[test]
fn invariants_hold_through_interleaved_inserts_and_deletes() {
    let vectors = random_unit_vectors(400, 16, 11);
    let idx: HnswIndex<usize> = HnswIndex::new(16, Quantization::F32).unwrap();
    let mut rng = StdRng::seed_from_u64(12);
    let mut live: Vec<u64> = Vec::new();

    for (i, v) in vectors.iter().enumerate() {
        idx.insert(v, None, i as u64, i, 64).unwrap();
        live.push(i as u64);
        // Periodically remove a random live node.
        if i % 7 == 3 {
            let victim = live.remove(rng.gen_range(0..live.len()));
            assert!(idx.delete(victim));
        }
        if i % 100 == 99 {
            assert_valid(&idx);
        }
    }
    assert_eq!(idx.len(), live.len());
    assert_valid(&idx);

    // Deleted ids are gone; survivors are all searchable.
    let slot = idx.acquire_read_slot();
    for &id in &live {
        assert!(idx.contains(id));
    }
    let hits = idx.search(&vectors[0], 10, &slot, None).unwrap();
    assert!(!hits.is_empty());
    for hit in &hits {
        assert!(live.contains(&hit.id), "search returned a deleted node");
    }
}

#[test]
fn mass_deletion_leaves_a_searchable_graph() {
    let vectors = random_unit_vectors(1000, 16, 21);
    let idx = build(&vectors, Quantization::F32, 100, 100);
    assert_valid(&idx);

    // Remove 95% in a non-contiguous order.
    let total = idx.len();
    let keep_target = total / 20;
    let mut id: u64 = 0;
    while idx.len() > keep_target {
        if id % 19 != 7 {
            idx.delete(id % total as u64);
        }
        id += 1;
    }

    assert_valid(&idx);
    assert!(idx.len() <= keep_target);

    let slot = idx.acquire_read_slot();
    let hits = idx.search(&vectors[7], 10, &slot, None).unwrap();
    assert!(!hits.is_empty(), "graph must stay searchable after mass delete");

    let recall = idx.test_graph_recall(50, 10);
    assert!((0.0..=1.0).contains(&recall));
}

#[test]
fn recall_thresholds_per_quantization() {
    let vectors = random_unit_vectors(800, 24, 31);

    let f32_recall = build(&vectors, Quantization::F32, 200, 200).test_graph_recall(60, 10);
    assert!(
        f32_recall >= 0.95,
        "fp32 recall@10 below threshold: {f32_recall}"
    );

    let q8_recall = build(&vectors, Quantization::Q8, 200, 200).test_graph_recall(60, 10);
    assert!(q8_recall >= 0.85, "q8 recall@10 below threshold: {q8_recall}");

    // Binary quantization is far coarser; it only has to complete and
    // stay within bounds, and not beat the exact format.
    let bin_recall = build(&vectors, Quantization::Bin, 200, 200).test_graph_recall(60, 10);
    assert!((0.0..=1.0).contains(&bin_recall));
    assert!(
        f32_recall + 0.05 >= q8_recall,
        "fp32 recall {f32_recall} should not trail q8 recall {q8_recall}"
    );
}

#[test]
fn concurrent_writers_and_readers() {
    let dim = 12;
    let writers = 4;
    let per_writer = 150;
    let vectors = random_unit_vectors(writers * per_writer, dim, 41);
    let idx: HnswIndex<usize> = HnswIndex::new(dim, Quantization::F32).unwrap();

    std::thread::scope(|scope| {
        for w in 0..writers {
            let idx = &idx;
            let vectors = &vectors;
            scope.spawn(move || {
                for i in 0..per_writer {
                    let n = w * per_writer + i;
                    let id = n as u64;
                    // Optimistic first; fall back to the locked insert on
                    // conflict, like the production write path.
                    let prep = idx
                        .prepare_insert(&vectors[n], None, id, n, 64)
                        .expect("valid vector");
                    if let Err(prep) = idx.try_commit_insert(prep) {
                        let value = prep.into_value();
                        idx.insert(&vectors[n], None, id, value, 64).unwrap();
                    }
                }
            });
        }

        for r in 0..4usize {
            let idx = &idx;
            let vectors = &vectors;
            scope.spawn(move || {
                for i in 0..200 {
                    let q = &vectors[(r * 37 + i * 13) % vectors.len()];
                    let slot = idx.acquire_read_slot();
                    let hits = idx.search(q, 10, &slot, None).unwrap();
                    assert!(hits.len() <= 10);
                    for pair in hits.windows(2) {
                        assert!(pair[0].distance <= pair[1].distance);
                    }
                }
            });
        }
    });

    assert_eq!(idx.len(), writers * per_writer);
    let check = idx.validate_graph();
    assert!(check.reciprocal);
    assert_eq!(check.connected_nodes, idx.len() as u64);
}

#[test]
fn concurrent_deleters_and_readers() {
    let dim = 12;
    let vectors = random_unit_vectors(400, dim, 51);
    let idx = build(&vectors, Quantization::F32, 64, 50);

    std::thread::scope(|scope| {
        let idx = &idx;
        let vectors = &vectors;
        scope.spawn(move || {
            // Delete every third node while readers run.
            for id in (0..400u64).step_by(3) {
                idx.delete(id);
            }
        });
        for r in 0..3usize {
            scope.spawn(move || {
                for i in 0..150 {
                    let q = &vectors[(r * 29 + i * 7) % vectors.len()];
                    let slot = idx.acquire_read_slot();
                    let hits = idx.search(q, 5, &slot, None).unwrap();
                    // Results must always be live at the time of the search.
                    assert!(hits.len() <= 5);
                }
            });
        }
    });

    assert_valid(&idx);
    let slot = idx.acquire_read_slot();
    let hits = idx.search(&vectors[1], 10, &slot, None).unwrap();
    assert!(hits.iter().all(|h| h.id % 3 != 0));
}

#[test]
fn read_slot_pins_retired_storage() {
    let vectors = random_unit_vectors(50, 8, 61);
    let idx = build(&vectors, Quantization::F32, 64, 50);

    // A reader registered before the deletes keeps the storage pinned; the
    // index keeps working either way, which is all the public API exposes.
    let pin = idx.acquire_read_slot();
    for id in 0..25u64 {
        idx.delete(id);
    }
    assert_eq!(idx.len(), 25);
    drop(pin);

    // New writes proceed normally after the pin is gone and reuse is legal.
    idx.insert(&vectors[0], None, 1000, 0, 64).unwrap();
    assert_valid_after_reinsert(&idx);
}

fn assert_valid_after_reinsert(idx: &HnswIndex<usize>) {
    let check = idx.validate_graph();
    assert!(check.reciprocal);
    assert_eq!(check.connected_nodes, idx.len() as u64);
}
