//! End-to-end filtered search: compiled programs applied during KNN.

use vsim_core::{HnswIndex, Program, Quantization};

/// Deterministic point on the unit circle embedded in 4 dimensions.
fn vec_for(i: u64) -> Vec<f32> {
    let angle = i as f32 * 0.37;
    vec![angle.cos(), angle.sin(), 0.3, 0.1]
}

fn build_with_years(n: u64) -> HnswIndex<String> {
    let idx = HnswIndex::new(4, Quantization::F32).unwrap();
    for i in 0..n {
        let genre = if i % 3 == 0 { "jazz" } else { "rock" };
        let attrs = format!(r#"{{"year": {}, "genre": "{}"}}"#, 1900 + i, genre);
        idx.insert(&vec_for(i), Some(&attrs), i, format!("item-{i}"), 100)
            .unwrap();
    }
    idx
}

#[test]
fn filter_restricts_results_to_matching_attributes() {
    let idx = build_with_years(120);
    let program = Program::compile(".year > 1950 and .genre == 'jazz'").unwrap();

    let slot = idx.acquire_read_slot();
    let hits = idx
        .search(&vec_for(60), 20, &slot, Some(&program))
        .unwrap();

    assert!(!hits.is_empty());
    for hit in &hits {
        let attrs = idx.attributes(hit.id).unwrap();
        assert!(
            program.matches(&attrs),
            "node {} does not satisfy the filter: {attrs}",
            hit.id
        );
    }
    // Distances are sorted ascending.
    for pair in hits.windows(2) {
        assert!(pair[0].distance <= pair[1].distance);
    }
}

#[test]
fn filter_matching_nothing_returns_empty() {
    let idx = build_with_years(60);
    let program = Program::compile(".year > 99999").unwrap();
    let slot = idx.acquire_read_slot();
    let hits = idx.search(&vec_for(5), 10, &slot, Some(&program)).unwrap();
    assert!(hits.is_empty());
}

#[test]
fn nodes_without_attributes_never_match() {
    let idx: HnswIndex<&str> = HnswIndex::new(4, Quantization::F32).unwrap();
    idx.insert(&vec_for(0), Some(r#"{"year": 2000}"#), 0, "with", 100)
        .unwrap();
    idx.insert(&vec_for(1), None, 1, "without", 100).unwrap();
    // A constant-true program still skips attribute-less nodes.
    let program = Program::compile("1").unwrap();

    let slot = idx.acquire_read_slot();
    let hits = idx.search(&vec_for(0), 10, &slot, Some(&program)).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, 0);
}

#[test]
fn invalid_json_attributes_are_silently_skipped() {
    let idx: HnswIndex<&str> = HnswIndex::new(4, Quantization::F32).unwrap();
    idx.insert(&vec_for(0), Some("{broken"), 0, "bad", 100)
        .unwrap();
    idx.insert(&vec_for(1), Some(r#"{"ok": 1}"#), 1, "good", 100)
        .unwrap();
    let program = Program::compile("1").unwrap();

    let slot = idx.acquire_read_slot();
    let hits = idx.search(&vec_for(0), 10, &slot, Some(&program)).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, 1);
}

#[test]
fn filter_budget_bounds_predicate_evaluations() {
    let idx = build_with_years(200);
    // Nothing matches; with a tiny explicit budget the search must still
    // terminate quickly and return nothing.
    let program = Program::compile(".year < 0").unwrap();
    let slot = idx.acquire_read_slot();
    let hits = idx
        .search_ef(&vec_for(3), 10, 50, Some(5), &slot, Some(&program))
        .unwrap();
    assert!(hits.is_empty());
}

#[test]
fn unfiltered_search_sees_all_nodes() {
    let idx = build_with_years(50);
    let slot = idx.acquire_read_slot();
    let hits = idx.search(&vec_for(7), 5, &slot, None).unwrap();
    assert_eq!(hits.len(), 5);
    assert_eq!(hits[0].id, 7, "the query vector's own node comes first");
}

#[test]
fn filtered_search_on_quantized_index() {
    let idx = {
        let idx = HnswIndex::new(4, Quantization::Q8).unwrap();
        for i in 0..80u64 {
            let attrs = format!(r#"{{"even": {}}}"#, if i % 2 == 0 { 1 } else { 0 });
            idx.insert(&vec_for(i), Some(&attrs), i, i, 100).unwrap();
        }
        idx
    };
    let program = Program::compile(".even == 1").unwrap();
    let slot = idx.acquire_read_slot();
    let hits = idx.search(&vec_for(10), 10, &slot, Some(&program)).unwrap();
    assert!(!hits.is_empty());
    for hit in &hits {
        assert_eq!(hit.id % 2, 0, "filter admitted an odd node");
    }
}
