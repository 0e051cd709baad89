//! word2vec benchmark harness for the vsim index.
//!
//! Loads `word2vec.bin`, builds an index with the chosen quantization, and
//! runs search / recall / mass-deletion exercises. `--threads N` switches to
//! the concurrent harness: N writer threads using the optimistic insert API
//! followed by N reader threads hammering search.

mod w2v;

use clap::Parser;
use rand::Rng;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Instant;
use tracing_subscriber::EnvFilter;
use vsim_core::{HnswIndex, Quantization};
use w2v::{W2vFile, W2V_DIM};

#[derive(Parser)]
#[command(name = "w2v-demo", about = "HNSW word2vec benchmark harness")]
struct Args {
    /// Store vectors with signed 8-bit quantization
    #[arg(long)]
    quant: bool,

    /// Store vectors as binary sign bitmaps
    #[arg(long)]
    bin: bool,

    /// Number of writer/reader threads (0 = single-threaded harness)
    #[arg(long, default_value_t = 0)]
    threads: usize,

    /// Maximum number of words to load
    #[arg(long, default_value_t = 20_000)]
    numele: u64,

    /// Run the 95% mass-deletion stress test (single-threaded mode)
    #[arg(long)]
    mass_del: bool,

    /// Run the recall self-test (single-threaded mode)
    #[arg(long)]
    recall: bool,

    /// Path to the word2vec binary file
    #[arg(long, default_value = "word2vec.bin")]
    input: PathBuf,
}

/// Build effort used for every insert in the harness.
const EF_CONSTRUCTION: usize = 200;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(
                "w2v_demo=info"
                    .parse()
                    .expect("valid directive literal"),
            ),
        )
        .init();

    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            use clap::error::ErrorKind;
            let code = match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
                _ => 1,
            };
            let _ = e.print();
            std::process::exit(code);
        }
    };

    let quant = if args.bin {
        Quantization::Bin
    } else if args.quant {
        Quantization::Q8
    } else {
        tracing::info!("no quantization selected; enable it with --quant or --bin");
        Quantization::F32
    };

    let file = match W2vFile::open(&args.input) {
        Ok(file) => file,
        Err(e) => {
            eprintln!("cannot open {}: {e}", args.input.display());
            std::process::exit(1);
        }
    };

    let index = HnswIndex::new(W2V_DIM, quant).expect("w2v dimension is valid");

    if args.threads > 0 {
        multi_thread(&index, file, args.threads, args.numele);
    } else {
        tracing::info!("single thread execution; use --threads 4 for the concurrent API");
        single_thread(&index, file, args.numele, args.mass_del, args.recall);
    }
}

fn single_thread(
    index: &HnswIndex<String>,
    mut file: W2vFile,
    numele: u64,
    mass_del: bool,
    recall: bool,
) {
    let start = Instant::now();
    let mut id: u64 = 0;
    let mut search_id: Option<u64> = None;

    while id < numele {
        let Some((word, vector)) = file.next_entry().expect("read word2vec record") else {
            break;
        };
        if word == "banana" {
            search_id = Some(id);
        }
        index
            .insert(&vector, None, id, word, EF_CONSTRUCTION)
            .expect("valid w2v vector");
        id += 1;
        if id % 10_000 == 0 {
            tracing::info!("{id} added");
        }
    }
    let elapsed = start.elapsed();
    println!(
        "{} words added ({:.0} words/sec)",
        index.len(),
        id as f64 / elapsed.as_secs_f64()
    );

    // Search benchmark around one probe word.
    let probe_id = search_id.unwrap_or(0);
    let mut query = Vec::new();
    if !index.get_node_vector(probe_id, &mut query) {
        tracing::warn!("probe node missing; nothing to search");
        return;
    }

    let searches = 10_000;
    let start = Instant::now();
    let slot = index.acquire_read_slot();
    let mut hits = Vec::new();
    for _ in 0..searches {
        hits = index.search(&query, 10, &slot, None).expect("query is valid");
    }
    let elapsed = start.elapsed();
    println!(
        "{searches} searches performed ({:.0} searches/sec), nodes found: {}",
        searches as f64 / elapsed.as_secs_f64(),
        hits.len()
    );
    for hit in &hits {
        println!(
            "id: {}, distance: {:.6}, word: {}",
            hit.id,
            hit.distance,
            index.value(hit.id).unwrap_or_default()
        );
    }
    drop(slot);

    if recall {
        println!("{}", index.stats());
        let recall = index.test_graph_recall(200, 10);
        println!("recall@10 over 200 samples: {:.3}", recall);
    }

    report_validation(index);

    if mass_del {
        let remove_perc: u64 = 95;
        println!("\nremoving {remove_perc}% of nodes...");
        let initial = index.len() as u64;
        let keep = initial * (100 - remove_perc) / 100;

        let mut rng = rand::thread_rng();
        let ids = index.live_ids();
        let mut cursor = ids.iter();
        while index.len() as u64 > keep {
            let Some(&victim) = cursor.next() else { break };
            index.delete(victim);
            // Skip a node now and then so the deleted set is not contiguous.
            if rng.gen_ratio(1, remove_perc as u32) {
                cursor.next();
            }
        }
        println!("{} nodes left", index.len());

        report_validation(index);
        let recall = index.test_graph_recall(200, 10);
        println!("post-deletion recall@10: {:.3}", recall);
    }
}

struct ThreadContext<'a> {
    index: &'a HnswIndex<String>,
    file: Mutex<W2vFile>,
    numele: u64,
    next_id: AtomicU64,
    searches_done: AtomicU64,
    search_vector: Vec<f32>,
}

fn multi_thread(index: &HnswIndex<String>, file: W2vFile, threads: usize, numele: u64) {
    let mut ctx = ThreadContext {
        index,
        file: Mutex::new(file),
        numele,
        next_id: AtomicU64::new(0),
        searches_done: AtomicU64::new(0),
        search_vector: Vec::new(),
    };

    let start = Instant::now();
    std::thread::scope(|scope| {
        for _ in 0..threads {
            scope.spawn(|| threaded_insert(&ctx));
        }
    });
    let elapsed = start.elapsed();

    let added = index.len();
    println!(
        "{added} words added ({:.0} words/sec)",
        added as f64 / elapsed.as_secs_f64()
    );

    // Search the most recently inserted word from every reader thread.
    let ids = index.live_ids();
    let Some(&last_id) = ids.first() else {
        tracing::warn!("nothing inserted; skipping search phase");
        return;
    };
    index.get_node_vector(last_id, &mut ctx.search_vector);
    println!(
        "search probe: {}",
        index.value(last_id).unwrap_or_default()
    );

    let start = Instant::now();
    std::thread::scope(|scope| {
        for _ in 0..threads {
            scope.spawn(|| threaded_search(&ctx));
        }
    });
    let elapsed = start.elapsed();
    let done = ctx.searches_done.load(Ordering::Relaxed);
    println!(
        "{done} searches performed ({:.0} searches/sec)",
        done as f64 / elapsed.as_secs_f64()
    );

    println!("{}", index.stats());
    report_validation(index);
}

fn threaded_insert(ctx: &ThreadContext<'_>) {
    loop {
        let entry = {
            let mut file = ctx.file.lock().expect("reader mutex");
            file.next_entry().expect("read word2vec record")
        };
        let Some((word, vector)) = entry else {
            return;
        };
        let id = ctx.next_id.fetch_add(1, Ordering::Relaxed);
        if id >= ctx.numele {
            return;
        }

        // Optimistic two-phase insert: the costly neighbor scan runs
        // concurrently with other readers, then commits if the graph is
        // unchanged. Conflicts fall back to the locked insert.
        let prep = ctx
            .index
            .prepare_insert(&vector, None, id, word, EF_CONSTRUCTION)
            .expect("valid w2v vector");
        if let Err(prep) = ctx.index.try_commit_insert(prep) {
            let word = prep.into_value();
            ctx.index
                .insert(&vector, None, id, word, EF_CONSTRUCTION)
                .expect("valid w2v vector");
        }

        if (id + 1) % 10_000 == 0 {
            tracing::info!("{} added", id + 1);
        }
    }
}

/// Total searches performed across all reader threads.
const SEARCH_GOAL: u64 = 1_000_000;

fn threaded_search(ctx: &ThreadContext<'_>) {
    while ctx.searches_done.fetch_add(1, Ordering::Relaxed) < SEARCH_GOAL {
        let slot = ctx.index.acquire_read_slot();
        let hits = ctx
            .index
            .search(&ctx.search_vector, 10, &slot, None)
            .expect("query is valid");
        debug_assert!(hits.len() <= 10);
    }
}

fn report_validation(index: &HnswIndex<String>) {
    let check = index.validate_graph();
    println!(
        "{} connected nodes of {}; links all reciprocal: {}",
        check.connected_nodes,
        index.len(),
        check.reciprocal
    );
}
