//! Performance benchmarks for flattening and token decoding.
//!
//! Run with: `cargo bench --bench flatten`
//!
//! ## Performance Targets
//!
//! | Operation | Target | Notes |
//! |-----------|--------|-------|
//! | Flatten 1k posts | <1ms | Raw store |
//! | Flatten through manager | ~raw store | One read lock per walk |
//! | Token decode | <10µs | HMAC seal check |
//! | Manager contention | Linear scaling | Concurrent readers |

use criterion::{
    black_box, criterion_group, criterion_main,
    BenchmarkId, Criterion, Throughput,
};
use std::sync::Arc;
use std::thread;

use content_graph::{
    CollapseStates, ContentManager, ContentStore, Flattener, Link, LoaderKind, OpaqueCodec,
    PostBody, PostContent, PostData, PostLink, PostNode, ReadResult, Replies,
};

/// Build a tree with `fanout` replies per post, `depth` levels deep.
fn make_tree(fanout: usize, depth: usize) -> (ContentStore, PostLink) {
    fn fill(store: &mut ContentStore, name: String, fanout: usize, depth: usize) -> PostLink {
        let replies = if depth == 0 {
            Vec::new()
        } else {
            (0..fanout)
                .map(|i| fill(store, format!("{}.{}", name, i), fanout, depth - 1))
                .collect()
        };
        let link = Link::named(name.clone());
        let node = PostNode::Post(PostData {
            url: None,
            client_id: "bench".to_string(),
            parent: None,
            replies: Some(Replies::of(replies)),
            content: PostContent::Post(PostBody {
                body: Some(name),
                ..PostBody::default()
            }),
        });
        store.write(&link, ReadResult::Data(node));
        link
    }

    let mut store = ContentStore::new();
    let root = fill(&mut store, "p".to_string(), fanout, depth);
    (store, root)
}

/// Benchmark flattening a raw store.
fn bench_flatten_store(c: &mut Criterion) {
    let flattener = Flattener::default();
    let collapse = CollapseStates::new();

    let mut group = c.benchmark_group("flatten_store");

    for (fanout, depth) in [(2, 4), (4, 4), (10, 3)] {
        let (store, root) = make_tree(fanout, depth);

        group.throughput(Throughput::Elements(store.len() as u64));
        group.bench_with_input(
            BenchmarkId::new("posts", store.len()),
            &store,
            |b, store| {
                b.iter(|| {
                    let items = flattener.flatten(&root, black_box(store), &collapse).unwrap();
                    assert!(!items.is_empty());
                    items
                })
            },
        );
    }

    group.finish();
}

/// Benchmark flattening through the content manager.
fn bench_flatten_manager(c: &mut Criterion) {
    let flattener = Flattener::default();
    let collapse = CollapseStates::new();
    let (store, root) = make_tree(10, 3);
    let manager = ContentManager::default();
    manager.set_data(store);

    c.bench_function("flatten_manager", |b| {
        b.iter(|| {
            let view = manager.read_view();
            flattener.flatten(black_box(&root), &view, &collapse).unwrap()
        })
    });
}

/// Benchmark decoding an attached and a detached token.
fn bench_token_decode(c: &mut Criterion) {
    let codec: OpaqueCodec<String, LoaderKind> = OpaqueCodec::new();
    let attached = codec.encode(&"fill_replies_of:thread:42".to_string()).unwrap();
    let json = serde_json::to_string(&attached).unwrap();
    let detached = serde_json::from_str(&json).unwrap();

    let mut group = c.benchmark_group("token_decode");
    group.bench_function("attached", |b| b.iter(|| codec.decode(black_box(&attached)).unwrap()));
    group.bench_function("detached", |b| b.iter(|| codec.decode(black_box(&detached)).unwrap()));
    group.finish();
}

/// Benchmark concurrent readers flattening while the manager is shared.
fn bench_manager_contention(c: &mut Criterion) {
    let mut group = c.benchmark_group("manager_contention");

    for num_threads in [1, 2, 4, 8] {
        let (store, root) = make_tree(4, 4);
        let manager = Arc::new(ContentManager::default());
        manager.set_data(store);

        group.bench_with_input(
            BenchmarkId::new("threads", num_threads),
            &num_threads,
            |b, &num_threads| {
                b.iter(|| {
                    let handles: Vec<_> = (0..num_threads)
                        .map(|_| {
                            let manager = Arc::clone(&manager);
                            let root = root.clone();
                            thread::spawn(move || {
                                let view = manager.read_view();
                                Flattener::default()
                                    .flatten(&root, &view, &CollapseStates::new())
                                    .map(|items| items.len())
                                    .unwrap_or(0)
                            })
                        })
                        .collect();

                    for handle in handles {
                        black_box(handle.join().unwrap());
                    }
                })
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_flatten_store,
    bench_flatten_manager,
    bench_token_decode,
    bench_manager_contention,
);
criterion_main!(benches);
