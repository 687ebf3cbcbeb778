use criterion::{Criterion, criterion_group, criterion_main};
use rag_engine::embeddings::{CosineScorer, HashingProvider, SimilarityScorer, content_delta};
use rag_engine::experiment::user_bucket;
use rag_engine::retrieval::assemble_context;
use std::hint::black_box;

const DIMENSIONS: usize = 768;

fn sample_post(index: usize) -> String {
    format!(
        "Post {}: Our iced cold brew is back for the summer season, now with oat milk \
         and a brand-new caramel drizzle option for every size. Visit us downtown.",
        index
    )
}

pub fn criterion_benchmark(c: &mut Criterion) {
    let posts: Vec<String> = (0..200).map(sample_post).collect();
    let vectors: Vec<Vec<f32>> = posts
        .iter()
        .map(|post| HashingProvider::project(post, DIMENSIONS))
        .collect();
    let query = HashingProvider::project("summer cold brew with oat milk", DIMENSIONS);
    let scorer = CosineScorer;

    c.bench_function("score 200 candidates", |b| {
        b.iter(|| {
            vectors
                .iter()
                .filter_map(|vector| scorer.score(black_box(&query), vector))
                .filter(|score| *score >= 0.7)
                .count()
        })
    });

    let texts: Vec<&str> = posts.iter().map(String::as_str).collect();
    c.bench_function("assemble context", |b| {
        b.iter(|| assemble_context(black_box(&texts[..10]), black_box(2000)))
    });

    let long_old = posts.concat();
    let long_new = format!("{} Closed on holidays.", long_old);
    c.bench_function("content delta short", |b| {
        b.iter(|| content_delta(black_box(&posts[0]), black_box(&posts[1])))
    });
    c.bench_function("content delta long", |b| {
        b.iter(|| content_delta(black_box(&long_old), black_box(&long_new)))
    });

    c.bench_function("user bucket", |b| {
        b.iter(|| user_bucket(black_box("8f14e45fceea167a5a36dedd4bea2543")))
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
