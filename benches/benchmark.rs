// Scoring and query benchmarks for staysim
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::prelude::*;
use staysim_core::{
    EmbeddingMatrix, EngineConfig, FeatureTable, Listing, MemoryListingStore, SimilarityEngine,
    SimilarityParams, SimilarityPipeline, SimilarityScorer, Vector,
};
use std::sync::Arc;

const DIM: usize = 384;

fn generate_random_vector(rng: &mut impl Rng, dim: usize) -> Vector {
    let data: Vec<f32> = (0..dim).map(|_| rng.random_range(-1.0f32..1.0f32)).collect();
    Vector::new(data).normalized()
}

fn generate_catalog(n: usize) -> Vec<Listing> {
    let mut rng = rand::rng();
    let base = generate_random_vector(&mut rng, DIM);
    (0..n)
        .map(|i| {
            // stay close to a shared direction so the similarity floor admits some pairs
            let noise = generate_random_vector(&mut rng, DIM);
            let data: Vec<f32> = base
                .as_slice()
                .iter()
                .zip(noise.as_slice())
                .map(|(b, n)| b + 0.25 * n)
                .collect();
            Listing::new(
                i as u64 + 1,
                rng.random_range(40.0..400.0),
                "Manhattan",
                format!("hood-{}", rng.random_range(0..40)),
                rng.random_range(40.55..40.90),
                rng.random_range(-74.05..-73.75),
            )
            .with_embedding(Vector::new(data).normalized())
        })
        .collect()
}

fn build_inputs(catalog: &[Listing]) -> (FeatureTable, EmbeddingMatrix) {
    let mut pool = FeatureTable::with_capacity(catalog.len());
    let mut embeddings = EmbeddingMatrix::with_capacity(DIM, catalog.len());
    for listing in catalog {
        pool.push(listing).unwrap();
        embeddings
            .push(listing.id, listing.embedding.as_ref().unwrap())
            .unwrap();
    }
    (pool, embeddings)
}

fn benchmark_score_blocks(c: &mut Criterion) {
    let mut group = c.benchmark_group("score_all");
    let catalog = generate_catalog(2000);
    let (_, embeddings) = build_inputs(&catalog);

    for block_size in [64, 256, 1024].iter() {
        group.bench_with_input(BenchmarkId::new("block", block_size), block_size, |b, &block_size| {
            let scorer = SimilarityScorer::new(block_size);
            b.iter(|| black_box(scorer.score_all(&embeddings)));
        });
    }

    group.finish();
}

fn benchmark_batch_pipeline(c: &mut Criterion) {
    let mut group = c.benchmark_group("batch_pipeline");
    group.sample_size(10);

    for size in [500, 2000].iter() {
        let catalog = generate_catalog(*size);
        let (pool, embeddings) = build_inputs(&catalog);
        let pipeline = SimilarityPipeline::new(&SimilarityParams::default(), 256);

        group.bench_with_input(BenchmarkId::new("serial", size), size, |b, _| {
            b.iter(|| black_box(pipeline.run_batch(&pool, &embeddings, false)));
        });
        group.bench_with_input(BenchmarkId::new("parallel", size), size, |b, _| {
            b.iter(|| black_box(pipeline.run_batch(&pool, &embeddings, true)));
        });
    }

    group.finish();
}

fn benchmark_online_query(c: &mut Criterion) {
    let mut group = c.benchmark_group("find_similar");
    let store = Arc::new(MemoryListingStore::from_listings(generate_catalog(5000)));
    let engine = SimilarityEngine::new(store, EngineConfig::default()).unwrap();
    let mut rng = rand::rng();

    group.bench_function("online_5000", |b| {
        b.iter(|| {
            let id = rng.random_range(1..=5000u64);
            black_box(engine.find_similar(id, 10).unwrap())
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    benchmark_score_blocks,
    benchmark_batch_pipeline,
    benchmark_online_query
);
criterion_main!(benches);
