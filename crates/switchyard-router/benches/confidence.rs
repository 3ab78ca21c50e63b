//! Benchmarks for deterministic routing confidence.
//!
//! Scoring runs on every classified query, so it should stay well under a
//! tenth of a millisecond against the built-in catalog.

use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use switchyard_core::catalog::CatalogConfig;
use switchyard_core::types::HandlerId;
use switchyard_router::{score, RoutingTables};

/// Realistic traveller questions paired with a plausible chosen handler.
fn generate_queries() -> Vec<(String, HandlerId)> {
    let templates = [
        ("When is the next Circle line train at {}?", "CIRCLE"),
        ("next train at {}", "DISTRICT"),
        ("trains to {} via king's cross", "CIRCLE"),
        ("how do I get from {} to Oxford Circus", "CENTRAL"),
        ("is there step free access at {}", "JUBILEE"),
    ];
    let places = [
        "Victoria",
        "Westminster",
        "Bank",
        "Baker Street",
        "Paddington",
        "Embankment",
        "Aldgate",
        "Brixton",
    ];

    (0..200)
        .map(|i| {
            let (template, handler) = templates[i % templates.len()];
            let place = places[i % places.len()];
            (template.replace("{}", place), HandlerId::new(handler))
        })
        .collect()
}

fn bench_score(c: &mut Criterion) {
    let tables = RoutingTables::compile(&CatalogConfig::default()).expect("default catalog compiles");
    let queries = generate_queries();

    let mut group = c.benchmark_group("confidence");
    group.sample_size(200);
    group.measurement_time(Duration::from_secs(5));

    group.bench_function("score_single_query", |b| {
        let mut idx = 0usize;
        b.iter(|| {
            let (query, handler) = &queries[idx % queries.len()];
            idx += 1;
            score(&tables, black_box(query), handler)
        });
    });

    group.bench_function("explicit_mentions", |b| {
        b.iter(|| tables.explicit_mentions(black_box("Is the Hammersmith and City running?")));
    });

    group.bench_function("entities_in_journey", |b| {
        b.iter(|| tables.entities_in(black_box("from Walthamstow Central to Elephant & Castle")));
    });

    group.finish();
}

/// p95 of single scoring calls must stay under 100us.
fn bench_score_latency_assertion(c: &mut Criterion) {
    let tables = RoutingTables::compile(&CatalogConfig::default()).expect("default catalog compiles");
    let queries = generate_queries();
    let target = Duration::from_micros(100);

    let mut group = c.benchmark_group("confidence_latency");
    group.sample_size(100);
    group.bench_function("score_batch_200", |b| {
        b.iter(|| {
            queries
                .iter()
                .map(|(q, h)| score(&tables, q, h).value)
                .sum::<f64>()
        });
    });
    group.finish();

    let mut times = Vec::with_capacity(queries.len());
    for (query, handler) in &queries {
        let start = std::time::Instant::now();
        let _ = score(&tables, query, handler);
        times.push(start.elapsed());
    }
    times.sort();
    let p95 = times[times.len() * 95 / 100];
    let median = times[times.len() / 2];

    eprintln!("\n=== Confidence scoring latency ({} queries) ===", queries.len());
    eprintln!("Median:  {:?}", median);
    eprintln!("p95:     {:?} (target: {:?})", p95, target);

    assert!(p95 < target, "Confidence scoring p95 {:?} exceeds target {:?}", p95, target);
}

criterion_group!(benches, bench_score, bench_score_latency_assertion);
criterion_main!(benches);
