use async_trait::async_trait;
use core::hint::black_box;
use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use rootsync::{
    AnnotationService, BatchResolver, IDENTITY_BATCH_SIZE, IdentityPolicy, LeafId, LeafLayer,
    LookupErrorKind, LookupOutcome, NmCoord, Pipeline, RecordParser, Resolution, ResultAssembler,
    RootId, ServiceError,
};
use std::{collections::HashMap, sync::Arc};
use tokio::runtime::{Builder, Runtime};

// Records per benchmark iteration.
const TOTAL_RECORDS: usize = 20_000;

/// Answers every call immediately, so only pipeline overhead is measured.
struct InstantService;

#[async_trait]
impl AnnotationService for InstantService {
    async fn lookup_one(
        &self,
        id: RootId,
        _layer: LeafLayer,
    ) -> Result<Option<LeafId>, LookupErrorKind> {
        Ok(Some(LeafId::new(id.to_raw() ^ 0xFFFF)))
    }

    async fn bulk_resolve(&self, keys: &[LeafId]) -> Result<HashMap<LeafId, RootId>, ServiceError> {
        Ok(keys
            .iter()
            .map(|k| (*k, RootId::new(k.to_raw() ^ 0xFFFF)))
            .collect())
    }

    async fn bulk_coordinate_fetch(
        &self,
        keys: &[LeafId],
    ) -> Result<HashMap<LeafId, NmCoord>, ServiceError> {
        Ok(keys
            .iter()
            .map(|k| (*k, NmCoord::new(1.0, 2.0, 3.0)))
            .collect())
    }

    async fn resolution_vector(&self) -> Result<Resolution, ServiceError> {
        Ok(Resolution::new(4.0, 4.0, 40.0).expect("valid resolution"))
    }
}

fn input_lines() -> Vec<String> {
    (0..TOTAL_RECORDS as u64)
        .map(|i| {
            let id = 720_575_940_000_000_000 + i;
            if i % 2 == 0 {
                format!("neuron_{i} → {id}")
            } else {
                id.to_string()
            }
        })
        .collect()
}

fn outcomes() -> Vec<LookupOutcome> {
    RecordParser::identity()
        .parse_lines(input_lines())
        .records
        .into_iter()
        .map(|record| {
            let key = LeafId::new(record.id.to_raw() ^ 0xFFFF);
            LookupOutcome::found(record, Some(key))
        })
        .collect()
}

fn runtime() -> Runtime {
    Builder::new_multi_thread()
        .enable_all()
        .worker_threads(4)
        .build()
        .unwrap()
}

fn bench_parse(c: &mut Criterion) {
    let lines = input_lines();
    let mut group = c.benchmark_group("parse");
    group.throughput(Throughput::Elements(TOTAL_RECORDS as u64));

    group.bench_function(format!("elems/{TOTAL_RECORDS}"), |b| {
        b.iter(|| black_box(RecordParser::identity().parse_lines(lines.iter())));
    });

    group.finish();
}

fn bench_partition(c: &mut Criterion) {
    let outcomes = outcomes();
    let resolver = BatchResolver::new(IDENTITY_BATCH_SIZE).unwrap();
    let mut group = c.benchmark_group("partition");
    group.throughput(Throughput::Elements(TOTAL_RECORDS as u64));

    group.bench_function(format!("elems/{TOTAL_RECORDS}"), |b| {
        b.iter(|| black_box(resolver.partition(&outcomes)));
    });

    group.finish();
}

fn bench_resolve_and_assemble(c: &mut Criterion) {
    let outcomes = outcomes();
    let resolver = BatchResolver::new(IDENTITY_BATCH_SIZE).unwrap();
    let rt = runtime();
    let mut group = c.benchmark_group("resolve_assemble");
    group.throughput(Throughput::Elements(TOTAL_RECORDS as u64));

    group.bench_function(format!("elems/{TOTAL_RECORDS}"), |b| {
        let outcomes = &outcomes;
        b.to_async(&rt).iter(|| async move {
            let resolutions = resolver
                .resolve(outcomes, |keys| async move {
                    InstantService.bulk_resolve(&keys).await
                })
                .await;
            let assembled =
                ResultAssembler::new(IdentityPolicy).assemble(outcomes.clone(), &resolutions);
            black_box(assembled)
        });
    });

    group.finish();
}

fn bench_pipeline(c: &mut Criterion) {
    let rt = runtime();
    let input = RecordParser::identity().parse_lines(input_lines());
    let mut group = c.benchmark_group("pipeline");
    group.throughput(Throughput::Elements(TOTAL_RECORDS as u64));

    for workers in [1, 20, 64] {
        let pipeline = {
            let _guard = rt.enter();
            Pipeline::new(Arc::new(InstantService), workers, IDENTITY_BATCH_SIZE).unwrap()
        };

        group.bench_function(format!("workers/{workers}"), |b| {
            let pipeline = &pipeline;
            let input = &input;
            b.to_async(&rt)
                .iter(|| async move { black_box(pipeline.validate(input.clone()).await) });
        });

        rt.block_on(pipeline.shutdown()).unwrap();
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_parse,
    bench_partition,
    bench_resolve_and_assemble,
    bench_pipeline,
);
criterion_main!(benches);
