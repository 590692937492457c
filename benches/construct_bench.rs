use criterion::{black_box, criterion_group, criterion_main, Criterion};
use shareptr::{Pool, Shared};

static POOL: Pool = Pool::new();

fn bench_inline(c: &mut Criterion) {
    c.bench_function("inline", |b| {
        b.iter(|| {
            let s = Shared::new(black_box(42_u64));
            let t = s.clone();
            black_box(*t)
        })
    });
}

fn bench_inline_pooled(c: &mut Criterion) {
    c.bench_function("inline_pooled", |b| {
        b.iter(|| {
            let s = Shared::new_in(black_box(42_u64), &POOL);
            let t = s.clone();
            black_box(*t)
        })
    });
}

fn bench_external(c: &mut Criterion) {
    c.bench_function("external", |b| {
        b.iter(|| {
            let s = Shared::from_box(Box::new(black_box(42_u64)));
            let t = s.clone();
            black_box(*t)
        })
    });
}

fn bench_lock(c: &mut Criterion) {
    let s = Shared::new(42_u64);
    let w = s.downgrade();
    c.bench_function("lock", |b| b.iter(|| black_box(*w.lock())));
}

criterion_group!(
    benches,
    bench_inline,
    bench_inline_pooled,
    bench_external,
    bench_lock
);
criterion_main!(benches);
