use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use robot_detect::generator::TickGenerator;
use robot_detect::session::SimSession;
use robot_detect::{DetectionEngine, DetectorConfig};

fn ingest_throughput(c: &mut Criterion) {
    let config = DetectorConfig::default();
    let mut engine = DetectionEngine::new(&config, TickGenerator::directory());
    let mut gen = TickGenerator::new(0.0);
    let mut ts = TickGenerator::now_ms();

    let mut group = c.benchmark_group("ingest_throughput");
    for size in [100, 500, 1000, 5000] {
        let span = TickGenerator::stress_cycle_span_ms(size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter(|| {
                let ticks = gen.generate_stress_cycle(ts, size);
                for tick in &ticks {
                    engine.process(tick, ts + span);
                }
                ts += span;
            });
        });
    }
    group.finish();
}

fn end_to_end(c: &mut Criterion) {
    let config = DetectorConfig::default();
    let mut session = SimSession::new(&config, 0.5);
    let mut ts = TickGenerator::now_ms();

    c.bench_function("session_step", |b| {
        b.iter(|| {
            ts += 100;
            session.step(ts)
        });
    });
}

criterion_group!(benches, ingest_throughput, end_to_end);
criterion_main!(benches);
