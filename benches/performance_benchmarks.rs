use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use pelotrs::database::{CompressedSamples, RaceStore};
use pelotrs::models::{RaceRecord, RiderId, RiderSeries};
use pelotrs::session::{PlaybackCommand, PlaybackSession};
use pelotrs::{EngineConfig, GroupDetector, StandingsProjector};

/// Performance benchmarks for the replay engine
///
/// Projection and group detection run once per rendered frame, so they
/// must stay well under a frame budget for realistic field sizes.

/// Field of `riders` spread over a few km/h, one hour of 1 Hz samples
fn create_field(riders: usize) -> RaceRecord {
    let samples = 3600;
    let field = (0..riders)
        .map(|i| {
            let km_per_second = (36.0 + (i % 37) as f64 * 0.15) / 3600.0;
            let distance = (0..samples).map(|s| s as f64 * km_per_second).collect();
            let power = (0..samples).map(|s| 180.0 + ((s + i) % 90) as f64).collect();
            RiderSeries::new(RiderId(i as u64 + 1), format!("Rider {}", i + 1), i as u32 + 1)
                .with_distance(distance)
                .with_power(power)
        })
        .collect();
    RaceRecord::new("bench", "Benchmark Race").with_riders(field)
}

fn bench_projection(c: &mut Criterion) {
    let mut group = c.benchmark_group("Standings Projection");
    let projector = StandingsProjector::new(EngineConfig::default());

    for &size in &[10, 100, 300] {
        let race = create_field(size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("project", size), &race, |b, race| {
            b.iter(|| projector.project(black_box(&race.riders), black_box(1800.0)));
        });
    }

    group.finish();
}

fn bench_group_detection(c: &mut Criterion) {
    let mut group = c.benchmark_group("Group Detection");
    let projector = StandingsProjector::default();
    let detector = GroupDetector::default();

    for &size in &[10, 100, 300] {
        let race = create_field(size);
        let snapshot = projector.project(&race.riders, 1800.0);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("detect", size), &snapshot, |b, snapshot| {
            b.iter(|| detector.detect(black_box(snapshot), Some(RiderId(1))));
        });
    }

    group.finish();
}

fn bench_full_frame(c: &mut Criterion) {
    let race = create_field(300);
    let mut session = PlaybackSession::new(&race, EngineConfig::default());
    session.apply(PlaybackCommand::Watch(RiderId(150)));
    session.apply(PlaybackCommand::CompareGroup(0));
    session.apply(PlaybackCommand::Scrub(2400.0));

    c.bench_function("view_300_riders", |b| {
        b.iter(|| session.view(black_box(&race)));
    });
}

fn bench_storage(c: &mut Criterion) {
    let race = create_field(50);

    c.bench_function("compress_rider_samples", |b| {
        b.iter(|| CompressedSamples::compress(black_box(&race.riders[0])));
    });

    c.bench_function("save_and_load_50_riders", |b| {
        b.iter(|| {
            let mut store = RaceStore::open_in_memory().unwrap();
            store.save_race(&race).unwrap();
            store.load_race("bench").unwrap()
        });
    });
}

criterion_group!(
    benches,
    bench_projection,
    bench_group_detection,
    bench_full_frame,
    bench_storage
);
criterion_main!(benches);
