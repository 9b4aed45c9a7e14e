//! Benchmarks for command framing and the master/satellite exchange

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use soilnet::pump::{MemorySwitch, RecordingSleeper};
use soilnet::protocol;
use soilnet::{
    Command, FixedSoilSensor, FlowRatePump, Link, Master, MemoryTransport, PumpConfig, Satellite,
    SatelliteConfig,
};
use std::time::Duration;

fn generate_commands(count: usize) -> Vec<Command> {
    (0..count)
        .map(|i| match i % 4 {
            0 => Command::ping(),
            1 => Command::get_temp(),
            2 => Command::get_humidity(),
            _ => Command::pump_control(100 + i as u32),
        })
        .collect()
}

fn bench_encoding(c: &mut Criterion) {
    let mut group = c.benchmark_group("encoding");
    let commands = generate_commands(1000);

    group.throughput(Throughput::Elements(1000));
    group.bench_function("encode_1000_commands", |b| {
        b.iter(|| {
            for command in &commands {
                black_box(command.encode());
            }
        })
    });

    group.finish();
}

fn bench_decoding(c: &mut Criterion) {
    let mut group = c.benchmark_group("decoding");
    let frames: Vec<_> = generate_commands(1000).iter().map(Command::encode).collect();

    group.throughput(Throughput::Elements(1000));
    group.bench_function("decode_1000_commands", |b| {
        b.iter(|| {
            for frame in &frames {
                black_box(Command::decode(frame).ok());
            }
        })
    });

    group.bench_function("decode_temperature_reply", |b| {
        b.iter(|| black_box(protocol::decode_temperature(black_box(b"21.46"))))
    });

    group.finish();
}

fn bench_dispatch(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatch");
    let frames: Vec<_> = generate_commands(100)
        .iter()
        .filter(|c| c.verb() != soilnet::Verb::PumpControl)
        .map(Command::encode)
        .collect();

    group.throughput(Throughput::Elements(frames.len() as u64));
    group.bench_function("satellite_handle_frame", |b| {
        b.iter(|| {
            let pump = FlowRatePump::new(
                MemorySwitch::default(),
                RecordingSleeper::default(),
                PumpConfig::default(),
            )
            .unwrap();
            let mut satellite = Satellite::new(
                Link::new(MemoryTransport::new()),
                FixedSoilSensor::new(21.0, 600),
                pump,
                SatelliteConfig::with_reply_delay(Duration::ZERO),
            )
            .unwrap();
            for frame in &frames {
                black_box(satellite.handle_frame(frame).unwrap());
            }
        })
    });

    group.finish();
}

fn bench_master_fallback(c: &mut Criterion) {
    let mut group = c.benchmark_group("master");

    group.bench_function("read_temperature_exhausted", |b| {
        b.iter(|| {
            // Empty script: every attempt times out immediately
            let mut master = Master::new(Link::new(MemoryTransport::new()));
            black_box(master.read_temperature().unwrap())
        })
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_encoding,
    bench_decoding,
    bench_dispatch,
    bench_master_fallback,
);

criterion_main!(benches);
