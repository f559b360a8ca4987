use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use sing_geoip::{BuildOptions, Database, LoadOptions, Prefix, Trie};
use std::hint::black_box;
use std::net::{IpAddr, Ipv4Addr};

const CODES: [&str; 8] = ["cn", "us", "jp", "de", "fr", "gb", "ru", "private"];

/// Deterministic /16-/24 networks spread over the IPv4 space
fn networks(count: usize) -> Vec<(Prefix, &'static str)> {
    let mut state = 0x9E37_79B9u32;
    (0..count)
        .map(|i| {
            // xorshift32
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            let len = 16 + (state % 9) as u8;
            let prefix = Prefix::from_ip(IpAddr::V4(Ipv4Addr::from(state)), len).unwrap();
            (prefix, CODES[i % CODES.len()])
        })
        .collect()
}

fn build(entries: &[(Prefix, &'static str)]) -> Trie {
    let mut trie = Trie::new(BuildOptions::new(CODES).with_build_epoch(0));
    for (prefix, code) in entries {
        trie.insert(*prefix, *code);
    }
    trie
}

fn bench_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("insert");

    for count in [1_000, 10_000, 100_000] {
        let entries = networks(count);
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &entries, |b, entries| {
            b.iter(|| black_box(build(entries)));
        });
    }

    group.finish();
}

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");

    for count in [1_000, 10_000, 100_000] {
        let mut trie = build(&networks(count));
        trie.compact();
        group.throughput(Throughput::Elements(trie.fork_count() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &trie, |b, trie| {
            b.iter(|| black_box(trie.to_bytes().unwrap()));
        });
    }

    group.finish();
}

fn bench_load(c: &mut Criterion) {
    let mut group = c.benchmark_group("load");

    for count in [1_000, 10_000, 100_000] {
        let bytes = build(&networks(count)).to_bytes().unwrap();
        group.throughput(Throughput::Bytes(bytes.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &bytes, |b, bytes| {
            b.iter(|| black_box(Trie::load(bytes, LoadOptions::default()).unwrap()));
        });
    }

    group.finish();
}

fn bench_lookup(c: &mut Criterion) {
    let entries = networks(100_000);
    let db = Database::from_bytes(build(&entries).to_bytes().unwrap()).unwrap();
    let probes: Vec<IpAddr> = entries
        .iter()
        .map(|(prefix, _)| prefix.address().to_ip())
        .collect();

    let mut group = c.benchmark_group("lookup");
    group.throughput(Throughput::Elements(probes.len() as u64));
    group.bench_function("database_100k", |b| {
        b.iter(|| {
            for addr in &probes {
                black_box(db.lookup(*addr).unwrap());
            }
        });
    });
    group.finish();
}

criterion_group!(benches, bench_insert, bench_encode, bench_load, bench_lookup);
criterion_main!(benches);
