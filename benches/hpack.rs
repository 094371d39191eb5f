use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use polynet::hpack::{Decoder, Encoder, Indexing};

const SMALL: &[(&str, &str)] = &[(":method", "GET"), (":path", "/"), (":scheme", "https"), (":authority", "example.org")];

const MEDIUM: &[(&str, &str)] = &[
    (":method", "GET"),
    (":path", "/api/v1.0/weather/forecast"),
    (":scheme", "https"),
    (":authority", "www.example.org"),
    ("accept", "*/*"),
    ("accept-encoding", "gzip,deflate,br"),
    ("accept-language", "en-US,en;q=0.5"),
    ("cache-control", "no-cache"),
    ("user-agent", "Mozilla/5.0 (X11; Linux x86_64; rv:109.0) Gecko/20100101 Firefox/109.0"),
];

const LARGE: &[(&str, &str)] = &[
    (":method", "POST"),
    (":path", "/log?format=json&hasfast=true"),
    (":scheme", "https"),
    (":authority", "play.google.com"),
    ("user-agent", "Mozilla/5.0 (X11; Linux x86_64; rv:109.0) Gecko/20100101 Firefox/109.0"),
    ("accept", "*/*"),
    ("accept-language", "en-US,en;q=0.5"),
    ("accept-encoding", "gzip, deflate, br"),
    ("referer", "https://www.google.com/"),
    ("content-type", "application/x-www-form-urlencoded;charset=utf-8"),
    ("content-length", "669"),
    ("origin", "https://www.google.com"),
    ("dnt", "1"),
    ("cookie", "1P_JAR=2023-01-24-14; AEC=xxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxx; NID=xxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxx"),
    ("sec-fetch-dest", "empty"),
    ("sec-fetch-mode", "cors"),
    ("sec-fetch-site", "same-site"),
    ("pragma", "no-cache"),
];

fn encode(c: &mut Criterion) {
    let inputs: [(&str, &[(&str, &str)]); 3] = [("small", SMALL), ("medium", MEDIUM), ("large", LARGE)];

    let mut group = c.benchmark_group("hpack-encode");
    for (label, headers) in inputs {
        let byte_len: usize = headers.iter().map(|(n, v)| n.len() + v.len()).sum();
        group.throughput(Throughput::Bytes(byte_len as u64));
        group.bench_with_input(BenchmarkId::new("encode_block", label), headers, |b, headers| {
            b.iter(|| {
                let mut enc = Encoder::new(4096);
                enc.encode_block(headers, Indexing::Without)
            })
        });
    }
    group.finish();
}

fn decode(c: &mut Criterion) {
    let inputs: [(&str, &[(&str, &str)]); 3] = [("small", SMALL), ("medium", MEDIUM), ("large", LARGE)];

    let mut group = c.benchmark_group("hpack-decode");
    for (label, headers) in inputs {
        let mut enc = Encoder::new(4096);
        let block = enc.encode_block(headers, Indexing::Without);
        group.throughput(Throughput::Bytes(block.len() as u64));
        group.bench_with_input(BenchmarkId::new("decode_block", label), &block, |b, block| {
            b.iter(|| {
                let mut dec = Decoder::new(4096);
                dec.decode_block(block).unwrap()
            })
        });
    }
    group.finish();
}

criterion_group!(benches, encode, decode);
criterion_main!(benches);
