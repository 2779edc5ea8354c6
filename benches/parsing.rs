//! Benchmarks for ticker parsing
//!
//! Target: <500ns per frame parse

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

use market_sync::core::FixedPoint8;
use market_sync::exchanges::parsing::BinanceParser;

// Real exchange message formats
const BINANCE_24HR_TICKER: &[u8] = br#"{"e":"24hrTicker","E":1672515782136,"s":"BTCUSDT","p":"-43.40","P":"-0.263","w":"16582.82","x":"16583.65","c":"16540.25","Q":"0.00300","b":"16540.24","B":"2.33700","a":"16540.25","A":"0.28300","o":"16583.65","h":"16650.00","l":"16490.11","v":"182301.52","q":"3022976533.94","O":1672429382136,"C":1672515782136,"F":2348468111,"L":2349854611,"n":1386501}"#;

const BINANCE_REST_TICKER: &[u8] = br#"{"symbol":"BTCUSDT","priceChange":"-43.40","priceChangePercent":"-0.263","weightedAvgPrice":"16582.82","lastPrice":"16540.25","lastQty":"0.00300","openPrice":"16583.65","highPrice":"16650.00","lowPrice":"16490.11","volume":"182301.52","quoteVolume":"3022976533.94","count":1386501}"#;

const BINANCE_ACK: &[u8] = br#"{"result":null,"id":7}"#;

fn bench_stream_ticker_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("binance_parse");
    group.throughput(Throughput::Bytes(BINANCE_24HR_TICKER.len() as u64));

    group.bench_function("24hrTicker", |b| {
        b.iter(|| {
            let result = BinanceParser::parse_ticker(black_box(BINANCE_24HR_TICKER));
            black_box(result);
        })
    });

    group.finish();
}

fn bench_rest_ticker_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("binance_parse");
    group.throughput(Throughput::Bytes(BINANCE_REST_TICKER.len() as u64));

    group.bench_function("rest_ticker", |b| {
        b.iter(|| {
            let result = BinanceParser::parse_rest_ticker(black_box(BINANCE_REST_TICKER));
            black_box(result);
        })
    });

    group.finish();
}

fn bench_detection(c: &mut Criterion) {
    let mut group = c.benchmark_group("message_detection");

    group.bench_function("ticker", |b| {
        b.iter(|| {
            let result = BinanceParser::detect_message_type(black_box(BINANCE_24HR_TICKER));
            black_box(result);
        })
    });

    group.bench_function("ack", |b| {
        b.iter(|| {
            let result = BinanceParser::detect_message_type(black_box(BINANCE_ACK));
            black_box(result);
        })
    });

    group.finish();
}

fn bench_fixed_point_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("fixed_point");

    group.bench_function("parse_price", |b| {
        b.iter(|| {
            let result = FixedPoint8::parse_bytes(black_box(b"16540.25"));
            black_box(result);
        })
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_stream_ticker_parse,
    bench_rest_ticker_parse,
    bench_detection,
    bench_fixed_point_parse
);
criterion_main!(benches);
