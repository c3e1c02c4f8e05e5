// ABOUTME: Frame encode/check/parse throughput benchmarks for the four czrpc wire frame kinds
// ABOUTME: Shape follows the teacher's benches/smpp_benchmarks.rs criterion groups (check, parse, serialize, roundtrip, sizes)

use bytes::{Bytes, BytesMut};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use czrpc::datatypes::{ClientKind, SerializeMode};
use czrpc::frame::{Encode, FrameStatus, PushFrame, RequestFrame, ResponseFrame};
use std::time::Duration;

fn sample_request(body_len: usize) -> RequestFrame {
    RequestFrame {
        mode: SerializeMode::Serialize,
        kind: ClientKind::Rpc,
        call_id: 42,
        protocol: "echo".to_string(),
        message_name: "czrpc.Echo".to_string(),
        body: Bytes::from(vec![b'A'; body_len]),
    }
}

fn sample_response(body_len: usize) -> ResponseFrame {
    ResponseFrame {
        code: czrpc::RpcErrorCode::Ok,
        call_id: 42,
        message_name: "czrpc.Echo".to_string(),
        body: Bytes::from(vec![b'A'; body_len]),
    }
}

fn sample_push(body_len: usize) -> PushFrame {
    PushFrame {
        mode: SerializeMode::NonSerialize,
        topic: "news".to_string(),
        message_name: String::new(),
        body: Bytes::from(vec![b'A'; body_len]),
    }
}

fn encode(frame: &impl Encode) -> BytesMut {
    let mut buf = BytesMut::with_capacity(frame.declared_len() + 32);
    frame.encode(&mut buf);
    buf
}

fn bench_frame_check(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_check");
    group.measurement_time(Duration::from_secs(10));

    let request_bytes = encode(&sample_request(160));
    group.bench_function("request", |b| {
        b.iter(|| RequestFrame::check(black_box(&request_bytes)).unwrap())
    });

    let response_bytes = encode(&sample_response(160));
    group.bench_function("response", |b| {
        b.iter(|| ResponseFrame::check(black_box(&response_bytes)).unwrap())
    });

    let push_bytes = encode(&sample_push(160));
    group.bench_function("push", |b| b.iter(|| PushFrame::check(black_box(&push_bytes)).unwrap()));

    group.finish();
}

fn bench_frame_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_parse");
    group.measurement_time(Duration::from_secs(10));

    let request_bytes = encode(&sample_request(160));
    group.bench_function("request", |b| {
        b.iter(|| RequestFrame::parse(black_box(&request_bytes)).unwrap())
    });

    let response_bytes = encode(&sample_response(160));
    group.bench_function("response", |b| {
        b.iter(|| ResponseFrame::parse(black_box(&response_bytes)).unwrap())
    });

    let push_bytes = encode(&sample_push(160));
    group.bench_function("push", |b| b.iter(|| PushFrame::parse(black_box(&push_bytes)).unwrap()));

    group.finish();
}

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");
    group.measurement_time(Duration::from_secs(10));

    let request = sample_request(160);
    group.bench_function("request", |b| b.iter(|| encode(black_box(&request))));

    let response = sample_response(160);
    group.bench_function("response", |b| b.iter(|| encode(black_box(&response))));

    let push = sample_push(160);
    group.bench_function("push", |b| b.iter(|| encode(black_box(&push))));

    group.finish();
}

fn bench_roundtrip(c: &mut Criterion) {
    let mut group = c.benchmark_group("roundtrip");
    group.measurement_time(Duration::from_secs(10));

    group.bench_function("request", |b| {
        b.iter(|| {
            let frame = sample_request(160);
            let bytes = encode(black_box(&frame));
            match RequestFrame::check(&bytes).unwrap() {
                FrameStatus::Ready { total_len } => RequestFrame::parse(&bytes[..total_len]).unwrap(),
                other => panic!("expected Ready, got {other:?}"),
            }
        })
    });

    group.finish();
}

fn bench_body_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("body_sizes");
    group.measurement_time(Duration::from_secs(10));

    for &size in &[16usize, 256, 4096, 65536] {
        let bytes = encode(&sample_request(size));
        group.bench_with_input(BenchmarkId::new("request_parse", size), &bytes, |b, bytes| {
            b.iter(|| RequestFrame::parse(black_box(bytes)).unwrap())
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_frame_check,
    bench_frame_parse,
    bench_encode,
    bench_roundtrip,
    bench_body_sizes
);
criterion_main!(benches);
