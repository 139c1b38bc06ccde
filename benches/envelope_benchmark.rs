use criterion::{Criterion, Throughput, black_box, criterion_group, criterion_main};

use heliograph::signaling::{Envelope, PeerId};

const SDP_OFFER: &str = "v=0\r\no=- 4611731400430051336 2 IN IP4 127.0.0.1\r\ns=-\r\nt=0 0\r\n\
a=group:BUNDLE 0\r\nm=application 9 UDP/DTLS/SCTP webrtc-datachannel\r\n\
c=IN IP4 0.0.0.0\r\na=ice-ufrag:4ZcD\r\na=ice-pwd:2/1muCWoOi3uLifh0NuRHlkz\r\n\
a=fingerprint:sha-256 75:74:5A:A6:A4:E5:52:F4:A7:67:4C:01:C7:EE:91:3F\r\n\
a=setup:actpass\r\na=mid:0\r\na=sctp-port:5000\r\n";

fn offer_json() -> String {
    let offer = Envelope::P2POffer {
        peer: PeerId::new(2),
        flags: 0,
        offer: SDP_OFFER.to_string(),
    };
    serde_json::to_string(&offer).expect("offer serializes")
}

/// decode benchmark
fn bench_decode(c: &mut Criterion) {
    let json = offer_json();

    let mut group = c.benchmark_group("Decode");
    group.throughput(Throughput::Bytes(json.len() as u64));

    group.bench_function("p2p_offer", |b| {
        b.iter(|| {
            let envelope: Envelope =
                serde_json::from_str(black_box(&json)).expect("offer parses");
            black_box(envelope)
        })
    });

    group.finish();
}

/// encode benchmark
fn bench_encode(c: &mut Criterion) {
    let connect = Envelope::P2PConnect {
        peer: PeerId::new(1),
        flags: 0,
        offer: SDP_OFFER.to_string(),
    };

    let mut group = c.benchmark_group("Encode");
    group.throughput(Throughput::Elements(1));

    group.bench_function("p2p_connect", |b| {
        b.iter(|| {
            let json = serde_json::to_string(black_box(&connect)).expect("connect serializes");
            black_box(json)
        })
    });

    group.finish();
}

/// full routing cycle: decode an offer, rebuild it as the forwarded
/// connect envelope, encode
fn bench_route_cycle(c: &mut Criterion) {
    let json = offer_json();

    let mut group = c.benchmark_group("RouteCycle");
    group.throughput(Throughput::Elements(1));

    group.bench_function("offer_to_connect", |b| {
        b.iter(|| {
            let envelope: Envelope =
                serde_json::from_str(black_box(&json)).expect("offer parses");
            let forwarded = match envelope {
                Envelope::P2POffer { flags, offer, .. } => Envelope::P2PConnect {
                    peer: PeerId::new(1),
                    flags,
                    offer,
                },
                _ => unreachable!(),
            };
            let out = serde_json::to_string(&forwarded).expect("connect serializes");
            black_box(out)
        })
    });

    group.finish();
}

criterion_group!(benches, bench_decode, bench_encode, bench_route_cycle);
criterion_main!(benches);
