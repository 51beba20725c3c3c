use criterion::{black_box, criterion_group, criterion_main, Criterion};
use cryptdrop_core::SymmetricKey;
use cryptdrop_envelope::{unwrap_for_recipient, wrap_for_recipient};
use cryptdrop_testkit::multi_party_fixtures;

fn bench_wrap(c: &mut Criterion) {
    let parties = multi_party_fixtures(1);
    let secret = SymmetricKey::generate();

    c.bench_function("wrap_for_recipient", |b| {
        b.iter(|| wrap_for_recipient(black_box(&secret), black_box(&parties[0].keys.public)))
    });

    let wrapped = wrap_for_recipient(&secret, &parties[0].keys.public).unwrap();
    c.bench_function("unwrap_for_recipient", |b| {
        b.iter(|| unwrap_for_recipient(black_box(&wrapped), black_box(&parties[0].keys.private)))
    });
}

fn bench_encrypt(c: &mut Criterion) {
    let parties = multi_party_fixtures(5);
    let recipients: Vec<_> = parties[1..].iter().collect();
    let data = vec![0u8; 64 * 1024];

    c.bench_function("encrypt_64kb_5_recipients", |b| {
        b.iter(|| parties[0].encrypt(black_box(&data), "bench.bin", &recipients))
    });
}

fn bench_decrypt(c: &mut Criterion) {
    let parties = multi_party_fixtures(2);
    let data = vec![0u8; 64 * 1024];
    let obj = parties[0].encrypt(&data, "bench.bin", &[&parties[1]]);

    // Warm reads hit the secret cache; cold reads decapsulate every time.
    c.bench_function("decrypt_64kb_cached", |b| {
        b.iter(|| parties[1].decrypt(black_box(&obj)))
    });
    c.bench_function("decrypt_64kb_cold", |b| {
        b.iter(|| {
            parties[1].service.cache().clear();
            parties[1].decrypt(black_box(&obj))
        })
    });
}

criterion_group!(benches, bench_wrap, bench_encrypt, bench_decrypt);
criterion_main!(benches);
