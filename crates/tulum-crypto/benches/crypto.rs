use std::path::PathBuf;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tempfile::TempDir;
use tulum_crypto::{decrypt, encrypt, EngineContext};

fn make_data(size: usize) -> Vec<u8> {
    (0..size)
        .map(|i| (i.wrapping_mul(7) ^ (i >> 3)) as u8)
        .collect()
}

struct Bench {
    dir: TempDir,
    ctx: EngineContext,
}

impl Bench {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let ctx = EngineContext::new(dir.path());
        Self { dir, ctx }
    }

    fn fresh_key(&self, n: u64) -> PathBuf {
        self.dir.path().join(format!("key-{n}.asc"))
    }
}

#[divan::bench(args = [1024, 65536, 1048576])]
fn bench_encrypt(bencher: divan::Bencher, size: usize) {
    let env = Bench::new();
    let data = make_data(size);
    let mut n = 0u64;
    bencher
        .counter(divan::counter::BytesCount::new(size))
        .bench_local(|| {
            n += 1;
            let mut out = Vec::with_capacity(size + 128);
            encrypt(
                &env.ctx,
                divan::black_box(&data[..]),
                &mut out,
                &mut StdRng::seed_from_u64(n),
                &env.fresh_key(n),
            )
            .unwrap();
            out
        });
}

#[divan::bench(args = [1024, 65536, 1048576])]
fn bench_decrypt(bencher: divan::Bencher, size: usize) {
    let env = Bench::new();
    let key = env.fresh_key(0);
    let mut envelope = Vec::new();
    encrypt(
        &env.ctx,
        &make_data(size)[..],
        &mut envelope,
        &mut StdRng::seed_from_u64(0),
        &key,
    )
    .unwrap();
    bencher
        .counter(divan::counter::BytesCount::new(size))
        .bench(|| {
            let mut out = Vec::with_capacity(size);
            decrypt(&env.ctx, divan::black_box(&envelope[..]), &mut out, &key).unwrap();
            out
        });
}

fn main() {
    divan::main();
}
