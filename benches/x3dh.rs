use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use signal_session::storage::{PreKeyStore, SignedPreKeyStore};
use signal_session::{
    DefaultCryptoProvider, IdentityKeyPair, InMemoryProtocolStore, PreKeyBundle, PreKeyRecord,
    PreKeySignalMessage, ProtocolAddress, SessionBuilder, SessionCipher, SignedPreKeyRecord,
};

struct Responder {
    identity: IdentityKeyPair,
    signed: SignedPreKeyRecord,
    one_time: PreKeyRecord,
}

impl Responder {
    fn generate(crypto: &DefaultCryptoProvider) -> Self {
        let identity = IdentityKeyPair::generate(crypto).unwrap();
        Self {
            signed: SignedPreKeyRecord::generate(1, 0, &identity, crypto).unwrap(),
            one_time: PreKeyRecord::generate(1, crypto).unwrap(),
            identity,
        }
    }

    fn bundle(&self) -> PreKeyBundle {
        PreKeyBundle::from_records(
            2,
            1,
            Some(&self.one_time),
            &self.signed,
            *self.identity.identity_key(),
        )
    }

    /// The in-memory store shares its maps between clones, so every run
    /// needs a freshly populated one.
    fn store(&self) -> InMemoryProtocolStore {
        let mut store = InMemoryProtocolStore::new(self.identity.clone(), 2);
        store.store_signed_pre_key(1, self.signed.clone()).unwrap();
        store.store_pre_key(1, self.one_time.clone()).unwrap();
        store
    }
}

fn bench_key_generation(c: &mut Criterion) {
    let mut group = c.benchmark_group("key_generation");
    let crypto = DefaultCryptoProvider::new();

    group.bench_function("identity_keypair", |b| {
        b.iter(|| black_box(IdentityKeyPair::generate(&crypto).unwrap()));
    });

    group.bench_function("signed_pre_key", |b| {
        let identity = IdentityKeyPair::generate(&crypto).unwrap();
        b.iter(|| black_box(SignedPreKeyRecord::generate(1, 0, &identity, &crypto).unwrap()));
    });

    group.finish();
}

fn bench_session_setup(c: &mut Criterion) {
    let mut group = c.benchmark_group("session_setup");
    let crypto = DefaultCryptoProvider::new();
    let responder = Responder::generate(&crypto);
    let bundle = responder.bundle();
    let bob = ProtocolAddress::new("bob", 1);
    let alice = ProtocolAddress::new("alice", 1);
    let alice_identity = IdentityKeyPair::generate(&crypto).unwrap();

    group.bench_function("process_bundle", |b| {
        b.iter_batched(
            || InMemoryProtocolStore::new(alice_identity.clone(), 1),
            |mut store| {
                SessionBuilder::new(&mut store, &crypto, bob.clone())
                    .process_pre_key_bundle(&bundle)
                    .unwrap();
                black_box(store)
            },
            BatchSize::SmallInput,
        );
    });

    let mut alice_store = InMemoryProtocolStore::new(alice_identity.clone(), 1);
    SessionBuilder::new(&mut alice_store, &crypto, bob.clone())
        .process_pre_key_bundle(&bundle)
        .unwrap();
    let first = SessionCipher::new(&mut alice_store, &crypto, bob.clone())
        .encrypt(b"hello")
        .unwrap();
    let first = PreKeySignalMessage::deserialize(&first.body).unwrap();

    group.bench_function("decrypt_pre_key_message", |b| {
        b.iter_batched(
            || responder.store(),
            |mut store| {
                black_box(
                    SessionCipher::new(&mut store, &crypto, alice.clone())
                        .decrypt_pre_key_message(&first)
                        .unwrap(),
                )
            },
            BatchSize::SmallInput,
        );
    });

    group.bench_function("verify_bundle_signature", |b| {
        b.iter(|| black_box(bundle.verify_signature(&crypto).unwrap()));
    });

    group.finish();
}

fn bench_pre_key_batches(c: &mut Criterion) {
    let mut group = c.benchmark_group("pre_key_generation");
    let crypto = DefaultCryptoProvider::new();

    for count in [10u32, 100, 1000] {
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            b.iter(|| black_box(PreKeyRecord::generate_batch(1, count, &crypto).unwrap()));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_key_generation,
    bench_session_setup,
    bench_pre_key_batches
);

criterion_main!(benches);
