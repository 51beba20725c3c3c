//! Proptest generators for property-based testing.

use proptest::prelude::*;

use cryptdrop_core::{KemPublicKey, KeyPair, SymmetricKey, UserId};
use cryptdrop_envelope::EncryptedObject;

use crate::fixtures::TestFixture;

/// Generate a deterministic key pair.
pub fn key_pair() -> impl Strategy<Value = KeyPair> {
    any::<[u8; 32]>().prop_map(KeyPair::from_seed)
}

/// Generate a random public key.
pub fn public_key() -> impl Strategy<Value = KemPublicKey> {
    key_pair().prop_map(|kp| kp.public)
}

/// Generate a random symmetric key.
pub fn symmetric_key() -> impl Strategy<Value = SymmetricKey> {
    any::<[u8; 32]>().prop_map(SymmetricKey::from_bytes)
}

/// Generate a user id.
pub fn user_id() -> impl Strategy<Value = UserId> {
    "[a-z][a-z0-9_]{0,15}".prop_map(UserId::new)
}

/// Generate content bytes of specified max length.
pub fn content(max_len: usize) -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..=max_len)
}

/// Generate a display name, including non-ASCII.
pub fn object_name() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-zA-Z0-9 ._-]{0,40}",
        "\\PC{0,20}",
    ]
}

/// Parameters for an object shared among several seeded users.
#[derive(Debug, Clone)]
pub struct ObjectParams {
    pub owner_seed: [u8; 32],
    pub recipient_seeds: Vec<[u8; 32]>,
    pub content: Vec<u8>,
    pub name: String,
}

impl Arbitrary for ObjectParams {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        (
            any::<[u8; 32]>(),
            prop::collection::vec(any::<[u8; 32]>(), 0..4),
            content(4096),
            object_name(),
        )
            .prop_map(|(owner_seed, recipient_seeds, content, name)| ObjectParams {
                owner_seed,
                recipient_seeds,
                content,
                name,
            })
            .boxed()
    }
}

/// Encrypt per `params`. Returns the object and every party that should
/// read it, owner first.
pub fn encrypt_from_params(params: &ObjectParams) -> (EncryptedObject, Vec<TestFixture>) {
    let owner = TestFixture::with_seed("owner", params.owner_seed);
    let recipients: Vec<TestFixture> = params
        .recipient_seeds
        .iter()
        .enumerate()
        .map(|(i, seed)| TestFixture::with_seed(&format!("recipient-{i}"), *seed))
        .collect();

    let refs: Vec<&TestFixture> = recipients.iter().collect();
    let obj = owner.encrypt(&params.content, &params.name, &refs);

    let mut parties = vec![owner];
    parties.extend(recipients);
    (obj, parties)
}
