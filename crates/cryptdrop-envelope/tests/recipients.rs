//! Multi-recipient behaviour of encrypted objects.

use std::collections::BTreeMap;

use cryptdrop_core::{KeyPair, SymmetricKey, UserId};
use cryptdrop_envelope::{
    unwrap_for_recipient, wrap_for_recipient, ContentEncryptionService, EnvelopeError,
};
use proptest::prelude::*;

#[test]
fn owner_and_recipient_open_note_stranger_cannot() {
    let svc = ContentEncryptionService::new();
    let (a_id, a) = (UserId::new("A"), KeyPair::generate());
    let (b_id, b) = (UserId::new("B"), KeyPair::generate());
    let (c_id, c) = (UserId::new("C"), KeyPair::generate());

    let mut recipients = BTreeMap::new();
    recipients.insert(b_id.clone(), b.public.clone());

    let obj = svc
        .encrypt_for_recipients(&a_id, &a.public, b"hello", "note.txt", 5, &recipients)
        .unwrap();

    let as_b = svc.decrypt_for_user(&obj, &b_id, &b.private).unwrap();
    assert_eq!(as_b.content, b"hello");
    assert_eq!(as_b.name, "note.txt");
    assert_eq!(as_b.size, 5);

    let as_a = svc.decrypt_for_user(&obj, &a_id, &a.private).unwrap();
    assert_eq!(as_a, as_b);

    assert!(matches!(
        svc.decrypt_for_user(&obj, &c_id, &c.private),
        Err(EnvelopeError::NotSharedWithUser(_))
    ));
}

#[test]
fn removal_leaves_other_recipients_intact() {
    let svc = ContentEncryptionService::new();
    let owner = (UserId::new("owner"), KeyPair::generate());
    let others: Vec<_> = ["r1", "r2", "r3"]
        .iter()
        .map(|n| (UserId::new(*n), KeyPair::generate()))
        .collect();

    let recipients: BTreeMap<_, _> = others
        .iter()
        .map(|(id, kp)| (id.clone(), kp.public.clone()))
        .collect();
    let mut obj = svc
        .encrypt_for_recipients(&owner.0, &owner.1.public, b"data", "d", 4, &recipients)
        .unwrap();

    // Warm the cache for the recipient about to be removed.
    svc.decrypt_for_user(&obj, &others[1].0, &others[1].1.private)
        .unwrap();
    assert!(svc.remove_recipient(&mut obj, &others[1].0).unwrap());

    assert!(matches!(
        svc.decrypt_for_user(&obj, &others[1].0, &others[1].1.private),
        Err(EnvelopeError::NotSharedWithUser(_))
    ));
    for (id, kp) in [&owner, &others[0], &others[2]] {
        assert_eq!(svc.decrypt_for_user(&obj, id, &kp.private).unwrap().content, b"data");
    }
    assert_eq!(
        svc.recipients(&obj),
        vec![owner.0.clone(), others[0].0.clone(), others[2].0.clone()]
    );
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(8))]

    #[test]
    fn every_recipient_recovers_the_same_secret(
        seeds in prop::collection::vec(any::<[u8; 32]>(), 1..5),
        secret in any::<[u8; 32]>(),
    ) {
        let secret = SymmetricKey::from_bytes(secret);
        for seed in seeds {
            let kp = KeyPair::from_seed(seed);
            let wrapped = wrap_for_recipient(&secret, &kp.public).unwrap();
            prop_assert_eq!(unwrap_for_recipient(&wrapped, &kp.private).unwrap(), secret.clone());
        }
    }

    #[test]
    fn every_recipient_opens_the_object(
        count in 1usize..5,
        content in prop::collection::vec(any::<u8>(), 0..512),
        name in "[a-zA-Z0-9._ -]{1,40}",
        size in any::<u64>(),
    ) {
        let svc = ContentEncryptionService::new();
        let owner = KeyPair::generate();
        let owner_id = UserId::new("owner");
        let parties: Vec<_> = (0..count)
            .map(|i| (UserId::new(format!("user-{i}")), KeyPair::generate()))
            .collect();
        let recipients: BTreeMap<_, _> = parties
            .iter()
            .map(|(id, kp)| (id.clone(), kp.public.clone()))
            .collect();

        let obj = svc
            .encrypt_for_recipients(&owner_id, &owner.public, &content, &name, size, &recipients)
            .unwrap();
        prop_assert_eq!(obj.encrypted_keys.len(), count + 1);

        for (id, kp) in &parties {
            let opened = svc.decrypt_for_user(&obj, id, &kp.private).unwrap();
            prop_assert_eq!(&opened.content, &content);
            prop_assert_eq!(&opened.name, &name);
            prop_assert_eq!(opened.size, size);
        }
    }
}
