//! Initial key agreement (X3DH) for both protocol roles.
//!
//! ```text
//! initiator                          responder
//! (a) DH(IK_A, SPK_B)                DH(SPK_B, IK_A)
//! (b) DH(EK_A, IK_B)                 DH(IK_B, EK_A)
//! (c) DH(EK_A, SPK_B)                DH(SPK_B, EK_A)
//! (d) DH(EK_A, OPK_B)   [optional]   DH(OPK_B, EK_A)
//!
//! RK0 || CK0 = HKDF(a || b || c || [d])
//! ```
//!
//! The initiator then ratchets once against `SPK_B` with a fresh key to get
//! its first sending chain. The responder keeps `RK0`, a receiving chain for
//! `EK_A`, and uses `SPK_B` as its ratchet key until the first DH step.

use tracing::debug;
use zeroize::Zeroizing;

use crate::{
    crypto::CryptoProvider,
    error::Result,
    keys::{DhOutput, IdentityKey, IdentityKeyPair, KeyPair, PublicKey},
    ratchet::RootKey,
    state::{ReceivingChain, SendingChain, SessionState},
};

/// Inputs for the side that fetched a bundle and speaks first.
#[derive(Debug, Clone, Copy)]
pub struct InitiatorParameters<'a> {
    pub our_identity_key_pair: &'a IdentityKeyPair,
    /// Ephemeral key, sent to the responder as the base key
    pub our_base_key_pair: &'a KeyPair,
    pub their_identity_key: &'a IdentityKey,
    pub their_signed_pre_key: &'a PublicKey,
    pub their_one_time_pre_key: Option<&'a PublicKey>,
}

/// Inputs for the side that published the bundle.
#[derive(Debug, Clone, Copy)]
pub struct ResponderParameters<'a> {
    pub our_identity_key_pair: &'a IdentityKeyPair,
    pub our_signed_pre_key_pair: &'a KeyPair,
    pub our_one_time_pre_key_pair: Option<&'a KeyPair>,
    pub their_identity_key: &'a IdentityKey,
    pub their_base_key: &'a PublicKey,
}

fn concat(outputs: &[Option<DhOutput>]) -> Zeroizing<Vec<u8>> {
    let mut master = Zeroizing::new(Vec::with_capacity(32 * outputs.len()));
    for output in outputs.iter().flatten() {
        master.extend_from_slice(output.as_bytes());
    }
    master
}

pub fn initialize_as_initiator<C: CryptoProvider + ?Sized>(
    crypto: &C,
    parameters: &InitiatorParameters<'_>,
) -> Result<SessionState> {
    let identity = parameters.our_identity_key_pair.key_pair();
    let base = parameters.our_base_key_pair;

    let master = concat(&[
        Some(identity.agree(crypto, parameters.their_signed_pre_key)?),
        Some(base.agree(crypto, parameters.their_identity_key.public_key())?),
        Some(base.agree(crypto, parameters.their_signed_pre_key)?),
        parameters
            .their_one_time_pre_key
            .map(|key| base.agree(crypto, key))
            .transpose()?,
    ]);
    let (root_key, _) = RootKey::derive_initial(crypto, &master)?;

    let sending_ratchet_key = crypto.generate_key_pair()?;
    let (root_key, sending_chain_key) =
        root_key.create_chain(crypto, parameters.their_signed_pre_key, &sending_ratchet_key)?;

    let mut state = SessionState::new(
        *parameters.our_identity_key_pair.identity_key(),
        *parameters.their_identity_key,
        root_key,
        base.public_key,
    );
    state.set_sending_chain(SendingChain::new(sending_ratchet_key, sending_chain_key));

    debug!(
        one_time_pre_key = parameters.their_one_time_pre_key.is_some(),
        "initialized session as initiator"
    );
    Ok(state)
}

pub fn initialize_as_responder<C: CryptoProvider + ?Sized>(
    crypto: &C,
    parameters: &ResponderParameters<'_>,
) -> Result<SessionState> {
    let identity = parameters.our_identity_key_pair.key_pair();
    let signed_pre_key = parameters.our_signed_pre_key_pair;
    let their_base = parameters.their_base_key;

    let master = concat(&[
        Some(signed_pre_key.agree(crypto, parameters.their_identity_key.public_key())?),
        Some(identity.agree(crypto, their_base)?),
        Some(signed_pre_key.agree(crypto, their_base)?),
        parameters
            .our_one_time_pre_key_pair
            .map(|pair| pair.agree(crypto, their_base))
            .transpose()?,
    ]);
    let (root_key, chain_key) = RootKey::derive_initial(crypto, &master)?;

    let mut state = SessionState::new(
        *parameters.our_identity_key_pair.identity_key(),
        *parameters.their_identity_key,
        root_key,
        *their_base,
    );
    state.set_initial_receiving_chain(ReceivingChain::new(*their_base, chain_key));
    state.set_pending_ratchet_key(signed_pre_key.clone());

    debug!(
        one_time_pre_key = parameters.our_one_time_pre_key_pair.is_some(),
        "initialized session as responder"
    );
    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;
    use crate::crypto::DefaultCryptoProvider;

    struct Parties {
        alice_identity: IdentityKeyPair,
        alice_base: KeyPair,
        bob_identity: IdentityKeyPair,
        bob_signed: KeyPair,
        bob_one_time: KeyPair,
    }

    fn parties(crypto: &DefaultCryptoProvider) -> Parties {
        Parties {
            alice_identity: IdentityKeyPair::generate(crypto).unwrap(),
            alice_base: crypto.generate_key_pair().unwrap(),
            bob_identity: IdentityKeyPair::generate(crypto).unwrap(),
            bob_signed: crypto.generate_key_pair().unwrap(),
            bob_one_time: crypto.generate_key_pair().unwrap(),
        }
    }

    fn run(
        crypto: &DefaultCryptoProvider,
        p: &Parties,
        alice_uses_one_time: bool,
        bob_uses_one_time: bool,
    ) -> (SessionState, SessionState) {
        let alice = initialize_as_initiator(
            crypto,
            &InitiatorParameters {
                our_identity_key_pair: &p.alice_identity,
                our_base_key_pair: &p.alice_base,
                their_identity_key: p.bob_identity.identity_key(),
                their_signed_pre_key: &p.bob_signed.public_key,
                their_one_time_pre_key: alice_uses_one_time.then_some(&p.bob_one_time.public_key),
            },
        )
        .unwrap();
        let bob = initialize_as_responder(
            crypto,
            &ResponderParameters {
                our_identity_key_pair: &p.bob_identity,
                our_signed_pre_key_pair: &p.bob_signed,
                our_one_time_pre_key_pair: bob_uses_one_time.then_some(&p.bob_one_time),
                their_identity_key: p.alice_identity.identity_key(),
                their_base_key: &p.alice_base.public_key,
            },
        )
        .unwrap();
        (alice, bob)
    }

    #[test]
    fn test_initial_state_shapes() {
        let crypto = DefaultCryptoProvider::new();
        let p = parties(&crypto);
        let (alice, bob) = run(&crypto, &p, true, true);

        assert!(alice.has_sending_chain());
        assert_eq!(alice.receiving_chains().count(), 0);
        assert_eq!(alice.base_key(), &p.alice_base.public_key);

        assert!(!bob.has_sending_chain());
        assert_eq!(bob.receiving_chains().count(), 1);
        assert!(bob.receiving_chain(&p.alice_base.public_key).is_some());
        assert_eq!(bob.pending_ratchet_key(), Some(&p.bob_signed));
        assert_eq!(bob.base_key(), &p.alice_base.public_key);
    }

    #[test]
    fn test_both_roles_derive_same_keys() {
        for one_time in [false, true] {
            let crypto = DefaultCryptoProvider::new();
            let p = parties(&crypto);
            let (mut alice, mut bob) = run(&crypto, &p, one_time, one_time);

            let (sent, ratchet_key) = alice.next_sending_keys(&crypto).unwrap();
            let received = bob
                .receiving_keys(
                    &crypto,
                    &ratchet_key,
                    sent.counter(),
                    &SessionConfig::default(),
                    &mut 1000,
                )
                .unwrap();
            assert_eq!(sent, received);
        }
    }

    #[test]
    fn test_one_time_pre_key_must_match() {
        let crypto = DefaultCryptoProvider::new();
        let p = parties(&crypto);
        let (mut alice, mut bob) = run(&crypto, &p, true, false);

        let (sent, ratchet_key) = alice.next_sending_keys(&crypto).unwrap();
        let received = bob
            .receiving_keys(
                &crypto,
                &ratchet_key,
                sent.counter(),
                &SessionConfig::default(),
                &mut 1000,
            )
            .unwrap();
        assert_ne!(sent, received);
    }
}
