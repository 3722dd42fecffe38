//! XEdDSA signatures over X25519 keys.
//!
//! Lets a single Montgomery key pair act as both the identity agreement key
//! and the signing key for signed pre-keys. Follows "The XEdDSA and VXEdDSA
//! Signature Schemes" (Perrin, revision 1).

use curve25519_dalek::{
    constants::ED25519_BASEPOINT_TABLE,
    edwards::{CompressedEdwardsY, EdwardsPoint},
    montgomery::MontgomeryPoint,
    scalar::Scalar,
};
use sha2::{Digest, Sha512};
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// R point followed by the s scalar
pub(crate) const SIGNATURE_LENGTH: usize = 64;

/// Nonce randomness mixed into every signature
pub(crate) const RANDOM_LENGTH: usize = 64;

/// Edwards view of an X25519 private scalar.
#[derive(Zeroize, ZeroizeOnDrop)]
pub(crate) struct SigningKey {
    scalar: Scalar,
    #[zeroize(skip)]
    verifying_key: CompressedEdwardsY,
}

impl SigningKey {
    /// Clamps `private` and picks the sign so that the Edwards public key has
    /// a zero sign bit, matching what a verifier derives from the
    /// Montgomery `u` coordinate alone.
    pub(crate) fn from_x25519(private: &[u8; 32]) -> Self {
        let mut clamped = *private;
        clamped[0] &= 248;
        clamped[31] &= 127;
        clamped[31] |= 64;
        let k = Scalar::from_bytes_mod_order(clamped);
        clamped.zeroize();

        let point = (&k * ED25519_BASEPOINT_TABLE).compress();
        let negative = point.as_bytes()[31] >> 7 == 1;
        let scalar = if negative { -k } else { k };

        let mut public = *point.as_bytes();
        public[31] &= 0x7F;

        Self {
            scalar,
            verifying_key: CompressedEdwardsY(public),
        }
    }

    pub(crate) fn sign(
        &self,
        message: &[u8],
        random: &[u8; RANDOM_LENGTH],
    ) -> [u8; SIGNATURE_LENGTH] {
        let r = nonce_scalar(&self.scalar, message, random);
        let big_r = (&r * ED25519_BASEPOINT_TABLE).compress();
        let h = challenge(&big_r, &self.verifying_key, message);
        let s = r + h * self.scalar;

        let mut signature = [0u8; SIGNATURE_LENGTH];
        signature[..32].copy_from_slice(big_r.as_bytes());
        signature[32..].copy_from_slice(s.as_bytes());
        signature
    }
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SigningKey([REDACTED])")
    }
}

/// Edwards public key obtained from a Montgomery `u` coordinate.
///
/// Returns `None` when `u` has no Edwards counterpart.
pub(crate) fn verifying_key(x25519_public: &[u8; 32]) -> Option<CompressedEdwardsY> {
    let mut u = *x25519_public;
    u[31] &= 0x7F;
    let edwards = MontgomeryPoint(u).to_edwards(0)?;
    let mut bytes = *edwards.compress().as_bytes();
    bytes[31] &= 0x7F;
    Some(CompressedEdwardsY(bytes))
}

/// Checks an XEdDSA signature. Any malformed input simply fails to verify.
pub(crate) fn verify(x25519_public: &[u8; 32], message: &[u8], signature: &[u8]) -> bool {
    let Ok(signature) = <&[u8; SIGNATURE_LENGTH]>::try_from(signature) else {
        return false;
    };
    let Some(public) = verifying_key(x25519_public) else {
        return false;
    };
    let Some(a) = public.decompress() else {
        return false;
    };
    if !a.is_torsion_free() {
        return false;
    }

    let mut r_bytes = [0u8; 32];
    r_bytes.copy_from_slice(&signature[..32]);
    let mut s_bytes = [0u8; 32];
    s_bytes.copy_from_slice(&signature[32..]);

    // s must stay below 2^253
    if s_bytes[31] & 0xE0 != 0 {
        return false;
    }
    let big_r = CompressedEdwardsY(r_bytes);
    if big_r.decompress().is_none() {
        return false;
    }

    let s = Scalar::from_bytes_mod_order(s_bytes);
    let h = challenge(&big_r, &public, message);
    let expected = EdwardsPoint::vartime_double_scalar_mul_basepoint(&h, &-a, &s).compress();

    expected.as_bytes().ct_eq(&r_bytes).into()
}

/// hash1(a || M || Z) mod q
fn nonce_scalar(a: &Scalar, message: &[u8], random: &[u8; RANDOM_LENGTH]) -> Scalar {
    let mut hasher = Sha512::new();
    hasher.update([0xFE]);
    hasher.update([0xFF; 31]);
    hasher.update(a.as_bytes());
    hasher.update(message);
    hasher.update(random);
    Scalar::from_bytes_mod_order_wide(&hasher.finalize().into())
}

/// hash(R || A || M) mod q
fn challenge(big_r: &CompressedEdwardsY, a: &CompressedEdwardsY, message: &[u8]) -> Scalar {
    let mut hasher = Sha512::new();
    hasher.update(big_r.as_bytes());
    hasher.update(a.as_bytes());
    hasher.update(message);
    Scalar::from_bytes_mod_order_wide(&hasher.finalize().into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use x25519_dalek::{PublicKey as X25519Public, StaticSecret};

    fn key_pair(seed: u8) -> ([u8; 32], [u8; 32]) {
        let private = [seed; 32];
        let public = X25519Public::from(&StaticSecret::from(private));
        (private, *public.as_bytes())
    }

    #[test]
    fn test_sign_verify() {
        let (private, public) = key_pair(11);
        let signer = SigningKey::from_x25519(&private);
        let signature = signer.sign(b"signed pre-key", &[5u8; RANDOM_LENGTH]);

        assert!(verify(&public, b"signed pre-key", &signature));
        assert!(!verify(&public, b"other message", &signature));
    }

    #[test]
    fn test_verifying_key_matches_signer() {
        let (private, public) = key_pair(42);
        let signer = SigningKey::from_x25519(&private);
        assert_eq!(verifying_key(&public), Some(signer.verifying_key));
    }

    #[test]
    fn test_wrong_key_rejected() {
        let (private, _) = key_pair(1);
        let (_, other_public) = key_pair(2);
        let signature = SigningKey::from_x25519(&private).sign(b"msg", &[0u8; RANDOM_LENGTH]);
        assert!(!verify(&other_public, b"msg", &signature));
    }

    #[test]
    fn test_signature_bounds_check() {
        let (_, public) = key_pair(3);
        let mut signature = [0u8; SIGNATURE_LENGTH];
        signature[31] = 0x20;
        signature[63] = 0xFF;
        assert!(!verify(&public, b"test", &signature));
    }

    #[test]
    fn test_wrong_length_rejected() {
        let (private, public) = key_pair(4);
        let signature = SigningKey::from_x25519(&private).sign(b"msg", &[1u8; RANDOM_LENGTH]);
        assert!(!verify(&public, b"msg", &signature[..63]));
    }
}
