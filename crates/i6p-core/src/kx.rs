//! X25519 key agreement and HKDF-SHA256 key derivation.

use hkdf::Hkdf;
use rand::rngs::OsRng;
use sha2::Sha256;
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::Zeroizing;

use crate::aead::CryptoError;

/// Context string binding derived session keys to this protocol.
const SESSION_KEY_INFO: &[u8] = b"i6p-session-keys";

/// An ephemeral X25519 keypair. The secret is clamped per RFC 7748 by the
/// underlying implementation and zeroized on drop.
pub struct X25519KeyPair {
    secret: StaticSecret,
    public: PublicKey,
}

impl X25519KeyPair {
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    pub fn public(&self) -> [u8; 32] {
        self.public.to_bytes()
    }

    /// Computes the raw shared secret. The all-zero peer key (and any other
    /// low-order point producing a non-contributory result) is rejected.
    pub fn ecdh(&self, peer_public: &[u8; 32]) -> Result<Zeroizing<[u8; 32]>, CryptoError> {
        if peer_public == &[0u8; 32] {
            return Err(CryptoError::InvalidPublicKey);
        }
        let shared = self.secret.diffie_hellman(&PublicKey::from(*peer_public));
        if !shared.was_contributory() {
            return Err(CryptoError::InvalidPublicKey);
        }
        Ok(Zeroizing::new(*shared.as_bytes()))
    }
}

/// HKDF-SHA256. A `None` salt means the all-zero salt.
pub fn derive_key(
    secret: &[u8],
    salt: Option<&[u8]>,
    info: &[u8],
    length: usize,
) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    let hk = Hkdf::<Sha256>::new(salt, secret);
    let mut okm = Zeroizing::new(vec![0u8; length]);
    hk.expand(info, okm.as_mut_slice())
        .map_err(|_| CryptoError::InvalidKeySize)?;
    Ok(okm)
}

/// Derives the two directional session keys from an ECDH shared secret.
///
/// The info string carries both ephemeral public keys in initiator-first
/// order, which is what makes the two halves role-asymmetric: the initiator
/// sends with the first key, the responder with the second.
pub fn derive_session_keys(
    shared_secret: &[u8],
    initiator_public: &[u8; 32],
    responder_public: &[u8; 32],
) -> Result<(Zeroizing<[u8; 32]>, Zeroizing<[u8; 32]>), CryptoError> {
    let mut info = Vec::with_capacity(SESSION_KEY_INFO.len() + 64);
    info.extend_from_slice(SESSION_KEY_INFO);
    info.extend_from_slice(initiator_public);
    info.extend_from_slice(responder_public);

    let material = derive_key(shared_secret, None, &info, 64)?;
    let mut initiator_key = Zeroizing::new([0u8; 32]);
    let mut responder_key = Zeroizing::new([0u8; 32]);
    initiator_key.copy_from_slice(&material[..32]);
    responder_key.copy_from_slice(&material[32..]);
    Ok((initiator_key, responder_key))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ecdh_agrees_on_both_sides() {
        let a = X25519KeyPair::generate();
        let b = X25519KeyPair::generate();
        let shared_a = a.ecdh(&b.public()).unwrap();
        let shared_b = b.ecdh(&a.public()).unwrap();
        assert_eq!(&shared_a[..], &shared_b[..]);
    }

    #[test]
    fn ecdh_rejects_zero_public_key() {
        let a = X25519KeyPair::generate();
        assert_eq!(
            a.ecdh(&[0u8; 32]).unwrap_err(),
            CryptoError::InvalidPublicKey
        );
    }

    #[test]
    fn derive_key_is_deterministic() {
        let a = derive_key(b"secret", Some(b"salt"), b"info", 42).unwrap();
        let b = derive_key(b"secret", Some(b"salt"), b"info", 42).unwrap();
        assert_eq!(&a[..], &b[..]);
        assert_eq!(a.len(), 42);

        let c = derive_key(b"secret", Some(b"salt"), b"other", 42).unwrap();
        assert_ne!(&a[..], &c[..]);
    }

    #[test]
    fn session_keys_bind_role_order() {
        let shared = [0x42u8; 32];
        let pub_a = [1u8; 32];
        let pub_b = [2u8; 32];

        let (init_ab, resp_ab) = derive_session_keys(&shared, &pub_a, &pub_b).unwrap();
        let (init_ba, resp_ba) = derive_session_keys(&shared, &pub_b, &pub_a).unwrap();

        // Swapping the public key order must yield completely different keys.
        assert_ne!(&init_ab[..], &init_ba[..]);
        assert_ne!(&resp_ab[..], &resp_ba[..]);
        // The two halves themselves differ.
        assert_ne!(&init_ab[..], &resp_ab[..]);
    }

    #[test]
    fn session_keys_are_deterministic() {
        let shared = [0x17u8; 32];
        let (a1, b1) = derive_session_keys(&shared, &[3u8; 32], &[4u8; 32]).unwrap();
        let (a2, b2) = derive_session_keys(&shared, &[3u8; 32], &[4u8; 32]).unwrap();
        assert_eq!(&a1[..], &a2[..]);
        assert_eq!(&b1[..], &b2[..]);
    }
}
