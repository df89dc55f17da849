//! Ed448-Goldilocks scalar/point wrappers, the SHAKE-256 KDF, and the 3072-bit
//! DH group. Everything above this module reaches the curve only through the
//! newtypes and free functions defined here.

use std::fmt::Debug;
use std::sync::OnceLock;

use ed448_goldilocks::{CompressedEdwardsY, EdwardsPoint, Scalar};
use elliptic_curve::Group;
use num_bigint::BigUint;
use num_traits::{One, Zero};
use rand_core::{OsRng, RngCore};
use sha3::digest::{ExtendableOutput, Update, XofReader};
use sha3::Shake256;
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::constants::{
    DH3072_GENERATOR, DH3072_MODULUS_BYTES, DH3072_MODULUS_HEX, DH_PRIVATE_BYTES,
    ED448_POINT_BYTES, ED448_PRIVATE_BYTES, ED448_SCALAR_BYTES, OTRV4_DOMAIN_SEPARATION,
    USAGE_PROFILE_SIGNATURE,
};
use crate::errors::PrimitiveError;

/// `SHAKE256(domain || usage || inputs…, out_len)`, the single KDF used by every
/// component. `domain` is `"OTRv4"` everywhere except where a call site documents
/// otherwise.
pub fn kdf(usage: u8, domain: &str, inputs: &[&[u8]], out_len: usize) -> Vec<u8> {
    let mut hasher = Shake256::default();
    hasher.update(domain.as_bytes());
    hasher.update(&[usage]);
    for chunk in inputs {
        hasher.update(chunk);
    }
    let mut reader = hasher.finalize_xof();
    let mut out = vec![0u8; out_len];
    reader.read(&mut out);
    out
}

/// Fills a fixed-size array via [`kdf`]; the common case where the output length
/// is known at the call site.
pub fn kdf_fixed<const N: usize>(usage: u8, domain: &str, inputs: &[&[u8]]) -> [u8; N] {
    let v = kdf(usage, domain, inputs, N);
    let mut out = [0u8; N];
    out.copy_from_slice(&v);
    out
}

/// Constant-time byte-buffer equality, used for MAC and signature-field comparison.
pub fn ct_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && bool::from(a.ct_eq(b))
}

/// An Ed448 private scalar, clamped per the Ed448 key-expansion convention.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct PrivateScalar {
    #[zeroize(skip)]
    scalar: Scalar,
}

impl PrivateScalar {
    /// Derives a private scalar from a 57-byte symmetric seed (long-term key,
    /// forging key, or shared-prekey seed).
    pub fn from_seed(seed: &[u8; ED448_PRIVATE_BYTES]) -> Self {
        let digest = kdf_fixed::<114>(0, "", &[seed]);
        let scalar = Scalar::from_bytes_mod_order_wide(&digest.into());
        PrivateScalar { scalar }
    }

    /// Draws a uniform scalar mod the group order by rejection sampling.
    pub fn random() -> Self {
        loop {
            let mut bytes = [0u8; ED448_SCALAR_BYTES];
            OsRng.fill_bytes(&mut bytes);
            if let Some(scalar) = Option::<Scalar>::from(Scalar::from_canonical_bytes(bytes.into())) {
                return PrivateScalar { scalar };
            }
        }
    }

    pub fn inner(&self) -> &Scalar {
        &self.scalar
    }

    pub fn public(&self) -> PublicPoint {
        PublicPoint::from_point(EdwardsPoint::GENERATOR * self.scalar)
    }

    /// ECDH: `priv * other.point`.
    pub fn diffie_hellman(&self, other: &PublicPoint) -> [u8; 56] {
        let shared = other.point * self.scalar;
        let compressed = shared.compress();
        let mut out = [0u8; 56];
        out.copy_from_slice(&compressed.to_bytes()[..56]);
        out
    }
}

impl Debug for PrivateScalar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PrivateScalar(..)")
    }
}

const SCHNORR_SIG_BYTES: usize = 2 * ED448_SCALAR_BYTES;

/// A single-key Schnorr signature `(c, r)`: the Fiat-Shamir challenge and the
/// response, both scalars. Signs with the same long-term scalar a ring
/// signature authenticates, so a Client/Prekey Profile's key and a DAKE
/// transcript signer are always the same identity.
#[derive(Clone)]
pub struct SchnorrSignature {
    c: Scalar,
    r: Scalar,
}

impl SchnorrSignature {
    pub fn to_bytes(&self) -> [u8; SCHNORR_SIG_BYTES] {
        let mut out = [0u8; SCHNORR_SIG_BYTES];
        out[..ED448_SCALAR_BYTES].copy_from_slice(&self.c.to_bytes());
        out[ED448_SCALAR_BYTES..].copy_from_slice(&self.r.to_bytes());
        out
    }

    pub fn from_bytes(bytes: &[u8; SCHNORR_SIG_BYTES]) -> Result<Self, PrimitiveError> {
        let c_bytes: [u8; ED448_SCALAR_BYTES] = bytes[..ED448_SCALAR_BYTES].try_into().unwrap();
        let r_bytes: [u8; ED448_SCALAR_BYTES] = bytes[ED448_SCALAR_BYTES..].try_into().unwrap();
        let c = Option::<Scalar>::from(Scalar::from_canonical_bytes(c_bytes.into()))
            .ok_or(PrimitiveError::InvalidScalar)?;
        let r = Option::<Scalar>::from(Scalar::from_canonical_bytes(r_bytes.into()))
            .ok_or(PrimitiveError::InvalidScalar)?;
        Ok(SchnorrSignature { c, r })
    }
}

fn schnorr_challenge(pubkey: &PublicPoint, commitment: &EdwardsPoint, msg: &[u8]) -> Scalar {
    let digest = kdf(
        USAGE_PROFILE_SIGNATURE,
        OTRV4_DOMAIN_SEPARATION,
        &[&pubkey.to_bytes(), &commitment.compress().to_bytes(), msg],
        114,
    );
    let wide: [u8; 114] = digest.try_into().unwrap();
    Scalar::from_bytes_mod_order_wide(&wide.into())
}

impl PrivateScalar {
    /// Signs `msg` with this scalar; the corresponding [`PublicPoint::public`]
    /// is what a peer checks the signature against.
    pub fn sign(&self, msg: &[u8]) -> SchnorrSignature {
        let nonce = PrivateScalar::random();
        let commitment = EdwardsPoint::GENERATOR * nonce.scalar;
        let c = schnorr_challenge(&self.public(), &commitment, msg);
        let r = nonce.scalar - c * self.scalar;
        SchnorrSignature { c, r }
    }
}

/// Verifies a [`SchnorrSignature`] produced by [`PrivateScalar::sign`].
pub fn schnorr_verify(pubkey: &PublicPoint, msg: &[u8], sig: &SchnorrSignature) -> bool {
    let commitment = EdwardsPoint::GENERATOR * sig.r + *pubkey.inner() * sig.c;
    schnorr_challenge(pubkey, &commitment, msg) == sig.c
}

/// An Ed448 public point, kept in both compressed and decompressed form like
/// the reference verifying-key type.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct PublicPoint {
    compressed: CompressedEdwardsY,
    point: EdwardsPoint,
}

impl PublicPoint {
    fn from_point(point: EdwardsPoint) -> Self {
        PublicPoint {
            compressed: point.compress(),
            point,
        }
    }

    pub fn to_bytes(&self) -> [u8; ED448_POINT_BYTES] {
        self.compressed.to_bytes()
    }

    pub fn from_bytes(bytes: &[u8; ED448_POINT_BYTES]) -> Result<Self, PrimitiveError> {
        let compressed = CompressedEdwardsY(*bytes);
        let point = Option::<EdwardsPoint>::from(compressed.decompress())
            .ok_or(PrimitiveError::InvalidPoint)?;
        if bool::from(point.is_identity()) {
            return Err(PrimitiveError::InvalidPoint);
        }
        Ok(PublicPoint { compressed, point })
    }

    pub fn inner(&self) -> &EdwardsPoint {
        &self.point
    }

    /// On-curve, non-identity check; low-order points are rejected by construction
    /// of [`Self::from_bytes`] since the curve has cofactor-free prime order here.
    pub fn is_valid(&self) -> bool {
        !bool::from(self.point.is_identity())
    }
}

impl Debug for PublicPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PublicPoint({:?})", self.compressed)
    }
}

/// A 3072-bit MODP Diffie-Hellman private exponent (RFC 3526 Group 15).
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct DhPrivateKey {
    bytes: [u8; DH_PRIVATE_BYTES],
}

/// A 3072-bit MODP Diffie-Hellman public value.
#[derive(Clone, PartialEq, Eq)]
pub struct DhPublicKey {
    bytes: Vec<u8>,
}

fn dh_modulus() -> &'static BigUint {
    static MODULUS: OnceLock<BigUint> = OnceLock::new();
    MODULUS.get_or_init(|| BigUint::parse_bytes(DH3072_MODULUS_HEX.as_bytes(), 16).unwrap())
}

impl DhPrivateKey {
    pub fn random() -> Self {
        let mut bytes = [0u8; DH_PRIVATE_BYTES];
        OsRng.fill_bytes(&mut bytes);
        DhPrivateKey { bytes }
    }

    pub fn public(&self) -> DhPublicKey {
        let exponent = BigUint::from_bytes_be(&self.bytes);
        let generator = BigUint::from(DH3072_GENERATOR);
        let value = generator.modpow(&exponent, dh_modulus());
        DhPublicKey {
            bytes: value.to_bytes_be(),
        }
    }
}

impl DhPublicKey {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        DhPublicKey {
            bytes: bytes.to_vec(),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn is_valid(&self) -> bool {
        let value = BigUint::from_bytes_be(&self.bytes);
        !value.is_zero() && !value.is_one() && value < *dh_modulus() - BigUint::one()
            && self.bytes.len() <= DH3072_MODULUS_BYTES
    }
}

/// Standard DH: `pub^priv mod p`, returned as the big-endian minimal-length
/// encoding (leading zero bytes stripped) alongside its length.
pub fn dh_shared_secret(priv_key: &DhPrivateKey, pub_key: &DhPublicKey) -> Vec<u8> {
    let base = BigUint::from_bytes_be(&pub_key.bytes);
    let exponent = BigUint::from_bytes_be(&priv_key.bytes);
    let shared = base.modpow(&exponent, dh_modulus());
    shared.to_bytes_be()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kdf_is_deterministic_and_domain_separated() {
        let a = kdf(0x07, "OTRv4", &[b"root", b"ecdh"], 64);
        let b = kdf(0x07, "OTRv4", &[b"root", b"ecdh"], 64);
        let c = kdf(0x08, "OTRv4", &[b"root", b"ecdh"], 64);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn ecdh_is_symmetric() {
        let alice = PrivateScalar::random();
        let bob = PrivateScalar::random();
        let alice_pub = alice.public();
        let bob_pub = bob.public();
        assert_eq!(alice.diffie_hellman(&bob_pub), bob.diffie_hellman(&alice_pub));
    }

    #[test]
    fn point_round_trips_through_bytes() {
        let priv_key = PrivateScalar::random();
        let pub_key = priv_key.public();
        let bytes = pub_key.to_bytes();
        let parsed = PublicPoint::from_bytes(&bytes).unwrap();
        assert_eq!(pub_key, parsed);
    }

    #[test]
    fn dh_shared_secret_is_symmetric() {
        let a = DhPrivateKey::random();
        let b = DhPrivateKey::random();
        let a_pub = a.public();
        let b_pub = b.public();
        assert_eq!(dh_shared_secret(&a, &b_pub), dh_shared_secret(&b, &a_pub));
    }

    #[test]
    fn dh_public_value_is_in_range() {
        let priv_key = DhPrivateKey::random();
        let pub_key = priv_key.public();
        assert!(pub_key.is_valid());
    }

    #[test]
    fn dh_shared_secret_matches_fixed_vector() {
        const PRIV: [u8; DH_PRIVATE_BYTES] = [
            0x37, 0x17, 0x34, 0x73, 0x9b, 0xb1, 0x19, 0x47, 0xcf, 0x7a, 0x07, 0xbc, 0x13, 0x0b,
            0xbf, 0x00, 0x00, 0xb9, 0x67, 0x80, 0xc6, 0x2a, 0x5e, 0x4b, 0x2c, 0x4a, 0x9b, 0x9c,
            0x00, 0xe7, 0x97, 0x56, 0x11, 0xe0, 0x92, 0xe0, 0xe1, 0x8c, 0x88, 0xec, 0xc5, 0xed,
            0x24, 0xf4, 0x85, 0xa8, 0x17, 0x53, 0x8c, 0x3b, 0x6b, 0x21, 0x23, 0x70, 0x30, 0x95,
            0x94, 0xe2, 0xab, 0xaf, 0x1b, 0xd0, 0xd5, 0xfd, 0x7b, 0x75, 0x6b, 0x76, 0x80, 0xdf,
            0x39, 0xb0, 0x2b, 0x41, 0x9f, 0xf6, 0xe6, 0x7f, 0x50, 0x54,
        ];
        const PUB: [u8; DH3072_MODULUS_BYTES] = [
            0xca, 0x14, 0x64, 0xe3, 0x6a, 0x5f, 0xcb, 0xe7, 0x60, 0xe6, 0x4d, 0x6a, 0xcd, 0x20,
            0x46, 0xc6, 0x85, 0x2a, 0xa3, 0x98, 0xc8, 0x4d, 0xac, 0x7a, 0x82, 0x5a, 0x8d, 0xd8,
            0x34, 0x7c, 0xc7, 0x7a, 0x46, 0x1c, 0x3f, 0xe1, 0xa5, 0x7e, 0x21, 0x0c, 0xf3, 0xd5,
            0xf3, 0x0a, 0x58, 0x5f, 0x57, 0xbc, 0x6d, 0xe9, 0xf2, 0x4b, 0xb3, 0x93, 0xa8, 0x51,
            0x90, 0x3e, 0xc9, 0x15, 0xe4, 0xc6, 0x43, 0x76, 0xcf, 0xef, 0x6a, 0x33, 0xae, 0xf3,
            0x73, 0x1d, 0xd2, 0x05, 0x2b, 0x36, 0xe9, 0xf0, 0x1b, 0xc8, 0x0b, 0x41, 0xaa, 0xcb,
            0x21, 0xe6, 0xd1, 0xf4, 0xda, 0x34, 0xf8, 0xb4, 0x42, 0xb7, 0x9d, 0x5f, 0x6e, 0x55,
            0x52, 0x8b, 0x76, 0xd1, 0x35, 0x48, 0x78, 0x53, 0xf9, 0xf7, 0x70, 0xff, 0x75, 0xc6,
            0x73, 0xba, 0x58, 0x1a, 0xdf, 0x51, 0x69, 0xf4, 0x5c, 0xfd, 0x04, 0xca, 0x73, 0x61,
            0xaf, 0x69, 0x1c, 0x5b, 0xcf, 0xb9, 0x87, 0x3b, 0x85, 0xa7, 0x76, 0xd5, 0x77, 0xad,
            0x99, 0x43, 0x81, 0x07, 0xe3, 0x14, 0xec, 0x86, 0xe6, 0xcf, 0xbd, 0xa2, 0x23, 0xe6,
            0x7f, 0x1e, 0x87, 0xdd, 0x6c, 0x06, 0x4b, 0x49, 0xd8, 0x3d, 0x38, 0x6e, 0xc7, 0x63,
            0x40, 0x68, 0x72, 0xa6, 0x6b, 0x64, 0xbb, 0xb1, 0x37, 0x85, 0x01, 0xcb, 0xbf, 0x77,
            0x46, 0x14, 0xdf, 0x74, 0x55, 0x52, 0x64, 0x01, 0xc4, 0xdb, 0xd3, 0xdb, 0x8a, 0x90,
            0xc8, 0xe9, 0xa2, 0xa2, 0x51, 0x3c, 0x97, 0xea, 0x48, 0x38, 0x76, 0x0f, 0x75, 0x61,
            0x30, 0x7c, 0xe6, 0x9b, 0x0a, 0x2e, 0xe2, 0x94, 0x82, 0xe5, 0x6d, 0xe0, 0x2d, 0xa9,
            0x8d, 0x40, 0x22, 0xcf, 0xd2, 0x1a, 0x3b, 0xea, 0xa8, 0xaa, 0xbd, 0x6b, 0x8a, 0x7c,
            0xd6, 0xe1, 0xe8, 0x35, 0x66, 0x1a, 0xb7, 0xa5, 0x32, 0x0b, 0x06, 0xeb, 0xa9, 0xc1,
            0x8d, 0x7b, 0x9a, 0x5b, 0xa5, 0x9a, 0x62, 0x4e, 0x2e, 0x2f, 0xe8, 0xec, 0xbc, 0xc1,
            0xcb, 0x87, 0x79, 0x3e, 0x32, 0xae, 0x66, 0xaa, 0x52, 0xfd, 0xa2, 0x97, 0xbd, 0x95,
            0xff, 0x82, 0xfc, 0x38, 0x05, 0x45, 0x7d, 0x71, 0x20, 0x83, 0x37, 0x3f, 0xd8, 0x71,
            0xda, 0x21, 0xd7, 0x12, 0xa2, 0x3d, 0x9a, 0x64, 0xb8, 0x6e, 0xa1, 0x0b, 0x2b, 0xb3,
            0xef, 0xee, 0x37, 0xfc, 0xb2, 0x95, 0xdc, 0x89, 0x4d, 0x0c, 0x1c, 0x99, 0x6f, 0x4a,
            0xc6, 0x74, 0x64, 0xd5, 0x13, 0x4c, 0x59, 0xf5, 0xcf, 0x6a, 0x72, 0xfe, 0xd5, 0xbe,
            0x08, 0x93, 0x74, 0x69, 0x35, 0xea, 0x82, 0x62, 0x4e, 0x0b, 0xdb, 0xd0, 0xec, 0x1c,
            0xe6, 0x1d, 0x02, 0xb4, 0xae, 0x2b, 0x16, 0xce, 0x21, 0xa6, 0x05, 0xf5, 0x73, 0x54,
            0x52, 0x7f, 0x7d, 0x3e, 0xbe, 0xf0, 0x30, 0x54, 0xf6, 0x6f, 0xf6, 0x4e, 0x15, 0x6b,
            0xc3, 0x01, 0x58, 0x7d, 0xbf, 0x9d,
        ];
        const EXPECTED: [u8; 383] = [
            0x1e, 0xe9, 0xef, 0x72, 0xaf, 0x08, 0x96, 0xd9, 0x2d, 0x1c, 0x9e, 0x7d, 0x4b, 0x7d,
            0xdf, 0x01, 0x4a, 0x8e, 0x45, 0x7f, 0x64, 0x4c, 0xa2, 0xd1, 0x16, 0x84, 0xe2, 0xc7,
            0x6e, 0x58, 0x16, 0x0d, 0xcc, 0xc3, 0x40, 0x04, 0x76, 0x20, 0x7b, 0xeb, 0x39, 0xbe,
            0x61, 0x10, 0xfe, 0xc4, 0x73, 0x8a, 0x41, 0x00, 0x8b, 0xee, 0xc7, 0x99, 0x79, 0xa1,
            0x18, 0x35, 0x40, 0x2e, 0x98, 0x72, 0xef, 0xff, 0x10, 0x1d, 0x8a, 0x6d, 0x63, 0x69,
            0x90, 0x7f, 0x66, 0xce, 0x61, 0x7c, 0x39, 0x25, 0xef, 0xd6, 0x1f, 0x55, 0x31, 0xe3,
            0x0b, 0xb4, 0x65, 0x55, 0x86, 0xd1, 0xcb, 0x87, 0x3c, 0x0e, 0xb2, 0x6b, 0x20, 0x40,
            0x9c, 0xd9, 0xa7, 0xb0, 0xeb, 0x6c, 0x41, 0xb6, 0x61, 0x2a, 0xa2, 0x95, 0x27, 0x8a,
            0x0c, 0xd4, 0xae, 0xc1, 0xa5, 0x23, 0xcd, 0x71, 0x17, 0xeb, 0x94, 0xeb, 0x64, 0x9f,
            0x94, 0x2e, 0x59, 0x83, 0xd4, 0xd0, 0x41, 0xb5, 0x93, 0x0b, 0x75, 0x9c, 0x67, 0x1b,
            0x18, 0x91, 0xc7, 0x35, 0xa7, 0xaf, 0x60, 0xaf, 0xc5, 0xae, 0x85, 0xa1, 0xcb, 0xe1,
            0xef, 0x8e, 0xf6, 0x43, 0x00, 0xc2, 0xb8, 0xdc, 0xd2, 0x83, 0xb3, 0x5e, 0xc4, 0xf2,
            0x75, 0x59, 0x26, 0xd6, 0x3f, 0x04, 0xd5, 0x56, 0xbf, 0x92, 0xa8, 0x89, 0x31, 0x36,
            0xb2, 0xdc, 0x6a, 0xa0, 0xc3, 0xbb, 0xb0, 0x98, 0x92, 0x4f, 0xb9, 0x55, 0x82, 0xb1,
            0xd7, 0x8f, 0x04, 0x4c, 0x88, 0xed, 0xd9, 0x9c, 0xdb, 0x65, 0xbb, 0x46, 0x95, 0x7c,
            0x9a, 0xaf, 0xac, 0xc5, 0x66, 0x3d, 0xca, 0x66, 0xd9, 0xaa, 0x4f, 0xb5, 0x93, 0xdb,
            0x4e, 0xd7, 0x1d, 0xbc, 0x71, 0x08, 0x30, 0x3b, 0x54, 0x71, 0x22, 0x0f, 0xd3, 0x26,
            0xdf, 0xf0, 0xc1, 0xf1, 0x7b, 0xb6, 0x44, 0x40, 0x92, 0x41, 0xb8, 0x77, 0x1b, 0xa3,
            0xdd, 0x76, 0x7f, 0x9c, 0x92, 0xf0, 0x12, 0xaa, 0xe4, 0x5f, 0x80, 0x4f, 0xc5, 0x5f,
            0x03, 0xc7, 0xdd, 0xf6, 0x6a, 0xf3, 0x5c, 0x6d, 0x11, 0x2f, 0x3f, 0x7c, 0x57, 0x90,
            0x33, 0xcb, 0x1a, 0x46, 0x1c, 0xfa, 0xc4, 0x74, 0x8b, 0x7d, 0xc3, 0x59, 0xba, 0x25,
            0x90, 0x55, 0xf5, 0x7a, 0xf8, 0x73, 0x5f, 0xe2, 0x40, 0x4d, 0x51, 0xf8, 0x00, 0xd3,
            0x8c, 0x8c, 0x52, 0x75, 0x65, 0x32, 0x62, 0xc3, 0x37, 0x48, 0x1f, 0x3a, 0xb9, 0x1e,
            0xfb, 0xc2, 0x7e, 0x32, 0x77, 0x52, 0x69, 0xa1, 0xad, 0x0f, 0x85, 0xff, 0x20, 0xda,
            0xa8, 0x59, 0x9f, 0x6d, 0x23, 0x5d, 0x74, 0xb0, 0x49, 0x87, 0x5b, 0xa2, 0x29, 0xd1,
            0x9b, 0xdc, 0xbc, 0xb2, 0x9d, 0x97, 0x68, 0xb0, 0x93, 0x5b, 0x25, 0xe0, 0x5c, 0x0d,
            0x45, 0xa6, 0xc7, 0x9c, 0x9a, 0xd8, 0x8b, 0xdf, 0xdc, 0xca, 0x4b, 0x9b, 0x01, 0x1b,
            0x09, 0xad, 0x43, 0x3d, 0x1d,
        ];
        let priv_key = DhPrivateKey { bytes: PRIV };
        let pub_key = DhPublicKey::from_bytes(&PUB);
        let secret = dh_shared_secret(&priv_key, &pub_key);
        assert_eq!(secret.len(), 383);
        assert_eq!(secret, EXPECTED.to_vec());
    }

    #[test]
    fn schnorr_signature_round_trips_and_verifies() {
        let priv_key = PrivateScalar::random();
        let pub_key = priv_key.public();
        let sig = priv_key.sign(b"profile body");
        assert!(schnorr_verify(&pub_key, b"profile body", &sig));
        let bytes = sig.to_bytes();
        let parsed = SchnorrSignature::from_bytes(&bytes).unwrap();
        assert!(schnorr_verify(&pub_key, b"profile body", &parsed));
    }

    #[test]
    fn schnorr_signature_rejects_tampered_message() {
        let priv_key = PrivateScalar::random();
        let pub_key = priv_key.public();
        let sig = priv_key.sign(b"profile body");
        assert!(!schnorr_verify(&pub_key, b"different body", &sig));
    }
}
