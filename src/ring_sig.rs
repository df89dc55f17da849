//! 3-of-3 ring signature (signature of knowledge) over Ed448: proves that the
//! signer knows the private scalar behind one of three named public points,
//! without revealing which, providing the deniability DAKE relies on.

use ed448_goldilocks::{EdwardsPoint, Scalar};

use crate::constants::{OTRV4_DOMAIN_SEPARATION, USAGE_RING_SIGNATURE_AUTH};
use crate::errors::RingSigError;
use crate::primitives::{ct_eq, kdf, PrivateScalar, PublicPoint};

/// The six scalars `(c1, r1, c2, r2, c3, r3)`, in fixed positional order.
#[derive(Clone)]
pub struct RingSignature {
    c: [Scalar; 3],
    r: [Scalar; 3],
}

const SCALAR_BYTES: usize = 57;

impl RingSignature {
    pub fn to_bytes(&self) -> [u8; 6 * SCALAR_BYTES] {
        let mut out = [0u8; 6 * SCALAR_BYTES];
        for i in 0..3 {
            out[i * 2 * SCALAR_BYTES..i * 2 * SCALAR_BYTES + SCALAR_BYTES]
                .copy_from_slice(&self.c[i].to_bytes());
            out[i * 2 * SCALAR_BYTES + SCALAR_BYTES..(i + 1) * 2 * SCALAR_BYTES]
                .copy_from_slice(&self.r[i].to_bytes());
        }
        out
    }

    pub fn from_bytes(bytes: &[u8; 6 * SCALAR_BYTES]) -> Result<Self, RingSigError> {
        let mut c = [Scalar::ZERO; 3];
        let mut r = [Scalar::ZERO; 3];
        for i in 0..3 {
            let c_bytes: [u8; SCALAR_BYTES] = bytes
                [i * 2 * SCALAR_BYTES..i * 2 * SCALAR_BYTES + SCALAR_BYTES]
                .try_into()
                .unwrap();
            let r_bytes: [u8; SCALAR_BYTES] = bytes
                [i * 2 * SCALAR_BYTES + SCALAR_BYTES..(i + 1) * 2 * SCALAR_BYTES]
                .try_into()
                .unwrap();
            c[i] = Option::from(Scalar::from_canonical_bytes(c_bytes.into()))
                .ok_or(RingSigError::VerificationFailed)?;
            r[i] = Option::from(Scalar::from_canonical_bytes(r_bytes.into()))
                .ok_or(RingSigError::VerificationFailed)?;
        }
        Ok(RingSignature { c, r })
    }
}

fn challenge(rings: &[PublicPoint; 3], commitments: &[EdwardsPoint; 3], msg: &[u8]) -> Scalar {
    let rings_bytes: Vec<[u8; 57]> = rings.iter().map(|p| p.to_bytes()).collect();
    let commitments_bytes: Vec<[u8; 57]> = commitments.iter().map(|p| p.compress().to_bytes()).collect();
    let inputs: Vec<&[u8]> = rings_bytes
        .iter()
        .map(|b| b.as_slice())
        .chain(commitments_bytes.iter().map(|b| b.as_slice()))
        .chain(std::iter::once(msg))
        .collect();
    let digest = kdf(USAGE_RING_SIGNATURE_AUTH, OTRV4_DOMAIN_SEPARATION, &inputs, SCALAR_BYTES);
    let narrow: [u8; SCALAR_BYTES] = digest.try_into().unwrap();
    Scalar::from_bytes_mod_order(&narrow.into())
}

/// Produces a ring signature proving knowledge of `priv`, whose public key must
/// equal one of `rings`. `msg` is the transcript being authenticated.
pub fn authenticate(
    priv_key: &PrivateScalar,
    rings: &[PublicPoint; 3],
    msg: &[u8],
) -> Result<RingSignature, RingSigError> {
    let own_pub = priv_key.public();
    let index = rings
        .iter()
        .position(|p| ct_eq(&p.to_bytes(), &own_pub.to_bytes()))
        .ok_or(RingSigError::KeyNotInRing)?;

    let mut c = [Scalar::ZERO; 3];
    let mut r = [Scalar::ZERO; 3];
    let mut commitments = [EdwardsPoint::IDENTITY; 3];

    let t = PrivateScalar::random();
    commitments[index] = EdwardsPoint::GENERATOR * t.inner();

    for j in 0..3 {
        if j == index {
            continue;
        }
        let cj = PrivateScalar::random();
        let rj = PrivateScalar::random();
        c[j] = *cj.inner();
        r[j] = *rj.inner();
        commitments[j] = EdwardsPoint::GENERATOR * rj.inner() + rings[j].inner() * cj.inner();
    }

    let overall = challenge(rings, &commitments, msg);
    let sum_others: Scalar = (0..3).filter(|&j| j != index).map(|j| c[j]).sum();
    c[index] = overall - sum_others;
    r[index] = *t.inner() - c[index] * priv_key.inner();

    Ok(RingSignature { c, r })
}

/// Verifies `sigma` was produced by someone knowing a private key behind one of
/// `rings`, over `msg`.
pub fn verify(rings: &[PublicPoint; 3], msg: &[u8], sigma: &RingSignature) -> bool {
    let mut commitments = [EdwardsPoint::IDENTITY; 3];
    for j in 0..3 {
        commitments[j] = EdwardsPoint::GENERATOR * sigma.r[j] + rings[j].inner() * sigma.c[j];
    }
    let overall = challenge(rings, &commitments, msg);
    let sum: Scalar = sigma.c.iter().sum();
    sum == overall
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completeness_each_ring_slot() {
        let alice = PrivateScalar::random();
        let bob = PrivateScalar::random();
        let carol = PrivateScalar::random();
        let rings = [alice.public(), bob.public(), carol.public()];
        let msg = b"auth-r transcript";

        for signer in [&alice, &bob, &carol] {
            let sigma = authenticate(signer, &rings, msg).unwrap();
            assert!(verify(&rings, msg, &sigma));
        }
    }

    #[test]
    fn rejects_signer_not_in_ring() {
        let alice = PrivateScalar::random();
        let bob = PrivateScalar::random();
        let carol = PrivateScalar::random();
        let outsider = PrivateScalar::random();
        let rings = [alice.public(), bob.public(), carol.public()];
        assert!(authenticate(&outsider, &rings, b"msg").is_err());
    }

    #[test]
    fn soundness_message_perturbation() {
        let alice = PrivateScalar::random();
        let bob = PrivateScalar::random();
        let carol = PrivateScalar::random();
        let rings = [alice.public(), bob.public(), carol.public()];
        let sigma = authenticate(&alice, &rings, b"message one").unwrap();
        assert!(!verify(&rings, b"message two", &sigma));
    }

    #[test]
    fn soundness_ring_perturbation() {
        let alice = PrivateScalar::random();
        let bob = PrivateScalar::random();
        let carol = PrivateScalar::random();
        let mallory = PrivateScalar::random();
        let rings = [alice.public(), bob.public(), carol.public()];
        let sigma = authenticate(&alice, &rings, b"msg").unwrap();
        let tampered_rings = [alice.public(), mallory.public(), carol.public()];
        assert!(!verify(&tampered_rings, b"msg", &sigma));
    }
}
