//! Client Profile and Prekey Profile: the signed, long-lived identity
//! descriptors exchanged during the DAKE. Canonical serialization order
//! follows the body layout used for signing, so `validate` always checks the
//! exact bytes that were signed. Both profiles are signed with the same
//! long-term scalar a DAKE transcript's ring signature authenticates against,
//! via [`PrivateScalar::sign`].

use crate::constants::{ED448_SIGNATURE_BYTES, RESERVED_INSTANCE_TAG_MAX};
use crate::errors::ProfileError;
use crate::primitives::{schnorr_verify, PrivateScalar, PublicPoint, SchnorrSignature};

/// Long-lived client identity descriptor: long-term key, forging key, allowed
/// versions, expiration, optional transitional signature, and a signature
/// over all of the above.
#[derive(Clone)]
pub struct ClientProfile {
    pub instance_tag: u32,
    pub public_key: PublicPoint,
    pub forging_key: PublicPoint,
    pub versions: String,
    pub expires: i64,
    pub transitional_signature: Option<[u8; 40]>,
    signature: [u8; ED448_SIGNATURE_BYTES],
}

impl ClientProfile {
    /// Builds and signs a fresh profile with the given long-term identity scalar.
    pub fn build(
        identity_key: &PrivateScalar,
        instance_tag: u32,
        forging_key: PublicPoint,
        versions: &str,
        expires: i64,
        transitional_signature: Option<[u8; 40]>,
    ) -> Self {
        let public_key = identity_key.public();
        let mut profile = ClientProfile {
            instance_tag,
            public_key,
            forging_key,
            versions: versions.to_string(),
            expires,
            transitional_signature,
            signature: [0u8; ED448_SIGNATURE_BYTES],
        };
        let body = profile.body();
        let sig = identity_key.sign(&body);
        profile.signature = sig.to_bytes();
        profile
    }

    /// The canonical signed body: `instance_tag | public_key | forging_key |
    /// versions | expires | [transitional_sig?]`.
    fn body(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&self.instance_tag.to_be_bytes());
        out.extend_from_slice(&self.public_key.to_bytes());
        out.extend_from_slice(&self.forging_key.to_bytes());
        out.extend_from_slice(&(self.versions.len() as u32).to_be_bytes());
        out.extend_from_slice(self.versions.as_bytes());
        out.extend_from_slice(&self.expires.to_be_bytes());
        match &self.transitional_signature {
            None => out.push(0u8),
            Some(sig) => {
                out.push(1u8);
                out.extend_from_slice(sig);
            }
        }
        out
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = self.body();
        out.extend_from_slice(&self.signature);
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProfileError> {
        let mut cursor = 0usize;
        let take = |cursor: &mut usize, n: usize| -> Result<&[u8], ProfileError> {
            let end = *cursor + n;
            let slice = bytes.get(*cursor..end).ok_or(ProfileError::EmptyVersions)?;
            *cursor = end;
            Ok(slice)
        };

        let instance_tag = u32::from_be_bytes(take(&mut cursor, 4)?.try_into().unwrap());
        let public_key = PublicPoint::from_bytes(take(&mut cursor, 57)?.try_into().unwrap())?;
        let forging_key = PublicPoint::from_bytes(take(&mut cursor, 57)?.try_into().unwrap())?;
        let versions_len = u32::from_be_bytes(take(&mut cursor, 4)?.try_into().unwrap()) as usize;
        let versions = String::from_utf8_lossy(take(&mut cursor, versions_len)?).into_owned();
        let expires = i64::from_be_bytes(take(&mut cursor, 8)?.try_into().unwrap());
        let transitional_signature = match take(&mut cursor, 1)?[0] {
            0 => None,
            _ => Some(take(&mut cursor, 40)?.try_into().unwrap()),
        };
        let signature: [u8; ED448_SIGNATURE_BYTES] =
            take(&mut cursor, ED448_SIGNATURE_BYTES)?.try_into().unwrap();

        Ok(ClientProfile {
            instance_tag,
            public_key,
            forging_key,
            versions,
            expires,
            transitional_signature,
            signature,
        })
    }

    /// Signature verification, instance-tag sanity, expiry, and on-curve checks.
    pub fn validate(&self, expected_instance_tag: u32, now: i64) -> Result<(), ProfileError> {
        if self.instance_tag == 0
            || self.instance_tag < RESERVED_INSTANCE_TAG_MAX
            || self.instance_tag != expected_instance_tag
        {
            return Err(ProfileError::InvalidInstanceTag);
        }
        if self.expires <= now {
            return Err(ProfileError::Expired);
        }
        if self.versions.is_empty() {
            return Err(ProfileError::EmptyVersions);
        }
        if !self.public_key.is_valid() || !self.forging_key.is_valid() {
            return Err(ProfileError::InvalidKey(crate::errors::PrimitiveError::InvalidPoint));
        }
        if self.signature == [0u8; ED448_SIGNATURE_BYTES] {
            return Err(ProfileError::InvalidSignature);
        }
        let signature = SchnorrSignature::from_bytes(&self.signature)
            .map_err(|_| ProfileError::InvalidSignature)?;
        if !schnorr_verify(&self.public_key, &self.body(), &signature) {
            return Err(ProfileError::InvalidSignature);
        }
        Ok(())
    }
}

/// Ephemeral shared-prekey descriptor, signed with the owner's long-term key.
#[derive(Clone)]
pub struct PrekeyProfile {
    pub instance_tag: u32,
    pub expires: i64,
    pub shared_prekey_pub: PublicPoint,
    signature: [u8; ED448_SIGNATURE_BYTES],
    /// Local persistence metadata: not part of the signed body or the wire
    /// form exchanged with peers, carried only when the host chooses to
    /// persist the profile.
    pub should_publish: Option<bool>,
}

impl PrekeyProfile {
    pub fn build(
        identity_key: &PrivateScalar,
        instance_tag: u32,
        shared_prekey_pub: PublicPoint,
        expires: i64,
    ) -> Self {
        let mut profile = PrekeyProfile {
            instance_tag,
            expires,
            shared_prekey_pub,
            signature: [0u8; ED448_SIGNATURE_BYTES],
            should_publish: None,
        };
        let body = profile.body();
        let sig = identity_key.sign(&body);
        profile.signature = sig.to_bytes();
        profile
    }

    fn body(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&self.instance_tag.to_be_bytes());
        out.extend_from_slice(&self.expires.to_be_bytes());
        out.extend_from_slice(&self.shared_prekey_pub.to_bytes());
        out
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = self.body();
        out.extend_from_slice(&self.signature);
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProfileError> {
        let mut cursor = 0usize;
        let take = |cursor: &mut usize, n: usize| -> Result<&[u8], ProfileError> {
            let end = *cursor + n;
            let slice = bytes.get(*cursor..end).ok_or(ProfileError::EmptyVersions)?;
            *cursor = end;
            Ok(slice)
        };
        let instance_tag = u32::from_be_bytes(take(&mut cursor, 4)?.try_into().unwrap());
        let expires = i64::from_be_bytes(take(&mut cursor, 8)?.try_into().unwrap());
        let shared_prekey_pub = PublicPoint::from_bytes(take(&mut cursor, 57)?.try_into().unwrap())?;
        let signature: [u8; ED448_SIGNATURE_BYTES] =
            take(&mut cursor, ED448_SIGNATURE_BYTES)?.try_into().unwrap();
        Ok(PrekeyProfile {
            instance_tag,
            expires,
            shared_prekey_pub,
            signature,
            should_publish: None,
        })
    }

    pub fn validate(
        &self,
        expected_instance_tag: u32,
        now: i64,
        owner_key: &PublicPoint,
    ) -> Result<(), ProfileError> {
        if self.instance_tag != expected_instance_tag {
            return Err(ProfileError::InvalidInstanceTag);
        }
        if self.expires <= now {
            return Err(ProfileError::Expired);
        }
        if !self.shared_prekey_pub.is_valid() {
            return Err(ProfileError::InvalidKey(crate::errors::PrimitiveError::InvalidPoint));
        }
        if self.signature == [0u8; ED448_SIGNATURE_BYTES] {
            return Err(ProfileError::InvalidSignature);
        }
        let signature = SchnorrSignature::from_bytes(&self.signature)
            .map_err(|_| ProfileError::InvalidSignature)?;
        if !schnorr_verify(owner_key, &self.body(), &signature) {
            return Err(ProfileError::InvalidSignature);
        }
        Ok(())
    }
}
