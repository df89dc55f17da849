//! Custom error types used throughout the protocol implementation.
//! Each subsystem gets its own enum with a hand-written `Display` and `std::error::Error`
//! impl, plus `From` conversions from the library errors it wraps. [`OtrError`] unifies
//! all of them for the session-level API.

use std::array::TryFromSliceError;
use std::fmt::{Display, Formatter};

/// Errors from scalar/point/KDF primitives (component A).
#[derive(Debug)]
pub enum PrimitiveError {
    /// A point failed decompression, was the identity, or was otherwise not on-curve.
    InvalidPoint,
    /// A scalar was not a canonical reduced representative.
    InvalidScalar,
    /// A fixed-size field did not have the expected length.
    InvalidLength(TryFromSliceError),
}

impl Display for PrimitiveError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            PrimitiveError::InvalidPoint => write!(f, "invalid or low-order point"),
            PrimitiveError::InvalidScalar => write!(f, "non-canonical scalar"),
            PrimitiveError::InvalidLength(e) => write!(f, "invalid field length: {}", e),
        }
    }
}

impl std::error::Error for PrimitiveError {}

impl From<TryFromSliceError> for PrimitiveError {
    fn from(value: TryFromSliceError) -> Self {
        PrimitiveError::InvalidLength(value)
    }
}

/// Errors from the 3-of-3 ring signature (component B).
#[derive(Debug)]
pub enum RingSigError {
    /// The signing key's public component is not one of the three named identities.
    KeyNotInRing,
    /// The challenge check failed; `Verify` does not distinguish further reasons.
    VerificationFailed,
    /// A wire-encoded signature did not have `RING_SIG_BYTES` length.
    Malformed(PrimitiveError),
}

impl Display for RingSigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            RingSigError::KeyNotInRing => write!(f, "signing key is not one of the ring's public keys"),
            RingSigError::VerificationFailed => write!(f, "ring signature verification failed"),
            RingSigError::Malformed(e) => write!(f, "malformed ring signature: {}", e),
        }
    }
}

impl std::error::Error for RingSigError {}

impl From<PrimitiveError> for RingSigError {
    fn from(value: PrimitiveError) -> Self {
        RingSigError::Malformed(value)
    }
}

/// Errors from Client/Prekey Profile handling (component C).
#[derive(Debug)]
pub enum ProfileError {
    /// Profile signature did not verify, or was the all-zero placeholder.
    InvalidSignature,
    /// `expires <= now`.
    Expired,
    /// Instance tag is zero, or falls in the reserved `0..0x100` range.
    InvalidInstanceTag,
    /// `public_key` or `forging_key` failed point validation.
    InvalidKey(PrimitiveError),
    /// `versions` was empty.
    EmptyVersions,
    /// Fixed-size field did not parse.
    Malformed(PrimitiveError),
}

impl Display for ProfileError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ProfileError::InvalidSignature => write!(f, "invalid profile signature"),
            ProfileError::Expired => write!(f, "profile has expired"),
            ProfileError::InvalidInstanceTag => write!(f, "instance tag is zero or reserved"),
            ProfileError::InvalidKey(e) => write!(f, "invalid profile key: {}", e),
            ProfileError::EmptyVersions => write!(f, "versions field is empty"),
            ProfileError::Malformed(e) => write!(f, "malformed profile: {}", e),
        }
    }
}

impl std::error::Error for ProfileError {}

impl From<PrimitiveError> for ProfileError {
    fn from(value: PrimitiveError) -> Self {
        ProfileError::Malformed(value)
    }
}

/// Errors from the DAKE handshake (component D).
#[derive(Debug)]
pub enum DakeError {
    /// A peer Client Profile or Prekey Profile failed validation.
    InvalidProfile(ProfileError),
    /// The transcript ring signature did not verify.
    InvalidSignature(RingSigError),
    /// `receiver_itag` did not match the local instance tag.
    InstanceTagMismatch,
    /// A message arrived that is not legal in the current DAKE state.
    UnexpectedMessage,
    /// A wire field failed to parse.
    Malformed(PrimitiveError),
    /// The ratchet rejected the bundled initial Data Message of a non-interactive flight.
    Ratchet(RatchetError),
    /// The bundled initial Data Message failed to authenticate or decode.
    Message(MessageError),
}

impl Display for DakeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            DakeError::InvalidProfile(e) => write!(f, "invalid profile in DAKE: {}", e),
            DakeError::InvalidSignature(e) => write!(f, "invalid DAKE transcript signature: {}", e),
            DakeError::InstanceTagMismatch => write!(f, "receiver instance tag mismatch"),
            DakeError::UnexpectedMessage => write!(f, "unexpected DAKE message for current state"),
            DakeError::Malformed(e) => write!(f, "malformed DAKE message: {}", e),
            DakeError::Ratchet(e) => write!(f, "ratchet rejected non-interactive initial message: {}", e),
            DakeError::Message(e) => write!(f, "non-interactive initial message failed: {}", e),
        }
    }
}

impl std::error::Error for DakeError {}

impl From<ProfileError> for DakeError {
    fn from(value: ProfileError) -> Self {
        DakeError::InvalidProfile(value)
    }
}

impl From<RingSigError> for DakeError {
    fn from(value: RingSigError) -> Self {
        DakeError::InvalidSignature(value)
    }
}

impl From<PrimitiveError> for DakeError {
    fn from(value: PrimitiveError) -> Self {
        DakeError::Malformed(value)
    }
}

impl From<RatchetError> for DakeError {
    fn from(value: RatchetError) -> Self {
        DakeError::Ratchet(value)
    }
}

impl From<MessageError> for DakeError {
    fn from(value: MessageError) -> Self {
        DakeError::Message(value)
    }
}

/// Errors from the double ratchet / key manager (component E).
#[derive(Debug)]
pub enum RatchetError {
    /// A message header did not have the expected length.
    InvalidHeaderLength(usize),
    /// A skipped-key derivation would exceed `max_skip`.
    MaxSkipsExceeded,
    /// Underlying scalar/point failure while deriving ratchet keys.
    PrimitiveFailure(PrimitiveError),
    /// Data type conversion failure (fixed buffer size mismatch).
    ConversionError,
    /// `i`, `j`, `k`, or `pn` would advance past `u32::MAX`.
    CounterOverflow,
}

impl Display for RatchetError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            RatchetError::InvalidHeaderLength(n) => write!(f, "invalid header length: {}", n),
            RatchetError::MaxSkipsExceeded => write!(f, "max skips exceeded"),
            RatchetError::PrimitiveFailure(e) => write!(f, "ratchet primitive failure: {}", e),
            RatchetError::ConversionError => write!(f, "conversion error"),
            RatchetError::CounterOverflow => write!(f, "ratchet counter would overflow u32"),
        }
    }
}

impl std::error::Error for RatchetError {}

impl From<PrimitiveError> for RatchetError {
    fn from(value: PrimitiveError) -> Self {
        RatchetError::PrimitiveFailure(value)
    }
}

/// Errors from data message / TLV handling (component F).
#[derive(Debug)]
pub enum MessageError {
    /// Frame too short, length-prefix mismatch, or trailing garbage.
    MalformedFrame,
    /// The MAC over the frame did not match.
    AuthFailure,
    /// The MAC matched but the decrypted TLV chain did not parse.
    DecryptionFailure,
    /// Ratchet-level failure surfaced while deriving message keys.
    Ratchet(RatchetError),
}

impl Display for MessageError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageError::MalformedFrame => write!(f, "malformed data message frame"),
            MessageError::AuthFailure => write!(f, "data message MAC check failed"),
            MessageError::DecryptionFailure => write!(f, "TLV chain failed to parse after decryption"),
            MessageError::Ratchet(e) => write!(f, "ratchet error while handling message: {}", e),
        }
    }
}

impl std::error::Error for MessageError {}

impl From<RatchetError> for MessageError {
    fn from(value: RatchetError) -> Self {
        MessageError::Ratchet(value)
    }
}

/// Top-level error unifying every subsystem for the session-level API (component G, §7).
#[derive(Debug)]
pub enum OtrError {
    /// Parse failure, length mismatch, or bad base64 armor.
    MalformedFrame,
    /// Unsupported protocol version field.
    UnknownVersion,
    /// `receiver_itag` does not match the local instance tag.
    InstanceTagMismatch,
    /// Signature/expiry/point-validity failure during DAKE.
    InvalidProfile(ProfileError),
    /// Ring signature or data-message MAC check failed.
    AuthFailure,
    /// Incoming `j` exceeds `max_skip` beyond the current chain.
    OutOfOrderTooFar,
    /// MAC passed but TLV decode failed.
    DecryptionFailure,
    /// Operation illegal in the current session state.
    StateError,
    /// Offered version excluded by the local allowed-versions policy.
    PolicyError,
    /// A lower-level DAKE failure not already covered above.
    Dake(DakeError),
    /// A lower-level message/ratchet failure not already covered above.
    Message(MessageError),
}

impl Display for OtrError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            OtrError::MalformedFrame => write!(f, "malformed frame"),
            OtrError::UnknownVersion => write!(f, "unknown protocol version"),
            OtrError::InstanceTagMismatch => write!(f, "instance tag mismatch"),
            OtrError::InvalidProfile(e) => write!(f, "invalid profile: {}", e),
            OtrError::AuthFailure => write!(f, "authentication failure"),
            OtrError::OutOfOrderTooFar => write!(f, "message too far out of order"),
            OtrError::DecryptionFailure => write!(f, "decryption failure"),
            OtrError::StateError => write!(f, "operation illegal in current session state"),
            OtrError::PolicyError => write!(f, "version excluded by local policy"),
            OtrError::Dake(e) => write!(f, "DAKE error: {}", e),
            OtrError::Message(e) => write!(f, "message error: {}", e),
        }
    }
}

impl std::error::Error for OtrError {}

impl From<ProfileError> for OtrError {
    fn from(value: ProfileError) -> Self {
        OtrError::InvalidProfile(value)
    }
}

impl From<DakeError> for OtrError {
    fn from(value: DakeError) -> Self {
        OtrError::Dake(value)
    }
}

impl From<MessageError> for OtrError {
    fn from(value: MessageError) -> Self {
        OtrError::Message(value)
    }
}
