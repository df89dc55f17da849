//! Identity/Auth-R/Auth-I interactive flight, non-interactive DAKE-3 flight,
//! and the transcript hash both ring signatures authenticate. Builds directly
//! on [`crate::ring_sig`] for the signature of knowledge and hands its result
//! straight to [`crate::ratchet::KeyManager::new`].

use crate::constants::{
    AUTH_I_MSG_TYPE, AUTH_R_MSG_TYPE, IDENTITY_MSG_TYPE, NON_INTERACTIVE_AUTH_MSG_TYPE,
    OTRV4_DOMAIN_SEPARATION, PROTOCOL_VERSION, RING_SIG_BYTES, SHARED_SECRET_BYTES, SSID_BYTES,
    TMP_KEY_BYTES, UNKNOWN_INSTANCE_TAG, USAGE_NON_INT_AUTH_ALICE_CLIENT_PROFILE,
    USAGE_NON_INT_AUTH_BOB_CLIENT_PROFILE, USAGE_NON_INT_AUTH_PHI, USAGE_SHARED_SECRET,
    USAGE_SSID, USAGE_TMP_KEY,
};
use crate::errors::DakeError;
use crate::message::{open_data_message, DataMessage, Tlv};
use crate::primitives::{dh_shared_secret, kdf, kdf_fixed, DhPrivateKey, DhPublicKey, PrivateScalar, PublicPoint};
use crate::profile::{ClientProfile, PrekeyProfile};
use crate::ratchet::KeyManager;
use crate::ring_sig::{self, RingSignature};

const AUTH_R_TAG: u8 = 0x00;
const AUTH_I_TAG: u8 = 0x01;
const NON_INT_AUTH_TAG: u8 = 0x02;

/// Bob's half of the interactive flight, held between sending Identity and
/// receiving Auth-R.
pub struct IdentityState {
    own_ecdh: PrivateScalar,
    own_dh: DhPrivateKey,
}

pub struct IdentityMessage {
    pub sender_itag: u32,
    pub receiver_itag: u32,
    pub client_profile: Vec<u8>,
    pub y: [u8; 57],
    pub b: Vec<u8>,
}

/// Reads a big-endian header (version + message type byte), checking the
/// type matches `expected`.
fn read_header(bytes: &[u8], cursor: &mut usize, expected: u8) -> Result<(), DakeError> {
    let version = take(bytes, cursor, 2)?;
    let msg_type = take(bytes, cursor, 1)?[0];
    if u16::from_be_bytes(version.try_into().unwrap()) != PROTOCOL_VERSION || msg_type != expected {
        return Err(DakeError::UnexpectedMessage);
    }
    Ok(())
}

fn take<'a>(bytes: &'a [u8], cursor: &mut usize, n: usize) -> Result<&'a [u8], DakeError> {
    let end = cursor.checked_add(n).ok_or(DakeError::UnexpectedMessage)?;
    let slice = bytes.get(*cursor..end).ok_or(DakeError::UnexpectedMessage)?;
    *cursor = end;
    Ok(slice)
}

fn take_u32(bytes: &[u8], cursor: &mut usize) -> Result<u32, DakeError> {
    Ok(u32::from_be_bytes(take(bytes, cursor, 4)?.try_into().unwrap()))
}

impl IdentityMessage {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&PROTOCOL_VERSION.to_be_bytes());
        out.push(IDENTITY_MSG_TYPE);
        out.extend_from_slice(&self.sender_itag.to_be_bytes());
        out.extend_from_slice(&self.receiver_itag.to_be_bytes());
        out.extend_from_slice(&(self.client_profile.len() as u32).to_be_bytes());
        out.extend_from_slice(&self.client_profile);
        out.extend_from_slice(&self.y);
        out.extend_from_slice(&(self.b.len() as u32).to_be_bytes());
        out.extend_from_slice(&self.b);
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DakeError> {
        let mut cursor = 0usize;
        read_header(bytes, &mut cursor, IDENTITY_MSG_TYPE)?;
        let sender_itag = take_u32(bytes, &mut cursor)?;
        let receiver_itag = take_u32(bytes, &mut cursor)?;
        let profile_len = take_u32(bytes, &mut cursor)? as usize;
        let client_profile = take(bytes, &mut cursor, profile_len)?.to_vec();
        let y: [u8; 57] = take(bytes, &mut cursor, 57)?.try_into().unwrap();
        let b_len = take_u32(bytes, &mut cursor)? as usize;
        let b = take(bytes, &mut cursor, b_len)?.to_vec();
        Ok(IdentityMessage { sender_itag, receiver_itag, client_profile, y, b })
    }
}

/// Bob picks a fresh ephemeral ECDH/DH pair and sends his Client Profile.
pub fn send_identity_message(
    sender_itag: u32,
    client_profile: &ClientProfile,
) -> (IdentityState, IdentityMessage) {
    let own_ecdh = PrivateScalar::random();
    let own_dh = DhPrivateKey::random();
    let message = IdentityMessage {
        sender_itag,
        receiver_itag: UNKNOWN_INSTANCE_TAG,
        client_profile: client_profile.to_bytes(),
        y: own_ecdh.public().to_bytes(),
        b: own_dh.public().as_bytes().to_vec(),
    };
    (IdentityState { own_ecdh, own_dh }, message)
}

/// Alice's retained state between sending Auth-R and receiving Auth-I.
pub struct AliceAuthRState {
    own_ecdh: PrivateScalar,
    own_dh: DhPrivateKey,
    alice_profile: ClientProfile,
    bob_profile: ClientProfile,
    bob_y: PublicPoint,
    bob_b: DhPublicKey,
    phi: Vec<u8>,
}

pub struct AuthRMessage {
    pub sender_itag: u32,
    pub receiver_itag: u32,
    pub client_profile: Vec<u8>,
    pub x: [u8; 57],
    pub a: Vec<u8>,
    pub sigma: [u8; RING_SIG_BYTES],
}

impl AuthRMessage {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&PROTOCOL_VERSION.to_be_bytes());
        out.push(AUTH_R_MSG_TYPE);
        out.extend_from_slice(&self.sender_itag.to_be_bytes());
        out.extend_from_slice(&self.receiver_itag.to_be_bytes());
        out.extend_from_slice(&(self.client_profile.len() as u32).to_be_bytes());
        out.extend_from_slice(&self.client_profile);
        out.extend_from_slice(&self.x);
        out.extend_from_slice(&(self.a.len() as u32).to_be_bytes());
        out.extend_from_slice(&self.a);
        out.extend_from_slice(&self.sigma);
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DakeError> {
        let mut cursor = 0usize;
        read_header(bytes, &mut cursor, AUTH_R_MSG_TYPE)?;
        let sender_itag = take_u32(bytes, &mut cursor)?;
        let receiver_itag = take_u32(bytes, &mut cursor)?;
        let profile_len = take_u32(bytes, &mut cursor)? as usize;
        let client_profile = take(bytes, &mut cursor, profile_len)?.to_vec();
        let x: [u8; 57] = take(bytes, &mut cursor, 57)?.try_into().unwrap();
        let a_len = take_u32(bytes, &mut cursor)? as usize;
        let a = take(bytes, &mut cursor, a_len)?.to_vec();
        let sigma: [u8; RING_SIG_BYTES] = take(bytes, &mut cursor, RING_SIG_BYTES)?.try_into().unwrap();
        Ok(AuthRMessage { sender_itag, receiver_itag, client_profile, x, a, sigma })
    }
}

pub struct AuthIMessage {
    pub sender_itag: u32,
    pub receiver_itag: u32,
    pub sigma: [u8; RING_SIG_BYTES],
}

impl AuthIMessage {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&PROTOCOL_VERSION.to_be_bytes());
        out.push(AUTH_I_MSG_TYPE);
        out.extend_from_slice(&self.sender_itag.to_be_bytes());
        out.extend_from_slice(&self.receiver_itag.to_be_bytes());
        out.extend_from_slice(&self.sigma);
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DakeError> {
        let mut cursor = 0usize;
        read_header(bytes, &mut cursor, AUTH_I_MSG_TYPE)?;
        let sender_itag = take_u32(bytes, &mut cursor)?;
        let receiver_itag = take_u32(bytes, &mut cursor)?;
        let sigma: [u8; RING_SIG_BYTES] = take(bytes, &mut cursor, RING_SIG_BYTES)?.try_into().unwrap();
        Ok(AuthIMessage { sender_itag, receiver_itag, sigma })
    }
}

/// `t = tag || HASH(profile_B) || HASH(profile_A) || Y || X || B || A || HASH(phi)`.
/// Shared by both Auth-R (`tag = 0x00`) and Auth-I (`tag = 0x01`); only the
/// leading byte distinguishes which ring signature is being computed over it.
fn transcript(
    tag: u8,
    profile_b: &[u8],
    profile_a: &[u8],
    y: &PublicPoint,
    x: &PublicPoint,
    b: &DhPublicKey,
    a: &DhPublicKey,
    phi: &[u8],
) -> Vec<u8> {
    let mut out = vec![tag];
    out.extend_from_slice(&kdf(
        USAGE_NON_INT_AUTH_BOB_CLIENT_PROFILE,
        OTRV4_DOMAIN_SEPARATION,
        &[profile_b],
        64,
    ));
    out.extend_from_slice(&kdf(
        USAGE_NON_INT_AUTH_ALICE_CLIENT_PROFILE,
        OTRV4_DOMAIN_SEPARATION,
        &[profile_a],
        64,
    ));
    out.extend_from_slice(&y.to_bytes());
    out.extend_from_slice(&x.to_bytes());
    out.extend_from_slice(b.as_bytes());
    out.extend_from_slice(a.as_bytes());
    out.extend_from_slice(&kdf(USAGE_NON_INT_AUTH_PHI, OTRV4_DOMAIN_SEPARATION, &[phi], 64));
    out
}

fn derive_shared_secret_and_ssid(ecdh_out: &[u8; 56], dh_out: &[u8]) -> ([u8; SHARED_SECRET_BYTES], [u8; SSID_BYTES]) {
    let shared_secret =
        kdf_fixed::<SHARED_SECRET_BYTES>(USAGE_SHARED_SECRET, OTRV4_DOMAIN_SEPARATION, &[ecdh_out, dh_out]);
    let ssid = kdf_fixed::<SSID_BYTES>(USAGE_SSID, OTRV4_DOMAIN_SEPARATION, &[&shared_secret]);
    (shared_secret, ssid)
}

/// Alice receives Bob's Identity message: validates his profile, picks her own
/// ephemeral keys, ring-signs the transcript under `{Bob, Alice, Bob-forging}`,
/// and replies with Auth-R. `phi` is the shared session state (account/protocol
/// identifiers agreed out of band).
pub fn receive_identity_message(
    message: &IdentityMessage,
    local_instance_tag: u32,
    now: i64,
    alice_identity_key: &PrivateScalar,
    alice_profile: &ClientProfile,
    phi: &[u8],
) -> Result<(AliceAuthRState, AuthRMessage), DakeError> {
    let bob_profile = ClientProfile::from_bytes(&message.client_profile)?;
    bob_profile.validate(message.sender_itag, now)?;

    let bob_y = PublicPoint::from_bytes(&message.y)?;
    let bob_b = DhPublicKey::from_bytes(&message.b);
    if !bob_b.is_valid() {
        return Err(DakeError::Malformed(crate::errors::PrimitiveError::InvalidPoint));
    }

    let own_ecdh = PrivateScalar::random();
    let own_dh = DhPrivateKey::random();

    let t = transcript(
        AUTH_R_TAG,
        &bob_profile.to_bytes(),
        &alice_profile.to_bytes(),
        &bob_y,
        &own_ecdh.public(),
        &bob_b,
        &own_dh.public(),
        phi,
    );
    let rings = [bob_profile.public_key, alice_profile.public_key, bob_profile.forging_key];
    let sigma = ring_sig::authenticate(alice_identity_key, &rings, &t)?;

    let auth_r = AuthRMessage {
        sender_itag: local_instance_tag,
        receiver_itag: message.sender_itag,
        client_profile: alice_profile.to_bytes(),
        x: own_ecdh.public().to_bytes(),
        a: own_dh.public().as_bytes().to_vec(),
        sigma: sigma.to_bytes(),
    };

    let state = AliceAuthRState {
        own_ecdh,
        own_dh,
        alice_profile: alice_profile.clone(),
        bob_profile,
        bob_y,
        bob_b,
        phi: phi.to_vec(),
    };

    Ok((state, auth_r))
}

/// Bob receives Alice's Auth-R: validates her profile and ring signature over
/// `{Bob, Alice, Bob-forging}`, derives the shared secret, replies with Auth-I
/// ring-signed under `{Alice, Bob, Alice-forging}`, and is ready to send.
pub fn receive_auth_r_message(
    message: &AuthRMessage,
    bob_state: IdentityState,
    bob_profile: &ClientProfile,
    bob_identity_key: &PrivateScalar,
    local_instance_tag: u32,
    now: i64,
    phi: &[u8],
) -> Result<(AuthIMessage, KeyManager), DakeError> {
    let alice_profile = ClientProfile::from_bytes(&message.client_profile)?;
    alice_profile.validate(message.sender_itag, now)?;

    let alice_x = PublicPoint::from_bytes(&message.x)?;
    let alice_a = DhPublicKey::from_bytes(&message.a);
    if !alice_a.is_valid() {
        return Err(DakeError::Malformed(crate::errors::PrimitiveError::InvalidPoint));
    }

    let bob_y = bob_state.own_ecdh.public();
    let bob_b = bob_state.own_dh.public();
    let t = transcript(AUTH_R_TAG, &bob_profile.to_bytes(), &alice_profile.to_bytes(), &bob_y, &alice_x, &bob_b, &alice_a, phi);
    let rings = [bob_profile.public_key, alice_profile.public_key, bob_profile.forging_key];
    let sigma = RingSignature::from_bytes(&message.sigma).map_err(DakeError::from)?;
    if !ring_sig::verify(&rings, &t, &sigma) {
        return Err(DakeError::InvalidSignature(crate::errors::RingSigError::VerificationFailed));
    }

    let ecdh_out = bob_state.own_ecdh.diffie_hellman(&alice_x);
    let dh_out = dh_shared_secret(&bob_state.own_dh, &alice_a);
    let (shared_secret, ssid) = derive_shared_secret_and_ssid(&ecdh_out, &dh_out);

    let t_prime = transcript(AUTH_I_TAG, &bob_profile.to_bytes(), &alice_profile.to_bytes(), &bob_y, &alice_x, &bob_b, &alice_a, phi);
    let auth_i_rings = [alice_profile.public_key, bob_profile.public_key, alice_profile.forging_key];
    let sigma_prime = ring_sig::authenticate(bob_identity_key, &auth_i_rings, &t_prime)?;

    let auth_i = AuthIMessage {
        sender_itag: local_instance_tag,
        receiver_itag: message.sender_itag,
        sigma: sigma_prime.to_bytes(),
    };

    let key_manager = KeyManager::new(shared_secret, bob_state.own_ecdh, bob_state.own_dh, alice_x, Some(alice_a), ssid);

    Ok((auth_i, key_manager))
}

/// Alice receives Bob's Auth-I: verifies his ring signature over
/// `{Alice, Bob, Alice-forging}`, derives the same shared secret, and is ready
/// to send the first data message (`KeyManager::ratchet_send` bumps `i` to 1).
pub fn receive_auth_i_message(message: &AuthIMessage, state: AliceAuthRState) -> Result<KeyManager, DakeError> {
    let t_prime = transcript(
        AUTH_I_TAG,
        &state.bob_profile.to_bytes(),
        &state.alice_profile.to_bytes(),
        &state.bob_y,
        &state.own_ecdh.public(),
        &state.bob_b,
        &state.own_dh.public(),
        &state.phi,
    );
    let rings = [
        state.alice_profile.public_key,
        state.bob_profile.public_key,
        state.alice_profile.forging_key,
    ];
    let sigma = RingSignature::from_bytes(&message.sigma).map_err(DakeError::from)?;
    if !ring_sig::verify(&rings, &t_prime, &sigma) {
        return Err(DakeError::InvalidSignature(crate::errors::RingSigError::VerificationFailed));
    }

    let ecdh_out = state.own_ecdh.diffie_hellman(&state.bob_y);
    let dh_out = dh_shared_secret(&state.own_dh, &state.bob_b);
    let (shared_secret, ssid) = derive_shared_secret_and_ssid(&ecdh_out, &dh_out);

    Ok(KeyManager::new(shared_secret, state.own_ecdh, state.own_dh, state.bob_y, Some(state.bob_b), ssid))
}

/// A shared-prekey ephemeral published to the prekey server: Bob's
/// non-interactive equivalent of the ECDH/DH pair he'd otherwise send fresh in
/// Identity. Fetched by Alice as part of a Prekey Ensemble; its private half is
/// retained by Bob (see [`PrekeySecrets`]) to process the resulting DAKE-3.
pub struct PrekeyMessage {
    pub owner_instance_tag: u32,
    pub y: [u8; 57],
    pub b: Vec<u8>,
}

impl PrekeyMessage {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&self.owner_instance_tag.to_be_bytes());
        out.extend_from_slice(&self.y);
        out.extend_from_slice(&(self.b.len() as u32).to_be_bytes());
        out.extend_from_slice(&self.b);
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DakeError> {
        let mut cursor = 0usize;
        let owner_instance_tag = take_u32(bytes, &mut cursor)?;
        let y: [u8; 57] = take(bytes, &mut cursor, 57)?.try_into().unwrap();
        let b_len = take_u32(bytes, &mut cursor)? as usize;
        let b = take(bytes, &mut cursor, b_len)?.to_vec();
        Ok(PrekeyMessage { owner_instance_tag, y, b })
    }
}

/// What a host fetches from the prekey server before starting a non-interactive
/// conversation: Bob's long-term identity (Client Profile), his published
/// shared-prekey identity (Prekey Profile), and one ephemeral Prekey Message.
pub struct PrekeyEnsemble {
    pub client_profile: ClientProfile,
    pub prekey_profile: PrekeyProfile,
    pub prekey_message: PrekeyMessage,
}

/// Bob's retained ephemeral secrets behind a published [`PrekeyMessage`] and
/// shared-prekey pair, needed to process the DAKE-3 a server hands him later.
pub struct PrekeySecrets {
    pub y: PrivateScalar,
    pub b: DhPrivateKey,
    pub shared_prekey: PrivateScalar,
}

pub struct NonInteractiveAuthMessage {
    pub sender_itag: u32,
    pub receiver_itag: u32,
    pub client_profile: Vec<u8>,
    pub x: [u8; 57],
    pub a: Vec<u8>,
    pub sigma: [u8; RING_SIG_BYTES],
    pub data_message: Vec<u8>,
}

impl NonInteractiveAuthMessage {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&PROTOCOL_VERSION.to_be_bytes());
        out.push(NON_INTERACTIVE_AUTH_MSG_TYPE);
        out.extend_from_slice(&self.sender_itag.to_be_bytes());
        out.extend_from_slice(&self.receiver_itag.to_be_bytes());
        out.extend_from_slice(&(self.client_profile.len() as u32).to_be_bytes());
        out.extend_from_slice(&self.client_profile);
        out.extend_from_slice(&self.x);
        out.extend_from_slice(&(self.a.len() as u32).to_be_bytes());
        out.extend_from_slice(&self.a);
        out.extend_from_slice(&self.sigma);
        out.extend_from_slice(&(self.data_message.len() as u32).to_be_bytes());
        out.extend_from_slice(&self.data_message);
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DakeError> {
        let mut cursor = 0usize;
        read_header(bytes, &mut cursor, NON_INTERACTIVE_AUTH_MSG_TYPE)?;
        let sender_itag = take_u32(bytes, &mut cursor)?;
        let receiver_itag = take_u32(bytes, &mut cursor)?;
        let profile_len = take_u32(bytes, &mut cursor)? as usize;
        let client_profile = take(bytes, &mut cursor, profile_len)?.to_vec();
        let x: [u8; 57] = take(bytes, &mut cursor, 57)?.try_into().unwrap();
        let a_len = take_u32(bytes, &mut cursor)? as usize;
        let a = take(bytes, &mut cursor, a_len)?.to_vec();
        let sigma: [u8; RING_SIG_BYTES] = take(bytes, &mut cursor, RING_SIG_BYTES)?.try_into().unwrap();
        let data_len = take_u32(bytes, &mut cursor)? as usize;
        let data_message = take(bytes, &mut cursor, data_len)?.to_vec();
        Ok(NonInteractiveAuthMessage { sender_itag, receiver_itag, client_profile, x, a, sigma, data_message })
    }
}

/// `tmp_key = KDF(k_ecdh_long_term || k_ecdh_prekey || dh_out)`, the
/// non-interactive intermediate from which the shared secret is derived
/// instead of mixing a fresh ECDH/brace-key pair the way the interactive
/// flight does (there is no live round trip to mix one in).
fn tmp_key_and_ssid(
    k_ecdh_long_term: &[u8; 56],
    k_ecdh_prekey: &[u8; 56],
    dh_out: &[u8],
) -> ([u8; SHARED_SECRET_BYTES], [u8; SSID_BYTES]) {
    let tmp_key = kdf_fixed::<TMP_KEY_BYTES>(
        USAGE_TMP_KEY,
        OTRV4_DOMAIN_SEPARATION,
        &[k_ecdh_long_term, k_ecdh_prekey, dh_out],
    );
    let shared_secret = kdf_fixed::<SHARED_SECRET_BYTES>(USAGE_SHARED_SECRET, OTRV4_DOMAIN_SEPARATION, &[&tmp_key]);
    let ssid = kdf_fixed::<SSID_BYTES>(USAGE_SSID, OTRV4_DOMAIN_SEPARATION, &[&shared_secret]);
    (shared_secret, ssid)
}

/// Alice drives the whole non-interactive flight in one call: validates the
/// fetched Prekey Ensemble, picks her ephemeral keys, ring-signs the
/// transcript under `{Bob, Alice, Bob-forging}` (the same ring Auth-R uses),
/// and bundles the session's first Data Message into the same wire record.
pub fn send_non_interactive_auth(
    local_instance_tag: u32,
    alice_identity_key: &PrivateScalar,
    alice_profile: &ClientProfile,
    ensemble: &PrekeyEnsemble,
    now: i64,
    phi: &[u8],
    tlvs: &[Tlv],
) -> Result<(NonInteractiveAuthMessage, KeyManager), DakeError> {
    ensemble.client_profile.validate(ensemble.prekey_message.owner_instance_tag, now)?;
    ensemble
        .prekey_profile
        .validate(ensemble.prekey_message.owner_instance_tag, now, &ensemble.client_profile.public_key)?;

    let bob_profile = &ensemble.client_profile;
    let bob_y = PublicPoint::from_bytes(&ensemble.prekey_message.y)?;
    let bob_b = DhPublicKey::from_bytes(&ensemble.prekey_message.b);
    if !bob_b.is_valid() {
        return Err(DakeError::Malformed(crate::errors::PrimitiveError::InvalidPoint));
    }

    let own_ecdh = PrivateScalar::random();
    let own_dh = DhPrivateKey::random();

    let k_ecdh_long_term = own_ecdh.diffie_hellman(&bob_profile.public_key);
    let k_ecdh_prekey = own_ecdh.diffie_hellman(&ensemble.prekey_profile.shared_prekey_pub);
    let dh_out = dh_shared_secret(&own_dh, &bob_b);
    let (shared_secret, ssid) = tmp_key_and_ssid(&k_ecdh_long_term, &k_ecdh_prekey, &dh_out);

    let t = transcript(
        NON_INT_AUTH_TAG,
        &bob_profile.to_bytes(),
        &alice_profile.to_bytes(),
        &bob_y,
        &own_ecdh.public(),
        &bob_b,
        &own_dh.public(),
        phi,
    );
    let rings = [bob_profile.public_key, alice_profile.public_key, bob_profile.forging_key];
    let sigma = ring_sig::authenticate(alice_identity_key, &rings, &t)?;

    let mut key_manager = KeyManager::new(shared_secret, own_ecdh.clone(), own_dh.clone(), bob_y, Some(bob_b), ssid);
    let (i, j, keys) = key_manager.ratchet_send()?;
    let header = crate::message::DataMessageHeader {
        sender_itag: local_instance_tag,
        receiver_itag: ensemble.prekey_message.owner_instance_tag,
        flags: 0,
        pn: key_manager.pn,
        i,
        j,
        ecdh_pub: key_manager.own_ecdh_public().to_bytes(),
        dh_pub: key_manager.own_dh_public().as_bytes().to_vec(),
    };
    let revealed = key_manager.take_old_mac_keys();
    let data_message = crate::message::build_data_message(header, tlvs, &keys.enc_key, &keys.mac_key, revealed);

    let message = NonInteractiveAuthMessage {
        sender_itag: local_instance_tag,
        receiver_itag: ensemble.prekey_message.owner_instance_tag,
        client_profile: alice_profile.to_bytes(),
        x: own_ecdh.public().to_bytes(),
        a: own_dh.public().as_bytes().to_vec(),
        sigma: sigma.to_bytes(),
        data_message: data_message.to_bytes(),
    };

    Ok((message, key_manager))
}

/// Bob processes a DAKE-3: verifies Alice's ring signature over
/// `{Bob, Alice, Bob-forging}`, rebuilds the same `tmp_key`/shared secret from
/// his retained prekey secrets, and immediately decrypts the bundled Data
/// Message so the caller sees both the live `KeyManager` and the first
/// plaintext TLVs in one step.
pub fn receive_non_interactive_auth_message(
    message: &NonInteractiveAuthMessage,
    bob_identity_key: &PrivateScalar,
    bob_profile: &ClientProfile,
    bob_secrets: &PrekeySecrets,
    now: i64,
    phi: &[u8],
) -> Result<(KeyManager, Vec<Tlv>), DakeError> {
    let alice_profile = ClientProfile::from_bytes(&message.client_profile)?;
    alice_profile.validate(message.sender_itag, now)?;

    let alice_x = PublicPoint::from_bytes(&message.x)?;
    let alice_a = DhPublicKey::from_bytes(&message.a);
    if !alice_a.is_valid() {
        return Err(DakeError::Malformed(crate::errors::PrimitiveError::InvalidPoint));
    }

    let bob_y = bob_secrets.y.public();
    let bob_b = bob_secrets.b.public();

    let k_ecdh_long_term = bob_identity_key.diffie_hellman(&alice_x);
    let k_ecdh_prekey = bob_secrets.shared_prekey.diffie_hellman(&alice_x);
    let dh_out = dh_shared_secret(&bob_secrets.b, &alice_a);
    let (shared_secret, ssid) = tmp_key_and_ssid(&k_ecdh_long_term, &k_ecdh_prekey, &dh_out);

    let t = transcript(NON_INT_AUTH_TAG, &bob_profile.to_bytes(), &alice_profile.to_bytes(), &bob_y, &alice_x, &bob_b, &alice_a, phi);
    let rings = [bob_profile.public_key, alice_profile.public_key, bob_profile.forging_key];
    let sigma = RingSignature::from_bytes(&message.sigma).map_err(DakeError::from)?;
    if !ring_sig::verify(&rings, &t, &sigma) {
        return Err(DakeError::InvalidSignature(crate::errors::RingSigError::VerificationFailed));
    }

    let mut key_manager =
        KeyManager::new(shared_secret, bob_secrets.y.clone(), bob_secrets.b.clone(), alice_x, Some(alice_a), ssid);

    let data_message = DataMessage::from_bytes(&message.data_message).map_err(|_| DakeError::UnexpectedMessage)?;
    let header = crate::ratchet::IncomingHeader {
        ecdh_pub: PublicPoint::from_bytes(&data_message.header.ecdh_pub)?,
        dh_pub: if data_message.header.dh_pub.is_empty() {
            None
        } else {
            Some(DhPublicKey::from_bytes(&data_message.header.dh_pub))
        },
        pn: data_message.header.pn,
        i: data_message.header.i,
        j: data_message.header.j,
    };
    let keys = key_manager.ratchet_receive(&header)?;
    let tlvs = open_data_message(&data_message, &keys.enc_key, &keys.mac_key)?;

    Ok((key_manager, tlvs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Tlv;

    fn fresh_profile(identity_key: &PrivateScalar, itag: u32) -> ClientProfile {
        let forging_key = PrivateScalar::random().public();
        ClientProfile::build(identity_key, itag, forging_key, "4", 2_000_000_000, None)
    }

    #[test]
    fn full_handshake_agrees_on_shared_secret_and_ssid() {
        let bob_itag = 0x1000_0001;
        let alice_itag = 0x1000_0002;
        let bob_identity_key = PrivateScalar::random();
        let alice_identity_key = PrivateScalar::random();
        let bob_profile = fresh_profile(&bob_identity_key, bob_itag);
        let alice_profile = fresh_profile(&alice_identity_key, alice_itag);
        let phi = b"shared session state";

        let (bob_state, identity_msg) = send_identity_message(bob_itag, &bob_profile);
        assert_eq!(identity_msg.receiver_itag, UNKNOWN_INSTANCE_TAG);

        let (alice_state, auth_r) = receive_identity_message(
            &identity_msg,
            alice_itag,
            0,
            &alice_identity_key,
            &alice_profile,
            phi,
        )
        .unwrap();

        let (auth_i, bob_keys) = receive_auth_r_message(
            &auth_r,
            bob_state,
            &bob_profile,
            &bob_identity_key,
            bob_itag,
            0,
            phi,
        )
        .unwrap();

        let alice_keys = receive_auth_i_message(&auth_i, alice_state).unwrap();

        assert_eq!(alice_keys.ssid, bob_keys.ssid);
        assert_eq!(alice_keys.shared_secret, bob_keys.shared_secret);
    }

    #[test]
    fn full_handshake_ratchets_agree_on_first_message() {
        let bob_itag = 0x1000_0001;
        let alice_itag = 0x1000_0002;
        let bob_identity_key = PrivateScalar::random();
        let alice_identity_key = PrivateScalar::random();
        let bob_profile = fresh_profile(&bob_identity_key, bob_itag);
        let alice_profile = fresh_profile(&alice_identity_key, alice_itag);
        let phi = b"shared session state";

        let (bob_state, identity_msg) = send_identity_message(bob_itag, &bob_profile);
        let (alice_state, auth_r) = receive_identity_message(
            &identity_msg,
            alice_itag,
            0,
            &alice_identity_key,
            &alice_profile,
            phi,
        )
        .unwrap();
        let (auth_i, mut bob_keys) = receive_auth_r_message(
            &auth_r,
            bob_state,
            &bob_profile,
            &bob_identity_key,
            bob_itag,
            0,
            phi,
        )
        .unwrap();
        let mut alice_keys = receive_auth_i_message(&auth_i, alice_state).unwrap();

        // Alice sends the first data message immediately after the handshake.
        let (i, j, keys) = alice_keys.ratchet_send().unwrap();
        assert_eq!((i, j), (1, 0));

        let header = crate::ratchet::IncomingHeader {
            ecdh_pub: alice_keys.own_ecdh_public(),
            dh_pub: Some(alice_keys.own_dh_public()),
            pn: 0,
            i,
            j,
        };
        let recv_keys = bob_keys.ratchet_receive(&header).unwrap();
        assert_eq!(keys.enc_key, recv_keys.enc_key);
        assert_eq!(keys.mac_key, recv_keys.mac_key);
        assert_eq!((bob_keys.i, bob_keys.j, bob_keys.k, bob_keys.pn), (1, 0, 1, 0));
        assert_eq!(bob_keys.old_mac_keys.len(), 1);

        let data = crate::message::build_data_message(
            crate::message::DataMessageHeader {
                sender_itag: alice_itag,
                receiver_itag: bob_itag,
                flags: 0,
                pn: 0,
                i,
                j,
                ecdh_pub: header.ecdh_pub.to_bytes(),
                dh_pub: header.dh_pub.as_ref().unwrap().as_bytes().to_vec(),
            },
            &[Tlv::disconnected()],
            &keys.enc_key,
            &keys.mac_key,
            Vec::new(),
        );
        let opened = crate::message::open_data_message(&data, &recv_keys.enc_key, &recv_keys.mac_key).unwrap();
        assert_eq!(opened[0].tlv_type, crate::message::TLV_DISCONNECTED);
    }

    #[test]
    fn identity_message_wire_round_trips() {
        let bob_identity_key = PrivateScalar::random();
        let bob_profile = fresh_profile(&bob_identity_key, 0x1000_0001);
        let (_state, message) = send_identity_message(0x1000_0001, &bob_profile);
        let bytes = message.to_bytes();
        let parsed = IdentityMessage::from_bytes(&bytes).unwrap();
        assert_eq!(parsed.sender_itag, message.sender_itag);
        assert_eq!(parsed.y, message.y);
        assert_eq!(parsed.b, message.b);
    }

    #[test]
    fn tampered_auth_r_signature_is_rejected() {
        let bob_itag = 0x1000_0001;
        let alice_itag = 0x1000_0002;
        let bob_identity_key = PrivateScalar::random();
        let alice_identity_key = PrivateScalar::random();
        let bob_profile = fresh_profile(&bob_identity_key, bob_itag);
        let alice_profile = fresh_profile(&alice_identity_key, alice_itag);
        let phi = b"shared session state";

        let (bob_state, identity_msg) = send_identity_message(bob_itag, &bob_profile);
        let (_alice_state, mut auth_r) = receive_identity_message(
            &identity_msg,
            alice_itag,
            0,
            &alice_identity_key,
            &alice_profile,
            phi,
        )
        .unwrap();
        auth_r.sigma[0] ^= 0xFF;

        let result = receive_auth_r_message(&auth_r, bob_state, &bob_profile, &bob_identity_key, bob_itag, 0, phi);
        assert!(result.is_err());
    }

    fn fresh_ensemble(
        bob_identity_key: &PrivateScalar,
        bob_itag: u32,
    ) -> (PrekeyEnsemble, PrekeySecrets, PrivateScalar) {
        let bob_profile = fresh_profile(bob_identity_key, bob_itag);
        let shared_prekey = PrivateScalar::random();
        let prekey_profile = PrekeyProfile::build(bob_identity_key, bob_itag, shared_prekey.public(), 2_000_000_000);
        let y = PrivateScalar::random();
        let b = DhPrivateKey::random();
        let prekey_message = PrekeyMessage {
            owner_instance_tag: bob_itag,
            y: y.public().to_bytes(),
            b: b.public().as_bytes().to_vec(),
        };
        let secrets = PrekeySecrets { y, b, shared_prekey };
        (PrekeyEnsemble { client_profile: bob_profile, prekey_profile, prekey_message }, secrets, bob_identity_key.clone())
    }

    #[test]
    fn non_interactive_flight_agrees_on_secret_and_delivers_first_message() {
        let bob_itag = 0x1000_0001;
        let alice_itag = 0x1000_0002;
        let bob_identity_key = PrivateScalar::random();
        let alice_identity_key = PrivateScalar::random();
        let alice_profile = fresh_profile(&alice_identity_key, alice_itag);
        let (ensemble, bob_secrets, bob_identity_key) = fresh_ensemble(&bob_identity_key, bob_itag);
        let bob_profile = ensemble.client_profile.clone();
        let phi = b"shared session state";

        let (message, alice_keys) = send_non_interactive_auth(
            alice_itag,
            &alice_identity_key,
            &alice_profile,
            &ensemble,
            0,
            phi,
            &[Tlv::disconnected()],
        )
        .unwrap();

        let (bob_keys, tlvs) =
            receive_non_interactive_auth_message(&message, &bob_identity_key, &bob_profile, &bob_secrets, 0, phi)
                .unwrap();

        assert_eq!(alice_keys.ssid, bob_keys.ssid);
        assert_eq!(alice_keys.shared_secret, bob_keys.shared_secret);
        assert_eq!(tlvs[0].tlv_type, crate::message::TLV_DISCONNECTED);
    }

    #[test]
    fn non_interactive_flight_rejects_tampered_signature() {
        let bob_itag = 0x1000_0001;
        let alice_itag = 0x1000_0002;
        let bob_identity_key = PrivateScalar::random();
        let alice_identity_key = PrivateScalar::random();
        let alice_profile = fresh_profile(&alice_identity_key, alice_itag);
        let (ensemble, bob_secrets, bob_identity_key) = fresh_ensemble(&bob_identity_key, bob_itag);
        let bob_profile = ensemble.client_profile.clone();
        let phi = b"shared session state";

        let (mut message, _alice_keys) = send_non_interactive_auth(
            alice_itag,
            &alice_identity_key,
            &alice_profile,
            &ensemble,
            0,
            phi,
            &[Tlv::disconnected()],
        )
        .unwrap();
        message.sigma[0] ^= 0xFF;

        let result = receive_non_interactive_auth_message(&message, &bob_identity_key, &bob_profile, &bob_secrets, 0, phi);
        assert!(result.is_err());
    }
}
