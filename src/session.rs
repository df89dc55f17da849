//! Top-level per-conversation state machine: wire dispatch, DAKE
//! orchestration, and policy-gated version negotiation. A session mediates
//! all access to its key manager — callers must serialize calls on a given
//! session (single-threaded, non-reentrant per the concurrency model).

use log::{debug, info, warn};

use crate::armor::{
    build_query_message, build_whitespace_tag, decode_frame, detect_query_message,
    detect_whitespace_tag, encode_frame,
};
use crate::constants::{
    DEFAULT_PROFILE_LIFETIME_SECONDS, MAX_SKIP, PADDING_GRANULARITY, UNKNOWN_INSTANCE_TAG,
};
use crate::dake::{self, AliceAuthRState, AuthIMessage, AuthRMessage, IdentityMessage, IdentityState};
use crate::errors::OtrError;
use crate::message::{DataMessage, DataMessageHeader, Tlv, TLV_DISCONNECTED};
use crate::primitives::PrivateScalar;
use crate::profile::ClientProfile;
use crate::ratchet::{IncomingHeader, KeyManager};

/// Knobs threaded into a session once at construction, mirroring what a host
/// application would already have parsed from its own configuration before
/// ever touching this crate.
#[derive(Clone)]
pub struct Policy {
    pub allowed_versions: Vec<u8>,
    pub max_skip: u32,
    pub padding_granularity: usize,
    pub profile_lifetime_seconds: i64,
}

impl Default for Policy {
    fn default() -> Self {
        Policy {
            allowed_versions: vec![4],
            max_skip: MAX_SKIP,
            padding_granularity: PADDING_GRANULARITY,
            profile_lifetime_seconds: DEFAULT_PROFILE_LIFETIME_SECONDS,
        }
    }
}

/// Capability set the embedding application supplies. Every method is total
/// and non-blocking: none of them may suspend, matching the single-threaded,
/// synchronous contract of the core.
pub trait HostCallbacks {
    fn load_privkey_v4(&mut self) -> Option<PrivateScalar>;
    fn create_privkey_v4(&mut self) -> PrivateScalar;
    fn create_forging_key(&mut self) -> PrivateScalar;
    fn load_client_profile(&mut self) -> Option<ClientProfile>;
    fn create_client_profile(&mut self, identity_key: &PrivateScalar, instance_tag: u32, now: i64) -> ClientProfile;
    fn get_shared_session_state(&self) -> (String, String, Option<String>);
    fn write_expired_client_profile(&mut self, profile: &ClientProfile);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Start,
    WaitingAuthR,
    WaitingAuthI,
    WaitingDakeDataMessage,
    Encrypted,
    Finished,
}

/// What a session call produced: a wire message to send back, plaintext to
/// show the user, or both (e.g. a plaintext message delivered with a warning
/// already logged).
pub struct SessionOutput {
    pub outgoing: Option<String>,
    pub display: Option<String>,
}

enum PendingRole {
    None,
    Bob(IdentityState),
    Alice(AliceAuthRState),
}

/// One conversation's worth of DAKE and ratchet state.
pub struct Session {
    instance_tag: u32,
    peer_instance_tag: u32,
    policy: Policy,
    state: SessionState,
    identity_key: PrivateScalar,
    client_profile: ClientProfile,
    pending: PendingRole,
    key_manager: Option<KeyManager>,
}

impl Session {
    pub fn new(instance_tag: u32, policy: Policy, identity_key: PrivateScalar, client_profile: ClientProfile) -> Self {
        Session {
            instance_tag,
            peer_instance_tag: UNKNOWN_INSTANCE_TAG,
            policy,
            state: SessionState::Start,
            identity_key,
            client_profile,
            pending: PendingRole::None,
            key_manager: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    fn phi(&self, host: &impl HostCallbacks) -> Vec<u8> {
        let (account, protocol, password) = host.get_shared_session_state();
        let mut out = Vec::new();
        out.extend_from_slice(&(account.len() as u32).to_be_bytes());
        out.extend_from_slice(account.as_bytes());
        out.extend_from_slice(&(protocol.len() as u32).to_be_bytes());
        out.extend_from_slice(protocol.as_bytes());
        match password {
            Some(p) => {
                out.push(1);
                out.extend_from_slice(&(p.len() as u32).to_be_bytes());
                out.extend_from_slice(p.as_bytes());
            }
            None => out.push(0),
        }
        out
    }

    /// S1: builds a query message advertising the locally allowed versions.
    pub fn send_query(&self, plaintext: &str) -> String {
        build_query_message(&self.policy.allowed_versions, plaintext)
    }

    /// S2: builds a whitespace-tagged message advertising the same versions.
    pub fn send_whitespace_tag(&self, plaintext: &str) -> String {
        build_whitespace_tag(&self.policy.allowed_versions, plaintext)
    }

    /// Sends Identity (Bob's opening move), transitioning `START →
    /// WAITING_AUTH_R`.
    pub fn start_dake(&mut self) -> String {
        let (state, message) = dake::send_identity_message(self.instance_tag, &self.client_profile);
        self.pending = PendingRole::Bob(state);
        self.transition(SessionState::WaitingAuthR);
        encode_frame(&message.to_bytes())
    }

    fn transition(&mut self, next: SessionState) {
        info!("session {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    /// Dispatches one inbound line of text: a query message, a whitespace
    /// tag, an armored DAKE/data frame, or plain chat text.
    pub fn receive(&mut self, host: &mut impl HostCallbacks, text: &str, now: i64) -> Result<SessionOutput, OtrError> {
        if let Some((versions, tail)) = detect_query_message(text) {
            return self.handle_offer(host, &versions, tail, now);
        }
        if let Some((versions, tail)) = detect_whitespace_tag(text) {
            return self.handle_offer(host, &versions, tail, now);
        }
        match decode_frame(text) {
            Some(frame) => self.handle_frame(host, &frame, now),
            None => Ok(self.handle_plaintext(text)),
        }
    }

    /// S3/S4: plaintext delivered outside a Data Message is always shown
    /// verbatim; a warning is logged (not returned) whenever the session is
    /// mid-handshake or encrypted, since the peer should have encrypted it.
    fn handle_plaintext(&self, text: &str) -> SessionOutput {
        if !matches!(self.state, SessionState::Start) {
            warn!("RECEIVED_UNENCRYPTED: plaintext while in {:?}", self.state);
        }
        SessionOutput { outgoing: None, display: Some(text.to_string()) }
    }

    fn handle_offer(&mut self, host: &mut impl HostCallbacks, versions: &[u8], tail: &str, now: i64) -> Result<SessionOutput, OtrError> {
        if !versions.iter().any(|v| self.policy.allowed_versions.contains(v)) {
            return Err(OtrError::PolicyError);
        }
        self.ensure_client_profile(host, now);
        let identity = self.start_dake();
        Ok(SessionOutput {
            outgoing: Some(identity),
            display: if tail.is_empty() { None } else { Some(tail.to_string()) },
        })
    }

    fn ensure_client_profile(&mut self, host: &mut impl HostCallbacks, now: i64) {
        if self.client_profile.validate(self.instance_tag, now).is_err() {
            host.write_expired_client_profile(&self.client_profile);
            self.client_profile = host.create_client_profile(&self.identity_key, self.instance_tag, now);
        }
    }

    fn handle_frame(&mut self, host: &mut impl HostCallbacks, frame: &[u8], now: i64) -> Result<SessionOutput, OtrError> {
        let msg_type = *frame.get(2).ok_or(OtrError::MalformedFrame)?;
        match msg_type {
            crate::constants::IDENTITY_MSG_TYPE => self.on_identity(host, frame, now),
            crate::constants::AUTH_R_MSG_TYPE => self.on_auth_r(host, frame, now),
            crate::constants::AUTH_I_MSG_TYPE => self.on_auth_i(frame),
            crate::message::DATA_MESSAGE_TYPE => self.on_data_message(frame),
            _ => {
                warn!("dropping frame with unknown message type {msg_type:#x}");
                Ok(SessionOutput { outgoing: None, display: None })
            }
        }
    }

    fn on_identity(&mut self, host: &mut impl HostCallbacks, frame: &[u8], now: i64) -> Result<SessionOutput, OtrError> {
        let message = match IdentityMessage::from_bytes(frame) {
            Ok(m) => m,
            Err(e) => {
                warn!("malformed Identity message: {e}");
                return Ok(SessionOutput { outgoing: None, display: None });
            }
        };
        let phi = self.phi(host);
        match dake::receive_identity_message(&message, self.instance_tag, now, &self.identity_key, &self.client_profile, &phi) {
            Ok((state, auth_r)) => {
                self.peer_instance_tag = message.sender_itag;
                self.pending = PendingRole::Alice(state);
                self.transition(SessionState::WaitingAuthI);
                Ok(SessionOutput { outgoing: Some(encode_frame(&auth_r.to_bytes())), display: None })
            }
            Err(e) => {
                warn!("Identity message rejected: {e}");
                Ok(SessionOutput { outgoing: None, display: None })
            }
        }
    }

    fn on_auth_r(&mut self, host: &mut impl HostCallbacks, frame: &[u8], now: i64) -> Result<SessionOutput, OtrError> {
        let PendingRole::Bob(_) = &self.pending else {
            warn!("unexpected Auth-R in state {:?}", self.state);
            return Ok(SessionOutput { outgoing: None, display: None });
        };
        let message = match AuthRMessage::from_bytes(frame) {
            Ok(m) => m,
            Err(e) => {
                warn!("malformed Auth-R message: {e}");
                return Ok(SessionOutput { outgoing: None, display: None });
            }
        };
        let PendingRole::Bob(state) = std::mem::replace(&mut self.pending, PendingRole::None) else {
            unreachable!()
        };
        let phi = self.phi(host);
        match dake::receive_auth_r_message(&message, state, &self.client_profile, &self.identity_key, self.instance_tag, now, &phi) {
            Ok((auth_i, key_manager)) => {
                self.peer_instance_tag = message.sender_itag;
                self.key_manager = Some(key_manager);
                self.transition(SessionState::WaitingDakeDataMessage);
                Ok(SessionOutput { outgoing: Some(encode_frame(&auth_i.to_bytes())), display: None })
            }
            Err(e) => {
                warn!("Auth-R rejected, aborting handshake: {e}");
                self.transition(SessionState::Start);
                Ok(SessionOutput { outgoing: None, display: None })
            }
        }
    }

    fn on_auth_i(&mut self, frame: &[u8]) -> Result<SessionOutput, OtrError> {
        let message = match AuthIMessage::from_bytes(frame) {
            Ok(m) => m,
            Err(e) => {
                warn!("malformed Auth-I message: {e}");
                return Ok(SessionOutput { outgoing: None, display: None });
            }
        };
        let PendingRole::Alice(state) = std::mem::replace(&mut self.pending, PendingRole::None) else {
            warn!("unexpected Auth-I in state {:?}", self.state);
            return Ok(SessionOutput { outgoing: None, display: None });
        };
        match dake::receive_auth_i_message(&message, state) {
            Ok(key_manager) => {
                self.key_manager = Some(key_manager);
                self.transition(SessionState::Encrypted);
                Ok(SessionOutput { outgoing: None, display: None })
            }
            Err(e) => {
                warn!("Auth-I rejected, aborting handshake: {e}");
                self.transition(SessionState::Start);
                Ok(SessionOutput { outgoing: None, display: None })
            }
        }
    }

    fn on_data_message(&mut self, frame: &[u8]) -> Result<SessionOutput, OtrError> {
        if !matches!(self.state, SessionState::WaitingDakeDataMessage | SessionState::Encrypted) {
            warn!("unexpected Data message in state {:?}", self.state);
            return Ok(SessionOutput { outgoing: None, display: None });
        }
        let message = match DataMessage::from_bytes(frame) {
            Ok(m) => m,
            Err(e) => {
                warn!("malformed Data message: {e}");
                return Ok(SessionOutput { outgoing: None, display: None });
            }
        };
        let key_manager = self.key_manager.as_mut().ok_or(OtrError::StateError)?;
        let header = IncomingHeader {
            ecdh_pub: match crate::primitives::PublicPoint::from_bytes(&message.header.ecdh_pub) {
                Ok(p) => p,
                Err(_) => {
                    warn!("malformed Data message ECDH point");
                    return Ok(SessionOutput { outgoing: None, display: None });
                }
            },
            dh_pub: if message.header.dh_pub.is_empty() {
                None
            } else {
                Some(crate::primitives::DhPublicKey::from_bytes(&message.header.dh_pub))
            },
            pn: message.header.pn,
            i: message.header.i,
            j: message.header.j,
        };
        debug!("receiving data message i={} j={} pn={}", header.i, header.j, header.pn);
        let keys = match key_manager.ratchet_receive(&header) {
            Ok(k) => k,
            Err(e) => {
                warn!("ratchet rejected incoming message: {e}");
                return Ok(SessionOutput { outgoing: None, display: None });
            }
        };
        let tlvs = match crate::message::open_data_message(&message, &keys.enc_key, &keys.mac_key) {
            Ok(t) => t,
            Err(e) => {
                warn!("data message decryption failed: {e}");
                return Ok(SessionOutput { outgoing: None, display: None });
            }
        };
        if self.state == SessionState::WaitingDakeDataMessage {
            self.transition(SessionState::Encrypted);
        }
        if tlvs.iter().any(|t| t.tlv_type == TLV_DISCONNECTED) {
            self.transition(SessionState::Finished);
        }
        Ok(SessionOutput { outgoing: None, display: None })
    }

    /// Sends a TLV-bearing data message while `ENCRYPTED`.
    pub fn send_tlvs(&mut self, tlvs: &[Tlv]) -> Result<String, OtrError> {
        if self.state != SessionState::Encrypted {
            return Err(OtrError::StateError);
        }
        let key_manager = self.key_manager.as_mut().ok_or(OtrError::StateError)?;
        let (i, j, keys) = key_manager.ratchet_send().map_err(|e| OtrError::Message(e.into()))?;
        debug!("sending data message i={i} j={j}");
        let header = DataMessageHeader {
            sender_itag: self.instance_tag,
            receiver_itag: self.peer_instance_tag,
            flags: 0,
            pn: key_manager.pn,
            i,
            j,
            ecdh_pub: key_manager.own_ecdh_public().to_bytes(),
            dh_pub: key_manager.own_dh_public().as_bytes().to_vec(),
        };
        let revealed = key_manager.take_old_mac_keys();
        let message = crate::message::build_data_message(header, tlvs, &keys.enc_key, &keys.mac_key, revealed);
        Ok(encode_frame(&message.to_bytes()))
    }

    /// Local disconnect: emits a disconnect-bearing data message if currently
    /// `ENCRYPTED`, then moves to `FINISHED` unconditionally.
    pub fn end_session(&mut self) -> Result<Option<String>, OtrError> {
        let outgoing = if self.state == SessionState::Encrypted {
            Some(self.send_tlvs(&[Tlv::disconnected()])?)
        } else {
            None
        };
        self.transition(SessionState::Finished);
        Ok(outgoing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::PrivateScalar;

    struct TestHost {
        forging_key: PrivateScalar,
    }

    impl HostCallbacks for TestHost {
        fn load_privkey_v4(&mut self) -> Option<PrivateScalar> {
            None
        }
        fn create_privkey_v4(&mut self) -> PrivateScalar {
            PrivateScalar::random()
        }
        fn create_forging_key(&mut self) -> PrivateScalar {
            PrivateScalar::random()
        }
        fn load_client_profile(&mut self) -> Option<ClientProfile> {
            None
        }
        fn create_client_profile(&mut self, identity_key: &PrivateScalar, instance_tag: u32, now: i64) -> ClientProfile {
            ClientProfile::build(identity_key, instance_tag, self.forging_key.public(), "4", now + 1_000_000, None)
        }
        fn get_shared_session_state(&self) -> (String, String, Option<String>) {
            ("alice@example.org".to_string(), "xmpp".to_string(), None)
        }
        fn write_expired_client_profile(&mut self, _profile: &ClientProfile) {}
    }

    fn fresh_session(instance_tag: u32) -> Session {
        let identity_key = PrivateScalar::random();
        let forging_key = PrivateScalar::random().public();
        let profile = ClientProfile::build(&identity_key, instance_tag, forging_key, "4", 2_000_000_000, None);
        Session::new(instance_tag, Policy::default(), identity_key, profile)
    }

    #[test]
    fn query_message_matches_literal_scenario() {
        let session = fresh_session(0x1000_0001);
        let msg = session.send_query("And some random invitation text.");
        assert_eq!(msg, "?OTRv4? And some random invitation text.");
    }

    #[test]
    fn whitespace_tag_matches_literal_scenario() {
        let session = fresh_session(0x1000_0001);
        let msg = session.send_whitespace_tag("And some random invitation text.");
        assert!(msg.ends_with("And some random invitation text."));
        assert_eq!(msg.len(), 24 + "And some random invitation text.".len());
    }

    #[test]
    fn plaintext_in_start_state_has_no_warning_path() {
        let mut session = fresh_session(0x1000_0001);
        let mut host = TestHost { forging_key: PrivateScalar::random() };
        let output = session.receive(&mut host, "Some random text.", 0).unwrap();
        assert_eq!(output.display.as_deref(), Some("Some random text."));
        assert_eq!(session.state(), SessionState::Start);
    }

    #[test]
    fn full_handshake_reaches_encrypted_on_both_sides() {
        let bob_itag = 0x1000_0001;
        let alice_itag = 0x1000_0002;
        let mut bob = fresh_session(bob_itag);
        let mut alice = fresh_session(alice_itag);
        let mut bob_host = TestHost { forging_key: PrivateScalar::random() };
        let mut alice_host = TestHost { forging_key: PrivateScalar::random() };

        let identity_frame = bob.start_dake();
        assert_eq!(bob.state(), SessionState::WaitingAuthR);

        let auth_r_out = alice.receive(&mut alice_host, &identity_frame, 0).unwrap();
        assert_eq!(alice.state(), SessionState::WaitingAuthI);
        let auth_r_frame = auth_r_out.outgoing.unwrap();

        let auth_i_out = bob.receive(&mut bob_host, &auth_r_frame, 0).unwrap();
        assert_eq!(bob.state(), SessionState::WaitingDakeDataMessage);
        let auth_i_frame = auth_i_out.outgoing.unwrap();

        alice.receive(&mut alice_host, &auth_i_frame, 0).unwrap();
        assert_eq!(alice.state(), SessionState::Encrypted);

        let data_frame = alice.send_tlvs(&[Tlv::disconnected()]).unwrap();
        bob.receive(&mut bob_host, &data_frame, 0).unwrap();
        assert_eq!(bob.state(), SessionState::Finished);
    }
}
