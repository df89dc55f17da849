//! Data message wire encoding, the TLV chain carried inside the encrypted
//! payload, and the padding policy. The payload is encrypted with XChaCha20
//! (a plain stream cipher, not an AEAD) because authentication runs through
//! the usage-prefixed KDF MAC over the whole frame rather than a bundled tag.

use chacha20::cipher::{KeyIvInit, StreamCipher};
use chacha20::{Key, XChaCha20, XNonce};
use rand_core::{OsRng, RngCore};

use crate::constants::{
    OTRV4_DOMAIN_SEPARATION, PADDING_GRANULARITY, PROTOCOL_VERSION, USAGE_MAC_KEY,
};
use crate::errors::MessageError;
use crate::primitives::{ct_eq, kdf};

pub const DATA_MESSAGE_TYPE: u8 = 0x03;

pub const TLV_PADDING: u16 = 0;
pub const TLV_DISCONNECTED: u16 = 1;
pub const TLV_SMP_MSG_1: u16 = 2;
pub const TLV_SMP_MSG_2: u16 = 3;
pub const TLV_SMP_MSG_3: u16 = 4;
pub const TLV_SMP_MSG_4: u16 = 5;
pub const TLV_SMP_ABORT: u16 = 6;
pub const TLV_SYM_KEY: u16 = 7;

/// A single `(type, value)` TLV record; `len` is derived from `value.len()` at
/// encode time rather than carried separately.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Tlv {
    pub tlv_type: u16,
    pub value: Vec<u8>,
}

impl Tlv {
    pub fn disconnected() -> Self {
        Tlv { tlv_type: TLV_DISCONNECTED, value: Vec::new() }
    }

    pub fn extra_symmetric_key(context: &[u8]) -> Self {
        Tlv { tlv_type: TLV_SYM_KEY, value: context.to_vec() }
    }

    fn padding(len: usize) -> Self {
        Tlv { tlv_type: TLV_PADDING, value: vec![0u8; len] }
    }
}

/// Serializes a chain of TLVs, then appends a single padding TLV so the total
/// length lands on a `PADDING_GRANULARITY`-byte boundary.
pub fn encode_tlv_chain(tlvs: &[Tlv]) -> Vec<u8> {
    let mut out = Vec::new();
    for tlv in tlvs {
        out.extend_from_slice(&tlv.tlv_type.to_be_bytes());
        out.extend_from_slice(&(tlv.value.len() as u16).to_be_bytes());
        out.extend_from_slice(&tlv.value);
    }
    let remainder = out.len() % PADDING_GRANULARITY;
    if remainder != 0 || out.is_empty() {
        // A gap under 4 bytes can't fit even an empty padding TLV's header,
        // so roll over to the next full granularity boundary instead.
        let mut gap = PADDING_GRANULARITY - remainder;
        if gap < 4 {
            gap += PADDING_GRANULARITY;
        }
        let pad_value_len = gap - 4;
        let padding = Tlv::padding(pad_value_len);
        out.extend_from_slice(&padding.tlv_type.to_be_bytes());
        out.extend_from_slice(&(padding.value.len() as u16).to_be_bytes());
        out.extend_from_slice(&padding.value);
    }
    out
}

pub fn decode_tlv_chain(mut bytes: &[u8]) -> Result<Vec<Tlv>, MessageError> {
    let mut tlvs = Vec::new();
    while !bytes.is_empty() {
        if bytes.len() < 4 {
            return Err(MessageError::MalformedFrame);
        }
        let tlv_type = u16::from_be_bytes(bytes[0..2].try_into().unwrap());
        let len = u16::from_be_bytes(bytes[2..4].try_into().unwrap()) as usize;
        bytes = &bytes[4..];
        if bytes.len() < len {
            return Err(MessageError::MalformedFrame);
        }
        let (value, rest) = bytes.split_at(len);
        tlvs.push(Tlv { tlv_type, value: value.to_vec() });
        bytes = rest;
    }
    Ok(tlvs)
}

/// The fixed-position fields of a data message, excluding the encrypted
/// payload and trailing revealed-MAC-keys list.
pub struct DataMessageHeader {
    pub sender_itag: u32,
    pub receiver_itag: u32,
    pub flags: u8,
    pub pn: u32,
    pub i: u32,
    pub j: u32,
    pub ecdh_pub: [u8; 57],
    pub dh_pub: Vec<u8>,
}

impl DataMessageHeader {
    fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&PROTOCOL_VERSION.to_be_bytes());
        out.push(DATA_MESSAGE_TYPE);
        out.extend_from_slice(&self.sender_itag.to_be_bytes());
        out.extend_from_slice(&self.receiver_itag.to_be_bytes());
        out.push(self.flags);
        out.extend_from_slice(&self.pn.to_be_bytes());
        out.extend_from_slice(&self.i.to_be_bytes());
        out.extend_from_slice(&self.j.to_be_bytes());
        out.extend_from_slice(&self.ecdh_pub);
        out.extend_from_slice(&(self.dh_pub.len() as u32).to_be_bytes());
        out.extend_from_slice(&self.dh_pub);
    }

    fn read(bytes: &[u8], cursor: &mut usize) -> Result<Self, MessageError> {
        let take = |cursor: &mut usize, n: usize| -> Result<&[u8], MessageError> {
            let end = cursor.checked_add(n).ok_or(MessageError::MalformedFrame)?;
            let slice = bytes.get(*cursor..end).ok_or(MessageError::MalformedFrame)?;
            *cursor = end;
            Ok(slice)
        };
        let version = u16::from_be_bytes(take(cursor, 2)?.try_into().unwrap());
        let msg_type = take(cursor, 1)?[0];
        if version != PROTOCOL_VERSION || msg_type != DATA_MESSAGE_TYPE {
            return Err(MessageError::MalformedFrame);
        }
        let sender_itag = u32::from_be_bytes(take(cursor, 4)?.try_into().unwrap());
        let receiver_itag = u32::from_be_bytes(take(cursor, 4)?.try_into().unwrap());
        let flags = take(cursor, 1)?[0];
        let pn = u32::from_be_bytes(take(cursor, 4)?.try_into().unwrap());
        let i = u32::from_be_bytes(take(cursor, 4)?.try_into().unwrap());
        let j = u32::from_be_bytes(take(cursor, 4)?.try_into().unwrap());
        let ecdh_pub: [u8; 57] = take(cursor, 57)?.try_into().unwrap();
        let dh_pub_len = u32::from_be_bytes(take(cursor, 4)?.try_into().unwrap()) as usize;
        let dh_pub = take(cursor, dh_pub_len)?.to_vec();
        Ok(DataMessageHeader { sender_itag, receiver_itag, flags, pn, i, j, ecdh_pub, dh_pub })
    }
}

/// A fully encoded data message, ready for wire armor.
pub struct DataMessage {
    pub header: DataMessageHeader,
    pub nonce: [u8; 24],
    pub enc_payload: Vec<u8>,
    pub mac: [u8; 64],
    pub revealed_mac_keys: Vec<[u8; 64]>,
}

impl DataMessage {
    /// `header | nonce | payload_len:u32 | payload | mac | keys_count:u32 | keys`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.header.write(&mut out);
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&(self.enc_payload.len() as u32).to_be_bytes());
        out.extend_from_slice(&self.enc_payload);
        out.extend_from_slice(&self.mac);
        out.extend_from_slice(&(self.revealed_mac_keys.len() as u32).to_be_bytes());
        for key in &self.revealed_mac_keys {
            out.extend_from_slice(key);
        }
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, MessageError> {
        let mut cursor = 0usize;
        let header = DataMessageHeader::read(bytes, &mut cursor)?;
        let take = |cursor: &mut usize, n: usize| -> Result<&[u8], MessageError> {
            let end = cursor.checked_add(n).ok_or(MessageError::MalformedFrame)?;
            let slice = bytes.get(*cursor..end).ok_or(MessageError::MalformedFrame)?;
            *cursor = end;
            Ok(slice)
        };
        let nonce: [u8; 24] = take(&mut cursor, 24)?.try_into().unwrap();
        let payload_len = u32::from_be_bytes(take(&mut cursor, 4)?.try_into().unwrap()) as usize;
        let enc_payload = take(&mut cursor, payload_len)?.to_vec();
        let mac: [u8; 64] = take(&mut cursor, 64)?.try_into().unwrap();
        let keys_count = u32::from_be_bytes(take(&mut cursor, 4)?.try_into().unwrap()) as usize;
        let mut revealed_mac_keys = Vec::with_capacity(keys_count);
        for _ in 0..keys_count {
            revealed_mac_keys.push(take(&mut cursor, 64)?.try_into().unwrap());
        }
        Ok(DataMessage { header, nonce, enc_payload, mac, revealed_mac_keys })
    }
}

/// Encrypts `tlvs` under `enc_key`, authenticates the whole frame under
/// `mac_key`, and assembles the wire record.
pub fn build_data_message(
    header: DataMessageHeader,
    tlvs: &[Tlv],
    enc_key: &[u8; 32],
    mac_key: &[u8; 64],
    revealed_mac_keys: Vec<[u8; 64]>,
) -> DataMessage {
    let mut nonce = [0u8; 24];
    OsRng.fill_bytes(&mut nonce);

    let mut payload = encode_tlv_chain(tlvs);
    let mut cipher = XChaCha20::new(Key::from_slice(enc_key), XNonce::from_slice(&nonce));
    cipher.apply_keystream(&mut payload);

    let mut to_mac = Vec::new();
    header.write(&mut to_mac);
    to_mac.extend_from_slice(&nonce);
    to_mac.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    to_mac.extend_from_slice(&payload);
    let mac = kdf(USAGE_MAC_KEY, OTRV4_DOMAIN_SEPARATION, &[mac_key, &to_mac], 64);

    DataMessage {
        header,
        nonce,
        enc_payload: payload,
        mac: mac.try_into().unwrap(),
        revealed_mac_keys,
    }
}

/// Verifies the frame's MAC, decrypts the payload, and parses the TLV chain.
pub fn open_data_message(
    message: &DataMessage,
    enc_key: &[u8; 32],
    mac_key: &[u8; 64],
) -> Result<Vec<Tlv>, MessageError> {
    let mut to_mac = Vec::new();
    message.header.write(&mut to_mac);
    to_mac.extend_from_slice(&message.nonce);
    to_mac.extend_from_slice(&(message.enc_payload.len() as u32).to_be_bytes());
    to_mac.extend_from_slice(&message.enc_payload);
    let expected_mac = kdf(USAGE_MAC_KEY, OTRV4_DOMAIN_SEPARATION, &[mac_key, &to_mac], 64);
    if !ct_eq(&expected_mac, &message.mac) {
        return Err(MessageError::AuthFailure);
    }

    let mut payload = message.enc_payload.clone();
    let mut cipher = XChaCha20::new(Key::from_slice(enc_key), XNonce::from_slice(&message.nonce));
    cipher.apply_keystream(&mut payload);

    decode_tlv_chain(&payload).map_err(|_| MessageError::DecryptionFailure)
}
