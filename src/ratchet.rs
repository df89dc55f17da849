//! The double ratchet / key manager: chain and root keys, the ECDH+brace-key
//! DH ratchet, the skipped-message-key arena, and the old-MAC-key reveal
//! queue. Generalizes a classic single-curve double ratchet to Ed448 ECDH
//! plus a periodic 3072-bit DH "brace key" mixed in every third ratchet.

use std::collections::HashMap;

use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::constants::{
    MAX_SKIP, OTRV4_DOMAIN_SEPARATION, USAGE_BRACE_KEY, USAGE_CHAIN_KEY, USAGE_EXTRA_SYMM_KEY,
    USAGE_FIRST_ROOT_KEY, USAGE_MAC_KEY, USAGE_MSG_KEY, USAGE_NEXT_CHAIN_KEY, USAGE_ROOT_KEY,
    USAGE_SHARED_SECRET, USAGE_THIRD_BRACE_KEY,
};
use crate::errors::RatchetError;
use crate::primitives::{kdf_fixed, DhPrivateKey, DhPublicKey, PrivateScalar, PublicPoint};

/// Per-message keys derived from a single chain step.
pub struct MessageKeys {
    pub enc_key: [u8; 32],
    pub mac_key: [u8; 64],
    pub extra_key: [u8; 32],
}

#[derive(Clone, Zeroize, ZeroizeOnDrop)]
struct SkippedKey {
    enc_key: [u8; 32],
    mac_key: [u8; 64],
    extra_key: [u8; 32],
}

/// A send/receive event for the ratchet to process: the peer's current ECDH
/// point, and (on a brace-key ratchet step) the peer's DH public value.
pub struct IncomingHeader {
    pub ecdh_pub: PublicPoint,
    pub dh_pub: Option<DhPublicKey>,
    pub pn: u32,
    pub i: u32,
    pub j: u32,
}

/// All per-session ratcheting state. Drop zeroizes every secret buffer; there
/// is no separate destroy method (resolves the "drop zeroizes" open question).
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct KeyManager {
    #[zeroize(skip)]
    own_ecdh: PrivateScalar,
    #[zeroize(skip)]
    own_dh: DhPrivateKey,
    #[zeroize(skip)]
    their_ecdh: PublicPoint,
    #[zeroize(skip)]
    their_dh: Option<DhPublicKey>,

    pub i: u32,
    pub j: u32,
    pub k: u32,
    pub pn: u32,

    root_key: [u8; 64],
    sending_chain: Option<[u8; 64]>,
    receiving_chain: Option<[u8; 64]>,
    brace_key: [u8; 32],
    pub shared_secret: [u8; 64],
    pub ssid: [u8; 8],
    pub extra_symmetric_key: [u8; 32],

    #[zeroize(skip)]
    skipped_keys: HashMap<(u32, u32), SkippedKey>,
    pub old_mac_keys: Vec<[u8; 64]>,
}

fn mix_shared_secret(root_key: &[u8; 64], ecdh_out: &[u8; 56], brace_key: &[u8; 32]) -> [u8; 64] {
    kdf_fixed::<64>(
        USAGE_SHARED_SECRET,
        OTRV4_DOMAIN_SEPARATION,
        &[root_key, ecdh_out, brace_key],
    )
}

fn derive_root_and_chain(root_key: &[u8; 64], shared_secret: &[u8; 64]) -> ([u8; 64], [u8; 64]) {
    let new_root = kdf_fixed::<64>(USAGE_ROOT_KEY, OTRV4_DOMAIN_SEPARATION, &[root_key, shared_secret]);
    let new_chain = kdf_fixed::<64>(USAGE_CHAIN_KEY, OTRV4_DOMAIN_SEPARATION, &[root_key, shared_secret]);
    (new_root, new_chain)
}

fn chain_step(chain_key: &[u8; 64]) -> ([u8; 64], MessageKeys) {
    let next_chain = kdf_fixed::<64>(USAGE_NEXT_CHAIN_KEY, OTRV4_DOMAIN_SEPARATION, &[chain_key]);
    let enc_key = kdf_fixed::<32>(USAGE_MSG_KEY, OTRV4_DOMAIN_SEPARATION, &[chain_key]);
    let mac_key = kdf_fixed::<64>(USAGE_MAC_KEY, OTRV4_DOMAIN_SEPARATION, &[chain_key]);
    let extra_key = kdf_fixed::<32>(USAGE_EXTRA_SYMM_KEY, OTRV4_DOMAIN_SEPARATION, &[chain_key]);
    (next_chain, MessageKeys { enc_key, mac_key, extra_key })
}

impl KeyManager {
    /// Seeds a fresh key manager from the shared secret produced by the DAKE,
    /// and the peer's ephemeral keys observed in the handshake. The initial
    /// root key is a KDF pass over the shared secret (usage
    /// `USAGE_FIRST_ROOT_KEY`), kept distinct from the raw shared secret so
    /// the two never collide in any later derivation.
    pub fn new(
        shared_secret: [u8; 64],
        own_ecdh: PrivateScalar,
        own_dh: DhPrivateKey,
        their_ecdh: PublicPoint,
        their_dh: Option<DhPublicKey>,
        ssid: [u8; 8],
    ) -> Self {
        let root_key =
            kdf_fixed::<64>(USAGE_FIRST_ROOT_KEY, OTRV4_DOMAIN_SEPARATION, &[&shared_secret]);
        KeyManager {
            own_ecdh,
            own_dh,
            their_ecdh,
            their_dh,
            i: 0,
            j: 0,
            k: 0,
            pn: 0,
            root_key,
            sending_chain: None,
            receiving_chain: None,
            brace_key: [0u8; 32],
            shared_secret,
            ssid,
            extra_symmetric_key: [0u8; 32],
            skipped_keys: HashMap::new(),
            old_mac_keys: Vec::new(),
        }
    }

    pub fn own_ecdh_public(&self) -> PublicPoint {
        self.own_ecdh.public()
    }

    pub fn own_dh_public(&self) -> DhPublicKey {
        self.own_dh.public()
    }

    /// Derives the next sending key triple, advancing `j` and the sending chain.
    /// The very first call on a fresh key manager has no sending chain yet: it
    /// performs the sending half of a DH-ratchet step first (advancing `i`, and
    /// rotating `own_ecdh`/`own_dh`) before deriving message keys, so a party
    /// that completes the handshake and sends immediately starts at `i = 1`.
    pub fn ratchet_send(&mut self) -> Result<(u32, u32, MessageKeys), RatchetError> {
        if self.j == u32::MAX {
            return Err(RatchetError::CounterOverflow);
        }
        if self.sending_chain.is_none() {
            if self.i == u32::MAX {
                return Err(RatchetError::CounterOverflow);
            }
            let is_brace_step = self.i % 3 == 0;
            let ecdh_out = self.own_ecdh.diffie_hellman(&self.their_ecdh);
            if is_brace_step {
                let their_dh = self.their_dh.as_ref().ok_or(RatchetError::ConversionError)?;
                let dh_shared = crate::primitives::dh_shared_secret(&self.own_dh, their_dh);
                self.brace_key =
                    kdf_fixed::<32>(USAGE_THIRD_BRACE_KEY, OTRV4_DOMAIN_SEPARATION, &[&dh_shared]);
            } else {
                self.brace_key =
                    kdf_fixed::<32>(USAGE_BRACE_KEY, OTRV4_DOMAIN_SEPARATION, &[&self.brace_key]);
            }

            self.shared_secret = mix_shared_secret(&self.root_key, &ecdh_out, &self.brace_key);
            let (root, chain) = derive_root_and_chain(&self.root_key, &self.shared_secret);
            self.root_key = root;
            self.sending_chain = Some(chain);

            self.own_ecdh = PrivateScalar::random();
            if is_brace_step {
                self.own_dh = DhPrivateKey::random();
            }
            self.i += 1;
        }
        let chain = self.sending_chain.take().unwrap();
        let (next_chain, keys) = chain_step(&chain);
        self.sending_chain = Some(next_chain);
        let i = self.i;
        let j = self.j;
        self.j += 1;
        Ok((i, j, keys))
    }

    /// Processes an incoming header: performs a DH-ratchet step if the peer's
    /// ECDH point is new, skips and stores intermediate keys if `j` jumped
    /// ahead, then returns the keys for the target message.
    pub fn ratchet_receive(&mut self, header: &IncomingHeader) -> Result<MessageKeys, RatchetError> {
        if header.ecdh_pub != self.their_ecdh || self.receiving_chain.is_none() {
            self.skip_receiving_keys(header.pn)?;
            self.dh_ratchet(header)?;
        }
        self.skip_receiving_keys(header.j)?;

        if let Some(skipped) = self.skipped_keys.remove(&(header.i, header.j)) {
            self.old_mac_keys.push(skipped.mac_key);
            return Ok(MessageKeys {
                enc_key: skipped.enc_key,
                mac_key: skipped.mac_key,
                extra_key: skipped.extra_key,
            });
        }

        let chain = self.receiving_chain.take().ok_or(RatchetError::ConversionError)?;
        let (next_chain, keys) = chain_step(&chain);
        self.receiving_chain = Some(next_chain);
        self.k += 1;
        // The MAC key of a message just read is no longer needed to keep
        // secret: queue it for reveal in our next outgoing message.
        self.old_mac_keys.push(keys.mac_key);
        Ok(keys)
    }

    /// Derives and stores keys for messages `self.k..until` that haven't
    /// arrived yet. Their MAC keys stay out of `old_mac_keys` until a later
    /// `ratchet_receive` actually consumes one of them, not when they're
    /// derived here.
    fn skip_receiving_keys(&mut self, until: u32) -> Result<(), RatchetError> {
        let Some(mut chain) = self.receiving_chain.clone() else {
            return Ok(());
        };
        if until.saturating_sub(self.k) as usize > MAX_SKIP as usize {
            return Err(RatchetError::MaxSkipsExceeded);
        }
        while self.k < until {
            let (next_chain, keys) = chain_step(&chain);
            self.skipped_keys.insert(
                (self.i, self.k),
                SkippedKey {
                    enc_key: keys.enc_key,
                    mac_key: keys.mac_key,
                    extra_key: keys.extra_key,
                },
            );
            chain = next_chain;
            self.k += 1;
        }
        self.receiving_chain = Some(chain);
        Ok(())
    }

    fn dh_ratchet(&mut self, header: &IncomingHeader) -> Result<(), RatchetError> {
        self.pn = self.j;
        self.j = 0;
        self.k = 0;
        self.their_ecdh = header.ecdh_pub;
        self.their_dh = header.dh_pub.clone();

        let is_brace_step = self.i % 3 == 0;
        let ecdh_out = self.own_ecdh.diffie_hellman(&self.their_ecdh);
        if is_brace_step {
            if let Some(their_dh) = &self.their_dh {
                let dh_shared = crate::primitives::dh_shared_secret(&self.own_dh, their_dh);
                self.brace_key =
                    kdf_fixed::<32>(USAGE_THIRD_BRACE_KEY, OTRV4_DOMAIN_SEPARATION, &[&dh_shared]);
            }
        } else {
            self.brace_key = kdf_fixed::<32>(USAGE_BRACE_KEY, OTRV4_DOMAIN_SEPARATION, &[&self.brace_key]);
        }

        self.shared_secret = mix_shared_secret(&self.root_key, &ecdh_out, &self.brace_key);
        let (root, receiving_chain) = derive_root_and_chain(&self.root_key, &self.shared_secret);
        self.root_key = root;
        self.receiving_chain = Some(receiving_chain);

        self.own_ecdh = PrivateScalar::random();
        if is_brace_step {
            self.own_dh = DhPrivateKey::random();
        }
        let ecdh_out2 = self.own_ecdh.diffie_hellman(&self.their_ecdh);
        self.shared_secret = mix_shared_secret(&self.root_key, &ecdh_out2, &self.brace_key);
        let (root2, sending_chain) = derive_root_and_chain(&self.root_key, &self.shared_secret);
        self.root_key = root2;
        self.sending_chain = Some(sending_chain);

        self.i += 1;
        Ok(())
    }

    /// Drains and returns the accumulated old MAC keys, e.g. on disconnect or
    /// a TLV-7 extra-key-reveal request.
    pub fn take_old_mac_keys(&mut self) -> Vec<[u8; 64]> {
        std::mem::take(&mut self.old_mac_keys)
    }
}

/// `derive_key_from_extra_symm_key(usage, use_data, extra_symm_key)`: usage is
/// an explicit parameter, not a fixed constant (see the Open Question
/// resolution in DESIGN.md).
pub fn derive_key_from_extra_symm_key(usage: u8, use_data: &[u8], extra_symm_key: &[u8; 32]) -> [u8; 32] {
    kdf_fixed::<32>(usage, OTRV4_DOMAIN_SEPARATION, &[use_data, extra_symm_key])
}
