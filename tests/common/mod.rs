//! Controller-side implementation of the pairing handshakes, used to
//! exercise the accessory end to end.

#![allow(dead_code)]

use bytes::Bytes;
use num_bigint::BigUint;
use sha2::{Digest, Sha512};

use hapd::crypto::{derive_key, ed25519_verify, CryptoEnvelope, LongTermKeypair};
use hapd::session::SessionRef;
use hapd::tlv::methods;
use hapd::{Accessory, AccessoryConfig, Request, TlvChain, TlvType};

pub const SETUP_CODE: &str = "031-45-154";
pub const USERNAME: &str = "Pair-Setup";

pub const CONTROLLER_ID: [u8; 36] = *b"deadbeef-0000-4000-8000-feedfacecafe";

const MODULUS_SIZE: usize = 384;

pub fn test_accessory() -> Accessory {
    let config = AccessoryConfig::with_name("Integration Device").setup_code(SETUP_CODE);
    Accessory::new(config).unwrap()
}

/// Deliver one pairing POST and drain the dispatcher
pub fn post(accessory: &mut Accessory, session: &SessionRef, path: &str, chain: &TlvChain) {
    accessory.receive(session, Request::pairing_post(path, chain.encode()));
    accessory.drain();
}

/// Pull and parse the queued TLV response
pub fn response_tlv(session: &SessionRef) -> TlvChain {
    let raw = session.borrow().connection().borrow_mut().take_output();
    let head_end = raw
        .windows(4)
        .position(|window| window == b"\r\n\r\n")
        .expect("complete HTTP response");
    TlvChain::parse(&Bytes::copy_from_slice(&raw[head_end + 4..]))
}

fn n_modulus() -> BigUint {
    BigUint::parse_bytes(
        concat!(
            "FFFFFFFFFFFFFFFFC90FDAA22168C234C4C6628B80DC1CD129024E08",
            "8A67CC74020BBEA63B139B22514A08798E3404DDEF9519B3CD3A431B",
            "302B0A6DF25F14374FE1356D6D51C245E485B576625E7EC6F44C42E9",
            "A637ED6B0BFF5CB6F406B7EDEE386BFB5A899FA5AE9F24117C4B1FE6",
            "49286651ECE45B3DC2007CB8A163BF0598DA48361C55D39A69163FA8",
            "FD24CF5F83655D23DCA3AD961C62F356208552BB9ED529077096966D",
            "670C354E4ABC9804F1746C08CA18217C32905E462E36CE3BE39E772C",
            "180E86039B2783A2EC07A28FB5C55DF06F4C52C9DE2BCBF695581718",
            "3995497CEA956AE515D2261898FA051015728E5A8AAAC42DAD33170D",
            "04507A33A85521ABDF1CBA64ECFB850458DBEF0A8AEA71575D060C7D",
            "B3970F85A6E1E4C7ABF5AE8CDB0933D71E8C94E04A25619DCEE3D226",
            "1AD2EE6BF12FFA06D98A0864D87602733EC86A64521F2B18177B200C",
            "BBE117577A615D6C770988C0BAD946E208E24FA074E5AB3143DB5BFC",
            "E0FD108E4B82D120A93AD2CAFFFFFFFFFFFFFFFF"
        )
        .as_bytes(),
        16,
    )
    .unwrap()
}

fn sha512_parts(parts: &[&[u8]]) -> [u8; 64] {
    let mut hasher = Sha512::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

fn pad(bytes: &[u8]) -> Vec<u8> {
    let mut out = vec![0u8; MODULUS_SIZE - bytes.len()];
    out.extend_from_slice(bytes);
    out
}

/// Controller side of the SRP handshake
pub struct SrpController {
    password: String,
    a: BigUint,
    pub a_pub: Vec<u8>,
    pub session_key: [u8; 64],
    pub proof: [u8; 64],
}

impl SrpController {
    pub fn new(password: &str) -> Self {
        let a = BigUint::from_bytes_be(&rand::random::<[u8; 32]>());
        let a_pub = BigUint::from(5u32).modpow(&a, &n_modulus()).to_bytes_be();
        Self {
            password: password.to_string(),
            a,
            a_pub,
            session_key: [0; 64],
            proof: [0; 64],
        }
    }

    /// Digest the accessory's M2 (salt, B) into K and M
    pub fn process_m2(&mut self, salt: &[u8], b_pub: &[u8]) {
        let n = n_modulus();
        let g = BigUint::from(5u32);

        let inner = sha512_parts(&[USERNAME.as_bytes(), b":", self.password.as_bytes()]);
        let x = BigUint::from_bytes_be(&sha512_parts(&[salt, &inner]));

        let k = BigUint::from_bytes_be(&sha512_parts(&[&n.to_bytes_be(), &pad(&[5])]));
        let u = BigUint::from_bytes_be(&sha512_parts(&[&pad(&self.a_pub), &pad(b_pub)]));

        // S = (B - k*g^x)^(a + u*x) mod N
        let kgx = (k * g.modpow(&x, &n)) % &n;
        let base = (BigUint::from_bytes_be(b_pub) + &n - kgx) % &n;
        let exponent = &self.a + &u * &x;
        let premaster = base.modpow(&exponent, &n);
        self.session_key = sha512_parts(&[&premaster.to_bytes_be()]);

        let mut group_hash = sha512_parts(&[&n.to_bytes_be()]);
        let generator_hash = sha512_parts(&[&[5u8]]);
        for (lhs, rhs) in group_hash.iter_mut().zip(generator_hash.iter()) {
            *lhs ^= rhs;
        }
        let identity_hash = sha512_parts(&[USERNAME.as_bytes()]);
        let b_min = BigUint::from_bytes_be(b_pub).to_bytes_be();
        self.proof = sha512_parts(&[
            &group_hash,
            &identity_hash,
            salt,
            &BigUint::from_bytes_be(&self.a_pub).to_bytes_be(),
            &b_min,
            &self.session_key,
        ]);
    }

    /// Expected accessory proof `H(A | M | K)`
    pub fn expected_server_proof(&self) -> [u8; 64] {
        sha512_parts(&[&self.a_pub, &self.proof, &self.session_key])
    }

    pub fn m1_chain(&self) -> TlvChain {
        let mut chain = TlvChain::new();
        chain.insert(TlvType::Method, &[methods::PAIR_SETUP]);
        chain.insert(TlvType::State, &[1]);
        chain
    }

    pub fn m3_chain(&self) -> TlvChain {
        let mut chain = TlvChain::new();
        chain.insert(TlvType::Proof, &self.proof);
        chain.insert(TlvType::PublicKey, &self.a_pub);
        chain.insert(TlvType::State, &[3]);
        chain
    }

    /// Build M5: the encrypted controller identity envelope
    pub fn m5_chain(&self, identity: &LongTermKeypair) -> TlvChain {
        let hkdf = derive_key(
            b"Pair-Setup-Controller-Sign-Salt",
            &self.session_key,
            b"Pair-Setup-Controller-Sign-Info",
        )
        .unwrap();
        let mut device_info = Vec::new();
        device_info.extend_from_slice(&hkdf);
        device_info.extend_from_slice(&CONTROLLER_ID);
        device_info.extend_from_slice(&identity.public_bytes());
        let signature = identity.sign(&device_info);

        let mut inner = TlvChain::new();
        inner.insert(TlvType::Signature, &signature);
        inner.insert(TlvType::PublicKey, &identity.public_bytes());
        inner.insert(TlvType::Identifier, &CONTROLLER_ID);

        let key = self.envelope_key();
        let mut envelope =
            CryptoEnvelope::for_encrypt(key, b"PS-Msg05", inner.encode()).unwrap();
        envelope.encrypt().unwrap();

        let mut chain = TlvChain::new();
        chain.insert(TlvType::EncryptedData, &envelope.wire_output().unwrap());
        chain.insert(TlvType::State, &[5]);
        chain
    }

    pub fn envelope_key(&self) -> [u8; 32] {
        derive_key(
            b"Pair-Setup-Encrypt-Salt",
            &self.session_key,
            b"Pair-Setup-Encrypt-Info",
        )
        .unwrap()
    }

    /// Open and check the accessory's M6 envelope, returning its
    /// (identifier, long-term public key)
    pub fn verify_m6(&self, m6: &TlvChain) -> (Vec<u8>, Vec<u8>) {
        assert_eq!(m6.byte_of(TlvType::State), Some(6));
        assert!(m6.find(TlvType::Error).is_none(), "M6 carries an error");

        let encrypted = m6.value_of(TlvType::EncryptedData).unwrap();
        let mut envelope =
            CryptoEnvelope::for_decrypt(self.envelope_key(), b"PS-Msg06", &encrypted).unwrap();
        envelope.decrypt();
        assert!(envelope.decrypt_succeeded());

        let inner = TlvChain::parse(&Bytes::from(envelope.plaintext.clone().unwrap()));
        let accessory_id = inner.require_exact(TlvType::Identifier, 36).unwrap();
        let accessory_ltpk = inner.require_exact(TlvType::PublicKey, 32).unwrap();
        let signature = inner.require_exact(TlvType::Signature, 64).unwrap();

        let hkdf = derive_key(
            b"Pair-Setup-Accessory-Sign-Salt",
            &self.session_key,
            b"Pair-Setup-Accessory-Sign-Info",
        )
        .unwrap();
        let mut accessory_info = Vec::new();
        accessory_info.extend_from_slice(&hkdf);
        accessory_info.extend_from_slice(&accessory_id);
        accessory_info.extend_from_slice(&accessory_ltpk);
        ed25519_verify(&accessory_ltpk, &accessory_info, &signature)
            .expect("accessory M6 signature");

        (accessory_id, accessory_ltpk)
    }
}

/// Run the whole Pair-Setup exchange, returning the controller identity
/// that is now persisted on the accessory
pub fn pair(accessory: &mut Accessory) -> LongTermKeypair {
    let identity = LongTermKeypair::generate();
    let mut controller = SrpController::new(SETUP_CODE);
    let session = accessory.connect();

    post(accessory, &session, "/pair-setup", &controller.m1_chain());
    let m2 = response_tlv(&session);
    let salt = m2.value_of(TlvType::Salt).unwrap();
    let b_pub = m2.value_of(TlvType::PublicKey).unwrap();
    controller.process_m2(&salt, &b_pub);

    post(accessory, &session, "/pair-setup", &controller.m3_chain());
    let m4 = response_tlv(&session);
    assert_eq!(
        m4.value_of(TlvType::Proof).unwrap(),
        controller.expected_server_proof()
    );

    post(
        accessory,
        &session,
        "/pair-setup",
        &controller.m5_chain(&identity),
    );
    let m6 = response_tlv(&session);
    controller.verify_m6(&m6);

    identity
}
