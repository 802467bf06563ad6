//! SRP handshake tests with a minimal controller-side implementation

use num_bigint::BigUint;
use sha2::{Digest, Sha512};

use crate::crypto::srp::{
    compute_public_key, compute_verifier, generate_private_key, generate_salt, proof_m,
    server_proof, session_key, verify_client_proof, MODULUS_SIZE,
};

const USERNAME: &str = "Pair-Setup";
const SETUP_CODE: &str = "031-45-154";

// Controller-side SRP-6a, used only to exercise the server
struct Controller {
    a: BigUint,
    a_pub: Vec<u8>,
}

// RFC 5054 3072-bit prime, spelled independently of the server constant
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

impl Controller {
    fn new(a: BigUint) -> Self {
        let a_pub = BigUint::from(5u32).modpow(&a, &n_modulus()).to_bytes_be();
        Self { a, a_pub }
    }

    // Client-side K and M given the server's salt and B
    fn derive(&self, password: &str, salt: &[u8], b_pub: &[u8]) -> ([u8; 64], [u8; 64]) {
        let n = n_modulus();
        let g = BigUint::from(5u32);

        let inner = sha512_parts(&[USERNAME.as_bytes(), b":", password.as_bytes()]);
        let x = BigUint::from_bytes_be(&sha512_parts(&[salt, &inner]));

        let k = BigUint::from_bytes_be(&sha512_parts(&[&n.to_bytes_be(), &pad(&[5])]));
        let u = BigUint::from_bytes_be(&sha512_parts(&[&pad(&self.a_pub), &pad(b_pub)]));

        // S = (B - k*g^x)^(a + u*x) mod N
        let kgx = (k * g.modpow(&x, &n)) % &n;
        let base = (BigUint::from_bytes_be(b_pub) + &n - kgx) % &n;
        let exponent = &self.a + &u * &x;
        let premaster = base.modpow(&exponent, &n);
        let session = sha512_parts(&[&premaster.to_bytes_be()]);

        let mut group_hash = sha512_parts(&[&n.to_bytes_be()]);
        let gen_hash = sha512_parts(&[&[5u8]]);
        for (lhs, rhs) in group_hash.iter_mut().zip(gen_hash.iter()) {
            *lhs ^= rhs;
        }
        let identity = sha512_parts(&[USERNAME.as_bytes()]);
        let b_min = BigUint::from_bytes_be(b_pub).to_bytes_be();
        let proof = sha512_parts(&[
            &group_hash,
            &identity,
            salt,
            &BigUint::from_bytes_be(&self.a_pub).to_bytes_be(),
            &b_min,
            &session,
        ]);

        (session, proof)
    }
}

#[test]
fn handshake_agrees_on_key_and_proof() {
    let salt = generate_salt();
    let b = generate_private_key();
    let verifier = compute_verifier(USERNAME, SETUP_CODE, &salt);
    let b_pub = compute_public_key(&verifier, &b);

    let controller = Controller::new(BigUint::from_bytes_be(&generate_private_key()));
    let server_key = session_key(&controller.a_pub, &b_pub, &b, &verifier).unwrap();
    let server_m = proof_m(USERNAME, &salt, &controller.a_pub, &b_pub, &server_key);

    let (client_key, client_m) = controller.derive(SETUP_CODE, &salt, &b_pub);
    assert_eq!(server_key, client_key);
    assert_eq!(server_m, client_m);
    assert!(verify_client_proof(&server_m, &client_m));

    // Both sides agree on the server proof H(A | M | K)
    let expected = sha512_parts(&[&controller.a_pub, &client_m, &client_key]);
    assert_eq!(server_proof(&controller.a_pub, &server_m, &server_key), expected);
}

#[test]
fn handshake_with_trivial_client_exponent() {
    // a = 1 gives A = g; the degenerate but legal controller key
    let salt = generate_salt();
    let b = generate_private_key();
    let verifier = compute_verifier(USERNAME, SETUP_CODE, &salt);
    let b_pub = compute_public_key(&verifier, &b);

    let controller = Controller::new(BigUint::from(1u32));
    let server_key = session_key(&controller.a_pub, &b_pub, &b, &verifier).unwrap();
    let server_m = proof_m(USERNAME, &salt, &controller.a_pub, &b_pub, &server_key);

    let (client_key, client_m) = controller.derive(SETUP_CODE, &salt, &b_pub);
    assert_eq!(server_key, client_key);
    assert!(verify_client_proof(&server_m, &client_m));
}

#[test]
fn fixed_inputs_reproduce_bit_for_bit() {
    let salt = [0x42u8; 16];
    let b = [0x07u8; 32];
    let verifier = compute_verifier(USERNAME, SETUP_CODE, &salt);

    let first_b_pub = compute_public_key(&verifier, &b);
    let second_b_pub = compute_public_key(&verifier, &b);
    assert_eq!(first_b_pub, second_b_pub);

    let controller = Controller::new(BigUint::from(1u32));
    let key_one = session_key(&controller.a_pub, &first_b_pub, &b, &verifier).unwrap();
    let key_two = session_key(&controller.a_pub, &second_b_pub, &b, &verifier).unwrap();
    assert_eq!(key_one, key_two);

    let m_one = proof_m(USERNAME, &salt, &controller.a_pub, &first_b_pub, &key_one);
    let m_two = proof_m(USERNAME, &salt, &controller.a_pub, &second_b_pub, &key_two);
    assert_eq!(m_one, m_two);
    assert_eq!(
        server_proof(&controller.a_pub, &m_one, &key_one),
        server_proof(&controller.a_pub, &m_two, &key_two)
    );
}

#[test]
fn wrong_password_fails_proof() {
    let salt = generate_salt();
    let b = generate_private_key();
    let verifier = compute_verifier(USERNAME, SETUP_CODE, &salt);
    let b_pub = compute_public_key(&verifier, &b);

    let controller = Controller::new(BigUint::from_bytes_be(&generate_private_key()));
    let server_key = session_key(&controller.a_pub, &b_pub, &b, &verifier).unwrap();
    let server_m = proof_m(USERNAME, &salt, &controller.a_pub, &b_pub, &server_key);

    let (_, client_m) = controller.derive("000-00-000", &salt, &b_pub);
    assert!(!verify_client_proof(&server_m, &client_m));
}

#[test]
fn degenerate_client_keys_rejected() {
    let salt = generate_salt();
    let b = generate_private_key();
    let verifier = compute_verifier(USERNAME, SETUP_CODE, &salt);
    let b_pub = compute_public_key(&verifier, &b);

    // A ≡ 0 mod N forces S = 0 regardless of the password
    assert!(session_key(&[0u8], &b_pub, &b, &verifier).is_err());
    assert!(session_key(&n_modulus().to_bytes_be(), &b_pub, &b, &verifier).is_err());
}

#[test]
fn verifier_depends_on_salt_and_password() {
    let salt_one = [1u8; 16];
    let salt_two = [2u8; 16];
    assert_ne!(
        compute_verifier(USERNAME, SETUP_CODE, &salt_one),
        compute_verifier(USERNAME, SETUP_CODE, &salt_two)
    );
    assert_ne!(
        compute_verifier(USERNAME, SETUP_CODE, &salt_one),
        compute_verifier(USERNAME, "000-00-000", &salt_one)
    );
}
