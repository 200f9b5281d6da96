use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use sha1::{Digest, Sha1};

use super::greeting::{Greeting, scramble};

fn fake_greeting(banner: &str, salt: &[u8]) -> [u8; 128] {
    let mut raw = [b' '; 128];
    raw[..banner.len()].copy_from_slice(banner.as_bytes());
    raw[63] = b'\n';
    let encoded = BASE64.encode(salt);
    raw[64..64 + encoded.len()].copy_from_slice(encoded.as_bytes());
    raw[127] = b'\n';
    raw
}

#[test]
fn test_parse_greeting() {
    let salt: Vec<u8> = (0u8..32).collect();
    let raw = fake_greeting("Tarantool 2.11.1 (Binary) 615ba263-5e9f-4c3e", &salt);

    let greeting = Greeting::parse(&raw).expect("parse greeting");
    assert_eq!(greeting.banner, "Tarantool 2.11.1 (Binary) 615ba263-5e9f-4c3e");
    assert_eq!(greeting.salt, salt[..20]);
}

#[test]
fn test_parse_greeting_too_short() {
    assert!(Greeting::parse(&[0u8; 64]).is_err());
}

#[test]
fn test_parse_greeting_bad_salt() {
    let mut raw = [b' '; 128];
    raw[..9].copy_from_slice(b"Tarantool");
    raw[64..108].copy_from_slice(&[b'!'; 44]);
    assert!(Greeting::parse(&raw).is_err());
}

#[test]
fn test_scramble_composition() {
    let salt = [7u8; 20];
    let proof = scramble("megapassword", &salt);

    let step_1 = Sha1::digest(b"megapassword");
    let step_2 = Sha1::digest(step_1);
    let mut hasher = Sha1::new();
    hasher.update(salt);
    hasher.update(step_2);
    let step_3 = hasher.finalize();

    for i in 0..20 {
        assert_eq!(proof[i], step_1[i] ^ step_3[i]);
    }
}

#[test]
fn test_scramble_depends_on_salt() {
    let a = scramble("pass", &[1u8; 20]);
    let b = scramble("pass", &[2u8; 20]);
    assert_ne!(a, b);
}
