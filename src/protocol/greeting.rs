use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use sha1::{Digest, Sha1};

use crate::constant::{GREETING_SIZE, SALT_SIZE, SCRAMBLE_SIZE};
use crate::error::{Error, Result};

/// Parsed server greeting.
///
/// The server sends exactly [`GREETING_SIZE`] bytes right after accept: a
/// 64-byte version banner line, then a 64-byte line whose first [`SALT_SIZE`]
/// characters are the base64-encoded auth salt.
#[derive(Debug, Clone)]
pub struct Greeting {
    pub banner: String,
    pub salt: [u8; SCRAMBLE_SIZE],
}

impl Greeting {
    pub fn parse(raw: &[u8]) -> Result<Self> {
        if raw.len() < GREETING_SIZE {
            return Err(Error::UnexpectedFrame("short greeting"));
        }

        let banner = String::from_utf8_lossy(&raw[..64])
            .trim_end_matches(['\n', ' ', '\0'])
            .to_string();

        let decoded = BASE64
            .decode(&raw[64..64 + SALT_SIZE])
            .map_err(|_| Error::UnexpectedFrame("greeting salt is not valid base64"))?;
        if decoded.len() < SCRAMBLE_SIZE {
            return Err(Error::UnexpectedFrame("greeting salt is too short"));
        }

        let mut salt = [0u8; SCRAMBLE_SIZE];
        salt.copy_from_slice(&decoded[..SCRAMBLE_SIZE]);
        Ok(Greeting { banner, salt })
    }
}

/// chap-sha1 scramble proving knowledge of the password without sending it:
///
/// ```text
/// step_1 = sha1(password)
/// step_2 = sha1(step_1)
/// step_3 = sha1(salt[0..20] || step_2)
/// scramble = step_1 xor step_3
/// ```
pub fn scramble(password: &str, salt: &[u8; SCRAMBLE_SIZE]) -> [u8; SCRAMBLE_SIZE] {
    let mut hasher = Sha1::new();
    hasher.update(password.as_bytes());
    let step_1 = hasher.finalize();

    let mut hasher = Sha1::new();
    hasher.update(step_1);
    let step_2 = hasher.finalize();

    let mut hasher = Sha1::new();
    hasher.update(salt);
    hasher.update(step_2);
    let step_3 = hasher.finalize();

    let mut out = [0u8; SCRAMBLE_SIZE];
    for (i, byte) in out.iter_mut().enumerate() {
        *byte = step_1[i] ^ step_3[i];
    }
    out
}
