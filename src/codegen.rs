use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::{rngs::OsRng, Rng, RngCore};
use sha2::{Digest, Sha256};

pub const DEFAULT_USER_INPUT_CODE_LENGTH: usize = 6;

// 256 bits of entropy for the magic-link secret.
const LINK_CODE_BYTES: usize = 32;

/// Short numeric code for manual entry. Each digit is drawn independently
/// from the OS CSPRNG, so leading zeros are as likely as any other digit.
pub fn new_user_input_code(length: usize) -> String {
    let mut rng = OsRng;
    (0..length)
        .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
        .collect()
}

/// Long random secret for the magic-link URL, plus the hash that gets
/// persisted. The plaintext only ever travels inside the link itself.
pub fn new_link_code() -> (String, String) {
    let mut bytes = [0u8; LINK_CODE_BYTES];
    OsRng.fill_bytes(&mut bytes);
    let plain = URL_SAFE_NO_PAD.encode(bytes);
    let hash = hash_link_code(&plain);
    (plain, hash)
}

/// SHA-256 of the plaintext link code, base64url-encoded. Stored and
/// compared on consumption instead of the plaintext.
pub fn hash_link_code(plain: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(plain.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_input_code_is_numeric_with_requested_length() {
        for len in [4, 6, 8] {
            let code = new_user_input_code(len);
            assert_eq!(code.len(), len);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn link_code_hash_matches_rehash_of_plaintext() {
        let (plain, hash) = new_link_code();
        assert_eq!(hash_link_code(&plain), hash);
        assert_ne!(plain, hash);
    }

    #[test]
    fn link_code_is_url_safe() {
        let (plain, hash) = new_link_code();
        for value in [plain, hash] {
            assert!(!value.contains('+'));
            assert!(!value.contains('/'));
            assert!(!value.contains('='));
        }
    }

    #[test]
    fn consecutive_codes_differ() {
        assert_ne!(new_link_code().0, new_link_code().0);
        // 6 digits can collide, but two draws matching twice in a row would
        // point at a broken RNG seed rather than bad luck.
        let pairs = (0..4)
            .map(|_| new_user_input_code(16))
            .collect::<Vec<_>>();
        assert!(pairs.windows(2).any(|w| w[0] != w[1]));
    }
}
