//! Pairing secret generation.

use rand::Rng;
use rand::rngs::OsRng;
use subtle::ConstantTimeEq;

/// Symbols a secret is drawn from (90 characters).
const ALPHABET: &[u8] =
    b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ1234567890-_=+()[]{}*&^%$#@!~`\\|/?.>,<";

/// Secret length in symbols; 20 symbols of 90 is roughly 130 bits.
pub const SECRET_LEN: usize = 20;

/// Generate a fresh pairing secret from the OS random source.
pub fn generate_secret() -> String {
    let mut rng = OsRng;
    (0..SECRET_LEN)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}

/// Compare two secrets without short-circuiting on the first mismatch.
pub fn secrets_match(expected: &str, provided: &str) -> bool {
    bool::from(expected.as_bytes().ct_eq(provided.as_bytes()))
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn test_alphabet_size() {
        assert_eq!(ALPHABET.len(), 90);
        let unique: HashSet<_> = ALPHABET.iter().collect();
        assert_eq!(unique.len(), 90);
    }

    #[test]
    fn test_secret_shape() {
        for _ in 0..100 {
            let secret = generate_secret();
            assert_eq!(secret.chars().count(), SECRET_LEN);
            assert!(secret.bytes().all(|b| ALPHABET.contains(&b)));
        }
    }

    #[test]
    fn test_secrets_are_random() {
        let secrets: HashSet<String> = (0..1000).map(|_| generate_secret()).collect();
        assert_eq!(secrets.len(), 1000);
    }

    #[test]
    fn test_secrets_match() {
        assert!(secrets_match("k3x9", "k3x9"));
        assert!(!secrets_match("k3x9", "k3x8"));
        assert!(!secrets_match("k3x9", "k3x"));
        assert!(!secrets_match("k3x9", ""));
    }
}
