use rand::RngCore;
use sha2::{Digest, Sha256};
use time::Duration;

/// Reset tokens live for ten minutes.
pub const RESET_TOKEN_TTL: Duration = Duration::minutes(10);

/// A freshly generated password-reset token. The plaintext goes out by email
/// and is never stored; only the digest is persisted.
pub struct ResetToken {
    pub plain: String,
    pub digest: String,
}

pub fn generate() -> ResetToken {
    let mut bytes = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    let plain = hex::encode(bytes);
    let digest = digest_of(&plain);
    ResetToken { plain, digest }
}

/// SHA-256 hex digest of the plaintext token, as stored in the database and
/// recomputed when a reset request comes in.
pub fn digest_of(plain: &str) -> String {
    hex::encode(Sha256::digest(plain.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_is_stable_and_distinct_from_plaintext() {
        let token = generate();
        assert_ne!(token.plain, token.digest);
        assert_eq!(token.digest, digest_of(&token.plain));
    }

    #[test]
    fn tokens_are_unique() {
        let a = generate();
        let b = generate();
        assert_ne!(a.plain, b.plain);
    }

    #[test]
    fn digest_matches_known_vector() {
        // sha256("abc")
        assert_eq!(
            digest_of("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
