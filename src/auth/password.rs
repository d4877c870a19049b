use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use rand::rngs::OsRng;

/// Hashes a plaintext password with argon2 and a fresh random salt. The
/// work factor of the default parameters is the point: sign-in and sign-up
/// are supposed to be slow.
pub fn hash_password(plain: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(plain.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("argon2 hash: {e}"))?
        .to_string();
    Ok(hash)
}

pub fn verify_password(plain: &str, hash: &str) -> anyhow::Result<bool> {
    let parsed =
        PasswordHash::new(hash).map_err(|e| anyhow::anyhow!("malformed password hash: {e}"))?;
    Ok(Argon2::default()
        .verify_password(plain.as_bytes(), &parsed)
        .is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn correct_password_verifies() {
        let hash = hash_password("N0t-a-real-one!").expect("hash");
        assert!(verify_password("N0t-a-real-one!", &hash).expect("verify"));
    }

    #[test]
    fn wrong_password_is_rejected() {
        let hash = hash_password("first-password").expect("hash");
        assert!(!verify_password("second-password", &hash).expect("verify"));
    }

    #[test]
    fn same_password_hashes_differently_each_time() {
        let a = hash_password("repeatable").expect("hash");
        let b = hash_password("repeatable").expect("hash");
        assert_ne!(a, b);
    }

    #[test]
    fn malformed_hash_is_an_error() {
        assert!(verify_password("anything", "not-a-hash").is_err());
    }
}
