use sha2::{Digest, Sha256};

/// Hashes a password into its stored form: lowercase hex SHA-256.
///
/// The digest is deterministic and unsalted, so equal passwords produce equal
/// hashes across accounts. Stored hashes must stay in this format for
/// existing accounts to keep logging in.
pub fn hash_password(password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

/// Returns true when `password` hashes to `expected_hash`.
pub fn verify_password(password: &str, expected_hash: &str) -> bool {
    hash_password(password) == expected_hash
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_hex_sha256() {
        assert_eq!(
            hash_password("password"),
            "5e884898da28047151d0e56f8dc6292773603d0d6aabbdd62a11ef721d1542d8"
        );
        assert_eq!(hash_password("password"), hash_password("password"));
        assert_ne!(hash_password("password"), hash_password("Password"));
    }

    #[test]
    fn verify_matches_only_the_original() {
        let stored = hash_password("pw1");
        assert!(verify_password("pw1", &stored));
        assert!(!verify_password("wrong", &stored));
        assert!(!verify_password("", &stored));
    }
}
