use sha2::{Digest, Sha256};

/// Creates a truncated, salted one-way hash of a user identifier.
///
/// The output is always 16 hex characters regardless of input length, and the
/// raw identifier cannot be recovered from it. Used everywhere a user id is
/// stored or logged by this crate.
pub fn hash_user_id(user_id: &str, salt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(user_id.as_bytes());
    let hash = hasher.finalize();

    // Take first 8 bytes and format each as hex
    hash[..8]
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<String>()
}

/// Maps an arbitrary string to a stable bucket in [0, 100).
///
/// This is routing, not security: the only properties that matter are
/// determinism and distribution uniformity. The same input always lands in
/// the same bucket.
pub fn percentage_bucket(input: &str) -> u8 {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    let hash = hasher.finalize();

    let value = u16::from_be_bytes([hash[0], hash[1]]);
    (value % 100) as u8
}
