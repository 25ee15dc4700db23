use sha2::{Digest, Sha256};

/// Loggable stand-in for a secret: `len=N, sha256=XXXXXXXXXXXX`.
///
/// Two log lines about the same token can be correlated without either one
/// revealing it.
pub fn secret_fingerprint(secret: &str) -> String {
    let digest = Sha256::digest(secret.as_bytes());
    let hash = format!("{:x}", digest);
    format!("len={}, sha256={}", secret.len(), &hash[..12])
}

/// First few characters of a public identifier (client ids), enough to tell
/// registrations apart in logs.
pub fn preview(value: &str, keep: usize) -> String {
    if value.chars().count() <= keep {
        return value.to_string();
    }
    let head: String = value.chars().take(keep).collect();
    format!("{}...", head)
}
