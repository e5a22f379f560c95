// SPDX-License-Identifier: MIT
//! Workspace account linking.
//!
//! The upstream service routes requests per user and workspace. The routing
//! token is a digest of both, derivable by any party that knows the pair; it
//! is an identifier, not a secret.

use sha2::{Digest, Sha256};

/// Routing token for a user+workspace pair: lower-case hex SHA-256 of
/// `"{user_id}:{workspace}"` truncated to 32 characters.
pub fn derive_token(user_id: &str, workspace: &str) -> String {
    let digest = hex::encode(Sha256::digest(format!("{user_id}:{workspace}").as_bytes()));
    digest[..32].to_string()
}

/// True when `token` is what [`derive_token`] produces for this pair.
pub fn validate_token(user_id: &str, workspace: &str, token: &str) -> bool {
    derive_token(user_id, workspace) == token
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_is_32_lowercase_hex_chars() {
        let token = derive_token("vscode-user", "/home/dev/project");
        assert_eq!(token.len(), 32);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn token_is_stable_and_pair_specific() {
        let a = derive_token("user", "/ws/a");
        assert_eq!(a, derive_token("user", "/ws/a"));
        assert_ne!(a, derive_token("user", "/ws/b"));
        assert_ne!(a, derive_token("other", "/ws/a"));
    }

    #[test]
    fn validate_round_trips() {
        let token = derive_token("user", "/ws");
        assert!(validate_token("user", "/ws", &token));
        assert!(!validate_token("user", "/ws", "deadbeef"));
    }
}
