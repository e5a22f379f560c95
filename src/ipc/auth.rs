//! File-backed local auth token.
//!
//! The token at `{data_dir}/auth_token` is the only credential protecting
//! the loopback WebSocket port from other processes on the same machine.
//! Editor clients read the file and present the token in their first
//! `daemon.auth` call; the file is owner-only (mode 0600 on Unix).

use anyhow::{Context as _, Result};
use std::path::{Path, PathBuf};
use uuid::Uuid;

fn token_path(data_dir: &Path) -> PathBuf {
    data_dir.join("auth_token")
}

/// Read the daemon token, minting one on first use.
pub fn get_or_create_token(data_dir: &Path) -> Result<String> {
    let path = token_path(data_dir);
    match std::fs::read_to_string(&path) {
        Ok(existing) => {
            let token = existing.trim().to_string();
            // An empty file is treated as absent and re-minted.
            if !token.is_empty() {
                return Ok(token);
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            return Err(anyhow::Error::new(e)
                .context(format!("cannot read token file {}", path.display())))
        }
    }
    mint_token(data_dir, &path)
}

/// Remove the token file and mint a replacement (`vicod token --reset`).
/// Connections that already authenticated keep their sessions; new ones
/// need the new token.
pub fn reset_token(data_dir: &Path) -> Result<String> {
    let path = token_path(data_dir);
    match std::fs::remove_file(&path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            return Err(anyhow::Error::new(e)
                .context(format!("cannot remove token file {}", path.display())))
        }
    }
    mint_token(data_dir, &path)
}

fn mint_token(data_dir: &Path, path: &Path) -> Result<String> {
    // UUID v4 without dashes: 32 hex chars, same shape clients already parse.
    let token = Uuid::new_v4().simple().to_string();

    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("cannot create data dir {}", data_dir.display()))?;
    std::fs::write(path, &token)
        .with_context(|| format!("cannot write token file {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
            .with_context(|| format!("cannot restrict token file {}", path.display()))?;
    }

    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn token_is_minted_once_and_reused() {
        let dir = TempDir::new().unwrap();
        let first = get_or_create_token(dir.path()).unwrap();
        assert_eq!(first.len(), 32);
        assert!(first.chars().all(|c| c.is_ascii_hexdigit()));

        let second = get_or_create_token(dir.path()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn reset_mints_a_different_token() {
        let dir = TempDir::new().unwrap();
        let first = get_or_create_token(dir.path()).unwrap();
        let reset = reset_token(dir.path()).unwrap();
        assert_ne!(first, reset);
        assert_eq!(get_or_create_token(dir.path()).unwrap(), reset);
    }

    #[test]
    fn empty_token_file_is_replaced() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("auth_token"), "  \n").unwrap();
        let token = get_or_create_token(dir.path()).unwrap();
        assert_eq!(token.len(), 32);
    }

    #[cfg(unix)]
    #[test]
    fn token_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let dir = TempDir::new().unwrap();
        get_or_create_token(dir.path()).unwrap();
        let mode = std::fs::metadata(dir.path().join("auth_token"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
