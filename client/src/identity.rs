//! Stable participant identity for a session

use log::{info, warn};
use shared::protocol::{validate_player_id, ProtocolError};
use shared::PlayerId;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("session file error: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    Invalid(#[from] ProtocolError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionIdentity {
    player_id: PlayerId,
    path: Option<PathBuf>,
}

impl SessionIdentity {
    /// Fresh id of the form `player_<8 hex>`.
    pub fn generate_id() -> PlayerId {
        let hex = Uuid::new_v4().simple().to_string();
        PlayerId::new(format!("player_{}", &hex[..8]))
    }

    /// Identity that lives only as long as the process.
    pub fn ephemeral() -> Self {
        Self {
            player_id: Self::generate_id(),
            path: None,
        }
    }

    pub fn with_id(id: &str) -> Result<Self, IdentityError> {
        Ok(Self {
            player_id: validate_player_id(id)?,
            path: None,
        })
    }

    /// Reuses the id stored at `path`, or creates and stores a new one.
    ///
    /// A corrupt session file is replaced rather than treated as fatal.
    pub fn load_or_create(path: impl AsRef<Path>) -> Result<Self, IdentityError> {
        let path = path.as_ref();

        match fs::read_to_string(path) {
            Ok(contents) => match validate_player_id(contents.trim()) {
                Ok(player_id) => {
                    info!("Restored session identity {}", player_id);
                    return Ok(Self {
                        player_id,
                        path: Some(path.to_path_buf()),
                    });
                }
                Err(e) => warn!("Ignoring session file {}: {}", path.display(), e),
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        let player_id = Self::generate_id();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, player_id.as_str())?;
        info!("Created session identity {}", player_id);

        Ok(Self {
            player_id,
            path: Some(path.to_path_buf()),
        })
    }

    pub fn player_id(&self) -> &PlayerId {
        &self.player_id
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_file(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("lightcycle-identity-{}", Uuid::new_v4().simple()))
            .join(name)
    }

    #[test]
    fn test_generated_id_format() {
        let id = SessionIdentity::generate_id();
        let hex = id.as_str().strip_prefix("player_").unwrap();
        assert_eq!(hex.len(), 8);
        assert!(hex.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_identity_survives_reload() {
        let path = scratch_file("session");

        let first = SessionIdentity::load_or_create(&path).unwrap();
        let second = SessionIdentity::load_or_create(&path).unwrap();
        assert_eq!(first.player_id(), second.player_id());

        let _ = fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_corrupt_session_file_is_replaced() {
        let path = scratch_file("session");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "not a valid id!").unwrap();

        let identity = SessionIdentity::load_or_create(&path).unwrap();
        assert!(identity.player_id().as_str().starts_with("player_"));
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            identity.player_id().as_str()
        );

        let _ = fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_with_id_validates() {
        assert!(SessionIdentity::with_id("p1").is_ok());
        assert!(SessionIdentity::with_id("bad id").is_err());
    }
}
