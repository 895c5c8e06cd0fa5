//! Session persistence
//!
//! Keeps the auth session in a JSON file so a restart does not sign the user out.

use std::io::Write;
use std::path::{Path, PathBuf};

use crate::shared::{Result, Session, TalkError};

/// JSON file holding the current session
#[derive(Debug, Clone)]
pub struct SessionFile {
    path: PathBuf,
}

impl SessionFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the stored session. A missing or unreadable file yields `None`.
    pub fn load(&self) -> Option<Session> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!("Failed to read session file {}: {}", self.path.display(), e);
                return None;
            }
        };
        match serde_json::from_str(&contents) {
            Ok(session) => Some(session),
            Err(e) => {
                tracing::warn!("Ignoring corrupt session file {}: {}", self.path.display(), e);
                None
            }
        }
    }

    /// Write the session, creating parent directories as needed.
    ///
    /// The file holds a refresh token, so on unix it is only readable by its owner,
    /// and a directory created here is closed to other users.
    pub fn save(&self, session: &Session) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|parent| !parent.exists()) {
            std::fs::create_dir_all(parent).map_err(|e| TalkError::io(parent, e))?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                if let Err(e) =
                    std::fs::set_permissions(parent, std::fs::Permissions::from_mode(0o700))
                {
                    tracing::warn!("Could not restrict {}: {}", parent.display(), e);
                }
            }
        }

        let json = serde_json::to_string_pretty(session)?;
        let mut options = std::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options
            .open(&self.path)
            .map_err(|e| TalkError::io(&self.path, e))?;
        // `mode` only applies on creation
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.set_permissions(std::fs::Permissions::from_mode(0o600))
                .map_err(|e| TalkError::io(&self.path, e))?;
        }
        file.write_all(json.as_bytes())
            .map_err(|e| TalkError::io(&self.path, e))
    }

    /// Remove the stored session
    pub fn clear(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(TalkError::io(&self.path, e)),
        }
    }
}
