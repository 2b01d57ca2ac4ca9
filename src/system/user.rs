//! Local account lookup through the C library passwd database

use crate::domain::ports::{User, UserLookup};
use crate::error::{Error, Result};
use nix::unistd;
use tracing::debug;

/// [`UserLookup`] backed by the host passwd database
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemUserLookup;

impl UserLookup for SystemUserLookup {
    fn lookup(&self, username: &str) -> Result<User> {
        let unknown = || Error::UnknownUser {
            username: username.to_string(),
        };

        // No passwd entry can hold a NUL
        if username.contains('\0') {
            return Err(unknown());
        }

        match unistd::User::from_name(username) {
            Ok(Some(entry)) => Ok(to_user(entry)),
            Ok(None) => Err(unknown()),
            Err(e) => {
                debug!("passwd lookup for {:?} failed: {}", username, e);
                Err(unknown())
            }
        }
    }
}

/// Name of the account the process runs as
pub fn current_username() -> Result<String> {
    let uid = unistd::getuid();
    let entry = unistd::User::from_uid(uid)
        .map_err(|e| Error::Internal(format!("passwd lookup for uid {} failed: {}", uid, e)))?
        .ok_or_else(|| Error::Internal(format!("no passwd entry for uid {}", uid)))?;

    Ok(entry.name)
}

fn to_user(entry: unistd::User) -> User {
    User {
        username: entry.name,
        uid: entry.uid.as_raw(),
        gid: entry.gid.as_raw(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_user_resolves() {
        let name = current_username().unwrap();
        let user = SystemUserLookup.lookup(&name).unwrap();

        assert_eq!(user.username, name);
        assert_eq!(user.uid, unistd::getuid().as_raw());
    }

    #[test]
    fn test_unknown_user() {
        let err = SystemUserLookup
            .lookup("nonexistentTargetUser")
            .unwrap_err();

        assert_eq!(
            err.to_string(),
            "lookup on local host: user: unknown user nonexistentTargetUser"
        );
    }

    #[test]
    fn test_interior_nul_is_unknown() {
        assert!(matches!(
            SystemUserLookup.lookup("bad\0name"),
            Err(Error::UnknownUser { .. })
        ));
    }
}
