use tracing::warn;

use crate::error::CommandError;

/// Numeric identity of the single administrator. Alerts go to this chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdminId(pub i64);

/// Gate for privileged commands.
#[derive(Debug, Clone, Copy)]
pub struct AccessGuard {
    admin: AdminId,
}

impl AccessGuard {
    pub fn new(admin: AdminId) -> Self {
        Self { admin }
    }

    pub fn authorize(&self, requester: i64) -> bool {
        requester == self.admin.0
    }

    /// Like [`authorize`](Self::authorize), but logs the rejected identity and
    /// returns the user-facing error.
    pub fn check(&self, requester: i64) -> Result<(), CommandError> {
        if self.authorize(requester) {
            Ok(())
        } else {
            warn!(identity = requester, "Unauthorized command attempt");
            Err(CommandError::Unauthorized {
                identity: requester,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_admin_is_authorized() {
        let guard = AccessGuard::new(AdminId(42));
        assert!(guard.authorize(42));
        assert!(!guard.authorize(43));
        assert!(!guard.authorize(-42));
        assert!(!guard.authorize(0));
    }

    #[test]
    fn test_check_returns_unauthorized_with_identity() {
        let guard = AccessGuard::new(AdminId(-1001601477384));
        assert!(guard.check(-1001601477384).is_ok());
        assert_eq!(
            guard.check(7),
            Err(CommandError::Unauthorized { identity: 7 })
        );
    }
}
