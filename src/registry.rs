use std::fmt;
use std::sync::Arc;

use tokio::sync::watch;

use crate::error::CommandError;

/// Public handle of a watched channel, in canonical form: no leading `@`,
/// ASCII-lowercase.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(String);

impl ChannelId {
    /// Canonicalize user input such as `@Demo` into `demo`.
    pub fn parse(raw: &str) -> Result<Self, CommandError> {
        let trimmed = raw.trim();
        let handle = trimmed.strip_prefix('@').unwrap_or(trimmed);
        if handle.is_empty() || handle.chars().any(char::is_whitespace) {
            return Err(CommandError::InvalidChannel(raw.to_string()));
        }
        Ok(Self(handle.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// In-memory ordered set of watched channels.
///
/// Cloning yields another handle to the same list. The list sits behind the
/// lock of a `watch` sender, which also wakes the watcher after each change.
#[derive(Clone)]
pub struct ChannelRegistry {
    inner: Arc<watch::Sender<Vec<ChannelId>>>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Vec::new());
        Self { inner: Arc::new(tx) }
    }

    /// Append `id` unless already present. Returns whether it was added.
    pub fn add(&self, id: ChannelId) -> bool {
        self.inner.send_if_modified(|channels| {
            if channels.contains(&id) {
                false
            } else {
                channels.push(id);
                true
            }
        })
    }

    /// Remove `id`, keeping the order of the remaining entries.
    pub fn remove(&self, id: &ChannelId) -> Result<(), CommandError> {
        let removed = self.inner.send_if_modified(|channels| {
            match channels.iter().position(|c| c == id) {
                Some(pos) => {
                    channels.remove(pos);
                    true
                }
                None => false,
            }
        });
        if removed {
            Ok(())
        } else {
            Err(CommandError::NotFound(id.clone()))
        }
    }

    /// Snapshot in insertion order.
    pub fn list(&self) -> Vec<ChannelId> {
        self.inner.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.inner.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.borrow().is_empty()
    }

    /// Receiver that is marked changed after every actual mutation.
    pub fn subscribe(&self) -> watch::Receiver<Vec<ChannelId>> {
        self.inner.subscribe()
    }
}

impl Default for ChannelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> ChannelId {
        ChannelId::parse(s).unwrap()
    }

    #[test]
    fn test_parse_canonicalizes_handle() {
        assert_eq!(id("@Demo").as_str(), "demo");
        assert_eq!(id("  news_ch ").as_str(), "news_ch");
    }

    #[test]
    fn test_parse_rejects_empty_and_spaced() {
        assert!(ChannelId::parse("").is_err());
        assert!(ChannelId::parse("@").is_err());
        assert!(ChannelId::parse("two words").is_err());
    }

    #[test]
    fn test_starts_empty() {
        let registry = ChannelRegistry::new();
        assert!(registry.is_empty());
        assert_eq!(registry.list(), Vec::<ChannelId>::new());
    }

    #[test]
    fn test_add_is_idempotent() {
        let registry = ChannelRegistry::new();
        assert!(registry.add(id("demo")));
        assert!(!registry.add(id("demo")));
        assert!(!registry.add(id("@DEMO")));
        assert_eq!(registry.list(), vec![id("demo")]);
    }

    #[test]
    fn test_remove_absent_reports_not_found() {
        let registry = ChannelRegistry::new();
        registry.add(id("alpha"));
        let err = registry.remove(&id("beta")).unwrap_err();
        assert_eq!(err, CommandError::NotFound(id("beta")));
        assert_eq!(registry.list(), vec![id("alpha")]);
    }

    #[test]
    fn test_list_keeps_insertion_order_of_survivors() {
        let registry = ChannelRegistry::new();
        for name in ["a1", "b2", "c3", "d4"] {
            registry.add(id(name));
        }
        registry.remove(&id("b2")).unwrap();
        registry.add(id("e5"));
        registry.add(id("b2"));
        registry.remove(&id("a1")).unwrap();
        assert_eq!(
            registry.list(),
            vec![id("c3"), id("d4"), id("e5"), id("b2")]
        );
        assert_eq!(registry.len(), 4);
        assert!(registry.list().contains(&id("e5")));
        assert!(!registry.list().contains(&id("a1")));
    }

    #[test]
    fn test_clones_share_state() {
        let registry = ChannelRegistry::new();
        let other = registry.clone();
        other.add(id("shared"));
        assert_eq!(registry.list(), vec![id("shared")]);
    }

    #[tokio::test]
    async fn test_subscribers_see_only_real_changes() {
        let registry = ChannelRegistry::new();
        let mut rx = registry.subscribe();

        registry.add(id("demo"));
        assert!(rx.has_changed().unwrap());
        rx.borrow_and_update();

        registry.add(id("demo"));
        assert!(!rx.has_changed().unwrap());

        assert!(registry.remove(&id("missing")).is_err());
        assert!(!rx.has_changed().unwrap());

        registry.remove(&id("demo")).unwrap();
        rx.changed().await.unwrap();
        assert!(rx.borrow_and_update().is_empty());
    }
}
