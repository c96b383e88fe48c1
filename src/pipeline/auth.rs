//! Sender authorization gate.
//!
//! Allow-list entries match either exactly or as a prefix, so a root identity
//! such as `@thomas` admits `@thomas:matrix.org` and any other sub-identity.

use tracing::debug;

/// Runtime-mutable allow-list of sender identities and prefixes.
///
/// - Empty list → deny all
/// - `*` in list → allow all
/// - otherwise → exact or starts-with match
#[derive(Debug, Clone, Default)]
pub struct AuthorizationList {
    entries: Vec<String>,
}

impl AuthorizationList {
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut list = Self::default();
        for entry in entries {
            list.add(entry);
        }
        list
    }

    /// Add an entry. Blank and duplicate entries are ignored.
    pub fn add(&mut self, entry: impl Into<String>) {
        let entry = entry.into().trim().to_string();
        if !entry.is_empty() && !self.entries.contains(&entry) {
            self.entries.push(entry);
        }
    }

    /// Remove an entry. Returns whether it was present.
    pub fn remove(&mut self, entry: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e != entry.trim());
        self.entries.len() != before
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Check whether a sender is admitted by any entry.
    pub fn authorize(&self, sender: &str) -> bool {
        let allowed = self
            .entries
            .iter()
            .any(|e| e == "*" || sender == e || sender.starts_with(e.as_str()));
        if !allowed {
            debug!(sender = %sender, "Sender not on allow-list");
        }
        allowed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_denies_all() {
        let list = AuthorizationList::default();
        assert!(!list.authorize("@thomas:matrix.org"));
    }

    #[test]
    fn wildcard_allows_all() {
        let list = AuthorizationList::new(["*"]);
        assert!(list.authorize("@anyone:example.org"));
    }

    #[test]
    fn exact_match() {
        let list = AuthorizationList::new(["@thomas:matrix.org"]);
        assert!(list.authorize("@thomas:matrix.org"));
        assert!(!list.authorize("@eve:matrix.org"));
    }

    #[test]
    fn prefix_admits_sub_identities() {
        let list = AuthorizationList::new(["@thomas"]);
        assert!(list.authorize("@thomas"));
        assert!(list.authorize("@thomas:matrix.org"));
        assert!(list.authorize("@thomas:other.server"));
        assert!(!list.authorize("@bob:matrix.org"));
    }

    #[test]
    fn add_and_remove_at_runtime() {
        let mut list = AuthorizationList::new(["@thomas"]);
        assert!(!list.authorize("@nova:example.org"));

        list.add("@nova");
        list.add("@nova");
        assert_eq!(list.entries().len(), 2);
        assert!(list.authorize("@nova:example.org"));

        assert!(list.remove("@nova"));
        assert!(!list.remove("@nova"));
        assert!(!list.authorize("@nova:example.org"));
    }

    #[test]
    fn blank_entries_are_ignored() {
        let list = AuthorizationList::new(["", "  "]);
        assert!(list.is_empty());
    }
}
