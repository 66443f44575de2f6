use std::collections::HashSet;

/// Groups and users already emitted during one run.
///
/// Owned by the aggregator and never shared, so no locking. A key is present
/// iff the matching record has been emitted.
#[derive(Debug, Default)]
pub struct DedupIndex {
    seen_groups: HashSet<String>,
    seen_users: HashSet<String>,
}

impl DedupIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_user(&self, user_id: &str) -> bool {
        self.seen_users.contains(user_id)
    }

    /// Returns true the first time a group id is seen.
    pub fn mark_group(&mut self, group_id: &str) -> bool {
        if self.seen_groups.contains(group_id) {
            return false;
        }
        self.seen_groups.insert(group_id.to_string())
    }

    /// Returns true the first time a user id is seen.
    pub fn mark_user(&mut self, user_id: &str) -> bool {
        if self.seen_users.contains(user_id) {
            return false;
        }
        self.seen_users.insert(user_id.to_string())
    }

    pub fn group_count(&self) -> usize {
        self.seen_groups.len()
    }

    pub fn user_count(&self) -> usize {
        self.seen_users.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marks_are_first_seen_only() {
        let mut idx = DedupIndex::new();
        assert!(!idx.has_user("1"));
        assert!(idx.mark_user("1"));
        assert!(!idx.mark_user("1"));
        assert!(idx.has_user("1"));

        assert!(idx.mark_group("g1"));
        assert!(!idx.mark_group("g1"));
        assert!(idx.mark_group("g2"));
        assert_eq!((idx.group_count(), idx.user_count()), (2, 1));
    }

    #[test]
    fn group_and_user_keys_are_separate() {
        let mut idx = DedupIndex::new();
        assert!(idx.mark_group("42"));
        assert!(!idx.has_user("42"));
        assert!(idx.mark_user("42"));
    }
}
