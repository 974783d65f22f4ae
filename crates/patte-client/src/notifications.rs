//! Notification feed with toast-once semantics.
//!
//! The feed merges the unread list fetched at login with live pushes.
//! Reconnects can redeliver pushes, so arrivals are deduplicated by
//! notification id for the whole login session: a notification toasts at
//! most once no matter how it arrives or how often.

use std::collections::HashSet;

use patte_shared::types::Notification;

/// In-memory notification list, newest first.
#[derive(Debug, Clone, Default)]
pub struct NotificationFeed {
    notifications: Vec<Notification>,
    seen: HashSet<String>,
}

impl NotificationFeed {
    /// Create an empty feed.
    pub fn new() -> Self {
        Self {
            notifications: Vec::new(),
            seen: HashSet::new(),
        }
    }

    /// Install the unread list fetched at login, newest first.
    ///
    /// Fetched ids join the seen set, so a live redelivery of any of them
    /// will not toast.
    pub fn replace_unread(&mut self, mut notifications: Vec<Notification>) {
        notifications.sort_by(|a, b| b.noty_created_at.cmp(&a.noty_created_at));
        self.seen
            .extend(notifications.iter().map(|n| n.noty_id.clone()));
        self.notifications = notifications;
    }

    /// Add a live notification.
    ///
    /// Returns true exactly once per notification id; redeliveries are
    /// dropped.
    pub fn push_live(&mut self, notification: Notification) -> bool {
        if !self.seen.insert(notification.noty_id.clone()) {
            return false;
        }
        self.notifications.insert(0, notification);
        true
    }

    /// Flip one notification to read. Local state only; the caller is
    /// responsible for the REST call. Returns true when something changed.
    pub fn mark_read(&mut self, noty_id: &str) -> bool {
        match self.notifications.iter_mut().find(|n| n.noty_id == noty_id) {
            Some(notification) if !notification.is_read => {
                notification.is_read = true;
                true
            }
            _ => false,
        }
    }

    /// Flip every notification to read. Returns how many changed.
    pub fn mark_all_read(&mut self) -> usize {
        let mut flipped = 0;
        for notification in &mut self.notifications {
            if !notification.is_read {
                notification.is_read = true;
                flipped += 1;
            }
        }
        flipped
    }

    /// Number of unread notifications.
    pub fn unread_count(&self) -> usize {
        self.notifications.iter().filter(|n| !n.is_read).count()
    }

    /// All notifications, newest first.
    pub fn notifications(&self) -> &[Notification] {
        &self.notifications
    }

    /// Drop everything, including the seen set. Used at logout; nothing
    /// is persisted.
    pub fn clear(&mut self) {
        self.notifications.clear();
        self.seen.clear();
    }

    /// Number of notifications held.
    pub fn len(&self) -> usize {
        self.notifications.len()
    }

    /// Whether the feed is empty.
    pub fn is_empty(&self) -> bool {
        self.notifications.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn notification(id: &str, minute: u32) -> Notification {
        Notification {
            noty_id: id.to_string(),
            noty_content: format!("notification {id}"),
            noty_link: format!("/adoption/{id}"),
            noty_type: "COMMENT".to_string(),
            noty_created_at: Utc.with_ymd_and_hms(2026, 3, 1, 9, minute, 0).unwrap(),
            is_read: false,
        }
    }

    #[test]
    fn test_replace_unread_sorts_newest_first() {
        let mut feed = NotificationFeed::new();
        feed.replace_unread(vec![
            notification("a", 5),
            notification("b", 30),
            notification("c", 10),
        ]);

        let order: Vec<&str> = feed.notifications().iter().map(|n| n.noty_id.as_str()).collect();
        assert_eq!(order, ["b", "c", "a"]);
        assert_eq!(feed.unread_count(), 3);
    }

    #[test]
    fn test_push_live_toasts_once() {
        let mut feed = NotificationFeed::new();
        assert!(feed.push_live(notification("a", 5)));
        // Reconnect redelivery of the same notification.
        assert!(!feed.push_live(notification("a", 5)));
        assert_eq!(feed.len(), 1);
    }

    #[test]
    fn test_fetched_ids_do_not_retoast() {
        let mut feed = NotificationFeed::new();
        feed.replace_unread(vec![notification("a", 5)]);
        // The same notification arriving live after the fetch is a dup.
        assert!(!feed.push_live(notification("a", 5)));
        assert!(feed.push_live(notification("b", 6)));
        assert_eq!(feed.notifications()[0].noty_id, "b");
    }

    #[test]
    fn test_mark_read_is_local_and_idempotent() {
        let mut feed = NotificationFeed::new();
        feed.replace_unread(vec![notification("a", 5), notification("b", 6)]);

        assert!(feed.mark_read("a"));
        assert!(!feed.mark_read("a"));
        assert!(!feed.mark_read("missing"));
        assert_eq!(feed.unread_count(), 1);
    }

    #[test]
    fn test_mark_all_read() {
        let mut feed = NotificationFeed::new();
        feed.replace_unread(vec![notification("a", 5), notification("b", 6)]);
        feed.mark_read("a");

        assert_eq!(feed.mark_all_read(), 1);
        assert_eq!(feed.unread_count(), 0);
        assert_eq!(feed.mark_all_read(), 0);
    }

    #[test]
    fn test_clear_forgets_seen_ids() {
        let mut feed = NotificationFeed::new();
        feed.push_live(notification("a", 5));
        feed.clear();

        assert!(feed.is_empty());
        // A new login session may see the id again.
        assert!(feed.push_live(notification("a", 5)));
    }
}
