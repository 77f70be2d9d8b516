use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::clock::Clock;
use crate::error::{EntityKind, LibraryError};
use crate::identity::generate_id;
use crate::models::{tables, Notification, NotificationKind};
use crate::reservations::HOLD_DAYS;
use crate::store::{or_empty, RecordStore};

/// Per-user inbox of library notices.
pub struct NotificationCenter {
    store: Arc<RecordStore>,
    clock: Arc<dyn Clock>,
}

impl NotificationCenter {
    pub fn new(store: Arc<RecordStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub fn create(
        &self,
        user_id: &str,
        kind: NotificationKind,
        title: &str,
        content: &str,
    ) -> Result<Notification, LibraryError> {
        let notification = Notification {
            notification_id: generate_id("notif"),
            user_id: user_id.to_string(),
            kind,
            title: title.to_string(),
            content: content.to_string(),
            send_date: self.clock.now(),
            is_read: false,
        };
        self.store.insert(notification.clone())?;

        tracing::debug!("Notified {}: {}", user_id, title);
        Ok(notification)
    }

    pub fn send_due_reminder(
        &self,
        user_id: &str,
        publication_title: &str,
        due_date: DateTime<Utc>,
    ) -> Result<Notification, LibraryError> {
        self.create(
            user_id,
            NotificationKind::DueReminder,
            "Loan due soon",
            &Self::due_reminder_text(publication_title, due_date),
        )
    }

    pub fn due_reminder_text(publication_title: &str, due_date: DateTime<Utc>) -> String {
        format!(
            "\"{}\" is due on {}. Please return or renew it in time.",
            publication_title,
            due_date.format("%Y-%m-%d")
        )
    }

    pub fn send_overdue_notice(
        &self,
        user_id: &str,
        publication_title: &str,
        overdue_days: u32,
    ) -> Result<Notification, LibraryError> {
        self.create(
            user_id,
            NotificationKind::Overdue,
            "Loan overdue",
            &Self::overdue_text(publication_title, overdue_days),
        )
    }

    pub fn overdue_text(publication_title: &str, overdue_days: u32) -> String {
        format!(
            "\"{}\" is {} days overdue. Please return it as soon as possible.",
            publication_title, overdue_days
        )
    }

    pub fn send_reservation_ready(
        &self,
        user_id: &str,
        publication_title: &str,
    ) -> Result<Notification, LibraryError> {
        self.create(
            user_id,
            NotificationKind::ReservationReady,
            "Reservation ready",
            &format!(
                "\"{}\" is ready for you. Please collect it within {} days.",
                publication_title, HOLD_DAYS
            ),
        )
    }

    pub fn mark_read(&self, notification_id: &str) -> Result<Notification, LibraryError> {
        self.store
            .update::<Notification>(notification_id, |n| n.is_read = true)?
            .ok_or_else(|| LibraryError::not_found(EntityKind::Notification, notification_id))
    }

    pub fn get(&self, notification_id: &str) -> Option<Notification> {
        or_empty(self.store.get(notification_id), tables::NOTIFICATIONS)
    }

    pub fn by_user(&self, user_id: &str) -> Vec<Notification> {
        or_empty(
            self.store.query::<Notification>(|n| n.user_id == user_id),
            tables::NOTIFICATIONS,
        )
    }

    pub fn unread_count(&self, user_id: &str) -> usize {
        self.by_user(user_id).iter().filter(|n| !n.is_read).count()
    }

    pub fn delete(&self, notification_id: &str) -> Result<(), LibraryError> {
        if !self.store.delete::<Notification>(notification_id)? {
            return Err(LibraryError::not_found(
                EntityKind::Notification,
                notification_id,
            ));
        }
        Ok(())
    }

    /// Delete every read notification of a user. Returns how many went.
    pub fn clear_read(&self, user_id: &str) -> Result<usize, LibraryError> {
        let mut uow = self.store.begin();
        let read = uow.query::<Notification>(|n| n.user_id == user_id && n.is_read)?;
        for notification in &read {
            uow.delete::<Notification>(&notification.notification_id)?;
        }
        uow.commit()?;
        Ok(read.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Fixture;

    fn setup() -> (Fixture, NotificationCenter) {
        let fx = Fixture::new();
        let center = NotificationCenter::new(fx.store.clone(), fx.clock());
        (fx, center)
    }

    #[test]
    fn test_templates() {
        let (fx, center) = setup();

        let due = center
            .send_due_reminder("user-1", "Dune", fx.now())
            .unwrap();
        assert_eq!(due.kind, NotificationKind::DueReminder);
        assert!(due.content.contains("2024-01-01"));

        let overdue = center.send_overdue_notice("user-1", "Dune", 4).unwrap();
        assert_eq!(overdue.kind, NotificationKind::Overdue);
        assert!(overdue.content.contains("4 days overdue"));

        let ready = center.send_reservation_ready("user-1", "Dune").unwrap();
        assert_eq!(ready.kind, NotificationKind::ReservationReady);
        assert!(ready.content.contains("within 7 days"));
        assert_eq!(ready.send_date, fx.now());
    }

    #[test]
    fn test_read_state() {
        let (_fx, center) = setup();
        let a = center
            .create("user-1", NotificationKind::General, "Hello", "Welcome")
            .unwrap();
        center
            .create("user-1", NotificationKind::General, "Again", "Still here")
            .unwrap();
        center
            .create("user-2", NotificationKind::General, "Other", "Not yours")
            .unwrap();

        assert_eq!(center.unread_count("user-1"), 2);
        assert!(center.mark_read(&a.notification_id).unwrap().is_read);
        assert_eq!(center.unread_count("user-1"), 1);

        assert_eq!(center.clear_read("user-1").unwrap(), 1);
        assert_eq!(center.clear_read("user-1").unwrap(), 0);
        assert_eq!(center.by_user("user-1").len(), 1);
        assert_eq!(center.by_user("user-2").len(), 1);
    }

    #[test]
    fn test_delete() {
        let (_fx, center) = setup();
        let n = center
            .create("user-1", NotificationKind::General, "Hello", "")
            .unwrap();

        center.delete(&n.notification_id).unwrap();
        assert!(center.get(&n.notification_id).is_none());
        assert!(matches!(
            center.delete(&n.notification_id),
            Err(LibraryError::NotFound(EntityKind::Notification, _))
        ));
        assert!(center.mark_read("notif-missing").is_err());
    }
}
