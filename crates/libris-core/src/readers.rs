use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::accounts::UserProfile;
use crate::error::{EntityKind, LibraryError, StorageError};
use crate::models::{tables, Reader, User, MAX_CREDIT_SCORE};
use crate::store::{or_empty, RecordStore, UnitOfWork};
use crate::validation::{Validator, MAX_NAME_LEN};

/// A reader together with the profile of the user behind it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReaderDetails {
    #[serde(flatten)]
    pub reader: Reader,
    pub user: UserProfile,
}

/// Librarian-editable reader settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReaderProfileUpdate {
    pub borrow_limit: Option<u32>,
    pub membership_level: Option<String>,
}

pub struct ReaderLedger {
    store: Arc<RecordStore>,
}

impl ReaderLedger {
    pub fn new(store: Arc<RecordStore>) -> Self {
        Self { store }
    }

    pub fn get(&self, reader_id: &str) -> Option<Reader> {
        or_empty(self.store.get(reader_id), tables::READERS)
    }

    pub fn by_user(&self, user_id: &str) -> Option<Reader> {
        or_empty(
            self.store.query::<Reader>(|r| r.user_id == user_id),
            tables::READERS,
        )
        .into_iter()
        .next()
    }

    pub fn all(&self) -> Vec<Reader> {
        or_empty(self.store.all(), tables::READERS)
    }

    /// `None` if either the reader or its user is missing.
    pub fn details(&self, reader_id: &str) -> Option<ReaderDetails> {
        let reader = self.get(reader_id)?;
        let user: Option<User> = or_empty(self.store.get(&reader.user_id), tables::USERS);
        let Some(user) = user else {
            tracing::warn!("Reader {} points at missing user {}", reader_id, reader.user_id);
            return None;
        };
        Some(ReaderDetails {
            reader,
            user: user.into(),
        })
    }

    pub fn update_profile(
        &self,
        reader_id: &str,
        update: ReaderProfileUpdate,
    ) -> Result<Reader, LibraryError> {
        if let Some(level) = &update.membership_level {
            Validator::validate_text("membershipLevel", level, MAX_NAME_LEN)?;
        }

        self.store
            .update::<Reader>(reader_id, |r| {
                if let Some(limit) = update.borrow_limit {
                    r.borrow_limit = limit;
                }
                if let Some(level) = update.membership_level {
                    r.membership_level = level;
                }
            })?
            .ok_or_else(|| LibraryError::not_found(EntityKind::Reader, reader_id))
    }

    /// Shift `borrowedCount` by `delta`, never below zero.
    pub(crate) fn adjust_borrowed_count(
        uow: &mut UnitOfWork<'_>,
        reader_id: &str,
        delta: i32,
    ) -> Result<Option<Reader>, StorageError> {
        uow.update::<Reader>(reader_id, |r| {
            r.borrowed_count = r.borrowed_count.saturating_add_signed(delta);
        })
    }

    /// Shift `creditScore` by `delta`, clamped to `0..=200`.
    pub(crate) fn adjust_credit_score(
        uow: &mut UnitOfWork<'_>,
        reader_id: &str,
        delta: i64,
    ) -> Result<Option<Reader>, StorageError> {
        uow.update::<Reader>(reader_id, |r| {
            let score = (r.credit_score as i64 + delta).clamp(0, MAX_CREDIT_SCORE as i64);
            r.credit_score = score as i32;
        })
    }

    /// Shift `totalFines` by `delta`, never below zero.
    pub(crate) fn adjust_total_fines(
        uow: &mut UnitOfWork<'_>,
        reader_id: &str,
        delta: f64,
    ) -> Result<Option<Reader>, StorageError> {
        uow.update::<Reader>(reader_id, |r| {
            r.total_fines = (r.total_fines + delta).max(0.0);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Fixture;

    #[test]
    fn test_lookup() {
        let fx = Fixture::new();
        fx.add_reader("reader-1");
        fx.add_reader("reader-2");
        let ledger = ReaderLedger::new(fx.store.clone());

        assert_eq!(ledger.all().len(), 2);
        assert_eq!(ledger.get("reader-2").unwrap().user_id, "user-reader-2");
        assert_eq!(ledger.by_user("user-reader-1").unwrap().reader_id, "reader-1");
        assert!(ledger.by_user("user-nobody").is_none());
    }

    #[test]
    fn test_details_hide_password() {
        let fx = Fixture::new();
        fx.add_reader("reader-1");
        let ledger = ReaderLedger::new(fx.store.clone());

        let details = ledger.details("reader-1").unwrap();
        assert_eq!(details.user.email, "user-reader-1@library.org");

        let json = serde_json::to_value(&details).unwrap();
        assert_eq!(json["readerId"], "reader-1");
        assert!(json["user"].get("password").is_none());

        fx.store.delete::<User>("user-reader-1").unwrap();
        assert!(ledger.details("reader-1").is_none());
    }

    #[test]
    fn test_update_profile() {
        let fx = Fixture::new();
        fx.add_reader("reader-1");
        let ledger = ReaderLedger::new(fx.store.clone());

        let reader = ledger
            .update_profile(
                "reader-1",
                ReaderProfileUpdate {
                    borrow_limit: Some(10),
                    membership_level: Some("gold".to_string()),
                },
            )
            .unwrap();
        assert_eq!(reader.borrow_limit, 10);
        assert_eq!(reader.membership_level, "gold");

        assert!(matches!(
            ledger.update_profile("missing", ReaderProfileUpdate::default()),
            Err(LibraryError::NotFound(EntityKind::Reader, _))
        ));
    }

    #[test]
    fn test_adjustments_are_clamped() {
        let fx = Fixture::new();
        fx.add_reader("reader-1");

        let mut uow = fx.store.begin();
        ReaderLedger::adjust_borrowed_count(&mut uow, "reader-1", -1).unwrap();
        ReaderLedger::adjust_credit_score(&mut uow, "reader-1", 500).unwrap();
        ReaderLedger::adjust_total_fines(&mut uow, "reader-1", -3.0).unwrap();
        uow.commit().unwrap();

        let reader = fx.reader("reader-1");
        assert_eq!(reader.borrowed_count, 0);
        assert_eq!(reader.credit_score, 200);
        assert_eq!(reader.total_fines, 0.0);

        let mut uow = fx.store.begin();
        ReaderLedger::adjust_credit_score(&mut uow, "reader-1", -1_000).unwrap();
        let missing = ReaderLedger::adjust_borrowed_count(&mut uow, "missing", 1).unwrap();
        uow.commit().unwrap();

        assert!(missing.is_none());
        assert_eq!(fx.reader("reader-1").credit_score, 0);
    }
}
