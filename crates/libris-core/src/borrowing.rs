use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::clock::{days, whole_days_between, Clock};
use crate::error::{EntityKind, Ineligibility, LibraryError};
use crate::identity::generate_id;
use crate::models::{
    tables, BorrowRecord, BorrowStatus, Publication, Reader, MAX_RENEWALS,
};
use crate::publications::PublicationLedger;
use crate::readers::ReaderLedger;
use crate::store::{or_empty, RecordStore, UnitOfWork};

/// Readers below this credit score may not borrow.
pub const MIN_CREDIT_SCORE: i32 = 60;
/// Readers owing more than this may not borrow.
pub const MAX_UNPAID_FINES: f64 = 50.0;
/// Loans due within this many days count as upcoming.
pub const DUE_SOON_DAYS: i64 = 3;
/// Credit awarded for an on-time return.
const ON_TIME_CREDIT: i64 = 2;
/// Credit deducted per overdue day.
const OVERDUE_PENALTY_PER_DAY: i64 = 2;

/// Result of a successful return.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReturnOutcome {
    pub record: BorrowRecord,
    pub overdue_days: u32,
}

impl ReturnOutcome {
    pub(crate) fn log(&self) {
        if self.overdue_days > 0 {
            tracing::info!(
                "Record {} returned {} days late",
                self.record.record_id,
                self.overdue_days
            );
        } else {
            tracing::info!("Record {} returned on time", self.record.record_id);
        }
    }
}

fn eligibility_of(reader_id: &str, reader: Option<&Reader>) -> Result<(), Ineligibility> {
    let Some(reader) = reader else {
        return Err(Ineligibility::ReaderNotFound(reader_id.to_string()));
    };
    if reader.borrowed_count >= reader.borrow_limit {
        return Err(Ineligibility::BorrowLimitReached(
            reader.borrowed_count,
            reader.borrow_limit,
        ));
    }
    if reader.credit_score < MIN_CREDIT_SCORE {
        return Err(Ineligibility::CreditScoreTooLow(reader.credit_score));
    }
    if reader.total_fines > MAX_UNPAID_FINES {
        return Err(Ineligibility::UnpaidFinesOverLimit(reader.total_fines));
    }
    Ok(())
}

/// Loans, returns and renewals.
pub struct BorrowingEngine {
    store: Arc<RecordStore>,
    clock: Arc<dyn Clock>,
}

impl BorrowingEngine {
    pub fn new(store: Arc<RecordStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub fn check_eligibility(&self, reader_id: &str) -> Result<(), LibraryError> {
        let reader: Option<Reader> = self.store.get(reader_id)?;
        eligibility_of(reader_id, reader.as_ref()).map_err(LibraryError::NotEligible)
    }

    pub fn borrow(
        &self,
        reader_id: &str,
        publication_id: &str,
    ) -> Result<BorrowRecord, LibraryError> {
        let now = self.clock.now();
        let mut uow = self.store.begin();

        let reader = uow.get::<Reader>(reader_id)?;
        eligibility_of(reader_id, reader.as_ref()).map_err(LibraryError::NotEligible)?;

        let publication = uow
            .get::<Publication>(publication_id)?
            .ok_or_else(|| LibraryError::not_found(EntityKind::Publication, publication_id))?;
        if publication.is_withdrawn() || publication.available_copies == 0 {
            return Err(LibraryError::Unavailable(publication_id.to_string()));
        }

        let record = BorrowRecord {
            record_id: generate_id("borrow"),
            reader_id: reader_id.to_string(),
            publication_id: publication_id.to_string(),
            borrow_date: now,
            due_date: now + days(publication.borrow_period as i64),
            return_date: None,
            status: BorrowStatus::Borrowed,
            renewal_count: 0,
            max_renewals: MAX_RENEWALS,
        };
        uow.insert(record.clone())?;

        if !PublicationLedger::adjust_copies(&mut uow, publication_id, -1)? {
            return Err(LibraryError::Unavailable(publication_id.to_string()));
        }
        ReaderLedger::adjust_borrowed_count(&mut uow, reader_id, 1)?;
        uow.commit()?;

        tracing::info!(
            "Reader {} borrowed {} until {}",
            reader_id,
            publication_id,
            record.due_date
        );
        Ok(record)
    }

    pub fn return_publication(&self, record_id: &str) -> Result<ReturnOutcome, LibraryError> {
        let mut uow = self.store.begin();
        let outcome = Self::return_in(&mut uow, record_id, self.clock.now())?;
        uow.commit()?;

        outcome.log();
        Ok(outcome)
    }

    /// Stage a return in `uow` without committing it, so callers can add
    /// follow-up writes to the same batch.
    pub fn return_in(
        uow: &mut UnitOfWork<'_>,
        record_id: &str,
        now: DateTime<Utc>,
    ) -> Result<ReturnOutcome, LibraryError> {
        let mut record = uow
            .get::<BorrowRecord>(record_id)?
            .ok_or_else(|| LibraryError::not_found(EntityKind::BorrowRecord, record_id))?;
        if record.status == BorrowStatus::Returned || record.return_date.is_some() {
            return Err(LibraryError::AlreadyReturned(record_id.to_string()));
        }

        let overdue_days = whole_days_between(record.due_date, now).max(0);
        record.return_date = Some(now);
        record.status = if overdue_days > 0 {
            BorrowStatus::Overdue
        } else {
            BorrowStatus::Returned
        };
        uow.put(record.clone())?;

        Self::restock(uow, &record.publication_id)?;

        if ReaderLedger::adjust_borrowed_count(uow, &record.reader_id, -1)?.is_some() {
            let credit = if overdue_days == 0 {
                ON_TIME_CREDIT
            } else {
                -OVERDUE_PENALTY_PER_DAY * overdue_days
            };
            ReaderLedger::adjust_credit_score(uow, &record.reader_id, credit)?;
        } else {
            tracing::warn!(
                "Return of {} for missing reader {}",
                record_id,
                record.reader_id
            );
        }

        Ok(ReturnOutcome {
            record,
            overdue_days: u32::try_from(overdue_days).unwrap_or(u32::MAX),
        })
    }

    /// Put one copy back on the shelf. A publication deleted while on loan is
    /// tolerated; a copy count that is already full is not.
    fn restock(uow: &mut UnitOfWork<'_>, publication_id: &str) -> Result<(), LibraryError> {
        if uow.get::<Publication>(publication_id)?.is_none() {
            tracing::warn!("Returned copy of missing publication {}", publication_id);
            return Ok(());
        }
        if !PublicationLedger::adjust_copies(uow, publication_id, 1)? {
            return Err(LibraryError::InvalidState(format!(
                "publication {} already has every copy on the shelf",
                publication_id
            )));
        }
        Ok(())
    }

    /// Extend a loan by one borrow period. Returns the new due date.
    pub fn renew(&self, record_id: &str) -> Result<DateTime<Utc>, LibraryError> {
        let mut uow = self.store.begin();

        let record = uow
            .get::<BorrowRecord>(record_id)?
            .ok_or_else(|| LibraryError::not_found(EntityKind::BorrowRecord, record_id))?;
        if !record.is_active() {
            return Err(LibraryError::InvalidState(
                "only borrowed records can be renewed".to_string(),
            ));
        }
        if record.renewal_count >= record.max_renewals {
            return Err(LibraryError::RenewalLimitReached(record.renewal_count));
        }
        let publication = uow
            .get::<Publication>(&record.publication_id)?
            .ok_or_else(|| {
                LibraryError::not_found(EntityKind::Publication, &record.publication_id)
            })?;

        let due_date = record.due_date + days(publication.borrow_period as i64);
        uow.update::<BorrowRecord>(record_id, |r| {
            r.due_date = due_date;
            r.renewal_count += 1;
        })?;
        uow.commit()?;

        tracing::debug!("Renewed {} until {}", record_id, due_date);
        Ok(due_date)
    }

    pub fn get(&self, record_id: &str) -> Option<BorrowRecord> {
        or_empty(self.store.get(record_id), tables::BORROW_RECORDS)
    }

    pub fn all(&self) -> Vec<BorrowRecord> {
        or_empty(self.store.all(), tables::BORROW_RECORDS)
    }

    pub fn by_reader(&self, reader_id: &str) -> Vec<BorrowRecord> {
        or_empty(
            self.store
                .query::<BorrowRecord>(|r| r.reader_id == reader_id),
            tables::BORROW_RECORDS,
        )
    }

    /// Active loans past their due date.
    pub fn overdue(&self) -> Vec<BorrowRecord> {
        let now = self.clock.now();
        or_empty(
            self.store
                .query::<BorrowRecord>(|r| r.is_active() && r.due_date < now),
            tables::BORROW_RECORDS,
        )
    }

    /// Active loans falling due within the next three days.
    pub fn upcoming_due(&self) -> Vec<BorrowRecord> {
        let now = self.clock.now();
        let horizon = now + days(DUE_SOON_DAYS);
        or_empty(
            self.store.query::<BorrowRecord>(|r| {
                r.is_active() && r.due_date > now && r.due_date <= horizon
            }),
            tables::BORROW_RECORDS,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PublicationStatus, PublicationType};
    use crate::testing::Fixture;

    fn engine(fx: &Fixture) -> BorrowingEngine {
        BorrowingEngine::new(fx.store.clone(), fx.clock())
    }

    /// Copies on the shelf plus active loans always add up to the total.
    fn assert_copies_balance(fx: &Fixture, publication_id: &str) {
        let publication = fx.publication(publication_id);
        let on_loan = fx
            .store
            .query::<BorrowRecord>(|r| r.publication_id == publication_id && r.is_active())
            .unwrap()
            .len() as u32;
        assert_eq!(publication.available_copies + on_loan, publication.total_copies);
    }

    #[test]
    fn test_borrow_limit_reached() {
        let fx = Fixture::new();
        fx.add_reader("reader-1");
        fx.add_publication("pub-1", PublicationType::Book, 1);
        fx.store
            .update::<Reader>("reader-1", |r| r.borrowed_count = 7)
            .unwrap();
        let engine = engine(&fx);

        let err = engine.borrow("reader-1", "pub-1").unwrap_err();
        assert!(matches!(
            err,
            LibraryError::NotEligible(Ineligibility::BorrowLimitReached(7, 7))
        ));
        assert!(err.to_string().contains("Borrow limit reached"));
        assert_eq!(fx.publication("pub-1").available_copies, 1);
        assert!(engine.all().is_empty());
    }

    #[test]
    fn test_eligibility_rules() {
        let fx = Fixture::new();
        fx.add_reader("reader-1");
        let engine = engine(&fx);

        assert!(engine.check_eligibility("reader-1").is_ok());
        assert!(matches!(
            engine.check_eligibility("missing"),
            Err(LibraryError::NotEligible(Ineligibility::ReaderNotFound(_)))
        ));

        fx.store
            .update::<Reader>("reader-1", |r| r.credit_score = 59)
            .unwrap();
        assert!(matches!(
            engine.check_eligibility("reader-1"),
            Err(LibraryError::NotEligible(Ineligibility::CreditScoreTooLow(59)))
        ));

        fx.store
            .update::<Reader>("reader-1", |r| {
                r.credit_score = 60;
                r.total_fines = 50.0;
            })
            .unwrap();
        assert!(engine.check_eligibility("reader-1").is_ok());

        fx.store
            .update::<Reader>("reader-1", |r| r.total_fines = 50.5)
            .unwrap();
        assert!(matches!(
            engine.check_eligibility("reader-1"),
            Err(LibraryError::NotEligible(Ineligibility::UnpaidFinesOverLimit(_)))
        ));
    }

    #[test]
    fn test_borrow_updates_copies_and_reader() {
        let fx = Fixture::new();
        fx.add_reader("reader-1");
        fx.add_publication("pub-1", PublicationType::Magazine, 1);
        let engine = engine(&fx);

        let record = engine.borrow("reader-1", "pub-1").unwrap();
        assert_eq!(record.status, BorrowStatus::Borrowed);
        assert_eq!(record.due_date - record.borrow_date, days(7));
        assert_eq!(record.max_renewals, 2);

        let publication = fx.publication("pub-1");
        assert_eq!(publication.available_copies, 0);
        assert_eq!(publication.status, PublicationStatus::Borrowed);
        assert_eq!(fx.reader("reader-1").borrowed_count, 1);
        assert_copies_balance(&fx, "pub-1");

        fx.add_reader("reader-2");
        assert!(matches!(
            engine.borrow("reader-2", "pub-1"),
            Err(LibraryError::Unavailable(_))
        ));
        assert!(matches!(
            engine.borrow("reader-2", "pub-missing"),
            Err(LibraryError::NotFound(EntityKind::Publication, _))
        ));
    }

    #[test]
    fn test_withdrawn_publication_cannot_be_borrowed() {
        let fx = Fixture::new();
        fx.add_reader("reader-1");
        fx.add_publication("pub-1", PublicationType::Book, 3);
        fx.store
            .update::<Publication>("pub-1", |p| p.status = PublicationStatus::Unavailable)
            .unwrap();

        assert!(matches!(
            engine(&fx).borrow("reader-1", "pub-1"),
            Err(LibraryError::Unavailable(_))
        ));
    }

    #[test]
    fn test_late_return() {
        let fx = Fixture::new();
        fx.add_reader("reader-1");
        fx.add_publication("pub-1", PublicationType::Book, 1);
        let engine = engine(&fx);

        let record = engine.borrow("reader-1", "pub-1").unwrap();
        fx.clock.advance(days(35));
        let outcome = engine.return_publication(&record.record_id).unwrap();

        assert_eq!(outcome.overdue_days, 5);
        assert_eq!(outcome.record.status, BorrowStatus::Overdue);
        assert_eq!(outcome.record.return_date, Some(fx.now()));

        let reader = fx.reader("reader-1");
        assert_eq!(reader.credit_score, 90);
        assert_eq!(reader.borrowed_count, 0);
        assert_eq!(fx.publication("pub-1").available_copies, 1);
        assert_eq!(fx.publication("pub-1").status, PublicationStatus::Available);
        assert_copies_balance(&fx, "pub-1");
    }

    #[test]
    fn test_on_time_return_rewards_credit() {
        let fx = Fixture::new();
        fx.add_reader("reader-1");
        fx.add_publication("pub-1", PublicationType::Book, 2);
        fx.store
            .update::<Reader>("reader-1", |r| r.credit_score = 199)
            .unwrap();
        let engine = engine(&fx);

        let record = engine.borrow("reader-1", "pub-1").unwrap();
        // Less than a full day late still counts as on time
        fx.clock.advance(days(30) + chrono::Duration::hours(23));
        let outcome = engine.return_publication(&record.record_id).unwrap();

        assert_eq!(outcome.overdue_days, 0);
        assert_eq!(outcome.record.status, BorrowStatus::Returned);
        assert_eq!(fx.reader("reader-1").credit_score, 200);
    }

    #[test]
    fn test_return_twice_fails() {
        let fx = Fixture::new();
        fx.add_reader("reader-1");
        fx.add_publication("pub-1", PublicationType::Book, 1);
        let engine = engine(&fx);

        let record = engine.borrow("reader-1", "pub-1").unwrap();
        fx.clock.advance(days(40));
        engine.return_publication(&record.record_id).unwrap();

        // A late return carries status `overdue`, not `returned`
        assert!(matches!(
            engine.return_publication(&record.record_id),
            Err(LibraryError::AlreadyReturned(_))
        ));
        assert_eq!(fx.publication("pub-1").available_copies, 1);
        assert!(matches!(
            engine.return_publication("borrow-missing"),
            Err(LibraryError::NotFound(EntityKind::BorrowRecord, _))
        ));
    }

    #[test]
    fn test_return_with_full_shelf_rolls_back() {
        let fx = Fixture::new();
        fx.add_reader("reader-1");
        fx.add_publication("pub-1", PublicationType::Book, 1);
        fx.add_active_loan("borrow-1", "reader-1", "pub-1");
        let engine = engine(&fx);

        assert!(matches!(
            engine.return_publication("borrow-1"),
            Err(LibraryError::InvalidState(_))
        ));
        assert!(engine.get("borrow-1").unwrap().is_active());
        assert_eq!(fx.reader("reader-1").credit_score, 100);
    }

    #[test]
    fn test_return_of_deleted_publication() {
        let fx = Fixture::new();
        fx.add_reader("reader-1");
        fx.add_active_loan("borrow-1", "reader-1", "pub-gone");
        fx.store
            .update::<Reader>("reader-1", |r| r.borrowed_count = 1)
            .unwrap();

        let outcome = engine(&fx).return_publication("borrow-1").unwrap();
        assert_eq!(outcome.record.status, BorrowStatus::Returned);
        assert_eq!(fx.reader("reader-1").borrowed_count, 0);
    }

    #[test]
    fn test_renewal_limit() {
        let fx = Fixture::new();
        fx.add_reader("reader-1");
        fx.add_publication("pub-1", PublicationType::Ebook, 1);
        let engine = engine(&fx);

        let record = engine.borrow("reader-1", "pub-1").unwrap();
        let first = engine.renew(&record.record_id).unwrap();
        let second = engine.renew(&record.record_id).unwrap();
        assert_eq!(first, record.due_date + days(14));
        assert_eq!(second, record.due_date + days(28));

        assert!(matches!(
            engine.renew(&record.record_id),
            Err(LibraryError::RenewalLimitReached(2))
        ));
        let stored = engine.get(&record.record_id).unwrap();
        assert_eq!(stored.due_date, second);
        assert_eq!(stored.renewal_count, 2);
    }

    #[test]
    fn test_renew_returned_record_fails() {
        let fx = Fixture::new();
        fx.add_reader("reader-1");
        fx.add_publication("pub-1", PublicationType::Book, 1);
        let engine = engine(&fx);

        let record = engine.borrow("reader-1", "pub-1").unwrap();
        engine.return_publication(&record.record_id).unwrap();

        assert!(matches!(
            engine.renew(&record.record_id),
            Err(LibraryError::InvalidState(_))
        ));
        assert!(matches!(
            engine.renew("borrow-missing"),
            Err(LibraryError::NotFound(..))
        ));
    }

    #[test]
    fn test_overdue_and_upcoming_queries() {
        let fx = Fixture::new();
        fx.add_reader("reader-1");
        fx.add_publication("book", PublicationType::Book, 1);
        fx.add_publication("magazine", PublicationType::Magazine, 1);
        let engine = engine(&fx);

        engine.borrow("reader-1", "book").unwrap();
        engine.borrow("reader-1", "magazine").unwrap();

        fx.clock.advance(days(5));
        let upcoming = engine.upcoming_due();
        assert_eq!(upcoming.len(), 1);
        assert_eq!(upcoming[0].publication_id, "magazine");
        assert!(engine.overdue().is_empty());

        fx.clock.advance(days(3));
        let overdue = engine.overdue();
        assert_eq!(overdue.len(), 1);
        assert_eq!(overdue[0].publication_id, "magazine");
        assert_eq!(engine.by_reader("reader-1").len(), 2);
    }

    #[test]
    fn test_copies_balance_over_many_loans() {
        let fx = Fixture::new();
        fx.add_publication("pub-1", PublicationType::Book, 3);
        for i in 0..5 {
            fx.add_reader(&format!("reader-{}", i));
        }
        let engine = engine(&fx);

        let mut records = Vec::new();
        for i in 0..5 {
            match engine.borrow(&format!("reader-{}", i), "pub-1") {
                Ok(record) => records.push(record),
                Err(e) => assert!(matches!(e, LibraryError::Unavailable(_))),
            }
            assert_copies_balance(&fx, "pub-1");
        }
        assert_eq!(records.len(), 3);

        for record in &records {
            engine.return_publication(&record.record_id).unwrap();
            assert_copies_balance(&fx, "pub-1");
            let available = fx.publication("pub-1").available_copies;
            assert!(available <= 3);
        }
        assert_eq!(fx.publication("pub-1").available_copies, 3);
    }

    #[test]
    fn test_failed_commit_leaves_tables_untouched() {
        let fx = Fixture::new();
        fx.add_reader("reader-1");
        fx.add_publication("pub-1", PublicationType::Book, 1);
        let engine = engine(&fx);

        fx.persistence.fail_writes(true);
        assert!(matches!(
            engine.borrow("reader-1", "pub-1"),
            Err(LibraryError::Storage(_))
        ));
        fx.persistence.fail_writes(false);

        assert!(engine.all().is_empty());
        assert_eq!(fx.publication("pub-1").available_copies, 1);
        assert_eq!(fx.reader("reader-1").borrowed_count, 0);
    }
}
