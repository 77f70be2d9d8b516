use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::clock::Clock;
use crate::error::{EntityKind, LibraryError};
use crate::identity::generate_id;
use crate::models::{tables, Fine, FineStatus, Reader};
use crate::readers::ReaderLedger;
use crate::store::{or_empty, RecordStore, UnitOfWork};

/// Fine charged per overdue day.
pub const DAILY_FINE_RATE: f64 = 0.5;

pub fn calculate_amount(overdue_days: u32) -> f64 {
    overdue_days as f64 * DAILY_FINE_RATE
}

/// Counts and sums over every fine on record.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FineStatistics {
    pub total_fines: usize,
    pub unpaid_fines: usize,
    pub paid_fines: usize,
    pub waived_fines: usize,
    pub total_amount: f64,
    pub unpaid_amount: f64,
}

pub struct FineEngine {
    store: Arc<RecordStore>,
    clock: Arc<dyn Clock>,
}

impl FineEngine {
    pub fn new(store: Arc<RecordStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Issue an unpaid fine and add it to the reader's balance.
    pub fn create_fine(
        &self,
        reader_id: &str,
        borrow_record_id: &str,
        overdue_days: u32,
        reason: &str,
    ) -> Result<Fine, LibraryError> {
        let mut uow = self.store.begin();
        let fine = Self::issue_in(
            &mut uow,
            reader_id,
            borrow_record_id,
            overdue_days,
            reason,
            self.clock.now(),
        )?;
        uow.commit()?;

        tracing::info!(
            "Fined reader {} {:.2} for record {}",
            reader_id,
            fine.amount,
            borrow_record_id
        );
        Ok(fine)
    }

    /// Stage a new fine and the reader's balance change in `uow`.
    pub fn issue_in(
        uow: &mut UnitOfWork<'_>,
        reader_id: &str,
        borrow_record_id: &str,
        overdue_days: u32,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<Fine, LibraryError> {
        if uow.get::<Reader>(reader_id)?.is_none() {
            return Err(LibraryError::not_found(EntityKind::Reader, reader_id));
        }
        let fine = Fine {
            fine_id: generate_id("fine"),
            reader_id: reader_id.to_string(),
            borrow_record_id: borrow_record_id.to_string(),
            amount: calculate_amount(overdue_days),
            reason: reason.to_string(),
            issue_date: now,
            payment_date: None,
            status: FineStatus::Unpaid,
        };
        uow.insert(fine.clone())?;
        ReaderLedger::adjust_total_fines(uow, reader_id, fine.amount)?;
        Ok(fine)
    }

    pub fn pay_fine(&self, fine_id: &str) -> Result<Fine, LibraryError> {
        self.resolve(fine_id, FineStatus::Paid)
    }

    pub fn waive_fine(&self, fine_id: &str) -> Result<Fine, LibraryError> {
        self.resolve(fine_id, FineStatus::Waived)
    }

    fn resolve(&self, fine_id: &str, outcome: FineStatus) -> Result<Fine, LibraryError> {
        let now = self.clock.now();
        let mut uow = self.store.begin();

        let mut fine = uow
            .get::<Fine>(fine_id)?
            .ok_or_else(|| LibraryError::not_found(EntityKind::Fine, fine_id))?;
        if fine.status != FineStatus::Unpaid {
            return Err(LibraryError::AlreadyResolved(fine_id.to_string(), fine.status));
        }

        fine.status = outcome;
        fine.payment_date = Some(now);
        uow.put(fine.clone())?;
        if ReaderLedger::adjust_total_fines(&mut uow, &fine.reader_id, -fine.amount)?.is_none() {
            tracing::warn!("Fine {} belongs to missing reader {}", fine_id, fine.reader_id);
        }
        uow.commit()?;

        tracing::info!("Fine {} {}", fine_id, outcome);
        Ok(fine)
    }

    pub fn get(&self, fine_id: &str) -> Option<Fine> {
        or_empty(self.store.get(fine_id), tables::FINES)
    }

    pub fn all(&self) -> Vec<Fine> {
        or_empty(self.store.all(), tables::FINES)
    }

    pub fn by_reader(&self, reader_id: &str) -> Vec<Fine> {
        or_empty(
            self.store.query::<Fine>(|f| f.reader_id == reader_id),
            tables::FINES,
        )
    }

    pub fn unpaid_for_reader(&self, reader_id: &str) -> Vec<Fine> {
        or_empty(
            self.store
                .query::<Fine>(|f| f.reader_id == reader_id && f.status == FineStatus::Unpaid),
            tables::FINES,
        )
    }

    pub fn statistics(&self) -> FineStatistics {
        self.all()
            .iter()
            .fold(FineStatistics::default(), |mut stats, fine| {
                stats.total_fines += 1;
                stats.total_amount += fine.amount;
                match fine.status {
                    FineStatus::Unpaid => {
                        stats.unpaid_fines += 1;
                        stats.unpaid_amount += fine.amount;
                    }
                    FineStatus::Paid => stats.paid_fines += 1,
                    FineStatus::Waived => stats.waived_fines += 1,
                }
                stats
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Fixture;

    fn setup() -> (Fixture, FineEngine) {
        let fx = Fixture::new();
        fx.add_reader("reader-1");
        let engine = FineEngine::new(fx.store.clone(), fx.clock());
        (fx, engine)
    }

    fn assert_balance_matches(fx: &Fixture, engine: &FineEngine, reader_id: &str) {
        let unpaid: f64 = engine
            .unpaid_for_reader(reader_id)
            .iter()
            .map(|f| f.amount)
            .sum();
        assert_eq!(fx.reader(reader_id).total_fines, unpaid);
    }

    #[test]
    fn test_calculate_amount() {
        assert_eq!(calculate_amount(0), 0.0);
        assert_eq!(calculate_amount(5), 2.5);
        assert_eq!(calculate_amount(101), 50.5);
    }

    #[test]
    fn test_create_fine_adds_to_balance() {
        let (fx, engine) = setup();

        let fine = engine
            .create_fine("reader-1", "borrow-1", 5, "Returned 5 days late")
            .unwrap();
        assert_eq!(fine.amount, 2.5);
        assert_eq!(fine.status, FineStatus::Unpaid);
        assert!(fine.payment_date.is_none());
        assert_eq!(fx.reader("reader-1").total_fines, 2.5);

        assert!(matches!(
            engine.create_fine("missing", "borrow-1", 1, "late"),
            Err(LibraryError::NotFound(EntityKind::Reader, _))
        ));
    }

    #[test]
    fn test_pay_twice_fails() {
        let (fx, engine) = setup();
        let fine = engine.create_fine("reader-1", "borrow-1", 4, "late").unwrap();

        let paid = engine.pay_fine(&fine.fine_id).unwrap();
        assert_eq!(paid.status, FineStatus::Paid);
        assert_eq!(paid.payment_date, Some(fx.now()));
        assert_eq!(fx.reader("reader-1").total_fines, 0.0);

        let err = engine.pay_fine(&fine.fine_id).unwrap_err();
        assert!(matches!(
            err,
            LibraryError::AlreadyResolved(_, FineStatus::Paid)
        ));
        assert_eq!(fx.reader("reader-1").total_fines, 0.0);
        assert!(matches!(
            engine.waive_fine(&fine.fine_id),
            Err(LibraryError::AlreadyResolved(_, FineStatus::Paid))
        ));
    }

    #[test]
    fn test_waive_then_pay_fails() {
        let (fx, engine) = setup();
        let fine = engine.create_fine("reader-1", "borrow-1", 2, "late").unwrap();

        engine.waive_fine(&fine.fine_id).unwrap();
        assert!(matches!(
            engine.pay_fine(&fine.fine_id),
            Err(LibraryError::AlreadyResolved(_, FineStatus::Waived))
        ));
        assert_eq!(fx.reader("reader-1").total_fines, 0.0);
        assert!(matches!(
            engine.pay_fine("fine-missing"),
            Err(LibraryError::NotFound(EntityKind::Fine, _))
        ));
    }

    #[test]
    fn test_balance_tracks_unpaid_fines() {
        let (fx, engine) = setup();

        let a = engine.create_fine("reader-1", "borrow-1", 3, "late").unwrap();
        let b = engine.create_fine("reader-1", "borrow-2", 7, "late").unwrap();
        let c = engine.create_fine("reader-1", "borrow-3", 10, "late").unwrap();
        assert_balance_matches(&fx, &engine, "reader-1");

        engine.pay_fine(&b.fine_id).unwrap();
        assert_balance_matches(&fx, &engine, "reader-1");
        engine.waive_fine(&a.fine_id).unwrap();
        assert_balance_matches(&fx, &engine, "reader-1");
        let _ = engine.pay_fine(&a.fine_id);
        assert_balance_matches(&fx, &engine, "reader-1");

        assert_eq!(fx.reader("reader-1").total_fines, 5.0);
        assert_eq!(engine.unpaid_for_reader("reader-1")[0].fine_id, c.fine_id);
        assert_eq!(engine.by_reader("reader-1").len(), 3);
    }

    #[test]
    fn test_statistics() {
        let (_fx, engine) = setup();
        let a = engine.create_fine("reader-1", "borrow-1", 2, "late").unwrap();
        let b = engine.create_fine("reader-1", "borrow-2", 4, "late").unwrap();
        engine.create_fine("reader-1", "borrow-3", 6, "late").unwrap();
        engine.pay_fine(&a.fine_id).unwrap();
        engine.waive_fine(&b.fine_id).unwrap();

        let stats = engine.statistics();
        assert_eq!(
            stats,
            FineStatistics {
                total_fines: 3,
                unpaid_fines: 1,
                paid_fines: 1,
                waived_fines: 1,
                total_amount: 6.0,
                unpaid_amount: 3.0,
            }
        );
    }

    #[test]
    fn test_failed_payment_keeps_balance() {
        let (fx, engine) = setup();
        let fine = engine.create_fine("reader-1", "borrow-1", 2, "late").unwrap();

        fx.persistence.fail_writes(true);
        assert!(matches!(
            engine.pay_fine(&fine.fine_id),
            Err(LibraryError::Storage(_))
        ));
        fx.persistence.fail_writes(false);

        assert_eq!(engine.get(&fine.fine_id).unwrap().status, FineStatus::Unpaid);
        assert_eq!(fx.reader("reader-1").total_fines, 1.0);
    }
}
