use std::sync::Arc;

use serde::Serialize;

use crate::accounts::Accounts;
use crate::borrowing::{BorrowingEngine, ReturnOutcome};
use crate::categories::CategoryCatalog;
use crate::clock::{whole_days_between, Clock};
use crate::error::LibraryError;
use crate::fines::FineEngine;
use crate::identity::TokenCodec;
use crate::models::{BorrowRecord, Fine, NotificationKind, Reader, Reservation};
use crate::notifications::NotificationCenter;
use crate::publications::PublicationLedger;
use crate::readers::ReaderLedger;
use crate::reservations::ReservationQueue;
use crate::reviews::ReviewBoard;
use crate::store::{Persistence, RecordStore, UnitOfWork};

/// What one maintenance pass did.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MaintenanceReport {
    pub expired_reservations: usize,
    pub reservations_ready: usize,
    pub due_reminders: usize,
    pub overdue_notices: usize,
}

/// Every library component wired over one store and one clock.
pub struct Library {
    pub store: Arc<RecordStore>,
    pub clock: Arc<dyn Clock>,
    pub publications: PublicationLedger,
    pub readers: ReaderLedger,
    pub borrowing: BorrowingEngine,
    pub reservations: ReservationQueue,
    pub fines: FineEngine,
    pub reviews: ReviewBoard,
    pub notifications: NotificationCenter,
    pub categories: CategoryCatalog,
    pub accounts: Accounts,
}

impl Library {
    pub fn new(
        persistence: Arc<dyn Persistence>,
        clock: Arc<dyn Clock>,
        tokens: TokenCodec,
    ) -> Self {
        let store = Arc::new(RecordStore::new(persistence));
        Self {
            publications: PublicationLedger::new(store.clone()),
            readers: ReaderLedger::new(store.clone()),
            borrowing: BorrowingEngine::new(store.clone(), clock.clone()),
            reservations: ReservationQueue::new(store.clone(), clock.clone()),
            fines: FineEngine::new(store.clone(), clock.clone()),
            reviews: ReviewBoard::new(store.clone(), clock.clone()),
            notifications: NotificationCenter::new(store.clone(), clock.clone()),
            categories: CategoryCatalog::new(store.clone()),
            accounts: Accounts::new(store.clone(), clock.clone(), Arc::new(tokens)),
            store,
            clock,
        }
    }

    /// Create missing tables and seed the default categories.
    pub fn init(&self) -> Result<(), LibraryError> {
        self.store.init()?;
        self.categories.seed_defaults()?;
        Ok(())
    }

    /// Return a loan and, if it came back late, issue the matching fine.
    /// The return and the fine commit together or not at all.
    pub fn return_with_fine(
        &self,
        record_id: &str,
    ) -> Result<(ReturnOutcome, Option<Fine>), LibraryError> {
        let now = self.clock.now();
        let mut uow = self.store.begin();

        let outcome = BorrowingEngine::return_in(&mut uow, record_id, now)?;
        let reader_id = &outcome.record.reader_id;
        let fine = if outcome.overdue_days == 0 {
            None
        } else if uow.get::<Reader>(reader_id)?.is_none() {
            tracing::warn!("No fine for {}: reader {} is gone", record_id, reader_id);
            None
        } else {
            let reason = format!("Returned {} days late", outcome.overdue_days);
            Some(FineEngine::issue_in(
                &mut uow,
                reader_id,
                &outcome.record.record_id,
                outcome.overdue_days,
                &reason,
                now,
            )?)
        };
        uow.commit()?;

        outcome.log();
        if let Some(fine) = &fine {
            tracing::info!(
                "Fined reader {} {:.2} for record {}",
                fine.reader_id,
                fine.amount,
                fine.borrow_record_id
            );
        }
        Ok((outcome, fine))
    }

    /// Promote the head of a publication's queue and tell its reader.
    pub fn notify_next_reserver(
        &self,
        publication_id: &str,
    ) -> Result<Option<Reservation>, LibraryError> {
        let next = self.reservations.notify_next(publication_id)?;
        if let Some(reservation) = &next {
            self.announce_ready(reservation)?;
        }
        Ok(next)
    }

    fn announce_ready(&self, reservation: &Reservation) -> Result<(), LibraryError> {
        let Some(reader) = self.readers.get(&reservation.reader_id) else {
            tracing::warn!(
                "Reservation {} belongs to missing reader {}",
                reservation.reservation_id,
                reservation.reader_id
            );
            return Ok(());
        };
        let title = self.title_of(&reservation.publication_id);
        self.notifications
            .send_reservation_ready(&reader.user_id, &title)?;
        Ok(())
    }

    fn title_of(&self, publication_id: &str) -> String {
        self.publications
            .get(publication_id)
            .map(|p| p.title)
            .unwrap_or_else(|| publication_id.to_string())
    }

    fn already_sent(&self, user_id: &str, kind: NotificationKind, content: &str) -> bool {
        self.notifications
            .by_user(user_id)
            .iter()
            .any(|n| n.kind == kind && n.content == content)
    }

    /// Remind readers of loans falling due soon. Each loan is reminded about
    /// once per due date. Returns how many reminders went out.
    pub fn send_due_reminders(&self) -> Result<usize, LibraryError> {
        let mut sent = 0;
        for record in self.borrowing.upcoming_due() {
            let Some(user_id) = self.user_of(&record) else {
                continue;
            };
            let title = self.title_of(&record.publication_id);
            let content = NotificationCenter::due_reminder_text(&title, record.due_date);
            if self.already_sent(&user_id, NotificationKind::DueReminder, &content) {
                continue;
            }
            self.notifications
                .send_due_reminder(&user_id, &title, record.due_date)?;
            sent += 1;
        }
        Ok(sent)
    }

    /// Tell readers about overdue loans, at most once per loan per overdue
    /// day count. Returns how many notices went out.
    pub fn send_overdue_notices(&self) -> Result<usize, LibraryError> {
        let now = self.clock.now();
        let mut sent = 0;
        for record in self.borrowing.overdue() {
            let overdue_days = whole_days_between(record.due_date, now);
            if overdue_days < 1 {
                continue;
            }
            let Some(user_id) = self.user_of(&record) else {
                continue;
            };
            let overdue_days = u32::try_from(overdue_days).unwrap_or(u32::MAX);
            let title = self.title_of(&record.publication_id);
            let content = NotificationCenter::overdue_text(&title, overdue_days);
            if self.already_sent(&user_id, NotificationKind::Overdue, &content) {
                continue;
            }
            self.notifications
                .send_overdue_notice(&user_id, &title, overdue_days)?;
            sent += 1;
        }
        Ok(sent)
    }

    fn user_of(&self, record: &BorrowRecord) -> Option<String> {
        match self.readers.get(&record.reader_id) {
            Some(reader) => Some(reader.user_id),
            None => {
                tracing::warn!(
                    "Loan {} belongs to missing reader {}",
                    record.record_id,
                    record.reader_id
                );
                None
            }
        }
    }

    /// One pass of periodic housekeeping: expire reservations, announce the
    /// reservations that became ready, and send loan reminders.
    pub fn run_maintenance(&self) -> Result<MaintenanceReport, LibraryError> {
        let sweep = self.reservations.sweep()?;
        for reservation in &sweep.promoted {
            self.announce_ready(reservation)?;
        }

        let report = MaintenanceReport {
            expired_reservations: sweep.expired,
            reservations_ready: sweep.promoted.len(),
            due_reminders: self.send_due_reminders()?,
            overdue_notices: self.send_overdue_notices()?,
        };
        tracing::debug!("Maintenance pass finished: {:?}", report);
        Ok(report)
    }
}
