use std::sync::Arc;

use crate::clock::{days, Clock};
use crate::error::{EntityKind, LibraryError, StorageError};
use crate::identity::generate_id;
use crate::models::{tables, Publication, Reader, Reservation, ReservationStatus};
use crate::store::{or_empty, RecordStore, UnitOfWork};

/// Days a pending reservation stays valid.
pub const HOLD_DAYS: i64 = 7;

/// What one expiry sweep did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SweepReport {
    pub expired: usize,
    /// Reservations moved to `ready` after an expiry freed their turn.
    pub promoted: Vec<Reservation>,
}

fn by_queue_position(a: &Reservation, b: &Reservation) -> std::cmp::Ordering {
    a.priority
        .cmp(&b.priority)
        .then(a.reservation_date.cmp(&b.reservation_date))
}

/// Per-publication queues of pending reservations.
pub struct ReservationQueue {
    store: Arc<RecordStore>,
    clock: Arc<dyn Clock>,
}

impl ReservationQueue {
    pub fn new(store: Arc<RecordStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Join the back of the queue for a publication.
    pub fn reserve(
        &self,
        reader_id: &str,
        publication_id: &str,
    ) -> Result<Reservation, LibraryError> {
        let now = self.clock.now();
        let mut uow = self.store.begin();

        if uow.get::<Reader>(reader_id)?.is_none() {
            return Err(LibraryError::not_found(EntityKind::Reader, reader_id));
        }
        if uow.get::<Publication>(publication_id)?.is_none() {
            return Err(LibraryError::not_found(
                EntityKind::Publication,
                publication_id,
            ));
        }

        let pending =
            uow.query::<Reservation>(|r| r.publication_id == publication_id && r.is_pending())?;
        if pending.iter().any(|r| r.reader_id == reader_id) {
            return Err(LibraryError::AlreadyReserved(publication_id.to_string()));
        }

        let reservation = Reservation {
            reservation_id: generate_id("res"),
            reader_id: reader_id.to_string(),
            publication_id: publication_id.to_string(),
            reservation_date: now,
            expiry_date: now + days(HOLD_DAYS),
            status: ReservationStatus::Pending,
            priority: pending.len() as u32 + 1,
        };
        uow.insert(reservation.clone())?;
        uow.commit()?;

        tracing::info!(
            "Reader {} reserved {} at position {}",
            reader_id,
            publication_id,
            reservation.priority
        );
        Ok(reservation)
    }

    /// Remove a reservation and close the gap it leaves in its queue.
    pub fn cancel(&self, reservation_id: &str) -> Result<(), LibraryError> {
        let mut uow = self.store.begin();
        let reservation = uow
            .get::<Reservation>(reservation_id)?
            .ok_or_else(|| LibraryError::not_found(EntityKind::Reservation, reservation_id))?;

        uow.delete::<Reservation>(reservation_id)?;
        Self::renumber(&mut uow, &reservation.publication_id)?;
        uow.commit()?;

        tracing::debug!("Cancelled reservation {}", reservation_id);
        Ok(())
    }

    /// Renumber pending reservations `1..=N` by reservation date.
    fn renumber(uow: &mut UnitOfWork<'_>, publication_id: &str) -> Result<(), StorageError> {
        let mut pending =
            uow.query::<Reservation>(|r| r.publication_id == publication_id && r.is_pending())?;
        pending.sort_by_key(|r| r.reservation_date);
        for (position, mut reservation) in pending.into_iter().enumerate() {
            reservation.priority = position as u32 + 1;
            uow.put(reservation)?;
        }
        Ok(())
    }

    /// Mark the head of the queue `ready`. The rest keep their numbers.
    pub fn notify_next(&self, publication_id: &str) -> Result<Option<Reservation>, LibraryError> {
        let mut uow = self.store.begin();
        let next = Self::promote_next(&mut uow, publication_id)?;
        uow.commit()?;
        Ok(next)
    }

    fn promote_next(
        uow: &mut UnitOfWork<'_>,
        publication_id: &str,
    ) -> Result<Option<Reservation>, StorageError> {
        let mut pending =
            uow.query::<Reservation>(|r| r.publication_id == publication_id && r.is_pending())?;
        pending.sort_by(by_queue_position);
        let Some(mut next) = pending.into_iter().next() else {
            return Ok(None);
        };

        next.status = ReservationStatus::Ready;
        uow.put(next.clone())?;
        tracing::debug!(
            "Reservation {} is ready for reader {}",
            next.reservation_id,
            next.reader_id
        );
        Ok(Some(next))
    }

    /// Expire overdue pending reservations and promote one successor per
    /// expiry. Returns the number expired.
    pub fn sweep_expired(&self) -> Result<usize, LibraryError> {
        Ok(self.sweep()?.expired)
    }

    pub fn sweep(&self) -> Result<SweepReport, LibraryError> {
        let now = self.clock.now();
        let mut uow = self.store.begin();

        let expired = uow.query::<Reservation>(|r| r.is_pending() && r.expiry_date < now)?;
        if expired.is_empty() {
            return Ok(SweepReport::default());
        }
        uow.update_where::<Reservation>(
            |r| r.is_pending() && r.expiry_date < now,
            |r| r.status = ReservationStatus::Expired,
        )?;

        let mut promoted = Vec::new();
        for reservation in &expired {
            if let Some(next) = Self::promote_next(&mut uow, &reservation.publication_id)? {
                promoted.push(next);
            }
        }
        uow.commit()?;

        tracing::info!(
            "Expired {} reservations, {} now ready",
            expired.len(),
            promoted.len()
        );
        Ok(SweepReport {
            expired: expired.len(),
            promoted,
        })
    }

    pub fn get(&self, reservation_id: &str) -> Option<Reservation> {
        or_empty(self.store.get(reservation_id), tables::RESERVATIONS)
    }

    pub fn all(&self) -> Vec<Reservation> {
        or_empty(self.store.all(), tables::RESERVATIONS)
    }

    pub fn by_reader(&self, reader_id: &str) -> Vec<Reservation> {
        or_empty(
            self.store.query::<Reservation>(|r| r.reader_id == reader_id),
            tables::RESERVATIONS,
        )
    }

    /// Pending reservations for a publication, head first.
    pub fn queue(&self, publication_id: &str) -> Vec<Reservation> {
        let mut pending = or_empty(
            self.store
                .query::<Reservation>(|r| r.publication_id == publication_id && r.is_pending()),
            tables::RESERVATIONS,
        );
        pending.sort_by(by_queue_position);
        pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PublicationType;
    use crate::testing::Fixture;

    fn setup(readers: usize) -> (Fixture, ReservationQueue) {
        let fx = Fixture::new();
        fx.add_publication("pub-1", PublicationType::Book, 1);
        fx.add_publication("pub-2", PublicationType::Book, 1);
        for i in 1..=readers {
            fx.add_reader(&format!("reader-{}", i));
        }
        let queue = ReservationQueue::new(fx.store.clone(), fx.clock());
        (fx, queue)
    }

    fn priorities(queue: &ReservationQueue, publication_id: &str) -> Vec<(String, u32)> {
        queue
            .queue(publication_id)
            .into_iter()
            .map(|r| (r.reader_id, r.priority))
            .collect()
    }

    #[test]
    fn test_priorities_close_gap_after_cancel() {
        let (fx, queue) = setup(3);

        let mut ids = Vec::new();
        for i in 1..=3 {
            let reservation = queue.reserve(&format!("reader-{}", i), "pub-1").unwrap();
            assert_eq!(reservation.priority, i);
            assert_eq!(reservation.expiry_date, fx.now() + days(7));
            ids.push(reservation.reservation_id);
            fx.clock.advance(chrono::Duration::minutes(1));
        }

        queue.cancel(&ids[0]).unwrap();
        assert_eq!(
            priorities(&queue, "pub-1"),
            vec![("reader-2".to_string(), 1), ("reader-3".to_string(), 2)]
        );
        assert!(queue.get(&ids[0]).is_none());
    }

    #[test]
    fn test_priorities_stay_contiguous() {
        let (fx, queue) = setup(5);

        let mut ids = Vec::new();
        for i in 1..=5 {
            ids.push(
                queue
                    .reserve(&format!("reader-{}", i), "pub-1")
                    .unwrap()
                    .reservation_id,
            );
            fx.clock.advance(chrono::Duration::seconds(1));
        }
        for id in [&ids[3], &ids[1]] {
            queue.cancel(id).unwrap();
            let numbers: Vec<u32> = queue.queue("pub-1").iter().map(|r| r.priority).collect();
            let expected: Vec<u32> = (1..=numbers.len() as u32).collect();
            assert_eq!(numbers, expected);
        }
        let reservation = queue.reserve("reader-2", "pub-1").unwrap();
        assert_eq!(reservation.priority, 4);
    }

    #[test]
    fn test_duplicate_reservation_rejected() {
        let (_fx, queue) = setup(1);

        queue.reserve("reader-1", "pub-1").unwrap();
        assert!(matches!(
            queue.reserve("reader-1", "pub-1"),
            Err(LibraryError::AlreadyReserved(_))
        ));
        // Other publications have their own queue
        assert_eq!(queue.reserve("reader-1", "pub-2").unwrap().priority, 1);
    }

    #[test]
    fn test_reserve_requires_reader_and_publication() {
        let (_fx, queue) = setup(1);

        assert!(matches!(
            queue.reserve("reader-9", "pub-1"),
            Err(LibraryError::NotFound(EntityKind::Reader, _))
        ));
        assert!(matches!(
            queue.reserve("reader-1", "pub-9"),
            Err(LibraryError::NotFound(EntityKind::Publication, _))
        ));
        assert!(matches!(
            queue.cancel("res-missing"),
            Err(LibraryError::NotFound(EntityKind::Reservation, _))
        ));
    }

    #[test]
    fn test_notify_next_marks_head_ready() {
        let (fx, queue) = setup(2);
        queue.reserve("reader-1", "pub-1").unwrap();
        fx.clock.advance(chrono::Duration::seconds(1));
        queue.reserve("reader-2", "pub-1").unwrap();

        let ready = queue.notify_next("pub-1").unwrap().unwrap();
        assert_eq!(ready.reader_id, "reader-1");
        assert_eq!(ready.status, ReservationStatus::Ready);

        // No renumbering on promotion
        let remaining = queue.queue("pub-1");
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].priority, 2);

        assert!(queue.notify_next("pub-2").unwrap().is_none());
    }

    #[test]
    fn test_sweep_expires_and_promotes() {
        let (fx, queue) = setup(3);
        queue.reserve("reader-1", "pub-1").unwrap();
        fx.clock.advance(days(3));
        queue.reserve("reader-2", "pub-1").unwrap();
        queue.reserve("reader-3", "pub-2").unwrap();

        fx.clock.advance(days(5));
        let report = queue.sweep().unwrap();
        assert_eq!(report.expired, 1);
        assert_eq!(report.promoted.len(), 1);
        assert_eq!(report.promoted[0].reader_id, "reader-2");

        let statuses: Vec<ReservationStatus> =
            queue.by_reader("reader-1").iter().map(|r| r.status).collect();
        assert_eq!(statuses, vec![ReservationStatus::Expired]);
        assert!(queue.queue("pub-1").is_empty());
        assert_eq!(queue.queue("pub-2").len(), 1);
    }

    #[test]
    fn test_sweep_is_idempotent() {
        let (fx, queue) = setup(2);
        queue.reserve("reader-1", "pub-1").unwrap();
        queue.reserve("reader-2", "pub-2").unwrap();

        fx.clock.advance(days(8));
        assert_eq!(queue.sweep_expired().unwrap(), 2);
        assert_eq!(queue.sweep_expired().unwrap(), 0);
        assert_eq!(queue.all().len(), 2);
    }

    #[test]
    fn test_sweep_without_expiry_writes_nothing() {
        let (fx, queue) = setup(1);
        queue.reserve("reader-1", "pub-1").unwrap();

        fx.persistence.fail_writes(true);
        assert_eq!(queue.sweep_expired().unwrap(), 0);
        fx.persistence.fail_writes(false);
    }
}
