//! Libris Core - Library domain: records, ledgers and circulation rules.
//!
//! Storage is abstracted behind [`Persistence`]; every rule that depends on
//! the current time reads it from a [`Clock`].

pub mod accounts;
pub mod borrowing;
pub mod categories;
pub mod clock;
pub mod error;
pub mod fines;
pub mod identity;
pub mod library;
pub mod models;
pub mod notifications;
pub mod publications;
pub mod readers;
pub mod reservations;
pub mod reviews;
pub mod store;
pub mod validation;

#[cfg(test)]
mod testing;

// Re-exports for convenience
pub use accounts::{AdminRegistration, ProfileUpdate, Registration, Session, UserProfile};
pub use borrowing::ReturnOutcome;
pub use categories::{CategoryNode, CategoryUpdate, NewCategory};
pub use clock::{Clock, SystemClock};
pub use error::{
    EntityKind, ErrorKind, IdentityError, Ineligibility, LibraryError, StorageError,
    ValidationError,
};
pub use fines::FineStatistics;
pub use identity::{Claims, TokenCodec};
pub use library::{Library, MaintenanceReport};
pub use models::{
    Admin, BorrowRecord, BorrowStatus, Category, Fine, FineStatus, Notification,
    NotificationKind, Publication, PublicationStatus, PublicationType, Reader, Reservation,
    ReservationStatus, Review, Role, User,
};
pub use publications::{NewPublication, PublicationQuery, PublicationUpdate};
pub use readers::{ReaderDetails, ReaderProfileUpdate};
pub use store::{Persistence, Record, RecordStore, WriteOp};
pub use validation::Validator;

#[cfg(any(test, feature = "test-utils"))]
pub use clock::ManualClock;
#[cfg(any(test, feature = "test-utils"))]
pub use store::memory::MemoryPersistence;
