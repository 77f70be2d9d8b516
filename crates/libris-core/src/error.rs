use thiserror::Error;

use crate::models::FineStatus;

/// Everything a library operation can fail with.
///
/// Apart from `Storage`, every variant is an expected business outcome that
/// callers report back inline rather than treat as a fault.
#[derive(Error, Debug)]
pub enum LibraryError {
    #[error("{0} not found: {1}")]
    NotFound(EntityKind, String),

    #[error("{0}")]
    NotEligible(Ineligibility),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Renewal limit reached: already renewed {0} times")]
    RenewalLimitReached(u32),

    #[error("No copies available for publication {0}")]
    Unavailable(String),

    #[error("Borrow record {0} has already been returned")]
    AlreadyReturned(String),

    #[error("Reader already holds a pending reservation for publication {0}")]
    AlreadyReserved(String),

    #[error("Fine {0} is already {1}")]
    AlreadyResolved(String, FineStatus),

    #[error("Reader has already reviewed publication {0}")]
    AlreadyReviewed(String),

    #[error("{0} is already in use")]
    Duplicate(&'static str),

    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Identity error: {0}")]
    Identity(#[from] IdentityError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Coarse grouping of [`LibraryError`] variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    InvalidState,
    LimitExceeded,
    AlreadyDone,
    Unavailable,
    Validation,
    Unauthorized,
    Internal,
}

impl LibraryError {
    pub fn not_found(kind: EntityKind, id: impl Into<String>) -> Self {
        LibraryError::NotFound(kind, id.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            LibraryError::NotFound(..) => ErrorKind::NotFound,
            LibraryError::InvalidState(_) => ErrorKind::InvalidState,
            LibraryError::NotEligible(_) | LibraryError::RenewalLimitReached(_) => {
                ErrorKind::LimitExceeded
            }
            LibraryError::AlreadyReturned(_)
            | LibraryError::AlreadyReserved(_)
            | LibraryError::AlreadyResolved(..)
            | LibraryError::AlreadyReviewed(_)
            | LibraryError::Duplicate(_) => ErrorKind::AlreadyDone,
            LibraryError::Unavailable(_) => ErrorKind::Unavailable,
            LibraryError::Validation(_) => ErrorKind::Validation,
            LibraryError::InvalidCredentials => ErrorKind::Unauthorized,
            LibraryError::Identity(_) | LibraryError::Storage(_) => ErrorKind::Internal,
        }
    }
}

/// The kind of record an id failed to resolve to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    User,
    Reader,
    Admin,
    Publication,
    BorrowRecord,
    Reservation,
    Fine,
    Review,
    Notification,
    Category,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            EntityKind::User => "User",
            EntityKind::Reader => "Reader",
            EntityKind::Admin => "Admin",
            EntityKind::Publication => "Publication",
            EntityKind::BorrowRecord => "Borrow record",
            EntityKind::Reservation => "Reservation",
            EntityKind::Fine => "Fine",
            EntityKind::Review => "Review",
            EntityKind::Notification => "Notification",
            EntityKind::Category => "Category",
        };
        f.write_str(name)
    }
}

/// Why a reader may not borrow right now.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Ineligibility {
    #[error("Reader not found: {0}")]
    ReaderNotFound(String),

    #[error("Borrow limit reached ({0} of {1})")]
    BorrowLimitReached(u32, u32),

    #[error("Credit score too low: {0} (minimum 60)")]
    CreditScoreTooLow(i32),

    #[error("Unpaid fines exceed the limit: {0:.2} (maximum 50.00)")]
    UnpaidFinesOverLimit(f64),
}

#[derive(Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("{0} is required")]
    Required(&'static str),

    #[error("{0} too long: {1} characters (max {2})")]
    TooLong(&'static str, usize, usize),

    #[error("Invalid email address: {0}")]
    InvalidEmail(String),

    #[error("Password too short (min {0} characters)")]
    PasswordTooShort(usize),

    #[error("Rating must be between 1 and 5, got {0}")]
    RatingOutOfRange(u8),

    #[error("Total copies must be at least 1")]
    NoCopies,
}

#[derive(Error, Debug)]
pub enum IdentityError {
    #[error("Password hashing task failed: {0}")]
    HashTask(String),

    #[error("Token encoding failed: {0}")]
    TokenEncoding(String),
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Serialization error in table {0}: {1}")]
    Serialization(&'static str, String),

    #[error("Database error: {0}")]
    Database(String),
}
