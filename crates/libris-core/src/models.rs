use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::Record;

/// Table names as they appear in the persistence collaborator.
pub mod tables {
    pub const USERS: &str = "users";
    pub const READERS: &str = "readers";
    pub const ADMINS: &str = "admins";
    pub const PUBLICATIONS: &str = "publications";
    pub const BORROW_RECORDS: &str = "borrowRecords";
    pub const RESERVATIONS: &str = "reservations";
    pub const FINES: &str = "fines";
    pub const NOTIFICATIONS: &str = "notifications";
    pub const REVIEWS: &str = "reviews";
    pub const CATEGORIES: &str = "categories";

    pub const ALL: [&str; 10] = [
        USERS,
        READERS,
        ADMINS,
        PUBLICATIONS,
        BORROW_RECORDS,
        RESERVATIONS,
        FINES,
        NOTIFICATIONS,
        REVIEWS,
        CATEGORIES,
    ];
}

/// Default loan limit for newly registered readers.
pub const DEFAULT_BORROW_LIMIT: u32 = 7;
/// Starting credit score for newly registered readers.
pub const DEFAULT_CREDIT_SCORE: i32 = 100;
pub const MAX_CREDIT_SCORE: i32 = 200;
pub const MAX_RENEWALS: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Reader,
    Admin,
    Superadmin,
}

impl Role {
    /// Whether this role grants at least the privileges of `required`.
    pub fn satisfies(self, required: Role) -> bool {
        match required {
            Role::Reader => true,
            Role::Admin => matches!(self, Role::Admin | Role::Superadmin),
            Role::Superadmin => self == Role::Superadmin,
        }
    }
}

/// A login identity. Readers and admins both hang off a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub user_id: String,
    pub username: String,
    /// Salted digest in `sha256$<salt>$<hex>` form.
    pub password: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub registration_date: DateTime<Utc>,
    pub last_login_time: DateTime<Utc>,
    pub role: Role,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reader {
    pub reader_id: String,
    pub user_id: String,
    pub borrow_limit: u32,
    pub borrowed_count: u32,
    pub membership_level: String,
    pub credit_score: i32,
    pub total_fines: f64,
}

impl Reader {
    pub fn new(reader_id: String, user_id: String) -> Self {
        Self {
            reader_id,
            user_id,
            borrow_limit: DEFAULT_BORROW_LIMIT,
            borrowed_count: 0,
            membership_level: "basic".to_string(),
            credit_score: DEFAULT_CREDIT_SCORE,
            total_fines: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Admin {
    pub admin_id: String,
    pub user_id: String,
    pub admin_role: String,
    pub department: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PublicationType {
    Book,
    Magazine,
    Ebook,
}

impl PublicationType {
    /// Loan duration in days for this kind of publication.
    pub fn default_borrow_period(self) -> u32 {
        match self {
            PublicationType::Book => 30,
            PublicationType::Magazine => 7,
            PublicationType::Ebook => 14,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PublicationStatus {
    Available,
    Borrowed,
    Reserved,
    /// Withdrawn from circulation. Sticky: copy movements do not clear it.
    Unavailable,
}

impl PublicationStatus {
    pub fn for_available_copies(available: u32) -> Self {
        if available > 0 {
            PublicationStatus::Available
        } else {
            PublicationStatus::Borrowed
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Publication {
    pub publication_id: String,
    pub title: String,
    pub author: String,
    pub publisher: String,
    pub publish_date: String,
    pub status: PublicationStatus,
    pub borrow_period: u32,
    pub location: String,
    pub total_copies: u32,
    pub available_copies: u32,
    pub average_rating: f64,
    pub total_ratings: u32,
    #[serde(default)]
    pub category_id: Option<String>,
    #[serde(rename = "type")]
    pub publication_type: PublicationType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub isbn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issn: Option<String>,
}

impl Publication {
    pub fn is_withdrawn(&self) -> bool {
        self.status == PublicationStatus::Unavailable
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BorrowStatus {
    Borrowed,
    Returned,
    /// Returned after the due date.
    Overdue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BorrowRecord {
    pub record_id: String,
    pub reader_id: String,
    pub publication_id: String,
    pub borrow_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub return_date: Option<DateTime<Utc>>,
    pub status: BorrowStatus,
    pub renewal_count: u32,
    pub max_renewals: u32,
}

impl BorrowRecord {
    pub fn is_active(&self) -> bool {
        self.status == BorrowStatus::Borrowed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReservationStatus {
    Pending,
    Ready,
    Cancelled,
    Expired,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reservation {
    pub reservation_id: String,
    pub reader_id: String,
    pub publication_id: String,
    pub reservation_date: DateTime<Utc>,
    pub expiry_date: DateTime<Utc>,
    pub status: ReservationStatus,
    pub priority: u32,
}

impl Reservation {
    pub fn is_pending(&self) -> bool {
        self.status == ReservationStatus::Pending
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FineStatus {
    Unpaid,
    Paid,
    Waived,
}

impl std::fmt::Display for FineStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FineStatus::Unpaid => f.write_str("unpaid"),
            FineStatus::Paid => f.write_str("paid"),
            FineStatus::Waived => f.write_str("waived"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fine {
    pub fine_id: String,
    pub reader_id: String,
    pub borrow_record_id: String,
    pub amount: f64,
    pub reason: String,
    pub issue_date: DateTime<Utc>,
    pub payment_date: Option<DateTime<Utc>>,
    pub status: FineStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    pub review_id: String,
    pub reader_id: String,
    pub publication_id: String,
    pub rating: u8,
    pub comment: String,
    pub review_date: DateTime<Utc>,
    pub likes: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    DueReminder,
    Overdue,
    ReservationReady,
    General,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub notification_id: String,
    pub user_id: String,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub title: String,
    pub content: String,
    pub send_date: DateTime<Utc>,
    pub is_read: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub category_id: String,
    pub category_name: String,
    pub parent_category_id: Option<String>,
    pub description: String,
}

impl Record for User {
    const TABLE: &'static str = tables::USERS;
    fn key(&self) -> &str {
        &self.user_id
    }
}

impl Record for Reader {
    const TABLE: &'static str = tables::READERS;
    fn key(&self) -> &str {
        &self.reader_id
    }
}

impl Record for Admin {
    const TABLE: &'static str = tables::ADMINS;
    fn key(&self) -> &str {
        &self.admin_id
    }
}

impl Record for Publication {
    const TABLE: &'static str = tables::PUBLICATIONS;
    fn key(&self) -> &str {
        &self.publication_id
    }
}

impl Record for BorrowRecord {
    const TABLE: &'static str = tables::BORROW_RECORDS;
    fn key(&self) -> &str {
        &self.record_id
    }
}

impl Record for Reservation {
    const TABLE: &'static str = tables::RESERVATIONS;
    fn key(&self) -> &str {
        &self.reservation_id
    }
}

impl Record for Fine {
    const TABLE: &'static str = tables::FINES;
    fn key(&self) -> &str {
        &self.fine_id
    }
}

impl Record for Review {
    const TABLE: &'static str = tables::REVIEWS;
    fn key(&self) -> &str {
        &self.review_id
    }
}

impl Record for Notification {
    const TABLE: &'static str = tables::NOTIFICATIONS;
    fn key(&self) -> &str {
        &self.notification_id
    }
}

impl Record for Category {
    const TABLE: &'static str = tables::CATEGORIES;
    fn key(&self) -> &str {
        &self.category_id
    }
}
