//! Shared fixtures for unit tests.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::clock::{days, Clock, ManualClock};
use crate::models::{
    BorrowRecord, BorrowStatus, Category, Publication, PublicationStatus, PublicationType,
    Reader, Role, User, MAX_RENEWALS,
};
use crate::store::memory::MemoryPersistence;
use crate::store::RecordStore;

pub struct Fixture {
    pub persistence: Arc<MemoryPersistence>,
    pub store: Arc<RecordStore>,
    pub clock: Arc<ManualClock>,
}

impl Fixture {
    pub fn new() -> Self {
        let persistence = Arc::new(MemoryPersistence::new());
        let store = Arc::new(RecordStore::new(persistence.clone()));
        store.init().unwrap();
        Self {
            persistence,
            store,
            clock: Arc::new(ManualClock::at_epoch()),
        }
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn add_user(&self, user_id: &str, role: Role) -> User {
        let user = User {
            user_id: user_id.to_string(),
            username: user_id.to_string(),
            password: String::new(),
            name: format!("Name of {}", user_id),
            email: format!("{}@library.org", user_id),
            phone: String::new(),
            registration_date: self.now(),
            last_login_time: self.now(),
            role,
        };
        self.store.insert(user.clone()).unwrap();
        user
    }

    /// Reader `reader_id` backed by user `user-<reader_id>`.
    pub fn add_reader(&self, reader_id: &str) -> Reader {
        let user = self.add_user(&format!("user-{}", reader_id), Role::Reader);
        let reader = Reader::new(reader_id.to_string(), user.user_id);
        self.store.insert(reader.clone()).unwrap();
        reader
    }

    pub fn add_publication(&self, id: &str, kind: PublicationType, copies: u32) -> Publication {
        let publication = Publication {
            publication_id: id.to_string(),
            title: format!("Title {}", id),
            author: "Author".to_string(),
            publisher: String::new(),
            publish_date: String::new(),
            status: PublicationStatus::Available,
            borrow_period: kind.default_borrow_period(),
            location: String::new(),
            total_copies: copies,
            available_copies: copies,
            average_rating: 0.0,
            total_ratings: 0,
            category_id: None,
            publication_type: kind,
            isbn: None,
            issn: None,
        };
        self.store.insert(publication.clone()).unwrap();
        publication
    }

    pub fn add_category(&self, id: &str, parent: Option<&str>) -> Category {
        let category = Category {
            category_id: id.to_string(),
            category_name: format!("Category {}", id),
            parent_category_id: parent.map(str::to_string),
            description: String::new(),
        };
        self.store.insert(category.clone()).unwrap();
        category
    }

    /// A loan record on its own, without touching copies or counters.
    pub fn add_active_loan(&self, record_id: &str, reader_id: &str, publication_id: &str) {
        self.store
            .insert(BorrowRecord {
                record_id: record_id.to_string(),
                reader_id: reader_id.to_string(),
                publication_id: publication_id.to_string(),
                borrow_date: self.now(),
                due_date: self.now() + days(30),
                return_date: None,
                status: BorrowStatus::Borrowed,
                renewal_count: 0,
                max_renewals: MAX_RENEWALS,
            })
            .unwrap();
    }

    pub fn reader(&self, reader_id: &str) -> Reader {
        self.store.get(reader_id).unwrap().unwrap()
    }

    pub fn publication(&self, publication_id: &str) -> Publication {
        self.store.get(publication_id).unwrap().unwrap()
    }
}
