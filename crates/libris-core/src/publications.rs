use std::sync::Arc;

use serde::Deserialize;

use crate::categories::descendant_ids;
use crate::error::{EntityKind, LibraryError, StorageError};
use crate::identity::generate_id;
use crate::models::{
    tables, BorrowRecord, Category, Publication, PublicationStatus, PublicationType,
};
use crate::store::{or_empty, RecordStore, UnitOfWork};
use crate::validation::{Validator, MAX_TEXT_LEN};

/// Input for cataloguing a new publication.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPublication {
    pub title: String,
    pub author: String,
    #[serde(default)]
    pub publisher: String,
    #[serde(default)]
    pub publish_date: String,
    #[serde(rename = "type")]
    pub publication_type: PublicationType,
    #[serde(default)]
    pub location: String,
    pub total_copies: u32,
    #[serde(default)]
    pub category_id: Option<String>,
    #[serde(default)]
    pub isbn: Option<String>,
    #[serde(default)]
    pub issn: Option<String>,
}

/// Descriptive fields that may change after cataloguing. Copy counts and
/// the borrow period are not editable here.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicationUpdate {
    pub title: Option<String>,
    pub author: Option<String>,
    pub publisher: Option<String>,
    pub location: Option<String>,
    pub category_id: Option<String>,
}

/// Catalog search filters. Empty fields match everything.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicationQuery {
    pub title: Option<String>,
    pub author: Option<String>,
    pub isbn: Option<String>,
    pub issn: Option<String>,
    pub category_id: Option<String>,
    #[serde(rename = "type")]
    pub publication_type: Option<PublicationType>,
}

impl PublicationQuery {
    pub fn matches(&self, publication: &Publication) -> bool {
        fn contains_ci(haystack: &str, needle: &Option<String>) -> bool {
            match needle.as_deref() {
                Some(n) if !n.is_empty() => haystack.to_lowercase().contains(&n.to_lowercase()),
                _ => true,
            }
        }
        fn equals(value: Option<&str>, wanted: &Option<String>) -> bool {
            match wanted.as_deref() {
                Some(w) if !w.is_empty() => value == Some(w),
                _ => true,
            }
        }

        contains_ci(&publication.title, &self.title)
            && contains_ci(&publication.author, &self.author)
            && equals(publication.isbn.as_deref(), &self.isbn)
            && equals(publication.issn.as_deref(), &self.issn)
            && equals(publication.category_id.as_deref(), &self.category_id)
            && self
                .publication_type
                .map_or(true, |t| t == publication.publication_type)
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Running average after adding one rating, rounded to two decimals.
pub fn running_average(average: f64, count: u32, rating: u8) -> f64 {
    round2((average * count as f64 + rating as f64) / (count as f64 + 1.0))
}

/// Average of a full rating list, rounded to two decimals. `0` when empty.
pub fn average_of(ratings: &[u8]) -> f64 {
    if ratings.is_empty() {
        return 0.0;
    }
    let sum: u32 = ratings.iter().map(|&r| r as u32).sum();
    round2(sum as f64 / ratings.len() as f64)
}

/// The catalog plus copy and rating bookkeeping.
pub struct PublicationLedger {
    store: Arc<RecordStore>,
}

impl PublicationLedger {
    pub fn new(store: Arc<RecordStore>) -> Self {
        Self { store }
    }

    pub fn create(&self, input: NewPublication) -> Result<Publication, LibraryError> {
        Validator::validate_text("title", &input.title, MAX_TEXT_LEN)?;
        Validator::validate_text("author", &input.author, MAX_TEXT_LEN)?;
        Validator::validate_optional_text("publisher", &input.publisher, MAX_TEXT_LEN)?;
        Validator::validate_optional_text("location", &input.location, MAX_TEXT_LEN)?;
        Validator::validate_total_copies(input.total_copies)?;

        let mut uow = self.store.begin();
        if let Some(category_id) = &input.category_id {
            if uow.get::<Category>(category_id)?.is_none() {
                return Err(LibraryError::not_found(EntityKind::Category, category_id));
            }
        }

        let publication = Publication {
            publication_id: generate_id("pub"),
            title: input.title,
            author: input.author,
            publisher: input.publisher,
            publish_date: input.publish_date,
            status: PublicationStatus::Available,
            borrow_period: input.publication_type.default_borrow_period(),
            location: input.location,
            total_copies: input.total_copies,
            available_copies: input.total_copies,
            average_rating: 0.0,
            total_ratings: 0,
            category_id: input.category_id,
            publication_type: input.publication_type,
            isbn: input.isbn,
            issn: input.issn,
        };
        uow.insert(publication.clone())?;
        uow.commit()?;

        tracing::info!(
            "Catalogued publication {} ({} copies)",
            publication.publication_id,
            publication.total_copies
        );
        Ok(publication)
    }

    pub fn get(&self, publication_id: &str) -> Option<Publication> {
        or_empty(self.store.get(publication_id), tables::PUBLICATIONS)
    }

    pub fn all(&self) -> Vec<Publication> {
        or_empty(self.store.all(), tables::PUBLICATIONS)
    }

    pub fn search(&self, query: &PublicationQuery) -> Vec<Publication> {
        or_empty(
            self.store.query::<Publication>(|p| query.matches(p)),
            tables::PUBLICATIONS,
        )
    }

    /// Publications filed under a category or any of its descendants.
    pub fn by_category(&self, category_id: &str) -> Vec<Publication> {
        let categories: Vec<Category> = or_empty(self.store.all(), tables::CATEGORIES);
        if !categories.iter().any(|c| c.category_id == category_id) {
            return Vec::new();
        }

        let mut ids = descendant_ids(&categories, category_id);
        ids.push(category_id.to_string());
        or_empty(
            self.store.query::<Publication>(|p| {
                p.category_id
                    .as_ref()
                    .is_some_and(|c| ids.iter().any(|id| id == c))
            }),
            tables::PUBLICATIONS,
        )
    }

    pub fn update_details(
        &self,
        publication_id: &str,
        update: PublicationUpdate,
    ) -> Result<Publication, LibraryError> {
        if let Some(title) = &update.title {
            Validator::validate_text("title", title, MAX_TEXT_LEN)?;
        }
        if let Some(author) = &update.author {
            Validator::validate_text("author", author, MAX_TEXT_LEN)?;
        }

        let mut uow = self.store.begin();
        if let Some(category_id) = &update.category_id {
            if uow.get::<Category>(category_id)?.is_none() {
                return Err(LibraryError::not_found(EntityKind::Category, category_id));
            }
        }

        let updated = uow
            .update::<Publication>(publication_id, |p| {
                if let Some(title) = update.title {
                    p.title = title;
                }
                if let Some(author) = update.author {
                    p.author = author;
                }
                if let Some(publisher) = update.publisher {
                    p.publisher = publisher;
                }
                if let Some(location) = update.location {
                    p.location = location;
                }
                if let Some(category_id) = update.category_id {
                    p.category_id = Some(category_id);
                }
            })?
            .ok_or_else(|| LibraryError::not_found(EntityKind::Publication, publication_id))?;
        uow.commit()?;
        Ok(updated)
    }

    /// Take a publication out of circulation. Copies on loan can still be
    /// returned, but nothing can be borrowed again.
    pub fn withdraw(&self, publication_id: &str) -> Result<Publication, LibraryError> {
        let withdrawn = self
            .store
            .update::<Publication>(publication_id, |p| {
                p.status = PublicationStatus::Unavailable;
                p.available_copies = 0;
            })?
            .ok_or_else(|| LibraryError::not_found(EntityKind::Publication, publication_id))?;

        tracing::info!("Withdrew publication {}", publication_id);
        Ok(withdrawn)
    }

    /// Delete a publication. Refused while any copy is on loan.
    pub fn delete(&self, publication_id: &str) -> Result<(), LibraryError> {
        let mut uow = self.store.begin();
        let on_loan = uow
            .query::<BorrowRecord>(|r| r.publication_id == publication_id && r.is_active())?
            .len();
        if on_loan > 0 {
            return Err(LibraryError::InvalidState(format!(
                "publication {} has {} copies on loan",
                publication_id, on_loan
            )));
        }
        if !uow.delete::<Publication>(publication_id)? {
            return Err(LibraryError::not_found(
                EntityKind::Publication,
                publication_id,
            ));
        }
        uow.commit()?;
        Ok(())
    }

    /// Move `delta` copies on or off the shelf.
    ///
    /// Returns false if the publication is missing or the new count would
    /// fall outside `0..=total_copies`.
    pub fn update_available_copies(&self, publication_id: &str, delta: i32) -> bool {
        let mut uow = self.store.begin();
        let applied = match Self::adjust_copies(&mut uow, publication_id, delta) {
            Ok(applied) => applied,
            Err(e) => {
                tracing::error!("Failed to adjust copies of {}: {}", publication_id, e);
                return false;
            }
        };
        if !applied {
            return false;
        }
        match uow.commit() {
            Ok(()) => true,
            Err(e) => {
                tracing::error!("Failed to adjust copies of {}: {}", publication_id, e);
                false
            }
        }
    }

    pub(crate) fn adjust_copies(
        uow: &mut UnitOfWork<'_>,
        publication_id: &str,
        delta: i32,
    ) -> Result<bool, StorageError> {
        let Some(mut publication) = uow.get::<Publication>(publication_id)? else {
            return Ok(false);
        };

        let available = publication.available_copies as i64 + delta as i64;
        if available < 0 || available > publication.total_copies as i64 {
            tracing::warn!(
                "Refusing to move {} copies of {}: {} of {} on the shelf",
                delta,
                publication_id,
                publication.available_copies,
                publication.total_copies
            );
            return Ok(false);
        }

        publication.available_copies = available as u32;
        if !publication.is_withdrawn() {
            publication.status = PublicationStatus::for_available_copies(publication.available_copies);
        }
        uow.put(publication)?;
        Ok(true)
    }

    /// Fold one new rating into the running average.
    pub fn update_rating(&self, publication_id: &str, rating: u8) -> bool {
        let result = self.store.update::<Publication>(publication_id, |p| {
            Self::fold_rating(p, rating);
        });
        match result {
            Ok(updated) => updated.is_some(),
            Err(e) => {
                tracing::error!("Failed to update rating of {}: {}", publication_id, e);
                false
            }
        }
    }

    /// Replace the rating aggregate with one computed from `ratings`.
    pub fn recalculate_rating(&self, publication_id: &str, ratings: &[u8]) -> bool {
        let result = self.store.update::<Publication>(publication_id, |p| {
            Self::reset_rating(p, ratings);
        });
        match result {
            Ok(updated) => updated.is_some(),
            Err(e) => {
                tracing::error!("Failed to recalculate rating of {}: {}", publication_id, e);
                false
            }
        }
    }

    pub(crate) fn fold_rating(publication: &mut Publication, rating: u8) {
        publication.average_rating =
            running_average(publication.average_rating, publication.total_ratings, rating);
        publication.total_ratings += 1;
    }

    pub(crate) fn reset_rating(publication: &mut Publication, ratings: &[u8]) {
        publication.average_rating = average_of(ratings);
        publication.total_ratings = ratings.len() as u32;
    }
}
