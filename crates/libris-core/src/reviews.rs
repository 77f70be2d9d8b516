use std::sync::Arc;

use crate::clock::Clock;
use crate::error::{EntityKind, LibraryError, StorageError};
use crate::identity::generate_id;
use crate::models::{tables, Publication, Reader, Review};
use crate::publications::PublicationLedger;
use crate::store::{or_empty, RecordStore, UnitOfWork};
use crate::validation::{Validator, MAX_COMMENT_LEN};

/// Reader reviews and the publication ratings derived from them.
pub struct ReviewBoard {
    store: Arc<RecordStore>,
    clock: Arc<dyn Clock>,
}

impl ReviewBoard {
    pub fn new(store: Arc<RecordStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub fn create(
        &self,
        reader_id: &str,
        publication_id: &str,
        rating: u8,
        comment: &str,
    ) -> Result<Review, LibraryError> {
        Validator::validate_rating(rating)?;
        Validator::validate_optional_text("comment", comment, MAX_COMMENT_LEN)?;

        let mut uow = self.store.begin();
        if uow.get::<Reader>(reader_id)?.is_none() {
            return Err(LibraryError::not_found(EntityKind::Reader, reader_id));
        }
        let reviewed = uow
            .query::<Review>(|r| r.reader_id == reader_id && r.publication_id == publication_id)?;
        if !reviewed.is_empty() {
            return Err(LibraryError::AlreadyReviewed(publication_id.to_string()));
        }

        let rated = uow.update::<Publication>(publication_id, |p| {
            PublicationLedger::fold_rating(p, rating)
        })?;
        if rated.is_none() {
            return Err(LibraryError::not_found(
                EntityKind::Publication,
                publication_id,
            ));
        }

        let review = Review {
            review_id: generate_id("review"),
            reader_id: reader_id.to_string(),
            publication_id: publication_id.to_string(),
            rating,
            comment: comment.to_string(),
            review_date: self.clock.now(),
            likes: 0,
        };
        uow.insert(review.clone())?;
        uow.commit()?;

        tracing::debug!("Reader {} rated {} {}/5", reader_id, publication_id, rating);
        Ok(review)
    }

    pub fn update(&self, review_id: &str, rating: u8, comment: &str) -> Result<Review, LibraryError> {
        Validator::validate_rating(rating)?;
        Validator::validate_optional_text("comment", comment, MAX_COMMENT_LEN)?;

        let mut uow = self.store.begin();
        let review = uow
            .update::<Review>(review_id, |r| {
                r.rating = rating;
                r.comment = comment.to_string();
            })?
            .ok_or_else(|| LibraryError::not_found(EntityKind::Review, review_id))?;
        Self::rerate(&mut uow, &review.publication_id)?;
        uow.commit()?;
        Ok(review)
    }

    pub fn delete(&self, review_id: &str) -> Result<(), LibraryError> {
        let mut uow = self.store.begin();
        let review = uow
            .get::<Review>(review_id)?
            .ok_or_else(|| LibraryError::not_found(EntityKind::Review, review_id))?;
        uow.delete::<Review>(review_id)?;
        Self::rerate(&mut uow, &review.publication_id)?;
        uow.commit()?;
        Ok(())
    }

    /// Recompute a publication's rating from its remaining reviews.
    fn rerate(uow: &mut UnitOfWork<'_>, publication_id: &str) -> Result<(), StorageError> {
        let ratings: Vec<u8> = uow
            .query::<Review>(|r| r.publication_id == publication_id)?
            .iter()
            .map(|r| r.rating)
            .collect();
        let updated = uow.update::<Publication>(publication_id, |p| {
            PublicationLedger::reset_rating(p, &ratings)
        })?;
        if updated.is_none() {
            tracing::warn!("Reviews refer to missing publication {}", publication_id);
        }
        Ok(())
    }

    pub fn like(&self, review_id: &str) -> Result<Review, LibraryError> {
        self.store
            .update::<Review>(review_id, |r| r.likes += 1)?
            .ok_or_else(|| LibraryError::not_found(EntityKind::Review, review_id))
    }

    pub fn get(&self, review_id: &str) -> Option<Review> {
        or_empty(self.store.get(review_id), tables::REVIEWS)
    }

    pub fn by_publication(&self, publication_id: &str) -> Vec<Review> {
        or_empty(
            self.store
                .query::<Review>(|r| r.publication_id == publication_id),
            tables::REVIEWS,
        )
    }

    pub fn by_reader(&self, reader_id: &str) -> Vec<Review> {
        or_empty(
            self.store.query::<Review>(|r| r.reader_id == reader_id),
            tables::REVIEWS,
        )
    }
}
