use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::debug;

use folio_db::{Collection, KvStore, keys};
use folio_gateway::Dispatcher;
use folio_types::events::FeedEvent;
use folio_types::models::Review;
use folio_types::new_id;

use crate::error::FolioResult;

/// Provider reviews. One shared append-only list, filtered per provider.
pub struct ReviewStore {
    reviews: Collection<Review>,
    dispatcher: Option<Dispatcher>,
}

impl ReviewStore {
    pub fn new(store: Arc<dyn KvStore>, ttl: Option<Duration>, dispatcher: Option<Dispatcher>) -> Self {
        Self {
            reviews: Collection::new(store, keys::REVIEWS, ttl),
            dispatcher,
        }
    }

    /// Stored as given: the rating range, the reviewer's relationship to the
    /// provider and repeat reviews are all left to the caller.
    pub fn add_review(
        &self,
        provider_id: &str,
        reviewer_id: &str,
        reviewer_name: &str,
        rating: i32,
        text: &str,
    ) -> FolioResult<Review> {
        let review = Review {
            id: new_id(),
            provider_id: provider_id.to_string(),
            reviewer_id: reviewer_id.to_string(),
            reviewer_name: reviewer_name.to_string(),
            rating,
            text: text.to_string(),
            created_at: Utc::now(),
        };

        self.reviews.push(review.clone())?;
        debug!("Review {} ({}/5) added for provider {}", review.id, rating, provider_id);

        if let Some(dispatcher) = &self.dispatcher {
            dispatcher.publish(FeedEvent::from(&review));
        }
        Ok(review)
    }

    /// Oldest first.
    pub fn provider_reviews(&self, provider_id: &str) -> FolioResult<Vec<Review>> {
        Ok(self
            .reviews
            .load()?
            .into_iter()
            .filter(|r| r.provider_id == provider_id)
            .collect())
    }

    /// Mean rating to one decimal, rounded half up. `0.0` when there are no
    /// reviews, so callers must check the review count before showing it.
    pub fn provider_rating(&self, provider_id: &str) -> FolioResult<f64> {
        Ok(average_rating(&self.provider_reviews(provider_id)?))
    }
}

fn average_rating(reviews: &[Review]) -> f64 {
    if reviews.is_empty() {
        return 0.0;
    }
    let total: i64 = reviews.iter().map(|r| i64::from(r.rating)).sum();
    let mean = total as f64 / reviews.len() as f64;
    (mean * 10.0 + 0.5).floor() / 10.0
}
