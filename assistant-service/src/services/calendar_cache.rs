//! Per-user cache of calendar events used as chat context.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::calendar::EventSource;
use super::metrics;
use crate::models::CalendarEvent;

pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
struct CacheEntry {
    events: Vec<CalendarEvent>,
    fetched_at: Instant,
}

/// Events are reused while younger than the TTL. Failed fetches are not
/// cached, so the next lookup tries the source again.
pub struct CalendarContextCache {
    entries: DashMap<String, CacheEntry>,
    source: Arc<dyn EventSource>,
    ttl: Duration,
    days_ahead: u32,
}

impl CalendarContextCache {
    pub fn new(source: Arc<dyn EventSource>, ttl: Duration, days_ahead: u32) -> Self {
        Self {
            entries: DashMap::new(),
            source,
            ttl,
            days_ahead,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Cached events for `user_id`, fetching on a miss. Never fails: an
    /// unavailable calendar yields an empty list.
    pub async fn get_events(&self, user_id: &str) -> Vec<CalendarEvent> {
        let cached = self
            .entries
            .get(user_id)
            .filter(|entry| entry.fetched_at.elapsed() < self.ttl)
            .map(|entry| entry.events.clone());
        if let Some(events) = cached {
            metrics::record_cache_lookup(true);
            return events;
        }
        metrics::record_cache_lookup(false);

        match self.source.fetch_events(user_id, self.days_ahead).await {
            Ok(events) => {
                tracing::debug!(user_id, event_count = events.len(), "Calendar context refreshed");
                self.entries.insert(
                    user_id.to_string(),
                    CacheEntry {
                        events: events.clone(),
                        fetched_at: Instant::now(),
                    },
                );
                events
            }
            Err(e) => {
                tracing::warn!(
                    user_id,
                    error = %e,
                    "Calendar unavailable, continuing without context"
                );
                metrics::record_calendar_fetch_error(e.kind());
                Vec::new()
            }
        }
    }

    /// Store `events` as freshly fetched.
    pub fn prime(&self, user_id: &str, events: Vec<CalendarEvent>) {
        self.entries.insert(
            user_id.to_string(),
            CacheEntry {
                events,
                fetched_at: Instant::now(),
            },
        );
    }

    pub fn invalidate(&self, user_id: &str) {
        self.entries.remove(user_id);
    }

    /// Drop every entry at or past the TTL, returning how many were removed.
    pub fn purge_stale(&self) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| entry.fetched_at.elapsed() < self.ttl);
        before.saturating_sub(self.entries.len())
    }

    /// Periodically purge stale entries until the cache is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let cache = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(cache) = cache.upgrade() else {
                    break;
                };
                let purged = cache.purge_stale();
                if purged > 0 {
                    tracing::debug!(purged, "Purged stale calendar context");
                }
            }
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::calendar::{CalendarError, StaticEventSource};
    use chrono::Utc;

    fn event(id: &str) -> CalendarEvent {
        let now = Utc::now();
        CalendarEvent {
            id: id.to_string(),
            title: format!("Event {}", id),
            start_time: now,
            end_time: now + chrono::Duration::hours(1),
            description: None,
            location: None,
            attendees: None,
            is_all_day: false,
        }
    }

    fn cache_over(source: Arc<StaticEventSource>) -> CalendarContextCache {
        CalendarContextCache::new(source, DEFAULT_TTL, 7)
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetches_at_most_once_within_ttl() {
        let source = Arc::new(StaticEventSource::new(vec![event("1"), event("2")]));
        let cache = cache_over(source.clone());

        assert_eq!(cache.get_events("u1").await.len(), 2);
        tokio::time::advance(Duration::from_secs(299)).await;
        assert_eq!(cache.get_events("u1").await.len(), 2);

        assert_eq!(source.fetch_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refetches_after_ttl() {
        let source = Arc::new(StaticEventSource::new(vec![event("1")]));
        let cache = cache_over(source.clone());

        cache.get_events("u1").await;
        tokio::time::advance(Duration::from_secs(300)).await;
        cache.get_events("u1").await;

        assert_eq!(source.fetch_count(), 2);
    }

    #[tokio::test]
    async fn test_entries_are_per_user() {
        let source = Arc::new(StaticEventSource::new(vec![event("1")]));
        let cache = cache_over(source.clone());

        cache.get_events("u1").await;
        cache.get_events("u2").await;
        cache.get_events("u1").await;

        assert_eq!(source.fetch_count(), 2);
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test]
    async fn test_failure_yields_empty_and_is_not_cached() {
        let source = Arc::new(StaticEventSource::failing(CalendarError::NotAuthenticated));
        let cache = cache_over(source.clone());

        assert!(cache.get_events("u1").await.is_empty());
        assert!(cache.get_events("u1").await.is_empty());

        assert_eq!(source.fetch_count(), 2);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_prime_and_invalidate() {
        let source = Arc::new(StaticEventSource::new(vec![event("fetched")]));
        let cache = cache_over(source.clone());

        cache.prime("u1", vec![event("a"), event("b")]);
        assert_eq!(cache.get_events("u1").await.len(), 2);
        assert_eq!(source.fetch_count(), 0);

        cache.invalidate("u1");
        let events = cache.get_events("u1").await;
        assert_eq!(events[0].id, "fetched");
        assert_eq!(source.fetch_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_stale_keeps_fresh_entries() {
        let cache = cache_over(Arc::new(StaticEventSource::new(Vec::new())));

        cache.prime("old", vec![event("1")]);
        tokio::time::advance(Duration::from_secs(200)).await;
        cache.prime("new", vec![event("2")]);
        tokio::time::advance(Duration::from_secs(100)).await;

        assert_eq!(cache.purge_stale(), 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get_events("new").await[0].id, "2");
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_evicts_entries_of_departed_users() {
        let cache = Arc::new(cache_over(Arc::new(StaticEventSource::new(Vec::new()))));
        cache.prime("u1", vec![event("1")]);

        let sweeper = cache.spawn_sweeper(Duration::from_secs(600));
        tokio::time::sleep(Duration::from_secs(601)).await;

        assert!(cache.is_empty());
        sweeper.abort();
    }
}
