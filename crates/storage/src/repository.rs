//! In-memory event repository

use crate::StorageError;
use dms::{EventKind, EventSink, GestureEvent};
use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;
use tracing::{debug, info, warn};

/// Bounded store of recent detection events, oldest evicted first
pub struct EventRepository {
    events: Mutex<VecDeque<GestureEvent>>,
    max_events: usize,
}

impl EventRepository {
    pub fn new(max_events: usize) -> Self {
        info!("Creating in-memory event repository (max {} events)", max_events);
        Self {
            events: Mutex::new(VecDeque::with_capacity(max_events.min(1024))),
            max_events: max_events.max(1),
        }
    }

    /// Insert an event
    pub fn insert(&self, event: GestureEvent) -> Result<(), StorageError> {
        let mut events = self
            .events
            .lock()
            .map_err(|e| StorageError::Lock(e.to_string()))?;

        // Enforce retention
        while events.len() >= self.max_events {
            events.pop_front();
        }

        debug!("Stored {} event {}", event.kind, event.id);
        events.push_back(event);
        Ok(())
    }

    /// Newest-first events, optionally of one kind
    pub fn recent(&self, kind: Option<EventKind>, limit: usize) -> Result<Vec<GestureEvent>, StorageError> {
        let events = self
            .events
            .lock()
            .map_err(|e| StorageError::Lock(e.to_string()))?;

        Ok(events
            .iter()
            .rev()
            .filter(|e| kind.map_or(true, |k| e.kind == k))
            .take(limit)
            .cloned()
            .collect())
    }

    /// Stored events per kind
    pub fn counts(&self) -> Result<BTreeMap<EventKind, usize>, StorageError> {
        let events = self
            .events
            .lock()
            .map_err(|e| StorageError::Lock(e.to_string()))?;

        let mut counts = BTreeMap::new();
        for event in events.iter() {
            *counts.entry(event.kind).or_insert(0) += 1;
        }
        Ok(counts)
    }

    pub fn len(&self) -> usize {
        self.events.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Clear all events (new session)
    pub fn clear(&self) {
        if let Ok(mut events) = self.events.lock() {
            events.clear();
        }
    }
}

impl EventSink for EventRepository {
    fn record(&self, event: &GestureEvent) {
        if let Err(e) = self.insert(event.clone()) {
            warn!("Event {} not stored: {}", event.id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn event(kind: EventKind, secs: i64) -> GestureEvent {
        let t0 = Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap();
        GestureEvent::new(kind, t0 + Duration::seconds(secs))
    }

    #[test]
    fn test_recent_is_newest_first() {
        let repo = EventRepository::new(100);
        repo.insert(event(EventKind::Nod, 0)).unwrap();
        repo.insert(event(EventKind::Yawn, 1)).unwrap();
        repo.insert(event(EventKind::Shake, 2)).unwrap();

        let recent = repo.recent(None, 2).unwrap();
        let kinds: Vec<_> = recent.iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![EventKind::Shake, EventKind::Yawn]);
    }

    #[test]
    fn test_filter_by_kind() {
        let repo = EventRepository::new(100);
        for i in 0..6 {
            let kind = if i % 2 == 0 { EventKind::Blink } else { EventKind::Nod };
            repo.record(&event(kind, i));
        }

        let blinks = repo.recent(Some(EventKind::Blink), 10).unwrap();
        assert_eq!(blinks.len(), 3);
        assert!(blinks.iter().all(|e| e.kind == EventKind::Blink));
        assert!(blinks[0].timestamp > blinks[2].timestamp);

        let counts = repo.counts().unwrap();
        assert_eq!(counts.get(&EventKind::Nod), Some(&3));
        assert_eq!(counts.get(&EventKind::Sleep), None);
    }

    #[test]
    fn test_retention_limit() {
        let repo = EventRepository::new(5);
        for i in 0..10 {
            repo.insert(event(EventKind::Blink, i)).unwrap();
        }

        assert_eq!(repo.len(), 5);
        let oldest = repo.recent(None, 10).unwrap().pop().unwrap();
        assert_eq!(oldest.timestamp.timestamp() % 60, 5);

        repo.clear();
        assert!(repo.is_empty());
    }
}
