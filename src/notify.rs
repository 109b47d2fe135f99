use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::model::{DayKey, Event};

const CHANNEL_CAPACITY: usize = 256;

/// Per-day change broadcast. Every committed event for a day is fanned out
/// to all sessions watching that day.
pub struct NotifyHub {
    channels: DashMap<DayKey, broadcast::Sender<Event>>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Watch a day. Creates the channel on first use.
    pub fn subscribe(&self, day: &DayKey) -> broadcast::Receiver<Event> {
        self.channels
            .entry(day.clone())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Fan out an event to its day's watchers. No-op if nobody is watching.
    pub fn send(&self, event: &Event) {
        let day = event.day();
        let idle = match self.channels.get(day) {
            Some(sender) => sender.send(event.clone()).is_err(),
            None => false,
        };
        // Every receiver is gone; drop the channel so unwatched days don't pile up.
        if idle {
            self.channels
                .remove_if(day, |_, sender| sender.receiver_count() == 0);
        }
    }

    pub fn watched_days(&self) -> usize {
        self.channels.len()
    }
}
