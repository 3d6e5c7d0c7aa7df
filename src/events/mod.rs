// events/mod.rs
use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;
use serde::Serialize;

/// Outcome notifications the presentation layer surfaces to the user.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notification {
    ScanCompleted { device_count: usize },
    ScanFailed { message: String },
    DeviceToggled { device_id: String, is_on: bool },
    ControlFailed { device_id: String, message: String },
}

type Subscriber = Box<dyn Fn(&Notification) + Send + Sync>;

pub struct NotificationBus {
    subscribers: DashMap<usize, Subscriber>,
    next_id: AtomicUsize,
}

impl NotificationBus {
    pub fn new() -> Self {
        Self {
            subscribers: DashMap::new(),
            next_id: AtomicUsize::new(0),
        }
    }

    pub fn subscribe<F>(&self, callback: F) -> usize
    where
        F: Fn(&Notification) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers.insert(id, Box::new(callback));
        id
    }

    pub fn publish(&self, notification: Notification) {
        for subscriber in self.subscribers.iter() {
            (subscriber.value())(&notification);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn delivers_to_every_subscriber() {
        let bus = NotificationBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for _ in 0..2 {
            let seen = seen.clone();
            bus.subscribe(move |n| seen.lock().expect("lock").push(n.clone()));
        }

        bus.publish(Notification::ScanCompleted { device_count: 4 });

        let seen = seen.lock().expect("lock");
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0], Notification::ScanCompleted { device_count: 4 });
    }
}
