//! Client-side bookkeeping of SUBSCRIBE requests

use std::collections::HashMap;

use cmwlight_core::message::RequestContext;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    /// SUBSCRIBE sent, no acknowledgement yet
    Subscribing,
    /// Acknowledged or already delivering data
    Subscribed,
    /// The server reported SUBSCRIBE_EXCEPTION or NOTIFICATION_EXC
    Failed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Subscription {
    pub id: u64,
    pub device: String,
    pub property: String,
    pub context: RequestContext,
    pub state: SubscriptionState,
    /// Server handle from the SUBSCRIBE acknowledgement
    pub source_id: Option<i64>,
    /// Most recent notification id seen, in arrival order
    pub last_notification_id: Option<i64>,
    pub notifications: u64,
}

impl Subscription {
    pub fn new(id: u64, device: &str, property: &str, context: RequestContext) -> Self {
        Self {
            id,
            device: device.to_string(),
            property: property.to_string(),
            context,
            state: SubscriptionState::Subscribing,
            source_id: None,
            last_notification_id: None,
            notifications: 0,
        }
    }
}

/// Live subscriptions of one connection, keyed by request id
///
/// An id leaves the table on UNSUBSCRIBE; traffic for ids not in the table
/// is to be discarded by the caller.
#[derive(Debug, Default)]
pub struct Subscriptions {
    entries: HashMap<u64, Subscription>,
}

impl Subscriptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, subscription: Subscription) {
        self.entries.insert(subscription.id, subscription);
    }

    pub fn remove(&mut self, id: u64) -> Option<Subscription> {
        self.entries.remove(&id)
    }

    pub fn get(&self, id: u64) -> Option<&Subscription> {
        self.entries.get(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Subscription> {
        self.entries.values()
    }

    /// Record a SUBSCRIBE acknowledgement; false if the id is unknown
    pub fn acknowledge(&mut self, id: u64, source_id: i64) -> bool {
        match self.entries.get_mut(&id) {
            Some(sub) => {
                sub.source_id = Some(source_id);
                sub.state = SubscriptionState::Subscribed;
                true
            }
            None => false,
        }
    }

    /// Record a notification; false if the id is unknown
    pub fn notify(&mut self, id: u64, notification_id: i64) -> bool {
        let Some(sub) = self.entries.get_mut(&id) else {
            return false;
        };
        if let Some(last) = sub.last_notification_id {
            if notification_id <= last {
                debug!(id, notification_id, last, "notification arrived out of order");
            }
        }
        sub.last_notification_id = Some(notification_id);
        sub.notifications += 1;
        sub.state = SubscriptionState::Subscribed;
        true
    }

    /// Mark a subscription undeliverable; false if the id is unknown
    pub fn fail(&mut self, id: u64) -> bool {
        match self.entries.get_mut(&id) {
            Some(sub) => {
                sub.state = SubscriptionState::Failed;
                true
            }
            None => false,
        }
    }

    /// Put every subscription back to `Subscribing`, returning their ids sorted
    pub fn reset(&mut self) -> Vec<u64> {
        let mut ids: Vec<u64> = self
            .entries
            .values_mut()
            .map(|sub| {
                sub.state = SubscriptionState::Subscribing;
                sub.source_id = None;
                sub.id
            })
            .collect();
        ids.sort_unstable();
        ids
    }
}
