//! Named-subscriber event bus
//!
//! One [`EventBus`] is bound to one event channel. Subscribers register a
//! callback under a unique name; [`EventBus::post`] calls every callback
//! synchronously, in subscription order, on the posting thread.
//!
//! Posting works on a snapshot of the subscriber list taken under a short
//! read lock, so subscribing or unsubscribing from another thread (or from
//! inside a callback) never blocks or corrupts a post in flight. Changes
//! become visible to the next post.
//!
//! Dispatch is blocking: a slow callback holds up whichever thread posted,
//! which for a session means the whole inbound or outbound direction.

use crate::error::{BoxError, Error, Result};
use parking_lot::RwLock;
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Opaque per-subscriber value handed back on every delivery
pub type Cookie = Arc<dyn Any + Send + Sync>;

/// What a subscriber callback returns
pub type CallbackResult = std::result::Result<(), BoxError>;

/// Subscriber callback
pub type Callback<P> = Arc<dyn Fn(&EventPacket<P>) -> CallbackResult + Send + Sync>;

/// Packet delivered to each subscriber
///
/// `dest` and `cookie` are rewritten per delivery; the payload is shared by
/// every copy of one post.
pub struct EventPacket<P> {
    /// Event channel name
    pub event: Arc<str>,
    /// Bus owner, fixed when the bus is built
    pub src: Arc<str>,
    /// Name of the subscriber receiving this copy
    pub dest: Option<String>,
    /// Posted payload
    pub payload: Arc<P>,
    /// Cookie registered by the receiving subscriber
    pub cookie: Option<Cookie>,
    /// Extra fields supplied with [`EventBus::post_with`]
    pub extra: BTreeMap<String, String>,
}

impl<P> Clone for EventPacket<P> {
    fn clone(&self) -> Self {
        Self {
            event: Arc::clone(&self.event),
            src: Arc::clone(&self.src),
            dest: self.dest.clone(),
            payload: Arc::clone(&self.payload),
            cookie: self.cookie.clone(),
            extra: self.extra.clone(),
        }
    }
}

impl<P: fmt::Debug> fmt::Debug for EventPacket<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventPacket")
            .field("event", &self.event)
            .field("src", &self.src)
            .field("dest", &self.dest)
            .field("payload", &self.payload)
            .field("cookie", &self.cookie.as_ref().map(|_| ".."))
            .field("extra", &self.extra)
            .finish()
    }
}

impl<P> EventPacket<P> {
    /// Cookie downcast to the type the subscriber registered
    pub fn cookie_as<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.cookie.as_deref().and_then(|c| c.downcast_ref::<T>())
    }
}

struct Subscription<P> {
    name: String,
    callback: Callback<P>,
    cookie: Option<Cookie>,
}

impl<P> Clone for Subscription<P> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            callback: Arc::clone(&self.callback),
            cookie: self.cookie.clone(),
        }
    }
}

/// Publish/subscribe endpoint for one event channel
pub struct EventBus<P> {
    event: Arc<str>,
    src: Arc<str>,
    subscriptions: RwLock<Vec<Subscription<P>>>,
}

impl<P> EventBus<P> {
    /// Bus for `event`, owned by `src`
    pub fn new(event: impl Into<String>, src: impl Into<String>) -> Self {
        Self {
            event: Arc::from(event.into()),
            src: Arc::from(src.into()),
            subscriptions: RwLock::new(Vec::new()),
        }
    }

    /// Event channel name
    pub fn event(&self) -> &str {
        &self.event
    }

    /// Bus owner
    pub fn src(&self) -> &str {
        &self.src
    }

    /// Register `callback` under `name`
    ///
    /// A name that is already registered keeps its first callback and cookie;
    /// the new registration is ignored. Returns whether it was added.
    pub fn subscribe<F>(&self, name: &str, callback: F, cookie: Option<Cookie>) -> bool
    where
        F: Fn(&EventPacket<P>) -> CallbackResult + Send + Sync + 'static,
    {
        let mut subs = self.subscriptions.write();
        if subs.iter().any(|s| s.name == name) {
            log::debug!("{}: '{}' already subscribed, keeping first", self.event, name);
            return false;
        }
        subs.push(Subscription {
            name: name.to_string(),
            callback: Arc::new(callback),
            cookie,
        });
        true
    }

    /// Remove the subscriber registered under `name`; returns whether one was removed
    pub fn unsubscribe(&self, name: &str) -> bool {
        let mut subs = self.subscriptions.write();
        let before = subs.len();
        subs.retain(|s| s.name != name);
        subs.len() != before
    }

    /// Deliver `payload` to every subscriber
    pub fn post(&self, payload: P) -> Result<()> {
        self.post_with(payload, BTreeMap::new())
    }

    /// Deliver `payload` with extra packet fields
    ///
    /// Stops at the first failing callback and returns its error; later
    /// subscribers do not see this post.
    pub fn post_with(&self, payload: P, extra: BTreeMap<String, String>) -> Result<()> {
        let packet = EventPacket {
            event: Arc::clone(&self.event),
            src: Arc::clone(&self.src),
            dest: None,
            payload: Arc::new(payload),
            cookie: None,
            extra,
        };

        let snapshot = self.subscriptions.read().clone();

        for sub in snapshot {
            let mut delivery = packet.clone();
            delivery.dest = Some(sub.name.clone());
            delivery.cookie = sub.cookie.clone();
            if let Err(source) = (sub.callback)(&delivery) {
                return Err(Error::Callback {
                    event: self.event.to_string(),
                    subscriber: sub.name,
                    source,
                });
            }
        }
        Ok(())
    }

    /// Number of subscribers
    pub fn len(&self) -> usize {
        self.subscriptions.read().len()
    }

    /// True when nobody is subscribed
    pub fn is_empty(&self) -> bool {
        self.subscriptions.read().is_empty()
    }

    /// True if `name` is subscribed
    pub fn contains(&self, name: &str) -> bool {
        self.subscriptions.read().iter().any(|s| s.name == name)
    }

    /// Subscriber names in delivery order
    pub fn subscribers(&self) -> Vec<String> {
        self.subscriptions
            .read()
            .iter()
            .map(|s| s.name.clone())
            .collect()
    }
}

impl<P> fmt::Debug for EventBus<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("event", &self.event)
            .field("src", &self.src)
            .field("subscribers", &self.subscribers())
            .finish()
    }
}
