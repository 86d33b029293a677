// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Named-event subscription and synchronous fan-out for Loom.
//!
//! [`EventHub`] keeps an ordered list of handlers per event name. Registering a
//! handler returns a [`Subscription`] that detaches exactly that handler, once.
//!
//! ```
//! use loom_common_events::EventHub;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//!
//! let hub: EventHub<str> = EventHub::new();
//! let seen = Arc::new(AtomicUsize::new(0));
//!
//! let counter = seen.clone();
//! let subscription = hub.on("updated", move |_payload: &str| {
//!     counter.fetch_add(1, Ordering::SeqCst);
//! });
//!
//! hub.emit("updated", "payload");
//! assert!(subscription.unsubscribe());
//! assert!(!subscription.unsubscribe());
//! hub.emit("updated", "payload");
//!
//! assert_eq!(seen.load(Ordering::SeqCst), 1);
//! ```

mod hub;

pub use hub::{EventHub, Handler, Subscription};
