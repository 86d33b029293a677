// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::trace;

/// A registered event handler.
pub type Handler<P> = Arc<dyn Fn(&P) + Send + Sync>;

struct Listener<P: ?Sized> {
	id: u64,
	handler: Handler<P>,
}

struct Registry<P: ?Sized> {
	next_id: u64,
	events: HashMap<String, Vec<Listener<P>>>,
}

impl<P: ?Sized> Default for Registry<P> {
	fn default() -> Self {
		Self {
			next_id: 0,
			events: HashMap::new(),
		}
	}
}

/// Type-erased removal so a [`Subscription`] does not carry the payload type.
trait Detach: Send + Sync {
	fn detach(&self, event: &str, id: u64) -> bool;
}

impl<P: ?Sized> Detach for Mutex<Registry<P>> {
	fn detach(&self, event: &str, id: u64) -> bool {
		let mut registry = self.lock();
		let Some(listeners) = registry.events.get_mut(event) else {
			return false;
		};

		let Some(position) = listeners.iter().position(|l| l.id == id) else {
			return false;
		};
		listeners.remove(position);

		if listeners.is_empty() {
			registry.events.remove(event);
		}
		true
	}
}

/// Per-instance registry of named events and their handlers.
///
/// Handlers for one event run in registration order. Emission is synchronous
/// and works on a snapshot of the handler list, so a handler may subscribe or
/// unsubscribe (on this hub or another) without affecting the pass in progress.
///
/// Cloning an `EventHub` yields another handle to the same registry.
pub struct EventHub<P: ?Sized> {
	registry: Arc<Mutex<Registry<P>>>,
}

impl<P: ?Sized + 'static> EventHub<P> {
	pub fn new() -> Self {
		Self {
			registry: Arc::new(Mutex::new(Registry::default())),
		}
	}

	/// Registers `handler` under `event` and returns its subscription.
	///
	/// The handler stays registered until [`Subscription::unsubscribe`] is
	/// called; dropping the subscription does not detach it.
	pub fn on<F>(&self, event: impl Into<String>, handler: F) -> Subscription
	where
		F: Fn(&P) + Send + Sync + 'static,
	{
		let event = event.into();
		let id = {
			let mut registry = self.registry.lock();
			let id = registry.next_id;
			registry.next_id += 1;
			registry
				.events
				.entry(event.clone())
				.or_default()
				.push(Listener {
					id,
					handler: Arc::new(handler),
				});
			id
		};

		trace!(event = %event, id, "handler subscribed");

		let registry: Arc<dyn Detach> = self.registry.clone();
		Subscription {
			event,
			id,
			registry: Arc::downgrade(&registry),
			attached: AtomicBool::new(true),
		}
	}

	/// Invokes every handler currently registered for `event` with `payload`.
	///
	/// Panics raised by a handler propagate to the caller and stop the pass.
	pub fn emit(&self, event: &str, payload: &P) {
		let handlers: Vec<Handler<P>> = {
			let registry = self.registry.lock();
			match registry.events.get(event) {
				Some(listeners) => listeners.iter().map(|l| l.handler.clone()).collect(),
				None => return,
			}
		};

		trace!(event, handlers = handlers.len(), "emitting event");

		for handler in handlers {
			handler(payload);
		}
	}

	/// Number of handlers currently registered for `event`.
	pub fn listener_count(&self, event: &str) -> usize {
		self
			.registry
			.lock()
			.events
			.get(event)
			.map_or(0, |listeners| listeners.len())
	}

	pub fn has_listeners(&self, event: &str) -> bool {
		self.listener_count(event) > 0
	}

	/// Removes every handler for every event.
	///
	/// Outstanding subscriptions stay valid; unsubscribing them afterwards
	/// returns `true` once and removes nothing.
	pub fn clear(&self) {
		self.registry.lock().events.clear();
	}
}

impl<P: ?Sized + 'static> Default for EventHub<P> {
	fn default() -> Self {
		Self::new()
	}
}

impl<P: ?Sized> Clone for EventHub<P> {
	fn clone(&self) -> Self {
		Self {
			registry: self.registry.clone(),
		}
	}
}

impl<P: ?Sized> fmt::Debug for EventHub<P> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let registry = self.registry.lock();
		let mut events: Vec<_> = registry
			.events
			.iter()
			.map(|(name, listeners)| (name.as_str(), listeners.len()))
			.collect();
		events.sort_unstable();
		f.debug_struct("EventHub").field("events", &events).finish()
	}
}

/// Handle returned by [`EventHub::on`].
///
/// Each subscription tracks whether it is still attached, so unsubscribing
/// twice never removes a different handler.
#[must_use = "dropping a Subscription leaves the handler registered; keep it to unsubscribe later"]
pub struct Subscription {
	event: String,
	id: u64,
	registry: Weak<dyn Detach>,
	attached: AtomicBool,
}

impl Subscription {
	/// Detaches the handler.
	///
	/// Returns `true` on the first call and `false` on every later call.
	pub fn unsubscribe(&self) -> bool {
		if !self.attached.swap(false, Ordering::AcqRel) {
			return false;
		}

		if let Some(registry) = self.registry.upgrade() {
			let removed = registry.detach(&self.event, self.id);
			trace!(event = %self.event, id = self.id, removed, "handler unsubscribed");
		}
		true
	}

	pub fn is_attached(&self) -> bool {
		self.attached.load(Ordering::Acquire)
	}

	/// Name of the event this subscription listens to.
	pub fn event(&self) -> &str {
		&self.event
	}
}

impl fmt::Debug for Subscription {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Subscription")
			.field("event", &self.event)
			.field("id", &self.id)
			.field("attached", &self.is_attached())
			.finish()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::atomic::AtomicUsize;

	fn recorder() -> (Arc<Mutex<Vec<String>>>, impl Fn(&str) -> Box<dyn Fn(&str) + Send + Sync>) {
		let log = Arc::new(Mutex::new(Vec::new()));
		let sink = log.clone();
		let make = move |label: &str| -> Box<dyn Fn(&str) + Send + Sync> {
			let sink = sink.clone();
			let label = label.to_string();
			Box::new(move |payload: &str| sink.lock().push(format!("{label}:{payload}")))
		};
		(log, make)
	}

	#[test]
	fn handlers_run_in_registration_order() {
		let hub: EventHub<str> = EventHub::new();
		let (log, make) = recorder();

		let _first = hub.on("updated", make("first"));
		let _second = hub.on("updated", make("second"));
		let _third = hub.on("updated", make("third"));

		hub.emit("updated", "x");

		assert_eq!(*log.lock(), vec!["first:x", "second:x", "third:x"]);
	}

	#[test]
	fn emit_passes_payload() {
		let hub: EventHub<str> = EventHub::new();
		let (log, make) = recorder();
		let _sub = hub.on("test", make("h"));

		hub.emit("test", "payload");

		assert_eq!(*log.lock(), vec!["h:payload"]);
	}

	#[test]
	fn emit_without_handlers_is_noop() {
		let hub: EventHub<str> = EventHub::new();
		hub.emit("nobody-listens", "payload");
		assert_eq!(hub.listener_count("nobody-listens"), 0);
	}

	#[test]
	fn events_are_isolated_by_name() {
		let hub: EventHub<str> = EventHub::new();
		let (log, make) = recorder();
		let _a = hub.on("a", make("a"));
		let _b = hub.on("b", make("b"));

		hub.emit("a", "1");

		assert_eq!(*log.lock(), vec!["a:1"]);
	}

	#[test]
	fn unsubscribe_is_idempotent() {
		let hub: EventHub<str> = EventHub::new();
		let (log, make) = recorder();
		let subscription = hub.on("test", make("h"));

		assert!(subscription.is_attached());
		assert!(subscription.unsubscribe());
		assert!(!subscription.unsubscribe());
		assert!(!subscription.unsubscribe());
		assert!(!subscription.is_attached());

		hub.emit("test", "payload");
		assert!(log.lock().is_empty());
	}

	#[test]
	fn repeated_unsubscribe_does_not_remove_later_handler() {
		let hub: EventHub<str> = EventHub::new();
		let (log, make) = recorder();

		let first = hub.on("updated", make("first"));
		let _second = hub.on("updated", make("second"));

		assert!(first.unsubscribe());
		assert!(!first.unsubscribe());
		assert_eq!(hub.listener_count("updated"), 1);

		hub.emit("updated", "x");
		assert_eq!(*log.lock(), vec!["second:x"]);
	}

	#[test]
	fn subscription_reports_event_name() {
		let hub: EventHub<u32> = EventHub::new();
		let subscription = hub.on("tick", |_: &u32| {});
		assert_eq!(subscription.event(), "tick");
	}

	#[test]
	fn handler_added_during_emit_waits_for_next_pass() {
		let hub: EventHub<str> = EventHub::new();
		let calls = Arc::new(AtomicUsize::new(0));
		let late = Arc::new(Mutex::new(Vec::new()));

		let inner_hub = hub.clone();
		let inner_calls = calls.clone();
		let inner_late = late.clone();
		let _sub = hub.on("updated", move |_: &str| {
			let counter = inner_calls.clone();
			let subscription = inner_hub.on("updated", move |_: &str| {
				counter.fetch_add(1, Ordering::SeqCst);
			});
			inner_late.lock().push(subscription);
		});

		hub.emit("updated", "first");
		assert_eq!(calls.load(Ordering::SeqCst), 0);
		assert_eq!(hub.listener_count("updated"), 2);

		hub.emit("updated", "second");
		assert_eq!(calls.load(Ordering::SeqCst), 1);
	}

	#[test]
	fn handler_removed_during_emit_still_runs_in_current_pass() {
		let hub: EventHub<str> = EventHub::new();
		let calls = Arc::new(AtomicUsize::new(0));
		let victim: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));

		let slot = victim.clone();
		let _remover = hub.on("updated", move |_: &str| {
			if let Some(subscription) = slot.lock().as_ref() {
				subscription.unsubscribe();
			}
		});

		let counter = calls.clone();
		*victim.lock() = Some(hub.on("updated", move |_: &str| {
			counter.fetch_add(1, Ordering::SeqCst);
		}));

		hub.emit("updated", "x");
		assert_eq!(calls.load(Ordering::SeqCst), 1);

		hub.emit("updated", "x");
		assert_eq!(calls.load(Ordering::SeqCst), 1);
	}

	#[test]
	#[should_panic(expected = "handler failed")]
	fn handler_panic_propagates() {
		let hub: EventHub<str> = EventHub::new();
		let _sub = hub.on("boom", |_: &str| panic!("handler failed"));
		hub.emit("boom", "x");
	}

	#[test]
	fn clones_share_registry() {
		let hub: EventHub<str> = EventHub::new();
		let other = hub.clone();
		let (log, make) = recorder();

		let _sub = other.on("updated", make("h"));
		hub.emit("updated", "x");

		assert_eq!(*log.lock(), vec!["h:x"]);
	}

	#[test]
	fn clear_keeps_subscriptions_safe() {
		let hub: EventHub<str> = EventHub::new();
		let subscription = hub.on("updated", |_: &str| {});
		hub.clear();

		assert!(!hub.has_listeners("updated"));
		assert!(subscription.unsubscribe());
		assert!(!subscription.unsubscribe());
	}

	#[test]
	fn unsubscribe_after_hub_dropped() {
		let hub: EventHub<str> = EventHub::new();
		let subscription = hub.on("updated", |_: &str| {});
		drop(hub);

		assert!(subscription.unsubscribe());
		assert!(!subscription.unsubscribe());
	}

	#[test]
	fn debug_lists_event_counts() {
		let hub: EventHub<str> = EventHub::new();
		let _a = hub.on("b", |_: &str| {});
		let _b = hub.on("a", |_: &str| {});
		let _c = hub.on("a", |_: &str| {});

		let rendered = format!("{hub:?}");
		assert!(rendered.contains("(\"a\", 2)"));
		assert!(rendered.contains("(\"b\", 1)"));
	}
}

#[cfg(test)]
mod proptests {
	use super::*;
	use proptest::prelude::*;
	use std::sync::atomic::AtomicUsize;

	proptest! {
		/// Only handlers that were never unsubscribed receive the event.
		#[test]
		fn only_attached_handlers_receive(removed in prop::collection::vec(any::<bool>(), 1..16)) {
			let hub: EventHub<u32> = EventHub::new();
			let counters: Vec<Arc<AtomicUsize>> =
				removed.iter().map(|_| Arc::new(AtomicUsize::new(0))).collect();

			let subscriptions: Vec<Subscription> = counters
				.iter()
				.map(|counter| {
					let counter = counter.clone();
					hub.on("event", move |_: &u32| {
						counter.fetch_add(1, Ordering::SeqCst);
					})
				})
				.collect();

			for (subscription, remove) in subscriptions.iter().zip(&removed) {
				if *remove {
					prop_assert!(subscription.unsubscribe());
					prop_assert!(!subscription.unsubscribe());
				}
			}

			hub.emit("event", &7);

			for (counter, remove) in counters.iter().zip(&removed) {
				let expected = if *remove { 0 } else { 1 };
				prop_assert_eq!(counter.load(Ordering::SeqCst), expected);
			}

			let attached = removed.iter().filter(|r| !**r).count();
			prop_assert_eq!(hub.listener_count("event"), attached);
		}
	}
}
