//! Single-flight request deduplication.
//!
//! Concurrent callers presenting the same key share one execution of the factory and all
//! receive a clone of its output, errors included. A flight is unregistered as soon as it
//! settles, unless the caller asked for a hold window and the output qualifies for it: then the
//! settled flight keeps answering duplicates until the window lapses, which absorbs rapid double
//! submits. Hold windows are checked lazily against the injected clock, so no timer task is
//! spawned.
//!
//! If the caller driving a flight is dropped before the factory finishes, the next waiter runs
//! its own factory in its place. When no waiter is left, the flight is unregistered.

// self
use crate::{_prelude::*, clock::Clock};

type FlightMap<T> = Mutex<HashMap<String, FlightSlot<T>>>;

/// Outcome of [`RequestDeduplicator::dedupe`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Flight<T> {
	/// Output of the shared factory run.
	pub value: T,
	/// `true` when this caller joined a flight registered by someone else.
	pub shared: bool,
}

struct FlightSlot<T> {
	cell: Arc<AsyncOnceCell<T>>,
	hold: Duration,
	settled_at: Option<OffsetDateTime>,
}
impl<T> FlightSlot<T> {
	fn new(hold: Duration) -> Self {
		Self { cell: Arc::new(AsyncOnceCell::new()), hold, settled_at: None }
	}

	fn is_live(&self, now: OffsetDateTime) -> bool {
		self.settled_at.is_none_or(|settled| now < settled + self.hold)
	}
}

/// One caller's handle on a registered flight.
///
/// Dropping it before the flight settles unregisters the flight if no other caller still waits
/// on it.
struct PendingFlight<'a, T> {
	flights: &'a FlightMap<T>,
	key: &'a str,
	cell: Arc<AsyncOnceCell<T>>,
}
impl<T> Drop for PendingFlight<'_, T> {
	fn drop(&mut self) {
		if self.cell.is_initialized() {
			return;
		}

		let mut flights = self.flights.lock();
		// The registry and this handle are the only owners left.
		let abandoned = flights.get(self.key).is_some_and(|slot| {
			Arc::ptr_eq(&slot.cell, &self.cell) && Arc::strong_count(&self.cell) == 2
		});

		if abandoned {
			flights.remove(self.key);
		}
	}
}

/// Registry of in-flight (and briefly held) requests keyed by request signature.
pub struct RequestDeduplicator<T> {
	clock: Arc<dyn Clock>,
	flights: FlightMap<T>,
}
impl<T> RequestDeduplicator<T>
where
	T: Clone + Send + Sync,
{
	/// Creates an empty registry.
	pub fn new(clock: Arc<dyn Clock>) -> Self {
		Self { clock, flights: Default::default() }
	}

	/// Runs `factory` unless a live flight for `key` exists, in which case its output is shared.
	///
	/// `hold` keeps a settled flight registered for that long when `hold_if` accepts its output;
	/// rejected outputs and [`Duration::ZERO`] unregister the flight immediately.
	pub async fn dedupe<F, Fut, H>(
		&self,
		key: &str,
		hold: Duration,
		hold_if: H,
		factory: F,
	) -> Flight<T>
	where
		F: FnOnce() -> Fut,
		Fut: Future<Output = T>,
		H: FnOnce(&T) -> bool,
	{
		let (cell, joined) = self.register(key, hold);
		let pending = PendingFlight { flights: &self.flights, key, cell };
		let mut ran = false;
		let value = pending
			.cell
			.get_or_init(|| {
				ran = true;

				factory()
			})
			.await
			.clone();

		self.settle(key, &pending.cell, hold_if(&value));

		Flight { value, shared: joined && !ran }
	}

	/// Number of flights currently registered and live.
	pub fn in_flight(&self) -> usize {
		let now = self.clock.now();

		self.flights.lock().values().filter(|slot| slot.is_live(now)).count()
	}

	/// Returns `true` if a live flight is registered under `key`.
	pub fn contains(&self, key: &str) -> bool {
		let now = self.clock.now();

		self.flights.lock().get(key).is_some_and(|slot| slot.is_live(now))
	}

	fn register(&self, key: &str, hold: Duration) -> (Arc<AsyncOnceCell<T>>, bool) {
		let now = self.clock.now();
		let mut flights = self.flights.lock();

		flights.retain(|_, slot| slot.is_live(now));

		if let Some(slot) = flights.get(key) {
			return (slot.cell.clone(), true);
		}

		let slot = FlightSlot::new(hold);
		let cell = slot.cell.clone();

		flights.insert(key.to_owned(), slot);

		(cell, false)
	}

	fn settle(&self, key: &str, cell: &Arc<AsyncOnceCell<T>>, keep: bool) {
		let now = self.clock.now();
		let mut flights = self.flights.lock();
		let Some(slot) = flights.get_mut(key) else {
			return;
		};

		// A newer flight may already occupy the key once ours expired.
		if !Arc::ptr_eq(&slot.cell, cell) || slot.settled_at.is_some() {
			return;
		}
		if keep && slot.hold.is_positive() {
			slot.settled_at = Some(now);
		} else {
			flights.remove(key);
		}
	}
}
impl<T> Debug for RequestDeduplicator<T> {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RequestDeduplicator").field("keys", &self.flights.lock().len()).finish()
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::sync::atomic::{AtomicUsize, Ordering};
	// crates.io
	use tokio::time::{self, Duration as StdDuration};
	// self
	use super::*;
	use crate::clock::ManualClock;

	fn registry() -> (RequestDeduplicator<Result<u32, String>>, ManualClock) {
		let clock = ManualClock::default();

		(RequestDeduplicator::new(Arc::new(clock.clone())), clock)
	}

	#[tokio::test]
	async fn concurrent_callers_share_one_run() {
		let (registry, _clock) = registry();
		let calls = AtomicUsize::new(0);
		let slow = || async {
			calls.fetch_add(1, Ordering::SeqCst);
			time::sleep(StdDuration::from_millis(30)).await;

			Ok(7)
		};
		let (first, second) = tokio::join!(
			registry.dedupe("GET /slow", Duration::ZERO, Result::is_ok, slow),
			registry.dedupe("GET /slow", Duration::ZERO, Result::is_ok, slow),
		);

		assert_eq!(calls.load(Ordering::SeqCst), 1);
		assert_eq!(first.value, Ok(7));
		assert_eq!(second.value, Ok(7));
		assert!(!first.shared);
		assert!(second.shared);
		assert_eq!(registry.in_flight(), 0);
	}

	#[tokio::test]
	async fn failures_reach_every_waiter_and_allow_retry() {
		let (registry, _clock) = registry();
		let calls = AtomicUsize::new(0);
		let failing = || async {
			calls.fetch_add(1, Ordering::SeqCst);
			time::sleep(StdDuration::from_millis(10)).await;

			Err::<u32, _>("boom".to_owned())
		};
		let (first, second) = tokio::join!(
			registry.dedupe("k", Duration::ZERO, Result::is_ok, failing),
			registry.dedupe("k", Duration::ZERO, Result::is_ok, failing),
		);

		assert_eq!(first.value, Err("boom".into()));
		assert_eq!(second.value, Err("boom".into()));
		assert_eq!(calls.load(Ordering::SeqCst), 1);

		let retried =
			registry.dedupe("k", Duration::ZERO, Result::is_ok, || async { Ok(1) }).await;

		assert_eq!(retried.value, Ok(1));
		assert!(!retried.shared);
	}

	#[tokio::test]
	async fn hold_window_absorbs_sequential_duplicates() {
		let (registry, clock) = registry();
		let first =
			registry.dedupe("POST /x", Duration::seconds(1), Result::is_ok, || async { Ok(1) }).await;

		clock.advance(Duration::milliseconds(400));

		let absorbed =
			registry.dedupe("POST /x", Duration::seconds(1), Result::is_ok, || async { Ok(2) }).await;

		assert_eq!(first.value, Ok(1));
		assert_eq!(absorbed.value, Ok(1));
		assert!(absorbed.shared);
		assert!(registry.contains("POST /x"));

		clock.advance(Duration::milliseconds(700));

		assert!(!registry.contains("POST /x"));

		let fresh =
			registry.dedupe("POST /x", Duration::seconds(1), Result::is_ok, || async { Ok(3) }).await;

		assert_eq!(fresh.value, Ok(3));
		assert!(!fresh.shared);
	}

	#[tokio::test]
	async fn distinct_keys_run_independently() {
		let (registry, _clock) = registry();
		let calls = AtomicUsize::new(0);
		let run = |n: u32| {
			let calls = &calls;

			move || async move {
				calls.fetch_add(1, Ordering::SeqCst);
				time::sleep(StdDuration::from_millis(10)).await;

				Ok(n)
			}
		};
		let (a, b) = tokio::join!(
			registry.dedupe("POST /x {a:1}", Duration::ZERO, Result::is_ok, run(1)),
			registry.dedupe("POST /x {a:2}", Duration::ZERO, Result::is_ok, run(2)),
		);

		assert_eq!(calls.load(Ordering::SeqCst), 2);
		assert_eq!((a.value, b.value), (Ok(1), Ok(2)));
	}

	#[tokio::test]
	async fn failed_outcomes_are_not_held() {
		let (registry, _clock) = registry();
		let failed = registry
			.dedupe("POST /x", Duration::seconds(1), Result::is_ok, || async {
				Err::<u32, _>("expired".to_owned())
			})
			.await;

		assert_eq!(failed.value, Err("expired".into()));
		assert!(!registry.contains("POST /x"));

		let reissued =
			registry.dedupe("POST /x", Duration::seconds(1), Result::is_ok, || async { Ok(4) }).await;

		assert_eq!(reissued.value, Ok(4));
		assert!(!reissued.shared);
		assert!(registry.contains("POST /x"));
	}

	#[tokio::test]
	async fn dropped_leader_hands_over_to_next_waiter() {
		let (registry, _clock) = registry();
		let pending =
			registry.dedupe("k", Duration::ZERO, Result::is_ok, || std::future::pending());

		// Poll the leader once so it registers, then drop it mid-flight.
		assert!(time::timeout(StdDuration::from_millis(10), pending).await.is_err());
		assert_eq!(registry.in_flight(), 0);
		assert!(!registry.contains("k"));

		let next = registry.dedupe("k", Duration::ZERO, Result::is_ok, || async { Ok(9) }).await;

		assert_eq!(next.value, Ok(9));
		assert_eq!(registry.in_flight(), 0);
	}

	#[tokio::test]
	async fn waiter_takes_over_a_cancelled_leader() {
		let (registry, _clock) = registry();
		let leader = time::timeout(
			StdDuration::from_millis(10),
			registry.dedupe("k", Duration::ZERO, Result::is_ok, || std::future::pending()),
		);
		let follower = async {
			time::sleep(StdDuration::from_millis(1)).await;

			registry
				.dedupe("k", Duration::ZERO, Result::is_ok, || async {
					time::sleep(StdDuration::from_millis(20)).await;

					Ok(9)
				})
				.await
		};
		let (leader, follower) = tokio::join!(leader, follower);

		assert!(leader.is_err());
		assert_eq!(follower.value, Ok(9));
		assert_eq!(registry.in_flight(), 0);
	}
}
