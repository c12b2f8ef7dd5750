//! Remote-context lifecycle monitor.

use std::sync::Arc;
use std::time::Duration;

use pickwire_runtime::{RemoteHandle, Subscription};
use tokio::time::MissedTickBehavior;
use tracing::debug;

/// Polls `handle` every `interval`; once it reports closed, waits `grace` and then
/// calls `on_closed`.
///
/// The grace window lets a delivery that raced the closure still win. Stopping the
/// returned subscription during the window suppresses `on_closed`.
pub fn spawn_monitor<F>(handle: Arc<dyn RemoteHandle>, interval: Duration, grace: Duration, on_closed: F) -> Subscription
where
	F: FnOnce() + Send + 'static,
{
	let task = tokio::spawn(async move {
		let mut ticker = tokio::time::interval(interval);
		ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
		loop {
			ticker.tick().await;
			if handle.is_closed() {
				break;
			}
		}
		debug!(target = "pickwire.session", grace_ms = grace.as_millis() as u64, "remote context closed; waiting grace window");
		tokio::time::sleep(grace).await;
		on_closed();
	});
	Subscription::from_task(task)
}

#[cfg(test)]
mod tests {
	use std::sync::atomic::{AtomicUsize, Ordering};

	use pickwire_runtime::{FakeLauncher, RemoteLauncher};
	use url::Url;

	use super::*;

	fn counter() -> (Arc<AtomicUsize>, impl FnOnce() + Send + 'static) {
		let count = Arc::new(AtomicUsize::new(0));
		let c = count.clone();
		(count, move || {
			c.fetch_add(1, Ordering::SeqCst);
		})
	}

	#[tokio::test(start_paused = true)]
	async fn fires_after_grace_window() {
		let launcher = FakeLauncher::new();
		let handle = launcher.launch(&Url::parse("https://a.example/").unwrap()).unwrap();
		let (fired, on_closed) = counter();
		let _sub = spawn_monitor(handle, Duration::from_millis(500), Duration::from_millis(1_000), on_closed);

		tokio::time::sleep(Duration::from_millis(1_200)).await;
		assert_eq!(fired.load(Ordering::SeqCst), 0);

		launcher.last().unwrap().close_by_user();
		tokio::time::sleep(Duration::from_millis(600)).await;
		assert_eq!(fired.load(Ordering::SeqCst), 0, "still inside grace window");

		tokio::time::sleep(Duration::from_millis(1_000)).await;
		assert_eq!(fired.load(Ordering::SeqCst), 1);
	}

	#[tokio::test(start_paused = true)]
	async fn stopping_during_grace_suppresses_callback() {
		let launcher = FakeLauncher::new();
		let handle = launcher.launch(&Url::parse("https://a.example/").unwrap()).unwrap();
		let (fired, on_closed) = counter();
		let sub = spawn_monitor(handle, Duration::from_millis(100), Duration::from_millis(1_000), on_closed);

		launcher.last().unwrap().close_by_user();
		tokio::time::sleep(Duration::from_millis(300)).await;
		sub.stop();
		tokio::time::sleep(Duration::from_millis(2_000)).await;

		assert_eq!(fired.load(Ordering::SeqCst), 0);
	}
}
