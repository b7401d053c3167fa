use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use switchyard_core::{BackendId, SwitchyardError, SwitchyardResult};
use tokio::time::Instant;

/// Length of the rolling window used for per-minute budgets.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

struct Window {
    limit: u32,
    calls: VecDeque<Instant>,
}

impl Window {
    fn prune(&mut self, now: Instant, window: Duration) {
        while let Some(&oldest) = self.calls.front() {
            if now.duration_since(oldest) >= window {
                self.calls.pop_front();
            } else {
                break;
            }
        }
    }
}

/// Rolling-window rate limiter with one independent budget per backend.
///
/// The set of backends is fixed when the limiter is built, so lookups never
/// take a lock over the whole map; each backend's window has its own mutex.
pub struct RateLimiter {
    window: Duration,
    windows: HashMap<BackendId, Mutex<Window>>,
}

impl RateLimiter {
    /// Create an empty limiter using the given window length.
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            windows: HashMap::new(),
        }
    }

    /// Register a backend with a budget of `limit` calls per window.
    pub fn register(&mut self, backend: BackendId, limit: u32) {
        self.windows.insert(
            backend,
            Mutex::new(Window {
                limit,
                calls: VecDeque::new(),
            }),
        );
    }

    /// Consume one call from the backend's budget.
    ///
    /// Fails with `RateLimitExceeded` when the window is full. Rejected calls
    /// do not consume budget.
    pub fn try_acquire(&self, backend: &BackendId) -> SwitchyardResult<()> {
        let slot = self
            .windows
            .get(backend)
            .ok_or_else(|| SwitchyardError::UnknownBackend {
                backend: backend.clone(),
            })?;

        let now = Instant::now();
        let mut window = slot.lock();
        window.prune(now, self.window);

        if window.calls.len() as u64 >= u64::from(window.limit) {
            return Err(SwitchyardError::RateLimitExceeded {
                backend: backend.clone(),
                limit: window.limit,
                window_secs: self.window.as_secs(),
            });
        }

        window.calls.push_back(now);
        Ok(())
    }

    /// Calls admitted for `backend` within the current window.
    pub fn calls_in_window(&self, backend: &BackendId) -> u32 {
        self.windows
            .get(backend)
            .map(|slot| {
                let mut window = slot.lock();
                window.prune(Instant::now(), self.window);
                window.calls.len() as u32
            })
            .unwrap_or(0)
    }

    /// The configured budget for `backend`.
    pub fn limit(&self, backend: &BackendId) -> Option<u32> {
        self.windows.get(backend).map(|slot| slot.lock().limit)
    }

    /// Window length.
    pub fn window(&self) -> Duration {
        self.window
    }
}
