//! Load-adaptive concurrency control for probes
//!
//! The controller owns a ceiling on in-flight probes. A sampling task reads
//! system load on a fixed interval and moves the ceiling between `min_limit`
//! and `max_limit`: halved when memory or CPU is over threshold, raised by
//! `recovery_step` per calm sample until it reaches `max_limit` again.
//! Sampling never blocks probes; it only changes what future `acquire` calls
//! are admitted under.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{Notify, broadcast};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::ConcurrencyConfig;
use crate::utils::system_load::{LoadSample, LoadSampler};

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Current controller state
///
/// `min_limit <= current_limit <= max_limit` holds after every operation.
#[derive(Debug, Clone, PartialEq)]
pub struct ConcurrencyState {
    pub current_limit: usize,
    pub min_limit: usize,
    pub max_limit: usize,
    pub last_sample_time: Option<Instant>,
    pub throttled: bool,
    /// Permits currently held
    pub in_flight: usize,
}

/// Throttling transition notification
#[derive(Debug, Clone, PartialEq)]
pub enum ThrottleEvent {
    Started {
        previous_limit: usize,
        limit: usize,
        sample: LoadSample,
    },
    Stopped {
        limit: usize,
        sample: LoadSample,
    },
}

impl ThrottleEvent {
    pub fn limit(&self) -> usize {
        match self {
            ThrottleEvent::Started { limit, .. } | ThrottleEvent::Stopped { limit, .. } => *limit,
        }
    }
}

struct ControllerInner {
    state: Mutex<ConcurrencyState>,
    released: Notify,
    events: broadcast::Sender<ThrottleEvent>,
    config: ConcurrencyConfig,
}

impl ControllerInner {
    fn state(&self) -> MutexGuard<'_, ConcurrencyState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn release(&self) {
        {
            let mut state = self.state();
            state.in_flight = state.in_flight.saturating_sub(1);
        }
        self.released.notify_waiters();
    }
}

/// Adaptive permit pool shared by every probe in a run
#[derive(Clone)]
pub struct AdaptiveConcurrencyController {
    inner: Arc<ControllerInner>,
}

impl AdaptiveConcurrencyController {
    pub fn new(config: &ConcurrencyConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let state = ConcurrencyState {
            current_limit: config.effective_initial_limit(),
            min_limit: config.min_limit,
            max_limit: config.max_limit,
            last_sample_time: None,
            throttled: false,
            in_flight: 0,
        };
        Self {
            inner: Arc::new(ControllerInner {
                state: Mutex::new(state),
                released: Notify::new(),
                events,
                config: config.clone(),
            }),
        }
    }

    /// Wait until a permit is available under the current limit
    ///
    /// The permit is returned to the pool when dropped, so error paths
    /// release it without extra bookkeeping.
    pub async fn acquire(&self) -> ConcurrencyPermit {
        loop {
            let released = self.inner.released.notified();
            tokio::pin!(released);
            // Register before checking so a release in between is not missed
            released.as_mut().enable();

            if self.try_admit() {
                return ConcurrencyPermit {
                    inner: Some(self.inner.clone()),
                };
            }
            released.await;
        }
    }

    /// Take a permit without waiting, if one is free
    pub fn try_acquire(&self) -> Option<ConcurrencyPermit> {
        self.try_admit().then(|| ConcurrencyPermit {
            inner: Some(self.inner.clone()),
        })
    }

    fn try_admit(&self) -> bool {
        let mut state = self.inner.state();
        if state.in_flight < state.current_limit {
            state.in_flight += 1;
            true
        } else {
            false
        }
    }

    /// Apply one load sample, returning the transition it caused if any
    pub fn apply_sample(&self, sample: LoadSample) -> Option<ThrottleEvent> {
        let config = &self.inner.config;
        let over_threshold = sample.exceeds(
            config.memory_threshold_percent,
            config.cpu_threshold_percent,
        );

        let (event, raised) = {
            let mut state = self.inner.state();
            state.last_sample_time = Some(Instant::now());
            if !config.adaptive {
                return None;
            }

            let previous_limit = state.current_limit;
            let mut event = None;
            if over_threshold {
                state.current_limit = (previous_limit / 2).max(state.min_limit);
                if !state.throttled {
                    state.throttled = true;
                    event = Some(ThrottleEvent::Started {
                        previous_limit,
                        limit: state.current_limit,
                        sample,
                    });
                } else if state.current_limit < previous_limit {
                    debug!(
                        "Still under pressure, concurrency limit {} -> {}",
                        previous_limit, state.current_limit
                    );
                }
            } else {
                state.current_limit = previous_limit
                    .saturating_add(config.recovery_step)
                    .min(state.max_limit);
                if state.throttled {
                    state.throttled = false;
                    event = Some(ThrottleEvent::Stopped {
                        limit: state.current_limit,
                        sample,
                    });
                }
            }
            (event, state.current_limit > previous_limit)
        };

        if raised {
            self.inner.released.notify_waiters();
        }

        if let Some(event) = &event {
            match event {
                ThrottleEvent::Started {
                    previous_limit,
                    limit,
                    sample,
                } => warn!(
                    "Throttling started: memory {:.1}%, cpu {:.1}%, concurrency limit {} -> {}",
                    sample.memory_percent, sample.cpu_percent, previous_limit, limit
                ),
                ThrottleEvent::Stopped { limit, sample } => info!(
                    "Throttling stopped: memory {:.1}%, cpu {:.1}%, concurrency limit recovering at {}",
                    sample.memory_percent, sample.cpu_percent, limit
                ),
            }
            // No subscribers is fine
            let _ = self.inner.events.send(event.clone());
        }
        event
    }

    /// Spawn the periodic sampling task
    ///
    /// Sampling stops when the returned handle is dropped. With `adaptive`
    /// off no task is spawned and the limit stays at its initial value.
    pub fn start_sampling(&self, sampler: Arc<dyn LoadSampler>) -> SamplingHandle {
        if !self.inner.config.adaptive {
            debug!("Adaptive concurrency disabled, limit fixed at {}", self.current_limit());
            return SamplingHandle { task: None };
        }

        let controller = self.clone();
        let period = self.inner.config.sample_interval;
        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately
            interval.tick().await;
            loop {
                interval.tick().await;
                let sample = sampler.sample().await;
                controller.apply_sample(sample);
            }
        });
        debug!("Load sampling started every {:?}", period);
        SamplingHandle { task: Some(task) }
    }

    /// Receive throttling transitions from now on
    pub fn subscribe(&self) -> broadcast::Receiver<ThrottleEvent> {
        self.inner.events.subscribe()
    }

    pub fn snapshot(&self) -> ConcurrencyState {
        self.inner.state().clone()
    }

    pub fn current_limit(&self) -> usize {
        self.inner.state().current_limit
    }

    pub fn in_flight(&self) -> usize {
        self.inner.state().in_flight
    }
}

impl std::fmt::Debug for AdaptiveConcurrencyController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdaptiveConcurrencyController")
            .field("state", &self.snapshot())
            .finish()
    }
}

/// A held probe slot, returned to the pool on drop
#[must_use = "dropping the permit releases it immediately"]
pub struct ConcurrencyPermit {
    inner: Option<Arc<ControllerInner>>,
}

impl ConcurrencyPermit {
    /// Return the permit explicitly
    pub fn release(mut self) {
        if let Some(inner) = self.inner.take() {
            inner.release();
        }
    }
}

impl Drop for ConcurrencyPermit {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.take() {
            inner.release();
        }
    }
}

impl std::fmt::Debug for ConcurrencyPermit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConcurrencyPermit").finish_non_exhaustive()
    }
}

/// Handle to the sampling task, aborts it on drop
#[derive(Debug)]
pub struct SamplingHandle {
    task: Option<JoinHandle<()>>,
}

impl SamplingHandle {
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

impl Drop for SamplingHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
