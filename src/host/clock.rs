//! Scheduler seam
//!
//! The physics driver, lobby countdown, match timer and reset delay all run
//! through [`Clock`]. Delays and intervals are in scheduler ticks.
//!
//! Cancellation contract: once `cancel` returns the task never runs again.
//! If the task is running on another thread, `cancel` waits for it. Calling
//! `cancel` from inside the task itself does not deadlock.

use parking_lot::{Mutex, ReentrantMutex};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, MissedTickBehavior};

use crate::game::constants::physics::TICK_RATE;
use crate::game::constants::secs_to_ticks;

/// Scheduled callback
pub type TaskFn = Arc<dyn Fn() + Send + Sync>;

/// Handle returned by scheduling calls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskHandle(u64);

/// Scheduler collaborator
pub trait Clock: Send + Sync {
    /// Run `task` every `interval_ticks`, first run one interval from now
    fn schedule_repeating(&self, interval_ticks: u64, task: TaskFn) -> TaskHandle;
    /// Run `task` once after `delay_ticks`
    fn schedule_once(&self, delay_ticks: u64, task: TaskFn) -> TaskHandle;
    fn cancel(&self, handle: TaskHandle);
    /// Milliseconds on a monotonic clock
    fn now_millis(&self) -> u64;
    /// Scheduler ticks per wall-clock second
    fn tick_rate(&self) -> u32;
}

/// Cancellation gate shared by a task and its canceller
struct TaskGate {
    cancelled: AtomicBool,
    running: ReentrantMutex<()>,
}

impl TaskGate {
    fn new() -> Self {
        Self {
            cancelled: AtomicBool::new(false),
            running: ReentrantMutex::new(()),
        }
    }

    /// Run the task unless cancelled; returns false once cancelled
    fn run(&self, task: &TaskFn) -> bool {
        let _guard = self.running.lock();
        if self.cancelled.load(Ordering::Acquire) {
            return false;
        }
        task();
        true
    }

    /// Mark cancelled and wait out any in-flight run
    fn close(&self) {
        self.cancelled.store(true, Ordering::Release);
        drop(self.running.lock());
    }
}

struct TokioTask {
    gate: Arc<TaskGate>,
    join: JoinHandle<()>,
}

/// Clock backed by tokio timers
///
/// Each scheduled task is its own tokio task; missed intervals are skipped
/// rather than bursted.
pub struct TokioClock {
    handle: Handle,
    tick: Duration,
    rate: u32,
    started: Instant,
    next_id: AtomicU64,
    tasks: Arc<Mutex<HashMap<TaskHandle, TokioTask>>>,
}

impl TokioClock {
    pub fn new(handle: Handle, tick: Duration) -> Self {
        let tick = tick.max(Duration::from_millis(1));
        Self {
            handle,
            tick,
            rate: (1.0 / tick.as_secs_f64()).round().max(1.0) as u32,
            started: Instant::now(),
            next_id: AtomicU64::new(1),
            tasks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Number of tasks still scheduled
    pub fn pending(&self) -> usize {
        self.tasks.lock().len()
    }

    fn next_handle(&self) -> TaskHandle {
        TaskHandle(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    fn ticks(&self, ticks: u64) -> Duration {
        self.tick * ticks.max(1) as u32
    }
}

impl Clock for TokioClock {
    fn schedule_repeating(&self, interval_ticks: u64, task: TaskFn) -> TaskHandle {
        let handle = self.next_handle();
        let period = self.ticks(interval_ticks);
        let gate = Arc::new(TaskGate::new());

        let mut tasks = self.tasks.lock();
        let task_gate = gate.clone();
        let join = self.handle.spawn(async move {
            let mut interval = interval_at(tokio::time::Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                if !task_gate.run(&task) {
                    break;
                }
            }
        });
        tasks.insert(handle, TokioTask { gate, join });
        handle
    }

    fn schedule_once(&self, delay_ticks: u64, task: TaskFn) -> TaskHandle {
        let handle = self.next_handle();
        let delay = self.ticks(delay_ticks);
        let gate = Arc::new(TaskGate::new());

        let mut tasks = self.tasks.lock();
        let task_gate = gate.clone();
        let registry = self.tasks.clone();
        let join = self.handle.spawn(async move {
            sleep(delay).await;
            task_gate.run(&task);
            registry.lock().remove(&handle);
        });
        tasks.insert(handle, TokioTask { gate, join });
        handle
    }

    fn cancel(&self, handle: TaskHandle) {
        let entry = self.tasks.lock().remove(&handle);
        if let Some(entry) = entry {
            entry.gate.close();
            entry.join.abort();
        }
    }

    fn now_millis(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    fn tick_rate(&self) -> u32 {
        self.rate
    }
}

impl Drop for TokioClock {
    fn drop(&mut self) {
        for (_, entry) in self.tasks.lock().drain() {
            entry.gate.cancelled.store(true, Ordering::Release);
            entry.join.abort();
        }
    }
}

struct ManualTask {
    due: u64,
    interval: Option<u64>,
    task: TaskFn,
    gate: Arc<TaskGate>,
}

#[derive(Default)]
struct ManualState {
    now_ticks: u64,
    next_id: u64,
    tasks: BTreeMap<TaskHandle, ManualTask>,
}

/// Deterministic clock advanced explicitly
///
/// One tick is `1000 / tick_rate` of `now_millis`. Tasks due on the same
/// tick run in scheduling order.
pub struct ManualClock {
    rate: u32,
    state: Mutex<ManualState>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::with_tick_rate(TICK_RATE)
    }
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tick_rate(rate: u32) -> Self {
        Self {
            rate: rate.max(1),
            state: Mutex::new(ManualState::default()),
        }
    }

    pub fn now_ticks(&self) -> u64 {
        self.state.lock().now_ticks
    }

    /// Number of tasks still scheduled
    pub fn pending(&self) -> usize {
        self.state.lock().tasks.len()
    }

    /// Advance time tick by tick, running everything that falls due
    pub fn advance(&self, ticks: u64) {
        for _ in 0..ticks {
            self.step();
        }
    }

    /// Advance by whole seconds
    pub fn advance_secs(&self, secs: u64) {
        self.advance(secs_to_ticks(secs, self.rate));
    }

    fn step(&self) {
        let due: Vec<(TaskFn, Arc<TaskGate>)> = {
            let mut state = self.state.lock();
            state.now_ticks += 1;
            let now = state.now_ticks;

            let mut due = Vec::new();
            let mut finished = Vec::new();
            for (handle, scheduled) in state.tasks.iter_mut() {
                if scheduled.due > now {
                    continue;
                }
                due.push((scheduled.task.clone(), scheduled.gate.clone()));
                match scheduled.interval {
                    Some(interval) => scheduled.due = now + interval,
                    None => finished.push(*handle),
                }
            }
            for handle in finished {
                state.tasks.remove(&handle);
            }
            due
        };

        for (task, gate) in due {
            gate.run(&task);
        }
    }

    fn schedule(&self, delay: u64, interval: Option<u64>, task: TaskFn) -> TaskHandle {
        let mut state = self.state.lock();
        state.next_id += 1;
        let handle = TaskHandle(state.next_id);
        let due = state.now_ticks + delay.max(1);
        state.tasks.insert(
            handle,
            ManualTask {
                due,
                interval,
                task,
                gate: Arc::new(TaskGate::new()),
            },
        );
        handle
    }
}

impl Clock for ManualClock {
    fn schedule_repeating(&self, interval_ticks: u64, task: TaskFn) -> TaskHandle {
        let interval = interval_ticks.max(1);
        self.schedule(interval, Some(interval), task)
    }

    fn schedule_once(&self, delay_ticks: u64, task: TaskFn) -> TaskHandle {
        self.schedule(delay_ticks, None, task)
    }

    fn cancel(&self, handle: TaskHandle) {
        let removed = self.state.lock().tasks.remove(&handle);
        if let Some(task) = removed {
            task.gate.close();
        }
    }

    fn now_millis(&self) -> u64 {
        self.state.lock().now_ticks * 1000 / self.rate as u64
    }

    fn tick_rate(&self) -> u32 {
        self.rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::OnceLock;

    fn counter_task(counter: &Arc<AtomicUsize>) -> TaskFn {
        let counter = counter.clone();
        Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_manual_repeating() {
        let clock = ManualClock::new();
        let count = Arc::new(AtomicUsize::new(0));
        clock.schedule_repeating(20, counter_task(&count));

        clock.advance(19);
        assert_eq!(count.load(Ordering::SeqCst), 0);
        clock.advance(1);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        clock.advance(40);
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_manual_once_and_cancel() {
        let clock = ManualClock::new();
        let count = Arc::new(AtomicUsize::new(0));
        clock.schedule_once(5, counter_task(&count));
        let cancelled = clock.schedule_once(5, counter_task(&count));
        clock.cancel(cancelled);

        clock.advance(10);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(clock.pending(), 0);
    }

    #[test]
    fn test_manual_now_millis() {
        let clock = ManualClock::new();
        clock.advance_secs(2);
        assert_eq!(clock.now_ticks(), 40);
        assert_eq!(clock.now_millis(), 2000);
    }

    #[test]
    fn test_manual_custom_tick_rate() {
        let clock = ManualClock::with_tick_rate(100);
        assert_eq!(clock.tick_rate(), 100);
        clock.advance_secs(3);
        assert_eq!(clock.now_ticks(), 300);
        assert_eq!(clock.now_millis(), 3000);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_tokio_tick_rate_from_duration() {
        let fast = TokioClock::new(Handle::current(), Duration::from_millis(10));
        assert_eq!(fast.tick_rate(), 100);
        let slow = TokioClock::new(Handle::current(), Duration::from_micros(1_000_000 / 7));
        assert_eq!(slow.tick_rate(), 7);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_tokio_seconds_follow_tick_rate() {
        let clock = TokioClock::new(Handle::current(), Duration::from_millis(10));
        let count = Arc::new(AtomicUsize::new(0));
        clock.schedule_once(secs_to_ticks(1, clock.tick_rate()), counter_task(&count));

        tokio::time::sleep(Duration::from_millis(700)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_manual_cancel_inside_task() {
        let clock = Arc::new(ManualClock::new());
        let count = Arc::new(AtomicUsize::new(0));
        let own_handle: Arc<OnceLock<TaskHandle>> = Arc::new(OnceLock::new());

        let task: TaskFn = {
            let clock = clock.clone();
            let count = count.clone();
            let own_handle = own_handle.clone();
            Arc::new(move || {
                if count.fetch_add(1, Ordering::SeqCst) == 2 {
                    if let Some(handle) = own_handle.get() {
                        clock.cancel(*handle);
                    }
                }
            })
        };
        let handle = clock.schedule_repeating(1, task);
        own_handle.set(handle).unwrap();

        clock.advance(10);
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_tokio_repeating_stops_after_cancel() {
        let clock = TokioClock::new(Handle::current(), Duration::from_millis(5));
        let count = Arc::new(AtomicUsize::new(0));
        let handle = clock.schedule_repeating(1, counter_task(&count));

        tokio::time::sleep(Duration::from_millis(60)).await;
        clock.cancel(handle);
        let after_cancel = count.load(Ordering::SeqCst);
        assert!(after_cancel >= 1);

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(count.load(Ordering::SeqCst), after_cancel);
        assert_eq!(clock.pending(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_tokio_once_runs_once() {
        let clock = TokioClock::new(Handle::current(), Duration::from_millis(5));
        let count = Arc::new(AtomicUsize::new(0));
        clock.schedule_once(2, counter_task(&count));

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(clock.pending(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_tokio_cancel_inside_task() {
        let clock = Arc::new(TokioClock::new(Handle::current(), Duration::from_millis(5)));
        let count = Arc::new(AtomicUsize::new(0));
        let own_handle: Arc<OnceLock<TaskHandle>> = Arc::new(OnceLock::new());

        let task: TaskFn = {
            let clock = clock.clone();
            let count = count.clone();
            let own_handle = own_handle.clone();
            Arc::new(move || {
                count.fetch_add(1, Ordering::SeqCst);
                if let Some(handle) = own_handle.get() {
                    clock.cancel(*handle);
                }
            })
        };
        let handle = clock.schedule_repeating(1, task);
        own_handle.set(handle).unwrap();

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
