//! Timer-driven step controllers
//!
//! A [`Controller`] is a template of `(time, value)` steps. Starting it
//! spawns one running instance that invokes a callback at each step's time
//! offset. Controllers drive volume ramps, backlight blinking and similar
//! timed sequences.
//!
//! Step offsets are measured from the start of the cycle, so the delay
//! between two steps is the difference of their offsets. A repeating
//! controller loops back to the first step once the last one has fired.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::error::ControllerError;

/// Identifier of one running controller instance
///
/// Ids are assigned per template, starting at 1 and increasing
/// monotonically. "Not started" is expressed as `Option::None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ControllerId(u32);

impl ControllerId {
    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for ControllerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctrl-{}", self.0)
    }
}

/// One step of a controller template
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    /// Offset from the start of the cycle, in milliseconds
    pub time: u32,
    pub value: u32,
}

/// A controller template plus the set of its running instances
pub struct Controller {
    steps: Vec<Step>,
    repeat: bool,
    active: Arc<DashMap<ControllerId, JoinHandle<()>>>,
    next_id: AtomicU32,
}

impl Controller {
    /// Create an empty, non-repeating template
    pub fn new() -> Self {
        Self::with_repeat(false)
    }

    pub fn with_repeat(repeat: bool) -> Self {
        Self {
            steps: Vec::new(),
            repeat,
            active: Arc::new(DashMap::new()),
            next_id: AtomicU32::new(1),
        }
    }

    /// Parse a template from `"time=value;time=value;..."`
    ///
    /// Steps are taken literally in the order given; they are not sorted.
    /// Whitespace around steps and fields is ignored, as is a trailing `;`.
    pub fn from_pattern(pattern: &str, repeat: bool) -> Result<Self, ControllerError> {
        let mut controller = Self::with_repeat(repeat);

        for raw in pattern.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            let (time, value) = raw
                .split_once('=')
                .ok_or_else(|| ControllerError::MalformedStep(raw.to_string()))?;

            let parse = |field: &str| {
                field
                    .trim()
                    .parse::<u32>()
                    .map_err(|source| ControllerError::InvalidNumber {
                        step: raw.to_string(),
                        source,
                    })
            };

            controller.add_step(parse(time)?, parse(value)?);
        }

        if controller.steps.is_empty() {
            return Err(ControllerError::EmptyPattern);
        }

        Ok(controller)
    }

    /// Append a step to the template
    pub fn add_step(&mut self, time: u32, value: u32) {
        self.steps.push(Step { time, value });
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn repeat(&self) -> bool {
        self.repeat
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Start a new running instance
    ///
    /// The callback receives `(id, step_time, step_value)` and returns
    /// whether the instance should keep going. When the first step has a
    /// zero offset it fires before `start` returns. A repeating instance
    /// restarts its cycle once the last step has held for as long as the
    /// gap that led to it.
    ///
    /// Returns `None` when the template has no steps, or when steps remain
    /// to be scheduled but no tokio runtime is available.
    pub fn start<F>(&self, mut callback: F) -> Option<ControllerId>
    where
        F: FnMut(ControllerId, u32, u32) -> bool + Send + 'static,
    {
        let first = *self.steps.first()?;
        let id = ControllerId(self.next_id.fetch_add(1, Ordering::Relaxed));

        let mut index = 0;
        if first.time == 0 {
            if !callback(id, first.time, first.value) {
                tracing::trace!("Controller {} stopped by its first step", id);
                return Some(id);
            }
            index = 1;
            if index == self.steps.len() && !self.repeat {
                return Some(id);
            }
        }

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(e) => {
                tracing::warn!("Cannot schedule controller {} without a runtime: {}", id, e);
                return None;
            }
        };

        // The task waits until its handle is registered, so a task that
        // completes immediately can still remove itself from the active set
        let (registered_tx, registered_rx) = oneshot::channel::<()>();
        let steps = self.steps.clone();
        let repeat = self.repeat;
        let active = Arc::clone(&self.active);

        let handle = runtime.spawn(async move {
            if registered_rx.await.is_err() {
                return;
            }
            run_steps(id, steps, repeat, index, callback).await;
            active.remove(&id);
            tracing::trace!("Controller {} completed", id);
        });

        self.active.insert(id, handle);
        let _ = registered_tx.send(());

        Some(id)
    }

    /// Start an instance owned by the returned handle
    ///
    /// Dropping the handle stops the instance.
    pub fn spawn<F>(self: &Arc<Self>, callback: F) -> Option<RunningController>
    where
        F: FnMut(ControllerId, u32, u32) -> bool + Send + 'static,
    {
        let id = self.start(callback)?;
        Some(RunningController {
            controller: Arc::clone(self),
            id,
        })
    }

    /// Stop a running instance; unknown ids are ignored
    pub fn stop(&self, id: ControllerId) {
        if let Some((_, handle)) = self.active.remove(&id) {
            handle.abort();
            tracing::trace!("Controller {} stopped", id);
        }
    }

    /// Stop every running instance of this template
    pub fn stop_all(&self) {
        let ids: Vec<ControllerId> = self.active.iter().map(|entry| *entry.key()).collect();
        for id in ids {
            self.stop(id);
        }
    }

    pub fn is_running(&self, id: ControllerId) -> bool {
        self.active.contains_key(&id)
    }

    pub fn running_count(&self) -> usize {
        self.active.len()
    }
}

impl Default for Controller {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Controller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Controller")
            .field("steps", &self.steps)
            .field("repeat", &self.repeat)
            .field("running", &self.active.len())
            .finish()
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        self.stop_all();
    }
}

/// Step loop for one running instance
async fn run_steps<F>(
    id: ControllerId,
    steps: Vec<Step>,
    repeat: bool,
    mut index: usize,
    mut callback: F,
) where
    F: FnMut(ControllerId, u32, u32) -> bool,
{
    // On wrap the last step holds as long as the gap that led to it
    let hold = match steps.len() {
        n if n >= 2 => steps[n - 1].time.saturating_sub(steps[n - 2].time),
        _ => 0,
    };
    let mut previous = if index == 0 { 0 } else { steps[index - 1].time };
    let mut wrapped = false;

    loop {
        if index >= steps.len() {
            if !repeat {
                return;
            }
            index = 0;
            previous = 0;
            wrapped = true;
        }

        let step = steps[index];
        let mut delay = step.time.saturating_sub(previous);
        if wrapped && index == 0 {
            // Never below 1 ms, or a zero-length cycle would spin
            delay = delay.saturating_add(hold).max(1);
        }

        tokio::time::sleep(Duration::from_millis(u64::from(delay))).await;

        if !callback(id, step.time, step.value) {
            return;
        }

        previous = step.time;
        index += 1;
    }
}

/// A running controller instance that is stopped when dropped
#[derive(Debug)]
pub struct RunningController {
    controller: Arc<Controller>,
    id: ControllerId,
}

impl RunningController {
    pub fn id(&self) -> ControllerId {
        self.id
    }

    pub fn is_running(&self) -> bool {
        self.controller.is_running(self.id)
    }
}

impl Drop for RunningController {
    fn drop(&mut self) {
        self.controller.stop(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    type Fired = Arc<Mutex<Vec<(u32, u32)>>>;

    fn recorder(fired: &Fired) -> impl FnMut(ControllerId, u32, u32) -> bool + Send + 'static {
        let fired = Arc::clone(fired);
        move |_, time, value| {
            fired.lock().push((time, value));
            true
        }
    }

    #[test]
    fn test_from_pattern() {
        let controller = Controller::from_pattern("0=20; 1000=40;2500=60;", true).unwrap();
        assert_eq!(
            controller.steps(),
            &[
                Step { time: 0, value: 20 },
                Step { time: 1000, value: 40 },
                Step { time: 2500, value: 60 },
            ]
        );
        assert!(controller.repeat());
    }

    #[test]
    fn test_from_pattern_errors() {
        assert_eq!(
            Controller::from_pattern("", false).unwrap_err(),
            ControllerError::EmptyPattern
        );
        assert_eq!(
            Controller::from_pattern("0=1;500", false).unwrap_err(),
            ControllerError::MalformedStep("500".to_string())
        );
        assert!(matches!(
            Controller::from_pattern("0=-1", false),
            Err(ControllerError::InvalidNumber { .. })
        ));
    }

    #[test]
    fn test_empty_template_does_not_start() {
        let controller = Controller::new();
        assert_eq!(controller.start(|_, _, _| true), None);
    }

    #[test]
    fn test_zero_offset_fires_synchronously() {
        // No runtime needed: the only step fires inside start()
        let mut controller = Controller::new();
        controller.add_step(0, 7);

        let fired: Fired = Arc::default();
        let id = controller.start(recorder(&fired));

        assert_eq!(id.map(|id| id.as_u32()), Some(1));
        assert_eq!(*fired.lock(), vec![(0, 7)]);
        assert_eq!(controller.running_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_replays_steps_in_order() {
        let controller = Controller::from_pattern("0=10;100=20;250=30", false).unwrap();
        let fired: Fired = Arc::default();

        let id = controller.start(recorder(&fired)).unwrap();
        assert_eq!(*fired.lock(), vec![(0, 10)]);
        assert!(controller.is_running(id));

        tokio::time::sleep(Duration::from_millis(99)).await;
        assert_eq!(fired.lock().len(), 1);

        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(fired.lock().len(), 2);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(*fired.lock(), vec![(0, 10), (100, 20), (250, 30)]);

        // Non-repeating instances leave the active set on completion
        tokio::task::yield_now().await;
        assert!(!controller.is_running(id));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_before_first_step_prevents_callbacks() {
        let controller = Controller::from_pattern("500=1;1000=2", false).unwrap();
        let fired: Fired = Arc::default();

        let id = controller.start(recorder(&fired)).unwrap();
        controller.stop(id);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(fired.lock().is_empty());
        assert!(!controller.is_running(id));
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeat_loops_until_stopped() {
        let controller = Controller::from_pattern("0=1;100=2", true).unwrap();
        let fired: Fired = Arc::default();

        let id = controller.start(recorder(&fired)).unwrap();

        // Steps at t=0 and t=100, then the cycle restarts at t=200
        tokio::time::sleep(Duration::from_millis(350)).await;
        let values: Vec<u32> = fired.lock().iter().map(|(_, v)| *v).collect();
        assert_eq!(values, vec![1, 2, 1, 2]);

        controller.stop(id);
        let count = fired.lock().len();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(fired.lock().len(), count);
    }

    #[tokio::test(start_paused = true)]
    async fn test_blink_stays_off_before_wrapping() {
        let controller = Controller::from_pattern("0=1;500=0", true).unwrap();
        let fired: Fired = Arc::default();

        let _id = controller.start(recorder(&fired)).unwrap();

        tokio::time::sleep(Duration::from_millis(999)).await;
        assert_eq!(*fired.lock(), vec![(0, 1), (500, 0)]);

        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(*fired.lock(), vec![(0, 1), (500, 0), (0, 1)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_zero_step_repeats_without_spinning() {
        let controller = Controller::from_pattern("0=3", true).unwrap();
        let fired: Fired = Arc::default();

        let id = controller.start(recorder(&fired)).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        controller.stop(id);

        let count = fired.lock().len();
        assert!(count > 1 && count <= 11);
    }

    #[tokio::test(start_paused = true)]
    async fn test_callback_returning_false_terminates() {
        let controller = Controller::from_pattern("10=1;20=2;30=3", true).unwrap();
        let calls = Arc::new(Mutex::new(0));

        let counter = Arc::clone(&calls);
        let id = controller
            .start(move |_, _, value| {
                *counter.lock() += 1;
                value < 2
            })
            .unwrap();

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(*calls.lock(), 2);
        assert!(!controller.is_running(id));
    }

    #[tokio::test(start_paused = true)]
    async fn test_instances_get_increasing_ids() {
        let controller = Arc::new(Controller::from_pattern("100=1", false).unwrap());

        let first = controller.spawn(|_, _, _| true).unwrap();
        let second = controller.spawn(|_, _, _| true).unwrap();
        assert!(second.id() > first.id());
        assert_eq!(controller.running_count(), 2);

        drop(first);
        assert_eq!(controller.running_count(), 1);

        controller.stop_all();
        assert!(!second.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_unknown_id_is_noop() {
        let controller = Controller::from_pattern("100=1", false).unwrap();
        let id = controller.start(|_, _, _| true).unwrap();

        controller.stop(ControllerId(999));
        assert!(controller.is_running(id));
    }
}
