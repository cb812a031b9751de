// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Echo Scheduler
//!
//! A deterministic tick-based task queue. The owner of the authoritative
//! simulation loop calls [`TickScheduler::advance`] exactly once per tick and
//! runs whatever comes back; nothing here spawns threads or sleeps.
//!
//! Tasks due on the same tick are returned in the order they were scheduled.
//! Repeating tasks are re-armed before being returned, so cancelling one from
//! inside its own handler takes effect immediately.
//!
//! [`drive`] is a thin tokio adapter that turns a wall-clock interval into a
//! stream of ticks for hosts that do not have their own loop.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use anyhow::Result;
use tokio::time;
use tracing::{debug, info, instrument};

/// Logical tick counter.
pub type Tick = u64;

/// Handle returned when scheduling; used for cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

impl TaskId {
    /// Raw sequence number (monotonic per scheduler).
    pub fn value(self) -> u64 {
        self.0
    }
}

#[derive(Debug)]
struct Entry<T> {
    id: TaskId,
    period: Option<Tick>,
    task: T,
}

/// Deterministic delayed/periodic task queue keyed by tick.
#[derive(Debug)]
pub struct TickScheduler<T> {
    now: Tick,
    next_id: u64,
    // (due tick, id) keeps same-tick ordering stable by scheduling order.
    queue: BTreeMap<(Tick, TaskId), Entry<T>>,
    due_of: HashMap<TaskId, Tick>,
}

impl<T> Default for TickScheduler<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> TickScheduler<T> {
    /// Creates an empty scheduler positioned at tick 0.
    pub fn new() -> Self {
        Self {
            now: 0,
            next_id: 0,
            queue: BTreeMap::new(),
            due_of: HashMap::new(),
        }
    }

    /// Current tick (the last tick returned by [`advance`](Self::advance)).
    pub fn now(&self) -> Tick {
        self.now
    }

    /// Number of pending tasks (one-shot and repeating).
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Returns true if `id` is still scheduled.
    pub fn is_scheduled(&self, id: TaskId) -> bool {
        self.due_of.contains_key(&id)
    }

    /// Schedules `task` to run once, `delay` ticks from now.
    ///
    /// A delay of 0 is treated as 1: work scheduled during a tick never runs
    /// in that same tick.
    pub fn schedule(&mut self, delay: Tick, task: T) -> TaskId {
        self.insert(delay.max(1), None, task)
    }

    /// Schedules `task` to first run after `initial_delay` ticks and then every
    /// `period` ticks until cancelled.
    pub fn schedule_repeating(&mut self, initial_delay: Tick, period: Tick, task: T) -> TaskId {
        self.insert(initial_delay.max(1), Some(period.max(1)), task)
    }

    /// Cancels a pending task. Returns false if it already ran or never existed.
    pub fn cancel(&mut self, id: TaskId) -> bool {
        match self.due_of.remove(&id) {
            Some(due) => self.queue.remove(&(due, id)).is_some(),
            None => false,
        }
    }

    fn insert(&mut self, delay: Tick, period: Option<Tick>, task: T) -> TaskId {
        let id = TaskId(self.next_id);
        self.next_id += 1;
        let due = self.now.saturating_add(delay);
        self.queue.insert((due, id), Entry { id, period, task });
        self.due_of.insert(id, due);
        id
    }
}

impl<T: Clone> TickScheduler<T> {
    /// Moves to the next tick and returns every task due on it, in scheduling
    /// order. Repeating tasks are re-armed for `now + period`.
    pub fn advance(&mut self) -> Vec<(TaskId, T)> {
        self.now += 1;
        let mut due = Vec::new();
        while let Some(entry) = self.queue.first_entry() {
            if entry.key().0 > self.now {
                break;
            }
            let entry = entry.remove();
            self.due_of.remove(&entry.id);
            if let Some(period) = entry.period {
                let next = self.now.saturating_add(period);
                self.due_of.insert(entry.id, next);
                self.queue.insert(
                    (next, entry.id),
                    Entry {
                        id: entry.id,
                        period: entry.period,
                        task: entry.task.clone(),
                    },
                );
            }
            due.push((entry.id, entry.task));
        }
        if !due.is_empty() {
            debug!(tick = self.now, count = due.len(), "tasks due");
        }
        due
    }
}

/// Drives `on_tick` from a wall-clock interval until it returns an error.
///
/// `on_tick` receives the 1-based tick number. Missed intervals are skipped
/// rather than bursted, so a slow tick never triggers a catch-up storm.
#[instrument(skip(on_tick))]
pub async fn drive<F>(period: Duration, mut on_tick: F) -> Result<()>
where
    F: FnMut(Tick) -> Result<()>,
{
    let mut interval = time::interval(period);
    interval.set_missed_tick_behavior(time::MissedTickBehavior::Skip);
    info!("tick driver started, period {:?}", period);

    let mut tick: Tick = 0;
    loop {
        interval.tick().await;
        tick += 1;
        on_tick(tick)?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_shot_runs_after_delay_exactly_once() {
        let mut sched = TickScheduler::new();
        sched.schedule(2, "a");
        assert!(sched.advance().is_empty());
        let due = sched.advance();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].1, "a");
        assert!(sched.advance().is_empty());
        assert_eq!(sched.pending(), 0);
    }

    #[test]
    fn zero_delay_never_runs_in_the_current_tick() {
        let mut sched = TickScheduler::new();
        sched.schedule(0, 1);
        assert_eq!(sched.now(), 0);
        let due = sched.advance();
        assert_eq!(due.len(), 1);
        assert_eq!(sched.now(), 1);
    }

    #[test]
    fn same_tick_tasks_keep_scheduling_order() {
        let mut sched = TickScheduler::new();
        sched.schedule(3, "first");
        sched.schedule(1, "early");
        sched.schedule(3, "second");
        sched.schedule(3, "third");

        assert_eq!(sched.advance().len(), 1);
        assert!(sched.advance().is_empty());
        let names: Vec<_> = sched.advance().into_iter().map(|(_, t)| t).collect();
        assert_eq!(names, vec!["first", "second", "third"]);
    }

    #[test]
    fn repeating_task_fires_on_period() {
        let mut sched = TickScheduler::new();
        let id = sched.schedule_repeating(2, 3, "scan");
        let fired: Vec<Tick> = (0..10)
            .filter_map(|_| {
                let due = sched.advance();
                (!due.is_empty()).then(|| sched.now())
            })
            .collect();
        assert_eq!(fired, vec![2, 5, 8]);
        assert!(sched.is_scheduled(id));
    }

    #[test]
    fn cancel_removes_pending_and_repeating_tasks() {
        let mut sched = TickScheduler::new();
        let once = sched.schedule(1, 'o');
        let rep = sched.schedule_repeating(1, 1, 'r');
        assert!(sched.cancel(once));
        assert!(!sched.cancel(once));

        assert_eq!(sched.advance().len(), 1);
        assert!(sched.cancel(rep));
        assert!(sched.advance().is_empty());
        assert!(!sched.is_scheduled(rep));
    }

    #[tokio::test(start_paused = true)]
    async fn drive_stops_on_first_error() {
        let mut seen = Vec::new();
        let result = drive(Duration::from_millis(50), |tick| {
            seen.push(tick);
            if tick == 3 {
                anyhow::bail!("stop");
            }
            Ok(())
        })
        .await;
        assert!(result.is_err());
        assert_eq!(seen, vec![1, 2, 3]);
    }
}
