#![forbid(unsafe_code)]

//! Cooperative task queue.
//!
//! Stands in for a host's "run later" primitive (a microtask queue, an idle
//! callback). Work is only executed when the owner drains the queue with
//! [`TaskQueue::run_until_idle`], which makes deferred behavior
//! deterministic in tests.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

use tracing::trace;

/// Unit of deferred work.
pub type Task = Box<dyn FnOnce()>;

/// FIFO of deferred tasks. Clones share the same queue.
#[derive(Clone, Default)]
pub struct TaskQueue {
    tasks: Rc<RefCell<VecDeque<Task>>>,
}

impl TaskQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `task` behind everything already scheduled.
    pub fn schedule(&self, task: impl FnOnce() + 'static) {
        self.schedule_boxed(Box::new(task));
    }

    pub fn schedule_boxed(&self, task: Task) {
        self.tasks.borrow_mut().push_back(task);
    }

    /// Run queued tasks, including ones they schedule, until the queue is
    /// empty. Returns the number of tasks run.
    pub fn run_until_idle(&self) -> usize {
        let mut ran = 0;
        loop {
            let next = self.tasks.borrow_mut().pop_front();
            let Some(task) = next else {
                break;
            };
            task();
            ran += 1;
        }
        if ran > 0 {
            trace!(ran, "task queue drained");
        }
        ran
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.borrow().is_empty()
    }

    /// A scheduling callback that feeds this queue.
    #[must_use]
    pub fn scheduler(&self) -> Rc<dyn Fn(Task)> {
        let queue = self.clone();
        Rc::new(move |task: Task| queue.schedule_boxed(task))
    }
}

impl fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskQueue")
            .field("pending", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn runs_in_fifo_order() {
        let queue = TaskQueue::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        for i in 0..3 {
            let l = Rc::clone(&log);
            queue.schedule(move || l.borrow_mut().push(i));
        }
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.run_until_idle(), 3);
        assert_eq!(*log.borrow(), vec![0, 1, 2]);
        assert!(queue.is_empty());
    }

    #[test]
    fn tasks_scheduled_while_draining_also_run() {
        let queue = TaskQueue::new();
        let count = Rc::new(Cell::new(0));
        let q = queue.clone();
        let c = Rc::clone(&count);
        queue.schedule(move || {
            c.set(c.get() + 1);
            let c = Rc::clone(&c);
            q.schedule(move || c.set(c.get() + 1));
        });
        assert_eq!(queue.run_until_idle(), 2);
        assert_eq!(count.get(), 2);
    }

    #[test]
    fn scheduler_feeds_queue() {
        let queue = TaskQueue::new();
        let schedule = queue.scheduler();
        let hit = Rc::new(Cell::new(false));
        let h = Rc::clone(&hit);
        schedule(Box::new(move || h.set(true)));
        assert!(!hit.get());
        queue.run_until_idle();
        assert!(hit.get());
    }
}
