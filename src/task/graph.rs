use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::errors::{HeliosError, Result};
use crate::task::resources::FrameCursor;

/// A unit of per-frame work. Tasks run to completion on the frame driver
/// thread; none of them suspend.
pub trait Task: Send {
    fn name(&self) -> &str;

    fn run(&mut self) -> Result<()>;
}

/// Handle of a task within its graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskId(pub(crate) usize);

struct TaskNode {
    task: Box<dyn Task>,
    /// Decremented by each completed dependency during a pass; purely a
    /// validation artifact of the DAG, not a scheduler signal.
    wait: AtomicU32,
    wait_count: u32,
    notify: Vec<usize>,
    dependencies: Vec<usize>,
}

/// A DAG of per-frame tasks with frame-indexed resource indirection.
///
/// Execution is single-threaded cooperative: tasks run sequentially in a
/// precomputed topological order. `frame_index` cycles through
/// `[0, max_frames)`; `image_index` is written by the acquire task.
pub struct TaskGraph {
    nodes: Vec<TaskNode>,
    order: Vec<usize>,
    finalized: bool,
    max_frames: u32,
    frame_index: FrameCursor,
    image_index: FrameCursor,
}

impl TaskGraph {
    pub fn new(max_frames: u32) -> Result<Self> {
        if max_frames == 0 {
            return Err(HeliosError::InvalidState(
                "task graph needs at least one frame in flight",
            ));
        }
        Ok(Self {
            nodes: Vec::new(),
            order: Vec::new(),
            finalized: false,
            max_frames,
            frame_index: Arc::new(AtomicU32::new(0)),
            image_index: Arc::new(AtomicU32::new(0)),
        })
    }

    #[must_use]
    pub const fn max_frames(&self) -> u32 {
        self.max_frames
    }

    /// The shared frame cursor, for wiring up frame-indexed resources.
    #[must_use]
    pub fn frame_cursor(&self) -> FrameCursor {
        self.frame_index.clone()
    }

    /// The shared image cursor, written by the acquire task.
    #[must_use]
    pub fn image_cursor(&self) -> FrameCursor {
        self.image_index.clone()
    }

    #[must_use]
    pub fn frame_index(&self) -> u32 {
        self.frame_index.load(Ordering::Acquire)
    }

    // ========================================================================
    // Construction
    // ========================================================================

    pub fn add_task(&mut self, task: Box<dyn Task>) -> Result<TaskId> {
        if self.finalized {
            return Err(HeliosError::InvalidState(
                "cannot add tasks to a finalized task graph",
            ));
        }
        self.nodes.push(TaskNode {
            task,
            wait: AtomicU32::new(0),
            wait_count: 0,
            notify: Vec::new(),
            dependencies: Vec::new(),
        });
        Ok(TaskId(self.nodes.len() - 1))
    }

    /// Declare that `task` runs only after all of `dependencies`.
    pub fn depends_on(&mut self, task: TaskId, dependencies: &[TaskId]) -> Result<()> {
        if self.finalized {
            return Err(HeliosError::InvalidState(
                "cannot add dependencies to a finalized task graph",
            ));
        }
        if task.0 >= self.nodes.len() || dependencies.iter().any(|d| d.0 >= self.nodes.len()) {
            return Err(HeliosError::IncompatibleArgument(
                "task does not belong to this graph",
            ));
        }
        for dependency in dependencies {
            if !self.nodes[task.0].dependencies.contains(&dependency.0) {
                self.nodes[task.0].dependencies.push(dependency.0);
            }
        }
        Ok(())
    }

    /// Compute wait counts and the topological execution order; rejects
    /// cyclic graphs.
    pub fn finalize(&mut self) -> Result<()> {
        if self.finalized {
            return Err(HeliosError::InvalidState("task graph was already finalized"));
        }

        for index in 0..self.nodes.len() {
            let dependencies = self.nodes[index].dependencies.clone();
            self.nodes[index].wait_count = dependencies.len() as u32;
            for dependency in dependencies {
                self.nodes[dependency].notify.push(index);
            }
        }

        // Kahn's algorithm; ties resolve in insertion order.
        let mut indegree: Vec<u32> = self.nodes.iter().map(|n| n.wait_count).collect();
        let mut ready: VecDeque<usize> = (0..self.nodes.len())
            .filter(|&i| indegree[i] == 0)
            .collect();
        self.order.clear();
        while let Some(index) = ready.pop_front() {
            self.order.push(index);
            for &next in &self.nodes[index].notify {
                indegree[next] -= 1;
                if indegree[next] == 0 {
                    ready.push_back(next);
                }
            }
        }
        if self.order.len() != self.nodes.len() {
            return Err(HeliosError::InvalidState("task graph contains a cycle"));
        }

        log::debug!("finalized task graph with {} tasks", self.nodes.len());
        self.finalized = true;
        Ok(())
    }

    // ========================================================================
    // Execution
    // ========================================================================

    /// Run every task once, in dependency order. The first failing task
    /// aborts the frame; the remaining tasks are skipped and the error is
    /// reported up.
    pub fn execute_frame(&mut self) -> Result<()> {
        if !self.finalized {
            return Err(HeliosError::InvalidState(
                "task graph must be finalized before execution",
            ));
        }
        for node in &self.nodes {
            node.wait.store(node.wait_count, Ordering::Release);
        }
        for index in 0..self.order.len() {
            let current = self.order[index];
            debug_assert_eq!(
                self.nodes[current].wait.load(Ordering::Acquire),
                0,
                "task executed before its dependencies completed"
            );
            if let Err(error) = self.nodes[current].task.run() {
                log::warn!(
                    "task '{}' failed, aborting frame {}: {error}",
                    self.nodes[current].task.name(),
                    self.frame_index(),
                );
                return Err(error);
            }
            for &next in &self.nodes[current].notify {
                self.nodes[next].wait.fetch_sub(1, Ordering::AcqRel);
            }
        }
        Ok(())
    }

    /// Advance the frame cursor to the next slot.
    pub fn advance_frame(&self) {
        let next = (self.frame_index.load(Ordering::Acquire) + 1) % self.max_frames;
        self.frame_index.store(next, Ordering::Release);
    }
}
