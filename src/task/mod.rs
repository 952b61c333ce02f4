//! Frame Task Graph
//!
//! A DAG of tasks executed once per frame on the driver thread: traversal,
//! command recording, submission, presentation and the synchronization
//! between them. Parallelism comes from the GPU queues the tasks submit to
//! and from overlapping frames, not from threading the tasks themselves.

mod graph;
mod resources;
mod tasks;

pub use graph::{Task, TaskGraph, TaskId};
pub use resources::{FilteredList, FrameCursor, Indexed, IndexedList, Single};
pub use tasks::{
    AcquireTask, ComputeRenderTask, ComputeTraverseTask, FenceAction, FenceTask, FunctionTask,
    GraphicsRenderTask, GraphicsTraverseTask, PresentTask, RayTracingRenderTask,
    RayTracingTraverseTask, SubmitTask, UpdateGraphicsMaterialDataTask,
};
