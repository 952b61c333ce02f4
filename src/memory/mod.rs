//! Transfers & Staging
//!
//! Transaction-based host→device copies across queue families: a FIFO
//! staging ring, barrier synthesis with explicit release/acquire ownership
//! transfers, and timeline-semaphore sequencing per queue family.

mod buffer;
mod manager;
mod ring_pool;
mod transaction;

pub use buffer::{TransferBuffer, TransferImage};
pub use manager::TransferManager;
pub use ring_pool::{StagingPool, StagingSpan};
pub use transaction::{
    BarrierLocation, BufferBarrier, BufferToBufferCopy, ImageBarrier, ImageRegion,
    ImageToBufferCopy, StagingBufferCopy, StagingImageCopy, Transaction,
};
