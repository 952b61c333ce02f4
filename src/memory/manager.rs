//! The transfer manager: per-family command buffers, timeline semaphores and
//! the serialization point for transactions.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::errors::Result;
use crate::gpu::{CommandBuffer, Device, GPU_WAIT_TIMEOUT, TimelineSemaphore};
use crate::memory::ring_pool::{StagingPool, StagingSpan};
use crate::memory::transaction::Transaction;

#[derive(Debug)]
pub(crate) struct ManagerState {
    /// High-watermark per queue family, mirroring the timeline semaphores.
    pub values: Vec<u64>,
    /// Index of the most recently committed transaction.
    pub transaction_index: u64,
    /// Staging spans of dropped transactions, reclaimed on the next full
    /// wait.
    pub pending_reclaim: Vec<StagingSpan>,
}

/// Coordinates staged copies across queue families.
///
/// One timeline semaphore and one set of release/acquire command buffers per
/// family; a single mutex serializes transactions while `begin`, `commit`
/// and `wait` stay callable from any thread.
#[derive(Debug)]
pub struct TransferManager {
    device: Arc<Device>,
    pool: StagingPool,
    pub(crate) pre_release_cmds: Vec<Arc<CommandBuffer>>,
    pub(crate) pre_acquire_cmds: Vec<Arc<CommandBuffer>>,
    pub(crate) post_release_cmds: Vec<Arc<CommandBuffer>>,
    pub(crate) post_acquire_cmds: Vec<Arc<CommandBuffer>>,
    pub(crate) copy_cmd: Arc<CommandBuffer>,
    semaphores: Vec<Arc<TimelineSemaphore>>,
    pub(crate) state: Mutex<ManagerState>,
}

impl TransferManager {
    /// Create a manager with a staging pool of `staging_capacity` bytes.
    pub fn new(device: Arc<Device>, staging_capacity: u64) -> Result<Arc<Self>> {
        let pool = StagingPool::new(&device, staging_capacity)?;
        let family_count = device.queue_families().len();

        let mut pre_release_cmds = Vec::with_capacity(family_count);
        let mut pre_acquire_cmds = Vec::with_capacity(family_count);
        let mut post_release_cmds = Vec::with_capacity(family_count);
        let mut post_acquire_cmds = Vec::with_capacity(family_count);
        let mut semaphores = Vec::with_capacity(family_count);
        let mut copy_cmd = None;
        for family in 0..family_count as u32 {
            let cmd_pool = device.create_command_pool(family)?;
            pre_release_cmds.push(device.create_command_buffer(&cmd_pool));
            pre_acquire_cmds.push(device.create_command_buffer(&cmd_pool));
            post_release_cmds.push(device.create_command_buffer(&cmd_pool));
            post_acquire_cmds.push(device.create_command_buffer(&cmd_pool));
            if family == device.transfer_family_index() {
                copy_cmd = Some(device.create_command_buffer(&cmd_pool));
            }
            semaphores.push(device.create_timeline_semaphore(0));
        }

        Ok(Arc::new(Self {
            device,
            pool,
            pre_release_cmds,
            pre_acquire_cmds,
            post_release_cmds,
            post_acquire_cmds,
            copy_cmd: copy_cmd.expect("device validates its transfer family"),
            semaphores,
            state: Mutex::new(ManagerState {
                values: vec![0; family_count],
                transaction_index: 0,
                pending_reclaim: Vec::new(),
            }),
        }))
    }

    #[must_use]
    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    #[must_use]
    pub fn staging_pool(&self) -> &StagingPool {
        &self.pool
    }

    /// The per-family timeline semaphores, indexable by queue family.
    #[must_use]
    pub fn semaphores(&self) -> &[Arc<TimelineSemaphore>] {
        &self.semaphores
    }

    /// Snapshot of the per-family high-watermark values.
    #[must_use]
    pub fn semaphore_values(&self) -> Vec<u64> {
        self.state.lock().values.clone()
    }

    /// Begin a new transaction against this manager.
    #[must_use]
    pub fn begin(self: &Arc<Self>) -> Transaction {
        Transaction::new(self.clone())
    }

    /// Wait for all committed work and reclaim parked staging spans.
    pub fn wait(&self) -> Result<()> {
        let mut state = self.state.lock();
        self.wait_locked(&mut state)
    }

    pub(crate) fn wait_locked(&self, state: &mut ManagerState) -> Result<()> {
        self.device
            .wait_semaphores(&self.semaphores, &state.values, GPU_WAIT_TIMEOUT)?;
        for span in state.pending_reclaim.drain(..) {
            self.pool.release(span);
        }
        Ok(())
    }
}
