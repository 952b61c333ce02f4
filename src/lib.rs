#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::too_many_arguments)]

pub mod errors;
pub mod gpu;
pub mod material;
pub mod memory;
pub mod render;
pub mod scene;
pub mod task;

pub use errors::{HeliosError, Result};
pub use material::{
    ComputeMaterialManager, GraphicsMaterialManager, MaterialLayout, PipelineCache,
    RayTracingMaterialManager,
};
pub use memory::{StagingPool, Transaction, TransferBuffer, TransferImage, TransferManager};
pub use render::{
    ComputeRenderData, ComputeTraverser, GraphicsRenderData, GraphicsTraverser, Mesh,
    RayTracingRenderData, RayTracingTraverser, TraversalAction,
};
pub use scene::{ChildAction, NodeKey, NodeKind, SceneGraph};
pub use task::TaskGraph;
