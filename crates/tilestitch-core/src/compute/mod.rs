mod backend;
pub mod cpu;
pub mod device;
pub mod pool;

pub use backend::{create_provider, Scratch, TransformBuffer, TransformProvider};
pub use pool::{BufferPool, DeviceAllocator, HostAllocator, PoolSlot};
