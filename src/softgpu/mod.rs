mod commandlist;
mod device;
mod fence;
mod queue;

pub use self::commandlist::{ESoftCommand, SSoftCommandAllocator, SSoftCommandList};
pub use self::device::*;
pub use self::fence::SSoftFence;
pub use self::queue::{ERetireMode, SSoftCommandQueue, SSoftSubmission};
