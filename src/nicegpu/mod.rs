mod commandlistring;
mod constantbuffer;
mod descriptorallocator;
mod fence;

use crate::collections::{SPool, SPoolHandle};
use crate::errors::{EGPUError, SResult};
use crate::safesync::SEventHandle;
use crate::typeygpu::*;

pub use self::commandlistring::SCommandListRing;
pub use self::constantbuffer::{SConstantBufferArray, CONSTANT_BUFFER_ALIGNMENT};
pub use self::descriptorallocator::*;
pub use self::fence::{EWaitResult, SFence};
