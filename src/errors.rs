use thiserror::Error;

pub type SResult<T> = Result<T, EGPUError>;

#[derive(Clone, Debug, Error, PartialEq)]
pub enum EGPUError {
    // -- the device or queue refused an operation. Never continue after one of these.
    #[error("device failure: {0}")]
    Device(&'static str),
    #[error("{0} exhausted")]
    Exhausted(&'static str),
    #[error("out of host memory reserving {0}")]
    OutOfMemory(&'static str),
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    #[error("frame resource {0} reused before the GPU retired it")]
    ReuseInFlight(usize),
    #[error("frame resource {0} is already being recorded")]
    ConcurrentWrite(usize),
}

impl EGPUError {
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Device(_) | Self::ReuseInFlight(_) | Self::ConcurrentWrite(_) => true,
            Self::Exhausted(_) | Self::OutOfMemory(_) | Self::InvalidArgument(_) => false,
        }
    }
}

// -- process-level exit for errors that leave GPU state untrustworthy
pub fn fatal(err: &EGPUError) -> ! {
    log::error!("fatal GPU error, aborting: {}", err);
    log::logger().flush();
    std::process::abort();
}
