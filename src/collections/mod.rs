pub mod pool;

pub use self::pool::{SPool, SPoolHandle, TIndexGen};
