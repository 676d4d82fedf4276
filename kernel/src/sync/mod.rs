pub mod intr;
pub mod semaphore;
pub mod spinlock;

pub use self::semaphore::Semaphore;
pub use self::spinlock::{SpinLock, SpinLockGuard};
