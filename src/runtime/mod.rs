//! Running compiled kernels: executable memory, host values and the
//! calling wrapper.
//!
//! Every kernel shares one entry signature,
//! `fn(args: *const *const u8, ret: *mut u8)`. Each argument pointer
//! addresses a 64-byte aligned buffer holding the value in its
//! `stack_size` layout, and the kernel writes its result through `ret`.

mod call;
mod exec;
mod value;

pub use call::invoke;
pub use exec::{ExecutableBuffer, KernelFn};
pub use value::{Lanes, TypeError, Value};
