//! The calling wrapper: marshal values into 64-byte aligned buffers,
//! call the entry point, read the result back.

use super::exec::KernelFn;
use super::value::Value;
use crate::types::Ty;

/// One argument or result buffer; large enough for any value.
#[repr(C, align(64))]
#[derive(Clone, Copy)]
struct Slot([u8; 64]);

impl Slot {
    fn zeroed() -> Self {
        Slot([0; 64])
    }
}

/// Call a kernel.
///
/// # Safety
///
/// `entry` must be a kernel whose parameters are exactly the types of
/// `args`, whose result is `ret`, and which was compiled for a feature
/// level the running CPU supports.
pub unsafe fn invoke(entry: KernelFn, args: &[Value], ret: Ty) -> Value {
    let slots: Vec<Slot> = args
        .iter()
        .map(|arg| {
            let mut slot = Slot::zeroed();
            arg.write_image(&mut slot.0);
            slot
        })
        .collect();
    let pointers: Vec<*const u8> = slots.iter().map(|s| s.0.as_ptr()).collect();
    let mut out = Slot::zeroed();
    entry(pointers.as_ptr(), out.0.as_mut_ptr());
    Value::read_image(ret, &out.0)
}
