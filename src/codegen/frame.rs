//! Stack frame layout.
//!
//! The prologue aligns `rsp` down to 64 bytes, so a slot at an aligned
//! offset from `rsp` is aligned in memory too. Spill slots are recycled
//! by exact size; variable homes live for the whole kernel.

use std::collections::HashMap;

use crate::lir::{Base, Gpr, Mem};
use crate::types::Ty;

#[derive(Default)]
pub struct Frame {
    size: u32,
    /// Released spill slots: offset and size.
    free: Vec<(u32, u32)>,
    /// Live spill slots by offset.
    temps: HashMap<u32, u32>,
}

impl Frame {
    pub fn new() -> Self {
        Self::default()
    }

    fn bump(&mut self, size: u32, align: u32) -> u32 {
        let offset = self.size.next_multiple_of(align.max(1));
        self.size = offset + size;
        offset
    }

    /// A permanent slot (variable home, snapshot, return slot).
    pub fn home(&mut self, ty: Ty) -> Mem {
        let offset = self.bump(ty.slot_size(), ty.stack_align().min(64));
        Mem::at(Gpr::RSP, offset as i32)
    }

    /// A spill slot, reusable once released.
    pub fn temp(&mut self, ty: Ty) -> Mem {
        let size = ty.slot_size();
        let align = ty.stack_align().min(64);
        let reuse = self
            .free
            .iter()
            .position(|&(offset, s)| s == size && offset % align == 0);
        let offset = match reuse {
            Some(i) => self.free.swap_remove(i).0,
            None => self.bump(size, align),
        };
        self.temps.insert(offset, size);
        Mem::at(Gpr::RSP, offset as i32)
    }

    /// Give back a spill slot; any other address is ignored.
    pub fn release(&mut self, mem: Mem) {
        if mem.base != Base::Gpr(Gpr::RSP) || mem.disp < 0 {
            return;
        }
        let offset = mem.disp as u32;
        if let Some(size) = self.temps.remove(&offset) {
            self.free.push((offset, size));
        }
    }

    pub fn is_temp(&self, mem: Mem) -> bool {
        mem.base == Base::Gpr(Gpr::RSP) && mem.disp >= 0 && self.temps.contains_key(&(mem.disp as u32))
    }

    /// Bytes to reserve below the aligned `rsp`.
    pub fn size(&self) -> u32 {
        self.size.next_multiple_of(64)
    }
}
