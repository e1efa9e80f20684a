//! Constant pool: literal images referenced RIP-relative.

use std::collections::HashMap;

use crate::ast::Literal;
use crate::lir::{ConstData, ConstId, Mem};
use crate::types::{Elem, Ty};

#[derive(Default)]
pub struct ConstPool {
    entries: Vec<ConstData>,
    index: HashMap<(Vec<u8>, u32), ConstId>,
}

impl ConstPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern raw bytes; identical images share one entry.
    pub fn intern(&mut self, bytes: Vec<u8>, align: u32) -> Mem {
        let key = (bytes, align);
        if let Some(id) = self.index.get(&key) {
            return Mem::constant(*id);
        }
        let id = ConstId(self.entries.len() as u32);
        self.entries.push(ConstData {
            bytes: key.0.clone(),
            align,
        });
        self.index.insert(key, id);
        Mem::constant(id)
    }

    /// `lit` converted to `ty`'s element, replicated over the whole slot
    /// so that the image also serves as a broadcast source.
    pub fn literal(&mut self, lit: Literal, ty: Ty) -> Mem {
        self.splat(&literal_bytes(lit, ty.elem), ty)
    }

    /// A raw element bit pattern replicated over `ty`'s slot.
    pub fn bits(&mut self, bits: u64, ty: Ty) -> Mem {
        let elem = &bits.to_le_bytes()[..ty.elem_bytes() as usize];
        self.splat(elem, ty)
    }

    fn splat(&mut self, elem: &[u8], ty: Ty) -> Mem {
        let size = ty.slot_size() as usize;
        let bytes: Vec<u8> = elem.iter().copied().cycle().take(size).collect();
        self.intern(bytes, ty.slot_size().min(64))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn into_data(self) -> Vec<ConstData> {
        self.entries
    }
}

/// Little-endian image of one element.
pub fn literal_bytes(lit: Literal, elem: Elem) -> Vec<u8> {
    let float = match lit {
        Literal::Float(f) => f,
        Literal::Integer(i) => i as f64,
    };
    let int = match lit {
        Literal::Integer(i) => i,
        Literal::Float(f) => f as i128,
    };
    match elem {
        Elem::F32 => (float as f32).to_le_bytes().to_vec(),
        Elem::F64 => float.to_le_bytes().to_vec(),
        Elem::I32 => (int as u32).to_le_bytes().to_vec(),
        Elem::I64 => (int as u64).to_le_bytes().to_vec(),
    }
}
