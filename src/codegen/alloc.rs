//! Physical register pools.
//!
//! Every register is free, a temporary owned by exactly one in-flight
//! value, or a cached copy of a variable whose home slot is always up to
//! date. Cached copies can be dropped at any time, so they are the
//! eviction candidates when a pool runs dry; a cached register handed out
//! to the current statement is pinned until the statement ends.

use std::collections::{HashMap, HashSet};

use super::operand::Val;
use crate::diagnostic::Diagnostic;
use crate::lir::{Gpr, KReg, Reg, VReg};
use crate::span::Span;
use crate::types::{RegClass, Width};

/// Caller-saved GPRs that are never arguments (rdi, rsi) or the frame.
const GPR_POOL: [Gpr; 7] = [
    Gpr::RAX,
    Gpr::RCX,
    Gpr::RDX,
    Gpr::R8,
    Gpr::R9,
    Gpr::R10,
    Gpr::R11,
];
const VEC_REGS: u8 = 16;
/// k0 means "no mask" in EVEX encodings.
const K_REGS: std::ops::Range<u8> = 1..8;

#[derive(Clone, Debug, PartialEq, Eq)]
enum Owner {
    Free,
    Temp,
    Var(String),
}

/// Width-independent register identity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
enum Key {
    Gpr(u8),
    Vec(u8),
    K(u8),
}

fn key(reg: Reg) -> Key {
    match reg {
        Reg::Gpr(g) => Key::Gpr(g.0),
        Reg::Vec(v) => Key::Vec(v.idx),
        Reg::K(k) => Key::K(k.0),
    }
}

pub struct RegAlloc {
    owners: HashMap<Key, Owner>,
    pinned: HashSet<Key>,
    cache: HashMap<String, Val>,
}

impl Default for RegAlloc {
    fn default() -> Self {
        Self::new()
    }
}

impl RegAlloc {
    pub fn new() -> Self {
        let mut owners = HashMap::new();
        for g in GPR_POOL {
            owners.insert(Key::Gpr(g.0), Owner::Free);
        }
        for v in 0..VEC_REGS {
            owners.insert(Key::Vec(v), Owner::Free);
        }
        for k in K_REGS {
            owners.insert(Key::K(k), Owner::Free);
        }
        Self {
            owners,
            pinned: HashSet::new(),
            cache: HashMap::new(),
        }
    }

    /// Take a free register of `class`, evicting a cached variable if the
    /// pool is exhausted. `context` names the operation in the error.
    pub fn alloc(&mut self, class: RegClass, context: &str) -> Result<Reg, Diagnostic> {
        if let Some(reg) = self.find_free(class) {
            self.owners.insert(key(reg), Owner::Temp);
            return Ok(reg);
        }
        if self.evict(class) {
            if let Some(reg) = self.find_free(class) {
                self.owners.insert(key(reg), Owner::Temp);
                return Ok(reg);
            }
        }
        Err(Diagnostic::error(
            format!("register exhaustion ({}) while compiling {}", class, context),
            Span::dummy(),
        )
        .with_help("split the expression into smaller assignments".to_string()))
    }

    pub fn alloc_vec(&mut self, width: Width, context: &str) -> Result<VReg, Diagnostic> {
        match self.alloc(RegClass::Vec(width), context)? {
            Reg::Vec(v) => Ok(v),
            other => Err(mismatch(other)),
        }
    }

    pub fn alloc_gpr(&mut self, context: &str) -> Result<Gpr, Diagnostic> {
        match self.alloc(RegClass::Gpr, context)? {
            Reg::Gpr(g) => Ok(g),
            other => Err(mismatch(other)),
        }
    }

    pub fn alloc_k(&mut self, context: &str) -> Result<KReg, Diagnostic> {
        match self.alloc(RegClass::K, context)? {
            Reg::K(k) => Ok(k),
            other => Err(mismatch(other)),
        }
    }

    fn find_free(&self, class: RegClass) -> Option<Reg> {
        let free = |k: Key| self.owners.get(&k) == Some(&Owner::Free);
        match class {
            RegClass::Gpr => GPR_POOL
                .iter()
                .find(|g| free(Key::Gpr(g.0)))
                .map(|g| Reg::Gpr(*g)),
            RegClass::Vec(w) => (0..VEC_REGS)
                .find(|&i| free(Key::Vec(i)))
                .map(|i| Reg::Vec(VReg::new(i, w))),
            RegClass::K => K_REGS.clone().find(|&i| free(Key::K(i))).map(|i| Reg::K(KReg(i))),
        }
    }

    /// Drop one cached variable that holds a register of `class` and has
    /// nothing pinned.
    fn evict(&mut self, class: RegClass) -> bool {
        let same_class = |reg: &Reg| {
            matches!(
                (reg, class),
                (Reg::Gpr(_), RegClass::Gpr) | (Reg::Vec(_), RegClass::Vec(_)) | (Reg::K(_), RegClass::K)
            )
        };
        let mut names: Vec<&String> = self.cache.keys().collect();
        names.sort();
        let victim = names.into_iter().find(|name| {
            let regs = self.cache[*name].regs();
            regs.iter().any(same_class) && regs.iter().all(|r| !self.pinned.contains(&key(*r)))
        });
        match victim.cloned() {
            Some(name) => {
                self.uncache(&name);
                true
            }
            None => false,
        }
    }

    /// Release a register if it is a temporary. Cached variable registers
    /// stay with their variable. Releasing a free register is a bug in the
    /// caller.
    pub fn free(&mut self, reg: Reg) {
        let k = key(reg);
        debug_assert!(
            self.owners.get(&k) != Some(&Owner::Free),
            "{} released twice",
            reg
        );
        if self.owners.get(&k) == Some(&Owner::Temp) {
            self.owners.insert(k, Owner::Free);
        }
    }

    pub fn free_all(&mut self, regs: &[Reg]) {
        for r in regs {
            self.free(*r);
        }
    }

    /// Whether the register may be overwritten by the operation consuming
    /// it: only temporaries are, since nothing else reads them.
    pub fn can_destruct(&self, reg: Reg) -> bool {
        let k = key(reg);
        self.owners.get(&k) == Some(&Owner::Temp) && !self.pinned.contains(&k)
    }

    pub fn is_free(&self, reg: Reg) -> bool {
        self.owners.get(&key(reg)) == Some(&Owner::Free)
    }

    pub fn pin(&mut self, reg: Reg) {
        self.pinned.insert(key(reg));
    }

    pub fn clear_pins(&mut self) {
        self.pinned.clear();
    }

    // ─── Variable cache ───────────────────────────────────────────

    pub fn cached(&self, name: &str) -> Option<&Val> {
        self.cache.get(name)
    }

    /// Hand the temporaries of `val` over to variable `name`.
    pub fn cache(&mut self, name: &str, val: Val) {
        self.uncache(name);
        for r in val.regs() {
            self.owners.insert(key(r), Owner::Var(name.to_string()));
        }
        self.cache.insert(name.to_string(), val);
    }

    pub fn uncache(&mut self, name: &str) {
        if let Some(val) = self.cache.remove(name) {
            for r in val.regs() {
                let k = key(r);
                if self.owners.get(&k) == Some(&Owner::Var(name.to_string())) {
                    self.owners.insert(k, Owner::Free);
                }
                self.pinned.remove(&k);
            }
        }
    }

    /// Forget every cached variable (at labels and after home rewrites).
    pub fn flush(&mut self) {
        let names: Vec<String> = self.cache.keys().cloned().collect();
        for name in names {
            self.uncache(&name);
        }
    }

    /// Number of registers currently held by temporaries.
    pub fn live_temps(&self) -> usize {
        self.owners.values().filter(|o| **o == Owner::Temp).count()
    }
}

fn mismatch(reg: Reg) -> Diagnostic {
    Diagnostic::error(
        format!("internal error: allocator returned {} for the wrong class", reg),
        Span::dummy(),
    )
}
