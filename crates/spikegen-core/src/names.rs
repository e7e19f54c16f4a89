//! Process-unique code object names.

use std::collections::HashSet;
use std::sync::{Mutex, OnceLock, PoisonError};

/// Tracks names already handed out.
#[derive(Debug, Default)]
pub struct NameRegistry {
    taken: HashSet<String>,
}

impl NameRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve a unique name derived from `base`.
    ///
    /// A trailing `*` means "always append a number": `neurons*` yields
    /// `neurons_1`, `neurons_2`, ... while `neurons` yields `neurons` first and
    /// numbered names only on collision.
    pub fn find_name(&mut self, base: &str) -> String {
        let (stem, always_number) = match base.strip_suffix('*') {
            Some(stem) => (stem, true),
            None => (base, false),
        };
        if !always_number && self.taken.insert(stem.to_string()) {
            return stem.to_string();
        }
        let mut n = 1usize;
        loop {
            let candidate = format!("{stem}_{n}");
            if self.taken.insert(candidate.clone()) {
                return candidate;
            }
            n += 1;
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.taken.contains(name)
    }

    /// Forget every reserved name.
    pub fn clear(&mut self) {
        self.taken.clear();
    }
}

fn global() -> &'static Mutex<NameRegistry> {
    static REGISTRY: OnceLock<Mutex<NameRegistry>> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(NameRegistry::new()))
}

/// Reserve a name in the process-wide registry.
pub fn find_name(base: &str) -> String {
    global()
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .find_name(base)
}
