//! Interned identifiers and qualified paths.
//!
//! Identifiers are interned once per compilation into an [`IdentPool`]; the
//! rest of the pipeline passes around copyable [`Ident`] handles and compares
//! them as integers. A [`Path`] is a sequence of idents naming a symbol
//! through its enclosing namespaces.

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Handle to an interned identifier string.
///
/// Only meaningful together with the pool that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Ident(u32);

impl Ident {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Per-compilation identifier interner.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdentPool {
    strings: IndexSet<String>,
}

impl IdentPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern a string, returning the existing handle if already present.
    pub fn get(&mut self, name: &str) -> Ident {
        if let Some(idx) = self.strings.get_index_of(name) {
            return Ident(idx as u32);
        }
        let (idx, _) = self.strings.insert_full(name.to_string());
        Ident(idx as u32)
    }

    /// Look up without interning.
    pub fn find(&self, name: &str) -> Option<Ident> {
        self.strings.get_index_of(name).map(|i| Ident(i as u32))
    }

    pub fn name(&self, ident: Ident) -> &str {
        self.strings
            .get_index(ident.index())
            .expect("ident from a different pool")
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }
}

/// Qualified name: one or more identifier segments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Path {
    segments: Vec<Ident>,
}

impl Path {
    pub fn new(segments: Vec<Ident>) -> Self {
        Self { segments }
    }

    pub fn single(ident: Ident) -> Self {
        Self {
            segments: vec![ident],
        }
    }

    pub fn segments(&self) -> &[Ident] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn is_unqualified(&self) -> bool {
        self.segments.len() == 1
    }

    /// The final segment.
    ///
    /// # Panics
    /// Panics on an empty path.
    pub fn leaf(&self) -> Ident {
        *self.segments.last().expect("empty path has no leaf")
    }

    pub fn first(&self) -> Ident {
        *self.segments.first().expect("empty path has no head")
    }

    /// Everything but the final segment.
    pub fn parent(&self) -> Path {
        Path {
            segments: self.segments[..self.segments.len().saturating_sub(1)].to_vec(),
        }
    }

    /// Everything but the first segment.
    pub fn tail(&self) -> Path {
        Path {
            segments: self.segments.get(1..).unwrap_or_default().to_vec(),
        }
    }

    pub fn child(&self, ident: Ident) -> Path {
        let mut segments = self.segments.clone();
        segments.push(ident);
        Path { segments }
    }

    /// Render through the pool as `a::b::c`.
    pub fn display(&self, pool: &IdentPool) -> String {
        let parts: Vec<&str> = self.segments.iter().map(|s| pool.name(*s)).collect();
        parts.join("::")
    }
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interning_is_idempotent() {
        let mut pool = IdentPool::new();
        let a = pool.get("gain");
        let b = pool.get("gain");
        let c = pool.get("phase");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(pool.name(a), "gain");
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn test_path_navigation() {
        let mut pool = IdentPool::new();
        let path = Path::new(vec![pool.get("dsp"), pool.get("filters"), pool.get("biquad")]);
        assert_eq!(pool.name(path.leaf()), "biquad");
        assert_eq!(path.parent().display(&pool), "dsp::filters");
        assert_eq!(path.tail().display(&pool), "filters::biquad");
        assert!(!path.is_unqualified());
        assert!(Path::single(pool.get("x")).is_unqualified());
    }
}
