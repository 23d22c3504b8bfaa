// Capture analysis: which names a function binds itself and which it pulls
// from an enclosing function. Environments are threaded through the pass by
// value; every operation returns the updated environment.

use indexmap::IndexMap;

use super::{InstrumentError, TransformResult};
use crate::ast::Span;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binding {
    /// Bound by `let`, a parameter or a function declaration in this function
    Local,
    /// Referenced here but bound by an enclosing function
    Captured,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Entry {
    binding: Binding,
    span: Span,
}

/// Names visible in the function being rewritten. Insertion order is the
/// order of first binding or first use, which fixes the field order of
/// closure records.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CaptureEnv {
    entries: IndexMap<String, Entry>,
}

impl CaptureEnv {
    pub fn new() -> Self {
        Self::default()
    }

    /// The environment a function body starts with: only its parameters.
    pub fn for_function(params: &[String], span: Span) -> Self {
        params
            .iter()
            .fold(Self::new(), |env, param| env.bind(param, span))
    }

    pub fn lookup(&self, name: &str) -> Option<Binding> {
        self.entries.get(name).map(|entry| entry.binding)
    }

    /// Bind `name` locally. A capture of the same name is shadowed until
    /// [`CaptureEnv::leave_scope`] restores it.
    pub fn bind(mut self, name: &str, span: Span) -> Self {
        let local = Entry {
            binding: Binding::Local,
            span,
        };
        match self.entries.get_mut(name) {
            Some(entry) if entry.binding == Binding::Captured => *entry = local,
            Some(_) => {}
            None => {
                self.entries.insert(name.to_string(), local);
            }
        }
        self
    }

    /// Classify a reference, recording a new capture when the name is not
    /// visible yet.
    pub fn resolve(mut self, name: &str, span: Span) -> (Binding, Self) {
        if let Some(binding) = self.lookup(name) {
            return (binding, self);
        }
        self.entries.insert(
            name.to_string(),
            Entry {
                binding: Binding::Captured,
                span,
            },
        );
        (Binding::Captured, self)
    }

    /// Leave a nested block: names visible in `outer` go back to how
    /// `outer` saw them and captures first made inside the block are kept.
    pub fn leave_scope(self, outer: &CaptureEnv) -> Self {
        let mut entries = outer.entries.clone();
        for (name, entry) in self.entries {
            if entry.binding == Binding::Captured && !entries.contains_key(&name) {
                entries.insert(name, entry);
            }
        }
        Self { entries }
    }

    /// Join the environments leaving two branches of a conditional.
    pub fn merge(mut self, other: CaptureEnv) -> TransformResult<Self> {
        for (name, entry) in other.entries {
            match self.entries.get(&name) {
                Some(existing) if existing.binding != entry.binding => {
                    return Err(InstrumentError::CaptureConflict {
                        name,
                        span: entry.span,
                    });
                }
                Some(_) => {}
                None => {
                    self.entries.insert(name, entry);
                }
            }
        }
        Ok(self)
    }

    /// Drop `name` if this function captured it, reporting whether it did.
    pub fn forget_capture(mut self, name: &str) -> (Self, bool) {
        let captured = self.lookup(name) == Some(Binding::Captured);
        if captured {
            self.entries.shift_remove(name);
        }
        (self, captured)
    }

    /// Captured names with the span of their first use.
    pub fn captures(&self) -> impl Iterator<Item = (&str, Span)> + '_ {
        self.entries
            .iter()
            .filter(|(_, entry)| entry.binding == Binding::Captured)
            .map(|(name, entry)| (name.as_str(), entry.span))
    }

    /// Resolve the captures of a nested function against this (enclosing)
    /// environment. Each capture is paired with how the enclosing function
    /// sees it, which decides whether the closure record reads a local or
    /// forwards a capture of its own.
    pub fn close_over(self, inner: &CaptureEnv) -> (Self, Vec<(String, Binding)>) {
        inner
            .captures()
            .fold((self, Vec::new()), |(env, mut sources), (name, span)| {
                let (binding, env) = env.resolve(name, span);
                sources.push((name.to_string(), binding));
                (env, sources)
            })
    }
}
