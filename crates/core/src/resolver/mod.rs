#![forbid(unsafe_code)]

use std::collections::{HashSet, VecDeque};

use indexmap::IndexMap;

use crate::error::CompileError;
use crate::ids::InternalId;

struct Registration<T> {
    deps: Vec<InternalId>,
    payload: T,
}

/// Listener-based dependency resolver.
///
/// Each listener waits on a set of ids and carries a payload. Once every
/// dependency has been reported the payload is moved to the fired queue,
/// exactly once. Draining the queue and reporting the fired ids drives the
/// resolver to its fixed point.
pub struct IdResolver<T> {
    // `None` marks a listener that fired or was unregistered.
    listeners: IndexMap<InternalId, Option<Registration<T>>>,
    resolved: HashSet<InternalId>,
    fired: VecDeque<(InternalId, T)>,
}

/// Handle returned by [`IdResolver::listen`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Listening {
    id: InternalId,
}

impl Listening {
    pub fn id(&self) -> InternalId {
        self.id
    }

    pub fn unregister<T>(self, resolver: &mut IdResolver<T>) -> Result<(), CompileError> {
        resolver.unregister(self.id)
    }
}

impl<T> Default for IdResolver<T> {
    fn default() -> Self {
        Self {
            listeners: IndexMap::new(),
            resolved: HashSet::new(),
            fired: VecDeque::new(),
        }
    }
}

impl<T> IdResolver<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn listen(
        &mut self,
        id: InternalId,
        deps: Vec<InternalId>,
        payload: T,
    ) -> Result<Listening, CompileError> {
        if self.has_listener(id) {
            return Err(CompileError::DuplicateListener(id));
        }
        let circular = self.find_circular_deps(id, &deps);
        if !circular.is_empty() {
            return Err(CompileError::CircularListen { id, circular });
        }
        self.listeners.insert(id, Some(Registration { deps, payload }));
        self.resolve();
        Ok(Listening { id })
    }

    pub fn has_listener(&self, id: InternalId) -> bool {
        matches!(self.listeners.get(&id), Some(Some(_)))
    }

    /// Members of `deps` that are actively listening on `id` (one hop only).
    pub fn find_circular_deps(&self, id: InternalId, deps: &[InternalId]) -> Vec<InternalId> {
        deps.iter()
            .copied()
            .filter(|dep| match self.listeners.get(dep) {
                Some(Some(registration)) => registration.deps.contains(&id),
                _ => false,
            })
            .collect()
    }

    pub fn unregister(&mut self, id: InternalId) -> Result<(), CompileError> {
        let slot = self
            .listeners
            .get_mut(&id)
            .ok_or(CompileError::UnknownListener(id))?;
        if slot.take().is_none() {
            return Err(CompileError::DoubleUnregister(id));
        }
        Ok(())
    }

    pub fn report(&mut self, id: InternalId) -> Result<(), CompileError> {
        if !self.resolved.insert(id) {
            return Err(CompileError::DoubleReport(id));
        }
        self.resolve();
        Ok(())
    }

    /// Active listeners that have not fired yet.
    pub fn pending(&self) -> usize {
        self.listeners.values().filter(|slot| slot.is_some()).count()
    }

    fn pop_fired(&mut self) -> Option<(InternalId, T)> {
        self.fired.pop_front()
    }

    /// Hands every fired payload to `on_ready`, including payloads that fire
    /// because `on_ready` reported further ids.
    pub fn drain<E>(
        &mut self,
        mut on_ready: impl FnMut(&mut Self, InternalId, T) -> Result<(), E>,
    ) -> Result<(), E> {
        while let Some((id, payload)) = self.pop_fired() {
            on_ready(self, id, payload)?;
        }
        Ok(())
    }

    fn resolve(&mut self) {
        let ready: Vec<InternalId> = self
            .listeners
            .iter()
            .filter_map(|(id, slot)| {
                let registration = slot.as_ref()?;
                registration
                    .deps
                    .iter()
                    .all(|dep| self.resolved.contains(dep))
                    .then_some(*id)
            })
            .collect();
        for id in ready {
            let Some(registration) = self.listeners.get_mut(&id).and_then(Option::take) else {
                continue;
            };
            tracing::trace!(%id, deps = registration.deps.len(), "listener fired");
            self.fired.push_back((id, registration.payload));
        }
    }
}
