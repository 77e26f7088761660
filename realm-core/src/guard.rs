use crate::error::ClientError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadPhase {
    Unloaded,
    Loading,
    Loaded,
}

/// Proof that a fetch was dispatched. Completing with a ticket from an older
/// generation is ignored, so a slow response can't overwrite a newer one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadTicket {
    generation: u64,
}

impl LoadTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Load-once state machine of a single collection.
#[derive(Debug, Clone)]
pub struct LoadGuard {
    phase: LoadPhase,
    generation: u64,
    last_error: Option<ClientError>,
}

impl Default for LoadGuard {
    fn default() -> Self {
        Self {
            phase: LoadPhase::Unloaded,
            generation: 0,
            last_error: None,
        }
    }
}

impl LoadGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> LoadPhase {
        self.phase
    }

    pub fn is_loaded(&self) -> bool {
        self.phase == LoadPhase::Loaded
    }

    pub fn is_loading(&self) -> bool {
        self.phase == LoadPhase::Loading
    }

    pub fn last_error(&self) -> Option<&ClientError> {
        self.last_error.as_ref()
    }

    /// Returns a ticket when a fetch should be dispatched: only from
    /// `Unloaded`, or from any phase when `force` is set.
    pub fn begin(&mut self, force: bool) -> Option<LoadTicket> {
        if !force && self.phase != LoadPhase::Unloaded {
            return None;
        }
        self.generation += 1;
        self.phase = LoadPhase::Loading;
        Some(LoadTicket {
            generation: self.generation,
        })
    }

    pub fn is_current(&self, ticket: LoadTicket) -> bool {
        ticket.generation == self.generation
    }

    /// Marks the load finished. Returns false (and changes nothing) for a
    /// superseded ticket.
    pub fn complete(&mut self, ticket: LoadTicket) -> bool {
        if !self.is_current(ticket) {
            return false;
        }
        self.phase = LoadPhase::Loaded;
        self.last_error = None;
        true
    }

    /// Records a failed load and returns to `Unloaded` so the next
    /// non-forced request retries.
    pub fn fail(&mut self, ticket: LoadTicket, err: ClientError) -> bool {
        if !self.is_current(ticket) {
            return false;
        }
        self.phase = LoadPhase::Unloaded;
        self.last_error = Some(err);
        true
    }

    /// Drops any in-flight load and forgets loaded state.
    pub fn reset(&mut self) {
        self.generation += 1;
        self.phase = LoadPhase::Unloaded;
        self.last_error = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_forced_begin_only_from_unloaded() {
        let mut g = LoadGuard::new();
        let t = g.begin(false).expect("first load dispatches");
        assert!(g.is_loading());
        assert!(g.begin(false).is_none(), "no duplicate while loading");
        assert!(g.complete(t));
        assert!(g.is_loaded());
        assert!(g.begin(false).is_none(), "no refetch once loaded");
    }

    #[test]
    fn forced_begin_always_dispatches() {
        let mut g = LoadGuard::new();
        let t1 = g.begin(false).unwrap();
        g.complete(t1);
        let t2 = g.begin(true).expect("forced from loaded");
        assert!(g.is_loading());
        let t3 = g.begin(true).expect("forced while loading");
        assert!(!g.complete(t2), "superseded ticket is ignored");
        assert!(g.is_loading());
        assert!(g.complete(t3));
        assert!(g.is_loaded());
    }

    #[test]
    fn failure_returns_to_unloaded_and_allows_retry() {
        let mut g = LoadGuard::new();
        let t = g.begin(false).unwrap();
        assert!(g.fail(t, ClientError::Network("down".into())));
        assert_eq!(g.phase(), LoadPhase::Unloaded);
        assert!(g.last_error().is_some());
        let retry = g.begin(false).expect("retry after failure");
        g.complete(retry);
        assert!(g.last_error().is_none());
    }

    #[test]
    fn reset_invalidates_in_flight_ticket() {
        let mut g = LoadGuard::new();
        let t = g.begin(false).unwrap();
        g.reset();
        assert!(!g.complete(t));
        assert_eq!(g.phase(), LoadPhase::Unloaded);
    }
}
