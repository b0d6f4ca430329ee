//! Visibility-gated fetch state machine.
//!
//! The wasm loader wires an IntersectionObserver into this; the visibility
//! latch and the fetch-at-most-once guard live here, not in the observer.
//! Every input returns an explicit [`Action`] so the caller (and the tests)
//! decide when to actually issue the query.

use crate::query::Record;

/// Lifecycle of one region/collection binding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchPhase {
    /// Unbound: observation stopped, late results are discarded
    Idle,
    Watching,
    Fetching,
    Loaded,
    Failed,
}

/// What the caller should do after feeding an event into the binding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    None,
    StartFetch,
}

/// Per-region fetch state. A fetch fires iff the region has become visible,
/// nothing has been fetched yet, and the binding is enabled.
#[derive(Debug)]
pub struct LazyBinding {
    phase: FetchPhase,
    is_visible: bool,
    has_fetched: bool,
    enabled: bool,
    records: Vec<Record>,
    error: Option<String>,
}

impl LazyBinding {
    /// Bind starts watching immediately; `enabled` only gates fetching, so a
    /// disabled binding still tracks visibility.
    pub fn new(enabled: bool) -> Self {
        Self {
            phase: FetchPhase::Watching,
            is_visible: false,
            has_fetched: false,
            enabled,
            records: Vec::new(),
            error: None,
        }
    }

    pub fn phase(&self) -> FetchPhase {
        self.phase
    }

    /// The visibility latch: false until the first proximity crossing, true
    /// forever after
    pub fn is_visible(&self) -> bool {
        self.is_visible
    }

    pub fn is_loading(&self) -> bool {
        self.phase == FetchPhase::Fetching
    }

    pub fn has_fetched(&self) -> bool {
        self.has_fetched
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Proximity crossing reported by the observer. Sets the latch; requests
    /// a fetch only the first time the conditions hold.
    pub fn region_entered(&mut self) -> Action {
        if self.phase == FetchPhase::Idle {
            return Action::None;
        }

        self.is_visible = true;
        if self.has_fetched || !self.enabled || self.phase == FetchPhase::Fetching {
            Action::None
        } else {
            Action::StartFetch
        }
    }

    /// The caller is issuing the query now. The guard is set here, not on
    /// completion, so a failed fetch still counts as fetched.
    pub fn begin_fetch(&mut self) {
        self.phase = FetchPhase::Fetching;
        self.has_fetched = true;
        self.error = None;
    }

    /// Successful query resolution: data replaced wholesale, never merged
    pub fn complete(&mut self, records: Vec<Record>) {
        if self.phase != FetchPhase::Fetching {
            return;
        }
        self.phase = FetchPhase::Loaded;
        self.records = records;
        self.error = None;
    }

    /// Query rejection: data stays at its prior value; `refetch` is the only
    /// recovery path
    pub fn fail(&mut self, error: impl Into<String>) {
        if self.phase != FetchPhase::Fetching {
            return;
        }
        self.phase = FetchPhase::Failed;
        self.error = Some(error.into());
    }

    /// Clear the at-most-once guard and re-issue the same query, provided the
    /// region has ever been visible and the binding is enabled
    pub fn refetch(&mut self) -> Action {
        if self.phase == FetchPhase::Idle || self.phase == FetchPhase::Fetching {
            return Action::None;
        }

        self.has_fetched = false;
        if self.is_visible && self.enabled {
            Action::StartFetch
        } else {
            Action::None
        }
    }

    /// Disabling prevents new fetches without resetting the latch; enabling
    /// with the latch already set (and nothing fetched) fires immediately
    pub fn set_enabled(&mut self, enabled: bool) -> Action {
        self.enabled = enabled;
        if enabled
            && self.is_visible
            && !self.has_fetched
            && self.phase == FetchPhase::Watching
        {
            Action::StartFetch
        } else {
            Action::None
        }
    }

    /// Region unmounted: observation stops and any in-flight result is
    /// discarded when it lands
    pub fn unbind(&mut self) {
        self.phase = FetchPhase::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn records(ids: &[&str]) -> Vec<Record> {
        ids.iter()
            .map(|id| match json!({"name": id}) {
                serde_json::Value::Object(map) => Record::new(*id, map),
                _ => unreachable!(),
            })
            .collect()
    }

    /// Drive the binding the way the wasm loader does, counting store calls
    fn drive(binding: &mut LazyBinding, action: Action, result: Result<Vec<Record>, &str>, calls: &mut u32) {
        if action != Action::StartFetch {
            return;
        }
        *calls += 1;
        binding.begin_fetch();
        match result {
            Ok(data) => binding.complete(data),
            Err(err) => binding.fail(err),
        }
    }

    #[test]
    fn test_never_visible_never_fetches() {
        let binding = LazyBinding::new(true);
        assert!(!binding.is_visible());
        assert!(!binding.is_loading());
        assert!(!binding.has_fetched());
        assert!(binding.records().is_empty());
    }

    #[test]
    fn test_first_crossing_requests_fetch() {
        let mut binding = LazyBinding::new(true);
        assert_eq!(binding.region_entered(), Action::StartFetch);
        assert!(binding.is_visible());
    }

    #[test]
    fn test_second_crossing_does_not_refetch() {
        let mut binding = LazyBinding::new(true);
        let mut calls = 0;

        let action = binding.region_entered();
        drive(&mut binding, action, Ok(records(&["a", "b"])), &mut calls);
        assert_eq!(calls, 1);
        assert_eq!(binding.phase(), FetchPhase::Loaded);

        // The region scrolls out and back in
        assert_eq!(binding.region_entered(), Action::None);
        assert_eq!(calls, 1);
        assert_eq!(binding.records().len(), 2);
    }

    #[test]
    fn test_refetch_replaces_data_wholesale() {
        let mut binding = LazyBinding::new(true);
        let mut calls = 0;

        let action = binding.region_entered();
        drive(&mut binding, action, Ok(records(&["a", "b", "c"])), &mut calls);
        assert_eq!(binding.records().len(), 3);

        // A strict subset replaces, never appends
        let action = binding.refetch();
        drive(&mut binding, action, Ok(records(&["a"])), &mut calls);
        assert_eq!(calls, 2);
        assert_eq!(binding.records().len(), 1);
        assert_eq!(binding.records()[0].id, "a");
    }

    #[test]
    fn test_failure_keeps_prior_data_and_sets_error() {
        let mut binding = LazyBinding::new(true);
        let mut calls = 0;

        let action = binding.region_entered();
        drive(&mut binding, action, Err("store unreachable"), &mut calls);

        assert_eq!(binding.phase(), FetchPhase::Failed);
        assert_eq!(binding.error(), Some("store unreachable"));
        assert!(binding.records().is_empty());
        assert!(binding.has_fetched());

        // No automatic retry on later crossings
        assert_eq!(binding.region_entered(), Action::None);
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_refetch_recovers_from_failure() {
        let mut binding = LazyBinding::new(true);
        let mut calls = 0;

        let action = binding.region_entered();
        drive(&mut binding, action, Err("store unreachable"), &mut calls);

        let action = binding.refetch();
        drive(&mut binding, action, Ok(records(&["a"])), &mut calls);
        assert_eq!(calls, 2);
        assert_eq!(binding.phase(), FetchPhase::Loaded);
        assert_eq!(binding.error(), None);
        assert_eq!(binding.records().len(), 1);
    }

    #[test]
    fn test_failure_after_success_keeps_old_data() {
        let mut binding = LazyBinding::new(true);
        let mut calls = 0;

        let action = binding.region_entered();
        drive(&mut binding, action, Ok(records(&["a", "b"])), &mut calls);

        let action = binding.refetch();
        drive(&mut binding, action, Err("timeout"), &mut calls);

        assert_eq!(binding.phase(), FetchPhase::Failed);
        assert_eq!(binding.records().len(), 2);
        assert_eq!(binding.error(), Some("timeout"));
    }

    #[test]
    fn test_disabled_binding_tracks_visibility_without_fetching() {
        let mut binding = LazyBinding::new(false);
        assert_eq!(binding.region_entered(), Action::None);
        assert!(binding.is_visible());
        assert!(!binding.has_fetched());
    }

    #[test]
    fn test_enabling_after_visibility_fires_fetch() {
        let mut binding = LazyBinding::new(false);
        binding.region_entered();
        assert_eq!(binding.set_enabled(true), Action::StartFetch);
    }

    #[test]
    fn test_disabling_does_not_reset_latch() {
        let mut binding = LazyBinding::new(true);
        let mut calls = 0;

        let action = binding.region_entered();
        drive(&mut binding, action, Ok(records(&["a"])), &mut calls);

        assert_eq!(binding.set_enabled(false), Action::None);
        assert!(binding.is_visible());

        // Disabled blocks refetch
        assert_eq!(binding.refetch(), Action::None);
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_refetch_before_visibility_does_nothing() {
        let mut binding = LazyBinding::new(true);
        assert_eq!(binding.refetch(), Action::None);
        assert!(!binding.has_fetched());
    }

    #[test]
    fn test_unbind_discards_in_flight_result() {
        let mut binding = LazyBinding::new(true);
        assert_eq!(binding.region_entered(), Action::StartFetch);
        binding.begin_fetch();

        binding.unbind();
        binding.complete(records(&["late"]));

        assert_eq!(binding.phase(), FetchPhase::Idle);
        assert!(binding.records().is_empty());
    }

    #[test]
    fn test_unbound_binding_ignores_crossings() {
        let mut binding = LazyBinding::new(true);
        binding.unbind();
        assert_eq!(binding.region_entered(), Action::None);
        assert!(!binding.is_visible());
    }

    #[test]
    fn test_loading_flag_tracks_fetch_window() {
        let mut binding = LazyBinding::new(true);
        binding.region_entered();
        assert!(!binding.is_loading());

        binding.begin_fetch();
        assert!(binding.is_loading());

        binding.complete(records(&["a"]));
        assert!(!binding.is_loading());
    }
}
