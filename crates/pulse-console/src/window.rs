//! Bounded visible window over the ordered result set.
//!
//! The window is always `results[..min(limit, len)]` as of its last recompute. The
//! limit grows by the base step when the user reaches the bottom edge and resets to
//! the base step when they return to the top edge; nothing else changes it.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;

use pulse_core::config::ConsoleConfig;
use pulse_core::{Record, RecordId};

pub const DEFAULT_BASE_LIMIT: usize = 100;
pub const DEFAULT_EDGE_THRESHOLD: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrollPosition {
    #[default]
    NearTop,
    Middle,
    NearBottom,
}

/// Window recompute caused by a scroll transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowTransition {
    Reset { limit: usize },
    Grew { limit: usize },
}

#[derive(Debug, Clone)]
pub struct ViewWindowManager {
    base_limit: usize,
    edge_threshold: usize,
    limit: usize,
    position: ScrollPosition,
    on_screen: HashSet<RecordId>,
    window: Vec<Arc<Record>>,
}

impl Default for ViewWindowManager {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_LIMIT, DEFAULT_EDGE_THRESHOLD)
    }
}

impl ViewWindowManager {
    pub fn new(base_limit: usize, edge_threshold: usize) -> Self {
        let base_limit = base_limit.max(1);
        Self {
            base_limit,
            edge_threshold: edge_threshold.max(1),
            limit: base_limit,
            position: ScrollPosition::NearTop,
            on_screen: HashSet::new(),
            window: Vec::new(),
        }
    }

    pub fn from_config(config: &ConsoleConfig) -> Self {
        Self::new(config.window_base_limit, config.edge_threshold)
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn scroll_position(&self) -> ScrollPosition {
        self.position
    }

    pub fn visible(&self) -> &[Arc<Record>] {
        &self.window
    }

    pub fn visible_ids(&self) -> Vec<RecordId> {
        self.window.iter().map(|record| record.id).collect()
    }

    pub fn on_screen(&self) -> &HashSet<RecordId> {
        &self.on_screen
    }

    /// Recompute the window when `mandatory` or while near the top. Returns whether
    /// the window was recomputed.
    pub fn on_result_set_changed(&mut self, results: &[Arc<Record>], mandatory: bool) -> bool {
        if !mandatory && self.position != ScrollPosition::NearTop {
            tracing::trace!(position = ?self.position, "window recompute deferred");
            return false;
        }
        self.recompute(results);
        true
    }

    /// Ids outside the current window are ignored.
    pub fn on_item_appear(
        &mut self,
        id: RecordId,
        results: &[Arc<Record>],
    ) -> Option<WindowTransition> {
        if !self.window.iter().any(|record| record.id == id) {
            return None;
        }
        self.on_screen.insert(id);
        self.reposition(results)
    }

    pub fn on_item_disappear(
        &mut self,
        id: RecordId,
        results: &[Arc<Record>],
    ) -> Option<WindowTransition> {
        if !self.on_screen.remove(&id) {
            return None;
        }
        self.reposition(results)
    }

    fn reposition(&mut self, results: &[Arc<Record>]) -> Option<WindowTransition> {
        let next = self.derive_position();
        if next == self.position {
            return None;
        }
        self.position = next;
        match next {
            ScrollPosition::NearTop => {
                self.limit = self.base_limit;
                self.recompute(results);
                tracing::debug!(limit = self.limit, "window reset at top");
                Some(WindowTransition::Reset { limit: self.limit })
            }
            ScrollPosition::NearBottom => {
                self.limit = self.limit.saturating_add(self.base_limit);
                self.recompute(results);
                tracing::debug!(limit = self.limit, "window grew at bottom");
                Some(WindowTransition::Grew { limit: self.limit })
            }
            ScrollPosition::Middle => None,
        }
    }

    fn derive_position(&self) -> ScrollPosition {
        let edge = self.edge_threshold.min(self.window.len());
        let on_screen = |record: &Arc<Record>| self.on_screen.contains(&record.id);
        if self.window[..edge].iter().any(on_screen) {
            ScrollPosition::NearTop
        } else if self.window[self.window.len() - edge..].iter().any(on_screen) {
            ScrollPosition::NearBottom
        } else {
            ScrollPosition::Middle
        }
    }

    fn recompute(&mut self, results: &[Arc<Record>]) {
        let len = self.limit.min(results.len());
        self.window = results[..len].to_vec();
    }
}
