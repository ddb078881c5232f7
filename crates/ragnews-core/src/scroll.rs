//! Auto-scroll policy for the message list.
//!
//! Position tracking is fed by the view whenever the viewport moves and is
//! independent of message updates; the tracker only decides whether a change
//! of the message sequence should follow the conversation to the bottom.

/// Distance from the bottom, in rows, still treated as "at bottom"
pub const DEFAULT_BOTTOM_THRESHOLD: usize = 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScrollBehavior {
    Instant,
    Smooth,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScrollAction {
    None,
    ScrollToBottom(ScrollBehavior),
}

#[derive(Clone, Debug)]
pub struct ScrollTracker {
    at_bottom: bool,
    threshold: usize,
}

impl Default for ScrollTracker {
    fn default() -> Self {
        Self::new(DEFAULT_BOTTOM_THRESHOLD)
    }
}

impl ScrollTracker {
    pub fn new(threshold: usize) -> Self {
        Self {
            at_bottom: true,
            threshold: threshold.max(1),
        }
    }

    pub fn at_bottom(&self) -> bool {
        self.at_bottom
    }

    /// Record the current viewport geometry; returns the new at-bottom state
    pub fn on_scroll(&mut self, content_height: usize, offset: usize, viewport_height: usize) -> bool {
        let distance = content_height.saturating_sub(offset.saturating_add(viewport_height));
        self.at_bottom = distance < self.threshold;
        self.at_bottom
    }

    /// Decide what to do after the message sequence changed
    pub fn on_messages_changed(&self) -> ScrollAction {
        if self.at_bottom {
            ScrollAction::ScrollToBottom(ScrollBehavior::Smooth)
        } else {
            ScrollAction::None
        }
    }

    /// Whether the manual "scroll to latest" affordance is shown
    pub fn show_jump_to_latest(&self) -> bool {
        !self.at_bottom
    }

    /// The manual "scroll to latest" action
    pub fn jump_to_latest(&self) -> ScrollAction {
        ScrollAction::ScrollToBottom(ScrollBehavior::Smooth)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_at_bottom() {
        let tracker = ScrollTracker::default();
        assert!(tracker.at_bottom());
        assert!(!tracker.show_jump_to_latest());
    }

    #[test]
    fn test_follows_new_messages_when_at_bottom() {
        let mut tracker = ScrollTracker::default();
        // 40 rows of content, viewport of 10 rows showing the last 10
        assert!(tracker.on_scroll(40, 30, 10));
        assert_eq!(
            tracker.on_messages_changed(),
            ScrollAction::ScrollToBottom(ScrollBehavior::Smooth)
        );
    }

    #[test]
    fn test_within_threshold_counts_as_bottom() {
        let mut tracker = ScrollTracker::new(2);
        assert!(tracker.on_scroll(40, 29, 10));
        assert!(!tracker.on_scroll(40, 28, 10));
    }

    #[test]
    fn test_scrolled_up_does_not_follow() {
        let mut tracker = ScrollTracker::default();
        assert!(!tracker.on_scroll(40, 5, 10));
        assert_eq!(tracker.on_messages_changed(), ScrollAction::None);
        assert!(tracker.show_jump_to_latest());
        assert_eq!(
            tracker.jump_to_latest(),
            ScrollAction::ScrollToBottom(ScrollBehavior::Smooth)
        );
    }

    #[test]
    fn test_short_content_is_at_bottom() {
        let mut tracker = ScrollTracker::default();
        assert!(!tracker.on_scroll(100, 0, 10));
        assert!(tracker.on_scroll(3, 0, 10));
    }
}
