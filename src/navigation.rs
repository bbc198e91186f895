//! Slide navigation.
//!
//! The [`Navigator`] tracks the current slide and clamps every transition, so
//! it can never point outside the deck. Input is turned into a [`NavMessage`]
//! and applied with [`update`].
//!
//! # Example
//!
//! ```
//! use slidemark::navigation::{update, NavMessage, Navigator};
//!
//! let nav = Navigator::new(3);
//! let nav = update(nav, NavMessage::Next);
//! assert_eq!(nav.current(), 2);
//! let nav = update(nav, NavMessage::GoTo(9));
//! assert_eq!(nav.current(), 2);
//! ```

/// Current position within a deck of `total` slides.
///
/// `current` is 1-based and stays within `1..=total`; an empty deck keeps it
/// at 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Navigator {
    current: usize,
    total: usize,
}

impl Navigator {
    /// Start at the first slide.
    pub const fn new(total: usize) -> Self {
        Self {
            current: if total == 0 { 0 } else { 1 },
            total,
        }
    }

    /// Start at `start`, clamped into the deck.
    pub fn with_start(total: usize, start: usize) -> Self {
        let current = if total == 0 { 0 } else { start.clamp(1, total) };
        Self { current, total }
    }

    pub const fn current(&self) -> usize {
        self.current
    }

    pub const fn total(&self) -> usize {
        self.total
    }

    pub const fn can_go_next(&self) -> bool {
        self.current < self.total
    }

    pub const fn can_go_previous(&self) -> bool {
        self.current > 1
    }

    /// Counter text as shown in the navigation bar.
    pub fn counter_label(&self) -> String {
        format!("{} / {}", self.current, self.total)
    }
}

/// Navigation events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavMessage {
    /// Advance one slide; no-op on the last
    Next,
    /// Go back one slide; no-op on the first
    Previous,
    /// Jump to a slide; ignored when out of range
    GoTo(usize),
    First,
    Last,
}

/// Apply a message. Never fails; out-of-range requests leave the state as is.
pub const fn update(mut nav: Navigator, msg: NavMessage) -> Navigator {
    if nav.total == 0 {
        return nav;
    }
    match msg {
        NavMessage::Next => {
            if nav.can_go_next() {
                nav.current += 1;
            }
        }
        NavMessage::Previous => {
            if nav.can_go_previous() {
                nav.current -= 1;
            }
        }
        NavMessage::GoTo(n) => {
            if n >= 1 && n <= nav.total {
                nav.current = n;
            }
        }
        NavMessage::First => nav.current = 1,
        NavMessage::Last => nav.current = nav.total,
    }
    nav
}

/// DOM `KeyboardEvent.key` values and the messages they send.
///
/// The page script is generated from this table.
pub const KEY_BINDINGS: [(&str, NavMessage); 7] = [
    ("ArrowRight", NavMessage::Next),
    ("ArrowDown", NavMessage::Next),
    (" ", NavMessage::Next),
    ("ArrowLeft", NavMessage::Previous),
    ("ArrowUp", NavMessage::Previous),
    ("Home", NavMessage::First),
    ("End", NavMessage::Last),
];

/// Map a DOM `KeyboardEvent.key` value to a message.
///
/// Keys typed into a text-entry control are never intercepted.
pub fn key_to_message(key: &str, in_text_input: bool) -> Option<NavMessage> {
    if in_text_input {
        return None;
    }
    KEY_BINDINGS
        .iter()
        .find(|(bound, _)| *bound == key)
        .map(|&(_, msg)| msg)
}
