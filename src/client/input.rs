//! Keyboard sampling for the locally controlled car

use std::collections::HashSet;

/// Physical keys the client listens to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    ArrowLeft,
    ArrowRight,
    ArrowUp,
    ArrowDown,
    A,
    D,
    W,
    S,
}

/// Keys currently held down, as reported by the presentation layer
#[derive(Debug, Clone, Default)]
pub struct KeyboardState {
    held: HashSet<Key>,
}

impl KeyboardState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn press(&mut self, key: Key) {
        self.held.insert(key);
    }

    pub fn release(&mut self, key: Key) {
        self.held.remove(&key);
    }

    pub fn is_down(&self, key: Key) -> bool {
        self.held.contains(&key)
    }

    /// Collapse both key sets into the four logical directions
    pub fn sample(&self) -> DirectionalInput {
        DirectionalInput {
            left: self.is_down(Key::ArrowLeft) || self.is_down(Key::A),
            right: self.is_down(Key::ArrowRight) || self.is_down(Key::D),
            up: self.is_down(Key::ArrowUp) || self.is_down(Key::W),
            down: self.is_down(Key::ArrowDown) || self.is_down(Key::S),
        }
    }
}

impl FromIterator<Key> for KeyboardState {
    fn from_iter<I: IntoIterator<Item = Key>>(iter: I) -> Self {
        Self {
            held: iter.into_iter().collect(),
        }
    }
}

/// Logical directions held during one tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DirectionalInput {
    pub left: bool,
    pub right: bool,
    pub up: bool,
    pub down: bool,
}
