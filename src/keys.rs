use std::collections::BTreeSet;

use crate::pitch::Note;

/// A press-start or press-end interaction on one key, whatever the input
/// device (pointer down/up, touch start/end, keyboard press/release).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyEvent {
    Press(Note),
    Release(Note),
}

/// Side effect a transition asks the audio layer to perform. Releases
/// never produce one: a sound already triggered runs to completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyEffect {
    Trigger(Note),
}

/// Tracks which keys are currently held, for visual feedback only.
/// Per-key state machine {released, pressed}; the held set is exactly the
/// keys with an unmatched press.
#[derive(Debug, Default)]
pub struct KeyTracker {
    held: BTreeSet<Note>,
}

impl KeyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies one transition. A press of a key already in the pressed
    /// state is a duplicate event and must not re-trigger; a release of a
    /// key not held is a no-op.
    pub fn apply(&mut self, event: KeyEvent) -> Option<KeyEffect> {
        match event {
            KeyEvent::Press(note) => self
                .held
                .insert(note)
                .then_some(KeyEffect::Trigger(note)),
            KeyEvent::Release(note) => {
                self.held.remove(&note);
                None
            }
        }
    }

    pub fn is_held(&self, note: Note) -> bool {
        self.held.contains(&note)
    }

    pub fn held(&self) -> impl Iterator<Item = Note> + '_ {
        self.held.iter().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn press_triggers_and_holds() {
        let mut keys = KeyTracker::new();
        assert_eq!(
            keys.apply(KeyEvent::Press(Note::A)),
            Some(KeyEffect::Trigger(Note::A))
        );
        assert!(keys.is_held(Note::A));
    }

    #[test]
    fn duplicate_press_does_not_retrigger() {
        let mut keys = KeyTracker::new();
        assert!(keys.apply(KeyEvent::Press(Note::C)).is_some());
        assert_eq!(keys.apply(KeyEvent::Press(Note::C)), None);
        assert!(keys.is_held(Note::C));
    }

    #[test]
    fn release_clears_without_effects() {
        let mut keys = KeyTracker::new();
        keys.apply(KeyEvent::Press(Note::E));
        assert_eq!(keys.apply(KeyEvent::Release(Note::E)), None);
        assert!(!keys.is_held(Note::E));
    }

    #[test]
    fn releasing_an_unheld_key_is_a_noop() {
        let mut keys = KeyTracker::new();
        assert_eq!(keys.apply(KeyEvent::Release(Note::G)), None);
        assert_eq!(keys.held().count(), 0);
    }

    #[test]
    fn repress_after_release_triggers_again() {
        let mut keys = KeyTracker::new();
        assert!(keys.apply(KeyEvent::Press(Note::D)).is_some());
        keys.apply(KeyEvent::Release(Note::D));
        assert!(keys.apply(KeyEvent::Press(Note::D)).is_some());
    }

    #[test]
    fn held_set_reflects_unmatched_presses() {
        let mut keys = KeyTracker::new();
        keys.apply(KeyEvent::Press(Note::C));
        keys.apply(KeyEvent::Press(Note::E));
        keys.apply(KeyEvent::Press(Note::G));
        keys.apply(KeyEvent::Release(Note::E));
        let held: Vec<Note> = keys.held().collect();
        assert_eq!(held, vec![Note::C, Note::G]);
    }
}
