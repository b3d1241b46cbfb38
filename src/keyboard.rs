//! Mapping from host key names to machine input.
//!
//! The frontend hands over key names as strings (the form SDL and the
//! browsers agree on), so the table is keyed by name rather than by any
//! toolkit's keycode type.

use crate::machine::UserInput;
use lazy_static::lazy_static;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Left,
    Right,
    Up,
    Down,
    Action,
    /// Jump to the password screen (the 'C'ode key of the DOS release).
    PasswordScreen,
}

lazy_static! {
    static ref KEY_NAMES: HashMap<&'static str, Key> = {
        let mut map = HashMap::new();
        map.insert("Left", Key::Left);
        map.insert("ArrowLeft", Key::Left);
        map.insert("Right", Key::Right);
        map.insert("ArrowRight", Key::Right);
        map.insert("Up", Key::Up);
        map.insert("ArrowUp", Key::Up);
        map.insert("Down", Key::Down);
        map.insert("ArrowDown", Key::Down);
        map.insert("Space", Key::Action);
        map.insert(" ", Key::Action);
        map.insert("Return", Key::Action);
        map.insert("Enter", Key::Action);
        map.insert("C", Key::PasswordScreen);
        map
    };
}

pub fn key_for_name(name: &str) -> Option<Key> {
    KEY_NAMES.get(name).copied()
}

/// Fold a key transition into the input frame for the next tic.
pub fn apply_key(input: &mut UserInput, key: Key, pressed: bool) {
    match key {
        Key::Left => input.left = pressed,
        Key::Right => input.right = pressed,
        Key::Up => input.up = pressed,
        Key::Down => input.down = pressed,
        Key::Action => input.action = pressed,
        Key::PasswordScreen => input.show_password_screen = pressed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arrow_names_resolve_in_both_spellings() {
        assert_eq!(key_for_name("Left"), Some(Key::Left));
        assert_eq!(key_for_name("ArrowLeft"), Some(Key::Left));
        assert_eq!(key_for_name("Escape"), None);
    }

    #[test]
    fn transitions_update_the_input_frame() {
        let mut input = UserInput::default();
        apply_key(&mut input, Key::Action, true);
        assert!(input.action);
        apply_key(&mut input, Key::Action, false);
        assert!(!input.action);
    }
}
