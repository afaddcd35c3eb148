//! Keys the controller reacts to, identified by DOM `KeyboardEvent.code`.

use crate::dom::NodeId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum KeyCode {
    ArrowRight,
    ArrowLeft,
    ArrowUp,
    ArrowDown,
    Enter,
    Space,
    Equal,
    Minus,
    BracketRight,
    BracketLeft,
    KeyP,
    Comma,
    Period,
}

impl KeyCode {
    pub const ALL: [KeyCode; 13] = [
        KeyCode::ArrowRight,
        KeyCode::ArrowLeft,
        KeyCode::ArrowUp,
        KeyCode::ArrowDown,
        KeyCode::Enter,
        KeyCode::Space,
        KeyCode::Equal,
        KeyCode::Minus,
        KeyCode::BracketRight,
        KeyCode::BracketLeft,
        KeyCode::KeyP,
        KeyCode::Comma,
        KeyCode::Period,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            KeyCode::ArrowRight => "ArrowRight",
            KeyCode::ArrowLeft => "ArrowLeft",
            KeyCode::ArrowUp => "ArrowUp",
            KeyCode::ArrowDown => "ArrowDown",
            KeyCode::Enter => "Enter",
            KeyCode::Space => "Space",
            KeyCode::Equal => "Equal",
            KeyCode::Minus => "Minus",
            KeyCode::BracketRight => "BracketRight",
            KeyCode::BracketLeft => "BracketLeft",
            KeyCode::KeyP => "KeyP",
            KeyCode::Comma => "Comma",
            KeyCode::Period => "Period",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.code() == code)
    }
}

/// One key-down or key-up delivery.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KeyEvent {
    pub code: KeyCode,
    /// Auto-repeat from holding the key down.
    pub repeat: bool,
    /// Element the event was dispatched to.
    pub target: Option<NodeId>,
}

impl KeyEvent {
    pub fn new(code: KeyCode) -> Self {
        KeyEvent {
            code,
            repeat: false,
            target: None,
        }
    }

    pub fn repeated(mut self) -> Self {
        self.repeat = true;
        self
    }

    pub fn at(mut self, target: NodeId) -> Self {
        self.target = Some(target);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_round_trip() {
        for k in KeyCode::ALL {
            assert_eq!(KeyCode::from_code(k.code()), Some(k));
        }
        assert_eq!(KeyCode::from_code("KeyQ"), None);
    }
}
