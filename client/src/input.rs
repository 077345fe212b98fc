//! Keyboard input mapped to game commands

use macroquad::prelude::*;
use shared::TurnIntent;

const MAX_CHAT_LEN: usize = 200;

/// Raw key state sampled once per frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeySample {
    pub left: bool,
    pub right: bool,
    pub jump: bool,
    pub start: bool,
    pub chat: bool,
    pub submit: bool,
    pub cancel: bool,
    pub backspace: bool,
}

/// Commands produced by one frame of input.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InputFrame {
    pub turn: TurnIntent,
    pub jump: bool,
    pub start: bool,
    pub chat: Option<String>,
}

pub struct InputManager {
    prev: KeySample,
    chat_buffer: Option<String>,
}

impl InputManager {
    pub fn new() -> Self {
        Self {
            prev: KeySample::default(),
            chat_buffer: None,
        }
    }

    /// Samples the keyboard and resolves it into commands.
    pub fn update(&mut self) -> InputFrame {
        let sample = KeySample {
            left: is_key_down(KeyCode::A) || is_key_down(KeyCode::Left),
            right: is_key_down(KeyCode::D) || is_key_down(KeyCode::Right),
            jump: is_key_down(KeyCode::Space),
            start: is_key_down(KeyCode::Enter) || is_key_down(KeyCode::KpEnter),
            chat: is_key_down(KeyCode::T),
            submit: is_key_down(KeyCode::Enter) || is_key_down(KeyCode::KpEnter),
            cancel: is_key_down(KeyCode::Escape),
            backspace: is_key_down(KeyCode::Backspace),
        };

        let mut typed = Vec::new();
        while let Some(c) = get_char_pressed() {
            typed.push(c);
        }
        self.resolve(sample, &typed)
    }

    pub fn is_typing(&self) -> bool {
        self.chat_buffer.is_some()
    }

    pub fn chat_buffer(&self) -> Option<&str> {
        self.chat_buffer.as_deref()
    }

    /// Turns held keys and typed characters into commands. Discrete actions
    /// fire on the press edge only.
    pub fn resolve(&mut self, sample: KeySample, typed: &[char]) -> InputFrame {
        let pressed = |now: bool, before: bool| now && !before;
        let mut frame = InputFrame::default();

        if let Some(buffer) = self.chat_buffer.as_mut() {
            if pressed(sample.cancel, self.prev.cancel) {
                self.chat_buffer = None;
            } else if pressed(sample.submit, self.prev.submit) {
                let text = buffer.trim().to_string();
                self.chat_buffer = None;
                if !text.is_empty() {
                    frame.chat = Some(text);
                }
            } else {
                if pressed(sample.backspace, self.prev.backspace) {
                    buffer.pop();
                }
                for &c in typed {
                    if !c.is_control() && buffer.chars().count() < MAX_CHAT_LEN {
                        buffer.push(c);
                    }
                }
            }
        } else {
            frame.turn = TurnIntent::from_keys(sample.left, sample.right);
            frame.jump = pressed(sample.jump, self.prev.jump);
            frame.start = pressed(sample.start, self.prev.start);
            if pressed(sample.chat, self.prev.chat) {
                self.chat_buffer = Some(String::new());
            }
        }

        self.prev = sample;
        frame
    }
}

impl Default for InputManager {
    fn default() -> Self {
        Self::new()
    }
}
