//! Avatar GUI collaborator contract
//!
//! The floating avatar and its chat panel are an external component; the
//! router only drives them through this narrow interface. The daemon runs
//! with [`NullUi`] unless a frontend is attached.

/// Visual state of the avatar
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiState {
    /// Waiting for input
    Idle,
    /// Actively capturing an utterance
    Listening,
    /// Processing a command
    Thinking,
    /// Speaking a response
    Speaking,
}

/// Avatar GUI contract
pub trait AvatarUi: Send + Sync {
    /// Update the avatar animation state
    fn set_state(&self, state: UiState);

    /// Open the chat panel
    fn show_chat(&self);

    /// Close the chat panel
    fn hide_chat(&self);

    /// Append an assistant message to the chat panel
    fn assistant_message(&self, text: &str);
}

/// Headless UI that discards everything
pub struct NullUi;

impl AvatarUi for NullUi {
    fn set_state(&self, _state: UiState) {}
    fn show_chat(&self) {}
    fn hide_chat(&self) {}
    fn assistant_message(&self, _text: &str) {}
}
