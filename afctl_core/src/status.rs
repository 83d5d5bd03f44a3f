//! Per-frame status record published to the host pipeline.

/// User-visible focus state, decoupled from the engine's internal scan state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FocusState {
    #[default]
    Idle,
    Scanning,
    Focused,
    Failed,
}

/// Continuous-mode pause progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PauseState {
    #[default]
    Running,
    /// Pause latched; a scan in progress is being allowed to finish.
    Pausing,
    Paused,
}

/// Status published once per frame on the host's metadata channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AfStatus {
    pub pause_state: PauseState,
    pub focus_state: FocusState,
    /// Commanded lens position in hardware units; `None` until a real
    /// starting position is known.
    pub lens_setting: Option<i32>,
}
