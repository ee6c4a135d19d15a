/// Entry points wiring the live collaborators together.
pub mod app;
/// Read-only report of pending actions.
pub mod check;
/// Replay of an interrupted update.
pub mod recover;
/// The update state machine.
pub mod update;
