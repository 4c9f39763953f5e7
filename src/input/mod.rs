pub mod capability;
pub mod event;
pub mod state;
pub mod target;
