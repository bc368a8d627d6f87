pub mod cancel;
pub mod events;
