pub mod bank;
pub mod clock;
pub mod tracking;
