//! Background processors.
//!
//! - `ExpirySweeper`: deletes PromptPay orders whose payment window closed

pub mod expiry_sweeper;

pub use expiry_sweeper::{ExpirySweeper, SweepTick};
