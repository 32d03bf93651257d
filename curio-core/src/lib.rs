#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::panic))]
#![forbid(unsafe_code)]

pub mod config;
pub mod entities;
pub mod framework;
pub mod gateway;
pub mod orders;
pub mod processors;
pub mod store;
pub mod utils;
