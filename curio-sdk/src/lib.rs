//! Wire types shared between the Curio order service and its clients.
//!
//! * [`objects`] holds the JSON request and response bodies of the order API
//!   and the payment gateway webhook payload.
//! * [`session`] signs and verifies the bearer tokens carried by
//!   authenticated requests.

pub mod objects;
pub mod session;
