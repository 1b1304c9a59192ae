//! Session and request pipeline shared by the ordering clients, used by the binary and tests.

pub mod cart;
pub mod client;
pub mod config;
pub mod context;
pub mod error;
pub mod guard;
pub mod models;
pub mod platform;
pub mod session;
pub mod store;
pub mod utils;
