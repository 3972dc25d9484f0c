#![cfg_attr(not(test), forbid(unsafe_code))]
#![allow(clippy::multiple_crate_versions)]

//! Wire models and client configuration shared by the chatstream crates.

pub mod config;
pub mod models;
