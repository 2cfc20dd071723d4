//! casvault - Multi-tenant content-addressed storage server.
//!
//! A CAS binary format and B-Tree topology (`codec`, `topology`, `tree`)
//! underpin an immutable filesystem layer (`fs`) and a delegate-chain
//! authorization model (`delegate`, `auth`, `ownership`, `depot`,
//! `ticket`). The `api` module exposes all of it over HTTP.

pub mod api;
pub mod auth;
pub mod codec;
pub mod common;
pub mod config;
pub mod delegate;
pub mod depot;
pub mod fs;
pub mod ids;
pub mod logging;
pub mod ownership;
pub mod store;
pub mod ticket;
pub mod topology;
pub mod tree;
pub mod upload;

pub use common::error::{CoreError, Result};
