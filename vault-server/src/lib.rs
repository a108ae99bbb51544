//! Vault Backup Server Library
//!
//! The protocol and transfer core (client registry, transfer broker and
//! engine, request handlers) plus the pieces the `vaultd` binary is built
//! from. Exposed as a library for integration testing.

pub mod args;
pub mod clients;
pub mod config;
pub mod connection;
pub mod constants;
pub mod crypto;
pub mod db;
pub mod error;
pub mod handlers;
pub mod sweeper;
pub mod transfers;
