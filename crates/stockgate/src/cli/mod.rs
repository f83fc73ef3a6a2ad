//! Command-line interface for Stockgate

pub mod actions;
pub mod bom;
pub mod catalog;
pub mod chat;
pub mod config;
pub mod context;
pub mod error;
pub mod output;
