//! matchline - anonymous matchmaking and chat relay between users and moderators
//!
//! This crate provides the core functionality for matchline, including:
//! - Matchmaking (moderator load tracking, randomized search scheduling)
//! - Session lifecycle and message relay
//! - Client-server protocol
//! - Configuration management
//!
//! # Architecture
//!
//! matchline uses a broker model where:
//! - One broker task owns all matchmaking and relay state and processes
//!   events one at a time
//! - The transport layer accepts connections over a Unix domain socket,
//!   performs the role handshake, and pumps decoded events to the broker
//! - Delivery back to clients happens over per-connection channels

pub mod broker;
pub mod config;
pub mod protocol;
pub mod server;
