//! The `remailer` delivery agent.
//!
//! Ties the spool scanner, the transformer and processor chains, the SMTP
//! sender and the outputs together behind a small command line. The
//! `server` command runs the long lived [`service::Service`]; the remaining
//! commands are one shot tools for inspecting a spool, sending a single
//! message, resolving MX hosts and provisioning DKIM keys.

pub mod cli;
pub mod commands;
pub mod config;
pub mod controller;
pub mod service;
