//! Bench tools for exercising a syslog daemon on one machine.
//!
//! A small syslog receiver and a traffic generator that can be pointed at
//! each other (or at a real daemon) to check that messages get delivered.
//! Each module focuses on a concrete responsibility:
//!
//! - [`message`] splits a received line into its PRI value and the rest.
//! - [`consumer`] defines what the server does with each line, plus a
//!   printer, a counter and a channel forwarder.
//! - [`server`] accepts TCP connections (and optionally UDP datagrams) and
//!   runs one task per connection that feeds lines to a consumer.
//! - [`sender`] delivers formatted messages over UDP or TCP behind one
//!   connect/send/disconnect lifecycle.
//! - [`generator`] drives a sender in a loop to produce load, one task per
//!   worker.
//! - [`cli`] parses the command-line interface for both modes.
//! - [`error`] holds the error types the modules above return.
//!
//! Integration tests use this crate directly to run a generator or raw
//! clients against a live server.

pub mod cli;
pub mod consumer;
pub mod error;
pub mod generator;
pub mod message;
pub mod sender;
pub mod server;
