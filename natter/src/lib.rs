//! natter — a line-oriented terminal chat client.
//!
//! Connects to a newline-delimited TCP chat server, multiplexes raw
//! keyboard input with incoming server traffic in a single
//! `tokio::select!` loop, and keeps the one-line input prompt intact
//! underneath the scrolling transcript.

pub mod cli;
pub mod event_loop;
pub mod history;
pub mod input;
pub mod net;
pub mod terminal;
