//! Turn pipeline shared by every front end.
//!
//! A front end (Discord handler, the `ask` subcommand) hands over a user id,
//! the message text and an [`OutboundChannel`](relay_channels::OutboundChannel);
//! everything between session lookup and the final flush happens here, once.

pub mod turn;

pub use turn::{run_turn, TurnSummary};
