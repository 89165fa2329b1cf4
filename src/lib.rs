//! talkflow - conversational flow automation engine
//!
//! Talks (live conversations) move through a flow graph of steps. Inbound
//! messages are turned into answers by an AI gateway, step completion is
//! evaluated against each step's inputs, and outputs route the talk to the
//! next step while an agent keeps the conversation going. The work runs as
//! commands on a bus, so every stage can be retried on its own.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
