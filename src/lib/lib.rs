//! Client for a Tornado-style mixer.
//!
//! Encodes deposit notes, rebuilds the commitment tree from the instance's
//! `Deposit` log, assembles withdraw-circuit inputs, drives an external
//! Groth16 prover and submits the withdrawal.

pub mod adapters;
pub mod assembler;
pub mod config;
pub mod crypto;
pub mod domain;
pub mod ports;
pub mod withdrawal;
