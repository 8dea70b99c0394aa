pub mod hasher;
pub mod poseidon;
