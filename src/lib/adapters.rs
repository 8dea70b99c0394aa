pub mod ethereum_rpc;
pub mod memory_ledger;
pub mod mock_prover;
pub mod snarkjs_prover;
