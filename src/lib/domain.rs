pub mod commitment;
pub mod deposit_log;
pub mod merkle;
pub mod note;
pub mod proof;
pub mod secret;
pub mod witness;
