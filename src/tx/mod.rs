pub mod envelope;
pub mod signer;

pub use envelope::{FeeParams, TransactionEnvelope};
pub use signer::{sign_envelope, Broadcaster, SignedTransaction};
