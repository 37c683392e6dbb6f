pub mod executor;
pub mod fees;
pub mod quote;
pub mod router;
pub mod slippage;

pub use executor::{SwapExecutor, SwapOutcome, SwapSettings, SwapStage};
pub use fees::{FeeModel, FeeStrategy};
pub use quote::{QuoteResult, QuoteService};
pub use slippage::SlippageBound;
