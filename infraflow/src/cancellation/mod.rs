//! Cooperative cancellation of running workflows.

mod token;

pub use token::CancellationToken;
