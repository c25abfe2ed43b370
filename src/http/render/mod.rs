// JSON envelopes for every API answer.

pub mod renderer;

pub use renderer::{error, ok, status_of, ApiError, ApiResult};
