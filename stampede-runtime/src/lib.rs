mod error;
pub mod runtime;

pub use error::RuntimeError;
pub use runtime::StampedeRuntime;
