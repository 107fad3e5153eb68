//! Container-build backends that run an external program.
mod error;
pub use error::{ExecError, ExecResult};

mod util;

#[cfg(feature = "proc")]
pub mod proc;
#[cfg(feature = "proc")]
pub use proc::{CommandBackend, CommandConfig};

pub mod prelude {
    pub use crate::error::{ExecError, ExecResult};
    #[cfg(feature = "proc")]
    pub use crate::proc::{CommandBackend, CommandConfig};
}
