mod error;
pub use error::ExecError;

mod util;
pub use util::terminate_pid;

pub mod proc;
pub use proc::{CommandRunner, Invocation, ProcRunner, ProcessTable, ToolOutput};

pub mod prelude {
    pub use crate::error::ExecError;
    pub use crate::proc::{CommandRunner, Invocation, ProcRunner, ProcessTable, ToolOutput};
}
