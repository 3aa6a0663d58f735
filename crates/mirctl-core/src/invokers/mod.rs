//! Single-shot invokers: run to completion inside the request.
use std::sync::Arc;

use crate::router::InvokerRouter;

mod branch;
pub use branch::{BranchCheckoutInvoker, BranchCreateInvoker, BranchDeleteInvoker, BranchListInvoker};

mod repo;
pub use repo::{CommitInvoker, LogInvoker, RepoInitInvoker, RepoStatusInvoker};

mod labels;
pub use labels::{LabelAddInvoker, LabelGetInvoker};

mod gpu;
pub use gpu::GpuInfoInvoker;

mod terminate;
pub use terminate::TerminateInvoker;

pub fn register_all(router: &mut InvokerRouter) {
    router.register(Arc::new(BranchListInvoker));
    router.register(Arc::new(BranchCheckoutInvoker));
    router.register(Arc::new(BranchCreateInvoker));
    router.register(Arc::new(BranchDeleteInvoker));
    router.register(Arc::new(CommitInvoker));
    router.register(Arc::new(RepoInitInvoker));
    router.register(Arc::new(LogInvoker));
    router.register(Arc::new(RepoStatusInvoker));
    router.register(Arc::new(LabelAddInvoker));
    router.register(Arc::new(LabelGetInvoker));
    router.register(Arc::new(GpuInfoInvoker));
    router.register(Arc::new(TerminateInvoker));
}
