use std::borrow::Borrow;

use mirctl_model::{ProgressRecord, TaskState};
use tracing::{debug, error, info, trace};

/// Read-only accessors used when rendering a progress record into a log line.
pub trait View {
    fn as_task(&self) -> &str;
    fn percent(&self) -> f64;
    fn state(&self) -> TaskState;
    fn code(&self) -> i32;
    fn as_reason(&self) -> &str;
}

impl<T> View for T
where
    T: Borrow<ProgressRecord>,
{
    #[inline]
    fn as_task(&self) -> &str {
        &self.borrow().task_id
    }
    #[inline]
    fn percent(&self) -> f64 {
        self.borrow().percent
    }
    #[inline]
    fn state(&self) -> TaskState {
        self.borrow().state
    }
    #[inline]
    fn code(&self) -> i32 {
        self.borrow().error_code.map(|c| c.as_i32()).unwrap_or(0)
    }
    #[inline]
    fn as_reason(&self) -> &str {
        self.borrow().error_message.as_deref().unwrap_or("unknown")
    }
}

#[inline]
pub fn message_for(state: TaskState) -> &'static str {
    match state {
        TaskState::Pending => "task accepted, waiting for a worker",
        TaskState::Running => "task progress",
        TaskState::Done => "task finished",
        TaskState::Error => "task failed",
    }
}

/// Log one progress update at a level matching its state.
#[inline]
pub fn log_progress<E: View>(e: E) {
    let msg = message_for(e.state());

    match e.state() {
        TaskState::Pending => trace!(target: "mirctl.progress", task = e.as_task(), "{msg}"),
        TaskState::Running => {
            debug!(target: "mirctl.progress", task = e.as_task(), percent = e.percent(), "{msg}")
        }
        TaskState::Done => info!(target: "mirctl.progress", task = e.as_task(), "{msg}"),
        TaskState::Error => error!(
            target: "mirctl.progress",
            task = e.as_task(),
            code = e.code(),
            reason = e.as_reason(),
            "{msg}"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mirctl_model::ResponseCode;

    #[test]
    fn view_reads_error_fields() {
        let rec = ProgressRecord::failed("t", 0, ResponseCode::ContainerFailed, "boom");
        assert_eq!(rec.code(), 2002);
        assert_eq!(rec.as_reason(), "boom");
        assert_eq!((&rec).state(), TaskState::Error);
    }

    #[test]
    fn view_defaults_without_error() {
        let rec = ProgressRecord::new("t", 0, 0.25, TaskState::Running);
        assert_eq!(rec.code(), 0);
        assert_eq!(rec.as_reason(), "unknown");
        log_progress(&rec);
    }
}
