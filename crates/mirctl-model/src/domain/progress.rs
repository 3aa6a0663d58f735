//! Progress record and its tab-separated file representation.
//!
//! First line: `task_id \t timestamp \t percent \t state [\t error_code \t error_message]`.
//! Any further lines carry a stack trace or diagnostic blob.
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{ModelError, ResponseCode, TaskState};

const FIELDS_PLAIN: usize = 4;
const FIELDS_WITH_ERROR: usize = 6;

/// Current completion state of one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressRecord {
    pub task_id: String,
    /// Unix timestamp, seconds.
    pub timestamp: u64,
    /// Completion in `[0, 1]`.
    pub percent: f64,
    pub state: TaskState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ResponseCode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack_trace: Option<String>,
}

impl ProgressRecord {
    pub fn new(task_id: impl Into<String>, timestamp: u64, percent: f64, state: TaskState) -> Self {
        Self {
            task_id: task_id.into(),
            timestamp,
            percent: percent.clamp(0.0, 1.0),
            state,
            error_code: None,
            error_message: None,
            stack_trace: None,
        }
    }

    /// Terminal error record at 100%.
    pub fn failed(
        task_id: impl Into<String>,
        timestamp: u64,
        code: ResponseCode,
        message: impl Into<String>,
    ) -> Self {
        Self {
            error_code: Some(code),
            error_message: Some(message.into()),
            ..Self::new(task_id, timestamp, 1.0, TaskState::Error)
        }
    }

    pub fn with_stack_trace(mut self, trace: impl Into<String>) -> Self {
        self.stack_trace = Some(trace.into());
        self
    }

    /// Render the file content. Tabs and newlines inside the message are flattened to spaces
    /// so the first line always keeps its field count.
    pub fn to_lines(&self) -> String {
        let mut out = format!(
            "{}\t{}\t{:.2}\t{}",
            self.task_id, self.timestamp, self.percent, self.state
        );
        if self.state == TaskState::Error {
            let code = self.error_code.unwrap_or(ResponseCode::Unknown);
            let message = self.error_message.as_deref().map(flatten).unwrap_or_default();
            out.push_str(&format!("\t{}\t{}", code.as_i32(), message));
        }
        out.push('\n');
        if let Some(trace) = &self.stack_trace {
            out.push_str(trace);
            if !trace.ends_with('\n') {
                out.push('\n');
            }
        }
        out
    }
}

fn flatten(s: &str) -> String {
    s.replace(['\t', '\n', '\r'], " ")
}

impl FromStr for ProgressRecord {
    type Err = ModelError;

    fn from_str(content: &str) -> Result<Self, Self::Err> {
        let (first, rest) = match content.split_once('\n') {
            Some((first, rest)) => (first, rest),
            None => (content, ""),
        };
        let fields: Vec<&str> = first.trim_end_matches('\r').split('\t').collect();
        if fields.len() != FIELDS_PLAIN && fields.len() != FIELDS_WITH_ERROR {
            return Err(ModelError::ProgressLine(format!(
                "expected {FIELDS_PLAIN} or {FIELDS_WITH_ERROR} fields, got {}",
                fields.len()
            )));
        }

        let timestamp = fields[1]
            .parse::<u64>()
            .map_err(|e| ModelError::ProgressLine(format!("timestamp: {e}")))?;
        let percent = fields[2]
            .parse::<f64>()
            .map_err(|e| ModelError::ProgressLine(format!("percent: {e}")))?;
        if !(0.0..=1.0).contains(&percent) {
            return Err(ModelError::ProgressLine(format!("percent out of range: {percent}")));
        }
        let state = fields[3].parse::<TaskState>()?;

        let mut record = ProgressRecord::new(fields[0], timestamp, percent, state);
        if fields.len() == FIELDS_WITH_ERROR {
            let raw = fields[4]
                .parse::<i32>()
                .map_err(|e| ModelError::ProgressLine(format!("error code: {e}")))?;
            record.error_code = Some(ResponseCode::try_from(raw)?);
            record.error_message = Some(fields[5].to_string());
        }
        let trace = rest.trim_end();
        if !trace.is_empty() {
            record.stack_trace = Some(trace.to_string());
        }
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TID: &str = "t0000001000001aaaaaaaaaaaaaaaa";

    #[test]
    fn done_line_has_four_fields() {
        let rec = ProgressRecord::new(TID, 1_700_000_000, 1.0, TaskState::Done);
        assert_eq!(rec.to_lines(), format!("{TID}\t1700000000\t1.00\tdone\n"));
    }

    #[test]
    fn running_percent_has_two_decimals() {
        let rec = ProgressRecord::new(TID, 5, 0.5, TaskState::Running);
        assert_eq!(rec.to_lines(), format!("{TID}\t5\t0.50\trunning\n"));
    }

    #[test]
    fn error_line_carries_code_and_flattened_message() {
        let rec = ProgressRecord::failed(TID, 5, ResponseCode::ExternalToolFailed, "bad\tthing\nhappened")
            .with_stack_trace("frame 1\nframe 2");
        assert_eq!(
            rec.to_lines(),
            format!("{TID}\t5\t1.00\terror\t2001\tbad thing happened\nframe 1\nframe 2\n")
        );
    }

    #[test]
    fn parse_back_error_record() {
        let rec = ProgressRecord::failed(TID, 9, ResponseCode::GpuUnavailable, "no gpu")
            .with_stack_trace("trace");
        let back: ProgressRecord = rec.to_lines().parse().unwrap();
        assert_eq!(back, rec);
    }

    #[test]
    fn parse_rejects_partial_line() {
        let err = format!("{TID}\t9\t0.5").parse::<ProgressRecord>().unwrap_err();
        assert!(matches!(err, ModelError::ProgressLine(_)));
    }

    #[test]
    fn parse_rejects_five_fields() {
        assert!(format!("{TID}\t9\t0.50\terror\t2001").parse::<ProgressRecord>().is_err());
    }

    #[test]
    fn percent_is_clamped_on_construction() {
        assert_eq!(ProgressRecord::new(TID, 0, 1.7, TaskState::Running).percent, 1.0);
        assert_eq!(ProgressRecord::new(TID, 0, -0.1, TaskState::Running).percent, 0.0);
    }
}
