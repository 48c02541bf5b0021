use std::fmt::Write;

use pipeliner::PipelineItem;

/// Text of the email, built line by line as items arrive.
///
/// Each item becomes one line `"<n> : <item>"`, numbered from 1, terminated by CRLF.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MessageBody {
    text: String,
    lines: usize,
}

impl MessageBody {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, item: &PipelineItem) {
        self.lines += 1;
        // writing to a String never fails
        let _ = write!(self.text, "{} : {}\r\n", self.lines, item);
    }

    pub fn lines(&self) -> usize {
        self.lines
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn into_string(self) -> String {
        self.text
    }
}
