use std::fmt;

/// An opaque unit of data flowing through the pipeline.
///
/// Output relays never look inside items: they only move them from the upstream stage to the sink.
/// The display form is what sinks that need text (like the email module) use.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PipelineItem(String);

impl PipelineItem {
    pub fn new(content: impl Into<String>) -> Self {
        Self(content.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for PipelineItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for PipelineItem {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for PipelineItem {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}
