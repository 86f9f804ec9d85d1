use std::error::Error;
use std::fmt;

#[derive(Debug)]
pub enum PartScanError {
    /// The query sequence is empty or contains non-nucleotide characters.
    Input(String),
    /// The component store could not be read; annotation cannot proceed.
    Store(anyhow::Error),
    /// The caller aborted the run via the cancellation token.
    Cancelled,
}

impl Error for PartScanError {}

impl fmt::Display for PartScanError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PartScanError::Input(msg) => write!(f, "Invalid input sequence: {msg}"),
            PartScanError::Store(e) => write!(f, "Component store unavailable: {e}"),
            PartScanError::Cancelled => write!(f, "Annotation cancelled"),
        }
    }
}

impl From<String> for PartScanError {
    fn from(msg: String) -> Self {
        PartScanError::Input(msg)
    }
}
