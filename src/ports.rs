use std::error::Error;
use std::fmt;

use crate::metadata::MetadataDocument;
use crate::os::OsFacade;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortError {
    Exhausted { start: u16 },
}

impl fmt::Display for PortError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortError::Exhausted { start } => {
                write!(f, "no free port found between {} and {}", start, u16::MAX)
            }
        }
    }
}

impl Error for PortError {}

pub struct PortAllocator<'a, O: OsFacade> {
    os: &'a O,
}

impl<'a, O: OsFacade> PortAllocator<'a, O> {
    pub fn new(os: &'a O) -> Self {
        Self { os }
    }

    /// First port at or after the start point that no active record holds
    /// and nothing on the machine is listening on. Nothing is reserved; the
    /// caller commits the port by persisting a record.
    pub fn next_available_port(
        &self,
        document: &MetadataDocument,
        preferred: Option<u16>,
    ) -> Result<u16, PortError> {
        let start = preferred.unwrap_or(document.next_port).max(1);
        let mut candidate = start;
        loop {
            if !document.is_port_assigned(candidate) && !self.os.is_port_bound(candidate) {
                return Ok(candidate);
            }
            tracing::debug!(port = candidate, "port unavailable, probing next");
            candidate = candidate
                .checked_add(1)
                .ok_or(PortError::Exhausted { start })?;
        }
    }
}
