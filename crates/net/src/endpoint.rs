use crate::error::{ErrorKind, Result};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};

/// Longest application entity title the protocol allows.
pub const MAX_TITLE_LEN: usize = 16;

/// Connection parameters for the remote archive.
///
/// Retrieval is a push from the remote back to us, so besides the remote's
/// address and title we also advertise our own title and the port the
/// engine listens on for incoming transfers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    /// Local port retrieved files are delivered to.
    pub return_port: u16,
    /// Our application entity title.
    pub aet: String,
    /// The remote's application entity title.
    pub aec: String,
}

impl Endpoint {
    /// Rejects parameters no association could be made with.
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            exn::bail!(ErrorKind::InvalidEndpoint("host is empty".to_string()));
        }
        if self.port == 0 || self.return_port == 0 {
            exn::bail!(ErrorKind::InvalidEndpoint("port must be non-zero".to_string()));
        }
        for (name, title) in [("aet", &self.aet), ("aec", &self.aec)] {
            let title = title.trim();
            if title.is_empty() || title.len() > MAX_TITLE_LEN {
                exn::bail!(ErrorKind::InvalidEndpoint(format!(
                    "{name} must be 1 to {MAX_TITLE_LEN} characters"
                )));
            }
        }
        Ok(())
    }
}

impl Display for Endpoint {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}@{}:{}", self.aec, self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn endpoint() -> Endpoint {
        Endpoint {
            host: "pacs.example.org".to_string(),
            port: 104,
            return_port: 4006,
            aet: "REAPER".to_string(),
            aec: "PACS".to_string(),
        }
    }

    #[test]
    fn test_valid() {
        endpoint().validate().unwrap();
        assert_eq!(endpoint().to_string(), "PACS@pacs.example.org:104");
    }

    #[rstest]
    #[case::empty_host(Endpoint { host: " ".to_string(), ..endpoint() })]
    #[case::zero_port(Endpoint { port: 0, ..endpoint() })]
    #[case::zero_return_port(Endpoint { return_port: 0, ..endpoint() })]
    #[case::empty_aet(Endpoint { aet: String::new(), ..endpoint() })]
    #[case::long_aec(Endpoint { aec: "A".repeat(17), ..endpoint() })]
    fn test_invalid(#[case] endpoint: Endpoint) {
        let err = endpoint.validate().unwrap_err();
        assert!(matches!(*err, ErrorKind::InvalidEndpoint(_)));
    }
}
