//! Listen address parsing

use std::fmt;
use trellis_core::RuntimeError;

/// How bytes on a connection are split into messages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    /// Every read chunk is delivered as is
    Tcp,
    /// Newline-delimited frames, delimiter stripped
    Text,
}

/// A parsed listen address (e.g. "text://0.0.0.0:5678")
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenAddress {
    pub transport: Transport,
    pub address: String,
}

impl ListenAddress {
    /// Parses a listen address
    ///
    /// # Returns
    /// `None` for an empty address (a worker without listener)
    pub fn parse(listen: &str) -> Result<Option<Self>, RuntimeError> {
        let listen = listen.trim();
        if listen.is_empty() {
            return Ok(None);
        }

        let invalid = |reason: &str| RuntimeError::InvalidListen {
            listen: listen.to_string(),
            reason: reason.to_string(),
        };

        let (scheme, address) = listen
            .split_once("://")
            .ok_or_else(|| invalid("expected <scheme>://<host>:<port>"))?;

        let transport = match scheme.to_ascii_lowercase().as_str() {
            "tcp" => Transport::Tcp,
            "text" => Transport::Text,
            _ => return Err(invalid("scheme must be tcp or text")),
        };

        let port = address
            .rsplit_once(':')
            .map(|(_, port)| port)
            .ok_or_else(|| invalid("missing port"))?;
        if port.parse::<u16>().is_err() {
            return Err(invalid("port must be a number between 0 and 65535"));
        }

        Ok(Some(Self {
            transport,
            address: address.to_string(),
        }))
    }
}

impl fmt::Display for ListenAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scheme = match self.transport {
            Transport::Tcp => "tcp",
            Transport::Text => "text",
        };
        write!(f, "{}://{}", scheme, self.address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tcp_and_text() {
        let tcp = ListenAddress::parse("tcp://0.0.0.0:5678").unwrap().unwrap();
        assert_eq!(tcp.transport, Transport::Tcp);
        assert_eq!(tcp.address, "0.0.0.0:5678");

        let text = ListenAddress::parse("TEXT://127.0.0.1:0").unwrap().unwrap();
        assert_eq!(text.transport, Transport::Text);
        assert_eq!(text.to_string(), "text://127.0.0.1:0");
    }

    #[test]
    fn test_parse_empty() {
        assert_eq!(ListenAddress::parse("").unwrap(), None);
        assert_eq!(ListenAddress::parse("   ").unwrap(), None);
    }

    #[test]
    fn test_parse_rejects_bad_addresses() {
        for listen in [
            "0.0.0.0:5678",
            "udp://0.0.0.0:5678",
            "tcp://localhost",
            "tcp://0.0.0.0:http",
            "tcp://0.0.0.0:70000",
        ] {
            let result = ListenAddress::parse(listen);
            assert!(
                matches!(result, Err(RuntimeError::InvalidListen { .. })),
                "{listen} should be rejected"
            );
        }
    }
}
