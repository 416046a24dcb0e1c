//! `[serve]` section configuration.
//!
//! ```toml
//! [serve]
//! interface = "127.0.0.1"   # 0.0.0.0 exposes the editor to the LAN
//! port = 6300               # JSON-RPC WebSocket endpoint
//! preview_port = 6301       # Optional HTTP server for the generated output
//! ```

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use serde::{Deserialize, Serialize};

use crate::config::{ConfigDiagnostics, FieldPath};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServeConfig {
    pub interface: IpAddr,
    pub port: u16,
    pub preview_port: Option<u16>,
}

impl ServeConfig {
    pub const PORT: FieldPath = FieldPath::new("serve.port");
    pub const PREVIEW_PORT: FieldPath = FieldPath::new("serve.preview_port");

    pub fn validate(&self, diag: &mut ConfigDiagnostics) {
        if self.port == 0 {
            diag.error(Self::PORT, "must not be zero");
        }
        if self.preview_port == Some(self.port) {
            diag.error(Self::PREVIEW_PORT, "must differ from `serve.port`");
        }
    }

    pub fn rpc_addr(&self) -> SocketAddr {
        SocketAddr::new(self.interface, self.port)
    }

    pub fn preview_addr(&self) -> Option<SocketAddr> {
        self.preview_port
            .map(|port| SocketAddr::new(self.interface, port))
    }
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            interface: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 6300,
            preview_port: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_parse_config;
    use std::net::Ipv6Addr;

    #[test]
    fn test_serve_defaults() {
        let config = test_parse_config("");
        assert_eq!(config.serve.interface, IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert_eq!(config.serve.port, 6300);
        assert!(config.serve.preview_addr().is_none());
    }

    #[test]
    fn test_serve_interface_variants() {
        let config = test_parse_config("[serve]\ninterface = \"::1\"\npreview_port = 9000");
        assert_eq!(config.serve.interface, IpAddr::V6(Ipv6Addr::LOCALHOST));
        assert_eq!(config.serve.preview_addr().map(|a| a.port()), Some(9000));
    }

    #[test]
    fn test_same_ports_rejected() {
        let config = test_parse_config("[serve]\nport = 7000\npreview_port = 7000");
        let mut diag = ConfigDiagnostics::new();
        config.serve.validate(&mut diag);
        assert_eq!(diag.errors()[0].field.as_str(), "serve.preview_port");
    }
}
