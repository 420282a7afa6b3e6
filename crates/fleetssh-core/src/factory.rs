//! Transport construction seam

use std::sync::Arc;

use async_trait::async_trait;

use fleetssh_exec::{ExecError, LocalTransport, SshTransportBuilder, Transport};

use crate::config::ClientConfig;
use crate::host::HostAddr;

/// Builds the transport a host is driven through
///
/// Allows injection of mock transports in tests.
#[async_trait]
pub trait TransportFactory: Send + Sync {
    /// Create an unconnected transport for `addr`
    async fn create_transport(
        &self,
        addr: &HostAddr,
        config: &ClientConfig,
    ) -> Result<Arc<dyn Transport>, ExecError>;
}

/// SSH for remote hosts, local execution for `localhost`
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultTransportFactory;

impl DefaultTransportFactory {
    fn is_local(hostname: &str) -> bool {
        matches!(hostname, "localhost" | "127.0.0.1" | "::1")
    }
}

#[async_trait]
impl TransportFactory for DefaultTransportFactory {
    async fn create_transport(
        &self,
        addr: &HostAddr,
        config: &ClientConfig,
    ) -> Result<Arc<dyn Transport>, ExecError> {
        if Self::is_local(&addr.hostname) {
            return Ok(Arc::new(LocalTransport::new()));
        }

        let auth = config
            .auth()
            .map_err(|e| ExecError::ConfigError(e.to_string()))?;

        let transport = SshTransportBuilder::new(&addr.hostname, &config.user, auth)
            .with_port(addr.port)
            .with_connect_timeout(config.connect_timeout())
            .build();

        Ok(Arc::new(transport))
    }
}
