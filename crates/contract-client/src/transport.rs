use ethers::prelude::{Http, Middleware, Provider, Ws};
use url::Url;

use crate::ClientError;

/// JSON-RPC connection, selected by the URL scheme
pub enum Transport {
    Http(Provider<Http>),
    Ws(Provider<Ws>),
}

impl Transport {
    /// HTTP providers are created lazily; a websocket is dialed immediately.
    pub async fn connect(rpc_url: &str) -> Result<Self, ClientError> {
        let url = Url::parse(rpc_url)?;
        log::debug!("Connecting to {} over {}", url.host_str().unwrap_or_default(), url.scheme());
        match url.scheme() {
            "http" | "https" => Ok(Transport::Http(Provider::new(Http::new(url)))),
            "ws" | "wss" => Ok(Transport::Ws(Provider::connect(url.as_str()).await?)),
            _ => Err(ClientError::InvalidProtocol),
        }
    }

    /// Chain id reported by the node
    pub async fn chain_id(&self) -> Result<u64, ClientError> {
        let chain_id = match self {
            Transport::Http(provider) => provider.get_chainid().await?,
            Transport::Ws(provider) => provider.get_chainid().await?,
        };
        Ok(chain_id.as_u64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_rejects_unknown_scheme() {
        assert!(matches!(
            Transport::connect("ipc:///tmp/geth.ipc").await,
            Err(ClientError::InvalidProtocol)
        ));
    }

    #[tokio::test]
    async fn test_rejects_malformed_url() {
        let err = match Transport::connect("dream-rpc.somnia.network").await {
            Ok(_) => panic!("URL without scheme accepted"),
            Err(e) => e,
        };
        assert!(matches!(err, ClientError::InvalidRpcUrl(_)));
        assert!(err.is_configuration());
    }

    #[tokio::test]
    async fn test_http_does_not_dial() {
        assert!(matches!(
            Transport::connect("http://127.0.0.1:1/").await,
            Ok(Transport::Http(_))
        ));
        assert!(matches!(
            Transport::connect("https://dream-rpc.somnia.network").await,
            Ok(Transport::Http(_))
        ));
    }
}
