//! TCP front end for the ICAP service.
//!
//! One task per connection; each connection serves messages in order until
//! the client closes it, asks for `Connection: close`, or sends something
//! unparsable.

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;

use crate::icap::read_request;
use crate::service::IcapService;

/// Accept connections until the listener fails.
pub async fn serve(listener: TcpListener, service: Arc<IcapService>) -> std::io::Result<()> {
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                tracing::warn!(error = %e, "accept failed");
                continue;
            }
        };

        let service = service.clone();
        tokio::spawn(async move {
            tracing::debug!(%peer, "ICAP connection opened");
            handle_connection(stream, &service).await;
            tracing::debug!(%peer, "ICAP connection closed");
        });
    }
}

/// Serve ICAP messages on one connection.
pub async fn handle_connection<S>(stream: S, service: &IcapService)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut stream = BufReader::new(stream);

    loop {
        let response = match read_request(&mut stream).await {
            Ok(Some(request)) => service.respond(&request),
            Ok(None) => break,
            Err(e) => match e.status() {
                Some(status) => {
                    tracing::warn!(error = %e, "malformed ICAP message");
                    service.error_response(status)
                }
                None => {
                    tracing::debug!(error = %e, "ICAP connection dropped");
                    break;
                }
            },
        };

        if let Err(e) = stream.get_mut().write_all(&response.encode()).await {
            tracing::debug!(error = %e, "failed to write ICAP response");
            break;
        }
        if let Err(e) = stream.get_mut().flush().await {
            tracing::debug!(error = %e, "failed to flush ICAP response");
            break;
        }

        if response.close {
            break;
        }
    }

    let _ = stream.get_mut().shutdown().await;
}
