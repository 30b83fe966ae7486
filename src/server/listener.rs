use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tracing::{error, info};

use crate::autosend::AutosendHandle;
use crate::config::Config;
use crate::metrics::METRICS;
use crate::server::Connection;

/// TCP listener that accepts connections and spawns handlers.
pub struct Listener {
    listener: TcpListener,
    autosend: AutosendHandle,
    connection_limit: Arc<Semaphore>,
}

impl Listener {
    /// Create a new Listener bound to the configured address.
    pub async fn bind(config: &Config, autosend: AutosendHandle) -> std::io::Result<Self> {
        let listener = TcpListener::bind(config.bind).await?;
        info!("Listening on {}", listener.local_addr()?);

        Ok(Self {
            listener,
            autosend,
            connection_limit: Arc::new(Semaphore::new(config.max_connections)),
        })
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Run the accept loop, spawning a handler for each connection.
    pub async fn run(&self) -> std::io::Result<()> {
        loop {
            // Acquire a permit before accepting
            let permit = self
                .connection_limit
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| std::io::Error::other("connection limit closed"))?;

            let (socket, addr) = self.listener.accept().await?;
            let autosend = self.autosend.clone();

            tokio::spawn(async move {
                METRICS.connection_opened();
                let mut connection = Connection::new(socket, addr, autosend);

                if let Err(e) = connection.run().await {
                    error!("Connection error from {}: {}", addr, e);
                }

                METRICS.connection_closed();
                // Permit is dropped here, releasing the semaphore
                drop(permit);
            });
        }
    }
}
