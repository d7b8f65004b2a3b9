use crate::domain::resource_name::ResourceName;
use crate::resource_manager::{ResourceManager, ResourceManagerError};
use crate::session::SessionError;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{error, info, instrument, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct ServerOptions {
    pub host: String,
    /// Idle connections are closed after this long, `None` keeps them open.
    pub read_timeout: Option<Duration>,
}

/// Serves one simulated socket resource on a TCP port.
#[derive(Debug)]
pub struct SocketServer {
    resource: ResourceName,
    listener: TcpListener,
    manager: ResourceManager,
    read_timeout: Option<Duration>,
}

/// Binds every `TCPIP::<host>::<port>::SOCKET` resource of the manager on its port and serves it in the background.
#[instrument(skip_all, fields(host = %options.host))]
pub async fn serve(manager: &ResourceManager, options: &ServerOptions) -> Result<Vec<JoinHandle<()>>, ServerError> {
    let resources = manager.list_resources().await?;

    let mut handles = vec![];
    for (resource, address) in socket_addresses(&resources, &options.host) {
        let server = bind(manager, &resource, &address, options.read_timeout).await?;
        handles.push(tokio::spawn(async move {
            server.run().await.unwrap_or_else(|e| error!("❌ Serving '{}' failed: {}", resource, e));
        }));
    }
    info!("✅  Serving {} socket resource(s)", handles.len());
    Ok(handles)
}

fn socket_addresses(resources: &[ResourceName], host: &str) -> Vec<(ResourceName, String)> {
    resources
        .iter()
        .filter_map(|resource| match resource {
            ResourceName::TcpipSocket { port, .. } => Some((resource.clone(), format!("{}:{}", host, port))),
            _ => None,
        })
        .collect()
}

pub async fn bind(manager: &ResourceManager, resource: &ResourceName, address: &str, read_timeout: Option<Duration>) -> Result<SocketServer, ServerError> {
    info!("Binding '{}' to {}...", resource, address);
    let listener = TcpListener::bind(address).await.map_err(|source| ServerError::Bind {
        address: address.to_string(),
        source,
    })?;
    info!("Binding '{}' to {}... OK", resource, address);

    Ok(SocketServer {
        resource: resource.clone(),
        listener,
        manager: manager.clone(),
        read_timeout,
    })
}

impl SocketServer {
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    pub fn resource(&self) -> &ResourceName {
        &self.resource
    }

    /// Accepts connections until the listener fails, each connection gets its own session.
    #[instrument(skip(self), fields(resource = %self.resource))]
    pub async fn run(self) -> Result<(), ServerError> {
        loop {
            let (socket, peer) = self.listener.accept().await?;
            info!("🔌 Accepted connection from {}", peer);

            let manager = self.manager.clone();
            let resource = self.resource.clone();
            let read_timeout = self.read_timeout;
            tokio::spawn(async move {
                match handle_connection(&manager, &resource, socket, read_timeout).await {
                    Ok(()) => info!("🔴 Connection from {} closed", peer),
                    Err(e) => warn!("⚠️ Connection from {} failed: {}", peer, e),
                }
            });
        }
    }
}

async fn handle_connection(manager: &ResourceManager, resource: &ResourceName, mut socket: TcpStream, read_timeout: Option<Duration>) -> Result<(), ServerError> {
    let mut session = manager.open_resource(&resource.to_string()).await?;
    let mut chunk = [0u8; 4096];

    loop {
        let read = match read_timeout {
            Some(duration) => match timeout(duration, socket.read(&mut chunk)).await {
                Ok(read) => read?,
                Err(_) => {
                    warn!("⏳ No data for {} seconds, closing", duration.as_secs_f64());
                    break;
                }
            },
            None => socket.read(&mut chunk).await?,
        };
        if read == 0 {
            break;
        }

        session.write_raw(&chunk[..read]).await?;
        for reply in session.take_replies() {
            socket.write_all(&reply).await?;
        }
    }

    session.close().await?;
    Ok(())
}

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("could not bind to '{address}': {source}")]
    Bind { address: String, source: io::Error },
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    ResourceManager(#[from] ResourceManagerError),
    #[error(transparent)]
    Session(#[from] SessionError),
}
