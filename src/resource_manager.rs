use crate::domain::events::Event;
use crate::domain::fixture::Fixture;
use crate::domain::resource_name::{ResourceName, ResourceNameError};
use crate::session::{Session, SessionError};
use crate::store::{Store, StoreOptions, StoreSnapshot};
use thiserror::Error;
use tokio::sync::mpsc::Sender;
use tokio::sync::watch::Receiver as WatchReceiver;
use tokio::sync::{mpsc, oneshot};
use tokio::task;
use tracing::{info, instrument};

/// Entry point to the simulated resources, hands out [`Session`]s.
#[derive(Debug, Clone)]
pub struct ResourceManager {
    tx: Sender<Event>,
    notifier: WatchReceiver<StoreSnapshot>,
}

impl ResourceManager {
    /// Starts a store for the given fixtures on the current runtime.
    pub fn spawn(fixtures: &[Fixture], options: StoreOptions, buffer_size: usize) -> Self {
        let (tx, rx) = mpsc::channel::<Event>(buffer_size.max(1));
        let mut store = Store::new(rx, fixtures, options);
        let notifier = store.notifier();

        task::spawn(async move {
            store.listen().await;
        });

        ResourceManager { tx, notifier }
    }

    pub fn notifier(&self) -> WatchReceiver<StoreSnapshot> {
        self.notifier.clone()
    }

    pub async fn list_resources(&self) -> Result<Vec<ResourceName>, ResourceManagerError> {
        let (reply, response) = oneshot::channel();
        self.tx
            .send(Event::ListResources { reply })
            .await
            .map_err(|_| ResourceManagerError::Session(SessionError::StoreUnavailable))?;
        response.await.map_err(|_| ResourceManagerError::Session(SessionError::StoreUnavailable))
    }

    /// Opens a session, `GPIB::1::INSTR` and `GPIB0::1::INSTR` name the same resource.
    #[instrument(skip(self))]
    pub async fn open_resource(&self, address: &str) -> Result<Session, ResourceManagerError> {
        let resource = ResourceName::parse(address)?;

        let (reply, response) = oneshot::channel();
        self.tx
            .send(Event::Open { resource, reply })
            .await
            .map_err(|_| ResourceManagerError::Session(SessionError::StoreUnavailable))?;
        let info = response
            .await
            .map_err(|_| ResourceManagerError::Session(SessionError::StoreUnavailable))?
            .map_err(SessionError::from)?;

        info!("🔌 Opened '{}'", info.resource);
        Ok(Session::new(info, self.tx.clone()))
    }
}

#[derive(Error, Debug, PartialEq, Clone)]
pub enum ResourceManagerError {
    #[error(transparent)]
    InvalidResourceName(#[from] ResourceNameError),
    #[error(transparent)]
    Session(#[from] SessionError),
}
