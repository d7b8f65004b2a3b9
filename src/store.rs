use crate::domain::Value;
use crate::domain::device::{Device, Outcome};
use crate::domain::events::{Event, SessionId, SessionInfo, StoreError};
use crate::domain::fixture::Fixture;
use crate::domain::resource_name::ResourceName;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::mpsc::Receiver;
use tokio::sync::watch;
use tokio::sync::watch::{Receiver as WatchReceiver, Sender as WatchSender};
use tracing::{debug, info, instrument, warn};

pub type DeviceSnapshot = BTreeMap<String, Value>;
pub type StoreSnapshot = Arc<BTreeMap<ResourceName, DeviceSnapshot>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StoreOptions {
    /// Restore the defaults of a device when its last session closes.
    pub reset_on_last_close: bool,
}

#[derive(Debug)]
struct SimulatedResource {
    device: Device,
    sessions: HashSet<SessionId>,
}

/// Owns the state of every simulated resource. Sessions talk to it through [`Event`]s.
#[derive(Debug)]
pub struct Store {
    resources: BTreeMap<ResourceName, SimulatedResource>,
    sessions: HashMap<SessionId, ResourceName>,
    next_session_id: SessionId,
    options: StoreOptions,
    rx: Receiver<Event>,
    notifier_tx: WatchSender<StoreSnapshot>,
    notifier_rx: WatchReceiver<StoreSnapshot>,
}

impl Store {
    pub fn new(rx: Receiver<Event>, fixtures: &[Fixture], options: StoreOptions) -> Self {
        let mut resources = BTreeMap::new();
        for (name, device) in fixtures.iter().flat_map(Fixture::instantiate) {
            if resources.contains_key(&name) {
                warn!("⚠️ Resource '{}' is defined by more than one fixture, keeping the first", name);
                continue;
            }
            resources.insert(
                name,
                SimulatedResource {
                    device,
                    sessions: HashSet::new(),
                },
            );
        }

        let snapshot = Arc::new(resources.iter().map(|(name, r)| (name.clone(), r.device.snapshot())).collect());
        let (notifier_tx, notifier_rx) = watch::channel::<StoreSnapshot>(snapshot);

        Store {
            resources,
            sessions: HashMap::new(),
            next_session_id: 1,
            options,
            rx,
            notifier_tx,
            notifier_rx,
        }
    }

    pub fn notifier(&self) -> WatchReceiver<StoreSnapshot> {
        self.notifier_rx.clone()
    }

    #[instrument(skip(self))]
    pub async fn listen(&mut self) {
        info!("🔵 Serving {} simulated resource(s)", self.resources.len());
        while let Some(event) = self.rx.recv().await {
            debug!("🔵 Received event: {:?}", event);
            match event {
                Event::Open { resource, reply } => {
                    reply.send(self.open(resource)).unwrap_or_default();
                }
                Event::Close { session, reply } => {
                    let result = self.close(session);
                    if let Some(reply) = reply {
                        reply.send(result).unwrap_or_default();
                    }
                }
                Event::Message { session, message, reply } => {
                    reply.send(self.message(session, &message)).unwrap_or_default();
                }
                Event::ListResources { reply } => {
                    reply.send(self.resources.keys().cloned().collect()).unwrap_or_default();
                }
            }
        }
        info!("🔵 All senders are gone, store stopped");
    }

    fn open(&mut self, resource: ResourceName) -> Result<SessionInfo, StoreError> {
        let simulated = self
            .resources
            .get_mut(&resource)
            .ok_or_else(|| StoreError::UnknownResource(resource.to_string()))?;
        let eom = simulated
            .device
            .eom(resource.interface_type())
            .cloned()
            .ok_or_else(|| StoreError::UnknownResource(resource.to_string()))?;

        let id = self.next_session_id;
        self.next_session_id += 1;
        simulated.sessions.insert(id);
        self.sessions.insert(id, resource.clone());

        info!(session = id, "🟢 Opened session to '{}' ({})", resource, simulated.device.name());
        Ok(SessionInfo {
            id,
            device: simulated.device.name().to_string(),
            resource,
            eom,
        })
    }

    fn close(&mut self, session: SessionId) -> Result<(), StoreError> {
        let resource = self.sessions.remove(&session).ok_or(StoreError::UnknownSession(session))?;
        let Some(simulated) = self.resources.get_mut(&resource) else {
            return Ok(());
        };

        simulated.sessions.remove(&session);
        info!(session = session, "🔴 Closed session to '{}'", resource);

        if self.options.reset_on_last_close && simulated.sessions.is_empty() {
            simulated.device.reset();
            info!("🔄 Reset '{}' after its last session closed", resource);
            self.publish(&resource);
        }
        Ok(())
    }

    fn message(&mut self, session: SessionId, message: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let resource = self.sessions.get(&session).cloned().ok_or(StoreError::UnknownSession(session))?;
        let simulated = self
            .resources
            .get_mut(&resource)
            .ok_or_else(|| StoreError::UnknownResource(resource.to_string()))?;

        let revision = simulated.device.revision();
        let outcome = simulated.device.handle(message);
        let changed = simulated.device.revision() != revision;
        match &outcome {
            Outcome::Error { kind, reason, .. } => warn!(session = session, "⚠️ {} on '{}': {}", kind, resource, reason),
            Outcome::Reply(reply) => debug!(session = session, "🔹 '{}' answered {} byte(s)", resource, reply.len()),
            Outcome::Silent => debug!(session = session, "🔹 '{}' accepted '{}'", resource, message),
        }

        if changed {
            self.publish(&resource);
        }
        Ok(outcome.into_reply())
    }

    fn publish(&self, resource: &ResourceName) {
        let Some(simulated) = self.resources.get(resource) else {
            return;
        };
        let snapshot = simulated.device.snapshot();

        self.notifier_tx.send_if_modified(|current| {
            if current.get(resource) == Some(&snapshot) {
                return false;
            }
            let mut updated = current.as_ref().clone();
            updated.insert(resource.clone(), snapshot);
            *current = Arc::new(updated);
            true
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::property::OutOfRangePolicy;
    use crate::fixture_loader::from_yaml;
    use pretty_assertions::assert_eq;
    use tokio::sync::{mpsc, oneshot};

    fn fixture() -> Fixture {
        from_yaml(include_str!("../tests/resources/fixtures/multimeter.yaml"), OutOfRangePolicy::Reject).unwrap()
    }

    fn gpib() -> ResourceName {
        ResourceName::parse("GPIB0::5::INSTR").unwrap()
    }

    fn store(options: StoreOptions) -> Store {
        let (_tx, rx) = mpsc::channel(1);
        Store::new(rx, &[fixture()], options)
    }

    #[test]
    fn opens_sessions_for_known_resources_only() {
        let mut store = store(StoreOptions::default());

        let info = store.open(gpib()).unwrap();
        let unknown = store.open(ResourceName::parse("GPIB0::9::INSTR").unwrap());

        assert_eq!(info.id, 1);
        assert_eq!(info.device, "multimeter");
        assert_eq!(info.eom.response, "\n");
        assert_eq!(unknown, Err(StoreError::UnknownResource("GPIB0::9::INSTR".to_string())));
    }

    #[test]
    fn resources_bound_to_the_same_device_do_not_share_state() {
        let mut store = store(StoreOptions::default());
        let gpib = store.open(gpib()).unwrap();
        let socket = store.open(ResourceName::parse("TCPIP::localhost::5555::SOCKET").unwrap()).unwrap();

        store.message(gpib.id, ":VOLT:RANG 1").unwrap();

        assert_eq!(store.message(gpib.id, ":VOLT:RANG?").unwrap(), Some(b"1.000".to_vec()));
        assert_eq!(store.message(socket.id, ":VOLT:RANG?").unwrap(), Some(b"10.000".to_vec()));
    }

    #[test]
    fn publishes_a_snapshot_when_state_changes() {
        let mut store = store(StoreOptions::default());
        let mut notifier = store.notifier();
        notifier.mark_unchanged();
        let session = store.open(gpib()).unwrap();

        store.message(session.id, "*IDN?").unwrap();
        store.message(session.id, ":VOLT:RANG?").unwrap();
        store.message(session.id, ":VOLT:RANG 500").unwrap();
        assert!(!notifier.has_changed().unwrap());

        store.message(session.id, ":VOLT:RANG 1").unwrap();
        assert!(notifier.has_changed().unwrap());
        assert_eq!(notifier.borrow_and_update()[&gpib()]["range"], Value::Float(1.0));
    }

    #[test]
    fn resets_the_device_when_the_last_session_closes() {
        let mut store = store(StoreOptions { reset_on_last_close: true });
        let first = store.open(gpib()).unwrap();
        let second = store.open(gpib()).unwrap();
        store.message(first.id, ":VOLT:RANG 1").unwrap();

        store.close(first.id).unwrap();
        assert_eq!(store.message(second.id, ":VOLT:RANG?").unwrap(), Some(b"1.000".to_vec()));

        store.close(second.id).unwrap();
        let third = store.open(gpib()).unwrap();
        assert_eq!(store.message(third.id, ":VOLT:RANG?").unwrap(), Some(b"10.000".to_vec()));
    }

    #[test]
    fn keeps_the_state_after_the_last_session_closes_by_default() {
        let mut store = store(StoreOptions::default());
        let first = store.open(gpib()).unwrap();
        store.message(first.id, ":VOLT:RANG 1").unwrap();

        store.close(first.id).unwrap();
        let second = store.open(gpib()).unwrap();

        assert_eq!(store.message(second.id, ":VOLT:RANG?").unwrap(), Some(b"1.000".to_vec()));
    }

    #[test]
    fn rejects_messages_for_closed_sessions() {
        let mut store = store(StoreOptions::default());
        let session = store.open(gpib()).unwrap();
        store.close(session.id).unwrap();

        assert_eq!(store.message(session.id, "*IDN?"), Err(StoreError::UnknownSession(session.id)));
        assert_eq!(store.close(session.id), Err(StoreError::UnknownSession(session.id)));
    }

    #[test]
    fn keeps_the_first_definition_of_a_resource() {
        let (_tx, rx) = mpsc::channel(1);
        let store = Store::new(rx, &[fixture(), fixture()], StoreOptions::default());

        assert_eq!(store.resources.len(), 2);
    }

    #[tokio::test]
    async fn listen_answers_events_until_all_senders_are_gone() {
        let (tx, rx) = mpsc::channel(4);
        let mut store = Store::new(rx, &[fixture()], StoreOptions::default());
        let handle = tokio::spawn(async move { store.listen().await });

        let (reply, response) = oneshot::channel();
        tx.send(Event::ListResources { reply }).await.unwrap();
        let resources = response.await.unwrap();

        assert_eq!(resources.len(), 2);
        drop(tx);
        handle.await.unwrap();
    }
}
