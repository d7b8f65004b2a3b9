use crate::domain::Value;
use crate::domain::resource_name::ResourceName;
use crate::store::StoreSnapshot;
use tokio::sync::watch::Receiver;
use tracing::{info, instrument};

#[derive(Debug, PartialEq)]
pub struct Change<'a> {
    pub resource: &'a ResourceName,
    pub property: &'a str,
    pub previous: Option<&'a Value>,
    pub current: &'a Value,
}

#[instrument(skip_all)]
pub async fn store_listener(mut rx: Receiver<StoreSnapshot>) {
    let mut previous: StoreSnapshot = rx.borrow_and_update().clone();

    while rx.changed().await.is_ok() {
        let snapshot: StoreSnapshot = rx.borrow_and_update().clone();
        for change in changes(&previous, &snapshot) {
            match change.previous {
                Some(previous) => info!("🟢 Updated '{}', set '{}' to '{}', was '{}'", change.resource, change.property, change.current, previous),
                None => info!("🟢 Updated '{}', set '{}' to '{}'", change.resource, change.property, change.current),
            }
        }
        previous = snapshot;
    }
}

/// The values that differ between two snapshots.
pub fn changes<'a>(previous: &'a StoreSnapshot, current: &'a StoreSnapshot) -> Vec<Change<'a>> {
    current
        .iter()
        .flat_map(|(resource, values)| {
            let before = previous.get(resource);
            values.iter().filter_map(move |(property, value)| {
                let previous = before.and_then(|b| b.get(property));
                (previous != Some(value)).then_some(Change {
                    resource,
                    property,
                    previous,
                    current: value,
                })
            })
        })
        .collect()
}
