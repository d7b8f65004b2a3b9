use crate::domain::device::Eom;
use crate::domain::resource_name::ResourceName;
use std::fmt::{Debug, Formatter};
use thiserror::Error;
use tokio::sync::oneshot;

pub type SessionId = u64;

/// What a session needs to know about the resource it opened.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionInfo {
    pub id: SessionId,
    pub resource: ResourceName,
    pub device: String,
    pub eom: Eom,
}

pub enum Event {
    Open {
        resource: ResourceName,
        reply: oneshot::Sender<Result<SessionInfo, StoreError>>,
    },
    Close {
        session: SessionId,
        reply: Option<oneshot::Sender<Result<(), StoreError>>>,
    },
    Message {
        session: SessionId,
        message: String,
        reply: oneshot::Sender<Result<Option<Vec<u8>>, StoreError>>,
    },
    ListResources {
        reply: oneshot::Sender<Vec<ResourceName>>,
    },
}

impl Debug for Event {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Event::Open { resource, .. } => write!(f, "Open({})", resource),
            Event::Close { session, .. } => write!(f, "Close({})", session),
            Event::Message { session, message, .. } => write!(f, "Message({}, {:?})", session, message),
            Event::ListResources { .. } => write!(f, "ListResources"),
        }
    }
}

#[derive(Error, Debug, PartialEq, Clone)]
pub enum StoreError {
    #[error("resource '{0}' does not exist")]
    UnknownResource(String),
    #[error("session {0} is not open")]
    UnknownSession(SessionId),
}
