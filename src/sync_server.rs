use actix::prelude::*;
use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::Serialize;
use std::collections::HashMap;

/// Announces that a store key was rewritten. Clients holding a copy of that
/// collection reload it; later revisions win.
#[derive(Message, Debug, Clone, PartialEq, Eq, Serialize)]
#[rtype(result = "()")]
pub struct StoreChanged {
    pub key: String,
    pub revision: u64,
    pub at: DateTime<Utc>,
}

#[derive(Message)]
#[rtype(result = "usize")]
pub struct Connect {
    pub user_id: String,
    pub addr: Recipient<StoreChanged>,
}

#[derive(Message)]
#[rtype(result = "()")]
pub struct Disconnect {
    pub id: usize,
}

/// Number of open change-feed connections.
#[derive(Message)]
#[rtype(result = "usize")]
pub struct Subscribers;

#[derive(Default)]
pub struct SyncServer {
    sessions: HashMap<usize, (String, Recipient<StoreChanged>)>,
    next_id: usize,
}

impl SyncServer {
    pub fn new() -> Self {
        SyncServer::default()
    }
}

impl Actor for SyncServer {
    type Context = Context<Self>;
}

impl Handler<Connect> for SyncServer {
    type Result = usize;

    fn handle(&mut self, msg: Connect, _: &mut Context<Self>) -> usize {
        self.next_id += 1;
        info!("User {} subscribed to changes (WS #{})", msg.user_id, self.next_id);
        self.sessions.insert(self.next_id, (msg.user_id, msg.addr));
        self.next_id
    }
}

impl Handler<Disconnect> for SyncServer {
    type Result = ();

    fn handle(&mut self, msg: Disconnect, _: &mut Context<Self>) {
        if let Some((user_id, _)) = self.sessions.remove(&msg.id) {
            info!("User {} unsubscribed (WS #{})", user_id, msg.id);
        }
    }
}

impl Handler<StoreChanged> for SyncServer {
    type Result = ();

    fn handle(&mut self, msg: StoreChanged, _: &mut Context<Self>) {
        debug!("Broadcasting {}@{} to {} client(s)", msg.key, msg.revision, self.sessions.len());
        for (_, addr) in self.sessions.values() {
            addr.do_send(msg.clone());
        }
    }
}

impl Handler<Subscribers> for SyncServer {
    type Result = usize;

    fn handle(&mut self, _: Subscribers, _: &mut Context<Self>) -> usize {
        self.sessions.len()
    }
}
