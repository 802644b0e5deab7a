//! User identity to live connection lookup, used for invitation delivery
//!
//! Registration is last-writer-wins. Re-registering an identity from a new
//! connection replaces the entry but leaves the previous connection open;
//! it keeps working for rooms and simply stops receiving invitation pushes
//! until it times out or disconnects.

use std::collections::HashMap;

use crate::handle::{ConnId, ConnectionHandle};

#[derive(Debug, Default)]
pub struct Registry {
    users: HashMap<String, ConnectionHandle>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `user_uuid` to `conn`, returning the handle it replaced, if any
    pub fn register(
        &mut self,
        user_uuid: impl Into<String>,
        conn: ConnectionHandle,
    ) -> Option<ConnectionHandle> {
        self.users.insert(user_uuid.into(), conn)
    }

    pub fn get(&self, user_uuid: &str) -> Option<&ConnectionHandle> {
        self.users.get(user_uuid)
    }

    /// Remove the entry only if it still belongs to `conn_id`
    pub fn unregister(&mut self, user_uuid: &str, conn_id: ConnId) -> bool {
        match self.users.get(user_uuid) {
            Some(conn) if conn.id() == conn_id => {
                self.users.remove(user_uuid);
                true
            }
            _ => false,
        }
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}
