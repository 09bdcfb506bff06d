//! Lazily established connections.

/// State of an outbound connection that is opened on first use and dropped
/// on failure, to be reopened on the next use.
#[derive(Debug, Default)]
pub enum ConnectionState<H> {
    #[default]
    Disconnected,
    Connected(H),
}

impl<H> ConnectionState<H> {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected(_))
    }

    pub fn handle(&self) -> Option<&H> {
        match self {
            ConnectionState::Connected(handle) => Some(handle),
            ConnectionState::Disconnected => None,
        }
    }

    /// Run `connect` if currently disconnected. A failed connect leaves the
    /// state `Disconnected` and returns the error.
    pub async fn connect_if_needed<F, Fut, E>(&mut self, connect: F) -> Result<(), E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<H, E>>,
    {
        if !self.is_connected() {
            *self = ConnectionState::Connected(connect().await?);
        }
        Ok(())
    }

    /// Drop the handle; the next use reconnects.
    pub fn disconnect(&mut self) -> Option<H> {
        match std::mem::take(self) {
            ConnectionState::Connected(handle) => Some(handle),
            ConnectionState::Disconnected => None,
        }
    }
}
