//! Window clients the worker can reach.

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;
use tracing::debug;
use url::Url;

use crate::messenger::WorkerMessage;
use crate::ServiceWorkerError;

/// Unique identifier for a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(u64);

impl ClientId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// Client type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClientType {
    #[default]
    Window,
    Worker,
    All,
}

/// An open page or worker.
#[derive(Debug, Clone)]
pub struct Client {
    pub id: ClientId,
    pub url: Url,
    pub client_type: ClientType,
    pub focused: bool,
    /// Whether this worker controls the client.
    pub controlled: bool,
    sender: Option<mpsc::UnboundedSender<WorkerMessage>>,
}

impl Client {
    /// Post a message. Returns false if the client has gone away.
    pub fn post_message(&self, message: &WorkerMessage) -> bool {
        let delivered = self
            .sender
            .as_ref()
            .is_some_and(|tx| tx.send(message.clone()).is_ok());

        if !delivered {
            debug!(client = ?self.id, "Dropped message for unreachable client");
        }
        delivered
    }

    pub fn is_window(&self) -> bool {
        self.client_type == ClientType::Window
    }
}

/// Options for `Clients::match_all`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClientMatchOptions {
    pub include_uncontrolled: bool,
    pub client_type: ClientType,
}

impl ClientMatchOptions {
    /// Every window, controlled or not.
    pub fn all_windows() -> Self {
        Self {
            include_uncontrolled: true,
            client_type: ClientType::Window,
        }
    }
}

/// Clients in connection order.
#[derive(Debug, Default)]
pub struct Clients {
    clients: Vec<Client>,
}

impl Clients {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a client and hand back the receiving end of its message port.
    pub fn connect(
        &mut self,
        url: Url,
        client_type: ClientType,
        controlled: bool,
    ) -> (ClientId, mpsc::UnboundedReceiver<WorkerMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = ClientId::new();
        self.clients.push(Client {
            id,
            url,
            client_type,
            focused: false,
            controlled,
            sender: Some(tx),
        });
        (id, rx)
    }

    pub fn get(&self, id: ClientId) -> Option<&Client> {
        self.clients.iter().find(|c| c.id == id)
    }

    /// Matching clients, in connection order.
    pub fn match_all(&self, options: ClientMatchOptions) -> Vec<&Client> {
        self.clients
            .iter()
            .filter(|c| options.include_uncontrolled || c.controlled)
            .filter(|c| match options.client_type {
                ClientType::All => true,
                t => c.client_type == t,
            })
            .collect()
    }

    /// Focus a window, unfocusing every other one.
    pub fn focus(&mut self, id: ClientId) -> Result<&Client, ServiceWorkerError> {
        let index = self
            .clients
            .iter()
            .position(|c| c.id == id)
            .ok_or_else(|| ServiceWorkerError::NotFound(format!("client {id:?}")))?;

        if !self.clients[index].is_window() {
            return Err(ServiceWorkerError::StateError(
                "Can only focus window clients".to_string(),
            ));
        }

        for client in &mut self.clients {
            client.focused = client.id == id;
        }
        Ok(&self.clients[index])
    }

    /// Open a new focused window at `url`.
    ///
    /// The new page has no message port until it connects itself.
    pub fn open_window(&mut self, url: Url) -> ClientId {
        for client in &mut self.clients {
            client.focused = false;
        }

        let id = ClientId::new();
        self.clients.push(Client {
            id,
            url,
            client_type: ClientType::Window,
            focused: true,
            controlled: true,
            sender: None,
        });
        id
    }

    pub fn remove(&mut self, id: ClientId) -> Option<Client> {
        let index = self.clients.iter().position(|c| c.id == id)?;
        Some(self.clients.remove(index))
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messenger::AckStatus;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_match_all_respects_options() {
        let mut clients = Clients::new();
        clients.connect(url("https://trivia.example/"), ClientType::Window, true);
        clients.connect(url("https://trivia.example/menu.html"), ClientType::Window, false);
        clients.connect(url("https://trivia.example/worker.js"), ClientType::Worker, true);

        assert_eq!(clients.match_all(ClientMatchOptions::default()).len(), 1);
        assert_eq!(clients.match_all(ClientMatchOptions::all_windows()).len(), 2);
        assert_eq!(
            clients
                .match_all(ClientMatchOptions {
                    include_uncontrolled: true,
                    client_type: ClientType::All,
                })
                .len(),
            3
        );
    }

    #[test]
    fn test_match_all_keeps_connection_order() {
        let mut clients = Clients::new();
        let (first, _rx1) = clients.connect(url("https://trivia.example/a"), ClientType::Window, true);
        let (second, _rx2) = clients.connect(url("https://trivia.example/b"), ClientType::Window, true);

        let ids: Vec<_> = clients
            .match_all(ClientMatchOptions::all_windows())
            .iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(ids, vec![first, second]);
    }

    #[test]
    fn test_focus_is_exclusive() {
        let mut clients = Clients::new();
        let (a, _rx1) = clients.connect(url("https://trivia.example/a"), ClientType::Window, true);
        let (b, _rx2) = clients.connect(url("https://trivia.example/b"), ClientType::Window, true);

        clients.focus(a).unwrap();
        clients.focus(b).unwrap();

        assert!(!clients.get(a).unwrap().focused);
        assert!(clients.get(b).unwrap().focused);
    }

    #[test]
    fn test_focus_rejects_workers() {
        let mut clients = Clients::new();
        let (w, _rx) = clients.connect(url("https://trivia.example/w.js"), ClientType::Worker, true);

        assert!(matches!(
            clients.focus(w),
            Err(ServiceWorkerError::StateError(_))
        ));
    }

    #[test]
    fn test_post_message_to_closed_port() {
        let mut clients = Clients::new();
        let (id, rx) = clients.connect(url("https://trivia.example/"), ClientType::Window, true);
        drop(rx);

        let ack = WorkerMessage::ack();
        assert!(!clients.get(id).unwrap().post_message(&ack));
        assert_eq!(ack, WorkerMessage::Ack { status: AckStatus::Received });
    }

    #[test]
    fn test_open_window() {
        let mut clients = Clients::new();
        let id = clients.open_window(url("https://trivia.example/"));

        let client = clients.get(id).unwrap();
        assert!(client.focused);
        assert!(client.is_window());
        assert!(!client.post_message(&WorkerMessage::ack()));

        assert!(clients.remove(id).is_some());
        assert!(clients.is_empty());
    }
}
