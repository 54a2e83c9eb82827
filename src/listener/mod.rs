use log::{debug, info};
use serde_json::Value;
use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex, PoisonError,
    },
    thread::{self, JoinHandle},
};
use thiserror::Error;
use tiny_http::Server;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// The HTTP server receiving the webhooks.
mod http;
/// Normalization of GitHub-style push events.
pub mod payload;

/// A custom error for describing the error cases of the listener.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// Cannot start listening, e.g. the address is invalid or in use.
    #[error("not configured correctly: {0}")]
    Misconfigured(String),
    /// The payload is not a push event.
    #[error("invalid push payload: {0}")]
    InvalidPayload(String),
}

/// A push or tag event of the upstream repository.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PushNotification {
    pub branch_name: String,
    pub tag_name: Option<String>,
    /// The commit the branch or tag points to after the push.
    pub exact_revision: Option<String>,
    /// The upstream repository identifier, e.g. `owner/name`.
    pub repository: Option<String>,
}

impl PushNotification {
    /// Creates a notification of a push to a branch.
    pub fn push(branch_name: &str) -> Self {
        PushNotification {
            branch_name: branch_name.to_string(),
            tag_name: None,
            exact_revision: None,
            repository: None,
        }
    }

    /// Creates a notification of a tag pushed on a branch.
    pub fn tag(branch_name: &str, tag_name: &str, exact_revision: &str) -> Self {
        PushNotification {
            branch_name: branch_name.to_string(),
            tag_name: Some(tag_name.to_string()),
            exact_revision: Some(exact_revision.to_string()),
            repository: None,
        }
    }
}

/// Identifies one subscription of a listener.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListenerHandle {
    pub id: usize,
    /// The repository the subscription is filtered to, every repository if none.
    pub repo: Option<String>,
}

/// Receives the notifications of one subscription.
pub struct Subscription {
    handle: ListenerHandle,
    rx: UnboundedReceiver<PushNotification>,
}

impl Subscription {
    pub fn handle(&self) -> ListenerHandle {
        self.handle.clone()
    }

    /// Wait for the next notification. Returns `None` if the listener is dropped.
    pub async fn recv(&mut self) -> Option<PushNotification> {
        self.rx.recv().await
    }
}

struct Subscriber {
    handle: ListenerHandle,
    tx: UnboundedSender<PushNotification>,
}

impl Subscriber {
    fn matches(&self, notification: &PushNotification) -> bool {
        match (&self.handle.repo, &notification.repository) {
            (None, _) => true,
            (Some(repo), Some(repository)) => repo.eq_ignore_ascii_case(repository),
            (Some(_), None) => false,
        }
    }
}

#[derive(Clone, Default)]
struct Subscribers(Arc<Mutex<Vec<Subscriber>>>);

impl Subscribers {
    fn add(&self, subscriber: Subscriber) {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(subscriber);
    }

    /// Send the notification to every matching subscriber, returns how many got it.
    fn dispatch(&self, notification: &PushNotification) -> usize {
        let mut subscribers = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|subscriber| !subscriber.tx.is_closed());
        subscribers
            .iter()
            .filter(|subscriber| subscriber.matches(notification))
            .filter(|subscriber| subscriber.tx.send(notification.clone()).is_ok())
            .count()
    }
}

/// Turns a port (e.g. "8000") into a listening address, other addresses are kept as is.
pub fn listening_address(port: &str) -> String {
    match port.parse::<u16>() {
        Ok(port) => format!("0.0.0.0:{port}"),
        Err(_) => port.to_string(),
    }
}

/// Receives push events of upstream repositories and delivers them to the subscriptions.
///
/// The HTTP server is only started with the first subscription. Every request gets
/// a 200 status code with plaintext "OK", except for bodies that are not push events.
pub struct NotificationListener {
    address: Option<String>,
    subscribers: Subscribers,
    server: Mutex<Option<JoinHandle<()>>>,
    next_id: AtomicUsize,
}

impl NotificationListener {
    /// Creates a listener for a port (e.g. "8000") or an address (e.g. "127.0.0.1:8000").
    pub fn new(port: &str) -> Self {
        NotificationListener {
            address: Some(listening_address(port)),
            subscribers: Subscribers::default(),
            server: Mutex::new(None),
            next_id: AtomicUsize::new(0),
        }
    }

    /// Creates a listener without an HTTP server, notifications can only be
    /// delivered with [NotificationListener::payload] or [NotificationListener::dispatch].
    pub fn detached() -> Self {
        NotificationListener {
            address: None,
            subscribers: Subscribers::default(),
            server: Mutex::new(None),
            next_id: AtomicUsize::new(0),
        }
    }

    pub fn address(&self) -> Option<&str> {
        self.address.as_deref()
    }

    fn start(&self) -> Result<(), ListenerError> {
        let Some(address) = &self.address else {
            return Ok(());
        };

        let mut server = self.server.lock().unwrap_or_else(PoisonError::into_inner);
        if server.is_none() {
            let listener = Server::http(address).map_err(|err| {
                ListenerError::Misconfigured(format!("cannot start server on {address} ({err})"))
            })?;
            info!("Listening on {address}...");

            let subscribers = self.subscribers.clone();
            *server = Some(thread::spawn(move || http::serve(listener, subscribers)));
        }

        Ok(())
    }

    /// Subscribe to the notifications of the repository, or every repository if none.
    pub fn create(&self, repo: Option<String>) -> Result<Subscription, ListenerError> {
        self.start()?;

        let (tx, rx) = mpsc::unbounded_channel();
        let handle = ListenerHandle {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            repo,
        };
        debug!("Subscribing to {:?}.", handle.repo);
        self.subscribers.add(Subscriber {
            handle: handle.clone(),
            tx,
        });

        Ok(Subscription { handle, rx })
    }

    /// Deliver the notification to the matching subscriptions.
    pub fn dispatch(&self, notification: &PushNotification) -> usize {
        self.subscribers.dispatch(notification)
    }

    /// Deliver a raw push event as if it arrived over HTTP.
    pub fn payload(&self, json: &Value) -> Result<usize, ListenerError> {
        match payload::normalize(json)? {
            Some(notification) => Ok(self.dispatch(&notification)),
            None => Ok(0),
        }
    }
}
