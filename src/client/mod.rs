//! Client side of the service: an HTTP client and a cancellable status poller.

pub mod api_client;
pub mod poller;

pub use api_client::{ApiClient, ClientError};
pub use poller::{Phase, PollOutcome, PollerConfig, ProgressUpdate, StatusPoller, StatusSource};
