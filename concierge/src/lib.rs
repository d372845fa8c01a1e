/// Travel concierge library
/// Routes travel requests to hotel and flight search, asks for missing
/// details, retries transient upstream failures and normalizes every result.
/// Shared by the CLI and HTTP server binaries.

pub mod capabilities;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod extract;
pub mod llm;
pub mod normalizer;
pub mod outcome;
pub mod registry;
pub mod request;
pub mod retry;
pub mod search;
pub mod server;
pub mod summarizer;
pub mod validator;

pub use capabilities::{flight_descriptor, hotel_descriptor, travel_registry};
pub use config::{ConciergeConfig, RouterMode, SummarizerMode};
pub use dispatcher::{DispatchReport, DispatchState, Dispatcher};
pub use error::{ConfigError, ErrorKind, RegistryError, UpstreamError};
pub use outcome::Outcome;
pub use registry::{CapabilityDescriptor, CapabilityHandler, CapabilityRegistry, IntentClassifier};
pub use request::Request;
pub use retry::{RetryPolicy, RetryingExecutor};
pub use server::{build_router, serve, AppState};
pub use travel_protocol::{ConciergeResponse, ResponseStatus};
