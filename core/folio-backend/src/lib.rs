//! Backend persistence layer for Folio.
//!
//! Presents every supported content store, from git hosting APIs to an
//! in-memory test repository, through one capability contract: [`Backend`].
//!
//! # Architecture
//!
//! - [`host`] adapters translate repository primitives (read, hash, commit,
//!   branches, change requests) into provider API calls
//! - [`SaveOrchestrator`] turns a save into a state machine with optimistic
//!   concurrency against the entry's base hash, retries and compensation
//! - [`WorkflowManager`] keeps unpublished entries on per-entry branches
//! - [`HostedBackend`] composes the above with the entry serializer
//! - [`BackendRegistry`] builds backends by identifier at startup
//! - [`proxy`] carries the contract over HTTP for local development

mod backend;
mod config;
mod error;
mod hosted;
mod media;
mod orchestrator;
mod registry;
mod retry;
mod workflow;

pub mod host;
pub mod proxy;

pub use backend::{Backend, EntryStream, PersistOptions, UnpublishedEntry};
pub use config::{BackendConfig, Credentials, PublishMode};
pub use error::{BackendError, BackendResult, ErrorPayload, ErrorResponse};
pub use host::{ChangeRequest, CommitOutcome, HostApi, HostCapabilities, RemoteFile};
pub use hosted::HostedBackend;
pub use media::MediaHandler;
pub use orchestrator::{SaveOrchestrator, SavePlan, SaveState};
pub use proxy::{ProxyBackend, ProxyRequest, dispatch};
pub use registry::{BackendFactory, BackendKind, BackendRegistry};
pub use retry::{RetryConfig, with_retry, with_retry_when};
pub use workflow::WorkflowManager;
