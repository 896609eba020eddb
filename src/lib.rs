// Public modules
pub mod api;
pub mod auth;
pub mod chat;
pub mod client;
pub mod config;
pub mod controller;
pub mod credentials;
pub mod directory;
pub mod error;
pub mod observability;
pub mod render;
pub mod sse;
pub mod testing;
pub mod thread;
pub mod types;
pub mod utils;

// Re-exports
pub use api::{ChatApi, DeltaStream, ReplyStream};
pub use auth::{AuthStore, RegisterForm};
pub use client::SmartAsset;
pub use config::ClientConfig;
pub use controller::{ChatController, ChatView, SendOutcome};
pub use credentials::{CredentialStore, FileCredentialStore, MemoryCredentialStore};
pub use directory::SessionDirectory;
pub use error::{AppError, Error, FetchOp, Result};
pub use observability::register_biometrics;
pub use thread::{
    ContextTag, OptimisticMessage, SendPhase, SendTicket, StreamingPlaceholder, TempId,
    ThreadEvent, ThreadItem, ThreadState, Transition, reduce,
};
pub use types::*;
