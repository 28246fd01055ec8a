mod bridge;
mod client;
pub mod config;
pub mod convert;
mod diff;
pub mod entity;
mod error;
mod logger;
pub mod protocol;
mod poller;
mod registry;
pub mod signing;
pub mod token;
mod types;

pub use bridge::{Bridge, BridgeBuilder, DEFAULT_TOKEN_PATH};
pub use client::{CloudClient, CloudClientBuilder};
pub use config::{Device, DeviceCatalog, EntitySpec, Secrets};
pub use entity::{Entity, EntityInfo};
pub use error::{Error, Result};
pub use logger::MessageLogMode;
pub use poller::{PollOutcome, PollReport, Poller, Publisher};
pub use protocol::{DpCommand, DpStatus};
pub use registry::{EntityId, EntityRegistry};
pub use signing::{Credentials, SignedHeaders};
pub use token::{Token, TokenManager, TokenStore};
pub use types::*;
