//! fleetssh-core: parallel fan-out of remote operations over a fleet
//!
//! A `ParallelClient` resolves a set of host specifiers, connects to each
//! through a `Transport`, and runs commands and file operations on every
//! live host through a bounded worker pool. Results come back as one
//! `FleetResults` entry per host. `FleetActor` wraps a client in a kameo
//! actor for shared use.

pub mod actor;
pub mod client;
pub mod config;
pub mod error;
pub mod factory;
pub mod host;
pub mod message;
pub mod pool;
pub mod postprocess;
pub mod record;
pub mod registry;
pub mod status;

pub use actor::fleet::{FleetActor, FleetActorArgs};
pub use client::{CONNECT_ERROR, NOT_CONNECTED, ParallelClient};
pub use config::{ClientConfig, DEFAULT_CONCURRENCY, DEFAULT_PORT};
pub use error::CoreError;
pub use factory::{DefaultTransportFactory, TransportFactory};
pub use host::{HostAddr, parse_host_list};
pub use message::{
    Connect, DeleteDir, DeleteFile, FleetInventory, ListHosts, MakeDir, PutFiles, RunCommand,
};
pub use pool::{Batch, WorkerPool};
pub use postprocess::{OutputField, TRANSFORMED_KEYS, reinterpret, transform_results};
pub use record::{
    CONNECTED_MESSAGE, CommandRecord, ConnectRecord, ERROR_RETURN_CODE, ErrorRecord,
    FleetResults, HostOutcome, Success, TRACEBACK_LIMIT, Upload,
};
pub use registry::{HostState, HostSummary, Registry, Session};
pub use status::{ResultStatus, derive_concurrency, result_status};

pub use fleetssh_exec::{ExecError, Transport};
