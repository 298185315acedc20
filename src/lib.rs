pub mod call;
pub mod config;

pub use call::{
    CallEntry, CallError, CallEvent, CallResult, CallSnapshot, Collaborators,
    SessionConnectionManager, SessionDescriptor,
};
pub use config::{CallConfig, CallConfigFile, ConfigError, IceServerConfig};
