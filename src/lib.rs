pub mod codegen;
pub mod config;
pub mod contact;
pub mod engine;
pub mod magic_link;
pub mod model;
pub mod store;

pub use config::{FlowType, PasswordlessConfig};
pub use contact::{Contact, ContactError};
pub use engine::{
    consume::{ConsumeCode, ConsumeRequest},
    lifecycle::{CodeCreated, CreateNewCode},
    users::{SignInUp, UpdateUser},
    PasswordlessEngine,
};
pub use magic_link::{MagicLink, MagicLinkBuilder};
pub use model::{
    device::{Code, Device, DeviceState},
    user::PasswordlessUser,
};
pub use store::{AppendCode, CodeStore, RocksStore, UserContactUpdate};

/// Tenant used when a caller does not partition by tenant.
pub const DEFAULT_TENANT: &str = "public";
