use anyhow::Result;
use async_trait::async_trait;

use crate::{
    contact::Contact,
    model::{
        device::{Code, Device},
        user::PasswordlessUser,
    },
};

pub mod rocks;

pub use rocks::RocksStore;

/// Result of an atomic code append.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendCode {
    Ok,
    /// The requested user input code collides with a live code on the same
    /// device.
    DuplicateInputCode,
    /// The device vanished between resolution and append.
    DeviceGone,
}

/// Result of an atomic user contact update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserContactUpdate {
    Ok,
    UnknownUser,
    EmailTaken,
    PhoneNumberTaken,
}

/// Durable state boundary for the engine. Implementations own atomicity:
/// every method that checks an invariant and then writes must execute as a
/// single step with respect to concurrent callers. The engine never does a
/// read-then-write across two calls for invariant-bearing state.
#[async_trait]
pub trait CodeStore: Send + Sync {
    async fn put_device(&self, tenant: &str, device: &Device) -> Result<()>;

    async fn get_device(&self, tenant: &str, device_id: &str) -> Result<Option<Device>>;

    async fn get_device_by_pre_auth_session_id(
        &self,
        tenant: &str,
        pre_auth_session_id: &str,
    ) -> Result<Option<Device>>;

    async fn get_device_by_link_code_hash(
        &self,
        tenant: &str,
        link_code_hash: &str,
    ) -> Result<Option<Device>>;

    /// Append a code to a device, enforcing per-device input-code
    /// uniqueness among live codes and the bounded code set (`max_codes`).
    async fn append_code(
        &self,
        tenant: &str,
        device_id: &str,
        code: Code,
        max_codes: usize,
    ) -> Result<AppendCode>;

    /// Delete a device and everything it owns. Idempotent.
    async fn delete_device(&self, tenant: &str, device_id: &str) -> Result<()>;

    /// Delete one code; the owning device goes with it when it was the last
    /// one. Returns whether anything was deleted.
    async fn delete_code(&self, tenant: &str, code_id: &str) -> Result<bool>;

    /// Atomically bump a device's failed-attempt counter. Returns the new
    /// count and whether the device died (and was deleted) as a result, or
    /// `None` when the device no longer exists.
    async fn increment_failed_attempt(
        &self,
        tenant: &str,
        device_id: &str,
        max_attempts: u32,
    ) -> Result<Option<(u32, bool)>>;

    async fn list_devices_by_contact(
        &self,
        tenant: &str,
        contact: &Contact,
    ) -> Result<Vec<Device>>;

    /// Cosmetic sweep over devices whose codes have all expired. Not part
    /// of the correctness path; expiry is checked lazily on consumption.
    async fn gc_expired(&self, tenant: &str) -> Result<usize>;

    async fn get_user(&self, user_id: &str) -> Result<Option<PasswordlessUser>>;

    async fn find_user_by_contact(
        &self,
        tenant: &str,
        contact: &Contact,
    ) -> Result<Option<PasswordlessUser>>;

    /// Atomic find-or-create by contact method. Two concurrent calls for
    /// the same never-seen contact yield one creation; the loser observes
    /// the winner's user.
    async fn sign_in_up_user(
        &self,
        tenant: &str,
        contact: &Contact,
    ) -> Result<(PasswordlessUser, bool)>;

    /// Atomic uniqueness check + contact rewrite. `None` leaves a method
    /// unchanged; colliding with the user's own current value is a no-op
    /// success.
    async fn update_user_contact(
        &self,
        user_id: &str,
        new_email: Option<&str>,
        new_phone: Option<&str>,
    ) -> Result<UserContactUpdate>;
}
