use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use rocksdb::{Direction, IteratorMode, Options, WriteBatch, DB};
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use std::str;

use crate::{
    contact::Contact,
    model::{
        device::{Code, Device},
        user::PasswordlessUser,
    },
};

use super::{AppendCode, CodeStore, UserContactUpdate};

/// RocksDB-backed store. Values are JSON blobs under prefix-structured
/// keys; secondary lookups go through small index keys pointing back at the
/// primary id. Read-modify-write sections serialize on `write_lock` so the
/// invariant checks and their writes are atomic with respect to concurrent
/// callers; pure reads stay lock-free.
pub struct RocksStore {
    db: DB,
    write_lock: Mutex<()>,
}

impl RocksStore {
    pub fn new(path: &str) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        let db = DB::open(&opts, path)?;
        Ok(Self {
            db,
            write_lock: Mutex::new(()),
        })
    }

    // ============================================================
    // KEY LAYOUT
    // ============================================================
    fn device_key(tenant: &str, device_id: &str) -> String {
        format!("plessdev:{tenant}:{device_id}")
    }

    fn device_prefix(tenant: &str) -> String {
        format!("plessdev:{tenant}:")
    }

    fn preauth_key(tenant: &str, pre_auth_session_id: &str) -> String {
        format!("plesspre:{tenant}:{pre_auth_session_id}")
    }

    fn link_key(tenant: &str, link_code_hash: &str) -> String {
        format!("plesslink:{tenant}:{link_code_hash}")
    }

    fn code_key(tenant: &str, code_id: &str) -> String {
        format!("plesscode:{tenant}:{code_id}")
    }

    fn contact_prefix(tenant: &str, contact: &Contact) -> String {
        format!("plesscontact:{tenant}:{}:{}:", contact.kind(), contact.value())
    }

    fn contact_key(tenant: &str, contact: &Contact, device_id: &str) -> String {
        format!("{}{device_id}", Self::contact_prefix(tenant, contact))
    }

    fn user_key(user_id: &str) -> String {
        format!("plessuser:{user_id}")
    }

    fn user_email_key(tenant: &str, email: &str) -> String {
        format!("plessuemail:{tenant}:{email}")
    }

    fn user_phone_key(tenant: &str, phone: &str) -> String {
        format!("plessuphone:{tenant}:{phone}")
    }

    // ============================================================
    // LOW-LEVEL HELPERS
    // ============================================================
    fn get_string(&self, key: &str) -> Result<Option<String>> {
        Ok(self
            .db
            .get(key)?
            .map(|v| String::from_utf8_lossy(&v).into_owned()))
    }

    fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        self.db
            .get(key)?
            .map(|v| serde_json::from_slice(&v))
            .transpose()
            .map_err(Into::into)
    }

    fn collect_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>> {
        let mut out = Vec::new();
        for item in self
            .db
            .iterator(IteratorMode::From(prefix.as_bytes(), Direction::Forward))
        {
            let (key, val) = item?;
            let k = str::from_utf8(&key)?;
            if !k.starts_with(prefix) {
                break;
            }
            out.push((k.to_string(), val.to_vec()));
        }
        Ok(out)
    }

    fn load_device(&self, tenant: &str, device_id: &str) -> Result<Option<Device>> {
        self.get_json(&Self::device_key(tenant, device_id))
    }

    /// Resolve an index key to its device, dropping the index entry when it
    /// points at nothing.
    fn resolve_device_index(&self, tenant: &str, index_key: &str) -> Result<Option<Device>> {
        let Some(device_id) = self.get_string(index_key)? else {
            return Ok(None);
        };
        match self.load_device(tenant, &device_id)? {
            Some(device) => Ok(Some(device)),
            None => {
                self.db.delete(index_key)?;
                Ok(None)
            }
        }
    }

    fn index_code(batch: &mut WriteBatch, tenant: &str, code: &Code) {
        batch.put(
            Self::link_key(tenant, &code.link_code_hash),
            code.device_id.as_bytes(),
        );
        batch.put(
            Self::code_key(tenant, &code.code_id),
            code.device_id.as_bytes(),
        );
    }

    fn deindex_code(batch: &mut WriteBatch, tenant: &str, code: &Code) {
        batch.delete(Self::link_key(tenant, &code.link_code_hash));
        batch.delete(Self::code_key(tenant, &code.code_id));
    }

    fn put_device_batch(batch: &mut WriteBatch, tenant: &str, device: &Device) -> Result<()> {
        batch.put(
            Self::device_key(tenant, &device.device_id),
            serde_json::to_vec(device)?,
        );
        Ok(())
    }

    /// Full removal: device record plus every index entry it owns.
    fn deindex_device(batch: &mut WriteBatch, tenant: &str, device: &Device) {
        batch.delete(Self::device_key(tenant, &device.device_id));
        batch.delete(Self::preauth_key(tenant, &device.pre_auth_session_id));
        if let Some(contact) = device.contact() {
            batch.delete(Self::contact_key(tenant, &contact, &device.device_id));
        }
        for code in &device.codes {
            Self::deindex_code(batch, tenant, code);
        }
    }
}

#[async_trait]
impl CodeStore for RocksStore {
    async fn put_device(&self, tenant: &str, device: &Device) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        let mut batch = WriteBatch::default();
        Self::put_device_batch(&mut batch, tenant, device)?;
        batch.put(
            Self::preauth_key(tenant, &device.pre_auth_session_id),
            device.device_id.as_bytes(),
        );
        if let Some(contact) = device.contact() {
            batch.put(
                Self::contact_key(tenant, &contact, &device.device_id),
                device.device_id.as_bytes(),
            );
        }
        for code in &device.codes {
            Self::index_code(&mut batch, tenant, code);
        }
        self.db.write(batch)?;
        Ok(())
    }

    async fn get_device(&self, tenant: &str, device_id: &str) -> Result<Option<Device>> {
        self.load_device(tenant, device_id)
    }

    async fn get_device_by_pre_auth_session_id(
        &self,
        tenant: &str,
        pre_auth_session_id: &str,
    ) -> Result<Option<Device>> {
        self.resolve_device_index(tenant, &Self::preauth_key(tenant, pre_auth_session_id))
    }

    async fn get_device_by_link_code_hash(
        &self,
        tenant: &str,
        link_code_hash: &str,
    ) -> Result<Option<Device>> {
        self.resolve_device_index(tenant, &Self::link_key(tenant, link_code_hash))
    }

    async fn append_code(
        &self,
        tenant: &str,
        device_id: &str,
        code: Code,
        max_codes: usize,
    ) -> Result<AppendCode> {
        let _guard = self.write_lock.lock().await;

        let Some(mut device) = self.load_device(tenant, device_id)? else {
            return Ok(AppendCode::DeviceGone);
        };

        let now = Utc::now().timestamp_millis();
        let mut batch = WriteBatch::default();

        // Expired codes neither count against the cap nor block input-code
        // reuse; drop them here.
        let (live, expired): (Vec<Code>, Vec<Code>) = device
            .codes
            .into_iter()
            .partition(|c| !c.is_expired(now));
        for old in &expired {
            Self::deindex_code(&mut batch, tenant, old);
        }
        device.codes = live;

        if device
            .codes
            .iter()
            .any(|c| c.user_input_code == code.user_input_code)
        {
            return Ok(AppendCode::DuplicateInputCode);
        }

        if device.codes.len() >= max_codes {
            // Codes are kept in creation order; evict the oldest.
            let oldest = device.codes.remove(0);
            Self::deindex_code(&mut batch, tenant, &oldest);
            debug!(device_id, code_id = %oldest.code_id, "evicted oldest code at cap");
        }

        Self::index_code(&mut batch, tenant, &code);
        device.codes.push(code);
        Self::put_device_batch(&mut batch, tenant, &device)?;
        self.db.write(batch)?;
        Ok(AppendCode::Ok)
    }

    async fn delete_device(&self, tenant: &str, device_id: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        if let Some(device) = self.load_device(tenant, device_id)? {
            let mut batch = WriteBatch::default();
            Self::deindex_device(&mut batch, tenant, &device);
            self.db.write(batch)?;
        }
        Ok(())
    }

    async fn delete_code(&self, tenant: &str, code_id: &str) -> Result<bool> {
        let _guard = self.write_lock.lock().await;

        let code_key = Self::code_key(tenant, code_id);
        let Some(device_id) = self.get_string(&code_key)? else {
            return Ok(false);
        };
        let Some(mut device) = self.load_device(tenant, &device_id)? else {
            self.db.delete(&code_key)?;
            return Ok(false);
        };

        let Some(pos) = device.codes.iter().position(|c| c.code_id == code_id) else {
            self.db.delete(&code_key)?;
            return Ok(false);
        };

        let removed = device.codes.remove(pos);
        let mut batch = WriteBatch::default();
        Self::deindex_code(&mut batch, tenant, &removed);
        if device.codes.is_empty() {
            Self::deindex_device(&mut batch, tenant, &device);
        } else {
            Self::put_device_batch(&mut batch, tenant, &device)?;
        }
        self.db.write(batch)?;
        Ok(true)
    }

    async fn increment_failed_attempt(
        &self,
        tenant: &str,
        device_id: &str,
        max_attempts: u32,
    ) -> Result<Option<(u32, bool)>> {
        let _guard = self.write_lock.lock().await;

        let Some(mut device) = self.load_device(tenant, device_id)? else {
            return Ok(None);
        };

        device.failed_attempts += 1;
        let became_dead = device.failed_attempts >= max_attempts;

        let mut batch = WriteBatch::default();
        if became_dead {
            Self::deindex_device(&mut batch, tenant, &device);
        } else {
            Self::put_device_batch(&mut batch, tenant, &device)?;
        }
        self.db.write(batch)?;
        Ok(Some((device.failed_attempts, became_dead)))
    }

    async fn list_devices_by_contact(
        &self,
        tenant: &str,
        contact: &Contact,
    ) -> Result<Vec<Device>> {
        let prefix = Self::contact_prefix(tenant, contact);
        let mut devices = Vec::new();
        for (key, val) in self.collect_prefix(&prefix)? {
            let device_id = String::from_utf8_lossy(&val).into_owned();
            match self.load_device(tenant, &device_id)? {
                Some(device) => devices.push(device),
                None => {
                    self.db.delete(key)?;
                }
            }
        }
        Ok(devices)
    }

    async fn gc_expired(&self, tenant: &str) -> Result<usize> {
        let _guard = self.write_lock.lock().await;

        let now = Utc::now().timestamp_millis();
        let mut removed = 0usize;
        let mut batch = WriteBatch::default();
        for (_, val) in self.collect_prefix(&Self::device_prefix(tenant))? {
            let device: Device = serde_json::from_slice(&val)?;
            if !device.has_live_code(now) {
                Self::deindex_device(&mut batch, tenant, &device);
                removed += 1;
            }
        }
        if removed > 0 {
            self.db.write(batch)?;
            debug!(tenant, removed, "swept expired devices");
        }
        Ok(removed)
    }

    async fn get_user(&self, user_id: &str) -> Result<Option<PasswordlessUser>> {
        self.get_json(&Self::user_key(user_id))
    }

    async fn find_user_by_contact(
        &self,
        tenant: &str,
        contact: &Contact,
    ) -> Result<Option<PasswordlessUser>> {
        let index_key = match contact {
            Contact::Email(email) => Self::user_email_key(tenant, email),
            Contact::Phone(phone) => Self::user_phone_key(tenant, phone),
        };
        let Some(user_id) = self.get_string(&index_key)? else {
            return Ok(None);
        };
        self.get_json(&Self::user_key(&user_id))
    }

    async fn sign_in_up_user(
        &self,
        tenant: &str,
        contact: &Contact,
    ) -> Result<(PasswordlessUser, bool)> {
        let _guard = self.write_lock.lock().await;

        let index_key = match contact {
            Contact::Email(email) => Self::user_email_key(tenant, email),
            Contact::Phone(phone) => Self::user_phone_key(tenant, phone),
        };
        if let Some(user_id) = self.get_string(&index_key)? {
            if let Some(user) = self.get_json(&Self::user_key(&user_id))? {
                return Ok((user, false));
            }
        }

        let (email, phone_number) = match contact {
            Contact::Email(email) => (Some(email.clone()), None),
            Contact::Phone(phone) => (None, Some(phone.clone())),
        };
        let user = PasswordlessUser {
            user_id: Uuid::new_v4().to_string(),
            tenant_id: tenant.to_string(),
            email,
            phone_number,
            time_joined: Utc::now().timestamp_millis(),
        };

        let mut batch = WriteBatch::default();
        batch.put(Self::user_key(&user.user_id), serde_json::to_vec(&user)?);
        batch.put(index_key, user.user_id.as_bytes());
        self.db.write(batch)?;
        Ok((user, true))
    }

    async fn update_user_contact(
        &self,
        user_id: &str,
        new_email: Option<&str>,
        new_phone: Option<&str>,
    ) -> Result<UserContactUpdate> {
        let _guard = self.write_lock.lock().await;

        let Some(mut user) = self.get_json::<PasswordlessUser>(&Self::user_key(user_id))? else {
            return Ok(UserContactUpdate::UnknownUser);
        };
        let tenant = user.tenant_id.clone();

        // Both uniqueness checks run before any key is touched, so a
        // conflict performs no mutation at all.
        if let Some(email) = new_email {
            match self.get_string(&Self::user_email_key(&tenant, email))? {
                Some(owner) if owner != user_id => return Ok(UserContactUpdate::EmailTaken),
                _ => {}
            }
        }
        if let Some(phone) = new_phone {
            match self.get_string(&Self::user_phone_key(&tenant, phone))? {
                Some(owner) if owner != user_id => {
                    return Ok(UserContactUpdate::PhoneNumberTaken)
                }
                _ => {}
            }
        }

        let mut batch = WriteBatch::default();
        if let Some(email) = new_email {
            if user.email.as_deref() != Some(email) {
                if let Some(old) = &user.email {
                    batch.delete(Self::user_email_key(&tenant, old));
                }
                batch.put(Self::user_email_key(&tenant, email), user_id.as_bytes());
                user.email = Some(email.to_string());
            }
        }
        if let Some(phone) = new_phone {
            if user.phone_number.as_deref() != Some(phone) {
                if let Some(old) = &user.phone_number {
                    batch.delete(Self::user_phone_key(&tenant, old));
                }
                batch.put(Self::user_phone_key(&tenant, phone), user_id.as_bytes());
                user.phone_number = Some(phone.to_string());
            }
        }
        batch.put(Self::user_key(user_id), serde_json::to_vec(&user)?);
        self.db.write(batch)?;
        Ok(UserContactUpdate::Ok)
    }
}
