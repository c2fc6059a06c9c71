use anyhow::Result;
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    codegen,
    contact::Contact,
    model::device::{Code, Device, DeviceState},
    store::AppendCode,
};

use super::PasswordlessEngine;

/// Everything a caller needs to deliver a freshly issued code: the input
/// code and link code go out through the delivery channel, the ids come
/// back on consumption.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeCreated {
    pub device_id: String,
    pub pre_auth_session_id: String,
    pub code_id: String,
    pub user_input_code: String,
    pub link_code: String,
    pub code_lifetime: i64,
    pub time_created: i64,
}

#[derive(Debug, Serialize)]
#[serde(tag = "status")]
pub enum CreateNewCode {
    #[serde(rename = "OK")]
    Ok(CodeCreated),
    /// The device is unknown, consumed, or dead; the whole chain must be
    /// discarded and a new one started.
    #[serde(rename = "RESTART_FLOW_ERROR")]
    RestartFlow,
    /// The requested input code collides with a live code on this device;
    /// retrying with a generated code resolves it.
    #[serde(rename = "USER_INPUT_CODE_ALREADY_USED_ERROR")]
    UserInputCodeAlreadyUsed,
}

impl PasswordlessEngine {
    /// Start a new login chain: a fresh device carrying its first code.
    /// No pre-existing-device check happens here; concurrent chains for the
    /// same contact method stay independent.
    pub async fn create_code(
        &self,
        tenant: &str,
        contact: &Contact,
        user_input_code: Option<String>,
    ) -> Result<CodeCreated> {
        let now = Self::now_ms();
        let input = user_input_code
            .unwrap_or_else(|| codegen::new_user_input_code(self.config.user_input_code_length));
        let (link_code, link_code_hash) = codegen::new_link_code();

        let device_id = Uuid::new_v4().to_string();
        let pre_auth_session_id = Uuid::new_v4().to_string();
        let code = Code {
            code_id: Uuid::new_v4().to_string(),
            device_id: device_id.clone(),
            user_input_code: input.clone(),
            link_code_hash,
            code_lifetime: self.config.code_lifetime_ms,
            time_created: now,
        };
        let code_id = code.code_id.clone();

        let (email, phone_number) = match contact {
            Contact::Email(email) => (Some(email.clone()), None),
            Contact::Phone(phone) => (None, Some(phone.clone())),
        };
        let device = Device {
            device_id: device_id.clone(),
            pre_auth_session_id: pre_auth_session_id.clone(),
            email,
            phone_number,
            failed_attempts: 0,
            codes: vec![code],
        };
        self.store().put_device(tenant, &device).await?;
        info!(tenant, device_id = %device_id, "issued first code for new device");

        Ok(CodeCreated {
            device_id,
            pre_auth_session_id,
            code_id,
            user_input_code: input,
            link_code,
            code_lifetime: self.config.code_lifetime_ms,
            time_created: now,
        })
    }

    /// Append another code to an existing chain (resend flow). The new code
    /// shares the device's pre-auth session id.
    pub async fn create_new_code_for_device(
        &self,
        tenant: &str,
        device_id: &str,
        user_input_code: Option<String>,
    ) -> Result<CreateNewCode> {
        let now = Self::now_ms();
        let Some(device) = self.store().get_device(tenant, device_id).await? else {
            return Ok(CreateNewCode::RestartFlow);
        };
        // A device whose codes have all expired is dead; resending into it
        // would extend a chain the user already abandoned.
        if device.state(now, self.config.max_code_input_attempts) == DeviceState::Dead {
            return Ok(CreateNewCode::RestartFlow);
        }

        let input = user_input_code
            .unwrap_or_else(|| codegen::new_user_input_code(self.config.user_input_code_length));
        let (link_code, link_code_hash) = codegen::new_link_code();
        let code = Code {
            code_id: Uuid::new_v4().to_string(),
            device_id: device_id.to_string(),
            user_input_code: input.clone(),
            link_code_hash,
            code_lifetime: self.config.code_lifetime_ms,
            time_created: now,
        };
        let code_id = code.code_id.clone();

        match self
            .store()
            .append_code(tenant, device_id, code, self.config.max_codes_per_device)
            .await?
        {
            AppendCode::Ok => {
                debug!(tenant, device_id, "appended code to device");
                Ok(CreateNewCode::Ok(CodeCreated {
                    device_id: device_id.to_string(),
                    pre_auth_session_id: device.pre_auth_session_id,
                    code_id,
                    user_input_code: input,
                    link_code,
                    code_lifetime: self.config.code_lifetime_ms,
                    time_created: now,
                }))
            }
            AppendCode::DuplicateInputCode => Ok(CreateNewCode::UserInputCodeAlreadyUsed),
            AppendCode::DeviceGone => Ok(CreateNewCode::RestartFlow),
        }
    }

    /// Delete one code; the device goes with its last code. Idempotent.
    pub async fn revoke_code(&self, tenant: &str, code_id: &str) -> Result<()> {
        if self.store().delete_code(tenant, code_id).await? {
            debug!(tenant, code_id, "revoked code");
        }
        Ok(())
    }

    pub async fn revoke_all_codes_by_email(&self, tenant: &str, email: &str) -> Result<()> {
        let contact = Contact::parse_email(email)?;
        self.revoke_all_codes(tenant, &contact).await
    }

    pub async fn revoke_all_codes_by_phone_number(&self, tenant: &str, phone: &str) -> Result<()> {
        let contact = Contact::parse_phone(phone)?;
        self.revoke_all_codes(tenant, &contact).await
    }

    /// Invalidate every in-flight chain for a contact method, e.g. after a
    /// successful login elsewhere.
    pub async fn revoke_all_codes(&self, tenant: &str, contact: &Contact) -> Result<()> {
        let devices = self.store().list_devices_by_contact(tenant, contact).await?;
        let count = devices.len();
        for device in devices {
            self.store().delete_device(tenant, &device.device_id).await?;
        }
        if count > 0 {
            info!(tenant, devices = count, "revoked all codes for contact");
        }
        Ok(())
    }

    pub async fn list_codes_by_email(&self, tenant: &str, email: &str) -> Result<Vec<Device>> {
        let contact = Contact::parse_email(email)?;
        self.store().list_devices_by_contact(tenant, &contact).await
    }

    pub async fn list_codes_by_phone_number(
        &self,
        tenant: &str,
        phone: &str,
    ) -> Result<Vec<Device>> {
        let contact = Contact::parse_phone(phone)?;
        self.store().list_devices_by_contact(tenant, &contact).await
    }

    pub async fn list_codes_by_device_id(
        &self,
        tenant: &str,
        device_id: &str,
    ) -> Result<Option<Device>> {
        self.store().get_device(tenant, device_id).await
    }

    pub async fn list_codes_by_pre_auth_session_id(
        &self,
        tenant: &str,
        pre_auth_session_id: &str,
    ) -> Result<Option<Device>> {
        self.store()
            .get_device_by_pre_auth_session_id(tenant, pre_auth_session_id)
            .await
    }

    /// Issue a code and wrap its link code into a ready-to-send URL.
    pub async fn create_magic_link(&self, tenant: &str, contact: &Contact) -> Result<String> {
        let created = self.create_code(tenant, contact, None).await?;
        Ok(self
            .magic_links()
            .build(tenant, &created.pre_auth_session_id, &created.link_code))
    }

    /// Cosmetic cleanup of long-dead devices; correctness never depends on
    /// this running.
    pub async fn gc_expired_codes(&self, tenant: &str) -> Result<usize> {
        self.store().gc_expired(tenant).await
    }
}
