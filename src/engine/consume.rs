use anyhow::{bail, Context, Result};
use serde::Serialize;
use tracing::{debug, info};

use crate::{codegen, model::user::PasswordlessUser};

use super::PasswordlessEngine;

/// The two ways a caller can present a code back: the OTP path names the
/// device outright, the magic-link path identifies it through the code the
/// link carried.
#[derive(Debug, Clone)]
pub enum ConsumeRequest {
    UserInputCode {
        device_id: String,
        pre_auth_session_id: String,
        user_input_code: String,
    },
    LinkCode {
        pre_auth_session_id: String,
        link_code: String,
    },
}

#[derive(Debug, Serialize)]
#[serde(tag = "status")]
pub enum ConsumeCode {
    #[serde(rename = "OK")]
    #[serde(rename_all = "camelCase")]
    Ok {
        created_new_user: bool,
        user: PasswordlessUser,
    },
    /// The value matched no code on the device.
    #[serde(rename = "INCORRECT_USER_INPUT_CODE_ERROR")]
    #[serde(rename_all = "camelCase")]
    IncorrectUserInputCode {
        failed_code_input_attempt_count: u32,
        maximum_code_input_attempts: u32,
    },
    /// The value matched, but every matching code had expired.
    #[serde(rename = "EXPIRED_USER_INPUT_CODE_ERROR")]
    #[serde(rename_all = "camelCase")]
    ExpiredUserInputCode {
        failed_code_input_attempt_count: u32,
        maximum_code_input_attempts: u32,
    },
    /// The chain is unusable; the caller must start over from contact
    /// submission.
    #[serde(rename = "RESTART_FLOW_ERROR")]
    RestartFlow,
}

enum Presented {
    Input(String),
    LinkHash(String),
}

impl PasswordlessEngine {
    /// Validate a presented code against its device. Expiry and matching
    /// are evaluated per code; attempt counting is per device, shared
    /// across all of its codes. Success deletes the device (and every
    /// sibling code) before the user is resolved, so the chain can never be
    /// replayed.
    pub async fn consume_code(&self, tenant: &str, request: ConsumeRequest) -> Result<ConsumeCode> {
        let now = Self::now_ms();
        let max_attempts = self.config.max_code_input_attempts;

        let (device, presented) = match request {
            ConsumeRequest::UserInputCode {
                device_id,
                pre_auth_session_id,
                user_input_code,
            } => {
                let Some(device) = self.store().get_device(tenant, &device_id).await? else {
                    return Ok(ConsumeCode::RestartFlow);
                };
                if device.pre_auth_session_id != pre_auth_session_id {
                    bail!("preAuthSessionId and deviceId doesn't match");
                }
                (device, Presented::Input(user_input_code))
            }
            ConsumeRequest::LinkCode {
                pre_auth_session_id,
                link_code,
            } => {
                let hash = codegen::hash_link_code(&link_code);
                let Some(device) = self
                    .store()
                    .get_device_by_link_code_hash(tenant, &hash)
                    .await?
                else {
                    return Ok(ConsumeCode::RestartFlow);
                };
                if device.pre_auth_session_id != pre_auth_session_id {
                    bail!("preAuthSessionId and deviceId doesn't match");
                }
                (device, Presented::LinkHash(hash))
            }
        };

        let matching: Vec<_> = device
            .codes
            .iter()
            .filter(|c| match &presented {
                Presented::Input(value) => c.user_input_code == *value,
                Presented::LinkHash(hash) => c.link_code_hash == *hash,
            })
            .collect();

        if let Some(code) = matching.iter().find(|c| !c.is_expired(now)) {
            // Terminal transition first: the device and all sibling codes
            // must be gone before anyone can observe the success.
            self.store().delete_device(tenant, &device.device_id).await?;
            let contact = device
                .contact()
                .context("device has no contact method on record")?;
            let (user, created_new_user) = self.store().sign_in_up_user(tenant, &contact).await?;
            info!(
                tenant,
                device_id = %device.device_id,
                code_id = %code.code_id,
                created_new_user,
                "code consumed"
            );
            return Ok(ConsumeCode::Ok {
                created_new_user,
                user,
            });
        }

        // Wrong or stale value: one shared counter bounds total guesses for
        // the device no matter how many resends it accumulated.
        let Some((failed_count, became_dead)) = self
            .store()
            .increment_failed_attempt(tenant, &device.device_id, max_attempts)
            .await?
        else {
            // Lost a race with a concurrent success or revoke.
            return Ok(ConsumeCode::RestartFlow);
        };
        if became_dead {
            debug!(tenant, device_id = %device.device_id, "device exhausted its attempts");
        }

        if matching.is_empty() {
            Ok(ConsumeCode::IncorrectUserInputCode {
                failed_code_input_attempt_count: failed_count,
                maximum_code_input_attempts: max_attempts,
            })
        } else {
            Ok(ConsumeCode::ExpiredUserInputCode {
                failed_code_input_attempt_count: failed_count,
                maximum_code_input_attempts: max_attempts,
            })
        }
    }
}
