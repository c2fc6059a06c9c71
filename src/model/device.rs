use serde::{Deserialize, Serialize};

use crate::contact::Contact;

/// One issued secret pair belonging to a device. Immutable after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Code {
    pub code_id: String,
    pub device_id: String, // FK → Device.device_id
    pub user_input_code: String,
    pub link_code_hash: String, // plaintext link code is never persisted
    pub code_lifetime: i64,     // ms
    pub time_created: i64,      // epoch ms
}

impl Code {
    pub fn is_expired(&self, now_ms: i64) -> bool {
        self.time_created + self.code_lifetime <= now_ms
    }
}

/// One login attempt lineage for a contact method. Owns its codes; deleted
/// wholesale on consumption, revoke, or attempt exhaustion.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub device_id: String,
    pub pre_auth_session_id: String, // shared by all codes of this lineage
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub failed_attempts: u32,
    pub codes: Vec<Code>,
}

/// Liveness of a device as derived from store state. `Consumed` is not
/// represented here: a consumed device is deleted, so later lookups observe
/// absence and signal a flow restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    Active,
    Dead,
}

impl Device {
    pub fn contact(&self) -> Option<Contact> {
        match (&self.email, &self.phone_number) {
            (Some(email), _) => Some(Contact::Email(email.clone())),
            (None, Some(phone)) => Some(Contact::Phone(phone.clone())),
            (None, None) => None,
        }
    }

    pub fn has_live_code(&self, now_ms: i64) -> bool {
        self.codes.iter().any(|c| !c.is_expired(now_ms))
    }

    pub fn state(&self, now_ms: i64, max_attempts: u32) -> DeviceState {
        if self.failed_attempts >= max_attempts || !self.has_live_code(now_ms) {
            DeviceState::Dead
        } else {
            DeviceState::Active
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code(time_created: i64, lifetime: i64) -> Code {
        Code {
            code_id: "c1".into(),
            device_id: "d1".into(),
            user_input_code: "123456".into(),
            link_code_hash: "hash".into(),
            code_lifetime: lifetime,
            time_created,
        }
    }

    fn device(codes: Vec<Code>, failed_attempts: u32) -> Device {
        Device {
            device_id: "d1".into(),
            pre_auth_session_id: "p1".into(),
            email: Some("a@x.com".into()),
            phone_number: None,
            failed_attempts,
            codes,
        }
    }

    #[test]
    fn expiry_boundary_is_inclusive() {
        let c = code(1_000, 500);
        assert!(!c.is_expired(1_499));
        assert!(c.is_expired(1_500));
        assert!(c.is_expired(2_000));
    }

    #[test]
    fn device_with_one_live_code_is_active() {
        let d = device(vec![code(0, 10), code(1_000, 500)], 0);
        assert_eq!(d.state(1_200, 5), DeviceState::Active);
    }

    #[test]
    fn device_dies_when_all_codes_expire_or_attempts_exhaust() {
        let d = device(vec![code(0, 10)], 0);
        assert_eq!(d.state(1_000, 5), DeviceState::Dead);

        let d = device(vec![code(1_000, 500)], 5);
        assert_eq!(d.state(1_100, 5), DeviceState::Dead);
    }
}
