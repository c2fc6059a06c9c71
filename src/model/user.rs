use serde::{Deserialize, Serialize};

/// Account resolved (or created) on first successful code consumption.
/// Independent of devices/codes; looked up by value at consumption time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordlessUser {
    pub user_id: String,
    pub tenant_id: String,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub time_joined: i64, // epoch ms
}

impl PasswordlessUser {
    /// At least one contact method must be present at all times.
    pub fn has_contact(&self) -> bool {
        self.email.is_some() || self.phone_number.is_some()
    }
}
