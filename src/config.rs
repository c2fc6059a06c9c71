use std::env;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::codegen::DEFAULT_USER_INPUT_CODE_LENGTH;

pub const DEFAULT_CODE_LIFETIME_MS: i64 = 900_000; // 15 minutes
pub const DEFAULT_MAX_CODE_INPUT_ATTEMPTS: u32 = 5;
pub const DEFAULT_MAX_CODES_PER_DEVICE: usize = 5;
pub const DEFAULT_LINK_BASE_URL: &str = "http://localhost:3000/auth";

/// Which delivery shape a login attempt uses. Clients branch on the wire
/// string, so the serde names are part of the contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowType {
    #[serde(rename = "USER_INPUT_CODE")]
    UserInputCode,
    #[serde(rename = "MAGIC_LINK")]
    MagicLink,
    #[serde(rename = "USER_INPUT_CODE_AND_MAGIC_LINK")]
    UserInputCodeAndMagicLink,
}

impl FromStr for FlowType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "USER_INPUT_CODE" => Ok(FlowType::UserInputCode),
            "MAGIC_LINK" => Ok(FlowType::MagicLink),
            "USER_INPUT_CODE_AND_MAGIC_LINK" => Ok(FlowType::UserInputCodeAndMagicLink),
            other => Err(format!("unknown flow type: {other}")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PasswordlessConfig {
    pub flow_type: FlowType,
    pub code_lifetime_ms: i64,
    pub max_code_input_attempts: u32,
    pub user_input_code_length: usize,
    pub max_codes_per_device: usize,
    pub link_base_url: String,
}

impl Default for PasswordlessConfig {
    fn default() -> Self {
        Self {
            flow_type: FlowType::UserInputCodeAndMagicLink,
            code_lifetime_ms: DEFAULT_CODE_LIFETIME_MS,
            max_code_input_attempts: DEFAULT_MAX_CODE_INPUT_ATTEMPTS,
            user_input_code_length: DEFAULT_USER_INPUT_CODE_LENGTH,
            max_codes_per_device: DEFAULT_MAX_CODES_PER_DEVICE,
            link_base_url: DEFAULT_LINK_BASE_URL.to_string(),
        }
    }
}

impl PasswordlessConfig {
    /// Read config from the environment, falling back to defaults for
    /// anything unset or unparsable. `.env` files are honored.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let defaults = Self::default();
        Self {
            flow_type: env_parse("PASSWORDLESS_FLOW_TYPE", defaults.flow_type),
            code_lifetime_ms: env_parse("PASSWORDLESS_CODE_LIFETIME_MS", defaults.code_lifetime_ms),
            max_code_input_attempts: env_parse(
                "PASSWORDLESS_MAX_CODE_INPUT_ATTEMPTS",
                defaults.max_code_input_attempts,
            ),
            user_input_code_length: env_parse(
                "PASSWORDLESS_USER_INPUT_CODE_LENGTH",
                defaults.user_input_code_length,
            ),
            max_codes_per_device: env_parse(
                "PASSWORDLESS_MAX_CODES_PER_DEVICE",
                defaults.max_codes_per_device,
            ),
            link_base_url: env::var("PASSWORDLESS_LINK_BASE_URL")
                .unwrap_or(defaults.link_base_url),
        }
    }

    pub fn with_flow_type(mut self, flow_type: FlowType) -> Self {
        self.flow_type = flow_type;
        self
    }

    pub fn with_code_lifetime_ms(mut self, ms: i64) -> Self {
        self.code_lifetime_ms = ms;
        self
    }

    pub fn with_max_code_input_attempts(mut self, max: u32) -> Self {
        self.max_code_input_attempts = max;
        self
    }

    pub fn with_user_input_code_length(mut self, length: usize) -> Self {
        self.user_input_code_length = length;
        self
    }

    pub fn with_max_codes_per_device(mut self, max: usize) -> Self {
        self.max_codes_per_device = max;
        self
    }

    pub fn with_link_base_url(mut self, url: impl Into<String>) -> Self {
        self.link_base_url = url.into();
        self
    }
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
