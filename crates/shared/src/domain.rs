use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_newtype!(FlowId);
id_newtype!(ListenerHandle);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(pub Uuid);

impl RequestId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StatusCode(pub i32);

impl StatusCode {
    pub const SUCCESS: Self = Self(0);
    pub const NETWORK_ERROR: Self = Self(7);
    pub const INTERNAL_ERROR: Self = Self(8);
    pub const DEVELOPER_ERROR: Self = Self(10);
    pub const TIMEOUT: Self = Self(15);
    pub const CANCELED: Self = Self(16);
    pub const API_NOT_CONNECTED: Self = Self(17);

    pub fn name(self) -> Option<&'static str> {
        match self {
            Self::SUCCESS => Some("SUCCESS"),
            Self::NETWORK_ERROR => Some("NETWORK_ERROR"),
            Self::INTERNAL_ERROR => Some("INTERNAL_ERROR"),
            Self::DEVELOPER_ERROR => Some("DEVELOPER_ERROR"),
            Self::TIMEOUT => Some("TIMEOUT"),
            Self::CANCELED => Some("CANCELED"),
            Self::API_NOT_CONNECTED => Some("API_NOT_CONNECTED"),
            _ => None,
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{name} ({})", self.0),
            None => write!(f, "{}", self.0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowStateTag {
    Idle,
    Watching,
    Approving,
    Resolved,
}
