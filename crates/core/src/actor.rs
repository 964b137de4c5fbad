use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{AppError, UserId};

const SYSTEM_SUBJECT: &str = "system";

/// Who performed an administrative change, recorded for audit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "user_id")]
pub enum Actor {
    /// A human user acting inside an organization.
    User(UserId),
    /// Background maintenance such as the expiration sweep.
    System,
}

impl Actor {
    /// Returns the acting user, if any.
    #[must_use]
    pub fn user_id(&self) -> Option<UserId> {
        match self {
            Self::User(user_id) => Some(*user_id),
            Self::System => None,
        }
    }

    /// Returns a stable subject string for audit storage.
    #[must_use]
    pub fn subject(&self) -> String {
        self.to_string()
    }
}

impl From<UserId> for Actor {
    fn from(value: UserId) -> Self {
        Self::User(value)
    }
}

impl Display for Actor {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User(user_id) => write!(formatter, "{user_id}"),
            Self::System => formatter.write_str(SYSTEM_SUBJECT),
        }
    }
}

impl FromStr for Actor {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if value == SYSTEM_SUBJECT {
            return Ok(Self::System);
        }

        Uuid::parse_str(value)
            .map(|uuid| Self::User(UserId::from_uuid(uuid)))
            .map_err(|error| AppError::Validation(format!("invalid actor subject '{value}': {error}")))
    }
}
