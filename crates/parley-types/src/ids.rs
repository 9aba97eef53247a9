use std::fmt;
use std::str::FromStr;

use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

/// Conversation addressing. The well-known global room is a sentinel with no
/// backing row, so it gets its own variant instead of a magic string checked
/// at every call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConversationId {
    /// The always-on broadcast conversation. Membership is every
    /// authenticated user.
    Global,
    Id(i64),
}

impl ConversationId {
    /// Room name used by the live-connection registry.
    pub fn room_name(&self) -> String {
        match self {
            Self::Global => "global_room".to_string(),
            Self::Id(n) => format!("convo_{}", n),
        }
    }

    /// Key the store persists against. The global sentinel maps to NULL.
    pub fn db_key(&self) -> Option<i64> {
        match self {
            Self::Global => None,
            Self::Id(n) => Some(*n),
        }
    }

    pub fn is_global(&self) -> bool {
        matches!(self, Self::Global)
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Global => f.write_str("global"),
            Self::Id(n) => write!(f, "{}", n),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseConversationIdError(String);

impl fmt::Display for ParseConversationIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid conversation id: {:?}", self.0)
    }
}

impl std::error::Error for ParseConversationIdError {}

impl FromStr for ConversationId {
    type Err = ParseConversationIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "global" {
            return Ok(Self::Global);
        }
        s.parse::<i64>()
            .map(Self::Id)
            .map_err(|_| ParseConversationIdError(s.to_string()))
    }
}

/// Wire form: the literal string `"global"` or a JSON number. Browser
/// clients pull the id out of a query string, so a numeric string is
/// accepted on input as well.
impl Serialize for ConversationId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Global => serializer.serialize_str("global"),
            Self::Id(n) => serializer.serialize_i64(*n),
        }
    }
}

impl<'de> Deserialize<'de> for ConversationId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Num(i64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Num(n) => Ok(Self::Id(n)),
            Raw::Text(s) => s.parse().map_err(de::Error::custom),
        }
    }
}
