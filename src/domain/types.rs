//! Shared domain enumerations aligned with persisted values.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::DomainError;

/// Kind of interaction a user had with a product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    View,
    CartAdd,
    Purchase,
}

impl EventType {
    pub const ALL: [EventType; 3] = [EventType::View, EventType::CartAdd, EventType::Purchase];

    pub fn as_str(self) -> &'static str {
        match self {
            EventType::View => "VIEW",
            EventType::CartAdd => "CART_ADD",
            EventType::Purchase => "PURCHASE",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for EventType {
    type Error = DomainError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "VIEW" => Ok(EventType::View),
            "CART_ADD" => Ok(EventType::CartAdd),
            "PURCHASE" => Ok(EventType::Purchase),
            other => Err(DomainError::UnknownEventType(other.to_string())),
        }
    }
}

impl FromStr for EventType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::try_from(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn as_str_round_trips_through_try_from() {
        for kind in EventType::ALL {
            assert_eq!(EventType::try_from(kind.as_str()).unwrap(), kind);
        }
    }

    #[test]
    fn lowercase_names_are_rejected() {
        assert!(matches!(
            "view".parse::<EventType>(),
            Err(DomainError::UnknownEventType(name)) if name == "view"
        ));
    }

    #[test]
    fn serde_uses_wire_names() {
        let json = serde_json::to_string(&EventType::CartAdd).unwrap();
        assert_eq!(json, "\"CART_ADD\"");
        let parsed: EventType = serde_json::from_str("\"PURCHASE\"").unwrap();
        assert_eq!(parsed, EventType::Purchase);
    }
}
