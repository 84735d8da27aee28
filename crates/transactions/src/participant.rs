//! Parties to a money movement and the places money moves between.

use serde::{Deserialize, Serialize};

use forgepay_core::AccountNumber;

/// Kind of party initiating or receiving a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParticipantType {
    Person,
    Organization,
}

forgepay_core::string_enum!(ParticipantType, "typeOf", [Person, Organization]);

/// Agent or recipient of a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub type_of: ParticipantType,
    pub id: String,
    pub name: String,
}

impl Participant {
    pub fn person(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            type_of: ParticipantType::Person,
            id: id.into(),
            name: name.into(),
        }
    }

    pub fn organization(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            type_of: ParticipantType::Organization,
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Source or destination of a money transfer.
///
/// Only `Account` locations take part in settlement; the others record where
/// money entered or left the system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type_of")]
pub enum Location {
    Account {
        account_number: AccountNumber,
        name: String,
    },
    Person {
        id: String,
        name: String,
    },
    Organization {
        id: String,
        name: String,
    },
}

impl Location {
    pub fn account_number(&self) -> Option<&AccountNumber> {
        match self {
            Location::Account { account_number, .. } => Some(account_number),
            Location::Person { .. } | Location::Organization { .. } => None,
        }
    }
}

impl From<&Participant> for Location {
    fn from(participant: &Participant) -> Self {
        match participant.type_of {
            ParticipantType::Person => Location::Person {
                id: participant.id.clone(),
                name: participant.name.clone(),
            },
            ParticipantType::Organization => Location::Organization {
                id: participant.id.clone(),
                name: participant.name.clone(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_account_locations_carry_account_numbers() {
        let account = Location::Account {
            account_number: AccountNumber::new("A-1").unwrap(),
            name: "Main".into(),
        };
        assert_eq!(account.account_number().map(|n| n.as_str()), Some("A-1"));

        let person = Location::from(&Participant::person("p-1", "Alice"));
        assert!(person.account_number().is_none());
    }

    #[test]
    fn location_is_tagged_by_type() {
        let json = serde_json::to_value(Location::Organization {
            id: "o-1".into(),
            name: "Acme".into(),
        })
        .unwrap();
        assert_eq!(json["type_of"], "Organization");
    }
}
