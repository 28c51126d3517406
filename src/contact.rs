use std::fmt;
use std::str::FromStr;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContactType {
    Physician,
    PhysicianAssistant,
    NursePractitioner,
    Pharmacist,
    PhysicalTherapist,
    Dietitian,
    Other,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown contact type {0:?}")]
pub struct UnknownContactType(pub String);

impl ContactType {
    pub const ALL: [ContactType; 7] = [
        ContactType::Physician,
        ContactType::PhysicianAssistant,
        ContactType::NursePractitioner,
        ContactType::Pharmacist,
        ContactType::PhysicalTherapist,
        ContactType::Dietitian,
        ContactType::Other,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ContactType::Physician => "Physician",
            ContactType::PhysicianAssistant => "Physician Assistant",
            ContactType::NursePractitioner => "Nurse Practitioner",
            ContactType::Pharmacist => "Pharmacist",
            ContactType::PhysicalTherapist => "Physical Therapist",
            ContactType::Dietitian => "Dietitian",
            ContactType::Other => "Other",
        }
    }

    /// Contact type used when no classification is available: only
    /// physician assistants are told apart, everyone else is a physician.
    pub fn fallback_for(taxonomy: Option<&str>) -> Self {
        match taxonomy {
            Some(t) if t.to_lowercase().contains("assistant") => ContactType::PhysicianAssistant,
            _ => ContactType::Physician,
        }
    }

    /// "Physician, Physician Assistant, ..., or Other" for prompt text.
    pub fn prompt_list() -> String {
        let names: Vec<&str> = Self::ALL.iter().map(|c| c.as_str()).collect();
        match names.split_last() {
            Some((last, rest)) if !rest.is_empty() => format!("{}, or {}", rest.join(", "), last),
            _ => names.join(""),
        }
    }
}

impl fmt::Display for ContactType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContactType {
    type Err = UnknownContactType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| UnknownContactType(s.to_string()))
    }
}
