use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::Role;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DoctorDetails {
    pub specialization: String,
    pub years_of_experience: u32,
    /// Assigned at registration, never updated.
    pub license_number: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientDetails {
    pub emergency_contact_name: Option<String>,
    pub emergency_contact_phone: Option<String>,
}

/// Role-specific half of a profile. The variant *is* the role, so a
/// doctor profile without doctor details cannot be represented.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProfileDetails {
    Doctor(DoctorDetails),
    Patient(PatientDetails),
}

impl ProfileDetails {
    pub fn role(&self) -> Role {
        match self {
            ProfileDetails::Doctor(_) => Role::Doctor,
            ProfileDetails::Patient(_) => Role::Patient,
        }
    }
}

/// One-to-one extension of a `User`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: Uuid,
    pub user_id: Uuid,
    pub phone_number: Option<String>,
    pub address: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub details: ProfileDetails,
}

impl Profile {
    pub fn role(&self) -> Role {
        self.details.role()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_follows_details_variant() {
        let doctor = ProfileDetails::Doctor(DoctorDetails {
            specialization: "Cardiology".into(),
            years_of_experience: 12,
            license_number: "LIC-1".into(),
        });
        assert_eq!(doctor.role(), Role::Doctor);
        assert_eq!(ProfileDetails::Patient(PatientDetails::default()).role(), Role::Patient);
    }

    #[test]
    fn details_serialize_without_tag() {
        let details = ProfileDetails::Patient(PatientDetails {
            emergency_contact_name: Some("Bob".into()),
            emergency_contact_phone: None,
        });
        let json = serde_json::to_value(&details).unwrap();
        assert_eq!(json["emergency_contact_name"], "Bob");
        assert!(json.get("Patient").is_none());
    }
}
