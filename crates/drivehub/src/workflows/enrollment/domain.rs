use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::files::FileRef;

macro_rules! identifier {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

identifier!(
    /// Identifier of a registered user (student, teacher, manager or guest).
    UserId
);
identifier!(
    /// Identifier of a driving school.
    SchoolId
);
identifier!(
    /// Identifier of an enrollment record.
    EnrollmentId
);
identifier!(
    /// Identifier of a document row.
    DocumentId
);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Guest,
    Student,
    Teacher,
    Manager,
}

impl Role {
    pub const fn label(self) -> &'static str {
        match self {
            Role::Guest => "guest",
            Role::Student => "student",
            Role::Teacher => "teacher",
            Role::Manager => "manager",
        }
    }
}

/// A registered user. Also the explicit actor value passed into every workflow call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub role: Role,
    /// Set only for managers and teachers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub school_id: Option<SchoolId>,
}

impl User {
    pub fn student(id: impl Into<String>) -> Self {
        Self {
            id: UserId(id.into()),
            role: Role::Student,
            school_id: None,
        }
    }

    pub fn manager(id: impl Into<String>, school_id: SchoolId) -> Self {
        Self {
            id: UserId(id.into()),
            role: Role::Manager,
            school_id: Some(school_id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrivingSchool {
    pub id: SchoolId,
    pub manager_id: UserId,
    pub name: String,
}

/// Approval state machine of an enrollment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrollmentStatus {
    PendingDocuments,
    PendingApproval,
    Approved,
    Rejected,
}

impl EnrollmentStatus {
    pub const fn label(self) -> &'static str {
        match self {
            EnrollmentStatus::PendingDocuments => "pending_documents",
            EnrollmentStatus::PendingApproval => "pending_approval",
            EnrollmentStatus::Approved => "approved",
            EnrollmentStatus::Rejected => "rejected",
        }
    }

    /// Rejected enrollments are retained for audit but no longer count.
    pub const fn is_active(self) -> bool {
        match self {
            EnrollmentStatus::PendingDocuments
            | EnrollmentStatus::PendingApproval
            | EnrollmentStatus::Approved => true,
            EnrollmentStatus::Rejected => false,
        }
    }
}

impl fmt::Display for EnrollmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enrollment {
    pub id: EnrollmentId,
    pub student_id: UserId,
    pub school_id: SchoolId,
    pub status: EnrollmentStatus,
    pub created_at: DateTime<Utc>,
    pub approved_at: Option<DateTime<Utc>>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    /// Manager who approved or rejected the enrollment.
    pub decided_by: Option<UserId>,
    pub version: u64,
}

impl Enrollment {
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }
}

/// The four artifacts every student must provide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    ProfilePhoto,
    IdCard,
    MedicalCertificate,
    ResidenceCertificate,
}

impl DocumentType {
    pub const REQUIRED: [DocumentType; 4] = [
        DocumentType::ProfilePhoto,
        DocumentType::IdCard,
        DocumentType::MedicalCertificate,
        DocumentType::ResidenceCertificate,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            DocumentType::ProfilePhoto => "profile_photo",
            DocumentType::IdCard => "id_card",
            DocumentType::MedicalCertificate => "medical_certificate",
            DocumentType::ResidenceCertificate => "residence_certificate",
        }
    }

    pub const fn title(self) -> &'static str {
        match self {
            DocumentType::ProfilePhoto => "Profile Photo",
            DocumentType::IdCard => "Id Card",
            DocumentType::MedicalCertificate => "Medical Certificate",
            DocumentType::ResidenceCertificate => "Residence Certificate",
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unrecognized document type '{0}'")]
pub struct UnknownDocumentType(pub String);

impl FromStr for DocumentType {
    type Err = UnknownDocumentType;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        DocumentType::REQUIRED
            .into_iter()
            .find(|candidate| candidate.label() == raw)
            .ok_or_else(|| UnknownDocumentType(raw.to_string()))
    }
}

/// Review state of an existing document row. "Not uploaded" is the absence of a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Pending,
    Accepted,
    Refused,
}

impl DocumentStatus {
    pub const fn label(self) -> &'static str {
        match self {
            DocumentStatus::Pending => "pending",
            DocumentStatus::Accepted => "accepted",
            DocumentStatus::Refused => "refused",
        }
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Current document for one `(owner_id, document_type)` key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub owner_id: UserId,
    pub document_type: DocumentType,
    pub status: DocumentStatus,
    pub file_ref: FileRef,
    pub file_name: String,
    pub content_type: String,
    pub file_size: u64,
    pub upload_date: DateTime<Utc>,
    pub refusal_reason: Option<String>,
    pub reviewed_by: Option<UserId>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub version: u64,
}
