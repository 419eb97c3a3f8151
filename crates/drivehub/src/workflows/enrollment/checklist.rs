use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::domain::{Document, DocumentId, DocumentStatus, DocumentType};

/// Checklist status of one required document type. `NotUploaded` has no backing row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChecklistStatus {
    NotUploaded,
    Pending,
    Accepted,
    Refused,
}

impl From<DocumentStatus> for ChecklistStatus {
    fn from(value: DocumentStatus) -> Self {
        match value {
            DocumentStatus::Pending => ChecklistStatus::Pending,
            DocumentStatus::Accepted => ChecklistStatus::Accepted,
            DocumentStatus::Refused => ChecklistStatus::Refused,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChecklistEntry {
    pub status: ChecklistStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refusal_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upload_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_id: Option<DocumentId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
}

impl ChecklistEntry {
    fn missing() -> Self {
        Self {
            status: ChecklistStatus::NotUploaded,
            refusal_reason: None,
            upload_date: None,
            document_id: None,
            version: None,
        }
    }

    fn from_document(document: &Document) -> Self {
        Self {
            status: document.status.into(),
            refusal_reason: document.refusal_reason.clone(),
            upload_date: Some(document.upload_date),
            document_id: Some(document.id.clone()),
            version: Some(document.version),
        }
    }
}

/// Per-user projection over the four required document types.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Checklist {
    entries: BTreeMap<DocumentType, ChecklistEntry>,
}

impl Checklist {
    /// Build the checklist from the owner's current document rows.
    pub fn from_documents(documents: &[Document]) -> Self {
        let entries = DocumentType::REQUIRED
            .into_iter()
            .map(|document_type| {
                let entry = documents
                    .iter()
                    .find(|document| document.document_type == document_type)
                    .map(ChecklistEntry::from_document)
                    .unwrap_or_else(ChecklistEntry::missing);
                (document_type, entry)
            })
            .collect();
        Self { entries }
    }

    pub fn entry(&self, document_type: DocumentType) -> Option<&ChecklistEntry> {
        self.entries.get(&document_type)
    }

    pub fn entries(&self) -> impl Iterator<Item = (DocumentType, &ChecklistEntry)> {
        self.entries
            .iter()
            .map(|(document_type, entry)| (*document_type, entry))
    }

    /// All required types uploaded and none refused.
    pub fn is_ready_for_review(&self) -> bool {
        self.entries.values().all(|entry| {
            matches!(
                entry.status,
                ChecklistStatus::Pending | ChecklistStatus::Accepted
            )
        })
    }

    pub fn has_refusal(&self) -> bool {
        self.count(ChecklistStatus::Refused) > 0
    }

    pub fn is_fully_accepted(&self) -> bool {
        self.count(ChecklistStatus::Accepted) == DocumentType::REQUIRED.len()
    }

    pub fn count(&self, status: ChecklistStatus) -> usize {
        self.entries
            .values()
            .filter(|entry| entry.status == status)
            .count()
    }

    pub fn uploaded(&self) -> usize {
        DocumentType::REQUIRED.len() - self.count(ChecklistStatus::NotUploaded)
    }

    pub fn refusals(&self) -> Vec<(DocumentType, String)> {
        self.entries
            .iter()
            .filter(|(_, entry)| entry.status == ChecklistStatus::Refused)
            .map(|(document_type, entry)| {
                (
                    *document_type,
                    entry.refusal_reason.clone().unwrap_or_default(),
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::enrollment::domain::UserId;
    use crate::workflows::enrollment::files::FileRef;
    use chrono::TimeZone;

    fn row(document_type: DocumentType, status: DocumentStatus) -> Document {
        Document {
            id: DocumentId(format!("doc-{document_type}")),
            owner_id: UserId::from("stu-1"),
            document_type,
            status,
            file_ref: FileRef(format!("documents/{document_type}/scan.pdf")),
            file_name: "scan.pdf".to_string(),
            content_type: "application/pdf".to_string(),
            file_size: 64,
            upload_date: Utc.with_ymd_and_hms(2025, 5, 2, 10, 0, 0).unwrap(),
            refusal_reason: (status == DocumentStatus::Refused)
                .then(|| "photo illegible".to_string()),
            reviewed_by: None,
            reviewed_at: None,
            version: 1,
        }
    }

    #[test]
    fn missing_rows_are_not_uploaded() {
        let checklist = Checklist::from_documents(&[
            row(DocumentType::ProfilePhoto, DocumentStatus::Pending),
            row(DocumentType::IdCard, DocumentStatus::Accepted),
        ]);
        assert_eq!(checklist.count(ChecklistStatus::NotUploaded), 2);
        assert_eq!(checklist.uploaded(), 2);
        assert!(!checklist.is_ready_for_review());
        assert_eq!(
            checklist
                .entry(DocumentType::MedicalCertificate)
                .map(|entry| entry.status),
            Some(ChecklistStatus::NotUploaded)
        );
    }

    #[test]
    fn any_refusal_blocks_review() {
        let mut rows: Vec<Document> = DocumentType::REQUIRED
            .into_iter()
            .map(|document_type| row(document_type, DocumentStatus::Pending))
            .collect();
        assert!(Checklist::from_documents(&rows).is_ready_for_review());

        rows[1] = row(DocumentType::IdCard, DocumentStatus::Refused);
        let checklist = Checklist::from_documents(&rows);
        assert!(!checklist.is_ready_for_review());
        assert!(checklist.has_refusal());
        assert_eq!(
            checklist.refusals(),
            vec![(DocumentType::IdCard, "photo illegible".to_string())]
        );
    }

    #[test]
    fn fully_accepted_requires_every_type() {
        let rows: Vec<Document> = DocumentType::REQUIRED
            .into_iter()
            .map(|document_type| row(document_type, DocumentStatus::Accepted))
            .collect();
        assert!(Checklist::from_documents(&rows).is_fully_accepted());
        assert!(!Checklist::from_documents(&rows[..3]).is_fully_accepted());
    }

    #[test]
    fn serializes_as_map_keyed_by_document_type() {
        let value = serde_json::to_value(Checklist::from_documents(&[])).expect("serialize");
        assert_eq!(value["id_card"]["status"], "not_uploaded");
        assert!(value["id_card"].get("refusal_reason").is_none());
        assert_eq!(value.as_object().map(|map| map.len()), Some(4));
    }
}
