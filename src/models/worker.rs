//! Worker and worker note models.

use serde::{Deserialize, Serialize};

use crate::wallet::group_thousands;

/// A worker on the payroll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Worker {
    /// Creation timestamp in milliseconds, never reused
    pub id: i64,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Salary in sats
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub salary: Option<u64>,
    /// Lightning address the worker is paid at
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

impl Worker {
    /// One-line summary for the notes overview, e.g. `Cook - 50,000 SATS`.
    pub fn summary(&self) -> String {
        let role = self.role.as_deref().unwrap_or("No role");
        match self.salary {
            Some(salary) => format!("{} - {} SATS", role, group_thousands(salary)),
            None => role.to_string(),
        }
    }
}

/// Request body for adding a worker.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateWorkerRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub salary: Option<u64>,
    #[serde(default)]
    pub address: Option<String>,
}

/// Result of adding a worker: the new worker and the updated list.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateWorkerResult {
    pub worker: Worker,
    pub workers: Vec<Worker>,
}

/// Result of a worker deletion. Deleting an unknown id is a no-op.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteWorkerResult {
    pub removed: bool,
    pub workers: Vec<Worker>,
}

/// Persisted form of a worker note.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredNote {
    pub text: String,
    #[serde(default)]
    pub updated_at: Option<String>,
}

/// A worker's free-text note.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerNote {
    pub worker_id: i64,
    pub worker_name: String,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

/// Request body for saving a note. The previous text is replaced.
#[derive(Debug, Clone, Deserialize)]
pub struct SaveNoteRequest {
    #[serde(default)]
    pub text: String,
}

/// Entry in the notes overview.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotesOverviewEntry {
    pub worker_id: i64,
    pub name: String,
    pub summary: String,
    pub has_note: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_with_role_and_salary() {
        let worker = Worker {
            id: 1,
            name: "Ana".to_string(),
            role: Some("Cook".to_string()),
            salary: Some(50_000),
            address: None,
        };
        assert_eq!(worker.summary(), "Cook - 50,000 SATS");
    }

    #[test]
    fn test_summary_without_details() {
        let worker = Worker {
            id: 1,
            name: "Ana".to_string(),
            role: None,
            salary: None,
            address: None,
        };
        assert_eq!(worker.summary(), "No role");
    }

    #[test]
    fn test_worker_without_optional_fields_deserializes() {
        let worker: Worker = serde_json::from_str(r#"{"id": 5, "name": "Luis"}"#).unwrap();
        assert_eq!(worker.id, 5);
        assert!(worker.role.is_none());
        assert!(worker.salary.is_none());
        assert!(worker.address.is_none());
    }
}
