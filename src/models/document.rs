use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Registry entry for a file shared in a project. Only metadata is kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: String,
    pub name: String,
    pub project_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    pub uploaded_by: String,
    pub uploaded_at: NaiveDate,
    pub file_type: String,
}

impl Document {
    /// Lower-cased extension of `file_name`, or `fallback` when there is none.
    pub fn file_type_for(file_name: Option<&str>, fallback: &str) -> String {
        file_name
            .and_then(|name| name.rsplit_once('.'))
            .map(|(_, ext)| ext.trim().to_ascii_lowercase())
            .filter(|ext| !ext.is_empty())
            .unwrap_or_else(|| fallback.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_type_comes_from_the_extension() {
        assert_eq!(Document::file_type_for(Some("Q4_Proposal.PDF"), "doc"), "pdf");
        assert_eq!(Document::file_type_for(Some("archive.tar.gz"), "doc"), "gz");
        assert_eq!(Document::file_type_for(Some("README"), "doc"), "doc");
        assert_eq!(Document::file_type_for(Some("trailing."), "file"), "file");
        assert_eq!(Document::file_type_for(None, "doc"), "doc");
    }
}
