use actix_web::{web, HttpRequest, HttpResponse};
use chrono::Utc;
use log::info;
use serde::{Deserialize, Serialize};

use crate::app_state::{AppState, SearchQuery};
use crate::error::{AppError, AppResult};
use crate::models::Document;
use crate::store::StoreKey;
use crate::workspace::{fresh_id, matches_search, Workspace};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterDocumentRequest {
    pub name: String,
    pub project_id: String,
    #[serde(default)]
    pub task_id: Option<String>,
    /// Name of the picked file; only its extension is kept.
    #[serde(default)]
    pub file_name: Option<String>,
}

/// A registry entry with the names the document table shows.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentEntry {
    #[serde(flatten)]
    pub document: Document,
    pub project_name: String,
    pub uploader_name: Option<String>,
}

impl Workspace {
    /// Records a document against a company project and, optionally, one of
    /// that project's tasks. Files attached to a task fall back to the
    /// `file` type, standalone uploads to `doc`.
    pub fn register_document(&mut self, req: RegisterDocumentRequest) -> AppResult<Document> {
        let uploaded_by = self.acting_user()?.id.clone();
        if req.name.trim().is_empty() || req.project_id.trim().is_empty() {
            return Err(AppError::validation(
                "Please provide at least a name and project context.",
            ));
        }
        self.company_project(&req.project_id)?;
        let task_id = req.task_id.filter(|id| !id.trim().is_empty());
        if let Some(task_id) = &task_id {
            let idx = self.company_task_index(task_id)?;
            if self.tasks[idx].project_id != req.project_id {
                return Err(AppError::validation("Task does not belong to this project"));
            }
        }
        let fallback = if task_id.is_some() { "file" } else { "doc" };

        let document = Document {
            id: fresh_id("d-", |id| self.documents.iter().any(|d| d.id == id))?,
            name: req.name.trim().to_string(),
            project_id: req.project_id,
            task_id,
            uploaded_by,
            uploaded_at: Utc::now().date_naive(),
            file_type: Document::file_type_for(req.file_name.as_deref(), fallback),
        };
        self.documents.push(document.clone());
        self.touch(StoreKey::Documents);
        info!("Document {} registered in {}", document.id, document.project_id);
        Ok(document)
    }

    pub fn company_documents(&self, search: Option<&str>) -> AppResult<Vec<DocumentEntry>> {
        let company_id = self.company_id()?;
        Ok(self
            .documents
            .iter()
            .filter(|d| matches_search(&[d.name.as_str()], search))
            .filter_map(|d| {
                let project = self
                    .projects
                    .iter()
                    .find(|p| p.id == d.project_id && p.company_id == company_id)?;
                Some(DocumentEntry {
                    document: d.clone(),
                    project_name: project.name.clone(),
                    uploader_name: self.user(&d.uploaded_by).map(|u| u.name.clone()),
                })
            })
            .collect())
    }
}

/// GET /documents?search=
pub async fn list_documents(
    req: HttpRequest,
    data: web::Data<AppState>,
    query: web::Query<SearchQuery>,
) -> AppResult<HttpResponse> {
    let ws = data.authorized(&req).await?;
    Ok(HttpResponse::Ok().json(ws.company_documents(query.term())?))
}

/// POST /documents
pub async fn register_document(
    req: HttpRequest,
    data: web::Data<AppState>,
    body: web::Json<RegisterDocumentRequest>,
) -> AppResult<HttpResponse> {
    let mut ws = data.authorized(&req).await?;
    let document = ws.register_document(body.into_inner())?;
    data.commit(&mut ws).await?;
    Ok(HttpResponse::Created().json(document))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::tests::new_project;
    use crate::task::tests::new_task;
    use crate::workspace::testing;

    fn upload(name: &str, project_id: &str, file_name: Option<&str>) -> RegisterDocumentRequest {
        RegisterDocumentRequest {
            name: name.to_string(),
            project_id: project_id.to_string(),
            task_id: None,
            file_name: file_name.map(str::to_string),
        }
    }

    #[test]
    fn file_type_comes_from_the_picked_file() {
        let mut ws = testing::workspace();
        let admin = testing::admin(&mut ws, "Ada");
        let p = ws.create_project(new_project("Specs")).unwrap();

        let doc = ws.register_document(upload("Budget", &p.id, Some("Budget.XLSX"))).unwrap();
        assert_eq!(doc.file_type, "xlsx");
        assert_eq!(doc.uploaded_by, admin.id);
        let bare = ws.register_document(upload("Notes", &p.id, None)).unwrap();
        assert_eq!(bare.file_type, "doc");
    }

    #[test]
    fn task_attachments_must_match_the_project() {
        let mut ws = testing::workspace();
        testing::admin(&mut ws, "Bo");
        let p1 = ws.create_project(new_project("One")).unwrap();
        let p2 = ws.create_project(new_project("Two")).unwrap();
        let task = ws.create_task(&p1.id, new_task("Spec")).unwrap();

        let mut wrong = upload("Draft", &p2.id, Some("draft"));
        wrong.task_id = Some(task.id.clone());
        assert!(matches!(ws.register_document(wrong), Err(AppError::Validation(_))));

        let mut right = upload("Draft", &p1.id, Some("draft"));
        right.task_id = Some(task.id.clone());
        let doc = ws.register_document(right).unwrap();
        assert_eq!(doc.file_type, "file");
        assert_eq!(doc.task_id.as_deref(), Some(task.id.as_str()));
    }

    #[test]
    fn listing_is_company_filtered_and_searchable() {
        let mut ws = testing::workspace();
        testing::admin(&mut ws, "Cy");
        let theirs = ws.create_project(new_project("Theirs")).unwrap();
        ws.register_document(upload("Secret plan", &theirs.id, None)).unwrap();

        testing::admin(&mut ws, "Dee");
        let ours = ws.create_project(new_project("Ours")).unwrap();
        ws.register_document(upload("Roadmap", &ours.id, Some("roadmap.pdf"))).unwrap();
        ws.register_document(upload("Plan B", &ours.id, None)).unwrap();

        assert_eq!(ws.company_documents(None).unwrap().len(), 2);
        let plans = ws.company_documents(Some("plan")).unwrap();
        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0].project_name, "Ours");
        assert_eq!(plans[0].uploader_name.as_deref(), Some("Dee Tester"));
        assert!(matches!(
            ws.register_document(upload("x", &theirs.id, None)),
            Err(AppError::NotFound(_))
        ));
    }
}
