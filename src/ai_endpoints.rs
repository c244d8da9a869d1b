use actix_web::{http::header, web, HttpRequest, HttpResponse};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::app_state::AppState;
use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::models::{Project, Task, TaskStatus};

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("AI_API_KEY is not configured")]
    MissingApiKey,

    #[error("AI service unreachable: {0}")]
    Request(String),

    #[error("AI service error: {0}")]
    Status(u16),

    #[error("AI response could not be read: {0}")]
    Payload(String),

    #[error("AI response parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("AI response contained no report")]
    Empty,

    #[error("health score {0} is outside 0-100")]
    HealthOutOfRange(f64),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectStats {
    pub total: usize,
    pub todo: usize,
    pub in_progress: usize,
    pub review: usize,
    pub done: usize,
}

impl ProjectStats {
    pub fn from_tasks<'a>(tasks: impl IntoIterator<Item = &'a Task>) -> Self {
        tasks.into_iter().fold(ProjectStats::default(), |mut s, t| {
            s.total += 1;
            match t.status {
                TaskStatus::Todo => s.todo += 1,
                TaskStatus::InProgress => s.in_progress += 1,
                TaskStatus::Review => s.review += 1,
                TaskStatus::Done => s.done += 1,
            }
            s
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub summary: String,
    pub bottlenecks: Vec<String>,
    pub recommendations: Vec<String>,
    pub health_score: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_estimate: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawReport {
    summary: String,
    bottlenecks: Vec<String>,
    recommendations: Vec<String>,
    health_score: f64,
    #[serde(default)]
    completion_estimate: Option<String>,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Deserialize)]
struct Part {
    text: Option<String>,
}

pub fn build_prompt(project: &Project, stats: &ProjectStats) -> String {
    format!(
        "Generate a professional project management report for the following project:\n\
         Project Name: {name}\n\
         Description: {description}\n\
         Created At: {created}\n\
         \n\
         Current Stats:\n\
         - Total Tasks: {total}\n\
         - Tasks Done: {done}\n\
         - Tasks In Progress: {in_progress}\n\
         - Tasks in Review: {review}\n\
         - Tasks Pending: {todo}\n\
         \n\
         Analyze this data and provide:\n\
         1. A summary of current progress.\n\
         2. Identification of potential bottlenecks.\n\
         3. Recommendations for the project manager.\n\
         4. An overall health score (0-100).",
        name = project.name,
        description = project.description,
        created = project.created_at,
        total = stats.total,
        done = stats.done,
        in_progress = stats.in_progress,
        review = stats.review,
        todo = stats.todo,
    )
}

fn request_body(prompt: &str) -> serde_json::Value {
    json!({
        "contents": [{ "parts": [{ "text": prompt }] }],
        "generationConfig": {
            "responseMimeType": "application/json",
            "responseSchema": {
                "type": "OBJECT",
                "properties": {
                    "summary": { "type": "STRING" },
                    "bottlenecks": { "type": "ARRAY", "items": { "type": "STRING" } },
                    "recommendations": { "type": "ARRAY", "items": { "type": "STRING" } },
                    "healthScore": { "type": "NUMBER" },
                    "completionEstimate": { "type": "STRING" }
                },
                "required": ["summary", "bottlenecks", "recommendations", "healthScore"]
            }
        }
    })
}

/// Parses the model's JSON answer, rejecting health scores outside 0-100.
pub fn parse_report(text: &str) -> Result<Report, ReportError> {
    let raw: RawReport = serde_json::from_str(text)?;
    if !(0.0..=100.0).contains(&raw.health_score) {
        return Err(ReportError::HealthOutOfRange(raw.health_score));
    }
    Ok(Report {
        summary: raw.summary,
        bottlenecks: raw.bottlenecks,
        recommendations: raw.recommendations,
        health_score: raw.health_score.round() as u8,
        completion_estimate: raw.completion_estimate,
    })
}

fn first_text(response: GenerateContentResponse) -> Result<String, ReportError> {
    response
        .candidates
        .into_iter()
        .filter_map(|c| c.content)
        .flat_map(|c| c.parts)
        .find_map(|p| p.text)
        .ok_or(ReportError::Empty)
}

pub fn render_text(project_name: &str, report: &Report) -> String {
    format!(
        "Project Analysis: {}\nHealth: {}%\nSummary: {}",
        project_name, report.health_score, report.summary
    )
}

/// One generateContent round trip. No retries.
pub async fn generate_report(
    client: &reqwest::Client,
    config: &Config,
    project: &Project,
    tasks: &[Task],
) -> Result<Report, ReportError> {
    let api_key = config.ai_api_key.as_deref().ok_or(ReportError::MissingApiKey)?;
    let stats = ProjectStats::from_tasks(tasks);
    let url = format!(
        "{}/v1beta/models/{}:generateContent",
        config.ai_endpoint.trim_end_matches('/'),
        config.ai_model
    );
    debug!("Requesting report for {} from {}", project.id, url);

    let resp = client
        .post(&url)
        .header("x-goog-api-key", api_key)
        .json(&request_body(&build_prompt(project, &stats)))
        .send()
        .await
        .map_err(|e| ReportError::Request(e.to_string()))?;
    if !resp.status().is_success() {
        return Err(ReportError::Status(resp.status().as_u16()));
    }
    let body: GenerateContentResponse = resp
        .json()
        .await
        .map_err(|e| ReportError::Payload(e.to_string()))?;
    let report = parse_report(&first_text(body)?)?;
    info!("Report for {} scored {}", project.id, report.health_score);
    Ok(report)
}

/// Copies the project and its tasks out of the workspace so the lock is not
/// held across the network call.
async fn snapshot(req: &HttpRequest, data: &AppState, project_id: &str) -> AppResult<(Project, Vec<Task>)> {
    let ws = data.authorized(req).await?;
    let project = ws.company_project(project_id)?.clone();
    let tasks = ws
        .tasks()
        .iter()
        .filter(|t| t.project_id == project.id)
        .cloned()
        .collect();
    Ok((project, tasks))
}

/// GET /projects/{project_id}/report
pub async fn get_report(
    req: HttpRequest,
    data: web::Data<AppState>,
    project_id: web::Path<String>,
) -> AppResult<HttpResponse> {
    let (project, tasks) = snapshot(&req, &data, &project_id).await?;
    let report = generate_report(&data.http_client, &data.config, &project, &tasks).await?;
    Ok(HttpResponse::Ok().json(json!({
        "projectId": project.id,
        "stats": ProjectStats::from_tasks(&tasks),
        "report": report,
    })))
}

fn text_download(project: &Project, report: &Report) -> HttpResponse {
    let filename = format!("{}_AI_Report.txt", project.name.replace(['"', '/', '\\'], "_"));
    HttpResponse::Ok()
        .content_type("text/plain; charset=utf-8")
        .insert_header((
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{filename}\""),
        ))
        .body(render_text(&project.name, report))
}

/// GET /projects/{project_id}/report.txt
/// Generates a fresh report and returns it as text.
pub async fn download_report(
    req: HttpRequest,
    data: web::Data<AppState>,
    project_id: web::Path<String>,
) -> AppResult<HttpResponse> {
    let (project, tasks) = snapshot(&req, &data, &project_id).await?;
    let report = generate_report(&data.http_client, &data.config, &project, &tasks).await?;
    Ok(text_download(&project, &report))
}

/// POST /projects/{project_id}/report.txt
/// Renders a report the client already holds, so the file matches what was shown.
pub async fn export_report(
    req: HttpRequest,
    data: web::Data<AppState>,
    project_id: web::Path<String>,
    body: web::Json<Report>,
) -> AppResult<HttpResponse> {
    let project = data.authorized(&req).await?.company_project(&project_id)?.clone();
    let report = body.into_inner();
    if report.health_score > 100 {
        return Err(AppError::validation("healthScore must be between 0 and 100"));
    }
    Ok(text_download(&project, &report))
}
