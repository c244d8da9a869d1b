pub mod document;
pub mod message;
pub mod notification;
pub mod project;
pub mod task;
pub mod user;

use serde::{Deserialize, Serialize};

pub use document::Document;
pub use message::{Attachment, AttachmentKind, Message, MessageScope};
pub use notification::Notification;
pub use project::Project;
pub use task::{Task, TaskStatus};
pub use user::{Role, User};

/// Company every non-admin signup lands in, and home of the bootstrap admin.
pub const ROOT_COMPANY_ID: &str = "org-root";

/// Priority shared by projects and tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    /// Ordering weight used when sorting tasks by priority.
    pub fn rank(self) -> u8 {
        match self {
            Priority::Low => 1,
            Priority::Medium => 2,
            Priority::High => 3,
        }
    }
}
