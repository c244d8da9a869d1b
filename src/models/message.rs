use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where a message was posted: a project channel or a single receiver.
/// Flattened into the record so exactly one of `projectId` / `receiverId`
/// appears in the stored JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageScope {
    Channel {
        #[serde(rename = "projectId")]
        project_id: String,
    },
    Direct {
        #[serde(rename = "receiverId")]
        receiver_id: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentKind {
    Image,
    Video,
    File,
}

impl AttachmentKind {
    pub fn from_mime(mime: &str) -> Self {
        if mime.starts_with("image") {
            AttachmentKind::Image
        } else if mime.starts_with("video") {
            AttachmentKind::Video
        } else {
            AttachmentKind::File
        }
    }

    /// Reads the media type out of a `data:<mime>;base64,...` URI.
    pub fn from_data_uri(url: &str) -> Self {
        let mime = url
            .strip_prefix("data:")
            .and_then(|rest| rest.split([';', ',']).next())
            .unwrap_or_default();
        Self::from_mime(mime)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub name: String,
    /// Inline `data:` URI holding the file contents.
    pub url: String,
    #[serde(rename = "type")]
    pub kind: AttachmentKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    #[serde(flatten)]
    pub scope: MessageScope,
    pub sender_id: String,
    pub sender_name: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment: Option<Attachment>,
}

impl Message {
    pub fn project_id(&self) -> Option<&str> {
        match &self.scope {
            MessageScope::Channel { project_id } => Some(project_id),
            MessageScope::Direct { .. } => None,
        }
    }

    pub fn receiver_id(&self) -> Option<&str> {
        match &self.scope {
            MessageScope::Direct { receiver_id } => Some(receiver_id),
            MessageScope::Channel { .. } => None,
        }
    }

    /// True when the message belongs to the 1:1 conversation between `a` and `b`.
    pub fn is_between(&self, a: &str, b: &str) -> bool {
        match self.receiver_id() {
            Some(receiver) => {
                (self.sender_id == a && receiver == b) || (self.sender_id == b && receiver == a)
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_flattens_to_exactly_one_key() {
        let msg = Message {
            id: "m1".into(),
            scope: MessageScope::Direct { receiver_id: "u-2".into() },
            sender_id: "u-1".into(),
            sender_name: "Ada".into(),
            text: "ping".into(),
            timestamp: Utc::now(),
            attachment: None,
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["receiverId"], "u-2");
        assert!(json.get("projectId").is_none());

        let back: Message = serde_json::from_value(json).unwrap();
        assert_eq!(back.receiver_id(), Some("u-2"));
        assert!(back.is_between("u-2", "u-1"));
        assert!(!back.is_between("u-1", "u-3"));
    }

    #[test]
    fn channel_messages_parse_from_stored_layout() {
        let raw = r#"{"id":"1","projectId":"p9","senderId":"u-1","senderName":"Ada",
                      "text":"hi","timestamp":"2026-10-19T08:00:00Z"}"#;
        let msg: Message = serde_json::from_str(raw).unwrap();
        assert_eq!(msg.project_id(), Some("p9"));
        assert_eq!(msg.receiver_id(), None);
    }

    #[test]
    fn attachment_kind_follows_data_uri_media_type() {
        assert_eq!(AttachmentKind::from_data_uri("data:image/png;base64,AAAA"), AttachmentKind::Image);
        assert_eq!(AttachmentKind::from_data_uri("data:video/mp4;base64,AAAA"), AttachmentKind::Video);
        assert_eq!(AttachmentKind::from_data_uri("data:application/pdf;base64,AA"), AttachmentKind::File);
        assert_eq!(AttachmentKind::from_data_uri("https://example.com/x.png"), AttachmentKind::File);
    }
}
