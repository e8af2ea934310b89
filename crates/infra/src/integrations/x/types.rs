//! X API v2 wire types
use serde::{Deserialize, Serialize};
use tern_domain::{PostReceipt, UserProfile};

#[derive(Debug, Serialize)]
pub(crate) struct CreatePostRequest<'a> {
    pub text: &'a str,
}

/// Every v2 success body wraps its payload in `data`.
#[derive(Debug, Deserialize)]
pub(crate) struct DataEnvelope<T> {
    pub data: T,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CreatedPost {
    pub id: String,
    #[serde(default)]
    pub text: String,
}

impl From<CreatedPost> for PostReceipt {
    fn from(post: CreatedPost) -> Self {
        Self { id: post.id, text: post.text }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct UserData {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub name: Option<String>,
}

impl From<UserData> for UserProfile {
    fn from(user: UserData) -> Self {
        Self { id: user.id, username: user.username, name: user.name }
    }
}

/// Error body shapes: problem details (`title`/`detail`) or an `errors` list.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ApiErrorBody {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub detail: Option<String>,
    #[serde(default)]
    pub errors: Vec<ApiErrorItem>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiErrorItem {
    #[serde(default)]
    pub message: Option<String>,
}

impl ApiErrorBody {
    /// Most specific human-readable reason in the body.
    pub fn reason(&self) -> Option<String> {
        self.detail
            .clone()
            .or_else(|| self.errors.iter().find_map(|item| item.message.clone()))
            .or_else(|| self.title.clone())
            .filter(|reason| !reason.trim().is_empty())
    }
}
