// Database models - Client
use serde::{Deserialize, Serialize};

/// A client record; owns zero or more transcriptions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Client {
    pub id: String,
    pub name: String,
    pub email: String,
    pub created_at: String,
}

impl Client {
    pub fn new(name: &str, email: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            email: email.to_string(),
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}
