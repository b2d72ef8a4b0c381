use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, Clone, Copy, Default)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
pub enum CommunityKind {
    #[default]
    Default,
    Local,
    Special,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Community {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub telegram_chat_id: Option<i64>,
    pub kind: CommunityKind,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewCommunity {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub telegram_chat_id: Option<i64>,
    pub kind: CommunityKind,
}
