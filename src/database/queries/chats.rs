use sqlx::Error;
use uuid::Uuid;

use super::get_database_pool;
use crate::database::models::{Chat, ChatMessageRow, NewChatMessage};

/// Get or create the chat row for a conversation, titled from the first
/// message when created.
pub async fn ensure_chat(chat_id: Uuid, user_id: Uuid, title: &str) -> Result<Chat, Error> {
    let pool = get_database_pool()?;
    sqlx::query_as::<_, Chat>(
        r#"
        INSERT INTO chats (id, user_id, title, created_at, updated_at)
        VALUES ($1, $2, $3, CURRENT_TIMESTAMP, CURRENT_TIMESTAMP)
        ON CONFLICT (id) DO UPDATE SET updated_at = CURRENT_TIMESTAMP
        RETURNING id, user_id, title, created_at, updated_at
        "#,
    )
    .bind(chat_id)
    .bind(user_id)
    .bind(title)
    .fetch_one(pool.as_ref())
    .await
}

pub async fn insert_message(message: NewChatMessage) -> Result<ChatMessageRow, Error> {
    let pool = get_database_pool()?;
    sqlx::query_as::<_, ChatMessageRow>(
        r#"
        INSERT INTO chat_messages (id, chat_id, user_id, role, content, image_url, image_base64, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, CURRENT_TIMESTAMP)
        RETURNING id, chat_id, user_id, role, content, image_url, image_base64, created_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(message.chat_id)
    .bind(message.user_id)
    .bind(message.role)
    .bind(message.content)
    .bind(message.image_url)
    .bind(message.image_base64)
    .fetch_one(pool.as_ref())
    .await
}

pub async fn list_messages(chat_id: Uuid, user_id: Uuid) -> Result<Vec<ChatMessageRow>, Error> {
    let pool = get_database_pool()?;
    sqlx::query_as::<_, ChatMessageRow>(
        r#"
        SELECT id, chat_id, user_id, role, content, image_url, image_base64, created_at
        FROM chat_messages
        WHERE chat_id = $1 AND user_id = $2
        ORDER BY created_at ASC
        "#,
    )
    .bind(chat_id)
    .bind(user_id)
    .fetch_all(pool.as_ref())
    .await
}
