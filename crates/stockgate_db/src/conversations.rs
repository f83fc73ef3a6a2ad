//! Conversation history.

use crate::error::{DbError, Result};
use crate::ids::{CompanyId, ConversationId, UserId};
use crate::types::*;
use crate::StockDb;
use sqlx::Row;

impl StockDb {
    pub async fn conversation_create(
        &self,
        company_id: &CompanyId,
        user_id: &UserId,
        topic: Option<&str>,
    ) -> Result<Conversation> {
        let conversation = Conversation {
            id: ConversationId::new(),
            company_id: company_id.clone(),
            user_id: user_id.clone(),
            topic: topic.map(str::to_string),
            created_at: chrono::Utc::now(),
        };

        sqlx::query(
            "INSERT INTO conversations (id, company_id, user_id, topic, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(conversation.id.as_str())
        .bind(company_id.as_str())
        .bind(user_id.as_str())
        .bind(conversation.topic.as_deref())
        .bind(conversation.created_at.timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(conversation)
    }

    pub async fn conversation_get(
        &self,
        company_id: &CompanyId,
        id: &ConversationId,
    ) -> Result<Option<Conversation>> {
        let row = sqlx::query("SELECT * FROM conversations WHERE id = ? AND company_id = ?")
            .bind(id.as_str())
            .bind(company_id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|row| Conversation {
            id: ConversationId::from_string(row.get::<String, _>("id")),
            company_id: CompanyId::from_string(row.get::<String, _>("company_id")),
            user_id: UserId::from_string(row.get::<String, _>("user_id")),
            topic: row.get("topic"),
            created_at: StockDb::millis_to_datetime(row.get("created_at")),
        }))
    }

    pub async fn message_append(
        &self,
        conversation_id: &ConversationId,
        role: MessageRole,
        content: &str,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO messages (conversation_id, role, content, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(conversation_id.as_str())
        .bind(role.as_str())
        .bind(content)
        .bind(Self::now_millis())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Store a user message and the reply to it together, so a failed turn
    /// leaves no half of the exchange behind.
    pub async fn exchange_append(
        &self,
        conversation_id: &ConversationId,
        user_content: &str,
        assistant_content: &str,
    ) -> Result<()> {
        let now = Self::now_millis();
        let mut tx = self.pool.begin().await?;
        for (role, content) in [
            (MessageRole::User, user_content),
            (MessageRole::Assistant, assistant_content),
        ] {
            sqlx::query(
                "INSERT INTO messages (conversation_id, role, content, created_at) VALUES (?, ?, ?, ?)",
            )
            .bind(conversation_id.as_str())
            .bind(role.as_str())
            .bind(content)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// The last `limit` messages, oldest first.
    pub async fn messages_recent(
        &self,
        conversation_id: &ConversationId,
        limit: usize,
    ) -> Result<Vec<StoredMessage>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM (
                SELECT * FROM messages WHERE conversation_id = ? ORDER BY id DESC LIMIT ?
            ) ORDER BY id ASC
            "#,
        )
        .bind(conversation_id.as_str())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let role_str: String = row.get("role");
                let role = MessageRole::parse(&role_str)
                    .ok_or_else(|| DbError::corrupt(format!("Unknown message role: {}", role_str)))?;
                Ok(StoredMessage {
                    conversation_id: conversation_id.clone(),
                    role,
                    content: row.get("content"),
                    created_at: StockDb::millis_to_datetime(row.get("created_at")),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_recent_window_is_chronological() {
        let db = StockDb::open_in_memory().await.unwrap();
        let company = CompanyId::from_string("acme");
        let conversation = db
            .conversation_create(&company, &UserId::from_string("u1"), Some("restock"))
            .await
            .unwrap();

        for i in 0..5 {
            let role = if i % 2 == 0 {
                MessageRole::User
            } else {
                MessageRole::Assistant
            };
            db.message_append(&conversation.id, role, &format!("m{}", i))
                .await
                .unwrap();
        }

        let recent = db.messages_recent(&conversation.id, 3).await.unwrap();
        let contents: Vec<_> = recent.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["m2", "m3", "m4"]);

        let loaded = db
            .conversation_get(&company, &conversation.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded.topic.as_deref(), Some("restock"));
        assert!(db
            .conversation_get(&CompanyId::from_string("globex"), &conversation.id)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_exchange_appends_in_order() {
        let db = StockDb::open_in_memory().await.unwrap();
        let conversation = db
            .conversation_create(&CompanyId::from_string("acme"), &UserId::from_string("u1"), None)
            .await
            .unwrap();

        db.exchange_append(&conversation.id, "how many 20A breakers?", "12 on hand.")
            .await
            .unwrap();

        let recent = db.messages_recent(&conversation.id, 10).await.unwrap();
        let roles: Vec<_> = recent.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![MessageRole::User, MessageRole::Assistant]);
        assert_eq!(recent[1].content, "12 on hand.");
    }
}
