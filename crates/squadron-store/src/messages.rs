use crate::gateway::{parse_enum, parse_ts, StoreGateway};
use rusqlite::{params, Row};
use squadron_core::{Message, SquadronResult};

const MESSAGE_COLUMNS: &str = "id, from_agent_id, to_agent_id, content, type, read, created_at";

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<Message> {
    Ok(Message {
        id: row.get(0)?,
        from_agent_id: row.get(1)?,
        to_agent_id: row.get(2)?,
        content: row.get(3)?,
        kind: parse_enum(4, row.get::<_, String>(4)?)?,
        read: row.get::<_, i64>(5)? != 0,
        created_at: parse_ts(6, row.get::<_, String>(6)?)?,
    })
}

impl StoreGateway {
    /// Inserts a message row.
    pub fn insert_message(&self, message: &Message) -> SquadronResult<()> {
        self.execute(
            "INSERT INTO messages (id, from_agent_id, to_agent_id, content, type, read, \
             created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                message.id,
                message.from_agent_id,
                message.to_agent_id,
                message.content,
                message.kind.as_str(),
                message.read as i64,
                message.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Unread messages addressed to the agent (directed or broadcast),
    /// newest first, capped at `limit`.
    pub fn unread_messages_for(&self, agent_id: &str, limit: i64) -> SquadronResult<Vec<Message>> {
        self.query(
            &format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages \
                 WHERE (to_agent_id = ?1 OR to_agent_id IS NULL) AND read = 0 \
                 ORDER BY created_at DESC LIMIT ?2"
            ),
            params![agent_id, limit],
            message_from_row,
        )
    }

    /// Marks every unread message addressed to the agent (directed or
    /// broadcast) as read. The flag only ever flips false→true.
    pub fn mark_messages_read(&self, agent_id: &str) -> SquadronResult<usize> {
        self.execute(
            "UPDATE messages SET read = 1 \
             WHERE (to_agent_id = ?1 OR to_agent_id IS NULL) AND read = 0",
            params![agent_id],
        )
    }

    /// Every message sent by the given agent, oldest first.
    pub fn messages_from(&self, agent_id: &str) -> SquadronResult<Vec<Message>> {
        self.query(
            &format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages WHERE from_agent_id = ?1 \
                 ORDER BY created_at ASC"
            ),
            params![agent_id],
            message_from_row,
        )
    }
}
