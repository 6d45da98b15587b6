//! `!quote set|get|delete|find`, backed by a tiny embedded SQLite store
//! opened fresh on each call via `rusqlite`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use agent::{Agent, BoxFuture, ExitCause};
use regex::Regex;
use rusqlite::{Connection, OpenFlags};
use wireproto::{Packet, Payload};

use crate::bot::BotContext;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS quotes (
    name TEXT PRIMARY KEY,
    sender TEXT NOT NULL,
    content TEXT NOT NULL,
    quoted_at INTEGER NOT NULL
);
"#;

pub struct QuoteDb {
    path: PathBuf,
}

impl QuoteDb {
    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<QuoteDb> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let db = QuoteDb { path };
        db.conn()?.execute_batch(SCHEMA)?;
        Ok(db)
    }

    fn conn(&self) -> anyhow::Result<Connection> {
        let conn = Connection::open_with_flags(
            &self.path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA busy_timeout = 5000;")?;
        Ok(conn)
    }

    pub fn set(
        &self,
        name: &str,
        sender: &str,
        content: &str,
        quoted_at: i64,
    ) -> anyhow::Result<bool> {
        let conn = self.conn()?;
        let exists: bool = conn
            .query_row("SELECT 1 FROM quotes WHERE name = ?1", [name], |_| Ok(true))
            .unwrap_or(false);
        if exists {
            return Ok(false);
        }
        conn.execute(
            "INSERT INTO quotes (name, sender, content, quoted_at) VALUES (?1, ?2, ?3, ?4)",
            (name, sender, content, quoted_at),
        )?;
        Ok(true)
    }

    pub fn get(&self, name: &str) -> anyhow::Result<Option<(String, String)>> {
        let conn = self.conn()?;
        let result = conn.query_row(
            "SELECT sender, content FROM quotes WHERE name = ?1",
            [name],
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
        );
        match result {
            Ok(row) => Ok(Some(row)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn delete(&self, name: &str) -> anyhow::Result<bool> {
        let conn = self.conn()?;
        let rows = conn.execute("DELETE FROM quotes WHERE name = ?1", [name])?;
        Ok(rows > 0)
    }

    /// Searches name, sender, and content for `pattern`, capped at 5 hits.
    pub fn find(&self, pattern: &Regex) -> anyhow::Result<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT name, sender, content FROM quotes")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;
        let mut output = Vec::new();
        for row in rows {
            let (name, sender, content) = row?;
            if pattern.is_match(&name) {
                output.push(format!("found match in name: {name}"));
            } else if pattern.is_match(&sender) {
                output.push(format!("found match in sender: {name}"));
            } else if pattern.is_match(&content) {
                output.push(format!("found match in content: {name}"));
            }
            if output.len() >= 5 {
                output.push("search limited to the first few results".to_string());
                break;
            }
        }
        Ok(output)
    }
}

struct State {
    ctx: BotContext,
    db: Option<Arc<QuoteDb>>,
    set_re: Regex,
    get_re: Regex,
    del_re: Regex,
    find_re: Regex,
}

/// Opens `db_path` and spawns the listener. If the database can't be
/// opened, the agent exits immediately with that error — exercising the
/// "child fails during its own construction" edge case a one-for-one
/// supervisor must count as an ordinary first failure.
pub fn spawn(ctx: BotContext, db_path: impl AsRef<Path>) -> Agent<State> {
    let db = match QuoteDb::open(db_path) {
        Ok(db) => Some(Arc::new(db)),
        Err(e) => {
            tracing::error!("failed to open quote database: {e}");
            None
        }
    };
    let failed = db.is_none();
    let state = State {
        ctx: ctx.clone(),
        db,
        set_re: Regex::new(r"^!quote set (\S+)$").unwrap(),
        get_re: Regex::new(r"^!quote get (\S+)$").unwrap(),
        del_re: Regex::new(r"^!quote delete (\S+)$").unwrap(),
        find_re: Regex::new(r"^!quote find (.+)$").unwrap(),
    };
    let agent = agent::spawn(state);
    ctx.client.add_listener(&agent, on_packet);
    if failed {
        agent.exit(Some(ExitCause::Error(Arc::new(anyhow::anyhow!(
            "quote database unavailable"
        )))));
    }
    agent
}

fn on_packet(state: &mut State, packet: Packet) -> BoxFuture<'_, ()> {
    Box::pin(async move {
        let Ok(Payload::SendEvent(message)) = packet.payload() else {
            return;
        };
        if !message.content.starts_with("!quote") {
            return;
        }
        let Some(db) = state.db.clone() else {
            return;
        };
        let parent = message.id.clone();

        if let Some(caps) = state.set_re.captures(&message.content) {
            let name = caps[1].to_string();
            let Some(source_id) = message.parent.clone() else {
                let _ = state
                    .ctx
                    .client
                    .send_content("reply to the message you want to quote", Some(parent))
                    .await;
                return;
            };
            match state.ctx.client.send_get_message(source_id).await {
                Ok(reply) => match reply.payload().ok().and_then(|p| p.as_message()) {
                    Some(source) => {
                        let reply_text =
                            match db.set(&name, &source.sender.name, &source.content, source.time) {
                                Ok(true) => "acknowledged!".to_string(),
                                Ok(false) => "a quote already exists with this name".to_string(),
                                Err(e) => format!("failed to save quote: {e}"),
                            };
                        let _ = state.ctx.client.send_content(reply_text, Some(parent)).await;
                    }
                    None => {
                        let _ = state
                            .ctx
                            .client
                            .send_content("couldn't look up that message", Some(parent))
                            .await;
                    }
                },
                Err(e) => {
                    let _ = state
                        .ctx
                        .client
                        .send_content(format!("couldn't look up that message: {e}"), Some(parent))
                        .await;
                }
            }
            return;
        }

        if let Some(caps) = state.get_re.captures(&message.content) {
            let name = &caps[1];
            let reply_text = match db.get(name) {
                Ok(Some((sender, content))) => format!("[ {sender} ] {content}"),
                Ok(None) => "sorry, no quote exists with that name".to_string(),
                Err(e) => format!("failed to look up quote: {e}"),
            };
            let _ = state.ctx.client.send_content(reply_text, Some(parent)).await;
            return;
        }

        if let Some(caps) = state.del_re.captures(&message.content) {
            let name = &caps[1];
            let reply_text = match db.delete(name) {
                Ok(true) => "quote deleted".to_string(),
                Ok(false) => "sorry, no quote exists with that name".to_string(),
                Err(e) => format!("failed to delete quote: {e}"),
            };
            let _ = state.ctx.client.send_content(reply_text, Some(parent)).await;
            return;
        }

        if let Some(caps) = state.find_re.captures(&message.content) {
            let pattern = caps[1].to_string();
            let reply_text = match Regex::new(&pattern) {
                Ok(re) => match db.find(&re) {
                    Ok(matches) if !matches.is_empty() => matches.join("\n"),
                    Ok(_) => "no matches found, sorry".to_string(),
                    Err(e) => format!("search failed: {e}"),
                },
                Err(e) => format!("invalid pattern: {e}"),
            };
            let _ = state.ctx.client.send_content(reply_text, Some(parent)).await;
            return;
        }

        let _ = state
            .ctx
            .client
            .send_content(
                "usage: !quote [ set | get | delete ] quote_name\nusage: !quote find text_or_regex",
                Some(parent),
            )
            .await;
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_get_round_trips_through_sqlite() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let db = QuoteDb::open(tmp.path()).unwrap();
        assert!(db.set("classic", "ferris", "hello, world", 1).unwrap());
        assert!(!db.set("classic", "ferris", "a second attempt", 1).unwrap());
        let (sender, content) = db.get("classic").unwrap().unwrap();
        assert_eq!(sender, "ferris");
        assert_eq!(content, "hello, world");
    }

    #[test]
    fn delete_then_get_returns_none() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let db = QuoteDb::open(tmp.path()).unwrap();
        db.set("bye", "ferris", "goodbye", 1).unwrap();
        assert!(db.delete("bye").unwrap());
        assert!(!db.delete("bye").unwrap());
        assert!(db.get("bye").unwrap().is_none());
    }

    #[test]
    fn find_caps_at_five_matches() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let db = QuoteDb::open(tmp.path()).unwrap();
        for i in 0..10 {
            db.set(&format!("q{i}"), "ferris", "rust is great", 1).unwrap();
        }
        let re = Regex::new("rust").unwrap();
        let matches = db.find(&re).unwrap();
        assert_eq!(matches.len(), 6); // 5 hits + the "limited" notice
        assert!(matches.last().unwrap().contains("limited"));
    }

    #[tokio::test]
    async fn spawn_exits_immediately_when_db_path_is_unusable() {
        use chatclient::{fake, ChatClient};
        use nickauth::NickAndAuth;
        use rtsup::{Intensity, Policy, Supervisor};
        use std::time::Duration;

        let ((writer, _sent), (reader, _inbound)) = fake::pair();
        let client = ChatClient::from_transport(writer, reader, false);
        let nick_and_auth = NickAndAuth::spawn(client.clone(), "bob");
        let services = Supervisor::spawn(Policy::OneForOne, Intensity::new(3, Duration::from_secs(1)));
        let sentinel = agent::spawn(());
        let bot = crate::bot::Bot::for_test(sentinel, client.clone(), nick_and_auth.clone(), services);
        let ctx = BotContext {
            client,
            nick_and_auth,
            bot,
            start_time: std::time::Instant::now(),
            started_at: chrono::Utc::now(),
        };

        // A directory can never be opened as a sqlite file.
        let dir = tempfile::tempdir().unwrap();
        let agent = spawn(ctx, dir.path());
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!agent.is_alive());
    }
}
