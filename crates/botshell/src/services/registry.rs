//! Maps each configured service name to a concrete factory, replacing the
//! original's `importlib.import_module(path)` per service with a static
//! table of the kinds this shell actually ships.

use std::collections::HashMap;

use crate::bot::BotContext;
use rtsup::Supervisor;

const DEFAULT_QUOTE_DB_PATH: &str = "quotes.db";

/// Starts every service named in `configured` (service name -> kind) under
/// `supervisor`. Unknown kinds are logged and skipped rather than treated as
/// a startup failure, since a typo in one service shouldn't take the room
/// down.
pub async fn spawn_configured(
    supervisor: &Supervisor,
    ctx: &BotContext,
    configured: &HashMap<String, String>,
) {
    for (name, kind) in configured {
        let ctx = ctx.clone();
        match kind.as_str() {
            "botrulez" => {
                supervisor
                    .add_child(name.clone(), move || super::botrulez::spawn(ctx.clone()))
                    .await;
            }
            "quitter" => {
                supervisor
                    .add_child(name.clone(), move || super::quitter::spawn(ctx.clone()))
                    .await;
            }
            "nick_change" => {
                supervisor
                    .add_child(name.clone(), move || super::nick_change::spawn(ctx.clone()))
                    .await;
            }
            "reminder" => {
                supervisor
                    .add_child(name.clone(), move || super::reminder::spawn(ctx.clone()))
                    .await;
            }
            "quote_db" => {
                supervisor
                    .add_child(name.clone(), move || {
                        super::quote_db::spawn(ctx.clone(), DEFAULT_QUOTE_DB_PATH)
                    })
                    .await;
            }
            other => {
                tracing::warn!(service = %name, kind = %other, "unknown service kind, skipping");
            }
        }
    }
}
