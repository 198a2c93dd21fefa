// Telegram front-end: dispatcher tree, commands and endpoints
//
// Each request runs in its own task so one slow download never holds up the
// dispatcher, not even for the same chat.

pub mod delivery;

use std::sync::Arc;

use teloxide::dispatching::{HandlerExt, UpdateFilterExt};
use teloxide::error_handlers::LoggingErrorHandler;
use teloxide::prelude::*;
use teloxide::types::MaybeInaccessibleMessage;
use teloxide::utils::command::BotCommands;
use tracing::{debug, info, warn};

use crate::delivery::{BestEffort, Delivery, Mood};
use crate::router::Router;

pub use delivery::TelegramDelivery;

#[derive(BotCommands, Clone, Debug)]
#[command(rename_rule = "lowercase", description = "Send a song name or a link.")]
pub enum Command {
    #[command(description = "say hello")]
    Start,
    #[command(description = "liveness check")]
    Ping,
    #[command(description = "show this text")]
    Help,
}

/// Slash-prefixed text that did not parse as a known command
fn is_unknown_command(text: &str) -> bool {
    text.trim_start().starts_with('/')
}

/// Run long polling until interrupted
pub async fn run(bot: Bot, router: Arc<Router>) {
    let handler = dptree::entry()
        .branch(
            Update::filter_message()
                .filter_command::<Command>()
                .endpoint(on_command),
        )
        .branch(Update::filter_message().endpoint(on_text))
        .branch(Update::filter_callback_query().endpoint(on_callback));

    info!("dispatcher starting");
    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![router])
        .default_handler(|upd| async move {
            debug!(update = ?upd.id, "unhandled update");
        })
        .error_handler(LoggingErrorHandler::with_custom_text(
            "Error in update handler",
        ))
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;
    warn!("dispatcher stopped");
}

async fn on_command(bot: Bot, msg: Message, cmd: Command) -> ResponseResult<()> {
    match cmd {
        Command::Start => {
            let delivery = TelegramDelivery::new(bot.clone(), msg.chat.id);
            let _ = delivery.sticker(Mood::Welcome).await;
            let name = msg
                .from
                .as_ref()
                .map(|user| user.first_name.clone())
                .unwrap_or_else(|| "there".to_string());
            bot.send_message(
                msg.chat.id,
                format!(
                    "👋 Hi, {}! Send me a song name, a YouTube link or an Instagram post and I'll fetch the music for you.",
                    name
                ),
            )
            .await?;
        }
        Command::Ping => {
            bot.send_message(msg.chat.id, "pong").await?;
        }
        Command::Help => {
            bot.send_message(msg.chat.id, Command::descriptions().to_string())
                .await?;
        }
    }
    Ok(())
}

async fn on_text(bot: Bot, msg: Message, router: Arc<Router>) -> ResponseResult<()> {
    let Some(text) = msg.text().map(str::to_string) else {
        return Ok(());
    };
    let chat_id = msg.chat.id;

    if is_unknown_command(&text) {
        debug!(chat = %chat_id, text = %text, "unknown command");
        bot.send_message(chat_id, Command::descriptions().to_string())
            .await?;
        return Ok(());
    }

    tokio::spawn(async move {
        let delivery = TelegramDelivery::new(bot, chat_id);
        let handled = router.handle_text(&text, &delivery).await;
        debug!(chat = %chat_id, outcome = ?handled.outcome, "text handled");
    });
    Ok(())
}

async fn on_callback(bot: Bot, q: CallbackQuery, router: Arc<Router>) -> ResponseResult<()> {
    let _ = BestEffort::from_result(
        bot.answer_callback_query(q.id.clone()).await,
        "answer callback",
    );

    let (Some(data), Some(message)) = (q.data.clone(), q.message.as_ref()) else {
        return Ok(());
    };
    let chat_id = message.chat().id;
    let status = match message {
        MaybeInaccessibleMessage::Regular(m) => Some(m.id),
        MaybeInaccessibleMessage::Inaccessible(_) => None,
    };

    tokio::spawn(async move {
        let delivery = TelegramDelivery::with_status(bot, chat_id, status);
        let handled = router.handle_callback(&data, &delivery).await;
        debug!(chat = %chat_id, outcome = ?handled.outcome, "callback handled");
    });
    Ok(())
}
