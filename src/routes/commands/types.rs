use crate::domain::RecipientId;

/// The subset of a Telegram `Update` the bot reacts to.
#[derive(serde::Deserialize, Debug)]
pub struct Update {
    pub message: Option<IncomingMessage>,
}

#[derive(serde::Deserialize, Debug)]
pub struct IncomingMessage {
    pub chat: Chat,
    pub text: Option<String>,
}

#[derive(serde::Deserialize, Debug)]
pub struct Chat {
    pub id: RecipientId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    SetReminder,
    UnsetReminder,
}

impl Command {
    /// Accepts `/name`, `/name@BotName` and ignores trailing arguments.
    pub fn parse(text: &str) -> Option<Self> {
        let first = text.split_whitespace().next()?;
        let name = first.strip_prefix('/')?;
        let name = name.split('@').next()?;

        match name {
            "start" => Some(Command::Start),
            "set_reminder" => Some(Command::SetReminder),
            "unset_reminder" => Some(Command::UnsetReminder),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Start => "start",
            Command::SetReminder => "set_reminder",
            Command::UnsetReminder => "unset_reminder",
        }
    }
}

impl Update {
    /// The chat and command of a text message, if it carries one.
    pub fn command(&self) -> Option<(RecipientId, Command)> {
        let message = self.message.as_ref()?;
        let command = Command::parse(message.text.as_deref()?)?;
        Some((message.chat.id, command))
    }
}
