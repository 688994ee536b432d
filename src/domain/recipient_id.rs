use serde_aux::field_attributes::deserialize_number_from_string;

/// Telegram chat id of a subscribed recipient. Group chats have negative ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct RecipientId(#[serde(deserialize_with = "deserialize_number_from_string")] i64);

impl RecipientId {
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn get(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for RecipientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
pub struct Subscriber {
    #[serde(alias = "chat_id")]
    pub recipient_id: RecipientId,
}

/// Body of `GET /subscribers/list`.
#[derive(Debug, serde::Deserialize)]
pub struct SubscriberList {
    pub recipient_ids: Vec<RecipientId>,
}

impl SubscriberList {
    pub fn into_subscribers(self) -> Vec<Subscriber> {
        self.recipient_ids
            .into_iter()
            .map(|recipient_id| Subscriber { recipient_id })
            .collect()
    }
}
