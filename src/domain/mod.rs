mod catalog;
mod message_block;
mod outcome;
mod recipient_id;

pub use catalog::{CatalogCity, CatalogError, CatalogResponse, CityListings, Listing};
pub use message_block::{ActionLink, MESSAGE_TEXT_LIMIT, MessageBlock};
pub use outcome::{DeliveryOutcome, RecipientOutcome};
pub use recipient_id::{RecipientId, Subscriber, SubscriberList};
