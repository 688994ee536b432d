use crate::domain::{ActionLink, CatalogCity, Listing, MessageBlock};

pub const MORE_INFO_LABEL: &str = "More Info";

/// Turns the catalog into the blocks every recipient receives this cycle.
///
/// Cities keep their catalog order and listings keep their order within a
/// city. A city without listings yields a single "no house found" block.
pub fn compose(catalog: &[CatalogCity]) -> Vec<MessageBlock> {
    let mut blocks = Vec::new();
    for city in catalog {
        let city_name = escape_markdown(&city.name);
        let listings = city.listings.as_slice();

        if listings.is_empty() {
            blocks.push(MessageBlock::new(
                format!("*{city_name}*\nNo house found"),
                None,
            ));
            continue;
        }

        blocks.extend(listings.iter().map(|l| listing_block(&city_name, l)));
    }
    blocks
}

fn listing_block(city_name: &str, listing: &Listing) -> MessageBlock {
    let text = format!(
        "*{}*\n{}\nPrice: {}\nAvailable Date: {}",
        city_name,
        escape_markdown(&listing.title),
        escape_markdown(&listing.price),
        escape_markdown(&listing.available_date),
    );
    let link = ActionLink {
        label: MORE_INFO_LABEL.to_owned(),
        url: listing.detail_url.clone(),
    };
    MessageBlock::new(text, Some(link))
}

/// Escapes the entities of Telegram's legacy Markdown mode.
fn escape_markdown(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '_' | '*' | '`' | '[') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
