use crate::database::NewRequest;
use crate::utils::error::RelayError;
use anyhow::Result;
use rss::{Channel, Item};
use tracing::debug;

const TORRENT_MIME: &str = "application/x-bittorrent";

/// Extract one request per item that carries a magnet or torrent link.
///
/// Items whose title contains a blocked word (case-insensitive) are skipped.
pub fn parse_channel(content: &[u8], feed_id: i64, blocked_words: &[String]) -> Result<Vec<NewRequest>> {
    let channel = Channel::read_from(content).map_err(RelayError::from)?;
    let blocked: Vec<String> = blocked_words.iter().map(|w| w.to_lowercase()).collect();

    let mut requests = Vec::new();
    for item in channel.items() {
        let title = item.title().unwrap_or_default().trim();

        let title_lower = title.to_lowercase();
        if let Some(word) = blocked.iter().find(|word| title_lower.contains(word.as_str())) {
            debug!("Skipping '{}': contains blocked word '{}'", title, word);
            continue;
        }

        let Some(locator) = locator_of(item) else {
            debug!("Skipping '{}': no magnet or torrent link", title);
            continue;
        };

        requests.push(NewRequest {
            feed_id,
            title: title.to_string(),
            content_locator: locator,
        });
    }
    Ok(requests)
}

fn locator_of(item: &Item) -> Option<String> {
    if let Some(enclosure) = item.enclosure() {
        if enclosure.mime_type() == TORRENT_MIME || enclosure.url().contains("magnet") {
            return Some(enclosure.url().to_string());
        }
    }
    item.link()
        .filter(|link| link.contains("magnet"))
        .map(str::to_string)
}
