//! Feed URL resolution and Atom/RSS parsing.

use std::sync::OnceLock;

use chrono::DateTime;
use regex::Regex;
use roxmltree::{Document, Node};
use tracing::debug;

use crate::contract::Feed;
use crate::error::FeedError;
use crate::model::Entity;

const PLAYLIST_FEED: &str = "https://www.youtube.com/feeds/videos.xml?playlist_id=";
const CHANNEL_FEED: &str = "https://www.youtube.com/feeds/videos.xml?channel_id=";

type Pattern = OnceLock<Option<Regex>>;

fn capture(cell: &'static Pattern, pattern: &str, text: &str) -> Option<String> {
    let re = cell.get_or_init(|| Regex::new(pattern).ok()).as_ref()?;
    re.captures(text)?.get(1).map(|m| m.as_str().to_string())
}

/// Turns a playlist or channel page URL into its feed URL.
pub fn feed_url_for(url: &str) -> Result<String, FeedError> {
    static WATCH_LIST: Pattern = OnceLock::new();
    static PLAYLIST: Pattern = OnceLock::new();
    static CHANNEL: Pattern = OnceLock::new();
    static FEED: Pattern = OnceLock::new();

    let url = url.trim();
    let list = capture(
        &WATCH_LIST,
        r"^https://www\.youtube\.com/watch\?v=.+&list=([^&]+)",
        url,
    )
    .or_else(|| capture(&PLAYLIST, r"^https://www\.youtube\.com/playlist\?list=([^&]+)", url));
    if let Some(list) = list {
        return Ok(format!("{PLAYLIST_FEED}{list}"));
    }
    let channel = capture(&CHANNEL, r"^https://www\.youtube\.com/channel/([^/?]+)", url);
    if let Some(channel) = channel {
        return Ok(format!("{CHANNEL_FEED}{channel}"));
    }
    if capture(
        &FEED,
        r"^https://www\.youtube\.com/feeds/videos\.xml\?(playlist_id|channel_id)=.+$",
        url,
    )
    .is_some()
    {
        return Ok(url.to_string());
    }
    Err(FeedError::MisformattedUrl(url.to_string()))
}

/// Parses an Atom or RSS 2.0 document.
pub fn parse_feed(xml: &str) -> Result<Feed, FeedError> {
    let doc = Document::parse(xml).map_err(|e| FeedError::Malformed(e.to_string()))?;
    let root = doc.root_element();
    match root.tag_name().name() {
        "feed" => Ok(parse_atom(root)),
        "rss" => {
            let channel = child(root, "channel")
                .ok_or_else(|| FeedError::Malformed("<rss> without <channel>".to_string()))?;
            Ok(parse_rss(channel))
        }
        other => Err(FeedError::Malformed(format!(
            "unexpected root element <{other}>"
        ))),
    }
}

fn parse_atom(feed: Node) -> Feed {
    let title = child_text(feed, "title").unwrap_or_default();
    let author = child(feed, "author")
        .and_then(|a| child_text(a, "name"))
        .unwrap_or_default();

    let entries = children(feed, "entry")
        .filter_map(|entry| {
            let title = child_text(entry, "title").unwrap_or_default();
            let link = children(entry, "link")
                .find(|l| matches!(l.attribute("rel"), None | Some("alternate")))
                .and_then(|l| l.attribute("href"))?;
            let published = child_text(entry, "published")
                .or_else(|| child_text(entry, "updated"))
                .and_then(|ts| parse_timestamp(&ts));
            let Some(published) = published else {
                debug!(title = %title, "Skipping entry without a timestamp");
                return None;
            };
            let summary = descendant_text(entry, "description")
                .or_else(|| child_text(entry, "summary"))
                .or_else(|| child_text(entry, "content"))
                .unwrap_or_default();
            let entry_author = child(entry, "author")
                .and_then(|a| child_text(a, "name"))
                .unwrap_or_else(|| author.clone());
            Some(Entity::new(title, link, published, summary, entry_author))
        })
        .collect();

    Feed {
        title,
        author,
        entries,
    }
}

fn parse_rss(channel: Node) -> Feed {
    let title = child_text(channel, "title").unwrap_or_default();
    let author = child_text(channel, "author")
        .or_else(|| child_text(channel, "creator"))
        .or_else(|| child_text(channel, "managingEditor"))
        .unwrap_or_else(|| title.clone());

    let entries = children(channel, "item")
        .filter_map(|item| {
            let title = child_text(item, "title").unwrap_or_default();
            let link = child_text(item, "link")?;
            let Some(published) = child_text(item, "pubDate").and_then(|ts| parse_timestamp(&ts))
            else {
                debug!(title = %title, "Skipping item without a timestamp");
                return None;
            };
            let summary = child_text(item, "description").unwrap_or_default();
            let item_author = child_text(item, "author")
                .or_else(|| child_text(item, "creator"))
                .unwrap_or_else(|| author.clone());
            Some(Entity::new(title, link, published, summary, item_author))
        })
        .collect();

    Feed {
        title,
        author,
        entries,
    }
}

/// RFC 3339 (Atom) or RFC 2822 (RSS) to Unix seconds.
pub fn parse_timestamp(value: &str) -> Option<i64> {
    let value = value.trim();
    DateTime::parse_from_rfc3339(value)
        .or_else(|_| DateTime::parse_from_rfc2822(value))
        .map(|dt| dt.timestamp())
        .ok()
}

fn children<'a, 'input>(
    node: Node<'a, 'input>,
    name: &'a str,
) -> impl Iterator<Item = Node<'a, 'input>> + 'a {
    node.children()
        .filter(move |n| n.is_element() && n.tag_name().name() == name)
}

fn child<'a, 'input>(node: Node<'a, 'input>, name: &'a str) -> Option<Node<'a, 'input>> {
    children(node, name).next()
}

fn child_text(node: Node, name: &str) -> Option<String> {
    child(node, name)
        .and_then(|n| n.text())
        .map(|t| t.trim().to_string())
}

fn descendant_text(node: Node, name: &str) -> Option<String> {
    node.descendants()
        .find(|n| n.is_element() && n.tag_name().name() == name)
        .and_then(|n| n.text())
        .map(|t| t.trim().to_string())
}
