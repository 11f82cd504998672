//! RSS 2.0 (and RSS 1.0 / RDF) field extraction.
use super::date::{parse_pub_date, PubDate};
use super::normalizer::{
    Dialect, EpisodeCandidate, FeedMetadata, NormalizedFeed, NO_DESCRIPTION, NO_TITLE,
    UNKNOWN_HOST,
};
use super::resolve::{absolute_url, resolve_first, Candidate};
use super::xml::{Element, Ns};

pub(super) fn extract(root: &Element) -> NormalizedFeed {
    // Dialect detection guarantees the channel exists.
    let Some(channel) = root.child(&Ns::None, "channel") else {
        return NormalizedFeed {
            dialect: Dialect::Rss,
            metadata: FeedMetadata::default(),
            episodes: Vec::new(),
            dropped: 0,
        };
    };

    let metadata = FeedMetadata {
        name: channel
            .child(&Ns::None, "title")
            .and_then(Element::deep_text)
            .or_else(|| channel.child_text(&Ns::Itunes, "title")),
        topic: channel_topic(channel),
        homepage_url: homepage_url(channel),
    };

    // RSS 1.0 keeps items next to the channel instead of inside it.
    let mut items: Vec<&Element> = channel.children_named(&Ns::None, "item").collect();
    if items.is_empty() {
        items = root.children_named(&Ns::None, "item").collect();
    }

    let mut episodes = Vec::with_capacity(items.len());
    let mut dropped = 0;
    for item in items {
        match extract_item(item, channel) {
            Some(episode) => episodes.push(episode),
            None => dropped += 1,
        }
    }

    NormalizedFeed {
        dialect: Dialect::Rss,
        metadata,
        episodes,
        dropped,
    }
}

fn homepage_url(channel: &Element) -> Option<String> {
    let alternates: Vec<&Element> = channel
        .children_named(&Ns::Atom, "link")
        .filter(|l| l.attr("rel") == Some("alternate"))
        .collect();
    let html_alternates = alternates
        .iter()
        .filter(|l| l.attr("type") == Some("text/html"));
    let other_alternates = alternates
        .iter()
        .filter(|l| l.attr("type") != Some("text/html"));

    let google_play = channel.child(&Ns::GooglePlay, "link").and_then(|l| {
        l.text()
            .or_else(|| l.attr("href").map(str::to_string))
    });

    let candidates = [
        Candidate::maybe(
            "itunes:new-feed-url",
            channel.child_text(&Ns::Itunes, "new-feed-url"),
        ),
        Candidate::maybe("itunes:url", channel.child_text(&Ns::Itunes, "url")),
        Candidate::maybe(
            "itunes:feedlink",
            channel.child_text(&Ns::Itunes, "feedlink"),
        ),
    ]
    .into_iter()
    .chain(
        html_alternates
            .chain(other_alternates)
            .map(|l| Candidate::maybe("atom:link", l.attr("href").map(str::to_string))),
    )
    .chain([
        Candidate::maybe("googleplay:link", google_play),
        Candidate::maybe("webfeeds:url", channel.child_text(&Ns::Webfeeds, "url")),
        Candidate::maybe("link", channel.child_text(&Ns::None, "link")),
    ]);

    resolve_first(candidates, absolute_url)
}

fn channel_topic(channel: &Element) -> Option<String> {
    channel.child_text(&Ns::None, "category").or_else(|| {
        channel
            .child(&Ns::Itunes, "category")
            .and_then(|c| c.attr("text"))
            .and_then(crate::util::clean_text)
    })
}

fn extract_item(item: &Element, channel: &Element) -> Option<EpisodeCandidate> {
    let url = episode_url(item)?;

    let title = item
        .child(&Ns::None, "title")
        .and_then(Element::deep_text)
        .or_else(|| item.child_text(&Ns::Itunes, "title"))
        .unwrap_or_else(|| NO_TITLE.to_string());

    let description = item
        .child(&Ns::None, "description")
        .and_then(Element::deep_text)
        .or_else(|| item.child_text(&Ns::Content, "encoded"))
        .or_else(|| item.child_text(&Ns::Itunes, "summary"))
        .unwrap_or_else(|| NO_DESCRIPTION.to_string());

    Some(EpisodeCandidate {
        title,
        description,
        pub_date: item_pub_date(item),
        url,
        host: host(item, channel),
    })
}

fn item_pub_date(item: &Element) -> Option<PubDate> {
    resolve_first(
        [
            Candidate::maybe("pubDate", item.child_text(&Ns::None, "pubDate")),
            Candidate::maybe("dc:date", item.child_text(&Ns::DublinCore, "date")),
        ],
        |raw| parse_pub_date(&raw),
    )
}

fn episode_url(item: &Element) -> Option<String> {
    let enclosure = item
        .children_named(&Ns::None, "enclosure")
        .find_map(|e| e.attr("url"))
        .map(str::to_string);

    let media = item
        .children_named(&Ns::Media, "content")
        .chain(
            item.children_named(&Ns::Media, "group")
                .flat_map(|g| g.children_named(&Ns::Media, "content")),
        )
        .find_map(|m| m.attr("url"))
        .map(str::to_string);

    let guid = item.child(&Ns::None, "guid").and_then(|g| {
        let permalink = g
            .attr_ignore_case("isPermaLink")
            .map_or(true, |v| v.trim().eq_ignore_ascii_case("true"));
        if permalink {
            g.text()
        } else {
            None
        }
    });

    resolve_first(
        [
            Candidate::maybe("enclosure", enclosure),
            Candidate::maybe("media:content", media),
            Candidate::maybe("guid", guid),
            Candidate::maybe("link", item.child_text(&Ns::None, "link")),
        ],
        absolute_url,
    )
}

/// Author elements may hold the name directly or in a nested `<name>`.
fn author_name(author: &Element) -> Option<String> {
    author
        .children
        .iter()
        .find(|c| c.name == "name")
        .and_then(Element::text)
        .or_else(|| author.text())
}

fn host(item: &Element, channel: &Element) -> String {
    let owner_name = channel
        .child(&Ns::Itunes, "owner")
        .and_then(|o| o.child_text(&Ns::Itunes, "name"));

    resolve_first(
        [
            Candidate::maybe("item itunes:author", item.child_text(&Ns::Itunes, "author")),
            Candidate::maybe(
                "item author",
                item.child(&Ns::None, "author").and_then(author_name),
            ),
            Candidate::maybe(
                "item dc:creator",
                item.child_text(&Ns::DublinCore, "creator"),
            ),
            Candidate::maybe("channel itunes:owner", owner_name),
            Candidate::maybe(
                "channel itunes:author",
                channel.child_text(&Ns::Itunes, "author"),
            ),
            Candidate::maybe(
                "channel author",
                channel.child(&Ns::None, "author").and_then(author_name),
            ),
        ],
        Some,
    )
    .unwrap_or_else(|| UNKNOWN_HOST.to_string())
}
