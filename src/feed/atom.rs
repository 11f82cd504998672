//! Atom 1.0 field extraction.
use super::date::parse_pub_date;
use super::normalizer::{
    Dialect, EpisodeCandidate, FeedMetadata, NormalizedFeed, NO_DESCRIPTION, NO_TITLE,
    UNKNOWN_HOST,
};
use super::resolve::{absolute_url, resolve_first, Candidate};
use super::xml::{Element, Ns};

const ATOM: Ns = Ns::Atom;

pub(super) fn extract(feed: &Element) -> NormalizedFeed {
    let metadata = FeedMetadata {
        name: feed.child(&ATOM, "title").and_then(Element::deep_text),
        topic: None,
        homepage_url: homepage_url(feed),
    };

    let feed_author = author_name(feed);
    let mut episodes = Vec::new();
    let mut dropped = 0;

    for entry in feed.children_named(&ATOM, "entry") {
        match extract_entry(entry, feed_author.as_deref()) {
            Some(episode) => episodes.push(episode),
            None => dropped += 1,
        }
    }

    NormalizedFeed {
        dialect: Dialect::Atom,
        metadata,
        episodes,
        dropped,
    }
}

/// A link without `rel` is an alternate link.
fn rel(link: &Element) -> &str {
    link.attr("rel").unwrap_or("alternate")
}

fn homepage_url(feed: &Element) -> Option<String> {
    let alternates: Vec<&Element> = feed
        .children_named(&ATOM, "link")
        .filter(|l| rel(l) == "alternate")
        .collect();

    let html_first = alternates
        .iter()
        .filter(|l| l.attr("type") == Some("text/html"))
        .chain(
            alternates
                .iter()
                .filter(|l| l.attr("type") != Some("text/html")),
        )
        .map(|l| Candidate::maybe("link[rel=alternate]", l.attr("href").map(str::to_string)));

    resolve_first(html_first, absolute_url)
}

fn author_name(element: &Element) -> Option<String> {
    element
        .child(&ATOM, "author")
        .and_then(|a| a.child_text(&ATOM, "name"))
}

fn extract_entry(entry: &Element, feed_author: Option<&str>) -> Option<EpisodeCandidate> {
    let mut url_candidates: Vec<Candidate<String>> = entry
        .children_named(&ATOM, "link")
        .filter(|l| rel(l) == "enclosure")
        .map(|l| Candidate::maybe("link[rel=enclosure]", l.attr("href").map(str::to_string)))
        .collect();
    url_candidates.extend(
        entry
            .child(&ATOM, "link")
            .map(|l| Candidate::maybe("link", l.attr("href").map(str::to_string))),
    );

    let url = resolve_first(url_candidates, absolute_url)?;

    let pub_date = resolve_first(
        [
            Candidate::maybe("published", entry.child_text(&ATOM, "published")),
            Candidate::maybe("updated", entry.child_text(&ATOM, "updated")),
        ],
        |raw| parse_pub_date(&raw),
    );

    let host = resolve_first(
        [
            Candidate::maybe("entry author", author_name(entry)),
            Candidate::maybe("feed author", feed_author.map(str::to_string)),
        ],
        Some,
    )
    .unwrap_or_else(|| UNKNOWN_HOST.to_string());

    Some(EpisodeCandidate {
        title: entry
            .child(&ATOM, "title")
            .and_then(Element::deep_text)
            .unwrap_or_else(|| NO_TITLE.to_string()),
        description: entry
            .child(&ATOM, "summary")
            .and_then(Element::deep_text)
            .or_else(|| entry.child(&ATOM, "content").and_then(Element::deep_text))
            .unwrap_or_else(|| NO_DESCRIPTION.to_string()),
        pub_date,
        url,
        host,
    })
}
