//! Normalization of raw timeline and follower entries into stable records.
//!
//! Raw entries arrive as `serde_json::Value` trees whose field locations vary
//! across response variants; every read goes through the ordered fallback
//! chains in [`crate::extract`]. A malformed single entry is dropped (the
//! functions return `None`), never escalated, so one bad record cannot abort
//! a batch.

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;

use crate::extract::{get_path, pick, pick_array, pick_bool, pick_i64, pick_i64_or, pick_str};

/// Prefix marking a classic retweet body.
const RETWEET_PREFIX: &str = "RT @";

/// One timeline item reduced to the fields we persist.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedTweet {
    pub tweet_id: String,
    pub tweet_url: String,
    pub screen_name: String,
    pub full_text: String,
    pub images: Vec<String>,
    pub videos: Vec<String>,
    pub like_count: i64,
    pub retweet_count: i64,
    pub reply_count: i64,
    pub quote_count: i64,
    pub author: AuthorSnapshot,
    pub created_at: DateTime<Utc>,
}

/// Author metadata captured at fetch time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuthorSnapshot {
    pub name: Option<String>,
    pub profile_image_url: Option<String>,
    pub description: Option<String>,
    pub followers_count: Option<i64>,
    pub friends_count: Option<i64>,
    pub location: Option<String>,
}

/// One follower-list entry reduced to the fields we persist.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedProfile {
    /// Platform-stable numeric identity. Some response shapes omit it.
    pub rest_id: Option<String>,
    pub screen_name: String,
    pub name: Option<String>,
    pub profile_image_url: Option<String>,
    pub description: Option<String>,
    pub followers_count: Option<i64>,
    pub friends_count: Option<i64>,
    pub location: Option<String>,
    /// Entries discovered via the account's own following list are already
    /// followed, so this defaults to true.
    pub is_following: bool,
}

/// One page of the follower-listing protocol: raw entries plus the opaque
/// continuation cursor. An absent cursor is the terminal page, not an error.
#[derive(Debug, Clone, Default)]
pub struct FollowingPage {
    pub entries: Vec<Value>,
    pub next_cursor: Option<String>,
}

/// X's created-at format, e.g. `Wed Oct 10 20:19:24 +0000 2018`.
fn parse_created_at(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_str(raw, "%a %b %d %H:%M:%S %z %Y")
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

/// Normalize one raw timeline entry, or drop it.
///
/// Hard filters, in order: referenced-tweet markers (pure retweets), the
/// quote-status flag, a resolved text starting with `RT @`, and anything
/// strictly more than one day older than `now` (an entry exactly one day old
/// is retained).
pub fn normalize_tweet(raw: &Value, now: DateTime<Utc>) -> Option<NormalizedTweet> {
    if pick_array(raw, &["referenced_tweets"]).is_some_and(|refs| !refs.is_empty()) {
        return None;
    }
    if pick_bool(
        raw,
        &[
            "raw.result.legacy.isQuoteStatus",
            "raw.result.legacy.is_quote_status",
        ],
    ) == Some(true)
    {
        return None;
    }

    // Full text fallback chain: note tweet (long form) -> legacy full text ->
    // legacy extended text -> generic text fields -> retweet sentinel.
    let full_text = pick_str(
        raw,
        &[
            "raw.result.note_tweet.note_tweet_results.result.text",
            "raw.result.note_tweet.note_tweet_results.result.note_tweet_results.result.text",
            "raw.result.legacy.fullText",
            "raw.result.legacy.full_text",
            "raw.result.legacy.extended_tweet.full_text",
            "raw.result.note_tweet.text",
            "text",
            "full_text",
        ],
    )
    .unwrap_or_else(|| RETWEET_PREFIX.to_string());
    if full_text.starts_with(RETWEET_PREFIX) {
        return None;
    }

    let created_raw = pick_str(
        raw,
        &["raw.result.legacy.createdAt", "raw.result.legacy.created_at"],
    )?;
    let created_at = parse_created_at(&created_raw)?;
    if now.signed_duration_since(created_at) > Duration::days(1) {
        return None;
    }

    let screen_name = pick_str(
        raw,
        &["user.legacy.screenName", "user.legacy.screen_name"],
    )?;
    let tweet_id = pick_str(
        raw,
        &["raw.result.legacy.idStr", "raw.result.legacy.id_str"],
    )?;
    let tweet_url = format!("https://x.com/{screen_name}/status/{tweet_id}");

    let author = AuthorSnapshot {
        name: pick_str(raw, &["user.legacy.name"]),
        profile_image_url: pick_str(
            raw,
            &[
                "user.legacy.profileImageUrlHttps",
                "user.legacy.profile_image_url_https",
            ],
        ),
        description: pick_str(raw, &["user.legacy.description"]),
        followers_count: pick_i64(
            raw,
            &["user.legacy.followersCount", "user.legacy.followers_count"],
        ),
        friends_count: pick_i64(
            raw,
            &["user.legacy.friendsCount", "user.legacy.friends_count"],
        ),
        location: pick_str(raw, &["user.legacy.location"]),
    };

    let (images, videos) = partition_media(raw);

    Some(NormalizedTweet {
        tweet_id,
        tweet_url,
        screen_name,
        full_text,
        images,
        videos,
        like_count: pick_i64_or(
            raw,
            &[
                "raw.result.legacy.favoriteCount",
                "raw.result.legacy.favorite_count",
            ],
            0,
        ),
        retweet_count: pick_i64_or(
            raw,
            &[
                "raw.result.legacy.retweetCount",
                "raw.result.legacy.retweet_count",
            ],
            0,
        ),
        reply_count: pick_i64_or(
            raw,
            &[
                "raw.result.legacy.replyCount",
                "raw.result.legacy.reply_count",
            ],
            0,
        ),
        quote_count: pick_i64_or(
            raw,
            &[
                "raw.result.legacy.quoteCount",
                "raw.result.legacy.quote_count",
            ],
            0,
        ),
        author,
        created_at,
    })
}

/// Split attached media by declared type. Photos contribute their direct URL;
/// videos and animated gifs contribute the highest-bitrate progressive-MP4
/// variant (ties broken by encounter order). Items with no qualifying variant
/// are omitted.
fn partition_media(raw: &Value) -> (Vec<String>, Vec<String>) {
    let mut images = Vec::new();
    let mut videos = Vec::new();
    let media = pick_array(
        raw,
        &[
            "raw.result.legacy.extendedEntities.media",
            "raw.result.legacy.extended_entities.media",
        ],
    );
    for item in media.into_iter().flatten() {
        match pick_str(item, &["type"]).as_deref() {
            Some("photo") => {
                if let Some(url) = pick_str(item, &["mediaUrlHttps", "media_url_https"]) {
                    images.push(url);
                }
            }
            Some("video") | Some("animated_gif") => {
                if let Some(url) = best_mp4_variant(item) {
                    videos.push(url);
                }
            }
            _ => {}
        }
    }
    (images, videos)
}

fn best_mp4_variant(media: &Value) -> Option<String> {
    let variants = pick_array(media, &["videoInfo.variants", "video_info.variants"])?;
    let mut best: Option<(i64, &Value)> = None;
    for variant in variants {
        let mp4 = pick_str(variant, &["contentType", "content_type"])
            .is_some_and(|ct| ct == "video/mp4");
        if !mp4 {
            continue;
        }
        let bitrate = pick_i64_or(variant, &["bitrate"], 0);
        // Strict comparison keeps the first variant on a bitrate tie.
        if best.map_or(true, |(b, _)| bitrate > b) {
            best = Some((bitrate, variant));
        }
    }
    best.and_then(|(_, v)| pick_str(v, &["url"]))
}

/// Normalize one raw follower-list entry; entries without a resolvable screen
/// name are dropped (the caller counts them as skipped).
pub fn normalize_profile(raw: &Value) -> Option<NormalizedProfile> {
    let screen_name = pick_str(
        raw,
        &[
            "user.legacy.screenName",
            "raw.result.legacy.screenName",
            "legacy.screenName",
            "result.legacy.screenName",
            "user.legacy.screen_name",
            "raw.result.legacy.screen_name",
            "legacy.screen_name",
            "result.legacy.screen_name",
            "screen_name",
            "screenName",
        ],
    )?;

    let rest_id = pick(
        raw,
        &[
            "user.restId",
            "raw.result.restId",
            "restId",
            "result.restId",
            "user.rest_id",
            "raw.result.rest_id",
            "rest_id",
            "id",
        ],
    )
    .and_then(string_like);

    Some(NormalizedProfile {
        rest_id,
        screen_name,
        name: pick_str(
            raw,
            &[
                "user.legacy.name",
                "raw.result.legacy.name",
                "legacy.name",
                "result.legacy.name",
                "name",
            ],
        ),
        profile_image_url: pick_str(
            raw,
            &[
                "user.legacy.profileImageUrlHttps",
                "raw.result.legacy.profileImageUrlHttps",
                "legacy.profileImageUrlHttps",
                "user.legacy.profile_image_url_https",
                "raw.result.legacy.profile_image_url_https",
                "legacy.profile_image_url_https",
                "profile_image_url_https",
                "profileImageUrl",
            ],
        ),
        description: pick_str(
            raw,
            &[
                "user.legacy.description",
                "raw.result.legacy.description",
                "legacy.description",
                "description",
            ],
        ),
        followers_count: pick_i64(
            raw,
            &[
                "user.legacy.followersCount",
                "raw.result.legacy.followersCount",
                "legacy.followersCount",
                "user.legacy.followers_count",
                "raw.result.legacy.followers_count",
                "legacy.followers_count",
                "followers_count",
                "followersCount",
            ],
        ),
        friends_count: pick_i64(
            raw,
            &[
                "user.legacy.friendsCount",
                "raw.result.legacy.friendsCount",
                "legacy.friendsCount",
                "user.legacy.friends_count",
                "raw.result.legacy.friends_count",
                "legacy.friends_count",
                "friends_count",
                "friendsCount",
            ],
        ),
        location: pick_str(
            raw,
            &[
                "user.legacy.location",
                "raw.result.legacy.location",
                "legacy.location",
                "location",
            ],
        ),
        is_following: true,
    })
}

/// Rest ids arrive as strings in GraphQL shapes and as numbers in the flat
/// legacy shape.
fn string_like(node: &Value) -> Option<String> {
    node.as_str()
        .map(str::to_string)
        .or_else(|| node.as_i64().map(|n| n.to_string()))
        .or_else(|| node.as_u64().map(|n| n.to_string()))
}

/// Pull the raw user entries and the continuation cursor out of one
/// follower-list response.
///
/// Two wire shapes are handled: the GraphQL instruction stream
/// (`TimelineAddEntries` / `TimelineTimelineItem` / `TimelineTimelineCursor`)
/// and the flat-array variants. When the cursor is a `{top, bottom}` pair the
/// `bottom` value is the forward continuation, with `top` as fallback. A page
/// resolving no cursor is terminal.
pub fn extract_following_page(resp: &Value) -> FollowingPage {
    let mut page = FollowingPage::default();

    let instructions = pick_array(resp, &["data.user.result.timeline.timeline.instructions"]);
    if let Some(instructions) = instructions.filter(|i| !i.is_empty()) {
        for instruction in instructions {
            if pick_str(instruction, &["type"]).as_deref() != Some("TimelineAddEntries") {
                continue;
            }
            for entry in pick_array(instruction, &["entries"]).into_iter().flatten() {
                match pick_str(entry, &["content.entryType"]).as_deref() {
                    Some("TimelineTimelineItem") => {
                        if let Some(user) = get_path(entry, "content.itemContent.user") {
                            page.entries.push(user.clone());
                        }
                    }
                    Some("TimelineTimelineCursor") => {
                        if let Some(value) = pick_str(entry, &["content.value"]) {
                            page.next_cursor = Some(value);
                        }
                    }
                    _ => {}
                }
            }
        }
        return page;
    }

    // Flat variants: the user list has been observed at several nesting depths.
    let users = resp
        .get("data")
        .and_then(Value::as_array)
        .or_else(|| pick_array(resp, &["data.data"]))
        .or_else(|| pick_array(resp, &["data.users"]))
        .or_else(|| pick_array(resp, &["data.data.users"]));
    if let Some(users) = users {
        page.entries = users.clone();
    }

    page.next_cursor = match get_path(resp, "data.cursor") {
        Some(cursor) if cursor.is_object() => pick_str(cursor, &["bottom.value", "top.value"]),
        _ => pick_str(resp, &["data.nextCursor", "data.cursor"]),
    };
    page
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn base_tweet(created_at: &str) -> Value {
        json!({
            "raw": {
                "result": {
                    "legacy": {
                        "idStr": "111222333",
                        "fullText": "original text",
                        "createdAt": created_at,
                        "favoriteCount": 10,
                        "retweetCount": 2,
                        "replyCount": 1,
                        "quoteCount": 0
                    }
                }
            },
            "user": {
                "legacy": {
                    "screenName": "alice",
                    "name": "Alice",
                    "profileImageUrlHttps": "https://pbs/img.jpg",
                    "followersCount": 1000,
                    "friendsCount": 50,
                    "location": "Earth"
                }
            }
        })
    }

    fn recent() -> &'static str {
        "Wed Oct 10 20:19:24 +0000 2018"
    }

    fn now() -> DateTime<Utc> {
        parse_created_at(recent()).unwrap()
    }

    #[test]
    fn normalizes_plain_tweet() {
        let tweet = normalize_tweet(&base_tweet(recent()), now()).unwrap();
        assert_eq!(tweet.tweet_id, "111222333");
        assert_eq!(tweet.tweet_url, "https://x.com/alice/status/111222333");
        assert_eq!(tweet.full_text, "original text");
        assert_eq!(tweet.like_count, 10);
        assert_eq!(tweet.author.name.as_deref(), Some("Alice"));
        assert!(tweet.images.is_empty());
    }

    #[test]
    fn drops_referenced_and_quote_tweets() {
        let mut raw = base_tweet(recent());
        raw["referenced_tweets"] = json!([{ "type": "retweeted" }]);
        assert!(normalize_tweet(&raw, now()).is_none());

        let mut raw = base_tweet(recent());
        raw["raw"]["result"]["legacy"]["isQuoteStatus"] = json!(true);
        assert!(normalize_tweet(&raw, now()).is_none());

        // An empty marker list is not a retweet.
        let mut raw = base_tweet(recent());
        raw["referenced_tweets"] = json!([]);
        assert!(normalize_tweet(&raw, now()).is_some());
    }

    #[test]
    fn drops_rt_prefixed_text() {
        let mut raw = base_tweet(recent());
        raw["raw"]["result"]["legacy"]["fullText"] = json!("RT @someone: reposted");
        assert!(normalize_tweet(&raw, now()).is_none());
    }

    #[test]
    fn drops_entry_with_no_resolvable_text() {
        let mut raw = base_tweet(recent());
        raw["raw"]["result"]["legacy"]
            .as_object_mut()
            .unwrap()
            .remove("fullText");
        // The fallback chain bottoms out at the retweet sentinel, which is dropped.
        assert!(normalize_tweet(&raw, now()).is_none());
    }

    #[test]
    fn note_text_preferred_over_legacy() {
        let mut raw = base_tweet(recent());
        raw["raw"]["result"]["note_tweet"] = json!({
            "note_tweet_results": { "result": { "text": "the long form text" } }
        });
        let tweet = normalize_tweet(&raw, now()).unwrap();
        assert_eq!(tweet.full_text, "the long form text");
    }

    #[test]
    fn recency_window_is_exclusive_at_one_day() {
        let created = now() - Duration::days(1);
        let raw = base_tweet(&created.format("%a %b %d %H:%M:%S %z %Y").to_string());
        assert!(normalize_tweet(&raw, now()).is_some());

        let created = now() - Duration::days(1) - Duration::seconds(1);
        let raw = base_tweet(&created.format("%a %b %d %H:%M:%S %z %Y").to_string());
        assert!(normalize_tweet(&raw, now()).is_none());
    }

    #[test]
    fn selects_highest_bitrate_mp4() {
        let mut raw = base_tweet(recent());
        raw["raw"]["result"]["legacy"]["extendedEntities"] = json!({
            "media": [
                {
                    "type": "video",
                    "videoInfo": {
                        "variants": [
                            { "contentType": "video/mp4", "bitrate": 240000, "url": "https://v/240.mp4" },
                            { "contentType": "application/x-mpegURL", "url": "https://v/pl.m3u8" },
                            { "contentType": "video/mp4", "bitrate": 720000, "url": "https://v/720.mp4" },
                            { "contentType": "video/mp4", "bitrate": 480000, "url": "https://v/480.mp4" }
                        ]
                    }
                },
                { "type": "photo", "mediaUrlHttps": "https://pbs/photo1.jpg" }
            ]
        });
        let tweet = normalize_tweet(&raw, now()).unwrap();
        assert_eq!(tweet.videos, vec!["https://v/720.mp4"]);
        assert_eq!(tweet.images, vec!["https://pbs/photo1.jpg"]);
    }

    #[test]
    fn media_without_mp4_variant_is_omitted() {
        let mut raw = base_tweet(recent());
        raw["raw"]["result"]["legacy"]["extendedEntities"] = json!({
            "media": [
                {
                    "type": "animated_gif",
                    "videoInfo": {
                        "variants": [
                            { "contentType": "application/x-mpegURL", "url": "https://v/pl.m3u8" }
                        ]
                    }
                }
            ]
        });
        let tweet = normalize_tweet(&raw, now()).unwrap();
        assert!(tweet.videos.is_empty());
    }

    #[test]
    fn profile_shapes_resolve() {
        let graphql = json!({
            "user": {
                "restId": "42",
                "legacy": { "screenName": "bob", "name": "Bob", "followersCount": 7 }
            }
        });
        let p = normalize_profile(&graphql).unwrap();
        assert_eq!(p.screen_name, "bob");
        assert_eq!(p.rest_id.as_deref(), Some("42"));
        assert_eq!(p.followers_count, Some(7));
        assert!(p.is_following);

        let flat = json!({ "screen_name": "carol", "id": 99, "followers_count": "3" });
        let p = normalize_profile(&flat).unwrap();
        assert_eq!(p.rest_id.as_deref(), Some("99"));
        assert_eq!(p.followers_count, Some(3));
    }

    #[test]
    fn profile_without_screen_name_is_dropped() {
        let raw = json!({ "user": { "restId": "42", "legacy": { "name": "Nameless" } } });
        assert!(normalize_profile(&raw).is_none());
    }

    #[test]
    fn following_page_from_graphql_instructions() {
        let resp = json!({
            "data": { "user": { "result": { "timeline": { "timeline": { "instructions": [
                { "type": "TimelineClearCache" },
                { "type": "TimelineAddEntries", "entries": [
                    { "content": {
                        "entryType": "TimelineTimelineItem",
                        "itemContent": { "user": { "restId": "1", "legacy": { "screenName": "a" } } }
                    }},
                    { "content": {
                        "entryType": "TimelineTimelineItem",
                        "itemContent": { "user": { "restId": "2", "legacy": { "screenName": "b" } } }
                    }},
                    { "content": { "entryType": "TimelineTimelineCursor", "value": "cursor-next" } }
                ]}
            ]}}}}}
        });
        let page = extract_following_page(&resp);
        assert_eq!(page.entries.len(), 2);
        assert_eq!(page.next_cursor.as_deref(), Some("cursor-next"));
    }

    #[test]
    fn following_page_prefers_bottom_cursor() {
        let resp = json!({
            "data": {
                "users": [ { "screen_name": "a" } ],
                "cursor": {
                    "top": { "value": "cursor-top" },
                    "bottom": { "value": "cursor-bottom" }
                }
            }
        });
        let page = extract_following_page(&resp);
        assert_eq!(page.entries.len(), 1);
        assert_eq!(page.next_cursor.as_deref(), Some("cursor-bottom"));

        let resp = json!({
            "data": {
                "users": [],
                "cursor": { "top": { "value": "cursor-top" } }
            }
        });
        assert_eq!(
            extract_following_page(&resp).next_cursor.as_deref(),
            Some("cursor-top")
        );
    }

    #[test]
    fn absent_cursor_is_terminal() {
        let resp = json!({ "data": { "users": [ { "screen_name": "a" } ] } });
        let page = extract_following_page(&resp);
        assert_eq!(page.entries.len(), 1);
        assert!(page.next_cursor.is_none());
    }

    #[test]
    fn string_cursor_variant() {
        let resp = json!({ "data": { "users": [], "cursor": "plain-token" } });
        assert_eq!(
            extract_following_page(&resp).next_cursor.as_deref(),
            Some("plain-token")
        );
    }
}
