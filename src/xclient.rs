//! Authenticated X (Twitter) client behind the [`XApi`] seam.
//!
//! [`XClient::login`] turns a stored `auth_token` cookie into a working
//! session: it hits `manifest.json` to harvest the remaining session cookies
//! (including the `ct0` CSRF token) and extracts the account's own rest id
//! from the `twid` cookie. The GraphQL calls return raw `serde_json::Value`
//! trees; a shape adapter rewrites timeline instructions into the
//! library-shaped entries the normalizer's fallback paths expect.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::header::{HeaderMap, HeaderValue, SET_COOKIE};
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

use crate::error::{Error, Result};
use crate::extract::{get_path, pick_array, pick_str};

const WEB_BASE: &str = "https://x.com";
const API_BASE: &str = "https://x.com/i/api";
// Public web-app bearer; not a secret.
const BEARER: &str = "AAAAAAAAAAAAAAAAAAAAANRILgAAAAAAnNwIzUejRCOuH5E6I8xnZz4puTs%3D1Zv7ttfk8LF81IUq16cHjhLTvJu4FA33AGWWjCpTnA";
const USER_AGENT: &str = "x-fetchbot/0.1";

const QID_HOME_LATEST_TIMELINE: &str = "DiTkXJgLqBBxCs7zaYsbtA/HomeLatestTimeline";
const QID_FOLLOWING: &str = "t-BPOrMIduGUJWO_LxcvNQ/Following";
const QID_USER_BY_SCREEN_NAME: &str = "1VOOyvKkiI3FMmkeDNxM9A/UserByScreenName";

/// `twid` cookie carries the account id as `u%3D<id>` or `u=<id>`.
static TWID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"u(?:%3D|=)(\d+)").expect("twid regex"));

/// Session facts resolved at login time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionInfo {
    /// The authenticated account's own rest id, when the cookies reveal it.
    pub rest_id: Option<String>,
}

/// Remote interface boundary of the engine. One implementation per
/// authenticated session; tests substitute a recording mock.
#[async_trait]
pub trait XApi: Send + Sync {
    fn session(&self) -> SessionInfo;

    /// Latest home-timeline entries, library-shaped, most recent first.
    async fn home_latest_timeline(&self, count: u32) -> Result<Vec<Value>>;

    /// One raw page of the following list for `user_id`.
    async fn following_page(
        &self,
        user_id: &str,
        count: u32,
        cursor: Option<&str>,
    ) -> Result<Value>;

    /// Raw user lookup by screen name.
    async fn user_by_screen_name(&self, screen_name: &str) -> Result<Value>;

    /// Follow `user_id` on behalf of the session account.
    async fn create_friendship(&self, user_id: &str) -> Result<()>;
}

/// Turns a per-project credential into an authenticated [`XApi`] handle.
#[async_trait]
pub trait XConnector: Send + Sync {
    async fn connect(&self, auth_token: &str) -> Result<Box<dyn XApi>>;
}

pub struct HttpConnector;

#[async_trait]
impl XConnector for HttpConnector {
    async fn connect(&self, auth_token: &str) -> Result<Box<dyn XApi>> {
        Ok(Box::new(XClient::login(auth_token).await?))
    }
}

pub struct XClient {
    http: Client,
    cookie_header: String,
    csrf_token: String,
    rest_id: Option<String>,
}

impl fmt::Debug for XClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("XClient")
            .field("rest_id", &self.rest_id)
            .finish_non_exhaustive()
    }
}

impl XClient {
    /// Bootstrap a session from a stored `auth_token` cookie.
    pub async fn login(auth_token: &str) -> Result<Self> {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| Error::RemoteTransient(format!("http client: {e}")))?;

        let resp = http
            .get(format!("{WEB_BASE}/manifest.json"))
            .header("Cookie", format!("auth_token={auth_token}"))
            .send()
            .await?;
        if resp.status() == StatusCode::UNAUTHORIZED || resp.status() == StatusCode::FORBIDDEN {
            return Err(Error::Authentication(format!(
                "credential rejected with {}",
                resp.status()
            )));
        }

        let mut cookies = harvest_cookies(resp.headers());
        cookies.insert("auth_token".to_string(), auth_token.to_string());
        let rest_id = rest_id_from_cookies(&cookies);
        let csrf_token = cookies.get("ct0").cloned().ok_or_else(|| {
            Error::Authentication("session bootstrap returned no ct0 cookie".to_string())
        })?;
        let cookie_header = cookies
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("; ");

        debug!(rest_id = ?rest_id, "x session established");
        Ok(Self {
            http,
            cookie_header,
            csrf_token,
            rest_id,
        })
    }

    fn auth_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        let set = |headers: &mut HeaderMap, name: &'static str, value: &str| -> Result<()> {
            headers.insert(
                name,
                HeaderValue::from_str(value)
                    .map_err(|e| Error::Authentication(format!("bad header {name}: {e}")))?,
            );
            Ok(())
        };
        set(&mut headers, "authorization", &format!("Bearer {BEARER}"))?;
        set(&mut headers, "x-csrf-token", &self.csrf_token)?;
        set(&mut headers, "cookie", &self.cookie_header)?;
        Ok(headers)
    }

    async fn graphql(&self, qid: &str, variables: Value) -> Result<Value> {
        let url = format!("{API_BASE}/graphql/{qid}");
        let resp = self
            .http
            .get(&url)
            .headers(self.auth_headers()?)
            .query(&[("variables", variables.to_string())])
            .send()
            .await?;
        read_json(resp).await
    }
}

async fn read_json(resp: reqwest::Response) -> Result<Value> {
    let status = resp.status();
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(Error::Authentication(format!("remote returned {status}")));
    }
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(Error::RemoteTransient(format!("remote error {status}: {body}")));
    }
    resp.json::<Value>()
        .await
        .map_err(|e| Error::RemoteProtocol(format!("invalid response body: {e}")))
}

fn harvest_cookies(headers: &HeaderMap) -> HashMap<String, String> {
    let mut cookies = HashMap::new();
    for value in headers.get_all(SET_COOKIE) {
        let Ok(raw) = value.to_str() else { continue };
        let pair = raw.split(';').next().unwrap_or_default();
        if let Some((name, value)) = pair.split_once('=') {
            cookies.insert(name.trim().to_string(), value.trim().to_string());
        }
    }
    cookies
}

fn rest_id_from_cookies(cookies: &HashMap<String, String>) -> Option<String> {
    let twid = cookies.get("twid")?;
    TWID_RE
        .captures(twid)
        .map(|caps| caps[1].to_string())
}

#[async_trait]
impl XApi for XClient {
    fn session(&self) -> SessionInfo {
        SessionInfo {
            rest_id: self.rest_id.clone(),
        }
    }

    async fn home_latest_timeline(&self, count: u32) -> Result<Vec<Value>> {
        let resp = self
            .graphql(
                QID_HOME_LATEST_TIMELINE,
                json!({ "count": count, "includePromotedContent": false }),
            )
            .await?;
        Ok(timeline_entries(&resp))
    }

    async fn following_page(
        &self,
        user_id: &str,
        count: u32,
        cursor: Option<&str>,
    ) -> Result<Value> {
        let mut variables = json!({
            "userId": user_id,
            "count": count,
            "includePromotedContent": false,
        });
        if let Some(cursor) = cursor {
            variables["cursor"] = json!(cursor);
        }
        self.graphql(QID_FOLLOWING, variables).await
    }

    async fn user_by_screen_name(&self, screen_name: &str) -> Result<Value> {
        self.graphql(
            QID_USER_BY_SCREEN_NAME,
            json!({ "screen_name": screen_name }),
        )
        .await
    }

    async fn create_friendship(&self, user_id: &str) -> Result<()> {
        let resp = self
            .http
            .post(format!("{WEB_BASE}/i/api/1.1/friendships/create.json"))
            .headers(self.auth_headers()?)
            .form(&[("user_id", user_id), ("follow", "true")])
            .send()
            .await?;
        read_json(resp).await?;
        Ok(())
    }
}

/// Rewrite a raw home-timeline response into library-shaped entries: the
/// tweet result under `raw.result`, the author's legacy object under
/// `user.legacy`, and a `referenced_tweets` marker list when the tweet wraps
/// a retweeted status.
pub fn timeline_entries(resp: &Value) -> Vec<Value> {
    let mut entries = Vec::new();
    let instructions = pick_array(
        resp,
        &["data.home.home_timeline_urt.instructions"],
    );
    for instruction in instructions.into_iter().flatten() {
        if pick_str(instruction, &["type"]).as_deref() != Some("TimelineAddEntries") {
            continue;
        }
        for entry in pick_array(instruction, &["entries"]).into_iter().flatten() {
            if pick_str(entry, &["content.entryType"]).as_deref() != Some("TimelineTimelineItem") {
                continue;
            }
            let Some(result) = get_path(entry, "content.itemContent.tweet_results.result") else {
                continue;
            };
            // Visibility wrappers nest the actual tweet one level down.
            let result = result.get("tweet").unwrap_or(result);
            let user_legacy = get_path(result, "core.user_results.result.legacy")
                .cloned()
                .unwrap_or(Value::Null);
            let mut shaped = json!({
                "raw": { "result": result },
                "user": { "legacy": user_legacy },
            });
            if get_path(result, "legacy.retweeted_status_result").is_some() {
                shaped["referenced_tweets"] = json!([{ "type": "retweeted" }]);
            }
            entries.push(shaped);
        }
    }
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn twid_cookie_parses_both_encodings() {
        let mut cookies = HashMap::new();
        cookies.insert("twid".to_string(), "u%3D12345".to_string());
        assert_eq!(rest_id_from_cookies(&cookies).as_deref(), Some("12345"));

        cookies.insert("twid".to_string(), "u=67890".to_string());
        assert_eq!(rest_id_from_cookies(&cookies).as_deref(), Some("67890"));

        cookies.remove("twid");
        assert!(rest_id_from_cookies(&cookies).is_none());
    }

    #[test]
    fn harvests_cookie_pairs() {
        let mut headers = HeaderMap::new();
        headers.append(
            SET_COOKIE,
            HeaderValue::from_static("ct0=abc; Path=/; Secure"),
        );
        headers.append(
            SET_COOKIE,
            HeaderValue::from_static("twid=u%3D42; Domain=.x.com"),
        );
        let cookies = harvest_cookies(&headers);
        assert_eq!(cookies.get("ct0").map(String::as_str), Some("abc"));
        assert_eq!(cookies.get("twid").map(String::as_str), Some("u%3D42"));
    }

    #[test]
    fn timeline_adapter_shapes_entries() {
        let resp = json!({
            "data": { "home": { "home_timeline_urt": { "instructions": [
                { "type": "TimelineAddEntries", "entries": [
                    { "content": {
                        "entryType": "TimelineTimelineItem",
                        "itemContent": { "tweet_results": { "result": {
                            "legacy": { "id_str": "1", "full_text": "hello" },
                            "core": { "user_results": { "result": { "legacy": { "screen_name": "a" } } } }
                        }}}
                    }},
                    { "content": {
                        "entryType": "TimelineTimelineItem",
                        "itemContent": { "tweet_results": { "result": {
                            "legacy": {
                                "id_str": "2",
                                "retweeted_status_result": { "result": {} }
                            }
                        }}}
                    }},
                    { "content": { "entryType": "TimelineTimelineCursor", "value": "c" } }
                ]}
            ]}}}
        });
        let entries = timeline_entries(&resp);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0]["raw"]["result"]["legacy"]["id_str"], "1");
        assert_eq!(entries[0]["user"]["legacy"]["screen_name"], "a");
        assert!(entries[0].get("referenced_tweets").is_none());
        assert!(entries[1]["referenced_tweets"].as_array().is_some());
    }

    #[test]
    fn visibility_wrapper_is_unwrapped() {
        let resp = json!({
            "data": { "home": { "home_timeline_urt": { "instructions": [
                { "type": "TimelineAddEntries", "entries": [
                    { "content": {
                        "entryType": "TimelineTimelineItem",
                        "itemContent": { "tweet_results": { "result": { "tweet": {
                            "legacy": { "id_str": "3" }
                        }}}}
                    }}
                ]}
            ]}}}
        });
        let entries = timeline_entries(&resp);
        assert_eq!(entries[0]["raw"]["result"]["legacy"]["id_str"], "3");
    }
}
