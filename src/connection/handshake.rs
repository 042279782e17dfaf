//! Handshake with the live platform.
//!
//! Before the push WebSocket can be opened the client must:
//! - obtain the `ttwid` session cookie from the live home page,
//! - resolve the numeric room id from the room's public page,
//! - build the push URI and have its parameters signed.
//!
//! Signing is an external capability behind the [`Signer`] trait.

use async_trait::async_trait;
use rand::Rng;
use regex::Regex;
use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};
use url::Url;

use crate::error::LiveError;
use crate::transport::{Connector, Transport, WsTransport};

pub const LIVE_URL: &str = "https://live.douyin.com/";
pub const PUSH_URL: &str = "wss://webcast5-ws-web-hl.douyin.com/webcast/im/push/v2/";
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

const MS_TOKEN_LEN: usize = 107;
const MS_TOKEN_ALPHABET: &[u8] =
    b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789=_";
const AC_NONCE: &str = "0123407cc00a9e438deb4";
const DEVICE_ID: &str = "7319483754668557238";

/// Query keys covered by the signature, in signing order.
const SIGNED_PARAMS: [&str; 13] = [
    "live_id",
    "aid",
    "version_code",
    "webcast_sdk_version",
    "room_id",
    "sub_room_id",
    "sub_channel_id",
    "did_rule",
    "user_unique_id",
    "device_platform",
    "device_type",
    "ac",
    "identity",
];

/// Produces the signing token the push endpoint requires.
#[async_trait]
pub trait Signer: Send + Sync {
    async fn sign(&self, params: &BTreeMap<String, String>) -> Result<String, LiveError>;
}

/// Canonical signing input: MD5 hex of `key=value,...` over [`SIGNED_PARAMS`].
pub fn signature_stub(params: &BTreeMap<String, String>) -> String {
    let joined = SIGNED_PARAMS
        .iter()
        .map(|key| format!("{}={}", key, params.get(*key).map(String::as_str).unwrap_or("")))
        .collect::<Vec<_>>()
        .join(",");
    format!("{:x}", md5::compute(joined.as_bytes()))
}

#[derive(Deserialize, Debug)]
struct SignResponse {
    signature: String,
}

/// Delegates signing to an HTTP service: `POST {"stub": ...}` → `{"signature": ...}`.
pub struct HttpSigner {
    http: reqwest::Client,
    url: String,
}

impl HttpSigner {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl Signer for HttpSigner {
    async fn sign(&self, params: &BTreeMap<String, String>) -> Result<String, LiveError> {
        let stub = signature_stub(params);
        let signing_error = |e: reqwest::Error| LiveError::Signing(e.to_string());

        let response = self
            .http
            .post(&self.url)
            .json(&json!({ "stub": stub }))
            .send()
            .await
            .map_err(signing_error)?
            .error_for_status()
            .map_err(signing_error)?;
        let raw: SignResponse = response.json().await.map_err(signing_error)?;

        if raw.signature.is_empty() {
            return Err(LiveError::Signing("empty signature".to_string()));
        }
        Ok(raw.signature)
    }
}

/// Random `msToken` cookie value.
pub fn generate_ms_token() -> String {
    let mut rng = rand::thread_rng();
    (0..MS_TOKEN_LEN)
        .map(|_| MS_TOKEN_ALPHABET[rng.gen_range(0..MS_TOKEN_ALPHABET.len())] as char)
        .collect()
}

/// Finds cookie `name` among `Set-Cookie` header values.
pub fn cookie_value<'a, I>(set_cookies: I, name: &str) -> Option<String>
where
    I: IntoIterator<Item = &'a str>,
{
    set_cookies.into_iter().find_map(|header| {
        let pair = header.split(';').next()?.trim();
        let (key, value) = pair.split_once('=')?;
        (key == name && !value.is_empty()).then(|| value.to_string())
    })
}

/// Extracts the numeric room id embedded (JSON-escaped) in the room page.
pub fn extract_room_id(html: &str) -> Option<String> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern =
        PATTERN.get_or_init(|| Regex::new(r#"roomId\\":\\"(\d+)\\""#).expect("valid room id pattern"));
    pattern
        .captures(html)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Builds the unsigned push URI for `room_id`.
pub fn build_push_url(room_id: &str) -> Result<Url, LiveError> {
    let internal_ext = format!(
        "internal_src:dim|wss_push_room_id:{room_id}|wss_push_did:{DEVICE_ID}\
         |first_req_ms:1721106114541|fetch_time:1721106114633|seq:1\
         |wss_info:0-1721106114633-0-0|wrds_v:7392094459690748497"
    );
    let params: &[(&str, &str)] = &[
        ("app_name", "douyin_web"),
        ("version_code", "180800"),
        ("webcast_sdk_version", "1.0.14-beta.0"),
        ("update_version_code", "1.0.14-beta.0"),
        ("compress", "gzip"),
        ("device_platform", "web"),
        ("cookie_enabled", "true"),
        ("screen_width", "1536"),
        ("screen_height", "864"),
        ("browser_language", "zh-CN"),
        ("browser_platform", "Win32"),
        ("browser_name", "Mozilla"),
        (
            "browser_version",
            "5.0%20(Windows%20NT%2010.0;%20Win64;%20x64)%20AppleWebKit/537.36%20(KHTML,\
             %20like%20Gecko)%20Chrome/126.0.0.0%20Safari/537.36",
        ),
        ("browser_online", "true"),
        ("tz_name", "Asia/Shanghai"),
        ("cursor", "d-1_u-1_fh-7392091211001140287_t-1721106114633_r-1"),
        ("internal_ext", internal_ext.as_str()),
        ("host", "https://live.douyin.com"),
        ("aid", "6383"),
        ("live_id", "1"),
        ("did_rule", "3"),
        ("endpoint", "live_pc"),
        ("support_wrds", "1"),
        ("user_unique_id", DEVICE_ID),
        ("im_path", "/webcast/im/fetch/"),
        ("identity", "audience"),
        ("need_persist_msg_count", "15"),
        ("insert_task_id", ""),
        ("live_reason", ""),
        ("room_id", room_id),
        ("heartbeatDuration", "0"),
    ];
    let query = params
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join("&");
    Ok(Url::parse(&format!("{PUSH_URL}?{query}"))?)
}

/// Decoded query parameters of `url`.
pub fn query_params(url: &Url) -> BTreeMap<String, String> {
    url.query_pairs().into_owned().collect()
}

async fn bounded<T, F>(limit: Duration, what: &'static str, fut: F) -> Result<T, LiveError>
where
    F: Future<Output = Result<T, LiveError>>,
{
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| LiveError::Timeout(what))?
}

/// [`Connector`] for one live room on the web push endpoint.
///
/// The session cookie and the resolved room id are fetched once and reused
/// for every reconnect of the owning session.
pub struct WebcastConnector {
    http: reqwest::Client,
    live_id: String,
    user_agent: String,
    timeout: Duration,
    signer: Arc<dyn Signer>,
    ttwid: Mutex<Option<String>>,
    room_id: Mutex<Option<String>>,
}

impl WebcastConnector {
    pub fn new(
        live_id: impl Into<String>,
        user_agent: impl Into<String>,
        timeout: Duration,
        signer: Arc<dyn Signer>,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            live_id: live_id.into(),
            user_agent: user_agent.into(),
            timeout,
            signer,
            ttwid: Mutex::new(None),
            room_id: Mutex::new(None),
        }
    }

    async fn ttwid(&self) -> Result<String, LiveError> {
        let mut cached = self.ttwid.lock().await;
        if let Some(ttwid) = cached.as_ref() {
            return Ok(ttwid.clone());
        }

        let fetch = async {
            let response = self
                .http
                .get(LIVE_URL)
                .header(reqwest::header::USER_AGENT, &self.user_agent)
                .send()
                .await?
                .error_for_status()?;
            let headers = response
                .headers()
                .get_all(reqwest::header::SET_COOKIE)
                .iter()
                .filter_map(|v| v.to_str().ok());
            cookie_value(headers, "ttwid")
                .ok_or_else(|| LiveError::RoomResolution("no ttwid cookie in response".into()))
        };
        let ttwid = bounded(self.timeout, "session cookie request", fetch).await?;
        debug!(live_id = %self.live_id, "session cookie acquired");
        *cached = Some(ttwid.clone());
        Ok(ttwid)
    }

    async fn room_id(&self, ttwid: &str) -> Result<String, LiveError> {
        let mut cached = self.room_id.lock().await;
        if let Some(room_id) = cached.as_ref() {
            return Ok(room_id.clone());
        }

        let url = format!("{LIVE_URL}{}", self.live_id);
        let cookie = format!(
            "ttwid={ttwid}&msToken={}; __ac_nonce={AC_NONCE}",
            generate_ms_token()
        );
        let fetch = async {
            let html = self
                .http
                .get(&url)
                .header(reqwest::header::USER_AGENT, &self.user_agent)
                .header(reqwest::header::COOKIE, cookie)
                .send()
                .await?
                .error_for_status()?
                .text()
                .await?;
            extract_room_id(&html).ok_or_else(|| {
                LiveError::RoomResolution(format!("no room id on page for live id {}", self.live_id))
            })
        };
        let room_id = bounded(self.timeout, "room page request", fetch).await?;
        info!(live_id = %self.live_id, room_id = %room_id, "room id resolved");
        *cached = Some(room_id.clone());
        Ok(room_id)
    }
}

#[async_trait]
impl Connector for WebcastConnector {
    async fn connect(&self) -> Result<Box<dyn Transport>, LiveError> {
        let ttwid = self.ttwid().await?;
        let room_id = self.room_id(&ttwid).await?;

        let mut url = build_push_url(&room_id)?;
        let params = query_params(&url);
        let signature = bounded(self.timeout, "signing", async {
            self.signer
                .sign(&params)
                .await
                .map_err(|e| match e {
                    LiveError::Signing(_) => e,
                    other => LiveError::Signing(other.to_string()),
                })
        })
        .await?;
        url.query_pairs_mut().append_pair("signature", &signature);

        let cookie = format!("ttwid={ttwid}");
        let transport = bounded(
            self.timeout,
            "websocket upgrade",
            WsTransport::open(&url, &cookie, &self.user_agent),
        )
        .await?;
        Ok(Box::new(transport))
    }
}
