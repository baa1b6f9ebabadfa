use std::time::Duration;

use anyhow::{Context, Result, bail};
use log::{debug, warn};
use reqwest::{Client, Response};
use tokio::io::{AsyncWrite, AsyncWriteExt};

use super::types::{Ack, DnldList, EpfFile, FileStatus, ListPlus, Version, VersionBody, parse_response};

pub const BASE_URL: &str = "https://epfws.usps.gov/ws/resources/";

const LOGON_KEY_HEADER: &str = "User-Logonkey";
const TOKEN_KEY_HEADER: &str = "User-Tokenkey";

/// HTTP transport for the EPF web service.
#[derive(Clone)]
pub struct EpfClient {
    http: Client,
    base_url: String,
    max_retry: u32,
}

impl EpfClient {
    pub fn new() -> Result<Self> {
        Self::with_base_url(BASE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self> {
        // No overall timeout: file downloads run for minutes.
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.into(),
            max_retry: 10,
        })
    }

    pub async fn version(&self) -> Result<Version> {
        let url = format!("{}epf/version", self.base_url);
        let resp = self.send_with_retry(|| self.http.get(&url)).await?;
        let body = resp.bytes().await?;
        Ok(parse_response::<VersionBody>(&body)?.into())
    }

    /// Log in and return a session holding the first pair of rotating keys.
    pub async fn login(&self, email: &str, password: &str) -> Result<Session> {
        let mut session = Session {
            client: self.clone(),
            logonkey: String::new(),
            tokenkey: String::new(),
        };
        session
            .call::<Ack>("epf/login", &[("login", email), ("pword", password)])
            .await
            .context("EPF login failed")?;
        debug!("logged in to EPF as {email}");
        Ok(session)
    }

    /// Send a request, retrying connection failures and timeouts with a
    /// linearly growing delay.
    async fn send_with_retry<F>(&self, build: F) -> Result<Response>
    where
        F: Fn() -> reqwest::RequestBuilder,
    {
        let mut retry_count = 0;
        loop {
            match build().send().await {
                Ok(resp) => {
                    if !resp.status().is_success() {
                        bail!("HTTP request failed with status: {}", resp.status());
                    }
                    return Ok(resp);
                }
                Err(e) if e.is_timeout() || e.is_connect() => {
                    retry_count += 1;
                    if retry_count >= self.max_retry {
                        bail!("Max retries exceeded");
                    }
                    warn!(
                        "Connection error, retry {}/{}: {}",
                        retry_count, self.max_retry, e
                    );
                    tokio::time::sleep(Duration::from_millis(500 * retry_count as u64)).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

/// An authenticated EPF session.
///
/// The service hands out a fresh logon/token key pair with every response
/// and expects it on the next request, so calls take `&mut self`.
pub struct Session {
    client: EpfClient,
    logonkey: String,
    tokenkey: String,
}

impl Session {
    pub async fn logout(mut self) -> Result<()> {
        self.call::<Ack>("epf/logout", &[]).await?;
        Ok(())
    }

    /// Every file available to this account.
    pub async fn files(&mut self) -> Result<Vec<EpfFile>> {
        let list: DnldList = self.call("download/dnldlist", &[]).await?;
        list.files.into_iter().map(EpfFile::try_from).collect()
    }

    /// Files of one product, optionally restricted to some statuses.
    pub async fn files_by_product(
        &mut self,
        product_code: &str,
        product_id: &str,
        statuses: &[FileStatus],
    ) -> Result<Vec<EpfFile>> {
        let joined: String = statuses.iter().map(FileStatus::code).collect();
        let mut args = vec![("productcode", product_code), ("productid", product_id)];
        if !joined.is_empty() {
            args.push(("status", joined.as_str()));
        }

        let list: ListPlus = self.call("download/listplus", &args).await?;
        list.files
            .into_iter()
            .map(|entry| {
                let mut file = EpfFile::try_from(entry)?;
                file.product_code = product_code.to_string();
                file.product_id = product_id.to_string();
                Ok(file)
            })
            .collect()
    }

    /// Stream a file's contents into `out`, returning the byte count.
    pub async fn download<W>(&mut self, file_id: &str, out: &mut W) -> Result<u64>
    where
        W: AsyncWrite + Unpin,
    {
        let mut resp = self.post("download/epf", &[("fileid", file_id)]).await?;
        let mut written = 0u64;
        while let Some(chunk) = resp.chunk().await? {
            out.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        out.flush().await?;
        debug!("downloaded file {file_id} ({written} bytes)");
        Ok(written)
    }

    pub async fn set_status(&mut self, file_id: &str, status: &FileStatus) -> Result<()> {
        self.call::<Ack>(
            "download/status",
            &[("fileid", file_id), ("newstatus", status.code())],
        )
        .await?;
        Ok(())
    }

    async fn call<T: serde::de::DeserializeOwned>(
        &mut self,
        path: &str,
        args: &[(&str, &str)],
    ) -> Result<T> {
        let resp = self.post(path, args).await?;
        let body = resp.bytes().await?;
        parse_response(&body).with_context(|| format!("EPF call {path} failed"))
    }

    async fn post(&mut self, path: &str, args: &[(&str, &str)]) -> Result<Response> {
        let url = format!("{}{}", self.client.base_url, path);
        let obj = request_object(args, &self.logonkey, &self.tokenkey);
        let form = [("obj", obj)];

        let client = &self.client;
        let resp = client
            .send_with_retry(|| client.http.post(&url).form(&form))
            .await?;
        self.rotate_keys(&resp);
        Ok(resp)
    }

    fn rotate_keys(&mut self, resp: &Response) {
        let header = |name: &str| {
            resp.headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        if let Some(key) = header(LOGON_KEY_HEADER) {
            self.logonkey = key;
        }
        if let Some(key) = header(TOKEN_KEY_HEADER) {
            self.tokenkey = key;
        }
    }
}

/// JSON value of the `obj` form field.
fn request_object(args: &[(&str, &str)], logonkey: &str, tokenkey: &str) -> String {
    let mut obj = serde_json::Map::new();
    for (key, value) in args {
        obj.insert(key.to_string(), value.to_string().into());
    }
    obj.insert("logonkey".into(), logonkey.into());
    obj.insert("tokenkey".into(), tokenkey.into());
    serde_json::Value::Object(obj).to_string()
}
