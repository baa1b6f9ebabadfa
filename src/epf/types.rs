use std::fmt;

use anyhow::{Context, Result, bail};
use chrono::NaiveDate;
use serde::Deserialize;
use serde::de::DeserializeOwned;

const SUCCESS: &str = "success";

/// Download state the service tracks per file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileStatus {
    New,
    DownloadStarted,
    DownloadCancelled,
    DownloadComplete,
    Other(String),
}

impl FileStatus {
    pub fn from_code(code: &str) -> Self {
        match code {
            "N" => Self::New,
            "S" => Self::DownloadStarted,
            "X" => Self::DownloadCancelled,
            "C" => Self::DownloadComplete,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn code(&self) -> &str {
        match self {
            Self::New => "N",
            Self::DownloadStarted => "S",
            Self::DownloadCancelled => "X",
            Self::DownloadComplete => "C",
            Self::Other(code) => code,
        }
    }
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// A file offered for download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpfFile {
    pub id: String,
    pub filename: String,
    pub path: String,
    pub size: u64,
    pub fulfilled: NaiveDate,
    pub product_code: String,
    pub product_id: String,
    pub status: FileStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Version {
    pub version: String,
    pub build: String,
}

/// Fields shared by every response, plus the endpoint-specific body.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    response: String,
    #[serde(default)]
    messages: Option<String>,
    #[serde(flatten)]
    body: T,
}

/// Parse a response body and fail unless the service reported success.
pub(crate) fn parse_response<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    let envelope: Envelope<T> =
        serde_json::from_slice(bytes).context("Failed to parse EPF response")?;
    if envelope.response != SUCCESS {
        bail!(
            "{}: {}",
            envelope.response,
            envelope.messages.unwrap_or_default()
        );
    }
    Ok(envelope.body)
}

#[derive(Debug, Deserialize)]
pub(crate) struct Ack {}

#[derive(Debug, Deserialize)]
pub(crate) struct VersionBody {
    #[serde(default)]
    version: String,
    #[serde(default)]
    build: String,
}

impl From<VersionBody> for Version {
    fn from(body: VersionBody) -> Self {
        Self {
            version: body.version,
            build: body.build,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct DnldList {
    #[serde(rename = "dnldfileList", alias = "dnldfilelist", default)]
    pub files: Vec<FileEntry>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ListPlus {
    #[serde(rename = "fileList", alias = "filelist", default)]
    pub files: Vec<FileEntry>,
}

/// One row of `dnldlist` or `listplus`; the latter omits the product fields.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "lowercase", default)]
pub(crate) struct FileEntry {
    productcode: String,
    productid: String,
    fulfilled: String,
    status: String,
    fileid: String,
    filepath: String,
    filename: String,
    filesize: String,
}

impl TryFrom<FileEntry> for EpfFile {
    type Error = anyhow::Error;

    fn try_from(e: FileEntry) -> Result<Self> {
        let size = e
            .filesize
            .trim()
            .parse()
            .with_context(|| format!("Invalid size {:?} for file {}", e.filesize, e.fileid))?;
        let fulfilled = NaiveDate::parse_from_str(e.fulfilled.trim(), "%Y-%m-%d")
            .with_context(|| format!("Invalid fulfillment date {:?} for file {}", e.fulfilled, e.fileid))?;
        Ok(Self {
            id: e.fileid,
            filename: e.filename,
            path: e.filepath,
            size,
            fulfilled,
            product_code: e.productcode,
            product_id: e.productid,
            status: FileStatus::from_code(&e.status),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_download_list() {
        let body = br#"{
            "response": "success",
            "messages": "",
            "logonkey": "L1",
            "tokenkey": "T1",
            "reccount": "1",
            "dnldfileList": [{
                "productcode": "AMS",
                "productid": "ZIP4NATL",
                "fulfilled": "2024-06-01",
                "status": "N",
                "fileid": "5512",
                "filepath": "/dnld/ams/",
                "filename": "epf-zip4natl.tar",
                "filesize": "1048576"
            }]
        }"#;
        let list: DnldList = parse_response(body).unwrap();
        let files: Vec<EpfFile> = list
            .files
            .into_iter()
            .map(EpfFile::try_from)
            .collect::<Result<_>>()
            .unwrap();

        assert_eq!(files.len(), 1);
        let f = &files[0];
        assert_eq!(f.id, "5512");
        assert_eq!(f.size, 1_048_576);
        assert_eq!(f.fulfilled, NaiveDate::from_ymd_opt(2024, 6, 1).unwrap());
        assert_eq!(f.status, FileStatus::New);
        assert_eq!(f.product_id, "ZIP4NATL");
    }

    #[test]
    fn listplus_rows_have_no_product() {
        let body = br#"{"response":"success","fileList":[
            {"fileid":"1","status":"C","fulfilled":"2023-12-31","filepath":"/p/","filename":"a.tar","filesize":"10"}
        ]}"#;
        let list: ListPlus = parse_response(body).unwrap();
        let file = EpfFile::try_from(list.files.into_iter().next().unwrap()).unwrap();
        assert_eq!(file.status, FileStatus::DownloadComplete);
        assert!(file.product_code.is_empty());
    }

    #[test]
    fn failure_response_carries_messages() {
        let body = br#"{"response":"failed","messages":"Invalid login"}"#;
        let err = parse_response::<Ack>(body).unwrap_err();
        assert_eq!(err.to_string(), "failed: Invalid login");
    }

    #[test]
    fn version_body() {
        let body = br#"{"response":"success","version":"2.1","build":"77"}"#;
        let version: Version = parse_response::<VersionBody>(body).unwrap().into();
        assert_eq!(version.version, "2.1");
        assert_eq!(version.build, "77");
    }

    #[test]
    fn bad_size_is_rejected() {
        let entry = FileEntry {
            fileid: "9".into(),
            filesize: "big".into(),
            fulfilled: "2024-01-01".into(),
            ..FileEntry::default()
        };
        let err = EpfFile::try_from(entry).unwrap_err();
        assert!(err.to_string().contains("Invalid size"));
    }

    #[test]
    fn status_codes() {
        for code in ["N", "S", "X", "C"] {
            assert_eq!(FileStatus::from_code(code).code(), code);
        }
        assert_eq!(FileStatus::from_code("Q"), FileStatus::Other("Q".into()));
    }
}
