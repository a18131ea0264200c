//! Document fetching.
//!
//! Page, process, bridge and OpenAPI documents may live on disk or behind an
//! HTTP(S) URL. Relative references inside a document resolve against the
//! location of the document that names them.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use reqwest::{Client, Url, header};
use serde_json::Value;
use tracing::debug;

/// Where a document is read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentLocation {
    Url(Url),
    File(PathBuf),
}

impl DocumentLocation {
    /// Parse a location given on the command line or in a document.
    ///
    /// `http(s)://` URLs stay remote, `file://` URLs become paths, anything
    /// else is treated as a filesystem path.
    pub fn parse(raw: &str) -> Result<Self> {
        match Url::parse(raw) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(Self::Url(url)),
            Ok(url) if url.scheme() == "file" => url
                .to_file_path()
                .map(Self::File)
                .map_err(|_| anyhow!("invalid file URL '{raw}'")),
            _ => Ok(Self::File(PathBuf::from(raw))),
        }
    }

    /// Resolve `reference` relative to this location.
    pub fn join(&self, reference: &str) -> Result<Self> {
        if let Ok(url) = Url::parse(reference)
            && url.scheme().len() > 1
        {
            return Self::parse(reference);
        }
        match self {
            Self::Url(base) => base
                .join(reference)
                .map(Self::Url)
                .with_context(|| format!("resolve '{reference}' against {base}")),
            Self::File(base) => {
                let reference_path = Path::new(reference);
                if reference_path.is_absolute() {
                    return Ok(Self::File(reference_path.to_path_buf()));
                }
                let directory = base.parent().unwrap_or_else(|| Path::new(""));
                Ok(Self::File(directory.join(reference_path)))
            }
        }
    }

    fn is_yaml(&self) -> bool {
        let name = match self {
            Self::Url(url) => url.path().to_string(),
            Self::File(path) => path.to_string_lossy().into_owned(),
        };
        name.ends_with(".yaml") || name.ends_with(".yml")
    }
}

impl fmt::Display for DocumentLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Url(url) => write!(f, "{url}"),
            Self::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Read the raw text of a document.
pub async fn fetch_text(location: &DocumentLocation) -> Result<String> {
    debug!(location = %location, "fetching document");
    match location {
        DocumentLocation::File(path) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("read {}", path.display())),
        DocumentLocation::Url(url) => {
            let client = Client::builder()
                .connect_timeout(Duration::from_secs(30))
                .build()
                .context("build http client")?;
            let response = client
                .get(url.clone())
                .header(header::ACCEPT, "application/json, application/yaml, text/plain")
                .send()
                .await
                .map_err(|error| anyhow!("Network error: {error}"))?;
            let status = response.status();
            let text = response.text().await.with_context(|| format!("read body of {url}"))?;
            if !status.is_success() {
                return Err(anyhow!("GET {url} returned {status}"));
            }
            Ok(text)
        }
    }
}

/// Fetch and parse a JSON (or YAML) document.
///
/// YAML is attempted first for `.yaml`/`.yml` locations; other locations are
/// parsed as JSON with YAML as a fallback, since OpenAPI documents come in both.
pub async fn fetch_document(location: &DocumentLocation) -> Result<Value> {
    let text = fetch_text(location).await?;
    parse_document(&text, location.is_yaml()).with_context(|| format!("parse {location}"))
}

fn parse_document(text: &str, yaml_first: bool) -> Result<Value> {
    if yaml_first {
        return serde_yaml::from_str::<Value>(text).context("invalid YAML document");
    }
    serde_json::from_str::<Value>(text)
        .or_else(|_| serde_yaml::from_str::<Value>(text))
        .context("Unable to parse json. Invalid document format")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    #[test]
    fn relative_references_follow_the_base() {
        let page = DocumentLocation::parse("/srv/pages/main.json").unwrap();
        assert_eq!(
            page.join("../process/flow.json").unwrap(),
            DocumentLocation::File(PathBuf::from("/srv/pages/../process/flow.json"))
        );

        let remote = DocumentLocation::parse("https://example.com/pages/main.json").unwrap();
        assert_eq!(remote.join("bridge.json").unwrap().to_string(), "https://example.com/pages/bridge.json");
        assert_eq!(
            page.join("https://cdn.example.com/api.yaml").unwrap().to_string(),
            "https://cdn.example.com/api.yaml"
        );
    }

    #[tokio::test]
    async fn reads_json_and_yaml_files() {
        let directory = tempfile::tempdir().unwrap();
        let json_path = directory.path().join("page.json");
        std::fs::write(&json_path, r#"{"title": "Demo"}"#).unwrap();
        let yaml_path = directory.path().join("api.yaml");
        let mut file = std::fs::File::create(&yaml_path).unwrap();
        writeln!(file, "openapi: 3.0.3\npaths: {{}}").unwrap();

        let page = fetch_document(&DocumentLocation::File(json_path)).await.unwrap();
        assert_eq!(page, json!({"title": "Demo"}));
        let api = fetch_document(&DocumentLocation::File(yaml_path)).await.unwrap();
        assert_eq!(api["openapi"], json!("3.0.3"));
    }

    #[tokio::test]
    async fn missing_file_names_the_path() {
        let error = fetch_document(&DocumentLocation::File(PathBuf::from("/definitely/missing.json")))
            .await
            .unwrap_err();
        assert!(format!("{error:#}").contains("/definitely/missing.json"), "unexpected error: {error:#}");
    }
}
