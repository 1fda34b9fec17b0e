use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

pub const DIRECTORY_URL: &str = "https://curse.nikky.moe";
pub const PROJECT_URL_PREFIX: &str = "https://minecraft.curseforge.com/projects/";
const USER_AGENT: &str = "packsmith";

const SLUG_QUERY: &str = r#"
query getIDFromSlug($slug: String) {
    addons(slug: $slug) {
        id
    }
}
"#;

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("request failed: {0}")]
    Transport(Box<ureq::Error>),
    #[error("could not decode response: {0}")]
    Decode(#[from] std::io::Error),
    #[error("directory reported an error: {0}")]
    Api(String),
    #[error("no addon matches slug {0}")]
    NotFound(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AddonRecord {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub summary: String,
    #[serde(rename = "webSiteURL")]
    pub website_url: String,
    pub attachments: Vec<AddonAttachment>,
    pub latest_files: Vec<FileRecord>,
    pub available: bool,
    pub last_queried: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AddonAttachment {
    pub thumbnail_url: String,
    pub url: String,
    #[serde(rename = "default")]
    pub is_default: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FileRecord {
    pub id: i64,
    pub file_name: String,
    pub file_name_on_disk: String,
    #[serde(rename = "downloadURL")]
    pub download_url: String,
    pub dependencies: Vec<DependencyEdge>,
    pub available: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DependencyEdge {
    #[serde(rename = "addOnId")]
    pub addon_id: i64,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Serialize)]
struct SlugQuery<'a> {
    query: &'static str,
    variables: SlugVariables<'a>,
}

#[derive(Serialize)]
struct SlugVariables<'a> {
    slug: &'a str,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SlugResponse {
    data: SlugData,
    exception: String,
    message: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SlugData {
    addons: Vec<SlugAddon>,
}

#[derive(Debug, Deserialize)]
struct SlugAddon {
    id: i64,
}

pub struct Client {
    agent: ureq::Agent,
    base_url: String,
}

impl Client {
    pub fn new() -> Self {
        Self::with_base_url(DIRECTORY_URL)
    }

    pub fn with_base_url(base_url: &str) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(5))
            .timeout_read(Duration::from_secs(30))
            .timeout_write(Duration::from_secs(30))
            .build();
        Self {
            agent,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn fetch_addon(&self, addon_id: i64) -> Result<AddonRecord, RemoteError> {
        let url = format!("{}/api/addon/{addon_id}", self.base_url);
        let record: AddonRecord = self.get(&url)?.into_json()?;
        Ok(record)
    }

    pub fn fetch_file(&self, addon_id: i64, file_id: i64) -> Result<FileRecord, RemoteError> {
        let url = format!("{}/api/addon/{addon_id}/file/{file_id}", self.base_url);
        let record: FileRecord = self.get(&url)?.into_json()?;
        Ok(record)
    }

    // The directory answers slug lookups over GraphQL and reports failures
    // inside an HTTP 200 body, so errors are detected from the payload.
    pub fn resolve_slug_to_id(&self, slug: &str) -> Result<i64, RemoteError> {
        let body = SlugQuery {
            query: SLUG_QUERY,
            variables: SlugVariables { slug },
        };
        let response = self
            .agent
            .post(&format!("{}/graphql", self.base_url))
            .set("User-Agent", USER_AGENT)
            .set("Accept", "application/json")
            .send_json(&body)
            .map_err(|err| RemoteError::Transport(Box::new(err)))?;
        let response: SlugResponse = response.into_json()?;

        if !response.exception.is_empty() || !response.message.is_empty() {
            return Err(RemoteError::Api(response.message));
        }
        match response.data.addons.first() {
            Some(addon) => Ok(addon.id),
            None => Err(RemoteError::NotFound(slug.to_string())),
        }
    }

    fn get(&self, url: &str) -> Result<ureq::Response, RemoteError> {
        self.agent
            .get(url)
            .set("User-Agent", USER_AGENT)
            .set("Accept", "application/json")
            .call()
            .map_err(|err| RemoteError::Transport(Box::new(err)))
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

pub fn download_url(slug: &str, file_id: i64) -> String {
    format!("{PROJECT_URL_PREFIX}{slug}/files/{file_id}/download")
}

pub fn parse_project_slug(url: &str) -> Option<String> {
    let rest = url.strip_prefix(PROJECT_URL_PREFIX)?;
    let slug: String = rest
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect();
    if slug.is_empty() {
        return None;
    }
    Some(slug)
}

pub fn parse_project_url(url: &str) -> Option<(String, i64)> {
    let slug = parse_project_slug(url)?;
    let rest = url
        .strip_prefix(PROJECT_URL_PREFIX)?
        .strip_prefix(slug.as_str())?
        .strip_prefix("/files/")?;
    let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
    if digits.is_empty() || !rest[digits.len()..].starts_with('/') {
        return None;
    }
    let file_id = digits.parse().ok()?;
    Some((slug, file_id))
}

// The directory serves large thumbnails and animated previews; the pack
// listing wants the small static variant.
pub fn icon_url(attachments: &[AddonAttachment]) -> String {
    let mut icon = String::new();
    for attachment in attachments {
        if !attachment.is_default {
            continue;
        }
        icon = attachment.thumbnail_url.replacen("256/256", "62/62", 1);
        icon = icon.replacen(".gif", "_animated.gif", 1);
    }
    icon
}
