use serde::{Deserialize, Serialize};
use std::fmt;

/// Normalized project record shared by discovery, enrichment and storage.
///
/// The capitalized aliases accept batch files written by the earlier
/// miner, which used `Owner`, `Name`, `URL` and so on.

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    #[serde(alias = "Owner")]
    pub owner: String,
    #[serde(alias = "Name")]
    pub name: String,
    #[serde(default, alias = "Description")]
    pub description: String,
    #[serde(default, alias = "URL")]
    pub url: String,
    #[serde(default, alias = "Language")]
    pub language: String,
    #[serde(default, alias = "Stars")]
    pub stars: u64,
    #[serde(default, alias = "Readme")]
    pub readme: String,
    #[serde(default, alias = "Analysis")]
    pub analysis: String,
}

impl Project {
    /// A freshly discovered project: metadata only, nothing enriched yet.
    pub fn discovered(
        owner: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        url: impl Into<String>,
        language: impl Into<String>,
        stars: u64,
    ) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
            description: description.into(),
            url: url.into(),
            language: language.into(),
            stars,
            readme: String::new(),
            analysis: String::new(),
        }
    }

    pub fn id(&self) -> ProjectId {
        ProjectId::new(&self.owner, &self.name)
    }
}

/// Dedupe key: the (owner, name) pair, compared case-sensitively.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProjectId {
    pub owner: String,
    pub name: String,
}

impl ProjectId {
    pub fn new(owner: &str, name: &str) -> Self {
        Self {
            owner: owner.to_string(),
            name: name.to_string(),
        }
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// Trending window a discovery source is asked about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    #[default]
    Daily,
    Weekly,
    Monthly,
}

impl Period {
    /// How far back "created recently" reaches for this period.
    pub fn lookback_days(self) -> i64 {
        match self {
            Period::Daily => 1,
            Period::Weekly => 7,
            Period::Monthly => 30,
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Period::Daily => "daily",
            Period::Weekly => "weekly",
            Period::Monthly => "monthly",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TrendingScope {
    pub period: Period,
    /// `None` means every language.
    pub language: Option<String>,
}

impl fmt::Display for TrendingScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.language {
            Some(lang) => write!(f, "{}/{}", self.period, lang),
            None => write!(f, "{}/all", self.period),
        }
    }
}

/// GitHub REST search response: `GET /search/repositories`.
#[derive(Debug, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub items: Vec<SearchRepo>,
}

#[derive(Debug, Deserialize)]
pub struct SearchRepo {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub full_name: String,
    pub owner: Option<SearchOwner>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub html_url: String,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub stargazers_count: u64,
}

#[derive(Debug, Deserialize)]
pub struct SearchOwner {
    #[serde(default)]
    pub login: String,
}

/// GitHub REST readme response: `GET /repos/{owner}/{repo}/readme`.
#[derive(Debug, Deserialize)]
pub struct ReadmeResponse {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub encoding: String,
}
