//! Candidate upstream locations for a package

use reqwest::Url;

/// How a data source was found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceOrigin {
    /// Given in the package configuration
    Explicit,
    /// The package homepage
    Homepage,
    /// Computed from another source, e.g. a GitHub releases API URL
    Derived,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataSource {
    pub url: String,
    /// Expected content type, if known
    pub content_type: Option<String>,
    pub origin: SourceOrigin,
    /// Lower is tried first
    pub priority: u32,
}

impl DataSource {
    fn new(url: &str, content_type: Option<&str>, origin: SourceOrigin, priority: u32) -> Self {
        Self {
            url: url.to_string(),
            content_type: content_type.map(str::to_string),
            origin,
            priority,
        }
    }
}

/// `https://api.github.com/repos/<owner>/<repo>/releases/latest` for a
/// `github.com/<owner>/<repo>` homepage
pub fn github_releases_url(homepage: &str) -> Option<String> {
    let url = Url::parse(homepage).ok()?;
    let host = url.host_str()?;
    if !host.eq_ignore_ascii_case("github.com") && !host.eq_ignore_ascii_case("www.github.com") {
        return None;
    }
    let mut segments = url.path_segments()?.filter(|s| !s.is_empty());
    let owner = segments.next()?;
    let repo = segments.next()?;
    let repo = repo.strip_suffix(".git").unwrap_or(repo);
    Some(format!(
        "https://api.github.com/repos/{}/{}/releases/latest",
        owner, repo
    ))
}

/// Candidate sources sorted by priority, without duplicate URLs
pub fn candidate_sources(explicit: Option<&str>, homepage: Option<&str>) -> Vec<DataSource> {
    let explicit = explicit.map(str::trim).filter(|u| !u.is_empty());
    let homepage = homepage.map(str::trim).filter(|u| !u.is_empty());

    let mut sources = Vec::new();
    if let Some(url) = explicit {
        sources.push(DataSource::new(url, None, SourceOrigin::Explicit, 0));
    }
    if let Some(url) = homepage {
        sources.push(DataSource::new(url, Some("text/html"), SourceOrigin::Homepage, 1));
        if let Some(api) = github_releases_url(url) {
            sources.push(DataSource::new(
                &api,
                Some("application/json"),
                SourceOrigin::Derived,
                2,
            ));
        }
    }

    // Stable sort keeps the first (lowest priority) source for a URL
    sources.sort_by_key(|s| s.priority);
    let mut seen = std::collections::HashSet::new();
    sources.retain(|s| seen.insert(s.url.clone()));
    sources
}
