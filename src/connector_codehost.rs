//! Code-host connector (GitHub REST API).
//!
//! Lists issues, pull requests, and commits updated since a checkpoint and
//! formats each as a markdown-headed document. The issues endpoint also
//! returns pull requests; those are filtered out so PRs are only ingested
//! through the pulls endpoint.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::connector::SourceConnector;
use crate::error::{Error, Result};
use crate::models::{SourceDocument, SourceKind, SourceType};

pub const API_KEY_ENV: &str = "GITHUB_TOKEN";

const API_BASE: &str = "https://api.github.com";
const PER_PAGE: u32 = 100;

pub struct CodeHostConnector {
    owner: String,
    repo: String,
    client: reqwest::Client,
    token: String,
}

impl CodeHostConnector {
    /// Create a connector for one repository. Requires `GITHUB_TOKEN`.
    pub fn new(owner: String, repo: String) -> Result<Self> {
        let token = std::env::var(API_KEY_ENV)
            .map_err(|_| Error::InvalidConfig(format!("{} not set", API_KEY_ENV)))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("waypoint")
            .build()
            .map_err(|e| Error::UpstreamFetch(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            owner,
            repo,
            client,
            token,
        })
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, url: String) -> Result<T> {
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .header("Accept", "application/vnd.github+json")
            .send()
            .await
            .map_err(|e| Error::UpstreamFetch(format!("code host request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(Error::UpstreamFetch(format!(
                "code host API error {}: {}",
                status, body_text
            )));
        }

        response
            .json()
            .await
            .map_err(|e| Error::UpstreamFetch(format!("invalid code host response: {}", e)))
    }

    async fn fetch_issues(&self, since: DateTime<Utc>) -> Result<Vec<GitIssue>> {
        let url = format!(
            "{}/repos/{}/{}/issues?since={}&state=all&sort=updated&direction=desc&per_page={}",
            API_BASE,
            self.owner,
            self.repo,
            since.to_rfc3339(),
            PER_PAGE
        );
        self.get_json(url).await
    }

    async fn fetch_pulls(&self, since: DateTime<Utc>) -> Result<Vec<GitPull>> {
        // The pulls endpoint has no `since` parameter; fetch the most
        // recently updated page and filter client-side.
        let url = format!(
            "{}/repos/{}/{}/pulls?state=all&sort=updated&direction=desc&per_page={}",
            API_BASE, self.owner, self.repo, PER_PAGE
        );
        let pulls: Vec<GitPull> = self.get_json(url).await?;
        Ok(pulls
            .into_iter()
            .filter(|pr| pr.updated_at >= since)
            .collect())
    }

    async fn fetch_commits(&self, since: DateTime<Utc>) -> Result<Vec<GitCommit>> {
        let url = format!(
            "{}/repos/{}/{}/commits?since={}&per_page={}",
            API_BASE,
            self.owner,
            self.repo,
            since.to_rfc3339(),
            PER_PAGE
        );
        self.get_json(url).await
    }
}

#[async_trait]
impl SourceConnector for CodeHostConnector {
    fn source_kind(&self) -> SourceKind {
        SourceKind::CodeHost
    }

    async fn list_changed(&self, since: DateTime<Utc>) -> Result<Vec<SourceDocument>> {
        let (issues, pulls, commits) = tokio::try_join!(
            self.fetch_issues(since),
            self.fetch_pulls(since),
            self.fetch_commits(since)
        )?;

        let mut documents = Vec::new();

        for issue in &issues {
            // The issues endpoint returns PRs too; skip them here.
            if issue.pull_request.is_some() {
                continue;
            }
            documents.push(issue_document(issue));
        }
        for pr in &pulls {
            documents.push(pull_document(pr));
        }
        for commit in &commits {
            documents.push(commit_document(commit, since));
        }

        tracing::info!(
            issues = issues.len(),
            pulls = pulls.len(),
            commits = commits.len(),
            "code host listing complete"
        );

        Ok(documents)
    }
}

fn issue_document(issue: &GitIssue) -> SourceDocument {
    let body = issue.body.as_deref().unwrap_or("").trim();
    let raw_text = if body.is_empty() {
        String::new()
    } else {
        format!("# Issue #{}: {}\n\n{}", issue.number, issue.title, body)
    };

    SourceDocument {
        source_type: SourceType::Issue,
        external_id: issue.number.to_string(),
        title: issue.title.clone(),
        raw_text,
        last_modified_at: issue.updated_at,
    }
}

fn pull_document(pr: &GitPull) -> SourceDocument {
    let body = pr.body.as_deref().unwrap_or("").trim();
    let raw_text = if body.is_empty() {
        String::new()
    } else {
        format!("# PR #{}: {}\n\n{}", pr.number, pr.title, body)
    };

    SourceDocument {
        source_type: SourceType::PullRequest,
        external_id: pr.number.to_string(),
        title: pr.title.clone(),
        raw_text,
        last_modified_at: pr.updated_at,
    }
}

fn commit_document(commit: &GitCommit, since: DateTime<Utc>) -> SourceDocument {
    let short = &commit.sha[..commit.sha.len().min(7)];
    let message = commit.commit.message.trim();
    let raw_text = if message.is_empty() {
        String::new()
    } else {
        format!("# Commit {}\n\n{}", short, message)
    };
    let last_modified_at = commit
        .commit
        .author
        .as_ref()
        .map(|a| a.date)
        .or_else(|| commit.commit.committer.as_ref().map(|c| c.date))
        .unwrap_or(since);

    SourceDocument {
        source_type: SourceType::Commit,
        external_id: commit.sha.clone(),
        title: format!("Commit {}", short),
        raw_text,
        last_modified_at,
    }
}

#[derive(Debug, Deserialize)]
struct GitIssue {
    number: u64,
    title: String,
    body: Option<String>,
    updated_at: DateTime<Utc>,
    pull_request: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct GitPull {
    number: u64,
    title: String,
    body: Option<String>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct GitCommit {
    sha: String,
    commit: GitCommitInner,
}

#[derive(Debug, Deserialize)]
struct GitCommitInner {
    message: String,
    author: Option<GitCommitSignature>,
    committer: Option<GitCommitSignature>,
}

#[derive(Debug, Deserialize)]
struct GitCommitSignature {
    date: DateTime<Utc>,
}
