//! GitHub integration — pull request lookup and PR comments.

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::{PreviewError, Result};
use crate::models::pull_request::{Author, PullRequest, PullRequestBranch, Repository};

#[async_trait]
pub trait ScmClient: Send + Sync {
    async fn find_pull_request(&self, owner: &str, repo: &str, number: i64) -> Result<PullRequest>;

    async fn create_comment(&self, owner: &str, repo: &str, number: i64, body: &str) -> Result<()>;
}

pub struct GithubClient {
    http: reqwest::Client,
    api_url: String,
    token: String,
}

impl GithubClient {
    pub fn new(api_url: &str, token: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_url: api_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut req = self
            .http
            .request(method, format!("{}{path}", self.api_url))
            .header("Accept", "application/vnd.github+json")
            .header("User-Agent", "centrix-preview");
        if !self.token.is_empty() {
            req = req.header("Authorization", format!("Bearer {}", self.token));
        }
        req
    }
}

#[async_trait]
impl ScmClient for GithubClient {
    async fn find_pull_request(&self, owner: &str, repo: &str, number: i64) -> Result<PullRequest> {
        let resp = self
            .request(reqwest::Method::GET, &format!("/repos/{owner}/{repo}/pulls/{number}"))
            .send()
            .await
            .map_err(|e| PreviewError::Scm(format!("failed to query PR {owner}/{repo}#{number}: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(PreviewError::Scm(format!(
                "failed to find PR {owner}/{repo}#{number}: {status} {text}"
            )));
        }

        let pr: GithubPullRequest = resp
            .json()
            .await
            .map_err(|e| PreviewError::Scm(format!("invalid PR payload for {owner}/{repo}#{number}: {e}")))?;
        Ok(pr.into())
    }

    async fn create_comment(&self, owner: &str, repo: &str, number: i64, body: &str) -> Result<()> {
        if self.token.is_empty() {
            tracing::warn!(pr = number, "GitHub token not set, skipping PR comment");
            return Ok(());
        }

        let payload = serde_json::json!({ "body": body });
        let resp = self
            .request(
                reqwest::Method::POST,
                &format!("/repos/{owner}/{repo}/issues/{number}/comments"),
            )
            .json(&payload)
            .send()
            .await
            .map_err(|e| PreviewError::Scm(format!("failed to comment on PR {owner}/{repo}#{number}: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(PreviewError::Scm(format!(
                "failed to comment on PR {owner}/{repo}#{number}: {status} {text}"
            )));
        }
        tracing::info!(repo = %format!("{owner}/{repo}"), pr = number, "Commented on pull request");
        Ok(())
    }
}

// ── REST payloads ──

#[derive(Debug, Deserialize)]
struct GithubPullRequest {
    number: i64,
    #[serde(default)]
    title: String,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    state: String,
    #[serde(default)]
    merged: bool,
    #[serde(default)]
    merged_at: Option<String>,
    #[serde(default)]
    draft: bool,
    #[serde(default)]
    html_url: String,
    #[serde(default)]
    labels: Vec<GithubLabel>,
    #[serde(default)]
    user: GithubUser,
    head: GithubBranch,
    base: GithubBranch,
}

#[derive(Debug, Default, Deserialize)]
struct GithubLabel {
    #[serde(default)]
    name: String,
}

#[derive(Debug, Default, Deserialize)]
struct GithubUser {
    #[serde(default)]
    login: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    avatar_url: String,
    #[serde(default)]
    html_url: String,
}

#[derive(Debug, Deserialize)]
struct GithubBranch {
    #[serde(rename = "ref", default)]
    git_ref: String,
    #[serde(default)]
    sha: String,
    #[serde(default)]
    repo: Option<GithubRepo>,
}

#[derive(Debug, Deserialize)]
struct GithubRepo {
    name: String,
    owner: GithubUser,
    #[serde(default)]
    html_url: String,
    #[serde(default)]
    clone_url: String,
}

impl From<GithubBranch> for PullRequestBranch {
    fn from(b: GithubBranch) -> Self {
        let repo = b.repo.map(|r| Repository {
            namespace: r.owner.login,
            name: r.name,
            link: r.html_url,
            clone_url: r.clone_url,
        });
        Self {
            git_ref: b.git_ref,
            sha: b.sha,
            repo: repo.unwrap_or_default(),
        }
    }
}

impl From<GithubPullRequest> for PullRequest {
    fn from(pr: GithubPullRequest) -> Self {
        let merged = pr.merged || pr.merged_at.is_some();
        let head: PullRequestBranch = pr.head.into();
        Self {
            number: pr.number,
            title: pr.title,
            body: pr.body.unwrap_or_default(),
            sha: head.sha.clone(),
            link: pr.html_url,
            base: pr.base.into(),
            head,
            author: Author {
                login: pr.user.login,
                name: pr.user.name.unwrap_or_default(),
                avatar: pr.user.avatar_url,
                link: pr.user.html_url,
            },
            closed: pr.state == "closed",
            state: pr.state,
            merged,
            draft: pr.draft,
            labels: pr.labels.into_iter().map(|l| l.name).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn pr_payload() -> serde_json::Value {
        json!({
            "number": 5,
            "title": "Add cheese",
            "body": null,
            "state": "closed",
            "merged": false,
            "merged_at": "2024-01-01T00:00:00Z",
            "draft": false,
            "html_url": "https://github.com/myowner/myrepo/pull/5",
            "labels": [{"name": "ok-to-test"}],
            "user": {"login": "dev", "avatar_url": "https://avatars/dev", "html_url": "https://github.com/dev"},
            "head": {"ref": "feature", "sha": "abc123",
                     "repo": {"name": "myrepo", "owner": {"login": "dev"}, "html_url": "https://github.com/dev/myrepo",
                              "clone_url": "https://github.com/dev/myrepo.git"}},
            "base": {"ref": "main", "sha": "def456",
                     "repo": {"name": "myrepo", "owner": {"login": "myowner"}, "html_url": "https://github.com/myowner/myrepo",
                              "clone_url": "https://github.com/myowner/myrepo.git"}}
        })
    }

    #[tokio::test]
    async fn finds_pull_request() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/repos/myowner/myrepo/pulls/5")
                .header("Authorization", "Bearer secret");
            then.status(200).json_body(pr_payload());
        });

        let client = GithubClient::new(&server.base_url(), "secret");
        let pr = client.find_pull_request("myowner", "myrepo", 5).await.unwrap();
        mock.assert();
        assert_eq!(pr.number, 5);
        assert_eq!(pr.sha, "abc123");
        assert!(pr.closed);
        assert!(pr.merged);
        assert!(pr.has_label("OK-TO-TEST"));
        assert_eq!(pr.repository().namespace, "myowner");
        assert_eq!(pr.repository().clone_url, "https://github.com/myowner/myrepo.git");
        assert_eq!(pr.author.login, "dev");
        assert_eq!(pr.body, "");
    }

    #[tokio::test]
    async fn missing_pull_request_is_an_scm_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/repos/o/r/pulls/9");
            then.status(404).body("Not Found");
        });
        let client = GithubClient::new(&server.base_url(), "");
        let err = client.find_pull_request("o", "r", 9).await.unwrap_err();
        assert!(matches!(err, PreviewError::Scm(ref m) if m.contains("404")));
    }

    #[tokio::test]
    async fn posts_comment_body() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/repos/o/r/issues/3/comments")
                .json_body(json!({"body": "hello"}));
            then.status(201).json_body(json!({"id": 1}));
        });
        let client = GithubClient::new(&server.base_url(), "secret");
        client.create_comment("o", "r", 3, "hello").await.unwrap();
        mock.assert();
    }

    #[tokio::test]
    async fn comment_without_token_is_skipped() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST);
            then.status(500);
        });
        let client = GithubClient::new(&server.base_url(), "");
        client.create_comment("o", "r", 3, "hello").await.unwrap();
        assert_eq!(mock.calls(), 0);
    }
}
