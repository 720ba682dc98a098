//! PostgREST-style HTTP transport for the `projects` table.
//!
//! Rows live under `{url}/rest/v1/{table}` and are filtered with query
//! operators (`id=eq.<id>`). Upserts ask the service to merge on the
//! primary key. The service has no push channel we rely on here, so
//! `watch` polls a cheap `id,updated_at` projection and reports rows
//! whose timestamp moved.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;

use touchcode_core::config::RemoteConfig;
use touchcode_core::store::TaskGuard;
use touchcode_core::{ChangeNotice, ChangeTopic, ProjectId, Subscription};

use crate::remote::{Identity, RemoteError, RemoteTable};
use crate::row::ProjectRow;

/// HTTP client for one remote table.
#[derive(Clone)]
pub struct HttpTable {
    client: Client,
    endpoint: String,
    api_key: String,
    poll_interval: Duration,
}

impl HttpTable {
    /// Builds a client from connection settings.
    pub fn new(config: &RemoteConfig) -> Result<Self, RemoteError> {
        let base = config.url.trim_end_matches('/');
        if base.is_empty() {
            return Err(RemoteError::Transport("remote url is not configured".into()));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|e| RemoteError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: format!("{base}/rest/v1/{}", config.table),
            api_key: config.api_key.clone(),
            poll_interval: Duration::from_secs(config.poll_interval_secs.max(1)),
        })
    }

    /// Returns the table URL.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn authorize(&self, request: RequestBuilder, identity: &Identity) -> RequestBuilder {
        let token = identity.access_token.as_deref().unwrap_or(&self.api_key);
        request.header("apikey", &self.api_key).bearer_auth(token)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, RemoteError> {
        let response = request.send().await.map_err(transport_error)?;
        check_status(response).await
    }

    async fn rows<T: for<'de> Deserialize<'de>>(
        &self,
        identity: &Identity,
        query: &[(&str, String)],
    ) -> Result<Vec<T>, RemoteError> {
        let request = self.authorize(self.client.get(&self.endpoint), identity).query(query);
        let response = self.send(request).await?;
        response
            .json()
            .await
            .map_err(|e| RemoteError::Decode(e.to_string()))
    }
}

#[async_trait]
impl RemoteTable for HttpTable {
    async fn upsert(&self, identity: &Identity, row: ProjectRow) -> Result<(), RemoteError> {
        let request = self
            .authorize(self.client.post(&self.endpoint), identity)
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(&row);
        self.send(request).await?;
        Ok(())
    }

    async fn fetch(
        &self,
        identity: &Identity,
        id: &ProjectId,
    ) -> Result<Option<ProjectRow>, RemoteError> {
        let rows: Vec<ProjectRow> = self
            .rows(
                identity,
                &[
                    ("id", format!("eq.{id}")),
                    ("user_id", format!("eq.{}", identity.user_id)),
                    ("select", "*".to_string()),
                ],
            )
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn list(&self, identity: &Identity) -> Result<Vec<ProjectRow>, RemoteError> {
        self.rows(
            identity,
            &[
                ("select", "*".to_string()),
                ("user_id", format!("eq.{}", identity.user_id)),
                ("order", "updated_at.desc".to_string()),
            ],
        )
        .await
    }

    async fn remove(&self, identity: &Identity, id: &ProjectId) -> Result<(), RemoteError> {
        let request = self
            .authorize(self.client.delete(&self.endpoint), identity)
            .query(&[
                ("id", format!("eq.{id}")),
                ("user_id", format!("eq.{}", identity.user_id)),
            ]);
        self.send(request).await?;
        Ok(())
    }

    fn watch(&self, identity: &Identity, topic: ChangeTopic) -> Result<Subscription, RemoteError> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| RemoteError::Transport("no async runtime for polling".into()))?;

        let (tx, subscription) = Subscription::channel(topic.clone());
        let table = self.clone();
        let identity = identity.clone();

        let task = runtime.spawn(async move {
            let mut query = vec![
                ("select", "id,updated_at".to_string()),
                ("user_id", format!("eq.{}", identity.user_id)),
            ];
            if let ChangeTopic::Project(id) = &topic {
                query.push(("id", format!("eq.{id}")));
            }

            let mut seen: Option<HashMap<ProjectId, DateTime<Utc>>> = None;
            let mut ticker = tokio::time::interval(table.poll_interval);
            loop {
                ticker.tick().await;
                let stamps: Vec<Stamp> = match table.rows(&identity, &query).await {
                    Ok(stamps) => stamps,
                    Err(err) => {
                        tracing::debug!("Change poll failed: {}", err);
                        continue;
                    }
                };
                let current: HashMap<_, _> =
                    stamps.into_iter().map(|s| (s.id, s.updated_at)).collect();

                if let Some(previous) = &seen {
                    for id in changed_ids(previous, &current) {
                        if tx.send(ChangeNotice { project: Some(id) }).is_err() {
                            return;
                        }
                    }
                }
                seen = Some(current);
            }
        });

        Ok(subscription.with_guard(TaskGuard::new(task)))
    }
}

#[derive(Deserialize)]
struct Stamp {
    id: ProjectId,
    updated_at: DateTime<Utc>,
}

/// Ids that were added, removed or re-stamped between two polls.
fn changed_ids(
    previous: &HashMap<ProjectId, DateTime<Utc>>,
    current: &HashMap<ProjectId, DateTime<Utc>>,
) -> Vec<ProjectId> {
    let mut changed: Vec<ProjectId> = current
        .iter()
        .filter(|(id, stamp)| previous.get(*id) != Some(*stamp))
        .map(|(id, _)| id.clone())
        .collect();
    changed.extend(
        previous
            .keys()
            .filter(|id| !current.contains_key(*id))
            .cloned(),
    );
    changed
}

fn transport_error(err: reqwest::Error) -> RemoteError {
    if err.is_timeout() {
        RemoteError::Timeout
    } else {
        RemoteError::Transport(err.to_string())
    }
}

async fn check_status(response: Response) -> Result<Response, RemoteError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(RemoteError::Unauthorized);
    }
    let body = response.text().await.unwrap_or_default();
    Err(RemoteError::Status {
        status: status.as_u16(),
        body,
    })
}
