//! HTTP client for the offline-download service API

use crate::alist::task::{ExecutionState, ExternalTask, OfflineDownload, RawTask, TaskKind};
use crate::alist::traits::{DirectoryService, TaskService};
use crate::utils::error::RelayError;
use anyhow::Result;
use async_trait::async_trait;
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info};

const USER_AGENT: &str = concat!("magnet-relay/", env!("CARGO_PKG_VERSION"));

/// Code the directory listing endpoint answers with for a missing path
const PATH_MISSING_CODE: i64 = 500;

/// Response envelope shared by every endpoint
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    code: i64,
    #[serde(default)]
    message: String,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct SubmitData {
    #[serde(default)]
    tasks: Vec<RawTask>,
}

/// Client for one service instance, authenticated with a static token
#[derive(Debug, Clone)]
pub struct AlistClient {
    http: Client,
    base_url: String,
    token: String,
}

impl AlistClient {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Result<Self> {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(RelayError::from)?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    /// Send a request and unwrap the envelope, mapping `code != 200` to `RelayError::Api`
    async fn request<T, B>(&self, method: Method, endpoint: &str, body: Option<&B>) -> Result<Option<T>>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let url = format!("{}{}", self.base_url, endpoint);
        debug!("{} {}", method, url);

        let mut request = self
            .http
            .request(method, &url)
            .header("Authorization", &self.token);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(RelayError::from)?;
        let envelope: Envelope<T> = response.json().await.map_err(RelayError::from)?;

        if envelope.code != 200 {
            return Err(RelayError::Api {
                code: envelope.code,
                message: envelope.message,
            }
            .into());
        }
        Ok(envelope.data)
    }

    async fn post<T, B>(&self, endpoint: &str, body: &B) -> Result<Option<T>>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.request(Method::POST, endpoint, Some(body)).await
    }

    async fn get<T: DeserializeOwned>(&self, endpoint: &str) -> Result<Option<T>> {
        self.request::<T, ()>(Method::GET, endpoint, None).await
    }

    /// Service version, without a leading `v`
    pub async fn version(&self) -> Result<String> {
        let data: Option<serde_json::Value> = self.get("/api/public/settings").await?;
        Ok(data
            .as_ref()
            .and_then(|d| d.get("version"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown")
            .trim_start_matches('v')
            .to_string())
    }
}

#[async_trait]
impl TaskService for AlistClient {
    async fn list_tasks(&self, kind: TaskKind, state: ExecutionState) -> Result<Vec<ExternalTask>> {
        let endpoint = format!("/api/admin/task/{}/{}", kind.as_str(), state.as_str());
        let raw: Option<Vec<RawTask>> = self.get(&endpoint).await?;

        Ok(raw
            .unwrap_or_default()
            .into_iter()
            .map(|task| ExternalTask::from_raw(kind, task))
            .collect())
    }

    async fn cancel(&self, kind: TaskKind, task_id: &str) -> Result<()> {
        let endpoint = format!("/api/admin/task/{}/cancel?tid={}", kind.as_str(), task_id);
        self.post::<serde_json::Value, _>(&endpoint, &json!({})).await?;
        debug!("Cancelled {} task {}", kind, task_id);
        Ok(())
    }

    async fn clear_completed(&self, kind: TaskKind) -> Result<()> {
        let endpoint = format!("/api/admin/task/{}/clear_done", kind.as_str());
        self.post::<serde_json::Value, _>(&endpoint, &json!({})).await?;
        debug!("Cleared finished {} tasks", kind);
        Ok(())
    }

    async fn submit_offline_download(&self, download: &OfflineDownload) -> Result<Vec<ExternalTask>> {
        let data: Option<SubmitData> = self.post("/api/fs/add_offline_download", download).await?;
        let tasks: Vec<ExternalTask> = data
            .map(|d| d.tasks)
            .unwrap_or_default()
            .into_iter()
            .map(|task| ExternalTask::from_raw(TaskKind::Download, task))
            .collect();

        info!(
            "Submitted offline download to {}: [{}]",
            download.path,
            tasks.iter().map(|t| t.task_id.as_str()).collect::<Vec<_>>().join(", ")
        );
        Ok(tasks)
    }
}

#[async_trait]
impl DirectoryService for AlistClient {
    async fn exists(&self, path: &str) -> Result<bool> {
        let body = json!({ "path": path, "password": "", "force_root": false });
        match self.post::<serde_json::Value, _>("/api/fs/dirs", &body).await {
            Ok(_) => Ok(true),
            Err(e) => match e.downcast_ref::<RelayError>() {
                Some(RelayError::Api { code, .. }) if *code == PATH_MISSING_CODE => Ok(false),
                _ => Err(e),
            },
        }
    }

    async fn create(&self, path: &str) -> Result<()> {
        self.post::<serde_json::Value, _>("/api/fs/mkdir", &json!({ "path": path }))
            .await?;
        info!("Created remote directory {}", path);
        Ok(())
    }

    async fn rename(&self, path: &str, new_name: &str) -> Result<()> {
        let body = json!({ "name": new_name, "path": path });
        self.post::<serde_json::Value, _>("/api/fs/rename", &body).await?;
        info!("Renamed remote directory {} to {}", path, new_name);
        Ok(())
    }

    async fn remove(&self, dir: &str, names: &[String]) -> Result<()> {
        let body = json!({ "dir": dir, "names": names });
        self.post::<serde_json::Value, _>("/api/fs/remove", &body).await?;
        info!("Removed {:?} from remote directory {}", names, dir);
        Ok(())
    }
}
