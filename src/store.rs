// --------------------------------------------------
// Durable task storage.
//
// Two backends behind one trait:
// - RestTaskStore: the hosted `tasks` collection (PostgREST-style API)
// - JsonFileStore: local JSON db for running without a hosted store
//
// Both scope rows to the signed-in user and list newest first.
// --------------------------------------------------

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

use crate::error::{StoreError, error_detail};
use crate::http::{Headers, HttpClient, Response, bearer_json};
use crate::logic::sort_newest_first;
use crate::models::{Task, TaskDraft, TaskPatch};
use crate::session::SessionProvider;

#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Every task of the current user, newest first.
    async fn list(&self) -> Result<Vec<Task>, StoreError>;

    /// Insert one or more tasks in a single write.
    async fn insert(&self, drafts: &[TaskDraft]) -> Result<(), StoreError>;

    async fn update(&self, id: Uuid, patch: &TaskPatch) -> Result<(), StoreError>;

    async fn delete(&self, id: Uuid) -> Result<(), StoreError>;
}

// A listing that is not an array is treated as "no tasks", and rows that do
// not parse are skipped rather than failing the whole refresh.
fn tasks_from_json(value: Value) -> Vec<Task> {
    let Value::Array(rows) = value else {
        warn!("task listing returned a non-array body");
        return Vec::new();
    };
    rows.into_iter()
        .filter_map(|row| match serde_json::from_value::<Task>(row) {
            Ok(task) => Some(task),
            Err(e) => {
                warn!(error = %e, "skipping unreadable task row");
                None
            }
        })
        .collect()
}

// -----------------------------
// Hosted store
// -----------------------------

pub struct RestTaskStore {
    http: Arc<dyn HttpClient>,
    base_url: String,
    api_key: String,
    session: Arc<dyn SessionProvider>,
}

impl RestTaskStore {
    pub fn new(
        http: Arc<dyn HttpClient>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        session: Arc<dyn SessionProvider>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            session,
        }
    }

    fn collection(&self) -> String {
        format!("{}/rest/v1/tasks", self.base_url)
    }

    // Returns the request headers and the user id rows are scoped to.
    fn auth(&self) -> Result<(Headers, Option<String>), StoreError> {
        let session = self.session.current().ok_or(StoreError::Unauthenticated)?;
        let mut headers = bearer_json(&session.access_token);
        headers.insert("apikey".to_string(), self.api_key.clone());
        Ok((headers, session.user_id))
    }

    fn check(response: Response) -> Result<Response, StoreError> {
        match response.status {
            401 | 403 => Err(StoreError::Unauthenticated),
            _ if response.is_success() => Ok(response),
            status => Err(StoreError::Rejected {
                status,
                message: error_detail(&response.body),
            }),
        }
    }

    fn row_filter(&self, id: Uuid, user: Option<&str>) -> String {
        let mut url = format!("{}?id=eq.{id}", self.collection());
        if let Some(user) = user {
            url.push_str(&format!("&user_id=eq.{user}"));
        }
        url
    }
}

#[async_trait]
impl TaskStore for RestTaskStore {
    async fn list(&self) -> Result<Vec<Task>, StoreError> {
        let (headers, user) = self.auth()?;
        let mut url = format!("{}?select=*&order=created_at.desc", self.collection());
        if let Some(user) = user {
            url.push_str(&format!("&user_id=eq.{user}"));
        }

        let response = Self::check(self.http.get(&url, &headers).await?)?;
        let value: Value = response.json().unwrap_or(Value::Null);
        Ok(tasks_from_json(value))
    }

    async fn insert(&self, drafts: &[TaskDraft]) -> Result<(), StoreError> {
        if drafts.is_empty() {
            return Ok(());
        }
        let (headers, user) = self.auth()?;

        let mut rows = Vec::with_capacity(drafts.len());
        for draft in drafts {
            let mut row = serde_json::to_value(draft)?;
            if let (Some(user), Value::Object(map)) = (&user, &mut row) {
                map.insert("user_id".to_string(), Value::String(user.clone()));
            }
            rows.push(row);
        }
        let body = serde_json::to_string(&rows)?;

        Self::check(self.http.post(&self.collection(), &body, &headers).await?)?;
        Ok(())
    }

    async fn update(&self, id: Uuid, patch: &TaskPatch) -> Result<(), StoreError> {
        let (headers, user) = self.auth()?;
        let body = serde_json::to_string(patch)?;
        let url = self.row_filter(id, user.as_deref());

        Self::check(self.http.patch(&url, &body, &headers).await?)?;
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        let (headers, user) = self.auth()?;
        let url = self.row_filter(id, user.as_deref());

        Self::check(self.http.delete(&url, &headers).await?)?;
        Ok(())
    }
}

// -----------------------------
// Local JSON store
// -----------------------------

pub const DEFAULT_DB_PATH: &str = "data/db.json";
const LOCAL_OWNER: &str = "local";

#[derive(Debug, Default, Serialize, Deserialize)]
struct Db {
    #[serde(default)]
    tasks: BTreeMap<String, Vec<Task>>, // owner -> tasks
}

pub struct JsonFileStore {
    path: PathBuf,
    session: Arc<dyn SessionProvider>,
    lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>, session: Arc<dyn SessionProvider>) -> Self {
        Self {
            path: path.into(),
            session,
            lock: Mutex::new(()),
        }
    }

    fn owner(&self) -> String {
        self.session
            .current()
            .and_then(|s| s.user_id)
            .unwrap_or_else(|| LOCAL_OWNER.to_string())
    }

    fn load_db(&self) -> Result<Db, StoreError> {
        if !self.path.exists() {
            return Ok(Db::default());
        }
        let text = fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&text)?)
    }

    // Write to a sibling temp file, then rename over the db.
    fn save_db(&self, db: &Db) -> Result<(), StoreError> {
        let tmp_path = self.path.with_extension("json.tmp");
        let text = serde_json::to_string_pretty(db)?;

        if let Some(parent) = Path::new(&self.path).parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        fs::write(&tmp_path, text)?;
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }

    // Load, mutate the current owner's rows, save. Serialized by `lock`.
    fn modify<T>(
        &self,
        f: impl FnOnce(&mut Vec<Task>) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| StoreError::Io("store lock poisoned".to_string()))?;
        let mut db = self.load_db()?;
        let out = f(db.tasks.entry(self.owner()).or_default())?;
        self.save_db(&db)?;
        Ok(out)
    }
}

#[async_trait]
impl TaskStore for JsonFileStore {
    async fn list(&self) -> Result<Vec<Task>, StoreError> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| StoreError::Io("store lock poisoned".to_string()))?;
        let mut db = self.load_db()?;
        let mut tasks = db.tasks.remove(&self.owner()).unwrap_or_default();
        sort_newest_first(&mut tasks);
        Ok(tasks)
    }

    async fn insert(&self, drafts: &[TaskDraft]) -> Result<(), StoreError> {
        if drafts.is_empty() {
            return Ok(());
        }
        let now = Utc::now();
        self.modify(|tasks| {
            tasks.extend(
                drafts
                    .iter()
                    .cloned()
                    .map(|d| d.into_task(Uuid::new_v4(), now)),
            );
            Ok(())
        })
    }

    async fn update(&self, id: Uuid, patch: &TaskPatch) -> Result<(), StoreError> {
        self.modify(|tasks| {
            let Some(t) = tasks.iter_mut().find(|t| t.id == id) else {
                return Err(StoreError::NotFound(id.to_string()));
            };
            patch.apply(t);
            Ok(())
        })
    }

    async fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        self.modify(|tasks| {
            let before = tasks.len();
            tasks.retain(|t| t.id != id);
            if tasks.len() == before {
                return Err(StoreError::NotFound(id.to_string()));
            }
            Ok(())
        })
    }
}
