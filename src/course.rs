//! Course Store: an opaque per-event JSON document — the server
//! validates it as JSON, persists, serves, and replaces it without
//! interpreting its contents.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::error::AppError;
use crate::model::CourseDoc;
use crate::persistence::{read_json_or_default, write_json_atomic};

struct EventCourse {
    dir: PathBuf,
    doc: Option<CourseDoc>,
}

impl EventCourse {
    fn path(&self) -> PathBuf {
        self.dir.join("course.json")
    }

    async fn loaded(&mut self) -> Result<&CourseDoc, AppError> {
        if self.doc.is_none() {
            self.doc = Some(read_json_or_default(&self.path()).await?);
        }
        Ok(self.doc.as_ref().unwrap())
    }
}

pub struct CourseStore {
    events: Mutex<HashMap<u64, Arc<Mutex<EventCourse>>>>,
}

pub type SharedCourseStore = Arc<CourseStore>;

impl CourseStore {
    pub fn new() -> SharedCourseStore {
        Arc::new(Self { events: Mutex::new(HashMap::new()) })
    }

    async fn event(&self, eid: u64, dir: &Path) -> Arc<Mutex<EventCourse>> {
        let mut events = self.events.lock().await;
        events
            .entry(eid)
            .or_insert_with(|| Arc::new(Mutex::new(EventCourse { dir: dir.to_path_buf(), doc: None })))
            .clone()
    }

    pub async fn get(&self, eid: u64, dir: &Path) -> CourseDoc {
        let event = self.event(eid, dir).await;
        let mut event = event.lock().await;
        event.loaded().await.cloned().unwrap_or_else(|_| CourseDoc::empty())
    }

    pub async fn set(&self, eid: u64, dir: &Path, doc: CourseDoc) -> Result<(), AppError> {
        let event = self.event(eid, dir).await;
        let mut event = event.lock().await;
        write_json_atomic(&event.path(), &doc).await?;
        event.doc = Some(doc);
        Ok(())
    }

    pub async fn delete(&self, eid: u64, dir: &Path) -> Result<(), AppError> {
        self.set(eid, dir, CourseDoc::empty()).await
    }

    pub async fn purge(&self, eid: u64) {
        self.events.lock().await.remove(&eid);
    }
}
