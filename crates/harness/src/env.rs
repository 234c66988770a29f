use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use tempfile::TempDir;

use quorum_core::details::ListChange;
use quorum_core::diff::{DetailsInput, FieldInput, PerformerInput, SceneInput, StudioInput, TagInput};
use quorum_core::entities::PerformerAppearance;
use quorum_core::{Edit, EditId, EngineConfig, EntityId, ManualClock, Role, UserId, VoteType};
use quorum_engine::{EditSubmission, Engine, EngineError};
use quorum_storage::SqliteStorage;

use crate::{RecordingNotifier, init_tracing};

/// An engine over a fresh store with a hand-driven clock and a few users:
/// one admin, one editor, and voters who may both edit and vote.
pub struct TestEnv {
    pub engine: Engine,
    pub clock: ManualClock,
    pub notifier: Arc<RecordingNotifier>,
    pub admin: UserId,
    pub editor: UserId,
    pub voters: Vec<UserId>,
    dir: Option<TempDir>,
}

pub const VOTER_COUNT: usize = 5;

fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0)
        .single()
        .unwrap_or_default()
}

impl TestEnv {
    pub fn new() -> Result<Self, EngineError> {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Result<Self, EngineError> {
        Self::build(SqliteStorage::open_in_memory()?, config, None)
    }

    /// Same as [`TestEnv::with_config`], backed by a database file in a
    /// temporary directory that lives as long as the env.
    pub fn on_disk(config: EngineConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("quorum.db");
        let storage = SqliteStorage::open(path_str(&path)?)?;
        Ok(Self::build(storage, config, Some(dir))?)
    }

    fn build(storage: SqliteStorage, config: EngineConfig, dir: Option<TempDir>) -> Result<Self, EngineError> {
        init_tracing();
        let clock = ManualClock::new(start_time());
        let notifier = Arc::new(RecordingNotifier::default());
        let mut engine = Engine::new(storage, config)
            .with_clock(Arc::new(clock.clone()))
            .with_notifier(notifier.clone());

        let admin = engine.register_user("admin", &[Role::Admin])?;
        let editor = engine.register_user("editor", &[Role::Edit])?;
        let voters = (1..=VOTER_COUNT)
            .map(|i| engine.register_user(&format!("voter{i}"), &[Role::Edit, Role::Vote]))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { engine, clock, notifier, admin, editor, voters, dir })
    }

    /// Database file of an on-disk env.
    pub fn db_path(&self) -> Option<PathBuf> {
        self.dir.as_ref().map(|d| d.path().join("quorum.db"))
    }

    /// Replaces the engine with a new one over the same database file.
    pub fn reopen(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        let path = self.db_path().ok_or("in-memory env cannot be reopened")?;
        let storage = SqliteStorage::open(path_str(&path)?)?;
        let config = self.engine.config().clone();
        self.engine = Engine::new(storage, config)
            .with_clock(Arc::new(self.clock.clone()))
            .with_notifier(self.notifier.clone());
        Ok(())
    }

    /// Opens another engine over the same database file, sharing the clock
    /// and notifier.
    pub fn second_engine(&self) -> Result<Engine, Box<dyn std::error::Error>> {
        let path = self.db_path().ok_or("in-memory env has no file to share")?;
        let storage = SqliteStorage::open(path_str(&path)?)?;
        Ok(Engine::new(storage, self.engine.config().clone())
            .with_clock(Arc::new(self.clock.clone()))
            .with_notifier(self.notifier.clone()))
    }

    pub fn advance(&self, by: Duration) {
        self.clock.advance(by);
    }

    /// Registers an extra user with exactly `roles`.
    pub fn user(&mut self, name: &str, roles: &[Role]) -> Result<UserId, EngineError> {
        self.engine.register_user(name, roles)
    }

    // Entity seeding. Creates are applied at submission unless the config
    // turns that off.

    pub fn submit(&mut self, submission: EditSubmission) -> Result<Edit, EngineError> {
        self.engine.create_edit(self.editor, submission)
    }

    fn created(&mut self, details: DetailsInput) -> Result<EntityId, EngineError> {
        let edit = self.submit(EditSubmission::create(details))?;
        edit.target_id
            .ok_or_else(|| EngineError::StateConflict(format!("create edit {} was not applied", edit.id)))
    }

    pub fn create_tag(&mut self, name: &str) -> Result<EntityId, EngineError> {
        self.created(DetailsInput::Tag(TagInput {
            name: name.to_string().into(),
            ..Default::default()
        }))
    }

    pub fn create_performer(&mut self, name: &str) -> Result<EntityId, EngineError> {
        self.created(DetailsInput::Performer(PerformerInput {
            name: name.to_string().into(),
            ..Default::default()
        }))
    }

    pub fn create_studio(&mut self, name: &str, parent: Option<EntityId>) -> Result<EntityId, EngineError> {
        self.created(DetailsInput::Studio(StudioInput {
            name: name.to_string().into(),
            parent_id: parent.map_or(FieldInput::Untouched, FieldInput::Value),
            ..Default::default()
        }))
    }

    pub fn create_scene(
        &mut self,
        title: &str,
        studio: Option<EntityId>,
        tags: &[EntityId],
        performers: &[(EntityId, Option<&str>)],
    ) -> Result<EntityId, EngineError> {
        self.created(DetailsInput::Scene(SceneInput {
            title: title.to_string().into(),
            studio_id: studio.map_or(FieldInput::Untouched, FieldInput::Value),
            tags: ListChange { added: tags.to_vec(), removed: vec![] },
            performers: ListChange {
                added: performers
                    .iter()
                    .map(|(id, as_name)| PerformerAppearance {
                        performer_id: *id,
                        as_name: as_name.map(str::to_string),
                    })
                    .collect(),
                removed: vec![],
            },
            ..Default::default()
        }))
    }

    /// Casts `vote` from the first `count` voters; returns the edit after the last vote.
    pub fn votes(&mut self, edit_id: EditId, vote: VoteType, count: usize) -> Result<Edit, EngineError> {
        let mut last = None;
        for voter in self.voters.iter().take(count) {
            last = Some(self.engine.vote_on_edit(*voter, edit_id, vote)?);
        }
        match last {
            Some(edit) => Ok(edit),
            None => self
                .engine
                .edit(edit_id)?
                .ok_or_else(|| EngineError::NotFound(format!("edit {edit_id}"))),
        }
    }

    pub fn edit(&self, edit_id: EditId) -> Result<Edit, EngineError> {
        self.engine
            .edit(edit_id)?
            .ok_or_else(|| EngineError::NotFound(format!("edit {edit_id}")))
    }
}

fn path_str(path: &Path) -> Result<&str, Box<dyn std::error::Error>> {
    Ok(path.to_str().ok_or("non-UTF-8 path")?)
}
