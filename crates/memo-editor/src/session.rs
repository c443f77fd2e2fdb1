//! One open editor: buffer, draft, attachments and the autosave scheduler
//! wired to the host's stores.

use async_trait::async_trait;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use crate::autosave::{AutoSaveScheduler, AutoSaveTarget, DEBOUNCE_WINDOW};
use crate::buffer::EditorBuffer;
use crate::command_processor::{
    code_fence_affixes, shift_cursor, toggle_checkbox_line, CommandProcessor, LineCommand,
    DEFAULT_TAB_WIDTH,
};
use crate::config::{Config, UserRole};
use crate::content_cache::ContentCache;
use crate::draft::{
    BlobUpload, Draft, Note, NoteId, Relation, RelationKind, Resource, Visibility, UNKNOWN_ID,
};
use crate::error::SaveError;
use crate::status_manager::{AutoSaveIndicator, StatusManager};
use crate::store::{upsert_content_tags, Services};

#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Note being edited; `None` composes a new note.
    pub memo_id: Option<NoteId>,
    /// Draft cache slot; `None` disables the draft cache.
    pub cache_key: Option<String>,
    /// Relations the editor starts with (e.g. a comment composer).
    pub relations: Vec<Relation>,
    pub enable_autosave: bool,
    pub enable_continue_editing: bool,
    pub autosave_window: Duration,
    pub tab_width: usize,
    pub default_visibility: Visibility,
    pub disable_public_memos: bool,
    pub role: UserRole,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            memo_id: None,
            cache_key: None,
            relations: Vec::new(),
            enable_autosave: false,
            enable_continue_editing: false,
            autosave_window: DEBOUNCE_WINDOW,
            tab_width: DEFAULT_TAB_WIDTH,
            default_visibility: Visibility::Private,
            disable_public_memos: false,
            role: UserRole::User,
        }
    }
}

impl SessionOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            enable_autosave: config.editor.autosave,
            enable_continue_editing: config.editor.continue_editing,
            autosave_window: config.editor.autosave_window(),
            tab_width: config.editor.tab_width,
            default_visibility: config.memo.default_visibility,
            disable_public_memos: config.memo.disable_public_memos,
            role: config.memo.role,
            ..Self::default()
        }
    }

    pub fn for_note(mut self, id: NoteId) -> Self {
        self.memo_id = Some(id).filter(|id| *id != UNKNOWN_ID);
        self
    }

    pub fn with_cache_key(mut self, key: impl Into<String>) -> Self {
        self.cache_key = Some(key.into());
        self
    }
}

/// Autosave target of a session: patches the edited note with the current
/// draft and upserts its tags.
pub struct SessionTarget {
    memo_id: Option<NoteId>,
    draft: Arc<RwLock<Draft>>,
    services: Services,
}

#[async_trait]
impl AutoSaveTarget for SessionTarget {
    type Snapshot = Draft;
    type Baseline = Note;

    fn baseline(&self) -> Option<Note> {
        self.services.notes.cached(self.memo_id?)
    }

    fn current(&self, _baseline: &Note) -> Draft {
        self.draft
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn has_changed(&self, current: &Draft, baseline: &Note) -> bool {
        current.has_changed(baseline)
    }

    async fn commit(&self, snapshot: Draft, baseline: Note) -> Result<Note, SaveError> {
        let note = self.services.notes.patch(baseline.id, &snapshot).await?;
        upsert_content_tags(self.services.tags.as_ref(), &snapshot.content).await?;
        Ok(note)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyOutcome {
    Handled,
    /// Ctrl/Meta+Enter: the host should call [`EditorSession::save`].
    SaveRequested,
    Ignored,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SaveOutcome {
    /// Another request was still running.
    Ignored,
    Saved(Note),
    Failed(SaveError),
}

pub struct EditorSession {
    options: SessionOptions,
    services: Services,
    buffer: EditorBuffer,
    draft: Arc<RwLock<Draft>>,
    resources: Vec<Resource>,
    cache: ContentCache,
    processor: CommandProcessor,
    autosave: AutoSaveScheduler<SessionTarget>,
    status: StatusManager,
    in_composition: bool,
    is_requesting: bool,
    is_uploading: bool,
    has_content: bool,
    closed: bool,
}

impl EditorSession {
    /// Opens an editor. Content comes from the draft cache when a cached
    /// draft exists, otherwise from the edited note.
    pub async fn open(
        options: SessionOptions,
        services: Services,
        cache: ContentCache,
    ) -> Result<Self, SaveError> {
        let mut visibility = options.default_visibility;
        if options.disable_public_memos && visibility == Visibility::Public {
            visibility = Visibility::Private;
        }

        let cached_content = options
            .cache_key
            .as_deref()
            .and_then(|key| cache.get(key))
            .filter(|content| !content.is_empty())
            .map(str::to_string);

        let mut draft = Draft {
            content: cached_content.clone().unwrap_or_default(),
            visibility,
            resource_ids: Vec::new(),
            relations: options.relations.clone(),
        };
        let mut resources = Vec::new();

        if let Some(id) = options.memo_id {
            match services.notes.get(id).await? {
                Some(note) => {
                    draft.visibility = note.visibility;
                    draft.relations = note.relations.clone();
                    resources = note.resources.clone();
                    if cached_content.is_none() {
                        draft.content = note.content.clone();
                    }
                }
                None => log::warn!("Note {} not found, editing an empty draft", id),
            }
        }
        draft.resource_ids = resources.iter().map(|resource| resource.id).collect();

        let mut buffer = EditorBuffer::new();
        buffer.set_content(&draft.content);
        let has_content = !buffer.is_empty();

        let draft = Arc::new(RwLock::new(draft));
        let target = Arc::new(SessionTarget {
            memo_id: options.memo_id,
            draft: draft.clone(),
            services: services.clone(),
        });
        let autosave = AutoSaveScheduler::new(target, options.enable_autosave)
            .with_window(options.autosave_window);

        log::info!(
            "Opened editor for {} (autosave: {})",
            options
                .memo_id
                .map_or_else(|| "a new note".to_string(), |id| format!("note {}", id)),
            options.enable_autosave
        );

        Ok(Self {
            processor: CommandProcessor::new(options.tab_width),
            options,
            services,
            buffer,
            draft,
            resources,
            cache,
            autosave,
            status: StatusManager::new(),
            in_composition: false,
            is_requesting: false,
            is_uploading: false,
            has_content,
            closed: false,
        })
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    pub fn memo_id(&self) -> Option<NoteId> {
        self.options.memo_id
    }

    pub fn buffer(&self) -> &EditorBuffer {
        &self.buffer
    }

    pub fn buffer_mut(&mut self) -> &mut EditorBuffer {
        &mut self.buffer
    }

    pub fn content(&self) -> String {
        self.buffer.content()
    }

    pub fn draft(&self) -> Draft {
        self.read_draft().clone()
    }

    pub fn resources(&self) -> &[Resource] {
        &self.resources
    }

    pub fn cache(&self) -> &ContentCache {
        &self.cache
    }

    pub fn status(&self) -> &StatusManager {
        &self.status
    }

    pub fn status_mut(&mut self) -> &mut StatusManager {
        &mut self.status
    }

    /// Cloneable scheduler handle, for hosts that drive ticks on their own
    /// tasks.
    pub fn autosave(&self) -> &AutoSaveScheduler<SessionTarget> {
        &self.autosave
    }

    pub fn has_content(&self) -> bool {
        self.has_content
    }

    pub fn is_requesting(&self) -> bool {
        self.is_requesting || self.autosave.is_saving()
    }

    pub fn is_uploading(&self) -> bool {
        self.is_uploading
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn in_composition(&self) -> bool {
        self.in_composition
    }

    pub fn composition_start(&mut self) {
        self.in_composition = true;
    }

    pub fn composition_end(&mut self) {
        self.in_composition = false;
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> KeyOutcome {
        let is_meta = key
            .modifiers
            .intersects(KeyModifiers::CONTROL | KeyModifiers::META | KeyModifiers::SUPER);

        match key.code {
            KeyCode::Enter if is_meta => KeyOutcome::SaveRequested,
            // The IME owns Enter while composing.
            KeyCode::Enter if self.in_composition => KeyOutcome::Ignored,
            KeyCode::Enter => {
                let edit = self.processor.execute(
                    LineCommand::ContinueList,
                    &self.buffer.content(),
                    self.buffer.cursor(),
                );
                match edit {
                    Some(edit) => self.buffer.apply(edit),
                    None => self.buffer.insert_char('\n'),
                }
                self.handle_content_change();
                KeyOutcome::Handled
            }
            KeyCode::Tab => {
                if let Some((start, _)) = self.buffer.selection() {
                    self.buffer.set_cursor(start);
                }
                self.buffer.clear_selection();
                self.run_command(LineCommand::Indent);
                KeyOutcome::Handled
            }
            KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.buffer.insert_char(c);
                self.handle_content_change();
                KeyOutcome::Handled
            }
            KeyCode::Backspace => {
                self.buffer.delete_char_backward();
                self.handle_content_change();
                KeyOutcome::Handled
            }
            _ => KeyOutcome::Ignored,
        }
    }

    /// Types `text` at the cursor, as a paste would.
    pub fn insert_text(&mut self, text: &str) {
        self.buffer.insert_text(text, "", "");
        self.handle_content_change();
    }

    /// Toggles the checkbox of the line the cursor is on.
    pub fn toggle_checkbox(&mut self) {
        let line_no = self.buffer.cursor_line();
        let Some(line) = self.buffer.line(line_no) else {
            return;
        };
        let cursor = self.buffer.cursor();
        let (new_line, shift) = toggle_checkbox_line(&line);

        self.buffer.set_line(line_no, &new_line);
        let line_start = self.buffer.line_start(line_no);
        self.buffer.set_cursor(shift_cursor(cursor, shift, line_start));
        self.handle_content_change();
    }

    pub fn insert_code_fence(&mut self) {
        let (prefix, suffix) = code_fence_affixes(&self.buffer.text_before_cursor());
        self.buffer.clear_selection();
        self.buffer.insert_text("", prefix, suffix);
        self.handle_content_change();
    }

    pub fn insert_tag(&mut self, tag: &str) {
        self.buffer.insert_text(&format!("#{} ", tag), "", "");
        self.handle_content_change();
    }

    fn run_command(&mut self, command: LineCommand) {
        let content = self.buffer.content();
        if let Some(edit) = self.processor.execute(command, &content, self.buffer.cursor()) {
            self.buffer.apply(edit);
            self.handle_content_change();
        }
    }

    /// Syncs the draft with the buffer after every edit. Non-empty content
    /// is cached and may schedule an autosave; empty content drops the
    /// cached draft.
    pub fn handle_content_change(&mut self) {
        let content = self.buffer.content();
        self.has_content = !content.is_empty();
        self.write_draft().content = content.clone();

        if content.is_empty() {
            if let Some(key) = &self.options.cache_key {
                self.cache.remove(key);
            }
        } else {
            if let Some(key) = &self.options.cache_key {
                self.cache.set(key, &content);
            }
            self.autosave.request_save();
        }
    }

    pub fn visibility(&self) -> Visibility {
        self.read_draft().visibility
    }

    /// Whether `visibility` may be picked. PUBLIC is off for regular users
    /// when public memos are disabled.
    pub fn is_visibility_selectable(&self, visibility: Visibility) -> bool {
        if visibility == Visibility::Public && !self.options.role.is_admin_or_host() {
            return !self.options.disable_public_memos;
        }
        true
    }

    pub fn set_visibility(&mut self, visibility: Visibility) {
        self.write_draft().visibility = visibility;
    }

    /// Prepends REFERENCE relations to `ids`, dropping self references and
    /// keeping the first relation per related note.
    pub fn add_relations(&mut self, ids: &[NoteId]) {
        let own_id = self.options.memo_id.unwrap_or(UNKNOWN_ID);
        let mut draft = self.write_draft();
        let mut relations: Vec<Relation> = ids
            .iter()
            .map(|id| Relation::reference(own_id, *id))
            .chain(draft.relations.drain(..))
            .filter(|relation| relation.related_memo_id != own_id)
            .collect();

        let mut seen = std::collections::HashSet::new();
        relations.retain(|relation| seen.insert(relation.related_memo_id));
        draft.relations = relations;
    }

    pub fn set_relations(&mut self, relations: Vec<Relation>) {
        self.write_draft().relations = relations;
    }

    pub fn relations(&self) -> Vec<Relation> {
        self.read_draft().relations.clone()
    }

    /// Relations shown in the editor: outgoing references of this note.
    pub fn reference_relations(&self) -> Vec<Relation> {
        let draft = self.read_draft();
        draft
            .relations
            .iter()
            .filter(|relation| relation.kind == RelationKind::Reference)
            .filter(|relation| match self.options.memo_id {
                Some(id) => relation.memo_id == id && relation.related_memo_id != id,
                None => true,
            })
            .cloned()
            .collect()
    }

    pub fn set_resources(&mut self, resources: Vec<Resource>) {
        self.resources = resources;
        self.sync_resource_ids();
    }

    /// Uploads `blobs` one after another. Failures are reported as error
    /// notifications and skipped; the attachment list grows only after all
    /// uploads have resolved.
    pub async fn upload_files(&mut self, blobs: Vec<BlobUpload>) -> Vec<Resource> {
        let mut uploaded = Vec::new();
        for blob in blobs {
            let filename = blob.filename.clone();
            self.is_uploading = true;
            let result = self.services.blobs.upload(blob).await;
            self.is_uploading = false;
            self.autosave.request_save();

            let resource = match result {
                Ok(resource) => resource,
                Err(e) => {
                    self.status.set_error(format!("Failed to upload {}: {}", filename, e));
                    continue;
                }
            };

            let resource = match self.options.memo_id {
                Some(id) => match self.services.blobs.attach(resource.id, id).await {
                    Ok(attached) => attached,
                    Err(e) => {
                        self.status
                            .set_error(format!("Failed to attach {}: {}", filename, e));
                        resource
                    }
                },
                None => resource,
            };
            uploaded.push(resource);
        }

        if !uploaded.is_empty() {
            self.resources.extend(uploaded.iter().cloned());
            self.sync_resource_ids();
            self.autosave.request_save();
        }
        uploaded
    }

    pub fn allow_save(&self) -> bool {
        (self.has_content || !self.resources.is_empty())
            && !self.is_uploading
            && !self.is_requesting()
    }

    /// Manual save. Patches the edited note or creates a new one. A
    /// successful save empties the editor and its cached draft; the session
    /// is closed unless `keep_editing` is set.
    pub async fn save(&mut self, keep_editing: bool) -> SaveOutcome {
        if self.is_requesting || !self.autosave.flush_if_idle() {
            log::debug!("Save ignored: a request is in flight");
            return SaveOutcome::Ignored;
        }
        self.is_requesting = true;

        let content = self.buffer.content();
        let draft = {
            let mut draft = self.draft();
            draft.content = content.clone();
            draft
        };
        let result = match self.options.memo_id {
            Some(id) => match self.services.notes.get(id).await {
                Ok(Some(previous)) => self.services.notes.patch(previous.id, &draft).await,
                Ok(None) => Err(SaveError::NotFound(id)),
                Err(e) => Err(e),
            },
            None => self.services.notes.create(&draft, keep_editing).await,
        };

        let outcome = match result {
            Ok(note) => {
                log::info!("Saved note {}", note.id);
                self.buffer.set_content("");
                self.handle_content_change();
                SaveOutcome::Saved(note)
            }
            Err(e) => {
                self.status.set_error(format!("Failed to save: {}", e));
                SaveOutcome::Failed(e)
            }
        };
        self.is_requesting = false;

        if let Err(e) = upsert_content_tags(self.services.tags.as_ref(), &content).await {
            self.status.set_error(format!("Failed to update tags: {}", e));
        }

        self.resources.clear();
        self.sync_resource_ids();
        if !keep_editing {
            self.closed = true;
        }
        outcome
    }

    /// Advances the autosave scheduler; see [`AutoSaveScheduler::tick`].
    pub async fn tick(&mut self) -> Option<Result<Note, SaveError>> {
        self.status.update();
        self.autosave.tick().await
    }

    pub async fn retry_autosave(&self) -> Result<Note, SaveError> {
        self.autosave.retry().await
    }

    /// Autosave indicator text; empty when autosave is disabled or idle.
    pub fn autosave_indicator(&self) -> AutoSaveIndicator {
        if !self.autosave.is_enabled() {
            return AutoSaveIndicator::Hidden;
        }
        AutoSaveIndicator::from_status(&self.autosave.status())
    }

    /// Writes the draft cache to disk.
    pub async fn persist_cache(&mut self) -> anyhow::Result<()> {
        self.cache.persist().await
    }

    fn sync_resource_ids(&mut self) {
        let ids = self.resources.iter().map(|resource| resource.id).collect();
        self.write_draft().resource_ids = ids;
    }

    fn read_draft(&self) -> RwLockReadGuard<'_, Draft> {
        self.draft.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_draft(&self) -> RwLockWriteGuard<'_, Draft> {
        self.draft.write().unwrap_or_else(PoisonError::into_inner)
    }
}
