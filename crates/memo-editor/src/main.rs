use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use log::LevelFilter;
use std::env;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

use memo_editor::autosave::TICK_INTERVAL;
use memo_editor::draft::{BlobUpload, NoteId};
use memo_editor::status_manager::AutoSaveIndicator;
use memo_editor::{
    Config, ContentCache, EditorSession, FileStore, SaveOutcome, Services, SessionOptions,
    Visibility,
};

#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logger with debug fallback for development
    let mut logger = env_logger::Builder::from_default_env();
    if std::env::var_os("RUST_LOG").is_none() {
        logger.filter_level(LevelFilter::Info);
        logger.filter_module("memo_editor", LevelFilter::Debug);
    }
    logger.init();

    let config = match Config::load().await {
        Ok(config) => config,
        Err(e) => {
            log::error!("Failed to load config, using defaults: {}", e);
            Config::default()
        }
    };

    let args: Vec<String> = env::args().collect();
    let memo_id = match args.get(1) {
        Some(arg) => Some(
            arg.parse::<NoteId>()
                .map_err(|e| anyhow::anyhow!("Invalid note id '{}': {}", arg, e))?,
        ),
        None => None,
    };

    let data_dir = config.data_dir()?;
    let store = Arc::new(FileStore::open(&data_dir).await?);
    let cache = ContentCache::load(data_dir.join("drafts.json")).await?;

    let mut options = SessionOptions::from_config(&config);
    options = match memo_id {
        Some(id) => options.for_note(id).with_cache_key(format!("memo-{}", id)),
        None => options.with_cache_key("home"),
    };
    let mut session = EditorSession::open(options, Services::from_backend(store), cache).await?;
    println!("{}", session.content());

    let res = run(&mut session, config.editor.continue_editing).await;

    if let Err(e) = session.persist_cache().await {
        log::warn!("Failed to persist draft cache: {}", e);
    }

    if let Err(err) = res {
        log::error!("Application error: {}", err);
        eprintln!("memo-editor: {}", err);
        return Err(err);
    }

    log::info!("Editor loop ended");
    Ok(())
}

async fn run(session: &mut EditorSession, continue_editing: bool) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut ticker = tokio::time::interval(TICK_INTERVAL);
    let mut last_indicator = AutoSaveIndicator::Hidden;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                session.status_mut().update();

                // Fires run off the input path so typing is never blocked.
                let autosave = session.autosave().clone();
                tokio::spawn(async move {
                    if let Some(Err(e)) = autosave.tick().await {
                        log::warn!("Autosave tick failed: {}", e);
                    }
                });

                let indicator = session.autosave_indicator();
                if indicator != last_indicator {
                    println!("[{}]", indicator.render());
                    last_indicator = indicator;
                }

                if let Err(e) = session.persist_cache().await {
                    log::warn!("Failed to persist draft cache: {}", e);
                }
            }
            line = lines.next_line() => {
                let Some(line) = line? else {
                    log::info!("Input closed");
                    break;
                };
                if handle_line(session, &line, continue_editing).await? == Flow::Quit {
                    break;
                }
                if let Some(message) = session.status().current_message() {
                    println!("{}", message.content);
                }
                session.status_mut().clear();
            }
        }
    }
    Ok(())
}

async fn handle_line(session: &mut EditorSession, line: &str, continue_editing: bool) -> Result<Flow> {
    let Some(command) = line.strip_prefix(':') else {
        for c in line.chars() {
            session.handle_key(KeyEvent::new(KeyCode::Char(c), KeyModifiers::NONE));
        }
        session.handle_key(KeyEvent::new(KeyCode::Enter, KeyModifiers::NONE));
        return Ok(Flow::Continue);
    };

    let parts: Vec<&str> = command.split_whitespace().collect();
    let Some(name) = parts.first() else {
        return Ok(Flow::Continue);
    };

    match *name {
        "check" => session.toggle_checkbox(),
        "code" => session.insert_code_fence(),
        "tag" => match parts.get(1) {
            Some(tag) => session.insert_tag(tag.trim_start_matches('#')),
            None => session.status_mut().set_warning("Usage: :tag NAME"),
        },
        "visibility" => match parts.get(1).and_then(|v| Visibility::parse(v)) {
            Some(visibility) if session.is_visibility_selectable(visibility) => {
                session.set_visibility(visibility);
                session.status_mut().set_info(format!("Visibility: {:?}", visibility));
            }
            Some(visibility) => session
                .status_mut()
                .set_warning(format!("{:?} is not available", visibility)),
            None => {
                let names: Vec<&str> = Visibility::ALL.iter().map(|v| v.as_str()).collect();
                session
                    .status_mut()
                    .set_warning(format!("Usage: :visibility {}", names.join("|")))
            }
        },
        "attach" => match parts.get(1) {
            Some(path) => attach_file(session, Path::new(path)).await,
            None => session.status_mut().set_warning("Usage: :attach PATH"),
        },
        "retry" => match session.retry_autosave().await {
            Ok(note) => session
                .status_mut()
                .set_success(format!("Autosaved note {}", note.id)),
            Err(e) => session.status_mut().set_error(format!("Retry failed: {}", e)),
        },
        "p" | "print" => println!("{}", session.content()),
        "w" => return save(session, continue_editing).await,
        "wq" => {
            save(session, false).await?;
            return Ok(Flow::Quit);
        }
        "q" => return Ok(Flow::Quit),
        other => session
            .status_mut()
            .set_warning(format!("Unknown command: {}", other)),
    }
    Ok(Flow::Continue)
}

async fn save(session: &mut EditorSession, keep_editing: bool) -> Result<Flow> {
    if !session.allow_save() {
        session.status_mut().set_warning("Nothing to save");
        return Ok(Flow::Continue);
    }
    match session.save(keep_editing).await {
        SaveOutcome::Saved(note) => session
            .status_mut()
            .set_success(format!("Saved note {}", note.id)),
        SaveOutcome::Ignored => session.status_mut().set_info("A save is already running"),
        // Already reported by the session.
        SaveOutcome::Failed(_) => {}
    }
    if session.is_closed() {
        return Ok(Flow::Quit);
    }
    Ok(Flow::Continue)
}

async fn attach_file(session: &mut EditorSession, path: &Path) {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) => {
            session
                .status_mut()
                .set_error(format!("Failed to read {}: {}", path.display(), e));
            return;
        }
    };
    let filename = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "attachment".to_string());
    let blob = BlobUpload {
        filename,
        mime_type: "application/octet-stream".to_string(),
        bytes,
    };
    let uploaded = session.upload_files(vec![blob]).await;
    if let Some(resource) = uploaded.first() {
        session
            .status_mut()
            .set_success(format!("Attached {} ({} bytes)", resource.filename, resource.size));
    }
}
