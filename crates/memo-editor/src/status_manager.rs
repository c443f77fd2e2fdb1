use std::time::{Duration, Instant};

use crate::autosave::AutoSaveStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone)]
pub struct StatusMessage {
    pub content: String,
    pub message_type: MessageType,
    pub created_at: Instant,
    pub auto_clear_duration: Option<Duration>,
}

impl StatusMessage {
    pub fn new(content: String, message_type: MessageType) -> Self {
        Self {
            content,
            message_type,
            created_at: Instant::now(),
            auto_clear_duration: Self::default_duration_for_type(message_type),
        }
    }

    pub fn with_duration(content: String, message_type: MessageType, duration: Duration) -> Self {
        Self {
            auto_clear_duration: Some(duration),
            ..Self::new(content, message_type)
        }
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Instant::now())
    }

    pub fn is_expired_at(&self, now: Instant) -> bool {
        self.auto_clear_duration
            .is_some_and(|duration| now.saturating_duration_since(self.created_at) > duration)
    }

    fn default_duration_for_type(message_type: MessageType) -> Option<Duration> {
        match message_type {
            MessageType::Info => Some(Duration::from_secs(3)),
            MessageType::Success => Some(Duration::from_secs(2)),
            MessageType::Warning => Some(Duration::from_secs(5)),
            MessageType::Error => Some(Duration::from_secs(7)),
        }
    }
}

/// What the autosave indicator shows next to the save button.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AutoSaveIndicator {
    Hidden,
    /// A save is scheduled; `dots` grows by one per elapsed tick.
    Pending { dots: usize },
    Saving { dots: usize },
    Failed { message: String },
}

impl AutoSaveIndicator {
    pub fn from_status(status: &AutoSaveStatus) -> Self {
        if let Some(error) = &status.last_error {
            return Self::Failed {
                message: error.to_string(),
            };
        }
        let dots = status.pending_ticks as usize + 1;
        if status.is_saving {
            Self::Saving { dots }
        } else if status.pending_ticks > 0 {
            Self::Pending { dots }
        } else {
            Self::Hidden
        }
    }

    pub fn render(&self) -> String {
        match self {
            Self::Hidden => String::new(),
            Self::Pending { dots } => format!("pending{}", ".".repeat(*dots)),
            Self::Saving { dots } => format!("saving{}", ".".repeat(*dots)),
            Self::Failed { message } => format!("! autosave failed: {}", message),
        }
    }
}

/// Transient notifications shown to the user (upload and save failures,
/// confirmations).
#[derive(Debug, Clone, Default)]
pub struct StatusManager {
    current_message: Option<StatusMessage>,
}

impl StatusManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_info(&mut self, message: impl Into<String>) {
        self.set(message.into(), MessageType::Info);
    }

    pub fn set_success(&mut self, message: impl Into<String>) {
        self.set(message.into(), MessageType::Success);
    }

    pub fn set_warning(&mut self, message: impl Into<String>) {
        self.set(message.into(), MessageType::Warning);
    }

    pub fn set_error(&mut self, message: impl Into<String>) {
        let message = message.into();
        log::error!("{}", message);
        self.set(message, MessageType::Error);
    }

    fn set(&mut self, content: String, message_type: MessageType) {
        self.current_message = Some(StatusMessage::new(content, message_type));
    }

    pub fn clear(&mut self) {
        self.current_message = None;
    }

    /// Drops the current message once it has expired.
    pub fn update(&mut self) {
        if self
            .current_message
            .as_ref()
            .is_some_and(StatusMessage::is_expired)
        {
            self.current_message = None;
        }
    }

    pub fn current_message(&self) -> Option<&StatusMessage> {
        self.current_message.as_ref()
    }

    pub fn has_message(&self) -> bool {
        self.current_message.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SaveError;

    #[test]
    fn test_message_types() {
        let mut manager = StatusManager::new();
        assert!(!manager.has_message());

        manager.set_info("Info message");
        let message = manager.current_message().unwrap();
        assert_eq!(message.message_type, MessageType::Info);
        assert_eq!(message.content, "Info message");

        manager.set_error("Upload failed");
        assert_eq!(
            manager.current_message().unwrap().message_type,
            MessageType::Error
        );

        manager.clear();
        assert!(!manager.has_message());
    }

    #[test]
    fn test_message_expiry() {
        let message = StatusMessage::with_duration(
            "Test".to_string(),
            MessageType::Info,
            Duration::from_millis(5),
        );
        assert!(!message.is_expired_at(message.created_at));
        assert!(message.is_expired_at(message.created_at + Duration::from_millis(10)));
    }

    #[test]
    fn test_update_keeps_fresh_message() {
        let mut manager = StatusManager::new();
        manager.set_warning("Careful");
        manager.update();
        assert!(manager.has_message());
    }

    #[test]
    fn test_indicator_states() {
        let idle = AutoSaveStatus::default();
        assert_eq!(AutoSaveIndicator::from_status(&idle), AutoSaveIndicator::Hidden);
        assert_eq!(AutoSaveIndicator::from_status(&idle).render(), "");

        let pending = AutoSaveStatus {
            pending_ticks: 2,
            ..AutoSaveStatus::default()
        };
        assert_eq!(AutoSaveIndicator::from_status(&pending).render(), "pending...");

        let saving = AutoSaveStatus {
            pending_ticks: 0,
            is_saving: true,
            last_error: None,
        };
        assert_eq!(
            AutoSaveIndicator::from_status(&saving),
            AutoSaveIndicator::Saving { dots: 1 }
        );

        let failed = AutoSaveStatus {
            pending_ticks: 3,
            is_saving: false,
            last_error: Some(SaveError::Storage("disk full".to_string())),
        };
        let indicator = AutoSaveIndicator::from_status(&failed);
        assert!(matches!(indicator, AutoSaveIndicator::Failed { .. }));
        assert!(indicator.render().contains("disk full"));
    }
}
