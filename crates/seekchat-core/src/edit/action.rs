use std::path::PathBuf;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EditKind {
    #[default]
    None,
    ReplaceCurrentBuffer,
    WriteFile,
}

/// A file modification requested by a response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EditAction {
    pub kind: EditKind,
    pub target_path: Option<PathBuf>,
    pub new_content: String,
}

impl EditAction {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn replace_current(content: impl Into<String>) -> Self {
        Self {
            kind: EditKind::ReplaceCurrentBuffer,
            target_path: None,
            new_content: content.into(),
        }
    }

    pub fn write_file(path: impl Into<PathBuf>, content: impl Into<String>) -> Self {
        Self {
            kind: EditKind::WriteFile,
            target_path: Some(path.into()),
            new_content: content.into(),
        }
    }

    pub fn is_none(&self) -> bool {
        self.kind == EditKind::None
    }

    /// Interpret the `action` / `file` / `new_content` response fields.
    ///
    /// A directive without `new_content` has nothing to apply and yields
    /// [`EditKind::None`]. A write without a file is kept so the applier can
    /// report the missing target.
    pub fn from_directive(
        action: Option<&str>,
        file: Option<&str>,
        new_content: Option<&str>,
    ) -> Self {
        let Some(action) = action.map(|a| a.trim().to_ascii_lowercase()) else {
            return Self::none();
        };
        let Some(content) = new_content else {
            tracing::debug!("Ignoring '{}' action without new_content", action);
            return Self::none();
        };

        match action.as_str() {
            "replace" | "replace_current" | "edit_current" | "edit" => {
                Self::replace_current(content)
            }
            "write" | "write_file" | "create_file" => Self {
                kind: EditKind::WriteFile,
                target_path: file
                    .map(str::trim)
                    .filter(|f| !f.is_empty())
                    .map(PathBuf::from),
                new_content: content.to_string(),
            },
            "" | "none" => Self::none(),
            other => {
                tracing::warn!("Unknown edit action '{}'", other);
                Self::none()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directive_replace() {
        let action = EditAction::from_directive(Some("Replace"), None, Some("fn main() {}"));
        assert_eq!(action, EditAction::replace_current("fn main() {}"));
    }

    #[test]
    fn test_directive_write_keeps_missing_target() {
        let action = EditAction::from_directive(Some("write_file"), Some("  "), Some("x"));
        assert_eq!(action.kind, EditKind::WriteFile);
        assert!(action.target_path.is_none());
    }

    #[test]
    fn test_directive_without_content_is_none() {
        assert!(EditAction::from_directive(Some("write"), Some("a.txt"), None).is_none());
        assert!(EditAction::from_directive(None, Some("a.txt"), Some("x")).is_none());
        assert!(EditAction::from_directive(Some("explode"), None, Some("x")).is_none());
    }
}
