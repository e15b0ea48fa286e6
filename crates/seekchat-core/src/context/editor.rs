use crate::context::HistoryContext;

/// Read-only view of the host editor, queried at send time.
pub trait EditorContext: Send + Sync {
    fn current_file_path(&self) -> Option<String>;

    fn current_selection_text(&self) -> Option<String>;

    fn current_project_name(&self) -> Option<String>;
}

/// A host with no open editor or project.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoEditor;

impl EditorContext for NoEditor {
    fn current_file_path(&self) -> Option<String> {
        None
    }

    fn current_selection_text(&self) -> Option<String> {
        None
    }

    fn current_project_name(&self) -> Option<String> {
        None
    }
}

/// Fixed editor context, for hosts that know it up front.
#[derive(Debug, Clone, Default)]
pub struct StaticEditor {
    pub file: Option<String>,
    pub selection: Option<String>,
    pub project: Option<String>,
}

impl EditorContext for StaticEditor {
    fn current_file_path(&self) -> Option<String> {
        self.file.clone()
    }

    fn current_selection_text(&self) -> Option<String> {
        self.selection.clone()
    }

    fn current_project_name(&self) -> Option<String> {
        self.project.clone()
    }
}

/// Editor context captured for one request. Absent values are empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EditorSnapshot {
    pub filename: String,
    pub selection: String,
    pub project: String,
}

impl EditorSnapshot {
    pub fn capture(editor: &dyn EditorContext) -> Self {
        Self {
            filename: editor.current_file_path().unwrap_or_default(),
            selection: editor.current_selection_text().unwrap_or_default(),
            project: editor.current_project_name().unwrap_or_default(),
        }
    }

    /// The part of the snapshot stored with a history entry.
    pub fn history_context(&self) -> HistoryContext {
        HistoryContext {
            file: non_empty(&self.filename),
            project: non_empty(&self.project),
        }
    }
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}
