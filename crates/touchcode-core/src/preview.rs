//! Live preview composition.
//!
//! Turns a project's files into one self-contained document: an HTML
//! page with every stylesheet and script inlined, or a Markdown file
//! shown as preformatted text.
//!
//! Composition is a pure function of the file list. The same files in
//! the same order always produce byte-identical output, so callers can
//! compare documents to decide whether a redraw is needed.

use crate::model::File;

/// What kind of document the composer produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PreviewKind {
    Html,
    Markdown,
    #[default]
    None,
}

impl PreviewKind {
    /// Returns the badge label for this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            PreviewKind::Html => "html",
            PreviewKind::Markdown => "markdown",
            PreviewKind::None => "none",
        }
    }
}

/// A composed preview document.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Preview {
    pub kind: PreviewKind,
    pub content: String,
}

impl Preview {
    /// Returns true if there is something to render.
    pub fn is_empty(&self) -> bool {
        self.kind == PreviewKind::None
    }
}

const MARKDOWN_HEAD: &str = r#"<!DOCTYPE html>
<html>
<head>
<style>
body { font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; padding: 20px; max-width: 800px; margin: 0 auto; }
h1, h2, h3, h4, h5, h6 { color: #333; }
code { background: #f4f4f4; padding: 2px 4px; border-radius: 3px; }
pre { background: #f4f4f4; padding: 10px; border-radius: 5px; overflow-x: auto; }
blockquote { border-left: 4px solid #ddd; margin: 0; padding-left: 20px; }
</style>
</head>
<body>
<pre style="white-space: pre-wrap; font-family: inherit;">"#;

const MARKDOWN_TAIL: &str = "</pre>\n</body>\n</html>\n";

/// Composes the preview document for a set of files.
pub fn compose(files: &[File]) -> Preview {
    if let Some(html) = files.iter().find(|f| f.extension() == "html") {
        return Preview {
            kind: PreviewKind::Html,
            content: compose_html(&html.content, files),
        };
    }

    if let Some(markdown) = files.iter().find(|f| f.extension() == "md") {
        let mut content =
            String::with_capacity(MARKDOWN_HEAD.len() + markdown.content.len() + MARKDOWN_TAIL.len());
        content.push_str(MARKDOWN_HEAD);
        // Shown as raw text, not converted
        content.push_str(&markdown.content);
        content.push_str(MARKDOWN_TAIL);
        return Preview {
            kind: PreviewKind::Markdown,
            content,
        };
    }

    Preview::default()
}

fn compose_html(base: &str, files: &[File]) -> String {
    let mut html = base.to_string();

    if let Some(css) = joined(files, "css") {
        let style = format!("<style>\n{css}\n</style>");
        html = if html.contains("</head>") {
            html.replacen("</head>", &format!("{style}\n</head>"), 1)
        } else {
            format!("<head>{style}</head>{html}")
        };
    }

    if let Some(js) = joined(files, "js") {
        let script = format!("<script>\n{js}\n</script>");
        html = if html.contains("</body>") {
            html.replacen("</body>", &format!("{script}\n</body>"), 1)
        } else {
            format!("{html}\n{script}")
        };
    }

    html
}

/// Joins the contents of every file with `ext`, in collection order.
fn joined(files: &[File], ext: &str) -> Option<String> {
    let parts: Vec<&str> = files
        .iter()
        .filter(|f| f.extension() == ext)
        .map(|f| f.content.as_str())
        .collect();
    (!parts.is_empty()).then(|| parts.join("\n"))
}

/// Somewhere a composed document can be displayed.
///
/// The embedded preview pane and an external browser window both
/// implement this.
pub trait RenderSurface {
    /// Blanks the surface.
    fn clear(&mut self);

    /// Loads a document, replacing whatever was shown.
    fn render(&mut self, document: &str);
}

/// Preview pane state: visibility and the last composed document.
#[derive(Debug, Clone, Default)]
pub struct PreviewPanel {
    visible: bool,
    current: Preview,
    revision: u64,
}

impl PreviewPanel {
    /// Creates a panel.
    pub fn new(visible: bool) -> Self {
        Self {
            visible,
            ..Self::default()
        }
    }

    /// Returns true if the panel is shown.
    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// Shows or hides the panel.
    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    /// Returns the last composed document.
    pub fn current(&self) -> &Preview {
        &self.current
    }

    /// Bumped every time the composed document actually changes.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Re-composes from `files`. Returns true if the document changed.
    pub fn regenerate(&mut self, files: &[File]) -> bool {
        let next = compose(files);
        if next == self.current {
            return false;
        }
        self.current = next;
        self.revision += 1;
        true
    }

    /// Drops the composed document.
    pub fn reset(&mut self) {
        if !self.current.is_empty() {
            self.current = Preview::default();
            self.revision += 1;
        }
    }

    /// Re-composes and reloads `surface` from scratch.
    pub fn refresh(&mut self, files: &[File], surface: &mut dyn RenderSurface) {
        self.regenerate(files);
        surface.clear();
        if !self.current.is_empty() {
            surface.render(&self.current.content);
        }
    }

    /// Hands the current document, unchanged, to a new surface.
    ///
    /// Returns false when there is nothing to show.
    pub fn open_externally(&self, surface: &mut dyn RenderSurface) -> bool {
        if self.current.is_empty() {
            return false;
        }
        surface.render(&self.current.content);
        true
    }
}
