//! Terminal-aware exception rendering.
//!
//! A colored-vs-plain split: a TTY gets ANSI color and a caret under the
//! faulting column, anything else gets plain text. Both paths share the
//! same code-context slicing.

use std::io::IsTerminal;

use colored::Colorize;

use super::Exception;

pub struct Renderer {
    color: bool,
}

impl Renderer {
    /// Build a renderer that colors output only when stderr is a TTY.
    pub fn for_stderr() -> Self {
        Renderer {
            color: std::io::stderr().is_terminal(),
        }
    }

    pub fn plain() -> Self {
        Renderer { color: false }
    }

    /// Render an exception, optionally with the surrounding source context.
    pub fn render(&self, exc: &Exception, source: Option<&str>) -> String {
        let mut out = String::new();
        self.write_header(&mut out, exc);
        if let Some(source) = source {
            self.write_context(&mut out, exc, source);
        }
        if let Some(hint) = &exc.hint {
            for suggestion in &hint.suggestions {
                out.push('\n');
                out.push_str(&self.style_hint(suggestion));
            }
        }
        for frame in exc.stack.iter().rev() {
            out.push('\n');
            out.push_str(&format!(
                "  at {} ({}:{})",
                frame.function, frame.file, frame.position.line
            ));
        }
        out
    }

    fn write_header(&self, out: &mut String, exc: &Exception) {
        let header = format!("{}: {}", exc.kind, exc.message);
        out.push_str(&if self.color {
            header.red().bold().to_string()
        } else {
            header
        });
        out.push_str(&format!(" ({}:{})", exc.file, exc.line));
    }

    fn write_context(&self, out: &mut String, exc: &Exception, source: &str) {
        let Some(line_text) = source.lines().nth(exc.line.saturating_sub(1)) else {
            return;
        };
        out.push('\n');
        out.push_str(&format!("{:>5} | {line_text}", exc.line));
        if let Some(col) = exc.column {
            out.push('\n');
            let marker = format!("{}^", " ".repeat(col.saturating_sub(1) + 8));
            out.push_str(&if self.color {
                marker.yellow().to_string()
            } else {
                marker
            });
        }
    }

    fn style_hint(&self, suggestion: &str) -> String {
        if self.color {
            suggestion.cyan().to_string()
        } else {
            suggestion.to_owned()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::{type_error, Hint, Position};

    #[test]
    fn plain_render_has_no_escape_codes() {
        let exc = type_error("oops").at("a.pf", Position::new(1, 1));
        let rendered = Renderer::plain().render(&exc, None);
        assert!(!rendered.contains("\u{1b}["));
        assert!(rendered.contains("TypeError: oops"));
    }

    #[test]
    fn render_includes_hint_suggestions() {
        let exc = type_error("oops")
            .at("a.pf", Position::new(1, 1))
            .with_hint(Hint::did_you_mean(vec!["did you mean 'foo'?".into()]));
        let rendered = Renderer::plain().render(&exc, None);
        assert!(rendered.contains("did you mean 'foo'?"));
    }

    #[test]
    fn render_slices_source_context() {
        let exc = type_error("oops").at("a.pf", Position::new(2, 3));
        let source = "let a = 1\nlet b = a +\nlet c = 3";
        let rendered = Renderer::plain().render(&exc, Some(source));
        assert!(rendered.contains("let b = a +"));
    }
}
