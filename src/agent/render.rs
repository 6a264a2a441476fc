//! Message rendering
//!
//! Converts run state into the provider request shape. System messages
//! become the top-level instructions, tool messages become correlated tool
//! results, and everything else becomes a bare string or a list of typed
//! content parts. Managed files are read and inlined as `data:` URLs here,
//! at render time, and never stored encoded.

use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use tracing::{debug, warn};

use crate::providers::{ApiMode, ContentPart, FileData, ImageUrl, RenderedContent, RenderedMessage};
use crate::session::{FileSource, Message, Part, Role};

const DEFAULT_MIME: &str = "application/octet-stream";

/// Renders messages for one provider request family.
#[derive(Debug, Clone)]
pub struct MessageRenderer {
    api_mode: ApiMode,
    managed_files_root: Option<PathBuf>,
}

impl MessageRenderer {
    /// Create a renderer for `api_mode` with no managed-files root.
    pub fn new(api_mode: ApiMode) -> Self {
        Self {
            api_mode,
            managed_files_root: None,
        }
    }

    /// Allow managed-file parts under `root`.
    ///
    /// The root is canonicalized once so that containment checks compare
    /// resolved paths.
    pub fn with_managed_files_root(mut self, root: Option<PathBuf>) -> Self {
        self.managed_files_root = root.map(|r| r.canonicalize().unwrap_or(r));
        self
    }

    /// Request family this renderer targets.
    pub fn api_mode(&self) -> ApiMode {
        self.api_mode
    }

    /// Text of all system messages, joined by blank lines.
    pub fn instructions(&self, messages: &[Message]) -> Option<String> {
        let parts: Vec<String> = messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(Message::text)
            .filter(|t| !t.trim().is_empty())
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join("\n\n"))
        }
    }

    /// Render every non-system message, in order.
    pub fn render(&self, messages: &[Message]) -> Vec<RenderedMessage> {
        messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|m| self.render_message(m))
            .collect()
    }

    fn render_message(&self, message: &Message) -> RenderedMessage {
        if message.role == Role::Tool {
            return RenderedMessage::ToolResult {
                name: message.name.clone().unwrap_or_else(|| "tool".to_string()),
                tool_call_id: message.tool_call_id.clone().unwrap_or_default(),
                content: stringify_parts(&message.content),
            };
        }

        let content = match &message.raw_content {
            Some(raw) => RenderedContent::Raw(raw.clone()),
            None => self.render_content(&message.content),
        };
        RenderedMessage::Message {
            role: message.role,
            content,
            tool_calls: message.tool_calls(),
        }
    }

    fn render_content(&self, parts: &[Part]) -> RenderedContent {
        if let [Part::Text { text }] = parts {
            return RenderedContent::Text(text.clone());
        }

        let rendered = parts
            .iter()
            .filter_map(|part| match part {
                Part::Text { text } => Some(if self.api_mode.is_responses() {
                    ContentPart::InputText { text: text.clone() }
                } else {
                    ContentPart::Text { text: text.clone() }
                }),
                Part::Json { value } => Some(ContentPart::Json {
                    value: value.clone(),
                }),
                Part::Image { source, mime } => self.render_managed_file(source, mime, None, true),
                Part::File {
                    source,
                    mime,
                    filename,
                } => self.render_managed_file(source, mime, filename.as_deref(), false),
            })
            .collect();
        RenderedContent::Parts(rendered)
    }

    fn render_managed_file(
        &self,
        source: &FileSource,
        mime: &str,
        filename: Option<&str>,
        is_image: bool,
    ) -> Option<ContentPart> {
        let FileSource::ManagedFile { path: relative } = source;
        let path = self.resolve_managed_path(relative)?;

        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(path = %relative, error = %e, "Failed to read managed file");
                return None;
            }
        };
        let mime = if mime.trim().is_empty() { DEFAULT_MIME } else { mime };
        let data_url = format!("data:{};base64,{}", mime, STANDARD.encode(&bytes));
        debug!(
            path = %relative,
            resolved_path = %path.display(),
            mime = %mime,
            size = bytes.len(),
            api_mode = %self.api_mode,
            "Rendered managed file"
        );

        let filename = filename
            .map(str::to_string)
            .or_else(|| path.file_name().map(|n| n.to_string_lossy().into_owned()))
            .unwrap_or_default();

        Some(match (self.api_mode, is_image) {
            (ApiMode::Responses, true) => ContentPart::InputImage {
                image_url: data_url,
            },
            (ApiMode::Responses, false) => ContentPart::InputFile {
                filename,
                file_data: data_url,
            },
            (ApiMode::ChatCompletions, true) => ContentPart::ImageUrl {
                image_url: ImageUrl { url: data_url },
            },
            (ApiMode::ChatCompletions, false) => ContentPart::File {
                file: FileData {
                    filename,
                    file_data: data_url,
                },
            },
        })
    }

    /// Resolve a managed-file path, refusing anything outside the root.
    pub fn resolve_managed_path(&self, relative: &str) -> Option<PathBuf> {
        let Some(root) = &self.managed_files_root else {
            warn!(path = %relative, "Managed file root not configured");
            return None;
        };
        if relative.trim().is_empty() {
            return None;
        }
        let candidate = Path::new(relative);
        if candidate.is_absolute() {
            warn!(path = %relative, "Managed file rejected: absolute path");
            return None;
        }
        let resolved = match root.join(candidate).canonicalize() {
            Ok(p) => p,
            Err(_) => {
                warn!(path = %relative, "Managed file missing on disk");
                return None;
            }
        };
        if !resolved.starts_with(root) {
            warn!(path = %relative, "Managed file rejected: path escapes root");
            return None;
        }
        if !resolved.is_file() {
            warn!(path = %relative, resolved_path = %resolved.display(), "Managed file is not a regular file");
            return None;
        }
        Some(resolved)
    }
}

/// Tool message content as a single string.
///
/// One text part is sent as-is, one JSON part as compact JSON, anything
/// else as a JSON array of the parts.
pub fn stringify_parts(parts: &[Part]) -> String {
    match parts {
        [Part::Text { text }] => text.clone(),
        [Part::Json { value }] => value.to_string(),
        _ => serde_json::to_string(parts).unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{ProviderToolCall, ToolArguments};
    use serde_json::json;

    fn managed_root() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("uploads")).unwrap();
        std::fs::write(dir.path().join("uploads/cat.png"), b"png-bytes").unwrap();
        std::fs::write(dir.path().join("uploads/report.pdf"), b"%PDF").unwrap();
        dir
    }

    fn parts_of(message: &RenderedMessage) -> Vec<ContentPart> {
        match message {
            RenderedMessage::Message {
                content: RenderedContent::Parts(parts),
                ..
            } => parts.clone(),
            other => panic!("expected parts, got {:?}", other),
        }
    }

    #[test]
    fn test_system_becomes_instructions() {
        let renderer = MessageRenderer::new(ApiMode::ChatCompletions);
        let messages = vec![Message::system("Be brief."), Message::user("hi")];
        assert_eq!(renderer.instructions(&messages).as_deref(), Some("Be brief."));
        let rendered = renderer.render(&messages);
        assert_eq!(rendered, vec![RenderedMessage::text(Role::User, "hi")]);
    }

    #[test]
    fn test_no_system_no_instructions() {
        let renderer = MessageRenderer::new(ApiMode::ChatCompletions);
        assert!(renderer.instructions(&[Message::user("hi")]).is_none());
    }

    #[test]
    fn test_tool_message_stringified() {
        let renderer = MessageRenderer::new(ApiMode::Responses);
        let rendered = renderer.render(&[Message::tool_json("call_1", "calc", json!({"result": 4}))]);
        assert_eq!(
            rendered[0],
            RenderedMessage::ToolResult {
                name: "calc".into(),
                tool_call_id: "call_1".into(),
                content: r#"{"result":4}"#.into(),
            }
        );
    }

    #[test]
    fn test_stringify_parts() {
        assert_eq!(stringify_parts(&[Part::text("plain")]), "plain");
        assert_eq!(stringify_parts(&[Part::json(json!([1, 2]))]), "[1,2]");
        let multi = stringify_parts(&[Part::text("a"), Part::json(json!(1))]);
        let parsed: serde_json::Value = serde_json::from_str(&multi).unwrap();
        assert_eq!(
            parsed,
            json!([{"type": "text", "text": "a"}, {"type": "json", "value": 1}])
        );
    }

    #[test]
    fn test_text_parts_follow_mode() {
        let message = Message::new(Role::User, vec![Part::text("a"), Part::json(json!({"k": 1}))]);

        let chat = MessageRenderer::new(ApiMode::ChatCompletions).render(&[message.clone()]);
        assert_eq!(
            parts_of(&chat[0]),
            vec![
                ContentPart::Text { text: "a".into() },
                ContentPart::Json { value: json!({"k": 1}) }
            ]
        );

        let responses = MessageRenderer::new(ApiMode::Responses).render(&[message]);
        assert_eq!(parts_of(&responses[0])[0], ContentPart::InputText { text: "a".into() });
    }

    #[test]
    fn test_raw_content_verbatim() {
        let raw = json!([{"type": "output_text", "text": "kept"}]);
        let message = Message::assistant("ignored").with_raw_content(raw.clone());
        let rendered = MessageRenderer::new(ApiMode::ChatCompletions).render(&[message]);
        assert_eq!(rendered[0].to_json()["content"], raw);
    }

    #[test]
    fn test_assistant_tool_calls_rendered() {
        let call = ProviderToolCall::new("call_9", "lookup", ToolArguments::Text("{}".into()));
        let message = Message::assistant_with_tool_calls("", &[call]);
        let rendered = MessageRenderer::new(ApiMode::ChatCompletions).render(&[message]);
        let wire = rendered[0].to_json();
        assert_eq!(wire["tool_calls"][0]["id"], "call_9");
        assert_eq!(wire["tool_calls"][0]["function"]["name"], "lookup");
    }

    #[test]
    fn test_managed_files_chat_mode() {
        let root = managed_root();
        let renderer = MessageRenderer::new(ApiMode::ChatCompletions)
            .with_managed_files_root(Some(root.path().to_path_buf()));
        let message = Message::new(
            Role::User,
            vec![
                Part::text("look"),
                Part::image("uploads/cat.png", "image/png"),
                Part::file("uploads/report.pdf", "application/pdf"),
            ],
        );
        let parts = parts_of(&renderer.render(&[message])[0]);
        assert_eq!(parts.len(), 3);
        assert_eq!(
            parts[1],
            ContentPart::ImageUrl {
                image_url: ImageUrl {
                    url: format!("data:image/png;base64,{}", STANDARD.encode(b"png-bytes")),
                },
            }
        );
        match &parts[2] {
            ContentPart::File { file } => {
                assert_eq!(file.filename, "report.pdf");
                assert!(file.file_data.starts_with("data:application/pdf;base64,"));
            }
            other => panic!("expected file part, got {:?}", other),
        }
    }

    #[test]
    fn test_managed_files_responses_mode() {
        let root = managed_root();
        let renderer = MessageRenderer::new(ApiMode::Responses)
            .with_managed_files_root(Some(root.path().to_path_buf()));
        let mut file = Part::file("uploads/report.pdf", "application/pdf");
        if let Part::File { filename, .. } = &mut file {
            *filename = Some("Q3.pdf".into());
        }
        let message = Message::new(
            Role::User,
            vec![Part::image("uploads/cat.png", "image/png"), file],
        );
        let parts = parts_of(&renderer.render(&[message])[0]);
        assert!(matches!(&parts[0], ContentPart::InputImage { image_url } if image_url.starts_with("data:image/png")));
        assert!(matches!(&parts[1], ContentPart::InputFile { filename, .. } if filename == "Q3.pdf"));
    }

    #[test]
    fn test_unsafe_paths_are_omitted() {
        let root = managed_root();
        let renderer = MessageRenderer::new(ApiMode::ChatCompletions)
            .with_managed_files_root(Some(root.path().join("uploads")));
        let message = Message::new(
            Role::User,
            vec![
                Part::text("x"),
                Part::file("../../etc/passwd", "text/plain"),
                Part::file("/etc/passwd", "text/plain"),
                Part::image("missing.png", "image/png"),
                Part::image("", "image/png"),
            ],
        );
        let parts = parts_of(&renderer.render(&[message])[0]);
        assert_eq!(parts, vec![ContentPart::Text { text: "x".into() }]);
    }

    #[test]
    fn test_sibling_escape_rejected() {
        let root = managed_root();
        let renderer = MessageRenderer::new(ApiMode::ChatCompletions)
            .with_managed_files_root(Some(root.path().join("uploads")));
        std::fs::write(root.path().join("secret.txt"), b"top secret").unwrap();
        assert!(renderer.resolve_managed_path("../secret.txt").is_none());
        assert!(renderer.resolve_managed_path("cat.png").is_some());
    }

    #[test]
    fn test_no_root_configured() {
        let renderer = MessageRenderer::new(ApiMode::ChatCompletions);
        assert!(renderer.resolve_managed_path("uploads/cat.png").is_none());
    }
}
