//! Instruction entry points: typed text, attachments, or a voice memo

use anyhow::Result;
use llm::{ChatPayload, ContentBlock};
use std::path::Path;

use crate::agents::{AgentEvent, AgentOutcome};
use crate::session::VaultSession;
use crate::transcriber::{AudioClip, Transcriber, audio_mime_type};

/// Appended to dictated instructions, which tend to be underspecified.
pub const CLARIFY_HINT: &str = "\n\nAsk clarifying questions if you consider it necessary (using the function).";

/// Image or audio file sent inline with an instruction.
#[derive(Clone, Debug)]
pub struct Attachment {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl Attachment {
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mime_type = media_mime_type(path)
            .ok_or_else(|| anyhow::anyhow!("Unsupported attachment type: {}", path.display()))?;
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", path.display(), e))?;
        Ok(Self {
            bytes,
            mime_type: mime_type.to_string(),
        })
    }
}

fn media_mime_type(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        "heic" => Some("image/heic"),
        _ => audio_mime_type(path),
    }
}

/// Result of a voice run: what was understood, and what the agent did with it.
#[derive(Clone, Debug)]
pub struct VoiceOutcome {
    pub instruction: String,
    pub outcome: AgentOutcome,
}

pub struct Pipeline {
    transcriber: Transcriber,
}

impl Pipeline {
    pub fn new(transcriber: Transcriber) -> Self {
        Self { transcriber }
    }

    /// Send an instruction with optional inline media.
    pub async fn run_text(
        &self,
        session: &mut VaultSession,
        text: &str,
        attachments: &[Attachment],
    ) -> Result<AgentOutcome> {
        let payload = instruction_payload(text, attachments);
        anyhow::ensure!(!payload.is_empty(), "Nothing to send: empty instruction");
        session.send(payload).await
    }

    /// Transcribe `clip`, then run the agent on the cleaned instruction.
    pub async fn run_audio(&self, session: &mut VaultSession, clip: &AudioClip) -> Result<VoiceOutcome> {
        let instruction = self.transcriber.transcribe(clip).await?;
        tracing::info!(instruction = %instruction, "Transcribed voice instruction");
        session.notify(AgentEvent::Transcribed(instruction.clone()));

        let prompt = format!("{}{}", instruction, CLARIFY_HINT);
        let outcome = session.send_text(&prompt).await?;
        Ok(VoiceOutcome { instruction, outcome })
    }
}

fn instruction_payload(text: &str, attachments: &[Attachment]) -> ChatPayload {
    let mut blocks: Vec<ContentBlock> = attachments
        .iter()
        .map(|a| ContentBlock::media(&a.bytes, a.mime_type.clone()))
        .collect();
    if !text.trim().is_empty() {
        blocks.push(ContentBlock::Text {
            text: text.to_string(),
        });
    }
    ChatPayload::new(blocks)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_puts_media_before_text() {
        let attachment = Attachment {
            bytes: b"png".to_vec(),
            mime_type: "image/png".to_string(),
        };
        let payload = instruction_payload("Describe this", &[attachment]);
        assert_eq!(payload.content.len(), 2);
        assert_eq!(payload.content[0].mime_type(), Some("image/png"));
        assert_eq!(payload.get_text(), "Describe this");
    }

    #[test]
    fn test_media_types() {
        assert_eq!(media_mime_type(Path::new("a.JPG")), Some("image/jpeg"));
        assert_eq!(media_mime_type(Path::new("a.ogg")), Some("audio/ogg"));
        assert_eq!(media_mime_type(Path::new("a.pdf")), None);
    }
}
