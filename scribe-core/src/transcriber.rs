//! Speech-to-instruction transcription using a multimodal chat model

use anyhow::Result;
use llm::{ChatMessage, ChatModel, ChatPayload, ChatRequest, ContentBlock};
use std::path::Path;
use std::sync::Arc;

const INST_OPEN: &str = "<|inst|>";
const INST_CLOSE: &str = "</|inst|>";

pub const TRANSCRIPTION_PROMPT: &str = "The audio contains instructions to carry out a specific task.
I want you to:
1. transcribe the audio (write it out explicitly).
2. correct any inconsistencies you find.
3. after a <|inst|> tag, write the corrected version of the transcription (only if needed).

Example:
Sure, here is the transcription of the audio, with corrections and the requested tag:

\"I want you to create a file with, uh, a recipe, uh, that has ingredients, for example, chicken, tomato, carrot, whatever, and also, I want you to then explain to me, uh, how you could get, like, a kilo of that kind of of ingredients and what other things you could make with those ingredients in case I have some left over.\"

<|inst|>
I want you to create a file with a recipe that has ingredients, for example chicken, tomato and carrot, and then explain to me how I could get these ingredients and what other things could be made with them in case some are left over.
";

/// Recorded audio ready to be sent inline.
#[derive(Clone, Debug)]
pub struct AudioClip {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl AudioClip {
    pub fn new(bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            bytes,
            mime_type: mime_type.into(),
        }
    }

    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mime_type = audio_mime_type(path)
            .ok_or_else(|| anyhow::anyhow!("Unsupported audio format: {}", path.display()))?;
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", path.display(), e))?;
        Ok(Self::new(bytes, mime_type))
    }

    fn to_block(&self) -> ContentBlock {
        ContentBlock::media(&self.bytes, self.mime_type.clone())
    }
}

/// MIME type for an audio file, by extension.
pub fn audio_mime_type(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    Some(match ext.as_str() {
        "wav" => "audio/wav",
        "mp3" => "audio/mp3",
        "ogg" | "oga" => "audio/ogg",
        "webm" => "audio/webm",
        "flac" => "audio/flac",
        "aac" => "audio/aac",
        "m4a" => "audio/mp4",
        "aiff" | "aif" => "audio/aiff",
        _ => return None,
    })
}

/// Cleaned instruction from a transcription reply.
///
/// Takes the text after the last `<|inst|>`, cut at `</|inst|>` if the model
/// closed the tag. Without a tag the whole reply is the instruction.
pub fn extract_instruction(reply: &str) -> Option<String> {
    let after_open = reply
        .rfind(INST_OPEN)
        .map(|idx| &reply[idx + INST_OPEN.len()..])
        .unwrap_or(reply);
    let inst = after_open
        .find(INST_CLOSE)
        .map(|idx| &after_open[..idx])
        .unwrap_or(after_open)
        .trim();
    (!inst.is_empty()).then(|| inst.to_string())
}

pub struct Transcriber {
    model: Arc<dyn ChatModel + Send + Sync>,
}

impl Transcriber {
    pub fn new(model: Arc<dyn ChatModel + Send + Sync>) -> Self {
        Self { model }
    }

    /// Transcribe a clip into an instruction string
    pub async fn transcribe(&self, clip: &AudioClip) -> Result<String> {
        let message = ChatMessage::user(ChatPayload::new(vec![
            clip.to_block(),
            ContentBlock::Text {
                text: TRANSCRIPTION_PROMPT.to_string(),
            },
        ]));
        let request = ChatRequest::new(std::iter::once(&message));

        let reply = self.model.chat(&request).await?.get_text();
        tracing::debug!(model = self.model.name(), reply = %reply, "Transcription reply");

        extract_instruction(&reply).ok_or_else(|| anyhow::anyhow!("Transcription produced no instruction"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use llm::{ChatStream, Role};
    use std::sync::Mutex;

    #[test]
    fn test_extract_after_last_tag() {
        let reply = "Transcript: \"uh, make a <|inst|> note\"\n\n<|inst|>\nMake a note about the meeting.\n";
        assert_eq!(extract_instruction(reply).as_deref(), Some("Make a note about the meeting."));
    }

    #[test]
    fn test_extract_stops_at_closing_tag() {
        let reply = "<|inst|>Write a poem</|inst|> trailing chatter";
        assert_eq!(extract_instruction(reply).as_deref(), Some("Write a poem"));
    }

    #[test]
    fn test_extract_without_tag_uses_whole_reply() {
        assert_eq!(extract_instruction("  Buy milk  ").as_deref(), Some("Buy milk"));
        assert_eq!(extract_instruction("<|inst|>   "), None);
    }

    #[test]
    fn test_mime_by_extension() {
        assert_eq!(audio_mime_type(Path::new("memo.WAV")), Some("audio/wav"));
        assert_eq!(audio_mime_type(Path::new("memo.m4a")), Some("audio/mp4"));
        assert_eq!(audio_mime_type(Path::new("memo.txt")), None);
    }

    struct RecordingModel {
        reply: String,
        seen: Mutex<Vec<ChatRequest>>,
    }

    #[async_trait]
    impl ChatModel for RecordingModel {
        fn name(&self) -> &str {
            "recording"
        }

        async fn chat(&self, request: &ChatRequest) -> Result<ChatMessage> {
            self.seen.lock().unwrap().push(request.clone());
            Ok(ChatMessage::new(Role::Assistant, ChatPayload::text(self.reply.clone())))
        }

        async fn stream_chat(&self, _request: &ChatRequest) -> Result<ChatStream> {
            anyhow::bail!("not used")
        }
    }

    #[tokio::test]
    async fn test_transcribe_sends_audio_then_prompt() {
        let model = Arc::new(RecordingModel {
            reply: "uh write it\n<|inst|>\nWrite it.".to_string(),
            seen: Mutex::new(Vec::new()),
        });
        let transcriber = Transcriber::new(model.clone());

        let inst = transcriber
            .transcribe(&AudioClip::new(b"RIFF".to_vec(), "audio/wav"))
            .await
            .unwrap();

        assert_eq!(inst, "Write it.");
        let seen = model.seen.lock().unwrap();
        let content = &seen[0].messages()[0].payload.content;
        assert_eq!(content[0].mime_type(), Some("audio/wav"));
        assert!(matches!(&content[1], ContentBlock::Text { text } if text.contains("<|inst|>")));
    }

    #[tokio::test]
    async fn test_empty_transcription_is_an_error() {
        let model = Arc::new(RecordingModel {
            reply: String::new(),
            seen: Mutex::new(Vec::new()),
        });
        let err = Transcriber::new(model)
            .transcribe(&AudioClip::new(vec![], "audio/wav"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no instruction"));
    }
}
