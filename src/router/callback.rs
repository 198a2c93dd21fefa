// Callback data codec
//
// Everything sent back by a button press goes through here. Encoded values
// must fit the 64 byte callback limit of the transport.

/// Hard limit of the transport for callback payloads
pub const MAX_CALLBACK_BYTES: usize = 64;

const SELECT_PREFIX: &str = "v:";
const AUDIO_PREFIX: &str = "a:";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackAction {
    /// User picked one of the listed search results
    Select { video_id: String },
    /// User asked for the audio of a previously seen social post
    AudioToken { token: String },
}

impl CallbackAction {
    pub fn encode(&self) -> String {
        match self {
            Self::Select { video_id } => format!("{}{}", SELECT_PREFIX, video_id),
            Self::AudioToken { token } => format!("{}{}", AUDIO_PREFIX, token),
        }
    }

    pub fn parse(data: &str) -> Option<Self> {
        if data.len() > MAX_CALLBACK_BYTES {
            return None;
        }
        if let Some(video_id) = data.strip_prefix(SELECT_PREFIX) {
            return non_empty(video_id).map(|video_id| Self::Select { video_id });
        }
        if let Some(token) = data.strip_prefix(AUDIO_PREFIX) {
            return non_empty(token).map(|token| Self::AudioToken { token });
        }
        // buttons from before the prefix scheme carried the bare video id
        if !data.contains(':') {
            return non_empty(data).map(|video_id| Self::Select { video_id });
        }
        None
    }
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}
