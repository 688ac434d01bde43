//! Messages carried on a peer data channel.
//!
//! The channel is stateless and frameless, so every chunk repeats the file's
//! identity and total chunk count. There is no header or trailer message.
//!
//! ```text
//! { "type": "chunk", "fileId", "fileName", "fileType",
//!   "chunk": <base64>, "chunkIndex": u32, "totalChunks": u32 }
//! ```

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Every message that may appear on a data channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ChannelMessage {
    Chunk(ChunkMessage),
}

/// One index-tagged slice of a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkMessage {
    pub file_id: String,
    pub file_name: String,
    pub file_type: String,
    #[serde(with = "base64_bytes")]
    pub chunk: Bytes,
    pub chunk_index: u32,
    pub total_chunks: u32,
}

impl ChunkMessage {
    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        self.chunk.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunk.is_empty()
    }
}

impl From<ChunkMessage> for ChannelMessage {
    fn from(chunk: ChunkMessage) -> Self {
        ChannelMessage::Chunk(chunk)
    }
}

/// Encode a message as JSON text for transports that carry strings.
pub fn encode(message: &ChannelMessage) -> Result<String, serde_json::Error> {
    serde_json::to_string(message)
}

/// Decode a message from JSON text.
pub fn decode(text: &str) -> Result<ChannelMessage, serde_json::Error> {
    serde_json::from_str(text)
}

mod base64_bytes {
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD;
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(data: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(data))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Bytes, D::Error> {
        let text = String::deserialize(deserializer)?;
        STANDARD
            .decode(text.as_bytes())
            .map(Bytes::from)
            .map_err(serde::de::Error::custom)
    }
}
