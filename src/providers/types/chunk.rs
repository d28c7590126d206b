//! Wire model of the interpreter's streaming protocol.
//!
//! Every fragment of a `/stream_chat` response is one JSON object. Its `type`
//! selects which shape `content` takes and how `format` is read, so the loose
//! wire record is converted into [`ChunkBody`] as soon as it is parsed.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkRole {
    User,
    Assistant,
    Computer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Recipient {
    User,
    Assistant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkKind {
    Message,
    Code,
    Image,
    Console,
    File,
    Confirmation,
}

impl ChunkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkKind::Message => "message",
            ChunkKind::Code => "code",
            ChunkKind::Image => "image",
            ChunkKind::Console => "console",
            ChunkKind::File => "file",
            ChunkKind::Confirmation => "confirmation",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleFormat {
    /// Text printed by the running code.
    Output(Option<String>),
    /// The line currently executing; `None` once execution finished.
    ActiveLine(Option<i64>),
    Other(Option<String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageEncoding {
    Base64Png,
    Base64Jpeg,
    Path,
    Other(Option<String>),
}

impl ImageEncoding {
    fn from_format(format: Option<&str>) -> Self {
        match format {
            Some("base64.png") => ImageEncoding::Base64Png,
            Some("base64.jpeg") => ImageEncoding::Base64Jpeg,
            Some("path") => ImageEncoding::Path,
            other => ImageEncoding::Other(other.map(str::to_string)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileLink {
    pub file_name: String,
    pub file_url: String,
}

/// Files and pictures the interpreter produced during a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileManifest {
    #[serde(default)]
    pub file_list: Vec<FileLink>,
    #[serde(default)]
    pub pic_list: Vec<FileLink>,
}

impl FileManifest {
    pub fn is_empty(&self) -> bool {
        self.file_list.is_empty() && self.pic_list.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChunkBody {
    Message {
        content: Option<String>,
    },
    Code {
        format: Option<String>,
        content: Option<String>,
    },
    Console {
        format: ConsoleFormat,
    },
    Image {
        encoding: ImageEncoding,
        content: Option<String>,
    },
    File(FileManifest),
    Confirmation(Option<Value>),
}

/// One parsed fragment of the streaming protocol.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "RawChunk")]
pub struct StreamingChunk {
    pub role: ChunkRole,
    pub recipient: Option<Recipient>,
    pub start: bool,
    pub end: bool,
    pub body: ChunkBody,
}

impl StreamingChunk {
    pub fn parse(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }

    pub fn kind(&self) -> ChunkKind {
        match &self.body {
            ChunkBody::Message { .. } => ChunkKind::Message,
            ChunkBody::Code { .. } => ChunkKind::Code,
            ChunkBody::Console { .. } => ChunkKind::Console,
            ChunkBody::Image { .. } => ChunkKind::Image,
            ChunkBody::File(_) => ChunkKind::File,
            ChunkBody::Confirmation(_) => ChunkKind::Confirmation,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawChunk {
    role: ChunkRole,
    #[serde(rename = "type")]
    kind: ChunkKind,
    #[serde(default)]
    format: Option<String>,
    #[serde(default)]
    recipient: Option<Recipient>,
    #[serde(default)]
    content: Option<Value>,
    #[serde(default)]
    start: Option<bool>,
    #[serde(default)]
    end: Option<bool>,
}

/// `content` is restricted to a string, an integer or an object.
enum RawContent {
    Text(String),
    Integer(i64),
    Object(Map<String, Value>),
}

impl RawContent {
    fn from_value(value: Option<Value>) -> Result<Option<Self>, String> {
        match value {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(RawContent::Text(s))),
            Some(Value::Object(map)) => Ok(Some(RawContent::Object(map))),
            Some(Value::Number(n)) => n
                .as_i64()
                .map(|i| Some(RawContent::Integer(i)))
                .ok_or_else(|| format!("content must be an integer, got {}", n)),
            Some(other) => Err(format!(
                "content must be a string, an integer or an object, got {}",
                other
            )),
        }
    }

    fn describe(&self) -> &'static str {
        match self {
            RawContent::Text(_) => "string",
            RawContent::Integer(_) => "integer",
            RawContent::Object(_) => "object",
        }
    }

    fn into_value(self) -> Value {
        match self {
            RawContent::Text(s) => Value::String(s),
            RawContent::Integer(i) => Value::from(i),
            RawContent::Object(map) => Value::Object(map),
        }
    }
}

fn text_content(kind: ChunkKind, content: Option<RawContent>) -> Result<Option<String>, String> {
    match content {
        None => Ok(None),
        Some(RawContent::Text(s)) => Ok(Some(s)),
        Some(other) => Err(format!(
            "{} content must be a string, got {}",
            kind.as_str(),
            other.describe()
        )),
    }
}

impl TryFrom<RawChunk> for StreamingChunk {
    type Error = String;

    fn try_from(raw: RawChunk) -> Result<Self, Self::Error> {
        let content = RawContent::from_value(raw.content)?;
        let format = raw.format;

        let body = match raw.kind {
            ChunkKind::Message => ChunkBody::Message {
                content: text_content(raw.kind, content)?,
            },
            ChunkKind::Code => ChunkBody::Code {
                content: text_content(raw.kind, content)?,
                format,
            },
            ChunkKind::Console => {
                let format = match format.as_deref() {
                    Some("output") => ConsoleFormat::Output(text_content(raw.kind, content)?),
                    Some("active_line") => ConsoleFormat::ActiveLine(match content {
                        Some(RawContent::Integer(line)) => Some(line),
                        Some(RawContent::Text(line)) => line.trim().parse().ok(),
                        _ => None,
                    }),
                    _ => ConsoleFormat::Other(format),
                };
                ChunkBody::Console { format }
            }
            ChunkKind::Image => {
                let encoding = ImageEncoding::from_format(format.as_deref());
                let content = match (&encoding, content) {
                    (_, Some(RawContent::Text(s))) => Some(s),
                    (ImageEncoding::Base64Png | ImageEncoding::Base64Jpeg, Some(other)) => {
                        return Err(format!(
                            "image content must be a base64 string, got {}",
                            other.describe()
                        ))
                    }
                    _ => None,
                };
                ChunkBody::Image { encoding, content }
            }
            ChunkKind::File => match content {
                Some(RawContent::Object(map)) => {
                    let manifest = serde_json::from_value(Value::Object(map))
                        .map_err(|e| format!("invalid file manifest: {}", e))?;
                    ChunkBody::File(manifest)
                }
                Some(other) => {
                    return Err(format!(
                        "file content must be an object, got {}",
                        other.describe()
                    ))
                }
                None => return Err("file content is missing".to_string()),
            },
            ChunkKind::Confirmation => ChunkBody::Confirmation(content.map(RawContent::into_value)),
        };

        Ok(StreamingChunk {
            role: raw.role,
            recipient: raw.recipient,
            start: raw.start.unwrap_or(false),
            end: raw.end.unwrap_or(false),
            body,
        })
    }
}
