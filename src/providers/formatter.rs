//! Markdown rendering of interpreter chunks.
//!
//! The backend streams partial text and never repeats block boundaries, so
//! the formatter has to remember whether a console fence is open and whether
//! a code block just closed. That state belongs to one response: build a new
//! [`ChunkFormatter`] for every stream.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage, Rgba};
use std::fs;
use std::io::Cursor;
use std::path::Path;
use thiserror::Error;

use super::configs::{ImageOutput, RenderOptions};
use super::types::chunk::{
    ChunkBody, ConsoleFormat, FileLink, FileManifest, ImageEncoding, StreamingChunk,
};
use super::types::objectid::image_file_name;

pub const CODE_HEADER: &str = "\n### 📌 Code\n";
pub const EXECUTION_HEADER: &str = "\n### 🔥 Excute Code\n";
pub const DOWNLOAD_HEADER: &str = "\n### 🔗 Download related files\n";
pub const FENCE: &str = "\n```\n";
/// Console text the interpreter sends in place of rendered HTML.
pub const HTML_PLACEHOLDER: &str = "HTML being displayed on the user's machine...";
pub const EXECUTION_COMPLETE_NOTICE: &str = "\n > *Execution is complete!* \n";

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("invalid base64 image: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("invalid image: {0}")]
    Image(#[from] image::ImageError),

    #[error("failed to store image: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Default)]
pub struct ChunkFormatter {
    is_console_out: bool,
    result_show_flag: bool,
    options: RenderOptions,
}

impl ChunkFormatter {
    pub fn new(options: RenderOptions) -> Self {
        Self {
            is_console_out: false,
            result_show_flag: false,
            options,
        }
    }

    /// A console fence has been opened and not yet closed.
    pub fn is_console_out(&self) -> bool {
        self.is_console_out
    }

    /// A code block closed and its execution header is still pending.
    pub fn result_show_flag(&self) -> bool {
        self.result_show_flag
    }

    /// Render one chunk, updating the cross-chunk state.
    pub fn format(&mut self, chunk: &StreamingChunk) -> Result<String, RenderError> {
        let mut out = String::new();

        match &chunk.body {
            ChunkBody::Message { content } => {
                if let Some(content) = content {
                    out.push_str(content);
                }
                if chunk.end {
                    out.push('\n');
                }
            }
            ChunkBody::Code { format, content } if format.as_deref() != Some("html") => {
                let language = format.as_deref().unwrap_or("text");
                if chunk.start {
                    out.push_str(CODE_HEADER);
                    out.push_str(&format!("```{}\n", language));
                }
                if let Some(content) = content {
                    out.push_str(content);
                }
                if chunk.end {
                    out.push_str(FENCE);
                    self.result_show_flag = true;
                }
            }
            ChunkBody::Console { format } => self.format_console(chunk, format, &mut out),
            ChunkBody::Image { encoding, content } => {
                if chunk.start || chunk.end {
                    out.push('\n');
                } else if let (ImageEncoding::Base64Png, Some(encoded)) = (encoding, content) {
                    out.push_str(&self.render_png(encoded)?);
                }
            }
            ChunkBody::File(manifest) => format_manifest(manifest, &mut out),
            ChunkBody::Code { .. } | ChunkBody::Confirmation(_) => {}
        }

        Ok(out)
    }

    fn format_console(&mut self, chunk: &StreamingChunk, format: &ConsoleFormat, out: &mut String) {
        if chunk.start && self.result_show_flag {
            out.push_str(EXECUTION_HEADER);
            self.result_show_flag = false;
        }

        match format {
            ConsoleFormat::Output(Some(text)) if text != HTML_PLACEHOLDER => {
                if !self.is_console_out && !text.is_empty() {
                    out.push_str(FENCE);
                }
                out.push_str(text);
                // Any emitted text, header included, leaves the fence open until `end`
                if !out.is_empty() {
                    self.is_console_out = true;
                }
            }
            ConsoleFormat::ActiveLine(line) if self.options.execution_notices => match line {
                None => out.push_str(EXECUTION_COMPLETE_NOTICE),
                Some(line) => out.push_str(&format!("\n > *⌛️ Executing code line {}* \n", line)),
            },
            _ => {}
        }

        if chunk.end && self.is_console_out {
            out.push_str(FENCE);
            self.is_console_out = false;
        }
    }

    fn render_png(&self, encoded: &str) -> Result<String, RenderError> {
        let bytes = STANDARD.decode(encoded.trim())?;
        let flattened = flatten_onto_white(&image::load_from_memory(&bytes)?);

        match &self.options.image_output {
            ImageOutput::DataUri => {
                let mut png = Cursor::new(Vec::new());
                flattened.write_to(&mut png, ImageFormat::Png)?;
                Ok(format!(
                    "![Image](data:image/png;base64,{} 'Click to view')\n",
                    STANDARD.encode(png.into_inner())
                ))
            }
            ImageOutput::Directory(dir) => {
                let path = save_png(&flattened, dir)?;
                Ok(format!(
                    "[![Image]({0} \"Click to view\")]({0})\n",
                    path.display()
                ))
            }
        }
    }
}

fn format_manifest(manifest: &FileManifest, out: &mut String) {
    if !manifest.is_empty() {
        out.push_str(DOWNLOAD_HEADER);
    }
    for FileLink { file_name, file_url } in manifest.file_list.iter().chain(&manifest.pic_list) {
        out.push_str(&format!("[{}]({} \"click to download\") \n", file_name, file_url));
    }
}

/// Composite the image over an opaque white background.
fn flatten_onto_white(image: &DynamicImage) -> RgbImage {
    let rgba = image.to_rgba8();
    RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let Rgba([r, g, b, a]) = *rgba.get_pixel(x, y);
        let alpha = a as u32;
        let blend = |c: u8| ((c as u32 * alpha + 255 * (255 - alpha) + 127) / 255) as u8;
        Rgb([blend(r), blend(g), blend(b)])
    })
}

fn save_png(image: &RgbImage, dir: &Path) -> Result<std::path::PathBuf, RenderError> {
    fs::create_dir_all(dir)?;
    let path = dir.join(image_file_name("png"));
    image.save_with_format(&path, ImageFormat::Png)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::types::chunk::ChunkRole;

    fn chunk(body: ChunkBody, start: bool, end: bool) -> StreamingChunk {
        StreamingChunk {
            role: ChunkRole::Assistant,
            recipient: None,
            start,
            end,
            body,
        }
    }

    fn message(content: Option<&str>, end: bool) -> StreamingChunk {
        chunk(
            ChunkBody::Message {
                content: content.map(str::to_string),
            },
            false,
            end,
        )
    }

    fn code(format: Option<&str>, content: Option<&str>, start: bool, end: bool) -> StreamingChunk {
        chunk(
            ChunkBody::Code {
                format: format.map(str::to_string),
                content: content.map(str::to_string),
            },
            start,
            end,
        )
    }

    fn console(format: ConsoleFormat, start: bool, end: bool) -> StreamingChunk {
        chunk(ChunkBody::Console { format }, start, end)
    }

    fn output(text: &str) -> StreamingChunk {
        console(ConsoleFormat::Output(Some(text.to_string())), false, false)
    }

    fn render_all(formatter: &mut ChunkFormatter, chunks: &[StreamingChunk]) -> String {
        chunks
            .iter()
            .map(|c| formatter.format(c).unwrap())
            .collect::<Vec<_>>()
            .concat()
    }

    fn png_base64(pixels: &[[u8; 4]], width: u32) -> String {
        let height = pixels.len() as u32 / width;
        let image = image::RgbaImage::from_fn(width, height, |x, y| {
            Rgba(pixels[(y * width + x) as usize])
        });
        let mut png = Cursor::new(Vec::new());
        image.write_to(&mut png, ImageFormat::Png).unwrap();
        STANDARD.encode(png.into_inner())
    }

    #[test]
    fn test_message_chunks() {
        let mut formatter = ChunkFormatter::default();
        assert_eq!(formatter.format(&message(Some("Hello"), false)).unwrap(), "Hello");
        assert_eq!(formatter.format(&message(Some(" world"), true)).unwrap(), " world\n");
        assert_eq!(formatter.format(&message(None, true)).unwrap(), "\n");
        assert_eq!(formatter.format(&message(None, false)).unwrap(), "");
    }

    #[test]
    fn test_code_block() {
        let mut formatter = ChunkFormatter::default();
        let rendered = render_all(
            &mut formatter,
            &[
                code(Some("python"), None, true, false),
                code(Some("python"), Some("a"), false, false),
                code(Some("python"), Some("b"), false, false),
                code(Some("python"), None, false, true),
            ],
        );
        assert_eq!(rendered, "\n### 📌 Code\n```python\nab\n```\n");
        assert_eq!(rendered.matches("```").count(), 2);
        assert!(formatter.result_show_flag());
    }

    #[test]
    fn test_code_defaults_to_text_and_skips_html() {
        let mut formatter = ChunkFormatter::default();
        assert_eq!(
            formatter.format(&code(None, Some("x"), true, false)).unwrap(),
            "\n### 📌 Code\n```text\nx"
        );
        assert_eq!(
            formatter.format(&code(Some("html"), Some("<p>"), true, true)).unwrap(),
            ""
        );
        assert!(!formatter.result_show_flag());
    }

    #[test]
    fn test_console_after_code() {
        let mut formatter = ChunkFormatter::default();
        let rendered = render_all(
            &mut formatter,
            &[
                code(Some("python"), Some("print(1)"), true, true),
                console(ConsoleFormat::Other(None), true, false),
                output("1"),
                output("\n2"),
                console(ConsoleFormat::Other(None), false, true),
            ],
        );
        assert_eq!(
            rendered,
            "\n### 📌 Code\n```python\nprint(1)\n```\n\n### 🔥 Excute Code\n\n```\n1\n2\n```\n"
        );
        assert!(!formatter.result_show_flag());
        assert!(!formatter.is_console_out());
    }

    #[test]
    fn test_console_opens_fence_once() {
        let mut formatter = ChunkFormatter::default();
        assert_eq!(formatter.format(&output("a")).unwrap(), "\n```\na");
        assert!(formatter.is_console_out());
        assert_eq!(formatter.format(&output("b")).unwrap(), "b");
        assert_eq!(formatter.format(&output("c")).unwrap(), "c");
        assert_eq!(
            formatter
                .format(&console(ConsoleFormat::Other(None), false, true))
                .unwrap(),
            "\n```\n"
        );
        assert!(!formatter.is_console_out());
    }

    #[test]
    fn test_console_header_only_once_per_code_block() {
        let mut formatter = ChunkFormatter::default();
        formatter.format(&code(Some("python"), None, false, true)).unwrap();
        let first = formatter
            .format(&console(ConsoleFormat::Other(None), true, false))
            .unwrap();
        let second = formatter
            .format(&console(ConsoleFormat::Other(None), true, false))
            .unwrap();
        assert_eq!(first, EXECUTION_HEADER);
        assert_eq!(second, "");
    }

    #[test]
    fn test_console_skips_placeholder_and_empty_output() {
        let mut formatter = ChunkFormatter::default();
        assert_eq!(formatter.format(&output(HTML_PLACEHOLDER)).unwrap(), "");
        assert!(!formatter.is_console_out());

        assert_eq!(formatter.format(&output("")).unwrap(), "");
        assert!(!formatter.is_console_out());

        assert_eq!(
            formatter
                .format(&console(ConsoleFormat::Output(None), false, true))
                .unwrap(),
            ""
        );
    }

    #[test]
    fn test_console_end_without_output_emits_nothing() {
        let mut formatter = ChunkFormatter::default();
        assert_eq!(
            formatter
                .format(&console(ConsoleFormat::ActiveLine(None), false, true))
                .unwrap(),
            ""
        );
    }

    #[test]
    fn test_execution_notices() {
        let mut formatter = ChunkFormatter::new(RenderOptions {
            execution_notices: true,
            ..Default::default()
        });
        assert_eq!(
            formatter
                .format(&console(ConsoleFormat::ActiveLine(Some(4)), false, false))
                .unwrap(),
            "\n > *⌛️ Executing code line 4* \n"
        );
        assert_eq!(
            formatter
                .format(&console(ConsoleFormat::ActiveLine(None), false, false))
                .unwrap(),
            EXECUTION_COMPLETE_NOTICE
        );

        let mut quiet = ChunkFormatter::default();
        assert_eq!(
            quiet
                .format(&console(ConsoleFormat::ActiveLine(Some(4)), false, false))
                .unwrap(),
            ""
        );
    }

    #[test]
    fn test_file_manifest() {
        let mut formatter = ChunkFormatter::default();
        let manifest = FileManifest {
            file_list: vec![],
            pic_list: vec![FileLink {
                file_name: "chart.png".to_string(),
                file_url: "https://files.example/chart.png".to_string(),
            }],
        };
        let rendered = formatter
            .format(&chunk(ChunkBody::File(manifest), false, false))
            .unwrap();
        assert_eq!(
            rendered,
            "\n### 🔗 Download related files\n[chart.png](https://files.example/chart.png \"click to download\") \n"
        );
        assert_eq!(rendered.lines().filter(|l| l.starts_with('[')).count(), 1);

        let empty = formatter
            .format(&chunk(ChunkBody::File(FileManifest::default()), false, false))
            .unwrap();
        assert_eq!(empty, "");
    }

    #[test]
    fn test_file_manifest_orders_files_before_pictures() {
        let mut formatter = ChunkFormatter::default();
        let link = |name: &str| FileLink {
            file_name: name.to_string(),
            file_url: format!("http://x/{}", name),
        };
        let manifest = FileManifest {
            file_list: vec![link("a.csv"), link("b.csv")],
            pic_list: vec![link("c.png")],
        };
        let rendered = formatter
            .format(&chunk(ChunkBody::File(manifest), false, false))
            .unwrap();
        let names: Vec<_> = rendered
            .lines()
            .filter_map(|l| l.strip_prefix('['))
            .map(|l| &l[..5])
            .collect();
        assert_eq!(names, vec!["a.csv", "b.csv", "c.png"]);
    }

    #[test]
    fn test_confirmation_is_ignored() {
        let mut formatter = ChunkFormatter::default();
        let rendered = formatter
            .format(&chunk(ChunkBody::Confirmation(None), true, true))
            .unwrap();
        assert_eq!(rendered, "");
    }

    #[test]
    fn test_image_boundaries() {
        let mut formatter = ChunkFormatter::default();
        let boundary = chunk(
            ChunkBody::Image {
                encoding: ImageEncoding::Base64Png,
                content: Some("not even base64".to_string()),
            },
            true,
            false,
        );
        assert_eq!(formatter.format(&boundary).unwrap(), "\n");

        let jpeg = chunk(
            ChunkBody::Image {
                encoding: ImageEncoding::Base64Jpeg,
                content: Some("AAAA".to_string()),
            },
            false,
            false,
        );
        assert_eq!(formatter.format(&jpeg).unwrap(), "");
    }

    #[test]
    fn test_image_data_uri_flattens_alpha() {
        let mut formatter = ChunkFormatter::default();
        let encoded = png_base64(&[[0, 0, 0, 0], [255, 0, 0, 255]], 2);
        let rendered = formatter
            .format(&chunk(
                ChunkBody::Image {
                    encoding: ImageEncoding::Base64Png,
                    content: Some(encoded),
                },
                false,
                false,
            ))
            .unwrap();

        let b64 = rendered
            .strip_prefix("![Image](data:image/png;base64,")
            .and_then(|rest| rest.strip_suffix(" 'Click to view')\n"))
            .expect("data uri markdown");
        let decoded = image::load_from_memory(&STANDARD.decode(b64).unwrap())
            .unwrap()
            .to_rgb8();
        assert_eq!(decoded.get_pixel(0, 0), &Rgb([255, 255, 255]));
        assert_eq!(decoded.get_pixel(1, 0), &Rgb([255, 0, 0]));
    }

    #[test]
    fn test_image_directory_output() {
        let dir = tempfile::tempdir().unwrap();
        let mut formatter = ChunkFormatter::new(RenderOptions {
            image_output: ImageOutput::Directory(dir.path().join("images")),
            ..Default::default()
        });
        let rendered = formatter
            .format(&chunk(
                ChunkBody::Image {
                    encoding: ImageEncoding::Base64Png,
                    content: Some(png_base64(&[[10, 20, 30, 128]], 1)),
                },
                false,
                false,
            ))
            .unwrap();

        assert!(rendered.starts_with("[![Image]("));
        let saved: Vec<_> = fs::read_dir(dir.path().join("images")).unwrap().collect();
        assert_eq!(saved.len(), 1);
        let path = saved[0].as_ref().unwrap().path();
        assert!(rendered.contains(&path.display().to_string()));
    }

    #[test]
    fn test_invalid_image_is_an_error() {
        let mut formatter = ChunkFormatter::default();
        let bad = chunk(
            ChunkBody::Image {
                encoding: ImageEncoding::Base64Png,
                content: Some("%%%".to_string()),
            },
            false,
            false,
        );
        assert!(matches!(formatter.format(&bad), Err(RenderError::Base64(_))));

        let not_png = chunk(
            ChunkBody::Image {
                encoding: ImageEncoding::Base64Png,
                content: Some(STANDARD.encode(b"plain text")),
            },
            false,
            false,
        );
        assert!(matches!(formatter.format(&not_png), Err(RenderError::Image(_))));
    }
}
