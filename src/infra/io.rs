//! File I/O primitives shared by the conflict detector, backup store,
//! apply engine and undo manager.
//!
//! - Memory-mapped reads above 1 MiB
//! - Streaming SHA-256 fingerprints (`sha256:<hex>`)
//! - Text sniffing, BOM-based encoding and line-ending detection
//! - Atomic same-directory writes that keep permissions

use anyhow::{Context, Result, bail};
use memmap2::Mmap;
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::Path;

const MMAP_THRESHOLD: u64 = 1024 * 1024; // 1 MiB

/// Bytes inspected when deciding whether content is text
const SNIFF_LEN: usize = 8 * 1024;

pub enum FileContent {
    Mapped(Mmap),
    Buffered(Vec<u8>),
}

impl AsRef<[u8]> for FileContent {
    fn as_ref(&self) -> &[u8] {
        match self {
            FileContent::Mapped(mmap) => &mmap[..],
            FileContent::Buffered(buf) => buf.as_slice(),
        }
    }
}

pub fn read_file_smart<P: AsRef<Path>>(path: P) -> Result<FileContent> {
    let path = path.as_ref();
    let metadata = fs::metadata(path)
        .with_context(|| format!("Failed to read metadata for {}", path.display()))?;

    if metadata.len() > MMAP_THRESHOLD {
        let file =
            File::open(path).with_context(|| format!("Failed to open file {}", path.display()))?;

        // Safety: We're only reading the file, not modifying it
        let mmap = unsafe { Mmap::map(&file) }
            .with_context(|| format!("Failed to memory-map {}", path.display()))?;

        Ok(FileContent::Mapped(mmap))
    } else {
        let content =
            fs::read(path).with_context(|| format!("Failed to read file {}", path.display()))?;

        Ok(FileContent::Buffered(content))
    }
}

/// Hash an in-memory buffer as `sha256:<hex>`.
pub fn sha256_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("sha256:{}", hex(&hasher.finalize()))
}

/// Stream a file into a SHA-256 digest as `sha256:<hex>`.
pub fn sha256_file(path: &Path) -> Result<String> {
    let mut f =
        File::open(path).with_context(|| format!("open for checksum: {}", path.display()))?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = f.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("sha256:{}", hex(&hasher.finalize())))
}

fn hex(bytes: &[u8]) -> String {
    use std::fmt::Write as _;
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{b:02x}");
    }
    out
}

/// Text encodings we can round-trip without an external codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum TextEncoding {
    Utf8,
    Utf8Bom,
    Utf16Le,
    Utf16Be,
}

impl TextEncoding {
    /// Detect the encoding from a leading byte-order mark.
    pub fn detect(bytes: &[u8]) -> Self {
        if bytes.starts_with(&[0xEF, 0xBB, 0xBF]) {
            TextEncoding::Utf8Bom
        } else if bytes.starts_with(&[0xFF, 0xFE]) {
            TextEncoding::Utf16Le
        } else if bytes.starts_with(&[0xFE, 0xFF]) {
            TextEncoding::Utf16Be
        } else {
            TextEncoding::Utf8
        }
    }

    /// Decode bytes (BOM stripped) into a String.
    pub fn decode(self, bytes: &[u8]) -> Result<String> {
        match self {
            TextEncoding::Utf8 => {
                String::from_utf8(bytes.to_vec()).context("content is not valid UTF-8")
            }
            TextEncoding::Utf8Bom => {
                String::from_utf8(bytes[3..].to_vec()).context("content is not valid UTF-8")
            }
            TextEncoding::Utf16Le | TextEncoding::Utf16Be => {
                let body = &bytes[2..];
                if body.len() % 2 != 0 {
                    bail!("odd byte count in UTF-16 content");
                }
                let units: Vec<u16> = body
                    .chunks_exact(2)
                    .map(|c| match self {
                        TextEncoding::Utf16Le => u16::from_le_bytes([c[0], c[1]]),
                        _ => u16::from_be_bytes([c[0], c[1]]),
                    })
                    .collect();
                String::from_utf16(&units).context("content is not valid UTF-16")
            }
        }
    }

    /// Encode text back into bytes, re-adding the BOM.
    pub fn encode(self, text: &str) -> Vec<u8> {
        match self {
            TextEncoding::Utf8 => text.as_bytes().to_vec(),
            TextEncoding::Utf8Bom => {
                let mut out = vec![0xEF, 0xBB, 0xBF];
                out.extend_from_slice(text.as_bytes());
                out
            }
            TextEncoding::Utf16Le => {
                let mut out = vec![0xFF, 0xFE];
                for u in text.encode_utf16() {
                    out.extend_from_slice(&u.to_le_bytes());
                }
                out
            }
            TextEncoding::Utf16Be => {
                let mut out = vec![0xFE, 0xFF];
                for u in text.encode_utf16() {
                    out.extend_from_slice(&u.to_be_bytes());
                }
                out
            }
        }
    }
}

/// Line terminator style of a text document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum LineEnding {
    Lf,
    CrLf,
    Cr,
}

impl LineEnding {
    pub fn as_str(self) -> &'static str {
        match self {
            LineEnding::Lf => "\n",
            LineEnding::CrLf => "\r\n",
            LineEnding::Cr => "\r",
        }
    }

    /// Detect the style of the first terminator; LF when none exists.
    pub fn detect(text: &str) -> Self {
        let bytes = text.as_bytes();
        match memchr::memchr2(b'\r', b'\n', bytes) {
            Some(i) if bytes[i] == b'\n' => LineEnding::Lf,
            Some(i) if bytes.get(i + 1) == Some(&b'\n') => LineEnding::CrLf,
            Some(_) => LineEnding::Cr,
            None => LineEnding::Lf,
        }
    }

    /// Rewrite every terminator in `text` to this style.
    pub fn apply(self, text: &str) -> String {
        let lf = text.replace("\r\n", "\n").replace('\r', "\n");
        match self {
            LineEnding::Lf => lf,
            _ => lf.replace('\n', self.as_str()),
        }
    }
}

/// Layout facts about an existing text file that writes must keep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextLayout {
    pub encoding: TextEncoding,
    pub line_ending: LineEnding,
    pub final_newline: bool,
}

impl TextLayout {
    /// Layout used for freshly created files.
    pub fn fresh() -> Self {
        Self {
            encoding: TextEncoding::Utf8,
            line_ending: LineEnding::Lf,
            final_newline: true,
        }
    }

    pub fn detect(bytes: &[u8], text: &str) -> Self {
        Self {
            encoding: TextEncoding::detect(bytes),
            line_ending: LineEnding::detect(text),
            final_newline: text.ends_with('\n') || text.ends_with('\r'),
        }
    }
}

/// Decode a file's bytes and capture its layout in one go.
pub fn read_text(path: &Path) -> Result<(String, TextLayout)> {
    let content = read_file_smart(path)?;
    let bytes = content.as_ref();
    let encoding = TextEncoding::detect(bytes);
    let text = encoding
        .decode(bytes)
        .with_context(|| format!("decode {}", path.display()))?;
    let layout = TextLayout::detect(bytes, &text);
    Ok((text, layout))
}

/// Heuristic text check: UTF-16 BOMs pass, otherwise no NUL in the head.
pub fn is_probably_text(bytes: &[u8]) -> bool {
    match TextEncoding::detect(bytes) {
        TextEncoding::Utf16Le | TextEncoding::Utf16Be => true,
        _ => {
            let head = &bytes[..bytes.len().min(SNIFF_LEN)];
            memchr::memchr(0, head).is_none()
        }
    }
}

/// Atomic write with robust temp file strategy
pub fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));

    // Preserve original permissions when replacing
    let perms = fs::metadata(path).map(|m| m.permissions()).ok();

    let tmp = tempfile::NamedTempFile::new_in(dir)
        .with_context(|| format!("create temp file in {}", dir.display()))?;

    let mut file = tmp.as_file();
    file.write_all(data)?;
    file.sync_all()?;

    if let Some(perms) = perms {
        fs::set_permissions(tmp.path(), perms).context("set temp permissions")?;
    }

    // Atomically replace the destination
    tmp.persist(path)
        .map_err(|e| e.error)
        .with_context(|| format!("persist {}", path.display()))?;

    // fsync parent dir to ensure durability on Unix
    #[cfg(unix)]
    {
        if let Ok(parent_file) = File::open(dir) {
            let _ = parent_file.sync_all();
        }
    }

    Ok(())
}
