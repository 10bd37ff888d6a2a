use encoding_rs::SHIFT_JIS;
use thiserror::Error;

pub mod stage;

pub use stage::{ObjectPlacement, Quad, SceneObject, ScriptEvent, ScriptInstruction, Stage};

#[derive(Debug, Error)]
pub enum FormatError {
    #[error("unexpected end of stream at offset {offset:#x} while reading {context}")]
    UnexpectedEof { offset: usize, context: &'static str },
    #[error("malformed data at offset {offset:#x}: {message}")]
    Malformed { offset: usize, message: String },
}

pub(crate) fn malformed(offset: usize, message: impl Into<String>) -> FormatError {
    FormatError::Malformed {
        offset,
        message: message.into(),
    }
}

/// Little-endian cursor over an in-memory byte stream. Running past the end
/// of the stream is always reported as an error, never a short read.
pub struct Reader<'a> {
    bytes: &'a [u8],
    cursor: usize,
}

impl<'a> Reader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, cursor: 0 }
    }

    pub fn offset(&self) -> usize {
        self.cursor
    }

    pub fn seek(&mut self, offset: usize) {
        self.cursor = offset;
    }

    pub fn read_bytes(
        &mut self,
        len: usize,
        context: &'static str,
    ) -> Result<&'a [u8], FormatError> {
        let end = self.cursor.saturating_add(len);
        if end > self.bytes.len() {
            return Err(FormatError::UnexpectedEof {
                offset: self.cursor,
                context,
            });
        }
        let out = &self.bytes[self.cursor..end];
        self.cursor = end;
        Ok(out)
    }

    pub fn read_u16(&mut self, context: &'static str) -> Result<u16, FormatError> {
        let offset = self.cursor;
        let raw = self.read_bytes(2, context)?;
        raw.try_into()
            .map(u16::from_le_bytes)
            .map_err(|_| malformed(offset, format!("invalid u16 encoding in {context}")))
    }

    pub fn read_u32(&mut self, context: &'static str) -> Result<u32, FormatError> {
        let offset = self.cursor;
        let raw = self.read_bytes(4, context)?;
        raw.try_into()
            .map(u32::from_le_bytes)
            .map_err(|_| malformed(offset, format!("invalid u32 encoding in {context}")))
    }

    pub fn read_f32(&mut self, context: &'static str) -> Result<f32, FormatError> {
        let offset = self.cursor;
        let raw = self.read_bytes(4, context)?;
        raw.try_into()
            .map(f32::from_le_bytes)
            .map_err(|_| malformed(offset, format!("invalid f32 encoding in {context}")))
    }

    /// Fixed-width NUL-padded Shift-JIS text field; padding after the first
    /// NUL is discarded.
    pub fn read_shift_jis(
        &mut self,
        len: usize,
        context: &'static str,
    ) -> Result<String, FormatError> {
        let offset = self.cursor;
        let raw = strip_nul_padding(self.read_bytes(len, context)?);
        let (decoded, _, had_errors) = SHIFT_JIS.decode(raw);
        if had_errors {
            return Err(malformed(
                offset,
                format!("invalid shift_jis text in {context}"),
            ));
        }
        Ok(decoded.into_owned())
    }

    /// Fixed-width NUL-padded ASCII text field.
    pub fn read_ascii(&mut self, len: usize, context: &'static str) -> Result<String, FormatError> {
        let offset = self.cursor;
        let raw = strip_nul_padding(self.read_bytes(len, context)?);
        if !raw.is_ascii() {
            return Err(malformed(
                offset,
                format!("non-ascii byte in {context}"),
            ));
        }
        Ok(String::from_utf8_lossy(raw).into_owned())
    }
}

fn strip_nul_padding(bytes: &[u8]) -> &[u8] {
    match bytes.iter().position(|&byte| byte == 0) {
        Some(end) => &bytes[..end],
        None => bytes,
    }
}
