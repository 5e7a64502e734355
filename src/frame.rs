//! Raw link-layer frames.

use std::sync::Arc;

/// An immutable frame payload. Cloning shares the bytes, so one transmission
/// can be handed to every receiver of a medium without copying.
#[derive(Clone, PartialEq, Eq)]
pub struct Frame(Arc<[u8]>);

impl Frame {
    pub fn new(bytes: &[u8]) -> Self {
        Frame(Arc::from(bytes))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for Frame {
    fn from(bytes: Vec<u8>) -> Self {
        Frame(Arc::from(bytes))
    }
}

impl From<&[u8]> for Frame {
    fn from(bytes: &[u8]) -> Self {
        Frame::new(bytes)
    }
}

impl AsRef<[u8]> for Frame {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        const PREVIEW: usize = 16;
        write!(f, "Frame({} bytes:", self.0.len())?;
        for byte in self.0.iter().take(PREVIEW) {
            write!(f, " {:02x}", byte)?;
        }
        if self.0.len() > PREVIEW {
            f.write_str(" ..")?;
        }
        f.write_str(")")
    }
}
