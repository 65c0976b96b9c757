use image::RgbaImage;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, TryRecvError};

/// Maximum number of snapshots kept on the undo stack.
pub const MAX_HISTORY: usize = 5;

// ============================================================================
// SNAPSHOT - PNG-encoded copy of the whole annotation buffer
// ============================================================================

/// Full serialized buffer content. The encoded bytes are shared so moving an
/// entry between the stacks or handing it to a decode worker never copies.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Snapshot {
    png: Arc<[u8]>,
    width: u32,
    height: u32,
}

impl Snapshot {
    /// Encode `pixels`. Returns `None` if the encoder produced nothing.
    pub fn capture(pixels: &RgbaImage) -> Option<Self> {
        let (width, height) = pixels.dimensions();
        if width == 0 || height == 0 {
            return None;
        }
        let png = encode_png(pixels).ok()?;
        if png.is_empty() {
            return None;
        }
        Some(Self {
            png: png.into(),
            width,
            height,
        })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.png
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn memory_size(&self) -> usize {
        self.png.len()
    }

    /// Decode back into RGBA pixels.
    pub fn decode(&self) -> Result<RgbaImage, String> {
        decode_png(&self.png, self.width, self.height)
    }
}

fn encode_png(pixels: &RgbaImage) -> Result<Vec<u8>, String> {
    let mut out = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut out, pixels.width(), pixels.height());
        encoder.set_color(png::ColorType::Rgba);
        encoder.set_depth(png::BitDepth::Eight);
        encoder.set_compression(png::Compression::Fast);
        let mut writer = encoder
            .write_header()
            .map_err(|e| format!("PNG header error: {}", e))?;
        writer
            .write_image_data(pixels.as_raw())
            .map_err(|e| format!("PNG write error: {}", e))?;
        writer
            .finish()
            .map_err(|e| format!("PNG finish error: {}", e))?;
    }
    Ok(out)
}

fn decode_png(bytes: &[u8], width: u32, height: u32) -> Result<RgbaImage, String> {
    let decoder = png::Decoder::new(bytes);
    let mut reader = decoder
        .read_info()
        .map_err(|e| format!("PNG decode error: {}", e))?;
    let mut data = vec![0u8; reader.output_buffer_size()];
    let info = reader
        .next_frame(&mut data)
        .map_err(|e| format!("PNG frame error: {}", e))?;
    if info.color_type != png::ColorType::Rgba || info.bit_depth != png::BitDepth::Eight {
        return Err(format!(
            "Unexpected snapshot format {:?}/{:?}",
            info.color_type, info.bit_depth
        ));
    }
    if info.width != width || info.height != height {
        return Err(format!(
            "Snapshot is {}x{}, expected {}x{}",
            info.width, info.height, width, height
        ));
    }
    data.truncate(info.buffer_size());
    RgbaImage::from_raw(width, height, data).ok_or_else(|| "Snapshot buffer too small".to_string())
}

// ============================================================================
// HISTORY MANAGER
// ============================================================================

/// Which stack move a restore belongs to, so a failed decode can be undone.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RestoreDirection {
    Undo,
    Redo,
}

/// Bounded undo/redo of whole-buffer snapshots. The newest undo entry always
/// describes what the buffer currently shows.
pub struct HistoryManager {
    undo_stack: VecDeque<Snapshot>,
    redo_stack: Vec<Snapshot>,
    max_history_size: usize,
}

impl Default for HistoryManager {
    fn default() -> Self {
        Self::new(MAX_HISTORY)
    }
}

impl HistoryManager {
    pub fn new(max_history_size: usize) -> Self {
        Self {
            undo_stack: VecDeque::new(),
            redo_stack: Vec::new(),
            max_history_size: max_history_size.max(1),
        }
    }

    /// Push a snapshot, evicting the oldest at capacity. Clears redo.
    pub fn push(&mut self, snapshot: Snapshot) {
        self.redo_stack.clear();
        if self.undo_stack.len() >= self.max_history_size {
            self.undo_stack.pop_front();
        }
        self.undo_stack.push_back(snapshot);
    }

    /// Move the newest entry to redo and return the state to restore.
    /// `None` with fewer than two entries.
    pub fn undo(&mut self) -> Option<Snapshot> {
        if self.undo_stack.len() < 2 {
            return None;
        }
        let current = self.undo_stack.pop_back()?;
        self.redo_stack.push(current);
        self.undo_stack.back().cloned()
    }

    /// Move the newest redo entry back onto the undo stack and return it.
    pub fn redo(&mut self) -> Option<Snapshot> {
        let next = self.redo_stack.pop()?;
        self.undo_stack.push_back(next.clone());
        Some(next)
    }

    /// Reverse a stack move whose restore could not be applied.
    pub fn rollback(&mut self, direction: RestoreDirection) {
        match direction {
            RestoreDirection::Undo => {
                if let Some(s) = self.redo_stack.pop() {
                    self.undo_stack.push_back(s);
                }
            }
            RestoreDirection::Redo => {
                if let Some(s) = self.undo_stack.pop_back() {
                    self.redo_stack.push(s);
                }
            }
        }
    }

    /// Newest undo entry (the current state).
    pub fn latest(&self) -> Option<&Snapshot> {
        self.undo_stack.back()
    }

    pub fn can_undo(&self) -> bool {
        self.undo_stack.len() >= 2
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_count(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_count(&self) -> usize {
        self.redo_stack.len()
    }

    pub fn memory_usage(&self) -> usize {
        self.undo_stack
            .iter()
            .chain(self.redo_stack.iter())
            .map(Snapshot::memory_size)
            .sum()
    }

    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
    }
}

// ============================================================================
// RESTORE JOB - snapshot decode on a worker thread
// ============================================================================

/// An in-flight snapshot decode. The result arrives over a channel; the
/// buffer is only touched once the caller collects a successful result.
pub struct RestoreJob {
    direction: RestoreDirection,
    rx: Receiver<Result<RgbaImage, String>>,
}

impl RestoreJob {
    pub fn spawn(snapshot: Snapshot, direction: RestoreDirection) -> Self {
        let (tx, rx) = mpsc::channel();
        rayon::spawn(move || {
            let _ = tx.send(snapshot.decode());
        });
        Self { direction, rx }
    }

    pub fn direction(&self) -> RestoreDirection {
        self.direction
    }

    /// Non-blocking check. `None` while the decode is still running.
    pub fn try_finish(&self) -> Option<Result<RgbaImage, String>> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err("Restore worker vanished".to_string())),
        }
    }

    /// Block until the decode completes.
    pub fn wait(self) -> Result<RgbaImage, String> {
        self.rx
            .recv()
            .unwrap_or_else(|_| Err("Restore worker vanished".to_string()))
    }
}
