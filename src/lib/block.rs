//! The unit of work carried through the pipeline stages.

use blockpipe_bgzf::FrameInfo;

use crate::buffer_pool::Buffer;
use crate::errors::PipelineError;

/// One input block on its way from the reader to the writer.
///
/// Each stage takes the buffer it needs out of the block, produces the next one and
/// lets the old buffer drop back into its pool:
///
/// ```text
/// raw ──decompress──▶ decoded ──transform*──▶ decoded ──compress──▶ encoded
/// ```
#[derive(Debug)]
pub struct PendingBlock {
    /// Position of the block in its stream; dense and starting at zero.
    pub block_id: u64,
    /// Stream the block belongs to.
    pub stream_id: u64,
    /// Index of the last sub-unit compressed for this block; zero unless the payload
    /// was split across several output blocks.
    pub sub_id: u64,
    /// Marks the sentinel that follows the last real block of a stream.
    pub is_final: bool,
    /// Compressed input block as read from the source.
    pub raw: Option<Buffer>,
    /// Inflated payload.
    pub decoded: Option<Buffer>,
    /// Output bytes: zero or more concatenated BGZF blocks.
    pub encoded: Option<Buffer>,
    /// Framing of the input block, once inflated.
    pub input_frame: Option<FrameInfo>,
    /// Framing of each output block in `encoded`, in order.
    pub frames: Vec<FrameInfo>,
}

impl PendingBlock {
    /// A block freshly read from `stream_id`.
    #[must_use]
    pub fn new(stream_id: u64, block_id: u64, raw: Buffer) -> Self {
        Self {
            block_id,
            stream_id,
            sub_id: 0,
            is_final: false,
            raw: Some(raw),
            decoded: None,
            encoded: None,
            input_frame: None,
            frames: Vec::new(),
        }
    }

    /// The end-of-stream sentinel, numbered after the last real block.
    #[must_use]
    pub fn sentinel(stream_id: u64, block_id: u64) -> Self {
        Self {
            block_id,
            stream_id,
            sub_id: 0,
            is_final: true,
            raw: None,
            decoded: None,
            encoded: None,
            input_frame: None,
            frames: Vec::new(),
        }
    }

    /// Bytes this block contributes to the output.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        self.encoded.as_ref().map_or(0, |buffer| buffer.len())
    }

    /// Payload bytes carried by the output blocks.
    #[must_use]
    pub fn uncompressed_len(&self) -> usize {
        self.frames.iter().map(|frame| frame.uncompressed_size).sum()
    }
}

/// An error tied to one block, held back until that block is next in line to commit.
#[derive(Debug)]
pub struct BlockFailure {
    /// Stream of the failed block.
    pub stream_id: u64,
    /// Sequence number of the failed block.
    pub block_id: u64,
    /// What went wrong.
    pub error: PipelineError,
}

impl BlockFailure {
    /// Attach `error` to block `block_id` of `stream_id`.
    pub fn new(stream_id: u64, block_id: u64, error: impl Into<PipelineError>) -> Self {
        Self { stream_id, block_id, error: error.into() }
    }
}

/// Outcome of a block's last stage, as stored in the reassembly buffer.
pub type Completion = Result<PendingBlock, BlockFailure>;
