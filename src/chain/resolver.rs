//! Block and window resolution.

use super::ChainAdapter;
use crate::error::{ReportError, Result};
use crate::models::{Block, BlockRef, Window, WindowEnd};
use tracing::debug;

/// Resolve a block reference to number, hash and recorded timestamp.
pub async fn resolve_block(chain: &ChainAdapter, block_ref: &BlockRef) -> Result<Block> {
    let (number, hash) = match block_ref {
        BlockRef::Number(number) => (*number, chain.block_hash(*number).await?),
        BlockRef::Hash(hash) => (chain.block_number(hash).await?, hash.clone()),
        BlockRef::Head => {
            let number = chain.head_number().await?;
            (number, chain.block_hash(number).await?)
        }
    };

    let timestamp = chain.timestamp_at(&hash).await?;
    debug!("resolved {} to #{} ({}) at {}", block_ref, number, hash, timestamp);

    Ok(Block {
        number,
        hash,
        timestamp,
    })
}

/// Resolve a window. An open end is pinned to the head exactly once; the
/// returned [`Window`] is the only place later queries take the end from.
pub async fn resolve_window(chain: &ChainAdapter, start: u64, end: WindowEnd) -> Result<Window> {
    if let WindowEnd::At(end) = end {
        if end < start {
            return Err(ReportError::InvalidArgument(format!(
                "window end #{} is before start #{}",
                end, start
            )));
        }
    }

    let end_ref = match end {
        WindowEnd::At(number) => BlockRef::Number(number),
        WindowEnd::Open => BlockRef::Head,
    };

    let start_ref = BlockRef::Number(start);
    let (start_block, end_block) = futures::try_join!(
        resolve_block(chain, &start_ref),
        resolve_block(chain, &end_ref)
    )?;

    if end_block.number < start_block.number {
        return Err(ReportError::InvalidArgument(format!(
            "window start #{} is beyond chain head #{}",
            start_block.number, end_block.number
        )));
    }

    Ok(Window {
        start: start_block,
        end: end_block,
        end_was_open: end == WindowEnd::Open,
    })
}
