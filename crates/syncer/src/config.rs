use model::ItemId;

/// Glob of Ectoplasm: traded every day, so its newest row tracks the remote update cursor.
pub const GLOB_OF_ECTOPLASM: ItemId = ItemId(19721);

pub const DEFAULT_CHUNK_SIZE: usize = 20;

#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Items per incremental history request.
    pub chunk_size: usize,
    /// Item probed to estimate how current the remote data set is.
    pub reference_item: ItemId,
    /// Synchronize before serving `history`/`history_batch`.
    pub auto_sync: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            reference_item: GLOB_OF_ECTOPLASM,
            auto_sync: false,
        }
    }
}
