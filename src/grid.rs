//! The grid: a named registry of channels.

use crate::channel::Channel;
use crate::config::{ChannelConfig, GridConfig};
use crate::error::{Error, Result};
use crate::observability::span_grid;
use crate::registry::CellRegistry;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Top-level owner of channels.
///
/// Channels are looked up by name. Allocating under a name that is taken
/// closes the previous channel and replaces it. Dropping the grid closes
/// every channel it still holds.
///
/// # Example
///
/// ```rust
/// use gridstreamer::Grid;
///
/// let grid = Grid::new("studio");
/// let channel = grid
///     .allocate_channel("preview", Some("{ src: TestImage ! dst: TestImageVerify }"))
///     .unwrap();
/// assert_eq!(grid.channels().len(), 1);
/// assert!(grid.channel("preview").unwrap().ptr_eq(&channel));
/// ```
pub struct Grid {
    name: String,
    registry: Arc<CellRegistry>,
    config: GridConfig,
    channels: RwLock<BTreeMap<String, Channel>>,
}

impl Grid {
    /// Create a grid with the built-in cell types and default configuration.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_registry(name, Arc::new(CellRegistry::with_builtin()))
    }

    /// Create a grid resolving cell types in `registry`.
    pub fn with_registry(name: impl Into<String>, registry: Arc<CellRegistry>) -> Self {
        Self::with_config(name, registry, GridConfig::default())
    }

    /// Create a grid with an explicit configuration.
    pub fn with_config(
        name: impl Into<String>,
        registry: Arc<CellRegistry>,
        config: GridConfig,
    ) -> Self {
        let name = name.into();
        tracing::debug!(grid = %name, cell_types = registry.len(), "grid created");
        Self {
            name,
            registry,
            config,
            channels: RwLock::new(BTreeMap::new()),
        }
    }

    /// Grid name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The cell-type registry.
    pub fn registry(&self) -> &Arc<CellRegistry> {
        &self.registry
    }

    /// The grid configuration.
    pub fn config(&self) -> &GridConfig {
        &self.config
    }

    /// Build a channel from `layout` (or the default layout) and register it
    /// under `name`.
    ///
    /// The layout is compiled before anything else happens, so a bad layout
    /// leaves an existing channel under `name` untouched. On success any
    /// previous channel under `name` is closed and replaced. The new channel
    /// is `Idle`.
    pub fn allocate_channel(&self, name: &str, layout: Option<&str>) -> Result<Channel> {
        self.allocate_channel_with(name, layout, self.config.channel.clone())
    }

    /// Like [`allocate_channel`](Self::allocate_channel) with a
    /// per-channel configuration.
    pub fn allocate_channel_with(
        &self,
        name: &str,
        layout: Option<&str>,
        config: ChannelConfig,
    ) -> Result<Channel> {
        let _span = span_grid(&self.name).entered();
        if name.trim().is_empty() {
            return Err(Error::InvalidName(name.to_string()));
        }

        let channel = Channel::new(name, Arc::clone(&self.registry), config, layout)?;
        let previous = self.write_channels().insert(name.to_string(), channel.clone());
        if let Some(previous) = previous {
            tracing::debug!(channel = %name, "replacing channel");
            previous.close()?;
        }
        tracing::info!(channel = %name, "channel allocated");
        Ok(channel)
    }

    /// Snapshot of the channels by name.
    pub fn channels(&self) -> BTreeMap<String, Channel> {
        self.read_channels().clone()
    }

    /// Channel by name.
    pub fn channel(&self, name: &str) -> Option<Channel> {
        self.read_channels().get(name).cloned()
    }

    /// Close and forget the channel under `name`.
    pub fn remove_channel(&self, name: &str) -> Option<Channel> {
        let channel = self.write_channels().remove(name)?;
        if let Err(e) = channel.close() {
            tracing::warn!(channel = %name, error = %e, "close failed");
        }
        Some(channel)
    }

    /// Close every channel. The channels stay registered.
    pub fn close_all(&self) {
        let _span = span_grid(&self.name).entered();
        for (name, channel) in self.channels() {
            if let Err(e) = channel.close() {
                tracing::warn!(channel = %name, error = %e, "close failed");
            }
        }
    }

    fn read_channels(&self) -> RwLockReadGuard<'_, BTreeMap<String, Channel>> {
        self.channels.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_channels(&self) -> RwLockWriteGuard<'_, BTreeMap<String, Channel>> {
        self.channels.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Grid {
    fn drop(&mut self) {
        self.close_all();
    }
}

impl fmt::Debug for Grid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Grid")
            .field("name", &self.name)
            .field("channels", &self.read_channels().keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::ChannelState;

    #[test]
    fn test_allocate_default_layout() {
        let grid = Grid::new("g");
        let channel = grid.allocate_channel("c", None).unwrap();
        assert_eq!(channel.state(), ChannelState::Idle);
        assert_eq!(
            channel.layout().to_string(),
            "{ src: TestImage Dimension='640x480' PixelFormat='rgb24' Pattern='gradient' FrameRate='0' ! dst: NullSink }"
        );
    }

    #[test]
    fn test_invalid_name() {
        let grid = Grid::new("g");
        assert!(matches!(
            grid.allocate_channel("", None),
            Err(Error::InvalidName(_))
        ));
    }

    #[test]
    fn test_failed_allocation_keeps_existing() {
        let grid = Grid::new("g");
        let original = grid.allocate_channel("c", None).unwrap();

        let err = grid.allocate_channel("c", Some("{ src: TestImage !")).unwrap_err();
        assert!(err.is_parse_error());
        assert!(grid.channel("c").unwrap().ptr_eq(&original));
        assert_eq!(original.state(), ChannelState::Idle);
    }

    #[test]
    fn test_remove_and_close_all() {
        let grid = Grid::new("g");
        let a = grid.allocate_channel("a", None).unwrap();
        let b = grid.allocate_channel("b", None).unwrap();

        let removed = grid.remove_channel("a").unwrap();
        assert!(removed.ptr_eq(&a));
        assert_eq!(a.state(), ChannelState::Closed);
        assert!(grid.remove_channel("a").is_none());

        grid.close_all();
        assert_eq!(b.state(), ChannelState::Closed);
        assert_eq!(grid.channels().len(), 1);
    }

    #[test]
    fn test_drop_closes_channels() {
        let channel = {
            let grid = Grid::new("g");
            grid.allocate_channel("c", None).unwrap()
        };
        assert_eq!(channel.state(), ChannelState::Closed);
    }
}
