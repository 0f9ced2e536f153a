/// Tailnet Auth
///
/// Resolves the address of an incoming request to the Tailscale device behind
/// it and exposes that identity to the rest of the request pipeline as
/// headers. Device data comes from the Tailscale API and is cached in memory
/// and on disk.

pub mod annotate;
pub mod api;
pub mod config;
pub mod context;
pub mod directory;
pub mod error;
pub mod server;

pub use annotate::device_attributes;
pub use config::{LookupMode, TailnetConfig};
pub use context::AppContext;
pub use directory::{Device, DirectoryClient, DirectorySnapshot, ResolutionCache, SnapshotStore};
pub use error::{TailnetError, TailnetResult};
